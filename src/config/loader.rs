//! Configuration loader with TOML parsing and environment variable overrides

use super::schema::{ImportConfig, MergePolicy, OnConflict, SubjectCodeField};
use super::secret::secret_string;
use crate::domain::errors::ImportError;
use crate::domain::result::Result;
use regex::Regex;
use std::fs;
use std::path::{Path, PathBuf};

/// Loads configuration from a TOML file
///
/// This function:
/// 1. Reads the TOML file
/// 2. Performs environment variable substitution (${VAR} syntax)
/// 3. Parses the TOML into ImportConfig
/// 4. Applies environment variable overrides (HCIMPORT_* prefix)
/// 5. Validates the configuration
///
/// # Arguments
///
/// * `path` - Path to the TOML configuration file
///
/// # Errors
///
/// Returns an error if:
/// - File cannot be read
/// - TOML parsing fails
/// - A referenced environment variable is not set
/// - Configuration validation fails
///
/// # Examples
///
/// ```no_run
/// use hcimport::config::loader::load_config;
///
/// let config = load_config("hcimport.toml").expect("Failed to load config");
/// ```
pub fn load_config(path: impl AsRef<Path>) -> Result<ImportConfig> {
    let path = path.as_ref();

    if !path.exists() {
        return Err(ImportError::Configuration(format!(
            "Configuration file not found: {}",
            path.display()
        )));
    }

    let contents = fs::read_to_string(path).map_err(|e| {
        ImportError::Configuration(format!(
            "Failed to read configuration file {}: {}",
            path.display(),
            e
        ))
    })?;

    let contents = substitute_env_vars(&contents)?;

    let mut config: ImportConfig = toml::from_str(&contents)
        .map_err(|e| ImportError::Configuration(format!("Failed to parse TOML: {}", e)))?;

    apply_env_overrides(&mut config)?;

    config.validate().map_err(|e| {
        ImportError::Configuration(format!("Configuration validation failed: {}", e))
    })?;

    Ok(config)
}

/// Substitutes environment variables in the format ${VAR_NAME}
///
/// Comment lines are copied untouched.
///
/// # Errors
///
/// Returns an error listing every referenced variable that is not set
fn substitute_env_vars(input: &str) -> Result<String> {
    let re = Regex::new(r"\$\{([A-Z_][A-Z0-9_]*)\}")
        .map_err(|e| ImportError::Configuration(format!("Invalid substitution pattern: {e}")))?;
    let mut lines = Vec::new();
    let mut missing_vars: Vec<String> = Vec::new();

    for line in input.lines() {
        if line.trim_start().starts_with('#') {
            lines.push(line.to_string());
            continue;
        }

        let processed = re.replace_all(line, |caps: &regex::Captures| {
            let var_name = &caps[1];
            match std::env::var(var_name) {
                Ok(value) => value,
                Err(_) => {
                    if !missing_vars.iter().any(|v| v == var_name) {
                        missing_vars.push(var_name.to_string());
                    }
                    caps[0].to_string()
                }
            }
        });
        lines.push(processed.into_owned());
    }

    if !missing_vars.is_empty() {
        return Err(ImportError::Configuration(format!(
            "Missing required environment variables: {}",
            missing_vars.join(", ")
        )));
    }

    Ok(lines.join("\n"))
}

fn parse_override<T: std::str::FromStr>(name: &str, value: &str) -> Result<T> {
    value.parse().map_err(|_| {
        ImportError::Configuration(format!("Invalid value '{value}' for {name}"))
    })
}

fn parse_enum_override<T: serde::de::DeserializeOwned>(name: &str, value: &str) -> Result<T> {
    T::deserialize(serde::de::value::StrDeserializer::<serde::de::value::Error>::new(value))
        .map_err(|_| ImportError::Configuration(format!("Invalid value '{value}' for {name}")))
}

/// Applies environment variable overrides using the HCIMPORT_* prefix
///
/// Environment variables follow the pattern: HCIMPORT_<SECTION>_<KEY>
/// For example: HCIMPORT_PLATFORM_PROJECT_ID, HCIMPORT_IMPORT_MERGE_POLICY
fn apply_env_overrides(config: &mut ImportConfig) -> Result<()> {
    let var = |name: &str| std::env::var(name).ok();

    // Application overrides
    if let Some(val) = var("HCIMPORT_APPLICATION_LOG_LEVEL") {
        config.application.log_level = val;
    }

    // Healthcare overrides
    if let Some(val) = var("HCIMPORT_HEALTHCARE_BASE_URL") {
        config.healthcare.base_url = val;
    }
    if let Some(val) = var("HCIMPORT_HEALTHCARE_DATASET") {
        config.healthcare.dataset = val;
    }
    if let Some(val) = var("HCIMPORT_HEALTHCARE_DICOM_STORE") {
        config.healthcare.dicom_store = Some(val);
    }
    if let Some(val) = var("HCIMPORT_HEALTHCARE_HL7_STORE") {
        config.healthcare.hl7_store = Some(val);
    }
    if let Some(val) = var("HCIMPORT_HEALTHCARE_FHIR_STORE") {
        config.healthcare.fhir_store = Some(val);
    }
    if let Some(val) = var("HCIMPORT_HEALTHCARE_ACCESS_TOKEN") {
        config.healthcare.access_token = Some(secret_string(val));
    }
    if let Some(val) = var("HCIMPORT_HEALTHCARE_AUTH_TOKEN_ID") {
        config.healthcare.auth_token_id = Some(val);
    }
    if let Some(val) = var("HCIMPORT_HEALTHCARE_TIMEOUT_SECONDS") {
        config.healthcare.timeout_seconds =
            parse_override("HCIMPORT_HEALTHCARE_TIMEOUT_SECONDS", &val)?;
    }
    if let Some(val) = var("HCIMPORT_HEALTHCARE_RETRY_MAX_RETRIES") {
        config.healthcare.retry.max_retries =
            parse_override("HCIMPORT_HEALTHCARE_RETRY_MAX_RETRIES", &val)?;
    }

    // Platform overrides
    if let Some(val) = var("HCIMPORT_PLATFORM_BASE_URL") {
        config.platform.base_url = val;
    }
    if let Some(val) = var("HCIMPORT_PLATFORM_API_KEY") {
        config.platform.api_key = secret_string(val);
    }
    if let Some(val) = var("HCIMPORT_PLATFORM_PROJECT_ID") {
        config.platform.project_id = val;
    }
    if let Some(val) = var("HCIMPORT_PLATFORM_TIMEOUT_SECONDS") {
        config.platform.timeout_seconds =
            parse_override("HCIMPORT_PLATFORM_TIMEOUT_SECONDS", &val)?;
    }
    if let Some(val) = var("HCIMPORT_PLATFORM_RETRY_MAX_RETRIES") {
        config.platform.retry.max_retries =
            parse_override("HCIMPORT_PLATFORM_RETRY_MAX_RETRIES", &val)?;
    }
    if let Some(val) = var("HCIMPORT_PLATFORM_ON_CONFLICT") {
        config.platform.on_conflict =
            parse_enum_override::<OnConflict>("HCIMPORT_PLATFORM_ON_CONFLICT", &val)?;
    }
    if let Some(val) = var("HCIMPORT_PLATFORM_CONFLICT_RELOOKUPS") {
        config.platform.conflict_relookups =
            parse_override("HCIMPORT_PLATFORM_CONFLICT_RELOOKUPS", &val)?;
    }

    // Identity overrides
    if let Some(val) = var("HCIMPORT_IDENTITY_BASE_URL") {
        config.identity.base_url = Some(val);
    }

    // Import overrides
    if let Some(val) = var("HCIMPORT_IMPORT_DE_IDENTIFY") {
        config.import.de_identify = parse_override("HCIMPORT_IMPORT_DE_IDENTIFY", &val)?;
    }
    if let Some(val) = var("HCIMPORT_IMPORT_SUBJECT_CODE_FIELD") {
        config.import.subject_code_field =
            parse_enum_override::<SubjectCodeField>("HCIMPORT_IMPORT_SUBJECT_CODE_FIELD", &val)?;
    }
    if let Some(val) = var("HCIMPORT_IMPORT_MERGE_POLICY") {
        config.import.merge_policy =
            parse_enum_override::<MergePolicy>("HCIMPORT_IMPORT_MERGE_POLICY", &val)?;
    }
    if let Some(val) = var("HCIMPORT_IMPORT_CODE_TABLE") {
        config.import.code_table = Some(PathBuf::from(val));
    }
    if let Some(val) = var("HCIMPORT_IMPORT_TIMEZONE") {
        config.import.timezone = val;
    }
    if let Some(val) = var("HCIMPORT_IMPORT_WORK_DIR") {
        config.import.work_dir = Some(PathBuf::from(val));
    }

    // Logging overrides
    if let Some(val) = var("HCIMPORT_LOGGING_LOCAL_ENABLED") {
        config.logging.local_enabled = parse_override("HCIMPORT_LOGGING_LOCAL_ENABLED", &val)?;
    }
    if let Some(val) = var("HCIMPORT_LOGGING_LOCAL_PATH") {
        config.logging.local_path = val;
    }
    if let Some(val) = var("HCIMPORT_LOGGING_LOCAL_ROTATION") {
        config.logging.local_rotation = val;
    }

    Ok(())
}
