//! Configuration schema types
//!
//! This module defines the configuration structure for hcimport.

use crate::config::SecretString;
use serde::{Deserialize, Serialize};
use std::path::PathBuf;

/// Imaging attribute used as the subject code
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum SubjectCodeField {
    /// PatientID (0010,0020)
    #[default]
    PatientId,
    /// AccessionNumber (0008,0050)
    AccessionNumber,
}

/// How freshly derived subject fields combine with an existing subject
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum MergePolicy {
    /// Established identity fields win; fresh values only fill gaps
    #[default]
    PreserveExisting,
    /// Fresh values replace stored ones
    OverwriteWithLatest,
}

/// Reaction to a create conflict raised by a concurrent importer
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum OnConflict {
    /// Propagate the conflict as an item failure
    #[default]
    Fail,
    /// Re-run the lookup and reuse the node the other importer created
    Relookup,
}

/// Main hcimport configuration
///
/// This is the root configuration structure that maps to the TOML file.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ImportConfig {
    /// Application-level settings
    #[serde(default)]
    pub application: ApplicationConfig,

    /// Healthcare data store (source)
    pub healthcare: HealthcareConfig,

    /// Destination platform
    pub platform: PlatformConfig,

    /// Identity/pseudonymization service
    #[serde(default)]
    pub identity: IdentityConfig,

    /// Import behaviour
    #[serde(default)]
    pub import: ImportSettings,

    /// Logging configuration
    #[serde(default)]
    pub logging: LoggingConfig,
}

impl ImportConfig {
    /// Loads, substitutes, overrides and validates a configuration file
    ///
    /// Shorthand for [`crate::config::load_config`].
    pub fn from_file(path: impl AsRef<std::path::Path>) -> crate::domain::Result<Self> {
        super::loader::load_config(path)
    }

    /// Validates the configuration
    ///
    /// # Errors
    ///
    /// Returns an error if any configuration values are invalid
    pub fn validate(&self) -> Result<(), String> {
        self.application.validate()?;
        self.healthcare.validate()?;
        self.platform.validate()?;
        self.identity.validate()?;
        self.import.validate()?;
        self.logging.validate()?;
        Ok(())
    }

    /// Identity service base URL, defaulting to the platform URL
    pub fn identity_base_url(&self) -> &str {
        self.identity
            .base_url
            .as_deref()
            .unwrap_or(&self.platform.base_url)
    }
}

/// Application-level configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ApplicationConfig {
    /// Log level (trace, debug, info, warn, error)
    #[serde(default = "default_log_level")]
    pub log_level: String,
}

impl Default for ApplicationConfig {
    fn default() -> Self {
        Self {
            log_level: default_log_level(),
        }
    }
}

impl ApplicationConfig {
    fn validate(&self) -> Result<(), String> {
        let valid_levels = ["trace", "debug", "info", "warn", "error"];
        if !valid_levels.contains(&self.log_level.as_str()) {
            return Err(format!(
                "Invalid log_level '{}'. Must be one of: {}",
                self.log_level,
                valid_levels.join(", ")
            ));
        }
        Ok(())
    }
}

/// Retry configuration
///
/// Retries are opt-in: with the default `max_retries = 0` every upstream
/// call is attempted exactly once.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RetryConfig {
    /// Maximum number of retry attempts
    #[serde(default)]
    pub max_retries: usize,

    /// Initial delay in milliseconds
    #[serde(default = "default_initial_delay_ms")]
    pub initial_delay_ms: u64,

    /// Maximum delay in milliseconds
    #[serde(default = "default_max_delay_ms")]
    pub max_delay_ms: u64,

    /// Backoff multiplier
    #[serde(default = "default_backoff_multiplier")]
    pub backoff_multiplier: f64,
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self {
            max_retries: 0,
            initial_delay_ms: default_initial_delay_ms(),
            max_delay_ms: default_max_delay_ms(),
            backoff_multiplier: default_backoff_multiplier(),
        }
    }
}

impl RetryConfig {
    fn validate(&self, section: &str) -> Result<(), String> {
        if self.max_retries > 10 {
            return Err(format!("{section}.retry.max_retries must be <= 10"));
        }
        if self.backoff_multiplier < 1.0 {
            return Err(format!("{section}.retry.backoff_multiplier must be >= 1.0"));
        }
        if self.initial_delay_ms > self.max_delay_ms {
            return Err(format!(
                "{section}.retry.initial_delay_ms must not exceed max_delay_ms"
            ));
        }
        Ok(())
    }
}

/// Healthcare data store configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HealthcareConfig {
    /// Base URL of the healthcare API (e.g. `https://healthcare.googleapis.com/v1`)
    pub base_url: String,

    /// Dataset resource path prefix
    /// (`projects/<p>/locations/<l>/datasets/<d>`)
    pub dataset: String,

    /// DICOM store name
    #[serde(default)]
    pub dicom_store: Option<String>,

    /// HL7v2 store name
    #[serde(default)]
    pub hl7_store: Option<String>,

    /// FHIR store name
    #[serde(default)]
    pub fhir_store: Option<String>,

    /// Bearer token for the healthcare API
    /// Stored securely in memory and automatically zeroized on drop
    #[serde(default)]
    pub access_token: Option<SecretString>,

    /// Platform token id used to fetch the bearer token when none is configured
    #[serde(default)]
    pub auth_token_id: Option<String>,

    /// Timeout in seconds
    #[serde(default = "default_timeout_seconds")]
    pub timeout_seconds: u64,

    /// Retry configuration
    #[serde(default)]
    pub retry: RetryConfig,
}

impl HealthcareConfig {
    fn validate(&self) -> Result<(), String> {
        validate_url("healthcare.base_url", &self.base_url)?;

        if self.dataset.trim().is_empty() {
            return Err("healthcare.dataset cannot be empty".to_string());
        }

        if self.access_token.is_none() && self.auth_token_id.is_none() {
            return Err(
                "Either healthcare.access_token or healthcare.auth_token_id must be provided"
                    .to_string(),
            );
        }

        if self.timeout_seconds == 0 {
            return Err("healthcare.timeout_seconds must be > 0".to_string());
        }

        self.retry.validate("healthcare")
    }
}

/// Destination platform configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PlatformConfig {
    /// Base URL of the platform API (without the `/api` suffix)
    pub base_url: String,

    /// API key
    /// Stored securely in memory and automatically zeroized on drop
    pub api_key: SecretString,

    /// Destination project id
    pub project_id: String,

    /// Timeout in seconds
    #[serde(default = "default_timeout_seconds")]
    pub timeout_seconds: u64,

    /// Retry configuration
    #[serde(default)]
    pub retry: RetryConfig,

    /// Create-conflict handling (fail or relookup)
    #[serde(default)]
    pub on_conflict: OnConflict,

    /// Number of re-lookups after a create conflict when `on_conflict = "relookup"`
    #[serde(default = "default_conflict_relookups")]
    pub conflict_relookups: usize,
}

impl PlatformConfig {
    fn validate(&self) -> Result<(), String> {
        validate_url("platform.base_url", &self.base_url)?;

        if self.project_id.trim().is_empty() {
            return Err("platform.project_id cannot be empty".to_string());
        }

        if self.timeout_seconds == 0 {
            return Err("platform.timeout_seconds must be > 0".to_string());
        }

        if self.conflict_relookups == 0 || self.conflict_relookups > 10 {
            return Err("platform.conflict_relookups must be between 1 and 10".to_string());
        }

        self.retry.validate("platform")
    }
}

/// Identity service configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct IdentityConfig {
    /// Base URL of the identity service (defaults to the platform URL)
    #[serde(default)]
    pub base_url: Option<String>,

    /// Timeout in seconds
    #[serde(default = "default_timeout_seconds")]
    pub timeout_seconds: u64,
}

impl Default for IdentityConfig {
    fn default() -> Self {
        Self {
            base_url: None,
            timeout_seconds: default_timeout_seconds(),
        }
    }
}

impl IdentityConfig {
    fn validate(&self) -> Result<(), String> {
        if let Some(url) = &self.base_url {
            validate_url("identity.base_url", url)?;
        }
        if self.timeout_seconds == 0 {
            return Err("identity.timeout_seconds must be > 0".to_string());
        }
        Ok(())
    }
}

/// Import behaviour
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ImportSettings {
    /// Omit patient names from imaging metadata
    #[serde(default)]
    pub de_identify: bool,

    /// Imaging attribute used as the subject code
    #[serde(default)]
    pub subject_code_field: SubjectCodeField,

    /// Subject merge policy on repeated imports
    #[serde(default)]
    pub merge_policy: MergePolicy,

    /// CSV code table for observation short names
    #[serde(default)]
    pub code_table: Option<PathBuf>,

    /// Timezone label recorded in imaging metadata
    #[serde(default = "default_timezone")]
    pub timezone: String,

    /// Parent directory for per-series scratch directories (system temp by default)
    #[serde(default)]
    pub work_dir: Option<PathBuf>,
}

impl Default for ImportSettings {
    fn default() -> Self {
        Self {
            de_identify: false,
            subject_code_field: SubjectCodeField::default(),
            merge_policy: MergePolicy::default(),
            code_table: None,
            timezone: default_timezone(),
            work_dir: None,
        }
    }
}

impl ImportSettings {
    fn validate(&self) -> Result<(), String> {
        if self.timezone.trim().is_empty() {
            return Err("import.timezone cannot be empty".to_string());
        }
        if let Some(path) = &self.code_table {
            if path.as_os_str().is_empty() {
                return Err("import.code_table cannot be an empty path".to_string());
            }
        }
        Ok(())
    }
}

/// Logging configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LoggingConfig {
    /// Enable JSON file logging
    #[serde(default)]
    pub local_enabled: bool,

    /// Directory for log files
    #[serde(default = "default_local_path")]
    pub local_path: String,

    /// Rotation strategy (daily or hourly)
    #[serde(default = "default_local_rotation")]
    pub local_rotation: String,
}

impl LoggingConfig {
    fn validate(&self) -> Result<(), String> {
        let valid_rotations = ["daily", "hourly"];
        if !valid_rotations.contains(&self.local_rotation.as_str()) {
            return Err(format!(
                "Invalid logging.local_rotation '{}'. Must be one of: {}",
                self.local_rotation,
                valid_rotations.join(", ")
            ));
        }

        if self.local_enabled && self.local_path.trim().is_empty() {
            return Err("logging.local_path cannot be empty when local logging is enabled".to_string());
        }

        Ok(())
    }
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            local_enabled: false,
            local_path: default_local_path(),
            local_rotation: default_local_rotation(),
        }
    }
}

fn validate_url(field: &str, url: &str) -> Result<(), String> {
    if url.is_empty() {
        return Err(format!("{field} cannot be empty"));
    }
    if !url.starts_with("http://") && !url.starts_with("https://") {
        return Err(format!("{field} must start with http:// or https://"));
    }
    Ok(())
}

// Default value functions
fn default_log_level() -> String {
    "info".to_string()
}

fn default_timeout_seconds() -> u64 {
    60
}

fn default_initial_delay_ms() -> u64 {
    1000
}

fn default_max_delay_ms() -> u64 {
    30000
}

fn default_backoff_multiplier() -> f64 {
    2.0
}

fn default_conflict_relookups() -> usize {
    1
}

fn default_timezone() -> String {
    "UTC".to_string()
}

fn default_local_path() -> String {
    "/var/log/hcimport".to_string()
}

fn default_local_rotation() -> String {
    "daily".to_string()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::secret_string;

    fn healthcare() -> HealthcareConfig {
        HealthcareConfig {
            base_url: "https://healthcare.example.com/v1".to_string(),
            dataset: "projects/p/locations/l/datasets/d".to_string(),
            dicom_store: Some("dicom".to_string()),
            hl7_store: None,
            fhir_store: None,
            access_token: Some(secret_string("token".to_string())),
            auth_token_id: None,
            timeout_seconds: 60,
            retry: RetryConfig::default(),
        }
    }

    fn platform() -> PlatformConfig {
        PlatformConfig {
            base_url: "https://platform.example.com".to_string(),
            api_key: secret_string("key".to_string()),
            project_id: "p1".to_string(),
            timeout_seconds: 60,
            retry: RetryConfig::default(),
            on_conflict: OnConflict::Fail,
            conflict_relookups: 1,
        }
    }

    #[test]
    fn test_application_config_validation() {
        let mut config = ApplicationConfig {
            log_level: "info".to_string(),
        };

        assert!(config.validate().is_ok());

        config.log_level = "invalid".to_string();
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_healthcare_config_validation() {
        let mut config = healthcare();
        assert!(config.validate().is_ok());

        config.base_url = "ftp://example.com".to_string();
        assert!(config.validate().is_err());

        config = healthcare();
        config.dataset = "  ".to_string();
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_healthcare_requires_some_credential() {
        let mut config = healthcare();
        config.access_token = None;
        let result = config.validate();
        assert!(result.unwrap_err().contains("auth_token_id"));

        config.auth_token_id = Some("token-id".to_string());
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_platform_conflict_relookups_bounds() {
        let mut config = platform();
        config.conflict_relookups = 0;
        assert!(config.validate().is_err());

        config.conflict_relookups = 11;
        assert!(config.validate().is_err());

        config.conflict_relookups = 10;
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_retry_config_validation() {
        let mut retry = RetryConfig::default();
        assert_eq!(retry.max_retries, 0);
        assert!(retry.validate("platform").is_ok());

        retry.max_retries = 11;
        assert!(retry.validate("platform").is_err());

        retry.max_retries = 3;
        retry.backoff_multiplier = 0.5;
        assert!(retry.validate("platform").is_err());
    }

    #[test]
    fn test_policy_enums_deserialize() {
        #[derive(Deserialize)]
        struct Wrapper {
            merge: MergePolicy,
            conflict: OnConflict,
            code: SubjectCodeField,
        }

        let parsed: Wrapper = toml::from_str(
            "merge = \"overwrite_with_latest\"\nconflict = \"relookup\"\ncode = \"accession_number\"",
        )
        .unwrap();
        assert_eq!(parsed.merge, MergePolicy::OverwriteWithLatest);
        assert_eq!(parsed.conflict, OnConflict::Relookup);
        assert_eq!(parsed.code, SubjectCodeField::AccessionNumber);
    }

    #[test]
    fn test_import_settings_default() {
        let settings = ImportSettings::default();
        assert!(!settings.de_identify);
        assert_eq!(settings.merge_policy, MergePolicy::PreserveExisting);
        assert_eq!(settings.subject_code_field, SubjectCodeField::PatientId);
        assert_eq!(settings.timezone, "UTC");
        assert!(settings.validate().is_ok());
    }

    #[test]
    fn test_logging_config_default() {
        let config = LoggingConfig::default();
        assert!(!config.local_enabled);
        assert_eq!(config.local_path, "/var/log/hcimport");
        assert_eq!(config.local_rotation, "daily");
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_identity_base_url_defaults_to_platform() {
        let mut config = ImportConfig {
            application: ApplicationConfig::default(),
            healthcare: healthcare(),
            platform: platform(),
            identity: IdentityConfig::default(),
            import: ImportSettings::default(),
            logging: LoggingConfig::default(),
        };
        assert_eq!(config.identity_base_url(), "https://platform.example.com");

        config.identity.base_url = Some("https://identity.example.com".to_string());
        assert_eq!(config.identity_base_url(), "https://identity.example.com");
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_default_values() {
        assert_eq!(default_log_level(), "info");
        assert_eq!(default_timeout_seconds(), 60);
        assert_eq!(default_conflict_relookups(), 1);
        assert_eq!(default_timezone(), "UTC");
    }
}
