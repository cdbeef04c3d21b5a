//! Configuration management for hcimport.
//!
//! hcimport reads a TOML file with support for:
//! - Environment variable substitution (`${VAR_NAME}`)
//! - `HCIMPORT_<SECTION>_<KEY>` environment overrides
//! - Default values for optional settings
//! - Validation before anything touches the network
//!
//! # Quick Start
//!
//! ```rust,no_run
//! use hcimport::config::load_config;
//!
//! # fn example() -> Result<(), Box<dyn std::error::Error>> {
//! let config = load_config("hcimport.toml")?;
//! println!("Destination project: {}", config.platform.project_id);
//! println!("Merge policy: {:?}", config.import.merge_policy);
//! # Ok(())
//! # }
//! ```
//!
//! # Example Configuration
//!
//! ```toml
//! [application]
//! log_level = "info"
//!
//! [healthcare]
//! base_url = "https://healthcare.googleapis.com/v1"
//! dataset = "projects/my-project/locations/us-central1/datasets/clinical"
//! dicom_store = "imaging"
//! hl7_store = "messages"
//! fhir_store = "resources"
//! auth_token_id = "${HCIMPORT_AUTH_TOKEN_ID}"
//!
//! [platform]
//! base_url = "https://platform.example.com"
//! api_key = "${HCIMPORT_PLATFORM_API_KEY}"
//! project_id = "5db9e2c5d2a9f7002a8d9f11"
//! on_conflict = "relookup"
//!
//! [import]
//! merge_policy = "preserve_existing"
//! code_table = "/etc/hcimport/loinc.csv"
//! ```

pub mod loader;
pub mod schema;
pub mod secret;

// Re-export commonly used types
pub use loader::load_config;
pub use schema::{
    ApplicationConfig, HealthcareConfig, IdentityConfig, ImportConfig, ImportSettings,
    LoggingConfig, MergePolicy, OnConflict, PlatformConfig, RetryConfig, SubjectCodeField,
};
pub use secret::{secret_string, SecretString, SecretValue};
