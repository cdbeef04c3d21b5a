//! Validate config command implementation
//!
//! This module implements the `validate-config` command for validating
//! the hcimport configuration file.

use crate::config::load_config;
use clap::Args;

/// Arguments for the validate-config command
#[derive(Args, Debug)]
pub struct ValidateArgs {}

impl ValidateArgs {
    /// Execute the validate-config command
    ///
    /// Loading already validates, so a config that loads is valid.
    pub async fn execute(&self, config_path: &str) -> anyhow::Result<i32> {
        tracing::info!(config_path = %config_path, "Validating configuration");

        println!("🔍 Validating configuration file: {config_path}");
        println!();

        let config = match load_config(config_path) {
            Ok(c) => c,
            Err(e) => {
                println!("❌ Configuration validation failed");
                println!("   Error: {e}");
                println!();
                return Ok(2);
            }
        };

        println!("✅ Configuration is valid");
        println!();
        println!("Configuration Summary:");
        println!("  Log Level: {}", config.application.log_level);
        println!("  Healthcare API: {}", config.healthcare.base_url);
        println!("  Dataset: {}", config.healthcare.dataset);
        println!(
            "  Stores: dicom={} hl7={} fhir={}",
            config.healthcare.dicom_store.as_deref().unwrap_or("-"),
            config.healthcare.hl7_store.as_deref().unwrap_or("-"),
            config.healthcare.fhir_store.as_deref().unwrap_or("-"),
        );
        println!(
            "  Healthcare Token: {}",
            if config.healthcare.access_token.is_some() {
                "configured"
            } else {
                "fetched from platform"
            }
        );
        println!("  Platform: {}", config.platform.base_url);
        println!("  Project: {}", config.platform.project_id);
        println!("  Identity Service: {}", config.identity_base_url());
        println!("  On Conflict: {:?}", config.platform.on_conflict);
        println!("  Merge Policy: {:?}", config.import.merge_policy);
        println!("  De-identify: {}", config.import.de_identify);
        println!("  Subject Code Field: {:?}", config.import.subject_code_field);
        if let Some(path) = &config.import.code_table {
            println!("  Code Table: {}", path.display());
        }
        println!();
        Ok(0)
    }
}
