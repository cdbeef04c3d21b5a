//! Import command implementation
//!
//! Imports the referenced series, messages and resources into the
//! configured destination project.

use crate::config::load_config;
use crate::core::import::{ImportCoordinator, ImportSummary, ItemStatus, ObjectReferences};
use clap::Args;
use std::path::PathBuf;
use tokio::sync::watch;

/// Arguments for the import command
#[derive(Args, Debug, Default)]
pub struct ImportArgs {
    /// JSON file listing object references
    /// (`{"dicoms": [...], "hl7s": [...], "fhirs": [...]}`)
    #[arg(value_name = "REFERENCES")]
    pub references: Option<PathBuf>,

    /// Study or series instance UID to import (repeatable)
    #[arg(long = "dicom", value_name = "UID")]
    pub dicoms: Vec<String>,

    /// HL7v2 message id to import (repeatable)
    #[arg(long = "hl7", value_name = "MESSAGE_ID")]
    pub hl7s: Vec<String>,

    /// FHIR resource reference `Type/id` to import (repeatable)
    #[arg(long = "fhir", value_name = "REFERENCE")]
    pub fhirs: Vec<String>,

    /// Write the per-item summary as JSON to this file
    #[arg(long, value_name = "PATH")]
    pub summary: Option<PathBuf>,
}

impl ImportArgs {
    /// References from the file plus any given on the command line
    pub fn collect_references(&self) -> crate::domain::Result<ObjectReferences> {
        let mut references = match &self.references {
            Some(path) => ObjectReferences::from_file(path)?,
            None => ObjectReferences::default(),
        };
        references.dicoms.extend(self.dicoms.iter().cloned());
        references.hl7s.extend(self.hl7s.iter().cloned());
        references.fhirs.extend(self.fhirs.iter().cloned());
        Ok(references)
    }

    /// Execute the import command
    pub async fn execute(
        &self,
        config_path: &str,
        shutdown_signal: watch::Receiver<bool>,
    ) -> anyhow::Result<i32> {
        tracing::info!("Starting import command");

        let config = match load_config(config_path) {
            Ok(config) => config,
            Err(e) => {
                tracing::error!(error = %e, "Failed to load configuration");
                eprintln!("Configuration error: {e}");
                return Ok(2);
            }
        };

        let references = match self.collect_references() {
            Ok(references) => references,
            Err(e) => {
                tracing::error!(error = %e, "Failed to read object references");
                eprintln!("Failed to read object references: {e}");
                return Ok(2);
            }
        };
        if references.is_empty() {
            eprintln!("Nothing to import: no object references given");
            return Ok(2);
        }

        tracing::info!("Creating import coordinator");
        let coordinator = match ImportCoordinator::from_config(&config, shutdown_signal).await {
            Ok(c) => c,
            Err(e) => {
                tracing::error!(error = %e, "Failed to create import coordinator");
                eprintln!("Failed to initialize import: {e}");
                return Ok(4);
            }
        };

        println!("🚀 Starting import...");
        println!();

        let summary = match coordinator.run(&references).await {
            Ok(s) => s,
            Err(e) => {
                tracing::error!(error = %e, "Import failed");
                eprintln!("Import failed: {e}");
                return Ok(5);
            }
        };

        print_summary(&summary);

        if let Some(path) = &self.summary {
            std::fs::write(path, serde_json::to_string_pretty(&summary)?)?;
            println!("Summary written to {}", path.display());
        }

        Ok(exit_code(&summary))
    }
}

fn print_summary(summary: &ImportSummary) {
    println!();
    println!("📊 Import Summary:");
    println!("  Total Items: {}", summary.total());
    println!("  Imported: {}", summary.imported);
    println!("  Skipped: {}", summary.skipped);
    println!("  Failed: {}", summary.failed);
    println!("  Duration: {:.2}s", summary.duration.as_secs_f64());
    println!();

    for item in &summary.items {
        let detail = match &item.status {
            ItemStatus::Imported { uploads, .. } => format!("{uploads} file(s)"),
            ItemStatus::Skipped { reason } => reason.clone(),
            ItemStatus::Failed {
                error_type,
                reason,
                uploaded,
            } if !uploaded.is_empty() => {
                format!("{error_type:?}: {reason} ({} archive(s) uploaded)", uploaded.len())
            }
            ItemStatus::Failed {
                error_type, reason, ..
            } => format!("{error_type:?}: {reason}"),
        };
        println!(
            "  {:<5} {:<9} {}  {}",
            item.kind.as_str(),
            item.status.label(),
            item.key,
            detail
        );
    }
    println!();
}

/// Exit code for a finished run
pub fn exit_code(summary: &ImportSummary) -> i32 {
    if summary.interrupted {
        println!("⚠️  Import interrupted. Items not yet processed were left untouched.");
        tracing::info!("Import interrupted by user signal");
        130
    } else if summary.is_successful() {
        println!("✅ Import completed successfully!");
        0
    } else {
        println!("⚠️  Import completed with failures");
        1
    }
}
