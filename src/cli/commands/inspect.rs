//! Inspect command implementation
//!
//! Prints the metadata embedded in an imaging archive, its members and its
//! digest.

use crate::core::packaging::{archive_digest, list_members, read_archive_metadata};
use clap::Args;
use std::path::PathBuf;

/// Arguments for the inspect command
#[derive(Args, Debug)]
pub struct InspectArgs {
    /// Archive to inspect
    #[arg(value_name = "ARCHIVE")]
    pub archive: PathBuf,

    /// Also list archive members
    #[arg(long)]
    pub members: bool,
}

impl InspectArgs {
    /// Execute the inspect command
    pub async fn execute(&self) -> anyhow::Result<i32> {
        tracing::info!(archive = %self.archive.display(), "Inspecting archive");

        let metadata = match read_archive_metadata(&self.archive) {
            Ok(metadata) => metadata,
            Err(e) => {
                eprintln!("❌ Cannot read archive metadata: {e}");
                return Ok(1);
            }
        };

        println!("Archive: {}", self.archive.display());
        println!("SHA-256: {}", archive_digest(&self.archive)?);
        println!();
        println!("{}", serde_json::to_string_pretty(&metadata)?);

        if self.members {
            println!();
            println!("Members:");
            for member in list_members(&self.archive)? {
                let modified = member
                    .modified
                    .map(|ts| ts.format("%Y-%m-%d %H:%M:%S").to_string())
                    .unwrap_or_else(|| "-".to_string());
                println!("  {:>10}  {}  {}", member.size, modified, member.name);
            }
        }
        Ok(0)
    }
}
