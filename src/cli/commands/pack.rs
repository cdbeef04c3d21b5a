//! Pack command implementation
//!
//! Packages a local directory of imaging files into per-acquisition
//! archives without touching any remote service.

use crate::config::{load_config, ImportSettings};
use crate::core::packaging::{archive_digest, SeriesPackager};
use crate::core::sources::IdentificationPolicy;
use clap::Args;
use std::path::PathBuf;

/// Arguments for the pack command
#[derive(Args, Debug)]
pub struct PackArgs {
    /// Directory holding the object files of one series
    #[arg(value_name = "DIR")]
    pub directory: PathBuf,

    /// Directory for the archives (defaults to the parent of DIR)
    #[arg(short, long, value_name = "DIR")]
    pub output: Option<PathBuf>,

    /// Read identification settings from the configuration file
    #[arg(long)]
    pub use_config: bool,
}

impl PackArgs {
    /// Execute the pack command
    ///
    /// The object files are moved out of the input directory, or left in
    /// place when packing fails.
    pub async fn execute(&self, config_path: &str) -> anyhow::Result<i32> {
        tracing::info!(directory = %self.directory.display(), "Packing series");

        let settings = if self.use_config {
            match load_config(config_path) {
                Ok(config) => config.import,
                Err(e) => {
                    eprintln!("Configuration error: {e}");
                    return Ok(2);
                }
            }
        } else {
            ImportSettings::default()
        };

        let packager = SeriesPackager::new(IdentificationPolicy::from(&settings));
        let result = match &self.output {
            Some(out_dir) => packager.pack_into(&self.directory, out_dir),
            None => packager.pack(&self.directory),
        };
        let archives = match result {
            Ok(archives) => archives,
            Err(e) => {
                tracing::error!(error = %e, "Packing failed");
                eprintln!("❌ Packing failed: {e}");
                return Ok(1);
            }
        };

        if archives.is_empty() {
            println!("No object files found in {}", self.directory.display());
            return Ok(0);
        }

        println!("📦 Archives:");
        for path in archives.keys() {
            println!("  {}  {}", archive_digest(path)?, path.display());
        }
        Ok(0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_pack_empty_directory() {
        let tmp = tempfile::tempdir().unwrap();
        let series = tmp.path().join("series");
        std::fs::create_dir(&series).unwrap();

        let args = PackArgs {
            directory: series,
            output: None,
            use_config: false,
        };
        assert_eq!(args.execute("unused.toml").await.unwrap(), 0);
    }

    #[tokio::test]
    async fn test_pack_malformed_file_fails() {
        let tmp = tempfile::tempdir().unwrap();
        std::fs::write(tmp.path().join("broken"), b"not dicom").unwrap();

        let args = PackArgs {
            directory: tmp.path().to_path_buf(),
            output: Some(tmp.path().to_path_buf()),
            use_config: false,
        };
        assert_eq!(args.execute("unused.toml").await.unwrap(), 1);
    }
}
