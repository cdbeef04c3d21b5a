//! Core import logic.
//!
//! # Modules
//!
//! - [`sources`] - imaging, messaging and structured-resource adapters
//! - [`normalize`] - field table and canonical metadata construction
//! - [`packaging`] - per-acquisition archives for imaging series
//! - [`resolve`] - subject identity and hierarchy node resolution
//! - [`import`] - coordinator, uploader and per-item summary
//!
//! # Import Workflow
//!
//! For every item of a batch:
//!
//! 1. **Fetch**: retrieve the series, message or resource from the store
//! 2. **Package** (imaging only): one archive per acquisition number
//! 3. **Normalize**: build the canonical subject/session/acquisition tree
//! 4. **Resolve subject**: exchange identity for a master code and dedupe
//! 5. **Resolve hierarchy**: look up or create session and acquisition
//! 6. **Upload**: attach the artifact with its metadata sidecar
//!
//! # Example
//!
//! ```rust,no_run
//! use hcimport::config::load_config;
//! use hcimport::core::import::{ImportCoordinator, ObjectReferences};
//!
//! # async fn example() -> Result<(), Box<dyn std::error::Error>> {
//! let config = load_config("hcimport.toml")?;
//! let references = ObjectReferences::from_file("refs.json")?;
//!
//! let (_shutdown_tx, shutdown_rx) = tokio::sync::watch::channel(false);
//! let coordinator = ImportCoordinator::from_config(&config, shutdown_rx).await?;
//!
//! let summary = coordinator.run(&references).await?;
//! println!("Imported: {}", summary.imported);
//! println!("Skipped: {}", summary.skipped);
//! println!("Failed: {}", summary.failed);
//! # Ok(())
//! # }
//! ```

pub mod import;
pub mod normalize;
pub mod packaging;
pub mod resolve;
pub mod sources;
