// hcimport - Healthcare store to research platform importer
// Copyright (c) 2025 hcimport Contributors
// Licensed under the MIT License

//! # hcimport - healthcare data store importer
//!
//! hcimport pulls imaging series (DICOM), HL7v2 messages and FHIR resources
//! out of a cloud healthcare dataset and files them into a research
//! platform's project / subject / session / acquisition hierarchy.
//!
//! ## Overview
//!
//! For every import item the library:
//! - **Fetches** the record from the healthcare store
//! - **Packages** imaging series into one archive per acquisition, with the
//!   canonical metadata embedded in the archive comment
//! - **Normalizes** the record into a canonical metadata tree
//! - **Resolves** the subject through a master code issued by an identity
//!   service, then looks up or creates the session and acquisition
//! - **Uploads** the artifact with a JSON metadata sidecar
//!
//! ## Architecture
//!
//! - [`cli`] - Command-line interface and argument parsing
//! - [`core`] - Import logic (sources, normalize, packaging, resolve, import)
//! - [`adapters`] - Healthcare store, destination platform, identity service
//! - [`domain`] - Canonical metadata, identifiers, hierarchy types, errors
//! - [`config`] - Configuration management
//! - [`logging`] - Structured logging and per-item spans
//!
//! ## Quick Start
//!
//! ```rust,no_run
//! use hcimport::config::ImportConfig;
//! use hcimport::core::import::{ImportCoordinator, ObjectReferences};
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let config = ImportConfig::from_file("hcimport.toml")?;
//!     let (_tx, shutdown) = tokio::sync::watch::channel(false);
//!     let coordinator = ImportCoordinator::from_config(&config, shutdown).await?;
//!
//!     let references = ObjectReferences {
//!         hl7s: vec!["msg-1".to_string()],
//!         ..Default::default()
//!     };
//!     let summary = coordinator.run(&references).await?;
//!
//!     println!("Imported {} of {} items", summary.imported, summary.total());
//!     Ok(())
//! }
//! ```
//!
//! ## Offline Packaging
//!
//! Packaging and normalization need no network access:
//!
//! ```rust,no_run
//! use hcimport::core::packaging::{archive_digest, read_archive_metadata, SeriesPackager};
//! use std::path::Path;
//!
//! # fn example() -> Result<(), Box<dyn std::error::Error>> {
//! let archives = SeriesPackager::default().pack(Path::new("/data/series"))?;
//! for (path, metadata) in &archives {
//!     assert_eq!(&read_archive_metadata(path)?, &metadata.without_patient_id());
//!     println!("{} {}", archive_digest(path)?, path.display());
//! }
//! # Ok(())
//! # }
//! ```
//!
//! ## Error Handling
//!
//! Library calls return [`domain::ImportError`]. Within a batch, errors are
//! caught per item and recorded in the
//! [`ImportSummary`](core::import::ImportSummary); unsupported or missing
//! references are soft skips rather than failures.

pub mod adapters;
pub mod cli;
pub mod config;
pub mod core;
pub mod domain;
pub mod logging;
