//! Domain models and types for hcimport.
//!
//! This module contains the core domain models and error types shared by
//! every layer of the importer.
//!
//! # Overview
//!
//! The domain layer provides:
//! - **Strongly-typed identifiers** ([`NodeId`], [`MasterCode`], [`SeriesKey`], [`ResourceRef`])
//! - **The canonical metadata tree** ([`CanonicalMetadata`])
//! - **Identity and hierarchy models** ([`SubjectIdentity`], [`HierarchyNode`], [`Project`])
//! - **Error types** ([`ImportError`], [`UpstreamServiceError`])
//! - **Result type alias** ([`Result`])
//!
//! # Error Handling
//!
//! All fallible operations return [`Result<T, ImportError>`]:
//!
//! ```rust
//! use hcimport::domain::{ImportError, Result};
//!
//! fn example() -> Result<()> {
//!     let config = hcimport::config::ImportConfig::from_file("hcimport.toml")?;
//!     Ok(())
//! }
//! ```

pub mod errors;
pub mod hierarchy;
pub mod identity;
pub mod ids;
pub mod metadata;
pub mod result;

// Re-export commonly used types for convenience
pub use errors::{ImportError, UpstreamServiceError};
pub use hierarchy::{HierarchyLevel, HierarchyNode, LookupPath, Project, ResolvedPath, SubjectRecord};
pub use identity::SubjectIdentity;
pub use ids::{is_dicom_uid, MasterCode, MessageId, NodeId, ResourceRef, SeriesKey};
pub use metadata::{
    AcquisitionMetadata, CanonicalMetadata, FileEntry, SessionMetadata, Sex, SubjectMetadata,
    SubjectType,
};
pub use result::Result;
