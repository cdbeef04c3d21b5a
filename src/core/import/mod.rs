//! Batch import orchestration
//!
//! - [`coordinator`] - walks the object references item by item
//! - [`upload`] - builds artifacts and attaches them to resolved nodes
//! - [`summary`] - per-item outcomes and batch totals

pub mod coordinator;
pub mod summary;
pub mod upload;

pub use coordinator::{ImportCoordinator, ObjectReferences};
pub use summary::{ImportSummary, ItemErrorType, ItemKind, ItemOutcome, ItemStatus};
pub use upload::{message_file_name, resource_file_name, Artifact, Uploader};
