//! Identity and hierarchy resolution
//!
//! - [`subject`] - master code exchange, deduplication and merge policy
//! - [`hierarchy`] - subject/session/acquisition lookup-or-create
//! - [`conflict`] - what to do when a concurrent importer wins a create

pub mod conflict;
pub mod hierarchy;
pub mod subject;

pub use conflict::{ConflictPolicy, NodeResolution};
pub use hierarchy::HierarchyResolver;
pub use subject::{SubjectResolution, SubjectResolver, PROTECTED_FIELDS};
