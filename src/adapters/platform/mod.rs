//! Destination platform integration
//!
//! The platform stores the project/subject/session/acquisition hierarchy
//! and the files attached to it.

pub mod client;
pub mod models;

pub use client::HttpPlatformClient;
pub use models::UploadFile;

use crate::config::SecretString;
use crate::domain::{
    HierarchyLevel, HierarchyNode, LookupPath, MasterCode, NodeId, Project, Result, SubjectRecord,
};
use async_trait::async_trait;
use serde_json::Value;

/// Operations this crate needs from the destination platform
///
/// Nodes are only ever read or created; nothing here deletes.
#[async_trait]
pub trait DestinationPlatform: Send + Sync {
    /// Resolves the destination project
    async fn get_project(&self, project_id: &str) -> Result<Project>;

    /// Subjects of `project` whose stored master code equals `code`
    async fn find_subjects_by_master_code(
        &self,
        project: &NodeId,
        code: &MasterCode,
    ) -> Result<Vec<SubjectRecord>>;

    /// Looks a node up by label path; `None` when nothing matches
    async fn lookup(&self, path: &LookupPath) -> Result<Option<NodeId>>;

    /// Creates a subject, session or acquisition
    ///
    /// A concurrent creator surfaces as an `UpstreamServiceError::Conflict`.
    async fn create_node(&self, level: HierarchyLevel, payload: &Value) -> Result<NodeId>;

    /// Updates fields of an existing node
    async fn update_node(&self, level: HierarchyLevel, id: &NodeId, payload: &Value) -> Result<()>;

    /// Attaches a file with its JSON metadata sidecar
    async fn upload_file(&self, node: &HierarchyNode, file: UploadFile, metadata: &Value)
        -> Result<()>;

    /// Exchanges a stored token id for an access token
    async fn fetch_access_token(&self, token_id: &str) -> Result<SecretString>;
}
