//! Healthcare data store integration
//!
//! Source of every import item: imaging series (DICOMweb), HL7v2 messages
//! and FHIR resources.

pub mod client;
pub mod models;

pub use client::HttpHealthcareStore;
pub use models::UidField;

use crate::domain::{MessageId, ResourceRef, Result, SeriesKey};
use async_trait::async_trait;
use std::path::{Path, PathBuf};

/// Read-only access to the healthcare data store
#[async_trait]
pub trait HealthcareStore: Send + Sync {
    /// Searches series whose `field` equals `uid`
    async fn search_series(&self, field: UidField, uid: &str) -> Result<Vec<SeriesKey>>;

    /// Writes every instance of a series into `dir`, one Part-10 file per
    /// instance named by its SOP Instance UID
    async fn retrieve_series(&self, key: &SeriesKey, dir: &Path) -> Result<Vec<PathBuf>>;

    /// Fetches one HL7v2 message document (raw `data` is base64)
    async fn get_message(&self, id: &MessageId) -> Result<serde_json::Value>;

    /// Reads one FHIR resource
    async fn read_resource(&self, reference: &ResourceRef) -> Result<serde_json::Value>;
}
