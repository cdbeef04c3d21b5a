//! Import summary and reporting
//!
//! One outcome per import item. A batch never collapses into a single
//! pass/fail: every item's result is kept with its identifying key.

use crate::domain::ImportError;
use serde::Serialize;
use std::fmt;
use std::time::Duration;

/// Kind of import item
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum ItemKind {
    /// One imaging series
    Dicom,
    /// One HL7v2 message
    Hl7,
    /// One FHIR resource
    Fhir,
}

impl ItemKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            ItemKind::Dicom => "dicom",
            ItemKind::Hl7 => "hl7",
            ItemKind::Fhir => "fhir",
        }
    }
}

impl fmt::Display for ItemKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Type of item error
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ItemErrorType {
    /// Unparsable source record
    MalformedSource,
    /// More than one subject carries the master code
    AmbiguousIdentity,
    /// Network, authentication or service failure
    Upstream,
    /// Archive could not be written or read
    Archive,
    /// Local file system error
    Io,
    /// Configuration error
    Configuration,
    /// Missing or inconsistent metadata
    Validation,
    /// Anything else
    Unknown,
}

impl From<&ImportError> for ItemErrorType {
    fn from(error: &ImportError) -> Self {
        match error {
            ImportError::MalformedSourceRecord(_) => ItemErrorType::MalformedSource,
            ImportError::AmbiguousIdentity { .. } => ItemErrorType::AmbiguousIdentity,
            ImportError::Upstream(_) => ItemErrorType::Upstream,
            ImportError::Archive(_) => ItemErrorType::Archive,
            ImportError::Io(_) => ItemErrorType::Io,
            ImportError::Configuration(_) => ItemErrorType::Configuration,
            ImportError::Validation(_) => ItemErrorType::Validation,
            _ => ItemErrorType::Unknown,
        }
    }
}

/// Result of one import item
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "status", rename_all = "lowercase")]
pub enum ItemStatus {
    /// Files were attached to the hierarchy
    Imported {
        uploads: usize,
        /// SHA-256 of each uploaded archive (imaging only)
        digests: Vec<String>,
    },
    /// Excluded from output without failing the batch
    Skipped { reason: String },
    Failed {
        error_type: ItemErrorType,
        reason: String,
        /// SHA-256 of each archive that reached the platform before the failure
        #[serde(skip_serializing_if = "Vec::is_empty")]
        uploaded: Vec<String>,
    },
}

impl ItemStatus {
    pub fn imported(uploads: usize) -> Self {
        ItemStatus::Imported {
            uploads,
            digests: Vec::new(),
        }
    }

    /// Skipped for soft-skip errors, failed otherwise
    pub fn from_error(error: &ImportError) -> Self {
        if error.is_soft_skip() {
            ItemStatus::Skipped {
                reason: error.to_string(),
            }
        } else {
            ItemStatus::Failed {
                error_type: ItemErrorType::from(error),
                reason: error.to_string(),
                uploaded: Vec::new(),
            }
        }
    }

    /// Failed after some archives of the item were already uploaded
    ///
    /// Never a skip: part of the item is on the platform.
    pub fn partially_uploaded(error: &ImportError, uploaded: Vec<String>) -> Self {
        ItemStatus::Failed {
            error_type: ItemErrorType::from(error),
            reason: error.to_string(),
            uploaded,
        }
    }

    pub fn label(&self) -> &'static str {
        match self {
            ItemStatus::Imported { .. } => "imported",
            ItemStatus::Skipped { .. } => "skipped",
            ItemStatus::Failed { .. } => "failed",
        }
    }
}

/// Outcome of one item, keyed by series UID, message id or resource reference
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ItemOutcome {
    pub kind: ItemKind,
    pub key: String,
    #[serde(flatten)]
    pub status: ItemStatus,
}

impl ItemOutcome {
    pub fn new(kind: ItemKind, key: impl Into<String>, status: ItemStatus) -> Self {
        Self {
            kind,
            key: key.into(),
            status,
        }
    }
}

/// Summary of an import run
#[derive(Debug, Clone, Default, Serialize)]
pub struct ImportSummary {
    pub items: Vec<ItemOutcome>,
    pub imported: usize,
    pub skipped: usize,
    pub failed: usize,
    #[serde(serialize_with = "serialize_secs")]
    pub duration: Duration,
    /// Set when a shutdown signal stopped the run early
    pub interrupted: bool,
}

impl ImportSummary {
    pub fn new() -> Self {
        Self::default()
    }

    /// Set the duration
    pub fn with_duration(mut self, duration: Duration) -> Self {
        self.duration = duration;
        self
    }

    /// Adds an outcome and updates the counters
    pub fn record(&mut self, outcome: ItemOutcome) {
        match outcome.status {
            ItemStatus::Imported { .. } => self.imported += 1,
            ItemStatus::Skipped { .. } => self.skipped += 1,
            ItemStatus::Failed { .. } => self.failed += 1,
        }
        self.items.push(outcome);
    }

    pub fn total(&self) -> usize {
        self.items.len()
    }

    /// Every item was imported or skipped and the run was not interrupted
    pub fn is_successful(&self) -> bool {
        self.failed == 0 && !self.interrupted
    }

    pub fn failures(&self) -> impl Iterator<Item = &ItemOutcome> {
        self.items
            .iter()
            .filter(|o| matches!(o.status, ItemStatus::Failed { .. }))
    }

    /// Log the summary
    pub fn log_summary(&self) {
        tracing::info!(
            total = self.total(),
            imported = self.imported,
            skipped = self.skipped,
            failed = self.failed,
            interrupted = self.interrupted,
            duration_secs = self.duration.as_secs(),
            "Import completed"
        );

        for outcome in self.failures() {
            if let ItemStatus::Failed {
                error_type,
                reason,
                uploaded,
            } = &outcome.status
            {
                tracing::warn!(
                    kind = %outcome.kind,
                    key = %outcome.key,
                    error_type = ?error_type,
                    reason = %reason,
                    uploaded = uploaded.len(),
                    "Import item failed"
                );
            }
        }
    }
}

fn serialize_secs<S: serde::Serializer>(duration: &Duration, serializer: S) -> Result<S::Ok, S::Error> {
    serializer.serialize_f64(duration.as_secs_f64())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::UpstreamServiceError;
    use serde_json::json;

    #[test]
    fn test_summary_counters() {
        let mut summary = ImportSummary::new();
        summary.record(ItemOutcome::new(ItemKind::Dicom, "1.2.3", ItemStatus::imported(2)));
        summary.record(ItemOutcome::new(
            ItemKind::Fhir,
            "Observation/1",
            ItemStatus::from_error(&ImportError::MissingReference("no subject".to_string())),
        ));
        summary.record(ItemOutcome::new(
            ItemKind::Hl7,
            "m1",
            ItemStatus::from_error(&UpstreamServiceError::Timeout("x".to_string()).into()),
        ));

        assert_eq!(summary.total(), 3);
        assert_eq!((summary.imported, summary.skipped, summary.failed), (1, 1, 1));
        assert!(!summary.is_successful());
        assert_eq!(summary.failures().count(), 1);
    }

    #[test]
    fn test_interrupted_run_is_not_successful() {
        let mut summary = ImportSummary::new();
        assert!(summary.is_successful());
        summary.interrupted = true;
        assert!(!summary.is_successful());
    }

    #[test]
    fn test_error_types() {
        let err = ImportError::AmbiguousIdentity {
            master_code: "MC".to_string(),
            matches: 2,
        };
        assert_eq!(ItemErrorType::from(&err), ItemErrorType::AmbiguousIdentity);
        assert_eq!(
            ItemErrorType::from(&ImportError::MalformedSourceRecord("x".to_string())),
            ItemErrorType::MalformedSource
        );
    }

    #[test]
    fn test_outcome_serialization() {
        let outcome = ItemOutcome::new(
            ItemKind::Fhir,
            "Observation/1",
            ItemStatus::Skipped {
                reason: "no subject".to_string(),
            },
        );
        assert_eq!(
            serde_json::to_value(&outcome).unwrap(),
            json!({"kind": "fhir", "key": "Observation/1", "status": "skipped", "reason": "no subject"})
        );
    }

    #[test]
    fn test_partial_upload_is_a_failure_listing_uploads() {
        let err = ImportError::MissingReference("gone".to_string());
        let status = ItemStatus::partially_uploaded(&err, vec!["abc".to_string()]);
        assert_eq!(status.label(), "failed");

        let value = serde_json::to_value(ItemOutcome::new(ItemKind::Dicom, "1.2", status)).unwrap();
        assert_eq!(value["uploaded"], json!(["abc"]));

        let plain = ItemStatus::from_error(&UpstreamServiceError::Timeout("x".to_string()).into());
        let value = serde_json::to_value(ItemOutcome::new(ItemKind::Dicom, "1.2", plain)).unwrap();
        assert!(value.get("uploaded").is_none());
    }
}
