//! Canonical metadata tree
//!
//! Every source adapter converges on [`CanonicalMetadata`]: a session group
//! with the subject group nested under `session.subject`, an optional
//! acquisition group and, for imaging items only, the raw `patient_id`.
//!
//! Every field is optional and skipped during serialization when unset. An
//! absent field means "leave the destination default alone"; `null` is never
//! written.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

/// Administrative sex of a subject
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Sex {
    Female,
    Male,
    Other,
    Unknown,
}

impl Sex {
    pub fn as_str(&self) -> &'static str {
        match self {
            Sex::Female => "female",
            Sex::Male => "male",
            Sex::Other => "other",
            Sex::Unknown => "unknown",
        }
    }
}

/// Kind of subject
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SubjectType {
    Human,
    Animal,
}

impl SubjectType {
    pub fn as_str(&self) -> &'static str {
        match self {
            SubjectType::Human => "human",
            SubjectType::Animal => "animal",
        }
    }
}

/// Subject group of the metadata tree
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct SubjectMetadata {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub code: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub firstname: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub lastname: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub sex: Option<Sex>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub ethnicity: Option<String>,
    #[serde(rename = "type", skip_serializing_if = "Option::is_none")]
    pub subject_type: Option<SubjectType>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub master_code: Option<String>,
}

impl SubjectMetadata {
    pub fn is_empty(&self) -> bool {
        *self == SubjectMetadata::default()
    }
}

/// Session group of the metadata tree
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct SessionMetadata {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub uid: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub label: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub timestamp: Option<DateTime<Utc>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub timezone: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub operator: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub subject: Option<SubjectMetadata>,
}

/// One file entry attached to an acquisition
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FileEntry {
    pub name: String,
    #[serde(rename = "type")]
    pub file_type: String,
    #[serde(default, skip_serializing_if = "Map::is_empty")]
    pub info: Map<String, Value>,
}

impl FileEntry {
    pub fn new(name: impl Into<String>, file_type: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            file_type: file_type.into(),
            info: Map::new(),
        }
    }
}

/// Acquisition group of the metadata tree
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct AcquisitionMetadata {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub uid: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub label: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub timestamp: Option<DateTime<Utc>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub timezone: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub instrument: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub measurement: Option<String>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub files: Vec<FileEntry>,
}

impl AcquisitionMetadata {
    pub fn is_empty(&self) -> bool {
        *self == AcquisitionMetadata::default()
    }
}

/// The unified subject/session/acquisition tree produced per import item
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct CanonicalMetadata {
    /// Raw source patient identifier; imaging only, never uploaded
    #[serde(skip_serializing_if = "Option::is_none")]
    pub patient_id: Option<String>,
    #[serde(default)]
    pub session: SessionMetadata,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub acquisition: Option<AcquisitionMetadata>,
}

impl CanonicalMetadata {
    /// Subject group, if any subject field was populated
    pub fn subject(&self) -> Option<&SubjectMetadata> {
        self.session.subject.as_ref()
    }

    /// Subject group, created empty on first access
    pub fn subject_mut(&mut self) -> &mut SubjectMetadata {
        self.session.subject.get_or_insert_with(SubjectMetadata::default)
    }

    /// Acquisition group, created empty on first access
    pub fn acquisition_mut(&mut self) -> &mut AcquisitionMetadata {
        self.acquisition.get_or_insert_with(AcquisitionMetadata::default)
    }

    /// Injects the master code issued by the identity service
    pub fn set_master_code(&mut self, code: impl Into<String>) {
        self.subject_mut().master_code = Some(code.into());
    }

    /// Appends a file entry to the acquisition group
    pub fn push_file(&mut self, entry: FileEntry) {
        self.acquisition_mut().files.push(entry);
    }

    /// Drops empty groups so they are omitted rather than written as `{}`
    pub fn prune(&mut self) {
        if self.session.subject.as_ref().is_some_and(|s| s.is_empty()) {
            self.session.subject = None;
        }
        if self.acquisition.as_ref().is_some_and(|a| a.is_empty()) {
            self.acquisition = None;
        }
    }

    /// Returns a copy with the raw patient identifier removed
    pub fn without_patient_id(&self) -> Self {
        Self {
            patient_id: None,
            ..self.clone()
        }
    }

    /// Label used for the session step of a hierarchy lookup path
    ///
    /// Falls back to the session uid when no label was derived.
    pub fn session_path_label(&self) -> Option<&str> {
        self.session
            .label
            .as_deref()
            .or(self.session.uid.as_deref())
    }

    /// Label used for the acquisition step of a hierarchy lookup path
    pub fn acquisition_path_label(&self) -> Option<&str> {
        self.acquisition
            .as_ref()
            .and_then(|a| a.label.as_deref().or(a.uid.as_deref()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;
    use serde_json::json;

    #[test]
    fn test_absent_fields_are_omitted() {
        let mut metadata = CanonicalMetadata::default();
        metadata.session.label = Some("S1".to_string());
        metadata.subject_mut().code = Some("ex1".to_string());

        let value = serde_json::to_value(&metadata).unwrap();
        assert_eq!(
            value,
            json!({"session": {"label": "S1", "subject": {"code": "ex1"}}})
        );
    }

    #[test]
    fn test_timestamp_serialization() {
        let mut metadata = CanonicalMetadata::default();
        metadata.session.timestamp = Some(Utc.with_ymd_and_hms(2018, 7, 10, 6, 54, 58).unwrap());
        let value = serde_json::to_value(&metadata).unwrap();
        assert_eq!(value["session"]["timestamp"], "2018-07-10T06:54:58Z");
    }

    #[test]
    fn test_enum_serialization() {
        let mut metadata = CanonicalMetadata::default();
        metadata.subject_mut().sex = Some(Sex::Female);
        metadata.subject_mut().subject_type = Some(SubjectType::Animal);
        let value = serde_json::to_value(&metadata).unwrap();
        assert_eq!(value["session"]["subject"]["sex"], "female");
        assert_eq!(value["session"]["subject"]["type"], "animal");
    }

    #[test]
    fn test_prune_removes_empty_groups() {
        let mut metadata = CanonicalMetadata::default();
        metadata.subject_mut();
        metadata.acquisition_mut();
        metadata.prune();
        assert!(metadata.session.subject.is_none());
        assert!(metadata.acquisition.is_none());
    }

    #[test]
    fn test_files_omitted_when_empty() {
        let mut metadata = CanonicalMetadata::default();
        metadata.acquisition_mut().label = Some("ORU".to_string());
        let value = serde_json::to_value(&metadata).unwrap();
        assert_eq!(value["acquisition"], json!({"label": "ORU"}));

        metadata.push_file(FileEntry::new("a.dicom.zip", "dicom"));
        let value = serde_json::to_value(&metadata).unwrap();
        assert_eq!(
            value["acquisition"]["files"],
            json!([{"name": "a.dicom.zip", "type": "dicom"}])
        );
    }

    #[test]
    fn test_path_labels_fall_back_to_uid() {
        let mut metadata = CanonicalMetadata::default();
        metadata.session.uid = Some("1.2.3".to_string());
        metadata.acquisition_mut().uid = Some("1.2.3.4".to_string());
        assert_eq!(metadata.session_path_label(), Some("1.2.3"));
        assert_eq!(metadata.acquisition_path_label(), Some("1.2.3.4"));

        metadata.session.label = Some("Brain".to_string());
        assert_eq!(metadata.session_path_label(), Some("Brain"));
    }

    #[test]
    fn test_round_trip_through_json() {
        let mut metadata = CanonicalMetadata {
            patient_id: Some("P1".to_string()),
            ..Default::default()
        };
        metadata.session.uid = Some("1.2".to_string());
        metadata.set_master_code("M1");
        let text = serde_json::to_string(&metadata).unwrap();
        let parsed: CanonicalMetadata = serde_json::from_str(&text).unwrap();
        assert_eq!(parsed, metadata);
        assert!(parsed.without_patient_id().patient_id.is_none());
    }
}
