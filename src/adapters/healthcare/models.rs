//! Wire models for the healthcare data store
//!
//! QIDO-RS search results arrive as DICOM JSON: an array of objects keyed by
//! eight-digit hexadecimal tags, each holding `{"vr": .., "Value": [..]}`.

use crate::domain::SeriesKey;
use serde::Deserialize;
use std::collections::BTreeMap;

pub const STUDY_INSTANCE_UID: &str = "0020000D";
pub const SERIES_INSTANCE_UID: &str = "0020000E";
pub const SOP_INSTANCE_UID: &str = "00080018";

/// Attribute a UID search filters on
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum UidField {
    StudyInstanceUid,
    SeriesInstanceUid,
}

impl UidField {
    /// Both fields, in search order
    pub const ALL: [UidField; 2] = [UidField::StudyInstanceUid, UidField::SeriesInstanceUid];

    /// QIDO query parameter name
    pub fn query_key(&self) -> &'static str {
        match self {
            UidField::StudyInstanceUid => "StudyInstanceUID",
            UidField::SeriesInstanceUid => "SeriesInstanceUID",
        }
    }
}

/// One element of a DICOM JSON dataset
#[derive(Debug, Clone, Deserialize)]
pub struct DicomJsonElement {
    #[serde(default)]
    pub vr: Option<String>,
    #[serde(rename = "Value", default)]
    pub value: Vec<serde_json::Value>,
}

/// A DICOM JSON dataset as returned by QIDO-RS
#[derive(Debug, Clone, Deserialize)]
#[serde(transparent)]
pub struct DicomJsonDataset(pub BTreeMap<String, DicomJsonElement>);

impl DicomJsonDataset {
    /// First value of `tag` as a string, if present
    pub fn string(&self, tag: &str) -> Option<&str> {
        self.0
            .get(tag)
            .and_then(|element| element.value.first())
            .and_then(|value| value.as_str())
            .filter(|s| !s.is_empty())
    }

    /// (study, series) key of a series-level result
    pub fn series_key(&self) -> Option<SeriesKey> {
        let study = self.string(STUDY_INSTANCE_UID)?;
        let series = self.string(SERIES_INSTANCE_UID)?;
        SeriesKey::new(study, series).ok()
    }

    pub fn sop_instance_uid(&self) -> Option<&str> {
        self.string(SOP_INSTANCE_UID)
    }
}

/// Parses a QIDO response body; an empty body means no matches
pub fn parse_datasets(body: &str) -> serde_json::Result<Vec<DicomJsonDataset>> {
    if body.trim().is_empty() {
        return Ok(Vec::new());
    }
    serde_json::from_str(body)
}
