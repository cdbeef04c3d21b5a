//! Domain identifier types with validation
//!
//! Newtype wrappers for the identifiers that flow between the healthcare
//! data store, the identity service and the destination platform. Each type
//! rejects empty values so that a blank id never reaches a network call.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// Opaque destination-platform node identifier
///
/// Identifies a project, subject, session or acquisition. The platform owns
/// these ids; this crate only reads them back from lookup and create calls.
///
/// # Examples
///
/// ```
/// use hcimport::domain::ids::NodeId;
///
/// let id = NodeId::new("5db9e2c5d2a9f7002a8d9f11").unwrap();
/// assert_eq!(id.as_str(), "5db9e2c5d2a9f7002a8d9f11");
/// ```
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct NodeId(String);

impl NodeId {
    /// Creates a new NodeId from a string
    ///
    /// # Returns
    ///
    /// Returns `Ok(NodeId)` if the id is non-empty, `Err` otherwise
    pub fn new(id: impl Into<String>) -> Result<Self, String> {
        let id = id.into();
        if id.trim().is_empty() {
            return Err("Node ID cannot be empty".to_string());
        }
        Ok(Self(id))
    }

    /// Returns the node id as a string slice
    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Consumes self and returns the inner String
    pub fn into_inner(self) -> String {
        self.0
    }
}

impl fmt::Display for NodeId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl FromStr for NodeId {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::new(s)
    }
}

impl AsRef<str> for NodeId {
    fn as_ref(&self) -> &str {
        &self.0
    }
}

/// Stable pseudonymous patient identifier issued by the identity service
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct MasterCode(String);

impl MasterCode {
    /// Creates a new MasterCode, rejecting blank codes
    pub fn new(code: impl Into<String>) -> Result<Self, String> {
        let code = code.into();
        if code.trim().is_empty() {
            return Err("Master code cannot be empty".to_string());
        }
        Ok(Self(code))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    pub fn into_inner(self) -> String {
        self.0
    }
}

impl fmt::Display for MasterCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl AsRef<str> for MasterCode {
    fn as_ref(&self) -> &str {
        &self.0
    }
}

/// Longest UID the DICOM UI value representation allows
const MAX_UID_LEN: usize = 64;

/// True for a DICOM UID: dot-separated digit components, at most 64 characters
///
/// UIDs name files and directories, so anything else is refused before it
/// reaches a path.
pub fn is_dicom_uid(uid: &str) -> bool {
    uid.len() <= MAX_UID_LEN
        && uid
            .split('.')
            .all(|part| !part.is_empty() && part.bytes().all(|b| b.is_ascii_digit()))
}

/// Identifies one imaging series inside the healthcare data store
///
/// Series are addressed by the pair of study and series instance UIDs.
/// Ordering is lexicographic on (study, series) so that search results
/// can be deduplicated and processed in a stable order.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct SeriesKey {
    study_uid: String,
    series_uid: String,
}

impl SeriesKey {
    /// Creates a new SeriesKey
    ///
    /// # Arguments
    ///
    /// * `study_uid` - StudyInstanceUID of the series
    /// * `series_uid` - SeriesInstanceUID of the series
    pub fn new(study_uid: impl Into<String>, series_uid: impl Into<String>) -> Result<Self, String> {
        let study_uid = study_uid.into();
        let series_uid = series_uid.into();
        if study_uid.trim().is_empty() {
            return Err("Study UID cannot be empty".to_string());
        }
        if series_uid.trim().is_empty() {
            return Err("Series UID cannot be empty".to_string());
        }
        if !is_dicom_uid(&series_uid) {
            return Err(format!("Series UID '{series_uid}' is not a DICOM UID"));
        }
        Ok(Self {
            study_uid,
            series_uid,
        })
    }

    pub fn study_uid(&self) -> &str {
        &self.study_uid
    }

    pub fn series_uid(&self) -> &str {
        &self.series_uid
    }
}

impl fmt::Display for SeriesKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{}", self.study_uid, self.series_uid)
    }
}

/// HL7v2 message identifier inside the message store
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct MessageId(String);

impl MessageId {
    pub fn new(id: impl Into<String>) -> Result<Self, String> {
        let id = id.into();
        if id.trim().is_empty() {
            return Err("Message ID cannot be empty".to_string());
        }
        Ok(Self(id))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for MessageId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl FromStr for MessageId {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::new(s)
    }
}

/// Reference to a structured resource in `Type/id` form
///
/// # Examples
///
/// ```
/// use hcimport::domain::ids::ResourceRef;
/// use std::str::FromStr;
///
/// let reference = ResourceRef::from_str("Observation/obs-1").unwrap();
/// assert_eq!(reference.resource_type(), "Observation");
/// assert_eq!(reference.id(), "obs-1");
/// assert_eq!(reference.to_string(), "Observation/obs-1");
/// ```
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct ResourceRef {
    resource_type: String,
    id: String,
}

impl ResourceRef {
    /// Creates a reference from its type and id parts
    pub fn new(resource_type: impl Into<String>, id: impl Into<String>) -> Result<Self, String> {
        let resource_type = resource_type.into();
        let id = id.into();
        if resource_type.trim().is_empty() {
            return Err("Resource type cannot be empty".to_string());
        }
        if id.trim().is_empty() || id.contains('/') {
            return Err(format!("Invalid resource id: '{id}'"));
        }
        Ok(Self { resource_type, id })
    }

    pub fn resource_type(&self) -> &str {
        &self.resource_type
    }

    pub fn id(&self) -> &str {
        &self.id
    }

    /// Whether the reference points at a Patient resource
    pub fn is_patient(&self) -> bool {
        self.resource_type == "Patient"
    }
}

impl fmt::Display for ResourceRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{}", self.resource_type, self.id)
    }
}

impl FromStr for ResourceRef {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.split_once('/') {
            Some((resource_type, id)) => Self::new(resource_type, id),
            None => Err(format!("Resource reference must be 'Type/id', got '{s}'")),
        }
    }
}

impl Serialize for ResourceRef {
    fn serialize<S: serde::Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(&self.to_string())
    }
}

impl<'de> Deserialize<'de> for ResourceRef {
    fn deserialize<D: serde::Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let s = String::deserialize(deserializer)?;
        s.parse().map_err(serde::de::Error::custom)
    }
}
