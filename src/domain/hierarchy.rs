//! Destination hierarchy node types
//!
//! The destination platform owns a four-level tree below a group:
//! project, subject, session and acquisition. This crate reads and creates
//! nodes but never deletes them.

use super::ids::NodeId;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use std::fmt;

/// Level tag of a hierarchy node
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum HierarchyLevel {
    Group,
    Project,
    Subject,
    Session,
    Acquisition,
}

impl HierarchyLevel {
    /// Collection segment used in platform REST paths
    pub fn collection(&self) -> &'static str {
        match self {
            HierarchyLevel::Group => "groups",
            HierarchyLevel::Project => "projects",
            HierarchyLevel::Subject => "subjects",
            HierarchyLevel::Session => "sessions",
            HierarchyLevel::Acquisition => "acquisitions",
        }
    }
}

impl fmt::Display for HierarchyLevel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            HierarchyLevel::Group => "group",
            HierarchyLevel::Project => "project",
            HierarchyLevel::Subject => "subject",
            HierarchyLevel::Session => "session",
            HierarchyLevel::Acquisition => "acquisition",
        };
        write!(f, "{name}")
    }
}

/// A resolved node: opaque id plus level tag
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct HierarchyNode {
    pub id: NodeId,
    pub level: HierarchyLevel,
}

impl HierarchyNode {
    pub fn new(id: NodeId, level: HierarchyLevel) -> Self {
        Self { id, level }
    }
}

impl fmt::Display for HierarchyNode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}", self.level, self.id)
    }
}

/// The fixed destination project
#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct Project {
    #[serde(rename = "_id")]
    pub id: NodeId,
    pub group: String,
    #[serde(default)]
    pub label: Option<String>,
}

/// An existing subject as stored on the platform
///
/// The stored fields are kept as a raw JSON map because curators may add
/// fields this crate never models.
#[derive(Debug, Clone, PartialEq)]
pub struct SubjectRecord {
    pub id: NodeId,
    pub fields: Map<String, Value>,
}

impl SubjectRecord {
    /// Builds a record from a platform subject document
    pub fn from_document(mut document: Map<String, Value>) -> Result<Self, String> {
        let id = match document.remove("_id") {
            Some(Value::String(id)) => NodeId::new(id)?,
            _ => return Err("Subject document has no _id".to_string()),
        };
        Ok(Self {
            id,
            fields: document,
        })
    }

    /// Whether the stored subject holds a non-empty value for `key`
    pub fn has_value(&self, key: &str) -> bool {
        match self.fields.get(key) {
            None | Some(Value::Null) => false,
            Some(Value::String(s)) => !s.is_empty(),
            Some(_) => true,
        }
    }
}

/// Node ids resolved for one import item
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ResolvedPath {
    pub subject: NodeId,
    pub session: NodeId,
    pub acquisition: Option<NodeId>,
}

impl ResolvedPath {
    /// Node at the requested level, if resolved
    pub fn node(&self, level: HierarchyLevel) -> Option<HierarchyNode> {
        let id = match level {
            HierarchyLevel::Subject => Some(&self.subject),
            HierarchyLevel::Session => Some(&self.session),
            HierarchyLevel::Acquisition => self.acquisition.as_ref(),
            HierarchyLevel::Group | HierarchyLevel::Project => None,
        }?;
        Some(HierarchyNode::new(id.clone(), level))
    }
}

/// Deterministic path used to look a node up by labels
///
/// Rendered as `group/<id:project>/<id:subject>/session[/acquisition]`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LookupPath {
    segments: Vec<String>,
}

impl LookupPath {
    /// Path to a session under a known subject
    pub fn session(project: &Project, subject: &NodeId, session_label: &str) -> Self {
        Self {
            segments: vec![
                project.group.clone(),
                format!("<id:{}>", project.id),
                format!("<id:{subject}>"),
                session_label.to_string(),
            ],
        }
    }

    /// Extends a session path with an acquisition label
    pub fn acquisition(mut self, acquisition_label: &str) -> Self {
        self.segments.push(acquisition_label.to_string());
        self
    }

    pub fn segments(&self) -> &[String] {
        &self.segments
    }
}

impl fmt::Display for LookupPath {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.segments.join("/"))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn project() -> Project {
        Project {
            id: NodeId::new("p1").unwrap(),
            group: "radiology".to_string(),
            label: None,
        }
    }

    #[test]
    fn test_lookup_path_rendering() {
        let subject = NodeId::new("s1").unwrap();
        let path = LookupPath::session(&project(), &subject, "HL7_MRN_2018-07-10");
        assert_eq!(path.to_string(), "radiology/<id:p1>/<id:s1>/HL7_MRN_2018-07-10");

        let path = path.acquisition("ORU");
        assert_eq!(path.segments().len(), 5);
        assert!(path.to_string().ends_with("/ORU"));
    }

    #[test]
    fn test_subject_record_from_document() {
        let doc = json!({"_id": "s9", "code": "ex1", "firstname": ""});
        let record = SubjectRecord::from_document(doc.as_object().unwrap().clone()).unwrap();
        assert_eq!(record.id.as_str(), "s9");
        assert!(record.has_value("code"));
        assert!(!record.has_value("firstname"));
        assert!(!record.has_value("lastname"));
    }

    #[test]
    fn test_subject_record_requires_id() {
        let doc = json!({"code": "ex1"});
        assert!(SubjectRecord::from_document(doc.as_object().unwrap().clone()).is_err());
    }

    #[test]
    fn test_resolved_path_node() {
        let path = ResolvedPath {
            subject: NodeId::new("s").unwrap(),
            session: NodeId::new("x").unwrap(),
            acquisition: None,
        };
        assert_eq!(
            path.node(HierarchyLevel::Session).unwrap().to_string(),
            "session:x"
        );
        assert!(path.node(HierarchyLevel::Acquisition).is_none());
    }

    #[test]
    fn test_project_deserialize() {
        let project: Project =
            serde_json::from_value(json!({"_id": "p1", "group": "g", "label": "Study"})).unwrap();
        assert_eq!(project.id.as_str(), "p1");
        assert_eq!(project.label.as_deref(), Some("Study"));
    }
}
