//! Subject, session and acquisition node resolution
//!
//! Nodes are resolved top-down under the fixed project. A session found on
//! revisit is reused as is and never updated.

use super::conflict::ConflictPolicy;
use super::subject::SubjectResolution;
use crate::adapters::platform::DestinationPlatform;
use crate::domain::{
    CanonicalMetadata, HierarchyLevel, ImportError, LookupPath, NodeId, Project, ResolvedPath,
    Result,
};
use serde_json::{json, Map, Value};

/// Looks up or creates the hierarchy nodes of one import item
pub struct HierarchyResolver<'a> {
    platform: &'a dyn DestinationPlatform,
    project: &'a Project,
    conflict: ConflictPolicy,
}

impl<'a> HierarchyResolver<'a> {
    pub fn new(
        platform: &'a dyn DestinationPlatform,
        project: &'a Project,
        conflict: ConflictPolicy,
    ) -> Self {
        Self {
            platform,
            project,
            conflict,
        }
    }

    /// Resolves subject, session and (when `metadata` has one) acquisition
    ///
    /// # Errors
    ///
    /// A validation error when the session or acquisition has neither label
    /// nor uid to look it up by; upstream errors from the platform.
    pub async fn resolve_path(
        &self,
        subject: &SubjectResolution,
        metadata: &CanonicalMetadata,
    ) -> Result<ResolvedPath> {
        let subject_id = self.resolve_subject(subject).await?;

        let session_label = metadata.session_path_label().ok_or_else(|| {
            ImportError::Validation("session has neither a label nor a uid".to_string())
        })?;
        let session_path = LookupPath::session(self.project, &subject_id, session_label);

        let mut payload = to_map(&metadata.session)?;
        payload.remove("subject");
        payload
            .entry("label")
            .or_insert_with(|| json!(session_label));
        payload.insert("project".to_string(), json!(self.project.id));
        payload.insert("subject".to_string(), json!({ "_id": subject_id }));
        let session = self
            .lookup_or_create(&session_path, HierarchyLevel::Session, Value::Object(payload))
            .await?;

        let acquisition = match &metadata.acquisition {
            Some(acquisition) => {
                let label = metadata.acquisition_path_label().ok_or_else(|| {
                    ImportError::Validation(
                        "acquisition has neither a label nor a uid".to_string(),
                    )
                })?;
                let path = session_path.clone().acquisition(label);

                let mut payload = to_map(acquisition)?;
                // files are attached by upload, never at creation
                payload.remove("files");
                payload.entry("label").or_insert_with(|| json!(label));
                payload.insert("session".to_string(), json!(session));
                Some(
                    self.lookup_or_create(&path, HierarchyLevel::Acquisition, Value::Object(payload))
                        .await?,
                )
            }
            None => None,
        };

        Ok(ResolvedPath {
            subject: subject_id,
            session,
            acquisition,
        })
    }

    async fn resolve_subject(&self, subject: &SubjectResolution) -> Result<NodeId> {
        if let Some(existing) = &subject.existing {
            let changes = subject.changes();
            if !changes.is_empty() {
                tracing::debug!(
                    subject = %existing.id,
                    fields = ?changes.keys().collect::<Vec<_>>(),
                    "Updating subject"
                );
                self.platform
                    .update_node(HierarchyLevel::Subject, &existing.id, &Value::Object(changes))
                    .await?;
            }
            return Ok(existing.id.clone());
        }

        let mut payload = subject.payload.clone();
        payload.insert("project".to_string(), json!(self.project.id));
        let payload = Value::Object(payload);

        let platform = self.platform;
        let project = &self.project.id;
        let code = &subject.master_code;
        let payload = &payload;
        let resolution = self
            .conflict
            .create_or_relookup(
                move || platform.create_node(HierarchyLevel::Subject, payload),
                move || async move {
                    let mut found = platform.find_subjects_by_master_code(project, code).await?;
                    if found.len() > 1 {
                        return Err(ImportError::AmbiguousIdentity {
                            master_code: code.to_string(),
                            matches: found.len(),
                        });
                    }
                    Ok(found.pop().map(|s| s.id))
                },
            )
            .await?;
        log_resolution(HierarchyLevel::Subject, &resolution.id, resolution.created);
        Ok(resolution.id)
    }

    async fn lookup_or_create(
        &self,
        path: &LookupPath,
        level: HierarchyLevel,
        payload: Value,
    ) -> Result<NodeId> {
        let platform = self.platform;
        let payload = &payload;
        let resolution = self
            .conflict
            .lookup_or_create(
                move || platform.lookup(path),
                move || platform.create_node(level, payload),
            )
            .await?;
        log_resolution(level, &resolution.id, resolution.created);
        Ok(resolution.id)
    }
}

fn to_map<T: serde::Serialize>(value: &T) -> Result<Map<String, Value>> {
    match serde_json::to_value(value)? {
        Value::Object(map) => Ok(map),
        other => Err(ImportError::Serialization(format!(
            "expected an object, got {other}"
        ))),
    }
}

fn log_resolution(level: HierarchyLevel, id: &NodeId, created: bool) {
    if created {
        tracing::info!(level = %level, id = %id, "Created node");
    } else {
        tracing::debug!(level = %level, id = %id, "Reusing node");
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::SessionMetadata;

    #[test]
    fn test_to_map_omits_absent_fields() {
        let session = SessionMetadata {
            label: Some("Visit".to_string()),
            ..Default::default()
        };
        let map = to_map(&session).unwrap();
        assert_eq!(map.len(), 1);
        assert_eq!(map["label"], json!("Visit"));
    }

    #[test]
    fn test_to_map_rejects_non_objects() {
        assert!(matches!(
            to_map(&"text"),
            Err(ImportError::Serialization(_))
        ));
    }
}
