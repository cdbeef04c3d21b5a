//! Subject identity resolution
//!
//! Exchanges the item's identity fields for a master code, then looks for
//! subjects of the project already carrying that code.

use crate::adapters::identity::IdentityService;
use crate::adapters::platform::DestinationPlatform;
use crate::config::MergePolicy;
use crate::domain::{
    CanonicalMetadata, ImportError, MasterCode, Project, Result, SubjectIdentity, SubjectMetadata,
    SubjectRecord,
};
use serde_json::{Map, Value};

/// Fields an established subject keeps under [`MergePolicy::PreserveExisting`]
pub const PROTECTED_FIELDS: [&str; 6] = ["code", "firstname", "lastname", "sex", "ethnicity", "type"];

/// Outcome of subject resolution for one import item
#[derive(Debug, Clone, PartialEq)]
pub struct SubjectResolution {
    pub master_code: MasterCode,
    /// The single subject already carrying the master code, if any
    pub existing: Option<SubjectRecord>,
    /// Subject fields after merging; the create payload for a new subject
    pub payload: Map<String, Value>,
}

impl SubjectResolution {
    /// Entries of the payload that differ from what the existing subject holds
    ///
    /// Empty for new subjects.
    pub fn changes(&self) -> Map<String, Value> {
        let Some(existing) = &self.existing else {
            return Map::new();
        };
        self.payload
            .iter()
            .filter(|(key, value)| existing.fields.get(*key) != Some(*value))
            .map(|(key, value)| (key.clone(), value.clone()))
            .collect()
    }
}

/// Resolves subjects against the identity service and the project
pub struct SubjectResolver<'a> {
    identity: &'a dyn IdentityService,
    platform: &'a dyn DestinationPlatform,
    merge_policy: MergePolicy,
}

impl<'a> SubjectResolver<'a> {
    pub fn new(
        identity: &'a dyn IdentityService,
        platform: &'a dyn DestinationPlatform,
        merge_policy: MergePolicy,
    ) -> Self {
        Self {
            identity,
            platform,
            merge_policy,
        }
    }

    /// Resolves `identity` within `project`
    ///
    /// Injects the master code into `metadata` and, under
    /// `PreserveExisting`, trims subject fields the existing subject already
    /// holds.
    ///
    /// # Errors
    ///
    /// `AmbiguousIdentity` when more than one subject carries the code;
    /// nothing is created or updated in that case.
    pub async fn resolve(
        &self,
        identity: &SubjectIdentity,
        project: &Project,
        metadata: &mut CanonicalMetadata,
    ) -> Result<SubjectResolution> {
        let master_code = self.identity.master_code(identity).await?;
        metadata.set_master_code(master_code.as_str());

        let mut matches = self
            .platform
            .find_subjects_by_master_code(&project.id, &master_code)
            .await?;
        if matches.len() > 1 {
            return Err(ImportError::AmbiguousIdentity {
                master_code: master_code.to_string(),
                matches: matches.len(),
            });
        }
        let existing = matches.pop();

        let subject = metadata.subject_mut();
        if let (Some(existing), MergePolicy::PreserveExisting) = (&existing, self.merge_policy) {
            preserve_existing(subject, existing);
        }

        let payload = match serde_json::to_value(&*subject)? {
            Value::Object(map) => map,
            _ => Map::new(),
        };

        tracing::debug!(
            master_code = %master_code,
            existing = existing.as_ref().map(|s| s.id.as_str()),
            "Subject resolved"
        );

        Ok(SubjectResolution {
            master_code,
            existing,
            payload,
        })
    }
}

/// Drops fresh values for protected fields the existing subject already holds
fn preserve_existing(subject: &mut SubjectMetadata, existing: &SubjectRecord) {
    for key in PROTECTED_FIELDS {
        if !existing.has_value(key) {
            continue;
        }
        match key {
            "code" => subject.code = None,
            "firstname" => subject.firstname = None,
            "lastname" => subject.lastname = None,
            "sex" => subject.sex = None,
            "ethnicity" => subject.ethnicity = None,
            "type" => subject.subject_type = None,
            _ => {}
        }
    }
}
