//! Shared fixtures for integration tests
//!
//! In-memory fakes of the healthcare store, destination platform and
//! identity service, plus a generator for small Part-10 files.

#![allow(dead_code)]

use async_trait::async_trait;
use dicom_core::{DataElement, PrimitiveValue, VR};
use dicom_dictionary_std::tags;
use dicom_object::{FileMetaTableBuilder, InMemDicomObject};
use hcimport::adapters::healthcare::{HealthcareStore, UidField};
use hcimport::adapters::identity::IdentityService;
use hcimport::adapters::platform::{DestinationPlatform, UploadFile};
use hcimport::config::{secret_string, SecretString};
use hcimport::domain::{
    HierarchyLevel, HierarchyNode, ImportError, LookupPath, MasterCode, MessageId, NodeId,
    Project, ResourceRef, Result, SeriesKey, SubjectIdentity, SubjectRecord,
    UpstreamServiceError,
};
use serde_json::{json, Map, Value};
use std::collections::{BTreeMap, HashMap};
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Mutex;

pub const PROJECT_ID: &str = "proj-1";
pub const GROUP: &str = "research";

const EXPLICIT_VR_LITTLE_ENDIAN: &str = "1.2.840.10008.1.2.1";
const MR_IMAGE_STORAGE: &str = "1.2.840.10008.5.1.4.1.1.4";

/// Attributes of one generated imaging instance
#[derive(Debug, Clone)]
pub struct Instance {
    pub sop_uid: String,
    pub patient_id: String,
    pub patient_name: String,
    pub sex: String,
    pub study_uid: String,
    pub series_uid: String,
    pub acquisition_number: Option<i64>,
    pub series_description: String,
    pub study_date: String,
    pub study_time: String,
}

impl Instance {
    pub fn new(sop_uid: &str, series_uid: &str) -> Self {
        Self {
            sop_uid: sop_uid.to_string(),
            patient_id: "PAT-1".to_string(),
            patient_name: "Doe^Jane".to_string(),
            sex: "F".to_string(),
            study_uid: "1.2.3".to_string(),
            series_uid: series_uid.to_string(),
            acquisition_number: None,
            series_description: "T1".to_string(),
            study_date: "20190102".to_string(),
            study_time: "101500".to_string(),
        }
    }

    pub fn studied_at(mut self, date: &str, time: &str) -> Self {
        self.study_date = date.to_string();
        self.study_time = time.to_string();
        self
    }

    pub fn acquisition(mut self, number: i64) -> Self {
        self.acquisition_number = Some(number);
        self
    }

    pub fn key(&self) -> SeriesKey {
        SeriesKey::new(&self.study_uid, &self.series_uid).unwrap()
    }

    /// Writes the instance as a Part-10 file
    pub fn write(&self, path: &Path) {
        let mut obj = InMemDicomObject::new_empty();
        let mut put = |tag, vr, value: &str| {
            obj.put(DataElement::new(tag, vr, PrimitiveValue::from(value)));
        };
        put(tags::SOP_CLASS_UID, VR::UI, MR_IMAGE_STORAGE);
        put(tags::SOP_INSTANCE_UID, VR::UI, &self.sop_uid);
        put(tags::PATIENT_ID, VR::LO, &self.patient_id);
        put(tags::PATIENT_NAME, VR::PN, &self.patient_name);
        put(tags::PATIENT_SEX, VR::CS, &self.sex);
        put(tags::STUDY_INSTANCE_UID, VR::UI, &self.study_uid);
        put(tags::STUDY_DESCRIPTION, VR::LO, "Brain");
        put(tags::STUDY_DATE, VR::DA, &self.study_date);
        put(tags::STUDY_TIME, VR::TM, &self.study_time);
        put(tags::SERIES_INSTANCE_UID, VR::UI, &self.series_uid);
        put(tags::SERIES_DESCRIPTION, VR::LO, &self.series_description);
        put(tags::MODALITY, VR::CS, "MR");
        if let Some(n) = self.acquisition_number {
            put(tags::ACQUISITION_NUMBER, VR::IS, &n.to_string());
        }

        let file = obj
            .with_meta(
                FileMetaTableBuilder::new()
                    .transfer_syntax(EXPLICIT_VR_LITTLE_ENDIAN)
                    .media_storage_sop_class_uid(MR_IMAGE_STORAGE)
                    .media_storage_sop_instance_uid(&self.sop_uid),
            )
            .unwrap();
        file.write_to_file(path).unwrap();
    }
}

/// Healthcare store serving fixed series, messages and resources
#[derive(Default)]
pub struct FakeStore {
    pub series: BTreeMap<SeriesKey, Vec<Instance>>,
    pub messages: HashMap<String, Value>,
    pub resources: HashMap<String, Value>,
    pub failing_uids: Vec<String>,
}

impl FakeStore {
    pub fn with_instances(mut self, instances: Vec<Instance>) -> Self {
        for instance in instances {
            self.series.entry(instance.key()).or_default().push(instance);
        }
        self
    }

    pub fn with_message(mut self, id: &str, message: Value) -> Self {
        self.messages.insert(id.to_string(), message);
        self
    }

    pub fn with_resource(mut self, resource: Value) -> Self {
        let key = format!(
            "{}/{}",
            resource["resourceType"].as_str().unwrap(),
            resource["id"].as_str().unwrap()
        );
        self.resources.insert(key, resource);
        self
    }
}

#[async_trait]
impl HealthcareStore for FakeStore {
    async fn search_series(&self, field: UidField, uid: &str) -> Result<Vec<SeriesKey>> {
        if self.failing_uids.iter().any(|u| u == uid) {
            return Err(UpstreamServiceError::ServerError {
                status: 503,
                message: "unavailable".to_string(),
            }
            .into());
        }
        Ok(self
            .series
            .keys()
            .filter(|key| match field {
                UidField::StudyInstanceUid => key.study_uid() == uid,
                UidField::SeriesInstanceUid => key.series_uid() == uid,
            })
            .cloned()
            .collect())
    }

    async fn retrieve_series(&self, key: &SeriesKey, dir: &Path) -> Result<Vec<PathBuf>> {
        let instances = self
            .series
            .get(key)
            .ok_or_else(|| UpstreamServiceError::NotFound(key.series_uid().to_string()))?;
        Ok(instances
            .iter()
            .map(|instance| {
                let path = dir.join(&instance.sop_uid);
                instance.write(&path);
                path
            })
            .collect())
    }

    async fn get_message(&self, id: &MessageId) -> Result<Value> {
        self.messages
            .get(id.as_str())
            .cloned()
            .ok_or_else(|| UpstreamServiceError::NotFound(id.to_string()).into())
    }

    async fn read_resource(&self, reference: &ResourceRef) -> Result<Value> {
        self.resources
            .get(&reference.to_string())
            .cloned()
            .ok_or_else(|| UpstreamServiceError::NotFound(reference.to_string()).into())
    }
}

/// One recorded upload
#[derive(Debug, Clone)]
pub struct Upload {
    pub node: HierarchyNode,
    pub name: String,
    pub content: Vec<u8>,
    pub metadata: Value,
}

#[derive(Default)]
struct PlatformState {
    subjects: Vec<(NodeId, Map<String, Value>)>,
    paths: HashMap<Vec<String>, NodeId>,
    session_paths: HashMap<NodeId, Vec<String>>,
    created: Vec<(HierarchyLevel, Value)>,
    updates: Vec<(HierarchyLevel, NodeId, Value)>,
    uploads: Vec<Upload>,
    race_next_create: Option<HierarchyLevel>,
    upload_limit: Option<usize>,
    next_id: usize,
}

/// Destination platform keeping its hierarchy in memory
pub struct FakePlatform {
    project: Project,
    state: Mutex<PlatformState>,
}

impl Default for FakePlatform {
    fn default() -> Self {
        Self {
            project: project(),
            state: Mutex::new(PlatformState::default()),
        }
    }
}

pub fn project() -> Project {
    Project {
        id: NodeId::new(PROJECT_ID).unwrap(),
        group: GROUP.to_string(),
        label: Some("Study".to_string()),
    }
}

impl FakePlatform {
    /// Seeds an existing subject
    pub fn add_subject(&self, fields: Value) -> NodeId {
        let mut state = self.state.lock().unwrap();
        let id = next_id(&mut state, "subject");
        let Value::Object(map) = fields else {
            panic!("subject fields must be an object")
        };
        state.subjects.push((id.clone(), map));
        id
    }

    /// The next create at `level` loses a race with another importer
    pub fn race_next_create(&self, level: HierarchyLevel) {
        self.state.lock().unwrap().race_next_create = Some(level);
    }

    /// Rejects every upload after the first `accepted`
    pub fn fail_uploads_after(&self, accepted: usize) {
        self.state.lock().unwrap().upload_limit = Some(accepted);
    }

    pub fn subjects(&self) -> Vec<(NodeId, Map<String, Value>)> {
        self.state.lock().unwrap().subjects.clone()
    }

    pub fn created(&self, level: HierarchyLevel) -> Vec<Value> {
        self.state
            .lock()
            .unwrap()
            .created
            .iter()
            .filter(|(l, _)| *l == level)
            .map(|(_, payload)| payload.clone())
            .collect()
    }

    pub fn updates(&self) -> Vec<(HierarchyLevel, NodeId, Value)> {
        self.state.lock().unwrap().updates.clone()
    }

    pub fn uploads(&self) -> Vec<Upload> {
        self.state.lock().unwrap().uploads.clone()
    }

    fn store_node(state: &mut PlatformState, level: HierarchyLevel, payload: &Value) -> Result<NodeId> {
        let label = payload["label"].as_str().unwrap_or_default().to_string();
        match level {
            HierarchyLevel::Subject => {
                let id = next_id(state, "subject");
                let mut fields = payload.as_object().cloned().unwrap_or_default();
                fields.remove("project");
                state.subjects.push((id.clone(), fields));
                Ok(id)
            }
            HierarchyLevel::Session => {
                let subject = payload["subject"]["_id"].as_str().unwrap_or_default();
                let path = vec![
                    GROUP.to_string(),
                    format!("<id:{PROJECT_ID}>"),
                    format!("<id:{subject}>"),
                    label,
                ];
                let id = next_id(state, "session");
                state.paths.insert(path.clone(), id.clone());
                state.session_paths.insert(id.clone(), path);
                Ok(id)
            }
            HierarchyLevel::Acquisition => {
                let session = NodeId::new(payload["session"].as_str().unwrap_or_default())
                    .map_err(ImportError::Validation)?;
                let mut path = state
                    .session_paths
                    .get(&session)
                    .cloned()
                    .ok_or_else(|| ImportError::Validation("unknown session".to_string()))?;
                path.push(label);
                let id = next_id(state, "acquisition");
                state.paths.insert(path, id.clone());
                Ok(id)
            }
            other => Err(ImportError::Validation(format!("cannot create {other}"))),
        }
    }
}

fn next_id(state: &mut PlatformState, prefix: &str) -> NodeId {
    state.next_id += 1;
    NodeId::new(format!("{prefix}-{}", state.next_id)).unwrap()
}

#[async_trait]
impl DestinationPlatform for FakePlatform {
    async fn get_project(&self, project_id: &str) -> Result<Project> {
        if project_id == PROJECT_ID {
            Ok(self.project.clone())
        } else {
            Err(UpstreamServiceError::NotFound(project_id.to_string()).into())
        }
    }

    async fn find_subjects_by_master_code(
        &self,
        _project: &NodeId,
        code: &MasterCode,
    ) -> Result<Vec<SubjectRecord>> {
        let state = self.state.lock().unwrap();
        Ok(state
            .subjects
            .iter()
            .filter(|(_, fields)| fields.get("master_code") == Some(&json!(code.as_str())))
            .map(|(id, fields)| SubjectRecord {
                id: id.clone(),
                fields: fields.clone(),
            })
            .collect())
    }

    async fn lookup(&self, path: &LookupPath) -> Result<Option<NodeId>> {
        Ok(self.state.lock().unwrap().paths.get(path.segments()).cloned())
    }

    async fn create_node(&self, level: HierarchyLevel, payload: &Value) -> Result<NodeId> {
        let mut state = self.state.lock().unwrap();
        if state.race_next_create == Some(level) {
            state.race_next_create = None;
            Self::store_node(&mut state, level, payload)?;
            return Err(UpstreamServiceError::Conflict(format!("{level} already exists")).into());
        }
        let id = Self::store_node(&mut state, level, payload)?;
        state.created.push((level, payload.clone()));
        Ok(id)
    }

    async fn update_node(&self, level: HierarchyLevel, id: &NodeId, payload: &Value) -> Result<()> {
        let mut state = self.state.lock().unwrap();
        if level == HierarchyLevel::Subject {
            if let Some((_, fields)) = state.subjects.iter_mut().find(|(sid, _)| sid == id) {
                if let Value::Object(changes) = payload {
                    fields.extend(changes.clone());
                }
            }
        }
        state.updates.push((level, id.clone(), payload.clone()));
        Ok(())
    }

    async fn upload_file(
        &self,
        node: &HierarchyNode,
        file: UploadFile,
        metadata: &Value,
    ) -> Result<()> {
        let mut state = self.state.lock().unwrap();
        if state.upload_limit.is_some_and(|limit| state.uploads.len() >= limit) {
            return Err(UpstreamServiceError::ConnectionFailed(format!("upload of {}", file.name)).into());
        }
        state.uploads.push(Upload {
            node: node.clone(),
            name: file.name,
            content: file.content,
            metadata: metadata.clone(),
        });
        Ok(())
    }

    async fn fetch_access_token(&self, _token_id: &str) -> Result<SecretString> {
        Ok(secret_string("fake-token".to_string()))
    }
}

/// Identity service deriving codes deterministically from the identity
#[derive(Default)]
pub struct FakeIdentity {
    calls: AtomicUsize,
}

impl FakeIdentity {
    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl IdentityService for FakeIdentity {
    async fn master_code(&self, identity: &SubjectIdentity) -> Result<MasterCode> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        let code = match (&identity.patient_id, identity.use_patient_id) {
            (Some(id), true) => format!("MC-{id}"),
            _ => format!(
                "MC-{}-{}",
                identity.last_name.as_deref().unwrap_or_default(),
                identity.first_name.as_deref().unwrap_or_default()
            ),
        };
        MasterCode::new(code).map_err(ImportError::Validation)
    }
}

/// HL7v2 store document for an ADT message
pub fn hl7_message(control_id: &str, patient_id: &str) -> Value {
    json!({
        "name": format!("projects/p/messages/{control_id}"),
        "data": "TVNIfF5+XCZ8QURU",
        "sendTime": "2023-04-05T06:07:08Z",
        "messageType": "ADT",
        "parsedData": {"segments": [
            {"segmentId": "MSH", "fields": {"9": control_id}},
            {"segmentId": "PID", "fields": {
                "3": patient_id,
                "5.1": "Jane",
                "5.2": "Doe",
                "7": "19720417",
                "8": "F",
                "22": "N"
            }}
        ]}
    })
}

pub fn fhir_patient(id: &str, identifier: &str) -> Value {
    json!({
        "resourceType": "Patient",
        "id": id,
        "meta": {"lastUpdated": "2023-04-05T06:07:08Z"},
        "identifier": [{"value": identifier}],
        "name": [{"family": "Doe", "given": ["Jane"]}],
        "gender": "female",
        "birthDate": "1972-04-17"
    })
}

pub fn fhir_observation(id: &str, patient_id: &str) -> Value {
    json!({
        "resourceType": "Observation",
        "id": id,
        "meta": {"lastUpdated": "2023-04-06T08:00:00Z"},
        "subject": {"reference": format!("Patient/{patient_id}")},
        "code": {"coding": [{
            "system": "http://loinc.org",
            "code": "15074-8",
            "display": "Glucose [Moles/volume] in Blood"
        }]},
        "valueQuantity": {"value": 6.3, "unit": "mmol/l"}
    })
}
