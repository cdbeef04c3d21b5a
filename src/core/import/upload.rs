//! Attaching packaged artifacts to resolved nodes

use crate::adapters::platform::{DestinationPlatform, UploadFile};
use crate::core::sources::{FhirRecord, Hl7Message};
use crate::domain::{HierarchyLevel, ImportError, ResolvedPath, Result};
use serde_json::{json, Map, Value};
use std::fs;
use std::path::Path;

/// File type recorded in the sidecar of each artifact kind
pub const DICOM_SIDECAR_TYPE: &str = "dicom";
pub const HL7_SIDECAR_TYPE: &str = "text";
pub const FHIR_SIDECAR_TYPE: &str = "source code";

/// A file plus its metadata sidecar, ready to attach
#[derive(Debug, Clone, PartialEq)]
pub struct Artifact {
    pub file: UploadFile,
    pub sidecar: Value,
}

impl Artifact {
    /// Reads an imaging archive; the sidecar records its digest
    pub fn imaging(archive: &Path, digest: &str) -> Result<Self> {
        let name = archive
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .ok_or_else(|| {
                ImportError::Validation(format!("{} has no file name", archive.display()))
            })?;
        Ok(Self {
            file: UploadFile::new(name, fs::read(archive)?),
            sidecar: sidecar(DICOM_SIDECAR_TYPE, json!({ "archive_sha256": digest })),
        })
    }

    /// Decoded message text named after the control id
    pub fn message(message: &Hl7Message) -> Result<Self> {
        Ok(Self {
            file: UploadFile::new(message_file_name(message.control_id()), message.body()?),
            sidecar: sidecar(HL7_SIDECAR_TYPE, Value::Object(message.sidecar_info())),
        })
    }

    /// Pretty-printed resource JSON
    pub fn resource(record: &FhirRecord) -> Result<Self> {
        let resource = record.resource();
        Ok(Self {
            file: UploadFile::new(
                resource_file_name(resource.resource_type(), resource.id()),
                record.body()?,
            ),
            sidecar: sidecar(FHIR_SIDECAR_TYPE, Value::Object(record.sidecar_info())),
        })
    }
}

fn sidecar(file_type: &str, info: Value) -> Value {
    let mut sidecar = Map::new();
    sidecar.insert("type".to_string(), json!(file_type));
    sidecar.insert("info".to_string(), info);
    Value::Object(sidecar)
}

/// `<control-id>.hl7.txt`
pub fn message_file_name(control_id: &str) -> String {
    format!("{control_id}.hl7.txt")
}

/// `patient.fhir.json` / `encounter.fhir.json`, `<id>.fhir.json` for the rest
pub fn resource_file_name(resource_type: &str, id: &str) -> String {
    match resource_type {
        "Patient" | "Encounter" => format!("{}.fhir.json", resource_type.to_lowercase()),
        _ => format!("{id}.fhir.json"),
    }
}

/// Uploads artifacts to a level of a resolved path
pub struct Uploader<'a> {
    platform: &'a dyn DestinationPlatform,
}

impl<'a> Uploader<'a> {
    pub fn new(platform: &'a dyn DestinationPlatform) -> Self {
        Self { platform }
    }

    /// Attaches `artifact` to the node at `level`
    ///
    /// # Errors
    ///
    /// A validation error when `path` has no node at `level`, e.g. an
    /// acquisition upload for an item resolved without an acquisition.
    pub async fn upload(
        &self,
        path: &ResolvedPath,
        level: HierarchyLevel,
        artifact: Artifact,
    ) -> Result<()> {
        let node = path.node(level).ok_or_else(|| {
            ImportError::Validation(format!("no {level} node resolved for upload"))
        })?;
        let name = artifact.file.name.clone();
        let size = artifact.file.content.len();

        self.platform
            .upload_file(&node, artifact.file, &artifact.sidecar)
            .await?;

        tracing::info!(node = %node, file = %name, bytes = size, "Uploaded file");
        Ok(())
    }
}
