//! FHIR resource adapter
//!
//! Non-Patient resources are attached to their owning Patient through the
//! `subject` (or `patient`) reference. The Patient is fetched with a single
//! extra read; a Patient resource is its own patient and never triggers a
//! fetch, so resolution is bounded to one hop.

use super::codes::CodeTable;
use crate::adapters::healthcare::HealthcareStore;
use crate::core::normalize::{self, Field, FieldValue, SourceRecord};
use crate::domain::{
    CanonicalMetadata, HierarchyLevel, ImportError, ResourceRef, Result, Sex, SubjectIdentity,
    SubjectType,
};
use chrono::{DateTime, NaiveDate, Utc};
use serde::Serialize;
use serde_json::{json, Map, Value};

pub const PATIENT_ANIMAL_EXTENSION: &str =
    "http://hl7.org/fhir/StructureDefinition/patient-animal";
pub const LOINC_SYSTEM: &str = "http://loinc.org";

/// A resource as read from the FHIR store
#[derive(Debug, Clone)]
pub struct FhirResource {
    raw: Value,
    resource_type: String,
    id: String,
    last_updated: DateTime<Utc>,
}

impl FhirResource {
    /// # Errors
    ///
    /// Returns `MalformedSourceRecord` when `resourceType`, `id` or
    /// `meta.lastUpdated` is missing or unparsable.
    pub fn from_json(raw: Value) -> Result<Self> {
        let text = |pointer: &str| {
            raw.pointer(pointer)
                .and_then(Value::as_str)
                .filter(|s| !s.is_empty())
                .map(str::to_string)
                .ok_or_else(|| malformed(format!("resource has no {}", &pointer[1..])))
        };
        let resource_type = text("/resourceType")?;
        let id = text("/id")?;
        let last_updated = text("/meta/lastUpdated")?;
        let last_updated = DateTime::parse_from_rfc3339(&last_updated)
            .map_err(|e| malformed(format!("meta.lastUpdated '{last_updated}': {e}")))?
            .with_timezone(&Utc);

        Ok(Self {
            raw,
            resource_type,
            id,
            last_updated,
        })
    }

    pub fn resource_type(&self) -> &str {
        &self.resource_type
    }

    pub fn id(&self) -> &str {
        &self.id
    }

    pub fn is_patient(&self) -> bool {
        self.resource_type == "Patient"
    }

    pub fn raw(&self) -> &Value {
        &self.raw
    }

    /// Reference to the owning Patient
    ///
    /// A non-empty `subject.reference` takes precedence over `patient.reference`.
    ///
    /// # Errors
    ///
    /// `MissingReference` when neither is set, `UnsupportedReference` when the
    /// reference targets anything other than a Patient.
    pub fn patient_reference(&self) -> Result<ResourceRef> {
        let reference = ["/subject/reference", "/patient/reference"]
            .iter()
            .find_map(|p| {
                self.raw
                    .pointer(p)
                    .and_then(Value::as_str)
                    .filter(|r| !r.is_empty())
            })
            .ok_or_else(|| {
                ImportError::MissingReference(format!("{} has no subject", self.reference()))
            })?;

        let target: ResourceRef = reference.parse().map_err(|e| {
            ImportError::UnsupportedReference(format!("{reference} ({e})"))
        })?;
        if !target.is_patient() {
            return Err(ImportError::UnsupportedReference(format!(
                "subject type {} is not supported",
                target.resource_type()
            )));
        }
        Ok(target)
    }

    fn reference(&self) -> String {
        format!("{}/{}", self.resource_type, self.id)
    }
}

/// Subject fields taken from a Patient resource
#[derive(Debug, Clone, Default, PartialEq)]
pub struct PatientDetails {
    pub resource_id: String,
    pub patient_id: Option<String>,
    pub firstname: Option<String>,
    pub lastname: Option<String>,
    pub sex: Option<Sex>,
    pub subject_type: Option<SubjectType>,
    pub date_of_birth: Option<NaiveDate>,
}

impl PatientDetails {
    /// # Errors
    ///
    /// `MalformedSourceRecord` when the resource is not a Patient or its
    /// birth date is unparsable.
    pub fn from_patient(patient: &FhirResource) -> Result<Self> {
        if !patient.is_patient() {
            return Err(malformed(format!(
                "expected a Patient, got {}",
                patient.resource_type
            )));
        }
        let raw = &patient.raw;
        let non_empty = |v: Option<&Value>| {
            v.and_then(Value::as_str)
                .filter(|s| !s.is_empty())
                .map(str::to_string)
        };

        let firstname = raw.pointer("/name/0/given").and_then(Value::as_array).map(|given| {
            given
                .iter()
                .filter_map(Value::as_str)
                .collect::<Vec<_>>()
                .join(" ")
                .trim()
                .to_string()
        });

        let is_animal = raw
            .get("extension")
            .and_then(Value::as_array)
            .is_some_and(|exts| {
                exts.iter()
                    .any(|e| e.get("url").and_then(Value::as_str) == Some(PATIENT_ANIMAL_EXTENSION))
            });

        let date_of_birth = non_empty(raw.get("birthDate"))
            .map(|d| {
                NaiveDate::parse_from_str(&d, "%Y-%m-%d")
                    .map_err(|e| malformed(format!("birthDate '{d}': {e}")))
            })
            .transpose()?;

        Ok(Self {
            resource_id: patient.id.clone(),
            patient_id: non_empty(raw.pointer("/identifier/0/value")),
            firstname: firstname.filter(|s| !s.is_empty()),
            lastname: non_empty(raw.pointer("/name/0/family")),
            sex: raw.get("gender").and_then(Value::as_str).and_then(map_gender),
            subject_type: Some(if is_animal {
                SubjectType::Animal
            } else {
                SubjectType::Human
            }),
            date_of_birth,
        })
    }

    /// Patient identifier, or the Patient resource id when it has none
    pub fn label_id(&self) -> &str {
        self.patient_id.as_deref().unwrap_or(&self.resource_id)
    }
}

/// One coded measurement extracted from an Observation
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ObservationValue {
    pub value: Value,
    pub unit: Option<String>,
    pub last_updated: DateTime<Utc>,
}

/// A resource joined with its owning patient
#[derive(Debug, Clone)]
pub struct FhirRecord {
    resource: FhirResource,
    patient: PatientDetails,
    acquisition_label: String,
    extra_info: Map<String, Value>,
}

impl FhirRecord {
    /// Joins `resource` with `patient`
    ///
    /// `patient` is ignored for Patient resources and required otherwise.
    pub fn new(
        resource: FhirResource,
        patient: Option<&FhirResource>,
        codes: &dyn CodeTable,
    ) -> Result<Self> {
        let patient = if resource.is_patient() {
            PatientDetails::from_patient(&resource)?
        } else {
            let patient = patient.ok_or_else(|| {
                ImportError::MissingReference(format!("{} has no subject", resource.reference()))
            })?;
            PatientDetails::from_patient(patient)?
        };

        let mut acquisition_label = resource.resource_type.clone();
        let mut extra_info = Map::new();
        if resource.resource_type == "Observation" {
            if let Some(coding) = loinc_coding(&resource.raw) {
                let code = coding.get("code").and_then(Value::as_str).unwrap_or_default();
                let display = coding.get("display").and_then(Value::as_str).unwrap_or_default();
                // '/' would split the label into extra lookup path segments
                acquisition_label = format!("{} {}", code, display.replace('/', "_"))
                    .trim()
                    .to_string();

                if let Some(entry) = observation_entry(&resource, code, codes) {
                    extra_info.insert("observations".to_string(), json!([entry]));
                }
            }
        }

        Ok(Self {
            resource,
            patient,
            acquisition_label,
            extra_info,
        })
    }

    pub fn resource(&self) -> &FhirResource {
        &self.resource
    }

    pub fn patient(&self) -> &PatientDetails {
        &self.patient
    }

    pub fn extra_info(&self) -> &Map<String, Value> {
        &self.extra_info
    }

    /// Level the resource file is attached to
    pub fn placement(&self) -> HierarchyLevel {
        match self.resource.resource_type.as_str() {
            "Patient" => HierarchyLevel::Subject,
            "Encounter" => HierarchyLevel::Session,
            _ => HierarchyLevel::Acquisition,
        }
    }

    /// Canonical tree; Patient and Encounter items carry no acquisition
    pub fn metadata(&self) -> Result<CanonicalMetadata> {
        let mut metadata = normalize::normalize(self)?;
        if self.placement() != HierarchyLevel::Acquisition {
            metadata.acquisition = None;
        }
        Ok(metadata)
    }

    pub fn identity(&self) -> SubjectIdentity {
        SubjectIdentity::from_demographics(
            self.patient.patient_id.clone(),
            self.patient.firstname.clone(),
            self.patient.lastname.clone(),
            self.patient.date_of_birth,
        )
    }

    /// File info: the resource under `fhir` plus any extracted extras
    pub fn sidecar_info(&self) -> Map<String, Value> {
        let mut info = Map::new();
        info.insert("fhir".to_string(), self.resource.raw.clone());
        info.extend(self.extra_info.clone());
        info
    }

    /// Resource JSON with sorted keys and four-space indentation
    pub fn body(&self) -> Result<Vec<u8>> {
        let mut out = Vec::new();
        let formatter = serde_json::ser::PrettyFormatter::with_indent(b"    ");
        let mut serializer = serde_json::Serializer::with_formatter(&mut out, formatter);
        self.resource.raw.serialize(&mut serializer)?;
        Ok(out)
    }
}

impl SourceRecord for FhirRecord {
    fn field_value(&self, field: Field) -> Option<FieldValue> {
        let text = |s: &Option<String>| s.clone().map(FieldValue::Text);
        let patient = &self.patient;
        match field {
            Field::SubjectCode => patient
                .patient_id
                .as_ref()
                .map(|id| format!("ex{id}").into()),
            Field::SubjectFirstname => text(&patient.firstname),
            Field::SubjectLastname => text(&patient.lastname),
            Field::SubjectSex => patient.sex.map(FieldValue::Sex),
            Field::SubjectType => patient.subject_type.map(FieldValue::SubjectType),
            Field::SessionLabel => Some(
                format!(
                    "FHIR_{}_{}",
                    patient.label_id(),
                    self.resource.last_updated.format("%Y-%m-%d")
                )
                .into(),
            ),
            Field::SessionTimestamp | Field::AcquisitionTimestamp => {
                Some(self.resource.last_updated.into())
            }
            Field::AcquisitionLabel => Some(self.acquisition_label.clone().into()),
            _ => None,
        }
    }
}

/// Reads resources and their owning Patient from the store
pub struct FhirAdapter<'a> {
    store: &'a dyn HealthcareStore,
    codes: &'a dyn CodeTable,
}

impl<'a> FhirAdapter<'a> {
    pub fn new(store: &'a dyn HealthcareStore, codes: &'a dyn CodeTable) -> Self {
        Self { store, codes }
    }

    /// Fetches `reference` and, unless it is a Patient, its owning Patient
    ///
    /// # Errors
    ///
    /// Missing or non-Patient subject references are soft skips
    /// (`MissingReference`, `UnsupportedReference`).
    pub async fn load(&self, reference: &ResourceRef) -> Result<FhirRecord> {
        let resource = FhirResource::from_json(self.store.read_resource(reference).await?)?;
        if resource.is_patient() {
            return FhirRecord::new(resource, None, self.codes);
        }

        let patient_ref = resource.patient_reference()?;
        tracing::debug!(resource = %reference, patient = %patient_ref, "Fetching owning patient");
        let patient = FhirResource::from_json(self.store.read_resource(&patient_ref).await?)?;
        FhirRecord::new(resource, Some(&patient), self.codes)
    }
}

fn malformed(reason: String) -> ImportError {
    ImportError::MalformedSourceRecord(reason)
}

fn map_gender(gender: &str) -> Option<Sex> {
    match gender {
        "female" => Some(Sex::Female),
        "male" => Some(Sex::Male),
        "other" => Some(Sex::Other),
        "unknown" => Some(Sex::Unknown),
        _ => None,
    }
}

fn loinc_coding(raw: &Value) -> Option<&Value> {
    raw.pointer("/code/coding")?
        .as_array()?
        .iter()
        .find(|c| c.get("system").and_then(Value::as_str) == Some(LOINC_SYSTEM))
}

fn observation_entry(resource: &FhirResource, code: &str, codes: &dyn CodeTable) -> Option<Value> {
    let short_name = codes.short_name(code)?;
    let quantity = resource.raw.get("valueQuantity")?;
    let observation = ObservationValue {
        value: quantity.get("value").cloned().unwrap_or(Value::Null),
        unit: quantity.get("unit").and_then(Value::as_str).map(str::to_string),
        last_updated: resource.last_updated,
    };
    let mut entry = Map::new();
    entry.insert(short_name.to_string(), serde_json::to_value(observation).ok()?);
    Some(Value::Object(entry))
}
