//! DICOM Part-10 record adapter
//!
//! Reads the handful of attributes the canonical tree needs from one object
//! file. DICOM dates and times carry no offset; they are read as UTC and the
//! configured timezone label is recorded alongside them.

use crate::config::{ImportSettings, SubjectCodeField};
use crate::core::normalize::{Field, FieldValue, SourceRecord};
use crate::domain::{is_dicom_uid, ImportError, Result, Sex};
use chrono::{DateTime, NaiveDate, NaiveTime, Utc};
use dicom_core::Tag;
use dicom_dictionary_std::tags;
use dicom_object::InMemDicomObject;
use std::path::Path;

/// How subject fields are derived from imaging records
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct IdentificationPolicy {
    /// Leave patient names out of the metadata tree
    pub de_identify: bool,
    /// Attribute used as `subject.code`
    pub subject_code_field: SubjectCodeField,
    /// Timezone label recorded on sessions and acquisitions
    pub timezone: String,
}

impl Default for IdentificationPolicy {
    fn default() -> Self {
        Self {
            de_identify: false,
            subject_code_field: SubjectCodeField::PatientId,
            timezone: "UTC".to_string(),
        }
    }
}

impl From<&ImportSettings> for IdentificationPolicy {
    fn from(settings: &ImportSettings) -> Self {
        Self {
            de_identify: settings.de_identify,
            subject_code_field: settings.subject_code_field,
            timezone: settings.timezone.clone(),
        }
    }
}

/// Attributes of one imaging object
#[derive(Debug, Clone, Default, PartialEq)]
pub struct DicomRecord {
    pub patient_id: Option<String>,
    pub subject_code: Option<String>,
    pub firstname: Option<String>,
    pub lastname: Option<String>,
    pub sex: Option<Sex>,
    pub study_uid: Option<String>,
    pub study_description: Option<String>,
    pub study_timestamp: Option<DateTime<Utc>>,
    pub operator: Option<String>,
    pub series_uid: String,
    pub acquisition_number: Option<i64>,
    pub series_description: Option<String>,
    pub protocol_name: Option<String>,
    pub acquisition_timestamp: Option<DateTime<Utc>>,
    pub modality: Option<String>,
    pub timezone: Option<String>,
}

impl DicomRecord {
    /// Opens and parses a Part-10 file
    ///
    /// # Errors
    ///
    /// Returns `MalformedSourceRecord` when the file is not a readable DICOM
    /// object or lacks a valid Series Instance UID.
    pub fn open(path: &Path, policy: &IdentificationPolicy) -> Result<Self> {
        let object = dicom_object::open_file(path).map_err(|e| {
            ImportError::MalformedSourceRecord(format!("{}: {}", path.display(), e))
        })?;
        Self::from_object(&object, policy).map_err(|e| match e {
            ImportError::MalformedSourceRecord(reason) => {
                ImportError::MalformedSourceRecord(format!("{}: {}", path.display(), reason))
            }
            other => other,
        })
    }

    pub fn from_object(object: &InMemDicomObject, policy: &IdentificationPolicy) -> Result<Self> {
        let get = |tag: Tag| attribute(object, tag);

        let series_uid = get(tags::SERIES_INSTANCE_UID).ok_or_else(|| {
            ImportError::MalformedSourceRecord("Series Instance UID is missing".to_string())
        })?;
        if !is_dicom_uid(&series_uid) {
            return Err(ImportError::MalformedSourceRecord(format!(
                "Series Instance UID '{series_uid}' is not a DICOM UID"
            )));
        }

        let acquisition_number = get(tags::ACQUISITION_NUMBER)
            .map(|n| {
                n.parse::<i64>().map_err(|_| {
                    ImportError::MalformedSourceRecord(format!("Acquisition Number '{n}' is not an integer"))
                })
            })
            .transpose()?;

        let (lastname, firstname) = match get(tags::PATIENT_NAME) {
            Some(name) if !policy.de_identify => split_person_name(&name),
            _ => (None, None),
        };

        let patient_id = get(tags::PATIENT_ID);
        let subject_code = match policy.subject_code_field {
            SubjectCodeField::PatientId => patient_id.clone(),
            SubjectCodeField::AccessionNumber => get(tags::ACCESSION_NUMBER),
        };

        let study_timestamp = timestamp(get(tags::STUDY_DATE), get(tags::STUDY_TIME));
        let acquisition_timestamp = timestamp(get(tags::ACQUISITION_DATE), get(tags::ACQUISITION_TIME))
            .or_else(|| timestamp(get(tags::SERIES_DATE), get(tags::SERIES_TIME)))
            .or(study_timestamp);

        Ok(Self {
            patient_id,
            subject_code,
            firstname,
            lastname,
            sex: get(tags::PATIENT_SEX).as_deref().and_then(map_sex),
            study_uid: get(tags::STUDY_INSTANCE_UID),
            study_description: get(tags::STUDY_DESCRIPTION),
            study_timestamp,
            operator: get(tags::OPERATORS_NAME),
            series_uid,
            acquisition_number,
            series_description: get(tags::SERIES_DESCRIPTION),
            protocol_name: get(tags::PROTOCOL_NAME),
            acquisition_timestamp,
            modality: get(tags::MODALITY),
            timezone: Some(policy.timezone.clone()).filter(|tz| !tz.is_empty()),
        })
    }

    /// Acquisition uid; later acquisitions of a series get a numeric suffix
    pub fn acquisition_uid(&self) -> String {
        match self.acquisition_number {
            Some(n) if n > 1 => format!("{}_{}", self.series_uid, n),
            _ => self.series_uid.clone(),
        }
    }
}

impl SourceRecord for DicomRecord {
    fn field_value(&self, field: Field) -> Option<FieldValue> {
        let text = |s: &Option<String>| s.clone().map(FieldValue::Text);
        match field {
            Field::SubjectCode => text(&self.subject_code),
            Field::SubjectFirstname => text(&self.firstname),
            Field::SubjectLastname => text(&self.lastname),
            Field::SubjectSex => self.sex.map(FieldValue::Sex),
            Field::SessionUid => text(&self.study_uid),
            Field::SessionLabel => text(&self.study_description),
            Field::SessionTimestamp => self.study_timestamp.map(FieldValue::Timestamp),
            Field::SessionTimezone | Field::AcquisitionTimezone => text(&self.timezone),
            Field::SessionOperator => text(&self.operator),
            Field::AcquisitionUid => Some(self.acquisition_uid().into()),
            Field::AcquisitionLabel => text(&self.series_description).or_else(|| text(&self.protocol_name)),
            Field::AcquisitionTimestamp => self.acquisition_timestamp.map(FieldValue::Timestamp),
            Field::AcquisitionInstrument => text(&self.modality),
            _ => None,
        }
    }
}

/// Trimmed, non-empty string value of an attribute
fn attribute(object: &InMemDicomObject, tag: Tag) -> Option<String> {
    let element = object.element(tag).ok()?;
    let value = element.to_str().ok()?;
    let value = value.trim_matches(|c: char| c.is_whitespace() || c == '\0');
    (!value.is_empty()).then(|| value.to_string())
}

/// Splits a `Family^Given^...` person name
fn split_person_name(name: &str) -> (Option<String>, Option<String>) {
    let mut parts = name.split('^').map(str::trim);
    let non_empty = |p: Option<&str>| p.filter(|s| !s.is_empty()).map(str::to_string);
    let family = non_empty(parts.next());
    let given = non_empty(parts.next());
    (family, given)
}

fn map_sex(code: &str) -> Option<Sex> {
    match code {
        "F" => Some(Sex::Female),
        "M" => Some(Sex::Male),
        "O" => Some(Sex::Other),
        _ => None,
    }
}

/// Combines a DA value and an optional TM value
///
/// TM may be truncated (`HH`, `HHMM`) and may carry a fraction, which is
/// dropped.
pub(crate) fn timestamp(date: Option<String>, time: Option<String>) -> Option<DateTime<Utc>> {
    let date = NaiveDate::parse_from_str(date?.trim(), "%Y%m%d").ok()?;
    let time = time
        .and_then(|t| {
            let whole = t.trim().split('.').next().unwrap_or_default().to_string();
            let padded = format!("{:0<6}", whole);
            NaiveTime::parse_from_str(&padded, "%H%M%S").ok()
        })
        .unwrap_or(NaiveTime::MIN);
    Some(date.and_time(time).and_utc())
}
