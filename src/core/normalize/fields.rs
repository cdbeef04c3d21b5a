//! Enumerated field table of the canonical metadata tree
//!
//! Every (group, field) pair a source record can populate is listed here at
//! compile time. Adding a canonical field means adding a variant, extending
//! [`Field::ALL`] and teaching `apply` where it lands.

use crate::domain::metadata::{CanonicalMetadata, Sex, SubjectType};
use chrono::{DateTime, Utc};
use std::fmt;

/// Top-level group a field belongs to
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum FieldGroup {
    Subject,
    Session,
    Acquisition,
}

impl FieldGroup {
    pub fn name(&self) -> &'static str {
        match self {
            FieldGroup::Subject => "subject",
            FieldGroup::Session => "session",
            FieldGroup::Acquisition => "acquisition",
        }
    }
}

/// A canonical metadata field a source record may supply
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Field {
    SubjectCode,
    SubjectFirstname,
    SubjectLastname,
    SubjectSex,
    SubjectEthnicity,
    SubjectType,
    SessionUid,
    SessionLabel,
    SessionTimestamp,
    SessionTimezone,
    SessionOperator,
    AcquisitionUid,
    AcquisitionLabel,
    AcquisitionTimestamp,
    AcquisitionTimezone,
    AcquisitionInstrument,
    AcquisitionMeasurement,
}

impl Field {
    /// Every field, grouped subject, session, acquisition
    pub const ALL: [Field; 17] = [
        Field::SubjectCode,
        Field::SubjectFirstname,
        Field::SubjectLastname,
        Field::SubjectSex,
        Field::SubjectEthnicity,
        Field::SubjectType,
        Field::SessionUid,
        Field::SessionLabel,
        Field::SessionTimestamp,
        Field::SessionTimezone,
        Field::SessionOperator,
        Field::AcquisitionUid,
        Field::AcquisitionLabel,
        Field::AcquisitionTimestamp,
        Field::AcquisitionTimezone,
        Field::AcquisitionInstrument,
        Field::AcquisitionMeasurement,
    ];

    pub fn group(&self) -> FieldGroup {
        use Field::*;
        match self {
            SubjectCode | SubjectFirstname | SubjectLastname | SubjectSex | SubjectEthnicity
            | SubjectType => FieldGroup::Subject,
            SessionUid | SessionLabel | SessionTimestamp | SessionTimezone | SessionOperator => {
                FieldGroup::Session
            }
            AcquisitionUid | AcquisitionLabel | AcquisitionTimestamp | AcquisitionTimezone
            | AcquisitionInstrument | AcquisitionMeasurement => FieldGroup::Acquisition,
        }
    }

    /// Key of the field inside its group
    pub fn name(&self) -> &'static str {
        use Field::*;
        match self {
            SubjectCode => "code",
            SubjectFirstname => "firstname",
            SubjectLastname => "lastname",
            SubjectSex => "sex",
            SubjectEthnicity => "ethnicity",
            SubjectType => "type",
            SessionUid | AcquisitionUid => "uid",
            SessionLabel | AcquisitionLabel => "label",
            SessionTimestamp | AcquisitionTimestamp => "timestamp",
            SessionTimezone | AcquisitionTimezone => "timezone",
            SessionOperator => "operator",
            AcquisitionInstrument => "instrument",
            AcquisitionMeasurement => "measurement",
        }
    }
}

impl fmt::Display for Field {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}.{}", self.group().name(), self.name())
    }
}

/// Typed value a source record supplies for a field
#[derive(Debug, Clone, PartialEq)]
pub enum FieldValue {
    Text(String),
    Timestamp(DateTime<Utc>),
    Sex(Sex),
    SubjectType(SubjectType),
}

impl FieldValue {
    /// Empty text counts as absent
    pub fn is_empty(&self) -> bool {
        matches!(self, FieldValue::Text(s) if s.trim().is_empty())
    }

    fn kind(&self) -> &'static str {
        match self {
            FieldValue::Text(_) => "text",
            FieldValue::Timestamp(_) => "timestamp",
            FieldValue::Sex(_) => "sex",
            FieldValue::SubjectType(_) => "subject type",
        }
    }
}

impl From<String> for FieldValue {
    fn from(s: String) -> Self {
        FieldValue::Text(s)
    }
}

impl From<&str> for FieldValue {
    fn from(s: &str) -> Self {
        FieldValue::Text(s.to_string())
    }
}

impl From<DateTime<Utc>> for FieldValue {
    fn from(ts: DateTime<Utc>) -> Self {
        FieldValue::Timestamp(ts)
    }
}

/// Writes `value` into the slot for `field`
///
/// # Errors
///
/// Returns a description of the mismatch when the value kind does not fit
/// the field (for example text supplied for `subject.sex`).
pub(crate) fn apply(
    metadata: &mut CanonicalMetadata,
    field: Field,
    value: FieldValue,
) -> Result<(), String> {
    use Field::*;

    let mismatch = |value: &FieldValue| format!("{} value supplied for {}", value.kind(), field);

    match (field, value) {
        (SubjectSex, FieldValue::Sex(sex)) => metadata.subject_mut().sex = Some(sex),
        (SubjectType, FieldValue::SubjectType(t)) => metadata.subject_mut().subject_type = Some(t),
        (SessionTimestamp, FieldValue::Timestamp(ts)) => metadata.session.timestamp = Some(ts),
        (AcquisitionTimestamp, FieldValue::Timestamp(ts)) => {
            metadata.acquisition_mut().timestamp = Some(ts)
        }
        (field, FieldValue::Text(text)) => {
            let slot = match field {
                SubjectCode => &mut metadata.subject_mut().code,
                SubjectFirstname => &mut metadata.subject_mut().firstname,
                SubjectLastname => &mut metadata.subject_mut().lastname,
                SubjectEthnicity => &mut metadata.subject_mut().ethnicity,
                SessionUid => &mut metadata.session.uid,
                SessionLabel => &mut metadata.session.label,
                SessionTimezone => &mut metadata.session.timezone,
                SessionOperator => &mut metadata.session.operator,
                AcquisitionUid => &mut metadata.acquisition_mut().uid,
                AcquisitionLabel => &mut metadata.acquisition_mut().label,
                AcquisitionTimezone => &mut metadata.acquisition_mut().timezone,
                AcquisitionInstrument => &mut metadata.acquisition_mut().instrument,
                AcquisitionMeasurement => &mut metadata.acquisition_mut().measurement,
                SubjectSex | SubjectType | SessionTimestamp | AcquisitionTimestamp => {
                    return Err(mismatch(&FieldValue::Text(text)))
                }
            };
            *slot = Some(text);
        }
        (_, other) => return Err(mismatch(&other)),
    }
    Ok(())
}
