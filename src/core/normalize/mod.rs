//! Metadata normalization
//!
//! Turns any [`SourceRecord`] into a [`CanonicalMetadata`] tree by walking
//! the enumerated field table. Only non-empty values are written, so an
//! absent source value leaves the field out of the tree entirely.

pub mod fields;

pub use fields::{Field, FieldGroup, FieldValue};

use crate::domain::{CanonicalMetadata, ImportError, Result};

/// A parsed source record that can supply canonical field values
///
/// Implemented by the imaging, messaging and structured-resource adapters.
pub trait SourceRecord {
    /// Value of `field`, or `None` when the source carries nothing for it
    fn field_value(&self, field: Field) -> Option<FieldValue>;
}

/// Builds the canonical tree for one record
///
/// The subject group ends up nested under `session.subject`. Groups with no
/// populated field are omitted.
///
/// # Errors
///
/// Returns a validation error if a record supplies a value of the wrong
/// kind for a field.
pub fn normalize(record: &dyn SourceRecord) -> Result<CanonicalMetadata> {
    let mut metadata = CanonicalMetadata::default();

    for field in Field::ALL {
        let Some(value) = record.field_value(field) else {
            continue;
        };
        if value.is_empty() {
            continue;
        }
        fields::apply(&mut metadata, field, value).map_err(ImportError::Validation)?;
    }

    metadata.prune();
    Ok(metadata)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::metadata::Sex;
    use serde_json::json;
    use std::collections::HashMap;

    struct MapRecord(HashMap<Field, FieldValue>);

    impl SourceRecord for MapRecord {
        fn field_value(&self, field: Field) -> Option<FieldValue> {
            self.0.get(&field).cloned()
        }
    }

    #[test]
    fn test_normalize_nests_subject_under_session() {
        let record = MapRecord(HashMap::from([
            (Field::SubjectCode, FieldValue::from("ex1")),
            (Field::SubjectSex, FieldValue::Sex(Sex::Other)),
            (Field::SessionLabel, FieldValue::from("Visit 1")),
        ]));

        let metadata = normalize(&record).unwrap();
        assert_eq!(
            serde_json::to_value(&metadata).unwrap(),
            json!({"session": {"label": "Visit 1", "subject": {"code": "ex1", "sex": "other"}}})
        );
    }

    #[test]
    fn test_empty_values_are_omitted() {
        let record = MapRecord(HashMap::from([
            (Field::SessionLabel, FieldValue::from("")),
            (Field::AcquisitionInstrument, FieldValue::from(" ")),
        ]));

        let metadata = normalize(&record).unwrap();
        assert_eq!(metadata, CanonicalMetadata::default());
        assert_eq!(serde_json::to_value(&metadata).unwrap(), json!({"session": {}}));
    }

    #[test]
    fn test_wrong_kind_is_rejected() {
        let record = MapRecord(HashMap::from([(
            Field::SessionTimestamp,
            FieldValue::from("2018-07-10"),
        )]));
        assert!(matches!(
            normalize(&record),
            Err(ImportError::Validation(_))
        ));
    }
}
