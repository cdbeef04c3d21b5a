//! Subject identity exchanged for a master code
//!
//! A [`SubjectIdentity`] is built once per import item from the normalized
//! record, sent to the identity service exactly once and then dropped.

use chrono::NaiveDate;
use serde::Serialize;

/// Identity fields sent to the pseudonymization service
///
/// Either the source patient identifier is authoritative
/// (`use_patient_id = true`) or the service derives the code from
/// name and date of birth.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct SubjectIdentity {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub patient_id: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub first_name: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub last_name: Option<String>,
    #[serde(
        skip_serializing_if = "Option::is_none",
        serialize_with = "serialize_date"
    )]
    pub date_of_birth: Option<NaiveDate>,
    pub use_patient_id: bool,
}

impl SubjectIdentity {
    /// Identity keyed on the source patient identifier alone
    pub fn from_patient_id(patient_id: impl Into<String>) -> Self {
        Self {
            patient_id: Some(patient_id.into()),
            first_name: None,
            last_name: None,
            date_of_birth: None,
            use_patient_id: true,
        }
    }

    /// Identity from demographic fields
    ///
    /// The patient identifier is used whenever one is present and non-empty.
    pub fn from_demographics(
        patient_id: Option<String>,
        first_name: Option<String>,
        last_name: Option<String>,
        date_of_birth: Option<NaiveDate>,
    ) -> Self {
        let patient_id = patient_id.filter(|id| !id.is_empty());
        Self {
            use_patient_id: patient_id.is_some(),
            patient_id,
            first_name,
            last_name,
            date_of_birth,
        }
    }

    /// Whether the identity carries enough fields for the service to derive a code
    pub fn is_resolvable(&self) -> bool {
        if self.use_patient_id {
            return self.patient_id.is_some();
        }
        self.first_name.is_some() && self.last_name.is_some() && self.date_of_birth.is_some()
    }
}

fn serialize_date<S: serde::Serializer>(
    date: &Option<NaiveDate>,
    serializer: S,
) -> Result<S::Ok, S::Error> {
    match date {
        Some(d) => serializer.serialize_str(&d.format("%Y-%m-%d").to_string()),
        None => serializer.serialize_none(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_patient_id_payload() {
        let identity = SubjectIdentity::from_patient_id("MRN-1");
        assert_eq!(
            serde_json::to_value(&identity).unwrap(),
            json!({"patient_id": "MRN-1", "use_patient_id": true})
        );
    }

    #[test]
    fn test_demographics_payload() {
        let identity = SubjectIdentity::from_demographics(
            Some("MRN-ZEN3H".to_string()),
            Some("Firstname".to_string()),
            Some("Lastname".to_string()),
            NaiveDate::from_ymd_opt(1972, 4, 17),
        );
        assert_eq!(
            serde_json::to_value(&identity).unwrap(),
            json!({
                "patient_id": "MRN-ZEN3H",
                "first_name": "Firstname",
                "last_name": "Lastname",
                "date_of_birth": "1972-04-17",
                "use_patient_id": true
            })
        );
    }

    #[test]
    fn test_empty_patient_id_falls_back_to_demographics() {
        let identity = SubjectIdentity::from_demographics(
            Some(String::new()),
            Some("A".to_string()),
            Some("B".to_string()),
            NaiveDate::from_ymd_opt(2000, 1, 1),
        );
        assert!(!identity.use_patient_id);
        assert!(identity.patient_id.is_none());
        assert!(identity.is_resolvable());
    }

    #[test]
    fn test_incomplete_demographics_not_resolvable() {
        let identity =
            SubjectIdentity::from_demographics(None, Some("A".to_string()), None, None);
        assert!(!identity.is_resolvable());
    }
}
