//! HL7v2 message adapter
//!
//! Reads the parsed-segment JSON returned by the healthcare store. Fields are
//! addressed by their dotted position inside a segment (`"5.1"`, `"3[0].1"`).

use crate::core::normalize::{Field, FieldValue, SourceRecord};
use crate::domain::{ImportError, Result, Sex, SubjectIdentity, SubjectType};
use base64::engine::general_purpose::STANDARD as BASE64;
use base64::Engine;
use chrono::{DateTime, NaiveDate, Utc};
use serde_json::{Map, Value};

/// Patient identifier positions in PID, tried in order
const PATIENT_ID_FIELDS: [&str; 3] = ["3", "3.1", "3[0].1"];

/// A message fetched from the HL7v2 store
#[derive(Debug, Clone)]
pub struct Hl7Message {
    raw: Value,
    control_id: String,
    message_type: Option<String>,
    send_time: DateTime<Utc>,
    patient_id: String,
    firstname: Option<String>,
    lastname: Option<String>,
    sex: Option<Sex>,
    ethnicity: Option<&'static str>,
    subject_type: Option<SubjectType>,
    date_of_birth: Option<NaiveDate>,
}

impl Hl7Message {
    /// Parses the store representation of a message
    ///
    /// # Errors
    ///
    /// Returns `MalformedSourceRecord` when the control id, patient
    /// identifier or send time is missing, or a date cannot be parsed.
    pub fn from_json(raw: Value) -> Result<Self> {
        let segments = raw
            .pointer("/parsedData/segments")
            .and_then(Value::as_array)
            .ok_or_else(|| malformed("message has no parsed segments"))?;

        let control_id = segments
            .first()
            .and_then(|s| field(s, "9"))
            .ok_or_else(|| malformed("MSH-9 control id is missing"))?
            .to_string();

        let pid = segments
            .iter()
            .find(|s| s.get("segmentId").and_then(Value::as_str) == Some("PID"))
            .ok_or_else(|| malformed("message has no PID segment"))?;

        let patient_id = PATIENT_ID_FIELDS
            .iter()
            .find_map(|key| field(pid, key))
            .ok_or_else(|| malformed("PID-3 patient identifier is missing"))?
            .to_string();

        let date_of_birth = field(pid, "7")
            .map(|dob| {
                NaiveDate::parse_from_str(dob, "%Y%m%d")
                    .map_err(|e| malformed(&format!("PID-7 date of birth '{dob}': {e}")))
            })
            .transpose()?;

        let send_time = raw
            .get("sendTime")
            .and_then(Value::as_str)
            .ok_or_else(|| malformed("sendTime is missing"))?;
        let send_time = DateTime::parse_from_rfc3339(send_time)
            .map_err(|e| malformed(&format!("sendTime '{send_time}': {e}")))?
            .with_timezone(&Utc);

        Ok(Self {
            control_id,
            message_type: raw
                .get("messageType")
                .and_then(Value::as_str)
                .filter(|s| !s.is_empty())
                .map(str::to_string),
            send_time,
            patient_id,
            firstname: field(pid, "5.1").map(str::to_string),
            lastname: field(pid, "5.2").map(str::to_string),
            sex: field(pid, "8").and_then(map_sex),
            ethnicity: field(pid, "22").and_then(map_ethnicity),
            // PID-35 carries the species; such subjects are not typed human
            subject_type: field(pid, "35").is_none().then_some(SubjectType::Human),
            date_of_birth,
            raw,
        })
    }

    pub fn control_id(&self) -> &str {
        &self.control_id
    }

    pub fn patient_id(&self) -> &str {
        &self.patient_id
    }

    pub fn send_time(&self) -> DateTime<Utc> {
        self.send_time
    }

    /// Identity fields sent to the identity service
    pub fn identity(&self) -> SubjectIdentity {
        SubjectIdentity::from_demographics(
            Some(self.patient_id.clone()),
            self.firstname.clone(),
            self.lastname.clone(),
            self.date_of_birth,
        )
    }

    /// Decoded message text as stored in the `data` field
    pub fn body(&self) -> Result<Vec<u8>> {
        let data = self
            .raw
            .get("data")
            .and_then(Value::as_str)
            .ok_or_else(|| malformed("message has no data"))?;
        BASE64
            .decode(data)
            .map_err(|e| malformed(&format!("message data is not base64: {e}")))
    }

    /// File info uploaded alongside the message text
    ///
    /// The store JSON with dots in keys replaced by underscores and the raw
    /// `data` field removed.
    pub fn sidecar_info(&self) -> Map<String, Value> {
        let mut info = match normalize_keys(&self.raw) {
            Value::Object(map) => map,
            _ => Map::new(),
        };
        info.remove("data");
        info
    }
}

impl SourceRecord for Hl7Message {
    fn field_value(&self, field: Field) -> Option<FieldValue> {
        let text = |s: &Option<String>| s.clone().map(FieldValue::Text);
        match field {
            Field::SubjectCode => Some(format!("ex{}", self.patient_id).into()),
            Field::SubjectFirstname => text(&self.firstname),
            Field::SubjectLastname => text(&self.lastname),
            Field::SubjectSex => self.sex.map(FieldValue::Sex),
            Field::SubjectEthnicity => self.ethnicity.map(FieldValue::from),
            Field::SubjectType => self.subject_type.map(FieldValue::SubjectType),
            Field::SessionLabel => Some(
                format!(
                    "HL7_{}_{}",
                    self.patient_id,
                    self.send_time.format("%Y-%m-%d")
                )
                .into(),
            ),
            Field::SessionTimestamp | Field::AcquisitionTimestamp => {
                Some(self.send_time.into())
            }
            Field::AcquisitionLabel => text(&self.message_type),
            _ => None,
        }
    }
}

fn malformed(reason: &str) -> ImportError {
    ImportError::MalformedSourceRecord(reason.to_string())
}

/// Non-empty string value of a segment field
fn field<'a>(segment: &'a Value, key: &str) -> Option<&'a str> {
    segment
        .get("fields")?
        .get(key)?
        .as_str()
        .filter(|s| !s.is_empty())
}

fn map_sex(code: &str) -> Option<Sex> {
    match code {
        "F" => Some(Sex::Female),
        "M" => Some(Sex::Male),
        "O" => Some(Sex::Other),
        "U" => Some(Sex::Unknown),
        _ => None,
    }
}

fn map_ethnicity(code: &str) -> Option<&'static str> {
    match code {
        "H" => Some("Hispanic or Latino"),
        "N" => Some("Not Hispanic or Latino"),
        "U" => Some("Unknown or Not Reported"),
        _ => None,
    }
}

/// Recursively replaces `.` with `_` in object keys
fn normalize_keys(value: &Value) -> Value {
    match value {
        Value::Object(map) => Value::Object(
            map.iter()
                .map(|(k, v)| (k.replace('.', "_"), normalize_keys(v)))
                .collect(),
        ),
        Value::Array(items) => Value::Array(items.iter().map(normalize_keys).collect()),
        other => other.clone(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::normalize::normalize;
    use serde_json::json;
    use test_case::test_case;

    fn message(pid_fields: Value) -> Value {
        json!({
            "name": "projects/p/datasets/d/hl7V2Stores/s/messages/m1",
            "data": BASE64.encode("MSH|^~\\&|A|B\rPID|1||MRN-ZEN3H"),
            "sendTime": "2018-07-10T06:54:58Z",
            "messageType": "ORU",
            "parsedData": {"segments": [
                {"segmentId": "MSH", "fields": {"9": "CTRL-1", "0.1": "x"}},
                {"segmentId": "PID", "fields": pid_fields}
            ]}
        })
    }

    #[test]
    fn test_parse_and_normalize() {
        let msg = Hl7Message::from_json(message(json!({
            "3.1": "MRN-ZEN3H",
            "5.1": "Firstname",
            "5.2": "Lastname",
            "7": "19720417",
            "8": "F"
        })))
        .unwrap();

        assert_eq!(msg.control_id(), "CTRL-1");
        let metadata = normalize(&msg).unwrap();
        assert_eq!(
            serde_json::to_value(&metadata).unwrap(),
            json!({
                "session": {
                    "label": "HL7_MRN-ZEN3H_2018-07-10",
                    "timestamp": "2018-07-10T06:54:58Z",
                    "subject": {
                        "code": "exMRN-ZEN3H",
                        "firstname": "Firstname",
                        "lastname": "Lastname",
                        "sex": "female",
                        "type": "human"
                    }
                },
                "acquisition": {"label": "ORU", "timestamp": "2018-07-10T06:54:58Z"}
            })
        );
    }

    #[test_case(json!({"3": "A", "3.1": "B"}), "A" ; "plain field first")]
    #[test_case(json!({"3": "", "3.1": "B"}), "B" ; "empty field falls through")]
    #[test_case(json!({"3[0].1": "C"}), "C" ; "repeated component")]
    fn test_patient_id_fallback(fields: Value, expected: &str) {
        let msg = Hl7Message::from_json(message(fields)).unwrap();
        assert_eq!(msg.patient_id(), expected);
    }

    #[test]
    fn test_missing_patient_id_is_malformed() {
        let err = Hl7Message::from_json(message(json!({"5.1": "A"}))).unwrap_err();
        assert!(matches!(err, ImportError::MalformedSourceRecord(_)));
    }

    #[test]
    fn test_bad_birth_date_is_malformed() {
        let err = Hl7Message::from_json(message(json!({"3": "A", "7": "1972-04-17"}))).unwrap_err();
        assert!(matches!(err, ImportError::MalformedSourceRecord(_)));
    }

    #[test]
    fn test_species_and_ethnicity() {
        let msg =
            Hl7Message::from_json(message(json!({"3": "A", "22": "H", "35": "DOG", "8": "X"})))
                .unwrap();
        let metadata = normalize(&msg).unwrap();
        let subject = metadata.subject().unwrap();
        assert_eq!(subject.subject_type, None);
        assert_eq!(subject.sex, None);
        assert_eq!(subject.ethnicity.as_deref(), Some("Hispanic or Latino"));
    }

    #[test]
    fn test_identity_uses_patient_id() {
        let msg = Hl7Message::from_json(message(json!({"3": "A", "7": "19720417"}))).unwrap();
        let identity = msg.identity();
        assert!(identity.use_patient_id);
        assert_eq!(identity.patient_id.as_deref(), Some("A"));
        assert_eq!(
            identity.date_of_birth,
            NaiveDate::from_ymd_opt(1972, 4, 17)
        );
    }

    #[test]
    fn test_body_and_sidecar() {
        let msg = Hl7Message::from_json(message(json!({"3": "A"}))).unwrap();
        assert!(msg.body().unwrap().starts_with(b"MSH|"));

        let info = msg.sidecar_info();
        assert!(!info.contains_key("data"));
        assert_eq!(
            info["parsedData"]["segments"][0]["fields"]["0_1"],
            json!("x")
        );
    }
}
