//! Source record adapters
//!
//! One adapter per source format. Each turns a fetched record into a type
//! implementing [`SourceRecord`](crate::core::normalize::SourceRecord).

pub mod codes;
pub mod dicom;
pub mod fhir;
pub mod hl7;

pub use codes::{CodeTable, CsvCodeTable};
pub use dicom::{DicomRecord, IdentificationPolicy};
pub use fhir::{FhirAdapter, FhirRecord, FhirResource, PatientDetails};
pub use hl7::Hl7Message;
