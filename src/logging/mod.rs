//! Logging and observability
//!
//! Structured logging through `tracing`. The level is set once from
//! configuration or the command line. Per-item context travels in an
//! [`item_span`] so every event emitted while importing one series,
//! message or resource carries that item's key.
//!
//! # Example
//!
//! ```no_run
//! use hcimport::logging::{init_logging, item_span};
//! use hcimport::config::LoggingConfig;
//!
//! let config = LoggingConfig::default();
//! let _guard = init_logging("info", &config).expect("Failed to initialize logging");
//!
//! let span = item_span("hl7", "msg-1");
//! let _entered = span.enter();
//! tracing::info!("Normalizing message");
//! ```

pub mod structured;

pub use structured::{init_logging, LoggingGuard};

/// Span wrapping all work for one import item
pub fn item_span(kind: &str, key: &str) -> tracing::Span {
    tracing::info_span!("import_item", kind = kind, key = key)
}

/// Log the start of one import item
///
/// # Example
///
/// ```no_run
/// use hcimport::log_item_start;
///
/// log_item_start!("dicom", "1.2.840.113619.2.1");
/// ```
#[macro_export]
macro_rules! log_item_start {
    ($kind:expr, $key:expr) => {
        tracing::info!(kind = $kind, key = %$key, "Processing item");
    };
}

/// Log the outcome of one import item
///
/// # Example
///
/// ```no_run
/// use hcimport::log_item_outcome;
///
/// log_item_outcome!("fhir", "Observation/1", "skipped", "missing reference");
/// ```
#[macro_export]
macro_rules! log_item_outcome {
    ($kind:expr, $key:expr, $status:expr) => {
        tracing::info!(kind = $kind, key = %$key, status = $status, "Item finished");
    };
    ($kind:expr, $key:expr, $status:expr, $reason:expr) => {
        tracing::warn!(
            kind = $kind,
            key = %$key,
            status = $status,
            reason = %$reason,
            "Item finished"
        );
    };
}

/// Log a retry attempt
///
/// # Example
///
/// ```no_run
/// use hcimport::log_retry_attempt;
///
/// log_retry_attempt!(2, 3, "Connection timeout");
/// ```
#[macro_export]
macro_rules! log_retry_attempt {
    ($attempt:expr, $max_attempts:expr, $reason:expr) => {
        tracing::warn!(
            attempt = $attempt,
            max_attempts = $max_attempts,
            reason = %$reason,
            "Retrying operation"
        );
    };
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_item_span_without_subscriber() {
        let span = item_span("dicom", "1.2.3");
        let _entered = span.enter();
        crate::log_item_start!("dicom", "1.2.3");
        crate::log_item_outcome!("dicom", "1.2.3", "imported");
        crate::log_item_outcome!("dicom", "1.2.3", "failed", "timeout");
        crate::log_retry_attempt!(1, 3, "timeout");
    }
}
