//! REST client for a cloud healthcare dataset
//!
//! Talks to the DICOMweb, HL7v2 and FHIR surfaces of one dataset using a
//! bearer token.

use super::models::{parse_datasets, UidField};
use super::HealthcareStore;
use crate::adapters::http::{build_client, check_status, read_json, send_error, RetryPolicy};
use crate::config::{HealthcareConfig, SecretString};
use crate::domain::{
    is_dicom_uid, ImportError, MessageId, ResourceRef, Result, SeriesKey, UpstreamServiceError,
};
use async_trait::async_trait;
use reqwest::header::ACCEPT;
use reqwest::Client;
use secrecy::ExposeSecret;
use std::path::{Path, PathBuf};

const DICOM_JSON: &str = "application/dicom+json";
const DICOM_PART10: &str = "application/dicom; transfer-syntax=*";
const FHIR_JSON: &str = "application/fhir+json";

/// Healthcare data store reached over HTTP
///
/// # Example
///
/// ```no_run
/// use hcimport::adapters::healthcare::{HealthcareStore, HttpHealthcareStore};
/// use hcimport::config::{secret_string, HealthcareConfig};
///
/// # async fn example(config: HealthcareConfig) -> hcimport::domain::Result<()> {
/// let store = HttpHealthcareStore::new(&config, secret_string("token".to_string()))?;
/// let message = store.get_message(&"msg-1".parse().unwrap()).await?;
/// # Ok(())
/// # }
/// ```
pub struct HttpHealthcareStore {
    client: Client,
    dataset_url: String,
    dicom_store: Option<String>,
    hl7_store: Option<String>,
    fhir_store: Option<String>,
    token: SecretString,
    retry: RetryPolicy,
}

impl HttpHealthcareStore {
    /// Creates a client for the configured dataset
    ///
    /// # Errors
    ///
    /// Returns a configuration error if the HTTP client cannot be built
    pub fn new(config: &HealthcareConfig, token: SecretString) -> Result<Self> {
        Ok(Self {
            client: build_client(config.timeout_seconds)?,
            dataset_url: format!(
                "{}/{}",
                config.base_url.trim_end_matches('/'),
                config.dataset.trim_matches('/')
            ),
            dicom_store: config.dicom_store.clone(),
            hl7_store: config.hl7_store.clone(),
            fhir_store: config.fhir_store.clone(),
            token,
            retry: RetryPolicy::from(&config.retry),
        })
    }

    fn store_url(&self, kind: &str, store: &Option<String>) -> Result<String> {
        let store = store.as_deref().ok_or_else(|| {
            ImportError::Configuration(format!("No {kind} store configured in [healthcare]"))
        })?;
        Ok(format!("{}/{}/{}", self.dataset_url, kind, store))
    }

    fn dicomweb_url(&self) -> Result<String> {
        Ok(format!("{}/dicomWeb", self.store_url("dicomStores", &self.dicom_store)?))
    }

    fn bearer(&self) -> String {
        format!("Bearer {}", self.token.expose_secret().as_ref())
    }

    async fn get_text(
        &self,
        url: &str,
        query: &[(&str, &str)],
        accept: &str,
        context: &str,
    ) -> Result<String> {
        self.retry
            .run(|| async {
                let resp = self
                    .client
                    .get(url)
                    .query(query)
                    .header("Authorization", self.bearer())
                    .header(ACCEPT, accept)
                    .send()
                    .await
                    .map_err(|e| send_error(e, context))?;
                let resp = check_status(resp, context).await?;
                resp.text().await.map_err(|e| {
                    ImportError::from(UpstreamServiceError::InvalidResponse(format!(
                        "{context}: {e}"
                    )))
                })
            })
            .await
    }

    async fn get_json(&self, url: &str, accept: &str, context: &str) -> Result<serde_json::Value> {
        self.retry
            .run(|| async {
                let resp = self
                    .client
                    .get(url)
                    .header("Authorization", self.bearer())
                    .header(ACCEPT, accept)
                    .send()
                    .await
                    .map_err(|e| send_error(e, context))?;
                let resp = check_status(resp, context).await?;
                read_json(resp, context).await
            })
            .await
    }
}

#[async_trait]
impl HealthcareStore for HttpHealthcareStore {
    async fn search_series(&self, field: UidField, uid: &str) -> Result<Vec<SeriesKey>> {
        let url = format!("{}/series", self.dicomweb_url()?);
        let context = format!("series search {}={}", field.query_key(), uid);

        let body = self
            .get_text(&url, &[(field.query_key(), uid)], DICOM_JSON, &context)
            .await?;

        let datasets = parse_datasets(&body)
            .map_err(|e| UpstreamServiceError::InvalidResponse(format!("{context}: {e}")))?;
        Ok(datasets.iter().filter_map(|d| d.series_key()).collect())
    }

    async fn retrieve_series(&self, key: &SeriesKey, dir: &Path) -> Result<Vec<PathBuf>> {
        let series_url = format!(
            "{}/studies/{}/series/{}",
            self.dicomweb_url()?,
            key.study_uid(),
            key.series_uid()
        );

        let listing = self
            .get_text(
                &format!("{series_url}/instances"),
                &[],
                DICOM_JSON,
                &format!("instance listing for {key}"),
            )
            .await?;
        let instances = parse_datasets(&listing).map_err(|e| {
            UpstreamServiceError::InvalidResponse(format!("instance listing for {key}: {e}"))
        })?;

        let mut written = Vec::with_capacity(instances.len());
        for instance in &instances {
            let Some(sop_uid) = instance.sop_instance_uid() else {
                tracing::warn!(series = %key, "Instance without SOP Instance UID, ignoring");
                continue;
            };
            if !is_dicom_uid(sop_uid) {
                return Err(UpstreamServiceError::InvalidResponse(format!(
                    "instance listing for {key}: '{sop_uid}' is not a DICOM UID"
                ))
                .into());
            }
            let url = format!("{series_url}/instances/{sop_uid}");
            let context = format!("instance {sop_uid}");

            let bytes = self
                .retry
                .run(|| async {
                    let resp = self
                        .client
                        .get(&url)
                        .header("Authorization", self.bearer())
                        .header(ACCEPT, DICOM_PART10)
                        .send()
                        .await
                        .map_err(|e| send_error(e, &context))?;
                    let resp = check_status(resp, &context).await?;
                    resp.bytes().await.map_err(|e| {
                        ImportError::from(UpstreamServiceError::InvalidResponse(format!(
                            "{context}: {e}"
                        )))
                    })
                })
                .await?;

            let path = dir.join(sop_uid);
            tokio::fs::write(&path, &bytes).await?;
            written.push(path);
        }

        tracing::debug!(series = %key, instances = written.len(), "Series retrieved");
        Ok(written)
    }

    async fn get_message(&self, id: &MessageId) -> Result<serde_json::Value> {
        let url = format!(
            "{}/messages/{}",
            self.store_url("hl7V2Stores", &self.hl7_store)?,
            id
        );
        self.get_json(&url, "application/json", &format!("message {id}"))
            .await
    }

    async fn read_resource(&self, reference: &ResourceRef) -> Result<serde_json::Value> {
        let url = format!(
            "{}/fhir/{}",
            self.store_url("fhirStores", &self.fhir_store)?,
            reference
        );
        self.get_json(&url, FHIR_JSON, &format!("resource {reference}"))
            .await
    }
}
