//! HTTP client for the identity service

use super::IdentityService;
use crate::adapters::http::{build_client, check_status, read_json, send_error, RetryPolicy};
use crate::config::{IdentityConfig, RetryConfig, SecretString};
use crate::domain::{ImportError, MasterCode, Result, SubjectIdentity, UpstreamServiceError};
use async_trait::async_trait;
use reqwest::Client;
use secrecy::ExposeSecret;
use serde::Deserialize;

#[derive(Debug, Deserialize)]
struct MasterCodeResponse {
    code: String,
}

/// Identity service reached over HTTP
///
/// Shares the platform API key; the service is usually hosted by the
/// destination platform itself.
pub struct HttpIdentityService {
    client: Client,
    endpoint: String,
    api_key: SecretString,
    retry: RetryPolicy,
}

impl HttpIdentityService {
    pub fn new(
        base_url: &str,
        config: &IdentityConfig,
        api_key: SecretString,
        retry: &RetryConfig,
    ) -> Result<Self> {
        Ok(Self {
            client: build_client(config.timeout_seconds)?,
            endpoint: format!("{}/api/subjects/master-code", base_url.trim_end_matches('/')),
            api_key,
            retry: RetryPolicy::from(retry),
        })
    }
}

#[async_trait]
impl IdentityService for HttpIdentityService {
    async fn master_code(&self, identity: &SubjectIdentity) -> Result<MasterCode> {
        if !identity.is_resolvable() {
            return Err(ImportError::Validation(
                "identity has neither a patient id nor name and date of birth".to_string(),
            ));
        }

        let context = "master code exchange";
        let response: MasterCodeResponse = self
            .retry
            .run(|| async {
                let resp = self
                    .client
                    .post(&self.endpoint)
                    .header(
                        "Authorization",
                        format!("scitran-user {}", self.api_key.expose_secret().as_ref()),
                    )
                    .json(identity)
                    .send()
                    .await
                    .map_err(|e| send_error(e, context))?;
                let resp = check_status(resp, context).await?;
                read_json(resp, context).await
            })
            .await?;

        MasterCode::new(response.code)
            .map_err(|e| UpstreamServiceError::InvalidResponse(format!("{context}: {e}")).into())
    }
}
