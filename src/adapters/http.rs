//! Shared HTTP plumbing for the REST adapters
//!
//! Client construction with bounded timeouts, mapping of transport failures
//! and response statuses into [`UpstreamServiceError`], and the explicit
//! retry policy every adapter routes its calls through.

use crate::config::RetryConfig;
use crate::domain::{ImportError, Result, UpstreamServiceError};
use reqwest::{Client, ClientBuilder, Response, StatusCode};
use serde::de::DeserializeOwned;
use std::future::Future;
use std::time::Duration;

const CONNECT_TIMEOUT_SECS: u64 = 30;

/// Builds a reqwest client with request and connect timeouts
pub fn build_client(timeout_seconds: u64) -> Result<Client> {
    ClientBuilder::new()
        .timeout(Duration::from_secs(timeout_seconds))
        .connect_timeout(Duration::from_secs(CONNECT_TIMEOUT_SECS.min(timeout_seconds)))
        .user_agent(concat!("hcimport/", env!("CARGO_PKG_VERSION")))
        .build()
        .map_err(|e| ImportError::Configuration(format!("Failed to build HTTP client: {e}")))
}

/// Maps a transport-level failure
pub fn send_error(err: reqwest::Error, context: &str) -> ImportError {
    let upstream = if err.is_timeout() {
        UpstreamServiceError::Timeout(format!("{context}: {err}"))
    } else {
        UpstreamServiceError::ConnectionFailed(format!("{context}: {err}"))
    };
    upstream.into()
}

/// Maps a non-success status to the matching upstream error
pub fn status_error(status: StatusCode, body: String, context: &str) -> UpstreamServiceError {
    let message = if body.is_empty() {
        context.to_string()
    } else {
        format!("{context}: {body}")
    };

    match status {
        StatusCode::UNAUTHORIZED | StatusCode::FORBIDDEN => {
            UpstreamServiceError::AuthenticationFailed(message)
        }
        StatusCode::NOT_FOUND => UpstreamServiceError::NotFound(message),
        StatusCode::CONFLICT => UpstreamServiceError::Conflict(message),
        StatusCode::REQUEST_TIMEOUT | StatusCode::GATEWAY_TIMEOUT => {
            UpstreamServiceError::Timeout(message)
        }
        s if s.is_server_error() => UpstreamServiceError::ServerError {
            status: s.as_u16(),
            message,
        },
        s => UpstreamServiceError::ClientError {
            status: s.as_u16(),
            message,
        },
    }
}

/// Passes successful responses through and maps everything else
pub async fn check_status(resp: Response, context: &str) -> Result<Response> {
    let status = resp.status();
    if status.is_success() {
        return Ok(resp);
    }
    let body = resp.text().await.unwrap_or_default();
    Err(status_error(status, body, context).into())
}

/// Decodes a JSON body, reporting undecodable payloads as invalid responses
pub async fn read_json<T: DeserializeOwned>(resp: Response, context: &str) -> Result<T> {
    resp.json::<T>().await.map_err(|e| {
        UpstreamServiceError::InvalidResponse(format!("{context}: {e}")).into()
    })
}

/// Explicit, injectable retry policy
///
/// Only retryable upstream errors (connection, timeout, 5xx) are repeated.
/// The default policy never retries.
#[derive(Debug, Clone, PartialEq)]
pub struct RetryPolicy {
    pub max_retries: usize,
    pub initial_delay: Duration,
    pub max_delay: Duration,
    pub backoff_multiplier: f64,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self::from(&RetryConfig::default())
    }
}

impl From<&RetryConfig> for RetryPolicy {
    fn from(config: &RetryConfig) -> Self {
        Self {
            max_retries: config.max_retries,
            initial_delay: Duration::from_millis(config.initial_delay_ms),
            max_delay: Duration::from_millis(config.max_delay_ms),
            backoff_multiplier: config.backoff_multiplier,
        }
    }
}

impl RetryPolicy {
    /// Delay before retry number `attempt` (1-based)
    pub fn delay_for(&self, attempt: usize) -> Duration {
        let factor = self
            .backoff_multiplier
            .powi(attempt.saturating_sub(1).min(32) as i32);
        let millis = (self.initial_delay.as_millis() as f64 * factor)
            .min(self.max_delay.as_millis() as f64);
        Duration::from_millis(millis as u64)
    }

    /// Runs `operation`, retrying retryable failures with exponential backoff
    pub async fn run<F, T, Fut>(&self, operation: F) -> Result<T>
    where
        F: Fn() -> Fut,
        Fut: Future<Output = Result<T>>,
    {
        let mut attempt = 0;

        loop {
            match operation().await {
                Ok(result) => return Ok(result),
                Err(e) => {
                    let retryable = matches!(&e, ImportError::Upstream(u) if u.is_retryable());
                    if !retryable || attempt >= self.max_retries {
                        return Err(e);
                    }
                    attempt += 1;

                    let delay = self.delay_for(attempt);
                    crate::log_retry_attempt!(attempt, self.max_retries, e);
                    tokio::time::sleep(delay).await;
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};

    fn fast_policy(max_retries: usize) -> RetryPolicy {
        RetryPolicy {
            max_retries,
            initial_delay: Duration::from_millis(1),
            max_delay: Duration::from_millis(5),
            backoff_multiplier: 2.0,
        }
    }

    #[test]
    fn test_status_mapping() {
        assert!(matches!(
            status_error(StatusCode::UNAUTHORIZED, String::new(), "x"),
            UpstreamServiceError::AuthenticationFailed(_)
        ));
        assert!(matches!(
            status_error(StatusCode::NOT_FOUND, String::new(), "x"),
            UpstreamServiceError::NotFound(_)
        ));
        assert!(matches!(
            status_error(StatusCode::CONFLICT, String::new(), "x"),
            UpstreamServiceError::Conflict(_)
        ));
        assert!(matches!(
            status_error(StatusCode::BAD_GATEWAY, String::new(), "x"),
            UpstreamServiceError::ServerError { status: 502, .. }
        ));
        assert!(matches!(
            status_error(StatusCode::UNPROCESSABLE_ENTITY, "bad".to_string(), "x"),
            UpstreamServiceError::ClientError { status: 422, .. }
        ));
    }

    #[test]
    fn test_delay_backoff_is_capped() {
        let policy = RetryPolicy {
            max_retries: 5,
            initial_delay: Duration::from_millis(100),
            max_delay: Duration::from_millis(350),
            backoff_multiplier: 2.0,
        };
        assert_eq!(policy.delay_for(1), Duration::from_millis(100));
        assert_eq!(policy.delay_for(2), Duration::from_millis(200));
        assert_eq!(policy.delay_for(3), Duration::from_millis(350));
    }

    #[test]
    fn test_default_policy_never_retries() {
        assert_eq!(RetryPolicy::default().max_retries, 0);
    }

    #[tokio::test]
    async fn test_retries_retryable_errors() {
        let calls = AtomicUsize::new(0);
        let result = fast_policy(2)
            .run(|| async {
                if calls.fetch_add(1, Ordering::SeqCst) < 2 {
                    Err(UpstreamServiceError::Timeout("slow".to_string()).into())
                } else {
                    Ok(7)
                }
            })
            .await;
        assert_eq!(result.unwrap(), 7);
        assert_eq!(calls.load(Ordering::SeqCst), 3);
    }

    #[tokio::test]
    async fn test_does_not_retry_client_errors() {
        let calls = AtomicUsize::new(0);
        let result: Result<()> = fast_policy(3)
            .run(|| async {
                calls.fetch_add(1, Ordering::SeqCst);
                Err(UpstreamServiceError::Conflict("exists".to_string()).into())
            })
            .await;
        assert!(result.is_err());
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_gives_up_after_max_retries() {
        let calls = AtomicUsize::new(0);
        let result: Result<()> = fast_policy(1)
            .run(|| async {
                calls.fetch_add(1, Ordering::SeqCst);
                Err(UpstreamServiceError::ConnectionFailed("refused".to_string()).into())
            })
            .await;
        assert!(result.is_err());
        assert_eq!(calls.load(Ordering::SeqCst), 2);
    }
}
