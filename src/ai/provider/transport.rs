//! Shared HTTP transport policy for the HTTP-based providers
//!
//! - redirects followed, at most [`MAX_REDIRECTS`]
//! - at most [`MAX_CONNECTIONS_PER_HOST`] requests in flight per transport; the
//!   admission permit lives as long as the response stream
//! - overall request timeout of [`REQUEST_TIMEOUT_SECS`]

use reqwest::header::RETRY_AFTER;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{OwnedSemaphorePermit, Semaphore};
use tracing::{debug, warn};

use crate::constants::network::{MAX_CONNECTIONS_PER_HOST, MAX_REDIRECTS, REQUEST_TIMEOUT_SECS};
use crate::types::{ErrorCategory, ErrorClassifier, LlmError, Result, WikiError};

#[derive(Debug, Clone)]
pub struct HttpTransport {
    client: reqwest::Client,
    permits: Arc<Semaphore>,
}

/// A successful response together with its admission permit
#[derive(Debug)]
pub struct AdmittedResponse {
    pub response: reqwest::Response,
    pub permit: OwnedSemaphorePermit,
}

impl HttpTransport {
    pub fn new() -> Result<Self> {
        let client = reqwest::Client::builder()
            .redirect(reqwest::redirect::Policy::limited(MAX_REDIRECTS))
            .pool_max_idle_per_host(MAX_CONNECTIONS_PER_HOST)
            .timeout(Duration::from_secs(REQUEST_TIMEOUT_SECS))
            .build()
            .map_err(|e| WikiError::LlmApi(format!("Failed to create HTTP client: {}", e)))?;

        Ok(Self {
            client,
            permits: Arc::new(Semaphore::new(MAX_CONNECTIONS_PER_HOST)),
        })
    }

    pub fn client(&self) -> &reqwest::Client {
        &self.client
    }

    /// Requests currently admitted
    pub fn in_flight(&self) -> usize {
        MAX_CONNECTIONS_PER_HOST - self.permits.available_permits()
    }

    /// Send once admitted; non-success statuses become categorised errors
    pub async fn send(
        &self,
        request: reqwest::RequestBuilder,
        provider: &str,
    ) -> Result<AdmittedResponse> {
        let permit = self
            .permits
            .clone()
            .acquire_owned()
            .await
            .map_err(|e| WikiError::LlmApi(format!("HTTP transport closed: {}", e)))?;

        let response = request.send().await.map_err(|e| {
            let category = if e.is_timeout() || e.is_connect() {
                ErrorCategory::Network
            } else {
                ErrorClassifier::classify(&e.to_string(), provider).category
            };
            WikiError::Llm(LlmError::with_provider(
                category,
                format!("{} request failed: {}", provider, e),
                provider,
            ))
        })?;

        let status = response.status();
        if !status.is_success() {
            let retry_after = response
                .headers()
                .get(RETRY_AFTER)
                .and_then(|v| v.to_str().ok())
                .and_then(|v| v.trim().parse::<u64>().ok())
                .map(Duration::from_secs);
            let body = response.text().await.unwrap_or_default();
            warn!("{} API error ({}): {}", provider, status, body);

            let mut error = ErrorClassifier::classify_http_status(
                status.as_u16(),
                &format!("{} API error ({}): {}", provider, status, body),
                provider,
            );
            if let Some(delay) = retry_after {
                error = error.retry_after(delay);
            }
            return Err(error.into());
        }

        debug!("{} responded with {}", provider, status);
        Ok(AdmittedResponse { response, permit })
    }
}
