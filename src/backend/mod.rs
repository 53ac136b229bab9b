//! Downstream storefront REST client.
//!
//! One `BackendClient` is constructed at process start and shared by every
//! tool handler via `Arc` — explicitly injected rather than hidden in a
//! module-level global.
//!
//! # Retry contract
//!
//! Requests that fail at the transport level or with a 5xx status are
//! retried with exponential backoff up to the configured attempt count.
//! Client errors (4xx) are never retried: the request is wrong, not the
//! connection. The dispatch layer above performs no retries of its own.
//!
//! Credential tokens are opaque pass-through: callers hand a bearer token
//! to the request helpers and it is attached verbatim, never logged.

use std::time::Duration;

use serde_json::Value;

use crate::config::BackendConfig;
use crate::error::BackendError;

/// HTTP client for the storefront API with retry and backoff.
#[derive(Debug, Clone)]
pub struct BackendClient {
    http: reqwest::Client,
    base_url: String,
    max_retries: u32,
    retry_base: Duration,
}

impl BackendClient {
    /// Creates a client from validated configuration.
    ///
    /// # Errors
    ///
    /// Returns an error if the underlying HTTP client cannot be built.
    pub fn new(config: &BackendConfig) -> Result<Self, BackendError> {
        let http = reqwest::Client::builder()
            .timeout(Duration::from_millis(config.timeout_ms))
            .build()?;

        Ok(Self {
            http,
            base_url: config.base_url.trim_end_matches('/').to_string(),
            max_retries: config.max_retries,
            retry_base: Duration::from_millis(config.retry_base_ms),
        })
    }

    /// Joins the base URL with an endpoint path.
    fn url(&self, path: &str) -> String {
        format!("{}{path}", self.base_url)
    }

    /// Backoff delay before retry number `attempt` (0-based).
    fn backoff_delay(&self, attempt: u32) -> Duration {
        self.retry_base * 2_u32.saturating_pow(attempt)
    }

    /// Performs a GET request with query parameters.
    ///
    /// # Errors
    ///
    /// Returns a [`BackendError`] when the request fails after retries or
    /// the response is not decodable JSON.
    pub async fn get(
        &self,
        path: &str,
        query: &[(&str, String)],
        token: Option<&str>,
    ) -> Result<Value, BackendError> {
        let mut request = self.http.get(self.url(path)).query(query);
        if let Some(token) = token {
            request = request.bearer_auth(token);
        }
        self.execute(path, request).await
    }

    /// Performs a POST request with a JSON body.
    ///
    /// # Errors
    ///
    /// Returns a [`BackendError`] when the request fails after retries or
    /// the response is not decodable JSON.
    pub async fn post(
        &self,
        path: &str,
        body: &Value,
        token: Option<&str>,
    ) -> Result<Value, BackendError> {
        let mut request = self.http.post(self.url(path)).json(body);
        if let Some(token) = token {
            request = request.bearer_auth(token);
        }
        self.execute(path, request).await
    }

    /// Sends a request, retrying retryable failures with backoff.
    async fn execute(
        &self,
        path: &str,
        request: reqwest::RequestBuilder,
    ) -> Result<Value, BackendError> {
        let mut attempt = 0_u32;

        loop {
            // JSON bodies are always clonable; a non-clonable request is
            // sent once without retry.
            let Some(this_try) = request.try_clone() else {
                return Self::dispatch(request).await;
            };

            match Self::dispatch(this_try).await {
                Ok(value) => return Ok(value),
                Err(e) if e.is_retryable() && attempt < self.max_retries => {
                    let delay = self.backoff_delay(attempt);
                    tracing::warn!(
                        path,
                        attempt,
                        delay_ms = delay.as_millis() as u64,
                        error = %e,
                        "Retrying backend request"
                    );
                    tokio::time::sleep(delay).await;
                    attempt += 1;
                }
                Err(e) => return Err(e),
            }
        }
    }

    /// Sends one request and maps the response.
    async fn dispatch(request: reqwest::RequestBuilder) -> Result<Value, BackendError> {
        let response = request.send().await?;
        let status = response.status();

        if status.is_success() {
            return response
                .json()
                .await
                .map_err(|e| BackendError::Decode {
                    message: e.to_string(),
                });
        }

        let body = response.text().await.unwrap_or_default();
        Err(BackendError::Status {
            status: status.as_u16(),
            body,
        })
    }
}
