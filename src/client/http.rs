//! HTTP transport for the Skytap REST API.

use std::time::Duration;

use reqwest::header::{HeaderMap, ACCEPT, RETRY_AFTER};
use reqwest::{Client, Method, StatusCode};
use serde::de::DeserializeOwned;
use serde::Serialize;
use tracing::{debug, error, warn};
use url::Url;

use crate::config::Settings;
use crate::error::ApiError;

/// Maximum length of response body to log
const MAX_LOG_BODY_LENGTH: usize = 200;

/// Truncate a response body and strip control characters before logging it.
fn sanitize_for_log(body: &str) -> String {
    let truncated = if body.len() > MAX_LOG_BODY_LENGTH {
        let mut end = MAX_LOG_BODY_LENGTH;
        while !body.is_char_boundary(end) {
            end -= 1;
        }
        format!("{}... [truncated, {} bytes total]", &body[..end], body.len())
    } else {
        body.to_string()
    };

    truncated.replace(|c: char| c.is_control(), "")
}

/// Pull a human-readable message out of a Skytap error body.
///
/// Skytap answers with either `{"error": "..."}` or `{"errors": ["...", ...]}`.
fn error_message(status: StatusCode, body: &str) -> String {
    if let Ok(value) = serde_json::from_str::<serde_json::Value>(body) {
        if let Some(msg) = value.get("error").and_then(|v| v.as_str()) {
            return msg.to_string();
        }
        if let Some(errors) = value.get("errors").and_then(|v| v.as_array()) {
            let joined = errors
                .iter()
                .filter_map(|e| e.as_str())
                .collect::<Vec<_>>()
                .join("; ");
            if !joined.is_empty() {
                return joined;
            }
        }
    }

    if body.trim().is_empty() {
        status
            .canonical_reason()
            .unwrap_or("unknown error")
            .to_string()
    } else {
        sanitize_for_log(body)
    }
}

fn retry_after(headers: &HeaderMap) -> Option<Duration> {
    headers
        .get(RETRY_AFTER)
        .and_then(|v| v.to_str().ok())
        .and_then(|v| v.trim().parse::<u64>().ok())
        .map(Duration::from_secs)
}

/// Skytap answers 423 while the target is busy and 429 when rate limiting.
fn is_retryable(status: StatusCode) -> bool {
    status == StatusCode::LOCKED || status == StatusCode::TOO_MANY_REQUESTS
}

/// Authenticated HTTP client for the Skytap API.
#[derive(Clone)]
pub struct SkytapHttpClient {
    client: Client,
    base_url: Url,
    username: String,
    api_token: String,
    max_retries: u32,
    retry_after: Duration,
}

impl std::fmt::Debug for SkytapHttpClient {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SkytapHttpClient")
            .field("base_url", &self.base_url.as_str())
            .field("username", &self.username)
            .field("max_retries", &self.max_retries)
            .finish_non_exhaustive()
    }
}

impl SkytapHttpClient {
    /// Create a new HTTP client from resolved settings.
    pub fn new(settings: &Settings) -> Result<Self, ApiError> {
        let client = Client::builder()
            .user_agent(concat!("skytap-provider/", env!("CARGO_PKG_VERSION")))
            .build()?;

        Ok(Self {
            client,
            base_url: settings.url.clone(),
            username: settings.username.clone(),
            api_token: settings.api_token.clone(),
            max_retries: settings.max_retries,
            retry_after: settings.retry_after,
        })
    }

    fn url(&self, path: &str) -> Result<Url, ApiError> {
        let base = self.base_url.as_str().trim_end_matches('/');
        Ok(Url::parse(&format!("{}{}", base, path))?)
    }

    /// Send a request, retrying busy and rate-limited answers, and return the raw body.
    async fn execute<B: Serialize + ?Sized>(
        &self,
        method: Method,
        path: &str,
        query: &[(&str, String)],
        body: Option<&B>,
    ) -> Result<String, ApiError> {
        let url = self.url(path)?;
        let mut attempt = 0u32;

        loop {
            debug!(method = %method, url = %url, attempt, "Skytap request");

            let mut request = self
                .client
                .request(method.clone(), url.clone())
                .basic_auth(&self.username, Some(&self.api_token))
                .header(ACCEPT, "application/json");
            if !query.is_empty() {
                request = request.query(query);
            }
            if let Some(body) = body {
                request = request.json(body);
            }

            let response = request.send().await?;
            let status = response.status();

            if is_retryable(status) && attempt < self.max_retries {
                let wait = retry_after(response.headers()).unwrap_or(self.retry_after);
                attempt += 1;
                warn!(
                    status = status.as_u16(),
                    url = %url,
                    attempt,
                    wait = ?wait,
                    "Skytap target busy, retrying"
                );
                tokio::time::sleep(wait).await;
                continue;
            }

            let text = response.text().await?;
            if !status.is_success() {
                error!(
                    status = status.as_u16(),
                    url = %url,
                    body = %sanitize_for_log(&text),
                    "Skytap API error"
                );
                return Err(ApiError::Http {
                    status: status.as_u16(),
                    message: error_message(status, &text),
                });
            }

            return Ok(text);
        }
    }

    /// GET a JSON document.
    pub async fn get<T: DeserializeOwned>(
        &self,
        path: &str,
        query: &[(&str, String)],
    ) -> Result<T, ApiError> {
        let body = self.execute::<()>(Method::GET, path, query, None).await?;
        Ok(serde_json::from_str(&body)?)
    }

    /// POST a JSON body and decode the JSON answer.
    pub async fn post<B, T>(&self, path: &str, body: Option<&B>) -> Result<T, ApiError>
    where
        B: Serialize + ?Sized,
        T: DeserializeOwned,
    {
        let text = self.execute(Method::POST, path, &[], body).await?;
        Ok(serde_json::from_str(&text)?)
    }

    /// POST without caring about the answer body.
    pub async fn post_empty(&self, path: &str) -> Result<(), ApiError> {
        self.execute::<()>(Method::POST, path, &[], None).await?;
        Ok(())
    }

    /// PUT a JSON body and decode the JSON answer.
    pub async fn put<B, T>(&self, path: &str, body: &B) -> Result<T, ApiError>
    where
        B: Serialize + ?Sized,
        T: DeserializeOwned,
    {
        let text = self.execute(Method::PUT, path, &[], Some(body)).await?;
        Ok(serde_json::from_str(&text)?)
    }

    /// DELETE an object. The answer body is ignored.
    pub async fn delete(&self, path: &str) -> Result<(), ApiError> {
        self.execute::<()>(Method::DELETE, path, &[], None).await?;
        Ok(())
    }
}
