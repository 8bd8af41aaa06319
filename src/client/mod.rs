//! Skytap REST API client.
//!
//! # Module Structure
//!
//! - [`http`] - authenticated transport with busy/rate-limit retries
//! - [`models`] - request and response bodies
//! - `templates`, `projects`, `environments`, `networks` - endpoint methods on [`SkytapClient`]
//!
//! The client is built once from [`Settings`] when the provider is configured
//! and handed to every resource operation by reference.

pub mod http;
pub mod models;

mod environments;
mod networks;
mod projects;
mod templates;

use serde::de::DeserializeOwned;
use std::time::Duration;

use crate::config::Settings;
use crate::error::ApiError;
use crate::lifecycle::PollPolicy;

use self::http::SkytapHttpClient;

/// Page size used by list endpoints.
const PAGE_SIZE: usize = 100;

/// Client for the Skytap API.
#[derive(Debug, Clone)]
pub struct SkytapClient {
    http: SkytapHttpClient,
    poll_interval: Duration,
    timeout: Duration,
}

impl SkytapClient {
    /// Build a client from resolved settings.
    pub fn new(settings: &Settings) -> Result<Self, ApiError> {
        Ok(Self {
            http: SkytapHttpClient::new(settings)?,
            poll_interval: settings.poll_interval,
            timeout: settings.timeout,
        })
    }

    /// Polling policy for waiting on environment readiness.
    pub fn poll_policy(&self) -> PollPolicy {
        PollPolicy::new(self.poll_interval, self.timeout)
    }

    /// Fetch every page of a `/v2` list endpoint.
    async fn list_all<T: DeserializeOwned>(&self, path: &str) -> Result<Vec<T>, ApiError> {
        let mut items = Vec::new();
        let mut offset = 0usize;

        loop {
            let page: Vec<T> = self
                .http
                .get(
                    path,
                    &[
                        ("count", PAGE_SIZE.to_string()),
                        ("offset", offset.to_string()),
                    ],
                )
                .await?;
            let len = page.len();
            items.extend(page);

            if len < PAGE_SIZE {
                return Ok(items);
            }
            offset += len;
        }
    }
}
