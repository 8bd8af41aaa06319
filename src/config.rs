//! Provider configuration.
//!
//! The host sends the provider block as JSON during `Configure`. Credentials
//! missing from the block are taken from the environment:
//!
//! - `SKYTAP_USERNAME`
//! - `SKYTAP_API_TOKEN`
//! - `SKYTAP_URL` (defaults to [`DEFAULT_URL`])
//!
//! The resolved [`Settings`] are used to build the API client that every
//! resource operation receives by reference.

use std::time::Duration;

use serde::Deserialize;
use url::Url;

use crate::schema::{Attribute, Diagnostic, Schema};

/// Skytap API endpoint used when none is configured.
pub const DEFAULT_URL: &str = "https://cloud.skytap.com";

/// Default number of retries for busy (423) and rate-limited (429) responses.
pub const DEFAULT_MAX_RETRIES: u32 = 11;

/// Default wait between retries when the API gives no `Retry-After`.
pub const DEFAULT_RETRY_AFTER: Duration = Duration::from_secs(10);

/// Default interval between readiness polls.
pub const DEFAULT_POLL_INTERVAL: Duration = Duration::from_secs(10);

/// Default create/update/delete timeout.
pub const DEFAULT_TIMEOUT: Duration = Duration::from_secs(10 * 60);

/// Raw provider block as written by the user.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct ProviderConfig {
    /// Skytap account username.
    #[serde(default)]
    pub username: Option<String>,
    /// Skytap API security token.
    #[serde(default)]
    pub api_token: Option<String>,
    /// Base URL of the Skytap API.
    #[serde(default)]
    pub url: Option<String>,
    /// Retries for busy or rate-limited responses.
    #[serde(default)]
    pub max_retries: Option<u32>,
    /// Fallback wait between retries, in seconds.
    #[serde(default)]
    pub retry_after_seconds: Option<u64>,
    /// Interval between readiness polls, in seconds.
    #[serde(default)]
    pub poll_interval_seconds: Option<u64>,
    /// Timeout for create/update/delete operations, in seconds.
    #[serde(default)]
    pub timeout_seconds: Option<u64>,
}

/// Validated settings used to build the API client.
#[derive(Debug, Clone)]
pub struct Settings {
    /// Skytap account username.
    pub username: String,
    /// Skytap API security token.
    pub api_token: String,
    /// Base URL of the Skytap API.
    pub url: Url,
    /// Retries for busy or rate-limited responses.
    pub max_retries: u32,
    /// Fallback wait between retries.
    pub retry_after: Duration,
    /// Interval between readiness polls.
    pub poll_interval: Duration,
    /// Timeout for create/update/delete operations.
    pub timeout: Duration,
}

impl ProviderConfig {
    /// Decode the provider block. A null block is treated as empty.
    pub fn from_value(value: serde_json::Value) -> Result<Self, serde_json::Error> {
        if value.is_null() {
            return Ok(Self::default());
        }
        serde_json::from_value(value)
    }

    /// Resolve against the process environment.
    pub fn resolve(self) -> Result<Settings, Vec<Diagnostic>> {
        self.resolve_with(|key| std::env::var(key).ok())
    }

    /// Resolve using `lookup` for environment fallbacks.
    pub fn resolve_with<F>(self, lookup: F) -> Result<Settings, Vec<Diagnostic>>
    where
        F: Fn(&str) -> Option<String>,
    {
        let mut diagnostics = Vec::new();

        let username = non_empty(self.username).or_else(|| non_empty(lookup("SKYTAP_USERNAME")));
        if username.is_none() {
            diagnostics.push(
                Diagnostic::error("Missing Skytap username")
                    .with_detail("Set `username` in the provider block or SKYTAP_USERNAME")
                    .with_attribute("username"),
            );
        }

        let api_token =
            non_empty(self.api_token).or_else(|| non_empty(lookup("SKYTAP_API_TOKEN")));
        if api_token.is_none() {
            diagnostics.push(
                Diagnostic::error("Missing Skytap API token")
                    .with_detail("Set `api_token` in the provider block or SKYTAP_API_TOKEN")
                    .with_attribute("api_token"),
            );
        }

        let raw_url = non_empty(self.url)
            .or_else(|| non_empty(lookup("SKYTAP_URL")))
            .unwrap_or_else(|| DEFAULT_URL.to_string());
        let url = match Url::parse(&raw_url) {
            Ok(url) if matches!(url.scheme(), "http" | "https") => Some(url),
            Ok(url) => {
                diagnostics.push(
                    Diagnostic::error("Invalid Skytap URL")
                        .with_detail(format!("Unsupported scheme '{}'", url.scheme()))
                        .with_attribute("url"),
                );
                None
            },
            Err(e) => {
                diagnostics.push(
                    Diagnostic::error("Invalid Skytap URL")
                        .with_detail(format!("'{}': {}", raw_url, e))
                        .with_attribute("url"),
                );
                None
            },
        };

        match (username, api_token, url) {
            (Some(username), Some(api_token), Some(url)) if diagnostics.is_empty() => {
                Ok(Settings {
                    username,
                    api_token,
                    url,
                    max_retries: self.max_retries.unwrap_or(DEFAULT_MAX_RETRIES),
                    retry_after: self
                        .retry_after_seconds
                        .map(Duration::from_secs)
                        .unwrap_or(DEFAULT_RETRY_AFTER),
                    poll_interval: self
                        .poll_interval_seconds
                        .map(Duration::from_secs)
                        .unwrap_or(DEFAULT_POLL_INTERVAL),
                    timeout: self
                        .timeout_seconds
                        .map(Duration::from_secs)
                        .unwrap_or(DEFAULT_TIMEOUT),
                })
            },
            _ => Err(diagnostics),
        }
    }
}

fn non_empty(value: Option<String>) -> Option<String> {
    value.filter(|v| !v.trim().is_empty())
}

/// Schema of the provider block.
pub fn provider_schema() -> Schema {
    Schema::v0()
        .with_attribute(
            "username",
            Attribute::optional_string().with_description(
                "Skytap username. Can also be set with the SKYTAP_USERNAME environment variable",
            ),
        )
        .with_attribute(
            "api_token",
            Attribute::optional_string()
                .sensitive()
                .with_description(
                    "Skytap API token. Can also be set with the SKYTAP_API_TOKEN environment variable",
                ),
        )
        .with_attribute(
            "url",
            Attribute::optional_string()
                .with_description("Skytap API endpoint. Defaults to https://cloud.skytap.com"),
        )
        .with_attribute(
            "max_retries",
            Attribute::optional_int64()
                .with_description("Retries when Skytap reports the target as busy or rate limited"),
        )
        .with_attribute(
            "retry_after_seconds",
            Attribute::optional_int64()
                .with_description("Wait between retries when Skytap sends no Retry-After header"),
        )
        .with_attribute(
            "poll_interval_seconds",
            Attribute::optional_int64()
                .with_description("Interval between environment readiness checks"),
        )
        .with_attribute(
            "timeout_seconds",
            Attribute::optional_int64()
                .with_description("Timeout for create, update and delete operations"),
        )
}
