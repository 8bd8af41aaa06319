//! Shared setup for the wiremock-backed tests.

#![allow(dead_code)]

use serde_json::{json, Value};
use skytap_provider::testing::ProviderTester;
use skytap_provider::SkytapProvider;
use wiremock::MockServer;

pub const USERNAME: &str = "tester";
pub const API_TOKEN: &str = "token";

/// Provider block pointing at `server`, with no waiting between retries or polls.
pub fn provider_config(server: &MockServer) -> Value {
    json!({
        "username": USERNAME,
        "api_token": API_TOKEN,
        "url": server.uri(),
        "max_retries": 3,
        "retry_after_seconds": 0,
        "poll_interval_seconds": 0,
        "timeout_seconds": 5
    })
}

/// A provider that ignores the process environment.
pub fn provider() -> SkytapProvider {
    SkytapProvider::with_env_lookup(|_| None)
}

/// A tester whose provider is configured against `server`.
pub async fn configured(server: &MockServer) -> ProviderTester<SkytapProvider> {
    let tester = ProviderTester::new(provider());
    tester
        .configure(provider_config(server))
        .await
        .expect("provider should configure");
    tester
}

pub fn template(id: &str, name: &str, created_at: &str) -> Value {
    json!({"id": id, "name": name, "created_at": created_at, "region": "US-West"})
}

pub fn environment(id: &str, name: &str, runstate: &str) -> Value {
    json!({
        "id": id,
        "name": name,
        "runstate": runstate,
        "outbound_traffic": false,
        "routable": false,
        "suspend_on_idle": null
    })
}
