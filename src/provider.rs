//! The Skytap provider: dispatches [`ProviderService`] calls to resources.

use std::sync::Arc;

use serde_json::Value;
use tokio::sync::RwLock;
use tracing::{debug, info};

use crate::client::SkytapClient;
use crate::config::{provider_schema, ProviderConfig};
use crate::error::ProviderError;
use crate::resources::{self, DataSource, Resource};
use crate::schema::{has_errors, Diagnostic, ProviderSchema};
use crate::server::ProviderService;
use crate::types::{ImportedResource, PlanResult};
use crate::validation::validate;

type EnvLookup = Box<dyn Fn(&str) -> Option<String> + Send + Sync>;

/// Provider serving the Skytap resources and data sources.
///
/// The API client is built by [`ProviderService::configure`]; every other
/// operation fails with [`ProviderError::Configuration`] until then.
pub struct SkytapProvider {
    client: RwLock<Option<Arc<SkytapClient>>>,
    resources: Vec<Box<dyn Resource>>,
    data_sources: Vec<Box<dyn DataSource>>,
    env: EnvLookup,
}

impl Default for SkytapProvider {
    fn default() -> Self {
        Self::new()
    }
}

impl SkytapProvider {
    /// Provider reading credential fallbacks from the process environment.
    pub fn new() -> Self {
        Self::with_env_lookup(|key| std::env::var(key).ok())
    }

    /// Provider reading credential fallbacks through `lookup`.
    pub fn with_env_lookup<F>(lookup: F) -> Self
    where
        F: Fn(&str) -> Option<String> + Send + Sync + 'static,
    {
        Self {
            client: RwLock::new(None),
            resources: resources::all_resources(),
            data_sources: resources::all_data_sources(),
            env: Box::new(lookup),
        }
    }

    /// Whether `configure` has succeeded.
    pub async fn is_configured(&self) -> bool {
        self.client.read().await.is_some()
    }

    async fn client(&self) -> Result<Arc<SkytapClient>, ProviderError> {
        self.client
            .read()
            .await
            .clone()
            .ok_or_else(|| ProviderError::Configuration("provider is not configured".to_string()))
    }

    fn resource(&self, resource_type: &str) -> Result<&dyn Resource, ProviderError> {
        self.resources
            .iter()
            .find(|r| r.type_name() == resource_type)
            .map(|r| r.as_ref())
            .ok_or_else(|| ProviderError::UnknownResource(resource_type.to_string()))
    }

    fn data_source(&self, data_source_type: &str) -> Result<&dyn DataSource, ProviderError> {
        self.data_sources
            .iter()
            .find(|d| d.type_name() == data_source_type)
            .map(|d| d.as_ref())
            .ok_or_else(|| ProviderError::UnknownResource(data_source_type.to_string()))
    }
}

fn decode_config(config: Value) -> Result<ProviderConfig, Vec<Diagnostic>> {
    ProviderConfig::from_value(config).map_err(|e| {
        vec![Diagnostic::error("Invalid provider configuration").with_detail(e.to_string())]
    })
}

#[async_trait::async_trait]
impl ProviderService for SkytapProvider {
    fn schema(&self) -> ProviderSchema {
        let schema = ProviderSchema::new().with_provider_config(provider_schema());
        let schema = self
            .resources
            .iter()
            .fold(schema, |s, r| s.with_resource(r.type_name(), r.schema()));
        self.data_sources
            .iter()
            .fold(schema, |s, d| s.with_data_source(d.type_name(), d.schema()))
    }

    async fn validate_provider_config(&self, config: Value) -> Result<Vec<Diagnostic>, ProviderError> {
        let diagnostics = validate(&provider_schema(), &config);
        if has_errors(&diagnostics) {
            return Ok(diagnostics);
        }
        Ok(decode_config(config).err().unwrap_or_default())
    }

    async fn configure(&self, config: Value) -> Result<Vec<Diagnostic>, ProviderError> {
        let diagnostics = validate(&provider_schema(), &config);
        if has_errors(&diagnostics) {
            return Ok(diagnostics);
        }
        let settings = match decode_config(config).and_then(|c| c.resolve_with(|key| (self.env)(key))) {
            Ok(settings) => settings,
            Err(diagnostics) => return Ok(diagnostics),
        };

        let client = SkytapClient::new(&settings)
            .map_err(|e| ProviderError::Configuration(format!("cannot build Skytap client: {}", e)))?;
        info!(url = %settings.url, username = %settings.username, "Skytap client ready");
        *self.client.write().await = Some(Arc::new(client));
        Ok(vec![])
    }

    async fn stop(&self) -> Result<(), ProviderError> {
        debug!("dropping Skytap client");
        self.client.write().await.take();
        Ok(())
    }

    async fn validate_resource_config(
        &self,
        resource_type: &str,
        config: Value,
    ) -> Result<Vec<Diagnostic>, ProviderError> {
        Ok(self.resource(resource_type)?.validate(&config))
    }

    async fn plan(
        &self,
        resource_type: &str,
        prior_state: Option<Value>,
        proposed_state: Value,
        _config: Value,
    ) -> Result<PlanResult, ProviderError> {
        let resource = self.resource(resource_type)?;
        resources::plan(&resource.schema(), prior_state.as_ref(), proposed_state)
    }

    async fn create(&self, resource_type: &str, planned_state: Value) -> Result<Value, ProviderError> {
        let resource = self.resource(resource_type)?;
        let client = self.client().await?;
        resource.create(&client, planned_state).await
    }

    async fn read(&self, resource_type: &str, current_state: Value) -> Result<Option<Value>, ProviderError> {
        let resource = self.resource(resource_type)?;
        let client = self.client().await?;
        resource.read(&client, current_state).await
    }

    async fn update(
        &self,
        resource_type: &str,
        prior_state: Value,
        planned_state: Value,
    ) -> Result<Value, ProviderError> {
        let resource = self.resource(resource_type)?;
        let client = self.client().await?;
        resource.update(&client, prior_state, planned_state).await
    }

    async fn delete(&self, resource_type: &str, current_state: Value) -> Result<(), ProviderError> {
        let resource = self.resource(resource_type)?;
        let client = self.client().await?;
        resource.delete(&client, current_state).await
    }

    async fn import_resource(
        &self,
        resource_type: &str,
        id: &str,
    ) -> Result<Vec<ImportedResource>, ProviderError> {
        let resource = self.resource(resource_type)?;
        let client = self.client().await?;
        let state = resource.import(&client, id).await?;
        Ok(vec![ImportedResource::new(resource_type, state)])
    }

    async fn validate_data_source_config(
        &self,
        data_source_type: &str,
        config: Value,
    ) -> Result<Vec<Diagnostic>, ProviderError> {
        Ok(self.data_source(data_source_type)?.validate(&config))
    }

    async fn read_data_source(&self, data_source_type: &str, config: Value) -> Result<Value, ProviderError> {
        let data_source = self.data_source(data_source_type)?;
        let client = self.client().await?;
        data_source.read(&client, config).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn provider() -> SkytapProvider {
        SkytapProvider::with_env_lookup(|_| None)
    }

    #[test]
    fn test_metadata_lists_everything_sorted() {
        let metadata = provider().metadata();
        assert_eq!(
            metadata.resources,
            vec!["skytap_environment", "skytap_network", "skytap_project"]
        );
        assert_eq!(metadata.data_sources, vec!["skytap_project", "skytap_template"]);
    }

    #[tokio::test]
    async fn test_configure_requires_credentials() {
        let provider = provider();
        let diagnostics = provider.configure(json!({})).await.unwrap();
        assert_eq!(diagnostics.len(), 2);
        assert!(!provider.is_configured().await);

        let diagnostics = provider
            .configure(json!({"username": "alice", "api_token": "secret"}))
            .await
            .unwrap();
        assert!(diagnostics.is_empty());
        assert!(provider.is_configured().await);

        provider.stop().await.unwrap();
        assert!(!provider.is_configured().await);
    }

    #[tokio::test]
    async fn test_configure_uses_env_lookup() {
        let provider = SkytapProvider::with_env_lookup(|key| match key {
            "SKYTAP_USERNAME" => Some("bob".to_string()),
            "SKYTAP_API_TOKEN" => Some("token".to_string()),
            _ => None,
        });
        assert!(provider.configure(Value::Null).await.unwrap().is_empty());
        assert!(provider.is_configured().await);
    }

    #[tokio::test]
    async fn test_validate_provider_config() {
        let provider = provider();
        assert!(provider.validate_provider_config(json!({})).await.unwrap().is_empty());

        let diagnostics = provider
            .validate_provider_config(json!({"max_retries": "many"}))
            .await
            .unwrap();
        assert_eq!(diagnostics.len(), 1);
        assert_eq!(diagnostics[0].attribute.as_deref(), Some("max_retries"));
    }

    #[tokio::test]
    async fn test_operations_need_configure() {
        let provider = provider();
        let err = provider
            .create("skytap_project", json!({"name": "p"}))
            .await
            .unwrap_err();
        assert!(matches!(err, ProviderError::Configuration(_)));

        let err = provider
            .read_data_source("skytap_template", json!({"name": "x"}))
            .await
            .unwrap_err();
        assert!(matches!(err, ProviderError::Configuration(_)));
    }

    #[tokio::test]
    async fn test_unknown_types() {
        let provider = provider();
        assert!(matches!(
            provider.validate_resource_config("skytap_vm", json!({})).await,
            Err(ProviderError::UnknownResource(_))
        ));
        assert!(matches!(
            provider.read_data_source("skytap_vm", json!({})).await,
            Err(ProviderError::UnknownResource(_))
        ));
    }

    #[tokio::test]
    async fn test_plan_dispatches_to_resource_schema() {
        let result = provider()
            .plan("skytap_project", None, json!({"name": "p"}), json!({"name": "p"}))
            .await
            .unwrap();
        assert_eq!(result.planned_state["show_project_members"], true);
        assert_eq!(result.planned_state["auto_add_role_name"], "");
    }
}
