//! Managed resources and data sources.
//!
//! Each resource is a unit struct implementing [`Resource`]; operations
//! decode the JSON state into a typed struct, call the Skytap API through the
//! [`SkytapClient`] they are handed, and encode the result back into state.
//! Data sources implement [`DataSource`] the same way.

pub mod environment;
pub mod network;
pub mod project;
pub mod project_data;
pub mod template;
pub mod timeouts;

use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use serde_json::Value;

use tracing::debug;

use crate::client::SkytapClient;
use crate::error::ProviderError;
use crate::resolver::{resolve, NamedEntity};
use crate::schema::{Attribute, Diagnostic, Schema};
use crate::types::{AttributeChange, PlanResult};
use crate::validation::{not_empty, string_attr, validate};

/// A resource type managed by the provider.
#[async_trait::async_trait]
pub trait Resource: Send + Sync {
    /// Name used in configuration, e.g. `skytap_network`.
    fn type_name(&self) -> &'static str;

    /// Attribute schema.
    fn schema(&self) -> Schema;

    /// Schema checks plus resource-specific value checks.
    fn validate(&self, config: &Value) -> Vec<Diagnostic> {
        validate(&self.schema(), config)
    }

    /// Create the object and return the state to record.
    async fn create(&self, client: &SkytapClient, planned: Value) -> Result<Value, ProviderError>;

    /// Refresh state. `None` when the object is gone.
    async fn read(&self, client: &SkytapClient, current: Value) -> Result<Option<Value>, ProviderError>;

    /// Apply planned changes in place.
    async fn update(
        &self,
        client: &SkytapClient,
        prior: Value,
        planned: Value,
    ) -> Result<Value, ProviderError>;

    /// Delete the object. Already-deleted objects are not an error.
    async fn delete(&self, client: &SkytapClient, current: Value) -> Result<(), ProviderError>;

    /// Build state for an existing object from its import id.
    async fn import(&self, client: &SkytapClient, id: &str) -> Result<Value, ProviderError> {
        let _ = (client, id);
        Err(ProviderError::Unimplemented(format!(
            "import is not supported for {}",
            self.type_name()
        )))
    }
}

/// A read-only lookup exposed to configuration.
#[async_trait::async_trait]
pub trait DataSource: Send + Sync {
    /// Name used in configuration, e.g. `skytap_template`.
    fn type_name(&self) -> &'static str;

    /// Attribute schema.
    fn schema(&self) -> Schema;

    /// Schema checks plus data-source-specific value checks.
    fn validate(&self, config: &Value) -> Vec<Diagnostic> {
        validate(&self.schema(), config)
    }

    /// Perform the lookup and return the data source state.
    async fn read(&self, client: &SkytapClient, config: Value) -> Result<Value, ProviderError>;
}

/// Every resource served by the provider.
pub fn all_resources() -> Vec<Box<dyn Resource>> {
    vec![
        Box::new(project::ProjectResource),
        Box::new(network::NetworkResource),
        Box::new(environment::EnvironmentResource),
    ]
}

/// Every data source served by the provider.
pub fn all_data_sources() -> Vec<Box<dyn DataSource>> {
    vec![
        Box::new(template::TemplateDataSource),
        Box::new(project_data::ProjectDataSource),
    ]
}

/// Configuration shared by the name lookup data sources.
#[derive(Debug, Clone, Deserialize)]
pub(crate) struct Lookup {
    pub name: String,
    #[serde(default)]
    pub most_recent: Option<bool>,
}

impl Lookup {
    /// Schema with the lookup inputs plus the computed `id`.
    pub(crate) fn schema(kind: &str) -> Schema {
        Schema::v0()
            .with_description(format!("Look up a Skytap {} by name", kind))
            .with_attribute("id", Attribute::computed_string())
            .with_attribute(
                "name",
                Attribute::required_string().with_description(format!(
                    "A regex expression for the name of the {}",
                    kind
                )),
            )
            .with_attribute(
                "most_recent",
                Attribute::optional_bool().with_description(format!(
                    "Use the most recently created {} from the returned list",
                    kind
                )),
            )
    }

    /// Schema checks plus a non-empty pattern.
    pub(crate) fn validate(schema: &Schema, config: &Value) -> Vec<Diagnostic> {
        let mut diagnostics = validate(schema, config);
        diagnostics.extend(string_attr(config, "name").and_then(|v| not_empty("name", v)));
        diagnostics
    }

    /// Pick the one entity the lookup names.
    pub(crate) fn resolve<'a, T: NamedEntity>(&self, entities: &'a [T]) -> Result<&'a T, ProviderError> {
        let allow_ambiguous = self.most_recent.unwrap_or(false);
        debug!(
            kind = T::KIND,
            pattern = %self.name,
            candidates = entities.len(),
            most_recent = allow_ambiguous,
            "resolving name"
        );
        Ok(resolve(entities, &self.name, allow_ambiguous)?)
    }
}

/// Decode state or configuration into a typed struct.
pub(crate) fn decode<T: DeserializeOwned>(kind: &str, value: Value) -> Result<T, ProviderError> {
    serde_json::from_value(value)
        .map_err(|e| ProviderError::InvalidRequest(format!("invalid {} state: {}", kind, e)))
}

/// Encode a typed state struct.
pub(crate) fn encode<T: Serialize>(state: &T) -> Result<Value, ProviderError> {
    Ok(serde_json::to_value(state)?)
}

/// Report `err` from a create whose remote object already exists, carrying
/// `state` so the object stays tracked instead of being orphaned.
pub(crate) fn created_but_failed<T: Serialize>(state: &T, err: ProviderError) -> ProviderError {
    match encode(state) {
        Ok(state) => ProviderError::incomplete(state, err),
        Err(_) => err,
    }
}

/// The `id` recorded in state, required by read, update and delete.
pub(crate) fn require_id<'a>(kind: &str, id: &'a Option<String>) -> Result<&'a str, ProviderError> {
    id.as_deref()
        .filter(|id| !id.is_empty())
        .ok_or_else(|| ProviderError::InvalidRequest(format!("{} state has no id", kind)))
}

/// Compute a plan from the schema alone.
///
/// - A null `proposed` destroys the resource.
/// - Unset attributes with a default get the default.
/// - Unset computed attributes keep their prior value unless the resource is
///   being replaced, in which case Skytap assigns them again.
/// - Any change to a known `force_new` attribute of an existing resource
///   requires replacement.
pub fn plan(schema: &Schema, prior: Option<&Value>, proposed: Value) -> Result<PlanResult, ProviderError> {
    if proposed.is_null() {
        return Ok(match prior {
            Some(prior) => PlanResult::destroy(prior),
            None => PlanResult::no_change(Value::Null),
        });
    }

    let Value::Object(mut planned) = proposed else {
        return Err(ProviderError::InvalidRequest(
            "proposed state must be an object".to_string(),
        ));
    };
    let prior_obj = prior.and_then(Value::as_object);
    let prior_value = |name: &str| {
        prior_obj
            .and_then(|obj| obj.get(name))
            .cloned()
            .unwrap_or(Value::Null)
    };

    for (name, attr) in &schema.block.attributes {
        let unset = planned.get(name).map_or(true, Value::is_null);
        if unset {
            if let Some(default) = &attr.default {
                planned.insert(name.clone(), default.clone());
            }
        }
    }

    // An imported resource may not know a force-new attribute yet; filling it
    // in is not a replacement.
    let requires_replace = schema.block.attributes.iter().any(|(name, attr)| {
        let before = prior_value(name);
        attr.force_new
            && !before.is_null()
            && planned.get(name).cloned().unwrap_or(Value::Null) != before
    });

    if !requires_replace {
        for (name, attr) in &schema.block.attributes {
            let unset = planned.get(name).map_or(true, Value::is_null);
            if attr.flags.computed && unset {
                let carried = prior_value(name);
                if !carried.is_null() {
                    planned.insert(name.clone(), carried);
                }
            }
        }
    }

    let mut names: Vec<&String> = schema
        .block
        .attributes
        .keys()
        .chain(schema.block.blocks.keys())
        .collect();
    names.sort();

    let changes = names
        .into_iter()
        .filter_map(|name| {
            let before = prior_value(name);
            let after = planned.get(name).cloned().unwrap_or(Value::Null);
            match (before.is_null(), after.is_null()) {
                (true, true) => None,
                _ if before == after => None,
                (true, false) => Some(AttributeChange::added(name.as_str(), after)),
                (false, true) => Some(AttributeChange::removed(name.as_str(), before)),
                (false, false) => Some(AttributeChange::modified(name.as_str(), before, after)),
            }
        })
        .collect();

    Ok(PlanResult::with_changes(
        Value::Object(planned),
        changes,
        requires_replace,
    ))
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn schema() -> Schema {
        Schema::v0()
            .with_attribute("id", Attribute::computed_string())
            .with_attribute("environment_id", Attribute::required_string().with_force_new())
            .with_attribute("name", Attribute::required_string())
            .with_attribute("gateway", Attribute::optional_computed_string())
            .with_attribute("tunnelable", Attribute::optional_bool().with_default(json!(false)))
    }

    #[test]
    fn test_plan_create_applies_defaults() {
        let result = plan(&schema(), None, json!({"environment_id": "1", "name": "net"})).unwrap();

        assert_eq!(result.planned_state["tunnelable"], json!(false));
        assert!(!result.requires_replace);
        let paths: Vec<&str> = result.changes.iter().map(|c| c.path.as_str()).collect();
        assert_eq!(paths, vec!["environment_id", "name", "tunnelable"]);
    }

    #[test]
    fn test_plan_update_carries_computed() {
        let prior = json!({
            "id": "7",
            "environment_id": "1",
            "name": "net",
            "gateway": "10.0.0.254",
            "tunnelable": false
        });
        let result = plan(&schema(), Some(&prior), json!({"environment_id": "1", "name": "renamed"})).unwrap();

        assert_eq!(result.planned_state["id"], "7");
        assert_eq!(result.planned_state["gateway"], "10.0.0.254");
        assert!(!result.requires_replace);
        assert_eq!(result.changes.len(), 1);
        assert_eq!(result.changes[0].path, "name");
    }

    #[test]
    fn test_plan_force_new_replaces() {
        let prior = json!({"id": "7", "environment_id": "1", "name": "net", "gateway": "10.0.0.254", "tunnelable": false});
        let result = plan(&schema(), Some(&prior), json!({"environment_id": "2", "name": "net"})).unwrap();

        assert!(result.requires_replace);
        assert!(result.planned_state.get("id").is_none());
        assert!(result.changes.iter().any(|c| c.path == "environment_id"));
    }

    #[test]
    fn test_plan_fills_unknown_force_new_without_replacing() {
        let prior = json!({"id": "7", "environment_id": null, "name": "net", "gateway": null, "tunnelable": false});
        let result = plan(&schema(), Some(&prior), json!({"environment_id": "1", "name": "net"})).unwrap();
        assert!(!result.requires_replace);
        assert_eq!(result.planned_state["id"], "7");
    }

    #[test]
    fn test_plan_no_changes() {
        let prior = json!({"id": "7", "environment_id": "1", "name": "net", "gateway": null, "tunnelable": false});
        let result = plan(&schema(), Some(&prior), json!({"environment_id": "1", "name": "net"})).unwrap();
        assert!(!result.has_changes());
    }

    #[test]
    fn test_plan_destroy() {
        let prior = json!({"id": "7", "name": "net"});
        let result = plan(&schema(), Some(&prior), Value::Null).unwrap();
        assert!(result.planned_state.is_null());
        assert_eq!(result.changes.len(), 2);

        let result = plan(&schema(), None, Value::Null).unwrap();
        assert!(!result.has_changes());
    }

    #[test]
    fn test_plan_rejects_non_object() {
        assert!(matches!(
            plan(&schema(), None, json!("net")),
            Err(ProviderError::InvalidRequest(_))
        ));
    }

    #[test]
    fn test_require_id() {
        assert_eq!(require_id("network", &Some("7".to_string())).unwrap(), "7");
        assert!(require_id("network", &Some(String::new())).is_err());
        assert!(require_id("network", &None).is_err());
    }
}
