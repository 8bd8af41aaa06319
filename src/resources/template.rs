//! `skytap_template` data source.

use serde::Serialize;
use serde_json::Value;
use tracing::info;

use super::{decode, encode, DataSource, Lookup};
use crate::client::SkytapClient;
use crate::error::ProviderError;
use crate::schema::{Diagnostic, Schema};

const TYPE_NAME: &str = "skytap_template";

#[derive(Debug, Serialize)]
struct TemplateState {
    id: String,
    name: String,
    most_recent: Option<bool>,
}

/// Finds one template by a name pattern.
#[derive(Debug, Clone, Copy, Default)]
pub struct TemplateDataSource;

#[async_trait::async_trait]
impl DataSource for TemplateDataSource {
    fn type_name(&self) -> &'static str {
        TYPE_NAME
    }

    fn schema(&self) -> Schema {
        Lookup::schema("template")
    }

    fn validate(&self, config: &Value) -> Vec<Diagnostic> {
        Lookup::validate(&self.schema(), config)
    }

    async fn read(&self, client: &SkytapClient, config: Value) -> Result<Value, ProviderError> {
        let lookup: Lookup = decode(TYPE_NAME, config)?;
        let templates = client.list_templates().await?;
        let template = lookup.resolve(&templates)?;
        info!(template = %template.id, name = %template.name, "template resolved");

        encode(&TemplateState {
            id: template.id.clone(),
            name: template.name.clone(),
            most_recent: lookup.most_recent,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_validate() {
        let ds = TemplateDataSource;
        assert!(ds.validate(&json!({"name": "Ubuntu"})).is_empty());
        assert!(ds.validate(&json!({"name": "Ubuntu", "most_recent": true})).is_empty());
        assert_eq!(ds.validate(&json!({"name": ""})).len(), 1);
        assert_eq!(ds.validate(&json!({})).len(), 1);
        assert_eq!(ds.validate(&json!({"name": "Ubuntu", "most_recent": "yes"})).len(), 1);
    }

    #[test]
    fn test_schema() {
        let schema = TemplateDataSource.schema();
        assert!(schema.attribute("id").unwrap().flags.computed);
        assert!(schema.attribute("name").unwrap().flags.required);
        assert!(schema.attribute("most_recent").unwrap().flags.optional);
    }
}
