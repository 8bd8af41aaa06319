//! `skytap_project` data source.

use serde::Serialize;
use serde_json::Value;
use tracing::info;

use super::{decode, encode, DataSource, Lookup};
use crate::client::SkytapClient;
use crate::error::ProviderError;
use crate::schema::{Attribute, Diagnostic, Schema};

const TYPE_NAME: &str = "skytap_project";

#[derive(Debug, Serialize)]
struct ProjectLookupState {
    id: String,
    name: String,
    summary: Option<String>,
    most_recent: Option<bool>,
}

/// Finds one project by a name pattern.
#[derive(Debug, Clone, Copy, Default)]
pub struct ProjectDataSource;

#[async_trait::async_trait]
impl DataSource for ProjectDataSource {
    fn type_name(&self) -> &'static str {
        TYPE_NAME
    }

    fn schema(&self) -> Schema {
        Lookup::schema("project").with_attribute(
            "summary",
            Attribute::computed_string().with_description("Summary of the project"),
        )
    }

    fn validate(&self, config: &Value) -> Vec<Diagnostic> {
        Lookup::validate(&self.schema(), config)
    }

    async fn read(&self, client: &SkytapClient, config: Value) -> Result<Value, ProviderError> {
        let lookup: Lookup = decode(TYPE_NAME, config)?;
        let projects = client.list_projects().await?;
        let project = lookup.resolve(&projects)?;
        info!(project = %project.id, name = %project.name, "project resolved");

        encode(&ProjectLookupState {
            id: project.id.clone(),
            name: project.name.clone(),
            summary: project.summary.clone(),
            most_recent: lookup.most_recent,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_summary_is_computed() {
        let ds = ProjectDataSource;
        assert!(ds.schema().attribute("summary").unwrap().flags.computed);
        assert!(ds.validate(&json!({"name": "p"})).is_empty());
        assert_eq!(ds.validate(&json!({"name": ""})).len(), 1);
    }
}
