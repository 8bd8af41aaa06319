//! `skytap_project`: a project and the environments assigned to it.

use std::collections::BTreeSet;

use serde::{Deserialize, Serialize};
use serde_json::Value;
use tracing::{debug, info};

use super::{created_but_failed, decode, encode, require_id, Resource};
use crate::client::models::{Project, ProjectRequest, PROJECT_ROLES};
use crate::client::SkytapClient;
use crate::error::ProviderError;
use crate::lifecycle::{Lifecycle, LifecycleState};
use crate::schema::{Attribute, AttributeFlags, AttributeType, Diagnostic, Schema};
use crate::validation::{one_of, string_attr, string_len_between, validate};

const TYPE_NAME: &str = "skytap_project";

fn default_true() -> bool {
    true
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
struct ProjectState {
    #[serde(default)]
    id: Option<String>,
    name: String,
    #[serde(default)]
    summary: Option<String>,
    #[serde(default)]
    auto_add_role_name: String,
    #[serde(default = "default_true")]
    show_project_members: bool,
    /// `None` leaves project membership unmanaged.
    #[serde(default)]
    environment_ids: Option<BTreeSet<String>>,
}

impl ProjectState {
    fn from_api(project: Project, environment_ids: Option<BTreeSet<String>>) -> Self {
        Self {
            id: Some(project.id),
            name: project.name,
            summary: project.summary,
            auto_add_role_name: project.auto_add_role_name.unwrap_or_default(),
            show_project_members: project.show_project_members.unwrap_or(true),
            environment_ids,
        }
    }

    fn request(&self) -> ProjectRequest {
        ProjectRequest {
            name: self.name.clone(),
            summary: self.summary.clone(),
            auto_add_role_name: self.auto_add_role_name.clone(),
            show_project_members: self.show_project_members,
        }
    }
}

/// Environments to add and remove to get from `current` to `wanted`.
fn membership_changes<'a>(
    current: &'a BTreeSet<String>,
    wanted: &'a BTreeSet<String>,
) -> (Vec<&'a str>, Vec<&'a str>) {
    let add = wanted.difference(current).map(String::as_str).collect();
    let remove = current.difference(wanted).map(String::as_str).collect();
    (add, remove)
}

async fn environment_ids(client: &SkytapClient, id: &str) -> Result<BTreeSet<String>, ProviderError> {
    Ok(client
        .list_project_environments(id)
        .await?
        .into_iter()
        .map(|env| env.id)
        .collect())
}

async fn apply_membership(
    client: &SkytapClient,
    id: &str,
    current: &BTreeSet<String>,
    wanted: &BTreeSet<String>,
) -> Result<(), ProviderError> {
    let (add, remove) = membership_changes(current, wanted);
    for env_id in add {
        debug!(project = id, environment = env_id, "adding environment to project");
        client.add_project_environment(id, env_id).await?;
    }
    for env_id in remove {
        debug!(project = id, environment = env_id, "removing environment from project");
        match client.remove_project_environment(id, env_id).await {
            Err(e) if !e.is_not_found() => return Err(e.into()),
            _ => {},
        }
    }
    Ok(())
}

/// The `skytap_project` resource.
#[derive(Debug, Clone, Copy, Default)]
pub struct ProjectResource;

#[async_trait::async_trait]
impl Resource for ProjectResource {
    fn type_name(&self) -> &'static str {
        TYPE_NAME
    }

    fn schema(&self) -> Schema {
        Schema::v0()
            .with_description("A Skytap project")
            .with_attribute("id", Attribute::computed_string())
            .with_attribute(
                "name",
                Attribute::required_string().with_description("Name of the project"),
            )
            .with_attribute(
                "summary",
                Attribute::optional_string().with_description("Short description of the project"),
            )
            .with_attribute(
                "auto_add_role_name",
                Attribute::optional_string()
                    .with_default(Value::String(String::new()))
                    .with_description(
                        "Role granted automatically to new users: viewer, participant, editor or manager",
                    ),
            )
            .with_attribute(
                "show_project_members",
                Attribute::optional_bool()
                    .with_default(Value::Bool(true))
                    .with_description("Whether project members can see each other"),
            )
            .with_attribute(
                "environment_ids",
                Attribute::new(AttributeType::set(AttributeType::String), AttributeFlags::optional())
                    .with_description("IDs of the environments in the project"),
            )
    }

    fn validate(&self, config: &Value) -> Vec<Diagnostic> {
        let mut diagnostics = validate(&self.schema(), config);
        diagnostics.extend(string_attr(config, "name").and_then(|v| string_len_between("name", v, 1, 255)));
        diagnostics.extend(
            string_attr(config, "auto_add_role_name")
                .and_then(|v| one_of("auto_add_role_name", v, PROJECT_ROLES)),
        );
        diagnostics
    }

    async fn create(&self, client: &SkytapClient, planned: Value) -> Result<Value, ProviderError> {
        let wanted: ProjectState = decode(TYPE_NAME, planned)?;
        let mut lifecycle = Lifecycle::new(format!("{}.{}", TYPE_NAME, wanted.name));
        lifecycle.transition(LifecycleState::Creating)?;

        let request = wanted.request();
        let project = lifecycle
            .step(async { Ok(client.create_project(&request).await?) })
            .await?;
        info!(project = %project.id, name = %project.name, "project created");

        if let Some(ids) = &wanted.environment_ids {
            let added = lifecycle
                .step(apply_membership(client, &project.id, &BTreeSet::new(), ids))
                .await;
            if let Err(e) = added {
                // Membership is re-read on refresh, so an empty set is enough here.
                let partial = ProjectState::from_api(project, Some(BTreeSet::new()));
                return Err(created_but_failed(&partial, e));
            }
        }
        lifecycle.finish()?;

        encode(&ProjectState::from_api(project, wanted.environment_ids))
    }

    async fn read(&self, client: &SkytapClient, current: Value) -> Result<Option<Value>, ProviderError> {
        let current: ProjectState = decode(TYPE_NAME, current)?;
        let id = require_id(TYPE_NAME, &current.id)?;

        let project = match client.get_project(id).await {
            Ok(project) => project,
            Err(e) if e.is_not_found() => {
                info!(project = id, "project not found, removing from state");
                return Ok(None);
            },
            Err(e) => return Err(e.into()),
        };
        let ids = match current.environment_ids {
            Some(_) => Some(environment_ids(client, id).await?),
            None => None,
        };
        encode(&ProjectState::from_api(project, ids)).map(Some)
    }

    async fn update(
        &self,
        client: &SkytapClient,
        prior: Value,
        planned: Value,
    ) -> Result<Value, ProviderError> {
        let prior: ProjectState = decode(TYPE_NAME, prior)?;
        let wanted: ProjectState = decode(TYPE_NAME, planned)?;
        let id = require_id(TYPE_NAME, &prior.id)?;

        let mut lifecycle = Lifecycle::new(format!("{}.{}", TYPE_NAME, id));
        lifecycle.transition(LifecycleState::Updating)?;

        let request = wanted.request();
        let project = if request != prior.request() {
            lifecycle
                .step(async { Ok(client.update_project(id, &request).await?) })
                .await?
        } else {
            client.get_project(id).await?
        };

        if let Some(ids) = &wanted.environment_ids {
            let current = prior.environment_ids.clone().unwrap_or_default();
            lifecycle
                .step(apply_membership(client, id, &current, ids))
                .await?;
        }
        lifecycle.finish()?;

        encode(&ProjectState::from_api(project, wanted.environment_ids))
    }

    async fn delete(&self, client: &SkytapClient, current: Value) -> Result<(), ProviderError> {
        let current: ProjectState = decode(TYPE_NAME, current)?;
        let id = require_id(TYPE_NAME, &current.id)?;

        let mut lifecycle = Lifecycle::new(format!("{}.{}", TYPE_NAME, id));
        lifecycle.transition(LifecycleState::Deleting)?;
        let result = match client.delete_project(id).await {
            Err(e) if e.is_not_found() => {
                debug!(project = id, "project already gone");
                Ok(())
            },
            other => other.map_err(ProviderError::from),
        };
        lifecycle.step(async { result }).await?;
        lifecycle.finish()
    }

    async fn import(&self, client: &SkytapClient, id: &str) -> Result<Value, ProviderError> {
        let project = client.get_project(id).await?;
        let ids = environment_ids(client, id).await?;
        encode(&ProjectState::from_api(project, Some(ids)))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn set(ids: &[&str]) -> BTreeSet<String> {
        ids.iter().map(|s| s.to_string()).collect()
    }

    #[test]
    fn test_membership_changes() {
        let current = set(&["1", "2"]);
        let wanted = set(&["2", "3"]);
        let (add, remove) = membership_changes(&current, &wanted);
        assert_eq!(add, vec!["3"]);
        assert_eq!(remove, vec!["1"]);

        let (add, remove) = membership_changes(&current, &current);
        assert!(add.is_empty() && remove.is_empty());
    }

    #[test]
    fn test_state_defaults() {
        let state: ProjectState = decode(TYPE_NAME, json!({"name": "p"})).unwrap();
        assert_eq!(state.auto_add_role_name, "");
        assert!(state.show_project_members);
        assert_eq!(state.environment_ids, None);

        let request = serde_json::to_value(state.request()).unwrap();
        assert_eq!(request, json!({"name": "p", "auto_add_role_name": "", "show_project_members": true}));
    }

    #[test]
    fn test_state_encodes_sorted_ids() {
        let project = Project {
            id: "5".to_string(),
            name: "p".to_string(),
            summary: Some("s".to_string()),
            auto_add_role_name: None,
            show_project_members: Some(false),
            created_at: None,
        };
        let state = encode(&ProjectState::from_api(project, Some(set(&["20", "10"])))).unwrap();
        assert_eq!(state["environment_ids"], json!(["10", "20"]));
        assert_eq!(state["show_project_members"], false);
        assert_eq!(state["auto_add_role_name"], "");
    }

    #[test]
    fn test_validate_roles() {
        for role in PROJECT_ROLES {
            assert!(ProjectResource
                .validate(&json!({"name": "p", "auto_add_role_name": role}))
                .is_empty());
        }
        for role in ["admin", "Viewer", ""] {
            let diagnostics = ProjectResource.validate(&json!({"name": "p", "auto_add_role_name": role}));
            assert_eq!(diagnostics.len(), 1, "{:?} should be rejected", role);
            assert_eq!(diagnostics[0].attribute.as_deref(), Some("auto_add_role_name"));
        }
    }

    #[test]
    fn test_validate_environment_ids_set() {
        assert!(ProjectResource
            .validate(&json!({"name": "p", "environment_ids": ["1", "2"]}))
            .is_empty());
        assert!(!ProjectResource
            .validate(&json!({"name": "p", "environment_ids": ["1", "1"]}))
            .is_empty());
    }
}
