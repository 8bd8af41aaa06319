//! `skytap_environment`: an environment created from a template.
//!
//! Skytap calls environments "configurations" in its API. Creating one copies
//! the template's VMs, so creation waits until the environment leaves `busy`
//! before applying any settings, then waits again for the settings to land.

use serde::{Deserialize, Serialize};
use serde_json::Value;
use tracing::{debug, info};

use super::timeouts::{self, Operation, Timeouts};
use super::{created_but_failed, decode, encode, require_id, Resource};
use crate::client::models::{CreateEnvironmentRequest, Environment, UpdateEnvironmentRequest};
use crate::client::SkytapClient;
use crate::error::ProviderError;
use crate::lifecycle::{Lifecycle, LifecycleState, PollStatus};
use crate::schema::{Attribute, AttributeFlags, AttributeType, Diagnostic, Schema};
use crate::validation::{not_empty, string_attr, string_len_between, validate};

const TYPE_NAME: &str = "skytap_environment";

/// Check used while waiting on an environment: ready once it is not busy.
pub(crate) async fn settled(client: &SkytapClient, id: &str) -> Result<PollStatus, ProviderError> {
    let environment = client.get_environment(id).await?;
    debug!(environment = id, runstate = environment.runstate.as_str(), "polled environment");
    Ok(if environment.runstate.is_settled() {
        PollStatus::Ready
    } else {
        PollStatus::Pending
    })
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
struct EnvironmentState {
    #[serde(default)]
    id: Option<String>,
    #[serde(default)]
    template_id: Option<String>,
    #[serde(default)]
    name: Option<String>,
    #[serde(default)]
    description: Option<String>,
    #[serde(default)]
    outbound_traffic: Option<bool>,
    #[serde(default)]
    routable: Option<bool>,
    #[serde(default)]
    suspend_on_idle: Option<i64>,
    #[serde(default)]
    runstate: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    timeouts: Option<Timeouts>,
}

impl EnvironmentState {
    fn from_api(
        template_id: Option<String>,
        environment: Environment,
        timeouts: Option<Timeouts>,
    ) -> Self {
        Self {
            id: Some(environment.id),
            template_id,
            name: Some(environment.name),
            description: environment.description,
            outbound_traffic: environment.outbound_traffic,
            routable: environment.routable,
            suspend_on_idle: environment.suspend_on_idle,
            runstate: Some(environment.runstate.as_str().to_string()),
            timeouts,
        }
    }

    /// Settings that differ from `current`; `None` when nothing needs sending.
    fn changes_from(&self, current: &EnvironmentState) -> Option<UpdateEnvironmentRequest> {
        fn changed<T: Clone + PartialEq>(wanted: &Option<T>, current: &Option<T>) -> Option<T> {
            wanted.as_ref().filter(|w| Some(*w) != current.as_ref()).cloned()
        }

        let request = UpdateEnvironmentRequest {
            name: changed(&self.name, &current.name),
            description: changed(&self.description, &current.description),
            outbound_traffic: changed(&self.outbound_traffic, &current.outbound_traffic),
            routable: changed(&self.routable, &current.routable),
            suspend_on_idle: changed(&self.suspend_on_idle, &current.suspend_on_idle),
        };
        (request != UpdateEnvironmentRequest::default()).then_some(request)
    }
}

/// The `skytap_environment` resource.
#[derive(Debug, Clone, Copy, Default)]
pub struct EnvironmentResource;

impl EnvironmentResource {
    async fn apply_settings(
        &self,
        client: &SkytapClient,
        lifecycle: &mut Lifecycle,
        id: &str,
        wanted: &EnvironmentState,
        current: &EnvironmentState,
        op: Operation,
    ) -> Result<EnvironmentState, ProviderError> {
        let policy = Timeouts::policy(wanted.timeouts.as_ref(), op, client.poll_policy())?;
        let what = format!("environment {}", id);

        if let Some(request) = wanted.changes_from(current) {
            // Skytap rejects changes while the environment is busy.
            lifecycle.wait(policy, &what, || settled(client, id)).await?;
            debug!(environment = id, ?request, "updating environment settings");
            lifecycle
                .step(async { Ok(client.update_environment(id, &request).await?) })
                .await?;
        }
        lifecycle.poll(policy, &what, || settled(client, id)).await?;

        let environment = client.get_environment(id).await?;
        Ok(EnvironmentState::from_api(
            wanted.template_id.clone(),
            environment,
            wanted.timeouts.clone(),
        ))
    }
}

#[async_trait::async_trait]
impl Resource for EnvironmentResource {
    fn type_name(&self) -> &'static str {
        TYPE_NAME
    }

    fn schema(&self) -> Schema {
        Schema::v0()
            .with_description("A Skytap environment created from a template")
            .with_attribute("id", Attribute::computed_string())
            .with_attribute(
                "template_id",
                Attribute::required_string()
                    .with_force_new()
                    .with_description("ID of the template the environment is created from"),
            )
            .with_attribute(
                "name",
                Attribute::optional_computed_string()
                    .with_description("Name of the environment. Defaults to the template name"),
            )
            .with_attribute(
                "description",
                Attribute::optional_computed_string().with_description("Description of the environment"),
            )
            .with_attribute(
                "outbound_traffic",
                Attribute::optional_computed_bool()
                    .with_description("Whether VMs in the environment can reach the internet"),
            )
            .with_attribute(
                "routable",
                Attribute::optional_computed_bool()
                    .with_description("Whether networks in the environment route to each other"),
            )
            .with_attribute(
                "suspend_on_idle",
                Attribute::new(AttributeType::Int64, AttributeFlags::optional_computed())
                    .with_description("Seconds of inactivity before the environment is suspended"),
            )
            .with_attribute(
                "runstate",
                Attribute::computed_string().with_description("Current run state reported by Skytap"),
            )
            .with_block(timeouts::BLOCK_NAME, timeouts::block())
    }

    fn validate(&self, config: &Value) -> Vec<Diagnostic> {
        let mut diagnostics = validate(&self.schema(), config);
        diagnostics.extend(string_attr(config, "template_id").and_then(|v| not_empty("template_id", v)));
        diagnostics.extend(string_attr(config, "name").and_then(|v| string_len_between("name", v, 1, 255)));
        diagnostics.extend(timeouts::validate(config));
        diagnostics
    }

    async fn create(&self, client: &SkytapClient, planned: Value) -> Result<Value, ProviderError> {
        let wanted: EnvironmentState = decode(TYPE_NAME, planned)?;
        let template_id = wanted
            .template_id
            .clone()
            .ok_or_else(|| ProviderError::InvalidRequest("template_id is required".to_string()))?;
        let mut lifecycle = Lifecycle::new(format!("{}.{}", TYPE_NAME, template_id));
        lifecycle.transition(LifecycleState::Creating)?;

        let request = CreateEnvironmentRequest { template_id };
        let created = lifecycle
            .step(async { Ok(client.create_environment(&request).await?) })
            .await?;
        info!(environment = %created.id, template = %request.template_id, "environment created");

        let current = EnvironmentState::from_api(wanted.template_id.clone(), created.clone(), None);
        let partial = EnvironmentState {
            timeouts: wanted.timeouts.clone(),
            ..current.clone()
        };
        match self
            .apply_settings(client, &mut lifecycle, &created.id, &wanted, &current, Operation::Create)
            .await
        {
            Ok(state) => encode(&state),
            Err(e) => Err(created_but_failed(&partial, e)),
        }
    }

    async fn read(&self, client: &SkytapClient, current: Value) -> Result<Option<Value>, ProviderError> {
        let current: EnvironmentState = decode(TYPE_NAME, current)?;
        let id = require_id(TYPE_NAME, &current.id)?;

        match client.get_environment(id).await {
            Ok(environment) => {
                let state = EnvironmentState::from_api(
                    current.template_id.clone(),
                    environment,
                    current.timeouts.clone(),
                );
                encode(&state).map(Some)
            },
            Err(e) if e.is_not_found() => {
                info!(environment = id, "environment not found, removing from state");
                Ok(None)
            },
            Err(e) => Err(e.into()),
        }
    }

    async fn update(
        &self,
        client: &SkytapClient,
        prior: Value,
        planned: Value,
    ) -> Result<Value, ProviderError> {
        let prior: EnvironmentState = decode(TYPE_NAME, prior)?;
        let wanted: EnvironmentState = decode(TYPE_NAME, planned)?;
        let id = require_id(TYPE_NAME, &prior.id)?.to_string();

        let mut lifecycle = Lifecycle::new(format!("{}.{}", TYPE_NAME, id));
        lifecycle.transition(LifecycleState::Updating)?;
        let state = self
            .apply_settings(client, &mut lifecycle, &id, &wanted, &prior, Operation::Update)
            .await?;
        encode(&state)
    }

    async fn delete(&self, client: &SkytapClient, current: Value) -> Result<(), ProviderError> {
        let current: EnvironmentState = decode(TYPE_NAME, current)?;
        let id = require_id(TYPE_NAME, &current.id)?;

        let mut lifecycle = Lifecycle::new(format!("{}.{}", TYPE_NAME, id));
        lifecycle.transition(LifecycleState::Deleting)?;
        let result = match client.delete_environment(id).await {
            Err(e) if e.is_not_found() => {
                debug!(environment = id, "environment already gone");
                Ok(())
            },
            other => other.map_err(ProviderError::from),
        };
        lifecycle.step(async { result }).await?;
        lifecycle.finish()
    }

    async fn import(&self, client: &SkytapClient, id: &str) -> Result<Value, ProviderError> {
        let environment = client.get_environment(id).await?;
        // Skytap does not report the source template; it stays null until configured.
        encode(&EnvironmentState::from_api(None, environment, None))
    }
}
