//! `skytap_network`: a network attached to an environment.
//!
//! Skytap refuses network changes while the owning environment is busy, and
//! every change makes it busy again, so each mutation is followed by a wait
//! on the environment's runstate.

use serde::{Deserialize, Serialize};
use serde_json::Value;
use tracing::{debug, info};

use super::environment::settled;
use super::timeouts::{self, Operation, Timeouts};
use super::{created_but_failed, decode, encode, require_id, Resource};
use crate::client::models::{Network, NetworkRequest, NETWORK_TYPE_AUTOMATIC};
use crate::client::SkytapClient;
use crate::error::ProviderError;
use crate::lifecycle::{Lifecycle, LifecycleState, PollPolicy};
use crate::schema::{Attribute, Diagnostic, Schema};
use crate::validation::{
    cidr_network, domain_name, ip_address, not_empty, string_attr, string_len_between, validate,
};

const TYPE_NAME: &str = "skytap_network";

/// Smallest and largest subnet prefix Skytap accepts.
const SUBNET_PREFIX: (u8, u8) = (16, 29);

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
struct NetworkState {
    #[serde(default)]
    id: Option<String>,
    environment_id: String,
    name: String,
    domain: String,
    subnet: String,
    #[serde(default)]
    gateway: Option<String>,
    #[serde(default)]
    tunnelable: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    timeouts: Option<Timeouts>,
}

impl NetworkState {
    fn from_api(environment_id: &str, network: Network, timeouts: Option<Timeouts>) -> Self {
        Self {
            id: Some(network.id),
            environment_id: environment_id.to_string(),
            name: network.name,
            domain: network.domain.unwrap_or_default(),
            subnet: network.subnet.unwrap_or_default(),
            gateway: network.gateway,
            tunnelable: network.tunnelable.unwrap_or(false),
            timeouts,
        }
    }

    fn request(&self, creating: bool) -> NetworkRequest {
        NetworkRequest {
            name: self.name.clone(),
            network_type: creating.then(|| NETWORK_TYPE_AUTOMATIC.to_string()),
            domain: self.domain.clone(),
            subnet: self.subnet.clone(),
            gateway: self.gateway.clone(),
            tunnelable: self.tunnelable,
        }
    }

    fn label(&self) -> String {
        format!("{}.{}/{}", TYPE_NAME, self.environment_id, self.name)
    }
}

/// Split an import id of the form `<environment_id>/<network_id>`.
fn parse_import_id(id: &str) -> Result<(&str, &str), ProviderError> {
    match id.split_once('/') {
        Some((env, net)) if !env.is_empty() && !net.is_empty() && !net.contains('/') => {
            Ok((env, net))
        },
        _ => Err(ProviderError::InvalidRequest(format!(
            "invalid network import id {:?}, expected <environment_id>/<network_id>",
            id
        ))),
    }
}

/// Wait for the environment to settle after a change, then read the network back.
async fn settle_and_read(
    client: &SkytapClient,
    lifecycle: &mut Lifecycle,
    policy: PollPolicy,
    env_id: &str,
    network_id: &str,
    timeouts: Option<Timeouts>,
) -> Result<Value, ProviderError> {
    lifecycle
        .poll(policy, &format!("environment {}", env_id), || settled(client, env_id))
        .await?;
    let network = client.get_network(env_id, network_id).await?;
    encode(&NetworkState::from_api(env_id, network, timeouts))
}

/// The `skytap_network` resource.
#[derive(Debug, Clone, Copy, Default)]
pub struct NetworkResource;

#[async_trait::async_trait]
impl Resource for NetworkResource {
    fn type_name(&self) -> &'static str {
        TYPE_NAME
    }

    fn schema(&self) -> Schema {
        Schema::v0()
            .with_description("A network inside a Skytap environment")
            .with_attribute("id", Attribute::computed_string())
            .with_attribute(
                "environment_id",
                Attribute::required_string()
                    .with_force_new()
                    .with_description("ID of the environment the network belongs to"),
            )
            .with_attribute(
                "name",
                Attribute::required_string().with_description("Name of the network"),
            )
            .with_attribute(
                "domain",
                Attribute::required_string().with_description("DNS domain of the network"),
            )
            .with_attribute(
                "subnet",
                Attribute::required_string()
                    .with_description("Subnet in CIDR notation, prefix length 16 to 29"),
            )
            .with_attribute(
                "gateway",
                Attribute::optional_computed_string()
                    .with_description("Gateway address. Skytap picks one when unset"),
            )
            .with_attribute(
                "tunnelable",
                Attribute::optional_bool()
                    .with_default(Value::Bool(false))
                    .with_description("Whether the network can be tunneled to other environments"),
            )
            .with_block(timeouts::BLOCK_NAME, timeouts::block())
    }

    fn validate(&self, config: &Value) -> Vec<Diagnostic> {
        let (min_prefix, max_prefix) = SUBNET_PREFIX;
        let mut diagnostics = validate(&self.schema(), config);
        diagnostics.extend(
            string_attr(config, "environment_id").and_then(|v| not_empty("environment_id", v)),
        );
        diagnostics.extend(string_attr(config, "name").and_then(|v| string_len_between("name", v, 1, 255)));
        diagnostics.extend(string_attr(config, "domain").and_then(|v| domain_name("domain", v)));
        diagnostics.extend(
            string_attr(config, "subnet").and_then(|v| cidr_network("subnet", v, min_prefix, max_prefix)),
        );
        diagnostics.extend(string_attr(config, "gateway").and_then(|v| ip_address("gateway", v)));
        diagnostics.extend(timeouts::validate(config));
        diagnostics
    }

    async fn create(&self, client: &SkytapClient, planned: Value) -> Result<Value, ProviderError> {
        let wanted: NetworkState = decode(TYPE_NAME, planned)?;
        let env_id = wanted.environment_id.as_str();
        let policy = Timeouts::policy(wanted.timeouts.as_ref(), Operation::Create, client.poll_policy())?;

        let mut lifecycle = Lifecycle::new(wanted.label());
        lifecycle.transition(LifecycleState::Creating)?;
        let request = wanted.request(true);
        let created = lifecycle
            .step(async { Ok(client.create_network(env_id, &request).await?) })
            .await?;
        info!(environment = env_id, network = %created.id, "network created");

        let partial = NetworkState::from_api(env_id, created.clone(), wanted.timeouts.clone());
        settle_and_read(client, &mut lifecycle, policy, env_id, &created.id, wanted.timeouts.clone())
            .await
            .map_err(|e| created_but_failed(&partial, e))
    }

    async fn read(&self, client: &SkytapClient, current: Value) -> Result<Option<Value>, ProviderError> {
        let current: NetworkState = decode(TYPE_NAME, current)?;
        let id = require_id(TYPE_NAME, &current.id)?;

        match client.get_network(&current.environment_id, id).await {
            Ok(network) => {
                let state = NetworkState::from_api(&current.environment_id, network, current.timeouts.clone());
                encode(&state).map(Some)
            },
            Err(e) if e.is_not_found() => {
                info!(environment = %current.environment_id, network = id, "network not found, removing from state");
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
        let prior: NetworkState = decode(TYPE_NAME, prior)?;
        let wanted: NetworkState = decode(TYPE_NAME, planned)?;
        let id = require_id(TYPE_NAME, &prior.id)?;
        let env_id = wanted.environment_id.as_str();
        let policy = Timeouts::policy(wanted.timeouts.as_ref(), Operation::Update, client.poll_policy())?;

        let mut lifecycle = Lifecycle::new(wanted.label());
        lifecycle.transition(LifecycleState::Updating)?;
        let request = wanted.request(false);
        debug!(environment = env_id, network = id, ?request, "updating network");
        lifecycle
            .step(async { Ok(client.update_network(env_id, id, &request).await?) })
            .await?;

        settle_and_read(client, &mut lifecycle, policy, env_id, id, wanted.timeouts.clone()).await
    }

    async fn delete(&self, client: &SkytapClient, current: Value) -> Result<(), ProviderError> {
        let current: NetworkState = decode(TYPE_NAME, current)?;
        let id = require_id(TYPE_NAME, &current.id)?;
        let env_id = current.environment_id.as_str();
        let policy = Timeouts::policy(current.timeouts.as_ref(), Operation::Delete, client.poll_policy())?;

        let mut lifecycle = Lifecycle::new(current.label());
        lifecycle.transition(LifecycleState::Deleting)?;
        let gone = match client.delete_network(env_id, id).await {
            Ok(()) => false,
            Err(e) if e.is_not_found() => true,
            Err(e) => return Err(lifecycle.fail(e.into())),
        };

        if gone {
            debug!(environment = env_id, network = id, "network already gone");
            return lifecycle.finish();
        }
        info!(environment = env_id, network = id, "network deleted");
        lifecycle
            .poll(policy, &format!("environment {}", env_id), || settled(client, env_id))
            .await
    }

    async fn import(&self, client: &SkytapClient, id: &str) -> Result<Value, ProviderError> {
        let (env_id, network_id) = parse_import_id(id)?;
        let network = client.get_network(env_id, network_id).await?;
        encode(&NetworkState::from_api(env_id, network, None))
    }
}
