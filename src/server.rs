//! gRPC plugin server.
//!
//! [`ProviderService`] is the async trait the Skytap provider implements; the
//! private `ProviderGrpcService` adapts it to the generated tonic service so
//! that every payload crosses the wire as JSON bytes.
//!
//! # Handshake
//!
//! Once the listener is bound, a single line is printed to stdout:
//!
//! ```text
//! SKYTAP_PROVIDER|1|127.0.0.1:50123
//! ```
//!
//! Everything else (logs included) goes to stderr.
//!
//! # Shutdown
//!
//! SIGTERM or SIGINT stops the listener. In-flight requests get
//! [`ServeOptions::shutdown_timeout`] to finish, then [`ProviderService::stop`]
//! runs and `serve` returns.

use std::future::Future;
use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use serde_json::Value;
use tokio::net::TcpListener;
use tokio::sync::oneshot;
use tonic::transport::Server;
use tonic::{Request, Response, Status};
use tracing::{debug, error, info, instrument, warn};

use crate::error::ProviderError;
use crate::generated;
use crate::schema::{has_errors, Block, Diagnostic, DiagnosticSeverity, ProviderSchema, Schema};
use crate::types::{ImportedResource, PlanResult, ProviderMetadata, HANDSHAKE_PREFIX, PROTOCOL_VERSION};

/// Operations a provider exposes to the plugin host.
///
/// Payloads are plain [`serde_json::Value`]s; conversion to and from protobuf
/// happens in the server. Errors returned here never fail the RPC: they are
/// reported to the host as error diagnostics.
#[async_trait::async_trait]
pub trait ProviderService: Send + Sync + 'static {
    /// Schemas of the provider block, resources, and data sources.
    fn schema(&self) -> ProviderSchema;

    /// Resource and data source names, derived from the schema by default.
    fn metadata(&self) -> ProviderMetadata {
        let schema = self.schema();
        let mut resources: Vec<String> = schema.resources.keys().cloned().collect();
        let mut data_sources: Vec<String> = schema.data_sources.keys().cloned().collect();
        resources.sort();
        data_sources.sort();
        ProviderMetadata {
            resources,
            data_sources,
            plan_destroy: true,
        }
    }

    /// Check the provider block before `configure`.
    async fn validate_provider_config(&self, config: Value) -> Result<Vec<Diagnostic>, ProviderError> {
        let _ = config;
        Ok(vec![])
    }

    /// Apply the provider block: credentials, endpoint, and timing.
    async fn configure(&self, config: Value) -> Result<Vec<Diagnostic>, ProviderError>;

    /// Release anything held by the provider.
    async fn stop(&self) -> Result<(), ProviderError> {
        Ok(())
    }

    /// Check a resource configuration before planning.
    async fn validate_resource_config(
        &self,
        resource_type: &str,
        config: Value,
    ) -> Result<Vec<Diagnostic>, ProviderError> {
        let _ = (resource_type, config);
        Ok(vec![])
    }

    /// Migrate state written by an older schema version.
    async fn upgrade_resource_state(
        &self,
        resource_type: &str,
        version: i64,
        state: Value,
    ) -> Result<Value, ProviderError> {
        let _ = (resource_type, version);
        Ok(state)
    }

    /// Compute the planned state. A null `proposed_state` plans a destroy.
    async fn plan(
        &self,
        resource_type: &str,
        prior_state: Option<Value>,
        proposed_state: Value,
        config: Value,
    ) -> Result<PlanResult, ProviderError>;

    /// Create the remote object and return its state.
    async fn create(&self, resource_type: &str, planned_state: Value) -> Result<Value, ProviderError>;

    /// Refresh state from Skytap.
    ///
    /// `Ok(None)` means the object no longer exists and should be dropped
    /// from state.
    async fn read(&self, resource_type: &str, current_state: Value) -> Result<Option<Value>, ProviderError>;

    /// Apply the planned changes to an existing object.
    async fn update(
        &self,
        resource_type: &str,
        prior_state: Value,
        planned_state: Value,
    ) -> Result<Value, ProviderError>;

    /// Delete the remote object.
    async fn delete(&self, resource_type: &str, current_state: Value) -> Result<(), ProviderError>;

    /// Adopt an existing object by its import id.
    async fn import_resource(
        &self,
        resource_type: &str,
        id: &str,
    ) -> Result<Vec<ImportedResource>, ProviderError> {
        let _ = id;
        Err(ProviderError::Unimplemented(format!(
            "import is not supported for {}",
            resource_type
        )))
    }

    /// Check a data source configuration.
    async fn validate_data_source_config(
        &self,
        data_source_type: &str,
        config: Value,
    ) -> Result<Vec<Diagnostic>, ProviderError> {
        let _ = (data_source_type, config);
        Ok(vec![])
    }

    /// Look up data and return the data source state.
    async fn read_data_source(&self, data_source_type: &str, config: Value) -> Result<Value, ProviderError> {
        let _ = config;
        Err(ProviderError::UnknownResource(data_source_type.to_string()))
    }
}

struct ProviderGrpcService<P: ProviderService> {
    provider: Arc<P>,
}

fn decode(bytes: &[u8]) -> Value {
    if bytes.is_empty() {
        return Value::Null;
    }
    serde_json::from_slice(bytes).unwrap_or(Value::Null)
}

fn encode(value: &Value) -> Vec<u8> {
    serde_json::to_vec(value).unwrap_or_default()
}

fn diagnostics_to_proto(diagnostics: Vec<Diagnostic>) -> Vec<generated::Diagnostic> {
    diagnostics
        .into_iter()
        .map(|d| generated::Diagnostic {
            severity: match d.severity {
                DiagnosticSeverity::Error => generated::diagnostic::Severity::Error as i32,
                DiagnosticSeverity::Warning => generated::diagnostic::Severity::Warning as i32,
            },
            summary: d.summary,
            detail: d.detail.unwrap_or_default(),
            attribute: d.attribute.unwrap_or_default(),
        })
        .collect()
}

fn error_to_diagnostics(err: ProviderError) -> Vec<generated::Diagnostic> {
    diagnostics_to_proto(vec![Diagnostic::error(err.to_string())])
}

/// Split a provider result into its value and the diagnostics to send back.
/// Failures are logged here so the handlers only build responses.
fn outcome<T>(
    operation: &str,
    result: Result<T, ProviderError>,
) -> (Option<T>, Vec<generated::Diagnostic>) {
    match result {
        Ok(value) => {
            debug!(operation, "completed");
            (Some(value), vec![])
        },
        Err(e) => {
            error!(operation, error = %e, "failed");
            (None, error_to_diagnostics(e))
        },
    }
}

/// Like [`outcome`] for calls that already return diagnostics.
fn validation_outcome(
    operation: &str,
    target: &str,
    result: Result<Vec<Diagnostic>, ProviderError>,
) -> Vec<generated::Diagnostic> {
    match result {
        Ok(diagnostics) => {
            if has_errors(&diagnostics) {
                warn!(operation, target, diagnostics = diagnostics.len(), "rejected");
            }
            diagnostics_to_proto(diagnostics)
        },
        Err(e) => {
            error!(operation, target, error = %e, "failed");
            error_to_diagnostics(e)
        },
    }
}

fn encode_opt(value: Option<&Value>) -> Vec<u8> {
    value.map(encode).unwrap_or_default()
}

fn schema_to_proto(schema: &Schema) -> generated::Schema {
    generated::Schema {
        version: schema.version as i64,
        block: Some(block_to_proto(&schema.block)),
    }
}

// Sorted by name so GetSchema output is stable.
fn block_to_proto(block: &Block) -> generated::Block {
    use generated::nested_block::NestingMode;

    let mut attributes: Vec<generated::Attribute> = block
        .attributes
        .iter()
        .map(|(name, attr)| generated::Attribute {
            name: name.clone(),
            r#type: serde_json::to_vec(&attr.attr_type).unwrap_or_default(),
            required: attr.flags.required,
            optional: attr.flags.optional,
            computed: attr.flags.computed,
            sensitive: attr.flags.sensitive,
            description: attr.description.clone().unwrap_or_default(),
            force_new: attr.force_new,
            default_value: encode_opt(attr.default.as_ref()),
        })
        .collect();
    attributes.sort_by(|a, b| a.name.cmp(&b.name));

    let mut block_types: Vec<generated::NestedBlock> = block
        .blocks
        .iter()
        .map(|(name, nested)| generated::NestedBlock {
            type_name: name.clone(),
            block: Some(block_to_proto(&nested.block)),
            nesting_mode: NestingMode::Single as i32,
            min_items: i32::from(nested.required),
            max_items: 1,
        })
        .collect();
    block_types.sort_by(|a, b| a.type_name.cmp(&b.type_name));

    generated::Block {
        attributes,
        block_types,
        description: block.description.clone().unwrap_or_default(),
    }
}

fn schemas_to_proto(schemas: &HashMap<String, Schema>) -> HashMap<String, generated::Schema> {
    schemas
        .iter()
        .map(|(name, schema)| (name.clone(), schema_to_proto(schema)))
        .collect()
}

fn record_type(type_name: &str) {
    tracing::Span::current().record("type_name", type_name);
}

type Reply<T> = Result<Response<T>, Status>;

#[tonic::async_trait]
impl<P: ProviderService> generated::provider_server::Provider for ProviderGrpcService<P> {
    #[instrument(skip_all, name = "grpc.get_metadata")]
    async fn get_metadata(
        &self,
        _request: Request<generated::GetMetadataRequest>,
    ) -> Reply<generated::GetMetadataResponse> {
        let metadata = self.provider.metadata();
        Ok(Response::new(generated::GetMetadataResponse {
            server_capabilities: Some(generated::ServerCapabilities {
                plan_destroy: metadata.plan_destroy,
            }),
            resources: metadata.resources,
            data_sources: metadata.data_sources,
            diagnostics: vec![],
        }))
    }

    #[instrument(skip_all, name = "grpc.get_schema")]
    async fn get_schema(
        &self,
        _request: Request<generated::GetSchemaRequest>,
    ) -> Reply<generated::GetSchemaResponse> {
        let schema = self.provider.schema();
        Ok(Response::new(generated::GetSchemaResponse {
            provider: Some(schema_to_proto(&schema.provider)),
            resources: schemas_to_proto(&schema.resources),
            data_sources: schemas_to_proto(&schema.data_sources),
            diagnostics: vec![],
        }))
    }

    #[instrument(skip_all, name = "grpc.validate_provider_config")]
    async fn validate_provider_config(
        &self,
        request: Request<generated::ValidateProviderConfigRequest>,
    ) -> Reply<generated::ValidateProviderConfigResponse> {
        let config = decode(&request.into_inner().config);
        let result = self.provider.validate_provider_config(config).await;
        Ok(Response::new(generated::ValidateProviderConfigResponse {
            diagnostics: validation_outcome("ValidateProviderConfig", "provider", result),
        }))
    }

    #[instrument(skip_all, name = "grpc.configure")]
    async fn configure(
        &self,
        request: Request<generated::ConfigureRequest>,
    ) -> Reply<generated::ConfigureResponse> {
        let config = decode(&request.into_inner().config);
        let result = self.provider.configure(config).await;
        if matches!(&result, Ok(d) if !has_errors(d)) {
            info!("provider configured");
        }
        Ok(Response::new(generated::ConfigureResponse {
            diagnostics: validation_outcome("Configure", "provider", result),
        }))
    }

    #[instrument(skip_all, name = "grpc.stop")]
    async fn stop(
        &self,
        _request: Request<generated::StopRequest>,
    ) -> Reply<generated::StopResponse> {
        let (_, diagnostics) = outcome("Stop", self.provider.stop().await);
        let error = diagnostics.into_iter().map(|d| d.summary).next().unwrap_or_default();
        Ok(Response::new(generated::StopResponse { error }))
    }

    #[instrument(skip_all, name = "grpc.validate_resource_config", fields(type_name))]
    async fn validate_resource_config(
        &self,
        request: Request<generated::ValidateResourceConfigRequest>,
    ) -> Reply<generated::ValidateResourceConfigResponse> {
        let req = request.into_inner();
        record_type(&req.resource_type);
        let result = self
            .provider
            .validate_resource_config(&req.resource_type, decode(&req.config))
            .await;
        Ok(Response::new(generated::ValidateResourceConfigResponse {
            diagnostics: validation_outcome("ValidateResourceConfig", &req.resource_type, result),
        }))
    }

    #[instrument(skip_all, name = "grpc.upgrade_resource_state", fields(type_name, version))]
    async fn upgrade_resource_state(
        &self,
        request: Request<generated::UpgradeResourceStateRequest>,
    ) -> Reply<generated::UpgradeResourceStateResponse> {
        let req = request.into_inner();
        record_type(&req.resource_type);
        tracing::Span::current().record("version", req.version);

        let result = self
            .provider
            .upgrade_resource_state(&req.resource_type, req.version, decode(&req.raw_state))
            .await;
        let (state, diagnostics) = outcome("UpgradeResourceState", result);
        Ok(Response::new(generated::UpgradeResourceStateResponse {
            upgraded_state: encode_opt(state.as_ref()),
            diagnostics,
        }))
    }

    #[instrument(skip_all, name = "grpc.plan", fields(type_name))]
    async fn plan(
        &self,
        request: Request<generated::PlanRequest>,
    ) -> Reply<generated::PlanResponse> {
        let req = request.into_inner();
        record_type(&req.resource_type);

        let prior_state = Some(decode(&req.prior_state)).filter(|v| !v.is_null());
        let result = self
            .provider
            .plan(
                &req.resource_type,
                prior_state,
                decode(&req.proposed_state),
                decode(&req.config),
            )
            .await;
        let response = match outcome("Plan", result) {
            (Some(plan), diagnostics) => {
                debug!(
                    changes = plan.changes.len(),
                    requires_replace = plan.requires_replace,
                    "planned"
                );
                generated::PlanResponse {
                    planned_state: encode(&plan.planned_state),
                    changes: plan.changes.into_iter().map(Into::into).collect(),
                    requires_replace: plan.requires_replace,
                    diagnostics,
                }
            },
            (None, diagnostics) => generated::PlanResponse {
                diagnostics,
                ..Default::default()
            },
        };
        Ok(Response::new(response))
    }

    #[instrument(skip_all, name = "grpc.create", fields(type_name))]
    async fn create(
        &self,
        request: Request<generated::CreateRequest>,
    ) -> Reply<generated::CreateResponse> {
        let req = request.into_inner();
        record_type(&req.resource_type);

        let result = self
            .provider
            .create(&req.resource_type, decode(&req.planned_state))
            .await;
        let (state, diagnostics) = match result {
            Err(ProviderError::Incomplete { state, source }) => {
                warn!(
                    id = state.get("id").and_then(|v| v.as_str()),
                    error = %source,
                    "created but not finished"
                );
                (Some(state), error_to_diagnostics(*source))
            },
            other => outcome("Create", other),
        };
        if let (Some(state), true) = (&state, diagnostics.is_empty()) {
            info!(id = state.get("id").and_then(|v| v.as_str()), "created");
        }
        Ok(Response::new(generated::CreateResponse {
            state: encode_opt(state.as_ref()),
            diagnostics,
        }))
    }

    #[instrument(skip_all, name = "grpc.read", fields(type_name))]
    async fn read(
        &self,
        request: Request<generated::ReadRequest>,
    ) -> Reply<generated::ReadResponse> {
        let req = request.into_inner();
        record_type(&req.resource_type);

        let result = self
            .provider
            .read(&req.resource_type, decode(&req.current_state))
            .await;
        let (state, diagnostics) = outcome("Read", result);
        let removed = matches!(state, Some(None));
        if removed {
            warn!("remote object is gone, removing from state");
        }
        Ok(Response::new(generated::ReadResponse {
            state: encode_opt(state.flatten().as_ref()),
            diagnostics,
            removed,
        }))
    }

    #[instrument(skip_all, name = "grpc.update", fields(type_name))]
    async fn update(
        &self,
        request: Request<generated::UpdateRequest>,
    ) -> Reply<generated::UpdateResponse> {
        let req = request.into_inner();
        record_type(&req.resource_type);

        let result = self
            .provider
            .update(
                &req.resource_type,
                decode(&req.prior_state),
                decode(&req.planned_state),
            )
            .await;
        let (state, diagnostics) = outcome("Update", result);
        Ok(Response::new(generated::UpdateResponse {
            state: encode_opt(state.as_ref()),
            diagnostics,
        }))
    }

    #[instrument(skip_all, name = "grpc.delete", fields(type_name))]
    async fn delete(
        &self,
        request: Request<generated::DeleteRequest>,
    ) -> Reply<generated::DeleteResponse> {
        let req = request.into_inner();
        record_type(&req.resource_type);

        let result = self
            .provider
            .delete(&req.resource_type, decode(&req.current_state))
            .await;
        let (_, diagnostics) = outcome("Delete", result);
        Ok(Response::new(generated::DeleteResponse { diagnostics }))
    }

    #[instrument(skip_all, name = "grpc.import_resource_state", fields(type_name, id))]
    async fn import_resource_state(
        &self,
        request: Request<generated::ImportResourceStateRequest>,
    ) -> Reply<generated::ImportResourceStateResponse> {
        let req = request.into_inner();
        record_type(&req.resource_type);
        tracing::Span::current().record("id", req.id.as_str());

        let result = self.provider.import_resource(&req.resource_type, &req.id).await;
        let (imported, diagnostics) = outcome("ImportResourceState", result);
        let imported = imported
            .unwrap_or_default()
            .into_iter()
            .map(|r| generated::ImportedResource {
                resource_type: r.resource_type,
                state: encode(&r.state),
            })
            .collect();
        Ok(Response::new(generated::ImportResourceStateResponse { imported, diagnostics }))
    }

    #[instrument(skip_all, name = "grpc.validate_data_source_config", fields(type_name))]
    async fn validate_data_source_config(
        &self,
        request: Request<generated::ValidateDataSourceConfigRequest>,
    ) -> Reply<generated::ValidateDataSourceConfigResponse> {
        let req = request.into_inner();
        record_type(&req.data_source_type);
        let result = self
            .provider
            .validate_data_source_config(&req.data_source_type, decode(&req.config))
            .await;
        Ok(Response::new(generated::ValidateDataSourceConfigResponse {
            diagnostics: validation_outcome("ValidateDataSourceConfig", &req.data_source_type, result),
        }))
    }

    #[instrument(skip_all, name = "grpc.read_data_source", fields(type_name))]
    async fn read_data_source(
        &self,
        request: Request<generated::ReadDataSourceRequest>,
    ) -> Reply<generated::ReadDataSourceResponse> {
        let req = request.into_inner();
        record_type(&req.data_source_type);

        let result = self
            .provider
            .read_data_source(&req.data_source_type, decode(&req.config))
            .await;
        let (state, diagnostics) = outcome("ReadDataSource", result);
        Ok(Response::new(generated::ReadDataSourceResponse {
            state: encode_opt(state.as_ref()),
            diagnostics,
        }))
    }
}

/// Error returned by the `serve*` functions.
pub type BoxError = Box<dyn std::error::Error + Send + Sync>;

/// Options for running the provider server.
#[derive(Debug, Clone)]
pub struct ServeOptions {
    /// How long in-flight requests may run after a shutdown signal.
    /// Default: 30 seconds.
    pub shutdown_timeout: Duration,
}

impl Default for ServeOptions {
    fn default() -> Self {
        Self {
            shutdown_timeout: Duration::from_secs(30),
        }
    }
}

impl ServeOptions {
    /// Create options with default values.
    pub fn new() -> Self {
        Self::default()
    }

    /// Set the shutdown timeout.
    pub fn with_shutdown_timeout(mut self, timeout: Duration) -> Self {
        self.shutdown_timeout = timeout;
        self
    }
}

/// Resolve when SIGTERM or SIGINT (CTRL+C off Unix) arrives.
async fn wait_for_shutdown_signal() {
    #[cfg(unix)]
    {
        use tokio::signal::unix::{signal, SignalKind};

        match (signal(SignalKind::terminate()), signal(SignalKind::interrupt())) {
            (Ok(mut sigterm), Ok(mut sigint)) => {
                tokio::select! {
                    _ = sigterm.recv() => info!("received SIGTERM, shutting down"),
                    _ = sigint.recv() => info!("received SIGINT, shutting down"),
                }
            },
            (Err(e), _) | (_, Err(e)) => {
                warn!(error = %e, "cannot install signal handlers, shutdown signals are ignored");
                std::future::pending::<()>().await;
            },
        }
    }

    #[cfg(not(unix))]
    {
        match tokio::signal::ctrl_c().await {
            Ok(()) => info!("received CTRL+C, shutting down"),
            Err(e) => {
                warn!(error = %e, "cannot install CTRL+C handler, shutdown signals are ignored");
                std::future::pending::<()>().await;
            },
        }
    }
}

/// Serve the provider on an ephemeral localhost port.
///
/// Prints the handshake line and runs until a shutdown signal.
pub async fn serve<P: ProviderService>(provider: P) -> Result<(), BoxError> {
    serve_with_options(provider, ServeOptions::default()).await
}

/// [`serve`] with custom [`ServeOptions`].
pub async fn serve_with_options<P: ProviderService>(
    provider: P,
    options: ServeOptions,
) -> Result<(), BoxError> {
    let listener = TcpListener::bind("127.0.0.1:0").await?;
    serve_listener(provider, listener, options, wait_for_shutdown_signal()).await
}

/// Serve on an already bound listener until `shutdown` resolves.
///
/// The shutdown timeout only starts counting once `shutdown` has fired.
pub async fn serve_listener<P, F>(
    provider: P,
    listener: TcpListener,
    options: ServeOptions,
    shutdown: F,
) -> Result<(), BoxError>
where
    P: ProviderService,
    F: Future<Output = ()> + Send,
{
    let addr = listener.local_addr()?;
    println!("{}|{}|{}", HANDSHAKE_PREFIX, PROTOCOL_VERSION, addr);
    info!(address = %addr, "provider server listening");

    let provider = Arc::new(provider);
    let service = generated::provider_server::ProviderServer::new(ProviderGrpcService {
        provider: Arc::clone(&provider),
    });

    let (signalled_tx, signalled_rx) = oneshot::channel::<()>();
    let server = Server::builder()
        .add_service(service)
        .serve_with_incoming_shutdown(
            tokio_stream::wrappers::TcpListenerStream::new(listener),
            async move {
                shutdown.await;
                let _ = signalled_tx.send(());
            },
        );
    tokio::pin!(server);

    let finished = tokio::select! {
        result = &mut server => Some(result),
        Ok(()) = signalled_rx => None,
    };

    let result = match finished {
        Some(result) => result,
        None => match tokio::time::timeout(options.shutdown_timeout, &mut server).await {
            Ok(result) => result,
            Err(_) => {
                warn!(timeout = ?options.shutdown_timeout, "in-flight requests did not finish, forcing shutdown");
                Ok(())
            },
        },
    };

    if let Err(e) = result {
        error!(error = %e, "server error");
        return Err(e.into());
    }

    debug!("calling provider stop");
    if let Err(e) = provider.stop().await {
        warn!(error = %e, "provider stop returned error");
    }

    info!("provider shutdown complete");
    Ok(())
}
