//! Skytap infrastructure provider.
//!
//! A plugin binary that exposes Skytap objects to a declarative
//! infrastructure host over gRPC:
//!
//! - resources: `skytap_project`, `skytap_network`, `skytap_environment`
//! - data sources: `skytap_template`, `skytap_project`
//!
//! # Overview
//!
//! - [`server`]: the [`ProviderService`] trait, its gRPC adapter, handshake
//!   and graceful shutdown
//! - [`provider`]: [`SkytapProvider`], which dispatches calls to resources
//! - [`resources`]: one module per resource and data source
//! - [`resolver`]: picks one template or project out of a name pattern
//! - [`client`]: the Skytap REST client
//! - [`config`]: the provider block and its environment fallbacks
//! - [`lifecycle`]: the per-operation state machine and readiness polling
//! - [`schema`] and [`validation`]: attribute schemas and value checks
//! - [`testing`]: drive a provider without gRPC
//!
//! # Handshake
//!
//! ```text
//! SKYTAP_PROVIDER|1|127.0.0.1:50051
//! ```
//!
//! Format: `SKYTAP_PROVIDER|<protocol_version>|<address>`, printed once on
//! stdout when the server is listening.
//!
//! # Running
//!
//! ```ignore
//! use skytap_provider::{init_logging, serve, SkytapProvider};
//!
//! #[tokio::main]
//! async fn main() -> Result<(), skytap_provider::server::BoxError> {
//!     init_logging();
//!     serve(SkytapProvider::new()).await
//! }
//! ```

#![warn(clippy::all)]

pub mod client;
pub mod config;
pub mod error;
pub mod lifecycle;
pub mod logging;
pub mod provider;
pub mod resolver;
pub mod resources;
pub mod schema;
pub mod server;
pub mod testing;
pub mod types;
pub mod validation;

#[allow(clippy::all)]
pub mod generated;

pub use client::SkytapClient;
pub use config::{ProviderConfig, Settings};
pub use error::{ApiError, ProviderError, ResolveError};
pub use logging::{init_logging, init_logging_with_default, try_init_logging};
pub use provider::SkytapProvider;
pub use resolver::{resolve, NamedEntity};
pub use schema::ProviderSchema;
pub use server::{serve, serve_listener, serve_with_options, BoxError, ProviderService, ServeOptions};
pub use types::{
    AttributeChange, ImportedResource, PlanResult, ProviderMetadata, HANDSHAKE_PREFIX,
    PROTOCOL_VERSION,
};
pub use validation::{is_valid, validate, validate_result};

pub use async_trait::async_trait;
