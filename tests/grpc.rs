//! End-to-end over gRPC: serve the provider on a local port and drive it with
//! the generated client.

mod common;

use std::time::Duration;

use serde_json::{json, Value};
use skytap_provider::generated::provider_client::ProviderClient;
use skytap_provider::generated::{
    ConfigureRequest, CreateRequest, GetMetadataRequest, GetSchemaRequest, PlanRequest, ReadDataSourceRequest,
    ReadRequest, ValidateResourceConfigRequest,
};
use skytap_provider::{serve_listener, ServeOptions};
use tokio::net::TcpListener;
use tokio::sync::oneshot;
use tonic::transport::Channel;
use wiremock::matchers::{method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

use common::{environment, provider, provider_config, template};

fn bytes(value: &Value) -> Vec<u8> {
    serde_json::to_vec(value).unwrap()
}

fn value(bytes: &[u8]) -> Value {
    serde_json::from_slice(bytes).unwrap()
}

async fn connect(addr: std::net::SocketAddr) -> ProviderClient<Channel> {
    for _ in 0..50 {
        if let Ok(client) = ProviderClient::connect(format!("http://{}", addr)).await {
            return client;
        }
        tokio::time::sleep(Duration::from_millis(20)).await;
    }
    panic!("provider server did not come up on {}", addr);
}

#[tokio::test]
async fn test_grpc_round_trip() {
    let skytap = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/v2/templates"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!([
            template("11", "CentOS 7 Server", "2020/01/01 00:00:00 +0000"),
        ])))
        .mount(&skytap)
        .await;
    Mock::given(method("GET"))
        .and(path("/projects/3"))
        .respond_with(ResponseTemplate::new(404))
        .mount(&skytap)
        .await;

    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    let (stop_tx, stop_rx) = oneshot::channel::<()>();
    let server = tokio::spawn(serve_listener(
        provider(),
        listener,
        ServeOptions::new().with_shutdown_timeout(Duration::from_secs(1)),
        async move {
            let _ = stop_rx.await;
        },
    ));
    let mut client = connect(addr).await;

    let metadata = client
        .get_metadata(GetMetadataRequest {})
        .await
        .unwrap()
        .into_inner();
    assert_eq!(
        metadata.resources,
        vec!["skytap_environment", "skytap_network", "skytap_project"]
    );
    assert!(metadata.server_capabilities.unwrap().plan_destroy);

    let schema = client.get_schema(GetSchemaRequest {}).await.unwrap().into_inner();
    let network = &schema.resources["skytap_network"];
    let block = network.block.as_ref().unwrap();
    let env_attr = block
        .attributes
        .iter()
        .find(|a| a.name == "environment_id")
        .unwrap();
    assert!(env_attr.required && env_attr.force_new);
    assert_eq!(block.block_types[0].type_name, "timeouts");

    let diagnostics = client
        .validate_resource_config(ValidateResourceConfigRequest {
            resource_type: "skytap_network".to_string(),
            config: bytes(&json!({
                "environment_id": "1",
                "name": "net",
                "domain": "corp.example.com",
                "subnet": "10.0.0.0/8"
            })),
        })
        .await
        .unwrap()
        .into_inner()
        .diagnostics;
    assert_eq!(diagnostics.len(), 1);
    assert_eq!(diagnostics[0].attribute, "subnet");

    // Before configure, lookups fail with a diagnostic rather than an RPC error.
    let early = client
        .read_data_source(ReadDataSourceRequest {
            data_source_type: "skytap_template".to_string(),
            config: bytes(&json!({"name": "CentOS"})),
        })
        .await
        .unwrap()
        .into_inner();
    assert!(early.state.is_empty());
    assert!(early.diagnostics[0].summary.contains("not configured"));

    let configured = client
        .configure(ConfigureRequest {
            config: bytes(&provider_config(&skytap)),
        })
        .await
        .unwrap()
        .into_inner();
    assert!(configured.diagnostics.is_empty());

    let found = client
        .read_data_source(ReadDataSourceRequest {
            data_source_type: "skytap_template".to_string(),
            config: bytes(&json!({"name": "CentOS"})),
        })
        .await
        .unwrap()
        .into_inner();
    assert!(found.diagnostics.is_empty());
    assert_eq!(value(&found.state)["id"], "11");

    let plan = client
        .plan(PlanRequest {
            resource_type: "skytap_project".to_string(),
            prior_state: vec![],
            proposed_state: bytes(&json!({"name": "demo"})),
            config: bytes(&json!({"name": "demo"})),
        })
        .await
        .unwrap()
        .into_inner();
    assert!(!plan.requires_replace);
    assert_eq!(value(&plan.planned_state)["show_project_members"], true);

    let read = client
        .read(ReadRequest {
            resource_type: "skytap_project".to_string(),
            current_state: bytes(&json!({"id": "3", "name": "old"})),
        })
        .await
        .unwrap()
        .into_inner();
    assert!(read.removed);
    assert!(read.diagnostics.is_empty());

    stop_tx.send(()).unwrap();
    server.await.unwrap().unwrap();
}

#[tokio::test]
async fn test_grpc_create_returns_partial_state_with_diagnostics() {
    let skytap = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/projects"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "id": "5",
            "name": "demo",
            "summary": null,
            "show_project_members": true
        })))
        .mount(&skytap)
        .await;
    Mock::given(method("POST"))
        .and(path("/configurations/123/networks"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "id": "9",
            "name": "backend",
            "domain": "corp.example.com",
            "subnet": "10.0.2.0/24",
            "gateway": "10.0.2.254",
            "tunnelable": false
        })))
        .mount(&skytap)
        .await;
    Mock::given(method("GET"))
        .and(path("/configurations/123"))
        .respond_with(ResponseTemplate::new(200).set_body_json(environment("123", "lab", "busy")))
        .mount(&skytap)
        .await;

    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    let (stop_tx, stop_rx) = oneshot::channel::<()>();
    let server = tokio::spawn(serve_listener(
        provider(),
        listener,
        ServeOptions::new().with_shutdown_timeout(Duration::from_secs(1)),
        async move {
            let _ = stop_rx.await;
        },
    ));
    let mut client = connect(addr).await;
    client
        .configure(ConfigureRequest {
            config: bytes(&provider_config(&skytap)),
        })
        .await
        .unwrap();

    let created = client
        .create(CreateRequest {
            resource_type: "skytap_project".to_string(),
            planned_state: bytes(&json!({
                "name": "demo",
                "auto_add_role_name": "",
                "show_project_members": true
            })),
        })
        .await
        .unwrap()
        .into_inner();
    assert!(created.diagnostics.is_empty());
    assert_eq!(value(&created.state)["id"], "5");

    let partial = client
        .create(CreateRequest {
            resource_type: "skytap_network".to_string(),
            planned_state: bytes(&json!({
                "environment_id": "123",
                "name": "backend",
                "domain": "corp.example.com",
                "subnet": "10.0.2.0/24",
                "tunnelable": false,
                "timeouts": {"create": "0s"}
            })),
        })
        .await
        .unwrap()
        .into_inner();
    let state = value(&partial.state);
    assert_eq!(state["id"], "9");
    assert_eq!(state["environment_id"], "123");
    assert_eq!(partial.diagnostics.len(), 1);
    assert!(partial.diagnostics[0].summary.contains("environment 123"));

    stop_tx.send(()).unwrap();
    server.await.unwrap().unwrap();
}
