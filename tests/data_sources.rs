//! Template and project lookups against a mocked Skytap API.

mod common;

use serde_json::{json, Value};
use skytap_provider::ProviderError;
use tokio_test::{assert_err, assert_ok};
use wiremock::matchers::{basic_auth, method, path, query_param};
use wiremock::{Mock, MockServer, ResponseTemplate};

use common::{configured, template, API_TOKEN, USERNAME};

async fn mount_templates(server: &MockServer, templates: Value) {
    Mock::given(method("GET"))
        .and(path("/v2/templates"))
        .and(query_param("offset", "0"))
        .and(basic_auth(USERNAME, API_TOKEN))
        .respond_with(ResponseTemplate::new(200).set_body_json(templates))
        .mount(server)
        .await;
}

#[tokio::test]
async fn test_template_single_match() {
    let server = MockServer::start().await;
    mount_templates(
        &server,
        json!([
            template("1", "Ubuntu 18.04.1 LTS Desktop Firstboot", "2019/01/01 10:00:00 +0000"),
            template("2", "Windows Server 2019", "2020/01/01 10:00:00 +0000"),
        ]),
    )
    .await;
    let tester = configured(&server).await;

    let state = tester
        .read_data_source("skytap_template", json!({"name": "Ubuntu 18.04.1 LTS"}))
        .await
        .unwrap();

    assert_eq!(state["id"], "1");
    assert_eq!(state["name"], "Ubuntu 18.04.1 LTS Desktop Firstboot");
}

#[tokio::test]
async fn test_template_most_recent() {
    let server = MockServer::start().await;
    mount_templates(
        &server,
        json!([
            template("1", "Ubuntu base", "2019/01/01 10:00:00 +0000"),
            template("2", "Ubuntu base", "2021/06/01 10:00:00 +0200"),
            template("3", "Ubuntu base", "not a timestamp"),
        ]),
    )
    .await;
    let tester = configured(&server).await;

    let state = tester
        .read_data_source("skytap_template", json!({"name": "Ubuntu", "most_recent": true}))
        .await
        .unwrap();
    assert_eq!(state["id"], "2");
    assert_eq!(state["most_recent"], true);
}

#[tokio::test]
async fn test_template_ambiguous_without_most_recent() {
    let server = MockServer::start().await;
    mount_templates(
        &server,
        json!([
            template("1", "Ubuntu base", "2019/01/01 10:00:00 +0000"),
            template("2", "Ubuntu base", "2021/06/01 10:00:00 +0000"),
        ]),
    )
    .await;
    let tester = configured(&server).await;

    for config in [json!({"name": "Ubuntu"}), json!({"name": "Ubuntu", "most_recent": false})] {
        let err = tester
            .read_data_source("skytap_template", config)
            .await
            .unwrap_err();
        assert!(matches!(err, ProviderError::FailedPrecondition(_)), "{:?}", err);
        assert!(err.to_string().contains("most_recent"));
    }
}

#[tokio::test]
async fn test_template_not_found_and_bad_pattern() {
    let server = MockServer::start().await;
    mount_templates(&server, json!([template("1", "Ubuntu", "2019/01/01 10:00:00 +0000")])).await;
    let tester = configured(&server).await;

    let err = tester
        .read_data_source("skytap_template", json!({"name": "CentOS"}))
        .await
        .unwrap_err();
    assert!(matches!(err, ProviderError::NotFound(_)));

    let err = tester
        .read_data_source("skytap_template", json!({"name": "Ubuntu("}))
        .await
        .unwrap_err();
    assert!(matches!(err, ProviderError::Validation(_)));
}

#[tokio::test]
async fn test_template_pages_are_followed() {
    let server = MockServer::start().await;
    let first_page: Vec<Value> = (0..100)
        .map(|i| template(&i.to_string(), &format!("Filler {}", i), "2019/01/01 10:00:00 +0000"))
        .collect();
    mount_templates(&server, Value::Array(first_page)).await;
    Mock::given(method("GET"))
        .and(path("/v2/templates"))
        .and(query_param("offset", "100"))
        .respond_with(
            ResponseTemplate::new(200)
                .set_body_json(json!([template("500", "Target", "2019/01/01 10:00:00 +0000")])),
        )
        .expect(1)
        .mount(&server)
        .await;
    let tester = configured(&server).await;

    let state = tester
        .read_data_source("skytap_template", json!({"name": "^Target$"}))
        .await
        .unwrap();
    assert_eq!(state["id"], "500");
}

#[tokio::test]
async fn test_project_lookup_sets_summary() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/v2/projects"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!([
            {"id": 7, "name": "platform team", "summary": "shared labs", "created_at": "2020/01/01 00:00:00 +0000"},
            {"id": 8, "name": "sales demos", "summary": null}
        ])))
        .mount(&server)
        .await;
    let tester = configured(&server).await;

    let state = tester
        .read_data_source("skytap_project", json!({"name": "platform"}))
        .await
        .unwrap();
    assert_eq!(state["id"], "7");
    assert_eq!(state["summary"], "shared labs");
}

#[tokio::test]
async fn test_validate_data_source_config() {
    let server = MockServer::start().await;
    let tester = configured(&server).await;

    assert_ok!(
        tester
            .validate_data_source_config("skytap_template", json!({"name": "Ubuntu"}))
            .await
    );
    assert_err!(
        tester
            .validate_data_source_config("skytap_template", json!({"name": ""}))
            .await
    );
}
