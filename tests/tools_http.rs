//! Diagnostics tools against a mocked lab API.

use serde_json::{Map, Value, json};
use wiremock::matchers::{method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

use vaani_gateway::core::live::FunctionCall;
use vaani_gateway::core::tools::{
    DiagnosticsClient, HealthPackagesTool, TestDetailsTool, ToolError, ToolHandler, ToolName,
    ToolRegistry,
};

async fn client_for(server: &MockServer) -> DiagnosticsClient {
    DiagnosticsClient::new(server.uri()).expect("client builds")
}

#[tokio::test]
async fn test_health_packages_strip_locations() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/tests/popular/health-packages"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "data": [
                {"name": "Full Body Checkup", "price": 1999, "locations": ["Pune", "Delhi"]},
                {"name": "Diabetes Panel", "price": 799, "locations": []}
            ]
        })))
        .expect(1)
        .mount(&server)
        .await;

    let tool = HealthPackagesTool::new(client_for(&server).await);
    let result = tool.call(&Map::new()).await.unwrap();

    assert_eq!(
        result,
        json!([
            {"name": "Full Body Checkup", "price": 1999},
            {"name": "Diabetes Panel", "price": 799}
        ])
    );
}

#[tokio::test]
async fn test_test_details_strip_nested_locations() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/tests/paginate/individual/724/1"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "data": {
                "page": 1,
                "docs": [{"name": "CBC", "locations": [{"city": "Pune"}]}]
            }
        })))
        .expect(1)
        .mount(&server)
        .await;

    let tool = TestDetailsTool::new(client_for(&server).await);
    let result = tool.call(&Map::new()).await.unwrap();
    assert_eq!(result, json!([{"name": "CBC"}]));
}

#[tokio::test]
async fn test_server_error_is_http_error() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/tests/popular/health-packages"))
        .respond_with(ResponseTemplate::new(502))
        .mount(&server)
        .await;

    let tool = HealthPackagesTool::new(client_for(&server).await);
    assert!(matches!(
        tool.call(&Map::new()).await,
        Err(ToolError::Http(_))
    ));
}

#[tokio::test]
async fn test_unexpected_shape_is_reported() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/tests/paginate/individual/724/1"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({"data": []})))
        .mount(&server)
        .await;

    let tool = TestDetailsTool::new(client_for(&server).await);
    assert!(matches!(
        tool.call(&Map::new()).await,
        Err(ToolError::UnexpectedResponse(_))
    ));
}

#[tokio::test]
async fn test_registry_dispatch_wraps_http_failure() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/tests/popular/health-packages"))
        .respond_with(ResponseTemplate::new(500))
        .mount(&server)
        .await;

    let mut registry = ToolRegistry::new();
    registry.register_tools(
        "yoda_diagnostics",
        &[ToolName::GetHealthPackages],
        &client_for(&server).await,
    );

    let call = FunctionCall {
        id: "c-7".to_string(),
        name: "get_health_packages".to_string(),
        args: Map::new(),
    };
    let response = registry.dispatch("yoda_diagnostics", &call).await;

    assert_eq!(response.id, "c-7");
    assert!(response.is_error());
    assert!(matches!(response.response["error"], Value::String(_)));
}
