use std::sync::Arc;
use std::time::Duration;

use nutrition_resolver::catalog::{
    CatalogError, CatalogSearch, ClientCredentialsProvider, FatSecretAdapter, StaticCredential,
};
use serde_json::json;
use wiremock::matchers::{body_string_contains, header, header_exists, method, path, query_param};
use wiremock::{Mock, MockServer, ResponseTemplate};

fn adapter(server: &MockServer) -> FatSecretAdapter {
    FatSecretAdapter::with_config(
        server.uri(),
        Duration::from_secs(5),
        Arc::new(StaticCredential::new("tok-static")),
    )
    .unwrap()
}

async fn token_requests(server: &MockServer) -> usize {
    server
        .received_requests()
        .await
        .unwrap()
        .iter()
        .filter(|r| r.url.path() == "/connect/token")
        .count()
}

#[tokio::test]
async fn search_sends_expression_page_size_and_bearer_token() {
    let server = MockServer::start().await;

    Mock::given(method("GET"))
        .and(path("/foods/search/v1"))
        .and(header("authorization", "Bearer tok-static"))
        .and(query_param("search_expression", "chicken breast"))
        .and(query_param("max_results", "10"))
        .and(query_param("format", "json"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "foods": {
                "food": [
                    {
                        "food_id": "1641",
                        "food_name": "Chicken Breast",
                        "food_type": "Generic",
                        "food_description": "Per 100g - Calories: 165kcal | Fat: 3.60g | Carbs: 0.00g | Protein: 31.00g"
                    },
                    {
                        "food_id": 99,
                        "food_name": "Chicken Breast Fillets",
                        "brand_name": "Tesco",
                        "food_description": "Per 1 fillet - Calories: 190kcal | Fat: 2.00g | Carbs: 0.50g | Protein: 40.00g"
                    }
                ],
                "max_results": "10",
                "total_results": "2"
            }
        })))
        .expect(1)
        .mount(&server)
        .await;

    let response = adapter(&server).search("chicken breast", 10).await.unwrap();
    let entries = response.entries();
    assert_eq!(entries.len(), 2);
    assert_eq!(entries[0].food_id, "1641");
    assert_eq!(entries[0].brand_name, None);
    assert_eq!(entries[1].food_id, "99");
    assert_eq!(entries[1].brand_name.as_deref(), Some("Tesco"));
}

#[tokio::test]
async fn search_accepts_single_food_object() {
    let server = MockServer::start().await;

    Mock::given(method("GET"))
        .and(path("/foods/search/v1"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "foods": {
                "food": {
                    "food_id": "7",
                    "food_name": "Coca-Cola",
                    "brand_name": "Coca-Cola",
                    "food_description": "Per 100ml - Calories: 42kcal | Fat: 0.00g | Carbs: 10.60g | Protein: 0.00g"
                }
            }
        })))
        .mount(&server)
        .await;

    let response = adapter(&server).search("coke", 10).await.unwrap();
    assert_eq!(response.entries().len(), 1);
    assert_eq!(response.entries()[0].food_name, "Coca-Cola");
}

#[tokio::test]
async fn search_with_no_foods_is_empty_not_an_error() {
    let server = MockServer::start().await;

    Mock::given(method("GET"))
        .and(path("/foods/search/v1"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "foods": { "max_results": "10", "total_results": "0" }
        })))
        .mount(&server)
        .await;

    let response = adapter(&server).search("zzzz", 10).await.unwrap();
    assert!(response.entries().is_empty());
}

#[tokio::test]
async fn search_clamps_page_size() {
    let server = MockServer::start().await;

    Mock::given(method("GET"))
        .and(path("/foods/search/v1"))
        .and(query_param("max_results", "50"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({ "foods": {} })))
        .expect(1)
        .mount(&server)
        .await;

    adapter(&server).search("rice", 500).await.unwrap();
}

#[tokio::test]
async fn api_error_in_ok_body_is_reported() {
    let server = MockServer::start().await;

    Mock::given(method("GET"))
        .and(path("/foods/search/v1"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "error": { "code": 21, "message": "Invalid IP address detected" }
        })))
        .mount(&server)
        .await;

    let err = adapter(&server).search("rice", 10).await.unwrap_err();
    assert_eq!(err.code(), "api_error");
    match err {
        CatalogError::Api { code, message } => {
            assert_eq!(code, 21);
            assert!(message.contains("Invalid IP"));
        }
        other => panic!("expected Api error, got {other:?}"),
    }
}

#[tokio::test]
async fn http_failure_maps_to_status_error() {
    let server = MockServer::start().await;

    Mock::given(method("GET"))
        .and(path("/foods/search/v1"))
        .respond_with(ResponseTemplate::new(503).set_body_string("maintenance"))
        .mount(&server)
        .await;

    let err = adapter(&server).search("rice", 10).await.unwrap_err();
    match err {
        CatalogError::Status { status, message } => {
            assert_eq!(status, 503);
            assert_eq!(message, "maintenance");
        }
        other => panic!("expected Status error, got {other:?}"),
    }
}

#[tokio::test]
async fn malformed_body_maps_to_parse_error() {
    let server = MockServer::start().await;

    Mock::given(method("GET"))
        .and(path("/foods/search/v1"))
        .respond_with(ResponseTemplate::new(200).set_body_string("<html>oops</html>"))
        .mount(&server)
        .await;

    let err = adapter(&server).search("rice", 10).await.unwrap_err();
    assert_eq!(err.code(), "parse_error");
}

#[tokio::test]
async fn client_credentials_token_is_fetched_once_and_reused() {
    let server = MockServer::start().await;

    Mock::given(method("POST"))
        .and(path("/connect/token"))
        .and(header_exists("authorization"))
        .and(body_string_contains("grant_type=client_credentials"))
        .and(body_string_contains("scope=basic"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "access_token": "tok-oauth",
            "expires_in": 86400,
            "token_type": "Bearer"
        })))
        .mount(&server)
        .await;

    Mock::given(method("GET"))
        .and(path("/foods/search/v1"))
        .and(header("authorization", "Bearer tok-oauth"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({ "foods": {} })))
        .expect(2)
        .mount(&server)
        .await;

    let credentials = ClientCredentialsProvider::new(
        "client-id",
        "client-secret",
        format!("{}/connect/token", server.uri()),
        Duration::from_secs(5),
    )
    .unwrap();
    let adapter =
        FatSecretAdapter::with_config(server.uri(), Duration::from_secs(5), Arc::new(credentials))
            .unwrap();

    adapter.search("rice", 10).await.unwrap();
    adapter.search("beans", 10).await.unwrap();

    assert_eq!(token_requests(&server).await, 1);
}

#[tokio::test]
async fn unauthorized_search_drops_cached_token() {
    let server = MockServer::start().await;

    Mock::given(method("POST"))
        .and(path("/connect/token"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "access_token": "tok-oauth",
            "expires_in": 86400
        })))
        .mount(&server)
        .await;

    Mock::given(method("GET"))
        .and(path("/foods/search/v1"))
        .respond_with(ResponseTemplate::new(401).set_body_json(json!({
            "error": { "code": 13, "message": "Invalid token" }
        })))
        .up_to_n_times(1)
        .mount(&server)
        .await;

    Mock::given(method("GET"))
        .and(path("/foods/search/v1"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({ "foods": {} })))
        .mount(&server)
        .await;

    let credentials = ClientCredentialsProvider::new(
        "client-id",
        "client-secret",
        format!("{}/connect/token", server.uri()),
        Duration::from_secs(5),
    )
    .unwrap();
    let adapter =
        FatSecretAdapter::with_config(server.uri(), Duration::from_secs(5), Arc::new(credentials))
            .unwrap();

    let err = adapter.search("rice", 10).await.unwrap_err();
    assert!(matches!(err, CatalogError::Status { status: 401, .. }));

    adapter.search("rice", 10).await.unwrap();
    assert_eq!(token_requests(&server).await, 2);
}

#[tokio::test]
async fn token_endpoint_failure_is_a_credentials_error() {
    let server = MockServer::start().await;

    Mock::given(method("POST"))
        .and(path("/connect/token"))
        .respond_with(ResponseTemplate::new(400).set_body_json(json!({
            "error": "invalid_client"
        })))
        .mount(&server)
        .await;

    let credentials = ClientCredentialsProvider::new(
        "client-id",
        "wrong",
        format!("{}/connect/token", server.uri()),
        Duration::from_secs(5),
    )
    .unwrap();
    let adapter =
        FatSecretAdapter::with_config(server.uri(), Duration::from_secs(5), Arc::new(credentials))
            .unwrap();

    let err = adapter.search("rice", 10).await.unwrap_err();
    assert_eq!(err.code(), "credentials");
    assert!(err.to_string().contains("invalid_client"));
}

#[tokio::test]
async fn token_request_carries_configured_scope() {
    let server = MockServer::start().await;

    Mock::given(method("POST"))
        .and(path("/connect/token"))
        .and(body_string_contains("scope=premier"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "access_token": "tok-premier",
            "expires_in": 86400
        })))
        .expect(1)
        .mount(&server)
        .await;

    Mock::given(method("GET"))
        .and(path("/foods/search/v1"))
        .and(header("authorization", "Bearer tok-premier"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({ "foods": {} })))
        .expect(1)
        .mount(&server)
        .await;

    let credentials = ClientCredentialsProvider::new(
        "client-id",
        "client-secret",
        format!("{}/connect/token", server.uri()),
        Duration::from_secs(5),
    )
    .unwrap()
    .with_scope("premier");
    let adapter =
        FatSecretAdapter::with_config(server.uri(), Duration::from_secs(5), Arc::new(credentials))
            .unwrap();

    adapter.search("oats", 10).await.unwrap();
}
