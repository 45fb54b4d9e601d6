use std::sync::Arc;

use axum::http::StatusCode;
use axum_test_helper::TestClient;
use pgprobe::drivers::{
    InMemoryTestConnector, InMemoryTestDriver, InMemoryTestResponseBuilder, IN_MEMORY_DRIVER_NAME,
};
use pgprobe::server::{self, QUERY_ROUTE};
use pgprobe::{BatchExecutor, BatchResponse};
use serde_json::{json, Value};

fn client_for(connector: InMemoryTestConnector) -> TestClient {
    let executor = BatchExecutor::new(Arc::new(connector), "test-rust-pgprobe-0.1.0");
    TestClient::new(server::router(Arc::new(executor)))
}

async fn post(client: &TestClient, body: String) -> (StatusCode, Value) {
    let res = client
        .post(QUERY_ROUTE)
        .body(body)
        .header("Content-Type", "application/json")
        .send()
        .await;
    let status = res.status();
    let body = serde_json::from_str(&res.text().await).unwrap();
    (status, body)
}

#[tokio::test]
async fn test_successful_batch_returns_ok() {
    let driver = Arc::new(
        InMemoryTestDriver::new().with_response(
            InMemoryTestResponseBuilder::new()
                .columns(&["n"])
                .row(&[json!(1)])
                .build(),
        ),
    );
    let client = client_for(InMemoryTestConnector::new(driver));

    let (status, body) = post(
        &client,
        json!({
            "connstr": "postgres://localhost/app",
            "queries": [{"query": "SELECT 1 AS n", "params": []}],
        })
        .to_string(),
    )
    .await;

    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["driverName"], json!(IN_MEMORY_DRIVER_NAME));

    let record = &body["queries"][0];
    assert_eq!(record["kind"], json!("db"));
    assert_eq!(record["method"], json!("query"));
    assert_eq!(record["isFailed"], json!(false));
    assert!(record["durationNs"].is_i64());
    assert!(record["finishedAt"].is_string());

    let response: Value = serde_json::from_str(record["response"].as_str().unwrap()).unwrap();
    assert_eq!(response["rows"], json!([{"n": 1}]));
    assert_eq!(response["rowCount"], json!(1));
    assert_eq!(response["command"], json!("SELECT"));
}

#[tokio::test]
async fn test_failed_query_still_returns_ok() {
    let driver = Arc::new(InMemoryTestDriver::new().with_error("relation \"t\" does not exist"));
    let client = client_for(InMemoryTestConnector::new(driver));

    let (status, body) = post(
        &client,
        json!({
            "connstr": "postgres://localhost/app",
            "queries": [
                {"query": "SELECT * FROM t", "params": null},
                {"query": "SELECT 2", "params": []},
            ],
        })
        .to_string(),
    )
    .await;

    assert_eq!(status, StatusCode::OK);
    let queries = body["queries"].as_array().unwrap();
    assert_eq!(queries.len(), 1);
    assert_eq!(queries[0]["isFailed"], json!(true));
    assert!(queries[0].get("finishedAt").is_none());
    assert!(queries[0].get("durationNs").is_none());
    assert!(queries[0]["error"].as_str().unwrap().contains("does not exist"));
}

#[tokio::test]
async fn test_connect_failure_returns_ok() {
    let driver = Arc::new(InMemoryTestDriver::new());
    let client = client_for(InMemoryTestConnector::new(driver).rejecting("invalid port number"));

    let (status, body) = post(
        &client,
        json!({"connstr": "postgres://localhost:99999/app", "queries": [{"query": "SELECT 1", "params": []}]})
            .to_string(),
    )
    .await;

    assert_eq!(status, StatusCode::OK);
    let response: BatchResponse = serde_json::from_value(body).unwrap();
    assert_eq!(response.queries.len(), 1);
    assert_eq!(response.queries[0].addr, "postgres://localhost:99999/app");
    assert!(response.queries[0].is_failed);
}

#[tokio::test]
async fn test_malformed_body_is_reported_as_unhandled() {
    let driver = Arc::new(InMemoryTestDriver::new());
    let client = client_for(InMemoryTestConnector::new(Arc::clone(&driver)));

    let (status, body) = post(&client, r#"{"queries": "not a list"}"#.to_string()).await;

    assert_eq!(status, StatusCode::INTERNAL_SERVER_ERROR);
    assert_eq!(body["driverName"], json!(IN_MEMORY_DRIVER_NAME));

    let queries = body["queries"].as_array().unwrap();
    assert_eq!(queries.len(), 1);
    assert_eq!(queries[0]["kind"], json!("unhandled-exception"));
    assert_eq!(queries[0]["method"], json!("catch"));
    assert_eq!(queries[0]["addr"], json!("unknown"));
    assert_eq!(queries[0]["isFailed"], json!(true));
    assert!(queries[0].get("startedAt").is_none());
    assert!(!queries[0]["error"].as_str().unwrap().is_empty());
    driver.assert_query_count(0);
}
