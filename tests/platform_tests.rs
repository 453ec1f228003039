//! REST platform client behavior against a local mock server.

use serde_json::json;
use wiremock::matchers::{body_partial_json, method, path, query_param};
use wiremock::{Mock, MockServer, ResponseTemplate};

use jobtriage::config::PlatformConfig;
use jobtriage::platform::{JobPlatform, PlatformError, RestPlatformClient};

fn client(server: &MockServer) -> RestPlatformClient {
    let config = PlatformConfig {
        workspace_url: server.uri(),
        token: "test-token".into(),
        request_timeout_secs: 5,
    };
    RestPlatformClient::with_base_url(&config, server.uri())
}

#[tokio::test]
async fn get_run_failure_assembles_every_error_field() {
    let server = MockServer::start().await;

    Mock::given(method("GET"))
        .and(path("/jobs/runs/get"))
        .and(query_param("run_id", "42"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "state_message": "Run failed",
            "job_parameters": {"memory_gb": 4}
        })))
        .mount(&server)
        .await;

    Mock::given(method("GET"))
        .and(path("/jobs/runs/get-output"))
        .and(query_param("run_id", "42"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "error": "OutOfMemoryError: Java heap space",
            "error_trace": "at org.apache.spark.executor..."
        })))
        .mount(&server)
        .await;

    let failure = client(&server).get_run_failure("7", "42").await.unwrap();

    assert_eq!(
        failure.error_text,
        "Run failed | OutOfMemoryError: Java heap space | at org.apache.spark.executor..."
    );
    assert_eq!(failure.parameters.get("memory_gb"), Some(&json!(4)));
}

#[tokio::test]
async fn empty_error_fields_fall_back_to_unknown() {
    let server = MockServer::start().await;

    Mock::given(method("GET"))
        .and(path("/jobs/runs/get"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({})))
        .mount(&server)
        .await;

    Mock::given(method("GET"))
        .and(path("/jobs/runs/get-output"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({"error": ""})))
        .mount(&server)
        .await;

    let failure = client(&server).get_run_failure("7", "42").await.unwrap();
    assert_eq!(failure.error_text, "Unknown error");
}

#[tokio::test]
async fn missing_run_maps_to_not_found() {
    let server = MockServer::start().await;

    Mock::given(method("GET"))
        .and(path("/jobs/runs/get"))
        .respond_with(ResponseTemplate::new(404).set_body_string("run does not exist"))
        .mount(&server)
        .await;

    let err = client(&server).get_run_failure("7", "42").await.unwrap_err();
    assert!(matches!(err, PlatformError::NotFound(_)));
}

#[tokio::test]
async fn server_errors_are_transient() {
    let server = MockServer::start().await;

    Mock::given(method("GET"))
        .and(path("/jobs/runs/get"))
        .respond_with(ResponseTemplate::new(503))
        .mount(&server)
        .await;

    let err = client(&server).get_run_failure("7", "42").await.unwrap_err();
    assert!(err.is_transient());
}

#[tokio::test]
async fn auth_failures_are_not_retried_as_transient() {
    let server = MockServer::start().await;

    Mock::given(method("GET"))
        .and(path("/jobs/runs/get"))
        .respond_with(ResponseTemplate::new(401))
        .mount(&server)
        .await;

    let err = client(&server).get_run_failure("7", "42").await.unwrap_err();
    assert!(matches!(err, PlatformError::Auth(_)));
    assert!(!err.is_transient());
}

#[tokio::test]
async fn submit_run_sends_parameters_and_returns_run_id() {
    let server = MockServer::start().await;

    Mock::given(method("POST"))
        .and(path("/jobs/run-now"))
        .and(body_partial_json(json!({
            "job_id": "7",
            "job_parameters": {"memory_gb": 16}
        })))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({"run_id": 99})))
        .mount(&server)
        .await;

    let params = std::collections::HashMap::from([("memory_gb".to_string(), json!(16))]);
    let run_id = client(&server).submit_run("7", &params).await.unwrap();

    // Numeric platform ids come back as strings
    assert_eq!(run_id, "99");
}

#[tokio::test]
async fn list_recent_failures_keeps_only_failed_runs() {
    let server = MockServer::start().await;

    Mock::given(method("GET"))
        .and(path("/jobs/runs/list"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "runs": [
                {"job_id": 7, "run_id": 42, "state": {"result_state": "FAILED"}},
                {"job_id": 7, "run_id": 43, "state": {"result_state": "SUCCESS"}},
                {"job_id": 8, "run_id": 44, "state": {}}
            ]
        })))
        .mount(&server)
        .await;

    let failures = client(&server).list_recent_failures(24).await.unwrap();

    assert_eq!(failures.len(), 1);
    assert_eq!(failures[0].job_id, "7");
    assert_eq!(failures[0].run_id, "42");
}

#[tokio::test]
async fn cancel_run_posts_the_run_id() {
    let server = MockServer::start().await;

    Mock::given(method("POST"))
        .and(path("/jobs/runs/cancel"))
        .and(body_partial_json(json!({"run_id": "42"})))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({})))
        .mount(&server)
        .await;

    client(&server).cancel_run("42").await.unwrap();
}
