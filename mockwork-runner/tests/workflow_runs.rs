//! End-to-end runs of the reference host against the per-test mock server.

mod common;

use common::{fixture_runner, person};
use http::{HeaderMap, Method, StatusCode};
use mockwork_runner::prelude::*;
use serde_json::json;
use std::sync::Arc;
use std::time::Duration;

fn data_matcher() -> RequestMatcher {
    RequestMatcher::create()
        .using_get()
        .with_path(PathMatchType::Exact, "/api/v1/data")
}

fn upload_matcher() -> RequestMatcher {
    RequestMatcher::create()
        .using_post()
        .with_path(PathMatchType::Exact, "/api/v1/upload")
}

#[tokio::test]
async fn simple_workflow_succeeds() {
    let mut runner = fixture_runner("http-workflow").build().await.unwrap();

    runner
        .add_mock_response(data_matcher())
        .unwrap()
        .respond_with(ResponseBuilder::create().with_success().with_content_as_json(person()))
        .unwrap();
    runner
        .add_mock_response(upload_matcher())
        .unwrap()
        .respond_with(
            ResponseBuilder::create()
                .with_success()
                .with_content_as_plain_text("success"),
        )
        .unwrap();

    let result = runner.trigger_json(&json!({})).await.unwrap();

    assert_eq!(result.status, RunStatus::Succeeded);
    assert_eq!(result.response.status, StatusCode::ACCEPTED);
    assert_eq!(runner.workflow_run_status(), RunStatus::Succeeded);
    assert_eq!(runner.action_status("GET"), ActionStatus::Succeeded);
    assert_eq!(runner.action_status("POST"), ActionStatus::Succeeded);
    assert_eq!(
        runner.trigger_response().unwrap().status,
        StatusCode::ACCEPTED
    );

    let requests = runner.mock_requests();
    assert_eq!(requests.len(), 2);
    assert_eq!(requests[0].path, "/api/v1/data");
    assert_eq!(requests[0].method, Method::GET);
    assert_eq!(requests[0].header("x-address-type"), Some("business"));
    assert_eq!(requests[1].path, "/api/v1/upload");
    assert_eq!(requests[1].body_json().unwrap(), person());
    assert!(requests[0].sequence < requests[1].sequence);
}

#[tokio::test]
async fn setting_overrides_reach_the_host() {
    let mut runner = fixture_runner("http-workflow")
        .with_override("ServiceTwo-DefaultAddressType", "physical")
        .build()
        .await
        .unwrap();

    runner
        .add_mock_response(data_matcher().with_header("x-address-type", "physical"))
        .unwrap()
        .respond_with(ResponseBuilder::create().with_content_as_json(person()))
        .unwrap();
    runner
        .add_mock_response(upload_matcher())
        .unwrap()
        .respond_with(ResponseBuilder::create().with_success())
        .unwrap();

    let result = runner.trigger_json(&json!({})).await.unwrap();

    assert_eq!(result.status, RunStatus::Succeeded);
    assert_eq!(
        runner.settings().get("ServiceTwo-DefaultAddressType"),
        Some("physical")
    );
    assert_eq!(
        runner.settings().get("MockServer-BaseUrl"),
        Some(runner.mock_base_url())
    );
}

#[tokio::test]
async fn unmatched_call_fails_the_action() {
    let mut runner = fixture_runner("http-workflow").build().await.unwrap();

    runner
        .add_mock_response(data_matcher())
        .unwrap()
        .respond_with(ResponseBuilder::create().with_content_as_json(person()))
        .unwrap();

    let result = runner.trigger_json(&json!({})).await.unwrap();

    assert_eq!(result.status, RunStatus::Failed);
    assert_eq!(result.action_status("GET"), ActionStatus::Succeeded);
    assert_eq!(result.action_status("POST"), ActionStatus::Failed);

    let unmatched = runner.interception_log().unmatched();
    assert_eq!(unmatched.len(), 1);
    assert_eq!(unmatched[0].path, "/api/v1/upload");
    assert_eq!(unmatched[0].response_status, 500);

    let error = runner.monitor().action("POST").unwrap().error.unwrap();
    assert!(error.contains("E101"), "unexpected error: {}", error);
}

#[tokio::test]
async fn last_registered_binding_wins() {
    let mut runner = fixture_runner("http-workflow").build().await.unwrap();

    runner
        .add_mock_response(data_matcher())
        .unwrap()
        .respond_with(ResponseBuilder::create().with_content_as_json(json!({ "v": 1 })))
        .unwrap();
    runner
        .add_mock_response(
            RequestMatcher::create().with_path(PathMatchType::Prefix, "/api/v1/"),
        )
        .unwrap()
        .respond_with(ResponseBuilder::create().with_content_as_json(json!({ "v": 2 })))
        .unwrap();

    let result = runner.trigger_json(&json!({})).await.unwrap();

    assert_eq!(result.status, RunStatus::Succeeded);
    let upload = runner
        .interception_log()
        .first_with_path("/api/v1/upload")
        .unwrap();
    assert_eq!(upload.body_json().unwrap(), json!({ "v": 2 }));
}

#[tokio::test]
async fn server_error_fails_action_and_skips_dependents() {
    let mut runner = fixture_runner("http-workflow").build().await.unwrap();

    runner
        .add_mock_response(data_matcher())
        .unwrap()
        .respond_with(ResponseBuilder::create().with_internal_server_error())
        .unwrap();

    let result = runner.trigger_json(&json!({})).await.unwrap();

    assert_eq!(result.status, RunStatus::Failed);
    assert_eq!(result.action_status("GET"), ActionStatus::Failed);
    assert_eq!(result.action_status("POST"), ActionStatus::Skipped);
    assert_eq!(runner.mock_requests().len(), 1);
}

#[tokio::test]
async fn unknown_action_is_not_started() {
    let mut runner = fixture_runner("http-workflow").build().await.unwrap();
    runner
        .add_mock_response(RequestMatcher::create())
        .unwrap()
        .respond_with(ResponseBuilder::create().with_success())
        .unwrap();

    runner.trigger_json(&json!({})).await.unwrap();

    assert_eq!(
        runner.action_status("never-executed-name"),
        ActionStatus::NotStarted
    );
}

#[tokio::test]
async fn registration_closes_after_trigger() {
    let mut runner = fixture_runner("http-workflow").build().await.unwrap();
    runner
        .add_mock_response(RequestMatcher::create())
        .unwrap()
        .respond_with(ResponseBuilder::create().with_success())
        .unwrap();

    runner.trigger_json(&json!({})).await.unwrap();

    let err = runner.add_mock_response(data_matcher()).err().unwrap();
    assert_eq!(err.code(), "E403");

    let handler: Arc<dyn RequestHandler> =
        Arc::new(|_: &MockRequest| -> Option<MockResponse> { None });
    assert_eq!(runner.set_dynamic_handler(handler).unwrap_err().code(), "E403");
}

#[tokio::test]
async fn second_trigger_is_rejected() {
    let mut runner = fixture_runner("http-workflow").build().await.unwrap();
    runner
        .add_mock_response(RequestMatcher::create())
        .unwrap()
        .respond_with(ResponseBuilder::create().with_success())
        .unwrap();

    runner.trigger_json(&json!({})).await.unwrap();
    let err = runner.trigger_json(&json!({})).await.unwrap_err();
    assert_eq!(err.code(), "E302");
}

#[tokio::test]
async fn wrong_trigger_method_returns_without_a_run() {
    let mut runner = fixture_runner("http-workflow").build().await.unwrap();

    let result = runner
        .trigger("", Method::GET, HeaderMap::new())
        .await
        .unwrap();

    assert_eq!(result.response.status, StatusCode::METHOD_NOT_ALLOWED);
    assert_eq!(result.status, RunStatus::NotTriggered);
    assert!(runner.mock_requests().is_empty());
}

#[tokio::test]
async fn invalid_matcher_fails_at_setup() {
    let runner = fixture_runner("http-workflow").build().await.unwrap();
    let err = runner
        .add_mock_response(RequestMatcher::create().with_path(PathMatchType::Regex, "(unclosed"))
        .err()
        .unwrap();
    assert_eq!(err.code(), "E401");
}

#[tokio::test]
async fn malformed_response_header_fails_at_setup() {
    let mut runner = fixture_runner("http-workflow").build().await.unwrap();
    let err = runner
        .add_mock_response(data_matcher())
        .unwrap()
        .respond_with(ResponseBuilder::create().with_header("x-ok", "bad\nvalue"))
        .unwrap_err();
    assert_eq!(err.code(), "E404");

    runner.trigger_json(&json!({})).await.unwrap();
    assert_eq!(runner.action_status("GET"), ActionStatus::Failed);
    assert_eq!(runner.interception_log().unmatched().len(), 1);
}

#[tokio::test]
async fn timeout_tears_the_runner_down() {
    let mut runner = fixture_runner("http-workflow")
        .with_config(HarnessConfig::default().with_run_timeout(Duration::from_millis(200)))
        .build()
        .await
        .unwrap();

    runner
        .add_mock_response(data_matcher())
        .unwrap()
        .respond_with(
            ResponseBuilder::create()
                .with_success()
                .with_delay(Duration::from_secs(5)),
        )
        .unwrap();

    let err = runner.trigger_json(&json!({})).await.unwrap_err();

    assert_eq!(err, MockworkError::Timeout { timeout_ms: 200 });
    assert_eq!(runner.workflow_run_status(), RunStatus::TimedOut);
    assert!(runner.is_disposed());
    assert_eq!(runner.mock_base_url(), "");
    assert_eq!(runner.action_status("GET"), ActionStatus::Running);
}

#[tokio::test]
async fn disposed_runner_releases_its_port() {
    let runner = fixture_runner("http-workflow").build().await.unwrap();
    let base_url = runner.mock_base_url().to_string();
    let addr = base_url.trim_start_matches("http://").to_string();
    runner.dispose();

    tokio::time::sleep(Duration::from_millis(50)).await;
    let connect = tokio::net::TcpStream::connect(&addr).await;
    assert!(connect.is_err(), "{} still accepting connections", addr);
}

#[tokio::test]
async fn missing_settings_file_fails_fast() {
    let err = TestRunner::builder(common::fixture_host("http-workflow"))
        .with_settings_file("/no/such/local.settings.json")
        .build()
        .await
        .err()
        .unwrap();
    assert_eq!(err.code(), "E405");
}

#[tokio::test]
async fn settings_file_from_temp_dir() {
    let dir = tempfile::tempdir().unwrap();
    let settings_path = dir.path().join("local.settings.json");
    std::fs::write(
        &settings_path,
        json!({ "Values": { "ServiceTwo-DefaultAddressType": "postal" } }).to_string(),
    )
    .unwrap();

    let mut runner = TestRunner::builder(common::fixture_host("http-workflow"))
        .with_settings_file(&settings_path)
        .build()
        .await
        .unwrap();
    runner
        .add_mock_response(data_matcher().with_header("x-address-type", "postal"))
        .unwrap()
        .respond_with(ResponseBuilder::create().with_content_as_json(person()))
        .unwrap();
    runner
        .add_mock_response(upload_matcher())
        .unwrap()
        .respond_with(ResponseBuilder::create().with_success())
        .unwrap();

    let result = runner.trigger_json(&json!({})).await.unwrap();
    assert_eq!(result.status, RunStatus::Succeeded);
}
