//! End-to-end tests for the webhook endpoint, driving the axum router with a
//! recording publisher in place of SNS.

use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use axum::{
    Router,
    body::Body,
    http::{Request, StatusCode},
};
use build_pipeline::error::{PipelineError, Result};
use build_pipeline::message::PublishMessage;
use build_pipeline::publisher::TopicPublisher;
use build_pipeline::{AppState, build_router, parse_config};
use hmac::{Hmac, Mac};
use serde_json::{Value, json};
use sha2::Sha256;
use tower::ServiceExt;

const SECRET: &str = "ABCDEF";
const PROVISIONING_TOPIC: &str = "arn:aws:sns:us-east-1:123456789012:provisioning";
const SITESPEED_TOPIC: &str = "arn:aws:sns:us-east-1:123456789012:sitespeed";

#[derive(Default)]
struct RecordingPublisher {
    published: Mutex<Vec<PublishMessage>>,
    fail: bool,
}

impl RecordingPublisher {
    fn failing() -> Self {
        Self {
            published: Mutex::new(Vec::new()),
            fail: true,
        }
    }

    fn published(&self) -> Vec<PublishMessage> {
        self.published.lock().unwrap().clone()
    }
}

#[async_trait]
impl TopicPublisher for RecordingPublisher {
    async fn publish(&self, message: &PublishMessage) -> Result<String> {
        self.published.lock().unwrap().push(message.clone());
        if self.fail {
            return Err(PipelineError::PublishError("topic does not exist".to_string()));
        }
        Ok("46c3689d-9ca0-425e-a9a7-1ec036eec857".to_string())
    }
}

fn config_toml(secret: Option<&str>) -> String {
    let secret_line = secret
        .map(|s| format!("webhook_secret = \"{}\"\n", s))
        .unwrap_or_default();
    format!(
        r#"{secret_line}
[repository]
org = "foo"
name = "bar"

[[trigger]]
event = "deployment"
topic_arn = "{PROVISIONING_TOPIC}"
job = "prov_job"

[[trigger]]
event = "deployment_status"
topic_arn = "{SITESPEED_TOPIC}"
job = "sitespeed_job"
states = ["success"]
"#
    )
}

fn app_with(secret: Option<&str>, publisher: Arc<RecordingPublisher>) -> Router {
    let config = parse_config(&config_toml(secret)).unwrap();
    build_router(Arc::new(AppState::new(config, publisher)))
}

fn sign(body: &str) -> String {
    let mut mac = Hmac::<Sha256>::new_from_slice(SECRET.as_bytes()).unwrap();
    mac.update(body.as_bytes());
    format!("sha256={}", hex::encode(mac.finalize().into_bytes()))
}

fn plain_request(method: &str, body: &str) -> Request<Body> {
    Request::builder()
        .method(method)
        .uri("/")
        .header("Content-Type", "application/json")
        .body(Body::from(body.to_string()))
        .unwrap()
}

fn github_request(event: &str, body: &str) -> Request<Body> {
    Request::post("/")
        .header("x-github-event", event)
        .header("x-github-delivery", "72d3162e-cc78-11e3-81ab-4c9367dc0958")
        .header("x-hub-signature-256", sign(body))
        .header("Content-Type", "application/json")
        .body(Body::from(body.to_string()))
        .unwrap()
}

async fn send(app: Router, request: Request<Body>) -> (StatusCode, Value) {
    let response = app.oneshot(request).await.unwrap();
    let status = response.status();
    let bytes = axum::body::to_bytes(response.into_body(), 10 * 1024 * 1024)
        .await
        .unwrap();
    let body = serde_json::from_slice(&bytes).unwrap_or(Value::Null);
    (status, body)
}

fn parameter(message: &PublishMessage, name: &str) -> Option<String> {
    let body: Value = serde_json::from_str(&message.body).unwrap();
    body["parameters"]
        .as_array()?
        .iter()
        .find(|p| p["name"] == name)
        .and_then(|p| p["value"].as_str().map(String::from))
}

#[tokio::test]
async fn master_ref_publishes_once() {
    let publisher = Arc::new(RecordingPublisher::default());
    let app = app_with(None, publisher.clone());
    let body = r#"{"ref":"master","payload":"{\"user\":\"atmos\",\"room_id\":123456}","description":"foo"}"#;

    let (status, response) = send(app, plain_request("PUT", body)).await;

    assert_eq!(status, StatusCode::OK);
    assert_eq!(response["status"], "published");
    assert_eq!(response["message_id"], "46c3689d-9ca0-425e-a9a7-1ec036eec857");
    assert_eq!(response["job"], "prov_job");

    let published = publisher.published();
    assert_eq!(published.len(), 1);
    let message = &published[0];
    assert_eq!(message.topic_arn, PROVISIONING_TOPIC);
    assert_eq!(parameter(message, "user").as_deref(), Some("atmos"));
    assert_eq!(parameter(message, "room_id").as_deref(), Some("123456"));
    assert_eq!(parameter(message, "description").as_deref(), Some("foo"));
    assert_eq!(message.attributes["job"], "prov_job");
}

#[tokio::test]
async fn other_branches_are_skipped() {
    let publisher = Arc::new(RecordingPublisher::default());
    let app = app_with(None, publisher.clone());
    let body = r#"{"ref":"develop","payload":"{\"user\":\"atmos\"}","description":"foo"}"#;

    let (status, response) = send(app, plain_request("POST", body)).await;

    assert_eq!(status, StatusCode::OK);
    assert_eq!(response["status"], "skipped");
    assert!(response["reason"].as_str().unwrap().contains("develop"));
    assert!(publisher.published().is_empty());
}

#[tokio::test]
async fn non_json_body_is_a_client_error() {
    let publisher = Arc::new(RecordingPublisher::default());
    let app = app_with(None, publisher.clone());

    let (status, response) = send(app, plain_request("POST", "not-json")).await;

    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert!(response["error"].as_str().unwrap().contains("Malformed payload"));
    assert!(publisher.published().is_empty());
}

#[tokio::test]
async fn missing_ref_is_a_client_error() {
    let publisher = Arc::new(RecordingPublisher::default());
    let app = app_with(None, publisher.clone());

    let (status, _) = send(app, plain_request("POST", r#"{"description":"foo"}"#)).await;

    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert!(publisher.published().is_empty());
}

#[tokio::test]
async fn publish_failure_is_a_server_error_without_retry() {
    let publisher = Arc::new(RecordingPublisher::failing());
    let app = app_with(None, publisher.clone());
    let body = r#"{"ref":"master","payload":"{}","description":"foo"}"#;

    let (status, response) = send(app, plain_request("POST", body)).await;

    assert!(status.is_server_error());
    assert_eq!(status, StatusCode::BAD_GATEWAY);
    assert!(response["error"].as_str().unwrap().contains("topic does not exist"));
    assert_eq!(publisher.published().len(), 1);
}

#[tokio::test]
async fn unsigned_request_is_rejected_when_secret_is_configured() {
    let publisher = Arc::new(RecordingPublisher::default());
    let app = app_with(Some(SECRET), publisher.clone());
    let body = r#"{"ref":"master","payload":"{}","description":"foo"}"#;

    let (status, response) = send(app.clone(), plain_request("POST", body)).await;
    assert_eq!(status, StatusCode::UNAUTHORIZED);
    assert_eq!(response["error"], "invalid webhook signature");

    let forged = Request::post("/")
        .header("x-hub-signature-256", "sha256=0000")
        .body(Body::from(body))
        .unwrap();
    let (status, _) = send(app, forged).await;
    assert_eq!(status, StatusCode::UNAUTHORIZED);

    assert!(publisher.published().is_empty());
}

#[tokio::test]
async fn signed_deployment_event_publishes_provisioning_job() {
    let publisher = Arc::new(RecordingPublisher::default());
    let app = app_with(Some(SECRET), publisher.clone());
    let body = json!({
        "repository": {"full_name": "foo/bar"},
        "deployment": {
            "id": 1,
            "ref": "master",
            "sha": "a84d88e7554fc1fa21bcbc4efae3c782a70d2b9d",
            "task": "deploy",
            "environment": "production",
            "payload": {"user": "atmos", "room_id": 123456},
            "description": null
        }
    })
    .to_string();

    let (status, response) = send(app, github_request("deployment", &body)).await;

    assert_eq!(status, StatusCode::OK);
    assert_eq!(response["status"], "published");
    let published = publisher.published();
    assert_eq!(published.len(), 1);
    assert_eq!(published[0].topic_arn, PROVISIONING_TOPIC);
    assert_eq!(parameter(&published[0], "deployment_id").as_deref(), Some("1"));
    assert_eq!(parameter(&published[0], "environment").as_deref(), Some("production"));
    assert_eq!(parameter(&published[0], "user").as_deref(), Some("atmos"));
}

#[tokio::test]
async fn deployment_status_publishes_only_on_success() {
    let publisher = Arc::new(RecordingPublisher::default());
    let app = app_with(Some(SECRET), publisher.clone());

    let pending = json!({
        "repository": {"full_name": "foo/bar"},
        "deployment": {"ref": "master"},
        "deployment_status": {"state": "pending"}
    })
    .to_string();
    let (status, response) = send(app.clone(), github_request("deployment_status", &pending)).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(response["status"], "skipped");
    assert!(publisher.published().is_empty());

    let success = json!({
        "repository": {"full_name": "foo/bar"},
        "deployment": {"ref": "master"},
        "deployment_status": {"state": "success"}
    })
    .to_string();
    let (status, response) = send(app, github_request("deployment_status", &success)).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(response["job"], "sitespeed_job");

    let published = publisher.published();
    assert_eq!(published.len(), 1);
    assert_eq!(published[0].topic_arn, SITESPEED_TOPIC);
}

#[tokio::test]
async fn unhandled_repository_and_events_are_skipped() {
    let publisher = Arc::new(RecordingPublisher::default());
    let app = app_with(Some(SECRET), publisher.clone());

    let other_repo = json!({
        "repository": {"full_name": "foo/untriggered"},
        "deployment": {"ref": "master"}
    })
    .to_string();
    let (status, response) = send(app.clone(), github_request("deployment", &other_repo)).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(response["status"], "skipped");

    let push = json!({"repository": {"full_name": "foo/bar"}, "ref": "refs/heads/master"}).to_string();
    let (status, response) = send(app.clone(), github_request("push", &push)).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(response["status"], "skipped");

    let ping = json!({"zen": "Keep it logically awesome."}).to_string();
    let (status, response) = send(app, github_request("ping", &ping)).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(response["status"], "skipped");

    assert!(publisher.published().is_empty());
}

#[tokio::test]
async fn get_on_webhook_endpoint_is_not_allowed() {
    let app = app_with(None, Arc::new(RecordingPublisher::default()));
    let request = Request::get("/").body(Body::empty()).unwrap();

    let (status, _) = send(app, request).await;

    assert_eq!(status, StatusCode::METHOD_NOT_ALLOWED);
}

#[tokio::test]
async fn health_reports_configured_triggers() {
    let app = app_with(None, Arc::new(RecordingPublisher::default()));
    let request = Request::get("/health").body(Body::empty()).unwrap();

    let (status, response) = send(app, request).await;

    assert_eq!(status, StatusCode::OK);
    assert_eq!(response["status"], "healthy");
    assert_eq!(response["repository"], "foo/bar");
    assert_eq!(response["triggers"].as_array().unwrap().len(), 2);
}
