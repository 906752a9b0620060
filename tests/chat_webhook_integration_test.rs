//! Chat webhook delivery against a mock server.

use serde_json::json;
use wiremock::matchers::{body_partial_json, header, method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

use privflow::adapters::sqlite::create_migrated_test_pool;
use privflow::domain::models::{ArtifactFields, ArtifactKind, ChatWebhookConfig};
use privflow::{Config, WorkflowRuntime};

async fn runtime_with_webhook(url: String) -> WorkflowRuntime {
    let mut config = Config::default();
    config.notifications.delivery_timeout_secs = 2;
    config.notifications.chat_webhook = ChatWebhookConfig {
        enabled: true,
        url: Some(url),
        username: Some("privflow-bot".to_string()),
    };
    let pool = create_migrated_test_pool().await.expect("test pool");
    WorkflowRuntime::from_pool(pool, config).await.expect("runtime")
}

#[tokio::test]
async fn test_stage_change_is_posted() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/hooks/privflow"))
        .and(header("content-type", "application/json"))
        .and(body_partial_json(json!({
            "username": "privflow-bot",
            "text": "Payroll PIA moved to In Progress",
        })))
        .respond_with(ResponseTemplate::new(200))
        .expect(1)
        .mount(&server)
        .await;

    let runtime = runtime_with_webhook(format!("{}/hooks/privflow", server.uri())).await;
    let (artifact, _) = runtime
        .create_artifact(ArtifactKind::Impact, "Payroll PIA", None, ArtifactFields::default(), "carl")
        .await
        .unwrap();
    runtime
        .transition(artifact.id, "in_progress", "carl", None)
        .await
        .unwrap();

    assert_eq!(runtime.counters().webhook_failures, 0);
    server.verify().await;
}

#[tokio::test]
async fn test_webhook_failure_does_not_fail_transition() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .respond_with(ResponseTemplate::new(500).set_body_string("boom"))
        .mount(&server)
        .await;

    let runtime = runtime_with_webhook(server.uri()).await;
    let (artifact, _) = runtime
        .create_artifact(ArtifactKind::Document, "Retention policy", None, ArtifactFields::default(), "carl")
        .await
        .unwrap();

    let outcome = runtime.transition(artifact.id, "review", "carl", None).await.unwrap();
    assert!(outcome.changed);
    assert_eq!(runtime.counters().webhook_failures, 1);
    assert_eq!(runtime.state(artifact.id).await.unwrap().unwrap().current_stage, "review");
}
