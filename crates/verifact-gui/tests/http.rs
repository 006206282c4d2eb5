use std::path::PathBuf;
use std::sync::Arc;

use async_trait::async_trait;
use axum::http::{HeaderValue, header};
use axum_test::TestServer;
use base64::{Engine as _, engine::general_purpose::STANDARD};
use serde_json::{Value, json};
use tokio::time::{Duration, sleep, timeout};
use verifact_core::{
    AgentRuntime, CompletionRequest, FactChecker, LlmBackend, Pipeline, Settings,
};
use verifact_gui::config::AppConfig;
use verifact_gui::routes::build_router;
use verifact_gui::state::{AppState, CheckService};

fn roster(file: &str) -> PathBuf {
    PathBuf::from(env!("CARGO_MANIFEST_DIR"))
        .join("../../config")
        .join(file)
}

fn base_config() -> AppConfig {
    AppConfig {
        listen_addr: "127.0.0.1:0".into(),
        max_concurrency: 2,
        max_upload_bytes: 1024 * 1024,
        assets_dir: PathBuf::from(env!("CARGO_MANIFEST_DIR")).join("web/dist"),
        gui_enabled: false,
        auth_token: None,
        otel_endpoint: None,
        record_ttl: CheckService::DEFAULT_RECORD_TTL,
        settings: Settings::offline(roster("agents.yaml"), roster("tasks.yaml")),
    }
}

fn enabled_config() -> AppConfig {
    let mut config = base_config();
    config.gui_enabled = true;
    config
}

async fn server_for(config: &AppConfig) -> TestServer {
    let state = AppState::try_new(config)
        .await
        .expect("state initialization failed");
    TestServer::new(build_router(state)).expect("test server")
}

async fn wait_for_terminal_state(server: &TestServer, check_id: &str) -> Value {
    let status_path = format!("/api/checks/{check_id}");
    timeout(Duration::from_secs(5), async {
        loop {
            let response = server.get(&status_path).await;
            assert_eq!(response.status_code(), 200);
            let payload = response.json::<Value>();
            if payload["state"] != "running" {
                return payload;
            }
            sleep(Duration::from_millis(25)).await;
        }
    })
    .await
    .expect("check did not finish in time")
}

async fn submit(server: &TestServer, body: Value) -> String {
    let response = server.post("/api/checks").json(&body).await;
    assert_eq!(response.status_code(), 202, "{}", response.text());
    let payload = response.json::<Value>();
    payload["check_id"]
        .as_str()
        .expect("check id missing")
        .to_string()
}

#[tokio::test]
async fn readiness_requires_gui_flag() {
    let disabled = server_for(&base_config()).await;
    assert_eq!(disabled.get("/health/ready").await.status_code(), 503);
    assert_eq!(disabled.get("/health/live").await.status_code(), 200);
    assert_eq!(disabled.get("/api/checks").await.status_code(), 403);

    let enabled = server_for(&enabled_config()).await;
    let response = enabled.get("/health/ready").await;
    assert_eq!(response.status_code(), 200);
    let body = response.json::<Value>();
    assert_eq!(body["metrics"]["max_concurrency"], 2);
}

#[tokio::test]
async fn api_requires_bearer_token_when_configured() {
    let mut config = base_config();
    config.auth_token = Some("secret".into());
    // a token alone enables the dashboard
    config.gui_enabled = true;
    let server = server_for(&config).await;

    let response = server.get("/api/checks").await;
    assert_eq!(response.status_code(), 401);

    let response = server
        .get("/api/checks")
        .add_header(header::AUTHORIZATION, HeaderValue::from_static("Bearer secret"))
        .await;
    assert_eq!(response.status_code(), 200);
    let body = response.json::<Value>();
    assert!(body["checks"].is_array());
}

#[tokio::test]
async fn claim_check_completes_and_report_downloads_once() {
    let server = server_for(&enabled_config()).await;
    let check_id = submit(&server, json!({ "claim": "The Earth is flat" })).await;

    let status = wait_for_terminal_state(&server, &check_id).await;
    assert_eq!(status["state"], "completed");
    assert_eq!(status["mode"], "claim_or_url");
    assert_eq!(status["verdict"], "no clear verdict");
    assert!(
        status["result"]
            .as_str()
            .is_some_and(|result| result.contains("fact_check_claim")),
        "unexpected result: {status}"
    );

    let stream = server.get(&format!("/api/checks/{check_id}/stream")).await;
    assert_eq!(stream.status_code(), 200);
    let body = stream.text();
    assert!(body.contains("event: completed"), "{body}");
    assert!(body.contains("\"verdict\":\"no clear verdict\""), "{body}");

    let listed = server.get("/api/checks").await.json::<Value>();
    assert_eq!(listed["checks"].as_array().map(Vec::len), Some(1));

    let report_path = format!("/api/checks/{check_id}/report");
    let report = server.get(&report_path).await;
    assert_eq!(report.status_code(), 200);
    let disposition = report
        .headers()
        .get(header::CONTENT_DISPOSITION)
        .and_then(|value| value.to_str().ok())
        .unwrap_or_default()
        .to_string();
    assert!(disposition.contains("verifact_report.txt"), "{disposition}");
    assert_eq!(report.text(), status["result"].as_str().unwrap_or_default());

    assert_eq!(server.get(&report_path).await.status_code(), 404);
    assert_eq!(
        server.get(&format!("/api/checks/{check_id}")).await.status_code(),
        404
    );
}

#[tokio::test]
async fn text_document_runs_topic_tasks() {
    let server = server_for(&enabled_config()).await;
    let document = STANDARD.encode("Drinking eight glasses of water a day is required.");
    let check_id = submit(
        &server,
        json!({ "document": { "file_name": "claims.txt", "content_base64": document } }),
    )
    .await;

    let status = wait_for_terminal_state(&server, &check_id).await;
    assert_eq!(status["state"], "completed");
    assert_eq!(status["mode"], "topic");
    assert!(
        status["result"]
            .as_str()
            .is_some_and(|result| result.contains("fact_check_document")),
        "unexpected result: {status}"
    );
}

#[tokio::test]
async fn invalid_submissions_are_rejected() {
    let server = server_for(&enabled_config()).await;

    let response = server.post("/api/checks").json(&json!({ "claim": "  " })).await;
    assert_eq!(response.status_code(), 400);

    let response = server
        .post("/api/checks")
        .json(&json!({ "document": { "file_name": "a.txt", "content_base64": "%%%" } }))
        .await;
    assert_eq!(response.status_code(), 400);

    let response = server
        .post("/api/checks")
        .json(&json!({
            "document": { "file_name": "scan.pdf", "content_base64": STANDARD.encode("%PDF") }
        }))
        .await;
    assert_eq!(response.status_code(), 400);
    assert_eq!(response.json::<Value>()["error_kind"], "document");
}

#[tokio::test]
async fn uncollected_results_expire() {
    let mut config = enabled_config();
    config.record_ttl = Duration::ZERO;
    let server = server_for(&config).await;

    let check_id = submit(&server, json!({ "claim": "Goldfish forget in three seconds" })).await;
    let status = wait_for_terminal_state(&server, &check_id).await;
    assert_eq!(status["state"], "completed");

    let listed = server.get("/api/checks").await.json::<Value>();
    assert_eq!(listed["checks"].as_array().map(Vec::len), Some(0));
    assert_eq!(
        server.get(&format!("/api/checks/{check_id}/report")).await.status_code(),
        404
    );
}

struct FailingBackend;

#[async_trait]
impl LlmBackend for FailingBackend {
    async fn complete(&self, _request: &CompletionRequest) -> anyhow::Result<String> {
        Err(anyhow::anyhow!("upstream unavailable"))
    }

    fn name(&self) -> &str {
        "failing"
    }
}

#[tokio::test]
async fn failed_checks_report_their_error_kind() {
    let config = enabled_config();
    let pipeline = Pipeline::with_runtime(
        config.settings.clone(),
        AgentRuntime::new(Arc::new(FailingBackend)),
    );
    let service = CheckService::new(FactChecker::new(pipeline), config.max_concurrency);
    let state = AppState::with_service(&config, service);
    let server = TestServer::new(build_router(state)).expect("test server");

    let check_id = submit(&server, json!({ "url": "https://example.com/story" })).await;
    let status = wait_for_terminal_state(&server, &check_id).await;

    assert_eq!(status["state"], "failed");
    assert_eq!(status["error_kind"], "execution");
    assert!(
        status["error"]
            .as_str()
            .is_some_and(|error| error.contains("upstream unavailable")),
        "{status}"
    );

    let report_path = format!("/api/checks/{check_id}/report");
    assert_eq!(server.get(&report_path).await.status_code(), 409);

    let check_path = format!("/api/checks/{check_id}");
    assert_eq!(server.delete(&check_path).await.status_code(), 204);
    assert_eq!(server.get(&check_path).await.status_code(), 404);
}
