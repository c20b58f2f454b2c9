mod common;

use reqwest::StatusCode;
use serde_json::json;
use wiremock::matchers::{method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

use common::spawn_app;

fn field_report() -> serde_json::Value {
    json!({
        "project": "Acme",
        "timestamp": "2025-02-01T10:00:00Z",
        "notes": "Poured footings",
        "manpower": 6
    })
}

async fn upstream(status: u16) -> MockServer {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .respond_with(ResponseTemplate::new(status))
        .mount(&server)
        .await;
    server
}

// ---------------------------------------------------------------------------
// Health and inspection
// ---------------------------------------------------------------------------

#[tokio::test]
async fn health_check_with_security_headers() {
    let server = upstream(200).await;
    let app = spawn_app(&server.uri()).await;

    let resp = app.client.get(app.url("/health")).send().await.unwrap();

    assert_eq!(resp.status(), StatusCode::OK);
    assert_eq!(resp.headers()["x-content-type-options"], "nosniff");
    assert_eq!(resp.headers()["x-frame-options"], "DENY");
    assert_eq!(resp.text().await.unwrap(), "ok");
}

#[tokio::test]
async fn lists_every_configured_queue() {
    let server = upstream(200).await;
    let app = spawn_app(&server.uri()).await;

    let (body, status) = app.get("/api/v1/queues").await;

    assert_eq!(status, StatusCode::OK);
    let names: Vec<&str> = body
        .as_array()
        .unwrap()
        .iter()
        .map(|q| q["name"].as_str().unwrap())
        .collect();
    assert_eq!(names, vec!["crm", "estimating", "field-reports"]);
    assert_eq!(body[0]["state"], "idle");
    assert_eq!(body[0]["pending"], 0);
}

#[tokio::test]
async fn unknown_queue_is_not_found() {
    let server = upstream(200).await;
    let app = spawn_app(&server.uri()).await;

    let (_, status) = app.get("/api/v1/queues/payroll").await;
    assert_eq!(status, StatusCode::NOT_FOUND);

    let (_, status) = app.submit("payroll", json!({})).await;
    assert_eq!(status, StatusCode::NOT_FOUND);
}

// ---------------------------------------------------------------------------
// Submissions
// ---------------------------------------------------------------------------

#[tokio::test]
async fn delivered_submission_returns_ok() {
    let server = upstream(200).await;
    let app = spawn_app(&server.uri()).await;

    let (body, status) = app.submit("field-reports", field_report()).await;

    assert_eq!(status, StatusCode::OK);
    assert_eq!(body, json!({ "status": "delivered" }));
    assert_eq!(server.received_requests().await.unwrap().len(), 1);
}

#[tokio::test]
async fn failed_submission_is_queued() {
    let server = upstream(500).await;
    let app = spawn_app(&server.uri()).await;

    let (body, status) = app.submit("field-reports", field_report()).await;

    assert_eq!(status, StatusCode::ACCEPTED);
    assert_eq!(body["status"], "queued");
    let id = body["id"].as_i64().unwrap();

    let (body, status) = app.get("/api/v1/queues/field-reports").await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["queue"]["pending"], 1);

    let entry = &body["entries"][0];
    assert_eq!(entry["id"], id);
    assert_eq!(entry["attempts"], 0);
    assert!(entry["nextAttempt"].as_i64().unwrap() > entry["createdAt"].as_i64().unwrap());
    assert_eq!(entry["payload"]["authToken"], "test-token");
    assert_eq!(entry["payload"]["body"]["project"], "Acme");
}

#[tokio::test]
async fn malformed_payload_is_rejected() {
    let server = upstream(200).await;
    let app = spawn_app(&server.uri()).await;

    let (body, status) = app
        .submit("field-reports", json!({ "notes": "no project" }))
        .await;

    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert!(body["error"].as_str().is_some());
    assert!(server.received_requests().await.unwrap().is_empty());
}

// ---------------------------------------------------------------------------
// Connectivity and background flush
// ---------------------------------------------------------------------------

#[tokio::test]
async fn offline_submissions_flush_when_back_online() {
    let server = upstream(200).await;
    let app = spawn_app(&server.uri()).await;

    let (body, _) = app
        .put("/api/v1/connectivity", &json!({ "online": false }))
        .await;
    assert_eq!(body["changed"], true);

    let (body, status) = app.submit("field-reports", field_report()).await;
    assert_eq!(status, StatusCode::ACCEPTED);
    assert_eq!(body["status"], "queued");

    let (body, _) = app.get("/api/v1/connectivity").await;
    assert_eq!(body["online"], false);
    assert!(server.received_requests().await.unwrap().is_empty());

    app.put("/api/v1/connectivity", &json!({ "online": true }))
        .await;

    assert!(
        app.wait_for_pending("field-reports", 0).await,
        "queue was not flushed after reconnecting"
    );
    assert_eq!(server.received_requests().await.unwrap().len(), 1);
}

#[tokio::test]
async fn flush_while_offline_reports_offline() {
    let server = upstream(200).await;
    let app = spawn_app(&server.uri()).await;
    app.put("/api/v1/connectivity", &json!({ "online": false }))
        .await;

    let (body, status) = app.flush("crm").await;

    assert_eq!(status, StatusCode::OK);
    assert_eq!(body, json!({ "status": "offline" }));
}

#[tokio::test]
async fn flush_reports_a_completed_pass() {
    let server = upstream(200).await;
    let app = spawn_app(&server.uri()).await;

    let (body, status) = app.flush("estimating").await;

    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["status"], "completed");
    assert_eq!(body["delivered"], 0);
    assert_eq!(body["aborted"], false);
}

// ---------------------------------------------------------------------------
// Retry and removal
// ---------------------------------------------------------------------------

#[tokio::test]
async fn retry_delivers_a_waiting_entry() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/reports"))
        .respond_with(ResponseTemplate::new(503))
        .up_to_n_times(1)
        .mount(&server)
        .await;
    Mock::given(method("POST"))
        .and(path("/reports"))
        .respond_with(ResponseTemplate::new(200))
        .mount(&server)
        .await;
    let app = spawn_app(&server.uri()).await;

    let (body, _) = app.submit("field-reports", field_report()).await;
    let id = body["id"].as_i64().unwrap();

    let (body, status) = app.retry("field-reports", id).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body, json!({ "status": "delivered" }));
    assert!(app.wait_for_pending("field-reports", 0).await);

    let (body, status) = app.retry("field-reports", id).await;
    assert_eq!(status, StatusCode::NOT_FOUND);
    assert_eq!(body, json!({ "status": "not_found" }));
}

#[tokio::test]
async fn failed_retry_reports_the_new_schedule() {
    let server = upstream(500).await;
    let app = spawn_app(&server.uri()).await;

    let touch = json!({
        "companyId": "c-1",
        "type": "call",
        "timestamp": "2025-02-01T10:00:00Z"
    });
    let (body, _) = app.submit("crm", touch).await;
    let id = body["id"].as_i64().unwrap();

    let (body, status) = app.retry("crm", id).await;

    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["status"], "rescheduled");
    assert_eq!(body["attempts"], 1);
    assert!(body["nextAttempt"].as_i64().is_some());
}

#[tokio::test]
async fn delete_removes_and_is_idempotent() {
    let server = upstream(500).await;
    let app = spawn_app(&server.uri()).await;

    let (body, _) = app.submit("field-reports", field_report()).await;
    let id = body["id"].as_i64().unwrap();

    let path = format!("/api/v1/queues/field-reports/entries/{id}");
    let (body, status) = app.delete(&path).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body, json!({ "status": "removed" }));

    let (body, status) = app.delete(&path).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body, json!({ "status": "removed" }));

    let (body, _) = app.get("/api/v1/queues/field-reports").await;
    assert_eq!(body["queue"]["pending"], 0);
    assert_eq!(body["entries"], json!([]));
}
