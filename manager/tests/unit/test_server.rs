//! HTTP API tests driven through the router

use std::sync::Arc;

use axum::body::Body;
use axum::http::{Method, Request, StatusCode};
use axum::Router;
use deploy_manager::errors::SchedulerError;
use deploy_manager::models::deploy::{BuildStep, Step};
use deploy_manager::server::serve::router;
use deploy_manager::server::state::ServerState;
use serde_json::{json, Value};
use tower::ServiceExt;

use crate::common::{harness, Harness};

fn app(h: &Harness) -> Router {
    router(Arc::new(ServerState::new(h.orchestrator.clone())))
}

async fn call(app: &Router, method: Method, uri: &str, body: Option<Value>) -> (StatusCode, Value) {
    let request = Request::builder().method(method).uri(uri);
    let request = match body {
        Some(body) => request
            .header("content-type", "application/json")
            .body(Body::from(body.to_string()))
            .unwrap(),
        None => request.body(Body::empty()).unwrap(),
    };

    let response = app.clone().oneshot(request).await.unwrap();
    let status = response.status();
    let bytes = axum::body::to_bytes(response.into_body(), usize::MAX)
        .await
        .unwrap();
    let value = if bytes.is_empty() {
        Value::Null
    } else {
        serde_json::from_slice(&bytes).unwrap()
    };
    (status, value)
}

async fn create(app: &Router) -> String {
    let (status, body) = call(
        app,
        Method::POST,
        "/deploys",
        Some(json!({
            "git_repo": "https://git/example",
            "name": "demo",
            "envs": { "PORT": "8080" }
        })),
    )
    .await;
    assert_eq!(status, StatusCode::CREATED);
    body["deploy_id"].as_str().unwrap().to_string()
}

#[tokio::test]
async fn test_health() {
    let h = harness();
    let (status, body) = call(&app(&h), Method::GET, "/health", None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["status"], "healthy");
    assert_eq!(body["service"], "deploy-manager");
}

#[tokio::test]
async fn test_create_then_get() {
    let h = harness();
    let app = app(&h);
    let id = create(&app).await;

    let (status, body) = call(&app, Method::GET, &format!("/deploys/{id}"), None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["id"], id.as_str());
    assert_eq!(body["name"], "demo");
    assert_eq!(body["build"]["status"], "loading");
    assert_eq!(body["build"]["job_name"], crate::common::BUILD_JOB);
    assert_eq!(body["workload"]["envs"]["PORT"], "8080");
}

#[tokio::test]
async fn test_progress_is_visible() {
    let h = harness();
    let app = app(&h);
    let id = create(&app).await;

    h.message.publish(&id, BuildStep::ok(Step::Clone));
    h.message.publish(&id, BuildStep::failed(Step::Build, "exit 1"));
    h.message.wait_released(&id).await;

    let (_, body) = call(&app, Method::GET, &format!("/deploys/{id}"), None).await;
    assert_eq!(body["build"]["status"], "error");
    assert_eq!(body["build"]["steps"][0]["step"], "clone");
    assert!(body["build"]["steps"][0].get("error").is_none());
    assert_eq!(body["build"]["steps"][1]["error"], "exit 1");
}

#[tokio::test]
async fn test_list() {
    let h = harness();
    let app = app(&h);
    let first = create(&app).await;
    let second = create(&app).await;

    let (status, body) = call(&app, Method::GET, "/deploys", None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["total"], 2);
    assert_eq!(body["deploys"][0]["id"], first.as_str());
    assert_eq!(body["deploys"][1]["id"], second.as_str());
}

#[tokio::test]
async fn test_lookup_errors() {
    let h = harness();
    let app = app(&h);

    let (status, body) = call(&app, Method::GET, "/deploys/not-an-id", None).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert!(body["error"].is_string());

    let missing = "5f0c6b8e-5d7a-4f43-9a57-1f3c1f0e2a11";
    let (status, _) = call(&app, Method::GET, &format!("/deploys/{missing}"), None).await;
    assert_eq!(status, StatusCode::NOT_FOUND);
}

#[tokio::test]
async fn test_delete() {
    let h = harness();
    let app = app(&h);
    let id = create(&app).await;
    let uri = format!("/deploys/{id}");

    let (status, body) = call(&app, Method::DELETE, &uri, None).await;
    assert_eq!(status, StatusCode::NO_CONTENT);
    assert_eq!(body, Value::Null);

    let (status, _) = call(&app, Method::GET, &uri, None).await;
    assert_eq!(status, StatusCode::NOT_FOUND);
    let (status, _) = call(&app, Method::DELETE, &uri, None).await;
    assert_eq!(status, StatusCode::NOT_FOUND);
}

#[tokio::test]
async fn test_create_validation() {
    let h = harness();
    let app = app(&h);

    let (status, body) = call(
        &app,
        Method::POST,
        "/deploys",
        Some(json!({ "git_repo": "https://git/example", "name": " " })),
    )
    .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body["error"], "name is required");

    let (status, _) = call(
        &app,
        Method::POST,
        "/deploys",
        Some(json!({ "git_repo": "", "name": "demo" })),
    )
    .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert!(h.scheduler.calls().is_empty());
}

#[tokio::test]
async fn test_scheduler_outage_is_bad_gateway() {
    let h = harness();
    *h.scheduler.fail_image_build.lock().unwrap() = Some(SchedulerError::Remote {
        code: "UNAVAILABLE".to_string(),
        message: "connection refused".to_string(),
    });

    let (status, body) = call(
        &app(&h),
        Method::POST,
        "/deploys",
        Some(json!({ "git_repo": "https://git/example", "name": "demo" })),
    )
    .await;
    assert_eq!(status, StatusCode::BAD_GATEWAY);
    assert!(body["error"]
        .as_str()
        .unwrap()
        .contains("connection refused"));
}

#[tokio::test]
async fn test_shutdown_rejects_new_deploys() {
    let h = harness();
    h.orchestrator
        .shutdown(std::time::Duration::from_millis(100))
        .await;

    let (status, _) = call(
        &app(&h),
        Method::POST,
        "/deploys",
        Some(json!({ "git_repo": "https://git/example", "name": "demo" })),
    )
    .await;
    assert_eq!(status, StatusCode::SERVICE_UNAVAILABLE);
}

#[tokio::test]
async fn test_unknown_route_is_json_404() {
    let h = harness();
    let (status, body) = call(&app(&h), Method::GET, "/builds", None).await;
    assert_eq!(status, StatusCode::NOT_FOUND);
    assert_eq!(body["error"], "no route for /builds");
}

#[tokio::test]
async fn test_malformed_body_is_json_400() {
    let h = harness();
    let app = app(&h);

    let (status, body) = call(&app, Method::POST, "/deploys", Some(json!(["demo"]))).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert!(body["error"].is_string());

    let (status, body) = call(
        &app,
        Method::POST,
        "/deploys",
        Some(json!({ "name": "demo" })),
    )
    .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert!(body["error"].as_str().unwrap().contains("git_repo"));

    let request = Request::builder()
        .method(Method::POST)
        .uri("/deploys")
        .body(Body::from("git_repo=x"))
        .unwrap();
    let response = app.clone().oneshot(request).await.unwrap();
    assert_eq!(response.status(), StatusCode::BAD_REQUEST);
    let bytes = axum::body::to_bytes(response.into_body(), usize::MAX)
        .await
        .unwrap();
    let body: Value = serde_json::from_slice(&bytes).unwrap();
    assert!(body["error"].is_string());
    assert!(h.scheduler.calls().is_empty());
}
