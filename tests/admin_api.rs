//! Admin API authentication and response shape.

use std::sync::Arc;

use axum::body::{to_bytes, Body};
use axum::http::{header, Request, StatusCode};
use serde_json::Value;
use tower::ServiceExt;

use command_guard::admin::{setup_admin_router, AdminState};
use command_guard::config::{ConfigStore, GuardConfig};
use command_guard::resilience::{Command, Dispatcher, Registry};

mod common;

const KEY: &str = "test-admin-key";

fn state() -> (AdminState, Dispatcher) {
    let mut config = GuardConfig::default();
    config.admin.api_key = KEY.to_string();
    let store = Arc::new(ConfigStore::new(config).unwrap());
    let registry = Arc::new(Registry::new());
    let dispatcher = Dispatcher::new(registry.clone(), store.clone());
    (
        AdminState {
            registry,
            config: store,
        },
        dispatcher,
    )
}

fn get(path: &str, key: Option<&str>) -> Request<Body> {
    let mut req = Request::builder().uri(path);
    if let Some(key) = key {
        req = req.header(header::AUTHORIZATION, format!("Bearer {key}"));
    }
    req.body(Body::empty()).unwrap()
}

async fn json(res: axum::response::Response) -> Value {
    let bytes = to_bytes(res.into_body(), usize::MAX).await.unwrap();
    serde_json::from_slice(&bytes).unwrap()
}

#[tokio::test]
async fn test_requires_bearer_token() {
    let (state, _) = state();
    let app = setup_admin_router(state);

    let res = app.clone().oneshot(get("/admin/status", None)).await.unwrap();
    assert_eq!(res.status(), StatusCode::UNAUTHORIZED);

    let res = app.clone().oneshot(get("/admin/status", Some("wrong"))).await.unwrap();
    assert_eq!(res.status(), StatusCode::UNAUTHORIZED);

    let res = app.oneshot(get("/admin/status", Some(KEY))).await.unwrap();
    assert_eq!(res.status(), StatusCode::OK);
    let body = json(res).await;
    assert_eq!(body["status"], "operational");
    assert_eq!(body["commands"], 0);
}

#[tokio::test]
async fn test_commands_snapshot_shape() {
    let (state, d) = state();
    let cmd = Command::new("test").with_group("hystrix-group").with_pool("hystrix-pool");
    d.execute(&cmd, common::succeed, common::fallback).await.unwrap();
    d.execute(&cmd, common::fail, common::fallback).await.unwrap();

    let app = setup_admin_router(state.clone());
    let res = app.clone().oneshot(get("/admin/commands", Some(KEY))).await.unwrap();
    assert_eq!(res.status(), StatusCode::OK);
    let body = json(res).await;

    assert_eq!(body["revision"], state.config.snapshot().revision.to_string());
    let command = &body["commands"][0];
    assert_eq!(command["command"], "test");
    assert_eq!(command["group"], "hystrix-group");
    assert_eq!(command["pool"], "hystrix-pool");
    assert_eq!(command["state"], "CLOSED");
    assert_eq!(command["isolation"], "thread_pool");
    assert_eq!(command["rolling"]["success"], 1);
    assert_eq!(command["rolling"]["failure"], 1);
    assert_eq!(command["error_percentage"], 50.0);
    assert_eq!(command["fallback"]["success"], 1);
    assert_eq!(body["pools"][0]["pool"], "hystrix-pool");
    assert_eq!(body["pools"][0]["core_size"], 10);

    let res = app.clone().oneshot(get("/admin/commands/test", Some(KEY))).await.unwrap();
    assert_eq!(res.status(), StatusCode::OK);
    assert_eq!(json(res).await["request_volume"], 2);

    let res = app.oneshot(get("/admin/commands/unknown", Some(KEY))).await.unwrap();
    assert_eq!(res.status(), StatusCode::NOT_FOUND);
}

#[tokio::test]
async fn test_config_is_redacted() {
    let (state, _) = state();
    let app = setup_admin_router(state);

    let res = app.oneshot(get("/admin/config", Some(KEY))).await.unwrap();
    assert_eq!(res.status(), StatusCode::OK);
    let body = json(res).await;
    assert_eq!(body["config"]["admin"]["api_key"], "***");
    assert_eq!(body["config"]["defaults"]["request_volume_threshold"], 20);
}
