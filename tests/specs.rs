// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Workspace-root integration tests: wires all four crates together through
//! `previewd_daemon::proxy::build_router` and drives it with `tower::
//! ServiceExt::oneshot`, the way the rest of the boot sequence (a real
//! dev-server child process, a real Postgres, a real Redis) never has to be
//! present for the router's own behavior to be exercised.

use std::sync::Arc;
use std::time::Instant;

use axum::body::Body;
use axum::http::{Request, StatusCode};
use parking_lot::Mutex;
use tower::ServiceExt;
use wiremock::matchers::{method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

use previewd_adapters::fakes::FakeSessionStore;
use previewd_core::{
    Credential, LifecycleEvent, MachineConfig, MachineId, ProjectId, ScopedToken, SessionId,
    SessionRecord, SessionStatus,
};
use previewd_daemon::proxy::build_router;
use previewd_daemon::state::{AppState, SubscriptionHandle};
use previewd_engine::health::HealthSnapshot;
use previewd_engine::Lifecycle;

fn sample_config() -> MachineConfig {
    MachineConfig {
        machine_id: MachineId::new("m1"),
        project_id: ProjectId::new("p1"),
        object_store_base_url: "https://example.invalid".to_string(),
        credential: Credential::BearerToken("token".to_string()),
        snapshot_archive_url: None,
        broadcast_redis_url: "redis://127.0.0.1".to_string(),
        broadcast_token: ScopedToken {
            token: "t".to_string(),
            scope: "realtime:project:p1".to_string(),
        },
        session_store_url: "postgres://localhost/db".to_string(),
        public_host: "preview.example.invalid".to_string(),
        listen_port: 8080,
    }
}

fn make_state(session_store: Arc<FakeSessionStore>) -> (AppState, Arc<Lifecycle>) {
    let lifecycle = Lifecycle::new();
    let state = AppState {
        config: Arc::new(sample_config()),
        lifecycle: lifecycle.clone(),
        health: Arc::new(Mutex::new(HealthSnapshot::default())),
        subscription: Arc::new(SubscriptionHandle::default()),
        session_store,
        http_client: reqwest::Client::new(),
        start_time: Instant::now(),
    };
    (state, lifecycle)
}

fn active_record(session_id: &str, machine_id: &str) -> SessionRecord {
    SessionRecord {
        session_id: SessionId::new(session_id),
        project_id: ProjectId::new("p1"),
        machine_id: MachineId::new(machine_id),
        status: SessionStatus::Active,
        created_at: chrono::Utc::now(),
    }
}

fn drive_to_ready(lifecycle: &Lifecycle) {
    lifecycle.transition(LifecycleEvent::HydrationStarted);
    lifecycle.transition(LifecycleEvent::HydrationComplete);
    lifecycle.transition(LifecycleEvent::InstallComplete);
    lifecycle.transition(LifecycleEvent::ProbeSucceeded);
    assert_eq!(lifecycle.current(), previewd_core::LifecycleState::Ready);
}

#[tokio::test]
async fn session_request_for_a_foreign_machine_gets_a_replay_hint() {
    let store = Arc::new(FakeSessionStore::new());
    store.insert(active_record("s1", "other-machine"));
    let (state, lifecycle) = make_state(store);
    drive_to_ready(&lifecycle);

    let router = build_router(state);
    let response = router
        .oneshot(
            Request::builder()
                .uri("/session/s1")
                .body(Body::empty())
                .unwrap(),
        )
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::TEMPORARY_REDIRECT);
    let replay = response
        .headers()
        .get("fly-replay")
        .and_then(|v| v.to_str().ok())
        .unwrap();
    assert_eq!(replay, "instance=other-machine");
}

#[tokio::test]
async fn unknown_session_returns_404_after_exhausting_the_poll_budget() {
    let store = Arc::new(FakeSessionStore::new());
    let (state, lifecycle) = make_state(store);
    drive_to_ready(&lifecycle);

    let router = build_router(state);
    let response = router
        .oneshot(
            Request::builder()
                .uri("/session/does-not-exist")
                .body(Body::empty())
                .unwrap(),
        )
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::NOT_FOUND);
    let bytes = axum::body::to_bytes(response.into_body(), usize::MAX)
        .await
        .unwrap();
    let body: serde_json::Value = serde_json::from_slice(&bytes).unwrap();
    assert_eq!(body["attempts"], 5);
    assert_eq!(body["sessionId"], "does-not-exist");
}

#[tokio::test]
async fn session_store_unreachable_surfaces_as_503() {
    let store = Arc::new(FakeSessionStore::new());
    store.set_unreachable(true);
    let (state, lifecycle) = make_state(store);
    drive_to_ready(&lifecycle);

    let router = build_router(state);
    let response = router
        .oneshot(
            Request::builder()
                .uri("/session/s1")
                .body(Body::empty())
                .unwrap(),
        )
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::SERVICE_UNAVAILABLE);
}

#[tokio::test]
async fn matched_session_is_proxied_and_its_html_is_rewritten_with_the_session_prefix() {
    let dev_server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/"))
        .respond_with(
            ResponseTemplate::new(200).insert_header("content-type", "text/html").set_body_string(
                "<!doctype html><html><body><script type=\"module\" src=\"/src/main.js\"></script></body></html>",
            ),
        )
        .mount(&dev_server)
        .await;

    let store = Arc::new(FakeSessionStore::new());
    store.insert(active_record("s1", "m1"));
    let (state, lifecycle) = make_state(store);
    drive_to_ready(&lifecycle);
    lifecycle.publish_port(dev_server.address().port());

    let router = build_router(state);
    let response = router
        .oneshot(
            Request::builder()
                .uri("/session/s1")
                .header("accept", "text/html")
                .body(Body::empty())
                .unwrap(),
        )
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::OK);
    let bytes = axum::body::to_bytes(response.into_body(), usize::MAX)
        .await
        .unwrap();
    let body = String::from_utf8(bytes.to_vec()).unwrap();
    assert!(body.contains(r#"src="/session/s1/src/main.js""#));
}

#[tokio::test]
async fn session_request_before_the_dev_server_is_bound_gets_a_self_refreshing_503() {
    let store = Arc::new(FakeSessionStore::new());
    store.insert(active_record("s1", "m1"));
    let (state, lifecycle) = make_state(store);
    // Lifecycle never reaches Ready/Degraded, so no port is ever published.
    let _ = &lifecycle;

    let router = build_router(state);
    let response = router
        .oneshot(
            Request::builder()
                .uri("/session/s1")
                .header("accept", "text/html")
                .body(Body::empty())
                .unwrap(),
        )
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::SERVICE_UNAVAILABLE);
    let content_type = response
        .headers()
        .get(axum::http::header::CONTENT_TYPE)
        .and_then(|v| v.to_str().ok())
        .unwrap();
    assert!(content_type.starts_with("text/html"));
}

#[tokio::test]
async fn health_endpoint_status_code_follows_the_lifecycle() {
    let store = Arc::new(FakeSessionStore::new());
    let (state, lifecycle) = make_state(store);
    let router = build_router(state);

    let starting = router
        .clone()
        .oneshot(Request::builder().uri("/health").body(Body::empty()).unwrap())
        .await
        .unwrap();
    assert_eq!(starting.status(), StatusCode::SERVICE_UNAVAILABLE);

    drive_to_ready(&lifecycle);
    let ready = router
        .clone()
        .oneshot(Request::builder().uri("/health").body(Body::empty()).unwrap())
        .await
        .unwrap();
    assert_eq!(ready.status(), StatusCode::OK);

    lifecycle.transition(LifecycleEvent::ProbeFailed);
    let degraded = router
        .clone()
        .oneshot(Request::builder().uri("/health").body(Body::empty()).unwrap())
        .await
        .unwrap();
    assert_eq!(degraded.status(), StatusCode::SERVICE_UNAVAILABLE);

    lifecycle.transition(LifecycleEvent::RestartBudgetExhausted);
    let errored = router
        .oneshot(Request::builder().uri("/health").body(Body::empty()).unwrap())
        .await
        .unwrap();
    assert_eq!(errored.status(), StatusCode::INTERNAL_SERVER_ERROR);
}

#[tokio::test]
async fn degraded_machine_keeps_serving_through_a_single_failed_probe() {
    let dev_server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/"))
        .respond_with(ResponseTemplate::new(200).set_body_string("ok"))
        .mount(&dev_server)
        .await;

    let store = Arc::new(FakeSessionStore::new());
    store.insert(active_record("s1", "m1"));
    let (state, lifecycle) = make_state(store);
    drive_to_ready(&lifecycle);
    lifecycle.publish_port(dev_server.address().port());
    lifecycle.transition(LifecycleEvent::ProbeFailed);
    assert_eq!(lifecycle.current(), previewd_core::LifecycleState::Degraded);

    let router = build_router(state);
    let response = router
        .oneshot(
            Request::builder()
                .uri("/session/s1")
                .body(Body::empty())
                .unwrap(),
        )
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::OK);
}
