//! Shared test helpers for relay integration tests.
#![allow(dead_code)]

use std::sync::Arc;

use axum::Router;
use axum::body::Body;
use axum::http::{Request, StatusCode};
use chrono::{DateTime, TimeZone, Utc};
use http_body_util::BodyExt;
use tower::ServiceExt;
use uuid::Uuid;
use wms_core::envelope::{CorrelationContext, EnvelopeFactory};
use wms_core::outbox::OutboxRecord;
use wms_outbox::PublisherConfig;
use wms_outbox::publisher::PublisherStats;
use wms_test_support::{FixedClock, InMemoryDatastore};

use wms_relay::routes;
use wms_relay::state::AppState;

/// Fixed timestamp used across all integration tests.
pub fn fixed_now() -> DateTime<Utc> {
    Utc.with_ymd_and_hms(2026, 1, 15, 10, 0, 0).unwrap()
}

/// Build the full app router over an in-memory outbox. Uses the same route
/// structure as `main.rs`.
pub fn build_test_app(store: &InMemoryDatastore) -> Router {
    build_test_app_with_stats(store, Arc::new(PublisherStats::default()))
}

/// Build the app router reporting the given publisher counters.
pub fn build_test_app_with_stats(store: &InMemoryDatastore, stats: Arc<PublisherStats>) -> Router {
    routes::router(AppState::new(
        Arc::new(store.clone()),
        stats,
        PublisherConfig::default().max_attempts,
    ))
}

/// Builds an unpublished outbox record for one putaway-task event.
pub fn task_record(task_id: &str, event_type: &str) -> OutboxRecord {
    let factory = EnvelopeFactory::new(Arc::new(FixedClock(fixed_now())));
    let envelope = factory.create(
        event_type,
        &format!("putaway-task/{task_id}"),
        serde_json::json!({ "taskId": task_id }),
        &CorrelationContext::new(Uuid::new_v4()),
    );
    OutboxRecord::new(
        "putaway-task",
        task_id,
        "wms.stow.events",
        &envelope,
        fixed_now(),
    )
    .unwrap()
}

/// Send a GET request and return the status with the raw body.
pub async fn get(app: Router, uri: &str) -> (StatusCode, Vec<u8>) {
    let request = Request::builder()
        .method("GET")
        .uri(uri)
        .body(Body::empty())
        .unwrap();

    let response = app.oneshot(request).await.unwrap();
    let status = response.status();
    let body_bytes = response.into_body().collect().await.unwrap().to_bytes();

    (status, body_bytes.to_vec())
}

/// Send a GET request and return the response.
pub async fn get_json(app: Router, uri: &str) -> (StatusCode, serde_json::Value) {
    let (status, body) = get(app, uri).await;
    let json: serde_json::Value = serde_json::from_slice(&body).unwrap();

    (status, json)
}
