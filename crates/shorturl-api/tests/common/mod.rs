//! Shared test helpers for API integration tests.
#![allow(dead_code)]

use std::sync::{Arc, Mutex};

use axum::Router;
use axum::body::Body;
use axum::http::{Request, StatusCode, header};
use http_body_util::BodyExt;
use shorturl_core::broker::Broker;
use shorturl_core::clock::Clock;
use shorturl_core::repository::Repository;
use shorturl_core::rng::DeterministicRng;
use shorturl_event_store::memory::InMemoryEventStore;
use shorturl_test_support::{FixedClock, SequenceRng};
use tower::ServiceExt;

use shorturl_api::app;
use shorturl_api::state::AppState;

/// State over an in-memory store with a fixed clock and scripted RNG.
pub fn memory_state(rng: SequenceRng) -> AppState {
    let clock: Arc<dyn Clock + Send + Sync> = Arc::new(FixedClock::default());
    let rng: Arc<Mutex<dyn DeterministicRng + Send>> = Arc::new(Mutex::new(rng));
    AppState::new(
        Repository::new(Arc::new(InMemoryEventStore::new()), Arc::new(Broker::new())),
        clock,
        rng,
    )
}

/// Build the full app router over `state`, exactly as `main.rs` does.
pub fn build_test_app(state: AppState) -> Router {
    app::router(state)
}

/// Send a POST request with a JSON body and return the response.
pub async fn post_json(
    app: Router,
    uri: &str,
    body: &serde_json::Value,
) -> (StatusCode, serde_json::Value) {
    let request = Request::builder()
        .method("POST")
        .uri(uri)
        .header("content-type", "application/json")
        .body(Body::from(serde_json::to_vec(body).unwrap()))
        .unwrap();

    let response = app.oneshot(request).await.unwrap();
    let status = response.status();
    let body_bytes = response.into_body().collect().await.unwrap().to_bytes();
    let json: serde_json::Value = serde_json::from_slice(&body_bytes).unwrap();

    (status, json)
}

/// Send a GET request and return the response.
pub async fn get_json(app: Router, uri: &str) -> (StatusCode, serde_json::Value) {
    let request = Request::builder()
        .method("GET")
        .uri(uri)
        .body(Body::empty())
        .unwrap();

    let response = app.oneshot(request).await.unwrap();
    let status = response.status();
    let body_bytes = response.into_body().collect().await.unwrap().to_bytes();
    let json: serde_json::Value = serde_json::from_slice(&body_bytes).unwrap();

    (status, json)
}

/// Send a GET request and return the status with the `Location` header, if any.
pub async fn get_redirect(app: Router, uri: &str) -> (StatusCode, Option<String>) {
    let request = Request::builder()
        .method("GET")
        .uri(uri)
        .body(Body::empty())
        .unwrap();

    let response = app.oneshot(request).await.unwrap();
    let location = response
        .headers()
        .get(header::LOCATION)
        .map(|value| value.to_str().unwrap().to_owned());

    (response.status(), location)
}
