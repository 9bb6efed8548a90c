//! Routes for load-balanced URLs.

use axum::extract::{Path, State};
use axum::response::Redirect;
use axum::{Json, Router, routing::get, routing::post};
use serde::{Deserialize, Serialize};
use tracing::{info, instrument};

use shorturl_shortener::application::{command_handlers, query_handlers};
use shorturl_shortener::domain::aggregates::OriginalUrl;
use shorturl_shortener::domain::commands;

use crate::error::ApiError;
use crate::state::AppState;

/// Request body for POST /.
#[derive(Debug, Deserialize)]
pub struct BalanceRequest {
    /// The URLs to balance between.
    pub urls: Vec<String>,
}

/// Response body returned after a set of URLs is shortened.
#[derive(Debug, Serialize)]
pub struct BalanceResponse {
    /// The short hash.
    pub hash: String,
    /// Every URL with its current validity.
    pub urls: Vec<OriginalUrl>,
}

/// POST /
#[instrument(skip(state, request), fields(count = request.urls.len()))]
async fn balance(
    State(state): State<AppState>,
    Json(request): Json<BalanceRequest>,
) -> Result<Json<BalanceResponse>, ApiError> {
    let command = commands::ShortenUrls {
        long_urls: request.urls,
    };

    let (hash, urls) =
        command_handlers::short_urls(&command, state.clock.as_ref(), &state.repository).await?;

    info!(hash = %hash, "handled balance command");
    Ok(Json(BalanceResponse { hash, urls }))
}

/// GET /{hash}
#[instrument(skip(state))]
async fn redirect(
    State(state): State<AppState>,
    Path(hash): Path<String>,
) -> Result<Redirect, ApiError> {
    let url =
        query_handlers::return_a_valid_original_url(&hash, &state.repository, &state.rng).await?;
    Ok(Redirect::temporary(&url))
}

/// GET /{hash}/details
#[instrument(skip(state))]
async fn details(
    State(state): State<AppState>,
    Path(hash): Path<String>,
) -> Result<Json<query_handlers::LoadBalancedUrlView>, ApiError> {
    let view = query_handlers::get_load_balanced_url(&hash, &state.repository).await?;
    Ok(Json(view))
}

/// Returns the router for load-balanced URLs.
pub fn router() -> Router<AppState> {
    Router::new()
        .route("/", post(balance))
        .route("/{hash}", get(redirect))
        .route("/{hash}/details", get(details))
}

#[cfg(test)]
mod tests {
    use std::sync::{Arc, Mutex};

    use axum::body::Body;
    use axum::http::{Request, StatusCode, header};
    use serde_json::Value;
    use shorturl_core::broker::Broker;
    use shorturl_core::clock::Clock;
    use shorturl_core::repository::Repository;
    use shorturl_core::rng::DeterministicRng;
    use shorturl_event_store::memory::InMemoryEventStore;
    use shorturl_shortener::domain::events::{LoadBalancedUrlVerified, UrlEvent};
    use shorturl_test_support::{FixedClock, SequenceRng, fixed_time};
    use tower::ServiceExt;

    use super::*;

    fn state(rng: SequenceRng) -> AppState {
        let clock: Arc<dyn Clock + Send + Sync> = Arc::new(FixedClock::default());
        let rng: Arc<Mutex<dyn DeterministicRng + Send>> = Arc::new(Mutex::new(rng));
        AppState::new(
            Repository::new(Arc::new(InMemoryEventStore::new()), Arc::new(Broker::new())),
            clock,
            rng,
        )
    }

    fn post(body: &Value) -> Request<Body> {
        Request::builder()
            .method("POST")
            .uri("/")
            .header("content-type", "application/json")
            .body(Body::from(serde_json::to_vec(body).unwrap()))
            .unwrap()
    }

    fn get(uri: &str) -> Request<Body> {
        Request::builder().uri(uri).body(Body::empty()).unwrap()
    }

    async fn json_body(response: axum::response::Response) -> Value {
        let bytes = axum::body::to_bytes(response.into_body(), usize::MAX)
            .await
            .unwrap();
        serde_json::from_slice(&bytes).unwrap()
    }

    async fn create(app: &Router) -> String {
        let response = app
            .clone()
            .oneshot(post(&serde_json::json!({
                "urls": ["https://a.example", "https://b.example", "https://c.example"]
            })))
            .await
            .unwrap();
        json_body(response).await["hash"]
            .as_str()
            .unwrap()
            .to_owned()
    }

    #[tokio::test]
    async fn test_balance_returns_hash_and_unverified_urls() {
        let app = router().with_state(state(SequenceRng::new(vec![])));

        let response = app
            .oneshot(post(&serde_json::json!({
                "urls": ["https://a.example", "https://b.example"]
            })))
            .await
            .unwrap();

        assert_eq!(response.status(), StatusCode::OK);
        let json = json_body(response).await;
        assert_eq!(json["hash"].as_str().unwrap().len(), 8);
        assert_eq!(json["urls"][0]["url"], "https://a.example");
        assert_eq!(json["urls"][1]["is_valid"], false);
    }

    #[tokio::test]
    async fn test_balance_empty_set_returns_400() {
        let app = router().with_state(state(SequenceRng::new(vec![])));

        let response = app
            .oneshot(post(&serde_json::json!({ "urls": [] })))
            .await
            .unwrap();

        assert_eq!(response.status(), StatusCode::BAD_REQUEST);
    }

    #[tokio::test]
    async fn test_redirect_picks_among_verified_urls() {
        // Arrange
        let state = state(SequenceRng::new(vec![1]));
        let app = router().with_state(state.clone());
        let hash = create(&app).await;
        for (version, url) in [(1, "https://a.example"), (3, "https://c.example")] {
            state
                .repository
                .save(&[UrlEvent::new(
                    hash.as_str(),
                    version,
                    fixed_time(),
                    LoadBalancedUrlVerified { url: url.into() },
                )])
                .await
                .unwrap();
        }

        // Act
        let response = app.oneshot(get(&format!("/{hash}"))).await.unwrap();

        // Assert
        assert_eq!(response.status(), StatusCode::TEMPORARY_REDIRECT);
        assert_eq!(response.headers()[header::LOCATION], "https://c.example");
    }

    #[tokio::test]
    async fn test_redirect_without_verified_urls_returns_404() {
        let app = router().with_state(state(SequenceRng::new(vec![])));
        let hash = create(&app).await;

        let response = app.oneshot(get(&format!("/{hash}"))).await.unwrap();

        assert_eq!(response.status(), StatusCode::NOT_FOUND);
        assert_eq!(json_body(response).await["error"], "valid_url_not_found");
    }

    #[tokio::test]
    async fn test_details_returns_view() {
        let app = router().with_state(state(SequenceRng::new(vec![])));
        let hash = create(&app).await;

        let response = app
            .oneshot(get(&format!("/{hash}/details")))
            .await
            .unwrap();

        assert_eq!(response.status(), StatusCode::OK);
        let json = json_body(response).await;
        assert_eq!(json["hash"], hash);
        assert_eq!(json["urls"].as_array().unwrap().len(), 3);
    }
}
