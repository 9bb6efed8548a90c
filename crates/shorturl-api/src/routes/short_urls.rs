//! Routes for single short URLs.

use axum::extract::{Path, State};
use axum::response::Redirect;
use axum::{Json, Router, routing::get, routing::post};
use serde::{Deserialize, Serialize};
use tracing::{info, instrument};

use shorturl_shortener::application::{command_handlers, query_handlers};
use shorturl_shortener::domain::commands;

use crate::error::ApiError;
use crate::state::AppState;

/// Request body for POST /.
#[derive(Debug, Deserialize)]
pub struct ShortenRequest {
    /// The URL to shorten.
    pub url: String,
}

/// Response body returned after a URL is shortened.
#[derive(Debug, Serialize)]
pub struct ShortenResponse {
    /// The short hash.
    pub hash: String,
}

/// POST /
#[instrument(skip(state, request))]
async fn shorten(
    State(state): State<AppState>,
    Json(request): Json<ShortenRequest>,
) -> Result<Json<ShortenResponse>, ApiError> {
    let command = commands::ShortenUrl {
        long_url: request.url,
    };

    let hash =
        command_handlers::hash_from_url(&command, state.clock.as_ref(), &state.repository).await?;

    info!(hash = %hash, "handled shorten command");
    Ok(Json(ShortenResponse { hash }))
}

/// GET /{hash}
#[instrument(skip(state))]
async fn redirect(
    State(state): State<AppState>,
    Path(hash): Path<String>,
) -> Result<Redirect, ApiError> {
    let url = query_handlers::return_original_url(&hash, &state.repository).await?;
    Ok(Redirect::temporary(&url))
}

/// GET /{hash}/details
#[instrument(skip(state))]
async fn details(
    State(state): State<AppState>,
    Path(hash): Path<String>,
) -> Result<Json<query_handlers::ShortUrlView>, ApiError> {
    let view = query_handlers::get_short_url(&hash, &state.repository).await?;
    Ok(Json(view))
}

/// Returns the router for short URLs.
pub fn router() -> Router<AppState> {
    Router::new()
        .route("/", post(shorten))
        .route("/{hash}", get(redirect))
        .route("/{hash}/details", get(details))
}
