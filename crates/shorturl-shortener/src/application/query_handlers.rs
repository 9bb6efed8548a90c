//! Query handlers for the shortener context.
//!
//! These rebuild aggregates from their event streams and either resolve the
//! URL a hash redirects to or return read-only views.

use std::sync::{Mutex, PoisonError};

use serde::Serialize;
use shorturl_core::aggregate::Entity;
use shorturl_core::error::DomainError;
use shorturl_core::repository::Repository;
use shorturl_core::rng::DeterministicRng;
use tracing::{debug, instrument};

use crate::domain::aggregates::{LoadBalancedUrl, OriginalUrl, ShortUrl};
use crate::domain::events::{LoadBalancedUrlCreated, ShortUrlCreated, UrlEvent};
use crate::error::ShortenerError;

/// Read-only view of a short URL.
#[derive(Debug, Serialize)]
pub struct ShortUrlView {
    /// The short hash.
    pub hash: String,
    /// The URL behind it.
    pub original_url: OriginalUrl,
    /// Stream version.
    pub version: i64,
}

/// Read-only view of a load-balanced URL.
#[derive(Debug, Serialize)]
pub struct LoadBalancedUrlView {
    /// The short hash.
    pub hash: String,
    /// Every URL of the set with its validity.
    pub urls: Vec<OriginalUrl>,
    /// Stream version.
    pub version: i64,
}

/// An aggregate kind a hash can resolve to.
trait UrlKind: Entity<Event = UrlEvent> {
    /// Creation event of the other kind. A stream opening with it belongs to
    /// a different aggregate, not a broken one.
    const OTHER_KIND_CREATED: &'static str;
}

impl UrlKind for ShortUrl {
    const OTHER_KIND_CREATED: &'static str = LoadBalancedUrlCreated::EVENT_TYPE;
}

impl UrlKind for LoadBalancedUrl {
    const OTHER_KIND_CREATED: &'static str = ShortUrlCreated::EVENT_TYPE;
}

/// Loads `hash` as a `T`. A missing stream or one of the other aggregate
/// kind becomes `missing(hash)`. Any other rejected event is a domain error.
async fn load_as<T: UrlKind>(
    hash: &str,
    repo: &Repository<UrlEvent>,
    missing: fn(String) -> ShortenerError,
) -> Result<(T, i64), ShortenerError> {
    match repo.load::<T>(hash).await {
        Ok(loaded) => Ok(loaded),
        Err(DomainError::EntityNotFound(_)) => Err(missing(hash.to_owned())),
        Err(DomainError::UnhandledEvent { event_type, .. })
            if event_type == T::OTHER_KIND_CREATED =>
        {
            debug!(hash, %event_type, "stream holds the other url kind");
            Err(missing(hash.to_owned()))
        }
        Err(e) => Err(e.into()),
    }
}

/// Resolves the URL behind a short hash.
///
/// # Errors
///
/// Returns `ShortenerError::ShortUrlNotFound` if no short URL exists for the
/// hash, and `ShortenerError::ValidUrlNotFound` while its URL is unverified.
#[instrument(skip(repo))]
pub async fn return_original_url(
    hash: &str,
    repo: &Repository<UrlEvent>,
) -> Result<String, ShortenerError> {
    let (short_url, _) = load_as::<ShortUrl>(hash, repo, ShortenerError::ShortUrlNotFound).await?;
    short_url
        .verified_url()
        .map(str::to_owned)
        .ok_or_else(|| ShortenerError::ValidUrlNotFound(hash.to_owned()))
}

/// Picks a verified URL of a load-balanced set, uniformly at random.
///
/// The RNG lock is held only while picking.
///
/// # Errors
///
/// Returns `ShortenerError::ValidUrlNotFound` if no load-balanced URL exists
/// for the hash or none of its URLs is verified.
#[instrument(skip(repo, rng))]
pub async fn return_a_valid_original_url(
    hash: &str,
    repo: &Repository<UrlEvent>,
    rng: &Mutex<dyn DeterministicRng + Send>,
) -> Result<String, ShortenerError> {
    let (load_balanced, _) =
        load_as::<LoadBalancedUrl>(hash, repo, ShortenerError::ValidUrlNotFound).await?;

    let picked = {
        let mut rng = rng.lock().unwrap_or_else(PoisonError::into_inner);
        load_balanced.pick_valid_url(&mut *rng).map(str::to_owned)
    };

    debug!(picked = ?picked, "load-balanced redirect resolved");
    picked.ok_or_else(|| ShortenerError::ValidUrlNotFound(hash.to_owned()))
}

/// Retrieves a short URL view.
///
/// # Errors
///
/// Returns `ShortenerError::ShortUrlNotFound` if no short URL exists for the
/// hash.
pub async fn get_short_url(
    hash: &str,
    repo: &Repository<UrlEvent>,
) -> Result<ShortUrlView, ShortenerError> {
    let (short_url, version) =
        load_as::<ShortUrl>(hash, repo, ShortenerError::ShortUrlNotFound).await?;
    let original_url = short_url
        .original_url()
        .cloned()
        .ok_or_else(|| ShortenerError::ShortUrlNotFound(hash.to_owned()))?;
    Ok(ShortUrlView {
        hash: short_url.hash,
        original_url,
        version,
    })
}

/// Retrieves a load-balanced URL view.
///
/// # Errors
///
/// Returns `ShortenerError::ShortUrlNotFound` if no load-balanced URL exists
/// for the hash.
pub async fn get_load_balanced_url(
    hash: &str,
    repo: &Repository<UrlEvent>,
) -> Result<LoadBalancedUrlView, ShortenerError> {
    let (load_balanced, version) =
        load_as::<LoadBalancedUrl>(hash, repo, ShortenerError::ShortUrlNotFound).await?;
    Ok(LoadBalancedUrlView {
        hash: load_balanced.hash,
        urls: load_balanced.long_urls,
        version,
    })
}
