//! Command handlers for the shortener context.
//!
//! Each handler validates its input, builds the creation event, and saves it
//! through the repository. Shortening is idempotent: saving a creation event
//! that is already stored is a no-op.

use shorturl_core::clock::Clock;
use shorturl_core::repository::Repository;
use tracing::{info, instrument};
use url::Url;

use crate::domain::aggregates::{LoadBalancedUrl, OriginalUrl, ShortUrl};
use crate::domain::commands::{ShortenUrl, ShortenUrls};
use crate::domain::events::UrlEvent;
use crate::error::ShortenerError;

/// Trims `raw` and checks that it is an absolute URL with a host.
fn normalize(raw: &str) -> Result<String, ShortenerError> {
    let trimmed = raw.trim();
    if trimmed.is_empty() {
        return Err(ShortenerError::InvalidLongUrl("url is empty".into()));
    }
    let parsed =
        Url::parse(trimmed).map_err(|e| ShortenerError::InvalidLongUrl(format!("{trimmed}: {e}")))?;
    if !parsed.has_host() {
        return Err(ShortenerError::InvalidLongUrl(format!(
            "{trimmed}: url has no host"
        )));
    }
    Ok(trimmed.to_owned())
}

/// Shortens one URL and returns its hash.
///
/// # Errors
///
/// Returns `ShortenerError::InvalidLongUrl` if the URL is empty or not an
/// absolute URL with a host, and `ShortenerError::Domain` if saving fails.
#[instrument(skip_all)]
pub async fn hash_from_url(
    command: &ShortenUrl,
    clock: &dyn Clock,
    repo: &Repository<UrlEvent>,
) -> Result<String, ShortenerError> {
    let url = normalize(&command.long_url)?;
    let event = ShortUrl::shorten(&url, clock);
    let hash = event.metadata.entity_id.clone();

    repo.save(&[event]).await?;

    info!(hash = %hash, "short url created");
    Ok(hash)
}

/// Shortens a set of URLs behind one hash. Returns the hash and every URL
/// with its current validity.
///
/// # Errors
///
/// Returns `ShortenerError::InvalidLongUrl` if the set is empty or any URL
/// is invalid, and `ShortenerError::Domain` if saving or reloading fails.
#[instrument(skip_all, fields(count = command.long_urls.len()))]
pub async fn short_urls(
    command: &ShortenUrls,
    clock: &dyn Clock,
    repo: &Repository<UrlEvent>,
) -> Result<(String, Vec<OriginalUrl>), ShortenerError> {
    if command.long_urls.is_empty() {
        return Err(ShortenerError::InvalidLongUrl("no urls specified".into()));
    }
    let urls = command
        .long_urls
        .iter()
        .map(|raw| normalize(raw))
        .collect::<Result<Vec<_>, _>>()?;

    let event = LoadBalancedUrl::shorten(&urls, clock);
    let hash = event.metadata.entity_id.clone();
    repo.save(&[event]).await?;

    // Reload: the set may have been shortened and verified before.
    let (load_balanced, _) = repo.load::<LoadBalancedUrl>(&hash).await?;

    info!(hash = %hash, "load-balanced url created");
    Ok((hash, load_balanced.long_urls))
}
