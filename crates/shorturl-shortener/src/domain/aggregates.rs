//! Aggregates for the shortener context.

use serde::Serialize;
use shorturl_core::aggregate::Entity;
use shorturl_core::clock::Clock;
use shorturl_core::rng::DeterministicRng;

use super::events::{
    LoadBalancedUrlCreated, LoadBalancedUrlVerified, ShortUrlCreated, ShortUrlVerified, UrlEvent,
    UrlEventKind,
};
use super::hash::{hash_from_url, hash_from_urls};

/// A URL together with whether validation has confirmed it.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct OriginalUrl {
    /// The URL as submitted.
    pub url: String,
    /// Set once a verification names this exact URL. Never reset.
    pub is_valid: bool,
}

impl OriginalUrl {
    fn unverified(url: impl Into<String>) -> Self {
        Self {
            url: url.into(),
            is_valid: false,
        }
    }
}

/// A single URL behind a short hash.
#[derive(Debug, Default)]
pub struct ShortUrl {
    /// The short hash, also the entity id.
    pub hash: String,
    original: Option<OriginalUrl>,
}

impl ShortUrl {
    /// Builds the creation event for `url`. The entity id is the URL's hash.
    #[must_use]
    pub fn shorten(url: &str, clock: &dyn Clock) -> UrlEvent {
        let hash = hash_from_url(url);
        UrlEvent::new(
            hash.clone(),
            0,
            clock.now(),
            ShortUrlCreated {
                hash,
                original_url: url.to_owned(),
            },
        )
    }

    /// The URL behind the hash with its validity.
    #[must_use]
    pub fn original_url(&self) -> Option<&OriginalUrl> {
        self.original.as_ref()
    }

    /// The URL, if it has been verified.
    #[must_use]
    pub fn verified_url(&self) -> Option<&str> {
        self.original
            .as_ref()
            .filter(|original| original.is_valid)
            .map(|original| original.url.as_str())
    }
}

impl Entity for ShortUrl {
    type Event = UrlEvent;

    fn on(&mut self, event: &UrlEvent) -> Result<(), String> {
        match &event.kind {
            UrlEventKind::ShortUrlCreated(payload) => {
                self.hash.clone_from(&payload.hash);
                self.original = Some(OriginalUrl::unverified(payload.original_url.as_str()));
                Ok(())
            }
            UrlEventKind::ShortUrlVerified(ShortUrlVerified { url }) => {
                if let Some(original) = self.original.as_mut().filter(|o| &o.url == url) {
                    original.is_valid = true;
                }
                Ok(())
            }
            UrlEventKind::LoadBalancedUrlCreated(_) | UrlEventKind::LoadBalancedUrlVerified(_) => {
                Err(format!("{} does not apply to a short url", event.kind.event_type()))
            }
        }
    }
}

/// A set of URLs behind one hash; redirects go to a random verified one.
#[derive(Debug, Default)]
pub struct LoadBalancedUrl {
    /// The short hash, also the entity id.
    pub hash: String,
    /// Every URL of the set in submission order.
    pub long_urls: Vec<OriginalUrl>,
}

impl LoadBalancedUrl {
    /// Builds the creation event for `urls`. The entity id is the set's hash.
    #[must_use]
    pub fn shorten(urls: &[String], clock: &dyn Clock) -> UrlEvent {
        let hash = hash_from_urls(urls);
        UrlEvent::new(
            hash.clone(),
            0,
            clock.now(),
            LoadBalancedUrlCreated {
                hash,
                original_urls: urls.to_vec(),
            },
        )
    }

    /// URLs that passed validation, in submission order.
    #[must_use]
    pub fn valid_urls(&self) -> Vec<&str> {
        self.long_urls
            .iter()
            .filter(|original| original.is_valid)
            .map(|original| original.url.as_str())
            .collect()
    }

    /// Picks one verified URL uniformly at random.
    #[must_use]
    pub fn pick_valid_url(&self, rng: &mut dyn DeterministicRng) -> Option<&str> {
        let valid = self.valid_urls();
        let last = u32::try_from(valid.len().checked_sub(1)?).unwrap_or(u32::MAX);
        let index = rng.next_u32_range(0, last) as usize;
        valid.get(index).copied()
    }
}

impl Entity for LoadBalancedUrl {
    type Event = UrlEvent;

    fn on(&mut self, event: &UrlEvent) -> Result<(), String> {
        match &event.kind {
            UrlEventKind::LoadBalancedUrlCreated(payload) => {
                self.hash.clone_from(&payload.hash);
                self.long_urls = payload
                    .original_urls
                    .iter()
                    .map(OriginalUrl::unverified)
                    .collect();
                Ok(())
            }
            UrlEventKind::LoadBalancedUrlVerified(LoadBalancedUrlVerified { url }) => {
                for original in self.long_urls.iter_mut().filter(|o| &o.url == url) {
                    original.is_valid = true;
                }
                Ok(())
            }
            UrlEventKind::ShortUrlCreated(_) | UrlEventKind::ShortUrlVerified(_) => Err(format!(
                "{} does not apply to a load-balanced url",
                event.kind.event_type()
            )),
        }
    }
}
