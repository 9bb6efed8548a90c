//! Short hash derivation.

use base64::Engine;
use base64::engine::general_purpose::URL_SAFE;
use sha1::{Digest, Sha1};

/// Number of characters in a short hash.
pub const HASH_LEN: usize = 8;

/// Derives the short hash of `input`: the first eight characters of the
/// URL-safe base64 encoding of its SHA-1 digest.
#[must_use]
pub fn hash_from_url(input: &str) -> String {
    let digest = Sha1::digest(input.as_bytes());
    let mut encoded = URL_SAFE.encode(digest);
    encoded.truncate(HASH_LEN);
    encoded
}

/// Derives the hash of a set of URLs. Every URL is newline-terminated so the
/// result never equals the hash of a single URL.
#[must_use]
pub fn hash_from_urls(urls: &[String]) -> String {
    let joined: String = urls.iter().map(|url| format!("{url}\n")).collect();
    hash_from_url(&joined)
}
