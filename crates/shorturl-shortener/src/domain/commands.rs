//! Commands for the shortener context.

/// Command to shorten one URL.
#[derive(Debug, Clone)]
pub struct ShortenUrl {
    /// The URL to shorten.
    pub long_url: String,
}

/// Command to shorten a set of URLs behind one load-balanced hash.
#[derive(Debug, Clone)]
pub struct ShortenUrls {
    /// The URLs to balance between, in submission order.
    pub long_urls: Vec<String>,
}
