//! Shorturl: URL shortener bounded context.
//!
//! Responsible for shortening single URLs and sets of URLs, tracking which
//! of them were verified, and choosing the URL a hash redirects to.

pub mod application;
pub mod domain;
pub mod error;
