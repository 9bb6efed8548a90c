//! Route modules.

pub mod health;
pub mod load_balanced_urls;
pub mod short_urls;
