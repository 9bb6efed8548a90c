//! Shorturl API: HTTP surface and process wiring.

pub mod app;
pub mod config;
pub mod error;
pub mod routes;
pub mod state;
