//! Application services for the shortener context.

pub mod command_handlers;
pub mod query_handlers;
