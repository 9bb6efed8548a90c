//! Domain model for the shortener context.

pub mod aggregates;
pub mod commands;
pub mod events;
pub mod hash;
