//! URL validation.
//!
//! A [`pipeline::Pipeline`] chains [`validator::UrlValidator`]s. The
//! [`service::ValidatorService`] runs it over every shortened URL it receives
//! from the external broker and emits verifications; the
//! [`saver::VerificationSaver`] persists those verifications.

pub mod blocklist;
pub mod error;
pub mod pipeline;
pub mod reachability;
pub mod saver;
pub mod schema;
pub mod service;
pub mod validator;
