//! External message broker client.
//!
//! A topic-based transport sits behind [`transport::Connector`]. The
//! [`connection::ManagedConnection`] keeps one live connection and replaces it
//! with linear backoff whenever it closes; [`sender::BrokerSender`] and
//! [`receiver::BrokerReceiver`] implement the core broker contracts on top.

pub mod backoff;
pub mod connection;
pub mod memory;
pub mod receiver;
pub mod sender;
pub mod transport;
