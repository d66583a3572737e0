//! hush — an encrypted IRC-style chat relay.

pub mod config;
pub mod connection;
pub mod proto;
pub mod replies;
pub mod server;
