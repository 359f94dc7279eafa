//! HTTP server for the dashsync engine
//!
//! Exposes the current dataset, the token-gated forced-refresh webhook, and
//! the live presence endpoints the dashboard pages poll.

pub mod config;
pub mod routes;

pub use config::{Cli, ServerConfig, ServerConfigError};
pub use routes::{AppState, router};
