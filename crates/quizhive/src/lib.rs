//! Quizhive server: HTTP surface over the question supply engine.
//!
//! Thin handlers map transport requests onto the store, job manager,
//! supply controller, push hub, and telemetry. All interesting semantics
//! live in those crates; this one authenticates, validates, and
//! translates outcomes into responses.

pub mod auth;
pub mod config;
pub mod error;
pub mod http;
pub mod state;
pub mod ws;

pub use config::ServerArgs;
pub use state::AppState;
