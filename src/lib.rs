//! Inbound HTTP security gate.
//!
//! Combines an IP blocklist, threat pattern matching, abuse tracking, per-endpoint
//! rate limiting, input sanitization and defensive response headers into one
//! ordered decision pipeline, hosted as axum middleware.

pub mod config;
pub mod error;
pub mod http;
pub mod lifecycle;
pub mod observability;
pub mod security;

pub use config::schema::GateConfig;
pub use error::{GateError, GateResult};
pub use http::HttpServer;
pub use lifecycle::Shutdown;
pub use security::{GateDecision, RequestDescriptor, SecurityGate};
