//! HTTP hosting subsystem.
//!
//! # Data Flow
//! ```text
//! TCP connection
//!     → server.rs (Axum setup, request ID, trace, timeout)
//!     → middleware.rs (security gate)
//!         → request.rs (identity, body, descriptor)
//!         → SecurityGate::inspect
//!         → response.rs (denials)
//!     → echo handler or upstream forward
//!     → defensive headers on the way out
//! ```

pub mod middleware;
pub mod request;
pub mod response;
pub mod server;

pub use middleware::{security_middleware, GateState};
pub use request::{resolve_identity, BodyKind, InboundRequest};
pub use server::HttpServer;
