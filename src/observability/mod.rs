//! Observability subsystem.
//!
//! # Data Flow
//! ```text
//! Gate stages produce:
//!     → logging.rs (structured log events)
//!     → metrics.rs (counters, gauges, histograms)
//!
//! Consumers:
//!     → Log aggregation (stdout)
//!     → Metrics endpoint (Prometheus scrape)
//! ```
//!
//! # Design Decisions
//! - Structured logging (JSON) for machine parsing
//! - Request ID flows through all log lines via the trace layer span
//! - Metrics are cheap (atomic increments)
//! - Nothing here affects a security decision

pub mod logging;
pub mod metrics;
