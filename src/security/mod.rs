//! Security subsystem.
//!
//! # Data Flow
//! ```text
//! Incoming request (as a RequestDescriptor):
//!     → firewall.rs (blocklist lookup)
//!     → firewall.rs (threat patterns, user-agent, abuse rate)
//!     → rate_limit.rs (per identity + path window)
//!     → sanitizer.rs (rewrite body and query)
//!     → headers.rs (defensive response headers)
//!     → Pass to the application
//! ```
//!
//! `gate.rs` drives the stages in that order and stops at the first denial.
//!
//! # Design Decisions
//! - Defense in depth: multiple layers of protection
//! - All state is in-process; nothing survives a restart
//! - No trust in client input

pub mod clock;
pub mod csrf;
pub mod descriptor;
pub mod firewall;
pub mod gate;
pub mod headers;
pub mod patterns;
pub mod rate_limit;
pub mod sanitizer;
pub mod window;

pub use clock::{Clock, ManualClock, SystemClock};
pub use descriptor::RequestDescriptor;
pub use firewall::{BlockReason, BlockedIpEntry, DenyReason, Firewall, FirewallVerdict};
pub use gate::{Denial, GateDecision, GateStage, MaintenanceReport, SecurityGate};
pub use headers::SecurityHeaders;
pub use patterns::{PatternMatcher, ThreatRuleConfig};
pub use rate_limit::{RateDecision, RateLimiter};
