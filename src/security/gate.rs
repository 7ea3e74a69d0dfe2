//! Security gate orchestration.
//!
//! # Data Flow
//! ```text
//! IP_CHECK → CONTENT_ANALYSIS → RATE_CHECK → SANITIZE → HEADERS → PASS
//!     │             │                │
//!     ▼             ▼                ▼
//! IpBlocked   RequestBlocked    RateLimited
//! ```
//!
//! # Design Decisions
//! - The first denial is terminal: later stages do not run, so a denied request is
//!   never sanitized, never counted by the rate limiter and never receives the
//!   defensive headers
//! - The gate is framework independent; it works on [`RequestDescriptor`] and a
//!   plain `HeaderMap`
//! - All components share one injected [`Clock`]

use std::sync::Arc;
use std::time::Instant;

use arc_swap::ArcSwap;
use axum::http::HeaderMap;

use crate::config::GateConfig;
use crate::error::GateResult;
use crate::observability::metrics;
use crate::security::clock::{Clock, SystemClock};
use crate::security::descriptor::RequestDescriptor;
use crate::security::firewall::{DenyReason, Firewall, FirewallVerdict};
use crate::security::headers::SecurityHeaders;
use crate::security::rate_limit::{RateDecision, RateLimiter};

/// Pipeline stage, used to label decisions in logs.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum GateStage {
    IpCheck,
    ContentAnalysis,
    RateCheck,
    Sanitize,
    Headers,
}

impl GateStage {
    pub fn as_str(&self) -> &'static str {
        match self {
            GateStage::IpCheck => "ip_check",
            GateStage::ContentAnalysis => "content_analysis",
            GateStage::RateCheck => "rate_check",
            GateStage::Sanitize => "sanitize",
            GateStage::Headers => "headers",
        }
    }
}

/// Why the gate refused a request.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Denial {
    IpBlocked,
    RequestBlocked(DenyReason),
    RateLimited {
        decision: RateDecision,
        retry_after_secs: u64,
    },
}

impl Denial {
    pub fn stage(&self) -> GateStage {
        match self {
            Denial::IpBlocked => GateStage::IpCheck,
            Denial::RequestBlocked(_) => GateStage::ContentAnalysis,
            Denial::RateLimited { .. } => GateStage::RateCheck,
        }
    }

    /// Stable machine-readable code sent to clients.
    pub fn code(&self) -> &'static str {
        match self {
            Denial::IpBlocked => "IP_BLOCKED",
            Denial::RequestBlocked(_) => "REQUEST_BLOCKED",
            Denial::RateLimited { .. } => "RATE_LIMITED",
        }
    }

    fn outcome(&self) -> &'static str {
        match self {
            Denial::IpBlocked => "ip_blocked",
            Denial::RequestBlocked(_) => "request_blocked",
            Denial::RateLimited { .. } => "rate_limited",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum GateDecision {
    Pass,
    Deny(Denial),
}

impl GateDecision {
    pub fn is_pass(&self) -> bool {
        matches!(self, GateDecision::Pass)
    }
}

/// Counts from one maintenance sweep.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct MaintenanceReport {
    pub rate_limit_windows: usize,
    pub expired_blocks: usize,
    pub abuse_windows: usize,
}

#[derive(Debug)]
pub struct SecurityGate {
    firewall: Firewall,
    rate_limiter: RateLimiter,
    headers: ArcSwap<SecurityHeaders>,
    clock: Arc<dyn Clock>,
}

impl SecurityGate {
    pub fn new(config: &GateConfig) -> GateResult<Self> {
        Self::with_clock(config, Arc::new(SystemClock))
    }

    pub fn with_clock(config: &GateConfig, clock: Arc<dyn Clock>) -> GateResult<Self> {
        Ok(Self {
            firewall: Firewall::new(&config.firewall, clock.clone())?,
            rate_limiter: RateLimiter::new(config.rate_limit.clone(), clock.clone()),
            headers: ArcSwap::from_pointee(SecurityHeaders::from_config(&config.headers)?),
            clock,
        })
    }

    /// Run the request through every stage up to and including sanitization.
    ///
    /// On [`GateDecision::Pass`] the descriptor's body and query have been replaced
    /// with their sanitized forms. Headers are applied separately with
    /// [`SecurityGate::apply_headers`] once the response exists.
    pub fn inspect(&self, req: &mut RequestDescriptor) -> GateDecision {
        let started = Instant::now();
        let decision = self.run_stages(req);

        match &decision {
            GateDecision::Pass => {
                tracing::info!(
                    identity = %req.identity,
                    method = %req.method,
                    url = %req.url,
                    "Request admitted"
                );
                metrics::record_decision("pass", started);
            }
            GateDecision::Deny(denial) => {
                tracing::warn!(
                    identity = %req.identity,
                    method = %req.method,
                    url = %req.url,
                    stage = denial.stage().as_str(),
                    code = denial.code(),
                    "Request denied"
                );
                if matches!(denial, Denial::RateLimited { .. }) {
                    metrics::record_rate_limited();
                }
                metrics::record_decision(denial.outcome(), started);
            }
        }

        decision
    }

    fn run_stages(&self, req: &mut RequestDescriptor) -> GateDecision {
        if self.firewall.is_blocked(&req.identity) {
            return GateDecision::Deny(Denial::IpBlocked);
        }

        if let FirewallVerdict::Deny(reason) = self.firewall.analyze(req) {
            return GateDecision::Deny(Denial::RequestBlocked(reason));
        }

        let rate = self.rate_limiter.check_rate_limit(&req.identity, &req.path);
        if !rate.allowed {
            return GateDecision::Deny(Denial::RateLimited {
                decision: rate,
                retry_after_secs: rate.retry_after_secs(self.clock.now_ms()),
            });
        }

        req.sanitize_inputs();
        GateDecision::Pass
    }

    /// Attach the defensive headers to an admitted response.
    pub fn apply_headers(&self, headers: &mut HeaderMap) {
        self.headers.load().apply(headers);
    }

    /// Swap in new policies. On error nothing changes.
    pub fn reload(&self, config: &GateConfig) -> GateResult<()> {
        let headers = SecurityHeaders::from_config(&config.headers)?;
        self.firewall.reload(&config.firewall)?;
        self.rate_limiter.reload(config.rate_limit.clone());
        self.headers.store(Arc::new(headers));
        tracing::info!("Security policies reloaded");
        Ok(())
    }

    /// Reclaim idle windows and expired blocklist entries.
    pub fn run_maintenance(&self) -> MaintenanceReport {
        let report = MaintenanceReport {
            rate_limit_windows: self.rate_limiter.cleanup(),
            expired_blocks: self.firewall.purge_expired(),
            abuse_windows: self.firewall.sweep_abuse_windows(),
        };
        tracing::debug!(
            rate_limit_windows = report.rate_limit_windows,
            expired_blocks = report.expired_blocks,
            abuse_windows = report.abuse_windows,
            "Maintenance sweep complete"
        );
        report
    }

    pub fn firewall(&self) -> &Firewall {
        &self.firewall
    }

    pub fn rate_limiter(&self) -> &RateLimiter {
        &self.rate_limiter
    }

    pub fn clock(&self) -> &Arc<dyn Clock> {
        &self.clock
    }
}
