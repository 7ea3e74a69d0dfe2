//! Per-(identity, path) sliding-window rate limiting.
//!
//! # Responsibilities
//! - Count requests per `identity-path` key over a trailing window
//! - Refuse requests once the window holds `max_requests` events
//! - Report remaining quota and the reset time for response headers
//! - Reclaim idle windows from a periodic maintenance pass
//!
//! # Design Decisions
//! - A refused attempt is not recorded, so a throttled client recovers as soon as
//!   its oldest admitted request leaves the window
//! - `reset_time` is the expiry of the oldest counted request, which is exactly
//!   when the next slot frees up
//! - Limits are swapped atomically on reload; existing windows are kept

use std::sync::Arc;

use arc_swap::ArcSwap;

use crate::config::RateLimitConfig;
use crate::observability::metrics;
use crate::security::clock::Clock;
use crate::security::window::SlidingWindowCounter;

/// Outcome of one rate-limit check.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RateDecision {
    pub allowed: bool,
    /// Requests left in the current window after this one.
    pub remaining: usize,
    /// Epoch ms at which the oldest counted request leaves the window.
    pub reset_time: u64,
    /// Configured maximum per window.
    pub limit: usize,
}

impl RateDecision {
    /// Seconds until `reset_time`, rounded up. Zero once the reset has passed.
    pub fn retry_after_secs(&self, now_ms: u64) -> u64 {
        self.reset_time.saturating_sub(now_ms).div_ceil(1000)
    }
}

#[derive(Debug)]
pub struct RateLimiter {
    config: ArcSwap<RateLimitConfig>,
    windows: SlidingWindowCounter,
    clock: Arc<dyn Clock>,
}

impl RateLimiter {
    pub fn new(config: RateLimitConfig, clock: Arc<dyn Clock>) -> Self {
        Self {
            config: ArcSwap::from_pointee(config),
            windows: SlidingWindowCounter::new(),
            clock,
        }
    }

    pub fn reload(&self, config: RateLimitConfig) {
        self.config.store(Arc::new(config));
    }

    pub fn config(&self) -> Arc<RateLimitConfig> {
        self.config.load_full()
    }

    /// Check and, when allowed, record one request for `identity` on `path`.
    pub fn check_rate_limit(&self, identity: &str, path: &str) -> RateDecision {
        let config = self.config.load();
        let now = self.clock.now_ms();
        let key = rate_limit_key(identity, path);

        let state = self
            .windows
            .try_record(&key, now, config.window_ms, config.max_requests);
        let decision = RateDecision {
            allowed: state.admitted,
            remaining: config.max_requests.saturating_sub(state.count),
            reset_time: state.window_start.saturating_add(config.window_ms),
            limit: config.max_requests,
        };

        if !decision.allowed {
            tracing::debug!(
                key = %key,
                count = state.count,
                reset_time = decision.reset_time,
                "Rate limit exceeded"
            );
        }
        decision
    }

    /// Requests counted for `identity` on `path` in the current window.
    pub fn window_count(&self, identity: &str, path: &str) -> usize {
        let window_ms = self.config.load().window_ms;
        self.windows
            .count(&rate_limit_key(identity, path), self.clock.now_ms(), window_ms)
    }

    /// Whether a window exists for `identity` on `path`.
    pub fn is_tracked(&self, identity: &str, path: &str) -> bool {
        self.windows.contains_key(&rate_limit_key(identity, path))
    }

    /// Number of tracked windows.
    pub fn tracked_keys(&self) -> usize {
        self.windows.len()
    }

    /// Remove windows idle for longer than `window_ms + block_duration_ms`.
    pub fn cleanup(&self) -> usize {
        let config = self.config.load();
        let retention = config.window_ms.saturating_add(config.block_duration_ms);
        let removed = self.windows.sweep(self.clock.now_ms(), retention);
        metrics::record_window_count("rate_limiter", self.windows.len());
        if removed > 0 {
            tracing::debug!(removed, remaining = self.windows.len(), "Rate limit windows swept");
        }
        removed
    }
}

fn rate_limit_key(identity: &str, path: &str) -> String {
    format!("{identity}-{path}")
}
