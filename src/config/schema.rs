//! Configuration schema definitions.
//!
//! This module defines the complete configuration structure for the gate.
//! All types derive Serde traits for deserialization from config files.

use serde::{Deserialize, Serialize};

use crate::security::patterns::{default_suspicious_agents, default_threat_rules, ThreatRuleConfig};

/// Root configuration for the security gate.
#[derive(Debug, Clone, Deserialize, Serialize, Default)]
#[serde(default)]
pub struct GateConfig {
    /// Listener configuration (bind address, identity resolution, body limit).
    pub listener: ListenerConfig,

    /// Timeout configuration.
    pub timeouts: TimeoutConfig,

    /// IP blocklist and threat analysis.
    pub firewall: FirewallConfig,

    /// Per-identity, per-path rate limiting.
    pub rate_limit: RateLimitConfig,

    /// Defensive response headers.
    pub headers: HeadersConfig,

    /// Periodic state cleanup.
    pub maintenance: MaintenanceConfig,

    /// Optional upstream to forward admitted requests to.
    pub upstream: Option<UpstreamConfig>,

    /// Observability settings.
    pub observability: ObservabilityConfig,
}

/// Listener configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct ListenerConfig {
    /// Bind address (e.g., "0.0.0.0:8080").
    pub bind_address: String,

    /// Use the first `X-Forwarded-For` hop as the client identity.
    /// Only enable behind a proxy that overwrites the header.
    pub trust_forwarded_for: bool,

    /// Maximum request body buffered for inspection, in bytes.
    pub max_body_size: usize,
}

impl Default for ListenerConfig {
    fn default() -> Self {
        Self {
            bind_address: "0.0.0.0:8080".to_string(),
            trust_forwarded_for: false,
            max_body_size: 2 * 1024 * 1024, // 2MB
        }
    }
}

/// Timeout configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct TimeoutConfig {
    /// Request timeout (total time for request/response) in seconds.
    pub request_secs: u64,

    /// Upstream connection timeout in seconds.
    pub upstream_secs: u64,
}

impl Default for TimeoutConfig {
    fn default() -> Self {
        Self {
            request_secs: 30,
            upstream_secs: 10,
        }
    }
}

/// Firewall configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct FirewallConfig {
    /// How long a blocked identity stays blocked, in seconds.
    pub block_duration_secs: u64,

    /// Trailing window for the abuse tracker, in seconds.
    pub abuse_window_secs: u64,

    /// Requests allowed inside the abuse window before the identity is blocked.
    pub abuse_threshold: usize,

    /// Ordered threat rules applied to URL, user-agent, body, query and path params.
    pub threat_rules: Vec<ThreatRuleConfig>,

    /// User-agent substrings that deny (but do not block) a request.
    pub suspicious_agents: Vec<String>,

    /// Treat a missing or blank user-agent as suspicious.
    pub block_empty_user_agent: bool,
}

impl Default for FirewallConfig {
    fn default() -> Self {
        Self {
            block_duration_secs: 60 * 60,
            abuse_window_secs: 60,
            abuse_threshold: 100,
            threat_rules: default_threat_rules(),
            suspicious_agents: default_suspicious_agents(),
            block_empty_user_agent: true,
        }
    }
}

impl FirewallConfig {
    pub fn block_duration_ms(&self) -> u64 {
        self.block_duration_secs.saturating_mul(1000)
    }

    pub fn abuse_window_ms(&self) -> u64 {
        self.abuse_window_secs.saturating_mul(1000)
    }
}

/// Rate limiting configuration.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize, Serialize)]
#[serde(default)]
pub struct RateLimitConfig {
    /// Sliding window length in milliseconds.
    pub window_ms: u64,

    /// Requests allowed per (identity, path) inside the window.
    pub max_requests: usize,

    /// Extra idle time before a window is reclaimed by cleanup, in milliseconds.
    pub block_duration_ms: u64,
}

impl Default for RateLimitConfig {
    fn default() -> Self {
        Self {
            window_ms: 15 * 60 * 1000,
            max_requests: 100,
            block_duration_ms: 30 * 60 * 1000,
        }
    }
}

/// Defensive response header values.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize, Serialize)]
#[serde(default)]
pub struct HeadersConfig {
    /// Attach the headers below to admitted responses.
    pub enabled: bool,
    pub content_type_options: String,
    pub frame_options: String,
    pub xss_protection: String,
    pub strict_transport_security: String,
    pub content_security_policy: String,
    pub referrer_policy: String,
    pub permissions_policy: String,
    /// Remove `X-Powered-By` and `Server` from admitted responses.
    pub strip_server_headers: bool,
}

impl Default for HeadersConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            content_type_options: "nosniff".to_string(),
            frame_options: "DENY".to_string(),
            xss_protection: "1; mode=block".to_string(),
            strict_transport_security: "max-age=31536000; includeSubDomains".to_string(),
            content_security_policy:
                "default-src 'self'; script-src 'self' 'unsafe-inline'; style-src 'self' 'unsafe-inline';"
                    .to_string(),
            referrer_policy: "strict-origin-when-cross-origin".to_string(),
            permissions_policy: "geolocation=(), microphone=(), camera=()".to_string(),
            strip_server_headers: true,
        }
    }
}

/// Maintenance task configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct MaintenanceConfig {
    /// Enable the periodic sweep.
    pub enabled: bool,

    /// Sweep interval in seconds.
    pub cleanup_interval_secs: u64,
}

impl Default for MaintenanceConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            cleanup_interval_secs: 60,
        }
    }
}

/// Upstream forwarding target.
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct UpstreamConfig {
    /// Upstream address (e.g., "127.0.0.1:3000").
    pub address: String,
}

/// Observability configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct ObservabilityConfig {
    /// Log level (trace, debug, info, warn, error).
    pub log_level: String,

    /// Log format: "pretty" or "json".
    pub log_format: String,

    /// Enable metrics endpoint.
    pub metrics_enabled: bool,

    /// Metrics endpoint bind address.
    pub metrics_address: String,
}

impl Default for ObservabilityConfig {
    fn default() -> Self {
        Self {
            log_level: "info".to_string(),
            log_format: "pretty".to_string(),
            metrics_enabled: false,
            metrics_address: "0.0.0.0:9090".to_string(),
        }
    }
}
