//! IP blocklist and request analysis.
//!
//! # Responsibilities
//! - Keep a blocklist of identities with expiring entries
//! - Scan request fields against the threat rule table
//! - Deny known-bad user-agents without blocking them
//! - Track per-identity request rate and block abusive identities
//!
//! # Evaluation Order
//! ```text
//! blocked?            → Deny(Blocked)
//! threat rule hit?    → block identity, Deny(MaliciousPattern)
//! suspicious agent?   → record abuse event, Deny(SuspiciousAgent)
//! abuse rate > limit? → block identity, Deny(AbuseRateExceeded)
//! otherwise           → Allow
//! ```
//!
//! # Design Decisions
//! - Expiry is a stored timestamp checked on every lookup; no timers exist, so a
//!   stale unblock can never undo a newer block
//! - A re-block keeps the later of the two expiries
//! - Policy (rules, durations, threshold) is swapped atomically on reload while the
//!   blocklist and abuse windows are kept

use std::sync::Arc;

use arc_swap::ArcSwap;
use dashmap::DashMap;

use crate::config::FirewallConfig;
use crate::error::GateResult;
use crate::observability::metrics;
use crate::security::clock::Clock;
use crate::security::descriptor::RequestDescriptor;
use crate::security::patterns::PatternMatcher;
use crate::security::window::SlidingWindowCounter;

/// Why an identity was put on the blocklist.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BlockReason {
    MaliciousPattern,
    AbuseRateExceeded,
}

impl BlockReason {
    pub fn as_str(&self) -> &'static str {
        match self {
            BlockReason::MaliciousPattern => "malicious_pattern",
            BlockReason::AbuseRateExceeded => "abuse_rate_exceeded",
        }
    }
}

impl std::fmt::Display for BlockReason {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            BlockReason::MaliciousPattern => write!(f, "Malicious pattern detected"),
            BlockReason::AbuseRateExceeded => write!(f, "Rate limit exceeded"),
        }
    }
}

/// A live or expired blocklist entry.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BlockedIpEntry {
    pub identity: String,
    pub reason: BlockReason,
    pub blocked_at: u64,
    pub expires_at: u64,
}

impl BlockedIpEntry {
    pub fn is_live(&self, now: u64) -> bool {
        now < self.expires_at
    }
}

/// Why the firewall denied a request.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DenyReason {
    Blocked,
    MaliciousPattern { rule: String, field: &'static str },
    SuspiciousAgent,
    AbuseRateExceeded,
}

impl DenyReason {
    pub fn as_str(&self) -> &'static str {
        match self {
            DenyReason::Blocked => "blocked",
            DenyReason::MaliciousPattern { .. } => "malicious_pattern",
            DenyReason::SuspiciousAgent => "suspicious_agent",
            DenyReason::AbuseRateExceeded => "abuse_rate_exceeded",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FirewallVerdict {
    Allow,
    Deny(DenyReason),
}

impl FirewallVerdict {
    pub fn is_allowed(&self) -> bool {
        matches!(self, FirewallVerdict::Allow)
    }
}

/// Reloadable part of the firewall.
#[derive(Debug)]
struct FirewallPolicy {
    matcher: PatternMatcher,
    block_duration_ms: u64,
    abuse_window_ms: u64,
    abuse_threshold: usize,
}

impl FirewallPolicy {
    fn from_config(config: &FirewallConfig) -> GateResult<Self> {
        Ok(Self {
            matcher: PatternMatcher::new(
                &config.threat_rules,
                &config.suspicious_agents,
                config.block_empty_user_agent,
            )?,
            block_duration_ms: config.block_duration_ms(),
            abuse_window_ms: config.abuse_window_ms(),
            abuse_threshold: config.abuse_threshold,
        })
    }
}

#[derive(Debug)]
pub struct Firewall {
    policy: ArcSwap<FirewallPolicy>,
    blocklist: DashMap<String, BlockedIpEntry>,
    abuse: SlidingWindowCounter,
    clock: Arc<dyn Clock>,
}

impl Firewall {
    pub fn new(config: &FirewallConfig, clock: Arc<dyn Clock>) -> GateResult<Self> {
        Ok(Self {
            policy: ArcSwap::from_pointee(FirewallPolicy::from_config(config)?),
            blocklist: DashMap::new(),
            abuse: SlidingWindowCounter::new(),
            clock,
        })
    }

    /// Swap in a new policy. Blocklist and abuse history are kept.
    pub fn reload(&self, config: &FirewallConfig) -> GateResult<()> {
        self.policy.store(Arc::new(FirewallPolicy::from_config(config)?));
        Ok(())
    }

    /// Full evaluation: blocklist lookup followed by [`Firewall::analyze`].
    pub fn evaluate(&self, req: &RequestDescriptor) -> FirewallVerdict {
        if self.is_blocked(&req.identity) {
            return FirewallVerdict::Deny(DenyReason::Blocked);
        }
        self.analyze(req)
    }

    /// Content, user-agent and abuse-rate checks, in that order.
    pub fn analyze(&self, req: &RequestDescriptor) -> FirewallVerdict {
        let policy = self.policy.load();
        let now = self.clock.now_ms();

        let fields = req.inspection_fields();
        let scan: Vec<(&'static str, &str)> = fields
            .iter()
            .map(|(name, text)| (*name, text.as_str()))
            .collect();

        if let Some(hit) = policy.matcher.find_threat(&scan) {
            tracing::warn!(
                identity = %req.identity,
                rule = %hit.rule,
                field = hit.field,
                url = %req.url,
                "Threat pattern matched"
            );
            self.block(&req.identity, BlockReason::MaliciousPattern);
            return FirewallVerdict::Deny(DenyReason::MaliciousPattern {
                rule: hit.rule,
                field: hit.field,
            });
        }

        if policy.matcher.is_suspicious_agent(req.user_agent.as_deref()) {
            let state = self.abuse.record(&req.identity, now, policy.abuse_window_ms);
            tracing::warn!(
                identity = %req.identity,
                user_agent = req.user_agent.as_deref().unwrap_or(""),
                recent = state.count,
                "Suspicious user-agent"
            );
            return FirewallVerdict::Deny(DenyReason::SuspiciousAgent);
        }

        let state = self.abuse.record(&req.identity, now, policy.abuse_window_ms);
        if state.count > policy.abuse_threshold {
            self.block(&req.identity, BlockReason::AbuseRateExceeded);
            return FirewallVerdict::Deny(DenyReason::AbuseRateExceeded);
        }

        FirewallVerdict::Allow
    }

    /// Whether `identity` has a live blocklist entry. Expired entries are removed.
    pub fn is_blocked(&self, identity: &str) -> bool {
        let now = self.clock.now_ms();
        let live = match self.blocklist.get(identity) {
            Some(entry) => entry.is_live(now),
            None => return false,
        };
        if live {
            return true;
        }

        // Only remove if still expired: a concurrent re-block must survive.
        self.blocklist.remove_if(identity, |_, entry| !entry.is_live(now));
        false
    }

    /// Blocklist `identity` for the configured duration.
    pub fn block(&self, identity: &str, reason: BlockReason) -> BlockedIpEntry {
        let now = self.clock.now_ms();
        let expires_at = now.saturating_add(self.policy.load().block_duration_ms);

        let entry = self
            .blocklist
            .entry(identity.to_owned())
            .and_modify(|entry| {
                if entry.is_live(now) {
                    entry.expires_at = entry.expires_at.max(expires_at);
                } else {
                    entry.blocked_at = now;
                    entry.expires_at = expires_at;
                }
                entry.reason = reason;
            })
            .or_insert_with(|| BlockedIpEntry {
                identity: identity.to_owned(),
                reason,
                blocked_at: now,
                expires_at,
            })
            .value()
            .clone();

        tracing::warn!(
            identity = %identity,
            reason = %reason,
            expires_at = entry.expires_at,
            "IP blocked"
        );
        metrics::record_ip_blocked(reason.as_str());
        metrics::record_blocklist_size(self.blocklist.len());

        entry
    }

    /// The live entry for `identity`, if any.
    pub fn blocked_entry(&self, identity: &str) -> Option<BlockedIpEntry> {
        let now = self.clock.now_ms();
        self.blocklist
            .get(identity)
            .filter(|entry| entry.is_live(now))
            .map(|entry| entry.value().clone())
    }

    /// Number of live blocklist entries.
    pub fn blocked_count(&self) -> usize {
        let now = self.clock.now_ms();
        self.blocklist
            .iter()
            .filter(|entry| entry.is_live(now))
            .count()
    }

    /// Abuse events recorded for `identity` inside the current abuse window.
    pub fn recent_activity(&self, identity: &str) -> usize {
        let window = self.policy.load().abuse_window_ms;
        self.abuse.count(identity, self.clock.now_ms(), window)
    }

    /// Drop expired blocklist entries. Returns how many were removed.
    pub fn purge_expired(&self) -> usize {
        let now = self.clock.now_ms();
        let before = self.blocklist.len();
        self.blocklist.retain(|_, entry| entry.is_live(now));
        let removed = before.saturating_sub(self.blocklist.len());
        metrics::record_blocklist_size(self.blocklist.len());
        removed
    }

    /// Drop abuse windows with no activity inside the abuse window.
    pub fn sweep_abuse_windows(&self) -> usize {
        let window = self.policy.load().abuse_window_ms;
        let removed = self.abuse.sweep(self.clock.now_ms(), window);
        metrics::record_window_count("firewall", self.abuse.len());
        removed
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::security::clock::ManualClock;
    use crate::security::patterns::ThreatRuleConfig;

    const BROWSER: &str = "Mozilla/5.0 (X11; Linux x86_64) Gecko/20100101 Firefox/128.0";

    fn setup() -> (Firewall, Arc<ManualClock>) {
        let clock = Arc::new(ManualClock::new(1_700_000_000_000));
        let firewall = Firewall::new(&FirewallConfig::default(), clock.clone()).unwrap();
        (firewall, clock)
    }

    fn clean(identity: &str) -> RequestDescriptor {
        RequestDescriptor::new(identity, "GET", "/api/users/42").with_user_agent(BROWSER)
    }

    #[test]
    fn test_never_blocked_identity() {
        let (firewall, _) = setup();
        assert!(!firewall.is_blocked("10.0.0.1"));
        assert_eq!(firewall.evaluate(&clean("10.0.0.1")), FirewallVerdict::Allow);
        assert!(!firewall.is_blocked("10.0.0.1"));
        assert_eq!(firewall.blocked_count(), 0);
    }

    #[test]
    fn test_malicious_url_blocks_identity() {
        let (firewall, _) = setup();
        let req = RequestDescriptor::new("10.0.0.2", "GET", "/api/users?id=1 UNION SELECT")
            .with_user_agent(BROWSER);

        match firewall.evaluate(&req) {
            FirewallVerdict::Deny(DenyReason::MaliciousPattern { field, .. }) => {
                assert_eq!(field, "url")
            }
            other => panic!("unexpected verdict: {other:?}"),
        }
        assert!(firewall.is_blocked("10.0.0.2"));
        assert_eq!(
            firewall.blocked_entry("10.0.0.2").unwrap().reason,
            BlockReason::MaliciousPattern
        );

        // Subsequent clean requests are refused by the blocklist.
        assert_eq!(
            firewall.evaluate(&clean("10.0.0.2")),
            FirewallVerdict::Deny(DenyReason::Blocked)
        );
    }

    #[test]
    fn test_malicious_body_blocks_identity() {
        let (firewall, _) = setup();
        let req = RequestDescriptor::new("10.0.0.3", "POST", "/comments")
            .with_user_agent(BROWSER)
            .with_body(serde_json::json!({"text": "eval(document.cookie)"}));

        assert!(!firewall.evaluate(&req).is_allowed());
        assert!(firewall.is_blocked("10.0.0.3"));
    }

    #[test]
    fn test_block_expires_at_not_before() {
        let (firewall, clock) = setup();
        let entry = firewall.block("10.0.0.4", BlockReason::MaliciousPattern);
        assert_eq!(entry.expires_at - entry.blocked_at, 3_600_000);

        clock.advance_ms(3_600_000 - 1);
        assert!(firewall.is_blocked("10.0.0.4"));

        clock.advance_ms(1);
        assert!(!firewall.is_blocked("10.0.0.4"));
        assert!(firewall.blocked_entry("10.0.0.4").is_none());
    }

    #[test]
    fn test_reblock_extends_expiry() {
        let (firewall, clock) = setup();
        let first = firewall.block("10.0.0.5", BlockReason::MaliciousPattern);

        clock.advance_secs(30 * 60);
        let second = firewall.block("10.0.0.5", BlockReason::AbuseRateExceeded);
        assert!(second.expires_at > first.expires_at);

        // Past the first expiry, still blocked by the second.
        clock.set_ms(first.expires_at + 1);
        assert!(firewall.is_blocked("10.0.0.5"));

        clock.set_ms(second.expires_at);
        assert!(!firewall.is_blocked("10.0.0.5"));
    }

    #[test]
    fn test_huge_block_duration_saturates() {
        let clock = Arc::new(ManualClock::new(1_700_000_000_000));
        let config = FirewallConfig {
            block_duration_secs: u64::MAX / 1000,
            ..FirewallConfig::default()
        };
        let firewall = Firewall::new(&config, clock.clone()).unwrap();

        let entry = firewall.block("10.0.0.9", BlockReason::MaliciousPattern);
        assert_eq!(entry.expires_at, u64::MAX);

        clock.advance_secs(365 * 24 * 60 * 60);
        assert!(firewall.is_blocked("10.0.0.9"));
    }

    #[test]
    fn test_reblock_never_shortens() {
        let clock = Arc::new(ManualClock::new(1_000_000));
        let firewall = Firewall::new(&FirewallConfig::default(), clock.clone()).unwrap();
        let long = firewall.block("10.0.0.6", BlockReason::MaliciousPattern);

        let short = FirewallConfig {
            block_duration_secs: 10,
            ..FirewallConfig::default()
        };
        firewall.reload(&short).unwrap();
        let after = firewall.block("10.0.0.6", BlockReason::MaliciousPattern);
        assert_eq!(after.expires_at, long.expires_at);
    }

    #[test]
    fn test_suspicious_agent_denied_but_not_blocked() {
        let (firewall, _) = setup();
        let req = RequestDescriptor::new("10.0.0.7", "GET", "/").with_user_agent("sqlmap/1.0");

        assert_eq!(
            firewall.evaluate(&req),
            FirewallVerdict::Deny(DenyReason::SuspiciousAgent)
        );
        assert!(!firewall.is_blocked("10.0.0.7"));
        assert_eq!(firewall.recent_activity("10.0.0.7"), 1);
    }

    #[test]
    fn test_missing_agent_is_suspicious() {
        let (firewall, _) = setup();
        let req = RequestDescriptor::new("10.0.0.8", "GET", "/");
        assert_eq!(
            firewall.evaluate(&req),
            FirewallVerdict::Deny(DenyReason::SuspiciousAgent)
        );
    }

    #[test]
    fn test_abuse_rate_blocks_after_threshold() {
        let (firewall, clock) = setup();
        for _ in 0..100 {
            assert!(firewall.evaluate(&clean("10.0.0.9")).is_allowed());
            clock.advance_ms(100);
        }

        assert_eq!(
            firewall.evaluate(&clean("10.0.0.9")),
            FirewallVerdict::Deny(DenyReason::AbuseRateExceeded)
        );
        assert!(firewall.is_blocked("10.0.0.9"));
        assert_eq!(
            firewall.blocked_entry("10.0.0.9").unwrap().reason,
            BlockReason::AbuseRateExceeded
        );
    }

    #[test]
    fn test_abuse_window_slides() {
        let (firewall, clock) = setup();
        for _ in 0..100 {
            assert!(firewall.evaluate(&clean("10.0.0.10")).is_allowed());
        }
        clock.advance_secs(60);
        assert!(firewall.evaluate(&clean("10.0.0.10")).is_allowed());
        assert_eq!(firewall.recent_activity("10.0.0.10"), 1);
    }

    #[test]
    fn test_reload_swaps_rules_and_keeps_blocklist() {
        let (firewall, _) = setup();
        firewall.block("10.0.0.11", BlockReason::MaliciousPattern);

        let config = FirewallConfig {
            threat_rules: vec![ThreatRuleConfig {
                name: "no-admin".into(),
                pattern: "/admin".into(),
            }],
            ..FirewallConfig::default()
        };
        firewall.reload(&config).unwrap();

        assert!(firewall.is_blocked("10.0.0.11"));
        let admin = RequestDescriptor::new("10.0.0.12", "GET", "/admin").with_user_agent(BROWSER);
        assert!(!firewall.evaluate(&admin).is_allowed());
        // The old SQL rule is gone.
        let sql = RequestDescriptor::new("10.0.0.13", "GET", "/q?x=1 UNION SELECT 2")
            .with_user_agent(BROWSER);
        assert!(firewall.evaluate(&sql).is_allowed());
    }

    #[test]
    fn test_reload_rejects_bad_pattern_and_keeps_policy() {
        let (firewall, _) = setup();
        let config = FirewallConfig {
            threat_rules: vec![ThreatRuleConfig {
                name: "broken".into(),
                pattern: "(".into(),
            }],
            ..FirewallConfig::default()
        };
        assert!(firewall.reload(&config).is_err());

        let sql = RequestDescriptor::new("10.0.0.14", "GET", "/q?x=1 UNION SELECT 2")
            .with_user_agent(BROWSER);
        assert!(!firewall.evaluate(&sql).is_allowed());
    }

    #[test]
    fn test_purge_expired() {
        let (firewall, clock) = setup();
        firewall.block("a", BlockReason::MaliciousPattern);
        clock.advance_secs(1800);
        firewall.block("b", BlockReason::MaliciousPattern);
        clock.advance_secs(1800);

        assert_eq!(firewall.purge_expired(), 1);
        assert_eq!(firewall.blocked_count(), 1);
        assert!(firewall.is_blocked("b"));
    }

    #[test]
    fn test_sweep_abuse_windows() {
        let (firewall, clock) = setup();
        firewall.evaluate(&clean("idle"));
        clock.advance_secs(61);
        firewall.evaluate(&clean("active"));

        assert_eq!(firewall.sweep_abuse_windows(), 1);
        assert_eq!(firewall.recent_activity("active"), 1);
    }
}
