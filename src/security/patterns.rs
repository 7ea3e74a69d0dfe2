//! Threat pattern matching.
//!
//! # Responsibilities
//! - Compile the ordered threat rule table once
//! - Scan request-derived text fields for any rule match
//! - Classify user-agents against the known-bad agent list
//!
//! # Design Decisions
//! - Rules are data (name + pattern) so they can be reloaded and tested in isolation
//! - Matching is case-insensitive and unanchored: a hit anywhere in a field counts
//! - Rules are checked in table order and the first hit short-circuits

use regex::{Regex, RegexBuilder};
use serde::{Deserialize, Serialize};

use crate::error::{GateError, GateResult};

/// Built-in threat rules, in evaluation order.
pub const DEFAULT_THREAT_RULES: &[(&str, &str)] = &[
    ("sql-keyword", r"\b(SELECT|INSERT|UPDATE|DELETE|DROP|UNION|EXEC)\b"),
    ("script-handler", r"\b(script|alert|onerror|onload)="),
    ("path-traversal", r"(\.\./|\.\.\\|\\\.\.)"),
    ("html-injection", r"(<|>|&lt;|&gt;)"),
    ("command-injection", r"(eval\(|system\(|exec\()"),
    ("php-payload", r"(base64_decode|gzinflate)"),
    ("sql-injection-sequence", r"(union.*select|insert.*into)"),
];

/// Built-in user-agent denylist (substrings, case-insensitive).
pub const DEFAULT_SUSPICIOUS_AGENTS: &[&str] = &[
    "nmap",
    "sqlmap",
    "metasploit",
    "nikto",
    "wget",
    "curl",
    "python-requests",
    "go-http-client",
    "null",
    "undefined",
];

/// One configured threat rule.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize, Serialize)]
pub struct ThreatRuleConfig {
    pub name: String,
    pub pattern: String,
}

pub fn default_threat_rules() -> Vec<ThreatRuleConfig> {
    DEFAULT_THREAT_RULES
        .iter()
        .map(|(name, pattern)| ThreatRuleConfig {
            name: (*name).to_string(),
            pattern: (*pattern).to_string(),
        })
        .collect()
}

pub fn default_suspicious_agents() -> Vec<String> {
    DEFAULT_SUSPICIOUS_AGENTS.iter().map(|s| s.to_string()).collect()
}

/// A compiled threat rule.
#[derive(Debug, Clone)]
pub struct ThreatRule {
    name: String,
    regex: Regex,
}

impl ThreatRule {
    pub fn compile(config: &ThreatRuleConfig) -> GateResult<Self> {
        let regex = RegexBuilder::new(&config.pattern)
            .case_insensitive(true)
            .build()
            .map_err(|source| GateError::InvalidPattern {
                pattern: config.pattern.clone(),
                source,
            })?;

        Ok(Self {
            name: config.name.clone(),
            regex,
        })
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn is_match(&self, text: &str) -> bool {
        self.regex.is_match(text)
    }
}

/// A rule hit: which rule fired on which field.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ThreatMatch {
    pub rule: String,
    pub field: &'static str,
}

/// Ordered threat rules plus the user-agent denylist.
#[derive(Debug, Clone)]
pub struct PatternMatcher {
    rules: Vec<ThreatRule>,
    suspicious_agents: Vec<String>,
    flag_empty_agent: bool,
}

impl PatternMatcher {
    pub fn new(
        rules: &[ThreatRuleConfig],
        suspicious_agents: &[String],
        flag_empty_agent: bool,
    ) -> GateResult<Self> {
        let rules = rules
            .iter()
            .map(ThreatRule::compile)
            .collect::<GateResult<Vec<_>>>()?;

        let suspicious_agents = suspicious_agents
            .iter()
            .map(|agent| agent.trim().to_lowercase())
            .filter(|agent| !agent.is_empty())
            .collect();

        Ok(Self {
            rules,
            suspicious_agents,
            flag_empty_agent,
        })
    }

    /// Matcher with the built-in rule table and agent list.
    pub fn with_defaults() -> GateResult<Self> {
        Self::new(&default_threat_rules(), &default_suspicious_agents(), true)
    }

    pub fn rule_names(&self) -> impl Iterator<Item = &str> {
        self.rules.iter().map(ThreatRule::name)
    }

    /// Scan `(field name, text)` pairs; returns the first rule hit.
    pub fn find_threat(&self, fields: &[(&'static str, &str)]) -> Option<ThreatMatch> {
        for &(field, text) in fields {
            if text.is_empty() {
                continue;
            }
            for rule in &self.rules {
                if rule.is_match(text) {
                    return Some(ThreatMatch {
                        rule: rule.name.clone(),
                        field,
                    });
                }
            }
        }
        None
    }

    pub fn is_malicious(&self, text: &str) -> bool {
        self.find_threat(&[("text", text)]).is_some()
    }

    /// Whether the agent is missing, blank, or contains a denylisted substring.
    pub fn is_suspicious_agent(&self, user_agent: Option<&str>) -> bool {
        let agent = user_agent.map(str::trim).unwrap_or_default();
        if agent.is_empty() {
            return self.flag_empty_agent;
        }

        let agent = agent.to_lowercase();
        self.suspicious_agents
            .iter()
            .any(|needle| agent.contains(needle.as_str()))
    }
}
