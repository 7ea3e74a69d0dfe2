//! Configuration validation.
//!
//! # Responsibilities
//! - Semantic validation (serde handles syntactic)
//! - Validate value ranges (windows and thresholds > 0)
//! - Check that every threat pattern compiles
//! - Check addresses parse and header values are legal
//!
//! # Design Decisions
//! - Returns all validation errors, not just first
//! - Validation is pure function: GateConfig → Result<(), Vec<ValidationError>>
//! - Runs before config is accepted into the system

use std::net::SocketAddr;

use axum::http::HeaderValue;
use thiserror::Error;

use crate::config::schema::GateConfig;
use crate::security::patterns::ThreatRule;

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ValidationError {
    #[error("{field} must be greater than zero")]
    Zero { field: &'static str },

    #[error("{field} is not a valid socket address: {value}")]
    InvalidAddress { field: &'static str, value: String },

    #[error("threat rule `{name}` does not compile: {reason}")]
    InvalidPattern { name: String, reason: String },

    #[error("threat rule at position {index} has an empty name")]
    UnnamedRule { index: usize },

    #[error("header {field} has an illegal value")]
    InvalidHeader { field: &'static str },

    #[error("unknown log format `{0}` (expected \"pretty\" or \"json\")")]
    UnknownLogFormat(String),
}

pub fn validate_config(config: &GateConfig) -> Result<(), Vec<ValidationError>> {
    let mut errors = Vec::new();

    check_positive(&mut errors, "rate_limit.window_ms", config.rate_limit.window_ms);
    check_positive(
        &mut errors,
        "rate_limit.max_requests",
        config.rate_limit.max_requests as u64,
    );
    check_positive(
        &mut errors,
        "firewall.block_duration_secs",
        config.firewall.block_duration_secs,
    );
    check_positive(
        &mut errors,
        "firewall.abuse_window_secs",
        config.firewall.abuse_window_secs,
    );
    check_positive(
        &mut errors,
        "firewall.abuse_threshold",
        config.firewall.abuse_threshold as u64,
    );
    check_positive(&mut errors, "listener.max_body_size", config.listener.max_body_size as u64);
    check_positive(&mut errors, "timeouts.request_secs", config.timeouts.request_secs);
    if config.maintenance.enabled {
        check_positive(
            &mut errors,
            "maintenance.cleanup_interval_secs",
            config.maintenance.cleanup_interval_secs,
        );
    }

    check_address(&mut errors, "listener.bind_address", &config.listener.bind_address);
    if config.observability.metrics_enabled {
        check_address(
            &mut errors,
            "observability.metrics_address",
            &config.observability.metrics_address,
        );
    }
    if let Some(upstream) = &config.upstream {
        check_address(&mut errors, "upstream.address", &upstream.address);
    }

    for (index, rule) in config.firewall.threat_rules.iter().enumerate() {
        if rule.name.trim().is_empty() {
            errors.push(ValidationError::UnnamedRule { index });
        }
        if let Err(e) = ThreatRule::compile(rule) {
            errors.push(ValidationError::InvalidPattern {
                name: rule.name.clone(),
                reason: e.to_string(),
            });
        }
    }

    let headers = &config.headers;
    for (field, value) in [
        ("headers.content_type_options", &headers.content_type_options),
        ("headers.frame_options", &headers.frame_options),
        ("headers.xss_protection", &headers.xss_protection),
        ("headers.strict_transport_security", &headers.strict_transport_security),
        ("headers.content_security_policy", &headers.content_security_policy),
        ("headers.referrer_policy", &headers.referrer_policy),
        ("headers.permissions_policy", &headers.permissions_policy),
    ] {
        if HeaderValue::from_str(value).is_err() {
            errors.push(ValidationError::InvalidHeader { field });
        }
    }

    match config.observability.log_format.as_str() {
        "pretty" | "json" => {}
        other => errors.push(ValidationError::UnknownLogFormat(other.to_string())),
    }

    if errors.is_empty() {
        Ok(())
    } else {
        Err(errors)
    }
}

fn check_positive(errors: &mut Vec<ValidationError>, field: &'static str, value: u64) {
    if value == 0 {
        errors.push(ValidationError::Zero { field });
    }
}

fn check_address(errors: &mut Vec<ValidationError>, field: &'static str, value: &str) {
    if value.parse::<SocketAddr>().is_err() {
        errors.push(ValidationError::InvalidAddress {
            field,
            value: value.to_string(),
        });
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::security::patterns::ThreatRuleConfig;

    #[test]
    fn test_default_config_is_valid() {
        assert!(validate_config(&GateConfig::default()).is_ok());
    }

    #[test]
    fn test_collects_all_errors() {
        let mut config = GateConfig::default();
        config.rate_limit.max_requests = 0;
        config.firewall.abuse_threshold = 0;
        config.listener.bind_address = "not-an-address".into();
        config.firewall.threat_rules.push(ThreatRuleConfig {
            name: "".into(),
            pattern: "[".into(),
        });
        config.headers.frame_options = "bad\nvalue".into();
        config.observability.log_format = "xml".into();

        let errors = validate_config(&config).unwrap_err();
        assert_eq!(errors.len(), 7);
        assert!(errors.contains(&ValidationError::Zero {
            field: "rate_limit.max_requests"
        }));
        assert!(errors.contains(&ValidationError::UnnamedRule { index: 7 }));
        assert!(errors.contains(&ValidationError::InvalidHeader {
            field: "headers.frame_options"
        }));
        assert!(errors
            .iter()
            .any(|e| matches!(e, ValidationError::InvalidPattern { .. })));
    }

    #[test]
    fn test_metrics_address_only_checked_when_enabled() {
        let mut config = GateConfig::default();
        config.observability.metrics_address = "nope".into();
        assert!(validate_config(&config).is_ok());

        config.observability.metrics_enabled = true;
        assert!(validate_config(&config).is_err());
    }
}
