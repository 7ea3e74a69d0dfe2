//! Defensive response headers.
//!
//! # Responsibilities
//! - Pre-build the header set once from config
//! - Attach it to admitted responses
//! - Strip headers that advertise the server stack
//!
//! Denied responses never pass through here.

use axum::http::{
    header::{self, HeaderName},
    HeaderMap, HeaderValue,
};

use crate::config::HeadersConfig;
use crate::error::{GateError, GateResult};

static X_POWERED_BY: HeaderName = HeaderName::from_static("x-powered-by");
static PERMISSIONS_POLICY: HeaderName = HeaderName::from_static("permissions-policy");

#[derive(Debug, Clone)]
pub struct SecurityHeaders {
    headers: Vec<(HeaderName, HeaderValue)>,
    strip_server_headers: bool,
}

impl SecurityHeaders {
    pub fn from_config(config: &HeadersConfig) -> GateResult<Self> {
        if !config.enabled {
            return Ok(Self {
                headers: Vec::new(),
                strip_server_headers: config.strip_server_headers,
            });
        }

        let pairs: [(&'static str, HeaderName, &str); 7] = [
            (
                "x-content-type-options",
                header::X_CONTENT_TYPE_OPTIONS,
                config.content_type_options.as_str(),
            ),
            ("x-frame-options", header::X_FRAME_OPTIONS, config.frame_options.as_str()),
            ("x-xss-protection", header::X_XSS_PROTECTION, config.xss_protection.as_str()),
            (
                "strict-transport-security",
                header::STRICT_TRANSPORT_SECURITY,
                config.strict_transport_security.as_str(),
            ),
            (
                "content-security-policy",
                header::CONTENT_SECURITY_POLICY,
                config.content_security_policy.as_str(),
            ),
            ("referrer-policy", header::REFERRER_POLICY, config.referrer_policy.as_str()),
            (
                "permissions-policy",
                PERMISSIONS_POLICY.clone(),
                config.permissions_policy.as_str(),
            ),
        ];

        let mut headers = Vec::with_capacity(pairs.len());
        for (label, name, value) in pairs {
            // An empty value disables that header.
            if value.is_empty() {
                continue;
            }
            let value = HeaderValue::from_str(value).map_err(|_| GateError::InvalidHeaderValue {
                name: label,
                value: value.to_string(),
            })?;
            headers.push((name, value));
        }

        Ok(Self {
            headers,
            strip_server_headers: config.strip_server_headers,
        })
    }

    /// Set every configured header, replacing existing values.
    pub fn apply(&self, target: &mut HeaderMap) {
        for (name, value) in &self.headers {
            target.insert(name.clone(), value.clone());
        }
        if self.strip_server_headers {
            target.remove(&X_POWERED_BY);
            target.remove(header::SERVER);
        }
    }

    pub fn len(&self) -> usize {
        self.headers.len()
    }

    pub fn is_empty(&self) -> bool {
        self.headers.is_empty()
    }
}
