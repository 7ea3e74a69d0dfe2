//! Denial responses.
//!
//! Bodies and codes are a client-facing contract:
//! - blocked identity: 403 `{"error": "Access denied", "code": "IP_BLOCKED"}`
//! - content, agent or abuse block: 403 `{"error": "Suspicious activity detected", "code": "REQUEST_BLOCKED"}`
//! - throttled: 429 with `X-RateLimit-*` headers and `{"error": "Too many requests", "retryAfter": secs}`
//!
//! Denied responses carry none of the defensive headers.

use axum::{
    http::{HeaderName, HeaderValue, StatusCode},
    response::{IntoResponse, Response},
    Json,
};
use serde_json::json;

use crate::security::gate::Denial;

pub static X_RATELIMIT_LIMIT: HeaderName = HeaderName::from_static("x-ratelimit-limit");
pub static X_RATELIMIT_REMAINING: HeaderName = HeaderName::from_static("x-ratelimit-remaining");
pub static X_RATELIMIT_RESET: HeaderName = HeaderName::from_static("x-ratelimit-reset");

impl IntoResponse for Denial {
    fn into_response(self) -> Response {
        match self {
            Denial::IpBlocked => (
                StatusCode::FORBIDDEN,
                Json(json!({ "error": "Access denied", "code": "IP_BLOCKED" })),
            )
                .into_response(),
            Denial::RequestBlocked(_) => (
                StatusCode::FORBIDDEN,
                Json(json!({
                    "error": "Suspicious activity detected",
                    "code": "REQUEST_BLOCKED"
                })),
            )
                .into_response(),
            Denial::RateLimited {
                decision,
                retry_after_secs,
            } => {
                let mut response = (
                    StatusCode::TOO_MANY_REQUESTS,
                    Json(json!({
                        "error": "Too many requests",
                        "retryAfter": retry_after_secs
                    })),
                )
                    .into_response();

                let headers = response.headers_mut();
                headers.insert(X_RATELIMIT_LIMIT.clone(), HeaderValue::from(decision.limit));
                headers.insert(X_RATELIMIT_REMAINING.clone(), HeaderValue::from_static("0"));
                headers.insert(X_RATELIMIT_RESET.clone(), HeaderValue::from(decision.reset_time));
                response
            }
        }
    }
}
