//! Gate error types.
//!
//! Security decisions are never errors; they are verdicts. These variants cover
//! misconfiguration and requests the gate cannot describe at all.

use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use serde_json::json;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum GateError {
    #[error("invalid threat pattern `{pattern}`: {source}")]
    InvalidPattern {
        pattern: String,
        #[source]
        source: regex::Error,
    },

    #[error("invalid value for header {name}: {value:?}")]
    InvalidHeaderValue { name: &'static str, value: String },

    #[error("request has no resolvable client identity")]
    MissingIdentity,

    #[error("failed to read request body: {0}")]
    BodyRead(String),

    #[error("request body exceeds {limit} bytes")]
    BodyTooLarge { limit: usize },
}

pub type GateResult<T> = Result<T, GateError>;

impl GateError {
    pub fn status(&self) -> StatusCode {
        match self {
            GateError::BodyTooLarge { .. } => StatusCode::PAYLOAD_TOO_LARGE,
            GateError::BodyRead(_) => StatusCode::BAD_REQUEST,
            _ => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }

    pub fn code(&self) -> &'static str {
        match self {
            GateError::BodyTooLarge { .. } => "PAYLOAD_TOO_LARGE",
            GateError::BodyRead(_) => "BAD_REQUEST",
            _ => "INTERNAL_ERROR",
        }
    }
}

impl IntoResponse for GateError {
    fn into_response(self) -> Response {
        tracing::error!(error = %self, "Security gate internal error");
        let body = json!({
            "error": self.to_string(),
            "code": self.code(),
        });
        (self.status(), Json(body)).into_response()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_status_mapping() {
        assert_eq!(
            GateError::BodyTooLarge { limit: 10 }.status(),
            StatusCode::PAYLOAD_TOO_LARGE
        );
        assert_eq!(GateError::MissingIdentity.status(), StatusCode::INTERNAL_SERVER_ERROR);
        assert_eq!(GateError::MissingIdentity.code(), "INTERNAL_ERROR");
        assert_eq!(
            GateError::BodyRead("reset".into()).status(),
            StatusCode::BAD_REQUEST
        );
    }
}
