//! Security gate middleware.
//!
//! Runs every routed request through the [`SecurityGate`]. A denial is answered
//! here; on pass the sanitized request goes to the inner service and the
//! defensive headers are set on its response.

use std::sync::Arc;

use axum::{
    body::Body,
    extract::State,
    http::Request,
    middleware::Next,
    response::{IntoResponse, Response},
};

use crate::config::ListenerConfig;
use crate::http::request::InboundRequest;
use crate::security::gate::{GateDecision, SecurityGate};

/// State shared with [`security_middleware`].
#[derive(Clone)]
pub struct GateState {
    pub gate: Arc<SecurityGate>,
    pub listener: ListenerConfig,
}

pub async fn security_middleware(
    State(state): State<GateState>,
    req: Request<Body>,
    next: Next,
) -> Response {
    let mut inbound = match InboundRequest::read(req, &state.listener).await {
        Ok(inbound) => inbound,
        Err(e) => return e.into_response(),
    };

    match state.gate.inspect(&mut inbound.descriptor) {
        GateDecision::Deny(denial) => denial.into_response(),
        GateDecision::Pass => {
            let mut response = next.run(inbound.into_request()).await;
            state.gate.apply_headers(response.headers_mut());
            response
        }
    }
}
