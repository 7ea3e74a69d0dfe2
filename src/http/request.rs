//! Request extraction and rewriting.
//!
//! # Responsibilities
//! - Resolve the client identity (peer address or trusted `X-Forwarded-For`)
//! - Buffer and parse the body within the configured size limit
//! - Build the [`RequestDescriptor`] the gate inspects
//! - Rebuild the request from the sanitized descriptor for the inner service
//!
//! # Design Decisions
//! - JSON and form bodies are rewritten after sanitization; any other body is
//!   inspected as text but forwarded byte for byte
//! - Path parameters are inspected but never rewritten
//! - The sanitized descriptor is left in the request extensions for handlers

use std::net::SocketAddr;

use axum::{
    body::{Body, Bytes},
    extract::{ConnectInfo, FromRequestParts, RawPathParams},
    http::{header, request::Parts, uri::PathAndQuery, HeaderValue, Request, Uri},
};
use http_body_util::LengthLimitError;
use serde_json::Value;

use crate::config::ListenerConfig;
use crate::error::{GateError, GateResult};
use crate::security::descriptor::{encode_query, parse_query, RequestDescriptor};

static X_FORWARDED_FOR: header::HeaderName = header::HeaderName::from_static("x-forwarded-for");

/// How the body was understood, which decides how it is rebuilt.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BodyKind {
    Empty,
    Json,
    Form,
    /// Inspected as text, forwarded unchanged.
    Opaque,
}

/// A buffered request split into its parts and gate descriptor.
#[derive(Debug)]
pub struct InboundRequest {
    parts: Parts,
    raw_body: Bytes,
    body_kind: BodyKind,
    /// Query string as received, to detect whether it needs rewriting.
    raw_query: Option<String>,
    pub descriptor: RequestDescriptor,
}

impl InboundRequest {
    /// Buffer `req` and describe it.
    pub async fn read(req: Request<Body>, listener: &ListenerConfig) -> GateResult<Self> {
        let identity = resolve_identity(&req, listener.trust_forwarded_for)?;
        let (mut parts, body) = req.into_parts();

        if let Some(length) = content_length(&parts) {
            if length > listener.max_body_size {
                return Err(GateError::BodyTooLarge {
                    limit: listener.max_body_size,
                });
            }
        }

        // Chunked bodies carry no length up front; the buffering limit catches them.
        let raw_body = axum::body::to_bytes(body, listener.max_body_size)
            .await
            .map_err(|e| body_read_error(e, listener.max_body_size))?;

        let url = parts
            .uri
            .path_and_query()
            .map(|pq| pq.as_str().to_string())
            .unwrap_or_else(|| parts.uri.path().to_string());
        let mut descriptor = RequestDescriptor::new(identity, parts.method.as_str(), url);

        if let Some(agent) = parts
            .headers
            .get(header::USER_AGENT)
            .and_then(|v| v.to_str().ok())
        {
            descriptor = descriptor.with_user_agent(agent);
        }

        // Only present when the middleware runs as a route layer.
        if let Ok(params) = RawPathParams::from_request_parts(&mut parts, &()).await {
            for (name, value) in &params {
                descriptor = descriptor.with_path_param(name, value);
            }
        }

        let (body_kind, body) = parse_body(&parts, &raw_body);
        descriptor.body = body;

        Ok(Self {
            raw_query: parts.uri.query().map(str::to_string),
            parts,
            raw_body,
            body_kind,
            descriptor,
        })
    }

    pub fn body_kind(&self) -> BodyKind {
        self.body_kind
    }

    /// Rebuild the request from the (sanitized) descriptor.
    pub fn into_request(self) -> Request<Body> {
        let Self {
            mut parts,
            raw_body,
            body_kind,
            raw_query,
            descriptor,
        } = self;

        if raw_query.is_some() {
            rewrite_query(&mut parts, &descriptor);
        }

        let body = match (body_kind, &descriptor.body) {
            (BodyKind::Json, Some(value)) => match serde_json::to_vec(value) {
                Ok(bytes) => Bytes::from(bytes),
                Err(e) => {
                    tracing::debug!(error = %e, "Sanitized body re-encoding failed, forwarding original");
                    raw_body
                }
            },
            (BodyKind::Form, Some(Value::Object(fields))) => Bytes::from(encode_query(fields)),
            _ => raw_body,
        };

        if !body.is_empty() || parts.headers.contains_key(header::CONTENT_LENGTH) {
            parts
                .headers
                .insert(header::CONTENT_LENGTH, HeaderValue::from(body.len()));
        }

        parts.extensions.insert(descriptor);
        Request::from_parts(parts, Body::from(body))
    }
}

/// Client identity: first trusted `X-Forwarded-For` hop, else the peer IP.
pub fn resolve_identity<B>(req: &Request<B>, trust_forwarded_for: bool) -> GateResult<String> {
    if trust_forwarded_for {
        let forwarded = req
            .headers()
            .get(&X_FORWARDED_FOR)
            .and_then(|v| v.to_str().ok())
            .and_then(|v| v.split(',').next())
            .map(str::trim)
            .filter(|hop| !hop.is_empty());
        if let Some(hop) = forwarded {
            return Ok(hop.to_string());
        }
    }

    req.extensions()
        .get::<ConnectInfo<SocketAddr>>()
        .map(|ConnectInfo(addr)| addr.ip().to_string())
        .ok_or(GateError::MissingIdentity)
}

fn body_read_error(err: axum::Error, limit: usize) -> GateError {
    let inner = err.into_inner();
    if inner.is::<LengthLimitError>() {
        GateError::BodyTooLarge { limit }
    } else {
        GateError::BodyRead(inner.to_string())
    }
}

fn content_length(parts: &Parts) -> Option<usize> {
    parts
        .headers
        .get(header::CONTENT_LENGTH)
        .and_then(|v| v.to_str().ok())
        .and_then(|v| v.parse().ok())
}

fn parse_body(parts: &Parts, raw: &Bytes) -> (BodyKind, Option<Value>) {
    if raw.is_empty() {
        return (BodyKind::Empty, None);
    }

    let content_type = parts
        .headers
        .get(header::CONTENT_TYPE)
        .and_then(|v| v.to_str().ok())
        .unwrap_or_default()
        .to_ascii_lowercase();
    let text = String::from_utf8_lossy(raw);

    if content_type.starts_with("application/json") || content_type.contains("+json") {
        match serde_json::from_slice::<Value>(raw) {
            Ok(value) => return (BodyKind::Json, Some(value)),
            Err(e) => {
                tracing::debug!(error = %e, "Malformed JSON body, inspecting as text");
            }
        }
    } else if content_type.starts_with("application/x-www-form-urlencoded") {
        return (BodyKind::Form, Some(Value::Object(parse_query(&text))));
    }

    (BodyKind::Opaque, Some(Value::String(text.into_owned())))
}

fn rewrite_query(parts: &mut Parts, descriptor: &RequestDescriptor) {
    let path_and_query = if descriptor.query.is_empty() {
        descriptor.path.clone()
    } else {
        format!("{}?{}", descriptor.path, encode_query(&descriptor.query))
    };

    let mut uri_parts = parts.uri.clone().into_parts();
    match PathAndQuery::try_from(path_and_query) {
        Ok(pq) => uri_parts.path_and_query = Some(pq),
        Err(e) => {
            tracing::debug!(error = %e, "Sanitized query not representable, keeping original");
            return;
        }
    }
    if let Ok(uri) = Uri::from_parts(uri_parts) {
        parts.uri = uri;
    }
}
