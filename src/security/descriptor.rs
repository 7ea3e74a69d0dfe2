//! Inbound request descriptor.
//!
//! The gate sees requests only through this type, so the decision pipeline does not
//! depend on the hosting framework. `http::request` builds one from an axum request.

use serde::Serialize;
use serde_json::{Map, Value};

use crate::security::sanitizer::{sanitize, sanitize_object};

/// Everything the gate inspects about one request.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct RequestDescriptor {
    /// Blocking / rate-limiting key, normally the client address.
    pub identity: String,
    pub method: String,
    /// Path without the query string; part of the rate-limit key.
    pub path: String,
    /// Path and query as received.
    pub url: String,
    pub user_agent: Option<String>,
    pub query: Map<String, Value>,
    pub path_params: Map<String, Value>,
    /// Parsed body: JSON, form fields as an object, or raw text.
    pub body: Option<Value>,
}

impl RequestDescriptor {
    /// Describe a request from its identity, method and raw URL (path + query).
    pub fn new(identity: impl Into<String>, method: impl Into<String>, url: impl Into<String>) -> Self {
        let url = url.into();
        let (path, query) = match url.split_once('?') {
            Some((path, query)) => (path.to_string(), parse_query(query)),
            None => (url.clone(), Map::new()),
        };

        Self {
            identity: identity.into(),
            method: method.into(),
            path,
            url,
            query,
            ..Default::default()
        }
    }

    pub fn with_user_agent(mut self, user_agent: impl Into<String>) -> Self {
        self.user_agent = Some(user_agent.into());
        self
    }

    pub fn with_body(mut self, body: Value) -> Self {
        self.body = Some(body);
        self
    }

    pub fn with_path_param(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.path_params
            .insert(name.into(), Value::String(value.into()));
        self
    }

    /// Text fields scanned by the threat rules.
    ///
    /// Missing values become empty strings. A field that fails to serialize is
    /// returned empty, which the matcher treats as "no match".
    pub fn inspection_fields(&self) -> [(&'static str, String); 5] {
        [
            ("url", self.url.clone()),
            ("user_agent", self.user_agent.clone().unwrap_or_default()),
            ("body", self.body.as_ref().map(serialize_field).unwrap_or_default()),
            ("query", serialize_field(&self.query)),
            ("path_params", serialize_field(&self.path_params)),
        ]
    }

    /// Replace body and query with their sanitized forms.
    pub fn sanitize_inputs(&mut self) {
        if let Some(body) = &self.body {
            self.body = Some(sanitize(body));
        }
        self.query = sanitize_object(&self.query);
    }
}

fn serialize_field<T: Serialize + ?Sized>(value: &T) -> String {
    serde_json::to_string(value).unwrap_or_else(|e| {
        tracing::debug!(error = %e, "Field serialization failed, skipping pattern scan");
        String::new()
    })
}

/// Parse a query or form string. Repeated keys collect into an array.
pub fn parse_query(query: &str) -> Map<String, Value> {
    let mut map = Map::new();
    for (key, value) in url::form_urlencoded::parse(query.as_bytes()) {
        let value = Value::String(value.into_owned());
        match map.get_mut(key.as_ref()) {
            Some(Value::Array(values)) => values.push(value),
            Some(existing) => {
                let first = existing.take();
                *existing = Value::Array(vec![first, value]);
            }
            None => {
                map.insert(key.into_owned(), value);
            }
        }
    }
    map
}

/// Encode an object back to `application/x-www-form-urlencoded`.
///
/// Arrays become repeated keys; non-string scalars use their JSON text.
pub fn encode_query(map: &Map<String, Value>) -> String {
    let mut serializer = url::form_urlencoded::Serializer::new(String::new());
    for (key, value) in map {
        match value {
            Value::Array(items) => {
                for item in items {
                    serializer.append_pair(key, &scalar_text(item));
                }
            }
            other => {
                serializer.append_pair(key, &scalar_text(other));
            }
        }
    }
    serializer.finish()
}

fn scalar_text(value: &Value) -> String {
    match value {
        Value::String(s) => s.clone(),
        Value::Null => String::new(),
        other => other.to_string(),
    }
}
