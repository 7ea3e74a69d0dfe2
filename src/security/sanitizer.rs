//! Input sanitization and validation.
//!
//! # Responsibilities
//! - Neutralize markup, script schemes, inline handlers and CSS expressions in strings
//! - Map compound values field-by-field, preserving shape
//! - Email and password policy validators
//!
//! # Design Decisions
//! - Denylist filter: best effort, no completeness guarantee against novel encodings
//! - Rules run in a fixed order; later rules see the output of earlier ones
//! - Sequences are sanitized one level deep only. Nested objects and arrays inside
//!   a sequence (or an object inside an object) are passed through untouched.

use std::sync::LazyLock;

use regex::Regex;
use serde_json::{Map, Value};

static ANGLE_BRACKETS: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"[<>]").unwrap());
static JAVASCRIPT_SCHEME: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(?i)javascript:").unwrap());
static EVENT_HANDLER: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"(?i)on\w+=").unwrap());
static CSS_EXPRESSION: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(?i)expression\(").unwrap());
static CSS_URL: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"(?i)url\(").unwrap());
static EMAIL: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^[^\s@]+@[^\s@]+\.[^\s@]+$").unwrap());

const MAX_EMAIL_LEN: usize = 254;
const MIN_PASSWORD_LEN: usize = 8;
const PASSWORD_SYMBOLS: &str = "@$!%*?&";

const SQL_KEYWORDS: &[&str] = &[
    "SELECT", "INSERT", "UPDATE", "DELETE", "DROP", "UNION", "EXEC", "OR", "AND", "WHERE",
    "FROM", "TABLE",
];

/// Sanitize a single string.
pub fn sanitize_str(input: &str) -> String {
    let out = ANGLE_BRACKETS.replace_all(input, "");
    let out = JAVASCRIPT_SCHEME.replace_all(&out, "");
    let out = EVENT_HANDLER.replace_all(&out, "");
    let out = CSS_EXPRESSION.replace_all(&out, "");
    let out = CSS_URL.replace_all(&out, "");
    let out = out
        .replace('\\', "")
        .replace('\'', "&#39;")
        .replace('"', "&#34;");
    out.trim().to_string()
}

/// Sanitize a scalar or a sequence of scalars.
///
/// Strings are sanitized, sequences have their string elements sanitized, and
/// every other value is returned as-is.
pub fn sanitize_value(value: &Value) -> Value {
    match value {
        Value::String(s) => Value::String(sanitize_str(s)),
        Value::Array(items) => Value::Array(
            items
                .iter()
                .map(|item| match item {
                    Value::String(s) => Value::String(sanitize_str(s)),
                    other => other.clone(),
                })
                .collect(),
        ),
        other => other.clone(),
    }
}

/// Sanitize every field of an object with [`sanitize_value`].
pub fn sanitize_object(object: &Map<String, Value>) -> Map<String, Value> {
    object
        .iter()
        .map(|(key, value)| (key.clone(), sanitize_value(value)))
        .collect()
}

/// Sanitize any value, returning a new value of identical shape.
pub fn sanitize(value: &Value) -> Value {
    match value {
        Value::Object(object) => Value::Object(sanitize_object(object)),
        other => sanitize_value(other),
    }
}

pub fn is_valid_email(email: &str) -> bool {
    email.len() <= MAX_EMAIL_LEN && EMAIL.is_match(email)
}

/// Password policy: at least eight characters drawn from ASCII letters, digits and
/// `@$!%*?&`, with at least one of each class.
pub fn is_strong_password(password: &str) -> bool {
    let is_symbol = |c: char| PASSWORD_SYMBOLS.contains(c);

    password.chars().count() >= MIN_PASSWORD_LEN
        && password
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || is_symbol(c))
        && password.chars().any(|c| c.is_ascii_lowercase())
        && password.chars().any(|c| c.is_ascii_uppercase())
        && password.chars().any(|c| c.is_ascii_digit())
        && password.chars().any(is_symbol)
}

/// Coarse keyword check: true if any SQL keyword appears anywhere in the input.
///
/// Substring based, so `"ORANGE"` trips on `OR`. Use as a signal, not a verdict.
pub fn contains_sql_keywords(input: &str) -> bool {
    let upper = input.to_uppercase();
    SQL_KEYWORDS.iter().any(|keyword| upper.contains(keyword))
}
