use crate::models::ShippingAddress;
use axum::{
    extract::Request,
    http::StatusCode,
    middleware::Next,
    response::{IntoResponse, Response},
};
use once_cell::sync::Lazy;
use regex::Regex;
use rust_decimal::Decimal;
use std::str::FromStr;
use tracing::warn;

/// Maximum allowed request body size (64KB; checkout bodies are tiny)
const MAX_BODY_SIZE: usize = 64 * 1024;

/// Longest free-text value kept after sanitization
const MAX_STRING_LENGTH: usize = 200;

static SCRIPT_SCHEME: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"(?i)javascript\s*:").expect("static regex"));
static EVENT_HANDLER: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"(?i)\bon[a-z]+\s*=").expect("static regex"));
static EMAIL_DISALLOWED: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"[^a-z0-9@._+\-]").expect("static regex"));
static POSTAL_DISALLOWED: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"[^A-Z0-9 \-]").expect("static regex"));
static NAME_DISALLOWED: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"[^\p{L}\p{M} .,'\-]").expect("static regex"));

/// Middleware rejecting oversized bodies before they reach the JSON extractors
pub async fn sanitize_middleware(request: Request, next: Next) -> Result<Response, Response> {
    if let Some(length) = request
        .headers()
        .get("content-length")
        .and_then(|v| v.to_str().ok())
        .and_then(|v| v.parse::<usize>().ok())
    {
        if length > MAX_BODY_SIZE {
            warn!("Request body too large: {} bytes", length);
            return Err((StatusCode::PAYLOAD_TOO_LARGE, "Request body too large").into_response());
        }
    }

    Ok(next.run(request).await)
}

/// Strip markup and script vectors from a free-text value.
///
/// Removes angle brackets, `javascript:` schemes and inline event-handler
/// attributes (`onclick=` and friends), drops NUL bytes, trims and caps length.
pub fn sanitize_string(input: &str) -> String {
    let without_nulls = input.replace('\0', "");
    let without_brackets: String = without_nulls
        .chars()
        .filter(|c| *c != '<' && *c != '>')
        .collect();

    // Removal can splice a new match together ("javajavascript:script:"), so run to a fixpoint
    let mut current = without_brackets;
    loop {
        let without_scheme = SCRIPT_SCHEME.replace_all(&current, "");
        let next = EVENT_HANDLER.replace_all(&without_scheme, "").into_owned();
        if next == current {
            break;
        }
        current = next;
    }

    truncate_chars(current.trim(), MAX_STRING_LENGTH)
}

/// Lowercased, trimmed email with anything outside the address charset removed
pub fn sanitize_email(input: &str) -> String {
    let lowered = input.trim().to_lowercase();
    let cleaned = EMAIL_DISALLOWED.replace_all(&lowered, "");
    truncate_chars(&cleaned, MAX_STRING_LENGTH)
}

/// Uppercased postal code keeping letters, digits, spaces and dashes (US ZIP and CA postal formats)
pub fn sanitize_postal_code(input: &str) -> String {
    let upper = input.trim().to_uppercase();
    let cleaned = POSTAL_DISALLOWED.replace_all(&upper, "");
    truncate_chars(cleaned.trim(), 10)
}

/// Person name: letters, spaces and the punctuation names actually use
pub fn sanitize_name(input: &str) -> String {
    let base = sanitize_string(input);
    NAME_DISALLOWED.replace_all(&base, "").trim().to_string()
}

/// Parse a numeric string, accepting only finite decimal values
pub fn sanitize_number(input: &str) -> Option<Decimal> {
    let trimmed = input.trim();
    if trimmed.is_empty() {
        return None;
    }
    Decimal::from_str(trimmed).ok()
}

/// Sanitize every free-text field of a shipping address
pub fn sanitize_address(address: &ShippingAddress) -> ShippingAddress {
    ShippingAddress {
        name: sanitize_name(&address.name),
        email: sanitize_email(&address.email),
        line1: sanitize_string(&address.line1),
        line2: sanitize_string(&address.line2),
        city: sanitize_string(&address.city),
        state: sanitize_string(&address.state).to_uppercase(),
        zip: sanitize_postal_code(&address.zip),
        country: address.country,
    }
}

fn truncate_chars(value: &str, max: usize) -> String {
    value.chars().take(max).collect()
}
