//! Request helpers: caller identity resolution

use crate::hashing::ANONYMOUS_IDENTITY;
use axum::http::HeaderMap;
use std::net::SocketAddr;

const SESSION_HEADER: &str = "x-session-id";
const FORWARDED_FOR_HEADER: &str = "x-forwarded-for";

/// Pick the clear-text identity an event is attributed to
///
/// First present of:
/// 1. `x-session-id`
/// 2. `authorization`
/// 3. `"{ip}-{user-agent}"` (ip from the first `x-forwarded-for` hop, else the
///    socket peer; a missing half is rendered as `unknown`)
///
/// Falls back to the shared anonymous identity. The result is hashed before
/// storage and never persisted as-is.
pub(crate) fn resolve_identity(headers: &HeaderMap, peer: Option<SocketAddr>) -> String {
    if let Some(session) = header_value(headers, SESSION_HEADER) {
        return session.to_string();
    }

    if let Some(auth) = header_value(headers, axum::http::header::AUTHORIZATION.as_str()) {
        return auth.to_string();
    }

    let ip = header_value(headers, FORWARDED_FOR_HEADER)
        .and_then(|v| v.split(',').map(str::trim).find(|hop| !hop.is_empty()))
        .map(str::to_string)
        .or_else(|| peer.map(|addr| addr.ip().to_string()));
    let user_agent = header_value(headers, axum::http::header::USER_AGENT.as_str());

    match (ip, user_agent) {
        (None, None) => ANONYMOUS_IDENTITY.to_string(),
        (ip, ua) => format!(
            "{}-{}",
            ip.as_deref().unwrap_or("unknown"),
            ua.unwrap_or("unknown")
        ),
    }
}

/// Non-empty, valid-UTF-8 header value
fn header_value<'a>(headers: &'a HeaderMap, name: &str) -> Option<&'a str> {
    headers
        .get(name)
        .and_then(|v| v.to_str().ok())
        .map(str::trim)
        .filter(|v| !v.is_empty())
}
