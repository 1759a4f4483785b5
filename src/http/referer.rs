//! Image hotlink protection
//!
//! An image may only be fetched from a page on the same host. Requests with
//! no referer are let through since there is nothing to check.

use super::mime;
use hyper::header::{HeaderMap, HOST, REFERER};
use hyper::Uri;

/// Non-standard spelling some clients send
const REFERRER: &str = "referrer";

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RefererDecision {
    Allow,
    /// Carries the offending referer for logging
    Deny(String),
}

pub fn check(request_headers: &HeaderMap, content_type: &str) -> RefererDecision {
    if !mime::is_image(content_type) {
        return RefererDecision::Allow;
    }

    let Some(referer) = request_headers
        .get(REFERER)
        .or_else(|| request_headers.get(REFERRER))
        .and_then(|v| v.to_str().ok())
    else {
        return RefererDecision::Allow;
    };

    let host = request_headers.get(HOST).and_then(|v| v.to_str().ok());
    match (referer_host(referer), host) {
        (Some(referer_host), Some(host)) if referer_host.eq_ignore_ascii_case(host) => {
            RefererDecision::Allow
        }
        _ => RefererDecision::Deny(referer.to_string()),
    }
}

/// `host[:port]` of an absolute referer URL, default ports dropped
fn referer_host(referer: &str) -> Option<String> {
    let uri: Uri = referer.parse().ok()?;
    let authority = uri.authority()?;
    let default_port = match uri.scheme_str() {
        Some("http") => Some(80),
        Some("https") => Some(443),
        _ => None,
    };
    match authority.port_u16() {
        Some(port) if Some(port) != default_port => Some(format!("{}:{port}", authority.host())),
        _ => Some(authority.host().to_string()),
    }
}
