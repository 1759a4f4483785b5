//! HTTP cache control module
//!
//! Advisory freshness headers plus `Last-Modified`/`ETag` validation.
//! Nothing is stored server side; every decision is recomputed from the
//! file's current metadata.

use chrono::{DateTime, Duration, Utc};
use hyper::header::{
    HeaderMap, HeaderValue, CACHE_CONTROL, ETAG, EXPIRES, IF_MODIFIED_SINCE, IF_NONE_MATCH,
    LAST_MODIFIED,
};
use std::collections::hash_map::DefaultHasher;
use std::hash::{Hash, Hasher};
use std::time::{SystemTime, UNIX_EPOCH};

/// Client-side freshness window in seconds
pub const MAX_AGE_SECS: i64 = 10;

/// Outcome of evaluating a conditional request
#[derive(Debug)]
pub struct CacheDecision {
    /// Headers to send with either the 200 or the 304
    pub headers: HeaderMap,
    /// Both validators matched; reply 304 with no body
    pub fresh: bool,
}

/// Format a timestamp as an RFC 7231 HTTP-date
pub fn http_date(time: DateTime<Utc>) -> String {
    time.format("%a, %d %b %Y %H:%M:%S GMT").to_string()
}

/// Generate `ETag` from file size and change time, without reading content
///
/// # Returns
/// Quoted `ETag` string, e.g., `"abc123def"`
pub fn generate_etag(size: u64, changed: SystemTime) -> String {
    let mut hasher = DefaultHasher::new();
    size.hash(&mut hasher);
    match changed.duration_since(UNIX_EPOCH) {
        Ok(d) => {
            d.as_secs().hash(&mut hasher);
            d.subsec_nanos().hash(&mut hasher);
        }
        Err(e) => e.duration().as_nanos().hash(&mut hasher),
    }
    format!("\"{:x}\"", hasher.finish())
}

pub fn evaluate(request_headers: &HeaderMap, size: u64, changed: SystemTime) -> CacheDecision {
    evaluate_at(request_headers, size, changed, Utc::now())
}

/// Evaluate validators against a fixed "now"
///
/// The response is fresh only when `If-Modified-Since` equals the computed
/// `Last-Modified` AND `If-None-Match` equals the computed `ETag`, both by
/// exact string comparison.
pub fn evaluate_at(
    request_headers: &HeaderMap,
    size: u64,
    changed: SystemTime,
    now: DateTime<Utc>,
) -> CacheDecision {
    let last_modified = http_date(DateTime::<Utc>::from(changed));
    let etag = generate_etag(size, changed);
    let expires = http_date(now + Duration::seconds(MAX_AGE_SECS));

    let mut headers = HeaderMap::new();
    insert(&mut headers, EXPIRES, &expires);
    insert(&mut headers, CACHE_CONTROL, &format!("max-age={MAX_AGE_SECS}"));
    insert(&mut headers, LAST_MODIFIED, &last_modified);
    insert(&mut headers, ETAG, &etag);

    let fresh = header_str(request_headers, &IF_MODIFIED_SINCE) == Some(last_modified.as_str())
        && header_str(request_headers, &IF_NONE_MATCH) == Some(etag.as_str());

    CacheDecision { headers, fresh }
}

fn insert(headers: &mut HeaderMap, name: hyper::header::HeaderName, value: &str) {
    // Dates and hex tags are always visible ASCII
    if let Ok(v) = HeaderValue::from_str(value) {
        headers.insert(name, v);
    }
}

fn header_str<'a>(headers: &'a HeaderMap, name: &hyper::header::HeaderName) -> Option<&'a str> {
    headers.get(name).and_then(|v| v.to_str().ok())
}
