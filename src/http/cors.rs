//! CORS handling
//!
//! Wide-open policy: any `Origin` is reflected back. A preflight (`OPTIONS`
//! carrying `Origin`) ends the request right here.

use hyper::header::{
    HeaderMap, HeaderValue, ACCESS_CONTROL_ALLOW_HEADERS, ACCESS_CONTROL_ALLOW_METHODS,
    ACCESS_CONTROL_ALLOW_ORIGIN, ACCESS_CONTROL_MAX_AGE, ORIGIN,
};
use hyper::Method;

pub const ALLOW_METHODS: &str = "GET, POST, PUT, DELETE, OPTIONS";
pub const ALLOW_HEADERS: &str = "Content-Type, Authorization";
/// Preflight cache duration (24h)
pub const MAX_AGE_SECS: &str = "86400";

#[derive(Debug, Default)]
pub struct CorsOutcome {
    /// Headers to attach to whatever response this request ends with
    pub headers: HeaderMap,
    /// Preflight answered; no later stage may run
    pub terminated: bool,
}

pub fn apply(request_headers: &HeaderMap, method: &Method) -> CorsOutcome {
    let Some(origin) = request_headers.get(ORIGIN) else {
        return CorsOutcome::default();
    };

    let mut headers = HeaderMap::new();
    headers.insert(ACCESS_CONTROL_ALLOW_ORIGIN, origin.clone());
    headers.insert(
        ACCESS_CONTROL_ALLOW_METHODS,
        HeaderValue::from_static(ALLOW_METHODS),
    );
    headers.insert(
        ACCESS_CONTROL_ALLOW_HEADERS,
        HeaderValue::from_static(ALLOW_HEADERS),
    );
    headers.insert(ACCESS_CONTROL_MAX_AGE, HeaderValue::from_static(MAX_AGE_SECS));

    CorsOutcome {
        headers,
        terminated: method == Method::OPTIONS,
    }
}
