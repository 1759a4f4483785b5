//! HTTP protocol layer module
//!
//! Header-level negotiation (cache, encoding, CORS, hotlinking) and response
//! builders, decoupled from filesystem access.

pub mod cache;
pub mod cors;
pub mod encoding;
pub mod mime;
pub mod referer;
pub mod response;

// Re-export commonly used types
pub use encoding::ContentEncoding;
pub use response::{
    build_304_response, build_error_response, build_html_response, build_preflight_response,
    ResponseBody,
};
