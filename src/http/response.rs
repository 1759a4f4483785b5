//! HTTP response building module
//!
//! Builders for the fixed-status responses the pipeline emits. Every builder
//! takes the headers accumulated by earlier stages (CORS, cache) so they reach
//! the client whatever the outcome.

use crate::error::ServeError;
use http_body_util::{combinators::UnsyncBoxBody, BodyExt, Empty, Full};
use hyper::body::Bytes;
use hyper::header::{HeaderMap, HeaderValue, CONTENT_LENGTH, CONTENT_TYPE};
use hyper::{Response, StatusCode};
use std::io;

/// Body type shared by buffered and streamed responses
pub type ResponseBody = UnsyncBoxBody<Bytes, io::Error>;

pub fn full_body(data: impl Into<Bytes>) -> ResponseBody {
    Full::new(data.into())
        .map_err(|never| match never {})
        .boxed_unsync()
}

pub fn empty_body() -> ResponseBody {
    Empty::<Bytes>::new()
        .map_err(|never| match never {})
        .boxed_unsync()
}

/// Merge accumulated stage headers into a finished response
pub fn with_headers(mut response: Response<ResponseBody>, headers: HeaderMap) -> Response<ResponseBody> {
    let target = response.headers_mut();
    for (name, value) in &headers {
        target.insert(name, value.clone());
    }
    response
}

/// Plain-text response with a fixed message
pub fn build_text_response(
    status: StatusCode,
    message: &'static str,
    headers: HeaderMap,
    is_head: bool,
) -> Response<ResponseBody> {
    let body = if is_head {
        empty_body()
    } else {
        full_body(message)
    };

    let response = Response::builder()
        .status(status)
        .header(CONTENT_TYPE, "text/plain; charset=utf-8")
        .header(CONTENT_LENGTH, message.len())
        .body(body)
        .unwrap_or_else(|_| bare_response(status));
    with_headers(response, headers)
}

/// Map a pipeline error onto its client-visible response
pub fn build_error_response(
    err: &ServeError,
    headers: HeaderMap,
    is_head: bool,
) -> Response<ResponseBody> {
    build_text_response(err.status(), err.public_message(), headers, is_head)
}

/// Build 304 Not Modified response carrying the validators already computed
pub fn build_304_response(headers: HeaderMap) -> Response<ResponseBody> {
    with_headers(bare_response(StatusCode::NOT_MODIFIED), headers)
}

/// Build the empty response that ends a CORS preflight
pub fn build_preflight_response(headers: HeaderMap) -> Response<ResponseBody> {
    with_headers(bare_response(StatusCode::NO_CONTENT), headers)
}

/// Build generic HTML response
pub fn build_html_response(
    content: String,
    headers: HeaderMap,
    is_head: bool,
) -> Response<ResponseBody> {
    let content_length = content.len();
    let body = if is_head {
        empty_body()
    } else {
        full_body(content)
    };

    let response = Response::builder()
        .status(StatusCode::OK)
        .header(CONTENT_TYPE, HeaderValue::from_static("text/html; charset=utf-8"))
        .header(CONTENT_LENGTH, content_length)
        .body(body)
        .unwrap_or_else(|_| bare_response(StatusCode::OK));
    with_headers(response, headers)
}

fn bare_response(status: StatusCode) -> Response<ResponseBody> {
    let mut response = Response::new(empty_body());
    *response.status_mut() = status;
    response
}
