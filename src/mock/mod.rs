//! Mock responder module
//!
//! Requests under the mock prefix can be answered by a registered
//! `MockHandler` instead of the filesystem. The handler sees the parsed
//! query and body and writes its reply into a `ResponseSink`.

pub mod dispatcher;
pub mod echo;

pub use dispatcher::MockDispatcher;
pub use echo::EchoMock;

use crate::http::response::{empty_body, full_body, with_headers, ResponseBody};
use hyper::header::{HeaderMap, HeaderName, HeaderValue};
use hyper::{Method, Response, StatusCode};
use std::collections::BTreeMap;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum MockError {
    #[error("invalid response header {0}")]
    InvalidHeader(String),

    #[error("response already ended")]
    AlreadyEnded,

    #[error(transparent)]
    Json(#[from] serde_json::Error),

    #[error("{0}")]
    Handler(String),
}

/// Request body as parsed from its declared content type
#[derive(Debug, Clone, PartialEq)]
pub enum MockBody {
    /// `application/json`
    Json(serde_json::Value),
    /// `application/x-www-form-urlencoded`
    Form(BTreeMap<String, String>),
    /// Any other content type, passed through unparsed
    Raw(String),
}

/// What a mock handler gets to see of the request
#[derive(Debug, Clone)]
pub struct MockRequest {
    pub method: Method,
    pub headers: HeaderMap,
    pub query: BTreeMap<String, String>,
    pub body: MockBody,
}

/// Explicit response surface handed to mock handlers
#[derive(Debug)]
pub struct ResponseSink {
    status: StatusCode,
    headers: HeaderMap,
    body: Vec<u8>,
    ended: bool,
}

impl ResponseSink {
    /// Start a 200 response pre-loaded with headers earlier stages applied
    pub fn new(headers: HeaderMap) -> Self {
        Self {
            status: StatusCode::OK,
            headers,
            body: Vec::new(),
            ended: false,
        }
    }

    pub fn set_status(&mut self, status: StatusCode) {
        self.status = status;
    }

    pub fn set_header(&mut self, name: &str, value: &str) -> Result<(), MockError> {
        let name = HeaderName::from_bytes(name.as_bytes())
            .map_err(|_| MockError::InvalidHeader(name.to_string()))?;
        let value = HeaderValue::from_str(value)
            .map_err(|_| MockError::InvalidHeader(name.as_str().to_string()))?;
        self.headers.insert(name, value);
        Ok(())
    }

    pub fn write(&mut self, chunk: &[u8]) -> Result<(), MockError> {
        if self.ended {
            return Err(MockError::AlreadyEnded);
        }
        self.body.extend_from_slice(chunk);
        Ok(())
    }

    /// Write a final chunk and close the response
    pub fn end(&mut self, chunk: &[u8]) -> Result<(), MockError> {
        self.write(chunk)?;
        self.ended = true;
        Ok(())
    }

    /// Serialize `value` as the JSON body and close the response
    pub fn json(&mut self, value: &serde_json::Value) -> Result<(), MockError> {
        self.set_header("content-type", "application/json")?;
        let body = serde_json::to_vec(value)?;
        self.end(&body)
    }

    pub const fn status(&self) -> StatusCode {
        self.status
    }

    pub const fn headers(&self) -> &HeaderMap {
        &self.headers
    }

    pub fn body(&self) -> &[u8] {
        &self.body
    }

    pub const fn is_ended(&self) -> bool {
        self.ended
    }

    pub fn into_response(self, is_head: bool) -> Response<ResponseBody> {
        let body = if is_head {
            empty_body()
        } else {
            full_body(self.body)
        };
        let mut response = Response::new(body);
        *response.status_mut() = self.status;
        with_headers(response, self.headers)
    }
}

/// A pluggable responder for API-shaped requests
///
/// Return `Ok(true)` when the request was fully answered through `response`,
/// `Ok(false)` to let the request fall through to static files.
pub trait MockHandler: Send + Sync {
    fn handle(
        &self,
        pathname: &str,
        request: &MockRequest,
        response: &mut ResponseSink,
    ) -> Result<bool, MockError>;
}
