//! Per-request context
//!
//! Created when a request enters the pipeline and dropped with its response.
//! The body is read and parsed at most once; the resolved target is set at
//! most once.

use super::resolver::{decode_path, Target};
use crate::error::ServeError;
use crate::http::ResponseBody;
use crate::mock::{dispatcher, MockBody};
use http_body_util::{BodyExt, Limited};
use hyper::body::{Body, Bytes};
use hyper::header::{HeaderMap, CONTENT_TYPE};
use hyper::{Method, Request, Response};
use tokio::sync::OnceCell;

pub type BoxError = Box<dyn std::error::Error + Send + Sync>;

/// Result of a pipeline stage that may answer the request itself
pub enum StageOutcome {
    Handled(Response<ResponseBody>),
    NotHandled,
}

pub struct RequestContext<B> {
    pub method: Method,
    /// Percent-decoded request path
    pub path: String,
    /// Raw query string without the leading `?`
    pub query: Option<String>,
    pub headers: HeaderMap,
    body: Option<B>,
    parsed_body: OnceCell<MockBody>,
    target: OnceCell<Target>,
}

impl<B> RequestContext<B>
where
    B: Body<Data = Bytes>,
    B::Error: Into<BoxError>,
{
    pub fn from_request(req: Request<B>) -> Result<Self, ServeError> {
        let (parts, body) = req.into_parts();
        let path = decode_path(parts.uri.path())?;
        Ok(Self {
            method: parts.method,
            path,
            query: parts.uri.query().map(ToString::to_string),
            headers: parts.headers,
            body: Some(body),
            parsed_body: OnceCell::new(),
            target: OnceCell::new(),
        })
    }

    pub fn is_head(&self) -> bool {
        self.method == Method::HEAD
    }

    pub fn header(&self, name: &str) -> Option<&str> {
        self.headers.get(name).and_then(|v| v.to_str().ok())
    }

    /// Read the body (bounded by `limit` bytes) and parse it by content type.
    /// Later calls return the memoised result.
    pub async fn parsed_body(&mut self, limit: u64) -> Result<&MockBody, ServeError> {
        if !self.parsed_body.initialized() {
            let raw = match self.body.take() {
                Some(body) => read_limited(body, limit).await?,
                None => Bytes::new(),
            };
            let content_type = self.header(CONTENT_TYPE.as_str()).map(ToString::to_string);
            let parsed = dispatcher::parse_body(content_type.as_deref(), &raw)?;
            // Only this method sets the cell and it holds `&mut self`
            let _ = self.parsed_body.set(parsed);
        }
        self.parsed_body
            .get()
            .ok_or_else(|| ServeError::Io(std::io::Error::other("request body unavailable")))
    }

    /// Record the resolved target; a second call keeps the first value
    pub async fn set_target(&self, target: Target) -> &Target {
        self.target.get_or_init(|| async { target }).await
    }
}

async fn read_limited<B>(body: B, limit: u64) -> Result<Bytes, ServeError>
where
    B: Body<Data = Bytes>,
    B::Error: Into<BoxError>,
{
    let limit_bytes = usize::try_from(limit).unwrap_or(usize::MAX);
    match Limited::new(body, limit_bytes).collect().await {
        Ok(collected) => Ok(collected.to_bytes()),
        Err(e) if e.is::<http_body_util::LengthLimitError>() => {
            Err(ServeError::PayloadTooLarge(limit))
        }
        Err(e) => Err(ServeError::Io(std::io::Error::other(e))),
    }
}
