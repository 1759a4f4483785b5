//! Request pipeline
//!
//! Entry point for HTTP request processing. Runs the stages in order
//! (CORS, mock, resolve, then listing or cache, referer, encoding, stream)
//! and is the single place where errors become responses and log lines.

use super::context::{BoxError, RequestContext, StageOutcome};
use super::listing;
use super::resolver::{self, FileDescriptor, Target};
use crate::config::Config;
use crate::error::ServeError;
use crate::http::referer::RefererDecision;
use crate::http::response::{empty_body, with_headers};
use crate::http::{
    build_304_response, build_error_response, build_html_response, build_preflight_response,
    cache, cors, encoding, mime, referer, ResponseBody,
};
use crate::logger::{AccessLogEntry, Logger};
use crate::mock::MockDispatcher;
use futures_util::{Stream, TryStreamExt};
use http_body_util::{BodyExt, StreamBody};
use hyper::body::{Body, Bytes, Frame};
use hyper::header::{
    HeaderMap, HeaderName, HeaderValue, CONTENT_ENCODING, CONTENT_LENGTH, CONTENT_TYPE, REFERER,
    USER_AGENT, VARY,
};
use hyper::{Method, Request, Response, Version};
use std::fmt;
use std::io;
use std::net::SocketAddr;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Instant;
use tokio_util::io::ReaderStream;

/// State a request ended in
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Terminal {
    CorsPreflightEnded,
    MockHandled,
    FileSent,
    DirectoryListed,
    NotModified,
    Forbidden,
    NotFound,
    BadRequest,
    PayloadTooLarge,
    ServerError,
}

impl Terminal {
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::CorsPreflightEnded => "CorsPreflightEnded",
            Self::MockHandled => "MockHandled",
            Self::FileSent => "FileSent",
            Self::DirectoryListed => "DirectoryListed",
            Self::NotModified => "NotModified",
            Self::Forbidden => "Forbidden",
            Self::NotFound => "NotFound",
            Self::BadRequest => "BadRequest",
            Self::PayloadTooLarge => "PayloadTooLarge",
            Self::ServerError => "ServerError",
        }
    }

    const fn from_error(err: &ServeError) -> Self {
        match err {
            ServeError::NotFound(_) => Self::NotFound,
            ServeError::Forbidden(_) => Self::Forbidden,
            ServeError::BadMockPayload(_) => Self::BadRequest,
            ServeError::PayloadTooLarge(_) => Self::PayloadTooLarge,
            ServeError::MalformedUrl(_) | ServeError::UpstreamFailure(_) | ServeError::Io(_) => {
                Self::ServerError
            }
        }
    }
}

impl fmt::Display for Terminal {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

type Outcome = (Terminal, Response<ResponseBody>);

/// Immutable per-server request handler, shared by every connection
pub struct RequestPipeline {
    root: PathBuf,
    mock: MockDispatcher,
    logger: Arc<Logger>,
    footer: String,
}

impl RequestPipeline {
    /// Build a pipeline serving `root`, which is canonicalised here
    pub fn new(
        root: &Path,
        mock: MockDispatcher,
        logger: Arc<Logger>,
        footer: String,
    ) -> io::Result<Self> {
        Ok(Self {
            root: std::fs::canonicalize(root)?,
            mock,
            logger,
            footer,
        })
    }

    pub fn from_config(config: &Config, addr: &SocketAddr, logger: Arc<Logger>) -> io::Result<Self> {
        let footer = format!(
            "{}/{} server running @ {addr}",
            env!("CARGO_PKG_NAME"),
            env!("CARGO_PKG_VERSION")
        );
        Self::new(
            &config.server.root,
            MockDispatcher::from_config(&config.mock),
            logger,
            footer,
        )
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Run one request through every stage, then write its access log line
    pub async fn handle<B>(&self, req: Request<B>, peer: Option<SocketAddr>) -> Response<ResponseBody>
    where
        B: Body<Data = Bytes>,
        B::Error: Into<BoxError>,
    {
        let start = Instant::now();
        let mut entry = access_entry(&req, peer);

        let (terminal, response) = self.dispatch(req).await;

        entry.status = response.status().as_u16();
        entry.body_bytes = response.body().size_hint().exact();
        entry.outcome = terminal.as_str();
        entry.request_time_us = u64::try_from(start.elapsed().as_micros()).unwrap_or(u64::MAX);

        self.logger.debug(&format!(
            "{} {} -> {} ({})",
            entry.method, entry.path, terminal, entry.status
        ));
        self.logger.log_access(&entry);
        response
    }

    async fn dispatch<B>(&self, req: Request<B>) -> Outcome
    where
        B: Body<Data = Bytes>,
        B::Error: Into<BoxError>,
    {
        let is_head = req.method() == Method::HEAD;
        let raw_path = req.uri().path().to_string();

        let mut ctx = match RequestContext::from_request(req) {
            Ok(ctx) => ctx,
            Err(e) => return self.fail(&raw_path, e, HeaderMap::new(), is_head),
        };

        let cors = cors::apply(&ctx.headers, &ctx.method);
        if cors.terminated {
            return (Terminal::CorsPreflightEnded, build_preflight_response(cors.headers));
        }

        match self.run(&mut ctx, cors.headers.clone()).await {
            Ok(outcome) => outcome,
            Err(e) => self.fail(&ctx.path, e, cors.headers, is_head),
        }
    }

    async fn run<B>(
        &self,
        ctx: &mut RequestContext<B>,
        headers: HeaderMap,
    ) -> Result<Outcome, ServeError>
    where
        B: Body<Data = Bytes>,
        B::Error: Into<BoxError>,
    {
        if let StageOutcome::Handled(response) = self.mock.try_dispatch(ctx, headers.clone()).await? {
            return Ok((Terminal::MockHandled, response));
        }

        let target = resolver::resolve(&self.root, &ctx.path).await?;
        match ctx.set_target(target).await {
            Target::Listing(dir) => self.serve_listing(ctx, dir, headers).await,
            Target::File(file) => serve_file(ctx, file, headers).await,
        }
    }

    async fn serve_listing<B>(
        &self,
        ctx: &RequestContext<B>,
        dir: &FileDescriptor,
        headers: HeaderMap,
    ) -> Result<Outcome, ServeError>
    where
        B: Body<Data = Bytes>,
        B::Error: Into<BoxError>,
    {
        let entries = listing::read_entries(&dir.path, &ctx.path)
            .await
            .map_err(ServeError::NotFound)?;
        let html = listing::render_listing(&entries, &self.footer);
        Ok((
            Terminal::DirectoryListed,
            build_html_response(html, headers, ctx.is_head()),
        ))
    }

    fn fail(&self, path: &str, err: ServeError, headers: HeaderMap, is_head: bool) -> Outcome {
        match &err {
            ServeError::NotFound(e) if e.kind() == io::ErrorKind::PermissionDenied => {
                self.logger.warn(&format!("Access denied for {path}: {e}"));
            }
            ServeError::NotFound(e) => self.logger.debug(&format!("Not found {path}: {e}")),
            ServeError::Forbidden(_)
            | ServeError::BadMockPayload(_)
            | ServeError::PayloadTooLarge(_) => self.logger.warn(&format!("{path}: {err}")),
            ServeError::MalformedUrl(_) | ServeError::UpstreamFailure(_) | ServeError::Io(_) => {
                self.logger.error(&format!("{path}: {err}"));
            }
        }
        (Terminal::from_error(&err), build_error_response(&err, headers, is_head))
    }
}

/// Cache check, hotlink check, encoding negotiation, then stream the file
async fn serve_file<B>(
    ctx: &RequestContext<B>,
    file: &FileDescriptor,
    mut headers: HeaderMap,
) -> Result<Outcome, ServeError>
where
    B: Body<Data = Bytes>,
    B::Error: Into<BoxError>,
{
    let decision = cache::evaluate(&ctx.headers, file.size, file.changed);
    headers.extend(decision.headers);
    if decision.fresh {
        return Ok((Terminal::NotModified, build_304_response(headers)));
    }

    let content_type = mime::content_type_for(&file.path);
    if let RefererDecision::Deny(from) = referer::check(&ctx.headers, content_type) {
        return Err(ServeError::Forbidden(from));
    }

    let coding = encoding::negotiate(&ctx.headers);
    headers.insert(CONTENT_TYPE, HeaderValue::from_static(content_type));
    match coding.header_value() {
        Some(value) => {
            headers.insert(CONTENT_ENCODING, value);
            headers.insert(VARY, HeaderValue::from_static("Accept-Encoding"));
        }
        None => {
            headers.insert(CONTENT_LENGTH, HeaderValue::from(file.size));
        }
    }

    let body = if ctx.is_head() {
        empty_body()
    } else {
        let handle = tokio::fs::File::open(&file.path).await.map_err(open_error)?;
        let source = ReaderStream::new(handle);
        match coding.encoder() {
            Some(encoder) => stream_body(encoding::compress_stream(source, encoder)),
            None => stream_body(source),
        }
    };

    Ok((Terminal::FileSent, with_headers(Response::new(body), headers)))
}

/// A file that stats fine but cannot be opened is treated as absent
fn open_error(err: io::Error) -> ServeError {
    match err.kind() {
        io::ErrorKind::NotFound | io::ErrorKind::PermissionDenied => ServeError::NotFound(err),
        _ => ServeError::Io(err),
    }
}

fn stream_body<S>(stream: S) -> ResponseBody
where
    S: Stream<Item = io::Result<Bytes>> + Send + 'static,
{
    StreamBody::new(stream.map_ok(Frame::data)).boxed_unsync()
}

fn access_entry<B>(req: &Request<B>, peer: Option<SocketAddr>) -> AccessLogEntry {
    let header = |name: HeaderName| {
        req.headers()
            .get(name)
            .and_then(|v| v.to_str().ok())
            .map(ToString::to_string)
    };

    let mut entry = AccessLogEntry::new(req.method().to_string(), req.uri().path().to_string());
    if let Some(peer) = peer {
        entry.remote_addr = peer.ip().to_string();
    }
    entry.query = req.uri().query().map(ToString::to_string);
    entry.http_version = http_version(req.version()).to_string();
    entry.referer = header(REFERER);
    entry.user_agent = header(USER_AGENT);
    entry
}

fn http_version(version: Version) -> &'static str {
    match version {
        Version::HTTP_09 => "0.9",
        Version::HTTP_10 => "1.0",
        Version::HTTP_2 => "2",
        Version::HTTP_3 => "3",
        _ => "1.1",
    }
}
