//! Mock dispatch stage
//!
//! Hands requests under the mock prefix to the registered handler, reading
//! and parsing the body only when a handler is actually going to see it.

use super::{EchoMock, MockBody, MockHandler, MockRequest, ResponseSink};
use crate::config::MockConfig;
use crate::error::ServeError;
use crate::handler::context::{BoxError, RequestContext, StageOutcome};
use hyper::body::{Body, Bytes};
use hyper::header::HeaderMap;
use std::collections::BTreeMap;
use std::panic::{catch_unwind, AssertUnwindSafe};
use std::sync::Arc;

const JSON: &str = "application/json";
const FORM: &str = "application/x-www-form-urlencoded";

pub struct MockDispatcher {
    prefix: String,
    max_body_size: u64,
    handler: Option<Arc<dyn MockHandler>>,
}

impl MockDispatcher {
    pub fn new(config: &MockConfig, handler: Option<Arc<dyn MockHandler>>) -> Self {
        Self {
            prefix: config.prefix.clone(),
            max_body_size: config.max_body_size,
            handler,
        }
    }

    /// Build the dispatcher, registering the echo handler when enabled
    pub fn from_config(config: &MockConfig) -> Self {
        let handler: Option<Arc<dyn MockHandler>> = if config.echo {
            Some(Arc::new(EchoMock::new(&config.prefix)))
        } else {
            None
        };
        Self::new(config, handler)
    }

    pub fn matches(&self, path: &str) -> bool {
        self.handler.is_some() && path.starts_with(&self.prefix)
    }

    /// Offer the request to the mock handler.
    ///
    /// `headers` are the response headers earlier stages already applied;
    /// they seed the handler's `ResponseSink`.
    pub async fn try_dispatch<B>(
        &self,
        ctx: &mut RequestContext<B>,
        headers: HeaderMap,
    ) -> Result<StageOutcome, ServeError>
    where
        B: Body<Data = Bytes>,
        B::Error: Into<BoxError>,
    {
        let Some(handler) = self.handler.as_ref().filter(|_| self.matches(&ctx.path)) else {
            return Ok(StageOutcome::NotHandled);
        };

        let body = ctx.parsed_body(self.max_body_size).await?.clone();
        let request = MockRequest {
            method: ctx.method.clone(),
            headers: ctx.headers.clone(),
            query: parse_query(ctx.query.as_deref()),
            body,
        };
        let mut sink = ResponseSink::new(headers);

        let result = catch_unwind(AssertUnwindSafe(|| {
            handler.handle(&ctx.path, &request, &mut sink)
        }));
        match result {
            Ok(Ok(true)) => Ok(StageOutcome::Handled(sink.into_response(ctx.is_head()))),
            Ok(Ok(false)) => Ok(StageOutcome::NotHandled),
            Ok(Err(e)) => Err(ServeError::UpstreamFailure(e.to_string())),
            Err(_) => Err(ServeError::UpstreamFailure(format!(
                "handler panicked on {}",
                ctx.path
            ))),
        }
    }
}

/// Flatten a query string into a map; repeated keys keep the last value
pub fn parse_query(query: Option<&str>) -> BTreeMap<String, String> {
    query
        .and_then(|q| serde_urlencoded::from_str::<Vec<(String, String)>>(q).ok())
        .unwrap_or_default()
        .into_iter()
        .collect()
}

/// Parse a request body according to its media type
pub fn parse_body(content_type: Option<&str>, raw: &[u8]) -> Result<MockBody, ServeError> {
    let essence = content_type
        .and_then(|ct| ct.split(';').next())
        .map(|ct| ct.trim().to_ascii_lowercase())
        .unwrap_or_default();

    match essence.as_str() {
        JSON if raw.iter().all(u8::is_ascii_whitespace) => {
            Ok(MockBody::Json(serde_json::Value::Object(serde_json::Map::new())))
        }
        JSON => serde_json::from_slice(raw)
            .map(MockBody::Json)
            .map_err(|e| ServeError::BadMockPayload(e.to_string())),
        FORM => serde_urlencoded::from_bytes::<Vec<(String, String)>>(raw)
            .map(|pairs| MockBody::Form(pairs.into_iter().collect()))
            .map_err(|e| ServeError::BadMockPayload(e.to_string())),
        _ => Ok(MockBody::Raw(String::from_utf8_lossy(raw).into_owned())),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::mock::MockError;
    use http_body_util::{BodyExt, Full};
    use hyper::header::CONTENT_TYPE;
    use hyper::{Method, Request, StatusCode};
    use serde_json::json;

    struct Failing;

    impl MockHandler for Failing {
        fn handle(&self, _: &str, _: &MockRequest, _: &mut ResponseSink) -> Result<bool, MockError> {
            Err(MockError::Handler("database offline".into()))
        }
    }

    struct Panicking;

    impl MockHandler for Panicking {
        fn handle(&self, _: &str, _: &MockRequest, _: &mut ResponseSink) -> Result<bool, MockError> {
            panic!("boom")
        }
    }

    struct Teapot;

    impl MockHandler for Teapot {
        fn handle(&self, path: &str, req: &MockRequest, res: &mut ResponseSink) -> Result<bool, MockError> {
            if path != "/mock/tea" {
                return Ok(false);
            }
            res.set_status(StatusCode::IM_A_TEAPOT);
            res.set_header("x-method", req.method.as_str())?;
            res.end(b"short and stout")?;
            Ok(true)
        }
    }

    fn config() -> MockConfig {
        MockConfig::default()
    }

    fn ctx(method: Method, uri: &str, body: &'static str) -> RequestContext<Full<Bytes>> {
        let req = Request::builder()
            .method(method)
            .uri(uri)
            .header(CONTENT_TYPE, "application/json")
            .body(Full::new(Bytes::from_static(body.as_bytes())))
            .unwrap();
        RequestContext::from_request(req).unwrap()
    }

    #[test]
    fn test_parse_query_last_wins() {
        let q = parse_query(Some("a=1&b=two%20words&a=3"));
        assert_eq!(q.get("a").map(String::as_str), Some("3"));
        assert_eq!(q.get("b").map(String::as_str), Some("two words"));
        assert!(parse_query(None).is_empty());
    }

    #[test]
    fn test_parse_body_by_media_type() {
        assert_eq!(
            parse_body(Some("Application/JSON; charset=utf-8"), br#"{"x":[1]}"#).unwrap(),
            MockBody::Json(json!({"x": [1]}))
        );
        assert_eq!(
            parse_body(Some(JSON), b"").unwrap(),
            MockBody::Json(json!({}))
        );
        match parse_body(Some(FORM), b"k=v&k=w&n=1").unwrap() {
            MockBody::Form(map) => {
                assert_eq!(map["k"], "w");
                assert_eq!(map["n"], "1");
            }
            other => panic!("Expected form body, got {other:?}"),
        }
        assert_eq!(
            parse_body(Some("text/plain"), b"hi").unwrap(),
            MockBody::Raw("hi".into())
        );
        assert_eq!(parse_body(None, b"hi").unwrap(), MockBody::Raw("hi".into()));
    }

    #[test]
    fn test_empty_body_keeps_media_type() {
        assert_eq!(parse_body(Some(JSON), b"  \n").unwrap(), MockBody::Json(json!({})));
        assert_eq!(parse_body(Some(FORM), b"").unwrap(), MockBody::Form(BTreeMap::new()));
        assert_eq!(parse_body(Some("text/plain"), b"").unwrap(), MockBody::Raw(String::new()));
    }

    #[test]
    fn test_malformed_json_is_bad_payload() {
        assert!(matches!(
            parse_body(Some(JSON), b"{not json"),
            Err(ServeError::BadMockPayload(_))
        ));
    }

    #[test]
    fn test_matches_needs_handler_and_prefix() {
        assert!(!MockDispatcher::new(&config(), None).matches("/mock/user"));
        let dispatcher = MockDispatcher::new(&config(), Some(Arc::new(Teapot)));
        assert!(dispatcher.matches("/mock/tea"));
        assert!(!dispatcher.matches("/static/tea"));
    }

    #[tokio::test]
    async fn test_unregistered_falls_through() {
        let dispatcher = MockDispatcher::new(&config(), None);
        let mut ctx = ctx(Method::POST, "/mock/user", "{broken");
        assert!(matches!(
            dispatcher.try_dispatch(&mut ctx, HeaderMap::new()).await,
            Ok(StageOutcome::NotHandled)
        ));
    }

    #[tokio::test]
    async fn test_outside_prefix_falls_through() {
        let dispatcher = MockDispatcher::new(&config(), Some(Arc::new(Teapot)));
        let mut ctx = ctx(Method::GET, "/static/tea", "");
        assert!(matches!(
            dispatcher.try_dispatch(&mut ctx, HeaderMap::new()).await,
            Ok(StageOutcome::NotHandled)
        ));
    }

    #[tokio::test]
    async fn test_handled_response_keeps_stage_headers() {
        let dispatcher = MockDispatcher::new(&config(), Some(Arc::new(Teapot)));
        let mut stage = HeaderMap::new();
        stage.insert("access-control-allow-origin", "http://a.test".parse().unwrap());
        let mut ctx = ctx(Method::PUT, "/mock/tea", "");

        let Ok(StageOutcome::Handled(response)) = dispatcher.try_dispatch(&mut ctx, stage).await
        else {
            panic!("Expected handled response");
        };
        assert_eq!(response.status(), StatusCode::IM_A_TEAPOT);
        assert_eq!(response.headers()["x-method"], "PUT");
        assert_eq!(response.headers()["access-control-allow-origin"], "http://a.test");
        let body = response.into_body().collect().await.unwrap().to_bytes();
        assert_eq!(&body[..], b"short and stout");
    }

    #[tokio::test]
    async fn test_handler_error_is_upstream_failure() {
        let dispatcher = MockDispatcher::new(&config(), Some(Arc::new(Failing)));
        let mut ctx = ctx(Method::GET, "/mock/anything", "");
        assert!(matches!(
            dispatcher.try_dispatch(&mut ctx, HeaderMap::new()).await,
            Err(ServeError::UpstreamFailure(msg)) if msg.contains("database offline")
        ));
    }

    #[tokio::test]
    async fn test_handler_panic_is_upstream_failure() {
        let dispatcher = MockDispatcher::new(&config(), Some(Arc::new(Panicking)));
        let mut ctx = ctx(Method::GET, "/mock/anything", "");
        assert!(matches!(
            dispatcher.try_dispatch(&mut ctx, HeaderMap::new()).await,
            Err(ServeError::UpstreamFailure(_))
        ));
    }

    #[tokio::test]
    async fn test_oversized_body() {
        let mut small = config();
        small.max_body_size = 8;
        let dispatcher = MockDispatcher::new(&small, Some(Arc::new(Teapot)));
        let mut ctx = ctx(Method::POST, "/mock/tea", r#"{"long":"payload"}"#);
        assert!(matches!(
            dispatcher.try_dispatch(&mut ctx, HeaderMap::new()).await,
            Err(ServeError::PayloadTooLarge(8))
        ));
    }
}
