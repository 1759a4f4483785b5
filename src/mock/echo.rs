//! Built-in echo handler
//!
//! Answers `<prefix>user`: `GET` returns the query as JSON, `POST` returns
//! the body object merged with the query (query keys win).

use super::{MockBody, MockError, MockHandler, MockRequest, ResponseSink};
use hyper::Method;
use serde_json::{Map, Value};

pub struct EchoMock {
    path: String,
}

impl EchoMock {
    pub fn new(prefix: &str) -> Self {
        Self {
            path: format!("{prefix}user"),
        }
    }
}

impl MockHandler for EchoMock {
    fn handle(
        &self,
        pathname: &str,
        request: &MockRequest,
        response: &mut ResponseSink,
    ) -> Result<bool, MockError> {
        if pathname != self.path {
            return Ok(false);
        }

        let mut merged = match request.method {
            Method::GET | Method::HEAD => Map::new(),
            Method::POST => body_object(&request.body),
            _ => return Ok(false),
        };
        for (key, value) in &request.query {
            merged.insert(key.clone(), Value::String(value.clone()));
        }

        response.json(&Value::Object(merged))?;
        Ok(true)
    }
}

fn body_object(body: &MockBody) -> Map<String, Value> {
    match body {
        MockBody::Json(Value::Object(map)) => map.clone(),
        MockBody::Form(fields) => fields
            .iter()
            .map(|(k, v)| (k.clone(), Value::String(v.clone())))
            .collect(),
        MockBody::Json(_) | MockBody::Raw(_) => Map::new(),
    }
}
