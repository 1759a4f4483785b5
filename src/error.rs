//! Request error taxonomy
//!
//! Every pipeline stage reports failures as a `ServeError`; only the pipeline
//! turns them into a status code and a fixed, detail-free body.

use hyper::StatusCode;
use std::io;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum ServeError {
    #[error("malformed request URL: {0}")]
    MalformedUrl(String),

    #[error("target not found: {0}")]
    NotFound(#[source] io::Error),

    #[error("hotlinking denied for referer {0}")]
    Forbidden(String),

    #[error("bad mock payload: {0}")]
    BadMockPayload(String),

    #[error("mock request body exceeds {0} bytes")]
    PayloadTooLarge(u64),

    #[error("mock handler failed: {0}")]
    UpstreamFailure(String),

    #[error("I/O error: {0}")]
    Io(#[from] io::Error),
}

impl ServeError {
    pub const fn status(&self) -> StatusCode {
        match self {
            Self::NotFound(_) => StatusCode::NOT_FOUND,
            Self::Forbidden(_) => StatusCode::FORBIDDEN,
            Self::BadMockPayload(_) => StatusCode::BAD_REQUEST,
            Self::PayloadTooLarge(_) => StatusCode::PAYLOAD_TOO_LARGE,
            Self::MalformedUrl(_) | Self::UpstreamFailure(_) | Self::Io(_) => {
                StatusCode::INTERNAL_SERVER_ERROR
            }
        }
    }

    /// Client-facing body, never carries internal detail
    pub const fn public_message(&self) -> &'static str {
        match self {
            Self::NotFound(_) => "Not Found",
            Self::Forbidden(_) => "Forbidden",
            Self::BadMockPayload(_) => "Bad Request",
            Self::PayloadTooLarge(_) => "Payload Too Large",
            Self::MalformedUrl(_) | Self::UpstreamFailure(_) | Self::Io(_) => {
                "Internal Server Error"
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_status_mapping() {
        let not_found = ServeError::NotFound(io::Error::from(io::ErrorKind::NotFound));
        assert_eq!(not_found.status(), StatusCode::NOT_FOUND);
        assert_eq!(not_found.public_message(), "Not Found");

        let forbidden = ServeError::Forbidden("http://evil.test/".into());
        assert_eq!(forbidden.status(), StatusCode::FORBIDDEN);
        assert_eq!(forbidden.public_message(), "Forbidden");

        let upstream = ServeError::UpstreamFailure("/srv/secret/mock.rs blew up".into());
        assert_eq!(upstream.status(), StatusCode::INTERNAL_SERVER_ERROR);
        assert!(!upstream.public_message().contains("secret"));
    }
}
