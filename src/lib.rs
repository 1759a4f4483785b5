//! Static content server
//!
//! Serves a directory tree over HTTP/1.1 with conditional caching, streamed
//! compression, hotlink protection, CORS and an optional mock responder.

pub mod config;
pub mod error;
pub mod handler;
pub mod http;
pub mod logger;
pub mod mock;
pub mod server;
