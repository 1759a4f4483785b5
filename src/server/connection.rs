// Connection handling module
// Accepts a single TCP connection and serves it on the local task set

use std::convert::Infallible;
use std::net::SocketAddr;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

use hyper::server::conn::http1;
use hyper::service::service_fn;
use hyper_util::rt::{TokioIo, TokioTimer};
use tokio::net::TcpStream;

use crate::config::PerformanceConfig;
use crate::handler::RequestPipeline;
use crate::logger::Logger;

/// Per-connection limits taken from the `[performance]` section
#[derive(Debug, Clone, Copy)]
pub struct ConnectionLimits {
    pub keep_alive: bool,
    /// Deadline for receiving a request's headers, `max(read_timeout, write_timeout)`.
    /// Response bodies are not bounded by it.
    pub timeout: Duration,
    pub max_connections: Option<usize>,
}

impl ConnectionLimits {
    pub fn from_config(config: &PerformanceConfig) -> Self {
        Self {
            keep_alive: config.keep_alive_timeout > 0,
            timeout: Duration::from_secs(config.read_timeout.max(config.write_timeout)),
            max_connections: config
                .max_connections
                .map(|max| usize::try_from(max).unwrap_or(usize::MAX)),
        }
    }
}

/// Everything a connection task needs, shared by the accept loop
pub struct ConnectionContext {
    pub pipeline: Arc<RequestPipeline>,
    pub logger: Arc<Logger>,
    pub limits: ConnectionLimits,
    pub active: Arc<AtomicUsize>,
}

/// Accept a connection, enforcing the connection limit.
///
/// Returns `false` when the connection was rejected and dropped.
pub fn accept_connection(stream: TcpStream, peer_addr: SocketAddr, ctx: &ConnectionContext) -> bool {
    // Increment first, then check, so two accepts cannot both slip under the limit
    let prev_count = ctx.active.fetch_add(1, Ordering::SeqCst);

    if let Some(max_conn) = ctx.limits.max_connections {
        if prev_count >= max_conn {
            ctx.active.fetch_sub(1, Ordering::SeqCst);
            ctx.logger.warn(&format!(
                "Max connections reached: {prev_count}/{max_conn}. Connection from {peer_addr} rejected."
            ));
            drop(stream);
            return false;
        }
    }

    ctx.logger.log_connection_accepted(&peer_addr);
    handle_connection(stream, peer_addr, ctx);
    true
}

/// Serve one connection in a `spawn_local` task with HTTP/1.1 keep-alive.
/// Only the wait for request headers is timed; slow readers of a large body
/// are paced by back-pressure instead.
fn handle_connection(stream: TcpStream, peer_addr: SocketAddr, ctx: &ConnectionContext) {
    let pipeline = Arc::clone(&ctx.pipeline);
    let logger = Arc::clone(&ctx.logger);
    let active = Arc::clone(&ctx.active);
    let limits = ctx.limits;

    tokio::task::spawn_local(async move {
        let io = TokioIo::new(stream);

        let mut builder = http1::Builder::new();
        builder
            .keep_alive(limits.keep_alive)
            .timer(TokioTimer::new())
            .header_read_timeout(limits.timeout);

        let conn = builder.serve_connection(
            io,
            service_fn(move |req| {
                let pipeline = Arc::clone(&pipeline);
                async move { Ok::<_, Infallible>(pipeline.handle(req, Some(peer_addr)).await) }
            }),
        );

        match conn.await {
            Ok(()) => {}
            Err(err) if err.is_timeout() => logger.warn(&format!(
                "Connection from {peer_addr} sent no request headers within {} seconds",
                limits.timeout.as_secs()
            )),
            Err(err) => logger.log_connection_error(&err),
        }

        active.fetch_sub(1, Ordering::SeqCst);
    });
}
