// Server loop module
// Accepts connections until a shutdown is requested

use std::sync::Arc;
use tokio::net::TcpListener;
use tokio::sync::Notify;

use super::connection::{accept_connection, ConnectionContext};

/// Accept loop; returns once `shutdown` is notified.
///
/// Must run inside a `LocalSet`, connections are served with `spawn_local`.
#[allow(clippy::ignored_unit_patterns)]
pub async fn start_server_loop(
    listener: TcpListener,
    ctx: ConnectionContext,
    shutdown: Arc<Notify>,
) -> std::io::Result<()> {
    loop {
        tokio::select! {
            accept_result = listener.accept() => {
                match accept_result {
                    Ok((stream, peer_addr)) => {
                        accept_connection(stream, peer_addr, &ctx);
                    }
                    Err(e) => ctx.logger.error(&format!("Failed to accept connection: {e}")),
                }
            }

            _ = shutdown.notified() => {
                ctx.logger.info("[SHUTDOWN] No longer accepting connections");
                return Ok(());
            }
        }
    }
}
