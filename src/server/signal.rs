// Signal handling module
//
// Supported signals:
// - SIGTERM: Graceful shutdown
// - SIGINT:  Graceful shutdown (Ctrl+C)

use std::sync::Arc;
use tokio::sync::Notify;

use crate::logger::Logger;

/// Start the signal listener (Unix)
///
/// Notifies `shutdown` once on the first SIGTERM or SIGINT. The permit is
/// stored, so the accept loop sees it even if it is busy at that moment.
#[cfg(unix)]
pub fn start_signal_handler(shutdown: Arc<Notify>, logger: Arc<Logger>) {
    use tokio::signal::unix::{signal, SignalKind};

    tokio::spawn(async move {
        let (mut sigterm, mut sigint) =
            match (signal(SignalKind::terminate()), signal(SignalKind::interrupt())) {
                (Ok(term), Ok(int)) => (term, int),
                (Err(e), _) | (_, Err(e)) => {
                    logger.error(&format!("Failed to register signal handlers: {e}"));
                    return;
                }
            };

        logger.debug(&format!("[SIGNAL] Handlers registered, pid {}", std::process::id()));

        let name = tokio::select! {
            _ = sigterm.recv() => "SIGTERM",
            _ = sigint.recv() => "SIGINT (Ctrl+C)",
        };
        logger.info(&format!("[SIGNAL] {name} received, initiating graceful shutdown..."));
        shutdown.notify_one();
    });
}

/// Fallback for other platforms - only handles Ctrl+C
#[cfg(not(unix))]
pub fn start_signal_handler(shutdown: Arc<Notify>, logger: Arc<Logger>) {
    tokio::spawn(async move {
        if let Ok(()) = tokio::signal::ctrl_c().await {
            logger.info("[SIGNAL] Ctrl+C received, initiating graceful shutdown...");
            shutdown.notify_one();
        }
    });
}
