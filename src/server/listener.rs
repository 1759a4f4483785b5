// Listener module
// Creates TCP listeners through socket2 and walks up the port range when taken

use crate::logger::Logger;
use socket2::{Domain, Protocol, Socket, Type};
use std::io;
use std::net::SocketAddr;
use tokio::net::TcpListener;

/// Create a `TcpListener` with `SO_REUSEADDR` enabled.
///
/// Must be called from within a Tokio runtime.
pub fn create_listener(addr: SocketAddr) -> io::Result<TcpListener> {
    let domain = if addr.is_ipv4() {
        Domain::IPV4
    } else {
        Domain::IPV6
    };

    let socket = Socket::new(domain, Type::STREAM, Some(Protocol::TCP))?;

    // Allows rebinding a port still in TIME_WAIT after a restart
    socket.set_reuse_address(true)?;
    socket.set_nonblocking(true)?;
    socket.bind(&addr.into())?;
    socket.listen(128)?;

    let std_listener: std::net::TcpListener = socket.into();
    TcpListener::from_std(std_listener)
}

/// Bind `addr`, trying up to `retries` following ports while the current one
/// is in use. Returns the listener and the address actually bound.
pub fn bind_with_retry(
    addr: SocketAddr,
    retries: u16,
    logger: &Logger,
) -> io::Result<(TcpListener, SocketAddr)> {
    let mut candidate = addr;
    let mut attempts = 0;

    loop {
        match create_listener(candidate) {
            Ok(listener) => {
                let bound = listener.local_addr()?;
                return Ok((listener, bound));
            }
            Err(e) if e.kind() == io::ErrorKind::AddrInUse && attempts < retries => {
                logger.log_port_in_use(candidate.port());
                let Some(next) = candidate.port().checked_add(1) else {
                    return Err(e);
                };
                candidate.set_port(next);
                attempts += 1;
            }
            Err(e) => return Err(e),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::{Arc, Mutex};

    #[tokio::test]
    async fn test_bind_ephemeral() {
        let lines = Arc::new(Mutex::new(Vec::new()));
        let logger = Logger::buffered(Arc::clone(&lines));
        let (_listener, bound) =
            bind_with_retry("127.0.0.1:0".parse().unwrap(), 0, &logger).unwrap();
        assert_ne!(bound.port(), 0);
        assert!(lines.lock().unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_port_in_use_moves_on() {
        let taken = std::net::TcpListener::bind("127.0.0.1:0").unwrap();
        let taken_addr = taken.local_addr().unwrap();

        let lines = Arc::new(Mutex::new(Vec::new()));
        let logger = Logger::buffered(Arc::clone(&lines));
        let (_listener, bound) = bind_with_retry(taken_addr, 20, &logger).unwrap();

        assert_ne!(bound.port(), taken_addr.port());
        assert!(lines
            .lock()
            .unwrap()
            .iter()
            .any(|l| l.contains(&taken_addr.port().to_string())));
    }

    #[tokio::test]
    async fn test_no_retries_left() {
        let taken = std::net::TcpListener::bind("127.0.0.1:0").unwrap();
        let logger = Logger::buffered(Arc::new(Mutex::new(Vec::new())));
        let err = bind_with_retry(taken.local_addr().unwrap(), 0, &logger).unwrap_err();
        assert_eq!(err.kind(), io::ErrorKind::AddrInUse);
    }
}
