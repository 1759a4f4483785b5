// Server module entry point
// Listener setup, connection handling, the accept loop and shutdown signals

pub mod connection;
pub mod listener;
pub mod signal;

// `loop` is a keyword, so the module is named server_loop
#[path = "loop.rs"]
pub mod server_loop;

pub use connection::{ConnectionContext, ConnectionLimits};
pub use listener::{bind_with_retry, create_listener};
pub use server_loop::start_server_loop;
