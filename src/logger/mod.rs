//! Logger module
//!
//! Provides logging utilities for the HTTP server including:
//! - Server lifecycle logging
//! - Access logging with multiple formats
//! - Leveled error, warning and debug logging
//!
//! A `Logger` is an ordinary value handed to whoever needs it; there is no
//! process-wide logger state.

mod format;
pub mod writer;

pub use format::AccessLogEntry;

use crate::config::{Config, LoggingConfig};
use std::net::SocketAddr;
use std::path::Path;
use std::sync::{Arc, Mutex};
use writer::LogWriter;

/// Log severity, ordered from most to least verbose
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub enum LogLevel {
    Debug,
    Info,
    Warn,
    Error,
}

impl LogLevel {
    /// Parse a level name, falling back to `Info` for unknown values
    pub fn parse(level: &str) -> Self {
        match level.to_ascii_lowercase().as_str() {
            "debug" | "trace" => Self::Debug,
            "warn" | "warning" => Self::Warn,
            "error" => Self::Error,
            _ => Self::Info,
        }
    }
}

pub struct Logger {
    writer: LogWriter,
    level: LogLevel,
    access_log: bool,
    access_log_format: String,
}

impl Logger {
    /// Build a logger from the `[logging]` configuration section
    pub fn from_config(config: &LoggingConfig) -> std::io::Result<Self> {
        let writer = LogWriter::new(
            config.access_log_file.as_deref(),
            config.error_log_file.as_deref(),
        )?;
        Ok(Self {
            writer,
            level: LogLevel::parse(&config.level),
            access_log: config.access_log,
            access_log_format: config.access_log_format.clone(),
        })
    }

    /// Logger that records every line in memory at debug level
    pub fn buffered(lines: Arc<Mutex<Vec<String>>>) -> Self {
        Self {
            writer: LogWriter::buffered(lines),
            level: LogLevel::Debug,
            access_log: true,
            access_log_format: "combined".to_string(),
        }
    }

    pub fn enabled(&self, level: LogLevel) -> bool {
        level >= self.level
    }

    pub fn debug(&self, message: &str) {
        if self.enabled(LogLevel::Debug) {
            self.writer.write_error(&format!("[DEBUG] {message}"));
        }
    }

    pub fn info(&self, message: &str) {
        if self.enabled(LogLevel::Info) {
            self.writer.write_access(message);
        }
    }

    pub fn warn(&self, message: &str) {
        if self.enabled(LogLevel::Warn) {
            self.writer.write_error(&format!("[WARN] {message}"));
        }
    }

    pub fn error(&self, message: &str) {
        self.writer.write_error(&format!("[ERROR] {message}"));
    }

    /// Log formatted access log entry
    pub fn log_access(&self, entry: &AccessLogEntry) {
        if self.access_log {
            self.writer.write_access(&entry.format(&self.access_log_format));
        }
    }

    pub fn log_server_start(&self, addr: &SocketAddr, root: &Path, config: &Config) {
        let dir_name = root
            .file_name()
            .map_or_else(|| root.display().to_string(), |n| n.to_string_lossy().into_owned());
        self.info("======================================");
        self.info(&format!("Starting up static server, serving ./{dir_name}"));
        self.info(&format!("Root directory: {}", root.display()));
        self.info("Available on:");
        self.info(&format!("  http://{addr}"));
        self.info(&format!("Log level: {}", config.logging.level));
        if let Some(workers) = config.server.workers {
            self.info(&format!("Worker threads: {workers}"));
        }
        if let Some(ref path) = config.logging.access_log_file {
            self.info(&format!("Access log: {path}"));
        }
        if let Some(ref path) = config.logging.error_log_file {
            self.info(&format!("Error log: {path}"));
        }
        if config.mock.echo {
            self.info(&format!("Echo mock mounted at {}", config.mock.prefix));
        }
        self.info("Hit CTRL-C to stop the server");
        self.info("======================================\n");
    }

    pub fn log_port_in_use(&self, port: u16) {
        self.warn(&format!("Port {port} is already in use. Trying another port..."));
    }

    pub fn log_connection_accepted(&self, peer_addr: &SocketAddr) {
        self.debug(&format!("[Connection] Accepted from: {peer_addr}"));
    }

    pub fn log_connection_error(&self, err: &impl std::fmt::Debug) {
        self.error(&format!("Failed to serve connection: {err:?}"));
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn logger_at(level: &str) -> (Logger, Arc<Mutex<Vec<String>>>) {
        let lines = Arc::new(Mutex::new(Vec::new()));
        let mut logger = Logger::buffered(Arc::clone(&lines));
        logger.level = LogLevel::parse(level);
        (logger, lines)
    }

    #[test]
    fn test_level_parse() {
        assert_eq!(LogLevel::parse("DEBUG"), LogLevel::Debug);
        assert_eq!(LogLevel::parse("warning"), LogLevel::Warn);
        assert_eq!(LogLevel::parse("error"), LogLevel::Error);
        assert_eq!(LogLevel::parse("bogus"), LogLevel::Info);
    }

    #[test]
    fn test_level_filtering() {
        let (logger, lines) = logger_at("warn");
        logger.debug("hidden");
        logger.info("hidden too");
        logger.warn("shown");
        logger.error("always");
        assert_eq!(*lines.lock().unwrap(), vec!["[WARN] shown", "[ERROR] always"]);
    }

    #[test]
    fn test_access_log_toggle() {
        let (mut logger, lines) = logger_at("info");
        logger.access_log = false;
        logger.log_access(&AccessLogEntry::new("GET".into(), "/".into()));
        assert!(lines.lock().unwrap().is_empty());
    }
}
