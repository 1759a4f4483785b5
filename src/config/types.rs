// Configuration types module
// Defines all configuration-related data structures

use serde::Deserialize;
use std::path::PathBuf;

/// Main configuration structure
#[derive(Debug, Deserialize, Clone)]
pub struct Config {
    pub server: ServerConfig,
    pub logging: LoggingConfig,
    pub performance: PerformanceConfig,
    pub mock: MockConfig,
}

/// Server configuration
#[derive(Debug, Deserialize, Clone)]
pub struct ServerConfig {
    pub host: String,
    pub port: u16,
    /// Directory whose contents are served
    pub root: PathBuf,
    pub workers: Option<usize>,
    /// How many higher ports to try when the configured one is taken
    pub port_retries: u16,
}

/// Logging configuration
#[derive(Debug, Deserialize, Clone)]
pub struct LoggingConfig {
    /// Minimum level: debug, info, warn or error
    pub level: String,
    pub access_log: bool,
    /// Access log format (combined, common, json, or custom pattern)
    #[serde(default = "default_access_log_format")]
    pub access_log_format: String,
    /// Access log file path (optional, stdout if not set)
    #[serde(default)]
    pub access_log_file: Option<String>,
    /// Error log file path (optional, stderr if not set)
    #[serde(default)]
    pub error_log_file: Option<String>,
}

#[allow(clippy::missing_const_for_fn)]
fn default_access_log_format() -> String {
    "combined".to_string()
}

/// Performance configuration
#[derive(Debug, Deserialize, Clone)]
pub struct PerformanceConfig {
    pub keep_alive_timeout: u64,
    pub read_timeout: u64,
    pub write_timeout: u64,
    pub max_connections: Option<u64>,
}

/// Mock responder configuration
#[derive(Debug, Deserialize, Clone)]
pub struct MockConfig {
    /// Path prefix routed to the mock handler, e.g. `/mock/`
    pub prefix: String,
    /// Register the built-in echo handler
    pub echo: bool,
    /// Upper bound for buffered mock request bodies
    pub max_body_size: u64,
}

impl Default for MockConfig {
    fn default() -> Self {
        Self {
            prefix: "/mock/".to_string(),
            echo: false,
            max_body_size: 1_048_576,
        }
    }
}
