//! Log writer module
//!
//! Thread-safe log writing to files or stdout/stderr.

use std::fs::{File, OpenOptions};
use std::io::{self, Write};
use std::path::Path;
use std::sync::{Arc, Mutex};

/// Log output target
#[derive(Clone)]
enum LogTarget {
    Stdout,
    Stderr,
    File(Arc<Mutex<File>>),
    /// In-memory buffer, used by tests to inspect output
    Buffer(Arc<Mutex<Vec<String>>>),
}

/// Thread-safe log writer with separate access and error targets
#[derive(Clone)]
pub struct LogWriter {
    access: LogTarget,
    error: LogTarget,
}

impl LogWriter {
    /// Create a new log writer with optional file paths
    pub fn new(access_log_file: Option<&str>, error_log_file: Option<&str>) -> io::Result<Self> {
        let access = match access_log_file {
            Some(path) => LogTarget::File(Arc::new(Mutex::new(open_log_file(path)?))),
            None => LogTarget::Stdout,
        };

        let error = match error_log_file {
            Some(path) => LogTarget::File(Arc::new(Mutex::new(open_log_file(path)?))),
            None => LogTarget::Stderr,
        };

        Ok(Self { access, error })
    }

    /// Writer that collects every line into the shared buffer
    pub fn buffered(lines: Arc<Mutex<Vec<String>>>) -> Self {
        Self {
            access: LogTarget::Buffer(Arc::clone(&lines)),
            error: LogTarget::Buffer(lines),
        }
    }

    pub fn write_access(&self, message: &str) {
        write_to_target(&self.access, message);
    }

    pub fn write_error(&self, message: &str) {
        write_to_target(&self.error, message);
    }
}

/// Open or create a log file for appending
fn open_log_file(path: &str) -> io::Result<File> {
    // Create parent directories if they don't exist
    if let Some(parent) = Path::new(path).parent() {
        if !parent.as_os_str().is_empty() {
            std::fs::create_dir_all(parent)?;
        }
    }

    OpenOptions::new().create(true).append(true).open(path)
}

fn write_to_target(target: &LogTarget, message: &str) {
    match target {
        LogTarget::Stdout => println!("{message}"),
        LogTarget::Stderr => eprintln!("{message}"),
        LogTarget::File(file) => {
            if let Ok(mut f) = file.lock() {
                let _ = writeln!(f, "{message}");
            }
        }
        LogTarget::Buffer(lines) => {
            if let Ok(mut lines) = lines.lock() {
                lines.push(message.to_string());
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_file_target_appends() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("logs/access.log");
        let path_str = path.to_str().unwrap();

        let writer = LogWriter::new(Some(path_str), None).unwrap();
        writer.write_access("first");
        writer.write_access("second");

        let content = std::fs::read_to_string(&path).unwrap();
        assert_eq!(content, "first\nsecond\n");
    }

    #[test]
    fn test_buffer_target() {
        let lines = Arc::new(Mutex::new(Vec::new()));
        let writer = LogWriter::buffered(Arc::clone(&lines));
        writer.write_access("a");
        writer.write_error("b");
        assert_eq!(*lines.lock().unwrap(), vec!["a", "b"]);
    }
}
