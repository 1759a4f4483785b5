//! Directory listing module
//!
//! Collects one `DirectoryEntry` per child (one stat each) and renders them
//! with a pure HTML template.

use super::resolver::FileDescriptor;
use chrono::{DateTime, Local};
use percent_encoding::{utf8_percent_encode, AsciiSet, CONTROLS};
use std::fmt::Write as _;
use std::io;
use std::path::Path;
use tokio::fs;

/// Characters escaped inside a path segment of a listing link
const SEGMENT: &AsciiSet = &CONTROLS
    .add(b' ')
    .add(b'"')
    .add(b'#')
    .add(b'%')
    .add(b'<')
    .add(b'>')
    .add(b'?')
    .add(b'`')
    .add(b'{')
    .add(b'}')
    .add(b'/');

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DirectoryEntry {
    pub name: String,
    /// Link relative to the server root, percent-encoded
    pub href: String,
    pub is_file: bool,
    /// `drwxr-xr-x` style
    pub permissions: String,
    /// Human readable, empty for directories and empty files
    pub size: String,
    /// `YYYY-MM-DD HH:MM:SS`, local time
    pub modified: String,
}

/// Stat every child of `dir` and build the listing rows, sorted by name
pub async fn read_entries(dir: &Path, url_path: &str) -> io::Result<Vec<DirectoryEntry>> {
    let mut read_dir = fs::read_dir(dir).await?;
    let mut entries = Vec::new();

    while let Some(child) = read_dir.next_entry().await? {
        let name = child.file_name().to_string_lossy().into_owned();
        let stat = FileDescriptor::stat(&child.path()).await?;
        entries.push(DirectoryEntry {
            href: child_href(url_path, &name, stat.is_dir),
            is_file: stat.is_file(),
            permissions: permission_string(stat.mode),
            size: if stat.is_file() {
                byte_to_size(stat.size)
            } else {
                String::new()
            },
            modified: DateTime::<Local>::from(stat.modified)
                .format("%Y-%m-%d %H:%M:%S")
                .to_string(),
            name,
        });
    }

    entries.sort_by(|a, b| a.name.cmp(&b.name));
    Ok(entries)
}

fn child_href(url_path: &str, name: &str, is_dir: bool) -> String {
    let mut href: String = url_path
        .split('/')
        .filter(|segment| !segment.is_empty())
        .fold(String::new(), |mut acc, segment| {
            acc.push('/');
            acc.extend(utf8_percent_encode(segment, SEGMENT));
            acc
        });
    href.push('/');
    href.extend(utf8_percent_encode(name, SEGMENT));
    if is_dir {
        href.push('/');
    }
    href
}

/// Render mode bits as `-rw-r--r--`
pub fn permission_string(mode: u32) -> String {
    const FILE_TYPE_MASK: u32 = 0o170_000;
    const DIRECTORY: u32 = 0o040_000;

    let mut out = String::with_capacity(10);
    out.push(if mode & FILE_TYPE_MASK == DIRECTORY { 'd' } else { '-' });
    for shift in [6, 3, 0] {
        let bits = (mode >> shift) & 0o7;
        out.push(if bits & 0o4 != 0 { 'r' } else { '-' });
        out.push(if bits & 0o2 != 0 { 'w' } else { '-' });
        out.push(if bits & 0o1 != 0 { 'x' } else { '-' });
    }
    out
}

/// Format a byte count with two decimals, e.g. `1.50 KB`
pub fn byte_to_size(bytes: u64) -> String {
    const UNITS: [&str; 4] = ["B", "KB", "MB", "GB"];
    if bytes == 0 {
        return String::new();
    }

    #[allow(clippy::cast_precision_loss)]
    let mut value = bytes as f64;
    let mut unit = 0;
    while value >= 1024.0 && unit < UNITS.len() - 1 {
        value /= 1024.0;
        unit += 1;
    }
    format!("{value:.2} {}", UNITS[unit])
}

fn escape_html(s: &str) -> String {
    let mut out = String::with_capacity(s.len());
    for c in s.chars() {
        match c {
            '&' => out.push_str("&amp;"),
            '<' => out.push_str("&lt;"),
            '>' => out.push_str("&gt;"),
            '"' => out.push_str("&quot;"),
            '\'' => out.push_str("&#39;"),
            _ => out.push(c),
        }
    }
    out
}

/// Render a listing page. Pure; an empty slice renders an empty table.
pub fn render_listing(entries: &[DirectoryEntry], footer: &str) -> String {
    let mut rows = String::new();
    for entry in entries {
        let icon = if entry.is_file { "&#128196;" } else { "&#128193;" };
        let _ = writeln!(
            rows,
            "      <tr><td class=\"perm\">{}</td><td class=\"size\">{}</td><td class=\"time\">{}</td><td>{icon} <a href=\"{}\">{}</a></td></tr>",
            entry.permissions,
            escape_html(&entry.size),
            escape_html(&entry.modified),
            escape_html(&entry.href),
            escape_html(&entry.name),
        );
    }

    format!(
        r#"<!DOCTYPE html>
<html>
<head>
    <meta charset="utf-8">
    <meta name="viewport" content="width=device-width, initial-scale=1">
    <title>Index</title>
    <style>
        body {{ font-family: -apple-system, BlinkMacSystemFont, "Segoe UI", Roboto, sans-serif; margin: 2em; }}
        table {{ border-collapse: collapse; }}
        td {{ padding: 2px 12px; }}
        .perm, .size, .time {{ font-family: monospace; color: #555; }}
        .size {{ text-align: right; }}
        footer {{ margin-top: 2em; color: #888; font-size: 0.9em; }}
    </style>
</head>
<body>
    <table>
{rows}    </table>
    <footer>{}</footer>
</body>
</html>"#,
        escape_html(footer)
    )
}
