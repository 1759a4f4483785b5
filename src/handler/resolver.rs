//! Path resolution module
//!
//! Maps a URL path onto a file or directory under the served root. Every
//! call stats the filesystem afresh.

use crate::error::ServeError;
use percent_encoding::percent_decode_str;
use std::fs::Metadata;
use std::io;
use std::path::{Component, Path, PathBuf};
use std::time::{Duration, SystemTime, UNIX_EPOCH};
use tokio::fs;

const INDEX_FILE: &str = "index.html";

/// Stat snapshot of a resolved target
#[derive(Debug, Clone)]
pub struct FileDescriptor {
    pub path: PathBuf,
    pub is_dir: bool,
    /// Regular file; FIFOs, sockets and devices are neither this nor `is_dir`
    pub is_regular: bool,
    pub size: u64,
    pub modified: SystemTime,
    /// Inode change time on Unix, creation time elsewhere
    pub changed: SystemTime,
    /// Unix mode bits, including the file type
    pub mode: u32,
}

impl FileDescriptor {
    pub async fn stat(path: &Path) -> io::Result<Self> {
        let meta = fs::metadata(path).await?;
        Ok(Self::from_metadata(path.to_path_buf(), &meta))
    }

    pub fn from_metadata(path: PathBuf, meta: &Metadata) -> Self {
        let modified = meta.modified().unwrap_or(UNIX_EPOCH);
        Self {
            path,
            is_dir: meta.is_dir(),
            is_regular: meta.is_file(),
            size: meta.len(),
            modified,
            changed: change_time(meta).unwrap_or(modified),
            mode: mode_bits(meta),
        }
    }

    pub const fn is_file(&self) -> bool {
        self.is_regular
    }
}

#[cfg(unix)]
fn change_time(meta: &Metadata) -> Option<SystemTime> {
    use std::os::unix::fs::MetadataExt;
    let secs = u64::try_from(meta.ctime()).ok()?;
    let nanos = u32::try_from(meta.ctime_nsec()).ok()?;
    Some(UNIX_EPOCH + Duration::new(secs, nanos))
}

#[cfg(not(unix))]
fn change_time(meta: &Metadata) -> Option<SystemTime> {
    meta.created().ok()
}

#[cfg(unix)]
fn mode_bits(meta: &Metadata) -> u32 {
    use std::os::unix::fs::MetadataExt;
    meta.mode()
}

#[cfg(not(unix))]
fn mode_bits(meta: &Metadata) -> u32 {
    let base = if meta.is_dir() { 0o040_755 } else { 0o100_644 };
    if meta.permissions().readonly() {
        base & !0o222
    } else {
        base
    }
}

/// What a URL path resolved to
#[derive(Debug, Clone)]
pub enum Target {
    /// A regular file, possibly a directory's `index.html`
    File(FileDescriptor),
    /// A directory without an index file
    Listing(FileDescriptor),
}

/// Percent-decode a request path
pub fn decode_path(raw: &str) -> Result<String, ServeError> {
    let decoded = percent_decode_str(raw)
        .decode_utf8()
        .map_err(|e| ServeError::MalformedUrl(format!("{raw}: {e}")))?;
    if decoded.contains('\0') {
        return Err(ServeError::MalformedUrl(format!("{raw}: embedded NUL")));
    }
    Ok(decoded.into_owned())
}

/// Lexically normalise a decoded URL path into a relative filesystem path.
/// `..` never climbs above the root.
pub fn normalize(url_path: &str) -> PathBuf {
    let mut parts: Vec<&str> = Vec::new();
    for component in Path::new(url_path).components() {
        match component {
            Component::Normal(part) => {
                if let Some(part) = part.to_str() {
                    parts.push(part);
                }
            }
            Component::ParentDir => {
                parts.pop();
            }
            Component::RootDir | Component::CurDir | Component::Prefix(_) => {}
        }
    }
    parts.iter().collect()
}

/// Resolve a decoded URL path against a canonical root directory
pub async fn resolve(root: &Path, url_path: &str) -> Result<Target, ServeError> {
    let joined = root.join(normalize(url_path));
    let stat = FileDescriptor::stat(&joined)
        .await
        .map_err(ServeError::NotFound)?;
    ensure_within_root(root, &joined).await?;

    if stat.is_file() {
        return Ok(Target::File(stat));
    }
    if !stat.is_dir {
        return Err(not_regular(&joined));
    }

    let index_path = joined.join(INDEX_FILE);
    match FileDescriptor::stat(&index_path).await {
        Ok(index) if index.is_file() => {
            ensure_within_root(root, &index_path).await?;
            Ok(Target::File(index))
        }
        _ => Ok(Target::Listing(stat)),
    }
}

fn not_regular(path: &Path) -> ServeError {
    ServeError::NotFound(io::Error::new(
        io::ErrorKind::InvalidInput,
        format!("not a regular file: {}", path.display()),
    ))
}

/// Reject targets that escape the root through symlinks
async fn ensure_within_root(root: &Path, path: &Path) -> Result<(), ServeError> {
    let canonical = fs::canonicalize(path).await.map_err(ServeError::NotFound)?;
    if canonical.starts_with(root) {
        Ok(())
    } else {
        Err(ServeError::NotFound(io::Error::new(
            io::ErrorKind::PermissionDenied,
            format!("path traversal blocked: {}", canonical.display()),
        )))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs as std_fs;

    fn fixture() -> (tempfile::TempDir, PathBuf) {
        let dir = tempfile::tempdir().unwrap();
        let root = std_fs::canonicalize(dir.path()).unwrap();
        std_fs::write(root.join("hello.txt"), b"hello").unwrap();
        std_fs::create_dir(root.join("site")).unwrap();
        std_fs::write(root.join("site/index.html"), b"<h1>site</h1>").unwrap();
        std_fs::create_dir(root.join("bare")).unwrap();
        std_fs::write(root.join("bare/a.txt"), b"a").unwrap();
        std_fs::create_dir_all(root.join("odd/index.html")).unwrap();
        (dir, root)
    }

    #[test]
    fn test_normalize() {
        assert_eq!(normalize("/a/b.txt"), PathBuf::from("a/b.txt"));
        assert_eq!(normalize("/a/./b/../c"), PathBuf::from("a/c"));
        assert_eq!(normalize("/../../etc/passwd"), PathBuf::from("etc/passwd"));
        assert_eq!(normalize("/"), PathBuf::new());
    }

    #[test]
    fn test_decode_path() {
        assert_eq!(decode_path("/a%20b.txt").unwrap(), "/a b.txt");
        assert!(matches!(decode_path("/%ff"), Err(ServeError::MalformedUrl(_))));
        assert!(matches!(decode_path("/a%00b"), Err(ServeError::MalformedUrl(_))));
    }

    #[tokio::test]
    async fn test_resolve_file() {
        let (_dir, root) = fixture();
        match resolve(&root, "/hello.txt").await.unwrap() {
            Target::File(f) => {
                assert_eq!(f.path, root.join("hello.txt"));
                assert_eq!(f.size, 5);
            }
            Target::Listing(_) => panic!("Expected file"),
        }
    }

    #[tokio::test]
    async fn test_directory_with_index() {
        let (_dir, root) = fixture();
        match resolve(&root, "/site").await.unwrap() {
            Target::File(f) => assert_eq!(f.path, root.join("site").join(INDEX_FILE)),
            Target::Listing(_) => panic!("Expected index file"),
        }
    }

    #[tokio::test]
    async fn test_directory_without_index() {
        let (_dir, root) = fixture();
        assert!(matches!(resolve(&root, "/bare/").await.unwrap(), Target::Listing(d) if d.is_dir));
        // an index.html that is itself a directory does not count
        assert!(matches!(resolve(&root, "/odd").await.unwrap(), Target::Listing(_)));
    }

    #[tokio::test]
    async fn test_missing_is_not_found() {
        let (_dir, root) = fixture();
        assert!(matches!(
            resolve(&root, "/nope.txt").await,
            Err(ServeError::NotFound(_))
        ));
    }

    #[tokio::test]
    async fn test_traversal_stays_in_root() {
        let (_dir, root) = fixture();
        assert!(matches!(
            resolve(&root, "/../hello.txt").await.unwrap(),
            Target::File(f) if f.path == root.join("hello.txt")
        ));
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn test_symlink_escape_blocked() {
        let (_dir, root) = fixture();
        let outside = tempfile::tempdir().unwrap();
        std_fs::write(outside.path().join("secret.txt"), b"secret").unwrap();
        std::os::unix::fs::symlink(outside.path().join("secret.txt"), root.join("link.txt")).unwrap();

        assert!(matches!(
            resolve(&root, "/link.txt").await,
            Err(ServeError::NotFound(_))
        ));
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn test_symlinked_index_escape_blocked() {
        let (_dir, root) = fixture();
        let outside = tempfile::tempdir().unwrap();
        std_fs::write(outside.path().join("secret.txt"), b"secret").unwrap();
        std::os::unix::fs::symlink(
            outside.path().join("secret.txt"),
            root.join("bare").join(INDEX_FILE),
        )
        .unwrap();

        assert!(matches!(
            resolve(&root, "/bare/").await,
            Err(ServeError::NotFound(e)) if e.kind() == io::ErrorKind::PermissionDenied
        ));
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn test_fifo_is_not_found() {
        let (_dir, root) = fixture();
        let status = std::process::Command::new("mkfifo")
            .arg(root.join("pipe.txt"))
            .status()
            .unwrap();
        assert!(status.success());

        assert!(matches!(
            resolve(&root, "/pipe.txt").await,
            Err(ServeError::NotFound(_))
        ));
    }
}
