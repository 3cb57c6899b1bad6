//! Atomic file operations
//!
//! The JSON file backend rewrites its whole file on every flush. Writes go
//! through a temporary sibling file that is fsynced and then renamed over
//! the target, so readers observe either the old or the new content and
//! never a partially written document.

use std::fs::{self, File};
use std::io;
use std::path::Path;

use thiserror::Error;

/// Result type for atomic operations
pub type AtomicResult<T> = Result<T, AtomicError>;

/// Errors that can occur during atomic operations
#[derive(Debug, Error)]
pub enum AtomicError {
    #[error("IO error: {0}")]
    Io(#[from] io::Error),
    #[error("Target path has no file name: {0}")]
    InvalidPath(String),
}

/// Temp file used while replacing `path`
fn temp_path_for(path: &Path) -> AtomicResult<std::path::PathBuf> {
    let file_name = path
        .file_name()
        .ok_or_else(|| AtomicError::InvalidPath(path.display().to_string()))?;
    let mut temp_name = file_name.to_os_string();
    temp_name.push(".tmp");
    Ok(path.with_file_name(temp_name))
}

/// Atomically replace `path` with content produced by `write_fn`
///
/// # Example
///
/// ```ignore
/// atomic_write_with("data/stats.json", |file| {
///     serde_json::to_writer_pretty(file, &stats)?;
///     Ok(())
/// })?;
/// ```
pub fn atomic_write_with<P, F>(path: P, write_fn: F) -> AtomicResult<()>
where
    P: AsRef<Path>,
    F: FnOnce(&mut File) -> io::Result<()>,
{
    let path = path.as_ref();
    let temp_path = temp_path_for(path)?;

    if let Some(parent) = path.parent() {
        if !parent.as_os_str().is_empty() {
            fs::create_dir_all(parent)?;
        }
    }

    let mut file = File::create(&temp_path)?;
    if let Err(e) = write_fn(&mut file).and_then(|_| file.sync_all()) {
        drop(file);
        let _ = fs::remove_file(&temp_path);
        return Err(e.into());
    }
    drop(file);

    fs::rename(&temp_path, path)?;

    Ok(())
}

/// Remove the temp file a previous interrupted write of `path` left behind
///
/// Returns `true` if a stale file was found and removed.
pub fn cleanup_temp_file<P: AsRef<Path>>(path: P) -> AtomicResult<bool> {
    let temp_path = temp_path_for(path.as_ref())?;

    if !temp_path.exists() {
        return Ok(false);
    }

    fs::remove_file(&temp_path)?;
    Ok(true)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;
    use tempfile::TempDir;

    #[test]
    fn test_atomic_write_with() {
        let temp_dir = TempDir::new().unwrap();
        let path = temp_dir.path().join("stats.json");

        atomic_write_with(&path, |file| {
            writeln!(file, "[")?;
            writeln!(file, "]")?;
            Ok(())
        })
        .unwrap();

        assert_eq!(fs::read_to_string(&path).unwrap(), "[\n]\n");
        assert!(!temp_dir.path().join("stats.json.tmp").exists());
    }

    #[test]
    fn test_atomic_write_creates_parent_dirs() {
        let temp_dir = TempDir::new().unwrap();
        let path = temp_dir.path().join("nested").join("stats.json");

        atomic_write_with(&path, |file| file.write_all(b"[]")).unwrap();

        assert_eq!(fs::read_to_string(&path).unwrap(), "[]");
    }

    #[test]
    fn test_failed_write_keeps_previous_content() {
        let temp_dir = TempDir::new().unwrap();
        let path = temp_dir.path().join("stats.json");
        fs::write(&path, "[{\"userId\":1}]").unwrap();

        let result = atomic_write_with(&path, |file| {
            file.write_all(b"[{\"userId\"")?;
            Err(io::Error::new(io::ErrorKind::Other, "disk full"))
        });

        assert!(result.is_err());
        assert_eq!(fs::read_to_string(&path).unwrap(), "[{\"userId\":1}]");
        assert!(!temp_dir.path().join("stats.json.tmp").exists());
    }

    #[test]
    fn test_cleanup_temp_file() {
        let temp_dir = TempDir::new().unwrap();
        let path = temp_dir.path().join("stats.json");

        fs::write(temp_dir.path().join("stats.json.tmp"), "partial").unwrap();
        fs::write(temp_dir.path().join("unrelated.tmp"), "keep").unwrap();
        fs::write(&path, "[]").unwrap();

        assert!(cleanup_temp_file(&path).unwrap());
        assert!(!cleanup_temp_file(&path).unwrap());

        assert!(!temp_dir.path().join("stats.json.tmp").exists());
        assert!(temp_dir.path().join("unrelated.tmp").exists());
        assert!(path.exists());
    }
}
