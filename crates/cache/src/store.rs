//! Atomic file primitives for the cache.

use std::fs;
use std::io::{self, Write};
use std::path::Path;

use protocol::{CacheError, FileMode};
use tempfile::NamedTempFile;
use tracing::warn;

/// Reads a cache file. Missing or unreadable files are `None`.
pub(crate) fn read(path: &Path) -> Option<Vec<u8>> {
    match fs::read(path) {
        Ok(bytes) => Some(bytes),
        Err(e) if e.kind() == io::ErrorKind::NotFound => None,
        Err(e) => {
            warn!(path = %path.display(), error = %e, "unreadable cache file; treating as miss");
            None
        }
    }
}

/// Deletes a cache file, ignoring failures.
pub(crate) fn remove(path: &Path) {
    if let Err(e) = fs::remove_file(path) {
        if e.kind() != io::ErrorKind::NotFound {
            warn!(path = %path.display(), error = %e, "unable to delete cache file");
        }
    }
}

/// Replaces `path` with `bytes` atomically and applies `mode`.
///
/// The temporary file is created next to the target so the final rename never
/// crosses filesystems. Returns the number of bytes written.
pub(crate) fn write_atomic(
    dir: &Path,
    path: &Path,
    bytes: &[u8],
    mode: FileMode,
) -> Result<u64, CacheError> {
    let write_error = |source| CacheError::Write {
        dir: dir.to_path_buf(),
        source,
    };
    fs::create_dir_all(dir).map_err(write_error)?;

    let mut temp = NamedTempFile::new_in(dir).map_err(write_error)?;

    temp.write_all(bytes)
        .and_then(|()| temp.flush())
        .map_err(write_error)?;

    if let Err(first) = temp.persist(path) {
        // Some platforms refuse to rename over an existing file.
        remove(path);
        first.file.persist(path).map_err(|e| CacheError::Rename {
            path: path.to_path_buf(),
            source: e.error,
        })?;
    }

    set_mode(path, mode)?;
    Ok(bytes.len() as u64)
}

#[cfg(unix)]
fn set_mode(path: &Path, mode: FileMode) -> Result<(), CacheError> {
    use std::os::unix::fs::PermissionsExt;

    fs::set_permissions(path, fs::Permissions::from_mode(mode.bits())).map_err(|source| {
        CacheError::Permissions {
            path: path.to_path_buf(),
            source,
        }
    })
}

#[cfg(not(unix))]
fn set_mode(_path: &Path, _mode: FileMode) -> Result<(), CacheError> {
    Ok(())
}
