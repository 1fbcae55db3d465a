//! Target root directory validation and canonicalization.

use std::path::{Path, PathBuf};

use burrow_common::error::{BurrowError, Result};

/// Validates the target root and resolves it to a canonical absolute path.
///
/// The returned path has every symlink component resolved, so all later
/// mount and chroot operations act on the real underlying directory
/// rather than on whatever a link happens to point at.
///
/// # Errors
///
/// Returns [`BurrowError::RootNotFound`] if the path does not exist or is
/// not a directory, and [`BurrowError::Io`] if canonicalization fails.
pub fn resolve_root(path: &Path) -> Result<PathBuf> {
    let metadata = std::fs::metadata(path).map_err(|_| BurrowError::RootNotFound {
        path: path.to_path_buf(),
    })?;
    if !metadata.is_dir() {
        return Err(BurrowError::RootNotFound {
            path: path.to_path_buf(),
        });
    }

    let resolved = std::fs::canonicalize(path).map_err(|e| BurrowError::Io {
        path: path.to_path_buf(),
        source: e,
    })?;
    tracing::debug!(requested = %path.display(), resolved = %resolved.display(), "resolved root");
    Ok(resolved)
}
