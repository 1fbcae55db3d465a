//! Bind-mount specification parsing and manifest loading.
//!
//! A bind token follows the grammar `HOST[:CONTAINER][:ro]`. Parsing is
//! purely lexical; nothing here touches the filesystem except the
//! manifest read itself.

use std::path::{Component, Path, PathBuf};

use burrow_common::constants::BIND_MANIFEST;
use burrow_common::error::{BurrowError, Result};

/// A single bind mount to apply under the prepared root.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BindSpec {
    /// Absolute host-side source directory.
    pub host: PathBuf,
    /// Absolute container-side target path, interpreted relative to the
    /// prepared root at mount time.
    pub container: PathBuf,
    /// Whether the mount stays read-write.
    pub writable: bool,
}

/// Parses one `HOST[:CONTAINER][:ro]` token into a [`BindSpec`].
///
/// One segment binds the host path to the same path in the container,
/// read-write. A third segment of `ro` (case-insensitive) makes the bind
/// read-only; any other third segment is read-write.
///
/// # Errors
///
/// Returns [`BurrowError::InvalidBindSpec`] when the token has more than
/// three segments or either path is not absolute.
pub fn parse_bind_token(token: &str) -> Result<BindSpec> {
    let segments: Vec<&str> = token.split(':').collect();
    let (host, container, writable) = match segments.as_slice() {
        [host] => (*host, *host, true),
        [host, container] => (*host, *container, true),
        [host, container, mode] => (*host, *container, !mode.eq_ignore_ascii_case("ro")),
        _ => {
            return Err(BurrowError::InvalidBindSpec {
                token: token.to_string(),
                reason: "expected HOST[:CONTAINER][:ro]".to_string(),
            });
        }
    };

    for path in [host, container] {
        if !Path::new(path).is_absolute() {
            return Err(BurrowError::InvalidBindSpec {
                token: token.to_string(),
                reason: format!("{path} is not an absolute path"),
            });
        }
    }

    Ok(BindSpec {
        host: clean_path(Path::new(host)),
        container: clean_path(Path::new(container)),
        writable,
    })
}

/// Loads bind tokens from the manifest inside the prepared root.
///
/// Lines are trimmed; blank lines are skipped. A missing manifest is not
/// an error and yields no tokens.
///
/// # Errors
///
/// Returns [`BurrowError::Io`] if the manifest exists but cannot be read.
pub fn load_bind_manifest(root: &Path) -> Result<Vec<String>> {
    let path = root.join(BIND_MANIFEST);
    if !path.is_file() {
        return Ok(Vec::new());
    }
    let raw = std::fs::read_to_string(&path).map_err(|e| BurrowError::Io {
        path: path.clone(),
        source: e,
    })?;
    Ok(raw
        .lines()
        .map(str::trim)
        .filter(|line| !line.is_empty())
        .map(ToString::to_string)
        .collect())
}

/// Resolves the full bind list for a run: manifest entries first, CLI
/// entries second. The order governs application order only; binds are
/// independent operations and are never merged by key.
///
/// # Errors
///
/// Propagates manifest I/O errors and per-token parse failures.
pub fn resolve_binds(root: &Path, cli_tokens: &[String]) -> Result<Vec<BindSpec>> {
    let mut tokens = load_bind_manifest(root)?;
    tokens.extend(cli_tokens.iter().cloned());
    tokens.iter().map(|token| parse_bind_token(token)).collect()
}

/// Lexically cleans an absolute path: resolves `.` and `..` components
/// without consulting the filesystem, the way `filepath.Clean` does.
fn clean_path(path: &Path) -> PathBuf {
    let mut cleaned = PathBuf::new();
    for component in path.components() {
        match component {
            Component::CurDir => {}
            Component::ParentDir => {
                // Popping above the root is a no-op for absolute paths.
                if cleaned.parent().is_some() {
                    let _ = cleaned.pop();
                }
            }
            other => cleaned.push(other),
        }
    }
    cleaned
}
