//! Environment manifest merging.
//!
//! The persisted manifest inside the root supplies the base environment;
//! caller-supplied `KEY=VALUE` overrides win on key collision. The merged
//! result is a flat list with unique keys, consumed verbatim by exec.

use std::collections::BTreeMap;
use std::path::Path;

use burrow_common::constants::ENV_MANIFEST;
use burrow_common::error::{BurrowError, Result};

/// Merges the root's environment manifest with caller overrides.
///
/// Manifest lines are trimmed; blank lines and lines without a `=` are
/// skipped defensively (the manifest is machine-written and may carry
/// trailing noise). Overrides are caller input and must be well-formed.
///
/// # Errors
///
/// Returns [`BurrowError::InvalidEnvFormat`] for an override missing
/// `=`, or [`BurrowError::Io`] if the manifest exists but cannot be read.
pub fn merge_environment(root: &Path, overrides: &[String]) -> Result<Vec<String>> {
    let mut vars = read_env_manifest(&root.join(ENV_MANIFEST))?;

    for entry in overrides {
        let (key, value) = entry
            .split_once('=')
            .ok_or_else(|| BurrowError::InvalidEnvFormat {
                entry: entry.clone(),
            })?;
        let _ = vars.insert(key.to_string(), value.to_string());
    }

    Ok(vars
        .into_iter()
        .map(|(key, value)| format!("{key}={value}"))
        .collect())
}

fn read_env_manifest(path: &Path) -> Result<BTreeMap<String, String>> {
    let mut vars = BTreeMap::new();
    if !path.is_file() {
        return Ok(vars);
    }
    let raw = std::fs::read_to_string(path).map_err(|e| BurrowError::Io {
        path: path.to_path_buf(),
        source: e,
    })?;
    for line in raw.lines().map(str::trim) {
        if line.is_empty() {
            continue;
        }
        let Some((key, value)) = line.split_once('=') else {
            tracing::debug!(line, "skipping malformed environment manifest line");
            continue;
        };
        let _ = vars.insert(key.to_string(), value.to_string());
    }
    Ok(vars)
}
