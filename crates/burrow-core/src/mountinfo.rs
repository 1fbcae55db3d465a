//! Live mount table inspection via `/proc/self/mountinfo`.
//!
//! Records are parsed fresh on every query; the mount table is shared
//! mutable state owned by the kernel and must never be cached across
//! operations.

use std::path::{Path, PathBuf};

use burrow_common::error::{BurrowError, Result};

const MOUNTINFO_PATH: &str = "/proc/self/mountinfo";

/// One active mount, as reported by the kernel.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MountRecord {
    /// Mount source (device, pseudo-filesystem name, or bind origin).
    pub source: String,
    /// Mount point in this process's view of the filesystem.
    pub target: PathBuf,
    /// Filesystem type.
    pub fs_type: String,
    /// Per-mount options.
    pub options: String,
}

/// Reads the current mount table.
///
/// # Errors
///
/// Returns [`BurrowError::Io`] if the mountinfo file cannot be read.
pub fn read_mount_table() -> Result<Vec<MountRecord>> {
    let raw = std::fs::read_to_string(MOUNTINFO_PATH).map_err(|e| BurrowError::Io {
        path: PathBuf::from(MOUNTINFO_PATH),
        source: e,
    })?;
    Ok(parse_mount_table(&raw))
}

/// Returns whether `path` is currently a mount point.
///
/// # Errors
///
/// Propagates mount table read failures.
pub fn is_mount_point(path: &Path) -> Result<bool> {
    let table = read_mount_table()?;
    Ok(table.iter().any(|record| record.target == path))
}

/// Returns every active mount whose target sits at or below `root`.
///
/// # Errors
///
/// Propagates mount table read failures.
pub fn mounts_under(root: &Path) -> Result<Vec<MountRecord>> {
    let table = read_mount_table()?;
    Ok(table
        .into_iter()
        .filter(|record| record.target.starts_with(root))
        .collect())
}

/// Parses raw mountinfo text, skipping lines that do not follow the
/// documented field layout.
///
/// Per `proc(5)`, each line reads
/// `ID PARENT MAJ:MIN ROOT MOUNTPOINT OPTIONS [OPTIONAL...] - FSTYPE SOURCE SUPEROPTS`
/// with a literal `-` separating the variable-length optional fields from
/// the filesystem fields.
pub fn parse_mount_table(raw: &str) -> Vec<MountRecord> {
    raw.lines().filter_map(parse_mount_line).collect()
}

fn parse_mount_line(line: &str) -> Option<MountRecord> {
    let (head, tail) = line.split_once(" - ")?;
    let head_fields: Vec<&str> = head.split_whitespace().collect();
    let tail_fields: Vec<&str> = tail.split_whitespace().collect();
    if head_fields.len() < 6 || tail_fields.len() < 2 {
        return None;
    }
    Some(MountRecord {
        source: tail_fields[1].to_string(),
        target: PathBuf::from(unescape_mount_field(head_fields[4])),
        fs_type: tail_fields[0].to_string(),
        options: head_fields[5].to_string(),
    })
}

/// Undoes the octal escaping mountinfo applies to whitespace and
/// backslashes in mount points (`\040` for space and friends).
fn unescape_mount_field(field: &str) -> String {
    let mut out = String::with_capacity(field.len());
    let bytes = field.as_bytes();
    let mut i = 0;
    while i < bytes.len() {
        if bytes[i] == b'\\' && i + 3 < bytes.len() {
            let octal = &field[i + 1..i + 4];
            if let Ok(value) = u8::from_str_radix(octal, 8) {
                out.push(value as char);
                i += 4;
                continue;
            }
        }
        out.push(bytes[i] as char);
        i += 1;
    }
    out
}
