//! Idempotent mount application and the reverse teardown.
//!
//! All targets live under a single prepared root. Mounts are applied in
//! resolver order with no rollback on failure; whatever was already
//! applied stays in place for a later `teardown` to clean up.

use std::cmp::Reverse;
use std::path::{Path, PathBuf};

use burrow_common::constants::BIND_KEEP_MARKER;
use burrow_common::error::{BurrowError, Result};
use nix::mount::{MsFlags, mount, umount};

use crate::bind::BindSpec;
use crate::mountinfo::{self, MountRecord};

/// Applies and removes mounts under one prepared root.
#[derive(Debug)]
pub struct MountManager {
    root: PathBuf,
}

impl MountManager {
    /// Creates a manager for the given (already resolved) root.
    #[must_use]
    pub fn new(root: PathBuf) -> Self {
        Self { root }
    }

    /// Mounts the pseudo-filesystems the contained process expects:
    /// `proc` at `root/proc` and a recursive bind of the host's `/sys` at
    /// `root/sys`, marked `rslave` so mount events only propagate from
    /// the host into the root, never back.
    ///
    /// Both mounts are skipped if the target is already a mount point.
    ///
    /// # Errors
    ///
    /// Returns [`BurrowError::Mount`] wrapping the failing target.
    pub fn mount_pseudo_filesystems(&self) -> Result<()> {
        let proc_target = self.root.join("proc");
        self.mount_if_absent(Some("proc"), &proc_target, Some("proc"), MsFlags::empty())?;

        let sys_target = self.root.join("sys");
        self.mount_if_absent(
            Some("/sys"),
            &sys_target,
            None,
            MsFlags::MS_BIND | MsFlags::MS_REC,
        )?;
        // Propagation marking must be its own mount call, and reapplying
        // it to an existing mount is harmless.
        mount(
            None::<&str>,
            &sys_target,
            None::<&str>,
            MsFlags::MS_SLAVE | MsFlags::MS_REC,
            None::<&str>,
        )
        .map_err(|e| mount_error(&sys_target, e))?;

        Ok(())
    }

    /// Applies bind mounts in resolver order. The first failure aborts
    /// the remaining specs; already-applied mounts are left in place.
    ///
    /// # Errors
    ///
    /// Propagates the first [`BurrowError::Mount`] or I/O failure.
    pub fn apply_binds(&self, specs: &[BindSpec]) -> Result<()> {
        for spec in specs {
            self.apply_bind(spec)?;
        }
        Ok(())
    }

    /// Applies a single bind mount under the root.
    ///
    /// The host source gets a marker file if it is an empty directory
    /// (some filesystem drivers refuse to bind from one), the
    /// container-side target tree is created, and the bind is mounted
    /// read-write idempotently. Read-only specs are then remounted
    /// `remount,ro,bind`; the kernel rejects a directly read-only bind,
    /// so the two-step dance is required.
    ///
    /// # Errors
    ///
    /// Returns [`BurrowError::Io`] for target preparation failures and
    /// [`BurrowError::Mount`] for mount syscall failures.
    pub fn apply_bind(&self, spec: &BindSpec) -> Result<()> {
        ensure_not_empty(&spec.host)?;

        let target = self.rebase(&spec.container);
        std::fs::create_dir_all(&target).map_err(|e| BurrowError::Io {
            path: target.clone(),
            source: e,
        })?;

        self.mount_if_absent(Some(&spec.host), &target, None, MsFlags::MS_BIND)?;

        if !spec.writable {
            mount(
                Some(&spec.host),
                &target,
                None::<&str>,
                MsFlags::MS_REMOUNT | MsFlags::MS_RDONLY | MsFlags::MS_BIND,
                None::<&str>,
            )
            .map_err(|e| mount_error(&target, e))?;
        }

        tracing::debug!(
            host = %spec.host.display(),
            target = %target.display(),
            writable = spec.writable,
            "bind applied"
        );
        Ok(())
    }

    /// Unmounts everything currently mounted at or below the root,
    /// deepest target first.
    ///
    /// The ordering is a correctness requirement: unmounting a parent
    /// while a child mount still sits beneath it fails with `EBUSY`.
    ///
    /// # Errors
    ///
    /// Returns [`BurrowError::Mount`] on the first unmount failure.
    pub fn teardown(&self) -> Result<usize> {
        let records = order_for_teardown(mountinfo::mounts_under(&self.root)?);
        let count = records.len();
        for record in records {
            umount(&record.target).map_err(|e| mount_error(&record.target, e))?;
            tracing::debug!(target = %record.target.display(), "unmounted");
        }
        Ok(count)
    }

    /// Rebases an absolute container path under the prepared root.
    fn rebase(&self, container: &Path) -> PathBuf {
        match container.strip_prefix("/") {
            Ok(relative) => self.root.join(relative),
            Err(_) => self.root.join(container),
        }
    }

    fn mount_if_absent<P: AsRef<Path> + ?Sized>(
        &self,
        source: Option<&P>,
        target: &Path,
        fs_type: Option<&str>,
        flags: MsFlags,
    ) -> Result<()> {
        let source: Option<&Path> = source.map(AsRef::as_ref);
        if mountinfo::is_mount_point(target)? {
            tracing::debug!(target = %target.display(), "already mounted, skipping");
            return Ok(());
        }
        mount(source, target, fs_type, flags, None::<&str>).map_err(|e| mount_error(target, e))
    }
}

/// Sorts mount records so that no record precedes one nested beneath it:
/// deepest target path first.
fn order_for_teardown(mut records: Vec<MountRecord>) -> Vec<MountRecord> {
    records.sort_by_key(|record| Reverse(record.target.components().count()));
    records
}

/// Drops a marker file into an empty bind source directory.
fn ensure_not_empty(host: &Path) -> Result<()> {
    let is_empty = std::fs::read_dir(host)
        .map(|mut entries| entries.next().is_none())
        .unwrap_or(false);
    if is_empty {
        let marker = host.join(BIND_KEEP_MARKER);
        std::fs::write(&marker, b"").map_err(|e| BurrowError::Io {
            path: marker,
            source: e,
        })?;
    }
    Ok(())
}

fn mount_error(target: &Path, errno: nix::Error) -> BurrowError {
    BurrowError::Mount {
        target: target.to_path_buf(),
        source: std::io::Error::from_raw_os_error(errno as i32),
    }
}

#[cfg(test)]
mod tests {
    #![allow(clippy::expect_used)]

    use super::*;

    fn record(target: &str) -> MountRecord {
        MountRecord {
            source: "none".to_string(),
            target: PathBuf::from(target),
            fs_type: "none".to_string(),
            options: "rw".to_string(),
        }
    }

    #[test]
    fn teardown_order_unmounts_nested_mounts_first() {
        let ordered = order_for_teardown(vec![
            record("/tmp/r"),
            record("/tmp/r/a"),
            record("/tmp/r/a/b"),
        ]);
        let targets: Vec<_> = ordered.iter().map(|r| r.target.clone()).collect();
        assert_eq!(
            targets,
            vec![
                PathBuf::from("/tmp/r/a/b"),
                PathBuf::from("/tmp/r/a"),
                PathBuf::from("/tmp/r"),
            ]
        );
    }

    #[test]
    fn teardown_order_is_depth_based_not_lexical() {
        let ordered = order_for_teardown(vec![
            record("/tmp/r/zzz"),
            record("/tmp/r/a/b"),
            record("/tmp/r"),
        ]);
        assert_eq!(ordered[0].target, PathBuf::from("/tmp/r/a/b"));
        assert_eq!(ordered[2].target, PathBuf::from("/tmp/r"));
    }

    #[test]
    fn rebase_joins_container_path_under_root() {
        let manager = MountManager::new(PathBuf::from("/var/lib/burrow/web"));
        assert_eq!(
            manager.rebase(Path::new("/mnt/data")),
            PathBuf::from("/var/lib/burrow/web/mnt/data")
        );
    }

    #[test]
    fn empty_host_directory_gets_marker_file() {
        let dir = tempfile::tempdir().expect("tempdir");
        ensure_not_empty(dir.path()).expect("marker");
        assert!(dir.path().join(BIND_KEEP_MARKER).exists());
    }

    #[test]
    fn populated_host_directory_is_left_alone() {
        let dir = tempfile::tempdir().expect("tempdir");
        std::fs::write(dir.path().join("present"), b"x").expect("write");
        ensure_not_empty(dir.path()).expect("no-op");
        assert!(!dir.path().join(BIND_KEEP_MARKER).exists());
    }
}
