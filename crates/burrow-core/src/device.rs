//! Fabrication of the minimal `/dev` population under the prepared root.

use std::path::Path;

use burrow_common::constants::{DEVICE_MODE, DEVICE_NODES};
use burrow_common::error::{BurrowError, Result};
use nix::sys::stat::{Mode, SFlag, makedev, mknod};
use nix::unistd::chown;

use crate::privilege::Identity;

/// Creates the character device nodes the contained process expects
/// (`/dev/null`, `/dev/zero`, `/dev/random`, `/dev/urandom`), mode 0666,
/// skipping any node that already exists.
///
/// Ownership of each node is then set to the target identity. An
/// ownership failure is logged and tolerated: the node stays root-owned
/// but remains usable through its world read-write mode. Creation
/// failures are fatal.
///
/// # Errors
///
/// Returns [`BurrowError::DeviceCreation`] if a node cannot be created,
/// or [`BurrowError::Io`] if its parent directory cannot be prepared.
pub fn create_device_nodes(root: &Path, owner: &Identity) -> Result<()> {
    for node in DEVICE_NODES {
        let path = root.join(node.path);
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent).map_err(|e| BurrowError::Io {
                path: parent.to_path_buf(),
                source: e,
            })?;
        }

        if path.symlink_metadata().is_ok() {
            tracing::debug!(path = %path.display(), "device node already present");
        } else {
            mknod(
                &path,
                SFlag::S_IFCHR,
                Mode::from_bits_truncate(DEVICE_MODE),
                makedev(node.major, node.minor),
            )
            .map_err(|errno| BurrowError::DeviceCreation {
                path: path.clone(),
                source: std::io::Error::from_raw_os_error(errno as i32),
            })?;
            tracing::debug!(
                path = %path.display(),
                major = node.major,
                minor = node.minor,
                "device node created"
            );
        }

        if let Err(errno) = chown(&path, Some(owner.uid), Some(owner.gid)) {
            tracing::warn!(
                path = %path.display(),
                uid = owner.uid.as_raw(),
                gid = owner.gid.as_raw(),
                error = %errno,
                "failed to set device node ownership; node stays root-owned"
            );
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    #![allow(clippy::expect_used)]

    use super::*;

    // mknod needs CAP_MKNOD; only the skip path is testable unprivileged.
    #[test]
    fn existing_nodes_are_skipped_without_error() {
        let dir = tempfile::tempdir().expect("tempdir");
        let dev = dir.path().join("dev");
        std::fs::create_dir_all(&dev).expect("mkdir dev");
        for node in DEVICE_NODES {
            std::fs::write(dir.path().join(node.path), b"").expect("placeholder");
        }

        let owner = Identity::current();
        create_device_nodes(dir.path(), &owner).expect("skip existing");
        assert!(dev.join("null").exists());
        assert!(dev.join("zero").exists());
    }
}
