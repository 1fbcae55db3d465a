//! Writing an exported filesystem stream to its destination.
//!
//! The stream can go to stdout, to a `.tar` file, or be unpacked into a
//! directory. In every case the two runtime manifests (environment and
//! bind mounts, derived from container metadata) are placed inside the
//! exported tree so a later `run` finds them at the root.

use std::io::{Read, Write};
use std::path::{Path, PathBuf};

use burrow_common::constants::{BIND_MANIFEST, ENV_MANIFEST};

use crate::docker::ContainerInfo;
use crate::{ExportError, Result};

/// Where an exported filesystem stream ends up.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ExportDestination {
    /// Stream the archive to standard output.
    Stdout,
    /// Write the archive to a tar file.
    TarFile(PathBuf),
    /// Unpack the archive into a directory.
    Directory(PathBuf),
}

/// Classifies the `--output` argument into a destination.
///
/// No argument means stdout. An argument ending in `.tar` names an
/// archive file; anything else names a directory, which must be empty or
/// absent.
///
/// # Errors
///
/// Returns [`ExportError::InvalidOutput`] for an unreadable or non-empty
/// directory target.
pub fn classify_destination(output: Option<&str>) -> Result<ExportDestination> {
    let Some(output) = output.filter(|o| !o.is_empty()) else {
        return Ok(ExportDestination::Stdout);
    };

    let path = PathBuf::from(output);
    if Path::new(output)
        .extension()
        .is_some_and(|ext| ext.eq_ignore_ascii_case("tar"))
    {
        return Ok(ExportDestination::TarFile(path));
    }

    if path.is_dir() {
        let mut entries = std::fs::read_dir(&path).map_err(|e| ExportError::Io {
            path: path.clone(),
            source: e,
        })?;
        if entries.next().is_some() {
            return Err(ExportError::InvalidOutput {
                message: format!("output directory {output} is not empty"),
            });
        }
    } else if path.exists() {
        return Err(ExportError::InvalidOutput {
            message: format!("output path {output} exists and is not a directory"),
        });
    }
    Ok(ExportDestination::Directory(path))
}

/// Builds the manifest files for an exported container: the environment
/// manifest from its configured environment and the bind manifest from
/// its bind-type mounts (`SRC:DST[:ro]`).
#[must_use]
pub fn manifest_entries(info: &ContainerInfo) -> Vec<(String, String)> {
    let env_body = info.config.env.join("\n") + "\n";

    let binds: Vec<String> = info
        .mounts
        .iter()
        .filter(|mount| mount.kind == "bind")
        .map(|mount| {
            let suffix = if mount.rw { "" } else { ":ro" };
            format!("{}:{}{}", mount.source, mount.destination, suffix)
        })
        .collect();
    let bind_body = binds.join("\n") + "\n";

    vec![
        (ENV_MANIFEST.to_string(), env_body),
        (BIND_MANIFEST.to_string(), bind_body),
    ]
}

/// Writes the export stream to its destination, injecting the manifests
/// into the produced tree or archive.
///
/// Directory unpacking preserves permissions and ownership from the
/// archive, so an export taken as root round-trips file ownership into
/// the prepared tree.
///
/// # Errors
///
/// Returns [`ExportError::Io`] on any read or write failure.
pub fn write_export<R: Read>(
    reader: R,
    destination: &ExportDestination,
    manifests: &[(String, String)],
) -> Result<()> {
    match destination {
        ExportDestination::Stdout => {
            let stdout = std::io::stdout();
            copy_archive(reader, stdout.lock(), manifests, Path::new("-"))
        }
        ExportDestination::TarFile(path) => {
            let file = std::fs::File::create(path).map_err(|e| ExportError::Io {
                path: path.clone(),
                source: e,
            })?;
            copy_archive(reader, file, manifests, path)
        }
        ExportDestination::Directory(path) => unpack_to_directory(reader, path, manifests),
    }
}

/// Re-emits the incoming tar stream with the manifest entries prepended.
fn copy_archive<R: Read, W: Write>(
    reader: R,
    writer: W,
    manifests: &[(String, String)],
    label: &Path,
) -> Result<()> {
    let io_err = |e: std::io::Error| ExportError::Io {
        path: label.to_path_buf(),
        source: e,
    };

    let mut builder = tar::Builder::new(writer);
    for (name, body) in manifests {
        let mut header = tar::Header::new_gnu();
        header.set_size(body.len() as u64);
        header.set_mode(0o644);
        header.set_cksum();
        builder
            .append_data(&mut header, name, body.as_bytes())
            .map_err(io_err)?;
    }

    let mut archive = tar::Archive::new(reader);
    for entry in archive.entries().map_err(io_err)? {
        let mut entry = entry.map_err(io_err)?;
        let mut header = entry.header().clone();
        let path = entry.path().map_err(io_err)?.into_owned();
        builder
            .append_data(&mut header, path, &mut entry)
            .map_err(io_err)?;
    }
    builder.finish().map_err(io_err)
}

fn unpack_to_directory<R: Read>(
    reader: R,
    target: &Path,
    manifests: &[(String, String)],
) -> Result<()> {
    std::fs::create_dir_all(target).map_err(|e| ExportError::Io {
        path: target.to_path_buf(),
        source: e,
    })?;

    let mut archive = tar::Archive::new(reader);
    archive.set_preserve_permissions(true);
    // Ownership hints can only be honored with privilege; an unprivileged
    // export still unpacks, just owned by the invoking user.
    archive.set_preserve_ownerships(nix::unistd::geteuid().is_root());
    archive.unpack(target).map_err(|e| ExportError::Io {
        path: target.to_path_buf(),
        source: e,
    })?;

    for (name, body) in manifests {
        let path = target.join(name);
        std::fs::write(&path, body).map_err(|e| ExportError::Io { path, source: e })?;
    }

    tracing::info!(target = %target.display(), "export unpacked");
    Ok(())
}

#[cfg(test)]
mod tests {
    #![allow(clippy::expect_used)]

    use super::*;
    use crate::docker::{ContainerConfig, ContainerInfo, MountPoint};

    fn sample_info() -> ContainerInfo {
        ContainerInfo {
            id: "deadbeef".to_string(),
            state: None,
            config: ContainerConfig {
                env: vec!["FOO=1".to_string(), "BAR=2".to_string()],
                ..ContainerConfig::default()
            },
            mounts: vec![
                MountPoint {
                    kind: "bind".to_string(),
                    source: "/data".to_string(),
                    destination: "/mnt/data".to_string(),
                    rw: false,
                },
                MountPoint {
                    kind: "volume".to_string(),
                    source: "vol1".to_string(),
                    destination: "/cache".to_string(),
                    rw: true,
                },
            ],
            host_config: crate::docker::HostConfig::default(),
        }
    }

    #[test]
    fn no_output_streams_to_stdout() {
        let dest = classify_destination(None).expect("classify");
        assert_eq!(dest, ExportDestination::Stdout);
        let dest = classify_destination(Some("")).expect("classify");
        assert_eq!(dest, ExportDestination::Stdout);
    }

    #[test]
    fn tar_suffix_selects_archive_output() {
        let dest = classify_destination(Some("/tmp/rootfs.tar")).expect("classify");
        assert_eq!(dest, ExportDestination::TarFile(PathBuf::from("/tmp/rootfs.tar")));
    }

    #[test]
    fn other_paths_select_directory_output() {
        let dir = tempfile::tempdir().expect("tempdir");
        let target = dir.path().join("rootfs");
        let dest =
            classify_destination(Some(target.to_str().expect("utf-8"))).expect("classify");
        assert_eq!(dest, ExportDestination::Directory(target));
    }

    #[test]
    fn non_empty_directory_is_rejected() {
        let dir = tempfile::tempdir().expect("tempdir");
        std::fs::write(dir.path().join("occupied"), b"x").expect("write");
        let result = classify_destination(Some(dir.path().to_str().expect("utf-8")));
        assert!(matches!(result, Err(ExportError::InvalidOutput { .. })));
    }

    #[test]
    fn manifests_carry_env_and_bind_mounts_only() {
        let entries = manifest_entries(&sample_info());
        assert_eq!(entries.len(), 2);

        let (env_name, env_body) = &entries[0];
        assert_eq!(env_name, ENV_MANIFEST);
        assert_eq!(env_body, "FOO=1\nBAR=2\n");

        let (bind_name, bind_body) = &entries[1];
        assert_eq!(bind_name, BIND_MANIFEST);
        assert_eq!(bind_body, "/data:/mnt/data:ro\n", "volumes are excluded");
    }

    #[test]
    fn directory_export_injects_manifests_into_tree() {
        let dir = tempfile::tempdir().expect("tempdir");
        let target = dir.path().join("rootfs");

        // A minimal one-file archive stands in for the export stream.
        let mut raw = Vec::new();
        {
            let mut builder = tar::Builder::new(&mut raw);
            let body = b"root:x:0:0::/root:/bin/sh\n";
            let mut header = tar::Header::new_gnu();
            header.set_size(body.len() as u64);
            header.set_mode(0o644);
            header.set_uid(0);
            header.set_gid(0);
            header.set_cksum();
            builder
                .append_data(&mut header, "etc/passwd", &body[..])
                .expect("append");
            builder.finish().expect("finish");
        }

        let manifests = manifest_entries(&sample_info());
        write_export(
            raw.as_slice(),
            &ExportDestination::Directory(target.clone()),
            &manifests,
        )
        .expect("write export");

        assert!(target.join("etc/passwd").exists());
        let env = std::fs::read_to_string(target.join(ENV_MANIFEST)).expect("env manifest");
        assert_eq!(env, "FOO=1\nBAR=2\n");
        assert!(target.join(BIND_MANIFEST).exists());
    }

    #[test]
    fn tar_export_prepends_manifest_entries() {
        let dir = tempfile::tempdir().expect("tempdir");
        let out = dir.path().join("rootfs.tar");

        let mut raw = Vec::new();
        {
            let mut builder = tar::Builder::new(&mut raw);
            let mut header = tar::Header::new_gnu();
            header.set_size(0);
            header.set_mode(0o644);
            header.set_cksum();
            builder
                .append_data(&mut header, "empty.txt", &b""[..])
                .expect("append");
            builder.finish().expect("finish");
        }

        write_export(
            raw.as_slice(),
            &ExportDestination::TarFile(out.clone()),
            &manifest_entries(&sample_info()),
        )
        .expect("write export");

        let file = std::fs::File::open(&out).expect("open produced tar");
        let mut archive = tar::Archive::new(file);
        let names: Vec<String> = archive
            .entries()
            .expect("entries")
            .map(|entry| {
                entry
                    .expect("entry")
                    .path()
                    .expect("path")
                    .to_string_lossy()
                    .into_owned()
            })
            .collect();
        assert_eq!(names, vec![ENV_MANIFEST, BIND_MANIFEST, "empty.txt"]);
    }
}
