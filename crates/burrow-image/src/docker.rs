//! Docker daemon collaborator.
//!
//! The daemon is reached through the `docker` CLI rather than its HTTP
//! API: the binary is located once via `which`, and each operation is a
//! short-lived subprocess. Inspect output is parsed from `docker
//! inspect`'s JSON.

use std::io::Read;
use std::path::PathBuf;
use std::process::{Child, Command, Stdio};

use serde::Deserialize;

use crate::{ExportError, Result};

/// Container metadata consumed by export, manifest generation, and the
/// systemd unit renderer. A subset of `docker inspect` output.
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct ContainerInfo {
    /// Full container id.
    pub id: String,
    /// Runtime state, absent when inspecting an image.
    #[serde(default)]
    pub state: Option<RunState>,
    /// Image-derived configuration.
    pub config: ContainerConfig,
    /// Mounts attached to the container.
    #[serde(default)]
    pub mounts: Vec<MountPoint>,
    /// Host-side configuration.
    #[serde(default)]
    pub host_config: HostConfig,
}

/// Container runtime state.
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct RunState {
    /// Whether the container is currently running.
    #[serde(default)]
    pub running: bool,
}

/// Image-derived container configuration.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct ContainerConfig {
    /// Configured user, empty when unset.
    #[serde(default)]
    pub user: String,
    /// Environment entries as `KEY=VALUE`.
    #[serde(default)]
    pub env: Vec<String>,
    /// Image entrypoint.
    #[serde(default)]
    pub entrypoint: Option<Vec<String>>,
    /// Image command.
    #[serde(default)]
    pub cmd: Option<Vec<String>>,
    /// Configured working directory, empty when unset.
    #[serde(default)]
    pub working_dir: String,
}

/// One mount attached to the container.
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct MountPoint {
    /// Mount kind (`bind`, `volume`, ...).
    #[serde(rename = "Type", default)]
    pub kind: String,
    /// Host-side source path.
    #[serde(default)]
    pub source: String,
    /// Container-side destination path.
    #[serde(default)]
    pub destination: String,
    /// Whether the mount is read-write.
    #[serde(rename = "RW", default)]
    pub rw: bool,
}

/// Host-side container configuration.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct HostConfig {
    /// Restart policy.
    #[serde(default)]
    pub restart_policy: Option<RestartPolicy>,
    /// Memory limit in bytes, 0 when unlimited.
    #[serde(default)]
    pub memory: i64,
    /// CPU limit in units of 1e-9 CPUs, 0 when unlimited.
    #[serde(default)]
    pub nano_cpus: i64,
}

/// Container restart policy.
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct RestartPolicy {
    /// Policy name (`always`, `on-failure`, ...).
    #[serde(default)]
    pub name: String,
}

/// What the acquisition step had to do to obtain an exportable
/// container, and therefore what cleanup it owes.
#[derive(Debug, Clone)]
pub struct Acquired {
    /// The inspected container.
    pub info: ContainerInfo,
    /// A stopped container was started and should be stopped again.
    pub needs_stop: bool,
    /// A container was created from an image and should be removed.
    pub needs_remove: bool,
}

/// Handle to the local `docker` binary.
#[derive(Debug)]
pub struct DockerCli {
    program: PathBuf,
}

/// An in-flight `docker export` stream.
///
/// Reads the child's stdout; the child is reaped on drop.
#[derive(Debug)]
pub struct ExportStream {
    child: Child,
}

impl Read for ExportStream {
    fn read(&mut self, buf: &mut [u8]) -> std::io::Result<usize> {
        match self.child.stdout.as_mut() {
            Some(stdout) => stdout.read(buf),
            None => Ok(0),
        }
    }
}

impl Drop for ExportStream {
    fn drop(&mut self) {
        let _ = self.child.wait();
    }
}

impl DockerCli {
    /// Locates the `docker` binary on `PATH`.
    ///
    /// # Errors
    ///
    /// Returns [`ExportError::Docker`] when the binary is absent.
    pub fn locate() -> Result<Self> {
        let program = which::which("docker").map_err(|e| ExportError::Docker {
            message: format!("docker binary not found: {e}"),
        })?;
        tracing::debug!(program = %program.display(), "located docker");
        Ok(Self { program })
    }

    /// Obtains an exportable container for `reference`.
    ///
    /// An existing running container is used as-is. An existing stopped
    /// container is started (and owes a stop). Otherwise a container is
    /// created from the image named by `reference` (and owes a remove).
    ///
    /// # Errors
    ///
    /// Returns [`ExportError::Docker`] when neither a container nor an
    /// image resolves.
    pub fn acquire(&self, reference: &str) -> Result<Acquired> {
        if let Ok(info) = self.inspect(reference) {
            if info.state.as_ref().is_some_and(|s| s.running) {
                return Ok(Acquired {
                    info,
                    needs_stop: false,
                    needs_remove: false,
                });
            }
            self.start(&info.id)?;
            return Ok(Acquired {
                info,
                needs_stop: true,
                needs_remove: false,
            });
        }

        // Created as root so the export can read every file in the image.
        let id = self.create_from_image(reference)?;
        let info = self.inspect(&id)?;
        Ok(Acquired {
            info,
            needs_stop: false,
            needs_remove: true,
        })
    }

    /// Inspects a container by id or name.
    ///
    /// # Errors
    ///
    /// Returns [`ExportError::Docker`] when inspection fails or its
    /// output cannot be parsed.
    pub fn inspect(&self, reference: &str) -> Result<ContainerInfo> {
        let output = self.run(&["inspect", "--type", "container", reference])?;
        let mut entries: Vec<ContainerInfo> =
            serde_json::from_slice(&output).map_err(|e| ExportError::Docker {
                message: format!("unparsable inspect output for {reference}: {e}"),
            })?;
        entries.pop().ok_or_else(|| ExportError::Docker {
            message: format!("no container matches {reference}"),
        })
    }

    /// Streams `docker export` for the given container id.
    ///
    /// # Errors
    ///
    /// Returns [`ExportError::Docker`] when the subprocess cannot spawn.
    pub fn export(&self, container_id: &str) -> Result<ExportStream> {
        let child = Command::new(&self.program)
            .args(["export", container_id])
            .stdout(Stdio::piped())
            .stderr(Stdio::null())
            .spawn()
            .map_err(|e| ExportError::Docker {
                message: format!("failed to spawn docker export: {e}"),
            })?;
        Ok(ExportStream { child })
    }

    /// Starts a stopped container.
    ///
    /// # Errors
    ///
    /// Returns [`ExportError::Docker`] on a non-zero exit.
    pub fn start(&self, container_id: &str) -> Result<()> {
        let _ = self.run(&["start", container_id])?;
        Ok(())
    }

    /// Stops a running container.
    ///
    /// # Errors
    ///
    /// Returns [`ExportError::Docker`] on a non-zero exit.
    pub fn stop(&self, container_id: &str) -> Result<()> {
        let _ = self.run(&["stop", container_id])?;
        Ok(())
    }

    /// Force-removes a container.
    ///
    /// # Errors
    ///
    /// Returns [`ExportError::Docker`] on a non-zero exit.
    pub fn remove(&self, container_id: &str) -> Result<()> {
        let _ = self.run(&["rm", "--force", container_id])?;
        Ok(())
    }

    fn create_from_image(&self, image: &str) -> Result<String> {
        let output = self.run(&["create", "--user", "root", image])?;
        let id = String::from_utf8_lossy(&output).trim().to_string();
        if id.is_empty() {
            return Err(ExportError::Docker {
                message: format!("docker create produced no container id for {image}"),
            });
        }
        Ok(id)
    }

    fn run(&self, args: &[&str]) -> Result<Vec<u8>> {
        tracing::debug!(?args, "invoking docker");
        let output = Command::new(&self.program)
            .args(args)
            .output()
            .map_err(|e| ExportError::Docker {
                message: format!("failed to invoke docker {}: {e}", args.join(" ")),
            })?;
        if !output.status.success() {
            return Err(ExportError::Docker {
                message: format!(
                    "docker {} failed: {}",
                    args.join(" "),
                    String::from_utf8_lossy(&output.stderr).trim()
                ),
            });
        }
        Ok(output.stdout)
    }
}

#[cfg(test)]
mod tests {
    #![allow(clippy::expect_used)]

    use super::*;

    const INSPECT_SAMPLE: &str = r#"[
        {
            "Id": "deadbeef",
            "State": {"Running": false, "Status": "exited"},
            "Config": {
                "User": "www-data",
                "Env": ["PATH=/usr/bin", "FOO=1"],
                "Entrypoint": ["/entry.sh"],
                "Cmd": ["serve", "--port", "80"],
                "WorkingDir": "/srv"
            },
            "Mounts": [
                {"Type": "bind", "Source": "/data", "Destination": "/mnt/data", "RW": false},
                {"Type": "volume", "Source": "vol1", "Destination": "/cache", "RW": true}
            ],
            "HostConfig": {
                "RestartPolicy": {"Name": "always"},
                "Memory": 268435456,
                "NanoCpus": 500000000
            }
        }
    ]"#;

    #[test]
    fn inspect_output_parses_the_consumed_subset() {
        let entries: Vec<ContainerInfo> =
            serde_json::from_str(INSPECT_SAMPLE).expect("parse inspect output");
        let info = &entries[0];

        assert_eq!(info.id, "deadbeef");
        assert!(!info.state.as_ref().expect("state").running);
        assert_eq!(info.config.user, "www-data");
        assert_eq!(info.config.env.len(), 2);
        assert_eq!(
            info.config.entrypoint.as_deref(),
            Some(&["/entry.sh".to_string()][..])
        );
        assert_eq!(info.config.working_dir, "/srv");
        assert_eq!(info.mounts.len(), 2);
        assert_eq!(info.mounts[0].kind, "bind");
        assert!(!info.mounts[0].rw);
        assert_eq!(
            info.host_config.restart_policy.as_ref().expect("policy").name,
            "always"
        );
        assert_eq!(info.host_config.memory, 268_435_456);
    }

    #[test]
    fn missing_optional_fields_default() {
        let raw = r#"[{"Id": "abc", "Config": {}}]"#;
        let entries: Vec<ContainerInfo> = serde_json::from_str(raw).expect("parse minimal");
        let info = &entries[0];
        assert!(info.state.is_none());
        assert!(info.mounts.is_empty());
        assert_eq!(info.host_config.memory, 0);
    }
}
