//! systemd unit generation for exported roots.
//!
//! The rendered unit starts the container through this binary's `run`
//! operation and tears the mounts down through `teardown` when the
//! service stops.

use std::path::{Path, PathBuf};

use crate::docker::ContainerInfo;
use crate::{ExportError, Result};

const UNIT_DIR: &str = "/lib/systemd/system";

/// Inputs for one rendered unit.
#[derive(Debug, Clone)]
pub struct ServiceSpec {
    /// Unit name, without the `.service` suffix.
    pub name: String,
    /// Description line, conventionally the image name.
    pub description: String,
    /// Absolute path of the exported root directory.
    pub root: PathBuf,
    /// Absolute path of the runtime binary to invoke.
    pub runtime: PathBuf,
    /// User the container runs as; `root` when the image left it unset.
    pub user: String,
    /// Container working directory, if configured.
    pub working_dir: Option<String>,
    /// systemd `Restart=` value.
    pub restart: String,
    /// Memory limit in MiB, if configured.
    pub memory_limit_mib: Option<i64>,
    /// CPU quota in percent, if configured.
    pub cpu_quota_pct: Option<i64>,
    /// Entrypoint plus command, already concatenated.
    pub command: Vec<String>,
}

impl ServiceSpec {
    /// Derives a unit spec from inspected container metadata.
    ///
    /// # Errors
    ///
    /// Returns [`ExportError::Io`] when the current executable path
    /// cannot be determined.
    pub fn from_container(name: &str, root: &Path, info: &ContainerInfo) -> Result<Self> {
        let runtime = std::env::current_exe().map_err(|e| ExportError::Io {
            path: PathBuf::from("/proc/self/exe"),
            source: e,
        })?;

        let mut command = info.config.entrypoint.clone().unwrap_or_default();
        command.extend(info.config.cmd.clone().unwrap_or_default());

        let user = if info.config.user.is_empty() {
            "root".to_string()
        } else {
            info.config.user.clone()
        };

        let restart = match info
            .host_config
            .restart_policy
            .as_ref()
            .map(|policy| policy.name.as_str())
        {
            Some("always") | Some("unless-stopped") => "always",
            Some(name) if name.starts_with("on-failure") => "on-failure",
            _ => "no",
        }
        .to_string();

        Ok(Self {
            name: name.to_string(),
            description: format!("container root {}", root.display()),
            root: root.to_path_buf(),
            runtime,
            user,
            working_dir: (!info.config.working_dir.is_empty())
                .then(|| info.config.working_dir.clone()),
            restart,
            memory_limit_mib: (info.host_config.memory > 0)
                .then(|| info.host_config.memory / 1024 / 1024),
            cpu_quota_pct: (info.host_config.nano_cpus > 0)
                .then(|| info.host_config.nano_cpus / 10_000_000),
            command,
        })
    }

    /// Renders the unit file text.
    #[must_use]
    pub fn render(&self) -> String {
        let mut unit = String::new();
        unit.push_str("[Unit]\n");
        unit.push_str(&format!("Description={}\n", self.description));
        unit.push_str("After=network.target\n\n");

        unit.push_str("[Service]\n");
        unit.push_str("StartLimitInterval=5\n");
        unit.push_str("StartLimitBurst=10\n");
        if let Some(quota) = self.cpu_quota_pct {
            unit.push_str(&format!("CPUQuota={quota}%\n"));
        }
        if let Some(memory) = self.memory_limit_mib {
            unit.push_str(&format!("MemoryLimit={memory}M\n"));
        }
        if let Some(working_dir) = &self.working_dir {
            unit.push_str(&format!("WorkingDirectory={working_dir}/\n"));
        }

        let quoted_command: Vec<String> = self
            .command
            .iter()
            .map(|word| format!("\"{}\"", word.replace('"', "\\\"")))
            .collect();
        unit.push_str(&format!(
            "ExecStart={} run --copy-host-files --user {} --root {} -- {}\n",
            self.runtime.display(),
            self.user,
            self.root.display(),
            quoted_command.join(" ")
        ));
        unit.push_str(&format!(
            "ExecStopPost={} teardown --root {}\n",
            self.runtime.display(),
            self.root.display()
        ));
        unit.push_str(&format!("User={}\n", self.user));
        unit.push_str("ExecReload=/bin/kill -9 \"$MAINPID\"\n");
        unit.push_str(&format!("Restart={}\n\n", self.restart));

        unit.push_str("[Install]\n");
        unit.push_str("WantedBy=multi-user.target\n");
        unit
    }

    /// Writes the unit into the systemd unit directory.
    ///
    /// # Errors
    ///
    /// Returns [`ExportError::ServiceExists`] rather than overwriting an
    /// existing unit, or [`ExportError::Io`] on a write failure.
    pub fn install(&self) -> Result<PathBuf> {
        self.install_under(Path::new(UNIT_DIR))
    }

    /// Writes the unit under an explicit unit directory.
    ///
    /// # Errors
    ///
    /// Same as [`ServiceSpec::install`].
    pub fn install_under(&self, unit_dir: &Path) -> Result<PathBuf> {
        let path = unit_dir.join(format!("{}.service", self.name));
        if path.exists() {
            return Err(ExportError::ServiceExists { path });
        }
        std::fs::write(&path, self.render()).map_err(|e| ExportError::Io {
            path: path.clone(),
            source: e,
        })?;
        tracing::info!(path = %path.display(), "systemd unit installed");
        Ok(path)
    }
}

#[cfg(test)]
mod tests {
    #![allow(clippy::expect_used)]

    use super::*;

    fn sample_spec() -> ServiceSpec {
        ServiceSpec {
            name: "web".to_string(),
            description: "container root /srv/web".to_string(),
            root: PathBuf::from("/srv/web"),
            runtime: PathBuf::from("/usr/local/bin/burrow"),
            user: "www-data".to_string(),
            working_dir: Some("/srv".to_string()),
            restart: "always".to_string(),
            memory_limit_mib: Some(256),
            cpu_quota_pct: Some(50),
            command: vec!["/entry.sh".to_string(), "serve".to_string()],
        }
    }

    #[test]
    fn rendered_unit_wires_run_and_teardown() {
        let unit = sample_spec().render();
        assert!(unit.contains(
            "ExecStart=/usr/local/bin/burrow run --copy-host-files --user www-data \
             --root /srv/web -- \"/entry.sh\" \"serve\""
        ));
        assert!(unit.contains("ExecStopPost=/usr/local/bin/burrow teardown --root /srv/web"));
        assert!(unit.contains("Restart=always"));
        assert!(unit.contains("MemoryLimit=256M"));
        assert!(unit.contains("CPUQuota=50%"));
        assert!(unit.contains("WorkingDirectory=/srv/"));
        assert!(unit.contains("WantedBy=multi-user.target"));
    }

    #[test]
    fn optional_limits_are_omitted_when_unset() {
        let mut spec = sample_spec();
        spec.memory_limit_mib = None;
        spec.cpu_quota_pct = None;
        spec.working_dir = None;
        let unit = spec.render();
        assert!(!unit.contains("MemoryLimit="));
        assert!(!unit.contains("CPUQuota="));
        assert!(!unit.contains("WorkingDirectory="));
    }

    #[test]
    fn install_refuses_to_overwrite_existing_unit() {
        let dir = tempfile::tempdir().expect("tempdir");
        let spec = sample_spec();

        let path = spec.install_under(dir.path()).expect("first install");
        assert!(path.exists());

        let result = spec.install_under(dir.path());
        assert!(matches!(result, Err(ExportError::ServiceExists { .. })));
    }
}
