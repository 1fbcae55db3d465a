//! `burrow export` — export a container's filesystem for later `run`s.

use std::path::Path;

use clap::Args;

use burrow_image::archive::{self, ExportDestination};
use burrow_image::docker::{Acquired, DockerCli};
use burrow_image::service::ServiceSpec;

/// Arguments for the `export` command.
#[derive(Args, Debug)]
pub struct ExportArgs {
    /// Image (NAME[:TAG]) or container to export.
    #[arg(value_name = "IMAGE|CONTAINER")]
    pub reference: String,

    /// Write to a .tar file or directory instead of stdout.
    #[arg(short, long)]
    pub output: Option<String>,

    /// Install the exported directory as a systemd service.
    #[arg(short, long, value_name = "NAME")]
    pub install: Option<String>,
}

/// Executes the `export` command.
///
/// # Errors
///
/// Returns an error if the daemon interaction, the stream write, or the
/// unit install fails.
pub fn execute(args: ExportArgs) -> anyhow::Result<()> {
    let destination = archive::classify_destination(args.output.as_deref())?;

    let docker = DockerCli::locate()?;
    let acquired = docker.acquire(&args.reference)?;

    let result = export_acquired(&docker, &acquired, &destination);

    // The acquisition owes its cleanup whether or not the export worked.
    if acquired.needs_remove {
        if let Err(e) = docker.remove(&acquired.info.id) {
            tracing::warn!(id = %acquired.info.id, error = %e, "failed to remove container");
        }
    } else if acquired.needs_stop {
        if let Err(e) = docker.stop(&acquired.info.id) {
            tracing::warn!(id = %acquired.info.id, error = %e, "failed to stop container");
        }
    }
    result?;

    if let ExportDestination::Directory(dir) = &destination {
        let root = std::fs::canonicalize(dir)?;
        if let Some(name) = &args.install {
            let spec = ServiceSpec::from_container(name, &root, &acquired.info)?;
            let path = spec.install()?;
            eprintln!("Installed systemd unit {}", path.display());
        }
        print_run_hint(&root, &acquired);
    }

    Ok(())
}

fn export_acquired(
    docker: &DockerCli,
    acquired: &Acquired,
    destination: &ExportDestination,
) -> anyhow::Result<()> {
    let manifests = archive::manifest_entries(&acquired.info);
    let stream = docker.export(&acquired.info.id)?;
    archive::write_export(stream, destination, &manifests)?;
    Ok(())
}

/// Prints a ready-to-use `run` invocation for the exported root, plus
/// notes on container properties that do not carry over.
fn print_run_hint(root: &Path, acquired: &Acquired) {
    let info = &acquired.info;
    let mut hint = format!("\tburrow run --copy-host-files --root {}", root.display());
    if !info.config.user.is_empty() {
        hint.push_str(&format!(" --user {}", info.config.user));
    }

    let mut command: Vec<String> = info.config.entrypoint.clone().unwrap_or_default();
    command.extend(info.config.cmd.clone().unwrap_or_default());
    hint.push_str(" -- ");
    hint.push_str(&command.join(" "));

    eprintln!("Run the exported root with (save this for future use):");
    eprintln!("{hint}");

    let mut attentions: Vec<String> = Vec::new();
    for mount in &info.mounts {
        if mount.kind != "bind" {
            attentions.push(format!(
                "mount point {}:{} is a {} and was not exported",
                mount.source, mount.destination, mount.kind
            ));
        }
    }
    if !info.config.working_dir.is_empty() {
        attentions.push(format!(
            "container has working directory {}",
            info.config.working_dir
        ));
    }
    if !attentions.is_empty() {
        eprintln!("Attention:");
        for note in attentions {
            eprintln!("\t{note}");
        }
    }
}
