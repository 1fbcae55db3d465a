//! `burrow run` — run a command inside an exported root filesystem.
//!
//! The sequence is strict: every validation-class step (root resolution,
//! environment merge, identity resolution, bind parsing) completes before
//! the first mutating operation, and the privilege-reducing tail runs
//! through the one-way launch pipeline.

use std::path::{Path, PathBuf};

use clap::Args;

use burrow_common::constants::HOST_COPY_FILES;
use burrow_core::bind;
use burrow_core::device;
use burrow_core::environ;
use burrow_core::launch::{self, HostPrivilegeOps, LaunchPlan};
use burrow_core::mount::MountManager;
use burrow_core::privilege::{self, Identity};
use burrow_core::rootdir;

/// Arguments for the `run` command.
#[derive(Args, Debug)]
pub struct RunArgs {
    /// Root directory of the exported filesystem tree.
    #[arg(short, long)]
    pub root: PathBuf,

    /// User (numeric id or name) to switch to before running the command.
    #[arg(short, long)]
    pub user: Option<String>,

    /// Group (numeric id or name) to switch to.
    #[arg(short, long)]
    pub group: Option<String>,

    /// Bind-mount a host directory: HOST[:CONTAINER][:ro]. Repeatable.
    #[arg(short, long = "bind", value_name = "SPEC")]
    pub bind: Vec<String>,

    /// Set an environment variable: KEY=VALUE. Repeatable.
    #[arg(short, long = "env", value_name = "KEY=VALUE")]
    pub env: Vec<String>,

    /// Keep full capabilities in the container process (dangerous).
    #[arg(long)]
    pub no_drop_caps: bool,

    /// Copy /etc/group, /etc/passwd, /etc/resolv.conf, and /etc/hosts
    /// from the host into the root before running.
    #[arg(long)]
    pub copy_host_files: bool,

    /// Command and arguments to execute inside the root.
    #[arg(last = true, required = true, value_name = "COMMAND")]
    pub command: Vec<String>,
}

/// Executes the `run` command. Does not return on success: the process
/// image is replaced by the container command.
///
/// # Errors
///
/// Returns an error if any preparation or launch step fails.
pub fn execute(args: RunArgs) -> anyhow::Result<()> {
    // Validation phase: nothing below may mutate host state.
    let root = rootdir::resolve_root(&args.root)?;
    let env = environ::merge_environment(&root, &args.env)?;
    let identity = privilege::resolve_identity(args.user.as_deref(), args.group.as_deref())?;
    let binds = bind::resolve_binds(&root, &args.bind)?;

    // Mutation phase: first failure aborts, teardown cleans up later.
    let mounts = MountManager::new(root.clone());
    mounts.mount_pseudo_filesystems()?;
    mounts.apply_binds(&binds)?;

    link_var_lock(&root);

    if args.copy_host_files {
        copy_host_files(&root, identity)?;
    }

    device::create_device_nodes(&root, &identity)?;

    let plan = LaunchPlan {
        root,
        identity,
        drop_capabilities: !args.no_drop_caps,
        command: args.command,
        env,
    };
    let never = launch::launch(&mut HostPrivilegeOps, &plan)?;
    match never {}
}

/// Points `var/lock` at `../run/lock`, the layout most images expect.
/// Best-effort: a pre-existing link or missing `var` is tolerated.
fn link_var_lock(root: &Path) {
    let link = root.join("var/lock");
    if let Err(e) = std::os::unix::fs::symlink("../run/lock", &link) {
        tracing::debug!(link = %link.display(), error = %e, "var/lock symlink not created");
    }
}

/// Copies the host identity and resolver files into the root so name
/// lookups inside the chroot match the host.
fn copy_host_files(root: &Path, owner: Identity) -> anyhow::Result<()> {
    for relative in HOST_COPY_FILES {
        let source = Path::new("/").join(relative);
        let target = root.join(relative);
        if let Some(parent) = target.parent() {
            std::fs::create_dir_all(parent)?;
        }
        let _ = std::fs::copy(&source, &target)
            .map_err(|e| anyhow::anyhow!("failed to copy {} into root: {e}", source.display()))?;
        nix::unistd::chown(&target, Some(owner.uid), Some(owner.gid))
            .map_err(|e| anyhow::anyhow!("failed to chown {}: {e}", target.display()))?;
    }
    Ok(())
}
