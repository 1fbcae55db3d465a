//! `burrow teardown` — unmount everything under an exported root.

use std::path::PathBuf;

use clap::Args;

use burrow_core::mount::MountManager;
use burrow_core::rootdir;

/// Arguments for the `teardown` command.
#[derive(Args, Debug)]
pub struct TeardownArgs {
    /// Root directory whose mounts should be removed.
    #[arg(short, long)]
    pub root: PathBuf,
}

/// Executes the `teardown` command.
///
/// # Errors
///
/// Returns an error if the root cannot be resolved or an unmount fails.
pub fn execute(args: TeardownArgs) -> anyhow::Result<()> {
    let root = rootdir::resolve_root(&args.root)?;
    let count = MountManager::new(root.clone()).teardown()?;
    eprintln!("Unmounted {count} mount(s) under {}", root.display());
    Ok(())
}
