//! # burrow — daemonless chroot container runtime
//!
//! Runs commands inside an exported filesystem tree using chroot, bind
//! mounts, and capability restriction; no daemon, no namespaces.

mod commands;

use clap::Parser;

use crate::commands::Cli;

fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();
    commands::execute(cli)
}
