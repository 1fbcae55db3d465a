//! # burrow-image
//!
//! Collaborators around the runtime core: exporting a container's
//! filesystem from a local Docker daemon, writing the exported stream to
//! its destination (with the runtime manifests placed inside the tree),
//! and generating a systemd unit that wraps the exported root.

pub mod archive;
pub mod docker;
pub mod service;

use std::path::PathBuf;

use thiserror::Error;

/// Errors raised by the export collaborators.
#[derive(Debug, Error)]
pub enum ExportError {
    /// The `docker` binary is missing or an invocation failed.
    #[error("docker: {message}")]
    Docker {
        /// What the daemon interaction reported.
        message: String,
    },

    /// The requested output destination is unusable.
    #[error("invalid output destination: {message}")]
    InvalidOutput {
        /// Why the destination was rejected.
        message: String,
    },

    /// A systemd unit with the requested name already exists.
    #[error("systemd unit already exists: {path}")]
    ServiceExists {
        /// The existing unit path.
        path: PathBuf,
    },

    /// An I/O operation failed.
    #[error("I/O error at {path}: {source}")]
    Io {
        /// Path where the I/O error occurred.
        path: PathBuf,
        /// Underlying I/O error.
        source: std::io::Error,
    },
}

/// Convenience alias for export operations.
pub type Result<T> = std::result::Result<T, ExportError>;
