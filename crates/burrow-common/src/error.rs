//! Unified error types for the Burrow workspace.
//!
//! Validation-class variants (`RootNotFound`, `InvalidBindSpec`,
//! `InvalidEnvFormat`, `IdentityNotFound`) are produced before any
//! privileged operation runs; everything else marks a failure inside the
//! mutating sequence and aborts the remainder of it.

use std::path::PathBuf;

use thiserror::Error;

/// Top-level error type shared across the workspace.
#[derive(Debug, Error)]
pub enum BurrowError {
    /// The requested root directory does not exist or is not a directory.
    #[error("no such root directory: {path}")]
    RootNotFound {
        /// Path that failed root resolution.
        path: PathBuf,
    },

    /// A bind-mount token did not match `HOST[:CONTAINER][:ro]`.
    #[error("invalid bind spec '{token}': {reason}")]
    InvalidBindSpec {
        /// The offending token as supplied.
        token: String,
        /// Why the token was rejected.
        reason: String,
    },

    /// An environment override was not of the form `KEY=VALUE`.
    #[error("invalid environment entry '{entry}': missing '='")]
    InvalidEnvFormat {
        /// The offending entry as supplied.
        entry: String,
    },

    /// A user or group name could not be resolved on the host.
    #[error("{kind} not found: {name}")]
    IdentityNotFound {
        /// Either `"user"` or `"group"`.
        kind: &'static str,
        /// The name that failed to resolve.
        name: String,
    },

    /// A mount or unmount operation failed.
    #[error("mount operation failed at {target}: {source}")]
    Mount {
        /// Mount target inside (or equal to) the prepared root.
        target: PathBuf,
        /// Underlying OS error.
        source: std::io::Error,
    },

    /// A device node could not be created.
    #[error("failed to create device node {path}: {source}")]
    DeviceCreation {
        /// Device node path inside the prepared root.
        path: PathBuf,
        /// Underlying OS error.
        source: std::io::Error,
    },

    /// The process's capability sets could not be reduced.
    ///
    /// Security-relevant: a process whose capabilities cannot be trimmed
    /// must not go on to execute the container command.
    #[error("failed to drop capabilities: {message}")]
    CapabilityDrop {
        /// Description of the failed capability operation.
        message: String,
    },

    /// Changing the process root or resetting the working directory failed.
    #[error("failed to chroot into {root}: {source}")]
    Chroot {
        /// The intended new root.
        root: PathBuf,
        /// Underlying OS error.
        source: std::io::Error,
    },

    /// Switching to the target uid or gid failed.
    #[error("failed to switch {kind} to {id}: {source}")]
    IdentityChange {
        /// Either `"uid"` or `"gid"`.
        kind: &'static str,
        /// The numeric id that could not be assumed.
        id: u32,
        /// Underlying OS error.
        source: std::io::Error,
    },

    /// Replacing the process image failed.
    #[error("failed to exec {command}: {source}")]
    Exec {
        /// The command that could not be executed.
        command: String,
        /// Underlying OS error.
        source: std::io::Error,
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

/// Convenience alias used throughout the workspace.
pub type Result<T> = std::result::Result<T, BurrowError>;
