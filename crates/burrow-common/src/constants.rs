//! Security-relevant constant tables and well-known file locations.
//!
//! The capability allow-list and the device node table are the two pieces
//! of data an auditor needs to reason about what a contained process can
//! do; they live here as immutable data rather than as literals scattered
//! through the runtime core.

use caps::Capability;

/// Environment manifest read from inside the prepared root, one
/// `KEY=VALUE` per line.
pub const ENV_MANIFEST: &str = ".burrowenv";

/// Bind-mount manifest read from inside the prepared root, one
/// `HOST[:CONTAINER[:ro]]` per line.
pub const BIND_MANIFEST: &str = ".burrowbinds";

/// Marker file dropped into an empty bind source directory.
///
/// Some filesystem drivers refuse to bind-mount from a completely empty
/// directory; the marker guarantees at least one entry.
pub const BIND_KEEP_MARKER: &str = ".burrow.keep";

/// A character device fabricated under the prepared root.
#[derive(Debug, Clone, Copy)]
pub struct DeviceNode {
    /// Path relative to the root.
    pub path: &'static str,
    /// Device major number.
    pub major: u64,
    /// Device minor number.
    pub minor: u64,
}

/// The minimal `/dev` population required by contained processes.
pub const DEVICE_NODES: &[DeviceNode] = &[
    DeviceNode { path: "dev/null", major: 1, minor: 3 },
    DeviceNode { path: "dev/zero", major: 1, minor: 5 },
    DeviceNode { path: "dev/random", major: 1, minor: 9 },
    DeviceNode { path: "dev/urandom", major: 1, minor: 9 },
];

/// File mode for fabricated device nodes.
pub const DEVICE_MODE: u32 = 0o666;

/// Capabilities the contained process keeps after the drop.
///
/// `CAP_SETGID`/`CAP_SETUID` must stay in this list: the identity drop
/// happens after the capability drop and still needs them.
pub const RETAINED_CAPABILITIES: &[Capability] = &[
    Capability::CAP_CHOWN,
    Capability::CAP_DAC_OVERRIDE,
    Capability::CAP_DAC_READ_SEARCH,
    Capability::CAP_FOWNER,
    Capability::CAP_SETGID,
    Capability::CAP_SETUID,
    Capability::CAP_NET_BIND_SERVICE,
];

/// Host files copied into the root by the opt-in host-file copy, relative
/// to `/` on the host and to the root inside the container.
pub const HOST_COPY_FILES: &[&str] = &[
    "etc/group",
    "etc/passwd",
    "etc/resolv.conf",
    "etc/hosts",
];
