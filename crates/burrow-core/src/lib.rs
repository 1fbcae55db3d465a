//! # burrow-core
//!
//! The container runtime core: the ordered sequence of privileged
//! operations that turns an exported filesystem tree into a running,
//! privilege-reduced process.
//!
//! The modules map one-to-one onto the steps of the `run` sequence:
//! - [`rootdir`]: validate and canonicalize the target root.
//! - [`bind`]: parse bind-mount specs from manifest and CLI input.
//! - [`mount`] / [`mountinfo`]: idempotent mount application and the
//!   reverse teardown, backed by the live mount table.
//! - [`device`]: fabricate the minimal `/dev` character nodes.
//! - [`privilege`]: resolve the target identity and reduce capabilities.
//! - [`environ`]: merge the persisted environment manifest with overrides.
//! - [`launch`]: the terminal chroot → capability drop → identity drop →
//!   exec pipeline.
//!
//! Everything here is strictly sequential; nothing retries, and a failure
//! after the first mutating step leaves cleanup to a later `teardown`.

pub mod bind;
pub mod device;
pub mod environ;
pub mod launch;
pub mod mount;
pub mod mountinfo;
pub mod privilege;
pub mod rootdir;
