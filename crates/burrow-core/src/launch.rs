//! The terminal launch pipeline: chroot, capability drop, identity drop,
//! exec.
//!
//! The four privilege-reducing steps form a one-way sequence, not a set
//! of freely callable functions: chroot needs `CAP_SYS_CHROOT`, the
//! identity drop needs `CAP_SETGID`/`CAP_SETUID` from the retained
//! capability set, and once uid/gid are dropped nothing can be regained.
//! Each step therefore hands back a proof token required by the next one;
//! the token types are private to this module, so a caller cannot reorder
//! the sequence or skip into its middle. Exec is the terminal state — on
//! success the process image is replaced and nothing returns.

use std::convert::Infallible;
use std::ffi::CString;
use std::path::{Path, PathBuf};

use burrow_common::constants::RETAINED_CAPABILITIES;
use burrow_common::error::{BurrowError, Result};
use caps::Capability;
use nix::unistd::{Gid, Uid, chdir, chroot, execvpe, setgid, setuid};

use crate::privilege::{self, Identity};

/// Everything the launch sequence consumes. Built by the caller after all
/// validation and mount/device preparation has succeeded.
#[derive(Debug, Clone)]
pub struct LaunchPlan {
    /// Canonical root to chroot into.
    pub root: PathBuf,
    /// Identity assumed immediately before exec.
    pub identity: Identity,
    /// Whether to reduce capabilities (the opt-out flag clears this).
    pub drop_capabilities: bool,
    /// Command and arguments; the first element is the program.
    pub command: Vec<String>,
    /// Merged `KEY=VALUE` environment for the new process image.
    pub env: Vec<String>,
}

/// Syscall backend for the launch sequence.
///
/// The production implementation is [`HostPrivilegeOps`]; tests substitute
/// a recording fake to verify sequencing without privilege.
pub trait PrivilegeOps {
    /// Changes the process root and resets the working directory to `/`.
    ///
    /// # Errors
    ///
    /// Returns [`BurrowError::Chroot`] if either syscall fails.
    fn chroot(&mut self, root: &Path) -> Result<()>;

    /// Reduces the process's capability sets to `keep`.
    ///
    /// # Errors
    ///
    /// Returns [`BurrowError::CapabilityDrop`] on failure.
    fn drop_capabilities(&mut self, keep: &[Capability]) -> Result<()>;

    /// Switches the process's group id.
    ///
    /// # Errors
    ///
    /// Returns [`BurrowError::IdentityChange`] on failure.
    fn set_group(&mut self, gid: Gid) -> Result<()>;

    /// Switches the process's user id. The last privilege-reducing step.
    ///
    /// # Errors
    ///
    /// Returns [`BurrowError::IdentityChange`] on failure.
    fn set_user(&mut self, uid: Uid) -> Result<()>;

    /// Replaces the process image. Does not return on success.
    ///
    /// # Errors
    ///
    /// Returns [`BurrowError::Exec`] if the program cannot be invoked.
    fn exec(&mut self, command: &str, args: &[String], env: &[String]) -> Result<Infallible>;
}

/// Proof that the process root has been changed.
struct RootEntered(());
/// Proof that the capability-reduction step has run (or been waived).
struct CapabilitiesReduced(());
/// Proof that the target identity has been assumed.
struct IdentityAssumed(());

/// Drives the full launch sequence over the given backend.
///
/// On success this never returns: the process image has been replaced.
///
/// # Errors
///
/// Propagates the first failing step; any failure here is fatal to the
/// run and the process must not continue executing container code.
pub fn launch<O: PrivilegeOps>(ops: &mut O, plan: &LaunchPlan) -> Result<Infallible> {
    let entered = enter_root(ops, &plan.root)?;
    let reduced = reduce_capabilities(ops, entered, plan.drop_capabilities)?;
    let assumed = assume_identity(ops, reduced, plan.identity)?;
    exec(ops, assumed, plan)
}

fn enter_root<O: PrivilegeOps>(ops: &mut O, root: &Path) -> Result<RootEntered> {
    tracing::debug!(root = %root.display(), "entering root");
    ops.chroot(root)?;
    Ok(RootEntered(()))
}

fn reduce_capabilities<O: PrivilegeOps>(
    ops: &mut O,
    _entered: RootEntered,
    enabled: bool,
) -> Result<CapabilitiesReduced> {
    if enabled {
        ops.drop_capabilities(RETAINED_CAPABILITIES)?;
    } else {
        tracing::warn!("capability drop disabled; the contained process keeps full privilege");
    }
    Ok(CapabilitiesReduced(()))
}

fn assume_identity<O: PrivilegeOps>(
    ops: &mut O,
    _reduced: CapabilitiesReduced,
    identity: Identity,
) -> Result<IdentityAssumed> {
    ops.set_group(identity.gid)?;
    ops.set_user(identity.uid)?;
    Ok(IdentityAssumed(()))
}

fn exec<O: PrivilegeOps>(
    ops: &mut O,
    _assumed: IdentityAssumed,
    plan: &LaunchPlan,
) -> Result<Infallible> {
    let Some(program) = plan.command.first() else {
        return Err(BurrowError::Exec {
            command: String::new(),
            source: std::io::Error::new(std::io::ErrorKind::InvalidInput, "empty command"),
        });
    };
    ops.exec(program, &plan.command, &plan.env)
}

/// The production backend: real syscalls through `nix` and `caps`.
#[derive(Debug, Default)]
pub struct HostPrivilegeOps;

impl PrivilegeOps for HostPrivilegeOps {
    fn chroot(&mut self, root: &Path) -> Result<()> {
        chroot(root).map_err(|errno| chroot_error(root, errno))?;
        // A working directory outside the new root would remain reachable;
        // resetting it is part of the chroot step, not an optimization.
        chdir("/").map_err(|errno| chroot_error(root, errno))?;
        Ok(())
    }

    fn drop_capabilities(&mut self, keep: &[Capability]) -> Result<()> {
        privilege::drop_capabilities(keep)
    }

    fn set_group(&mut self, gid: Gid) -> Result<()> {
        setgid(gid).map_err(|errno| BurrowError::IdentityChange {
            kind: "gid",
            id: gid.as_raw(),
            source: std::io::Error::from_raw_os_error(errno as i32),
        })
    }

    fn set_user(&mut self, uid: Uid) -> Result<()> {
        setuid(uid).map_err(|errno| BurrowError::IdentityChange {
            kind: "uid",
            id: uid.as_raw(),
            source: std::io::Error::from_raw_os_error(errno as i32),
        })
    }

    fn exec(&mut self, command: &str, args: &[String], env: &[String]) -> Result<Infallible> {
        let program = to_cstring(command)?;
        let argv = args
            .iter()
            .map(|arg| to_cstring(arg))
            .collect::<Result<Vec<_>>>()?;
        let envp = env
            .iter()
            .map(|entry| to_cstring(entry))
            .collect::<Result<Vec<_>>>()?;

        match execvpe(&program, &argv, &envp) {
            Err(errno) => Err(BurrowError::Exec {
                command: command.to_string(),
                source: std::io::Error::from_raw_os_error(errno as i32),
            }),
        }
    }
}

fn chroot_error(root: &Path, errno: nix::Error) -> BurrowError {
    BurrowError::Chroot {
        root: root.to_path_buf(),
        source: std::io::Error::from_raw_os_error(errno as i32),
    }
}

fn to_cstring(value: &str) -> Result<CString> {
    CString::new(value).map_err(|_| BurrowError::Exec {
        command: value.to_string(),
        source: std::io::Error::new(
            std::io::ErrorKind::InvalidInput,
            "embedded NUL byte in argument",
        ),
    })
}

#[cfg(test)]
mod tests {
    #![allow(clippy::expect_used)]

    use super::*;

    /// Records the order of privilege transitions instead of performing
    /// them; exec "fails" so the pipeline returns and the trace can be
    /// inspected.
    #[derive(Default)]
    struct RecordingOps {
        calls: Vec<String>,
        fail_on: Option<&'static str>,
    }

    impl RecordingOps {
        fn record(&mut self, call: &str) -> Result<()> {
            self.calls.push(call.to_string());
            if self.fail_on == Some(call) {
                return Err(BurrowError::CapabilityDrop {
                    message: format!("injected failure at {call}"),
                });
            }
            Ok(())
        }
    }

    impl PrivilegeOps for RecordingOps {
        fn chroot(&mut self, _root: &Path) -> Result<()> {
            self.record("chroot")
        }

        fn drop_capabilities(&mut self, _keep: &[Capability]) -> Result<()> {
            self.record("drop_capabilities")
        }

        fn set_group(&mut self, _gid: Gid) -> Result<()> {
            self.record("set_group")
        }

        fn set_user(&mut self, _uid: Uid) -> Result<()> {
            self.record("set_user")
        }

        fn exec(&mut self, command: &str, _args: &[String], _env: &[String]) -> Result<Infallible> {
            self.calls.push("exec".to_string());
            Err(BurrowError::Exec {
                command: command.to_string(),
                source: std::io::Error::other("recording backend never execs"),
            })
        }
    }

    fn plan(drop_caps: bool) -> LaunchPlan {
        LaunchPlan {
            root: PathBuf::from("/tmp/r"),
            identity: Identity::current(),
            drop_capabilities: drop_caps,
            command: vec!["/bin/true".to_string()],
            env: vec!["FOO=2".to_string()],
        }
    }

    #[test]
    fn steps_run_in_privilege_reducing_order() {
        let mut ops = RecordingOps::default();
        let result = launch(&mut ops, &plan(true));
        assert!(matches!(result, Err(BurrowError::Exec { .. })));
        assert_eq!(
            ops.calls,
            vec!["chroot", "drop_capabilities", "set_group", "set_user", "exec"]
        );
    }

    #[test]
    fn opt_out_skips_only_the_capability_step() {
        let mut ops = RecordingOps::default();
        let _ = launch(&mut ops, &plan(false));
        assert_eq!(ops.calls, vec!["chroot", "set_group", "set_user", "exec"]);
    }

    #[test]
    fn chroot_failure_aborts_before_any_privilege_change() {
        let mut ops = RecordingOps {
            fail_on: Some("chroot"),
            ..RecordingOps::default()
        };
        let result = launch(&mut ops, &plan(true));
        assert!(result.is_err());
        assert_eq!(ops.calls, vec!["chroot"]);
    }

    #[test]
    fn capability_failure_aborts_before_identity_change() {
        let mut ops = RecordingOps {
            fail_on: Some("drop_capabilities"),
            ..RecordingOps::default()
        };
        let result = launch(&mut ops, &plan(true));
        assert!(matches!(result, Err(BurrowError::CapabilityDrop { .. })));
        assert_eq!(ops.calls, vec!["chroot", "drop_capabilities"]);
    }

    #[test]
    fn empty_command_is_rejected_at_the_terminal_step() {
        let mut ops = RecordingOps::default();
        let mut empty = plan(true);
        empty.command.clear();
        let result = launch(&mut ops, &empty);
        assert!(matches!(result, Err(BurrowError::Exec { .. })));
        // The sequence still ran; only the exec itself was refused.
        assert_eq!(ops.calls, vec!["chroot", "drop_capabilities", "set_group", "set_user"]);
    }
}
