//! Target identity resolution and capability reduction.

use caps::{CapSet, Capability, CapsHashSet};
use nix::unistd::{Gid, Group, Uid, User, getgid, getuid};

use burrow_common::error::{BurrowError, Result};

/// The uid/gid pair the contained process finally runs as.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Identity {
    /// Target user id.
    pub uid: Uid,
    /// Target group id.
    pub gid: Gid,
}

impl Identity {
    /// The invoking process's real uid/gid, the default when no explicit
    /// user or group is requested.
    #[must_use]
    pub fn current() -> Self {
        Self {
            uid: getuid(),
            gid: getgid(),
        }
    }
}

/// Resolves the final identity from optional user/group selectors.
///
/// Each selector is either a numeric id (used verbatim — the id may only
/// exist inside the container image) or a name looked up against the
/// host's user/group databases.
///
/// # Errors
///
/// Returns [`BurrowError::IdentityNotFound`] when a name does not
/// resolve, or [`BurrowError::Io`] when the lookup itself fails.
pub fn resolve_identity(user: Option<&str>, group: Option<&str>) -> Result<Identity> {
    let mut identity = Identity::current();
    if let Some(selector) = group {
        identity.gid = lookup_group(selector)?;
    }
    if let Some(selector) = user {
        identity.uid = lookup_user(selector)?;
    }
    tracing::debug!(
        uid = identity.uid.as_raw(),
        gid = identity.gid.as_raw(),
        "resolved target identity"
    );
    Ok(identity)
}

/// Resolves a user selector (numeric id or name) to a uid.
///
/// # Errors
///
/// Returns [`BurrowError::IdentityNotFound`] for an unknown name.
pub fn lookup_user(selector: &str) -> Result<Uid> {
    if let Ok(raw) = selector.parse::<u32>() {
        return Ok(Uid::from_raw(raw));
    }
    match User::from_name(selector) {
        Ok(Some(user)) => Ok(user.uid),
        Ok(None) => Err(BurrowError::IdentityNotFound {
            kind: "user",
            name: selector.to_string(),
        }),
        Err(errno) => Err(BurrowError::Io {
            path: "/etc/passwd".into(),
            source: std::io::Error::from_raw_os_error(errno as i32),
        }),
    }
}

/// Resolves a group selector (numeric id or name) to a gid.
///
/// # Errors
///
/// Returns [`BurrowError::IdentityNotFound`] for an unknown name.
pub fn lookup_group(selector: &str) -> Result<Gid> {
    if let Ok(raw) = selector.parse::<u32>() {
        return Ok(Gid::from_raw(raw));
    }
    match Group::from_name(selector) {
        Ok(Some(group)) => Ok(group.gid),
        Ok(None) => Err(BurrowError::IdentityNotFound {
            kind: "group",
            name: selector.to_string(),
        }),
        Err(errno) => Err(BurrowError::Io {
            path: "/etc/group".into(),
            source: std::io::Error::from_raw_os_error(errno as i32),
        }),
    }
}

/// Removes every capability outside `keep` from the bounding set, then
/// narrows the effective and permitted sets to `keep`.
///
/// Must run after chroot (dropping `CAP_SYS_CHROOT` first would wedge the
/// sequence) and before the identity drop (which still needs
/// `CAP_SETGID`/`CAP_SETUID` from the retained set).
///
/// # Errors
///
/// Returns [`BurrowError::CapabilityDrop`] on any capability syscall
/// failure; the caller must treat this as fatal.
pub fn drop_capabilities(keep: &[Capability]) -> Result<()> {
    let retained: CapsHashSet = keep.iter().copied().collect();

    for capability in caps::all() {
        if retained.contains(&capability) {
            continue;
        }
        caps::drop(None, CapSet::Bounding, capability).map_err(|e| {
            BurrowError::CapabilityDrop {
                message: format!("dropping {capability} from bounding set: {e}"),
            }
        })?;
    }

    caps::set(None, CapSet::Effective, &retained).map_err(|e| BurrowError::CapabilityDrop {
        message: format!("narrowing effective set: {e}"),
    })?;
    caps::set(None, CapSet::Permitted, &retained).map_err(|e| BurrowError::CapabilityDrop {
        message: format!("narrowing permitted set: {e}"),
    })?;

    tracing::debug!(retained = retained.len(), "capability sets reduced");
    Ok(())
}

#[cfg(test)]
mod tests {
    #![allow(clippy::expect_used)]

    use super::*;

    #[test]
    fn numeric_selectors_are_used_verbatim() {
        assert_eq!(lookup_user("1234").expect("uid"), Uid::from_raw(1234));
        assert_eq!(lookup_group("0").expect("gid"), Gid::from_raw(0));
    }

    #[test]
    fn unknown_names_fail_with_identity_not_found() {
        let result = lookup_user("no-such-user-aezakmi");
        assert!(matches!(
            result,
            Err(BurrowError::IdentityNotFound { kind: "user", .. })
        ));

        let result = lookup_group("no-such-group-aezakmi");
        assert!(matches!(
            result,
            Err(BurrowError::IdentityNotFound { kind: "group", .. })
        ));
    }

    #[test]
    fn defaults_are_the_real_ids() {
        let identity = resolve_identity(None, None).expect("resolve");
        assert_eq!(identity.uid, getuid());
        assert_eq!(identity.gid, getgid());
    }

    #[test]
    fn root_user_resolves_by_name() {
        let uid = lookup_user("root").expect("root exists");
        assert_eq!(uid, Uid::from_raw(0));
    }
}
