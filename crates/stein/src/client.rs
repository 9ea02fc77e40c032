//! Client principals and management-API access levels.

use stein_common::{Cred, SteinError, SteinResult};

/// How much of the management API a container's processes may reach.
///
/// Ordered from most to least restrictive; a child may never be granted a
/// level above a `ChildOnly`-or-stricter ancestor by an unprivileged client.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub enum AccessLevel {
    /// No API access at all.
    None,
    /// Read-only introspection.
    ReadOnly,
    /// Full access, but only to the container's own children.
    ChildOnly,
    /// Full access.
    Normal,
}

impl AccessLevel {
    /// Parse the client-facing spelling.
    pub fn parse(s: &str) -> SteinResult<Self> {
        match s {
            "false" => Ok(Self::None),
            "read-only" => Ok(Self::ReadOnly),
            "child-only" => Ok(Self::ChildOnly),
            "true" => Ok(Self::Normal),
            _ => Err(SteinError::invalid_value(format!(
                "Unknown access level: {s}"
            ))),
        }
    }

    /// Client-facing spelling.
    #[must_use]
    pub fn format(self) -> &'static str {
        match self {
            Self::None => "false",
            Self::ReadOnly => "read-only",
            Self::ChildOnly => "child-only",
            Self::Normal => "true",
        }
    }
}

/// The authenticated client on whose behalf a property operation runs.
///
/// Implemented by the RPC session layer; the engine only consults it.
pub trait ClientSession: Send + Sync {
    /// The client's credential.
    fn cred(&self) -> &Cred;

    /// Host root or an administratively blessed principal.
    fn is_superuser(&self) -> bool {
        self.cred().is_root()
    }

    /// Whether the client may assign arbitrary numeric uids/gids.
    fn can_set_uid_gid(&self) -> bool;

    /// Ownership check against another credential.
    fn can_control(&self, other: &Cred) -> SteinResult<()> {
        if self.is_superuser() || self.cred().can_control(other) {
            Ok(())
        } else {
            Err(SteinError::permission(format!(
                "Client {} cannot control {other}",
                self.cred()
            )))
        }
    }

    /// Absolute name of the container the client itself runs in.
    fn container_name(&self) -> &str;

    /// Client process id, for pid-namespace translation.
    fn pid(&self) -> u32;
}

/// Plain principal used by the daemon's session layer and by tests.
#[derive(Debug, Clone)]
pub struct Principal {
    /// The client credential.
    pub cred: Cred,
    /// Whether the session was granted uid/gid assignment.
    pub set_uid_capable: bool,
    /// Absolute name of the client's own container.
    pub container: String,
    /// Client pid.
    pub pid: u32,
}

impl Principal {
    /// A host-root session from the root container.
    #[must_use]
    pub fn superuser() -> Self {
        Self {
            cred: Cred::root(),
            set_uid_capable: true,
            container: "/".to_string(),
            pid: 1,
        }
    }

    /// An unprivileged session for the given credential.
    #[must_use]
    pub fn user(cred: Cred) -> Self {
        Self {
            cred,
            set_uid_capable: false,
            container: "/".to_string(),
            pid: 1,
        }
    }
}

impl ClientSession for Principal {
    fn cred(&self) -> &Cred {
        &self.cred
    }

    fn can_set_uid_gid(&self) -> bool {
        self.set_uid_capable || self.cred.is_root()
    }

    fn container_name(&self) -> &str {
        &self.container
    }

    fn pid(&self) -> u32 {
        self.pid
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn access_level_ordering() {
        assert!(AccessLevel::None < AccessLevel::ReadOnly);
        assert!(AccessLevel::ReadOnly < AccessLevel::ChildOnly);
        assert!(AccessLevel::ChildOnly < AccessLevel::Normal);
    }

    #[test]
    fn access_level_round_trip() {
        for s in ["false", "read-only", "child-only", "true"] {
            assert_eq!(AccessLevel::parse(s).unwrap().format(), s);
        }
        assert!(AccessLevel::parse("maybe").is_err());
    }

    #[test]
    fn principal_control() {
        let root = Principal::superuser();
        let alice = Principal::user(Cred::new(1000, 1000));

        assert!(root.can_control(&Cred::new(1000, 1000)).is_ok());
        assert!(alice.can_control(&Cred::new(1000, 1000)).is_ok());
        assert!(alice.can_control(&Cred::new(1001, 1001)).is_err());
    }
}
