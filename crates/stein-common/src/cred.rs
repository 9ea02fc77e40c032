//! User credentials and name resolution.

use std::fmt;

use serde::{Deserialize, Serialize};

use crate::error::SteinResult;

/// A principal: uid, gid, and supplementary groups.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Cred {
    /// User id.
    pub uid: u32,
    /// Primary group id.
    pub gid: u32,
    /// Supplementary group ids.
    #[serde(default)]
    pub groups: Vec<u32>,
}

impl Cred {
    /// Build a credential from uid and gid with no supplementary groups.
    #[must_use]
    pub const fn new(uid: u32, gid: u32) -> Self {
        Self {
            uid,
            gid,
            groups: Vec::new(),
        }
    }

    /// The host root credential.
    #[must_use]
    pub const fn root() -> Self {
        Self::new(0, 0)
    }

    /// True for host root.
    #[must_use]
    pub fn is_root(&self) -> bool {
        self.uid == 0
    }

    /// Whether this credential belongs to the given group, either as the
    /// primary gid or through the supplementary list.
    #[must_use]
    pub fn is_member_of(&self, gid: u32) -> bool {
        self.gid == gid || self.groups.contains(&gid)
    }

    /// Ownership check: root controls everything, otherwise the uids must
    /// match.
    #[must_use]
    pub fn can_control(&self, other: &Cred) -> bool {
        self.is_root() || self.uid == other.uid
    }
}

impl fmt::Display for Cred {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}", self.uid, self.gid)
    }
}

/// Name/id resolution, normally backed by the host user database.
pub trait UserDb: Send + Sync {
    /// Resolve a user name to a uid.
    fn user_id(&self, name: &str) -> SteinResult<u32>;

    /// Resolve a group name to a gid.
    fn group_id(&self, name: &str) -> SteinResult<u32>;

    /// Load the full credential (primary gid and supplementary groups)
    /// for a user name.
    fn load_user(&self, name: &str) -> SteinResult<Cred>;

    /// User name for a uid; falls back to the numeric form when unknown.
    fn user_name(&self, uid: u32) -> String;

    /// Group name for a gid; falls back to the numeric form when unknown.
    fn group_name(&self, gid: u32) -> String;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn membership() {
        let cred = Cred {
            uid: 1000,
            gid: 100,
            groups: vec![10, 44],
        };
        assert!(cred.is_member_of(100));
        assert!(cred.is_member_of(44));
        assert!(!cred.is_member_of(0));
    }

    #[test]
    fn control_rules() {
        let root = Cred::root();
        let alice = Cred::new(1000, 1000);
        let bob = Cred::new(1001, 1001);

        assert!(root.can_control(&alice));
        assert!(alice.can_control(&alice));
        assert!(!alice.can_control(&bob));
        assert!(!alice.can_control(&root));
    }

    #[test]
    fn display() {
        assert_eq!(Cred::new(1000, 100).to_string(), "1000:100");
    }
}
