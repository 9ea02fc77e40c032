//! Linux capability sets and their bounding arithmetic.

use std::fmt;
use std::ops::{BitAnd, BitAndAssign, BitOr, BitOrAssign};

use crate::error::{SteinError, SteinResult};
use crate::value::split_escaped;

/// Kernel capability numbers with their symbolic names.
const CAP_NAMES: &[(u32, &str)] = &[
    (0, "CHOWN"),
    (1, "DAC_OVERRIDE"),
    (2, "DAC_READ_SEARCH"),
    (3, "FOWNER"),
    (4, "FSETID"),
    (5, "KILL"),
    (6, "SETGID"),
    (7, "SETUID"),
    (8, "SETPCAP"),
    (9, "LINUX_IMMUTABLE"),
    (10, "NET_BIND_SERVICE"),
    (11, "NET_BROADCAST"),
    (12, "NET_ADMIN"),
    (13, "NET_RAW"),
    (14, "IPC_LOCK"),
    (15, "IPC_OWNER"),
    (16, "SYS_MODULE"),
    (17, "SYS_RAWIO"),
    (18, "SYS_CHROOT"),
    (19, "SYS_PTRACE"),
    (20, "SYS_PACCT"),
    (21, "SYS_ADMIN"),
    (22, "SYS_BOOT"),
    (23, "SYS_NICE"),
    (24, "SYS_RESOURCE"),
    (25, "SYS_TIME"),
    (26, "SYS_TTY_CONFIG"),
    (27, "MKNOD"),
    (28, "LEASE"),
    (29, "AUDIT_WRITE"),
    (30, "AUDIT_CONTROL"),
    (31, "SETFCAP"),
    (32, "MAC_OVERRIDE"),
    (33, "MAC_ADMIN"),
    (34, "SYSLOG"),
    (35, "WAKE_ALARM"),
    (36, "BLOCK_SUSPEND"),
    (37, "AUDIT_READ"),
];

const fn bit(n: u32) -> u64 {
    1u64 << n
}

/// A set of Linux capabilities as a bitmask over the kernel capability space.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Hash)]
pub struct Capabilities {
    bits: u64,
}

impl Capabilities {
    /// The empty set.
    pub const NONE: Self = Self { bits: 0 };

    /// Build a set from raw bits.
    #[must_use]
    pub const fn from_bits(bits: u64) -> Self {
        Self { bits }
    }

    /// Raw bitmask.
    #[must_use]
    pub const fn bits(&self) -> u64 {
        self.bits
    }

    /// True when no capability is present.
    #[must_use]
    pub const fn is_empty(&self) -> bool {
        self.bits == 0
    }

    /// Subset test: every capability in `self` is also in `other`.
    #[must_use]
    pub const fn subset_of(&self, other: Self) -> bool {
        self.bits & !other.bits == 0
    }

    /// Capabilities in `self` that are not in `other`.
    #[must_use]
    pub const fn difference(&self, other: Self) -> Self {
        Self {
            bits: self.bits & !other.bits,
        }
    }

    /// Parse a `;`-separated list of capability names. The canonical form
    /// has no `CAP_` prefix, but the prefixed spelling is accepted too.
    pub fn parse(s: &str) -> SteinResult<Self> {
        let mut bits = 0;
        for token in split_escaped(s, ';') {
            let name = token.to_ascii_uppercase();
            let name = name.strip_prefix("CAP_").unwrap_or(&name);
            let n = CAP_NAMES
                .iter()
                .find(|(_, cap)| *cap == name)
                .map(|(n, _)| *n)
                .ok_or_else(|| {
                    SteinError::invalid_value(format!("Unknown capability: {token}"))
                })?;
            bits |= bit(n);
        }
        Ok(Self { bits })
    }

    /// Format as `;`-separated names; bits outside the known space render
    /// as trailing hex.
    #[must_use]
    pub fn format(&self) -> String {
        let mut rest = self.bits;
        let mut parts = Vec::new();
        for &(n, name) in CAP_NAMES {
            if rest & bit(n) != 0 {
                parts.push(name.to_string());
                rest &= !bit(n);
            }
        }
        if rest != 0 {
            parts.push(format!("{rest:x}"));
        }
        parts.join(";")
    }
}

impl BitOr for Capabilities {
    type Output = Self;
    fn bitor(self, rhs: Self) -> Self {
        Self {
            bits: self.bits | rhs.bits,
        }
    }
}

impl BitOrAssign for Capabilities {
    fn bitor_assign(&mut self, rhs: Self) {
        self.bits |= rhs.bits;
    }
}

impl BitAnd for Capabilities {
    type Output = Self;
    fn bitand(self, rhs: Self) -> Self {
        Self {
            bits: self.bits & rhs.bits,
        }
    }
}

impl BitAndAssign for Capabilities {
    fn bitand_assign(&mut self, rhs: Self) {
        self.bits &= rhs.bits;
    }
}

impl fmt::Display for Capabilities {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.format())
    }
}

/// Every capability the kernel space knows about.
#[must_use]
pub fn all_capabilities() -> Capabilities {
    let mut bits = 0;
    for &(n, _) in CAP_NAMES {
        bits |= bit(n);
    }
    Capabilities::from_bits(bits)
}

/// Default bounding set for os-mode containers: enough to run an init
/// hierarchy short of controlling the host kernel.
#[must_use]
pub fn os_mode_capabilities() -> Capabilities {
    Capabilities::from_bits(
        bit(0)  // CHOWN
            | bit(1) // DAC_OVERRIDE
            | bit(3) // FOWNER
            | bit(4) // FSETID
            | bit(5) // KILL
            | bit(6) // SETGID
            | bit(7) // SETUID
            | bit(8) // SETPCAP
            | bit(9) // LINUX_IMMUTABLE
            | bit(10) // NET_BIND_SERVICE
            | bit(11) // NET_BROADCAST
            | bit(12) // NET_ADMIN
            | bit(13) // NET_RAW
            | bit(14) // IPC_LOCK
            | bit(15) // IPC_OWNER
            | bit(18) // SYS_CHROOT
            | bit(19) // SYS_PTRACE
            | bit(23) // SYS_NICE
            | bit(24) // SYS_RESOURCE
            | bit(27) // MKNOD
            | bit(28) // LEASE
            | bit(29) // AUDIT_WRITE
            | bit(31), // SETFCAP
    )
}

/// Default bounding set for app-mode containers owned by unprivileged
/// users: what a set-uid binary could acquire anyway.
#[must_use]
pub fn suid_capabilities() -> Capabilities {
    Capabilities::from_bits(
        bit(0)  // CHOWN
            | bit(1) // DAC_OVERRIDE
            | bit(3) // FOWNER
            | bit(4) // FSETID
            | bit(5) // KILL
            | bit(6) // SETGID
            | bit(7) // SETUID
            | bit(10) // NET_BIND_SERVICE
            | bit(12) // NET_ADMIN
            | bit(13) // NET_RAW
            | bit(14) // IPC_LOCK
            | bit(18) // SYS_CHROOT
            | bit(19) // SYS_PTRACE
            | bit(23) // SYS_NICE
            | bit(24) // SYS_RESOURCE
            | bit(29), // AUDIT_WRITE
    )
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parse_and_format() {
        let caps = Capabilities::parse("NET_ADMIN;SYS_PTRACE").unwrap();
        assert_eq!(caps.format(), "NET_ADMIN;SYS_PTRACE");
        assert_eq!(Capabilities::parse("CAP_NET_ADMIN").unwrap().format(), "NET_ADMIN");
        assert_eq!(Capabilities::parse("net_admin").unwrap().format(), "NET_ADMIN");
        assert!(Capabilities::parse("FLY").is_err());
        assert_eq!(Capabilities::parse("").unwrap(), Capabilities::NONE);
    }

    #[test]
    fn set_arithmetic() {
        let a = Capabilities::parse("NET_ADMIN;SYS_ADMIN").unwrap();
        let b = Capabilities::parse("NET_ADMIN;SYS_PTRACE").unwrap();

        assert_eq!((a & b).format(), "NET_ADMIN");
        assert_eq!((a | b).format(), "NET_ADMIN;SYS_PTRACE;SYS_ADMIN");
        assert_eq!(a.difference(b).format(), "SYS_ADMIN");
        assert!((a & b).subset_of(a));
        assert!(!a.subset_of(b));
    }

    #[test]
    fn reference_sets_nest() {
        assert!(suid_capabilities().subset_of(os_mode_capabilities()));
        assert!(os_mode_capabilities().subset_of(all_capabilities()));
        assert!(!all_capabilities().subset_of(os_mode_capabilities()));
    }

    #[test]
    fn unknown_bits_format_as_hex() {
        let caps = Capabilities::from_bits(1 << 63 | 1 << 12);
        assert_eq!(caps.format(), "NET_ADMIN;8000000000000000");
    }
}
