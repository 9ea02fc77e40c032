//! Container network plans and the network collaborator interface.

use std::collections::BTreeMap;

use stein_common::value::{split_escaped, split_multi};
use stein_common::{SteinError, SteinResult};

/// One declaration from the `net` property.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum NetDecl {
    /// No network at all.
    None,
    /// Share the parent's network namespace.
    Inherited,
    /// Move an existing host interface into the container.
    Steal {
        /// Interface to move.
        name: String,
    },
    /// Join another container's network namespace.
    Container {
        /// Target container name.
        name: String,
    },
    /// New macvlan on a host master device.
    Macvlan {
        /// Host master device.
        master: String,
        /// Interface name inside the container.
        name: String,
        /// bridge, private, vepa or passthru.
        mode: Option<String>,
        /// Optional MTU.
        mtu: Option<u32>,
        /// Optional hardware address.
        hw: Option<String>,
    },
    /// New ipvlan on a host master device.
    Ipvlan {
        /// Host master device.
        master: String,
        /// Interface name inside the container.
        name: String,
        /// l2 or l3.
        mode: Option<String>,
        /// Optional MTU.
        mtu: Option<u32>,
    },
    /// veth pair attached to a host bridge.
    Veth {
        /// Interface name inside the container.
        name: String,
        /// Host bridge to attach to.
        bridge: String,
        /// Optional MTU.
        mtu: Option<u32>,
        /// Optional hardware address.
        hw: Option<String>,
    },
    /// Routed L3 interface.
    L3 {
        /// Interface name inside the container.
        name: String,
        /// Optional host master device.
        master: Option<String>,
    },
    /// NAT through the host.
    Nat {
        /// Optional interface name.
        name: Option<String>,
    },
    /// Override MTU of a declared interface.
    Mtu {
        /// Interface the override applies to.
        name: String,
        /// The MTU value.
        mtu: u32,
    },
    /// SLAAC autoconfiguration for an interface.
    Autoconf {
        /// Interface name.
        name: String,
    },
    /// Join a named host network namespace.
    Netns {
        /// Namespace name.
        name: String,
    },
}

/// A parsed `net` property value.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct NetPlan {
    /// Declarations in client order.
    pub decls: Vec<NetDecl>,
}

fn parse_mtu(s: &str) -> SteinResult<u32> {
    s.parse()
        .map_err(|_| SteinError::invalid_value(format!("Invalid mtu: {s}")))
}

fn arity(tuple: &[String], min: usize, max: usize) -> SteinResult<()> {
    if tuple.len() < min || tuple.len() > max {
        Err(SteinError::invalid_value(format!(
            "Invalid net declaration: {}",
            tuple.join(" ")
        )))
    } else {
        Ok(())
    }
}

impl NetPlan {
    /// Parse the full `net` grammar:
    /// `none | inherited | steal <name> | container <name> |
    /// macvlan <master> <name> [mode] [mtu] [hw] |
    /// ipvlan <master> <name> [l2|l3] [mtu] | veth <name> <bridge> [mtu] [hw] |
    /// L3 <name> [master] | NAT [name] | MTU <name> <mtu> |
    /// autoconf <name> | netns <name>`, declarations separated by `;`.
    pub fn parse(s: &str) -> SteinResult<Self> {
        let mut decls = Vec::new();
        for tuple in split_multi(s, ' ', ';') {
            let Some(kind) = tuple.first() else {
                continue;
            };
            let decl = match kind.as_str() {
                "none" => {
                    arity(&tuple, 1, 1)?;
                    NetDecl::None
                }
                "inherited" => {
                    arity(&tuple, 1, 1)?;
                    NetDecl::Inherited
                }
                "steal" => {
                    arity(&tuple, 2, 2)?;
                    NetDecl::Steal {
                        name: tuple[1].clone(),
                    }
                }
                "container" => {
                    arity(&tuple, 2, 2)?;
                    NetDecl::Container {
                        name: tuple[1].clone(),
                    }
                }
                "macvlan" => {
                    arity(&tuple, 3, 6)?;
                    let mode = tuple.get(3).cloned();
                    if let Some(mode) = &mode {
                        if !matches!(mode.as_str(), "bridge" | "private" | "vepa" | "passthru") {
                            return Err(SteinError::invalid_value(format!(
                                "Invalid macvlan mode: {mode}"
                            )));
                        }
                    }
                    NetDecl::Macvlan {
                        master: tuple[1].clone(),
                        name: tuple[2].clone(),
                        mode,
                        mtu: tuple.get(4).map(|s| parse_mtu(s)).transpose()?,
                        hw: tuple.get(5).cloned(),
                    }
                }
                "ipvlan" => {
                    arity(&tuple, 3, 5)?;
                    let mode = tuple.get(3).cloned();
                    if let Some(mode) = &mode {
                        if !matches!(mode.as_str(), "l2" | "l3") {
                            return Err(SteinError::invalid_value(format!(
                                "Invalid ipvlan mode: {mode}"
                            )));
                        }
                    }
                    NetDecl::Ipvlan {
                        master: tuple[1].clone(),
                        name: tuple[2].clone(),
                        mode,
                        mtu: tuple.get(4).map(|s| parse_mtu(s)).transpose()?,
                    }
                }
                "veth" => {
                    arity(&tuple, 3, 5)?;
                    NetDecl::Veth {
                        name: tuple[1].clone(),
                        bridge: tuple[2].clone(),
                        mtu: tuple.get(3).map(|s| parse_mtu(s)).transpose()?,
                        hw: tuple.get(4).cloned(),
                    }
                }
                "L3" => {
                    arity(&tuple, 2, 3)?;
                    NetDecl::L3 {
                        name: tuple[1].clone(),
                        master: tuple.get(2).cloned(),
                    }
                }
                "NAT" => {
                    arity(&tuple, 1, 2)?;
                    NetDecl::Nat {
                        name: tuple.get(1).cloned(),
                    }
                }
                "MTU" => {
                    arity(&tuple, 3, 3)?;
                    NetDecl::Mtu {
                        name: tuple[1].clone(),
                        mtu: parse_mtu(&tuple[2])?,
                    }
                }
                "autoconf" => {
                    arity(&tuple, 2, 2)?;
                    NetDecl::Autoconf {
                        name: tuple[1].clone(),
                    }
                }
                "netns" => {
                    arity(&tuple, 2, 2)?;
                    NetDecl::Netns {
                        name: tuple[1].clone(),
                    }
                }
                other => {
                    return Err(SteinError::invalid_value(format!(
                        "Unknown net declaration: {other}"
                    )))
                }
            };
            decls.push(decl);
        }
        Ok(Self { decls })
    }

    /// True when the plan keeps the parent's namespace (the default).
    #[must_use]
    pub fn inherited(&self) -> bool {
        self.decls.is_empty() || self.decls.iter().all(|d| *d == NetDecl::Inherited)
    }
}

/// Validate the `ip` property: `<interface> <ip>/<prefix>; ...`.
pub fn parse_ip_list(s: &str) -> SteinResult<Vec<String>> {
    let entries = split_escaped(s, ';');
    for entry in &entries {
        let fields = split_escaped(entry, ' ');
        if fields.len() != 2 || !fields[1].contains('/') {
            return Err(SteinError::invalid_value(format!(
                "Invalid ip configuration: {entry}"
            )));
        }
    }
    Ok(entries)
}

/// Validate the `default_gw` property: `<interface> <ip>; ...`.
pub fn parse_gw_list(s: &str) -> SteinResult<Vec<String>> {
    let entries = split_escaped(s, ';');
    for entry in &entries {
        let fields = split_escaped(entry, ' ');
        if fields.len() != 2 {
            return Err(SteinError::invalid_value(format!(
                "Invalid gateway configuration: {entry}"
            )));
        }
    }
    Ok(entries)
}

/// Per-interface traffic counter families.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum NetStatKind {
    /// Shaped tx bytes.
    Bytes,
    /// Shaped tx packets.
    Packets,
    /// Shaped tx drops.
    Drops,
    /// Shaper overlimit events.
    Overlimits,
    /// Device rx bytes.
    RxBytes,
    /// Device rx packets.
    RxPackets,
    /// Device rx drops.
    RxDrops,
    /// Device tx bytes.
    TxBytes,
    /// Device tx packets.
    TxPackets,
    /// Device tx drops.
    TxDrops,
}

/// A host network device visible to the engine.
#[derive(Debug, Clone)]
pub struct NetDevice {
    /// Interface name.
    pub name: String,
    /// Whether stein manages its traffic classes.
    pub managed: bool,
}

/// The network collaborator. Reads snapshot device state under the
/// collaborator's own lock.
pub trait Network: Send + Sync {
    /// Devices currently known to the daemon.
    fn devices(&self) -> Vec<NetDevice>;

    /// Per-interface counters of one family for a container.
    fn net_stat(
        &self,
        container: &str,
        kind: NetStatKind,
    ) -> SteinResult<BTreeMap<String, u64>>;
}
