//! # Stein container engine
//!
//! The core of the Stein container daemon: the container tree and state
//! machine, and the property engine through which clients configure and
//! inspect containers.
//!
//! Everything that touches the kernel (cgroup files, namespaces, veth
//! plumbing, the task launcher) sits behind collaborator traits; this crate
//! decides *what* must happen and verifies that it is allowed.
//!
//! ## Usage
//!
//! ```no_run
//! use stein::{ContainerTree, Engine, Host, Principal};
//!
//! # fn example(host: Host) -> stein_common::SteinResult<()> {
//! let tree = ContainerTree::new();
//! let engine = Engine::new();
//! let client = Principal::superuser();
//!
//! tree.create("worker", client.cred.clone(), host.info.has_ambient_caps)?;
//! engine.set(&tree, &host, &client, "worker", "command", "/usr/bin/worker")?;
//! engine.set(&tree, &host, &client, "worker", "memory_limit", "2G")?;
//! tree.start("worker")?;
//! # Ok(())
//! # }
//! ```

#![warn(missing_docs)]

pub mod cgroup;
pub mod client;
pub mod container;
pub mod host;
pub mod net;
pub mod property;
pub mod stats;
pub mod tree;

pub use cgroup::{Controllers, Subsystem};
pub use client::{AccessLevel, ClientSession, Principal};
pub use container::{Container, ContainerRef, ContainerState, Prop, VirtMode};
pub use host::{Host, HostInfo, StreamReader};
pub use net::{NetPlan, Network};
pub use property::{Engine, PropCtx, Property, Registry};
pub use stats::DaemonStats;
pub use tree::ContainerTree;
