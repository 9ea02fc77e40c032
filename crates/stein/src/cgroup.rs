//! Cgroup controllers and the subsystem collaborator interface.
//!
//! The engine never touches cgroup files itself; it tracks which controllers
//! a container needs and asks the per-subsystem collaborator for counters
//! and capability flags.

use std::collections::BTreeMap;
use std::path::PathBuf;

use bitflags::bitflags;

use stein_common::{SteinError, SteinResult};

bitflags! {
    /// Cgroup subsystems a container may require.
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
    pub struct Controllers: u32 {
        /// memory
        const MEMORY = 1 << 0;
        /// cpu
        const CPU = 1 << 1;
        /// cpuacct
        const CPUACCT = 1 << 2;
        /// cpuset
        const CPUSET = 1 << 3;
        /// blkio
        const BLKIO = 1 << 4;
        /// net_cls
        const NETCLS = 1 << 5;
        /// devices
        const DEVICES = 1 << 6;
        /// pids
        const PIDS = 1 << 7;
        /// hugetlb
        const HUGETLB = 1 << 8;
        /// freezer
        const FREEZER = 1 << 9;
    }
}

const CONTROLLER_NAMES: &[(Controllers, &str)] = &[
    (Controllers::MEMORY, "memory"),
    (Controllers::CPU, "cpu"),
    (Controllers::CPUACCT, "cpuacct"),
    (Controllers::CPUSET, "cpuset"),
    (Controllers::BLKIO, "blkio"),
    (Controllers::NETCLS, "net_cls"),
    (Controllers::DEVICES, "devices"),
    (Controllers::PIDS, "pids"),
    (Controllers::HUGETLB, "hugetlb"),
    (Controllers::FREEZER, "freezer"),
];

impl Controllers {
    /// Stable type string of a single controller.
    #[must_use]
    pub fn type_name(self) -> &'static str {
        CONTROLLER_NAMES
            .iter()
            .find(|(c, _)| *c == self)
            .map_or("?", |(_, name)| name)
    }

    /// Format a mask as a `;`-separated controller list.
    #[must_use]
    pub fn format(self) -> String {
        let mut parts = Vec::new();
        for (flag, name) in CONTROLLER_NAMES {
            if self.contains(*flag) {
                parts.push(*name);
            }
        }
        parts.join(";")
    }

    /// Parse a `;`-separated controller list.
    pub fn parse(s: &str) -> SteinResult<Self> {
        let mut mask = Controllers::empty();
        for token in stein_common::value::split_escaped(s, ';') {
            let flag = CONTROLLER_NAMES
                .iter()
                .find(|(_, name)| *name == token)
                .map(|(flag, _)| *flag)
                .ok_or_else(|| {
                    SteinError::invalid_value(format!("Unknown controller: {token}"))
                })?;
            mask |= flag;
        }
        Ok(mask)
    }

    /// Iterate the individual controllers present in the mask.
    pub fn each(self) -> impl Iterator<Item = Controllers> {
        CONTROLLER_NAMES
            .iter()
            .map(|(flag, _)| *flag)
            .filter(move |flag| self.contains(*flag))
    }
}

/// Per-device block I/O counters.
#[derive(Debug, Clone, Default)]
pub struct DiskStat {
    /// Device name or id.
    pub device: String,
    /// Bytes read.
    pub read_bytes: u64,
    /// Bytes written.
    pub write_bytes: u64,
    /// Read operations.
    pub read_ops: u64,
    /// Write operations.
    pub write_ops: u64,
}

/// One kernel cgroup subsystem as seen by the engine.
///
/// Capability flags describe what the host kernel supports; counter calls
/// are expected to return synchronously on the calling thread.
pub trait Subsystem: Send + Sync {
    /// The single controller flag this subsystem implements.
    fn controller(&self) -> Controllers;

    /// Whether the subsystem is present on this host at all.
    fn supported(&self) -> bool {
        true
    }

    /// memory: low-limit (guarantee) knob available.
    fn supports_guarantee(&self) -> bool {
        false
    }

    /// memory: anonymous-memory limit knob available.
    fn supports_anon_limit(&self) -> bool {
        false
    }

    /// memory: dirty page-cache limit knob available.
    fn supports_dirty_limit(&self) -> bool {
        false
    }

    /// memory: filesystem bandwidth accounting available.
    fn supports_io_limit(&self) -> bool {
        false
    }

    /// memory: page-fault recharge knob available.
    fn supports_recharge_on_pgfault(&self) -> bool {
        false
    }

    /// cpu: nice-based approximation of real-time scheduling allowed.
    fn has_smart(&self) -> bool {
        false
    }

    /// Primary usage counter (bytes for memory, ns for cpuacct).
    fn usage(&self, container: &str) -> SteinResult<u64> {
        let _ = container;
        Err(SteinError::not_supported(format!(
            "no usage counter for {}",
            self.controller().type_name()
        )))
    }

    /// System-time usage counter (cpuacct).
    fn system_usage(&self, container: &str) -> SteinResult<u64> {
        let _ = container;
        Err(SteinError::not_supported(format!(
            "no system usage counter for {}",
            self.controller().type_name()
        )))
    }

    /// Anonymous memory usage (memory).
    fn anon_usage(&self, container: &str) -> SteinResult<u64> {
        let _ = container;
        Err(SteinError::not_supported("no anon usage counter"))
    }

    /// Huge page usage (hugetlb).
    fn huge_usage(&self, container: &str) -> SteinResult<u64> {
        let _ = container;
        Err(SteinError::not_supported("no hugetlb usage counter"))
    }

    /// Raw statistics map (memory.stat and friends).
    fn statistics(&self, container: &str) -> SteinResult<BTreeMap<String, u64>> {
        let _ = container;
        Err(SteinError::not_supported(format!(
            "no statistics for {}",
            self.controller().type_name()
        )))
    }

    /// Process count (pids) or frozen-group member count (freezer).
    fn task_count(&self, container: &str) -> SteinResult<u64> {
        let _ = container;
        Err(SteinError::not_supported("no task counter"))
    }

    /// Thread count (pids).
    fn thread_count(&self, container: &str) -> SteinResult<u64> {
        let _ = container;
        Err(SteinError::not_supported("no thread counter"))
    }

    /// Per-device block I/O counters (blkio).
    fn disk_stats(&self, container: &str) -> SteinResult<Vec<DiskStat>> {
        let _ = container;
        Err(SteinError::not_supported("no disk statistics"))
    }

    /// Path of the container's cgroup within this hierarchy.
    fn cgroup_path(&self, container: &str) -> PathBuf {
        PathBuf::from("/sys/fs/cgroup")
            .join(self.controller().type_name())
            .join("stein")
            .join(container.trim_start_matches('/'))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn controller_format_parse() {
        let mask = Controllers::MEMORY | Controllers::CPU | Controllers::PIDS;
        assert_eq!(mask.format(), "memory;cpu;pids");
        assert_eq!(Controllers::parse("memory;cpu;pids").unwrap(), mask);
        assert!(Controllers::parse("gpu").is_err());
        assert_eq!(Controllers::parse("").unwrap(), Controllers::empty());
    }

    #[test]
    fn each_yields_set_flags() {
        let mask = Controllers::BLKIO | Controllers::HUGETLB;
        let flags: Vec<_> = mask.each().collect();
        assert_eq!(flags, vec![Controllers::BLKIO, Controllers::HUGETLB]);
    }

    #[test]
    fn default_cgroup_path() {
        struct Mem;
        impl Subsystem for Mem {
            fn controller(&self) -> Controllers {
                Controllers::MEMORY
            }
        }
        assert_eq!(
            Mem.cgroup_path("a/b"),
            PathBuf::from("/sys/fs/cgroup/memory/stein/a/b")
        );
    }
}
