//! The per-container record and its lifecycle state machine.

use std::collections::BTreeMap;
use std::sync::{Arc, Weak};
use std::time::{SystemTime, UNIX_EPOCH};

use parking_lot::RwLock;

use stein_common::caps::{all_capabilities, os_mode_capabilities, suid_capabilities};
use stein_common::{Capabilities, Cred, DaemonConfig, SteinError, SteinResult};

use crate::cgroup::Controllers;
use crate::client::AccessLevel;

/// Milliseconds since the epoch.
#[must_use]
pub fn now_ms() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map_or(0, |d| d.as_millis() as u64)
}

/// Exit code reported for containers killed by the OOM killer.
pub const OOM_EXIT_CODE: i64 = -99;

/// Container lifecycle states.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ContainerState {
    /// Created or stopped; configuration is fully mutable.
    Stopped,
    /// Launcher is bringing the task up.
    Starting,
    /// The task is running.
    Running,
    /// Frozen through the freezer controller.
    Paused,
    /// The task exited; the record ages out or is destroyed.
    Dead,
}

impl ContainerState {
    /// Parse the persisted spelling.
    pub fn parse(s: &str) -> SteinResult<Self> {
        match s {
            "stopped" => Ok(Self::Stopped),
            "starting" => Ok(Self::Starting),
            "running" => Ok(Self::Running),
            "paused" => Ok(Self::Paused),
            "dead" => Ok(Self::Dead),
            _ => Err(SteinError::unknown(format!(
                "Invalid container saved state: {s}"
            ))),
        }
    }

    /// Client-facing spelling.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Stopped => "stopped",
            Self::Starting => "starting",
            Self::Running => "running",
            Self::Paused => "paused",
            Self::Dead => "dead",
        }
    }

    /// Returns true if the container can be started.
    #[must_use]
    pub const fn can_start(self) -> bool {
        matches!(self, Self::Stopped)
    }

    /// Returns true if the container can be paused.
    #[must_use]
    pub const fn can_pause(self) -> bool {
        matches!(self, Self::Running)
    }

    /// Returns true if the container can be resumed.
    #[must_use]
    pub const fn can_resume(self) -> bool {
        matches!(self, Self::Paused)
    }

    /// Returns true if the container holds a live task.
    #[must_use]
    pub const fn is_alive(self) -> bool {
        matches!(self, Self::Starting | Self::Running | Self::Paused)
    }
}

impl std::fmt::Display for ContainerState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// Application container or os-style init hierarchy.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum VirtMode {
    /// Single application.
    #[default]
    App,
    /// Init-style hierarchy with a wider default capability set.
    Os,
}

impl VirtMode {
    /// Parse `app`/`os`.
    pub fn parse(s: &str) -> SteinResult<Self> {
        match s {
            "app" => Ok(Self::App),
            "os" => Ok(Self::Os),
            _ => Err(SteinError::invalid_value(format!(
                "Unsupported virt_mode: {s}"
            ))),
        }
    }

    /// Client-facing spelling.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::App => "app",
            Self::Os => "os",
        }
    }
}

/// Access mode of a bind mount.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum BindAccess {
    /// Inherit the source mount's mode.
    #[default]
    Inherit,
    /// Remount read-only.
    ReadOnly,
    /// Remount read-write.
    ReadWrite,
}

/// One `host dest [ro|rw]` entry of the `bind` property.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BindMount {
    /// Host path.
    pub source: String,
    /// Path inside the container root.
    pub dest: String,
    /// Requested access mode.
    pub access: BindAccess,
}

/// Soft/hard pair of one resource limit; `None` means unlimited.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct UlimitEntry {
    /// Soft limit.
    pub soft: Option<u64>,
    /// Hard limit.
    pub hard: Option<u64>,
}

/// Resource names accepted by the `ulimit` property, in catalogue order.
pub const RLIMIT_NAMES: &[&str] = &[
    "as",
    "core",
    "cpu",
    "data",
    "fsize",
    "locks",
    "memlock",
    "msgqueue",
    "nice",
    "nofile",
    "nproc",
    "rss",
    "rtprio",
    "rttime",
    "sigpending",
    "stack",
];

/// One standard stream of the container task.
#[derive(Debug, Clone, Default)]
pub struct StdStream {
    /// Path inside (or outside) the container, empty for the default.
    pub path: String,
    /// Rotation limit for stored output [bytes].
    pub limit: u64,
    /// Bytes rotated away so far.
    pub offset: u64,
}

/// Kernel scheduling policy derived from `cpu_policy`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum SchedPolicy {
    /// SCHED_OTHER
    #[default]
    Other,
    /// SCHED_RR
    RoundRobin,
    /// SCHED_BATCH
    Batch,
    /// Numeric policy 4; no symbolic kernel name, host-kernel-specific.
    Iso,
    /// SCHED_IDLE
    Idle,
}

impl SchedPolicy {
    /// Raw kernel policy number.
    #[must_use]
    pub const fn raw(self) -> i32 {
        match self {
            Self::Other => 0,
            Self::RoundRobin => 2,
            Self::Batch => 3,
            Self::Iso => 4,
            Self::Idle => 5,
        }
    }
}

/// The `cpu_policy` property values.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum CpuPolicy {
    /// Real-time-ish priority.
    Rt,
    /// Elevated priority.
    High,
    /// Default scheduling.
    #[default]
    Normal,
    /// Throughput-oriented background work.
    Batch,
    /// Only idle CPU time.
    Idle,
    /// Isolated cores policy (numeric policy 4).
    Iso,
}

impl CpuPolicy {
    /// Parse the client-facing spelling.
    pub fn parse(s: &str) -> SteinResult<Self> {
        match s {
            "rt" => Ok(Self::Rt),
            "high" => Ok(Self::High),
            "normal" => Ok(Self::Normal),
            "batch" => Ok(Self::Batch),
            "idle" => Ok(Self::Idle),
            "iso" => Ok(Self::Iso),
            _ => Err(SteinError::invalid_value(format!("Invalid policy: {s}"))),
        }
    }

    /// Client-facing spelling.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Rt => "rt",
            Self::High => "high",
            Self::Normal => "normal",
            Self::Batch => "batch",
            Self::Idle => "idle",
            Self::Iso => "iso",
        }
    }

    /// Scheduling triple (policy, rt priority, nice) for this cpu policy.
    ///
    /// `smart` reflects whether the nice-based rt approximation is allowed
    /// on this host; without it `rt` falls back to SCHED_RR.
    #[must_use]
    pub fn sched_triple(self, config: &DaemonConfig, smart: bool) -> (SchedPolicy, i32, i32) {
        match self {
            Self::Normal => (SchedPolicy::Other, 0, 0),
            Self::Batch => (SchedPolicy::Batch, 0, 0),
            Self::Idle => (SchedPolicy::Idle, 0, 0),
            Self::High => (SchedPolicy::Other, 0, config.high_nice),
            Self::Rt => {
                if smart && config.enable_smart {
                    (SchedPolicy::Other, 0, config.rt_nice)
                } else {
                    (SchedPolicy::RoundRobin, config.rt_priority, 0)
                }
            }
            Self::Iso => (SchedPolicy::Iso, 0, config.high_nice),
        }
    }
}

/// Presence bits: one per property a client may have explicitly set.
///
/// Distinguishes "defaulted" from "assigned" for inheritance and for
/// filtering what gets persisted.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u32)]
#[allow(missing_docs)]
pub enum Prop {
    Command,
    TaskUser,
    TaskGroup,
    OwnerUser,
    OwnerGroup,
    Env,
    Namespace,
    Root,
    RootRo,
    Cwd,
    Umask,
    Stdin,
    Stdout,
    Stderr,
    StdoutLimit,
    MemGuarantee,
    MemLimit,
    AnonLimit,
    DirtyLimit,
    HugetlbLimit,
    RechargeOnPgfault,
    CpuPolicy,
    CpuGuarantee,
    CpuLimit,
    CpuSet,
    IoPolicy,
    IoBpsLimit,
    IoOpsLimit,
    ThreadLimit,
    NetGuarantee,
    NetLimit,
    NetPrio,
    NetTos,
    Respawn,
    MaxRespawns,
    Isolate,
    Private,
    Ulimit,
    Hostname,
    BindDns,
    Bind,
    Net,
    Devices,
    CapLimit,
    CapAmbient,
    Ip,
    DefaultGw,
    VirtMode,
    AgingTime,
    AccessLevel,
    ResolvConf,
    Weak,
    OomIsFatal,
    Controllers,
    State,
    OomKilled,
    RespawnCount,
    ExitStatus,
    RootPid,
    SeizePid,
    LoopDev,
    StartTime,
    DeathTime,
    CreationTime,
    RealStartTime,
}

impl Prop {
    const fn bit(self) -> u128 {
        1u128 << (self as u32)
    }
}

/// Shared handle to a container record.
pub type ContainerRef = Arc<RwLock<Container>>;

/// Weak handle used for the child-to-parent back-reference.
pub type ContainerWeak = Weak<RwLock<Container>>;

/// A node of the container tree.
///
/// All mutation happens under the record's write lock; cross-container
/// checks take read locks on relatives, child before parent.
#[derive(Debug)]
pub struct Container {
    /// Unique path-like name; the synthetic root is `/`.
    pub name: String,
    /// Back-reference to the parent; never extends its lifetime.
    pub parent: ContainerWeak,
    /// Strong references to children, in creation order.
    pub children: Vec<ContainerRef>,
    /// Lifecycle state.
    pub state: ContainerState,
    /// Presence bitmap over [`Prop`].
    prop_mask: u128,

    /// Principal that owns the container.
    pub owner_cred: Cred,
    /// Principal the container task runs as.
    pub task_cred: Cred,
    /// Application or os-style container.
    pub virt_mode: VirtMode,

    /// chroot target.
    pub root: String,
    /// Mount the root read-only.
    pub root_ro: bool,
    /// Working directory of the task.
    pub cwd: String,
    /// File creation mask.
    pub umask: u32,
    /// Bind mounts from host into the container.
    pub bind_mounts: Vec<BindMount>,

    /// Command executed on start.
    pub command: String,
    /// Environment as `NAME=VALUE` entries, client order preserved.
    pub env_cfg: Vec<String>,
    /// Resource limits by rlimit name.
    pub ulimits: BTreeMap<String, UlimitEntry>,
    /// Isolate pid namespace from the parent.
    pub isolate: bool,
    /// Bind host resolver files into the root.
    pub bind_dns: bool,
    /// Container hostname.
    pub hostname: String,
    /// resolv.conf override lines.
    pub resolv_conf: Vec<String>,
    /// Device access list.
    pub devices: Vec<String>,

    /// Requested CPU policy.
    pub cpu_policy: CpuPolicy,
    /// CPU hard limit [cores], 0 = unlimited.
    pub cpu_limit: f64,
    /// CPU guarantee [cores].
    pub cpu_guarantee: f64,
    /// cpuset specification.
    pub cpu_set: String,
    /// Derived kernel scheduling policy.
    pub sched_policy: SchedPolicy,
    /// Derived real-time priority.
    pub sched_prio: i32,
    /// Derived nice value.
    pub sched_nice: i32,

    /// Memory hard limit [bytes], 0 = unlimited.
    pub mem_limit: u64,
    /// Memory guarantee [bytes].
    pub mem_guarantee: u64,
    /// Anonymous memory limit [bytes].
    pub anon_mem_limit: u64,
    /// Dirty page-cache limit [bytes].
    pub dirty_mem_limit: u64,
    /// Huge page limit [bytes], 0 = unlimited.
    pub hugetlb_limit: u64,
    /// Recharge pages to the faulting container.
    pub recharge_on_pgfault: bool,

    /// I/O scheduling policy.
    pub io_policy: String,
    /// Disk bandwidth limits keyed by `fs`, disk path, or disk id.
    pub io_bps_limit: BTreeMap<String, u64>,
    /// Disk operation limits, same keys.
    pub io_ops_limit: BTreeMap<String, u64>,

    /// Thread count limit, 0 = unlimited.
    pub thread_limit: u64,

    /// Declarative interface plan (validated `net` declarations).
    pub net_prop: Vec<String>,
    /// `ip` entries.
    pub ip_list: Vec<String>,
    /// `default_gw` entries.
    pub default_gw: Vec<String>,
    /// Network guarantee per interface [Bps].
    pub net_guarantee: BTreeMap<String, u64>,
    /// Network limit per interface [Bps].
    pub net_limit: BTreeMap<String, u64>,
    /// Network priority per interface, each at most 7.
    pub net_priority: BTreeMap<String, u64>,

    /// Capability bounding set.
    pub cap_limit: Capabilities,
    /// Ambient capabilities to raise.
    pub cap_ambient: Capabilities,
    /// Derived: what this container may be granted at all.
    pub cap_allowed: Capabilities,

    /// Respawn the task when it dies.
    pub to_respawn: bool,
    /// Respawn budget, negative = unlimited.
    pub max_respawns: i64,
    /// Time a dead record lingers before auto-removal [ms].
    pub aging_time: u64,
    /// Destroy when the owning client disconnects.
    pub is_weak: bool,
    /// Treat OOM kill as fatal for the whole subtree.
    pub oom_is_fatal: bool,
    /// Management API ceiling for the container's processes.
    pub access_level: AccessLevel,
    /// Name prefix under which children are exposed.
    pub ns_name: String,
    /// Opaque user string, length-capped.
    pub private: String,

    /// Standard input stream.
    pub stdin: StdStream,
    /// Standard output stream.
    pub stdout: StdStream,
    /// Standard error stream.
    pub stderr: StdStream,

    /// Controllers the configuration requires.
    pub controllers: Controllers,
    /// Subset that must stay enabled.
    pub required_controllers: Controllers,

    /// Main task pid in the host namespace.
    pub task_pid: u32,
    /// Main task pid in the container's own namespace.
    pub task_vpid: u32,
    /// Pid the daemon waits on.
    pub wait_task_pid: u32,
    /// Helper pid used when seizing an existing task on restore.
    pub seize_task_pid: u32,
    /// Loop device backing the root, -1 when none.
    pub loop_dev: i32,
    /// Start time [ms since epoch].
    pub start_time: u64,
    /// Death time [ms since epoch].
    pub death_time: u64,
    /// Creation wall-clock time [ms since epoch].
    pub real_creation_time: u64,
    /// First-start wall-clock time [ms since epoch].
    pub real_start_time: u64,
    /// Raw wait status of the exited task.
    pub exit_status: i32,
    /// errno of the last failed start, -1 when the task started cleanly.
    pub task_start_errno: i64,
    /// Task was killed by the OOM killer.
    pub oom_killed: bool,
    /// Respawns performed so far.
    pub respawn_count: u64,
    /// OOM events observed.
    pub oom_events: u64,
    /// Running containers in the subtree.
    pub running_children: u64,
    /// Clients holding a reference to this container.
    pub clients_count: u64,
    /// Traffic class id assigned by the network layer.
    pub container_tc: u32,
}

impl Container {
    /// Build a fresh record in the `Stopped` state.
    #[must_use]
    pub fn new(name: impl Into<String>, parent: ContainerWeak, owner: Cred) -> Self {
        let owner_clone = owner.clone();
        Self {
            name: name.into(),
            parent,
            children: Vec::new(),
            state: ContainerState::Stopped,
            prop_mask: 0,
            owner_cred: owner,
            task_cred: owner_clone,
            virt_mode: VirtMode::App,
            root: "/".to_string(),
            root_ro: false,
            cwd: String::new(),
            umask: 0o002,
            bind_mounts: Vec::new(),
            command: String::new(),
            env_cfg: Vec::new(),
            ulimits: BTreeMap::new(),
            isolate: true,
            bind_dns: false,
            hostname: String::new(),
            resolv_conf: Vec::new(),
            devices: Vec::new(),
            cpu_policy: CpuPolicy::Normal,
            cpu_limit: 0.0,
            cpu_guarantee: 0.0,
            cpu_set: String::new(),
            sched_policy: SchedPolicy::Other,
            sched_prio: 0,
            sched_nice: 0,
            mem_limit: 0,
            mem_guarantee: 0,
            anon_mem_limit: 0,
            dirty_mem_limit: 0,
            hugetlb_limit: 0,
            recharge_on_pgfault: false,
            io_policy: "normal".to_string(),
            io_bps_limit: BTreeMap::new(),
            io_ops_limit: BTreeMap::new(),
            thread_limit: 0,
            net_prop: Vec::new(),
            ip_list: Vec::new(),
            default_gw: Vec::new(),
            net_guarantee: BTreeMap::new(),
            net_limit: BTreeMap::new(),
            net_priority: BTreeMap::new(),
            cap_limit: Capabilities::NONE,
            cap_ambient: Capabilities::NONE,
            cap_allowed: Capabilities::NONE,
            to_respawn: false,
            max_respawns: -1,
            aging_time: 0,
            is_weak: false,
            oom_is_fatal: true,
            access_level: AccessLevel::Normal,
            ns_name: String::new(),
            private: String::new(),
            stdin: StdStream::default(),
            stdout: StdStream::default(),
            stderr: StdStream::default(),
            controllers: Controllers::FREEZER,
            required_controllers: Controllers::empty(),
            task_pid: 0,
            task_vpid: 0,
            wait_task_pid: 0,
            seize_task_pid: 0,
            loop_dev: -1,
            start_time: 0,
            death_time: 0,
            real_creation_time: now_ms(),
            real_start_time: 0,
            exit_status: 0,
            task_start_errno: -1,
            oom_killed: false,
            respawn_count: 0,
            oom_events: 0,
            running_children: 0,
            clients_count: 0,
            container_tc: 0,
        }
    }

    /// The synthetic root node.
    #[must_use]
    pub fn is_root(&self) -> bool {
        self.name == "/"
    }

    /// Name including the daemon prefix.
    #[must_use]
    pub fn absolute_name(&self) -> String {
        if self.is_root() {
            self.name.clone()
        } else {
            format!("/stein/{}", self.name)
        }
    }

    /// Concatenated namespace prefixes up the ancestor chain.
    #[must_use]
    pub fn namespace_path(&self) -> String {
        let mut prefix = self.ns_name.clone();
        let mut cursor = self.parent.clone();
        while let Some(parent) = cursor.upgrade() {
            let parent = parent.read();
            prefix = format!("{}{}", parent.ns_name, prefix);
            cursor = parent.parent.clone();
        }
        prefix
    }

    /// True once the client explicitly assigned the property.
    #[must_use]
    pub fn has_prop(&self, prop: Prop) -> bool {
        self.prop_mask & prop.bit() != 0
    }

    /// Record an explicit assignment.
    pub fn set_prop(&mut self, prop: Prop) {
        self.prop_mask |= prop.bit();
    }

    /// Drop an assignment record (value reverts to defaulted).
    pub fn clear_prop(&mut self, prop: Prop) {
        self.prop_mask &= !prop.bit();
    }

    /// Move to a new lifecycle state.
    pub fn set_state(&mut self, state: ContainerState) {
        if self.state != state {
            tracing::info!(container = %self.name, from = %self.state, to = %state,
                           "container state changed");
            self.state = state;
            self.set_prop(Prop::State);
        }
    }

    /// Intersection of every ancestor's capability bounding set.
    #[must_use]
    pub fn ancestor_cap_bound(&self) -> Capabilities {
        let mut bound = all_capabilities();
        let mut cursor = self.parent.clone();
        while let Some(parent) = cursor.upgrade() {
            let parent = parent.read();
            bound &= parent.cap_limit;
            cursor = parent.parent.clone();
        }
        bound
    }

    /// Recompute the derived capability state after a credential or
    /// virt-mode change.
    ///
    /// An explicitly-set bounding set is preserved (clamped to what the
    /// owner may hold); the ambient set is clamped to what remains allowed.
    pub fn sanitize_capabilities(&mut self, has_ambient_caps: bool) {
        let (mut allowed, mut limit) = if self.owner_cred.is_root() {
            (all_capabilities(), all_capabilities())
        } else if self.virt_mode == VirtMode::Os {
            (os_mode_capabilities(), os_mode_capabilities())
        } else {
            (suid_capabilities(), suid_capabilities())
        };

        if !self.owner_cred.is_root() {
            limit &= self.ancestor_cap_bound();
        }

        if self.has_prop(Prop::CapLimit) {
            self.cap_limit &= limit;
        } else {
            self.cap_limit = limit;
        }

        // what may still be granted is bounded by the ancestors, not by
        // the container's own (widenable) limit
        allowed &= limit;
        self.cap_allowed = allowed;
        if has_ambient_caps {
            self.cap_ambient &= allowed;
        } else {
            self.cap_ambient = Capabilities::NONE;
        }
    }

    /// Exit code mapping: OOM maps to -99, a signal to -sig, else the wait status
    /// exit byte.
    #[must_use]
    pub fn exit_code(&self) -> i64 {
        if self.oom_killed {
            return OOM_EXIT_CODE;
        }
        let sig = self.exit_status & 0x7f;
        if sig != 0 && sig != 0x7f {
            -i64::from(sig)
        } else {
            i64::from((self.exit_status >> 8) & 0xff)
        }
    }

    /// Main task pid as visible to the given client container.
    #[must_use]
    pub fn pid_for_client(&self, client_container: &str) -> u32 {
        if client_container == "/" || self.task_vpid == 0 {
            self.task_pid
        } else {
            self.task_vpid
        }
    }
}

/// Hierarchy memory guarantee of a subtree:
/// `max(own guarantee, sum of child subtrees)`.
///
/// `staged` substitutes a pending value for one node (which the caller
/// holds write-locked) without touching its lock; the staged node's own
/// children must be folded in by the caller via [`staged_subtree_guarantee`].
#[must_use]
pub fn hierarchy_mem_guarantee(node: &ContainerRef, staged: Option<(&ContainerRef, u64)>) -> u64 {
    if let Some((target, value)) = staged {
        if Arc::ptr_eq(node, target) {
            return value;
        }
    }
    let ct = node.read();
    let children_sum: u64 = ct
        .children
        .iter()
        .map(|child| hierarchy_mem_guarantee(child, staged))
        .sum();
    ct.mem_guarantee.max(children_sum)
}

/// Subtree guarantee for a node the caller already holds, with a staged
/// own-guarantee value.
#[must_use]
pub fn staged_subtree_guarantee(ct: &Container, staged_own: u64) -> u64 {
    let children_sum: u64 = ct
        .children
        .iter()
        .map(|child| hierarchy_mem_guarantee(child, None))
        .sum();
    staged_own.max(children_sum)
}

/// Hierarchy memory limit of a subtree: the node's own limit, tightened by
/// the children's combined limit when every child subtree is bounded.
#[must_use]
pub fn hierarchy_mem_limit(node: &ContainerRef) -> u64 {
    subtree_mem_limit(&node.read())
}

/// Same computation for a node the caller already holds locked.
#[must_use]
pub fn subtree_mem_limit(ct: &Container) -> u64 {
    let mut limit = ct.mem_limit;

    let mut children_sum = 0u64;
    let mut all_bounded = !ct.children.is_empty();
    for child in &ct.children {
        let child_limit = hierarchy_mem_limit(child);
        if child_limit == 0 {
            all_bounded = false;
            break;
        }
        children_sum += child_limit;
    }

    if all_bounded && (limit == 0 || children_sum < limit) {
        limit = children_sum;
    }
    limit
}

#[cfg(test)]
mod tests {
    use super::*;

    fn leaf(name: &str) -> Container {
        Container::new(name, Weak::new(), Cred::new(1000, 1000))
    }

    #[test]
    fn state_transitions() {
        let mut ct = leaf("a");
        assert_eq!(ct.state, ContainerState::Stopped);
        assert!(ct.state.can_start());

        ct.set_state(ContainerState::Starting);
        ct.set_state(ContainerState::Running);
        assert!(ct.state.is_alive());
        assert!(ct.state.can_pause());

        ct.set_state(ContainerState::Paused);
        assert!(ct.state.can_resume());

        ct.set_state(ContainerState::Dead);
        assert!(!ct.state.is_alive());
        assert!(ct.has_prop(Prop::State));
    }

    #[test]
    fn state_round_trip() {
        for state in [
            ContainerState::Stopped,
            ContainerState::Starting,
            ContainerState::Running,
            ContainerState::Paused,
            ContainerState::Dead,
        ] {
            assert_eq!(ContainerState::parse(state.as_str()).unwrap(), state);
        }
        assert!(ContainerState::parse("meta").is_err());
    }

    #[test]
    fn prop_mask() {
        let mut ct = leaf("a");
        assert!(!ct.has_prop(Prop::MemLimit));
        ct.set_prop(Prop::MemLimit);
        assert!(ct.has_prop(Prop::MemLimit));
        assert!(!ct.has_prop(Prop::MemGuarantee));
        ct.clear_prop(Prop::MemLimit);
        assert!(!ct.has_prop(Prop::MemLimit));
    }

    #[test]
    fn exit_code_mapping() {
        let mut ct = leaf("a");

        ct.exit_status = 0x8b; // signal 11
        assert_eq!(ct.exit_code(), -11);

        ct.oom_killed = true;
        assert_eq!(ct.exit_code(), OOM_EXIT_CODE);

        ct.oom_killed = false;
        ct.exit_status = 3 << 8; // exit(3)
        assert_eq!(ct.exit_code(), 3);

        ct.exit_status = 0;
        assert_eq!(ct.exit_code(), 0);
    }

    #[test]
    fn sched_triples() {
        let config = DaemonConfig::default();
        assert_eq!(
            CpuPolicy::Normal.sched_triple(&config, true),
            (SchedPolicy::Other, 0, 0)
        );
        assert_eq!(
            CpuPolicy::Batch.sched_triple(&config, true),
            (SchedPolicy::Batch, 0, 0)
        );
        assert_eq!(
            CpuPolicy::High.sched_triple(&config, true),
            (SchedPolicy::Other, 0, config.high_nice)
        );
        assert_eq!(
            CpuPolicy::Rt.sched_triple(&config, true),
            (SchedPolicy::Other, 0, config.rt_nice)
        );
        assert_eq!(
            CpuPolicy::Rt.sched_triple(&config, false),
            (SchedPolicy::RoundRobin, config.rt_priority, 0)
        );
        let (policy, _, nice) = CpuPolicy::Iso.sched_triple(&config, true);
        assert_eq!(policy.raw(), 4);
        assert_eq!(nice, config.high_nice);
    }

    #[test]
    fn sanitize_caps_for_unprivileged_owner() {
        let mut ct = leaf("a");
        ct.sanitize_capabilities(true);
        assert_eq!(ct.cap_limit, suid_capabilities());
        assert_eq!(ct.cap_allowed, suid_capabilities());

        ct.virt_mode = VirtMode::Os;
        ct.sanitize_capabilities(true);
        assert_eq!(ct.cap_limit, os_mode_capabilities());
    }

    #[test]
    fn sanitize_preserves_explicit_limit() {
        let mut ct = leaf("a");
        ct.cap_limit = Capabilities::parse("NET_BIND_SERVICE;SYS_ADMIN").unwrap();
        ct.set_prop(Prop::CapLimit);
        ct.sanitize_capabilities(true);
        // SYS_ADMIN is not in the suid set, so it is clamped away.
        assert_eq!(ct.cap_limit.format(), "NET_BIND_SERVICE");
    }

    #[test]
    fn sanitize_root_owner_keeps_everything() {
        let mut ct = Container::new("a", Weak::new(), Cred::root());
        ct.sanitize_capabilities(true);
        assert_eq!(ct.cap_limit, all_capabilities());
    }

    #[test]
    fn hierarchy_guarantee_max_of_own_and_children() {
        let parent = Arc::new(RwLock::new(leaf("p")));
        let a = Arc::new(RwLock::new(leaf("p/a")));
        let b = Arc::new(RwLock::new(leaf("p/b")));
        a.write().mem_guarantee = 30;
        b.write().mem_guarantee = 20;
        parent.write().children = vec![a.clone(), b.clone()];

        assert_eq!(hierarchy_mem_guarantee(&parent, None), 50);
        parent.write().mem_guarantee = 80;
        assert_eq!(hierarchy_mem_guarantee(&parent, None), 80);

        // staged substitution for one child
        assert_eq!(hierarchy_mem_guarantee(&parent, Some((&a, 70))), 90);
    }

    #[test]
    fn hierarchy_limit_tightens_from_children() {
        let parent = Arc::new(RwLock::new(leaf("p")));
        let a = Arc::new(RwLock::new(leaf("p/a")));
        let b = Arc::new(RwLock::new(leaf("p/b")));
        a.write().mem_limit = 100;
        b.write().mem_limit = 50;
        parent.write().children = vec![a.clone(), b.clone()];

        assert_eq!(hierarchy_mem_limit(&parent), 150);

        b.write().mem_limit = 0;
        assert_eq!(hierarchy_mem_limit(&parent), 0);

        parent.write().mem_limit = 120;
        assert_eq!(hierarchy_mem_limit(&parent), 120);
    }
}
