//! Read-only runtime observables.

use std::collections::BTreeMap;

use chrono::{DateTime, Utc};

use stein_common::value::{format_bool, format_uint_map, parse_bool};
use stein_common::{SteinError, SteinResult};

use crate::cgroup::Controllers;
use crate::container::{now_ms, staged_subtree_guarantee, subtree_mem_limit, ContainerState,
                       Prop};
use crate::host::Host;
use crate::net::NetStatKind;

use super::{PropCtx, Property, Registry};

fn format_epoch_ms(ms: u64) -> String {
    if ms == 0 {
        return String::new();
    }
    DateTime::<Utc>::from_timestamp((ms / 1000) as i64, 0)
        .map(|t| t.format("%Y-%m-%d %H:%M:%S").to_string())
        .unwrap_or_default()
}

struct State;
static STATE: State = State;

impl Property for State {
    fn name(&self) -> &'static str {
        "state"
    }
    fn desc(&self) -> &'static str {
        "Container state (ro)"
    }
    fn prop(&self) -> Option<Prop> {
        Some(Prop::State)
    }
    fn read_only(&self) -> bool {
        true
    }
    fn get(&self, ctx: &mut PropCtx) -> SteinResult<String> {
        Ok(ctx.ct.state.as_str().to_string())
    }
    fn restore(&self, ctx: &mut PropCtx, value: &str) -> SteinResult<()> {
        // only the indication is replayed; the daemon re-attaches or
        // reschedules the task separately
        ctx.ct.state = ContainerState::parse(value)?;
        ctx.ct.set_prop(Prop::State);
        Ok(())
    }
}

struct ExitStatus;
static EXIT_STATUS: ExitStatus = ExitStatus;

impl Property for ExitStatus {
    fn name(&self) -> &'static str {
        "exit_status"
    }
    fn desc(&self) -> &'static str {
        "Raw wait status of the exited task (ro)"
    }
    fn prop(&self) -> Option<Prop> {
        Some(Prop::ExitStatus)
    }
    fn read_only(&self) -> bool {
        true
    }
    fn get(&self, ctx: &mut PropCtx) -> SteinResult<String> {
        ctx.dead_readable(self.name())?;
        Ok(ctx.ct.exit_status.to_string())
    }
    fn save(&self, ctx: &mut PropCtx) -> SteinResult<String> {
        Ok(ctx.ct.exit_status.to_string())
    }
    fn restore(&self, ctx: &mut PropCtx, value: &str) -> SteinResult<()> {
        ctx.ct.exit_status = value
            .parse()
            .map_err(|_| SteinError::invalid_value(format!("Bad integer value: {value}")))?;
        ctx.ct.set_prop(Prop::ExitStatus);
        Ok(())
    }
}

struct ExitCode;
static EXIT_CODE: ExitCode = ExitCode;

impl Property for ExitCode {
    fn name(&self) -> &'static str {
        "exit_code"
    }
    fn desc(&self) -> &'static str {
        "Exit code: negative signal number, -99 for OOM kill (ro)"
    }
    fn read_only(&self) -> bool {
        true
    }
    fn get(&self, ctx: &mut PropCtx) -> SteinResult<String> {
        ctx.dead_readable(self.name())?;
        Ok(ctx.ct.exit_code().to_string())
    }
}

struct OomKilled;
static OOM_KILLED: OomKilled = OomKilled;

impl Property for OomKilled {
    fn name(&self) -> &'static str {
        "oom_killed"
    }
    fn desc(&self) -> &'static str {
        "The task was killed by the OOM killer (ro)"
    }
    fn prop(&self) -> Option<Prop> {
        Some(Prop::OomKilled)
    }
    fn read_only(&self) -> bool {
        true
    }
    fn get(&self, ctx: &mut PropCtx) -> SteinResult<String> {
        ctx.dead_readable(self.name())?;
        Ok(format_bool(ctx.ct.oom_killed).to_string())
    }
    fn save(&self, ctx: &mut PropCtx) -> SteinResult<String> {
        Ok(format_bool(ctx.ct.oom_killed).to_string())
    }
    fn restore(&self, ctx: &mut PropCtx, value: &str) -> SteinResult<()> {
        ctx.ct.oom_killed = parse_bool(value)?;
        ctx.ct.set_prop(Prop::OomKilled);
        Ok(())
    }
}

struct RespawnCount;
static RESPAWN_COUNT: RespawnCount = RespawnCount;

impl Property for RespawnCount {
    fn name(&self) -> &'static str {
        "respawn_count"
    }
    fn desc(&self) -> &'static str {
        "Respawns performed so far (ro)"
    }
    fn prop(&self) -> Option<Prop> {
        Some(Prop::RespawnCount)
    }
    fn read_only(&self) -> bool {
        true
    }
    fn get(&self, ctx: &mut PropCtx) -> SteinResult<String> {
        Ok(ctx.ct.respawn_count.to_string())
    }
    fn restore(&self, ctx: &mut PropCtx, value: &str) -> SteinResult<()> {
        ctx.ct.respawn_count = value
            .parse()
            .map_err(|_| SteinError::invalid_value(format!("Bad integer value: {value}")))?;
        ctx.ct.set_prop(Prop::RespawnCount);
        Ok(())
    }
}

struct RootPid;
static ROOT_PID: RootPid = RootPid;

impl Property for RootPid {
    fn name(&self) -> &'static str {
        "root_pid"
    }
    fn desc(&self) -> &'static str {
        "Main task pid, translated into the client's pid namespace (ro)"
    }
    fn read_only(&self) -> bool {
        true
    }
    fn get(&self, ctx: &mut PropCtx) -> SteinResult<String> {
        ctx.runtime_readable(self.name())?;
        Ok(ctx
            .ct
            .pid_for_client(ctx.client.container_name())
            .to_string())
    }
}

struct StartErrno;
static START_ERRNO: StartErrno = StartErrno;

impl Property for StartErrno {
    fn name(&self) -> &'static str {
        "start_errno"
    }
    fn desc(&self) -> &'static str {
        "errno of the last failed start (ro)"
    }
    fn read_only(&self) -> bool {
        true
    }
    fn get(&self, ctx: &mut PropCtx) -> SteinResult<String> {
        Ok(ctx.ct.task_start_errno.to_string())
    }
}

struct Time;
static TIME: Time = Time;

impl Property for Time {
    fn name(&self) -> &'static str {
        "time"
    }
    fn desc(&self) -> &'static str {
        "Running time [seconds] (ro)"
    }
    fn read_only(&self) -> bool {
        true
    }
    fn get(&self, ctx: &mut PropCtx) -> SteinResult<String> {
        ctx.runtime_readable(self.name())?;

        if ctx.ct.is_root() {
            let uptime = now_ms().saturating_sub(ctx.host.info.boot_time_ms) / 1000;
            return Ok(uptime.to_string());
        }

        // records restored from old snapshots may lack raw times;
        // materialise them on first read
        if !ctx.ct.has_prop(Prop::StartTime) {
            ctx.ct.start_time = now_ms();
            ctx.ct.set_prop(Prop::StartTime);
        }
        if !ctx.ct.has_prop(Prop::DeathTime) && ctx.ct.state == ContainerState::Dead {
            ctx.ct.death_time = now_ms();
            ctx.ct.set_prop(Prop::DeathTime);
        }

        let seconds = if ctx.ct.state == ContainerState::Dead {
            ctx.ct.death_time.saturating_sub(ctx.ct.start_time) / 1000
        } else {
            now_ms().saturating_sub(ctx.ct.start_time) / 1000
        };
        Ok(seconds.to_string())
    }
}

struct CreationTime;
static CREATION_TIME: CreationTime = CreationTime;

impl Property for CreationTime {
    fn name(&self) -> &'static str {
        "creation_time"
    }
    fn desc(&self) -> &'static str {
        "Creation wall-clock time (ro)"
    }
    fn read_only(&self) -> bool {
        true
    }
    fn get(&self, ctx: &mut PropCtx) -> SteinResult<String> {
        Ok(format_epoch_ms(ctx.ct.real_creation_time))
    }
}

struct StartTime;
static START_TIME: StartTime = StartTime;

impl Property for StartTime {
    fn name(&self) -> &'static str {
        "start_time"
    }
    fn desc(&self) -> &'static str {
        "First start wall-clock time (ro)"
    }
    fn read_only(&self) -> bool {
        true
    }
    fn get(&self, ctx: &mut PropCtx) -> SteinResult<String> {
        Ok(format_epoch_ms(ctx.ct.real_start_time))
    }
}

struct Parent;
static PARENT: Parent = Parent;

impl Property for Parent {
    fn name(&self) -> &'static str {
        "parent"
    }
    fn desc(&self) -> &'static str {
        "Parent container name (ro)"
    }
    fn read_only(&self) -> bool {
        true
    }
    fn get(&self, ctx: &mut PropCtx) -> SteinResult<String> {
        Ok(ctx
            .ct
            .parent
            .upgrade()
            .map(|p| p.read().name.clone())
            .unwrap_or_default())
    }
}

struct AbsoluteName;
static ABSOLUTE_NAME: AbsoluteName = AbsoluteName;

impl Property for AbsoluteName {
    fn name(&self) -> &'static str {
        "absolute_name"
    }
    fn desc(&self) -> &'static str {
        "Container name including the daemon namespace (ro)"
    }
    fn read_only(&self) -> bool {
        true
    }
    fn get(&self, ctx: &mut PropCtx) -> SteinResult<String> {
        Ok(ctx.ct.absolute_name())
    }
}

struct AbsoluteNamespace;
static ABSOLUTE_NAMESPACE: AbsoluteNamespace = AbsoluteNamespace;

impl Property for AbsoluteNamespace {
    fn name(&self) -> &'static str {
        "absolute_namespace"
    }
    fn desc(&self) -> &'static str {
        "Container namespace including parent namespaces (ro)"
    }
    fn read_only(&self) -> bool {
        true
    }
    fn get(&self, ctx: &mut PropCtx) -> SteinResult<String> {
        Ok(format!("/stein/{}", ctx.ct.namespace_path()))
    }
}

fn memory_stat(ctx: &PropCtx, key: &str) -> String {
    ctx.host
        .subsystem(Controllers::MEMORY)
        .and_then(|s| s.statistics(&ctx.ct.name).ok())
        .and_then(|stat| stat.get(key).copied())
        .map_or_else(|| "-1".to_string(), |v| v.to_string())
}

struct MemUsage;
static MEMORY_USAGE: MemUsage = MemUsage;

impl Property for MemUsage {
    fn name(&self) -> &'static str {
        "memory_usage"
    }
    fn desc(&self) -> &'static str {
        "Current memory usage [bytes] (ro)"
    }
    fn read_only(&self) -> bool {
        true
    }
    fn get(&self, ctx: &mut PropCtx) -> SteinResult<String> {
        ctx.runtime_readable(self.name())?;
        let subsystem = ctx
            .host
            .subsystem(Controllers::MEMORY)
            .ok_or_else(|| SteinError::not_supported("memory controller not available"))?;
        Ok(subsystem.usage(&ctx.ct.name)?.to_string())
    }
}

struct AnonUsage;
static ANON_USAGE: AnonUsage = AnonUsage;

impl Property for AnonUsage {
    fn name(&self) -> &'static str {
        "anon_usage"
    }
    fn desc(&self) -> &'static str {
        "Current anonymous memory usage [bytes] (ro)"
    }
    fn read_only(&self) -> bool {
        true
    }
    fn get(&self, ctx: &mut PropCtx) -> SteinResult<String> {
        ctx.runtime_readable(self.name())?;
        let usage = ctx
            .host
            .subsystem(Controllers::MEMORY)
            .and_then(|s| s.anon_usage(&ctx.ct.name).ok())
            .unwrap_or(0);
        Ok(usage.to_string())
    }
}

struct HugetlbUsage;
static HUGETLB_USAGE: HugetlbUsage = HugetlbUsage;

impl Property for HugetlbUsage {
    fn name(&self) -> &'static str {
        "hugetlb_usage"
    }
    fn desc(&self) -> &'static str {
        "Current huge page usage [bytes] (ro)"
    }
    fn read_only(&self) -> bool {
        true
    }
    fn supported(&self, host: &Host) -> bool {
        host.subsystem(Controllers::HUGETLB)
            .is_some_and(|s| s.supported())
    }
    fn get(&self, ctx: &mut PropCtx) -> SteinResult<String> {
        ctx.runtime_readable(self.name())?;
        let subsystem = ctx
            .host
            .subsystem(Controllers::HUGETLB)
            .ok_or_else(|| SteinError::not_supported("hugetlb controller not available"))?;
        Ok(subsystem.huge_usage(&ctx.ct.name)?.to_string())
    }
}

struct MaxRss;
static MAX_RSS: MaxRss = MaxRss;

impl Property for MaxRss {
    fn name(&self) -> &'static str {
        "max_rss"
    }
    fn desc(&self) -> &'static str {
        "Peak anonymous memory usage [bytes] (ro)"
    }
    fn read_only(&self) -> bool {
        true
    }
    fn supported(&self, host: &Host) -> bool {
        host.subsystem(Controllers::MEMORY)
            .and_then(|s| s.statistics("/").ok())
            .is_some_and(|stat| stat.contains_key("total_max_rss"))
    }
    fn get(&self, ctx: &mut PropCtx) -> SteinResult<String> {
        ctx.runtime_readable(self.name())?;
        Ok(memory_stat(ctx, "total_max_rss"))
    }
}

struct MinorFaults;
static MINOR_FAULTS: MinorFaults = MinorFaults;

impl Property for MinorFaults {
    fn name(&self) -> &'static str {
        "minor_faults"
    }
    fn desc(&self) -> &'static str {
        "Minor page faults (ro)"
    }
    fn read_only(&self) -> bool {
        true
    }
    fn get(&self, ctx: &mut PropCtx) -> SteinResult<String> {
        ctx.runtime_readable(self.name())?;
        let stat = ctx
            .host
            .subsystem(Controllers::MEMORY)
            .and_then(|s| s.statistics(&ctx.ct.name).ok());
        Ok(stat.map_or_else(
            || "-1".to_string(),
            |stat| {
                let total = stat.get("total_pgfault").copied().unwrap_or(0);
                let major = stat.get("total_pgmajfault").copied().unwrap_or(0);
                total.saturating_sub(major).to_string()
            },
        ))
    }
}

struct MajorFaults;
static MAJOR_FAULTS: MajorFaults = MajorFaults;

impl Property for MajorFaults {
    fn name(&self) -> &'static str {
        "major_faults"
    }
    fn desc(&self) -> &'static str {
        "Major page faults (ro)"
    }
    fn read_only(&self) -> bool {
        true
    }
    fn get(&self, ctx: &mut PropCtx) -> SteinResult<String> {
        ctx.runtime_readable(self.name())?;
        Ok(memory_stat(ctx, "total_pgmajfault"))
    }
}

struct CpuUsage;
static CPU_USAGE: CpuUsage = CpuUsage;

impl Property for CpuUsage {
    fn name(&self) -> &'static str {
        "cpu_usage"
    }
    fn desc(&self) -> &'static str {
        "Consumed CPU time [nanoseconds] (ro)"
    }
    fn read_only(&self) -> bool {
        true
    }
    fn get(&self, ctx: &mut PropCtx) -> SteinResult<String> {
        ctx.runtime_readable(self.name())?;
        match ctx
            .host
            .subsystem(Controllers::CPUACCT)
            .map(|s| s.usage(&ctx.ct.name))
        {
            Some(Ok(usage)) => Ok(usage.to_string()),
            _ => {
                tracing::warn!(container = %ctx.ct.name, "cannot read cpu usage");
                Ok("-1".to_string())
            }
        }
    }
}

struct CpuSystem;
static CPU_SYSTEM: CpuSystem = CpuSystem;

impl Property for CpuSystem {
    fn name(&self) -> &'static str {
        "cpu_usage_system"
    }
    fn desc(&self) -> &'static str {
        "Consumed system CPU time [nanoseconds] (ro)"
    }
    fn read_only(&self) -> bool {
        true
    }
    fn get(&self, ctx: &mut PropCtx) -> SteinResult<String> {
        ctx.runtime_readable(self.name())?;
        match ctx
            .host
            .subsystem(Controllers::CPUACCT)
            .map(|s| s.system_usage(&ctx.ct.name))
        {
            Some(Ok(usage)) => Ok(usage.to_string()),
            _ => {
                tracing::warn!(container = %ctx.ct.name, "cannot read system cpu usage");
                Ok("-1".to_string())
            }
        }
    }
}

struct ProcessCount;
static PROCESS_COUNT: ProcessCount = ProcessCount;

impl Property for ProcessCount {
    fn name(&self) -> &'static str {
        "process_count"
    }
    fn desc(&self) -> &'static str {
        "Processes in the container (ro)"
    }
    fn read_only(&self) -> bool {
        true
    }
    fn get(&self, ctx: &mut PropCtx) -> SteinResult<String> {
        ctx.runtime_readable(self.name())?;
        let subsystem = ctx
            .host
            .subsystem(Controllers::PIDS)
            .ok_or_else(|| SteinError::not_supported("pids controller not available"))?;
        Ok(subsystem.task_count(&ctx.ct.name)?.to_string())
    }
}

struct ThreadCount;
static THREAD_COUNT: ThreadCount = ThreadCount;

impl Property for ThreadCount {
    fn name(&self) -> &'static str {
        "thread_count"
    }
    fn desc(&self) -> &'static str {
        "Threads in the container (ro)"
    }
    fn read_only(&self) -> bool {
        true
    }
    fn get(&self, ctx: &mut PropCtx) -> SteinResult<String> {
        ctx.runtime_readable(self.name())?;
        let subsystem = ctx
            .host
            .subsystem(Controllers::PIDS)
            .ok_or_else(|| SteinError::not_supported("pids controller not available"))?;
        Ok(subsystem.thread_count(&ctx.ct.name)?.to_string())
    }
}

struct NetClassId;
static NET_CLASS_ID: NetClassId = NetClassId;

impl Property for NetClassId {
    fn name(&self) -> &'static str {
        "net_class_id"
    }
    fn desc(&self) -> &'static str {
        "Traffic class id of the container (ro)"
    }
    fn read_only(&self) -> bool {
        true
    }
    fn get(&self, ctx: &mut PropCtx) -> SteinResult<String> {
        ctx.runtime_readable(self.name())?;
        Ok(format!("1:{:x}", ctx.ct.container_tc))
    }
}

struct NetStat {
    name: &'static str,
    desc: &'static str,
    kind: NetStatKind,
}

impl Property for NetStat {
    fn name(&self) -> &'static str {
        self.name
    }
    fn desc(&self) -> &'static str {
        self.desc
    }
    fn read_only(&self) -> bool {
        true
    }
    fn indexable(&self) -> bool {
        true
    }
    fn get(&self, ctx: &mut PropCtx) -> SteinResult<String> {
        ctx.runtime_readable(self.name)?;
        let stat = ctx.host.network.net_stat(&ctx.ct.name, self.kind)?;
        Ok(format_uint_map(&stat))
    }
    fn get_indexed(&self, ctx: &mut PropCtx, index: &str) -> SteinResult<String> {
        ctx.runtime_readable(self.name)?;
        let stat = ctx.host.network.net_stat(&ctx.ct.name, self.kind)?;
        stat.get(index)
            .map(u64::to_string)
            .ok_or_else(|| SteinError::invalid_value(format!("network device {index} not found")))
    }
}

static NET_BYTES: NetStat = NetStat {
    name: "net_bytes",
    desc: "Shaped tx bytes: <interface>: <bytes>;... (ro)",
    kind: NetStatKind::Bytes,
};
static NET_PACKETS: NetStat = NetStat {
    name: "net_packets",
    desc: "Shaped tx packets: <interface>: <packets>;... (ro)",
    kind: NetStatKind::Packets,
};
static NET_DROPS: NetStat = NetStat {
    name: "net_drops",
    desc: "Shaped tx drops: <interface>: <packets>;... (ro)",
    kind: NetStatKind::Drops,
};
static NET_OVERLIMITS: NetStat = NetStat {
    name: "net_overlimits",
    desc: "Shaper overlimit events: <interface>: <events>;... (ro)",
    kind: NetStatKind::Overlimits,
};
static NET_RX_BYTES: NetStat = NetStat {
    name: "net_rx_bytes",
    desc: "Device rx bytes: <interface>: <bytes>;... (ro)",
    kind: NetStatKind::RxBytes,
};
static NET_RX_PACKETS: NetStat = NetStat {
    name: "net_rx_packets",
    desc: "Device rx packets: <interface>: <packets>;... (ro)",
    kind: NetStatKind::RxPackets,
};
static NET_RX_DROPS: NetStat = NetStat {
    name: "net_rx_drops",
    desc: "Device rx drops: <interface>: <packets>;... (ro)",
    kind: NetStatKind::RxDrops,
};
static NET_TX_BYTES: NetStat = NetStat {
    name: "net_tx_bytes",
    desc: "Device tx bytes: <interface>: <bytes>;... (ro)",
    kind: NetStatKind::TxBytes,
};
static NET_TX_PACKETS: NetStat = NetStat {
    name: "net_tx_packets",
    desc: "Device tx packets: <interface>: <packets>;... (ro)",
    kind: NetStatKind::TxPackets,
};
static NET_TX_DROPS: NetStat = NetStat {
    name: "net_tx_drops",
    desc: "Device tx drops: <interface>: <packets>;... (ro)",
    kind: NetStatKind::TxDrops,
};

/// Which half of the per-disk counters an I/O property reports.
#[derive(Clone, Copy)]
enum IoStatKind {
    Read,
    Write,
    Ops,
}

struct IoStat {
    name: &'static str,
    desc: &'static str,
    kind: IoStatKind,
}

impl IoStat {
    fn populate(&self, ctx: &PropCtx) -> BTreeMap<String, u64> {
        let mut map = BTreeMap::new();

        // filesystem-wide numbers come from memory controller accounting
        if let Some(stat) = ctx
            .host
            .subsystem(Controllers::MEMORY)
            .and_then(|s| s.statistics(&ctx.ct.name).ok())
        {
            let fs = match self.kind {
                IoStatKind::Read => stat
                    .get("fs_io_bytes")
                    .copied()
                    .unwrap_or(0)
                    .saturating_sub(stat.get("fs_io_write_bytes").copied().unwrap_or(0)),
                IoStatKind::Write => stat.get("fs_io_write_bytes").copied().unwrap_or(0),
                IoStatKind::Ops => stat.get("fs_io_operations").copied().unwrap_or(0),
            };
            if stat.contains_key("fs_io_bytes") || stat.contains_key("fs_io_operations") {
                map.insert("fs".to_string(), fs);
            }
        }

        if let Some(disks) = ctx
            .host
            .subsystem(Controllers::BLKIO)
            .and_then(|s| s.disk_stats(&ctx.ct.name).ok())
        {
            for disk in disks {
                let value = match self.kind {
                    IoStatKind::Read => disk.read_bytes,
                    IoStatKind::Write => disk.write_bytes,
                    IoStatKind::Ops => disk.read_ops + disk.write_ops,
                };
                map.insert(disk.device, value);
            }
        }
        map
    }
}

impl Property for IoStat {
    fn name(&self) -> &'static str {
        self.name
    }
    fn desc(&self) -> &'static str {
        self.desc
    }
    fn read_only(&self) -> bool {
        true
    }
    fn indexable(&self) -> bool {
        true
    }
    fn get(&self, ctx: &mut PropCtx) -> SteinResult<String> {
        ctx.runtime_readable(self.name)?;
        Ok(format_uint_map(&self.populate(ctx)))
    }
    fn get_indexed(&self, ctx: &mut PropCtx, index: &str) -> SteinResult<String> {
        ctx.runtime_readable(self.name)?;
        self.populate(ctx)
            .get(index)
            .map(u64::to_string)
            .ok_or_else(|| SteinError::invalid_value("Invalid subscript for property"))
    }
}

static IO_READ: IoStat = IoStat {
    name: "io_read",
    desc: "Bytes read from disk: fs|<disk>: <bytes>;... (ro)",
    kind: IoStatKind::Read,
};
static IO_WRITE: IoStat = IoStat {
    name: "io_write",
    desc: "Bytes written to disk: fs|<disk>: <bytes>;... (ro)",
    kind: IoStatKind::Write,
};
static IO_OPS: IoStat = IoStat {
    name: "io_ops",
    desc: "Disk operations: fs|<disk>: <ops>;... (ro)",
    kind: IoStatKind::Ops,
};

struct MemTotalLimit;
static MEMORY_LIMIT_TOTAL: MemTotalLimit = MemTotalLimit;

impl Property for MemTotalLimit {
    fn name(&self) -> &'static str {
        "memory_limit_total"
    }
    fn desc(&self) -> &'static str {
        "Effective memory limit for the subtree (ro)"
    }
    fn read_only(&self) -> bool {
        true
    }
    fn get(&self, ctx: &mut PropCtx) -> SteinResult<String> {
        Ok(subtree_mem_limit(ctx.ct).to_string())
    }
}

struct MemTotalGuarantee;
static MEMORY_GUARANTEE_TOTAL: MemTotalGuarantee = MemTotalGuarantee;

impl Property for MemTotalGuarantee {
    fn name(&self) -> &'static str {
        "memory_guarantee_total"
    }
    fn desc(&self) -> &'static str {
        "Total memory guaranteed for the subtree (ro)"
    }
    fn read_only(&self) -> bool {
        true
    }
    fn supported(&self, host: &Host) -> bool {
        host.subsystem(Controllers::MEMORY)
            .is_some_and(|s| s.supports_guarantee())
    }
    fn get(&self, ctx: &mut PropCtx) -> SteinResult<String> {
        Ok(staged_subtree_guarantee(ctx.ct, ctx.ct.mem_guarantee).to_string())
    }
}

struct SteinStat;
static STEIN_STAT: SteinStat = SteinStat;

impl Property for SteinStat {
    fn name(&self) -> &'static str {
        "stein_stat"
    }
    fn desc(&self) -> &'static str {
        "Daemon statistics (ro)"
    }
    fn read_only(&self) -> bool {
        true
    }
    fn hidden(&self) -> bool {
        true
    }
    fn indexable(&self) -> bool {
        true
    }
    fn get(&self, ctx: &mut PropCtx) -> SteinResult<String> {
        let mut stat = ctx.host.stats.snapshot(now_ms());
        stat.insert("running".to_string(), ctx.ct.running_children);
        Ok(format_uint_map(&stat))
    }
    fn get_indexed(&self, ctx: &mut PropCtx, index: &str) -> SteinResult<String> {
        let mut stat = ctx.host.stats.snapshot(now_ms());
        stat.insert("running".to_string(), ctx.ct.running_children);
        stat.get(index)
            .map(u64::to_string)
            .ok_or_else(|| SteinError::invalid_value("Invalid subscript for property"))
    }
}

pub(super) fn register(registry: &mut Registry) {
    registry.add(&STATE);
    registry.add(&EXIT_STATUS);
    registry.add(&EXIT_CODE);
    registry.add(&OOM_KILLED);
    registry.add(&RESPAWN_COUNT);
    registry.add(&ROOT_PID);
    registry.add(&START_ERRNO);
    registry.add(&TIME);
    registry.add(&CREATION_TIME);
    registry.add(&START_TIME);
    registry.add(&PARENT);
    registry.add(&ABSOLUTE_NAME);
    registry.add(&ABSOLUTE_NAMESPACE);
    registry.add(&MEMORY_USAGE);
    registry.add(&ANON_USAGE);
    registry.add(&HUGETLB_USAGE);
    registry.add(&MAX_RSS);
    registry.add(&MINOR_FAULTS);
    registry.add(&MAJOR_FAULTS);
    registry.add(&CPU_USAGE);
    registry.add(&CPU_SYSTEM);
    registry.add(&PROCESS_COUNT);
    registry.add(&THREAD_COUNT);
    registry.add(&NET_CLASS_ID);
    registry.add(&NET_BYTES);
    registry.add(&NET_PACKETS);
    registry.add(&NET_DROPS);
    registry.add(&NET_OVERLIMITS);
    registry.add(&NET_RX_BYTES);
    registry.add(&NET_RX_PACKETS);
    registry.add(&NET_RX_DROPS);
    registry.add(&NET_TX_BYTES);
    registry.add(&NET_TX_PACKETS);
    registry.add(&NET_TX_DROPS);
    registry.add(&IO_READ);
    registry.add(&IO_WRITE);
    registry.add(&IO_OPS);
    registry.add(&MEMORY_LIMIT_TOTAL);
    registry.add(&MEMORY_GUARANTEE_TOTAL);
    registry.add(&STEIN_STAT);
}
