//! Daemon-wide statistics counters.

use std::collections::BTreeMap;
use std::sync::atomic::{AtomicU64, Ordering};

/// Process-wide counters surfaced through the hidden `stein_stat` property.
///
/// All counters are monotonic and lock-free; the event loop and the engine
/// both bump them.
#[derive(Debug, Default)]
pub struct DaemonStats {
    /// Worker processes spawned.
    pub spawned: AtomicU64,
    /// Errors logged.
    pub errors: AtomicU64,
    /// Warnings logged.
    pub warnings: AtomicU64,
    /// Exit statuses waiting for acknowledgement.
    pub queued_statuses: AtomicU64,
    /// Events waiting in the daemon queue.
    pub queued_events: AtomicU64,
    /// Dead containers removed by aging.
    pub remove_dead: AtomicU64,
    /// Worker restart timeout [ms].
    pub worker_timeout_ms: AtomicU64,
    /// Containers that failed to restore after daemon restart.
    pub restore_failed: AtomicU64,
    /// Containers currently known.
    pub containers: AtomicU64,
    /// Containers created since start.
    pub containers_created: AtomicU64,
    /// Containers started since start.
    pub containers_started: AtomicU64,
    /// Container starts that failed.
    pub containers_failed_start: AtomicU64,
    /// Containers killed by OOM.
    pub containers_oom: AtomicU64,
    /// Volumes currently known.
    pub volumes: AtomicU64,
    /// Clients currently connected.
    pub clients: AtomicU64,
    /// Requests waiting in the queue.
    pub requests_queued: AtomicU64,
    /// Requests completed.
    pub requests_completed: AtomicU64,
    /// Requests that took longer than one second.
    pub requests_longer_1s: AtomicU64,
    /// Requests that took longer than three seconds.
    pub requests_longer_3s: AtomicU64,
    /// Requests that took longer than thirty seconds.
    pub requests_longer_30s: AtomicU64,
    /// Requests that took longer than five minutes.
    pub requests_longer_5m: AtomicU64,
    /// Registered epoll sources.
    pub epoll_sources: AtomicU64,
    /// Bytes rotated out of std stream logs.
    pub log_rotate_bytes: AtomicU64,
    /// Errors during log rotation.
    pub log_rotate_errors: AtomicU64,
    /// Master process start time [ms since epoch].
    pub master_started_ms: AtomicU64,
    /// Worker process start time [ms since epoch].
    pub worker_started_ms: AtomicU64,
}

impl DaemonStats {
    /// Snapshot every counter into the client-facing map.
    #[must_use]
    pub fn snapshot(&self, now_ms: u64) -> BTreeMap<String, u64> {
        let load = |c: &AtomicU64| c.load(Ordering::Relaxed);
        let uptime = |started: &AtomicU64| {
            let started = load(started);
            if started == 0 {
                0
            } else {
                now_ms.saturating_sub(started) / 1000
            }
        };

        let mut m = BTreeMap::new();
        m.insert("spawned".into(), load(&self.spawned));
        m.insert("errors".into(), load(&self.errors));
        m.insert("warnings".into(), load(&self.warnings));
        m.insert("queued_statuses".into(), load(&self.queued_statuses));
        m.insert("queued_events".into(), load(&self.queued_events));
        m.insert("remove_dead".into(), load(&self.remove_dead));
        m.insert("worker_timeout_ms".into(), load(&self.worker_timeout_ms));
        m.insert("restore_failed".into(), load(&self.restore_failed));
        m.insert("containers".into(), load(&self.containers));
        m.insert("containers_created".into(), load(&self.containers_created));
        m.insert("containers_started".into(), load(&self.containers_started));
        m.insert(
            "containers_failed_start".into(),
            load(&self.containers_failed_start),
        );
        m.insert("containers_oom".into(), load(&self.containers_oom));
        m.insert("volumes".into(), load(&self.volumes));
        m.insert("clients".into(), load(&self.clients));
        m.insert("requests_queued".into(), load(&self.requests_queued));
        m.insert("requests_completed".into(), load(&self.requests_completed));
        m.insert("requests_longer_1s".into(), load(&self.requests_longer_1s));
        m.insert("requests_longer_3s".into(), load(&self.requests_longer_3s));
        m.insert("requests_longer_30s".into(), load(&self.requests_longer_30s));
        m.insert("requests_longer_5m".into(), load(&self.requests_longer_5m));
        m.insert("epoll_sources".into(), load(&self.epoll_sources));
        m.insert("log_rotate_bytes".into(), load(&self.log_rotate_bytes));
        m.insert("log_rotate_errors".into(), load(&self.log_rotate_errors));
        m.insert("master_uptime".into(), uptime(&self.master_started_ms));
        m.insert("worker_uptime".into(), uptime(&self.worker_started_ms));
        m
    }

    /// Bump a counter by one.
    pub fn bump(counter: &AtomicU64) {
        counter.fetch_add(1, Ordering::Relaxed);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn snapshot_contains_all_counters() {
        let stats = DaemonStats::default();
        DaemonStats::bump(&stats.containers_created);
        DaemonStats::bump(&stats.containers_created);
        stats.master_started_ms.store(1_000, Ordering::Relaxed);

        let snap = stats.snapshot(61_000);
        assert_eq!(snap["containers_created"], 2);
        assert_eq!(snap["master_uptime"], 60);
        assert_eq!(snap["worker_uptime"], 0);
        assert!(snap.contains_key("requests_longer_5m"));
    }
}
