//! Shared fixture: a host with fake collaborators behind the real traits.

#![allow(dead_code)]

use std::collections::BTreeMap;

use stein::cgroup::{Controllers, DiskStat, Subsystem};
use stein::container::StdStream;
use stein::host::{Host, HostInfo, StreamReader};
use stein::net::{NetDevice, NetStatKind, Network};
use stein::stats::DaemonStats;
use stein_common::{Cred, DaemonConfig, SteinError, SteinResult, UserDb};

/// One fake kernel subsystem; every capability flag is on so properties
/// report themselves as supported.
pub struct FakeSubsystem {
    pub ctl: Controllers,
}

impl Subsystem for FakeSubsystem {
    fn controller(&self) -> Controllers {
        self.ctl
    }
    fn supports_guarantee(&self) -> bool {
        true
    }
    fn supports_anon_limit(&self) -> bool {
        true
    }
    fn supports_dirty_limit(&self) -> bool {
        true
    }
    fn supports_io_limit(&self) -> bool {
        true
    }
    fn supports_recharge_on_pgfault(&self) -> bool {
        true
    }
    fn has_smart(&self) -> bool {
        true
    }
    fn usage(&self, _container: &str) -> SteinResult<u64> {
        Ok(4096)
    }
    fn system_usage(&self, _container: &str) -> SteinResult<u64> {
        Ok(2048)
    }
    fn anon_usage(&self, _container: &str) -> SteinResult<u64> {
        Ok(1024)
    }
    fn huge_usage(&self, _container: &str) -> SteinResult<u64> {
        Ok(2 << 20)
    }
    fn statistics(&self, _container: &str) -> SteinResult<BTreeMap<String, u64>> {
        let mut stat = BTreeMap::new();
        stat.insert("total_pgfault".to_string(), 100);
        stat.insert("total_pgmajfault".to_string(), 10);
        stat.insert("total_max_rss".to_string(), 5555);
        stat.insert("fs_io_bytes".to_string(), 500);
        stat.insert("fs_io_write_bytes".to_string(), 200);
        stat.insert("fs_io_operations".to_string(), 50);
        Ok(stat)
    }
    fn task_count(&self, _container: &str) -> SteinResult<u64> {
        Ok(3)
    }
    fn thread_count(&self, _container: &str) -> SteinResult<u64> {
        Ok(7)
    }
    fn disk_stats(&self, _container: &str) -> SteinResult<Vec<DiskStat>> {
        Ok(vec![DiskStat {
            device: "sda".to_string(),
            read_bytes: 100,
            write_bytes: 50,
            read_ops: 10,
            write_ops: 5,
        }])
    }
}

/// Static user database: root, alice (member of staff), bob.
pub struct FakeUserDb;

impl UserDb for FakeUserDb {
    fn user_id(&self, name: &str) -> SteinResult<u32> {
        match name {
            "root" => Ok(0),
            "alice" => Ok(1000),
            "bob" => Ok(1001),
            _ => Err(SteinError::invalid_value(format!("Unknown user: {name}"))),
        }
    }
    fn group_id(&self, name: &str) -> SteinResult<u32> {
        match name {
            "root" => Ok(0),
            "staff" => Ok(50),
            "alice" => Ok(1000),
            "bob" => Ok(1001),
            _ => Err(SteinError::invalid_value(format!("Unknown group: {name}"))),
        }
    }
    fn load_user(&self, name: &str) -> SteinResult<Cred> {
        match name {
            "root" => Ok(Cred::root()),
            "alice" => Ok(Cred {
                uid: 1000,
                gid: 1000,
                groups: vec![50],
            }),
            "bob" => Ok(Cred::new(1001, 1001)),
            _ => Err(SteinError::invalid_value(format!("Unknown user: {name}"))),
        }
    }
    fn user_name(&self, uid: u32) -> String {
        match uid {
            0 => "root".to_string(),
            1000 => "alice".to_string(),
            1001 => "bob".to_string(),
            other => other.to_string(),
        }
    }
    fn group_name(&self, gid: u32) -> String {
        match gid {
            0 => "root".to_string(),
            50 => "staff".to_string(),
            1000 => "alice".to_string(),
            1001 => "bob".to_string(),
            other => other.to_string(),
        }
    }
}

/// Network collaborator with one shaped interface.
pub struct FakeNetwork;

impl Network for FakeNetwork {
    fn devices(&self) -> Vec<NetDevice> {
        vec![NetDevice {
            name: "eth0".to_string(),
            managed: true,
        }]
    }
    fn net_stat(
        &self,
        _container: &str,
        kind: NetStatKind,
    ) -> SteinResult<BTreeMap<String, u64>> {
        let value = match kind {
            NetStatKind::Bytes => 1000,
            NetStatKind::Packets => 10,
            NetStatKind::Drops => 1,
            _ => 0,
        };
        let mut stat = BTreeMap::new();
        stat.insert("eth0".to_string(), value);
        Ok(stat)
    }
}

/// Stream reader over a fixed stored payload.
pub struct FakeStreams;

pub const STORED_OUTPUT: &str = "0123456789";

impl StreamReader for FakeStreams {
    fn read(
        &self,
        _stream: &StdStream,
        offset: Option<u64>,
        length: Option<u64>,
    ) -> SteinResult<String> {
        let start = (offset.unwrap_or(0) as usize).min(STORED_OUTPUT.len());
        let end = length
            .map(|l| (start + l as usize).min(STORED_OUTPUT.len()))
            .unwrap_or(STORED_OUTPUT.len());
        Ok(STORED_OUTPUT[start..end].to_string())
    }
}

/// A 4-core host with 100 bytes of "memory" and a 10-byte guarantee
/// reserve, so tree-sum scenarios stay readable.
pub fn test_host() -> Host {
    let controllers = [
        Controllers::MEMORY,
        Controllers::CPU,
        Controllers::CPUACCT,
        Controllers::CPUSET,
        Controllers::BLKIO,
        Controllers::NETCLS,
        Controllers::DEVICES,
        Controllers::PIDS,
        Controllers::HUGETLB,
        Controllers::FREEZER,
    ];
    Host {
        config: DaemonConfig {
            min_memory_limit: 1024,
            memory_guarantee_reserve: 10,
            stdout_limit_max: 1000,
            private_max: 16,
            ..DaemonConfig::default()
        },
        info: HostInfo {
            ncores: 4,
            total_memory: 100,
            boot_time_ms: 0,
            has_ambient_caps: true,
        },
        subsystems: controllers
            .into_iter()
            .map(|ctl| Box::new(FakeSubsystem { ctl }) as Box<dyn Subsystem>)
            .collect(),
        users: Box::new(FakeUserDb),
        network: Box::new(FakeNetwork),
        streams: Box::new(FakeStreams),
        stats: DaemonStats::default(),
    }
}

/// Credential fixtures matching [`FakeUserDb`].
pub fn alice() -> Cred {
    Cred {
        uid: 1000,
        gid: 1000,
        groups: vec![50],
    }
}

pub fn bob() -> Cred {
    Cred::new(1001, 1001)
}
