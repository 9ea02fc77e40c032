//! Host-wide collaborator bundle handed to every property operation.

use stein_common::{DaemonConfig, SteinResult, UserDb};

use crate::cgroup::{Controllers, Subsystem};
use crate::container::StdStream;
use crate::net::Network;
use crate::stats::DaemonStats;

/// Static facts about the host the daemon runs on.
#[derive(Debug, Clone)]
pub struct HostInfo {
    /// Online CPU cores.
    pub ncores: usize,
    /// Total host memory [bytes].
    pub total_memory: u64,
    /// Host boot time [ms since epoch], for uptime reporting.
    pub boot_time_ms: u64,
    /// Kernel supports ambient capabilities.
    pub has_ambient_caps: bool,
}

impl Default for HostInfo {
    fn default() -> Self {
        Self {
            ncores: 1,
            total_memory: 0,
            boot_time_ms: 0,
            has_ambient_caps: true,
        }
    }
}

/// Reads stored std stream content on behalf of the engine.
///
/// Expected to return synchronously; rotation bookkeeping lives with the
/// daemon, the engine only passes the stream record through.
pub trait StreamReader: Send + Sync {
    /// Read stored output, honoring the rotation offset. `offset` and
    /// `length` come from the client's `[offset][:length]` subscript.
    fn read(
        &self,
        stream: &StdStream,
        offset: Option<u64>,
        length: Option<u64>,
    ) -> SteinResult<String>;
}

/// Everything a property operation may consult besides the container and
/// the client: tunables, host facts, and the collaborator interfaces.
pub struct Host {
    /// Daemon tunables.
    pub config: DaemonConfig,
    /// Host facts.
    pub info: HostInfo,
    /// One entry per kernel cgroup subsystem.
    pub subsystems: Vec<Box<dyn Subsystem>>,
    /// User database.
    pub users: Box<dyn UserDb>,
    /// Network state.
    pub network: Box<dyn Network>,
    /// Std stream access.
    pub streams: Box<dyn StreamReader>,
    /// Daemon-wide counters.
    pub stats: DaemonStats,
}

impl Host {
    /// The subsystem behind a single controller flag, if registered.
    #[must_use]
    pub fn subsystem(&self, controller: Controllers) -> Option<&dyn Subsystem> {
        self.subsystems
            .iter()
            .find(|s| s.controller() == controller)
            .map(|s| s.as_ref())
    }

    /// Whether every controller in the mask is present and supported.
    #[must_use]
    pub fn controllers_supported(&self, mask: Controllers) -> bool {
        mask.each()
            .all(|flag| self.subsystem(flag).is_some_and(|s| s.supported()))
    }

    /// Whether the cpu subsystem allows the nice-based rt approximation.
    #[must_use]
    pub fn smart_supported(&self) -> bool {
        self.subsystem(Controllers::CPU)
            .is_some_and(|s| s.has_smart())
    }
}
