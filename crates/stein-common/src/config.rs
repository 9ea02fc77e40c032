//! Daemon tunables.

use serde::{Deserialize, Serialize};

/// Read-only configuration consumed by the property engine.
///
/// Loaded once at daemon start; every knob has a workable default so an
/// empty config file is valid.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct DaemonConfig {
    /// Nice value applied by the `rt` CPU policy when smart scheduling
    /// is available.
    pub rt_nice: i32,
    /// Real-time priority used by the `rt` CPU policy fallback.
    pub rt_priority: i32,
    /// Nice value applied by the `high` and `iso` CPU policies.
    pub high_nice: i32,
    /// Whether the host allows the smart (nice-based) rt approximation.
    pub enable_smart: bool,
    /// Hard cap on `stdout_limit` for unprivileged clients [bytes].
    pub stdout_limit_max: u64,
    /// Smallest accepted non-zero memory/anon/dirty limit [bytes].
    pub min_memory_limit: u64,
    /// Memory kept out of guarantee accounting for the host itself [bytes].
    pub memory_guarantee_reserve: u64,
    /// Maximum length of the `private` string.
    pub private_max: usize,
    /// Default `aging_time` for new containers [ms].
    pub aging_time_default: u64,
}

impl Default for DaemonConfig {
    fn default() -> Self {
        Self {
            rt_nice: -20,
            rt_priority: 10,
            high_nice: -10,
            enable_smart: true,
            stdout_limit_max: 8 << 20,
            min_memory_limit: 1 << 20,
            memory_guarantee_reserve: 2 << 30,
            private_max: 4096,
            aging_time_default: 24 * 60 * 60 * 1000,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_are_sane() {
        let config = DaemonConfig::default();
        assert!(config.stdout_limit_max > 0);
        assert!(config.min_memory_limit > 0);
        assert_eq!(config.aging_time_default, 86_400_000);
    }

    #[test]
    fn partial_config_deserializes() {
        let config: DaemonConfig = serde_json::from_str(r#"{"private_max": 16}"#).unwrap();
        assert_eq!(config.private_max, 16);
        assert_eq!(config.high_nice, DaemonConfig::default().high_nice);
    }
}
