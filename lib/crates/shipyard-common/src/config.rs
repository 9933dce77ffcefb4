use serde::{Deserialize, Serialize};

/// Run-wide deployment settings
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct FleetSettings {
    /// Remote directory holding `<module>/releases` and `<module>/current` (default: /srv/shipyard)
    #[serde(default = "default_deploy_root")]
    pub deploy_root: String,

    /// Number of releases kept on each host after a successful fleet deploy (default: 3)
    #[serde(default = "default_keep_releases")]
    pub keep_releases: usize,

    /// Largest artifact accepted by the precondition check, in MiB (default: 2048)
    #[serde(default = "default_max_artifact_mb")]
    pub max_artifact_mb: u64,

    /// Upper bound on postcondition polling, in seconds (default: 120)
    #[serde(default = "default_health_timeout_secs")]
    pub health_timeout_secs: u64,

    /// Delay between postcondition polls, in seconds (default: 5)
    #[serde(default = "default_health_interval_secs")]
    pub health_interval_secs: u64,

    /// Timeout for establishing one target connection, in seconds (default: 20)
    #[serde(default = "default_connect_timeout_secs")]
    pub connect_timeout_secs: u64,

    /// Timeout for a single remote command or transfer, in seconds (default: 300)
    #[serde(default = "default_command_timeout_secs")]
    pub command_timeout_secs: u64,
}

fn default_deploy_root() -> String {
    "/srv/shipyard".to_string()
}

fn default_keep_releases() -> usize {
    3
}

fn default_max_artifact_mb() -> u64 {
    2048
}

fn default_health_timeout_secs() -> u64 {
    120
}

fn default_health_interval_secs() -> u64 {
    5
}

fn default_connect_timeout_secs() -> u64 {
    20
}

fn default_command_timeout_secs() -> u64 {
    300
}

impl Default for FleetSettings {
    fn default() -> Self {
        Self {
            deploy_root: default_deploy_root(),
            keep_releases: default_keep_releases(),
            max_artifact_mb: default_max_artifact_mb(),
            health_timeout_secs: default_health_timeout_secs(),
            health_interval_secs: default_health_interval_secs(),
            connect_timeout_secs: default_connect_timeout_secs(),
            command_timeout_secs: default_command_timeout_secs(),
        }
    }
}

impl FleetSettings {
    /// Maximum artifact size in bytes.
    #[must_use]
    pub fn max_artifact_bytes(&self) -> u64 {
        self.max_artifact_mb.saturating_mul(1024 * 1024)
    }
}
