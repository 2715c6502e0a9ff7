//! Isolation options applied to the service process.

use serde::{Deserialize, Serialize};
use std::path::PathBuf;

/// Options the launcher hands to the [`Jailer`](super::Jailer).
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct JailerOptions {
    /// Close inherited file descriptors above stderr.
    #[serde(default = "default_close_fds")]
    pub close_fds: bool,

    /// Resource limits applied before the privilege drop.
    #[serde(default)]
    pub resource_limits: ResourceLimits,

    /// PID file written from the child after fork.
    #[serde(default)]
    pub pid_file: Option<PathBuf>,
}

fn default_close_fds() -> bool {
    true
}

impl Default for JailerOptions {
    fn default() -> Self {
        Self {
            close_fds: default_close_fds(),
            resource_limits: ResourceLimits::default(),
            pid_file: None,
        }
    }
}

/// Resource limits for the service process.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ResourceLimits {
    /// Maximum number of open file descriptors (RLIMIT_NOFILE).
    #[serde(default)]
    pub max_open_files: Option<u64>,

    /// Maximum file size in bytes (RLIMIT_FSIZE).
    #[serde(default)]
    pub max_file_size: Option<u64>,

    /// Maximum number of processes (RLIMIT_NPROC).
    #[serde(default)]
    pub max_processes: Option<u64>,

    /// Maximum virtual memory in bytes (RLIMIT_AS).
    #[serde(default)]
    pub max_memory: Option<u64>,

    /// Maximum CPU time in seconds (RLIMIT_CPU).
    #[serde(default)]
    pub max_cpu_time: Option<u64>,
}

impl ResourceLimits {
    pub fn is_empty(&self) -> bool {
        self == &Self::default()
    }
}
