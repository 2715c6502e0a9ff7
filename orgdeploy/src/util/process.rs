//! Reading back the PID file the launcher's `pre_exec` hook writes.

use orgdeploy_shared::errors::{DeployError, DeployResult};
use std::path::Path;

/// PID of the service recorded at `path`.
///
/// Surrounding whitespace is ignored. Zero and anything that is not a
/// positive `pid_t` are rejected.
pub fn read_pid_file(path: &Path) -> DeployResult<u32> {
    let content = std::fs::read_to_string(path).map_err(|e| {
        DeployError::Storage(format!("cannot read PID file {}: {}", path.display(), e))
    })?;

    parse_pid(content.trim()).ok_or_else(|| {
        DeployError::Storage(format!(
            "PID file {} holds {:?}, not a process id",
            path.display(),
            content.trim()
        ))
    })
}

fn parse_pid(text: &str) -> Option<u32> {
    let pid = text.parse::<libc::pid_t>().ok()?;
    u32::try_from(pid).ok().filter(|pid| *pid > 0)
}
