mod process;

pub use process::read_pid_file;
pub use tracing_appender::non_blocking::WorkerGuard;

use std::os::unix::fs::PermissionsExt;
use std::path::{Path, PathBuf};

use orgdeploy_shared::errors::{DeployError, DeployResult};
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;
use tracing_subscriber::{EnvFilter, fmt};

/// Find an executable by name.
///
/// Names containing a `/` are taken as paths. Bare names are looked up in
/// every entry of `search_path` (a PATH-style, colon separated list).
///
/// # Returns
/// * `Ok(PathBuf)` - Path to the first executable candidate
/// * `Err(NotFound)` - No candidate exists, listing every searched location
pub fn find_binary(binary_name: &str, search_path: Option<&str>) -> DeployResult<PathBuf> {
    let candidates: Vec<PathBuf> = if binary_name.contains('/') {
        vec![PathBuf::from(binary_name)]
    } else {
        search_path
            .unwrap_or_default()
            .split(':')
            .filter(|dir| !dir.is_empty())
            .map(|dir| Path::new(dir).join(binary_name))
            .collect()
    };

    for candidate in &candidates {
        tracing::trace!(binary = binary_name, path = %candidate.display(), "Probing binary");
        if is_executable(candidate) {
            tracing::debug!(binary = %candidate.display(), "Found binary");
            return Ok(candidate.clone());
        }
    }

    let locations = candidates
        .iter()
        .map(|p| format!("  - {}", p.display()))
        .collect::<Vec<_>>()
        .join("\n");

    Err(DeployError::NotFound(format!(
        "binary '{}' not found.\nSearched locations:\n{}",
        binary_name, locations
    )))
}

/// Regular file with at least one execute bit set.
pub fn is_executable(path: &Path) -> bool {
    std::fs::metadata(path)
        .map(|m| m.is_file() && m.permissions().mode() & 0o111 != 0)
        .unwrap_or(false)
}

/// Stderr logging, plus a daily-rotated file under `log_dir` when given.
///
/// The returned guard flushes the file writer on drop and must be kept
/// alive for the lifetime of the process.
pub fn init_logging(
    env_filter: EnvFilter,
    log_dir: Option<&Path>,
) -> Option<WorkerGuard> {
    match log_dir {
        Some(dir) => {
            let appender = tracing_appender::rolling::daily(dir, "orgdeploy.log");
            let (non_blocking, guard) = tracing_appender::non_blocking(appender);
            let _ = tracing_subscriber::registry()
                .with(env_filter)
                .with(fmt::layer().with_writer(std::io::stderr).with_target(false))
                .with(
                    fmt::layer()
                        .with_writer(non_blocking)
                        .with_target(true)
                        .with_ansi(false),
                )
                .try_init();
            Some(guard)
        }
        None => {
            let _ = tracing_subscriber::registry()
                .with(env_filter)
                .with(fmt::layer().with_writer(std::io::stderr).with_target(false))
                .try_init();
            None
        }
    }
}
