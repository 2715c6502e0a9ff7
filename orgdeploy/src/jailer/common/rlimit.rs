//! Resource limits for the service process.
//!
//! Only `apply_limits_raw()` runs in the child, from the `pre_exec` hook,
//! before the privilege drop so hard limits can still be set.

use crate::jailer::config::ResourceLimits;

#[cfg(target_os = "linux")]
type Resource = libc::__rlimit_resource_t;
#[cfg(not(target_os = "linux"))]
type Resource = libc::c_int;

/// One configured limit: resource, value, and whether failing to set it
/// aborts the spawn.
type LimitEntry = (Resource, Option<u64>, bool);

/// Limits in application order. RLIMIT_NPROC is per-user and may already be
/// exceeded by the runtime identity's other processes, so it is best-effort.
fn entries(limits: &ResourceLimits) -> [LimitEntry; 5] {
    [
        (libc::RLIMIT_NOFILE, limits.max_open_files, true),
        (libc::RLIMIT_FSIZE, limits.max_file_size, true),
        (libc::RLIMIT_NPROC, limits.max_processes, false),
        (libc::RLIMIT_AS, limits.max_memory, true),
        (libc::RLIMIT_CPU, limits.max_cpu_time, true),
    ]
}

/// Set soft and hard limit to the configured value - async-signal-safe.
///
/// The entry table lives on the stack; nothing here allocates, locks or logs.
/// Returns the raw errno of the first required limit that could not be set.
pub fn apply_limits_raw(limits: &ResourceLimits) -> Result<(), i32> {
    for (resource, value, required) in entries(limits) {
        let Some(value) = value else {
            continue;
        };

        let rlim = libc::rlimit {
            rlim_cur: value as libc::rlim_t,
            rlim_max: value as libc::rlim_t,
        };
        let rc = unsafe { libc::setrlimit(resource, &rlim) };
        if rc != 0 && required {
            return Err(super::get_errno());
        }
    }
    Ok(())
}
