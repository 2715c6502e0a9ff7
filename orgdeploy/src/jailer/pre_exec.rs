//! Pre-execution hook for the service process.
//!
//! Runs after `fork()` but before `exec()` in the child:
//!
//! 1. **Close inherited FDs**
//! 2. **Apply rlimits** (while still privileged, so hard limits can be set)
//! 3. **Write PID file**
//! 4. **Drop privileges** (setgroups → setgid → setuid), always last
//!
//! # Safety
//!
//! The hook runs in a very restricted context:
//! - Only async-signal-safe syscalls are allowed
//! - No memory allocation (no Box, Vec, String)
//! - No mutex operations
//! - No logging (tracing, println)
//!
//! Everything the hook needs is computed by the parent and moved in.

use crate::jailer::common;
use crate::jailer::config::ResourceLimits;
use std::ffi::CString;
use std::process::Command;

/// Pre-computed inputs of the hook.
#[derive(Debug, Clone, Default)]
pub struct PreExecHook {
    pub close_fds: bool,
    pub resource_limits: ResourceLimits,
    pub pid_file: Option<CString>,
    /// `(uid, gid)` to switch to; None keeps the current identity.
    pub drop_to: Option<(u32, u32)>,
}

/// Install `hook` on `cmd`.
///
/// The closure only calls the `*_raw` helpers from [`common`], which use
/// async-signal-safe syscalls exclusively. Any failure aborts the spawn
/// with the corresponding errno.
pub fn add_pre_exec_hook(cmd: &mut Command, hook: PreExecHook) {
    use std::os::unix::process::CommandExt;

    let PreExecHook {
        close_fds,
        resource_limits,
        pid_file,
        drop_to,
    } = hook;

    // SAFETY: the hook only uses async-signal-safe syscalls.
    unsafe {
        cmd.pre_exec(move || {
            if close_fds {
                common::fd::close_inherited_fds_raw()
                    .map_err(std::io::Error::from_raw_os_error)?;
            }

            common::rlimit::apply_limits_raw(&resource_limits)
                .map_err(std::io::Error::from_raw_os_error)?;

            if let Some(ref path) = pid_file {
                common::pid::write_pid_file_raw(path).map_err(std::io::Error::from_raw_os_error)?;
            }

            if let Some((uid, gid)) = drop_to {
                common::privilege::drop_privileges_raw(uid, gid)
                    .map_err(std::io::Error::from_raw_os_error)?;
            }

            Ok(())
        });
    }
}
