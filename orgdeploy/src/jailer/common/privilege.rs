//! Privilege drop to the runtime identity.
//!
//! Order matters: supplementary groups and gid must be changed while the
//! process still has CAP_SETGID, i.e. before setuid.

/// Switch to `uid:gid` with no supplementary groups except `gid` -
/// async-signal-safe, for pre_exec.
///
/// Verifies the drop stuck by trying to regain uid 0 afterwards.
///
/// Returns the raw errno on failure (EPERM if uid 0 could be regained).
pub fn drop_privileges_raw(uid: u32, gid: u32) -> Result<(), i32> {
    let groups = [gid as libc::gid_t];

    #[cfg(target_os = "linux")]
    let rc = unsafe { libc::setgroups(1, groups.as_ptr()) };
    #[cfg(not(target_os = "linux"))]
    let rc = unsafe { libc::setgroups(1, groups.as_ptr() as *const _) };
    if rc != 0 {
        return Err(super::get_errno());
    }

    if unsafe { libc::setgid(gid as libc::gid_t) } != 0 {
        return Err(super::get_errno());
    }

    if unsafe { libc::setuid(uid as libc::uid_t) } != 0 {
        return Err(super::get_errno());
    }

    if uid != 0 && unsafe { libc::setuid(0) } == 0 {
        return Err(libc::EPERM);
    }

    Ok(())
}
