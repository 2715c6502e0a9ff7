//! Close file descriptors inherited from the launcher.
//!
//! The service must not see descriptors the launcher had open (config
//! files, log files, sockets). Only stdin/stdout/stderr survive exec.

/// Mark every descriptor from 3 upwards close-on-exec - async-signal-safe,
/// for pre_exec.
///
/// Descriptors are flagged rather than closed so the status pipe std uses
/// to report exec failures keeps working until exec itself.
///
/// Do NOT add logging, allocation or locking here.
///
/// Returns the raw errno on failure.
pub fn close_inherited_fds_raw() -> Result<(), i32> {
    const FIRST_FD: i32 = 3;

    #[cfg(target_os = "linux")]
    {
        const CLOSE_RANGE_CLOEXEC: libc::c_uint = 1 << 2;

        // close_range with CLOEXEC (Linux 5.11+)
        let result = unsafe {
            libc::syscall(
                libc::SYS_close_range,
                FIRST_FD as libc::c_uint,
                libc::c_uint::MAX,
                CLOSE_RANGE_CLOEXEC,
            )
        };
        if result == 0 {
            return Ok(());
        }

        // /proc/self/fd would need read_dir, which allocates
        for fd in FIRST_FD..1024 {
            set_cloexec(fd);
        }
        Ok(())
    }

    #[cfg(target_os = "macos")]
    {
        for fd in FIRST_FD..4096 {
            set_cloexec(fd);
        }
        Ok(())
    }

    #[cfg(not(any(target_os = "linux", target_os = "macos")))]
    {
        Err(libc::ENOSYS)
    }
}

/// EBADF for unused slots is expected and ignored.
#[inline]
fn set_cloexec(fd: i32) {
    let flags = unsafe { libc::fcntl(fd, libc::F_GETFD) };
    if flags >= 0 {
        unsafe { libc::fcntl(fd, libc::F_SETFD, flags | libc::FD_CLOEXEC) };
    }
}
