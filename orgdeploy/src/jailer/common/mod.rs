//! Async-signal-safe helpers for the `pre_exec` hook:
//! - [`fd`]: close inherited file descriptors
//! - [`rlimit`]: resource limits
//! - [`pid`]: PID file written from the child
//! - [`privilege`]: switch to the runtime identity

pub mod fd;
pub mod pid;
pub mod privilege;
pub mod rlimit;

/// Get errno in an async-signal-safe way.
#[inline]
pub(crate) fn get_errno() -> i32 {
    #[cfg(target_os = "macos")]
    unsafe {
        *libc::__error()
    }

    #[cfg(target_os = "linux")]
    unsafe {
        *libc::__errno_location()
    }

    #[cfg(not(any(target_os = "linux", target_os = "macos")))]
    {
        libc::ENOSYS
    }
}
