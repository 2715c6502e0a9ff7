//! PID file for the service process.
//!
//! Written from the `pre_exec` hook after fork(), so the file holds the
//! service's own PID (which exec keeps) rather than the launcher's. External
//! supervisors read it to signal the service.

use std::ffi::CStr;

/// Write `getpid()` followed by a newline to `path` - async-signal-safe.
///
/// Only getpid/open/write/close are used; the number is rendered into a
/// stack buffer. Do NOT add logging, allocation or locking here.
///
/// Returns the raw errno on failure.
pub fn write_pid_file_raw(path: &CStr) -> Result<(), i32> {
    let mut buf = [0u8; 16];
    let pid = unsafe { libc::getpid() };
    let start = render_pid(pid, &mut buf);
    let bytes = &buf[start..];

    let fd = unsafe {
        libc::open(
            path.as_ptr(),
            libc::O_WRONLY | libc::O_CREAT | libc::O_TRUNC | libc::O_CLOEXEC,
            0o644 as libc::c_uint,
        )
    };
    if fd < 0 {
        return Err(super::get_errno());
    }

    let written = unsafe { libc::write(fd, bytes.as_ptr() as *const libc::c_void, bytes.len()) };
    let result = if written < 0 {
        Err(super::get_errno())
    } else {
        Ok(())
    };

    unsafe { libc::close(fd) };
    result
}

/// Render `pid` plus a trailing newline right-aligned into `buf`.
///
/// Returns the index of the first byte.
#[inline]
fn render_pid(pid: libc::pid_t, buf: &mut [u8; 16]) -> usize {
    let mut pos = buf.len() - 1;
    buf[pos] = b'\n';

    // PIDs are positive; treat anything else as 0
    let mut value = if pid > 0 { pid as u32 } else { 0 };
    loop {
        pos -= 1;
        buf[pos] = b'0' + (value % 10) as u8;
        value /= 10;
        if value == 0 {
            break;
        }
    }
    pos
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::ffi::CString;

    fn rendered(pid: libc::pid_t) -> Vec<u8> {
        let mut buf = [0u8; 16];
        let start = render_pid(pid, &mut buf);
        buf[start..].to_vec()
    }

    #[test]
    fn test_render_pid() {
        assert_eq!(rendered(12345), b"12345\n");
        assert_eq!(rendered(7), b"7\n");
        assert_eq!(rendered(0), b"0\n");
        assert_eq!(rendered(libc::pid_t::MAX), format!("{}\n", libc::pid_t::MAX).into_bytes());
    }

    #[test]
    fn test_write_pid_file_raw() {
        let dir = tempfile::tempdir().unwrap();
        let pid_file = dir.path().join("service.pid");
        let path = CString::new(pid_file.to_string_lossy().as_bytes()).unwrap();

        write_pid_file_raw(&path).expect("Should write PID file");

        let pid = crate::util::read_pid_file(&pid_file).unwrap();
        assert_eq!(pid, std::process::id());
    }

    #[test]
    fn test_write_pid_file_missing_dir() {
        let path = CString::new("/nonexistent-orgdeploy-dir/service.pid").unwrap();
        assert_eq!(write_pid_file_raw(&path), Err(libc::ENOENT));
    }
}
