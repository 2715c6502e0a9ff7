//! Log streaming from build command stdout/stderr into tracing.

use tokio::io::{AsyncBufReadExt, AsyncRead, BufReader};
use tokio::process::{ChildStderr, ChildStdout};
use tokio::task::JoinHandle;

/// Log level for subprocess output streams.
#[derive(Debug, Clone, Copy)]
pub(super) enum LogLevel {
    Debug,
    Warn,
}

/// Owns the reader tasks of one subprocess.
///
/// Each stream gets a dedicated task that reads lines until EOF and logs
/// them tagged with the command name. stdout goes to DEBUG, stderr to WARN.
pub(super) struct LogStreamHandler {
    stdout_task: Option<JoinHandle<()>>,
    stderr_task: Option<JoinHandle<()>>,
}

impl LogStreamHandler {
    pub(super) fn new(stdout: ChildStdout, stderr: ChildStderr, command: &str) -> Self {
        let stdout_task = Self::spawn_reader_task(stdout, "stdout", LogLevel::Debug, command);
        let stderr_task = Self::spawn_reader_task(stderr, "stderr", LogLevel::Warn, command);

        Self {
            stdout_task: Some(stdout_task),
            stderr_task: Some(stderr_task),
        }
    }

    /// Strips ANSI escape codes from a string.
    ///
    /// npm and make colorize output when they think they have a terminal.
    fn strip_ansi_codes(text: &str) -> String {
        // Simple ANSI escape sequence pattern: \x1b[...m
        let mut result = String::with_capacity(text.len());
        let mut chars = text.chars();

        while let Some(c) = chars.next() {
            if c == '\x1b' {
                if chars.next() == Some('[') {
                    for next_char in chars.by_ref() {
                        if next_char == 'm' {
                            break;
                        }
                    }
                }
            } else {
                result.push(c);
            }
        }

        result
    }

    /// Spawn a task that reads `reader` line by line until EOF.
    ///
    /// Lines are raw bytes decoded lossily, so undecodable output never
    /// stops the reader. A reader that stops early closes the pipe and the
    /// child dies of SIGPIPE on its next write.
    fn spawn_reader_task<R>(
        reader: R,
        stream_name: &'static str,
        log_level: LogLevel,
        command: &str,
    ) -> JoinHandle<()>
    where
        R: AsyncRead + Unpin + Send + 'static,
    {
        let command = command.to_string();

        tokio::spawn(async move {
            let mut reader = BufReader::new(reader);
            let mut buf = Vec::new();
            loop {
                buf.clear();
                match reader.read_until(b'\n', &mut buf).await {
                    Ok(0) => break,
                    Ok(_) => {
                        let line = String::from_utf8_lossy(&buf);
                        let clean_line = Self::strip_ansi_codes(line.trim_end_matches(['\n', '\r']));
                        match log_level {
                            LogLevel::Debug => {
                                tracing::debug!(target: "build:stdout", command = %command, "{}", clean_line);
                            }
                            LogLevel::Warn => {
                                tracing::warn!(target: "build:stderr", command = %command, "{}", clean_line);
                            }
                        }
                    }
                    Err(e) => {
                        tracing::error!(
                            target: "build:stdout/stderr",
                            stream = stream_name,
                            command = %command,
                            "Failed to read from pipe: {}", e
                        );
                        break;
                    }
                }
            }
            tracing::trace!(
                target: "build:stdout/stderr",
                stream = stream_name,
                command = %command,
                "Pipe closed, reader exiting"
            );
        })
    }

    /// Wait for both readers to drain their pipes.
    ///
    /// Call after the subprocess exited so the tail of its output is logged
    /// before the stage reports its result.
    pub(super) async fn shutdown(mut self) {
        if let Some(handle) = self.stdout_task.take()
            && let Err(e) = handle.await
        {
            tracing::warn!(target: "build:stdout", "stdout reader task failed: {}", e);
        }

        if let Some(handle) = self.stderr_task.take()
            && let Err(e) = handle.await
        {
            tracing::warn!(target: "build:stderr", "stderr reader task failed: {}", e);
        }
    }
}

impl Drop for LogStreamHandler {
    fn drop(&mut self) {
        if let Some(handle) = self.stdout_task.take() {
            handle.abort();
        }
        if let Some(handle) = self.stderr_task.take() {
            handle.abort();
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_strip_ansi_codes() {
        assert_eq!(
            LogStreamHandler::strip_ansi_codes("\x1b[32madded\x1b[0m 12 packages"),
            "added 12 packages"
        );
        assert_eq!(LogStreamHandler::strip_ansi_codes("plain"), "plain");
    }

    #[tokio::test]
    async fn test_streams_drain_on_shutdown() {
        let mut child = tokio::process::Command::new("/bin/sh")
            .args(["-c", "echo out; echo err >&2"])
            .stdout(std::process::Stdio::piped())
            .stderr(std::process::Stdio::piped())
            .spawn()
            .unwrap();

        let handler = LogStreamHandler::new(
            child.stdout.take().unwrap(),
            child.stderr.take().unwrap(),
            "sh",
        );
        assert!(child.wait().await.unwrap().success());
        handler.shutdown().await;
    }

    #[tokio::test]
    async fn test_invalid_utf8_does_not_stop_reader() {
        // Past the pipe buffer, so a reader that gave up would SIGPIPE the child
        let script = "printf 'caf\\351\\n'; head -c 300000 /dev/zero | tr '\\0' a; echo; exit 0";
        let mut child = tokio::process::Command::new("/bin/sh")
            .args(["-c", script])
            .stdout(std::process::Stdio::piped())
            .stderr(std::process::Stdio::piped())
            .spawn()
            .unwrap();

        let handler = LogStreamHandler::new(
            child.stdout.take().unwrap(),
            child.stderr.take().unwrap(),
            "sh",
        );
        let status = child.wait().await.unwrap();
        handler.shutdown().await;
        assert!(status.success(), "{status:?}");
    }
}
