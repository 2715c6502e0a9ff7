//! Command execution seam for the build stages.
//!
//! Stages never spawn processes themselves. They describe a [`CommandSpec`]
//! and hand it to a [`CommandRunner`] together with the
//! [`ExecutionContext`] it must run in. [`HostRunner`] executes on the real
//! system; tests substitute a recording runner.

mod log_stream;

use crate::context::ExecutionContext;
use crate::jailer::{Jailer, JailerOptions};
use crate::util;
use async_trait::async_trait;
use log_stream::LogStreamHandler;
use orgdeploy_shared::errors::{DeployError, DeployResult};
use std::fmt;
use std::os::unix::process::ExitStatusExt;
use std::path::PathBuf;
use std::process::{ExitStatus, Stdio};

/// Program plus arguments. The program is resolved against the context's
/// PATH unless it contains a `/`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CommandSpec {
    pub program: String,
    pub args: Vec<String>,
}

impl CommandSpec {
    pub fn new(program: impl Into<String>) -> Self {
        Self {
            program: program.into(),
            args: Vec::new(),
        }
    }

    pub fn arg(mut self, arg: impl Into<String>) -> Self {
        self.args.push(arg.into());
        self
    }

    pub fn args<I, S>(mut self, args: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.args.extend(args.into_iter().map(Into::into));
        self
    }
}

impl fmt::Display for CommandSpec {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.program)?;
        for arg in &self.args {
            write!(f, " {arg}")?;
        }
        Ok(())
    }
}

/// How a command ended.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CommandOutput {
    pub code: Option<i32>,
    pub signal: Option<i32>,
}

impl CommandOutput {
    pub fn exited(code: i32) -> Self {
        Self {
            code: Some(code),
            signal: None,
        }
    }

    pub fn success(&self) -> bool {
        self.code == Some(0)
    }
}

impl From<ExitStatus> for CommandOutput {
    fn from(status: ExitStatus) -> Self {
        Self {
            code: status.code(),
            signal: status.signal(),
        }
    }
}

impl fmt::Display for CommandOutput {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match (self.code, self.signal) {
            (Some(code), _) => write!(f, "exit code {code}"),
            (None, Some(signal)) => write!(f, "signal {signal}"),
            (None, None) => f.write_str("unknown status"),
        }
    }
}

#[async_trait]
pub trait CommandRunner: Send + Sync {
    /// Run `cmd` to completion in `ctx`.
    ///
    /// A non-zero exit is not an error here; callers inspect the output.
    async fn run(&self, cmd: &CommandSpec, ctx: &ExecutionContext) -> DeployResult<CommandOutput>;

    /// Path `program` would execute from in `ctx`, if any.
    fn resolve(&self, program: &str, ctx: &ExecutionContext) -> Option<PathBuf> {
        util::find_binary(program, ctx.search_path()).ok()
    }
}

/// Runs commands on the host, output streamed into tracing.
#[derive(Debug, Default, Clone)]
pub struct HostRunner;

impl HostRunner {
    pub fn new() -> Self {
        Self
    }
}

#[async_trait]
impl CommandRunner for HostRunner {
    async fn run(&self, cmd: &CommandSpec, ctx: &ExecutionContext) -> DeployResult<CommandOutput> {
        let program = self.resolve(&cmd.program, ctx).ok_or_else(|| {
            DeployError::NotFound(format!(
                "{} (PATH={})",
                cmd.program,
                ctx.search_path().unwrap_or_default()
            ))
        })?;

        tracing::info!(
            command = %cmd,
            cwd = %ctx.cwd().display(),
            identity = %ctx.identity(),
            "Running command"
        );

        // Build commands keep the launcher's descriptors closed too.
        let jailer = Jailer::new(ctx.identity()).with_options(JailerOptions::default());
        let mut child = jailer.spawn(&program, &cmd.args, |command| {
            command
                .current_dir(ctx.cwd())
                .envs(ctx.env())
                .stdin(Stdio::null())
                .stdout(Stdio::piped())
                .stderr(Stdio::piped())
                .kill_on_drop(true);
        })?;

        let handler = match (child.stdout.take(), child.stderr.take()) {
            (Some(stdout), Some(stderr)) => Some(LogStreamHandler::new(stdout, stderr, &cmd.program)),
            _ => None,
        };

        let status = child
            .wait()
            .await
            .map_err(|e| DeployError::Internal(format!("failed to wait for {}: {}", cmd.program, e)))?;

        if let Some(handler) = handler {
            handler.shutdown().await;
        }

        let output = CommandOutput::from(status);
        tracing::debug!(command = %cmd.program, status = %output, "Command finished");
        Ok(output)
    }
}
