//! Service launcher: the container entrypoint.
//!
//! Validates the launch configuration, spawns exactly one foreground
//! process under the runtime identity and waits for it. Termination
//! signals received by the launcher are forwarded to the service. There is
//! no restart policy.

mod state;

pub use state::{ServiceLifecycle, ServiceState};

use crate::context::ExecutionContext;
use crate::jailer::Jailer;
use crate::options::LaunchSpec;
use crate::util;
use nix::sys::signal::Signal;
use orgdeploy_shared::constants::args;
use orgdeploy_shared::errors::{DeployError, DeployResult};
use std::os::unix::process::ExitStatusExt;
use std::path::{Path, PathBuf};
use std::process::{ExitStatus, Stdio};
use tokio::process::Child;
use tokio::signal::unix::{SignalKind, signal};

/// Fully validated command line of the service.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ServiceCommand {
    /// What gets exec'd: the interpreter, or the program itself.
    pub executable: PathBuf,
    pub args: Vec<String>,
    pub output_dir: PathBuf,
}

pub struct ServiceLauncher {
    spec: LaunchSpec,
    ctx: ExecutionContext,
    lifecycle: ServiceLifecycle,
}

impl ServiceLauncher {
    /// `ctx` supplies PATH for resolving the interpreter plus the
    /// environment and working directory of the service.
    pub fn new(spec: LaunchSpec, ctx: ExecutionContext) -> Self {
        Self {
            spec,
            ctx,
            lifecycle: ServiceLifecycle::new(),
        }
    }

    pub fn state(&self) -> ServiceState {
        self.lifecycle.state
    }

    pub fn spec(&self) -> &LaunchSpec {
        &self.spec
    }

    /// Validate everything that can be checked before spawning.
    ///
    /// A missing output directory is a startup failure; it is never created
    /// here.
    pub fn prepare(&self) -> DeployResult<ServiceCommand> {
        let output_dir = self.spec.output_dir.clone().ok_or_else(|| {
            DeployError::Config(format!("{} is not configured", args::OUTPUT_DIRECTORY_LOCAL))
        })?;

        if output_dir.as_os_str().is_empty() {
            return Err(DeployError::Config(format!(
                "{} is empty",
                args::OUTPUT_DIRECTORY_LOCAL
            )));
        }

        match std::fs::metadata(&output_dir) {
            Ok(meta) if meta.is_dir() => {}
            Ok(_) => {
                return Err(DeployError::Launch(format!(
                    "output directory {} is not a directory",
                    output_dir.display()
                )));
            }
            Err(e) => {
                return Err(DeployError::Launch(format!(
                    "output directory {} is unusable: {}",
                    output_dir.display(),
                    e
                )));
            }
        }

        if let Some(pid_file) = self.pid_file() {
            let parent = pid_file.parent().unwrap_or(Path::new("/"));
            if !parent.is_dir() {
                return Err(DeployError::Config(format!(
                    "PID file directory {} does not exist",
                    parent.display()
                )));
            }
        }

        let executable = self.executable()?;
        let mut service_args = Vec::new();
        if self.spec.interpreter.is_some() {
            service_args.push(self.spec.program.display().to_string());
        }
        service_args.push(args::OUTPUT_DIRECTORY_LOCAL.to_string());
        service_args.push(output_dir.display().to_string());
        service_args.extend(self.spec.extra_args.iter().cloned());

        Ok(ServiceCommand {
            executable,
            args: service_args,
            output_dir,
        })
    }

    /// What gets exec'd: the interpreter resolved on the context's PATH, or
    /// the entrypoint itself, which then has to be executable.
    pub fn executable(&self) -> DeployResult<PathBuf> {
        let program = &self.spec.program;
        if !program.exists() {
            return Err(DeployError::NotFound(format!(
                "service entrypoint {}",
                program.display()
            )));
        }

        match &self.spec.interpreter {
            Some(interpreter) => util::find_binary(interpreter, self.ctx.search_path()),
            None if util::is_executable(program) => Ok(program.clone()),
            None => Err(DeployError::Launch(format!(
                "service entrypoint {} is not executable",
                program.display()
            ))),
        }
    }

    /// PID file location with a relative path taken from the context's cwd.
    /// The hook writing it runs after the child changed directory.
    fn pid_file(&self) -> Option<PathBuf> {
        self.spec
            .jailer
            .pid_file
            .as_ref()
            .map(|path| self.ctx.cwd().join(path))
    }

    /// Spawn the service and wait for it to end.
    ///
    /// Returns the terminal state. Errors mean the service never started.
    pub async fn run(&mut self) -> DeployResult<ServiceState> {
        let command = self.prepare()?;

        let mut signals = ForwardedSignals::install()?;

        let mut options = self.spec.jailer.clone();
        options.pid_file = self.pid_file();
        let jailer = Jailer::new(self.spec.identity).with_options(options);
        let cwd = self
            .spec
            .program
            .parent()
            .filter(|p| !p.as_os_str().is_empty())
            .map(Path::to_path_buf)
            .unwrap_or_else(|| self.ctx.cwd().to_path_buf());

        let ctx = &self.ctx;
        let mut child = jailer.spawn(&command.executable, &command.args, |cmd| {
            cmd.current_dir(&cwd)
                .envs(ctx.env())
                .stdin(Stdio::null())
                .stdout(Stdio::inherit())
                .stderr(Stdio::inherit());
        })?;

        let pid = child
            .id()
            .ok_or_else(|| DeployError::Internal("spawned service has no pid".into()))?;
        self.lifecycle.transition_to(ServiceState::Running { pid })?;

        tracing::info!(
            pid,
            identity = %self.spec.identity,
            executable = %command.executable.display(),
            output_dir = %command.output_dir.display(),
            "Service started"
        );

        let status = signals.wait_forwarding(&mut child, pid).await?;
        let terminal = terminal_state(status, signals.forwarded);
        self.lifecycle.transition_to(terminal)?;

        match terminal {
            ServiceState::Crashed { signal } => {
                tracing::warn!(pid, signal, "Service killed by signal")
            }
            ServiceState::Stopped { signal } => {
                tracing::info!(pid, signal, "Service stopped")
            }
            _ => tracing::info!(pid, state = %terminal, "Service exited"),
        }

        Ok(terminal)
    }
}

/// Dying of the last signal the launcher forwarded is a graceful stop.
fn terminal_state(status: ExitStatus, forwarded: Option<Signal>) -> ServiceState {
    match (status.code(), status.signal()) {
        (Some(code), _) => ServiceState::Exited { code },
        (None, Some(signal)) if forwarded.is_some_and(|f| f as i32 == signal) => {
            ServiceState::Stopped { signal }
        }
        (None, Some(signal)) => ServiceState::Crashed { signal },
        // Stopped/continued are not reported by wait() without WUNTRACED
        (None, None) => ServiceState::Exited { code: 1 },
    }
}

/// SIGTERM, SIGINT and SIGHUP handlers that relay to the service.
struct ForwardedSignals {
    term: tokio::signal::unix::Signal,
    int: tokio::signal::unix::Signal,
    hup: tokio::signal::unix::Signal,
    /// Last signal relayed to the service.
    forwarded: Option<Signal>,
}

impl ForwardedSignals {
    /// Installed before spawn so no signal is lost in between.
    fn install() -> DeployResult<Self> {
        let install = |kind: SignalKind| {
            signal(kind).map_err(|e| {
                DeployError::Internal(format!("failed to install signal handler: {e}"))
            })
        };
        Ok(Self {
            term: install(SignalKind::terminate())?,
            int: install(SignalKind::interrupt())?,
            hup: install(SignalKind::hangup())?,
            forwarded: None,
        })
    }

    async fn wait_forwarding(&mut self, child: &mut Child, pid: u32) -> DeployResult<ExitStatus> {
        loop {
            let forwarded = tokio::select! {
                status = child.wait() => {
                    return status.map_err(|e| {
                        DeployError::Internal(format!("failed to wait for service: {e}"))
                    });
                }
                _ = self.term.recv() => Signal::SIGTERM,
                _ = self.int.recv() => Signal::SIGINT,
                _ = self.hup.recv() => Signal::SIGHUP,
            };
            forward(pid, forwarded);
            self.forwarded = Some(forwarded);
        }
    }
}

fn forward(pid: u32, signal: Signal) {
    let Ok(raw) = i32::try_from(pid) else {
        return;
    };
    tracing::info!(pid, signal = %signal, "Forwarding signal to service");
    if let Err(e) = nix::sys::signal::kill(nix::unistd::Pid::from_raw(raw), signal) {
        // ESRCH: exited between the signal and the relay
        tracing::debug!(pid, signal = %signal, "Signal not delivered: {}", e);
    }
}
