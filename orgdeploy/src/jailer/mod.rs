//! Process isolation for the web service.
//!
//! The launcher never execs the service directly. It asks the [`Jailer`]
//! for a command whose `pre_exec` hook closes inherited descriptors, applies
//! rlimits, writes the PID file and finally switches to the runtime
//! identity, all before the service's first instruction runs.
//!
//! ```text
//! jailer/
//! ├── mod.rs          (Jailer, identity decision)
//! ├── config.rs       (JailerOptions, ResourceLimits)
//! ├── error.rs        (hierarchical error types)
//! ├── pre_exec.rs     (hook installation)
//! └── common/         (async-signal-safe syscalls: fd, rlimit, pid, privilege)
//! ```
//!
//! # Usage
//!
//! ```ignore
//! let jailer = Jailer::new(Identity::RUNTIME).with_options(options);
//! let child = jailer.spawn(&program, &args, |cmd| {
//!     cmd.stdout(Stdio::piped());
//! })?;
//! ```

mod common;
mod config;
mod error;
mod pre_exec;

pub use config::{JailerOptions, ResourceLimits};
pub use error::{ConfigError, JailerError, SystemError};

use crate::context::Identity;
use pre_exec::{PreExecHook, add_pre_exec_hook};
use std::ffi::CString;
use std::os::unix::ffi::OsStrExt;
use std::path::Path;
use std::process::Command;

/// How the child's identity is obtained.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum IdentitySwitch {
    /// The launcher already runs as the target identity.
    Keep,
    /// The launcher is privileged and drops in the child.
    Drop { uid: u32, gid: u32 },
}

/// Spawns the service under a fixed identity with isolation applied.
#[derive(Debug, Clone)]
pub struct Jailer {
    identity: Identity,
    options: JailerOptions,
}

impl Jailer {
    // ─────────────────────────────────────────────────────────────────────
    // Constructors
    // ─────────────────────────────────────────────────────────────────────

    pub fn new(identity: Identity) -> Self {
        Self {
            identity,
            options: JailerOptions::default(),
        }
    }

    pub fn with_options(mut self, options: JailerOptions) -> Self {
        self.options = options;
        self
    }

    // ─────────────────────────────────────────────────────────────────────
    // Getters
    // ─────────────────────────────────────────────────────────────────────

    pub fn identity(&self) -> Identity {
        self.identity
    }

    pub fn options(&self) -> &JailerOptions {
        &self.options
    }

    // ─────────────────────────────────────────────────────────────────────
    // Primary API (spawn-time)
    // ─────────────────────────────────────────────────────────────────────

    /// Decide how a launcher running as `current` reaches the target.
    ///
    /// A privileged launcher drops in the child. An unprivileged launcher
    /// must already be the target; anything else is refused rather than
    /// silently running the service under the wrong identity.
    pub fn plan_identity(&self, current: Identity) -> Result<IdentitySwitch, JailerError> {
        if current == self.identity {
            return Ok(IdentitySwitch::Keep);
        }
        if current.is_privileged() {
            return Ok(IdentitySwitch::Drop {
                uid: self.identity.uid,
                gid: self.identity.gid,
            });
        }
        Err(ConfigError::IdentityUnavailable {
            current: current.to_string(),
            target: self.identity.to_string(),
        }
        .into())
    }

    /// Build the service command with the pre_exec hook installed.
    pub fn build_command(&self, program: &Path, args: &[String]) -> Result<Command, JailerError> {
        self.build_command_as(Identity::current(), program, args)
    }

    fn build_command_as(
        &self,
        current: Identity,
        program: &Path,
        args: &[String],
    ) -> Result<Command, JailerError> {
        let switch = self.plan_identity(current)?;

        let pid_file = match &self.options.pid_file {
            Some(path) => Some(
                CString::new(path.as_os_str().as_bytes())
                    .map_err(|_| ConfigError::InvalidPath(path.display().to_string()))?,
            ),
            None => None,
        };

        let drop_to = match switch {
            IdentitySwitch::Keep => None,
            IdentitySwitch::Drop { uid, gid } => Some((uid, gid)),
        };

        tracing::debug!(
            program = %program.display(),
            identity = %self.identity,
            ?switch,
            close_fds = self.options.close_fds,
            "Building jailed command"
        );

        let mut cmd = Command::new(program);
        cmd.args(args);
        add_pre_exec_hook(
            &mut cmd,
            PreExecHook {
                close_fds: self.options.close_fds,
                resource_limits: self.options.resource_limits.clone(),
                pid_file,
                drop_to,
            },
        );
        Ok(cmd)
    }

    /// Spawn `program` under the target identity.
    ///
    /// `configure` sees the tokio command before spawn (stdio, env, cwd).
    pub fn spawn<F>(
        &self,
        program: &Path,
        args: &[String],
        configure: F,
    ) -> Result<tokio::process::Child, JailerError>
    where
        F: FnOnce(&mut tokio::process::Command),
    {
        if !program.exists() {
            return Err(JailerError::NotFound(program.display().to_string()));
        }

        let std_cmd = self.build_command(program, args)?;
        let mut cmd = tokio::process::Command::from(std_cmd);
        configure(&mut cmd);

        cmd.spawn()
            .map_err(|e| SystemError::spawn(program.display().to_string(), e).into())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_plan_identity_keep_when_already_target() {
        let jailer = Jailer::new(Identity::RUNTIME);
        assert_eq!(
            jailer.plan_identity(Identity::RUNTIME).unwrap(),
            IdentitySwitch::Keep
        );
    }

    #[test]
    fn test_plan_identity_drop_from_root() {
        let jailer = Jailer::new(Identity::RUNTIME);
        assert_eq!(
            jailer.plan_identity(Identity::ROOT).unwrap(),
            IdentitySwitch::Drop {
                uid: 1001,
                gid: 1001
            }
        );
    }

    #[test]
    fn test_plan_identity_refused_when_unprivileged() {
        let jailer = Jailer::new(Identity::RUNTIME);
        let err = jailer.plan_identity(Identity::new(1000, 1000)).unwrap_err();
        assert!(matches!(
            err,
            JailerError::Config(ConfigError::IdentityUnavailable { .. })
        ));
    }

    #[test]
    fn test_build_command_rejects_nul_pid_path() {
        let jailer = Jailer::new(Identity::current()).with_options(JailerOptions {
            pid_file: Some(std::path::PathBuf::from(std::ffi::OsStr::from_bytes(
                b"/tmp/a\0b",
            ))),
            ..Default::default()
        });
        let err = jailer
            .build_command(Path::new("/bin/true"), &[])
            .unwrap_err();
        assert!(matches!(err, JailerError::Config(ConfigError::InvalidPath(_))));
    }

    #[tokio::test]
    async fn test_spawn_missing_program() {
        let jailer = Jailer::new(Identity::current());
        let err = jailer
            .spawn(Path::new("/nonexistent/web.py"), &[], |_| {})
            .unwrap_err();
        assert!(matches!(err, JailerError::NotFound(_)));
    }

    #[tokio::test]
    async fn test_spawn_as_current_identity() {
        let dir = tempfile::tempdir().unwrap();
        let pid_file = dir.path().join("service.pid");
        let jailer = Jailer::new(Identity::current()).with_options(JailerOptions {
            pid_file: Some(pid_file.clone()),
            ..Default::default()
        });

        let mut child = jailer
            .spawn(
                Path::new("/bin/sh"),
                &["-c".to_string(), "exit 3".to_string()],
                |_| {},
            )
            .unwrap();
        let pid = child.id().unwrap();
        let status = child.wait().await.unwrap();

        assert_eq!(status.code(), Some(3));
        assert_eq!(crate::util::read_pid_file(&pid_file).unwrap(), pid);
    }
}
