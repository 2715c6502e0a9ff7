//! Hierarchical error types for the jailer module.
//!
//! - [`SystemError`]: a syscall in the spawn path failed
//! - [`JailerError::NotFound`]: nothing to execute
//! - [`ConfigError`]: the requested identity cannot be assumed from here

use std::io;
use thiserror::Error;

// ============================================================================
// Top-Level Error
// ============================================================================

#[derive(Debug, Error)]
pub enum JailerError {
    #[error("system: {0}")]
    System(#[from] SystemError),

    #[error("config: {0}")]
    Config(#[from] ConfigError),

    /// Program or interpreter does not exist.
    #[error("{0} not found")]
    NotFound(String),
}

// ============================================================================
// System Errors (spawn path)
// ============================================================================

/// The pre_exec hook (fd cleanup, rlimits, PID file, privilege drop) runs
/// inside spawn, so its failures surface as spawn errors.
#[derive(Debug, Error)]
pub enum SystemError {
    #[error("spawn {program}: {source}")]
    Spawn {
        program: String,
        #[source]
        source: io::Error,
    },
}

// ============================================================================
// Config Errors
// ============================================================================

#[derive(Debug, Error)]
pub enum ConfigError {
    /// Launcher is unprivileged and not already the target identity.
    #[error("running as {current}, cannot switch to {target} without privilege")]
    IdentityUnavailable { current: String, target: String },

    /// Path contains an interior NUL byte.
    #[error("invalid path {0}")]
    InvalidPath(String),
}

// ============================================================================
// Conversions
// ============================================================================

impl From<JailerError> for orgdeploy_shared::errors::DeployError {
    fn from(err: JailerError) -> Self {
        use orgdeploy_shared::errors::DeployError;
        match err {
            JailerError::NotFound(program) => DeployError::NotFound(program),
            other => DeployError::Launch(other.to_string()),
        }
    }
}

impl SystemError {
    pub fn spawn(program: impl Into<String>, source: io::Error) -> Self {
        Self::Spawn {
            program: program.into(),
            source,
        }
    }
}
