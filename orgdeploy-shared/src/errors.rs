//! Error taxonomy for the deployment pipeline.
//!
//! Each build stage owns one variant so the failing stage can be read off
//! the error itself:
//! - [`DeployError::Provisioning`]: a declared package cannot be installed or resolved
//! - [`DeployError::Build`]: frontend dependency resolution or build target failed
//! - [`DeployError::Directory`]: the serving root cannot be created or is unusable
//! - [`DeployError::Launch`]: the entrypoint cannot start
//!
//! None of them are retried. The CLI maps them to process exit codes via
//! [`DeployError::exit_code`].

use crate::constants::exit_codes;
use thiserror::Error;

/// Result alias used across the workspace.
pub type DeployResult<T> = Result<T, DeployError>;

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum DeployError {
    /// Package installation, cache cleanup or post-install check failed.
    #[error("provisioning failed: {0}")]
    Provisioning(String),

    /// Frontend dependency resolution or build-tool invocation failed.
    #[error("asset build failed: {0}")]
    Build(String),

    /// Serving root could not be created or is not writable by the runtime identity.
    #[error("directory preparation failed: {0}")]
    Directory(String),

    /// Entrypoint could not be started.
    #[error("launch failed: {0}")]
    Launch(String),

    /// Entrypoint binary or interpreter could not be found.
    #[error("not found: {0}")]
    NotFound(String),

    /// Invalid or unreadable configuration.
    #[error("configuration error: {0}")]
    Config(String),

    /// Pipeline graph or ordering violation.
    #[error("pipeline error: {0}")]
    Pipeline(String),

    /// Invalid state transition.
    #[error("invalid state: {0}")]
    InvalidState(String),

    /// Filesystem error outside of a specific stage (manifest, logs).
    #[error("storage error: {0}")]
    Storage(String),

    #[error("internal error: {0}")]
    Internal(String),
}

impl DeployError {
    /// Process exit code for this error.
    pub fn exit_code(&self) -> i32 {
        match self {
            DeployError::Config(_) => exit_codes::CONFIG,
            DeployError::Launch(_) | DeployError::InvalidState(_) => exit_codes::LAUNCH,
            DeployError::NotFound(_) => exit_codes::NOT_FOUND,
            DeployError::Provisioning(_)
            | DeployError::Build(_)
            | DeployError::Directory(_)
            | DeployError::Pipeline(_)
            | DeployError::Storage(_)
            | DeployError::Internal(_) => exit_codes::SOFTWARE,
        }
    }

    /// An error of the same class carrying `detail` instead.
    pub fn with_detail(&self, detail: impl Into<String>) -> Self {
        let detail = detail.into();
        match self {
            DeployError::Provisioning(_) => DeployError::Provisioning(detail),
            DeployError::Build(_) => DeployError::Build(detail),
            DeployError::Directory(_) => DeployError::Directory(detail),
            DeployError::Launch(_) => DeployError::Launch(detail),
            DeployError::NotFound(_) => DeployError::NotFound(detail),
            DeployError::Config(_) => DeployError::Config(detail),
            DeployError::Pipeline(_) => DeployError::Pipeline(detail),
            DeployError::InvalidState(_) => DeployError::InvalidState(detail),
            DeployError::Storage(_) => DeployError::Storage(detail),
            DeployError::Internal(_) => DeployError::Internal(detail),
        }
    }
}

impl From<serde_json::Error> for DeployError {
    fn from(err: serde_json::Error) -> Self {
        DeployError::Storage(format!("manifest serialization: {err}"))
    }
}
