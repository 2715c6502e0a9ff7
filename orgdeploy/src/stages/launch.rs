//! Stage 4: Service launch.
//!
//! Drops the execution context to the runtime identity, checks the output
//! directory is writable by it and runs the service in the foreground until
//! it ends.

use crate::context::ExecutionContext;
use crate::options::LaunchSpec;
use crate::service::{ServiceLauncher, ServiceState};
use crate::stages::serving_root::check_writable;
use orgdeploy_shared::errors::{DeployError, DeployResult};

pub struct LaunchInput<'a> {
    pub spec: &'a LaunchSpec,
    pub ctx: &'a ExecutionContext,
}

#[derive(Debug, Clone)]
pub struct LaunchOutput {
    /// Context after the privilege drop. Nothing privileged may follow.
    pub ctx: ExecutionContext,
    pub state: ServiceState,
}

pub async fn run(input: LaunchInput<'_>) -> DeployResult<LaunchOutput> {
    let ctx = input.ctx.drop_privileges(input.spec.identity)?;

    let mut launcher = ServiceLauncher::new(input.spec.clone(), ctx.clone());
    let command = launcher.prepare()?;

    let meta = std::fs::metadata(&command.output_dir).map_err(|e| {
        DeployError::Launch(format!("{}: {}", command.output_dir.display(), e))
    })?;
    check_writable(&command.output_dir, &meta, input.spec.identity)?;

    let state = launcher.run().await?;

    Ok(LaunchOutput { ctx, state })
}
