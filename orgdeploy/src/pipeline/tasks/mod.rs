//! Pipeline tasks wrapping the deployment stages.

mod assets;
mod launch;
mod provision;
mod serving_root;

pub use assets::AssetsTask;
pub use launch::LaunchTask;
pub use provision::ProvisionTask;
pub use serving_root::ServingRootTask;

use super::DeployCtx;
use crate::context::Identity;
use orgdeploy_shared::errors::DeployError;

/// Stage names, also the keys of the layer records.
pub mod names {
    pub const PROVISION: &str = "provision";
    pub const ASSETS: &str = "assets";
    pub const SERVING_ROOT: &str = "serving_root";
    pub const LAUNCH: &str = "launch";
}

pub(super) async fn task_start(ctx: &DeployCtx, task_name: &str) -> Identity {
    let identity = ctx.lock().await.exec.identity();
    tracing::info!(stage = task_name, identity = %identity, "Stage started");
    identity
}

pub(super) fn log_task_error(identity: &Identity, task_name: &str, err: &DeployError) {
    tracing::error!(stage = task_name, identity = %identity, "Stage failed: {}", err);
}
