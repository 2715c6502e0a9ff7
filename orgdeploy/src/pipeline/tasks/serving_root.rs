//! Task: Serving root preparation.

use super::{log_task_error, names, task_start};
use crate::pipeline::{DeployCtx, PipelineTask};
use crate::stages::serving_root::{self, ServingRootInput};
use async_trait::async_trait;
use orgdeploy_shared::errors::DeployResult;

pub struct ServingRootTask;

#[async_trait]
impl PipelineTask<DeployCtx> for ServingRootTask {
    async fn run(self: Box<Self>, ctx: DeployCtx) -> DeployResult<()> {
        let task_name = self.name();
        let identity = task_start(&ctx, task_name).await;

        let spec = ctx.lock().await.options.serving_root.clone();

        let output = serving_root::run(ServingRootInput { spec: &spec })
            .inspect_err(|e| log_task_error(&identity, task_name, e))?;

        let mut ctx = ctx.lock().await;
        ctx.postcondition = Some(format!(
            "{} writable by {} (owner {}, mode {})",
            output.path.display(),
            spec.owner,
            output.owner,
            output.mode
        ));
        ctx.outputs
            .insert("path".to_string(), output.path.display().to_string());
        ctx.serving_root = Some(output);

        Ok(())
    }

    fn name(&self) -> &str {
        names::SERVING_ROOT
    }

    fn requires(&self) -> &[&'static str] {
        &[names::ASSETS]
    }

    fn requires_privilege(&self) -> bool {
        true
    }
}
