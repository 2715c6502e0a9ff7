//! Task: Frontend asset build.

use super::{log_task_error, names, task_start};
use crate::pipeline::{DeployCtx, PipelineTask};
use crate::stages::assets::{self, AssetsInput};
use async_trait::async_trait;
use orgdeploy_shared::errors::DeployResult;

pub struct AssetsTask;

#[async_trait]
impl PipelineTask<DeployCtx> for AssetsTask {
    async fn run(self: Box<Self>, ctx: DeployCtx) -> DeployResult<()> {
        let task_name = self.name();
        let identity = task_start(&ctx, task_name).await;

        let (spec, runner, exec, previous) = {
            let ctx = ctx.lock().await;
            (
                ctx.options.frontend.clone(),
                ctx.runner.clone(),
                ctx.exec.clone(),
                ctx.previous_output(names::ASSETS, "location"),
            )
        };

        let artifacts = assets::run(AssetsInput {
            spec: &spec,
            runner: runner.as_ref(),
            ctx: &exec,
            previous: previous.as_deref(),
        })
        .await
        .inspect_err(|e| log_task_error(&identity, task_name, e))?;

        let mut ctx = ctx.lock().await;
        ctx.postcondition = Some(format!("artifacts at {}", artifacts.location.display()));
        ctx.outputs
            .insert("location".to_string(), artifacts.location.display().to_string());
        ctx.artifacts = Some(artifacts);

        Ok(())
    }

    fn name(&self) -> &str {
        names::ASSETS
    }

    fn requires(&self) -> &[&'static str] {
        &[names::PROVISION]
    }

    fn requires_privilege(&self) -> bool {
        true
    }
}
