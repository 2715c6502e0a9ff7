//! Task: Dependency provisioning.

use super::{log_task_error, names, task_start};
use crate::pipeline::{DeployCtx, PipelineTask};
use crate::stages::provision::{self, ProvisionInput};
use async_trait::async_trait;
use orgdeploy_shared::errors::DeployResult;

pub struct ProvisionTask;

#[async_trait]
impl PipelineTask<DeployCtx> for ProvisionTask {
    async fn run(self: Box<Self>, ctx: DeployCtx) -> DeployResult<()> {
        let task_name = self.name();
        let identity = task_start(&ctx, task_name).await;

        let (spec, runner, exec) = {
            let ctx = ctx.lock().await;
            (
                ctx.options.provision.clone(),
                ctx.runner.clone(),
                ctx.exec.clone(),
            )
        };

        let output = provision::run(ProvisionInput {
            spec: &spec,
            runner: runner.as_ref(),
            ctx: &exec,
        })
        .await
        .inspect_err(|e| log_task_error(&identity, task_name, e))?;

        let mut ctx = ctx.lock().await;
        ctx.postcondition = Some(format!(
            "{} packages usable, {} cache directories clean",
            output.verified.len(),
            output.cleaned.len()
        ));
        ctx.provisioned = Some(output);

        Ok(())
    }

    fn name(&self) -> &str {
        names::PROVISION
    }

    fn requires_privilege(&self) -> bool {
        true
    }
}
