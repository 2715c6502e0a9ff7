//! Task: Service launch.
//!
//! The last stage. Replaces the pipeline's execution context with the
//! dropped one, so the orchestrator refuses anything privileged afterwards.

use super::{log_task_error, names, task_start};
use crate::pipeline::{DeployCtx, PipelineTask};
use crate::stages::launch::{self, LaunchInput};
use async_trait::async_trait;
use orgdeploy_shared::errors::{DeployError, DeployResult};

pub struct LaunchTask;

#[async_trait]
impl PipelineTask<DeployCtx> for LaunchTask {
    async fn run(self: Box<Self>, ctx: DeployCtx) -> DeployResult<()> {
        let task_name = self.name();
        let identity = task_start(&ctx, task_name).await;

        let (spec, exec, serving_root) = {
            let ctx = ctx.lock().await;
            (
                ctx.options.launch.clone(),
                ctx.exec.clone(),
                ctx.serving_root.clone(),
            )
        };

        // The launcher must write where the preparer prepared.
        if let (Some(prepared), Some(output_dir)) = (&serving_root, &spec.output_dir)
            && prepared.path != *output_dir
        {
            let err = DeployError::Config(format!(
                "launch output directory {} differs from prepared serving root {}",
                output_dir.display(),
                prepared.path.display()
            ));
            log_task_error(&identity, task_name, &err);
            return Err(err);
        }

        let output = launch::run(LaunchInput {
            spec: &spec,
            ctx: &exec,
        })
        .await
        .inspect_err(|e| log_task_error(&identity, task_name, e))?;

        let mut ctx = ctx.lock().await;
        ctx.exec = output.ctx;
        ctx.postcondition = Some(format!("service {}", output.state));
        ctx.service = Some(output.state);

        Ok(())
    }

    fn name(&self) -> &str {
        names::LAUNCH
    }

    fn requires(&self) -> &[&'static str] {
        &[names::SERVING_ROOT]
    }

    fn drops_privileges(&self) -> bool {
        true
    }
}
