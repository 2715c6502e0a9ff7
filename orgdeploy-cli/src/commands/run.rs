use clap::Args;
use orgdeploy::{DeployPipelineContext, ExecutionContext, HostRunner, Pipeline};
use std::sync::Arc;

#[derive(Args, Debug)]
pub struct RunArgs {
    /// Do not write the build manifest
    #[arg(long)]
    pub no_manifest: bool,
}

pub async fn execute(args: RunArgs, global: &crate::cli::GlobalFlags) -> anyhow::Result<()> {
    let options = global.load_options()?;
    let manifest_path = options.manifest_path.clone();

    let mut ctx = DeployPipelineContext::new(
        options,
        Arc::new(HostRunner::new()),
        ExecutionContext::current(),
    );
    if !args.no_manifest {
        ctx = ctx.with_manifest_path(&manifest_path);
    }
    let ctx = ctx.into_shared();

    Pipeline::full().run(ctx.clone()).await?;

    let state = ctx.lock().await.service;
    match state {
        Some(state) => super::service_result(state),
        None => anyhow::bail!("pipeline finished without launching the service"),
    }
}
