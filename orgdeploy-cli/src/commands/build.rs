use clap::Args;
use orgdeploy::{DeployPipelineContext, ExecutionContext, HostRunner, Pipeline};
use std::sync::Arc;

#[derive(Args, Debug)]
pub struct BuildArgs {
    /// Print the stage order and exit
    #[arg(long)]
    pub plan: bool,

    /// Do not write the build manifest
    #[arg(long)]
    pub no_manifest: bool,
}

pub async fn execute(args: BuildArgs, global: &crate::cli::GlobalFlags) -> anyhow::Result<()> {
    let pipeline = Pipeline::build_stages();
    if args.plan {
        for stage in pipeline.plan()? {
            println!("{stage}");
        }
        return Ok(());
    }

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

    pipeline.run(ctx.clone()).await?;

    let ctx = ctx.lock().await;
    if let Some(artifacts) = &ctx.artifacts {
        println!("artifacts: {}", artifacts.location.display());
    }
    if let Some(root) = &ctx.serving_root {
        println!("serving root: {} ({}, {})", root.path.display(), root.owner, root.mode);
    }
    Ok(())
}
