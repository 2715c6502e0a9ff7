use clap::Args;
use orgdeploy::stages::serving_root::{self, ServingRootInput};

#[derive(Args, Debug)]
pub struct PrepareArgs {}

pub async fn execute(_args: PrepareArgs, global: &crate::cli::GlobalFlags) -> anyhow::Result<()> {
    let options = global.load_options()?;

    let output = serving_root::run(ServingRootInput {
        spec: &options.serving_root,
    })?;

    let verb = if output.created { "created" } else { "exists" };
    println!(
        "{} {} (owner {}, mode {})",
        output.path.display(),
        verb,
        output.owner,
        output.mode
    );
    Ok(())
}
