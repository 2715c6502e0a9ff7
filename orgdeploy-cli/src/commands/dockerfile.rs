use clap::Args;
use orgdeploy::{DescriptorRenderer, EntrypointStyle};
use std::path::PathBuf;

#[derive(Args, Debug)]
pub struct DockerfileArgs {
    /// Start `orgdeploy launch` instead of web.py directly
    #[arg(long)]
    pub supervised: bool,

    /// Path of the orgdeploy binary inside the image (with --supervised)
    #[arg(long, value_name = "PATH", requires = "supervised")]
    pub launcher: Option<String>,

    /// Write to FILE instead of stdout
    #[arg(short, long, value_name = "FILE")]
    pub output: Option<PathBuf>,
}

pub async fn execute(args: DockerfileArgs, global: &crate::cli::GlobalFlags) -> anyhow::Result<()> {
    let options = global.load_options()?;

    let style = if args.supervised {
        EntrypointStyle::Supervised
    } else {
        EntrypointStyle::Direct
    };
    let mut renderer = DescriptorRenderer::new(&options).with_style(style);
    if let Some(launcher) = args.launcher {
        renderer = renderer.with_launcher(launcher);
    }
    let rendered = renderer.render()?;

    match args.output {
        Some(path) => {
            std::fs::write(&path, rendered)
                .map_err(|e| anyhow::anyhow!("failed to write {}: {}", path.display(), e))?;
            tracing::info!(path = %path.display(), "Dockerfile written");
        }
        None => print!("{rendered}"),
    }
    Ok(())
}
