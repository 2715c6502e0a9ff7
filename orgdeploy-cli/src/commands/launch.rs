use clap::Args;
use orgdeploy::ExecutionContext;
use orgdeploy::stages::launch::{self, LaunchInput};
use std::path::PathBuf;

#[derive(Args, Debug)]
pub struct LaunchArgs {
    /// Service entrypoint [default: web.py in the application directory]
    #[arg(long, value_name = "FILE")]
    pub program: Option<PathBuf>,

    /// Write the service PID here
    #[arg(long, value_name = "FILE")]
    pub pid_file: Option<PathBuf>,

    /// Run the entrypoint through this interpreter, e.g. `python3`
    #[arg(long)]
    pub interpreter: Option<String>,

    /// Extra arguments passed to the service after `--outputDirectoryLocal`
    #[arg(last = true)]
    pub service_args: Vec<String>,
}

pub async fn execute(args: LaunchArgs, global: &crate::cli::GlobalFlags) -> anyhow::Result<()> {
    let mut options = global.load_options()?;
    let spec = &mut options.launch;
    if let Some(program) = args.program {
        spec.program = program;
    }
    if let Some(pid_file) = args.pid_file {
        spec.jailer.pid_file = Some(pid_file);
    }
    if let Some(interpreter) = args.interpreter {
        spec.interpreter = Some(interpreter);
    }
    spec.extra_args.extend(args.service_args);

    let output = launch::run(LaunchInput {
        spec: &options.launch,
        ctx: &ExecutionContext::current(),
    })
    .await?;

    super::service_result(output.state)
}
