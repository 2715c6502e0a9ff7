//! orgdeploy command-line entry point.

mod cli;
mod commands;

use clap::Parser;
use cli::{Cli, Commands};
use commands::ServiceExit;
use orgdeploy::DeployError;
use std::process::ExitCode;

#[tokio::main]
async fn main() -> ExitCode {
    let cli = Cli::parse();
    let _log_guard = cli.global.init_logging();

    let global = &cli.global;
    let result = match cli.command {
        Commands::Build(args) => commands::build::execute(args, global).await,
        Commands::Prepare(args) => commands::prepare::execute(args, global).await,
        Commands::Launch(args) => commands::launch::execute(args, global).await,
        Commands::Run(args) => commands::run::execute(args, global).await,
        Commands::Check(args) => commands::check::execute(args, global).await,
        Commands::Dockerfile(args) => commands::dockerfile::execute(args, global).await,
        Commands::Config(args) => commands::config::execute(args, global).await,
        Commands::Completion(args) => commands::completion::execute(args),
    };

    match result {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => ExitCode::from(exit_code(&e)),
    }
}

/// Service exits pass through; deployment errors use their class code.
fn exit_code(err: &anyhow::Error) -> u8 {
    if let Some(exit) = err.downcast_ref::<ServiceExit>() {
        tracing::debug!(code = exit.code, "Service exited with non-zero status");
        return u8::try_from(exit.code).unwrap_or(1);
    }

    eprintln!("Error: {err:#}");
    let code = err
        .downcast_ref::<DeployError>()
        .map(DeployError::exit_code)
        .unwrap_or(1);
    u8::try_from(code).unwrap_or(1)
}
