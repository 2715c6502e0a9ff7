use crate::commands;
use clap::{Args, Parser, Subcommand, ValueEnum};
use orgdeploy::util::{WorkerGuard, init_logging};
use orgdeploy::{DeployOptions, Identity};
use orgdeploy_shared::constants::{envs, paths};
use std::path::{Path, PathBuf};
use tracing_subscriber::EnvFilter;

#[derive(Parser, Debug)]
#[command(
    name = "orgdeploy",
    author,
    version,
    about = "Build and serve the orgviz web service",
    long_about = "Provision packages, build the web UI, prepare the serving root and launch \
                  web.py as an unprivileged user. The same stages back `orgdeploy run` \
                  and the rendered Dockerfile."
)]
pub struct Cli {
    #[command(flatten)]
    pub global: GlobalFlags,

    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Run the build stages: provision, assets, serving root
    Build(commands::build::BuildArgs),

    /// Create the serving root and hand it to the runtime user
    Prepare(commands::prepare::PrepareArgs),

    /// Start web.py in the foreground (container entrypoint)
    Launch(commands::launch::LaunchArgs),

    /// Build, prepare and launch in one go
    Run(commands::run::RunArgs),

    /// Check a built image without changing it
    Check(commands::check::CheckArgs),

    /// Render the Dockerfile for the configured pipeline
    Dockerfile(commands::dockerfile::DockerfileArgs),

    /// Print the effective configuration
    Config(commands::config::ConfigArgs),

    /// Generate shell completions
    Completion(commands::completion::CompletionArgs),
}

/// Flags shared by every command. Configuration is layered: defaults, the
/// config file, environment, then these flags.
#[derive(Args, Debug, Clone)]
pub struct GlobalFlags {
    /// Configuration file [default: /etc/orgdeploy/deploy.yaml if present]
    #[arg(long, global = true, env = envs::CONFIG, value_name = "FILE")]
    pub config: Option<PathBuf>,

    /// Log filter, e.g. `info` or `orgdeploy=debug` [default: RUST_LOG, then info]
    #[arg(long, global = true, env = envs::LOG, value_name = "FILTER")]
    pub log_level: Option<String>,

    /// Also write logs to a daily-rotated file in this directory
    #[arg(long, global = true, value_name = "DIR")]
    pub log_dir: Option<PathBuf>,

    /// Directory web.py writes into; also the serving root
    #[arg(long = "output-directory-local", global = true, value_name = "DIR")]
    pub output_dir: Option<PathBuf>,

    /// Runtime identity as `uid` or `uid:gid`
    #[arg(long, global = true, value_name = "UID[:GID]")]
    pub user: Option<Identity>,

    /// Frontend source tree
    #[arg(long, global = true, value_name = "DIR")]
    pub webui: Option<PathBuf>,

    /// Build manifest location
    #[arg(long, global = true, value_name = "FILE")]
    pub manifest: Option<PathBuf>,
}

impl GlobalFlags {
    /// Install the tracing subscriber. Keep the guard alive until exit.
    pub fn init_logging(&self) -> Option<WorkerGuard> {
        let filter = match &self.log_level {
            Some(level) => EnvFilter::new(level),
            None => EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        };
        init_logging(filter, self.log_dir.as_deref())
    }

    /// Effective, validated options.
    pub fn load_options(&self) -> anyhow::Result<DeployOptions> {
        let mut options = match self.config_file() {
            Some(path) => {
                tracing::debug!(path = %path.display(), "Loading configuration");
                DeployOptions::from_file(&path)?
            }
            None => DeployOptions::default(),
        };

        options.apply_env(|key| std::env::var(key).ok())?;
        self.apply_flags(&mut options);
        options.validate()?;
        Ok(options)
    }

    fn config_file(&self) -> Option<PathBuf> {
        match &self.config {
            Some(path) => Some(path.clone()),
            None => {
                let default = Path::new(paths::CONFIG_FILE);
                default.is_file().then(|| default.to_path_buf())
            }
        }
    }

    fn apply_flags(&self, options: &mut DeployOptions) {
        if let Some(dir) = &self.output_dir {
            options.set_output_dir(dir.clone());
        }
        if let Some(identity) = self.user {
            options.set_runtime_identity(identity);
        }
        if let Some(webui) = &self.webui {
            options.frontend.source_dir = webui.clone();
        }
        if let Some(manifest) = &self.manifest {
            options.manifest_path = manifest.clone();
        }
    }
}

/// Structured output format for reporting commands.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, ValueEnum)]
pub enum OutputFormat {
    #[default]
    Table,
    Json,
    Yaml,
}
