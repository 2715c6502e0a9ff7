//! Stage 1: Dependency provisioning.
//!
//! Installs the package list in one package-manager transaction, cleans the
//! package cache and verifies every package is usable.

use crate::context::ExecutionContext;
use crate::options::{PackageCheck, PackageManager, PackageSpec, ProvisionSpec};
use crate::runner::{CommandRunner, CommandSpec};
use orgdeploy_shared::errors::{DeployError, DeployResult};
use std::path::{Path, PathBuf};

pub struct ProvisionInput<'a> {
    pub spec: &'a ProvisionSpec,
    pub runner: &'a dyn CommandRunner,
    pub ctx: &'a ExecutionContext,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ProvisionOutput {
    /// Package name and the resolved check target.
    pub verified: Vec<(String, String)>,
    /// Cache directories confirmed empty or absent.
    pub cleaned: Vec<PathBuf>,
}

impl PackageManager {
    /// Binary the manager is invoked as.
    pub fn binary(&self) -> &'static str {
        match self {
            PackageManager::Dnf => "dnf",
            PackageManager::Microdnf => "microdnf",
            PackageManager::Apt => "apt-get",
            PackageManager::Apk => "apk",
        }
    }

    /// Commands that must run before the install transaction.
    pub fn prepare_commands(&self) -> Vec<CommandSpec> {
        match self {
            PackageManager::Apt => vec![CommandSpec::new(self.binary()).arg("update")],
            _ => Vec::new(),
        }
    }

    /// One transaction installing every package.
    pub fn install_command<'a, I>(&self, packages: I) -> CommandSpec
    where
        I: IntoIterator<Item = &'a str>,
    {
        let cmd = CommandSpec::new(self.binary());
        let cmd = match self {
            PackageManager::Dnf => cmd.args(["install", "-y", "--setopt=install_weak_deps=False"]),
            PackageManager::Microdnf => cmd.args(["install", "-y", "--nodocs"]),
            PackageManager::Apt => cmd.args(["install", "-y", "--no-install-recommends"]),
            PackageManager::Apk => cmd.args(["add", "--no-cache"]),
        };
        cmd.args(packages)
    }

    /// Cache cleanup command; apk with `--no-cache` keeps no cache.
    pub fn clean_command(&self) -> Option<CommandSpec> {
        match self {
            PackageManager::Dnf | PackageManager::Microdnf => {
                Some(CommandSpec::new(self.binary()).args(["clean", "all"]))
            }
            PackageManager::Apt => Some(CommandSpec::new(self.binary()).arg("clean")),
            PackageManager::Apk => None,
        }
    }

    pub fn default_cache_dirs(&self) -> Vec<PathBuf> {
        let dirs: &[&str] = match self {
            PackageManager::Dnf | PackageManager::Microdnf => &["/var/cache/dnf", "/var/cache/yum"],
            PackageManager::Apt => &["/var/lib/apt/lists", "/var/cache/apt/archives"],
            PackageManager::Apk => &["/var/cache/apk"],
        };
        dirs.iter().map(PathBuf::from).collect()
    }
}

impl ProvisionSpec {
    pub fn effective_cache_dirs(&self) -> Vec<PathBuf> {
        self.cache_dirs
            .clone()
            .unwrap_or_else(|| self.package_manager.default_cache_dirs())
    }
}

/// Install, clean, verify.
pub async fn run(input: ProvisionInput<'_>) -> DeployResult<ProvisionOutput> {
    let ProvisionInput { spec, runner, ctx } = input;

    if ctx.has_dropped_privileges() {
        return Err(DeployError::Provisioning(format!(
            "package installation requires the build identity, context runs as {}",
            ctx.identity()
        )));
    }

    let manager = spec.package_manager;
    if runner.resolve(manager.binary(), ctx).is_none() {
        return Err(DeployError::Provisioning(format!(
            "package manager '{}' not found",
            manager.binary()
        )));
    }

    for cmd in manager.prepare_commands() {
        run_checked(runner, &cmd, ctx).await?;
    }

    let install = manager.install_command(spec.packages.iter().map(|p| p.name.as_str()));
    tracing::info!(
        package_manager = %manager,
        packages = spec.packages.len(),
        "Installing packages"
    );
    run_checked(runner, &install, ctx).await?;

    if let Some(clean) = manager.clean_command() {
        run_checked(runner, &clean, ctx).await?;
    }

    let cleaned = spec.effective_cache_dirs();
    for dir in &cleaned {
        clear_dir(dir)?;
    }

    let verified = verify_packages(&spec.packages, &spec.python, runner, ctx).await?;

    tracing::info!(
        verified = verified.len(),
        cache_dirs = cleaned.len(),
        "Packages installed and verified"
    );

    Ok(ProvisionOutput { verified, cleaned })
}

/// Run every package's check. All failures are collected before erroring.
pub async fn verify_packages(
    packages: &[PackageSpec],
    python: &str,
    runner: &dyn CommandRunner,
    ctx: &ExecutionContext,
) -> DeployResult<Vec<(String, String)>> {
    let mut verified = Vec::with_capacity(packages.len());
    let mut missing = Vec::new();

    for pkg in packages {
        let target = match &pkg.check {
            PackageCheck::Binary(name) => runner
                .resolve(name, ctx)
                .map(|path| path.display().to_string()),
            PackageCheck::PythonModule(module) => {
                let cmd = CommandSpec::new(python).args(["-c".to_string(), format!("import {module}")]);
                match runner.run(&cmd, ctx).await {
                    Ok(output) if output.success() => Some(module.clone()),
                    Ok(_) | Err(_) => None,
                }
            }
            PackageCheck::None => Some(String::new()),
        };

        match target {
            Some(target) => verified.push((pkg.name.clone(), target)),
            None => missing.push(format!("{} ({})", pkg.name, pkg.check)),
        }
    }

    if !missing.is_empty() {
        return Err(DeployError::Provisioning(format!(
            "packages not usable after install: {}",
            missing.join(", ")
        )));
    }

    Ok(verified)
}

async fn run_checked(
    runner: &dyn CommandRunner,
    cmd: &CommandSpec,
    ctx: &ExecutionContext,
) -> DeployResult<()> {
    let output = runner
        .run(cmd, ctx)
        .await
        .map_err(|e| DeployError::Provisioning(format!("{cmd}: {e}")))?;
    if !output.success() {
        return Err(DeployError::Provisioning(format!("{cmd} failed with {output}")));
    }
    Ok(())
}

/// Remove everything inside `dir`, keeping `dir` itself. Absent is fine.
fn clear_dir(dir: &Path) -> DeployResult<()> {
    let entries = match std::fs::read_dir(dir) {
        Ok(entries) => entries,
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(()),
        Err(e) => {
            return Err(DeployError::Provisioning(format!(
                "failed to read cache directory {}: {}",
                dir.display(),
                e
            )));
        }
    };

    let mut removed = 0usize;
    for entry in entries {
        let path = entry
            .map_err(|e| DeployError::Provisioning(format!("{}: {}", dir.display(), e)))?
            .path();
        let result = if path.is_dir() && !path.is_symlink() {
            std::fs::remove_dir_all(&path)
        } else {
            std::fs::remove_file(&path)
        };
        result.map_err(|e| {
            DeployError::Provisioning(format!("failed to remove {}: {}", path.display(), e))
        })?;
        removed += 1;
    }

    if removed > 0 {
        tracing::debug!(dir = %dir.display(), removed, "Removed package cache residue");
    }
    Ok(())
}
