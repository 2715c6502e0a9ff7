//! Stage 2: Frontend asset build.
//!
//! Resolves frontend dependencies inside the `webui` tree and runs the build
//! tool's default target. The artifact location is returned as a contract
//! for later stages.

use crate::context::ExecutionContext;
use crate::options::FrontendSpec;
use crate::runner::{CommandRunner, CommandSpec};
use orgdeploy_shared::constants::paths;
use orgdeploy_shared::errors::{DeployError, DeployResult};
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, BTreeSet};
use std::path::{Path, PathBuf};
use std::time::SystemTime;

pub struct AssetsInput<'a> {
    pub spec: &'a FrontendSpec,
    pub runner: &'a dyn CommandRunner,
    pub ctx: &'a ExecutionContext,
    /// Location an earlier build recorded, used when a rebuild creates
    /// nothing new.
    pub previous: Option<&'a Path>,
}

/// Where the built assets live.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BuildArtifacts {
    pub location: PathBuf,
    /// Directories under the tree created by this build.
    pub created: Vec<PathBuf>,
}

/// RAII guard removing directories created during a failed build.
///
/// Construction snapshots the top-level directories of the tree with the
/// newest modification time inside each. Drop removes whatever appeared
/// since, unless disarmed. Pre-existing directories are never removed.
pub struct CleanupGuard {
    root: PathBuf,
    before: BTreeMap<PathBuf, Option<SystemTime>>,
    armed: bool,
}

impl CleanupGuard {
    pub fn new(root: &Path) -> DeployResult<Self> {
        let before = list_dirs(root)?
            .into_iter()
            .map(|dir| {
                let stamp = newest_mtime(&dir);
                (dir, stamp)
            })
            .collect();

        Ok(Self {
            root: root.to_path_buf(),
            before,
            armed: true,
        })
    }

    /// Directories that did not exist when the guard was created.
    pub fn created(&self) -> DeployResult<Vec<PathBuf>> {
        Ok(list_dirs(&self.root)?
            .into_iter()
            .filter(|dir| !self.before.contains_key(dir))
            .collect())
    }

    /// Pre-existing directories holding something written since the guard
    /// was created. `node_modules` is not scanned.
    pub fn changed(&self) -> Vec<PathBuf> {
        self.before
            .iter()
            .filter(|(dir, _)| !is_node_modules(dir) && dir.is_dir())
            .filter(|(dir, before)| newest_mtime(dir) > **before)
            .map(|(dir, _)| dir.clone())
            .collect()
    }

    /// Disarm the guard (call on success).
    pub fn disarm(&mut self) {
        self.armed = false;
    }
}

impl Drop for CleanupGuard {
    fn drop(&mut self) {
        if !self.armed {
            return;
        }

        let created = match self.created() {
            Ok(created) => created,
            Err(e) => {
                tracing::warn!("Failed to scan frontend tree during cleanup: {}", e);
                return;
            }
        };

        for dir in created {
            tracing::warn!(path = %dir.display(), "Removing partial build output");
            if let Err(e) = std::fs::remove_dir_all(&dir) {
                tracing::warn!(path = %dir.display(), "Failed to remove partial build output: {}", e);
            }
        }
    }
}

/// Build the frontend tree.
pub async fn run(input: AssetsInput<'_>) -> DeployResult<BuildArtifacts> {
    let AssetsInput {
        spec,
        runner,
        ctx,
        previous,
    } = input;
    let source_dir = spec.source_dir.as_path();

    if !source_dir.is_dir() {
        return Err(DeployError::Build(format!(
            "frontend tree {} is not a directory",
            source_dir.display()
        )));
    }

    let ctx = ctx.with_cwd(source_dir);

    // Fail fast: nothing runs unless both tools resolve.
    let missing: Vec<&str> = [spec.package_manager.as_str(), spec.build_tool.as_str()]
        .into_iter()
        .filter(|tool| runner.resolve(tool, &ctx).is_none())
        .collect();
    if !missing.is_empty() {
        return Err(DeployError::Build(format!(
            "required build tools not found: {}",
            missing.join(", ")
        )));
    }

    let manifest = source_dir.join(paths::PACKAGE_MANIFEST);
    if !manifest.is_file() {
        return Err(DeployError::Build(format!(
            "frontend package manifest {} not found",
            manifest.display()
        )));
    }

    let mut guard = CleanupGuard::new(source_dir)?;

    let install = CommandSpec::new(&spec.package_manager).args(spec.install_args.iter().cloned());
    run_checked(runner, &install, &ctx).await?;

    let build = CommandSpec::new(&spec.build_tool).args(spec.build_args.iter().cloned());
    run_checked(runner, &build, &ctx).await?;

    let created = guard.created()?;
    let location = match &spec.artifact_dir {
        Some(declared) => {
            let location = source_dir.join(declared);
            if !location.is_dir() {
                return Err(DeployError::Build(format!(
                    "declared artifact directory {} missing after build",
                    location.display()
                )));
            }
            location
        }
        None => detect_location(source_dir, &created, previous, &guard.changed())?,
    };

    guard.disarm();

    tracing::info!(
        location = %location.display(),
        created = created.len(),
        "Frontend assets built"
    );

    Ok(BuildArtifacts { location, created })
}

/// Artifact directory of an undeclared build.
///
/// A directory the build created wins, `node_modules` aside. A build that
/// created nothing new rewrote an existing output: the previously recorded
/// location if it is still a directory of the tree, else the single
/// directory whose contents changed.
fn detect_location(
    source_dir: &Path,
    created: &[PathBuf],
    previous: Option<&Path>,
    changed: &[PathBuf],
) -> DeployResult<PathBuf> {
    let created: Vec<&PathBuf> = created.iter().filter(|p| !is_node_modules(p)).collect();
    if !created.is_empty() {
        return single(source_dir, &created, "created");
    }

    if let Some(previous) = previous
        && previous.parent() == Some(source_dir)
        && previous.is_dir()
    {
        tracing::debug!(location = %previous.display(), "Reusing recorded artifact location");
        return Ok(previous.to_path_buf());
    }

    let changed: Vec<&PathBuf> = changed.iter().filter(|p| !is_node_modules(p)).collect();
    single(source_dir, &changed, "updated")
}

fn single(source_dir: &Path, candidates: &[&PathBuf], verb: &str) -> DeployResult<PathBuf> {
    match candidates {
        [single] => Ok((*single).clone()),
        [] => Err(DeployError::Build(format!(
            "build produced no artifact directory under {}; declare frontend.artifact_dir",
            source_dir.display()
        ))),
        many => Err(DeployError::Build(format!(
            "ambiguous artifact location, build {} {}; declare frontend.artifact_dir",
            verb,
            many.iter()
                .map(|p| p.display().to_string())
                .collect::<Vec<_>>()
                .join(", ")
        ))),
    }
}

fn is_node_modules(path: &Path) -> bool {
    path.file_name().is_some_and(|n| n == paths::NODE_MODULES)
}

/// Newest modification time of `dir` and everything below it. Symlinks
/// are not followed; unreadable entries are skipped.
fn newest_mtime(dir: &Path) -> Option<SystemTime> {
    let mut newest = std::fs::symlink_metadata(dir).and_then(|m| m.modified()).ok();
    let mut pending = vec![dir.to_path_buf()];

    while let Some(current) = pending.pop() {
        let Ok(entries) = std::fs::read_dir(&current) else {
            continue;
        };
        for entry in entries.flatten() {
            let Ok(meta) = entry.metadata() else {
                continue;
            };
            if let Ok(modified) = meta.modified() {
                newest = newest.max(Some(modified));
            }
            if meta.is_dir() {
                pending.push(entry.path());
            }
        }
    }
    newest
}

async fn run_checked(
    runner: &dyn CommandRunner,
    cmd: &CommandSpec,
    ctx: &ExecutionContext,
) -> DeployResult<()> {
    let output = runner
        .run(cmd, ctx)
        .await
        .map_err(|e| DeployError::Build(format!("{cmd}: {e}")))?;
    if !output.success() {
        return Err(DeployError::Build(format!("{cmd} failed with {output}")));
    }
    Ok(())
}

/// Top-level directories of `root`.
fn list_dirs(root: &Path) -> DeployResult<BTreeSet<PathBuf>> {
    let entries = std::fs::read_dir(root).map_err(|e| {
        DeployError::Build(format!("failed to read {}: {}", root.display(), e))
    })?;

    let mut dirs = BTreeSet::new();
    for entry in entries {
        let entry = entry.map_err(|e| DeployError::Build(format!("{}: {}", root.display(), e)))?;
        let path = entry.path();
        if path.is_dir() && !path.is_symlink() {
            dirs.insert(path);
        }
    }
    Ok(dirs)
}
