//! Post-build environment checks.
//!
//! Re-establishes the postconditions of the build stages against the
//! current filesystem without changing anything: packages usable, frontend
//! artifacts present, serving root writable by the runtime identity, and
//! the service entrypoint in place. Every check runs; failures are
//! collected into a [`VerifyReport`].

use crate::context::ExecutionContext;
use crate::manifest::BuildManifest;
use crate::options::DeployOptions;
use crate::pipeline::tasks::names;
use crate::runner::CommandRunner;
use crate::service::ServiceLauncher;
use crate::stages::provision::verify_packages;
use crate::stages::serving_root::check_writable;
use orgdeploy_shared::errors::{DeployError, DeployResult};
use serde::Serialize;
use std::fmt;
use std::path::PathBuf;

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct CheckResult {
    pub name: &'static str,
    pub ok: bool,
    pub detail: String,
    /// Exit code a failure maps to; absent when the check passed.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub exit_code: Option<i32>,
    #[serde(skip)]
    error: Option<DeployError>,
}

impl CheckResult {
    fn pass(name: &'static str, detail: impl Into<String>) -> Self {
        Self {
            name,
            ok: true,
            detail: detail.into(),
            exit_code: None,
            error: None,
        }
    }

    fn fail(name: &'static str, error: DeployError) -> Self {
        Self {
            name,
            ok: false,
            detail: error.to_string(),
            exit_code: Some(error.exit_code()),
            error: Some(error),
        }
    }

    fn from_result(name: &'static str, result: DeployResult<String>) -> Self {
        match result {
            Ok(detail) => Self::pass(name, detail),
            Err(e) => Self::fail(name, e),
        }
    }
}

impl fmt::Display for CheckResult {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let status = if self.ok { "ok" } else { "FAILED" };
        write!(f, "{:<14} {:<6} {}", self.name, status, self.detail)
    }
}

#[derive(Debug, Clone, Default, Serialize)]
pub struct VerifyReport {
    pub checks: Vec<CheckResult>,
}

impl VerifyReport {
    pub fn is_ok(&self) -> bool {
        self.checks.iter().all(|c| c.ok)
    }

    pub fn failures(&self) -> impl Iterator<Item = &CheckResult> {
        self.checks.iter().filter(|c| !c.ok)
    }

    /// `Ok(())` when every check passed, otherwise an error of the class
    /// of the first failing check listing every failure.
    pub fn into_result(self) -> DeployResult<()> {
        let Some(first) = self.checks.iter().find(|c| !c.ok) else {
            return Ok(());
        };
        let summary = self
            .failures()
            .map(|c| format!("{}: {}", c.name, c.detail))
            .collect::<Vec<_>>()
            .join("; ");
        let class = first
            .error
            .clone()
            .unwrap_or_else(|| DeployError::Internal(String::new()));
        Err(class.with_detail(summary))
    }
}

pub struct Verifier<'a> {
    options: &'a DeployOptions,
    runner: &'a dyn CommandRunner,
    ctx: &'a ExecutionContext,
}

impl<'a> Verifier<'a> {
    pub fn new(
        options: &'a DeployOptions,
        runner: &'a dyn CommandRunner,
        ctx: &'a ExecutionContext,
    ) -> Self {
        Self {
            options,
            runner,
            ctx,
        }
    }

    pub async fn run(&self) -> VerifyReport {
        let manifest = self.load_manifest();
        let mut checks = Vec::with_capacity(5);

        checks.push(CheckResult::from_result(
            names::PROVISION,
            self.check_packages().await,
        ));
        checks.push(CheckResult::from_result(
            names::ASSETS,
            self.check_artifacts(manifest.as_ref().ok().and_then(Option::as_ref)),
        ));
        checks.push(CheckResult::from_result(
            names::SERVING_ROOT,
            self.check_serving_root(),
        ));
        checks.push(CheckResult::from_result("entrypoint", self.check_entrypoint()));
        checks.push(match manifest {
            Ok(Some(m)) => CheckResult::pass("manifest", format!("stages: {}", m.stages().join(", "))),
            Ok(None) => CheckResult::pass(
                "manifest",
                format!("{} not present", self.options.manifest_path.display()),
            ),
            Err(e) => CheckResult::fail("manifest", e),
        });

        let report = VerifyReport { checks };
        for check in report.failures() {
            tracing::warn!(check = check.name, "Check failed: {}", check.detail);
        }
        report
    }

    fn load_manifest(&self) -> DeployResult<Option<BuildManifest>> {
        let path = &self.options.manifest_path;
        if !path.exists() {
            return Ok(None);
        }
        BuildManifest::load(path).map(Some)
    }

    async fn check_packages(&self) -> DeployResult<String> {
        let spec = &self.options.provision;
        let verified = verify_packages(&spec.packages, &spec.python, self.runner, self.ctx).await?;
        Ok(verified
            .iter()
            .map(|(name, _)| name.as_str())
            .collect::<Vec<_>>()
            .join(", "))
    }

    /// Declared directory wins, then the manifest record.
    fn check_artifacts(&self, manifest: Option<&BuildManifest>) -> DeployResult<String> {
        let frontend = &self.options.frontend;
        let location: PathBuf = match (&frontend.artifact_dir, manifest) {
            (Some(declared), _) => frontend.source_dir.join(declared),
            (None, Some(m)) => match m.output(names::ASSETS, "location") {
                Some(recorded) => PathBuf::from(recorded),
                None => {
                    return Err(DeployError::Build(
                        "manifest has no assets record".to_string(),
                    ));
                }
            },
            (None, None) => {
                return Err(DeployError::Build(
                    "artifact location unknown: no manifest and no frontend.artifact_dir"
                        .to_string(),
                ));
            }
        };

        let non_empty = std::fs::read_dir(&location)
            .map_err(|e| DeployError::Build(format!("{}: {}", location.display(), e)))?
            .next()
            .is_some();
        if !non_empty {
            return Err(DeployError::Build(format!(
                "artifact directory {} is empty",
                location.display()
            )));
        }
        Ok(location.display().to_string())
    }

    fn check_serving_root(&self) -> DeployResult<String> {
        let path = &self.options.serving_root.path;
        let identity = self.options.launch.identity;
        let meta = std::fs::metadata(path)
            .map_err(|e| DeployError::Directory(format!("{}: {}", path.display(), e)))?;
        if !meta.is_dir() {
            return Err(DeployError::Directory(format!(
                "{} is not a directory",
                path.display()
            )));
        }
        check_writable(path, &meta, identity)?;
        Ok(format!("{} writable by {}", path.display(), identity))
    }

    /// Same resolution the launcher performs before spawning.
    fn check_entrypoint(&self) -> DeployResult<String> {
        let launcher = ServiceLauncher::new(self.options.launch.clone(), self.ctx.clone());
        let executable = launcher.executable()?;
        let program = &self.options.launch.program;
        if executable == *program {
            Ok(program.display().to_string())
        } else {
            Ok(format!("{} via {}", program.display(), executable.display()))
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::context::Identity;
    use crate::manifest::LayerRecord;
    use crate::runner::{CommandOutput, CommandSpec};
    use async_trait::async_trait;
    use chrono::Utc;
    use orgdeploy_shared::layout::ImageLayout;
    use std::collections::{BTreeMap, HashSet};
    use std::os::unix::fs::PermissionsExt;
    use std::path::Path;

    /// Resolves every binary; python imports succeed.
    struct AllPresent;

    #[async_trait]
    impl CommandRunner for AllPresent {
        async fn run(&self, _: &CommandSpec, _: &ExecutionContext) -> DeployResult<CommandOutput> {
            Ok(CommandOutput::exited(0))
        }

        fn resolve(&self, program: &str, _: &ExecutionContext) -> Option<PathBuf> {
            Some(PathBuf::from("/usr/bin").join(program))
        }
    }

    struct Missing(HashSet<&'static str>);

    #[async_trait]
    impl CommandRunner for Missing {
        async fn run(&self, _: &CommandSpec, _: &ExecutionContext) -> DeployResult<CommandOutput> {
            Ok(CommandOutput::exited(1))
        }

        fn resolve(&self, program: &str, _: &ExecutionContext) -> Option<PathBuf> {
            (!self.0.contains(program)).then(|| PathBuf::from("/usr/bin").join(program))
        }
    }

    fn built_tree(root: &Path) -> DeployOptions {
        let layout = ImageLayout::rooted_at(root);
        let mut options = DeployOptions::for_layout(&layout);
        options.set_runtime_identity(Identity::current());

        std::fs::create_dir_all(options.frontend.source_dir.join("dist")).unwrap();
        std::fs::write(options.frontend.source_dir.join("dist/index.js"), "x").unwrap();
        std::fs::create_dir_all(&options.serving_root.path).unwrap();
        std::fs::write(&options.launch.program, "#!/bin/sh\n").unwrap();
        std::fs::set_permissions(&options.launch.program, std::fs::Permissions::from_mode(0o755))
            .unwrap();
        options
    }

    fn record_assets(options: &DeployOptions) {
        let now = Utc::now();
        let mut manifest = BuildManifest::new();
        manifest.push(LayerRecord {
            stage: names::ASSETS.to_string(),
            started_at: now,
            finished_at: now,
            identity: Identity::current(),
            summary: String::new(),
            outputs: BTreeMap::from([(
                "location".to_string(),
                options.frontend.source_dir.join("dist").display().to_string(),
            )]),
        });
        manifest.persist(&options.manifest_path).unwrap();
    }

    #[tokio::test]
    async fn test_all_checks_pass() {
        let dir = tempfile::tempdir().unwrap();
        let options = built_tree(dir.path());
        record_assets(&options);

        let ctx = ExecutionContext::current();
        let report = Verifier::new(&options, &AllPresent, &ctx).run().await;
        assert!(report.is_ok(), "{:?}", report);
        assert_eq!(report.checks.len(), 5);
        assert!(report.into_result().is_ok());
    }

    #[tokio::test]
    async fn test_declared_artifact_dir_without_manifest() {
        let dir = tempfile::tempdir().unwrap();
        let mut options = built_tree(dir.path());
        options.frontend.artifact_dir = Some("dist".into());

        let ctx = ExecutionContext::current();
        let report = Verifier::new(&options, &AllPresent, &ctx).run().await;
        assert!(report.is_ok(), "{:?}", report);
    }

    #[tokio::test]
    async fn test_missing_package_reported() {
        let dir = tempfile::tempdir().unwrap();
        let options = built_tree(dir.path());
        record_assets(&options);

        let ctx = ExecutionContext::current();
        let runner = Missing(HashSet::from(["dot"]));
        let report = Verifier::new(&options, &runner, &ctx).run().await;

        assert!(!report.is_ok());
        let failed: Vec<&str> = report.failures().map(|c| c.name).collect();
        assert_eq!(failed, [names::PROVISION]);
        assert!(matches!(
            report.into_result(),
            Err(DeployError::Provisioning(_))
        ));
    }

    #[tokio::test]
    async fn test_unknown_artifacts_and_missing_root() {
        let dir = tempfile::tempdir().unwrap();
        let options = built_tree(dir.path());
        std::fs::remove_dir(&options.serving_root.path).unwrap();

        let ctx = ExecutionContext::current();
        let report = Verifier::new(&options, &AllPresent, &ctx).run().await;
        let failed: Vec<&str> = report.failures().map(|c| c.name).collect();
        assert_eq!(failed, [names::ASSETS, names::SERVING_ROOT]);
        assert!(matches!(report.into_result(), Err(DeployError::Build(_))));
    }

    #[tokio::test]
    async fn test_corrupt_manifest_reported() {
        let dir = tempfile::tempdir().unwrap();
        let mut options = built_tree(dir.path());
        options.frontend.artifact_dir = Some("dist".into());
        std::fs::create_dir_all(options.manifest_path.parent().unwrap()).unwrap();
        std::fs::write(&options.manifest_path, "{").unwrap();

        let ctx = ExecutionContext::current();
        let report = Verifier::new(&options, &AllPresent, &ctx).run().await;
        let failed: Vec<&str> = report.failures().map(|c| c.name).collect();
        assert_eq!(failed, ["manifest"]);
    }

    fn failed_class(report: VerifyReport) -> (Vec<&'static str>, DeployError) {
        let failed = report.failures().map(|c| c.name).collect();
        (failed, report.into_result().unwrap_err())
    }

    #[tokio::test]
    async fn test_missing_entrypoint_is_not_found() {
        let dir = tempfile::tempdir().unwrap();
        let options = built_tree(dir.path());
        record_assets(&options);
        std::fs::remove_file(&options.launch.program).unwrap();

        let ctx = ExecutionContext::current();
        let report = Verifier::new(&options, &AllPresent, &ctx).run().await;
        assert_eq!(report.checks[3].exit_code, Some(127));

        let (failed, err) = failed_class(report);
        assert_eq!(failed, ["entrypoint"]);
        assert!(matches!(err, DeployError::NotFound(_)));
        assert_eq!(err.exit_code(), 127);
    }

    #[tokio::test]
    async fn test_non_executable_entrypoint_cannot_launch() {
        let dir = tempfile::tempdir().unwrap();
        let mut options = built_tree(dir.path());
        record_assets(&options);
        std::fs::set_permissions(&options.launch.program, std::fs::Permissions::from_mode(0o644))
            .unwrap();

        let ctx = ExecutionContext::current().with_env("PATH", "/bin:/usr/bin");
        let report = Verifier::new(&options, &AllPresent, &ctx).run().await;
        let (failed, err) = failed_class(report);
        assert_eq!(failed, ["entrypoint"]);
        assert_eq!(err.exit_code(), 126);

        // An interpreter makes the executable bit irrelevant
        options.launch.interpreter = Some("sh".into());
        let report = Verifier::new(&options, &AllPresent, &ctx).run().await;
        assert!(report.is_ok(), "{:?}", report);
    }

    #[tokio::test]
    async fn test_missing_serving_root_is_directory_failure() {
        let dir = tempfile::tempdir().unwrap();
        let options = built_tree(dir.path());
        record_assets(&options);
        std::fs::remove_dir(&options.serving_root.path).unwrap();

        let ctx = ExecutionContext::current();
        let report = Verifier::new(&options, &AllPresent, &ctx).run().await;
        let (failed, err) = failed_class(report);
        assert_eq!(failed, [names::SERVING_ROOT]);
        assert!(matches!(err, DeployError::Directory(_)));
        assert_eq!(err.exit_code(), 70);
    }
}
