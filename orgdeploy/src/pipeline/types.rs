//! Shared state of a pipeline run.

use crate::context::ExecutionContext;
use crate::manifest::BuildManifest;
use crate::options::DeployOptions;
use crate::runner::CommandRunner;
use crate::service::ServiceState;
use crate::stages::assets::BuildArtifacts;
use crate::stages::provision::ProvisionOutput;
use crate::stages::serving_root::ServingRootOutput;
use std::collections::BTreeMap;
use std::path::PathBuf;
use std::sync::Arc;
use tokio::sync::Mutex;

pub type DeployCtx = Arc<Mutex<DeployPipelineContext>>;

/// Pipeline context.
///
/// Tasks read from options/exec and write their outputs to the Option
/// fields. `postcondition` and `outputs` are taken by the orchestrator
/// after each task and become its layer record.
pub struct DeployPipelineContext {
    pub options: DeployOptions,
    pub runner: Arc<dyn CommandRunner>,
    pub exec: ExecutionContext,
    pub manifest: BuildManifest,
    /// Manifest is persisted after every stage when set.
    pub manifest_path: Option<PathBuf>,
    /// Manifest an earlier run left at `manifest_path`.
    pub previous: Option<BuildManifest>,
    pub postcondition: Option<String>,
    pub outputs: BTreeMap<String, String>,

    pub provisioned: Option<ProvisionOutput>,
    pub artifacts: Option<BuildArtifacts>,
    pub serving_root: Option<ServingRootOutput>,
    pub service: Option<ServiceState>,
}

impl DeployPipelineContext {
    pub fn new(options: DeployOptions, runner: Arc<dyn CommandRunner>, exec: ExecutionContext) -> Self {
        Self {
            options,
            runner,
            exec,
            manifest: BuildManifest::new(),
            manifest_path: None,
            previous: None,
            postcondition: None,
            outputs: BTreeMap::new(),
            provisioned: None,
            artifacts: None,
            serving_root: None,
            service: None,
        }
    }

    /// Persist to `path`, remembering what an earlier run recorded there.
    /// An unreadable earlier manifest is ignored; it gets overwritten.
    pub fn with_manifest_path(mut self, path: impl Into<PathBuf>) -> Self {
        let path = path.into();
        if path.is_file() {
            self.previous = BuildManifest::load(&path)
                .inspect_err(|e| tracing::debug!(path = %path.display(), "Ignoring earlier manifest: {}", e))
                .ok();
        }
        self.manifest_path = Some(path);
        self
    }

    /// Value `stage` recorded under `key` in the earlier run.
    pub fn previous_output(&self, stage: &str, key: &str) -> Option<PathBuf> {
        self.previous
            .as_ref()
            .and_then(|m| m.output(stage, key))
            .map(PathBuf::from)
    }

    pub fn into_shared(self) -> DeployCtx {
        Arc::new(Mutex::new(self))
    }
}
