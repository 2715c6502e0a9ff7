//! Stage orchestration.
//!
//! A [`Pipeline`] is a DAG of named [`PipelineTask`]s. Each task declares
//! the stages it requires and whether it needs the build identity. The
//! orchestrator validates the graph up front (duplicates, unknown
//! prerequisites, cycles, privileged work ordered after a privilege drop),
//! then runs tasks one at a time in topological order and halts on the
//! first failure.
//!
//! ```text
//! provision ──→ assets ──→ serving_root ──→ launch
//! ```
//!
//! After each task the orchestrator appends a [`LayerRecord`] to the
//! manifest and persists it when a manifest path is configured.

pub mod tasks;
mod types;

pub use types::{DeployCtx, DeployPipelineContext};

use crate::manifest::LayerRecord;
use async_trait::async_trait;
use chrono::Utc;
use orgdeploy_shared::errors::{DeployError, DeployResult};
use petgraph::algo::toposort;
use petgraph::graph::{DiGraph, NodeIndex};
use std::collections::HashMap;
use tasks::{AssetsTask, LaunchTask, ProvisionTask, ServingRootTask};

#[async_trait]
pub trait PipelineTask<Ctx>: Send + Sync {
    async fn run(self: Box<Self>, ctx: Ctx) -> DeployResult<()>;

    fn name(&self) -> &str;

    /// Stages that must complete before this one.
    fn requires(&self) -> &[&'static str] {
        &[]
    }

    /// Needs the build identity; refused once privileges were dropped.
    fn requires_privilege(&self) -> bool {
        false
    }

    /// Leaves the context on the runtime identity.
    fn drops_privileges(&self) -> bool {
        false
    }
}

pub struct Pipeline {
    tasks: Vec<Box<dyn PipelineTask<DeployCtx>>>,
}

impl Default for Pipeline {
    fn default() -> Self {
        Self::new()
    }
}

impl Pipeline {
    pub fn new() -> Self {
        Self { tasks: Vec::new() }
    }

    pub fn with_task<T>(mut self, task: T) -> Self
    where
        T: PipelineTask<DeployCtx> + 'static,
    {
        self.tasks.push(Box::new(task));
        self
    }

    /// provision → assets → serving_root
    pub fn build_stages() -> Self {
        Self::new()
            .with_task(ProvisionTask)
            .with_task(AssetsTask)
            .with_task(ServingRootTask)
    }

    /// Build stages followed by the launcher.
    pub fn full() -> Self {
        Self::build_stages().with_task(LaunchTask)
    }

    /// Stage names in execution order.
    pub fn plan(&self) -> DeployResult<Vec<String>> {
        Ok(self
            .order()?
            .into_iter()
            .map(|i| self.tasks[i].name().to_string())
            .collect())
    }

    /// Validated execution order as task indices.
    fn order(&self) -> DeployResult<Vec<usize>> {
        let mut graph: DiGraph<usize, ()> = DiGraph::new();
        let mut nodes: HashMap<&str, NodeIndex> = HashMap::new();

        for (i, task) in self.tasks.iter().enumerate() {
            let node = graph.add_node(i);
            if nodes.insert(task.name(), node).is_some() {
                return Err(DeployError::Pipeline(format!(
                    "duplicate stage '{}'",
                    task.name()
                )));
            }
        }

        for task in &self.tasks {
            let to = nodes[task.name()];
            for required in task.requires() {
                let from = nodes.get(required).copied().ok_or_else(|| {
                    DeployError::Pipeline(format!(
                        "stage '{}' requires unknown stage '{}'",
                        task.name(),
                        required
                    ))
                })?;
                if from == to {
                    return Err(DeployError::Pipeline(format!(
                        "stage '{}' requires itself",
                        task.name()
                    )));
                }
                graph.add_edge(from, to, ());
            }
        }

        let sorted = toposort(&graph, None).map_err(|cycle| {
            DeployError::Pipeline(format!(
                "dependency cycle involving stage '{}'",
                self.tasks[graph[cycle.node_id()]].name()
            ))
        })?;
        let order: Vec<usize> = sorted.into_iter().map(|n| graph[n]).collect();

        let mut dropped_by: Option<&str> = None;
        for &i in &order {
            let task = &self.tasks[i];
            if let Some(dropper) = dropped_by
                && task.requires_privilege()
            {
                return Err(DeployError::Pipeline(format!(
                    "privileged stage '{}' ordered after privilege drop in '{}'",
                    task.name(),
                    dropper
                )));
            }
            if task.drops_privileges() {
                dropped_by = Some(task.name());
            }
        }

        Ok(order)
    }

    /// Run every task in order, halting on the first failure.
    pub async fn run(self, ctx: DeployCtx) -> DeployResult<()> {
        let order = self.order()?;
        let mut slots: Vec<Option<Box<dyn PipelineTask<DeployCtx>>>> =
            self.tasks.into_iter().map(Some).collect();

        tracing::info!(stages = order.len(), "Pipeline started");

        for i in order {
            let Some(task) = slots[i].take() else {
                continue;
            };
            let name = task.name().to_string();

            {
                let ctx = ctx.lock().await;
                if task.requires_privilege() && ctx.exec.has_dropped_privileges() {
                    return Err(DeployError::Pipeline(format!(
                        "stage '{}' requires privilege but context already runs as {}",
                        name,
                        ctx.exec.identity()
                    )));
                }
            }

            let started_at = Utc::now();
            if let Err(e) = task.run(ctx.clone()).await {
                tracing::error!(stage = %name, "Pipeline halted: {}", e);
                return Err(e);
            }

            let mut ctx = ctx.lock().await;
            let record = LayerRecord {
                stage: name,
                started_at,
                finished_at: Utc::now(),
                identity: ctx.exec.identity(),
                summary: ctx.postcondition.take().unwrap_or_default(),
                outputs: std::mem::take(&mut ctx.outputs),
            };
            tracing::debug!(stage = %record.stage, summary = %record.summary, "Layer recorded");
            ctx.manifest.push(record);

            if let Some(path) = ctx.manifest_path.clone() {
                ctx.manifest.persist(&path)?;
            }
        }

        tracing::info!("Pipeline finished");
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::context::{ExecutionContext, Identity};
    use crate::options::DeployOptions;
    use crate::runner::HostRunner;
    use std::sync::Arc;
    use std::sync::atomic::{AtomicUsize, Ordering};

    struct Step {
        name: &'static str,
        requires: &'static [&'static str],
        privileged: bool,
        drops: bool,
        fail: bool,
        ran: Arc<AtomicUsize>,
    }

    impl Step {
        fn new(name: &'static str, requires: &'static [&'static str]) -> Self {
            Self {
                name,
                requires,
                privileged: false,
                drops: false,
                fail: false,
                ran: Arc::new(AtomicUsize::new(0)),
            }
        }
    }

    #[async_trait]
    impl PipelineTask<DeployCtx> for Step {
        async fn run(self: Box<Self>, ctx: DeployCtx) -> DeployResult<()> {
            self.ran.fetch_add(1, Ordering::SeqCst);
            if self.fail {
                return Err(DeployError::Build(format!("{} failed", self.name)));
            }
            let mut ctx = ctx.lock().await;
            if self.drops {
                ctx.exec = ctx.exec.drop_privileges(Identity::RUNTIME)?;
            }
            ctx.postcondition = Some(format!("{} ok", self.name));
            Ok(())
        }

        fn name(&self) -> &str {
            self.name
        }

        fn requires(&self) -> &[&'static str] {
            self.requires
        }

        fn requires_privilege(&self) -> bool {
            self.privileged
        }

        fn drops_privileges(&self) -> bool {
            self.drops
        }
    }

    fn ctx() -> DeployCtx {
        DeployPipelineContext::new(
            DeployOptions::default(),
            Arc::new(HostRunner::new()),
            ExecutionContext::privileged(),
        )
        .into_shared()
    }

    #[test]
    fn test_full_plan_order() {
        assert_eq!(
            Pipeline::full().plan().unwrap(),
            ["provision", "assets", "serving_root", "launch"]
        );
    }

    #[test]
    fn test_declaration_order_does_not_matter() {
        let pipeline = Pipeline::new()
            .with_task(Step::new("c", &["b"]))
            .with_task(Step::new("b", &["a"]))
            .with_task(Step::new("a", &[]));
        assert_eq!(pipeline.plan().unwrap(), ["a", "b", "c"]);
    }

    #[test]
    fn test_duplicate_stage_rejected() {
        let pipeline = Pipeline::new()
            .with_task(Step::new("a", &[]))
            .with_task(Step::new("a", &[]));
        let err = pipeline.plan().unwrap_err();
        assert!(matches!(err, DeployError::Pipeline(_)));
        assert!(err.to_string().contains("duplicate"));
    }

    #[test]
    fn test_unknown_prerequisite_rejected() {
        let err = Pipeline::new()
            .with_task(Step::new("assets", &["provision"]))
            .plan()
            .unwrap_err();
        assert!(err.to_string().contains("unknown stage 'provision'"));
    }

    #[test]
    fn test_cycle_rejected() {
        let err = Pipeline::new()
            .with_task(Step::new("a", &["b"]))
            .with_task(Step::new("b", &["a"]))
            .plan()
            .unwrap_err();
        assert!(err.to_string().contains("cycle"));
    }

    #[test]
    fn test_privileged_after_drop_rejected() {
        let mut launch = Step::new("launch", &[]);
        launch.drops = true;
        let mut late = Step::new("late_install", &["launch"]);
        late.privileged = true;

        let err = Pipeline::new()
            .with_task(launch)
            .with_task(late)
            .plan()
            .unwrap_err();
        assert!(err.to_string().contains("after privilege drop"));
    }

    #[tokio::test]
    async fn test_first_failure_halts() {
        let mut failing = Step::new("b", &["a"]);
        failing.fail = true;
        let last = Step::new("c", &["b"]);
        let last_ran = last.ran.clone();

        let ctx = ctx();
        let err = Pipeline::new()
            .with_task(Step::new("a", &[]))
            .with_task(failing)
            .with_task(last)
            .run(ctx.clone())
            .await
            .unwrap_err();

        assert!(matches!(err, DeployError::Build(_)));
        assert_eq!(last_ran.load(Ordering::SeqCst), 0);
        assert_eq!(ctx.lock().await.manifest.stages(), ["a"]);
    }

    #[tokio::test]
    async fn test_records_accumulate_in_order() {
        let dir = tempfile::tempdir().unwrap();
        let manifest_path = dir.path().join("manifest.json");
        let ctx = DeployPipelineContext::new(
            DeployOptions::default(),
            Arc::new(HostRunner::new()),
            ExecutionContext::privileged(),
        )
        .with_manifest_path(&manifest_path)
        .into_shared();

        let mut drop_step = Step::new("c", &["b"]);
        drop_step.drops = true;

        Pipeline::new()
            .with_task(Step::new("a", &[]))
            .with_task(Step::new("b", &["a"]))
            .with_task(drop_step)
            .run(ctx.clone())
            .await
            .unwrap();

        let ctx = ctx.lock().await;
        assert_eq!(ctx.manifest.stages(), ["a", "b", "c"]);
        assert_eq!(ctx.manifest.layers[0].summary, "a ok");
        assert_eq!(ctx.manifest.layers[0].identity, Identity::ROOT);
        assert_eq!(ctx.manifest.layers[2].identity, Identity::RUNTIME);

        let persisted = crate::manifest::BuildManifest::load(&manifest_path).unwrap();
        assert_eq!(persisted, ctx.manifest);
    }

    #[tokio::test]
    async fn test_runtime_privilege_check() {
        let mut privileged = Step::new("install", &[]);
        privileged.privileged = true;
        let ran = privileged.ran.clone();

        let ctx = ctx();
        {
            let mut guard = ctx.lock().await;
            guard.exec = guard.exec.drop_privileges(Identity::RUNTIME).unwrap();
        }

        let err = Pipeline::new()
            .with_task(privileged)
            .run(ctx)
            .await
            .unwrap_err();
        assert!(matches!(err, DeployError::Pipeline(_)));
        assert_eq!(ran.load(Ordering::SeqCst), 0);
    }
}
