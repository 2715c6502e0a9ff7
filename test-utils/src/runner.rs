use async_trait::async_trait;
use orgdeploy::{
    CommandOutput, CommandRunner, CommandSpec, DeployError, DeployResult, ExecutionContext,
    Identity,
};
use parking_lot::Mutex;
use std::collections::{HashMap, HashSet};
use std::path::PathBuf;
use std::sync::Arc;

type Effect = Arc<dyn Fn(&CommandSpec, &ExecutionContext) + Send + Sync>;

/// One `run` call as the runner saw it.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RecordedCall {
    pub spec: CommandSpec,
    pub cwd: PathBuf,
    pub identity: Identity,
}

/// Records commands instead of executing them.
///
/// Every program resolves and exits 0 unless told otherwise. Side effects
/// (e.g. a build tool creating its output directory) are registered per
/// program with [`RecordingRunner::on`].
#[derive(Default)]
pub struct RecordingRunner {
    calls: Mutex<Vec<RecordedCall>>,
    available: Option<HashSet<String>>,
    missing: HashSet<String>,
    outputs: HashMap<String, CommandOutput>,
    effects: HashMap<String, Effect>,
}

impl RecordingRunner {
    pub fn new() -> Self {
        Self::default()
    }

    /// Only these programs resolve.
    pub fn with_available<I, S>(mut self, programs: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.available = Some(programs.into_iter().map(Into::into).collect());
        self
    }

    /// Make `program` resolve to nothing.
    pub fn without(mut self, program: &str) -> Self {
        self.missing.insert(program.to_string());
        self
    }

    /// Every run of `program` ends with `code`.
    pub fn exit_with(mut self, program: &str, code: i32) -> Self {
        self.outputs
            .insert(program.to_string(), CommandOutput::exited(code));
        self
    }

    /// Run `effect` whenever `program` runs, before the output is returned.
    pub fn on<F>(mut self, program: &str, effect: F) -> Self
    where
        F: Fn(&CommandSpec, &ExecutionContext) + Send + Sync + 'static,
    {
        self.effects.insert(program.to_string(), Arc::new(effect));
        self
    }

    pub fn calls(&self) -> Vec<RecordedCall> {
        self.calls.lock().clone()
    }

    /// Command lines in call order, rendered like `CommandSpec`'s Display.
    pub fn commands(&self) -> Vec<String> {
        self.calls
            .lock()
            .iter()
            .map(|c| c.spec.to_string())
            .collect()
    }

    fn is_available(&self, program: &str) -> bool {
        if self.missing.contains(program) {
            return false;
        }
        match &self.available {
            Some(set) => set.contains(program),
            None => true,
        }
    }
}

#[async_trait]
impl CommandRunner for RecordingRunner {
    async fn run(&self, cmd: &CommandSpec, ctx: &ExecutionContext) -> DeployResult<CommandOutput> {
        self.calls.lock().push(RecordedCall {
            spec: cmd.clone(),
            cwd: ctx.cwd().to_path_buf(),
            identity: ctx.identity(),
        });

        if !self.is_available(&cmd.program) {
            return Err(DeployError::NotFound(cmd.program.clone()));
        }

        if let Some(effect) = self.effects.get(&cmd.program) {
            effect(cmd, ctx);
        }

        Ok(self
            .outputs
            .get(&cmd.program)
            .copied()
            .unwrap_or_else(|| CommandOutput::exited(0)))
    }

    fn resolve(&self, program: &str, _ctx: &ExecutionContext) -> Option<PathBuf> {
        self.is_available(program)
            .then(|| PathBuf::from("/usr/bin").join(program))
    }
}
