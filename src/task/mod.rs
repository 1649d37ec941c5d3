// src/task/mod.rs

//! A single scheduled probe.
//!
//! A [`Task`] owns its inputs and module reference immutably and keeps its
//! lifecycle (state, timestamps, captured output, process ids) behind a
//! private lock. Other probes only ever see its result, through
//! [`Scope::update_with_result`].

pub mod state;

use std::collections::BTreeMap;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::Duration;

use tracing::{debug, warn};

use crate::audit::AuditSink;
use crate::config::model::ProbeDef;
use crate::dag::{Bindings, Scope};
use crate::errors::{ProbeDagError, Result};
use crate::exec::CommandLine;
use crate::exec::process::kill_tree;
use crate::modules::{CommandTemplate, Module, ModuleRegistry};
use crate::template::{Condition, quote, substitute};
use crate::types::{TaskId, TaskName, Value};

pub use state::{TaskSnapshot, TaskState, Timestamps};

/// Reserved input holding the gating condition.
pub const CONDITION_KEY: &str = "condition";
/// Reserved input holding the timeout in seconds.
pub const TIMEOUT_KEY: &str = "timeout";

#[derive(Debug)]
struct TaskInner {
    state: TaskState,
    history: Vec<TaskState>,
    timestamps: Timestamps,
    dependencies: Vec<TaskName>,
    command: Option<String>,
    exit_code: Option<i32>,
    stdout: String,
    stderr: String,
    result: Option<Value>,
    pids: Vec<u32>,
    process_group: Option<u32>,
    timed_out: bool,
}

/// One probe of a batch.
#[derive(Debug)]
pub struct Task {
    pub(crate) id: TaskId,
    name: Option<TaskName>,
    module: Arc<Module>,
    inputs: BTreeMap<String, String>,
    /// Global fallback timeout in seconds.
    default_timeout: Option<f64>,
    inner: Mutex<TaskInner>,
}

impl Task {
    /// Create a probe in the `Preparing` state. Its id is assigned when it is
    /// registered with a [`Scope`].
    pub fn new(def: &ProbeDef, module: Arc<Module>, default_timeout: Option<f64>) -> Self {
        Self {
            id: TaskId(0),
            name: def.name.clone(),
            module,
            inputs: def.config.clone(),
            default_timeout,
            inner: Mutex::new(TaskInner {
                state: TaskState::Preparing,
                history: vec![TaskState::Preparing],
                timestamps: Timestamps::new(),
                dependencies: Vec::new(),
                command: None,
                exit_code: None,
                stdout: String::new(),
                stderr: String::new(),
                result: None,
                pids: Vec::new(),
                process_group: None,
                timed_out: false,
            }),
        }
    }

    /// Look up `def`'s module in `registry` and create the probe.
    ///
    /// A missing type is a [`ProbeDagError::UnknownModuleType`].
    pub fn from_def(
        def: &ProbeDef,
        registry: &ModuleRegistry,
        default_timeout: Option<f64>,
    ) -> Result<Self> {
        let module = registry.get(&def.kind)?;
        Ok(Self::new(def, module, default_timeout))
    }

    fn lock(&self) -> MutexGuard<'_, TaskInner> {
        self.inner.lock().unwrap_or_else(PoisonError::into_inner)
    }

    pub fn id(&self) -> TaskId {
        self.id
    }

    pub fn name(&self) -> Option<&str> {
        self.name.as_deref()
    }

    pub fn module(&self) -> &Arc<Module> {
        &self.module
    }

    pub fn inputs(&self) -> &BTreeMap<String, String> {
        &self.inputs
    }

    /// Human-readable identifier for logs: the name, else `type#id`.
    pub fn label(&self) -> String {
        match &self.name {
            Some(name) => name.clone(),
            None => format!("{}{}", self.module.name, self.id),
        }
    }

    pub fn state(&self) -> TaskState {
        self.lock().state
    }

    /// Every state this probe has been in, in order.
    pub fn state_history(&self) -> Vec<TaskState> {
        self.lock().history.clone()
    }

    pub fn result(&self) -> Option<Value> {
        self.lock().result.clone()
    }

    pub fn stdout(&self) -> String {
        self.lock().stdout.clone()
    }

    pub fn stderr(&self) -> String {
        self.lock().stderr.clone()
    }

    pub fn pids(&self) -> Vec<u32> {
        self.lock().pids.clone()
    }

    pub fn timestamps(&self) -> Timestamps {
        self.lock().timestamps
    }

    pub fn dependencies(&self) -> Vec<TaskName> {
        self.lock().dependencies.clone()
    }

    pub fn condition(&self) -> Option<&str> {
        self.inputs.get(CONDITION_KEY).map(String::as_str)
    }

    /// Move to `next` if the transition is legal; returns whether it happened.
    pub(crate) fn transition(&self, next: TaskState) -> bool {
        let mut inner = self.lock();
        Self::transition_locked(&mut inner, next)
    }

    fn transition_locked(inner: &mut TaskInner, next: TaskState) -> bool {
        if !inner.state.can_transition_to(next) {
            return false;
        }
        inner.state = next;
        inner.history.push(next);
        match next {
            TaskState::Running => inner.timestamps.mark_started(),
            TaskState::TimedOut => inner.timed_out = true,
            s if s.is_terminal() => inner.timestamps.mark_finished(),
            _ => {}
        }
        true
    }

    /// Register every still-pending name this probe's inputs or module
    /// command refer to as a dependency.
    ///
    /// Placeholders in the module command that name one of this probe's own
    /// inputs are filled from the input, not the scope, and are skipped.
    /// Must run for every probe of a batch before any probe launches.
    pub fn prep_input_dependencies(&self, scope: &Scope) -> Result<()> {
        let mut deps: Vec<TaskName> = Vec::new();

        for template in self.inputs.values() {
            deps.extend(scope.unresolved_dependencies(template));
        }
        for part in self.module.command.parts() {
            deps.extend(
                scope
                    .unresolved_dependencies(part)
                    .into_iter()
                    .filter(|name| !self.inputs.contains_key(name)),
            );
        }

        for dep in &deps {
            scope.register_dependency(self.id, dep)?;
        }

        let mut inner = self.lock();
        inner.dependencies = deps;
        Self::transition_locked(&mut inner, TaskState::Waiting);
        debug!(task = %self.label(), deps = ?inner.dependencies, "dependencies registered");
        Ok(())
    }

    /// Whether this probe should run. No `condition` input means yes.
    pub fn evaluate_condition(&self, scope: &Scope) -> Result<bool> {
        scope.with_bindings(|bindings| self.condition_holds(bindings))
    }

    pub(crate) fn condition_holds(&self, bindings: &Bindings) -> Result<bool> {
        match self.condition() {
            None => Ok(true),
            Some(source) => Condition::parse(source)?.evaluate(|name| bindings.get(name).cloned()),
        }
    }

    /// An input with scope bindings substituted in.
    pub fn resolve_input(&self, key: &str, bindings: &Bindings) -> Option<String> {
        let raw = self.inputs.get(key)?;
        Some(substitute(raw, |name| bindings.get(name).map(Value::to_string)))
    }

    /// Substitute inputs and bindings into the module's command.
    ///
    /// A placeholder is filled from the probe's own input of that name
    /// (itself resolved against `bindings`), else from `bindings`, else left
    /// as-is. Shell commands get every value quoted as one word; argv
    /// commands take values verbatim.
    pub fn build_command(&self, bindings: &Bindings) -> Result<CommandLine> {
        let value_of = |name: &str| -> Option<String> {
            self.resolve_input(name, bindings)
                .or_else(|| bindings.get(name).map(Value::to_string))
        };

        match &self.module.command {
            CommandTemplate::Shell(line) => {
                let mut failure: Option<ProbeDagError> = None;
                let built = substitute(line, |name| {
                    let value = value_of(name)?;
                    match quote(&value) {
                        Ok(q) => Some(q),
                        Err(e) => {
                            failure.get_or_insert(e);
                            None
                        }
                    }
                });
                match failure {
                    Some(e) => Err(e),
                    None => Ok(CommandLine::Shell(built)),
                }
            }
            CommandTemplate::Argv(argv) => Ok(CommandLine::Argv(
                argv.iter().map(|part| substitute(part, &value_of)).collect(),
            )),
        }
    }

    /// Timeout from the `timeout` input, else the module, else the global
    /// default. Zero or negative means no timeout.
    pub fn effective_timeout(&self, bindings: &Bindings) -> Result<Option<Duration>> {
        let seconds = match self.resolve_input(TIMEOUT_KEY, bindings) {
            Some(raw) => raw.trim().parse::<f64>().map_err(|_| {
                ProbeDagError::ConfigError(format!(
                    "probe '{}' has invalid timeout '{raw}'",
                    self.label()
                ))
            })?,
            None => match self.module.timeout.or(self.default_timeout) {
                Some(secs) => secs,
                None => return Ok(None),
            },
        };

        if seconds.is_nan() {
            return Err(ProbeDagError::ConfigError(format!(
                "probe '{}' has invalid timeout",
                self.label()
            )));
        }
        if seconds <= 0.0 {
            return Ok(None);
        }
        Ok(Duration::try_from_secs_f64(seconds).ok())
    }

    /// Run the probe to a terminal state, then publish its result.
    ///
    /// See [`crate::exec::task_runner::run_task`].
    pub async fn run(&self, scope: &Scope, audit: &dyn AuditSink) {
        crate::exec::task_runner::run_task(self, scope, audit).await;
    }

    /// Record the process about to be supervised and enter `Running`.
    ///
    /// Returns `false` if the probe was already killed, in which case the
    /// caller must tear the process down itself.
    pub(crate) fn mark_running(&self, command: &CommandLine, pids: Vec<u32>) -> bool {
        let mut inner = self.lock();
        inner.command = Some(command.to_string());
        inner.process_group = pids.first().copied();
        inner.pids = pids;
        Self::transition_locked(&mut inner, TaskState::Running)
    }

    pub(crate) fn record_command(&self, command: &CommandLine) {
        self.lock().command = Some(command.to_string());
    }

    /// Store captured output and settle the final state.
    ///
    /// A probe still `Running` ends `Error` if it wrote to stderr, else
    /// `Finished` with its stdout as result. Probes killed meanwhile keep
    /// their `Terminated` state and yield the failure sentinel.
    pub(crate) fn complete(&self, stdout: String, stderr: String, exit_code: Option<i32>) -> Value {
        let mut inner = self.lock();
        inner.exit_code = exit_code;

        let value = if inner.state == TaskState::Running {
            if stderr.is_empty() {
                Self::transition_locked(&mut inner, TaskState::Finished);
                Value::Text(trim_trailing_newline(&stdout).to_string())
            } else {
                Self::transition_locked(&mut inner, TaskState::Error);
                Value::Failed
            }
        } else {
            Value::Failed
        };

        inner.stdout = stdout;
        inner.stderr = stderr;
        value
    }

    /// End the probe in `Error` before (or instead of) running it.
    pub(crate) fn fail(&self, message: String) -> Value {
        let mut inner = self.lock();
        if !inner.stderr.is_empty() {
            inner.stderr.push('\n');
        }
        inner.stderr.push_str(&message);
        if !Self::transition_locked(&mut inner, TaskState::Error) {
            Self::transition_locked(&mut inner, TaskState::Terminated);
        }
        Value::Failed
    }

    pub(crate) fn set_result(&self, value: Value) {
        let mut inner = self.lock();
        inner.timestamps.mark_finished();
        inner.result = Some(value);
    }

    /// Mark the timeout and kill the process tree.
    pub(crate) fn time_out(&self) {
        if self.transition(TaskState::TimedOut) {
            warn!(task = %self.label(), "probe timed out; killing process tree");
        }
        self.kill();
    }

    /// Kill every recorded process still alive and mark the probe
    /// `Terminated`.
    ///
    /// Safe to call repeatedly and in any state: probes that already
    /// finished keep their state, probes that never started end
    /// `Terminated` without running.
    pub fn kill(&self) {
        let (live, group, pids) = {
            let mut inner = self.lock();
            // Recorded pids are only ours while the child is unreaped.
            let live = matches!(inner.state, TaskState::Running | TaskState::TimedOut);
            if !inner.state.is_terminal() {
                Self::transition_locked(&mut inner, TaskState::Terminated);
            }
            (live, inner.process_group, inner.pids.clone())
        };

        if live && !pids.is_empty() {
            debug!(task = %self.label(), ?pids, "killing process tree");
            kill_tree(group, &pids);
        }
    }

    /// Copy of the probe's current record for audit sinks.
    pub fn snapshot(&self) -> TaskSnapshot {
        let inner = self.lock();
        let (created, started, finished) = TaskSnapshot::times(&inner.timestamps);
        TaskSnapshot {
            id: self.id,
            module: self.module.name.clone(),
            name: self.name.clone().unwrap_or_default(),
            state: inner.state,
            timed_out: inner.timed_out,
            created,
            started,
            finished,
            inputs: self.inputs.clone(),
            dependencies: inner.dependencies.clone(),
            command: inner.command.clone(),
            exit_code: inner.exit_code,
            stdout: inner.stdout.clone(),
            stderr: inner.stderr.clone(),
            result: inner.result.clone(),
            pids: inner.pids.clone(),
        }
    }
}

/// Drop one trailing `\n` (or `\r\n`), like shell command substitution.
fn trim_trailing_newline(s: &str) -> &str {
    s.strip_suffix("\r\n")
        .or_else(|| s.strip_suffix('\n'))
        .unwrap_or(s)
}
