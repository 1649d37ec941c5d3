// src/dag/scope.rs

//! Per-batch variable bindings plus the dependency bookkeeping over named
//! probes.

use std::collections::{BTreeSet, HashMap};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use tokio::sync::{mpsc, watch};
use tracing::{debug, trace, warn};

use crate::errors::{ProbeDagError, Result};
use crate::task::Task;
use crate::template::referenced_names;
use crate::types::{TaskId, Value};

/// Binding table as seen by substitution.
pub type Bindings = HashMap<String, Value>;

/// Answer of [`Scope::lookup`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Lookup {
    /// Neither a binding nor a registered probe name. Not a dependency; the
    /// placeholder stays literal text.
    Unbound,
    /// A registered probe name whose result is not available yet.
    Pending,
    /// A resolved value.
    Bound(Value),
}

#[derive(Debug, Default)]
struct ScopeState {
    bindings: Bindings,
    tasks: Vec<Arc<Task>>,
    names: HashMap<String, TaskId>,
    /// Unresolved dependency count per task.
    blocking: Vec<usize>,
    /// Tasks waiting on each task's result.
    waiters: Vec<Vec<TaskId>>,
    /// Set once a task has been handed to the ready queue.
    launched: Vec<bool>,
    cancelled: bool,
    settled: usize,
}

/// Variable bindings and dependency graph for one batch.
///
/// Every operation takes the internal lock for a short, non-blocking
/// critical section. Nothing here awaits or touches processes.
#[derive(Debug)]
pub struct Scope {
    state: Mutex<ScopeState>,
    ready_tx: mpsc::UnboundedSender<TaskId>,
    settled_tx: watch::Sender<usize>,
}

impl Scope {
    /// Create a scope seeded with `initial`.
    ///
    /// The returned receiver yields task ids as they become ready to run,
    /// each exactly once.
    pub fn new<I, K, V>(initial: I) -> (Self, mpsc::UnboundedReceiver<TaskId>)
    where
        I: IntoIterator<Item = (K, V)>,
        K: Into<String>,
        V: Into<Value>,
    {
        let (ready_tx, ready_rx) = mpsc::unbounded_channel();
        let (settled_tx, _) = watch::channel(0);
        let state = ScopeState {
            bindings: initial
                .into_iter()
                .map(|(k, v)| (k.into(), v.into()))
                .collect(),
            ..ScopeState::default()
        };

        let scope = Self {
            state: Mutex::new(state),
            ready_tx,
            settled_tx,
        };
        (scope, ready_rx)
    }

    fn lock(&self) -> MutexGuard<'_, ScopeState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Merge additional bindings (seed values, not probe results).
    pub fn bind(&self, name: impl Into<String>, value: impl Into<Value>) {
        self.lock().bindings.insert(name.into(), value.into());
    }

    /// Append `task` to the task list and return it shared.
    ///
    /// A name already used by another probe or by a seed binding is a
    /// [`ProbeDagError::DuplicateProbeName`].
    pub fn register_task(&self, mut task: Task) -> Result<Arc<Task>> {
        let mut state = self.lock();

        if let Some(name) = task.name() {
            if state.names.contains_key(name) || state.bindings.contains_key(name) {
                return Err(ProbeDagError::DuplicateProbeName(name.to_string()));
            }
        }

        let id = TaskId(state.tasks.len());
        task.id = id;
        let task = Arc::new(task);

        if let Some(name) = task.name() {
            state.names.insert(name.to_string(), id);
        }
        state.tasks.push(Arc::clone(&task));
        state.blocking.push(0);
        state.waiters.push(Vec::new());
        state.launched.push(false);

        trace!(task = %task.label(), "registered probe");
        Ok(task)
    }

    /// Record that `dependent` waits for the probe named `dependency`.
    ///
    /// Every call adds one to the dependent's blocking count.
    pub fn register_dependency(&self, dependent: TaskId, dependency: &str) -> Result<()> {
        let mut state = self.lock();

        let Some(&dep_id) = state.names.get(dependency) else {
            let label = state
                .tasks
                .get(dependent.0)
                .map(|t| t.label())
                .unwrap_or_else(|| dependent.to_string());
            return Err(ProbeDagError::UnknownDependency {
                task: label,
                dependency: dependency.to_string(),
            });
        };

        if dependent.0 >= state.tasks.len() {
            return Err(ProbeDagError::ConfigError(format!(
                "unknown probe id {dependent}"
            )));
        }

        state.waiters[dep_id.0].push(dependent);
        state.blocking[dependent.0] += 1;
        Ok(())
    }

    /// Bind a probe's result and release every waiter whose blocking count
    /// drops to zero. Released probes are queued, not awaited.
    pub fn update_with_result(&self, name: &str, result: Value) {
        let ready = {
            let mut guard = self.lock();
            let state = &mut *guard;
            state.bindings.insert(name.to_string(), result);

            let Some(&id) = state.names.get(name) else {
                warn!(name, "result for a name no probe declared");
                return;
            };

            let waiters = state.waiters[id.0].clone();
            let mut ready = Vec::new();
            for waiter in waiters {
                let count = &mut state.blocking[waiter.0];
                *count = count.saturating_sub(1);
                if *count == 0 && !state.launched[waiter.0] {
                    state.launched[waiter.0] = true;
                    ready.push(waiter);
                }
            }
            ready
        };

        if !ready.is_empty() {
            debug!(name, ?ready, "dependency resolved; releasing waiters");
        }
        self.enqueue(ready);
    }

    /// Queue every probe with no unresolved dependency that has not been
    /// launched yet.
    pub fn launch_ready(&self) -> Vec<TaskId> {
        let ready: Vec<TaskId> = {
            let mut state = self.lock();
            let ready: Vec<TaskId> = (0..state.tasks.len())
                .filter(|&i| state.blocking[i] == 0 && !state.launched[i])
                .map(TaskId)
                .collect();
            for id in &ready {
                state.launched[id.0] = true;
            }
            ready
        };

        self.enqueue(ready.clone());
        ready
    }

    fn enqueue(&self, ready: Vec<TaskId>) {
        for id in ready {
            if self.ready_tx.send(id).is_err() {
                warn!(task = %id, "ready queue closed; probe will not run");
            }
        }
    }

    pub fn lookup(&self, name: &str) -> Lookup {
        Self::lookup_in(&self.lock(), name)
    }

    fn lookup_in(state: &ScopeState, name: &str) -> Lookup {
        if let Some(value) = state.bindings.get(name) {
            Lookup::Bound(value.clone())
        } else if state.names.contains_key(name) {
            Lookup::Pending
        } else {
            Lookup::Unbound
        }
    }

    /// Names referenced by `template` that are real, still-pending
    /// dependencies.
    pub fn unresolved_dependencies(&self, template: &str) -> BTreeSet<String> {
        let state = self.lock();
        referenced_names(template)
            .into_iter()
            .filter(|name| Self::lookup_in(&state, name) == Lookup::Pending)
            .collect()
    }

    /// Run `f` against the current bindings while holding the lock.
    ///
    /// Keep `f` short: it blocks every other scope operation.
    pub fn with_bindings<R>(&self, f: impl FnOnce(&Bindings) -> R) -> R {
        f(&self.lock().bindings)
    }

    pub fn binding(&self, name: &str) -> Option<Value> {
        self.lock().bindings.get(name).cloned()
    }

    pub fn bindings(&self) -> Bindings {
        self.lock().bindings.clone()
    }

    pub fn tasks(&self) -> Vec<Arc<Task>> {
        self.lock().tasks.clone()
    }

    pub fn task(&self, id: TaskId) -> Option<Arc<Task>> {
        self.lock().tasks.get(id.0).cloned()
    }

    pub fn task_by_name(&self, name: &str) -> Option<Arc<Task>> {
        let state = self.lock();
        let id = state.names.get(name)?;
        state.tasks.get(id.0).cloned()
    }

    pub fn len(&self) -> usize {
        self.lock().tasks.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn blocking_count(&self, id: TaskId) -> Option<usize> {
        self.lock().blocking.get(id.0).copied()
    }

    /// Probes waiting on `id`'s result, one entry per registration.
    pub fn waiters_of(&self, id: TaskId) -> Vec<TaskId> {
        self.lock().waiters.get(id.0).cloned().unwrap_or_default()
    }

    /// `(dependency, dependent)` pairs.
    pub fn edges(&self) -> Vec<(TaskId, TaskId)> {
        let state = self.lock();
        state
            .waiters
            .iter()
            .enumerate()
            .flat_map(|(dep, waiters)| waiters.iter().map(move |&w| (TaskId(dep), w)))
            .collect()
    }

    /// Flag the batch as cancelled and return every task so the caller can
    /// kill them outside the lock.
    pub fn cancel(&self) -> Vec<Arc<Task>> {
        let mut state = self.lock();
        state.cancelled = true;
        state.tasks.clone()
    }

    pub fn is_cancelled(&self) -> bool {
        self.lock().cancelled
    }

    /// Count one more task as having reached a terminal state.
    pub(crate) fn task_settled(&self) {
        let settled = {
            let mut state = self.lock();
            state.settled += 1;
            state.settled
        };
        self.settled_tx.send_replace(settled);
    }

    pub fn settled_count(&self) -> usize {
        self.lock().settled
    }

    /// Receiver tracking the number of settled tasks.
    pub fn subscribe_settled(&self) -> watch::Receiver<usize> {
        self.settled_tx.subscribe()
    }
}
