//! Orchestrator - event-driven DAG execution with tokio
//!
//! One `run_dag` call per DAG invocation (root or nested):
//! - a task is dispatched once every upstream task reached a terminal state
//! - a JoinSet collects finished tasks in completion order
//! - nested DAGs recurse through a boxed future, each with its own ValueStore
//! - leaf dispatches share one Semaphore sized by `parallelism`
//!
//! Fail-fast: the first failure cancels a run-wide token. In-flight tasks
//! finish, nothing new starts, and the run fails naming that first task.

use std::collections::BTreeMap;
use std::sync::Arc;
use std::time::Instant;

use camino::{Utf8Path, Utf8PathBuf};
use chrono::Local;
use colored::Colorize;
use futures::future::{join_all, BoxFuture};
use futures::FutureExt;
use parking_lot::Mutex;
use rustc_hash::{FxHashMap, FxHashSet};
use serde_json::Value;
use tokio::sync::Semaphore;
use tokio::task::JoinSet;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, instrument, warn};
use uuid::Uuid;

use crate::ast::{
    ComponentSpec, DagSpec, ExecutorSpec, Implementation, PipelineSpec, TaskSpec, TriggerStrategy,
};
use crate::binding::{bind_defaults, bind_root_arguments, evaluate_condition};
use crate::config::ExecutionConfig;
use crate::dag::{validate_pipeline, FlowGraph};
use crate::error::{KilnError, Result};
use crate::event::{calculate_pipeline_hash, generate_run_id, EventKind, EventLog};
use crate::runner::TaskRunner;
use crate::store::{FinalStatus, RuntimeValue, TaskOutputs, TaskResult, TaskState, ValueStore};
use crate::util::{pipeline_resource_name, qualified_name, task_dir, task_resource_name};

use super::dispatch::{
    aggregate_instances, bind_task_inputs, collect_dag_outputs, iteration_items, omitted_outputs,
    parameter_values, run_container, run_importer, Bound, Leaf,
};

/// Component name used for the pipeline's root DAG
const ROOT: &str = "root";

// ═══════════════════════════════════════════════════════════════
// RUN STATE
// ═══════════════════════════════════════════════════════════════

/// State shared by every DAG invocation of one run
#[derive(Clone)]
struct RunContext {
    spec: Arc<PipelineSpec>,
    runner: Arc<dyn TaskRunner>,
    event_log: EventLog,
    permits: Arc<Semaphore>,
    cancel: CancellationToken,
    fail_fast: bool,
    progress: bool,
    pipeline_root: Arc<Utf8PathBuf>,
    pipeline_resource: Arc<str>,
    job_uuid: Arc<str>,
    /// (qualified task, reason) of the first failure anywhere in the run
    first_failure: Arc<Mutex<Option<(Arc<str>, String)>>>,
}

impl RunContext {
    fn first_failure(&self) -> Option<KilnError> {
        self.first_failure
            .lock()
            .as_ref()
            .map(|(task, reason)| KilnError::TaskFailed {
                task: task.to_string(),
                reason: reason.clone(),
            })
    }

    /// Turn an error into this task's failure
    ///
    /// Errors that are already `TaskFailed` originated deeper (an instance
    /// or a nested task) and were recorded there.
    fn fail(&self, task_id: &Arc<str>, err: KilnError, started: Instant) -> KilnError {
        if let KilnError::TaskFailed { .. } = &err {
            self.report_failure(task_id, &failure_reason(&err), started);
            return err;
        }
        let reason = failure_reason(&err);
        if err.is_recoverable() {
            info!(task = %task_id, code = err.code(), "Transient failure; a rerun may succeed");
        }
        {
            let mut first = self.first_failure.lock();
            if first.is_none() {
                *first = Some((Arc::clone(task_id), reason.clone()));
            }
        }
        if self.fail_fast && !self.cancel.is_cancelled() {
            warn!(task = %task_id, "Fail-fast: no new tasks will be dispatched");
            self.cancel.cancel();
        }
        self.report_failure(task_id, &reason, started);
        KilnError::TaskFailed {
            task: task_id.to_string(),
            reason,
        }
    }

    fn report_started(&self, task_id: &Arc<str>, inputs: &BTreeMap<String, RuntimeValue>) {
        self.event_log.emit(EventKind::TaskStarted {
            task_id: Arc::clone(task_id),
            inputs: Value::Object(inputs.iter().map(|(k, v)| (k.clone(), v.to_json())).collect()),
        });
        if self.progress {
            println!("  {} {} {}", "[⟳]".yellow(), task_id, "running...".dimmed());
        }
    }

    fn report_completed(&self, task_id: &Arc<str>, outputs: &TaskOutputs, started: Instant) {
        let duration = started.elapsed();
        info!(task = %task_id, duration_ms = duration.as_millis() as u64, "Task succeeded");
        self.event_log.emit(EventKind::TaskCompleted {
            task_id: Arc::clone(task_id),
            outputs: Arc::new(outputs.to_json()),
            duration_ms: duration.as_millis() as u64,
        });
        if self.progress {
            let duration_str = format!("({:.1}s)", duration.as_secs_f32()).dimmed();
            println!("  {} {} {}", "[✓]".green(), task_id, duration_str);
        }
    }

    fn report_failure(&self, task_id: &Arc<str>, reason: &str, started: Instant) {
        let duration = started.elapsed();
        error!(task = %task_id, %reason, "Task failed");
        self.event_log.emit(EventKind::TaskFailed {
            task_id: Arc::clone(task_id),
            error: reason.to_string(),
            duration_ms: duration.as_millis() as u64,
        });
        if self.progress {
            let duration_str = format!("({:.1}s)", duration.as_secs_f32()).dimmed();
            println!("  {} {} {}", "[✗]".red(), task_id, duration_str);
            println!("      {} {}", "Error:".red(), reason);
        }
    }

    fn report_skipped(&self, task_id: &Arc<str>, reason: &str) {
        warn!(task = %task_id, %reason, "Task skipped");
        self.event_log.emit(EventKind::TaskSkipped {
            task_id: Arc::clone(task_id),
            reason: reason.to_string(),
        });
        if self.progress {
            println!("  {} {} {}", "[-]".dimmed(), task_id, reason.dimmed());
        }
    }
}

/// Human-readable failure reason (without error-code prefixes we added)
fn failure_reason(err: &KilnError) -> String {
    match err {
        KilnError::TaskFailed { reason, .. } => reason.clone(),
        KilnError::Execution(message) => message.clone(),
        other => other.to_string(),
    }
}

/// Position of a DAG invocation inside the run
#[derive(Debug, Clone, Default)]
struct Scope {
    /// Qualified name of the enclosing DAG task (`None` at the root)
    qualified: Option<Arc<str>>,
    /// Resource-name prefix of the enclosing DAG task
    resource: Option<Arc<str>>,
    /// Task directory of the enclosing DAG task
    dir: Option<Arc<str>>,
}

impl Scope {
    fn qualify(&self, task: &str, index: Option<usize>) -> Arc<str> {
        Arc::from(qualified_name(self.qualified.as_deref(), task, index))
    }

    fn resource(&self, task: &str, index: Option<usize>) -> Arc<str> {
        Arc::from(task_resource_name(self.resource.as_deref(), task, index))
    }

    fn dir(&self, task: &str, index: Option<usize>) -> Arc<str> {
        Arc::from(task_dir(self.dir.as_deref(), task, index))
    }
}

/// Which component a DAG invocation executes
#[derive(Debug, Clone)]
enum ComponentKey {
    Root,
    Named(Arc<str>),
}

impl ComponentKey {
    fn name(&self) -> &str {
        match self {
            Self::Root => ROOT,
            Self::Named(name) => name,
        }
    }

    fn dag<'s>(&self, spec: &'s PipelineSpec) -> Result<&'s DagSpec> {
        let component = match self {
            Self::Root => &spec.root,
            Self::Named(name) => spec.component(name, name)?,
        };
        match component.implementation(self.name())? {
            Implementation::Dag(dag) => Ok(dag),
            Implementation::Executor(_) => Err(KilnError::InvalidImplementation {
                component: self.name().to_string(),
                reason: "expected a dag implementation".to_string(),
            }),
        }
    }
}

/// How one task of a DAG ended
enum TaskOutcome {
    Succeeded {
        outputs: TaskOutputs,
        /// Per-instance outputs of an iterated task
        instances: Option<Vec<TaskOutputs>>,
    },
    Skipped(String),
    Failed(KilnError),
    /// Never started because the run was cancelled
    Cancelled,
}

// ═══════════════════════════════════════════════════════════════
// ORCHESTRATOR
// ═══════════════════════════════════════════════════════════════

/// Executes a compiled pipeline with one `TaskRunner`
pub struct Orchestrator {
    spec: Arc<PipelineSpec>,
    config: ExecutionConfig,
    runner: Arc<dyn TaskRunner>,
    event_log: EventLog,
    run_id: String,
    progress: bool,
}

impl Orchestrator {
    pub fn new(spec: PipelineSpec, config: ExecutionConfig, runner: Arc<dyn TaskRunner>) -> Self {
        Self {
            spec: Arc::new(spec),
            config,
            runner,
            event_log: EventLog::new(),
            run_id: generate_run_id(),
            progress: false,
        }
    }

    /// Print colored per-task progress lines to stdout
    pub fn with_progress(mut self, progress: bool) -> Self {
        self.progress = progress;
        self
    }

    pub fn event_log(&self) -> &EventLog {
        &self.event_log
    }

    pub fn run_id(&self) -> &str {
        &self.run_id
    }

    pub fn spec(&self) -> &PipelineSpec {
        &self.spec
    }

    /// Run the whole pipeline and return the root DAG's outputs
    ///
    /// Outputs whose producers were all skipped are absent from the map.
    #[instrument(skip_all, fields(pipeline = %self.spec.name(), run_id = %self.run_id))]
    pub async fn run(&self, args: &BTreeMap<String, Value>) -> Result<BTreeMap<String, RuntimeValue>> {
        let started = Instant::now();
        self.spec.validate_schema()?;
        validate_pipeline(&self.spec)?;
        let inputs = bind_root_arguments(&self.spec.root, ROOT, args)?;
        let ctx = self.context()?;

        let task_count = self.spec.root.dag.as_ref().map_or(0, |d| d.tasks.len());
        self.event_log.emit(EventKind::PipelineStarted {
            task_count,
            run_id: self.run_id.clone(),
            pipeline_hash: calculate_pipeline_hash(&self.spec.to_json()?),
            kiln_version: env!("CARGO_PKG_VERSION").to_string(),
        });
        info!(resource = %ctx.pipeline_resource, root = %ctx.pipeline_root, "Starting pipeline");
        if self.progress {
            println!(
                "{} Running pipeline {} with {} tasks...\n",
                "→".cyan(),
                self.spec.name().bold(),
                task_count
            );
        }

        let result = run_dag(ctx.clone(), Scope::default(), ComponentKey::Root, inputs).await;
        let result = result.map_err(|err| ctx.first_failure().unwrap_or(err));

        match result {
            Ok(outputs) => {
                self.event_log.emit(EventKind::PipelineCompleted {
                    outputs: Arc::new(outputs.to_json()),
                    total_duration_ms: started.elapsed().as_millis() as u64,
                });
                if self.config.cleanup {
                    cleanup(&ctx.pipeline_root.join(&*ctx.pipeline_resource)).await;
                }
                if self.progress {
                    println!("\n{} Done!\n", "✓".green());
                }
                Ok(outputs.into_inner())
            }
            Err(err) => {
                let failed_task = match &err {
                    KilnError::TaskFailed { task, .. } => Some(Arc::from(task.as_str())),
                    _ => None,
                };
                self.event_log.emit(EventKind::PipelineFailed {
                    error: err.to_string(),
                    failed_task,
                });
                Err(err)
            }
        }
    }

    /// Run one component on its own (no surrounding pipeline DAG)
    ///
    /// Argument errors are returned as `Err`; an execution failure is a
    /// failed `TaskResult`.
    #[instrument(skip(self, args))]
    pub async fn run_component(
        &self,
        component_name: &str,
        args: &BTreeMap<String, Value>,
    ) -> Result<TaskResult> {
        let component = self.spec.component(component_name, component_name)?;
        let inputs = bind_root_arguments(component, component_name, args)?;
        let ctx = self.context()?;
        let started = Instant::now();

        let task: Arc<str> = Arc::from(component_name);
        let outcome = run_instance(
            ctx,
            Scope::default(),
            Arc::clone(&task),
            None,
            task,
            inputs,
        )
        .await;
        Ok(match outcome {
            Ok(Some(outputs)) => TaskResult::success(outputs, started.elapsed()),
            Ok(None) => TaskResult::failed("run cancelled", started.elapsed()),
            Err(err) => TaskResult::failed(failure_reason(&err), started.elapsed()),
        })
    }

    fn context(&self) -> Result<RunContext> {
        Ok(RunContext {
            spec: Arc::clone(&self.spec),
            runner: Arc::clone(&self.runner),
            event_log: self.event_log.clone(),
            permits: Arc::new(Semaphore::new(self.config.parallelism.max(1))),
            cancel: CancellationToken::new(),
            fail_fast: self.config.fail_fast,
            progress: self.progress,
            pipeline_root: Arc::new(absolute_root(&self.config.pipeline_root)?),
            pipeline_resource: Arc::from(pipeline_resource_name(self.spec.name(), Local::now())),
            job_uuid: Arc::from(Uuid::new_v4().to_string()),
            first_failure: Arc::new(Mutex::new(None)),
        })
    }
}

/// Containers mount the pipeline root at the same path, so it must be absolute
fn absolute_root(root: &Utf8Path) -> Result<Utf8PathBuf> {
    if root.is_absolute() {
        return Ok(root.to_path_buf());
    }
    let cwd = std::env::current_dir()?;
    let cwd = Utf8PathBuf::from_path_buf(cwd).map_err(|p| KilnError::InvalidConfig {
        message: format!("working directory {} is not valid UTF-8", p.display()),
    })?;
    Ok(cwd.join(root.strip_prefix("./").unwrap_or(root)))
}

async fn cleanup(dir: &Utf8Path) {
    match tokio::fs::remove_dir_all(dir).await {
        Ok(()) => debug!(%dir, "Removed task roots"),
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => {}
        Err(e) => warn!(%dir, error = %e, "Failed to remove task roots"),
    }
}

// ═══════════════════════════════════════════════════════════════
// DAG LOOP
// ═══════════════════════════════════════════════════════════════

fn run_dag(
    ctx: RunContext,
    scope: Scope,
    key: ComponentKey,
    inputs: BTreeMap<String, RuntimeValue>,
) -> BoxFuture<'static, Result<TaskOutputs>> {
    async move { execute_dag(ctx, scope, key, inputs).await }.boxed()
}

/// Terminal states of the tasks of one DAG invocation
struct Settled<'a> {
    ctx: &'a RunContext,
    scope: &'a Scope,
    store: &'a ValueStore,
    states: FxHashMap<Arc<str>, TaskState>,
}

impl Settled<'_> {
    fn is_done(&self, task: &str) -> bool {
        self.states.contains_key(task)
    }

    fn failed(&self, task: &str) -> bool {
        self.states.get(task) == Some(&TaskState::Failed)
    }

    fn settle(&mut self, task: &Arc<str>, state: TaskState, error: Option<String>) {
        let qualified = self.scope.qualify(task, None);
        self.store.put_final_status(
            task,
            FinalStatus {
                state,
                task_name: qualified.to_string(),
                job_resource_name: self.ctx.pipeline_resource.to_string(),
                error,
            },
        );
        self.states.insert(Arc::clone(task), state);
    }

    fn skip(&mut self, task: &Arc<str>, reason: &str) {
        self.ctx.report_skipped(&self.scope.qualify(task, None), reason);
        self.store.mark_skipped(task);
        self.settle(task, TaskState::Skipped, None);
    }
}

#[instrument(name = "dag", skip_all, fields(component = %key.name()))]
async fn execute_dag(
    ctx: RunContext,
    scope: Scope,
    key: ComponentKey,
    inputs: BTreeMap<String, RuntimeValue>,
) -> Result<TaskOutputs> {
    let spec = Arc::clone(&ctx.spec);
    let dag = key.dag(&spec)?;
    let graph = FlowGraph::from_dag(dag)?;
    let mut pending = graph.topological_order()?;
    let store = ValueStore::with_parent_inputs(inputs);
    let dag_id: Arc<str> = scope.qualified.clone().unwrap_or_else(|| Arc::from(""));

    ctx.event_log.emit(EventKind::DagStarted {
        dag: Arc::clone(&dag_id),
        task_count: pending.len(),
    });

    let mut settled = Settled {
        ctx: &ctx,
        scope: &scope,
        store: &store,
        states: FxHashMap::default(),
    };
    let mut running: JoinSet<(Arc<str>, TaskOutcome)> = JoinSet::new();
    let mut local_failure: Option<KilnError> = None;

    loop {
        // Dispatch everything whose upstream tasks are terminal; skips can
        // unlock further tasks, so repeat until nothing changes
        let mut progressed = true;
        while progressed && !ctx.cancel.is_cancelled() {
            progressed = false;
            let mut i = 0;
            while i < pending.len() {
                let deps = graph.get_dependencies(&pending[i]);
                if !deps.iter().all(|d| settled.is_done(d)) {
                    i += 1;
                    continue;
                }
                let name = pending.remove(i);
                progressed = true;
                let Some(task) = dag.tasks.get(&*name) else {
                    continue;
                };

                if task.strategy() == TriggerStrategy::AllUpstreamTasksSucceeded {
                    if let Some(upstream) = deps.iter().find(|d| settled.failed(d)) {
                        let reason = format!("upstream '{upstream}' failed");
                        settled.skip(&name, &reason);
                        continue;
                    }
                }

                let failed: FxHashSet<Arc<str>> =
                    deps.iter().filter(|d| settled.failed(d)).cloned().collect();
                ctx.event_log.emit(EventKind::TaskScheduled {
                    task_id: scope.qualify(&name, None),
                    dependencies: deps.to_vec(),
                });
                running.spawn(run_task(
                    ctx.clone(),
                    scope.clone(),
                    key.clone(),
                    name,
                    store.clone(),
                    failed,
                ));
            }
        }

        let Some(joined) = running.join_next().await else {
            break;
        };
        let (name, outcome) =
            joined.map_err(|e| KilnError::Execution(format!("task panicked: {e}")))?;

        match outcome {
            TaskOutcome::Succeeded { outputs, instances } => {
                if let Some(instances) = instances {
                    store.declare_iteration(&name);
                    for (index, instance) in instances.into_iter().enumerate() {
                        store.put_instance_outputs(&name, index, instance);
                    }
                }
                store.put_task_outputs(&name, &outputs);
                let component = dag
                    .tasks
                    .get(&*name)
                    .and_then(|task| spec.component(&name, &task.component_ref.name).ok());
                if let Some(component) = component {
                    for key in omitted_outputs(component, &outputs) {
                        debug!(task = %name, output = key, "Output omitted by nested DAG");
                        store.mark_omitted(&name, key);
                    }
                }
                settled.settle(&name, TaskState::Succeeded, None);
            }
            TaskOutcome::Skipped(reason) => settled.skip(&name, &reason),
            TaskOutcome::Failed(err) => {
                settled.settle(&name, TaskState::Failed, Some(failure_reason(&err)));
                local_failure.get_or_insert(err);
            }
            TaskOutcome::Cancelled => pending.push(name),
        }
    }

    let succeeded = local_failure.is_none() && pending.is_empty();
    let result = if let Some(err) = local_failure {
        Err(err)
    } else if !pending.is_empty() {
        if ctx.cancel.is_cancelled() {
            debug!(pending = pending.len(), "DAG stopped by fail-fast");
            Err(ctx
                .first_failure()
                .unwrap_or_else(|| KilnError::Execution("run cancelled".to_string())))
        } else {
            Err(KilnError::DagStalled {
                dag: key.name().to_string(),
                pending: pending.len(),
            })
        }
    } else {
        collect_dag_outputs(dag, &store)
    };

    ctx.event_log.emit(EventKind::DagCompleted {
        dag: dag_id,
        succeeded: succeeded && result.is_ok(),
    });
    result
}

// ═══════════════════════════════════════════════════════════════
// TASKS AND INSTANCES
// ═══════════════════════════════════════════════════════════════

async fn run_task(
    ctx: RunContext,
    scope: Scope,
    key: ComponentKey,
    name: Arc<str>,
    store: ValueStore,
    failed: FxHashSet<Arc<str>>,
) -> (Arc<str>, TaskOutcome) {
    let outcome = execute_task(&ctx, &scope, &key, &name, &store, &failed).await;
    (name, outcome)
}

/// Bind, evaluate the condition, then run once or once per item
async fn execute_task(
    ctx: &RunContext,
    scope: &Scope,
    key: &ComponentKey,
    name: &Arc<str>,
    store: &ValueStore,
    failed: &FxHashSet<Arc<str>>,
) -> TaskOutcome {
    let task_id = scope.qualify(name, None);
    let started = Instant::now();

    let prepared = prepare_task(ctx, key, name, store, failed);
    let (task, inputs) = match prepared {
        Ok(Prepared::Run { task, inputs }) => (task, inputs),
        Ok(Prepared::Skip(reason)) => return TaskOutcome::Skipped(reason),
        Err(err) => return TaskOutcome::Failed(ctx.fail(&task_id, err, started)),
    };
    let component_name: Arc<str> = Arc::from(task.component_ref.name.as_str());

    let Some(iterator) = &task.parameter_iterator else {
        return match run_instance(
            ctx.clone(),
            scope.clone(),
            Arc::clone(name),
            None,
            component_name,
            inputs,
        )
        .await
        {
            Ok(Some(outputs)) => TaskOutcome::Succeeded {
                outputs,
                instances: None,
            },
            Ok(None) => TaskOutcome::Cancelled,
            Err(err) => TaskOutcome::Failed(err),
        };
    };

    let items = match iteration_items(name, iterator, &inputs) {
        Ok(items) => items,
        Err(err) => return TaskOutcome::Failed(ctx.fail(&task_id, err, started)),
    };
    info!(task = %task_id, count = items.len(), "Fanning out");
    ctx.event_log.emit(EventKind::IterationStarted {
        task_id: Arc::clone(&task_id),
        count: items.len(),
    });

    let instances = items.into_iter().enumerate().map(|(index, item)| {
        let mut inputs = inputs.clone();
        inputs.insert(iterator.item_input.clone(), RuntimeValue::Parameter(item));
        run_instance(
            ctx.clone(),
            scope.clone(),
            Arc::clone(name),
            Some(index),
            Arc::clone(&component_name),
            inputs,
        )
    });
    let results = join_all(instances).await;

    let mut outputs = Vec::with_capacity(results.len());
    let mut cancelled = false;
    for result in results {
        match result {
            Ok(Some(instance)) => outputs.push(instance),
            Ok(None) => cancelled = true,
            Err(err) => return TaskOutcome::Failed(ctx.fail(&task_id, err, started)),
        }
    }
    if cancelled {
        return TaskOutcome::Cancelled;
    }

    let aggregated = match ctx.spec.component(name, &component_name) {
        Ok(component) => aggregate_instances(component, &outputs),
        Err(err) => return TaskOutcome::Failed(ctx.fail(&task_id, err, started)),
    };
    ctx.report_completed(&task_id, &aggregated, started);
    TaskOutcome::Succeeded {
        outputs: aggregated,
        instances: Some(outputs),
    }
}

enum Prepared<'s> {
    Run {
        task: &'s TaskSpec,
        inputs: BTreeMap<String, RuntimeValue>,
    },
    Skip(String),
}

fn prepare_task<'s>(
    ctx: &'s RunContext,
    key: &ComponentKey,
    name: &str,
    store: &ValueStore,
    failed: &FxHashSet<Arc<str>>,
) -> Result<Prepared<'s>> {
    let dag = key.dag(&ctx.spec)?;
    let task = dag.tasks.get(name).ok_or_else(|| KilnError::MissingDependency {
        task: key.name().to_string(),
        dep: name.to_string(),
    })?;
    let component = ctx.spec.component(name, &task.component_ref.name)?;

    let inputs = match bind_task_inputs(name, task, component, store, failed)? {
        Bound::Inputs(inputs) => inputs,
        Bound::Skip(reason) => return Ok(Prepared::Skip(reason)),
    };
    if let Some(condition) = task.condition() {
        if !evaluate_condition(condition, &parameter_values(&inputs))? {
            return Ok(Prepared::Skip(format!("condition '{condition}' is false")));
        }
    }
    Ok(Prepared::Run { task, inputs })
}

/// Run one instance of a component (leaf or nested DAG)
///
/// `Ok(None)`: the run was cancelled before this instance started.
async fn run_instance(
    ctx: RunContext,
    scope: Scope,
    task: Arc<str>,
    index: Option<usize>,
    component_name: Arc<str>,
    inputs: BTreeMap<String, RuntimeValue>,
) -> Result<Option<TaskOutputs>> {
    let task_id = scope.qualify(&task, index);
    let resource = scope.resource(&task, index);
    let dir = scope.dir(&task, index);
    let started = Instant::now();

    match execute_instance(&ctx, &task_id, &resource, &dir, &component_name, inputs).await {
        Ok(Some(outputs)) => {
            ctx.report_completed(&task_id, &outputs, started);
            Ok(Some(outputs))
        }
        Ok(None) => Ok(None),
        Err(err) => Err(ctx.fail(&task_id, err, started)),
    }
}

#[instrument(name = "dispatch", skip_all, fields(task = %task_id, component = component_name))]
async fn execute_instance(
    ctx: &RunContext,
    task_id: &Arc<str>,
    resource: &Arc<str>,
    dir: &Arc<str>,
    component_name: &str,
    inputs: BTreeMap<String, RuntimeValue>,
) -> Result<Option<TaskOutputs>> {
    let component: &ComponentSpec = ctx.spec.component(task_id, component_name)?;
    let inputs = bind_defaults(component, component_name, inputs)?;

    let label = match component.implementation(component_name)? {
        Implementation::Dag(_) => {
            ctx.report_started(task_id, &inputs);
            let child = Scope {
                qualified: Some(Arc::clone(task_id)),
                resource: Some(Arc::clone(resource)),
                dir: Some(Arc::clone(dir)),
            };
            let key = ComponentKey::Named(Arc::from(component_name));
            return run_dag(ctx.clone(), child, key, inputs).await.map(Some);
        }
        Implementation::Executor(label) => label,
    };
    let executor = ctx.spec.executor(component_name, label)?;

    let _permit = tokio::select! {
        biased;
        _ = ctx.cancel.cancelled() => return Ok(None),
        permit = ctx.permits.acquire() => {
            permit.map_err(|e| KilnError::Execution(format!("dispatch semaphore closed: {e}")))?
        }
    };
    if ctx.cancel.is_cancelled() {
        return Ok(None);
    }

    ctx.report_started(task_id, &inputs);
    let leaf = Leaf {
        task_id,
        task_resource: resource,
        task_dir: dir,
        pipeline_resource: &ctx.pipeline_resource,
        job_uuid: &ctx.job_uuid,
        pipeline_root: &ctx.pipeline_root,
        event_log: &ctx.event_log,
    };
    let outputs = match executor {
        ExecutorSpec::Container { container } => {
            run_container(&leaf, component, container, &inputs, ctx.runner.as_ref()).await?
        }
        ExecutorSpec::Importer { importer } => run_importer(&leaf, component, importer, &inputs)?,
    };
    Ok(Some(outputs))
}
