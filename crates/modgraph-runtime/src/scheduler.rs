//! Dependency-ordered, bounded-parallel evaluation of instances.
//!
//! A single coordinating loop owns the state table and is the only writer of
//! state transitions. Workers evaluate one instance each on the tokio
//! runtime and record that instance's outputs exactly once. An instance is
//! dispatched when its count of unfinished dependencies reaches zero.

use std::collections::{BTreeMap, HashMap, VecDeque};
use std::sync::{Arc, OnceLock};
use std::time::{Duration, Instant};

use modgraph_common::config::EngineConfig;
use modgraph_common::error::{EvalError, InstanceFailure, Result};
use modgraph_common::types::{InstanceId, InstanceState, Outputs, Value};
use modgraph_compose::eval::{self, Scope};
use modgraph_compose::graph::DependencyGraph;
use modgraph_compose::registry::{InstanceRegistry, Shape};
use tokio::task::JoinSet;

use crate::executor::{EachContext, ExecutionRequest, ModuleExecutor};
use crate::report::RunReport;

/// Write-once output slots, one per instance.
#[derive(Debug)]
struct OutputTable {
    slots: Vec<OnceLock<Arc<Outputs>>>,
}

impl OutputTable {
    fn new(len: usize) -> Self {
        Self {
            slots: (0..len).map(|_| OnceLock::new()).collect(),
        }
    }

    fn get(&self, idx: usize) -> Option<Arc<Outputs>> {
        self.slots.get(idx).and_then(OnceLock::get).cloned()
    }

    fn record(&self, idx: usize, outputs: Outputs) -> std::result::Result<(), EvalError> {
        let slot = self.slots.get(idx).ok_or_else(|| EvalError::Internal {
            message: format!("no output slot for instance #{idx}"),
        })?;
        slot.set(Arc::new(outputs)).map_err(|_| EvalError::Internal {
            message: format!("outputs for instance #{idx} recorded twice"),
        })
    }
}

/// Evaluation scope backed by the registry and the run's output table.
struct RunScope<'a> {
    registry: &'a InstanceRegistry,
    table: &'a OutputTable,
}

impl Scope for RunScope<'_> {
    fn shape(&self, module: &str) -> Option<Shape> {
        self.registry.shape(module)
    }

    fn outputs(&self, id: &InstanceId) -> Option<Arc<Outputs>> {
        self.registry
            .index_of(id)
            .and_then(|idx| self.table.get(idx))
    }

    fn variable(&self, name: &str) -> Option<&Value> {
        self.registry.variables().get(name)
    }
}

/// Dispatches instance evaluations in dependency order.
#[derive(Debug, Clone)]
pub struct Scheduler {
    parallelism: usize,
    instance_timeout: Option<Duration>,
}

impl Scheduler {
    /// Creates a scheduler from a validated configuration.
    ///
    /// # Errors
    ///
    /// Returns an error if the configuration is invalid.
    pub fn new(config: &EngineConfig) -> Result<Self> {
        config.validate()?;
        Ok(Self {
            parallelism: config.parallelism,
            instance_timeout: config.instance_timeout(),
        })
    }

    /// Evaluates every instance of the graph.
    ///
    /// Failures are localized: a failed instance marks everything that
    /// depends on it as failed without executing it, while unrelated
    /// instances run to completion. The returned report describes the
    /// terminal state of every instance.
    ///
    /// # Errors
    ///
    /// Returns an error only if the graph contains a cycle.
    pub async fn run(
        &self,
        graph: &DependencyGraph,
        executor: Arc<dyn ModuleExecutor>,
    ) -> Result<RunReport> {
        let order = graph.resolve_order()?;
        let registry = Arc::clone(graph.registry());
        let table = Arc::new(OutputTable::new(registry.len()));
        let started = Instant::now();
        let mut report = RunReport::start();

        let mut states = vec![InstanceState::Pending; registry.len()];
        let mut waiting: Vec<usize> = (0..registry.len())
            .map(|idx| graph.dependencies(idx).len())
            .collect();
        let mut ready: VecDeque<usize> = VecDeque::new();
        for &idx in &order {
            if waiting[idx] == 0 {
                states[idx] = InstanceState::Ready;
                ready.push_back(idx);
            }
        }

        tracing::info!(
            instances = registry.len(),
            parallelism = self.parallelism,
            "evaluation started"
        );

        let mut workers: JoinSet<(usize, std::result::Result<(), EvalError>)> = JoinSet::new();
        let mut tasks: HashMap<tokio::task::Id, usize> = HashMap::new();
        let mut failures: Vec<InstanceFailure> = Vec::new();

        loop {
            while workers.len() < self.parallelism {
                let Some(idx) = ready.pop_front() else {
                    break;
                };
                states[idx] = InstanceState::Running;
                let handle = workers.spawn(run_instance(
                    idx,
                    Arc::clone(&registry),
                    Arc::clone(&table),
                    Arc::clone(&executor),
                    self.instance_timeout,
                ));
                let _ = tasks.insert(handle.id(), idx);
            }

            let Some(joined) = workers.join_next_with_id().await else {
                break;
            };
            let (idx, result) = match joined {
                Ok((task, outcome)) => {
                    let _ = tasks.remove(&task);
                    outcome
                }
                Err(join_err) => {
                    let Some(idx) = tasks.remove(&join_err.id()) else {
                        continue;
                    };
                    let error = if join_err.is_panic() {
                        EvalError::Executor {
                            message: "module executor panicked".to_owned(),
                        }
                    } else {
                        EvalError::Internal {
                            message: format!("worker cancelled: {join_err}"),
                        }
                    };
                    (idx, Err(error))
                }
            };
            let id = instance_id(&registry, idx);

            match result {
                Ok(()) => {
                    states[idx] = InstanceState::Done;
                    tracing::debug!(instance = %id, "instance done");
                    for dependent in graph.dependents(idx) {
                        waiting[dependent] = waiting[dependent].saturating_sub(1);
                        if waiting[dependent] == 0 && states[dependent] == InstanceState::Pending {
                            states[dependent] = InstanceState::Ready;
                            ready.push_back(dependent);
                        }
                    }
                }
                Err(error) => {
                    tracing::warn!(instance = %id, %error, "instance failed");
                    states[idx] = InstanceState::Failed;
                    failures.push(InstanceFailure {
                        instance: id.clone(),
                        error,
                    });
                    cascade_failure(graph, &registry, idx, &id, &mut states, &mut failures);
                }
            }
        }

        for (idx, state) in states.iter().enumerate() {
            let id = instance_id(&registry, idx);
            if *state == InstanceState::Done {
                if let Some(outputs) = table.get(idx) {
                    let _ = report.outputs.insert(id.clone(), (*outputs).clone());
                }
            }
            let _ = report.states.insert(id, *state);
        }
        failures.sort_by(|a, b| a.instance.cmp(&b.instance));
        report.failures = failures;
        report.elapsed_ms = u64::try_from(started.elapsed().as_millis()).unwrap_or(u64::MAX);

        tracing::info!(
            done = report.outputs.len(),
            failed = report.failures.len(),
            elapsed_ms = report.elapsed_ms,
            "evaluation finished"
        );
        Ok(report)
    }
}

fn instance_id(registry: &InstanceRegistry, idx: usize) -> InstanceId {
    registry
        .get(idx)
        .map_or_else(|| InstanceId::singleton(format!("#{idx}")), |i| i.id.clone())
}

/// Marks every transitive dependent of `origin` as failed.
fn cascade_failure(
    graph: &DependencyGraph,
    registry: &InstanceRegistry,
    origin: usize,
    origin_id: &InstanceId,
    states: &mut [InstanceState],
    failures: &mut Vec<InstanceFailure>,
) {
    let mut stack = graph.dependents(origin);
    while let Some(idx) = stack.pop() {
        if states[idx] != InstanceState::Pending {
            continue;
        }
        states[idx] = InstanceState::Failed;
        let id = instance_id(registry, idx);
        tracing::debug!(instance = %id, upstream = %origin_id, "skipping dependent of failed instance");
        failures.push(InstanceFailure {
            instance: id,
            error: EvalError::Upstream {
                failed: origin_id.clone(),
            },
        });
        stack.extend(graph.dependents(idx));
    }
}

/// Evaluates one instance's arguments, runs it, and records its outputs.
async fn run_instance(
    idx: usize,
    registry: Arc<InstanceRegistry>,
    table: Arc<OutputTable>,
    executor: Arc<dyn ModuleExecutor>,
    timeout: Option<Duration>,
) -> (usize, std::result::Result<(), EvalError>) {
    let result = async {
        let request = build_request(idx, &registry, &table)?;
        tracing::debug!(instance = %request.instance, "executing instance");
        let execution = executor.execute(&request);
        let outputs = match timeout {
            Some(limit) => tokio::time::timeout(limit, execution)
                .await
                .map_err(|_| EvalError::Timeout(limit))?,
            None => execution.await,
        }
        .map_err(|e| EvalError::Executor {
            message: e.to_string(),
        })?;
        table.record(idx, outputs)
    }
    .await;
    (idx, result)
}

fn build_request(
    idx: usize,
    registry: &InstanceRegistry,
    table: &OutputTable,
) -> std::result::Result<ExecutionRequest, EvalError> {
    let instance = registry.get(idx).ok_or_else(|| EvalError::Internal {
        message: format!("no instance #{idx}"),
    })?;
    let scope = RunScope { registry, table };
    let arguments = instance
        .arguments
        .iter()
        .map(|(name, expr)| Ok((name.clone(), eval::evaluate(expr, &scope)?)))
        .collect::<std::result::Result<BTreeMap<String, Value>, EvalError>>()?;
    let each = instance.id.key.as_ref().map(|key| EachContext {
        key: key.to_value(),
        value: instance.each_value.clone(),
    });
    Ok(ExecutionRequest {
        instance: instance.id.clone(),
        source: instance.source.clone(),
        arguments,
        each,
    })
}

/// Evaluates the graph with the default configuration.
///
/// Returns the outputs of every instance, or every failure if any
/// instance did not reach the done state.
///
/// # Errors
///
/// Returns [`modgraph_common::error::ModgraphError::Evaluation`] listing
/// each failed instance, or a cycle error for a cyclic graph.
pub async fn evaluate(
    graph: &DependencyGraph,
    executor: Arc<dyn ModuleExecutor>,
) -> Result<BTreeMap<InstanceId, Outputs>> {
    Scheduler::new(&EngineConfig::default())?
        .run(graph, executor)
        .await?
        .into_outputs()
}
