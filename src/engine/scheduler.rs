//! Dependency-resolved stage scheduling and execution.
//!
//! This module is responsible for:
//! * resolving each registered stage's wait-set from its declared buffer
//!   access, in a single pass per tick,
//! * executing stage bodies concurrently where their wait requirements are
//!   disjoint, using Rayon,
//! * enforcing the per-tick completion barrier that returns every buffer to
//!   idle.
//!
//! ## Scheduling model
//!
//! Stages are processed in registration order. For each stage the registry
//! resolves a **wait-set**: the current write handle of every buffer the
//! stage reads or writes, plus the current read handles of every buffer it
//! writes. Because handles always refer to earlier-registered stages, the
//! wait-sets form a DAG whose registration order is a valid topological
//! order.
//!
//! Execution is dependency-counted: every stage carries the number of
//! unsatisfied waits; a stage is spawned onto the worker pool the moment its
//! count reaches zero. Independent dependency chains therefore overlap in
//! time, and no stage ever blocks mid-body — all waiting happens before a
//! body starts.
//!
//! ## Inline fallback
//!
//! [`Execution::Inline`] runs the same graph serially in registration order,
//! which is a strict subset behavior: identical buffer contents, no
//! concurrency. Determinism across worker-pool sizes is a hard guarantee and
//! is what makes the inline mode usable as a reference in tests.
//!
//! ## Barrier discipline
//!
//! The owning driver must invoke [`Pipeline::barrier`] once per tick (and at
//! shutdown) before the next tick's resolution; a handle left outstanding
//! past a barrier is a programmer error that debug builds assert on.

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Mutex;

use crate::engine::buffer::BufferRegistry;
use crate::engine::error::{CoreError, CoreResult, PipelineError};
use crate::engine::stage::{Stage, StageContext, TickInputs};
use crate::engine::types::{AccessSets, StageId};
use crate::profiling;

/// How stage bodies are executed.
#[derive(Clone, Copy, Debug, PartialEq, Eq, serde::Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Execution {
    /// Dispatch ready stages onto a Rayon pool.
    Parallel,
    /// Run stages serially in registration order. Strict subset behavior of
    /// [`Execution::Parallel`]: same results, no concurrency.
    Inline,
}

/// A registered stage with its cached access declaration.
struct RegisteredStage {
    stage: Box<dyn Stage>,
    access: AccessSets,
    name: &'static str,
}

/// Per-tick dependency graph derived from declared intent.
struct TickGraph {
    /// For each stage, the earlier-registered stages it must wait for.
    waits: Vec<Vec<StageId>>,
    /// Inverse edges: stages unblocked when this one completes.
    dependents: Vec<Vec<usize>>,
}

/// Shared buffers, registered stages, and the per-tick execution engine.
///
/// Owns the [`BufferRegistry`] and the stage list for one run. Constructed
/// once; stages and buffers are registered up front, then
/// [`run_tick`](Pipeline::run_tick) drives the cycle
/// `resolve → execute → barrier` every simulation tick.
pub struct Pipeline {
    registry: BufferRegistry,
    stages: Vec<RegisteredStage>,
    execution: Execution,
    pool: Option<rayon::ThreadPool>,
}

impl Pipeline {
    /// Creates a pipeline over `registry` with the given execution mode,
    /// using the ambient Rayon pool for parallel dispatch.
    pub fn new(registry: BufferRegistry, execution: Execution) -> Self {
        Self { registry, stages: Vec::new(), execution, pool: None }
    }

    /// Creates a parallel pipeline with a dedicated worker pool of `workers`
    /// threads.
    pub fn with_workers(registry: BufferRegistry, workers: usize) -> CoreResult<Self> {
        let pool = rayon::ThreadPoolBuilder::new()
            .num_threads(workers)
            .build()
            .map_err(|source| PipelineError::WorkerPool { source })?;
        Ok(Self {
            registry,
            stages: Vec::new(),
            execution: Execution::Parallel,
            pool: Some(pool),
        })
    }

    /// Shared access to the buffer registry.
    pub fn registry(&self) -> &BufferRegistry {
        &self.registry
    }

    /// Exclusive access to the buffer registry, for setup-time registration.
    pub fn registry_mut(&mut self) -> &mut BufferRegistry {
        &mut self.registry
    }

    /// Registers a stage at the end of the configured order.
    ///
    /// Declaring the same buffer as both read and write is rejected;
    /// exclusive write access already covers reads.
    pub fn register(&mut self, stage: Box<dyn Stage>) -> CoreResult<StageId> {
        let access = stage.access();
        if access.read.intersects(&access.write) {
            return Err(PipelineError::ReadWriteOverlap { stage: stage.name() }.into());
        }

        let id = self.stages.len() as StageId;
        let name = stage.name();
        self.stages.push(RegisteredStage { stage, access, name });
        Ok(id)
    }

    /// Returns the number of registered stages.
    pub fn stage_count(&self) -> usize {
        self.stages.len()
    }

    /// Returns `true` if no buffer carries an outstanding handle.
    pub fn is_idle(&self) -> bool {
        self.registry.is_idle()
    }

    /// Resolves this tick's dependency graph and executes every stage body.
    ///
    /// Returns once all bodies have completed. There is no mid-tick
    /// cancellation: if a body fails, the remaining stages still run and the
    /// first error is returned afterwards.
    pub fn dispatch(&mut self, inputs: &TickInputs) -> CoreResult<()> {
        debug_assert!(
            self.registry.is_idle(),
            "dependency handles left unresolved past a barrier; \
             call Pipeline::barrier between ticks"
        );

        let graph = self.resolve();
        #[cfg(debug_assertions)]
        self.validate(&graph);

        let this: &Pipeline = self;
        match this.execution {
            Execution::Inline => this.execute_inline(inputs),
            Execution::Parallel => match &this.pool {
                Some(pool) => pool.install(|| this.execute_parallel(&graph, inputs)),
                None => this.execute_parallel(&graph, inputs),
            },
        }
    }

    /// Completion barrier: resets every buffer to idle.
    ///
    /// [`dispatch`](Pipeline::dispatch) joins all stage bodies before
    /// returning, so by the time the driver reaches the barrier every handle
    /// has resolved; the barrier's job is the reset to the idle state. Must
    /// be invoked once per tick and mandatorily at shutdown, before buffers
    /// are released.
    pub fn barrier(&mut self) {
        self.registry.reset_handles();
    }

    /// Convenience wrapper: one full tick, `dispatch` then `barrier`.
    pub fn run_tick(&mut self, inputs: &TickInputs) -> CoreResult<()> {
        let result = self.dispatch(inputs);
        self.barrier();
        result
    }

    /// Single scheduler pass: declare every stage in registration order and
    /// collect wait-sets plus inverse edges.
    fn resolve(&mut self) -> TickGraph {
        let count = self.stages.len();
        let mut waits = Vec::with_capacity(count);
        let mut dependents = vec![Vec::new(); count];

        for (index, registered) in self.stages.iter().enumerate() {
            let stage_waits = self.registry.declare(index as StageId, &registered.access);
            for &wait in &stage_waits {
                dependents[wait as usize].push(index);
            }
            waits.push(stage_waits);
        }

        TickGraph { waits, dependents }
    }

    /// Debug-build validation: every pair of conflicting stages must be
    /// connected by a dependency path.
    #[cfg(debug_assertions)]
    fn validate(&self, graph: &TickGraph) {
        let count = self.stages.len();
        let mut reachable = vec![vec![false; count]; count];

        for index in 0..count {
            for &wait in &graph.waits[index] {
                let wait = wait as usize;
                reachable[index][wait] = true;
                for earlier in 0..count {
                    if reachable[wait][earlier] {
                        reachable[index][earlier] = true;
                    }
                }
            }
        }

        for later in 0..count {
            for earlier in 0..later {
                let conflict = self.stages[later]
                    .access
                    .conflicts_with(&self.stages[earlier].access);
                debug_assert!(
                    !conflict || reachable[later][earlier],
                    "stages `{}` and `{}` conflict on a buffer but resolved unordered",
                    self.stages[earlier].name,
                    self.stages[later].name
                );
            }
        }
    }

    fn run_stage(&self, index: usize, inputs: &TickInputs) -> CoreResult<()> {
        let registered = &self.stages[index];
        let _span = profiling::span(registered.name);
        let ctx = StageContext::new(&self.registry, &registered.access, registered.name);
        registered.stage.run(ctx, inputs)
    }

    fn execute_inline(&self, inputs: &TickInputs) -> CoreResult<()> {
        let mut first_failure = None;
        for index in 0..self.stages.len() {
            if let Err(error) = self.run_stage(index, inputs) {
                first_failure.get_or_insert(error);
            }
        }
        match first_failure {
            Some(error) => Err(error),
            None => Ok(()),
        }
    }

    fn execute_parallel(&self, graph: &TickGraph, inputs: &TickInputs) -> CoreResult<()> {
        let pending: Vec<AtomicUsize> = graph
            .waits
            .iter()
            .map(|waits| AtomicUsize::new(waits.len()))
            .collect();
        let failure: Mutex<Option<CoreError>> = Mutex::new(None);

        let exec = ExecState {
            pipeline: self,
            inputs,
            dependents: &graph.dependents,
            pending: &pending,
            failure: &failure,
        };

        rayon::scope(|scope| {
            for (index, waits) in graph.waits.iter().enumerate() {
                if waits.is_empty() {
                    spawn_stage(scope, index, &exec);
                }
            }
        });

        match failure.into_inner().unwrap_or(None) {
            Some(error) => Err(error),
            None => Ok(()),
        }
    }
}

impl Drop for Pipeline {
    /// Shutdown drains through the barrier before buffers are released.
    fn drop(&mut self) {
        self.barrier();
    }
}

/// Borrowed execution state shared by all spawned stage tasks.
struct ExecState<'a> {
    pipeline: &'a Pipeline,
    inputs: &'a TickInputs,
    dependents: &'a [Vec<usize>],
    pending: &'a [AtomicUsize],
    failure: &'a Mutex<Option<CoreError>>,
}

/// Runs one ready stage and unblocks its dependents, spawning any whose wait
/// count reaches zero.
fn spawn_stage<'scope>(
    scope: &rayon::Scope<'scope>,
    index: usize,
    exec: &'scope ExecState<'scope>,
) {
    scope.spawn(move |scope| {
        if let Err(error) = exec.pipeline.run_stage(index, exec.inputs) {
            if let Ok(mut slot) = exec.failure.lock() {
                slot.get_or_insert(error);
            }
        }

        for &dependent in &exec.dependents[index] {
            if exec.pending[dependent].fetch_sub(1, Ordering::AcqRel) == 1 {
                spawn_stage(scope, dependent, exec);
            }
        }
    });
}
