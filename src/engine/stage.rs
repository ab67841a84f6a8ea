//! Stage abstractions for the dependency-tracked pipeline.
//!
//! A **stage** is a unit of per-tick work that:
//! - declares which shared buffers it reads and writes,
//! - is ordered by the scheduler purely from those declarations,
//! - may be executed concurrently with non-conflicting stages,
//! - operates through a controlled [`StageContext`] rather than direct
//!   registry access.
//!
//! ## Lifecycle
//!
//! Stages are registered once (external collaborators act as plugins),
//! invoked once per tick in fixed registration order, and torn down once at
//! shutdown. Stage bodies never suspend internally: all waiting happens
//! before a body starts, at the dependency boundary the scheduler derives
//! from the declared access sets.
//!
//! ## Contract
//!
//! A stage must be side-effect-free with respect to buffers it did not
//! declare. Touching an undeclared buffer is a programmer error, not a
//! recoverable runtime condition: debug builds assert naming the stage and
//! buffer; release builds proceed with undefined ordering.
//!
//! ## Function-backed stages
//!
//! [`FnStage`] defines a stage from a closure without a bespoke type, which
//! keeps test harnesses and small plugins lightweight while remaining fully
//! schedulable.

use glam::Vec3;

use crate::engine::buffer::{BufferRegistry, ReadView, WriteView};
use crate::engine::error::{CoreResult, UndeclaredAccessError};
use crate::engine::frustum::Frustum;
use crate::engine::types::{AccessMode, AccessSets, BufferId, Tick};

/// Per-tick inputs supplied by external collaborators.
///
/// The core treats the observer position and the six frustum planes as
/// opaque: it never derives them itself.
#[derive(Clone, Copy, Debug)]
pub struct TickInputs {
    /// Monotonic tick counter.
    pub tick: Tick,
    /// Absolute simulation time in seconds.
    pub time: f32,
    /// Seconds elapsed since the previous tick.
    pub delta_time: f32,
    /// Observer position this tick.
    pub observer: Vec3,
    /// View volume this tick.
    pub frustum: Frustum,
}

/// A unit of executable per-tick logic operating on shared buffers.
///
/// Stages must be `Send + Sync` so they can be dispatched onto worker
/// threads.
pub trait Stage: Send + Sync {
    /// Returns the human-readable name of this stage, used in diagnostics
    /// and profiling.
    fn name(&self) -> &'static str;

    /// Returns the buffer access sets declared by this stage.
    ///
    /// Consulted by the scheduler every tick; must be stable across the
    /// stage's lifetime.
    fn access(&self) -> AccessSets;

    /// Executes the stage body.
    fn run(&self, ctx: StageContext<'_>, inputs: &TickInputs) -> CoreResult<()>;
}

/// A concrete [`Stage`] backed by a function or closure.
pub struct FnStage<F>
where
    F: Fn(StageContext<'_>, &TickInputs) -> CoreResult<()> + Send + Sync + 'static,
{
    name: &'static str,
    access: AccessSets,
    f: F,
}

impl<F> FnStage<F>
where
    F: Fn(StageContext<'_>, &TickInputs) -> CoreResult<()> + Send + Sync + 'static,
{
    /// Creates a new function-backed stage.
    ///
    /// # Parameters
    /// - `name`: Human-readable name, used in diagnostics and profiling.
    /// - `access`: Declared buffer access used for scheduling.
    /// - `f`: The function executed when the stage runs.
    pub fn new(name: &'static str, access: AccessSets, f: F) -> Self {
        Self { name, access, f }
    }
}

impl<F> Stage for FnStage<F>
where
    F: Fn(StageContext<'_>, &TickInputs) -> CoreResult<()> + Send + Sync + 'static,
{
    fn name(&self) -> &'static str {
        self.name
    }

    fn access(&self) -> AccessSets {
        self.access
    }

    fn run(&self, ctx: StageContext<'_>, inputs: &TickInputs) -> CoreResult<()> {
        (self.f)(ctx, inputs)
    }
}

/// Controlled buffer access handed to a running stage body.
///
/// The context checks every view against the stage's declared access set.
/// A declared writer may also read its buffer (read-modify-write); declaring
/// both modes is rejected at registration instead.
pub struct StageContext<'a> {
    registry: &'a BufferRegistry,
    access: &'a AccessSets,
    stage: &'static str,
}

impl<'a> StageContext<'a> {
    pub(crate) fn new(
        registry: &'a BufferRegistry,
        access: &'a AccessSets,
        stage: &'static str,
    ) -> Self {
        Self { registry, access, stage }
    }

    /// Returns a shared view of buffer `id`.
    ///
    /// The buffer must be declared as read or write by this stage. Debug
    /// builds assert on an undeclared access; release builds proceed with
    /// undefined ordering (documented programmer error, not a checked
    /// failure).
    pub fn read<T: Send + Sync + 'static>(&self, id: BufferId) -> CoreResult<ReadView<'a, T>> {
        debug_assert!(
            self.access.read.has(id) || self.access.write.has(id),
            "{}",
            UndeclaredAccessError {
                stage: self.stage,
                buffer: self.registry.name(id),
                mode: AccessMode::Read,
            }
        );
        // Scheduler-resolved ordering guarantees no conflicting writer runs
        // concurrently with this view.
        let view = unsafe { self.registry.view::<T>(id) }?;
        Ok(view)
    }

    /// Returns an exclusive view of buffer `id`.
    ///
    /// The buffer must be declared as write by this stage, and at most one
    /// exclusive view of it may be live at a time within the body.
    pub fn write<T: Send + Sync + 'static>(&self, id: BufferId) -> CoreResult<WriteView<'a, T>> {
        debug_assert!(
            self.access.write.has(id),
            "{}",
            UndeclaredAccessError {
                stage: self.stage,
                buffer: self.registry.name(id),
                mode: AccessMode::Write,
            }
        );
        // Scheduler-resolved ordering guarantees exclusive ownership of the
        // buffer for the duration of this stage body.
        let view = unsafe { self.registry.view_mut::<T>(id) }?;
        Ok(view)
    }

    /// Returns the element count of buffer `id`.
    pub fn buffer_len(&self, id: BufferId) -> usize {
        self.registry.len(id)
    }
}
