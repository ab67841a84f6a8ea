//! Pool driver: buffer wiring, standard stages, and the tick loop.
//!
//! [`PoolDriver`] is the owning orchestrator of one run. It:
//!
//! * validates the run configuration (fatal on a degenerate population or
//!   pool),
//! * spawns the virtual population and seeds per-slot flavor parameters
//!   deterministically,
//! * registers the standard buffer set and wires the configured
//!   [`StageKind`]s into a [`Pipeline`],
//! * drives the per-tick cycle — dispatch, completion barrier, frame
//!   exposure — and guarantees the barrier runs before shutdown releases the
//!   buffers.
//!
//! ## Standard stage kinds
//!
//! The built-in stages form a closed set selected by configuration rather
//! than subclassing. Their declared access produces two independent
//! dependency chains that overlap in time:
//!
//! ```text
//! visibility ──► allocation ──┐
//! position_offset ────────────┼──► compose ──► present
//! rotation_offset ────────────┘
//! ```
//!
//! External collaborators may register additional plugin stages with
//! [`PoolDriver::register_stage`] before the first tick; they participate in
//! the same dependency resolution through their declared access sets.

use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::Arc;

use glam::{Quat, Vec3};
use rayon::prelude::*;
use serde::Deserialize;

use crate::config::RunConfig;
use crate::engine::allocator::{self, SlotFlags, VirtualEntity};
use crate::engine::animate::{position_offset, rotation_step, FlavorParams};
use crate::engine::buffer::BufferRegistry;
use crate::engine::error::CoreResult;
use crate::engine::frustum::Frustum;
use crate::engine::present::{PresentationSink, SlotFrame};
use crate::engine::random::SeededRng;
use crate::engine::scheduler::{Execution, Pipeline};
use crate::engine::stage::{Stage, StageContext, TickInputs};
use crate::engine::types::{AccessSets, BufferId, StageId, Tick, PAR_CHUNK};

/// The closed set of built-in stage kinds.
///
/// Selected by [`RunConfig::stages`]; order in the configuration is pipeline
/// registration order.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum StageKind {
    /// Recompute every entity's priority key.
    Visibility,
    /// Partition the population and reconcile slot assignment.
    Allocation,
    /// Per-slot oscillation offset.
    PositionOffset,
    /// Per-slot accumulated yaw offset.
    RotationOffset,
    /// Compose `final = base ∘ offset` for positions and rotations.
    Compose,
    /// Snapshot finalized per-slot frames for the presentation adapter.
    Present,
}

impl StageKind {
    /// The full standard pipeline, in order.
    pub fn standard() -> [StageKind; 6] {
        [
            StageKind::Visibility,
            StageKind::Allocation,
            StageKind::PositionOffset,
            StageKind::RotationOffset,
            StageKind::Compose,
            StageKind::Present,
        ]
    }
}

/// Buffer ids of the standard buffer set, available to plugin stages.
#[derive(Clone, Copy, Debug)]
pub struct StandardBuffers {
    /// Per-entity: the virtual population array ([`VirtualEntity`]).
    pub entities: BufferId,
    /// Per-slot: refreshed base position of the assigned entity (`Vec3`).
    pub base_positions: BufferId,
    /// Per-slot: base rotation (`Quat`), identity unless a collaborator
    /// writes it.
    pub base_rotations: BufferId,
    /// Per-slot: oscillation offset (`Vec3`).
    pub offset_positions: BufferId,
    /// Per-slot: accumulated yaw offset (`Quat`).
    pub offset_rotations: BufferId,
    /// Per-slot: composed position (`Vec3`).
    pub final_positions: BufferId,
    /// Per-slot: composed rotation (`Quat`).
    pub final_rotations: BufferId,
    /// Per-slot: flavor parameters ([`FlavorParams`]).
    pub params: BufferId,
    /// Per-slot: visibility and changed markers ([`SlotFlags`]).
    pub flags: BufferId,
    /// Per-slot: finalized output ([`SlotFrame`]).
    pub frames: BufferId,
}

/// Owning orchestrator of one run.
pub struct PoolDriver {
    pipeline: Pipeline,
    buffers: StandardBuffers,
    population: usize,
    slots: usize,
    ticks: Tick,
    churn: Arc<AtomicU32>,
}

impl PoolDriver {
    /// Builds a driver from a validated configuration.
    ///
    /// Fatal configuration errors (zero population, empty pool, degenerate
    /// bounds) abort construction; nothing is allocated on the failure path.
    pub fn new(config: &RunConfig) -> CoreResult<Self> {
        config.validate()?;

        let population = config.population;
        let slots = config.slots;
        let tau = std::f32::consts::TAU;

        let mut rng = SeededRng::new(config.seed);
        let entities = allocator::spawn(population, slots, config.bounds(), &mut rng);

        let mut params = Vec::with_capacity(slots);
        let mut offset_rotations = Vec::with_capacity(slots);
        for _ in 0..slots {
            params.push(FlavorParams {
                time_offset: rng.range_f32(0.0, tau),
                oscillation_speed: config.oscillation_speed * tau,
                oscillation_height: config.oscillation_height,
                rotation_speed: config.rotation_speed * tau,
            });
            offset_rotations.push(Quat::from_rotation_y(rng.range_f32(0.0, tau)));
        }

        // Slots assigned at spawn start with their owner's position; slots
        // beyond the population (K > N) stay at the origin and are never
        // assigned.
        let assigned = slots.min(population);
        let mut base_positions = vec![Vec3::ZERO; slots];
        let flags = vec![SlotFlags::default(); slots];
        for index in 0..assigned {
            base_positions[index] = entities[index].position;
        }

        let mut registry = BufferRegistry::new();
        let buffers = StandardBuffers {
            entities: registry.register("entities", entities)?,
            base_positions: registry.register("slot_base_positions", base_positions)?,
            base_rotations: registry.register("slot_base_rotations", vec![Quat::IDENTITY; slots])?,
            offset_positions: registry.register("slot_offset_positions", vec![Vec3::ZERO; slots])?,
            offset_rotations: registry.register("slot_offset_rotations", offset_rotations)?,
            final_positions: registry.register("slot_final_positions", vec![Vec3::ZERO; slots])?,
            final_rotations: registry.register("slot_final_rotations", vec![Quat::IDENTITY; slots])?,
            params: registry.register("slot_params", params)?,
            flags: registry.register("slot_flags", flags)?,
            frames: registry.register("slot_frames", vec![SlotFrame::default(); slots])?,
        };

        let mut pipeline = match (config.execution, config.workers) {
            (Execution::Parallel, Some(workers)) => Pipeline::with_workers(registry, workers)?,
            (execution, _) => Pipeline::new(registry, execution),
        };

        let churn = Arc::new(AtomicU32::new(0));
        for &kind in &config.stages {
            pipeline.register(make_stage(kind, &buffers, config, &churn))?;
        }

        Ok(Self {
            pipeline,
            buffers,
            population,
            slots,
            ticks: 0,
            churn,
        })
    }

    /// Registers an external plugin stage after the configured kinds.
    ///
    /// Must happen before the first tick; the stage participates in
    /// dependency resolution through its declared access set.
    pub fn register_stage(&mut self, stage: Box<dyn Stage>) -> CoreResult<StageId> {
        self.pipeline.register(stage)
    }

    /// Runs one simulation tick: dispatch, then the completion barrier.
    ///
    /// `observer` and `frustum` are this tick's opaque inputs from the
    /// observer collaborator.
    pub fn tick(
        &mut self,
        time: f32,
        delta_time: f32,
        observer: Vec3,
        frustum: Frustum,
    ) -> CoreResult<()> {
        let inputs = TickInputs {
            tick: self.ticks,
            time,
            delta_time,
            observer,
            frustum,
        };
        let result = self.pipeline.run_tick(&inputs);
        self.ticks += 1;
        result
    }

    /// Finalized per-slot frames of the last tick.
    ///
    /// Valid after [`tick`](PoolDriver::tick) returns (the barrier has run).
    /// Adapters should read only slots where `changed_this_tick` is set when
    /// reacting to reassignment.
    pub fn frames(&self) -> &[SlotFrame] {
        self.pipeline
            .registry()
            .read_idle::<SlotFrame>(self.buffers.frames)
            .expect("slot frame buffer lost its registered type")
    }

    /// Pushes the last tick's frames into a presentation sink.
    pub fn present(&self, sink: &mut dyn PresentationSink) {
        sink.apply(self.frames());
    }

    /// Snapshot of the virtual population, for inspection between ticks.
    pub fn entities(&self) -> &[VirtualEntity] {
        self.pipeline
            .registry()
            .read_idle::<VirtualEntity>(self.buffers.entities)
            .expect("entity buffer lost its registered type")
    }

    /// Number of slot reassignments performed by the last allocation pass.
    pub fn reassigned_last_tick(&self) -> u32 {
        self.churn.load(Ordering::Relaxed)
    }

    /// Ids of the standard buffers, for plugin stage declarations.
    pub fn buffers(&self) -> &StandardBuffers {
        &self.buffers
    }

    /// Shared access to the buffer registry, for idle-time inspection.
    pub fn registry(&self) -> &BufferRegistry {
        self.pipeline.registry()
    }

    /// Virtual population size N.
    pub fn population(&self) -> usize {
        self.population
    }

    /// Real slot count K.
    pub fn slot_count(&self) -> usize {
        self.slots
    }

    /// Ticks completed so far.
    pub fn ticks(&self) -> Tick {
        self.ticks
    }
}

/// Builds one standard stage from its kind.
fn make_stage(
    kind: StageKind,
    buffers: &StandardBuffers,
    config: &RunConfig,
    churn: &Arc<AtomicU32>,
) -> Box<dyn Stage> {
    match kind {
        StageKind::Visibility => Box::new(VisibilityStage {
            entities: buffers.entities,
            bounding_radius: config.bounding_radius,
        }),
        StageKind::Allocation => Box::new(AllocationStage {
            entities: buffers.entities,
            base_positions: buffers.base_positions,
            flags: buffers.flags,
            churn: Arc::clone(churn),
        }),
        StageKind::PositionOffset => Box::new(PositionOffsetStage {
            params: buffers.params,
            offset_positions: buffers.offset_positions,
        }),
        StageKind::RotationOffset => Box::new(RotationOffsetStage {
            params: buffers.params,
            offset_rotations: buffers.offset_rotations,
        }),
        StageKind::Compose => Box::new(ComposeStage {
            base_positions: buffers.base_positions,
            base_rotations: buffers.base_rotations,
            offset_positions: buffers.offset_positions,
            offset_rotations: buffers.offset_rotations,
            final_positions: buffers.final_positions,
            final_rotations: buffers.final_rotations,
        }),
        StageKind::Present => Box::new(PresentStage {
            final_positions: buffers.final_positions,
            final_rotations: buffers.final_rotations,
            flags: buffers.flags,
            frames: buffers.frames,
        }),
    }
}

/// Recomputes every entity's priority key via the evaluator.
struct VisibilityStage {
    entities: BufferId,
    bounding_radius: f32,
}

impl Stage for VisibilityStage {
    fn name(&self) -> &'static str {
        "visibility"
    }

    fn access(&self) -> AccessSets {
        AccessSets::new(&[], &[self.entities])
    }

    fn run(&self, ctx: StageContext<'_>, inputs: &TickInputs) -> CoreResult<()> {
        let mut entities = ctx.write::<VirtualEntity>(self.entities)?;
        allocator::score(
            &mut entities,
            inputs.observer,
            &inputs.frustum,
            self.bounding_radius,
        );
        Ok(())
    }
}

/// Partitions the population and reconciles slots with minimal churn.
struct AllocationStage {
    entities: BufferId,
    base_positions: BufferId,
    flags: BufferId,
    churn: Arc<AtomicU32>,
}

impl Stage for AllocationStage {
    fn name(&self) -> &'static str {
        "allocation"
    }

    fn access(&self) -> AccessSets {
        AccessSets::new(&[], &[self.entities, self.base_positions, self.flags])
    }

    fn run(&self, ctx: StageContext<'_>, _inputs: &TickInputs) -> CoreResult<()> {
        let mut entities = ctx.write::<VirtualEntity>(self.entities)?;
        let mut base_positions = ctx.write::<Vec3>(self.base_positions)?;
        let mut flags = ctx.write::<SlotFlags>(self.flags)?;
        let reassigned = allocator::allocate(&mut entities, &mut base_positions, &mut flags);
        self.churn.store(reassigned, Ordering::Relaxed);
        Ok(())
    }
}

/// Per-slot vertical oscillation.
struct PositionOffsetStage {
    params: BufferId,
    offset_positions: BufferId,
}

impl Stage for PositionOffsetStage {
    fn name(&self) -> &'static str {
        "position_offset"
    }

    fn access(&self) -> AccessSets {
        AccessSets::new(&[self.params], &[self.offset_positions])
    }

    fn run(&self, ctx: StageContext<'_>, inputs: &TickInputs) -> CoreResult<()> {
        let params = ctx.read::<FlavorParams>(self.params)?;
        let mut offsets = ctx.write::<Vec3>(self.offset_positions)?;
        offsets
            .par_chunks_mut(PAR_CHUNK)
            .zip(params.par_chunks(PAR_CHUNK))
            .for_each(|(offset_chunk, param_chunk)| {
                for (offset, param) in offset_chunk.iter_mut().zip(param_chunk) {
                    *offset = position_offset(param, inputs.time);
                }
            });
        Ok(())
    }
}

/// Per-slot accumulated yaw.
struct RotationOffsetStage {
    params: BufferId,
    offset_rotations: BufferId,
}

impl Stage for RotationOffsetStage {
    fn name(&self) -> &'static str {
        "rotation_offset"
    }

    fn access(&self) -> AccessSets {
        AccessSets::new(&[self.params], &[self.offset_rotations])
    }

    fn run(&self, ctx: StageContext<'_>, inputs: &TickInputs) -> CoreResult<()> {
        let params = ctx.read::<FlavorParams>(self.params)?;
        let mut rotations = ctx.write::<Quat>(self.offset_rotations)?;
        rotations
            .par_chunks_mut(PAR_CHUNK)
            .zip(params.par_chunks(PAR_CHUNK))
            .for_each(|(rotation_chunk, param_chunk)| {
                for (rotation, param) in rotation_chunk.iter_mut().zip(param_chunk) {
                    *rotation = *rotation * rotation_step(param, inputs.delta_time);
                }
            });
        Ok(())
    }
}

/// Composes `final = base ∘ offset` for positions and rotations.
struct ComposeStage {
    base_positions: BufferId,
    base_rotations: BufferId,
    offset_positions: BufferId,
    offset_rotations: BufferId,
    final_positions: BufferId,
    final_rotations: BufferId,
}

impl Stage for ComposeStage {
    fn name(&self) -> &'static str {
        "compose"
    }

    fn access(&self) -> AccessSets {
        AccessSets::new(
            &[
                self.base_positions,
                self.base_rotations,
                self.offset_positions,
                self.offset_rotations,
            ],
            &[self.final_positions, self.final_rotations],
        )
    }

    fn run(&self, ctx: StageContext<'_>, _inputs: &TickInputs) -> CoreResult<()> {
        let base_positions = ctx.read::<Vec3>(self.base_positions)?;
        let offset_positions = ctx.read::<Vec3>(self.offset_positions)?;
        let mut final_positions = ctx.write::<Vec3>(self.final_positions)?;
        final_positions
            .par_chunks_mut(PAR_CHUNK)
            .zip(base_positions.par_chunks(PAR_CHUNK))
            .zip(offset_positions.par_chunks(PAR_CHUNK))
            .for_each(|((final_chunk, base_chunk), offset_chunk)| {
                for ((out, base), offset) in
                    final_chunk.iter_mut().zip(base_chunk).zip(offset_chunk)
                {
                    *out = *base + *offset;
                }
            });

        let base_rotations = ctx.read::<Quat>(self.base_rotations)?;
        let offset_rotations = ctx.read::<Quat>(self.offset_rotations)?;
        let mut final_rotations = ctx.write::<Quat>(self.final_rotations)?;
        final_rotations
            .par_chunks_mut(PAR_CHUNK)
            .zip(base_rotations.par_chunks(PAR_CHUNK))
            .zip(offset_rotations.par_chunks(PAR_CHUNK))
            .for_each(|((final_chunk, base_chunk), offset_chunk)| {
                for ((out, base), offset) in
                    final_chunk.iter_mut().zip(base_chunk).zip(offset_chunk)
                {
                    *out = *offset * *base;
                }
            });
        Ok(())
    }
}

/// Snapshots finalized per-slot frames for the presentation adapter.
struct PresentStage {
    final_positions: BufferId,
    final_rotations: BufferId,
    flags: BufferId,
    frames: BufferId,
}

impl Stage for PresentStage {
    fn name(&self) -> &'static str {
        "present"
    }

    fn access(&self) -> AccessSets {
        AccessSets::new(
            &[self.final_positions, self.final_rotations, self.flags],
            &[self.frames],
        )
    }

    fn run(&self, ctx: StageContext<'_>, _inputs: &TickInputs) -> CoreResult<()> {
        let final_positions = ctx.read::<Vec3>(self.final_positions)?;
        let final_rotations = ctx.read::<Quat>(self.final_rotations)?;
        let flags = ctx.read::<SlotFlags>(self.flags)?;
        let mut frames = ctx.write::<SlotFrame>(self.frames)?;
        frames
            .par_chunks_mut(PAR_CHUNK)
            .enumerate()
            .for_each(|(chunk_index, frame_chunk)| {
                let start = chunk_index * PAR_CHUNK;
                for (offset, frame) in frame_chunk.iter_mut().enumerate() {
                    let index = start + offset;
                    *frame = SlotFrame {
                        position: final_positions[index],
                        rotation: final_rotations[index],
                        visible: flags[index].visible,
                        changed_this_tick: flags[index].changed,
                    };
                }
            });
        Ok(())
    }
}
