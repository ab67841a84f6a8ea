//! # crowd_pool
//!
//! Priority-pooled proxy selection for massive crowds.
//!
//! Each simulation tick, the crate selects which members of a very large
//! virtual population (up to 10^5) are represented by a small pool of
//! expensive concrete resources (~10^3 "real slots"), favoring entities that
//! are visible and close to an observer while minimizing reassignment churn.
//!
//! ## Design Goals
//! - Top-K selection without a full sort (boundary-pruning quickselect)
//! - Minimal-churn slot reconciliation (reassignments == membership changes)
//! - Data-parallel per-entity passes with explicit dependency tracking
//! - Deterministic results regardless of worker-pool size
//!
//! The two core subsystems are the **priority pool allocator**
//! ([`engine::allocator`]) and the **dependency-tracked stage pipeline**
//! ([`engine::scheduler`] over [`engine::buffer`]); the [`engine::driver`]
//! wires them together behind a closed, configuration-selected set of stage
//! kinds.

#![forbid(unsafe_op_in_unsafe_fn)]
#![warn(missing_docs)]
#![deny(dead_code)]

pub mod engine;
pub mod config;
pub mod profiling;

// ─────────────────────────────────────────────────────────────────────────────
// Re-exports (Public API)
// ─────────────────────────────────────────────────────────────────────────────

// Driver and configuration

pub use config::RunConfig;

pub use engine::driver::{
    PoolDriver,
    StageKind,
    StandardBuffers,
};

// Allocation

pub use engine::allocator::{
    Bounds,
    SlotFlags,
    VirtualEntity,
};

pub use engine::frustum::{
    Frustum,
    Plane,
    PriorityKey,
};

pub use engine::select::partition_top_k;

// Pipeline

pub use engine::buffer::{
    BufferRegistry,
    ReadView,
    WriteView,
};

pub use engine::stage::{
    FnStage,
    Stage,
    StageContext,
    TickInputs,
};

pub use engine::scheduler::{
    Execution,
    Pipeline,
};

pub use engine::present::{
    PresentationSink,
    SlotFrame,
};

pub use engine::animate::FlavorParams;

pub use engine::error::{
    ConfigError,
    CoreError,
    CoreResult,
    PipelineError,
};

pub use engine::types::{
    AccessMode,
    AccessSets,
    BufferId,
    EntityId,
    SlotId,
    StageId,
    Tick,
};

// ─────────────────────────────────────────────────────────────────────────────
// Prelude (Optional but recommended)
// ─────────────────────────────────────────────────────────────────────────────

/// Commonly used types.
///
/// Import with:
/// ```rust
/// use crowd_pool::prelude::*;
/// ```
pub mod prelude {
    pub use crate::{
        AccessSets,
        CoreResult,
        Execution,
        FnStage,
        Frustum,
        Pipeline,
        Plane,
        PoolDriver,
        PresentationSink,
        RunConfig,
        SlotFrame,
        Stage,
        StageContext,
        StageKind,
        TickInputs,
    };
}
