//! Priority pool allocation over the virtual population.
//!
//! This module owns the algorithms that keep exactly the top-K virtual
//! entities (by visibility, then distance) bound to the K real slots:
//!
//! 1. **Scoring** — recompute every entity's [`PriorityKey`] via the
//!    evaluator, in parallel over contiguous index chunks.
//! 2. **Partial ordering** — reorder the entity array in place so the K
//!    best-priority entities occupy `[0, K)`, using the boundary-pruning
//!    selection from [`select`](crate::engine::select) rather than a full
//!    sort.
//! 3. **Minimal-churn reconciliation** — pair each entity that entered the
//!    top-K with one that left it, transplanting the leaver's slot id
//!    directly onto the enterer. The number of reassignments in a tick is
//!    therefore exactly the number of entities whose top-K membership
//!    changed — never more. Entities that stayed keep their slot untouched.
//! 4. **Refresh** — every assigned slot gets its owner's current position
//!    and visibility each tick; the `changed` marker is set only on
//!    reassignment so consumers can skip unchanged slots.
//!
//! ## Edge policy
//!
//! * `K >= N`: every entity holds a slot from initialization onward; the
//!   partition and reconciliation degenerate to no-ops and no reassignment
//!   ever occurs.
//! * Zero visible entities: ordering proceeds by distance within the
//!   non-visible group, so the K closest entities still hold slots. Slots
//!   are never left idle while entities exist.

use glam::Vec3;
use rayon::prelude::*;

use crate::engine::frustum::{evaluate, Frustum, PriorityKey};
use crate::engine::random::SeededRng;
use crate::engine::select::partition_top_k;
use crate::engine::types::{SlotId, PAR_CHUNK};

/// Axis-aligned spawn volume for the virtual population.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct Bounds {
    /// Lower corner.
    pub min: Vec3,
    /// Upper corner.
    pub max: Vec3,
}

/// One member of the virtual population.
///
/// Population size is fixed at initialization; entities are never created or
/// destroyed mid-run. Only `key` and `slot` change from tick to tick
/// (`position` changes if the owning simulation moves entities).
#[derive(Clone, Copy, Debug)]
pub struct VirtualEntity {
    /// World position.
    pub position: Vec3,
    /// Priority key recomputed every tick.
    pub key: PriorityKey,
    /// Real slot currently representing this entity, if any.
    ///
    /// A slot id is not stable across top-K exit and re-entry: an entity that
    /// leaves the top-K and later returns may receive a different slot.
    pub slot: Option<SlotId>,
}

/// Per-slot bookkeeping refreshed by the allocation pass.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct SlotFlags {
    /// Visibility of the entity currently assigned to this slot.
    pub visible: bool,
    /// Set when the slot was reassigned to a different entity this tick.
    ///
    /// Consumers may skip slots where this is `false`; reading all slots is
    /// correctness-preserving, just slower.
    pub changed: bool,
}

/// Spawns the virtual population uniformly inside `bounds`.
///
/// The first `min(slots, population)` entities start assigned to slots in
/// index order; the rest start unassigned. Sampling is driven entirely by
/// `rng`, so a fixed seed reproduces the same population.
pub fn spawn(population: usize, slots: usize, bounds: Bounds, rng: &mut SeededRng) -> Vec<VirtualEntity> {
    let mut entities = Vec::with_capacity(population);
    for index in 0..population {
        let position = Vec3::new(
            rng.range_f32(bounds.min.x, bounds.max.x),
            rng.range_f32(bounds.min.y, bounds.max.y),
            rng.range_f32(bounds.min.z, bounds.max.z),
        );
        entities.push(VirtualEntity {
            position,
            key: PriorityKey::default(),
            slot: (index < slots).then(|| index as SlotId),
        });
    }
    entities
}

/// Recomputes every entity's priority key.
///
/// Order-independent and free of cross-entity data flow, so the population
/// is split into contiguous chunks evaluated concurrently.
pub fn score(entities: &mut [VirtualEntity], observer: Vec3, frustum: &Frustum, bounding_radius: f32) {
    entities.par_chunks_mut(PAR_CHUNK).for_each(|chunk| {
        for entity in chunk {
            entity.key = evaluate(entity.position, observer, frustum, bounding_radius);
        }
    });
}

/// Partitions the population and reconciles slot assignment with minimal
/// churn, then refreshes every assigned slot's flags and base position.
///
/// Returns the number of slot reassignments performed this tick.
///
/// ## Invariants restored on return
/// * The entities in `[0, min(K, N))` are exactly the K best-priority
///   entities and each holds a distinct slot.
/// * No entity outside the prefix holds a slot.
/// * `flags[s].changed` is `true` for exactly the slots that moved to a
///   different entity this tick.
pub fn allocate(
    entities: &mut [VirtualEntity],
    base_positions: &mut [Vec3],
    flags: &mut [SlotFlags],
) -> u32 {
    debug_assert_eq!(base_positions.len(), flags.len());
    let k = flags.len().min(entities.len());

    for flag in flags.iter_mut() {
        flag.changed = false;
    }

    partition_top_k(entities, k, |a, b| a.key < b.key);

    // Pair enterers (prefix, no slot) with leavers (tail, slot held). Slot
    // ids transplant directly; they never pass through a free pool.
    let mut churn = 0u32;
    let mut leaver = k;
    for index in 0..k {
        if entities[index].slot.is_some() {
            continue;
        }
        while leaver < entities.len() {
            if let Some(slot) = entities[leaver].slot.take() {
                entities[index].slot = Some(slot);
                flags[slot as usize].changed = true;
                churn += 1;
                leaver += 1;
                break;
            }
            leaver += 1;
        }
    }

    // Assigned slots track their owner's motion every tick, not only on
    // reassignment.
    for entity in &entities[..k] {
        let Some(slot) = entity.slot else {
            debug_assert!(false, "top-K entity without a slot after reconciliation");
            continue;
        };
        base_positions[slot as usize] = entity.position;
        flags[slot as usize].visible = entity.key.visible;
    }

    churn
}
