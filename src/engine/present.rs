//! Presentation adapter contract.
//!
//! After the pipeline's completion barrier the core exposes, for every real
//! slot, a finalized [`SlotFrame`]. A presentation adapter — transform
//! write-back, GPU instance upload, anything downstream — consumes these
//! frames; the core never touches the concrete resources behind the slots.
//!
//! Adapters should read only slots where `changed_this_tick` is set when
//! reacting to reassignment; reading all slots is correctness-preserving,
//! just slower.

use glam::{Quat, Vec3};

/// Finalized per-slot output of one tick.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct SlotFrame {
    /// Composed world position (`base + offset`).
    pub position: Vec3,
    /// Composed world rotation (`offset * base`).
    pub rotation: Quat,
    /// Visibility of the entity this slot represents.
    pub visible: bool,
    /// Set when the slot was reassigned to a different entity this tick.
    pub changed_this_tick: bool,
}

impl Default for SlotFrame {
    fn default() -> Self {
        Self {
            position: Vec3::ZERO,
            rotation: Quat::IDENTITY,
            visible: false,
            changed_this_tick: false,
        }
    }
}

/// Consumer of finalized slot frames.
///
/// Implemented by external collaborators owning the concrete resource
/// handles (one per slot, supplied at initialization and never created or
/// destroyed by this crate).
pub trait PresentationSink {
    /// Receives all slot frames for one tick, after the completion barrier.
    fn apply(&mut self, frames: &[SlotFrame]);
}
