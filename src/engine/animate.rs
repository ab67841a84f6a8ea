//! Per-slot flavor animation.
//!
//! Pure functions computing the position and rotation offsets that give each
//! represented entity its individual motion, independent of selection. Both
//! are functions of time and per-slot parameters only — no slot depends on
//! another's result, so offset stages parallelize freely over slots.
//!
//! The composition `final = base ∘ offset` happens in the compose stage, not
//! here.

use glam::{Quat, Vec3};

/// Per-slot animation parameters, fixed at initialization.
#[derive(Clone, Copy, Debug, Default, PartialEq)]
pub struct FlavorParams {
    /// Phase offset in radians, decorrelating slots animated with the same
    /// speed.
    pub time_offset: f32,
    /// Angular oscillation speed in radians per second.
    pub oscillation_speed: f32,
    /// Peak vertical displacement.
    pub oscillation_height: f32,
    /// Yaw speed in radians per second.
    pub rotation_speed: f32,
}

/// Vertical oscillation offset at absolute time `time`.
#[inline]
pub fn position_offset(params: &FlavorParams, time: f32) -> Vec3 {
    let y = params.oscillation_height
        * (params.oscillation_speed * (params.time_offset + time)).sin();
    Vec3::new(0.0, y, 0.0)
}

/// Incremental yaw rotation covering one tick of `delta_time` seconds.
///
/// Accumulated by the rotation-offset stage:
/// `offset = offset * rotation_step(params, dt)`.
#[inline]
pub fn rotation_step(params: &FlavorParams, delta_time: f32) -> Quat {
    Quat::from_rotation_y(params.rotation_speed * delta_time)
}
