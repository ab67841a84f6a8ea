//! Spatial/visibility evaluation for virtual entities.
//!
//! This module implements the **pure priority evaluator**: given an entity
//! position, the observer position, and six outward-facing half-space planes,
//! it produces the entity's [`PriorityKey`] for this tick.
//!
//! ## Contract
//!
//! * `visible` — a sphere-vs-frustum test: the entity is visible when, for
//!   every plane, `dot(normal, position) + distance > -bounding_radius`.
//! * `distance_sq` — squared distance to the observer. Squared distance is
//!   used deliberately instead of true distance: it preserves ordering and
//!   avoids a square root on a hot path. This is a correctness-preserving
//!   optimization, not an approximation.
//!
//! The evaluator has no side effects and no entity depends on another's
//! result, so it is safe to evaluate the full population in parallel.
//!
//! ## Ordering
//!
//! [`PriorityKey`] orders **visible before non-visible, then closer first**.
//! `Ord::cmp` returns `Less` for the higher-priority key, so "the K smallest
//! keys" always means "the K best-priority entities". Float comparison uses
//! `total_cmp`, which keeps the order total and deterministic even if a
//! degenerate input produces a NaN distance.

use glam::Vec3;

/// One outward-facing half-space plane, `dot(normal, p) + distance = 0`.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct Plane {
    /// Plane normal, pointing toward the inside of the volume.
    pub normal: Vec3,
    /// Signed distance term.
    pub distance: f32,
}

impl Plane {
    /// Signed distance from `point` to the plane; positive is inside.
    #[inline]
    pub fn signed_distance(&self, point: Vec3) -> f32 {
        self.normal.dot(point) + self.distance
    }
}

/// Six half-space planes describing the observer's view volume.
///
/// The core never computes these itself; they arrive as opaque per-tick input
/// from the observer collaborator.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct Frustum {
    /// The six planes, inward-facing normals.
    pub planes: [Plane; 6],
}

impl Frustum {
    /// Wraps six externally supplied planes.
    pub fn from_planes(planes: [Plane; 6]) -> Self {
        Self { planes }
    }

    /// Builds an axis-aligned box volume.
    ///
    /// Convenient for tests and headless drivers where no projection matrix
    /// exists; the visibility contract is identical to a camera frustum.
    pub fn from_aabb(min: Vec3, max: Vec3) -> Self {
        Self {
            planes: [
                Plane { normal: Vec3::X, distance: -min.x },
                Plane { normal: Vec3::NEG_X, distance: max.x },
                Plane { normal: Vec3::Y, distance: -min.y },
                Plane { normal: Vec3::NEG_Y, distance: max.y },
                Plane { normal: Vec3::Z, distance: -min.z },
                Plane { normal: Vec3::NEG_Z, distance: max.z },
            ],
        }
    }

    /// Tests a bounding sphere against all six planes.
    ///
    /// Returns `true` when the sphere is at least partially inside the
    /// volume.
    #[inline]
    pub fn contains_sphere(&self, center: Vec3, radius: f32) -> bool {
        let mut inside = true;
        for plane in &self.planes {
            inside &= plane.signed_distance(center) > -radius;
        }
        inside
    }
}

/// Per-tick priority of one virtual entity.
///
/// Smaller is better: visible entities order before non-visible ones, and
/// within each group the closer entity orders first.
#[derive(Clone, Copy, Debug, Default)]
pub struct PriorityKey {
    /// Result of the frustum test this tick.
    pub visible: bool,
    /// Squared distance to the observer this tick.
    pub distance_sq: f32,
}

impl PartialEq for PriorityKey {
    fn eq(&self, other: &Self) -> bool {
        self.cmp(other) == std::cmp::Ordering::Equal
    }
}

impl Eq for PriorityKey {}

impl PartialOrd for PriorityKey {
    fn partial_cmp(&self, other: &Self) -> Option<std::cmp::Ordering> {
        Some(self.cmp(other))
    }
}

impl Ord for PriorityKey {
    fn cmp(&self, other: &Self) -> std::cmp::Ordering {
        match (self.visible, other.visible) {
            (true, false) => std::cmp::Ordering::Less,
            (false, true) => std::cmp::Ordering::Greater,
            _ => self.distance_sq.total_cmp(&other.distance_sq),
        }
    }
}

/// Evaluates one entity's priority key.
///
/// Pure function of its inputs; safe to call for all entities fully in
/// parallel.
#[inline]
pub fn evaluate(
    position: Vec3,
    observer: Vec3,
    frustum: &Frustum,
    bounding_radius: f32,
) -> PriorityKey {
    PriorityKey {
        visible: frustum.contains_sphere(position, bounding_radius),
        distance_sq: position.distance_squared(observer),
    }
}
