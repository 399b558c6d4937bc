//! Math types for GardenSonic
//!
//! The world is walked on the XZ plane; height never takes part in pool
//! decisions, so most of the crate works with `Vec2 { x, y: z }`.

pub use glam::{Vec2, Vec3};

/// Projects a world position onto the ground plane.
pub fn planar(position: Vec3) -> Vec2 {
    Vec2::new(position.x, position.z)
}

/// Squared ground-plane distance between two points.
pub fn distance_sq(a: Vec2, b: Vec2) -> f32 {
    a.distance_squared(b)
}

/// Linear loudness falloff: 1 at the source, 0 at `hush` and beyond.
pub fn falloff(distance: f32, hush: f32) -> f32 {
    if hush <= 0.0 {
        return 0.0;
    }
    ((hush - distance) / hush).max(0.0)
}
