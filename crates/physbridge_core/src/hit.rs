//! Ray query results

use physbridge_math::Vec3;
use physbridge_physics::ComponentId;

use crate::world::EntityKey;

/// Closest hit of [`PhysicsProcessor::raycast`](crate::PhysicsProcessor::raycast)
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct HitResult {
    pub entity: EntityKey,
    pub component: ComponentId,
    /// World-space hit point
    pub point: Vec3,
    /// Surface normal at the hit point
    pub normal: Vec3,
    /// Distance from the ray origin
    pub distance: f32,
}
