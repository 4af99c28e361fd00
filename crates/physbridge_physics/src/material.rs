//! Surface materials and their per-pair combination
//!
//! Each collidable stores a [`PhysicsMaterial`]. When the narrow phase
//! finalizes a manifold, the two sides are folded into a [`PairMaterial`]
//! that the solver uses for that pair's contact constraints.

use serde::{Deserialize, Serialize};

/// Contact spring stiffness, expressed as frequency and damping ratio
#[derive(Clone, Copy, Debug, PartialEq, Serialize, Deserialize)]
pub struct SpringSettings {
    /// Target frequency in Hz
    pub frequency: f32,
    /// Damping ratio (1.0 = critically damped)
    pub damping_ratio: f32,
}

impl SpringSettings {
    pub fn new(frequency: f32, damping_ratio: f32) -> Self {
        Self {
            frequency: frequency.max(0.0),
            damping_ratio: damping_ratio.max(0.0),
        }
    }
}

impl Default for SpringSettings {
    fn default() -> Self {
        Self {
            frequency: 30.0,
            damping_ratio: 1.0,
        }
    }
}

/// Physical material properties for collision response
#[derive(Clone, Copy, Debug, PartialEq, Serialize, Deserialize)]
pub struct PhysicsMaterial {
    /// Friction coefficient (0.0 = ice, 1.0 = rubber)
    pub friction: f32,
    /// Restitution/bounciness (0.0 = no bounce, 1.0 = perfect bounce)
    pub restitution: f32,
    /// Upper bound on the velocity used to push penetrating shapes apart
    pub max_recovery_velocity: f32,
    /// Contact spring
    pub spring: SpringSettings,
}

impl Default for PhysicsMaterial {
    fn default() -> Self {
        Self {
            friction: 1.0,
            restitution: 0.0,
            max_recovery_velocity: 2.0,
            spring: SpringSettings::default(),
        }
    }
}

impl PhysicsMaterial {
    /// Ice-like material: very low friction, slight bounce
    pub const ICE: Self = Self::preset(0.05, 0.1);

    /// Rubber-like material: high friction, very bouncy
    pub const RUBBER: Self = Self::preset(0.9, 0.8);

    /// Metal-like material: moderate friction and bounce
    pub const METAL: Self = Self::preset(0.3, 0.3);

    /// Wood-like material: moderate friction, low bounce
    pub const WOOD: Self = Self::preset(0.5, 0.2);

    /// Concrete-like material: high friction, very low bounce
    pub const CONCRETE: Self = Self::preset(0.7, 0.1);

    const fn preset(friction: f32, restitution: f32) -> Self {
        Self {
            friction,
            restitution,
            max_recovery_velocity: 2.0,
            spring: SpringSettings {
                frequency: 30.0,
                damping_ratio: 1.0,
            },
        }
    }

    /// Create a new physics material with custom friction and restitution
    ///
    /// Values are clamped to the range [0.0, 1.0].
    pub fn new(friction: f32, restitution: f32) -> Self {
        Self::preset(friction.clamp(0.0, 1.0), restitution.clamp(0.0, 1.0))
    }

    /// Set the maximum recovery velocity
    pub fn with_max_recovery_velocity(mut self, velocity: f32) -> Self {
        self.max_recovery_velocity = velocity.max(0.0);
        self
    }

    /// Set the contact spring
    pub fn with_spring(mut self, spring: SpringSettings) -> Self {
        self.spring = spring;
        self
    }
}

/// Material applied to one collision pair
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct PairMaterial {
    pub friction: f32,
    pub restitution: f32,
    pub max_recovery_velocity: f32,
    pub spring: SpringSettings,
}

impl PairMaterial {
    /// Combine two materials for collision response
    ///
    /// Friction multiplies and restitution takes the bouncier side. Recovery
    /// velocity takes the larger value, and the spring comes from whichever
    /// side supplied it.
    pub fn combine(a: &PhysicsMaterial, b: &PhysicsMaterial) -> Self {
        let spring_source = if a.max_recovery_velocity > b.max_recovery_velocity { a } else { b };
        Self {
            friction: a.friction * b.friction,
            restitution: a.restitution.max(b.restitution),
            max_recovery_velocity: a.max_recovery_velocity.max(b.max_recovery_velocity),
            spring: spring_source.spring,
        }
    }
}
