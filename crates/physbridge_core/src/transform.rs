//! Transform (position, rotation, scale)
//!
//! A Transform represents the local placement of an entity. Physics bodies
//! only drive position and rotation; scale is left to the entity.

use physbridge_math::{Quat, Vec3};
use physbridge_physics::RigidPose;
use serde::{Deserialize, Serialize};

/// A transform with position, rotation, and per-axis scale
#[derive(Clone, Copy, Debug, PartialEq, Serialize, Deserialize)]
pub struct Transform {
    /// Position in world space
    pub position: Vec3,
    /// Rotation as a unit quaternion
    #[serde(default)]
    pub rotation: Quat,
    /// Per-axis scale
    #[serde(default = "unit_scale")]
    pub scale: Vec3,
}

fn unit_scale() -> Vec3 {
    Vec3::ONE
}

impl Default for Transform {
    fn default() -> Self {
        Self::identity()
    }
}

impl Transform {
    /// Create an identity transform (no translation, rotation, or scale change)
    pub fn identity() -> Self {
        Self {
            position: Vec3::ZERO,
            rotation: Quat::IDENTITY,
            scale: Vec3::ONE,
        }
    }

    /// Create a transform with just a position
    pub fn from_position(position: Vec3) -> Self {
        Self {
            position,
            ..Self::identity()
        }
    }

    /// Create a transform with position and rotation
    pub fn from_position_rotation(position: Vec3, rotation: Quat) -> Self {
        Self {
            position,
            rotation,
            scale: Vec3::ONE,
        }
    }

    /// Set the scale
    pub fn with_scale(mut self, scale: Vec3) -> Self {
        self.scale = scale;
        self
    }

    /// Transform a point from local space to world space
    ///
    /// Applies scale, then rotation, then translation.
    pub fn transform_point(&self, p: Vec3) -> Vec3 {
        self.rotation.rotate(p.component_mul(self.scale)) + self.position
    }

    /// Transform a direction from local space to world space
    pub fn transform_direction(&self, d: Vec3) -> Vec3 {
        self.rotation.rotate(d.component_mul(self.scale))
    }

    /// Translate the transform by an offset
    pub fn translate(&mut self, offset: Vec3) {
        self.position += offset;
    }

    /// Rotate the transform by a quaternion
    pub fn rotate(&mut self, rotation: Quat) {
        self.rotation = rotation.compose(&self.rotation).normalize();
    }

    /// Rigid part of this transform, as handed to the solver
    pub fn pose(&self) -> RigidPose {
        RigidPose::new(self.position, self.rotation)
    }

    /// Take position and rotation from a solver pose, keeping scale
    pub fn set_pose(&mut self, pose: RigidPose) {
        self.position = pose.position;
        self.rotation = pose.orientation;
    }
}
