//! Collider shape descriptions
//!
//! These describe shapes to the solver; geometry and debug meshes are the
//! solver's and renderer's business. Capsules and cylinders are aligned
//! with the local Y axis, `length` being the distance between cap centers
//! (capsule) or the full height (cylinder).

use physbridge_math::Vec3;
use serde::{Deserialize, Serialize};

use crate::solver::BodyInertia;

/// A convex collider shape
#[derive(Clone, Copy, Debug, PartialEq, Serialize, Deserialize)]
pub enum ShapeDescription {
    Sphere { radius: f32 },
    Box { half_extents: Vec3 },
    Capsule { radius: f32, length: f32 },
    Cylinder { radius: f32, length: f32 },
}

impl ShapeDescription {
    /// Sphere of the given radius
    pub fn sphere(radius: f32) -> Self {
        ShapeDescription::Sphere { radius }
    }

    /// Box with the given half extents
    pub fn cuboid(half_extents: Vec3) -> Self {
        ShapeDescription::Box { half_extents }
    }

    /// Half extents of the local axis-aligned bounding box
    pub fn bounding_half_extents(&self) -> Vec3 {
        match *self {
            ShapeDescription::Sphere { radius } => Vec3::splat(radius),
            ShapeDescription::Box { half_extents } => half_extents,
            ShapeDescription::Capsule { radius, length } => {
                Vec3::new(radius, length * 0.5 + radius, radius)
            }
            ShapeDescription::Cylinder { radius, length } => {
                Vec3::new(radius, length * 0.5, radius)
            }
        }
    }

    /// Inertia of a solid body of this shape with the given mass
    ///
    /// A non-positive mass produces kinematic inertia.
    pub fn inertia(&self, mass: f32) -> BodyInertia {
        if mass <= 0.0 {
            return BodyInertia::KINEMATIC;
        }
        let principal = match *self {
            ShapeDescription::Sphere { radius } => Vec3::splat(0.4 * mass * radius * radius),
            ShapeDescription::Box { half_extents } => {
                let size = half_extents * 2.0;
                let (x2, y2, z2) = (size.x * size.x, size.y * size.y, size.z * size.z);
                Vec3::new(y2 + z2, x2 + z2, x2 + y2) * (mass / 12.0)
            }
            ShapeDescription::Cylinder { radius, length } => {
                let r2 = radius * radius;
                let side = mass * (3.0 * r2 + length * length) / 12.0;
                Vec3::new(side, 0.5 * mass * r2, side)
            }
            ShapeDescription::Capsule { radius, length } => {
                // Treated as a cylinder spanning the full capsule height
                let r2 = radius * radius;
                let height = length + 2.0 * radius;
                let side = mass * (3.0 * r2 + height * height) / 12.0;
                Vec3::new(side, 0.5 * mass * r2, side)
            }
        };
        BodyInertia {
            inverse_mass: 1.0 / mass,
            inverse_inertia: Vec3::new(
                inverse_or_zero(principal.x),
                inverse_or_zero(principal.y),
                inverse_or_zero(principal.z),
            ),
        }
    }
}

fn inverse_or_zero(v: f32) -> f32 {
    if v > f32::EPSILON {
        1.0 / v
    } else {
        0.0
    }
}
