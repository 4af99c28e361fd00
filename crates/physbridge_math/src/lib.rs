//! 3D mathematics for the physics bridge
//!
//! ## Core Types
//!
//! - [`Vec2`] - 2D vector, used for planar movement input
//! - [`Vec3`] - 3D vector with x, y, z components
//! - [`Quat`] - Unit quaternion for orientations

mod vec2;
mod vec3;
mod quat;

pub use vec2::Vec2;
pub use vec3::Vec3;
pub use quat::Quat;
