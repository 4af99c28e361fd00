//! Unit quaternion for 3D orientations
//!
//! Stored as `(x, y, z, w)` with `w` the scalar part. All constructors
//! produce unit quaternions; composition keeps them unit up to float drift,
//! so long-lived orientations should be renormalized periodically.

use bytemuck::{Pod, Zeroable};
use serde::{Serialize, Deserialize};
use crate::Vec3;

/// Rotation quaternion
#[repr(C)]
#[derive(Clone, Copy, Debug, PartialEq, Pod, Zeroable, Serialize, Deserialize)]
pub struct Quat {
    pub x: f32,
    pub y: f32,
    pub z: f32,
    pub w: f32,
}

impl Default for Quat {
    fn default() -> Self {
        Self::IDENTITY
    }
}

impl Quat {
    /// Identity rotation
    pub const IDENTITY: Self = Self { x: 0.0, y: 0.0, z: 0.0, w: 1.0 };

    /// Create a quaternion from raw components (not normalized)
    #[inline]
    pub const fn from_xyzw(x: f32, y: f32, z: f32, w: f32) -> Self {
        Self { x, y, z, w }
    }

    /// Rotation of `angle` radians around `axis`
    ///
    /// A zero axis yields the identity.
    pub fn from_axis_angle(axis: Vec3, angle: f32) -> Self {
        let axis = axis.normalized();
        if axis == Vec3::ZERO {
            return Self::IDENTITY;
        }
        let (s, c) = (angle * 0.5).sin_cos();
        Self::from_xyzw(axis.x * s, axis.y * s, axis.z * s, c)
    }

    /// Rotation from a scaled axis (axis * angle), as produced by
    /// integrating an angular velocity over a timestep
    pub fn from_scaled_axis(v: Vec3) -> Self {
        let angle = v.length();
        if angle <= f32::EPSILON {
            return Self::IDENTITY;
        }
        Self::from_axis_angle(v / angle, angle)
    }

    /// Vector part
    #[inline]
    pub fn xyz(&self) -> Vec3 {
        Vec3::new(self.x, self.y, self.z)
    }

    /// Dot product over all four components
    #[inline]
    pub fn dot(&self, other: &Self) -> f32 {
        self.x * other.x + self.y * other.y + self.z * other.z + self.w * other.w
    }

    /// Magnitude squared
    #[inline]
    pub fn magnitude_squared(&self) -> f32 {
        self.dot(self)
    }

    /// Normalize to unit length
    pub fn normalize(&self) -> Self {
        let mag = self.magnitude_squared().sqrt();
        if mag < 1e-10 {
            return Self::IDENTITY;
        }
        let inv = 1.0 / mag;
        Self::from_xyzw(self.x * inv, self.y * inv, self.z * inv, self.w * inv)
    }

    /// Inverse rotation (conjugate of a unit quaternion)
    #[inline]
    pub fn conjugate(&self) -> Self {
        Self::from_xyzw(-self.x, -self.y, -self.z, self.w)
    }

    /// Rotate a vector
    pub fn rotate(&self, v: Vec3) -> Vec3 {
        // v' = v + 2w(q x v) + 2(q x (q x v))
        let q = self.xyz();
        let t = q.cross(v) * 2.0;
        v + t * self.w + q.cross(t)
    }

    /// Compose two rotations: the result applies `other` first, then `self`
    pub fn compose(&self, other: &Self) -> Self {
        Self::from_xyzw(
            self.w * other.x + self.x * other.w + self.y * other.z - self.z * other.y,
            self.w * other.y - self.x * other.z + self.y * other.w + self.z * other.x,
            self.w * other.z + self.x * other.y - self.y * other.x + self.z * other.w,
            self.w * other.w - self.x * other.x - self.y * other.y - self.z * other.z,
        )
    }

    /// Normalized linear interpolation, taking the shorter arc
    pub fn nlerp(&self, other: &Self, t: f32) -> Self {
        let sign = if self.dot(other) < 0.0 { -1.0 } else { 1.0 };
        let a = 1.0 - t;
        let b = t * sign;
        Self::from_xyzw(
            self.x * a + other.x * b,
            self.y * a + other.y * b,
            self.z * a + other.z * b,
            self.w * a + other.w * b,
        )
        .normalize()
    }
}

impl std::ops::Mul for Quat {
    type Output = Self;
    #[inline]
    fn mul(self, other: Self) -> Self {
        self.compose(&other)
    }
}
