//! Collision primitives for the reference solver
//!
//! Spheres stay spheres; every other shape collides as its world-space
//! bounding box. Contacts follow the manifold convention: the normal points
//! from the second volume toward the first, and the depth is negative while
//! the volumes are still apart (speculative contact).

use physbridge_math::Vec3;

use crate::shapes::ShapeDescription;
use crate::solver::{FeatureId, RigidPose};

/// A sphere defined by center and radius
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct Sphere {
    pub center: Vec3,
    pub radius: f32,
}

impl Sphere {
    pub fn new(center: Vec3, radius: f32) -> Self {
        Self { center, radius }
    }
}

/// An axis-aligned bounding box
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct Aabb {
    pub min: Vec3,
    pub max: Vec3,
}

impl Aabb {
    pub fn new(min: Vec3, max: Vec3) -> Self {
        Self { min, max }
    }

    /// Create an AABB centered at a position with given half-extents
    pub fn from_center_half_extents(center: Vec3, half_extents: Vec3) -> Self {
        Self {
            min: center - half_extents,
            max: center + half_extents,
        }
    }

    pub fn center(&self) -> Vec3 {
        (self.min + self.max) * 0.5
    }

    pub fn half_extents(&self) -> Vec3 {
        (self.max - self.min) * 0.5
    }

    /// Grow every side by `margin`
    pub fn expanded(&self, margin: f32) -> Self {
        Self {
            min: self.min - Vec3::splat(margin),
            max: self.max + Vec3::splat(margin),
        }
    }

    pub fn intersects(&self, other: &Self) -> bool {
        self.min.x <= other.max.x
            && self.max.x >= other.min.x
            && self.min.y <= other.max.y
            && self.max.y >= other.min.y
            && self.min.z <= other.max.z
            && self.max.z >= other.min.z
    }

    pub fn contains(&self, point: Vec3) -> bool {
        point.x >= self.min.x
            && point.x <= self.max.x
            && point.y >= self.min.y
            && point.y <= self.max.y
            && point.z >= self.min.z
            && point.z <= self.max.z
    }

    /// Get the closest point inside or on the AABB to a given point
    pub fn closest_point(&self, point: Vec3) -> Vec3 {
        point.clamp_components(self.min, self.max)
    }
}

/// World-space collision volume of a collidable
#[derive(Clone, Copy, Debug, PartialEq)]
pub enum Volume {
    Sphere(Sphere),
    Box(Aabb),
}

impl Volume {
    /// Place `shape` at `pose`
    ///
    /// Orientation only affects non-sphere shapes through their bounding
    /// box, which is taken in world axes.
    pub fn new(shape: &ShapeDescription, pose: &RigidPose) -> Self {
        match *shape {
            ShapeDescription::Sphere { radius } => {
                Volume::Sphere(Sphere::new(pose.position, radius))
            }
            _ => {
                let local = shape.bounding_half_extents();
                let q = pose.orientation;
                // Extents of the rotated box along world axes
                let ex = q.rotate(Vec3::X * local.x).abs();
                let ey = q.rotate(Vec3::Y * local.y).abs();
                let ez = q.rotate(Vec3::Z * local.z).abs();
                Volume::Box(Aabb::from_center_half_extents(pose.position, ex + ey + ez))
            }
        }
    }

    pub fn bounds(&self) -> Aabb {
        match self {
            Volume::Sphere(s) => Aabb::from_center_half_extents(s.center, Vec3::splat(s.radius)),
            Volume::Box(b) => *b,
        }
    }

    pub fn center(&self) -> Vec3 {
        match self {
            Volume::Sphere(s) => s.center,
            Volume::Box(b) => b.center(),
        }
    }
}

/// Contact between two volumes
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct Contact {
    /// World-space contact point
    pub point: Vec3,
    /// Normal pointing from the second volume toward the first
    pub normal: Vec3,
    /// Penetration depth (positive means overlapping)
    pub depth: f32,
    pub feature: FeatureId,
}

/// Feature id of a box face, from the axis and side of its outward normal
fn face_feature(axis: usize, positive: bool) -> FeatureId {
    FeatureId(axis as u32 * 2 + positive as u32)
}

fn dominant_axis(v: Vec3) -> usize {
    let a = v.abs();
    if a.x >= a.y && a.x >= a.z {
        0
    } else if a.y >= a.z {
        1
    } else {
        2
    }
}

fn axis_vector(axis: usize) -> Vec3 {
    match axis {
        0 => Vec3::X,
        1 => Vec3::Y,
        _ => Vec3::Z,
    }
}

/// Contact between `a` and `b`, or None if they are further apart than `margin`
pub fn collide(a: &Volume, b: &Volume, margin: f32) -> Option<Contact> {
    match (a, b) {
        (Volume::Sphere(a), Volume::Sphere(b)) => sphere_vs_sphere(a, b, margin),
        (Volume::Sphere(a), Volume::Box(b)) => sphere_vs_aabb(a, b, margin),
        (Volume::Box(a), Volume::Sphere(b)) => sphere_vs_aabb(b, a, margin).map(|mut c| {
            c.normal = -c.normal;
            c
        }),
        (Volume::Box(a), Volume::Box(b)) => aabb_vs_aabb(a, b, margin),
    }
}

/// Sphere vs sphere; normal from `b` toward `a`
pub fn sphere_vs_sphere(a: &Sphere, b: &Sphere, margin: f32) -> Option<Contact> {
    let delta = a.center - b.center;
    let dist = delta.length();
    let separation = dist - a.radius - b.radius;
    if separation > margin {
        return None;
    }
    let normal = if dist > 0.0001 { delta / dist } else { Vec3::Y };
    Some(Contact {
        point: a.center - normal * a.radius,
        normal,
        depth: -separation,
        feature: FeatureId(0),
    })
}

/// Sphere vs AABB; normal from the box toward the sphere
pub fn sphere_vs_aabb(sphere: &Sphere, aabb: &Aabb, margin: f32) -> Option<Contact> {
    let closest = aabb.closest_point(sphere.center);
    let delta = sphere.center - closest;
    let dist = delta.length();

    if dist > 0.0001 {
        let separation = dist - sphere.radius;
        if separation > margin {
            return None;
        }
        let normal = delta / dist;
        let axis = dominant_axis(normal);
        return Some(Contact {
            point: closest,
            normal,
            depth: -separation,
            feature: face_feature(axis, normal.axis(axis) > 0.0),
        });
    }

    // Center inside the box: push out through the nearest face
    let to_min = sphere.center - aabb.min;
    let to_max = aabb.max - sphere.center;
    let mut best = (to_min.x, 0, false);
    for axis in 0..3 {
        if to_min.axis(axis) < best.0 {
            best = (to_min.axis(axis), axis, false);
        }
        if to_max.axis(axis) < best.0 {
            best = (to_max.axis(axis), axis, true);
        }
    }
    let (escape, axis, positive) = best;
    let normal = if positive { axis_vector(axis) } else { -axis_vector(axis) };
    Some(Contact {
        point: closest,
        normal,
        depth: sphere.radius + escape,
        feature: face_feature(axis, positive),
    })
}

/// AABB vs AABB; normal from `b` toward `a` along the axis of least overlap
pub fn aabb_vs_aabb(a: &Aabb, b: &Aabb, margin: f32) -> Option<Contact> {
    let overlap_min = a.min.max_components(b.min);
    let overlap_max = a.max.min_components(b.max);
    let overlap = overlap_max - overlap_min;
    if overlap.x < -margin || overlap.y < -margin || overlap.z < -margin {
        return None;
    }

    let mut axis = 0;
    for candidate in 1..3 {
        if overlap.axis(candidate) < overlap.axis(axis) {
            axis = candidate;
        }
    }
    let positive = a.center().axis(axis) >= b.center().axis(axis);
    let normal = if positive { axis_vector(axis) } else { -axis_vector(axis) };
    Some(Contact {
        point: (overlap_min + overlap_max) * 0.5,
        normal,
        depth: overlap.axis(axis),
        feature: face_feature(axis, positive),
    })
}

/// Ray vs volume; returns distance along the ray and the surface normal
///
/// `direction` must be normalized. Rays starting inside the volume report
/// a hit at distance zero.
pub fn ray_cast(
    volume: &Volume,
    origin: Vec3,
    direction: Vec3,
    max_distance: f32,
) -> Option<(f32, Vec3)> {
    match volume {
        Volume::Sphere(s) => ray_vs_sphere(s, origin, direction, max_distance),
        Volume::Box(b) => ray_vs_aabb(b, origin, direction, max_distance),
    }
}

fn ray_vs_sphere(
    sphere: &Sphere,
    origin: Vec3,
    direction: Vec3,
    max_distance: f32,
) -> Option<(f32, Vec3)> {
    let m = origin - sphere.center;
    let c = m.length_squared() - sphere.radius * sphere.radius;
    if c <= 0.0 {
        return Some((0.0, Vec3::ZERO));
    }
    let b = m.dot(direction);
    if b > 0.0 {
        return None;
    }
    let discriminant = b * b - c;
    if discriminant < 0.0 {
        return None;
    }
    let t = -b - discriminant.sqrt();
    if t > max_distance {
        return None;
    }
    let point = origin + direction * t;
    Some((t, (point - sphere.center).normalized()))
}

fn ray_vs_aabb(
    aabb: &Aabb,
    origin: Vec3,
    direction: Vec3,
    max_distance: f32,
) -> Option<(f32, Vec3)> {
    if aabb.contains(origin) {
        return Some((0.0, Vec3::ZERO));
    }
    let mut t_min = 0.0f32;
    let mut t_max = max_distance;
    let mut normal = Vec3::ZERO;
    for axis in 0..3 {
        let o = origin.axis(axis);
        let d = direction.axis(axis);
        let (lo, hi) = (aabb.min.axis(axis), aabb.max.axis(axis));
        if d.abs() < 1e-8 {
            if o < lo || o > hi {
                return None;
            }
            continue;
        }
        let inv = 1.0 / d;
        let (mut t0, mut t1) = ((lo - o) * inv, (hi - o) * inv);
        let mut face = -axis_vector(axis);
        if t0 > t1 {
            std::mem::swap(&mut t0, &mut t1);
            face = axis_vector(axis);
        }
        if t0 > t_min {
            t_min = t0;
            normal = face;
        }
        t_max = t_max.min(t1);
        if t_min > t_max {
            return None;
        }
    }
    Some((t_min, normal))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_sphere_vs_sphere_overlap() {
        let a = Sphere::new(Vec3::new(0.0, 1.5, 0.0), 1.0);
        let b = Sphere::new(Vec3::ZERO, 1.0);
        let c = sphere_vs_sphere(&a, &b, 0.0).unwrap();
        assert!((c.depth - 0.5).abs() < 1e-5);
        assert_eq!(c.normal, Vec3::Y);
    }

    #[test]
    fn test_sphere_vs_sphere_speculative() {
        let a = Sphere::new(Vec3::new(0.0, 2.05, 0.0), 1.0);
        let b = Sphere::new(Vec3::ZERO, 1.0);
        assert!(sphere_vs_sphere(&a, &b, 0.01).is_none());
        let c = sphere_vs_sphere(&a, &b, 0.1).unwrap();
        assert!(c.depth < 0.0);
    }

    #[test]
    fn test_sphere_resting_on_box_top_face() {
        let floor = Aabb::new(Vec3::new(-5.0, -1.0, -5.0), Vec3::new(5.0, 0.0, 5.0));
        let ball = Sphere::new(Vec3::new(0.0, 0.4, 0.0), 0.5);
        let c = sphere_vs_aabb(&ball, &floor, 0.0).unwrap();
        assert_eq!(c.normal, Vec3::Y);
        assert!((c.depth - 0.1).abs() < 1e-5);
        assert_eq!(c.feature, FeatureId(3)); // +Y face
    }

    #[test]
    fn test_sphere_center_inside_box() {
        let b = Aabb::new(Vec3::splat(-1.0), Vec3::splat(1.0));
        let s = Sphere::new(Vec3::new(0.0, 0.0, 0.8), 0.5);
        let c = sphere_vs_aabb(&s, &b, 0.0).unwrap();
        assert_eq!(c.normal, Vec3::Z);
        assert!((c.depth - 0.7).abs() < 1e-5);
    }

    #[test]
    fn test_box_vs_sphere_flips_normal() {
        let b = Volume::Box(Aabb::new(Vec3::splat(-1.0), Vec3::splat(1.0)));
        let s = Volume::Sphere(Sphere::new(Vec3::new(0.0, 1.2, 0.0), 0.5));
        let c = collide(&b, &s, 0.0).unwrap();
        assert_eq!(c.normal, -Vec3::Y);
    }

    #[test]
    fn test_aabb_vs_aabb_least_axis() {
        let a = Aabb::from_center_half_extents(Vec3::new(0.0, 1.8, 0.0), Vec3::ONE);
        let b = Aabb::from_center_half_extents(Vec3::ZERO, Vec3::ONE);
        let c = aabb_vs_aabb(&a, &b, 0.0).unwrap();
        assert_eq!(c.normal, Vec3::Y);
        assert!((c.depth - 0.2).abs() < 1e-5);
        assert!(aabb_vs_aabb(&a.expanded(-0.5), &b.expanded(-0.5), 0.0).is_none());
    }

    #[test]
    fn test_rotated_box_bounds() {
        let pose = RigidPose::new(
            Vec3::ZERO,
            physbridge_math::Quat::from_axis_angle(Vec3::Z, std::f32::consts::FRAC_PI_2),
        );
        let volume = Volume::new(&ShapeDescription::cuboid(Vec3::new(2.0, 0.5, 1.0)), &pose);
        let half = volume.bounds().half_extents();
        assert!((half.x - 0.5).abs() < 1e-4);
        assert!((half.y - 2.0).abs() < 1e-4);
    }

    #[test]
    fn test_ray_hits() {
        let sphere = Volume::Sphere(Sphere::new(Vec3::new(0.0, 0.0, -5.0), 1.0));
        let (t, n) = ray_cast(&sphere, Vec3::ZERO, -Vec3::Z, 100.0).unwrap();
        assert!((t - 4.0).abs() < 1e-5);
        assert!((n.z - 1.0).abs() < 1e-5);
        assert!(ray_cast(&sphere, Vec3::ZERO, Vec3::Z, 100.0).is_none());
        assert!(ray_cast(&sphere, Vec3::ZERO, -Vec3::Z, 3.0).is_none());

        let floor = Volume::Box(Aabb::new(Vec3::new(-5.0, -1.0, -5.0), Vec3::new(5.0, 0.0, 5.0)));
        let (t, n) = ray_cast(&floor, Vec3::new(1.0, 3.0, 1.0), -Vec3::Y, 10.0).unwrap();
        assert!((t - 3.0).abs() < 1e-5);
        assert_eq!(n, Vec3::Y);
    }

    #[test]
    fn test_ray_from_inside_reports_zero() {
        let b = Volume::Box(Aabb::new(Vec3::splat(-1.0), Vec3::splat(1.0)));
        let (t, _) = ray_cast(&b, Vec3::ZERO, Vec3::X, 10.0).unwrap();
        assert_eq!(t, 0.0);
    }
}
