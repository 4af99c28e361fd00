//! Character controllers
//!
//! A character is an ordinary dynamic body whose horizontal motion and
//! jumping follow movement goals instead of forces. Every timestep:
//!
//! 1. [`CharacterControllers::apply_motion`] runs before the solver and
//!    steers each supported character toward its target velocity.
//! 2. During the narrow phase, [`CharacterControllers::try_report_contacts`]
//!    looks for contacts that can carry a character and records them in
//!    the calling worker's [`SupportBatch`].
//! 3. [`CharacterControllers::update_supports`] picks the deepest candidate
//!    per character once the workers are done.

use std::collections::hash_map::Entry;

use physbridge_math::{Vec2, Vec3};
use rustc_hash::FxHashMap;

use crate::handle::{BodyHandle, CollidableHandle, CollidablePair};
use crate::solver::{BodyVelocity, ContactManifold, RigidBodySolver};

/// Tuning of one character
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct CharacterDescription {
    /// Up direction in the body's local space
    pub local_up: Vec3,
    /// Velocity along up the character leaves its support with
    pub jump_velocity: f32,
    /// Force available for moving along the support surface
    pub maximum_horizontal_force: f32,
    /// Force available for staying glued to the support
    pub maximum_vertical_force: f32,
    /// Cosine of the steepest slope that still counts as support
    pub cos_maximum_slope: f32,
    /// Depth a contact needs to become a new support
    pub minimum_support_depth: f32,
    /// Depth a contact needs to keep an existing support
    pub minimum_support_continuation_depth: f32,
}

impl Default for CharacterDescription {
    fn default() -> Self {
        Self {
            local_up: Vec3::Y,
            jump_velocity: 6.0,
            maximum_horizontal_force: 20.0,
            maximum_vertical_force: 100.0,
            cos_maximum_slope: std::f32::consts::FRAC_PI_4.cos(),
            minimum_support_depth: -0.0035,
            minimum_support_continuation_depth: -0.1,
        }
    }
}

impl CharacterDescription {
    /// Set the steepest supporting slope as an angle in radians
    pub fn with_maximum_slope(mut self, angle: f32) -> Self {
        self.cos_maximum_slope = angle.cos();
        self
    }

    /// Keep supports alive for as long as the body's speculative contacts
    pub fn with_speculative_margin(mut self, margin: f32) -> Self {
        self.minimum_support_continuation_depth = -margin;
        self
    }
}

/// The contact a character is standing on
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct Support {
    pub collidable: CollidableHandle,
    /// Contact normal pointing from the support toward the character
    pub normal: Vec3,
    pub depth: f32,
}

/// Movement state of one character
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct CharacterController {
    pub description: CharacterDescription,
    /// Desired velocity: `x` strafes to the right of the view, `y` moves
    /// along it
    pub target_velocity: Vec2,
    /// World-space look direction, projected onto the support to find forward
    pub view_direction: Vec3,
    /// Jump at the next step if supported; cleared every step
    pub try_jump: bool,
    support: Option<Support>,
    /// World-space up as of the last step
    up: Vec3,
}

impl CharacterController {
    fn new(description: CharacterDescription) -> Self {
        Self {
            description,
            target_velocity: Vec2::ZERO,
            view_direction: -Vec3::Z,
            try_jump: false,
            support: None,
            up: description.local_up.normalized(),
        }
    }

    pub fn support(&self) -> Option<&Support> {
        self.support.as_ref()
    }

    pub fn is_supported(&self) -> bool {
        self.support.is_some()
    }

    /// Best support candidate among the manifold's contacts
    ///
    /// `sign` flips the manifold normal so it points toward the character.
    fn support_candidate(
        &self,
        other: CollidableHandle,
        manifold: &ContactManifold,
        sign: f32,
    ) -> Option<Support> {
        let minimum_depth = if self.is_supported() {
            self.description.minimum_support_continuation_depth
        } else {
            self.description.minimum_support_depth
        };
        manifold
            .contacts()
            .iter()
            .filter(|contact| contact.depth >= minimum_depth)
            .map(|contact| Support {
                collidable: other,
                normal: contact.normal * sign,
                depth: contact.depth,
            })
            .filter(|support| support.normal.dot(self.up) >= self.description.cos_maximum_slope)
            .max_by(|a, b| a.depth.total_cmp(&b.depth))
    }

    /// New linear velocity for a supported character
    fn steer(&mut self, support: Support, velocity: Vec3, inverse_mass: f32, dt: f32) -> Vec3 {
        if self.try_jump {
            self.support = None;
            let vertical = velocity.dot(self.up);
            return velocity + self.up * (self.description.jump_velocity - vertical);
        }

        let normal = support.normal;
        let mut velocity = velocity;
        let view = self.view_direction;
        let forward = (view - normal * view.dot(normal)).normalized();
        if forward != Vec3::ZERO {
            let right = forward.cross(normal);
            let target = right * self.target_velocity.x + forward * self.target_velocity.y;
            let tangent = velocity - normal * velocity.dot(normal);
            let budget = self.description.maximum_horizontal_force * inverse_mass * dt;
            velocity += clamp_length(target - tangent, budget);
        }

        let separating = velocity.dot(normal);
        if separating > 0.0 {
            let budget = self.description.maximum_vertical_force * inverse_mass * dt;
            velocity -= normal * separating.min(budget);
        }
        velocity
    }
}

fn clamp_length(v: Vec3, max: f32) -> Vec3 {
    let length = v.length();
    if length > max && length > 0.0 {
        v * (max / length)
    } else {
        v
    }
}

/// Support candidates found by one narrow-phase worker
#[derive(Debug, Default)]
pub struct SupportBatch {
    candidates: Vec<(BodyHandle, Support)>,
}

impl SupportBatch {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.candidates.len()
    }

    pub fn is_empty(&self) -> bool {
        self.candidates.is_empty()
    }
}

/// Every character of a simulation, keyed by body
#[derive(Debug, Default)]
pub struct CharacterControllers {
    characters: FxHashMap<BodyHandle, CharacterController>,
}

impl CharacterControllers {
    pub fn new() -> Self {
        Self::default()
    }

    /// Make `body` a character, replacing any previous controller
    pub fn allocate(
        &mut self,
        body: BodyHandle,
        description: CharacterDescription,
    ) -> &mut CharacterController {
        let controller = CharacterController::new(description);
        match self.characters.entry(body) {
            Entry::Occupied(mut entry) => {
                log::warn!("Body {:?} already had a character controller, replaced", body);
                entry.insert(controller);
                entry.into_mut()
            }
            Entry::Vacant(entry) => entry.insert(controller),
        }
    }

    pub fn remove(&mut self, body: BodyHandle) -> Option<CharacterController> {
        self.characters.remove(&body)
    }

    pub fn get(&self, body: BodyHandle) -> Option<&CharacterController> {
        self.characters.get(&body)
    }

    pub fn get_mut(&mut self, body: BodyHandle) -> Option<&mut CharacterController> {
        self.characters.get_mut(&body)
    }

    pub fn contains(&self, body: BodyHandle) -> bool {
        self.characters.contains_key(&body)
    }

    pub fn len(&self) -> usize {
        self.characters.len()
    }

    pub fn is_empty(&self) -> bool {
        self.characters.is_empty()
    }

    /// Record support candidates for either side of `pair` that is a character
    pub fn try_report_contacts(
        &self,
        batch: &mut SupportBatch,
        pair: CollidablePair,
        manifold: &ContactManifold,
    ) {
        if self.characters.is_empty() {
            return;
        }
        // Manifold normals point toward `a`
        let sides = [(pair.a, pair.b, 1.0), (pair.b, pair.a, -1.0)];
        for (side, other, sign) in sides {
            let Some(body) = side.body() else {
                continue;
            };
            let Some(character) = self.characters.get(&body) else {
                continue;
            };
            if let Some(support) = character.support_candidate(other, manifold, sign) {
                batch.candidates.push((body, support));
            }
        }
    }

    /// Pick the deepest candidate of each character as its new support
    ///
    /// Sleeping characters report no contacts and keep their support.
    pub fn update_supports<F>(&mut self, batches: Vec<SupportBatch>, is_asleep: F)
    where
        F: Fn(BodyHandle) -> bool,
    {
        let mut best: FxHashMap<BodyHandle, Support> = FxHashMap::default();
        for (body, candidate) in batches.into_iter().flat_map(|batch| batch.candidates) {
            let deeper = best.get(&body).map_or(true, |current| candidate.depth > current.depth);
            if deeper {
                best.insert(body, candidate);
            }
        }
        for (body, character) in self.characters.iter_mut() {
            if is_asleep(*body) {
                continue;
            }
            character.support = best.remove(body);
        }
    }

    /// Apply jumps and steer supported characters, before the solver steps
    pub fn apply_motion(&mut self, solver: &mut dyn RigidBodySolver, dt: f32) {
        for (&body, character) in self.characters.iter_mut() {
            let Some(pose) = solver.body_pose(body) else {
                continue;
            };
            character.up = pose.orientation.rotate(character.description.local_up).normalized();
            if !solver.is_body_awake(body) {
                continue;
            }
            let (Some(velocity), Some(inertia)) =
                (solver.body_velocity(body), solver.body_inertia(body))
            else {
                continue;
            };

            if let Some(support) = character.support {
                let linear = character.steer(support, velocity.linear, inertia.inverse_mass, dt);
                if linear != velocity.linear {
                    solver.set_body_velocity(body, BodyVelocity { linear, ..velocity });
                }
            }
            character.try_jump = false;
        }
    }
}
