//! Interface to the rigid-body solver
//!
//! The bridge never integrates forces or solves constraints itself. It
//! drives any backend implementing [`RigidBodySolver`] and observes it
//! through the two callback traits the backend invokes during a timestep.

use arrayvec::ArrayVec;
use physbridge_math::{Quat, Vec3};
use serde::{Deserialize, Serialize};

use crate::characters::SupportBatch;
use crate::contacts::ContactBatch;
use crate::dispatcher::ThreadDispatcher;
use crate::handle::{
    BodyHandle, CollidableHandle, CollidablePair, ConstraintHandle, ShapeIndex, StaticHandle,
};
use crate::material::{PairMaterial, SpringSettings};
use crate::shapes::ShapeDescription;

/// Maximum number of contacts in one manifold
pub const MAX_CONTACTS: usize = 4;

/// Solver-assigned identity of the geometric feature behind a contact
///
/// Stable across frames for the same face/edge/vertex combination.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct FeatureId(pub u32);

/// One contact of a manifold
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct ContactPoint {
    /// Contact position relative to the first collidable of the pair
    pub offset: Vec3,
    /// Contact normal, pointing from the second collidable toward the first
    pub normal: Vec3,
    /// Penetration depth; negative values are speculative (separated) contacts
    pub depth: f32,
    pub feature_id: FeatureId,
}

impl ContactPoint {
    pub fn new(offset: Vec3, normal: Vec3, depth: f32, feature_id: FeatureId) -> Self {
        Self {
            offset,
            normal,
            depth,
            feature_id,
        }
    }
}

/// The contacts of one pair for one timestep
#[derive(Clone, Debug, Default, PartialEq)]
pub struct ContactManifold {
    contacts: ArrayVec<ContactPoint, MAX_CONTACTS>,
}

impl ContactManifold {
    pub fn new() -> Self {
        Self::default()
    }

    /// Add a contact, returning false if the manifold is full
    pub fn push(&mut self, contact: ContactPoint) -> bool {
        self.contacts.try_push(contact).is_ok()
    }

    /// Builder-style [`ContactManifold::push`]; extra contacts are dropped
    pub fn with_contact(mut self, contact: ContactPoint) -> Self {
        self.push(contact);
        self
    }

    pub fn contacts(&self) -> &[ContactPoint] {
        &self.contacts
    }

    pub fn len(&self) -> usize {
        self.contacts.len()
    }

    pub fn is_empty(&self) -> bool {
        self.contacts.is_empty()
    }

    /// Deepest contact, if any
    pub fn deepest(&self) -> Option<&ContactPoint> {
        self.contacts.iter().max_by(|a, b| a.depth.total_cmp(&b.depth))
    }
}

/// Position and orientation of a collidable
#[derive(Clone, Copy, Debug, Default, PartialEq)]
pub struct RigidPose {
    pub position: Vec3,
    pub orientation: Quat,
}

impl RigidPose {
    pub fn new(position: Vec3, orientation: Quat) -> Self {
        Self { position, orientation }
    }

    pub fn from_position(position: Vec3) -> Self {
        Self::new(position, Quat::IDENTITY)
    }
}

/// Linear and angular velocity of a body
#[derive(Clone, Copy, Debug, Default, PartialEq)]
pub struct BodyVelocity {
    pub linear: Vec3,
    pub angular: Vec3,
}

/// Inverse mass properties; all zero for kinematic bodies
#[derive(Clone, Copy, Debug, Default, PartialEq)]
pub struct BodyInertia {
    pub inverse_mass: f32,
    /// Inverse of the principal moments of inertia
    pub inverse_inertia: Vec3,
}

impl BodyInertia {
    pub const KINEMATIC: Self = Self {
        inverse_mass: 0.0,
        inverse_inertia: Vec3::ZERO,
    };

    /// Check whether forces and contacts leave this body unaffected
    pub fn is_kinematic(&self) -> bool {
        self.inverse_mass == 0.0
    }
}

/// Continuous collision detection mode
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub enum ContinuousDetection {
    #[default]
    Discrete,
    Passive,
    Continuous,
}

/// Everything the solver needs to create a body
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct BodyDescription {
    pub pose: RigidPose,
    pub velocity: BodyVelocity,
    pub inertia: BodyInertia,
    pub shape: ShapeIndex,
    pub speculative_margin: f32,
    /// Kinetic energy per unit mass below which the body may fall asleep
    pub sleep_threshold: f32,
    pub continuous: ContinuousDetection,
}

/// Everything the solver needs to create a static
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct StaticDescription {
    pub pose: RigidPose,
    pub shape: ShapeIndex,
    pub continuous: ContinuousDetection,
}

/// Speed and force limits of a servo constraint
#[derive(Clone, Copy, Debug, PartialEq, Serialize, Deserialize)]
pub struct ServoSettings {
    pub max_speed: f32,
    /// Speed the servo moves at regardless of the remaining error
    pub base_speed: f32,
    pub max_force: f32,
}

impl ServoSettings {
    pub fn new(max_speed: f32, base_speed: f32, max_force: f32) -> Self {
        Self {
            max_speed: max_speed.max(0.0),
            base_speed: base_speed.max(0.0),
            max_force: max_force.max(0.0),
        }
    }

    /// No speed limit, no base speed, capped force
    pub fn with_max_force(max_force: f32) -> Self {
        Self::new(f32::MAX, 0.0, max_force)
    }
}

/// Constraint between bodies, stored and solved by the backend
///
/// Offsets and axes are in the local space of the body they belong to.
#[derive(Clone, Copy, Debug, PartialEq)]
pub enum ConstraintDescription {
    /// Pulls a point on one body toward a world-space target
    OneBodyLinearServo {
        body: BodyHandle,
        local_offset: Vec3,
        target: Vec3,
        servo: ServoSettings,
        spring: SpringSettings,
    },
    /// Turns one body toward a world-space orientation
    OneBodyAngularServo {
        body: BodyHandle,
        target_orientation: Quat,
        servo: ServoSettings,
        spring: SpringSettings,
    },
    /// Keeps two anchor points within a distance range
    DistanceLimit {
        a: BodyHandle,
        b: BodyHandle,
        local_offset_a: Vec3,
        local_offset_b: Vec3,
        min_distance: f32,
        max_distance: f32,
        spring: SpringSettings,
    },
    /// Pins two anchor points together
    BallSocket {
        a: BodyHandle,
        b: BodyHandle,
        local_offset_a: Vec3,
        local_offset_b: Vec3,
        spring: SpringSettings,
    },
    /// Pins two anchors together and aligns the hinge axes
    Hinge {
        a: BodyHandle,
        b: BodyHandle,
        local_offset_a: Vec3,
        local_offset_b: Vec3,
        local_hinge_axis_a: Vec3,
        local_hinge_axis_b: Vec3,
        spring: SpringSettings,
    },
    /// Aligns the hinge axes without constraining position
    AngularHinge {
        a: BodyHandle,
        b: BodyHandle,
        local_hinge_axis_a: Vec3,
        local_hinge_axis_b: Vec3,
        spring: SpringSettings,
    },
    /// Pins two anchors together and keeps a swivel axis on `a`
    /// perpendicular to a hinge axis on `b`
    SwivelHinge {
        a: BodyHandle,
        b: BodyHandle,
        local_offset_a: Vec3,
        local_offset_b: Vec3,
        local_swivel_axis_a: Vec3,
        local_hinge_axis_b: Vec3,
        spring: SpringSettings,
    },
}

impl ConstraintDescription {
    /// Bodies referenced by this constraint
    pub fn bodies(&self) -> ArrayVec<BodyHandle, 2> {
        let mut bodies = ArrayVec::new();
        match *self {
            ConstraintDescription::OneBodyLinearServo { body, .. }
            | ConstraintDescription::OneBodyAngularServo { body, .. } => bodies.push(body),
            ConstraintDescription::DistanceLimit { a, b, .. }
            | ConstraintDescription::BallSocket { a, b, .. }
            | ConstraintDescription::Hinge { a, b, .. }
            | ConstraintDescription::AngularHinge { a, b, .. }
            | ConstraintDescription::SwivelHinge { a, b, .. } => {
                bodies.push(a);
                bodies.push(b);
            }
        }
        bodies
    }
}

/// Closest ray hit reported by the solver
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct RayHit {
    pub collidable: CollidableHandle,
    /// Distance along the (normalized) ray direction
    pub t: f32,
    pub normal: Vec3,
}

/// Messages one narrow-phase worker produced during a timestep
///
/// Backends create one per worker, hand it to every
/// [`NarrowPhaseCallbacks::configure_contact_manifold`] call that worker
/// makes, and return them from [`RigidBodySolver::timestep`] in worker
/// order. Only the bridge reads the contents.
#[derive(Debug, Default)]
pub struct WorkerOutput {
    pub(crate) contacts: ContactBatch,
    pub(crate) supports: SupportBatch,
}

impl WorkerOutput {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn is_empty(&self) -> bool {
        self.contacts.is_empty() && self.supports.is_empty()
    }
}

/// Hooks the solver calls while generating contacts
///
/// Called concurrently from solver workers. Everything a call records goes
/// to the calling worker's own [`WorkerOutput`].
pub trait NarrowPhaseCallbacks: Sync {
    /// Decide whether the pair should produce contacts at all
    fn allow_contact_generation(&self, a: CollidableHandle, b: CollidableHandle) -> bool;

    /// Inspect a finished manifold. Returns the material for a physical
    /// response, or None to keep the contacts without responding to them.
    fn configure_contact_manifold(
        &self,
        output: &mut WorkerOutput,
        pair: CollidablePair,
        manifold: &ContactManifold,
    ) -> Option<PairMaterial>;
}

/// Hook the solver calls to integrate body velocities
pub trait PoseIntegratorCallbacks: Sync {
    fn integrate_velocity(
        &self,
        body: BodyHandle,
        inertia: &BodyInertia,
        velocity: &mut BodyVelocity,
        dt: f32,
    );
}

/// A rigid-body solver backend
pub trait RigidBodySolver: Send {
    fn add_shape(&mut self, shape: ShapeDescription) -> ShapeIndex;
    fn remove_shape(&mut self, shape: ShapeIndex);
    fn shape(&self, shape: ShapeIndex) -> Option<ShapeDescription>;

    fn add_body(&mut self, description: BodyDescription) -> BodyHandle;
    fn remove_body(&mut self, body: BodyHandle);
    fn body_exists(&self, body: BodyHandle) -> bool;

    fn add_static(&mut self, description: StaticDescription) -> StaticHandle;
    fn remove_static(&mut self, handle: StaticHandle);
    fn static_exists(&self, handle: StaticHandle) -> bool;

    fn add_constraint(&mut self, description: ConstraintDescription) -> ConstraintHandle;
    fn update_constraint(&mut self, handle: ConstraintHandle, description: ConstraintDescription);
    fn remove_constraint(&mut self, handle: ConstraintHandle);
    fn constraint_exists(&self, handle: ConstraintHandle) -> bool;
    fn constraint(&self, handle: ConstraintHandle) -> Option<ConstraintDescription>;

    fn body_pose(&self, body: BodyHandle) -> Option<RigidPose>;
    fn set_body_pose(&mut self, body: BodyHandle, pose: RigidPose);
    fn body_velocity(&self, body: BodyHandle) -> Option<BodyVelocity>;
    fn set_body_velocity(&mut self, body: BodyHandle, velocity: BodyVelocity);
    fn body_inertia(&self, body: BodyHandle) -> Option<BodyInertia>;
    fn set_body_inertia(&mut self, body: BodyHandle, inertia: BodyInertia);
    fn apply_linear_impulse(&mut self, body: BodyHandle, impulse: Vec3);
    fn is_body_awake(&self, body: BodyHandle) -> bool;
    fn wake_body(&mut self, body: BodyHandle);
    fn static_pose(&self, handle: StaticHandle) -> Option<RigidPose>;

    /// Advance the simulation by `dt`
    ///
    /// Without a dispatcher all narrow-phase work runs on the calling
    /// thread as a single worker. Returns one [`WorkerOutput`] per worker.
    fn timestep(
        &mut self,
        dt: f32,
        narrow_phase: &dyn NarrowPhaseCallbacks,
        integrator: &dyn PoseIntegratorCallbacks,
        dispatcher: Option<&ThreadDispatcher>,
    ) -> Vec<WorkerOutput>;

    /// Closest hit along a ray among collidables accepted by `filter`
    fn ray_cast(
        &self,
        origin: Vec3,
        direction: Vec3,
        max_distance: f32,
        filter: &dyn Fn(CollidableHandle) -> bool,
    ) -> Option<RayHit>;
}
