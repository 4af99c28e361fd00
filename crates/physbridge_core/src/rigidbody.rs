//! Runtime access to an attached rigid body

use physbridge_math::{Quat, Vec3};
use physbridge_physics::{BodyHandle, BodyVelocity, Damping, Simulation};

/// Borrowed view of one attached body
///
/// Obtained from [`PhysicsProcessor::rigidbody`](crate::PhysicsProcessor::rigidbody).
/// Setters write straight to the solver and wake the body.
pub struct Rigidbody<'a> {
    simulation: &'a mut Simulation,
    body: BodyHandle,
}

impl<'a> Rigidbody<'a> {
    pub(crate) fn new(simulation: &'a mut Simulation, body: BodyHandle) -> Self {
        Self { simulation, body }
    }

    pub fn handle(&self) -> BodyHandle {
        self.body
    }

    pub fn position(&self) -> Vec3 {
        self.simulation
            .body_pose(self.body)
            .map(|pose| pose.position)
            .unwrap_or_default()
    }

    pub fn set_position(&mut self, position: Vec3) {
        if let Some(mut pose) = self.simulation.body_pose(self.body) {
            pose.position = position;
            self.simulation.set_body_pose(self.body, pose);
        }
    }

    pub fn rotation(&self) -> Quat {
        self.simulation
            .body_pose(self.body)
            .map(|pose| pose.orientation)
            .unwrap_or_default()
    }

    pub fn set_rotation(&mut self, rotation: Quat) {
        if let Some(mut pose) = self.simulation.body_pose(self.body) {
            pose.orientation = rotation.normalize();
            self.simulation.set_body_pose(self.body, pose);
        }
    }

    fn velocity(&self) -> BodyVelocity {
        self.simulation.body_velocity(self.body).unwrap_or_default()
    }

    pub fn linear_velocity(&self) -> Vec3 {
        self.velocity().linear
    }

    pub fn set_linear_velocity(&mut self, linear: Vec3) {
        let velocity = BodyVelocity { linear, ..self.velocity() };
        self.simulation.set_body_velocity(self.body, velocity);
    }

    pub fn angular_velocity(&self) -> Vec3 {
        self.velocity().angular
    }

    pub fn set_angular_velocity(&mut self, angular: Vec3) {
        let velocity = BodyVelocity { angular, ..self.velocity() };
        self.simulation.set_body_velocity(self.body, velocity);
    }

    /// Apply an impulse at the center of mass, waking the body
    pub fn apply_linear_impulse(&mut self, impulse: Vec3) {
        self.simulation.apply_linear_impulse(self.body, impulse);
    }

    pub fn wake(&mut self) {
        self.simulation.wake_body(self.body);
    }

    pub fn is_awake(&self) -> bool {
        self.simulation.is_body_awake(self.body)
    }

    /// Override gravity for this body; `None` restores the simulation's gravity
    pub fn set_gravity(&mut self, gravity: Option<Vec3>) {
        self.simulation.set_custom_gravity(self.body, gravity);
    }

    /// Override damping for this body; `None` restores the simulation's damping
    pub fn set_damping(&mut self, damping: Option<Damping>) {
        self.simulation.set_custom_damping(self.body, damping);
    }

    pub fn gravity(&self) -> Vec3 {
        self.simulation
            .body_settings(self.body)
            .custom_gravity
            .unwrap_or(self.simulation.config().gravity)
    }
}
