//! Runtime access to an attached character

use physbridge_math::{Vec2, Vec3};
use physbridge_physics::{BodyHandle, Simulation};

use crate::component::CharacterSettings;

/// Borrowed view of one attached character
///
/// Obtained from [`PhysicsProcessor::character`](crate::PhysicsProcessor::character).
pub struct Character<'a> {
    simulation: &'a mut Simulation,
    settings: &'a mut CharacterSettings,
    body: BodyHandle,
}

impl<'a> Character<'a> {
    pub(crate) fn new(
        simulation: &'a mut Simulation,
        settings: &'a mut CharacterSettings,
        body: BodyHandle,
    ) -> Self {
        Self {
            simulation,
            settings,
            body,
        }
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

    pub fn linear_velocity(&self) -> Vec3 {
        self.simulation
            .body_velocity(self.body)
            .map(|velocity| velocity.linear)
            .unwrap_or_default()
    }

    /// Set the movement goals
    ///
    /// `target_velocity.x` strafes to the right of `view_direction` and
    /// `target_velocity.y` moves along it, both projected onto the support.
    pub fn set_movement(&mut self, target_velocity: Vec2, view_direction: Vec3) {
        self.simulation.move_character(self.body, target_velocity, view_direction);
    }

    pub fn target_velocity(&self) -> Vec2 {
        self.simulation
            .character(self.body)
            .map(|c| c.target_velocity)
            .unwrap_or_default()
    }

    /// Jump at the next step, if still supported by then
    pub fn jump(&mut self) {
        self.simulation.jump_character(self.body);
    }

    pub fn is_supported(&self) -> bool {
        self.simulation
            .character(self.body)
            .is_some_and(|c| c.is_supported())
    }

    /// Move the body without touching its velocity
    pub fn teleport(&mut self, position: Vec3) {
        if let Some(mut pose) = self.simulation.body_pose(self.body) {
            pose.position = position;
            self.simulation.set_body_pose(self.body, pose);
        }
    }

    pub fn mass(&self) -> f32 {
        self.settings.mass
    }

    pub fn set_mass(&mut self, mass: f32) {
        self.settings.mass = mass;
        self.reset_inertia();
    }

    /// Restore the linear-only inertia derived from the mass
    pub fn reset_inertia(&mut self) {
        self.simulation.set_body_inertia(self.body, self.settings.inertia());
    }
}
