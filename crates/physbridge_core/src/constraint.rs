//! Constraint components
//!
//! A [`ConstraintComponent`] joins one or two physics components. The
//! processor resolves the components to their solver bodies when the
//! constraint is attached, and rebuilds the solver constraint whenever the
//! component is edited while live.

use arrayvec::ArrayVec;
use physbridge_math::{Quat, Vec3};
use physbridge_physics::{
    BodyHandle, BodyInertia, ComponentId, ConstraintDescription, ConstraintHandle, ServoSettings,
    SpringSettings,
};
use slotmap::new_key_type;

use crate::component::ComponentState;

new_key_type! {
    /// Key of a constraint component owned by the processor
    pub struct ConstraintId;
}

/// How a constraint joins its bodies
#[derive(Clone, Copy, Debug, PartialEq)]
pub enum Joint {
    /// Pins two anchors together and aligns the hinge axes
    Hinge {
        body_a: ComponentId,
        body_b: ComponentId,
        local_offset_a: Vec3,
        local_offset_b: Vec3,
        local_hinge_axis_a: Vec3,
        local_hinge_axis_b: Vec3,
    },
    /// Aligns the hinge axes only
    AngularHinge {
        body_a: ComponentId,
        body_b: ComponentId,
        local_hinge_axis_a: Vec3,
        local_hinge_axis_b: Vec3,
    },
    /// Pins two anchors together; the swivel axis of `a` stays
    /// perpendicular to the hinge axis of `b`
    SwivelHinge {
        body_a: ComponentId,
        body_b: ComponentId,
        local_offset_a: Vec3,
        local_offset_b: Vec3,
        local_swivel_axis_a: Vec3,
        local_hinge_axis_b: Vec3,
    },
    BallSocket {
        body_a: ComponentId,
        body_b: ComponentId,
        local_offset_a: Vec3,
        local_offset_b: Vec3,
    },
    DistanceLimit {
        body_a: ComponentId,
        body_b: ComponentId,
        local_offset_a: Vec3,
        local_offset_b: Vec3,
        min_distance: f32,
        max_distance: f32,
    },
    /// Pulls a point on the body toward a world-space target
    OneBodyLinearServo {
        body: ComponentId,
        local_offset: Vec3,
        target: Vec3,
    },
    /// Turns the body toward a world-space orientation
    OneBodyAngularServo {
        body: ComponentId,
        target_orientation: Quat,
    },
}

impl Joint {
    /// Components this joint references, in `a`, `b` order
    pub fn bodies(&self) -> ArrayVec<ComponentId, 2> {
        let mut bodies = ArrayVec::new();
        match *self {
            Joint::OneBodyLinearServo { body, .. } | Joint::OneBodyAngularServo { body, .. } => {
                bodies.push(body)
            }
            Joint::Hinge { body_a, body_b, .. }
            | Joint::AngularHinge { body_a, body_b, .. }
            | Joint::SwivelHinge { body_a, body_b, .. }
            | Joint::BallSocket { body_a, body_b, .. }
            | Joint::DistanceLimit { body_a, body_b, .. } => {
                bodies.push(body_a);
                bodies.push(body_b);
            }
        }
        bodies
    }

    pub fn references(&self, component: ComponentId) -> bool {
        self.bodies().contains(&component)
    }

    pub fn is_servo(&self) -> bool {
        matches!(
            self,
            Joint::OneBodyLinearServo { .. } | Joint::OneBodyAngularServo { .. }
        )
    }
}

/// Speed limits of a servo; the force limit follows the body's mass
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct ServoLimits {
    pub max_speed: f32,
    pub base_speed: f32,
}

impl Default for ServoLimits {
    fn default() -> Self {
        Self {
            max_speed: f32::MAX,
            base_speed: 0.0,
        }
    }
}

impl ServoLimits {
    /// Servo settings for a body with `inertia`
    ///
    /// The force limit is `360 / inverse_mass`; kinematic bodies get an
    /// unbounded one.
    pub fn settings(&self, inertia: BodyInertia) -> ServoSettings {
        let max_force = if inertia.inverse_mass > 0.0 {
            360.0 / inertia.inverse_mass
        } else {
            f32::MAX
        };
        ServoSettings::new(self.max_speed, self.base_speed, max_force)
    }
}

/// Why a constraint could not be attached or updated
#[derive(Clone, Debug, PartialEq)]
pub enum ConstraintError {
    /// The processor does not own a constraint with this id
    UnknownConstraint,
    /// A referenced component is missing or has no live collidable
    BodyNotAttached(ComponentId),
    /// A referenced component is a static collider
    NotABody(ComponentId),
}

impl std::fmt::Display for ConstraintError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ConstraintError::UnknownConstraint => write!(f, "no such constraint"),
            ConstraintError::BodyNotAttached(id) => {
                write!(f, "constrained component {:?} is not attached", id)
            }
            ConstraintError::NotABody(id) => {
                write!(f, "constrained component {:?} is not a body", id)
            }
        }
    }
}

impl std::error::Error for ConstraintError {}

/// Constraint between physics components
#[derive(Clone, Debug, PartialEq)]
pub struct ConstraintComponent {
    pub joint: Joint,
    pub spring: SpringSettings,
    /// Only used by servo joints
    pub servo: ServoLimits,
    pub(crate) state: ComponentState,
    pub(crate) handle: Option<ConstraintHandle>,
}

impl ConstraintComponent {
    pub fn new(joint: Joint) -> Self {
        Self {
            joint,
            spring: SpringSettings::new(5.0, 2.0),
            servo: ServoLimits::default(),
            state: ComponentState::Unattached,
            handle: None,
        }
    }

    pub fn with_spring(mut self, frequency: f32, damping_ratio: f32) -> Self {
        self.spring = SpringSettings::new(frequency, damping_ratio);
        self
    }

    pub fn with_servo(mut self, max_speed: f32, base_speed: f32) -> Self {
        self.servo = ServoLimits {
            max_speed,
            base_speed,
        };
        self
    }

    pub fn state(&self) -> ComponentState {
        self.state
    }

    /// True while the solver constraint exists
    pub fn is_attached(&self) -> bool {
        matches!(self.state, ComponentState::Attached | ComponentState::PendingRemoval)
    }

    pub fn handle(&self) -> Option<ConstraintHandle> {
        self.handle
    }

    /// Build the solver description, resolving components through `body`
    pub(crate) fn description(
        &self,
        body: impl Fn(ComponentId) -> Result<(BodyHandle, BodyInertia), ConstraintError>,
    ) -> Result<ConstraintDescription, ConstraintError> {
        let spring = self.spring;
        let description = match self.joint {
            Joint::Hinge {
                body_a,
                body_b,
                local_offset_a,
                local_offset_b,
                local_hinge_axis_a,
                local_hinge_axis_b,
            } => ConstraintDescription::Hinge {
                a: body(body_a)?.0,
                b: body(body_b)?.0,
                local_offset_a,
                local_offset_b,
                local_hinge_axis_a,
                local_hinge_axis_b,
                spring,
            },
            Joint::AngularHinge {
                body_a,
                body_b,
                local_hinge_axis_a,
                local_hinge_axis_b,
            } => ConstraintDescription::AngularHinge {
                a: body(body_a)?.0,
                b: body(body_b)?.0,
                local_hinge_axis_a,
                local_hinge_axis_b,
                spring,
            },
            Joint::SwivelHinge {
                body_a,
                body_b,
                local_offset_a,
                local_offset_b,
                local_swivel_axis_a,
                local_hinge_axis_b,
            } => ConstraintDescription::SwivelHinge {
                a: body(body_a)?.0,
                b: body(body_b)?.0,
                local_offset_a,
                local_offset_b,
                local_swivel_axis_a,
                local_hinge_axis_b,
                spring,
            },
            Joint::BallSocket {
                body_a,
                body_b,
                local_offset_a,
                local_offset_b,
            } => ConstraintDescription::BallSocket {
                a: body(body_a)?.0,
                b: body(body_b)?.0,
                local_offset_a,
                local_offset_b,
                spring,
            },
            Joint::DistanceLimit {
                body_a,
                body_b,
                local_offset_a,
                local_offset_b,
                min_distance,
                max_distance,
            } => ConstraintDescription::DistanceLimit {
                a: body(body_a)?.0,
                b: body(body_b)?.0,
                local_offset_a,
                local_offset_b,
                min_distance,
                max_distance,
                spring,
            },
            Joint::OneBodyLinearServo {
                body: component,
                local_offset,
                target,
            } => {
                let (handle, inertia) = body(component)?;
                ConstraintDescription::OneBodyLinearServo {
                    body: handle,
                    local_offset,
                    target,
                    servo: self.servo.settings(inertia),
                    spring,
                }
            }
            Joint::OneBodyAngularServo {
                body: component,
                target_orientation,
            } => {
                let (handle, inertia) = body(component)?;
                ConstraintDescription::OneBodyAngularServo {
                    body: handle,
                    target_orientation,
                    servo: self.servo.settings(inertia),
                    spring,
                }
            }
        };
        Ok(description)
    }
}
