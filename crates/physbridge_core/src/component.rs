//! Physics components attached to entities
//!
//! A [`PhysicsComponent`] is a rigid body, a character or a static
//! collider. It carries everything needed to create its solver collidable; the
//! [`PhysicsProcessor`](crate::PhysicsProcessor) owns it and drives its
//! lifecycle.

use physbridge_math::Vec3;
use physbridge_physics::{
    BodyInertia, CharacterDescription, CollidableHandle, CollisionPreset, ContinuousDetection,
    PhysicsMaterial, RigidPose, ShapeDescription, ShapeIndex,
};
use serde::{Deserialize, Serialize};

use crate::handlers::EventHandlers;
use crate::world::EntityKey;

/// Settings of a simulated rigid body
#[derive(Clone, Copy, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct RigidbodySettings {
    pub mass: f32,
    /// Kinematic bodies have zero inertia and only move by their velocity
    pub kinematic: bool,
    /// Smooth transform sync by blending with the previous pose
    pub interpolate: bool,
    pub sleep_threshold: f32,
    pub speculative_margin: f32,
    pub continuous: ContinuousDetection,
}

impl Default for RigidbodySettings {
    fn default() -> Self {
        Self {
            mass: 1.0,
            kinematic: false,
            interpolate: false,
            sleep_threshold: 0.01,
            speculative_margin: 0.1,
            continuous: ContinuousDetection::Discrete,
        }
    }
}

impl RigidbodySettings {
    pub fn with_mass(mut self, mass: f32) -> Self {
        self.mass = mass;
        self
    }

    pub fn with_kinematic(mut self, kinematic: bool) -> Self {
        self.kinematic = kinematic;
        self
    }

    pub fn with_interpolation(mut self, interpolate: bool) -> Self {
        self.interpolate = interpolate;
        self
    }
}

/// Settings of a body driven by a character controller
#[derive(Clone, Copy, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct CharacterSettings {
    pub mass: f32,
    pub sleep_threshold: f32,
    /// Also how far below the character a support is kept
    pub speculative_margin: f32,
    /// Up direction in the body's local space
    pub local_up: Vec3,
    pub jump_velocity: f32,
    pub maximum_horizontal_force: f32,
    pub maximum_vertical_force: f32,
    /// Steepest walkable slope, in radians
    pub maximum_slope: f32,
    pub minimum_support_depth: f32,
}

impl Default for CharacterSettings {
    fn default() -> Self {
        Self {
            mass: 1.0,
            sleep_threshold: 0.01,
            speculative_margin: 0.1,
            local_up: Vec3::Y,
            jump_velocity: 6.0,
            maximum_horizontal_force: 20.0,
            maximum_vertical_force: 100.0,
            maximum_slope: std::f32::consts::FRAC_PI_4,
            minimum_support_depth: -0.0035,
        }
    }
}

impl CharacterSettings {
    pub fn with_mass(mut self, mass: f32) -> Self {
        self.mass = mass;
        self
    }

    pub fn with_jump_velocity(mut self, velocity: f32) -> Self {
        self.jump_velocity = velocity;
        self
    }

    pub fn with_maximum_slope(mut self, angle: f32) -> Self {
        self.maximum_slope = angle;
        self
    }

    /// Linear-only inertia; characters never rotate from contacts
    pub fn inertia(&self) -> BodyInertia {
        if self.mass <= 0.0 {
            return BodyInertia::KINEMATIC;
        }
        BodyInertia {
            inverse_mass: 1.0 / self.mass,
            inverse_inertia: Vec3::ZERO,
        }
    }

    /// Controller tuning for the solver side
    pub fn description(&self) -> CharacterDescription {
        CharacterDescription {
            local_up: self.local_up,
            jump_velocity: self.jump_velocity,
            maximum_horizontal_force: self.maximum_horizontal_force,
            maximum_vertical_force: self.maximum_vertical_force,
            minimum_support_depth: self.minimum_support_depth,
            ..CharacterDescription::default()
        }
        .with_maximum_slope(self.maximum_slope)
        .with_speculative_margin(self.speculative_margin)
    }
}

/// What kind of collidable a component creates
#[derive(Clone, Copy, Debug, PartialEq)]
pub enum ComponentKind {
    Rigidbody(RigidbodySettings),
    /// A dynamic body steered by a character controller
    Character(CharacterSettings),
    StaticCollider,
}

/// Lifecycle state of a component
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub enum ComponentState {
    /// No solver collidable
    #[default]
    Unattached,
    /// Live in the solver
    Attached,
    /// Still live, removed at the next removal flush unless re-attached
    PendingRemoval,
    /// Removed by a flush; may be attached again
    Removed,
}

/// Why a component could not be attached
#[derive(Clone, Debug, PartialEq)]
pub enum AttachError {
    /// No collider shape to build a collidable from
    MissingShape,
    /// Several collider shapes; only single shapes are supported
    CompoundShape { count: usize },
    /// The owning entity is no longer in the world
    MissingEntity,
    /// The processor does not own a component with this id
    UnknownComponent,
}

impl std::fmt::Display for AttachError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            AttachError::MissingShape => write!(f, "physics component has no collider shape"),
            AttachError::CompoundShape { count } => {
                write!(f, "physics component has {} collider shapes, expected one", count)
            }
            AttachError::MissingEntity => write!(f, "physics component's entity no longer exists"),
            AttachError::UnknownComponent => write!(f, "no such physics component"),
        }
    }
}

impl std::error::Error for AttachError {}

/// Blend state for interpolated transform sync
#[derive(Clone, Copy, Debug, Default, PartialEq)]
pub(crate) struct Interpolation {
    pub previous: Option<RigidPose>,
}

impl Interpolation {
    /// Halfway between the last synced pose and `current`
    ///
    /// The first call has nothing to blend with and returns `current`.
    pub fn advance(&mut self, current: RigidPose) -> RigidPose {
        let previous = self.previous.unwrap_or(current);
        self.previous = Some(current);
        RigidPose::new(
            previous.position.lerp(current.position, 0.5),
            previous.orientation.nlerp(&current.orientation, 0.5),
        )
    }
}

/// Entity-facing physics component
#[derive(Debug)]
pub struct PhysicsComponent {
    /// Entity whose transform this component drives or follows
    pub entity: EntityKey,
    pub kind: ComponentKind,
    /// Shape descriptions to compose the collider from
    pub collider_shapes: Vec<ShapeDescription>,
    /// Explicit shape; takes precedence over `collider_shapes`
    pub collider_shape: Option<ShapeDescription>,
    pub preset: CollisionPreset,
    pub generate_overlap_events: bool,
    pub material: PhysicsMaterial,
    pub(crate) handlers: EventHandlers,
    pub(crate) state: ComponentState,
    pub(crate) handle: Option<CollidableHandle>,
    pub(crate) shape_index: Option<ShapeIndex>,
    pub(crate) interpolation: Interpolation,
}

impl PhysicsComponent {
    fn new(entity: EntityKey, kind: ComponentKind, preset: CollisionPreset) -> Self {
        Self {
            entity,
            kind,
            collider_shapes: Vec::new(),
            collider_shape: None,
            preset,
            generate_overlap_events: false,
            material: PhysicsMaterial::default(),
            handlers: EventHandlers::new(),
            state: ComponentState::Unattached,
            handle: None,
            shape_index: None,
            interpolation: Interpolation::default(),
        }
    }

    /// A dynamic body using the physics actor preset
    pub fn rigidbody(entity: EntityKey, settings: RigidbodySettings) -> Self {
        Self::new(entity, ComponentKind::Rigidbody(settings), CollisionPreset::PhysicsActor)
    }

    /// A character body using the pawn preset
    pub fn character(entity: EntityKey, settings: CharacterSettings) -> Self {
        Self::new(entity, ComponentKind::Character(settings), CollisionPreset::Pawn)
    }

    /// An immovable collider using the default preset
    pub fn static_collider(entity: EntityKey) -> Self {
        Self::new(entity, ComponentKind::StaticCollider, CollisionPreset::Default)
    }

    /// Add a collider shape
    pub fn with_shape(mut self, shape: ShapeDescription) -> Self {
        self.collider_shapes.push(shape);
        self
    }

    pub fn with_preset(mut self, preset: CollisionPreset) -> Self {
        self.preset = preset;
        self
    }

    pub fn with_overlap_events(mut self, enabled: bool) -> Self {
        self.generate_overlap_events = enabled;
        self
    }

    pub fn with_material(mut self, material: PhysicsMaterial) -> Self {
        self.material = material;
        self
    }

    pub fn state(&self) -> ComponentState {
        self.state
    }

    /// True while the component has a live collidable
    pub fn is_attached(&self) -> bool {
        matches!(self.state, ComponentState::Attached | ComponentState::PendingRemoval)
    }

    /// The solver collidable, while attached
    pub fn handle(&self) -> Option<CollidableHandle> {
        self.handle
    }

    pub fn is_rigidbody(&self) -> bool {
        matches!(self.kind, ComponentKind::Rigidbody(_))
    }

    pub fn is_character(&self) -> bool {
        matches!(self.kind, ComponentKind::Character(_))
    }

    pub fn rigidbody_settings(&self) -> Option<&RigidbodySettings> {
        match &self.kind {
            ComponentKind::Rigidbody(settings) => Some(settings),
            _ => None,
        }
    }

    pub fn character_settings(&self) -> Option<&CharacterSettings> {
        match &self.kind {
            ComponentKind::Character(settings) => Some(settings),
            _ => None,
        }
    }

    pub fn handlers(&self) -> &EventHandlers {
        &self.handlers
    }

    /// The single shape this component's collidable is built from
    pub fn resolve_shape(&self) -> Result<ShapeDescription, AttachError> {
        if let Some(shape) = self.collider_shape {
            return Ok(shape);
        }
        match self.collider_shapes.as_slice() {
            [] => Err(AttachError::MissingShape),
            [shape] => Ok(*shape),
            shapes => Err(AttachError::CompoundShape { count: shapes.len() }),
        }
    }
}
