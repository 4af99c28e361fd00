//! Entity-side physics for physbridge
//!
//! This crate connects a minimal scene graph to the simulation:
//!
//! - [`Transform`] - Position, rotation, and scale of an entity
//! - [`Entity`] - An object in the world, optionally linked to a physics component
//! - [`World`] - Container for all entities
//! - [`PhysicsComponent`] - Rigid body, character or static collider with typed event handlers
//! - [`ConstraintComponent`] - Joint between physics components
//! - [`PhysicsProcessor`] - Attaches components to the simulation and keeps them in sync
//! - [`Scene`] - Loadable/saveable scene of entity templates

mod character;
mod component;
mod constraint;
mod debug;
mod entity;
mod handlers;
mod hit;
mod processor;
mod rigidbody;
mod scene;
mod transform;
mod world;

pub use character::Character;
pub use component::{
    AttachError, CharacterSettings, ComponentKind, ComponentState, PhysicsComponent,
    RigidbodySettings,
};
pub use constraint::{ConstraintComponent, ConstraintError, ConstraintId, Joint, ServoLimits};
pub use debug::{ColliderVisual, DebugScene};
pub use entity::{DirtyFlags, Entity};
pub use handlers::{
    ColliderEvent, ColliderHandler, CommandSender, ContactEvent, ContactHandler, EventHandlers,
    Handler, HandlerId, LifecycleCommand,
};
pub use hit::HitResult;
pub use processor::PhysicsProcessor;
pub use rigidbody::Rigidbody;
pub use scene::{
    EntityTemplate, PhysicsKind, PhysicsTemplate, Scene, SceneLoadError, SceneSaveError,
};
pub use transform::Transform;
pub use world::{EntityKey, World};

// Re-export the physics types components are configured with
pub use physbridge_physics::{
    CollisionPreset, ComponentId, ContactData, PhysicsEventKind, PhysicsMaterial, ShapeDescription,
    SpringSettings,
};
