//! Physics bridge between a scene graph and a rigid-body solver
//!
//! This crate provides the glue a game layer needs on top of a solver:
//! - Per-collidable property tables (materials, collision settings, tags)
//! - Collision filtering by category and response
//! - Contact event tracking with enter/exit semantics
//! - Character controllers driven from movement goals
//! - A thread-safe event queue drained on the main thread
//! - A small reference solver for running scenes end to end

pub mod callbacks;
pub mod characters;
pub mod collision;
pub mod contacts;
pub mod dispatcher;
pub mod events;
pub mod handle;
pub mod material;
pub mod presets;
pub mod properties;
pub mod reference;
pub mod shapes;
pub mod simulation;
pub mod solver;

// Re-export commonly used types
pub use callbacks::{BridgeNarrowPhase, BridgePoseIntegrator, EventRouter};
pub use characters::{
    CharacterController, CharacterControllers, CharacterDescription, Support, SupportBatch,
};
pub use collision::{
    allow_contact, classify, is_blocking, is_overlap, CollisionCategory, CollisionEnabled,
    CollisionProperty, CollisionResponse, CollisionResponses, ObjectResponses, PairResponse,
    TraceResponses,
};
pub use contacts::{ContactBatch, ContactEventHandler, ContactEvents, SEPARATION_TOLERANCE};
pub use dispatcher::ThreadDispatcher;
pub use events::{ContactData, EventQueue, PhysicsEvent, PhysicsEventKind};
pub use handle::{
    BodyHandle, CollidableHandle, CollidablePair, ConstraintHandle, ShapeIndex, StaticHandle,
};
pub use material::{PairMaterial, PhysicsMaterial, SpringSettings};
pub use presets::{CollisionPreset, CustomPreset};
pub use properties::{
    BodySettings, CollidableProperty, CollidableRecord, ComponentId, Damping, PhysicsTag,
    PropertyTables,
};
pub use reference::ReferenceSolver;
pub use shapes::ShapeDescription;
pub use simulation::{RaycastHit, Simulation, SimulationConfig};
pub use solver::{
    BodyDescription, BodyInertia, BodyVelocity, ConstraintDescription, ContactManifold,
    ContactPoint, ContinuousDetection, FeatureId, NarrowPhaseCallbacks, PoseIntegratorCallbacks,
    RayHit, RigidBodySolver, RigidPose, ServoSettings, StaticDescription, WorkerOutput,
    MAX_CONTACTS,
};
