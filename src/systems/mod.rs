//! Application systems

mod simulation;

pub use simulation::{PhysicsSystem, TickResult, MAX_FRAME_TIME};
