//! physbridge - physics bridge between a scene graph and a rigid-body solver
//!
//! The library exposes the application configuration and the per-frame
//! physics system; the bridge itself lives in `physbridge_physics` and
//! `physbridge_core`.

pub mod config;
pub mod systems;
