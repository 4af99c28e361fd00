//! Physics tick system
//!
//! Runs one physics tick per frame, in this order:
//! - Pending removals
//! - Solver timestep
//! - Body transform sync
//! - Event delivery

use std::time::Instant;

use physbridge_core::{PhysicsProcessor, World};

/// Longest frame time fed to the simulation, in seconds
pub const MAX_FRAME_TIME: f32 = 0.25;

/// Result of a physics tick
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct TickResult {
    /// Whether the tick ran at all
    pub stepped: bool,
    /// Handler invocations made while sending events
    pub handlers_invoked: usize,
    /// Whether any entity transform changed
    pub geometry_dirty: bool,
}

/// Drives the physics processor once per frame
pub struct PhysicsSystem {
    last_frame: Instant,
}

impl PhysicsSystem {
    /// Create a new physics system
    pub fn new() -> Self {
        Self {
            last_frame: Instant::now(),
        }
    }

    /// Run one tick using the wall-clock time since the previous call
    pub fn update(&mut self, processor: &mut PhysicsProcessor, world: &mut World) -> TickResult {
        let now = Instant::now();
        let dt = (now - self.last_frame).as_secs_f32();
        self.last_frame = now;
        self.step(processor, world, dt)
    }

    /// Run one tick of length `dt`
    ///
    /// Skipped entirely while the simulation is disabled or for `dt <= 0`.
    /// Frame time is capped at [`MAX_FRAME_TIME`].
    pub fn step(
        &mut self,
        processor: &mut PhysicsProcessor,
        world: &mut World,
        dt: f32,
    ) -> TickResult {
        if processor.simulation().is_disabled() || dt <= 0.0 {
            return TickResult::default();
        }
        let dt = dt.min(MAX_FRAME_TIME);

        processor.update_removals(world);
        processor.simulate(dt);
        processor.update_bodies(world);
        let handlers_invoked = processor.send_events();

        TickResult {
            stepped: true,
            handlers_invoked,
            geometry_dirty: world.iter().any(|(_, entity)| entity.is_dirty()),
        }
    }
}

impl Default for PhysicsSystem {
    fn default() -> Self {
        Self::new()
    }
}
