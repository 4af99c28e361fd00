//! The simulation: a solver plus everything the bridge keeps beside it

use physbridge_math::{Vec2, Vec3};

use crate::callbacks::{BridgeNarrowPhase, BridgePoseIntegrator, EventRouter};
use crate::characters::{CharacterController, CharacterControllers, CharacterDescription};
use crate::collision::CollisionProperty;
use crate::contacts::ContactEvents;
use crate::dispatcher::ThreadDispatcher;
use crate::events::{EventQueue, PhysicsEvent};
use crate::handle::{BodyHandle, CollidableHandle, ConstraintHandle, ShapeIndex, StaticHandle};
use crate::material::PhysicsMaterial;
use crate::properties::{BodySettings, CollidableRecord, ComponentId, Damping, PropertyTables};
use crate::shapes::ShapeDescription;
use crate::solver::{
    BodyDescription, BodyInertia, BodyVelocity, ConstraintDescription, RigidBodySolver, RigidPose,
    StaticDescription,
};

/// Configuration for the simulation
#[derive(Clone, Debug, PartialEq)]
pub struct SimulationConfig {
    /// Gravity applied to bodies without an override
    pub gravity: Vec3,
    /// Damping applied to bodies without an override
    pub damping: Damping,
    /// Step length used regardless of frame time, when set
    pub fixed_timestep: Option<f32>,
    /// Narrow-phase worker threads; 0 runs everything on the calling thread
    pub worker_threads: usize,
    /// Freeze the simulation: nothing attaches and nothing steps
    pub disabled: bool,
}

impl Default for SimulationConfig {
    fn default() -> Self {
        Self {
            gravity: Vec3::new(0.0, -9.81, 0.0),
            damping: Damping::default(),
            fixed_timestep: Some(1.0 / 60.0),
            worker_threads: 0,
            disabled: false,
        }
    }
}

impl SimulationConfig {
    pub fn with_gravity(mut self, gravity: Vec3) -> Self {
        self.gravity = gravity;
        self
    }

    pub fn with_damping(mut self, damping: Damping) -> Self {
        self.damping = damping;
        self
    }

    pub fn with_fixed_timestep(mut self, step: Option<f32>) -> Self {
        self.fixed_timestep = step;
        self
    }

    pub fn with_worker_threads(mut self, threads: usize) -> Self {
        self.worker_threads = threads;
        self
    }

    pub fn with_disabled(mut self, disabled: bool) -> Self {
        self.disabled = disabled;
        self
    }
}

/// Result of [`Simulation::raycast`]
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct RaycastHit {
    pub collidable: CollidableHandle,
    pub component: ComponentId,
    pub point: Vec3,
    pub normal: Vec3,
    pub distance: f32,
}

/// A rigid-body solver together with the bridge's tables and event tracking
///
/// The tables, tracker, characters and queue are owned here for the
/// simulation's whole lifetime; other code reaches them by handle only.
pub struct Simulation {
    solver: Box<dyn RigidBodySolver>,
    dispatcher: Option<ThreadDispatcher>,
    tables: PropertyTables,
    contacts: ContactEvents,
    characters: CharacterControllers,
    events: EventQueue,
    config: SimulationConfig,
}

impl Simulation {
    /// Create a simulation driving `solver`
    ///
    /// Falls back to single-threaded stepping if the worker pool cannot be
    /// built.
    pub fn new(solver: Box<dyn RigidBodySolver>, config: SimulationConfig) -> Self {
        let dispatcher = match config.worker_threads {
            0 => None,
            n => match ThreadDispatcher::new(n) {
                Ok(dispatcher) => Some(dispatcher),
                Err(e) => {
                    log::warn!(
                        "Could not start {} physics workers, stepping single-threaded: {}",
                        n,
                        e
                    );
                    None
                }
            },
        };
        let worker_count = dispatcher.as_ref().map_or(1, ThreadDispatcher::thread_count);
        log::debug!("Simulation created with {} narrow-phase worker(s)", worker_count);

        Self {
            solver,
            dispatcher,
            tables: PropertyTables::new(),
            contacts: ContactEvents::new(),
            characters: CharacterControllers::new(),
            events: EventQueue::new(),
            config,
        }
    }

    pub fn config(&self) -> &SimulationConfig {
        &self.config
    }

    pub fn is_disabled(&self) -> bool {
        self.config.disabled
    }

    pub fn set_gravity(&mut self, gravity: Vec3) {
        self.config.gravity = gravity;
    }

    pub fn solver(&self) -> &dyn RigidBodySolver {
        self.solver.as_ref()
    }

    pub fn solver_mut(&mut self) -> &mut dyn RigidBodySolver {
        self.solver.as_mut()
    }

    pub fn tables(&self) -> &PropertyTables {
        &self.tables
    }

    pub fn contacts(&self) -> &ContactEvents {
        &self.contacts
    }

    pub fn characters(&self) -> &CharacterControllers {
        &self.characters
    }

    // --- Shapes ---

    pub fn add_shape(&mut self, shape: ShapeDescription) -> ShapeIndex {
        self.solver.add_shape(shape)
    }

    pub fn remove_shape(&mut self, shape: ShapeIndex) {
        self.solver.remove_shape(shape);
    }

    // --- Collidables ---

    /// Add a body and populate its tables
    ///
    /// Registers the body as a contact listener if its filter asks for events.
    pub fn add_body(
        &mut self,
        description: BodyDescription,
        record: CollidableRecord,
    ) -> BodyHandle {
        let body = self.solver.add_body(description);
        self.register(body.into(), record);
        body
    }

    /// Add a static and populate its tables
    pub fn add_static(
        &mut self,
        description: StaticDescription,
        record: CollidableRecord,
    ) -> StaticHandle {
        let handle = self.solver.add_static(description);
        self.register(handle.into(), record);
        handle
    }

    fn register(&mut self, handle: CollidableHandle, record: CollidableRecord) {
        self.tables.allocate(handle, record);
        if record.collision.generate_overlap_events {
            self.contacts.register_listener(handle);
        }
        log::trace!("Registered collidable {}", handle);
    }

    /// Remove a collidable: tracker first, then tables, then the solver
    ///
    /// Listeners still touching the collidable get a final exit, posted
    /// while both sides' tags still resolve. Nothing keyed by `handle`
    /// survives, so a collidable that later reuses it starts clean.
    pub fn remove_collidable(&mut self, handle: CollidableHandle) {
        if self.contacts.is_listener(handle) {
            self.contacts.unregister_listener(handle);
        }
        let router = EventRouter::new(&self.tables.tags, self.events.sender());
        self.contacts.forget_collidable(handle, &router);
        if let CollidableHandle::Body(body) = handle {
            self.characters.remove(body);
        }
        self.tables.remove(handle);
        match handle {
            CollidableHandle::Body(body) => self.solver.remove_body(body),
            CollidableHandle::Static(stat) => self.solver.remove_static(stat),
        }
        log::trace!("Removed collidable {}", handle);
    }

    /// Check whether the solver still knows `handle`
    pub fn collidable_exists(&self, handle: CollidableHandle) -> bool {
        match handle {
            CollidableHandle::Body(body) => self.solver.body_exists(body),
            CollidableHandle::Static(stat) => self.solver.static_exists(stat),
        }
    }

    /// Start routing contact events for an existing collidable
    pub fn register_overlap_listener(&mut self, handle: CollidableHandle) {
        self.tables.collision[handle].generate_overlap_events = true;
        self.contacts.register_listener(handle);
    }

    /// Stop routing contact events for a collidable
    ///
    /// # Panics
    /// In debug builds, panics if `handle` is not a listener.
    pub fn unregister_overlap_listener(&mut self, handle: CollidableHandle) {
        if let Some(collision) = self.tables.collision.try_get_mut(handle) {
            collision.generate_overlap_events = false;
        }
        self.contacts.unregister_listener(handle);
    }

    // --- Table access ---

    pub fn material(&self, handle: CollidableHandle) -> &PhysicsMaterial {
        &self.tables.materials[handle]
    }

    pub fn set_material(&mut self, handle: CollidableHandle, material: PhysicsMaterial) {
        self.tables.materials[handle] = material;
    }

    pub fn collision_property(&self, handle: CollidableHandle) -> &CollisionProperty {
        &self.tables.collision[handle]
    }

    pub fn body_settings(&self, body: BodyHandle) -> &BodySettings {
        &self.tables.body_settings[body.into()]
    }

    /// Owning component of a collidable, if its tables are still allocated
    pub fn component(&self, handle: CollidableHandle) -> Option<ComponentId> {
        self.tables.component(handle)
    }

    /// Override gravity for one body; None restores the global gravity
    pub fn set_custom_gravity(&mut self, body: BodyHandle, gravity: Option<Vec3>) {
        self.tables.body_settings[body.into()].custom_gravity = gravity;
    }

    /// Override damping for one body; None restores the global damping
    pub fn set_custom_damping(&mut self, body: BodyHandle, damping: Option<Damping>) {
        self.tables.body_settings[body.into()].custom_damping = damping;
    }

    // --- Body state ---

    pub fn body_pose(&self, body: BodyHandle) -> Option<RigidPose> {
        self.solver.body_pose(body)
    }

    pub fn set_body_pose(&mut self, body: BodyHandle, pose: RigidPose) {
        self.solver.set_body_pose(body, pose);
    }

    pub fn body_velocity(&self, body: BodyHandle) -> Option<BodyVelocity> {
        self.solver.body_velocity(body)
    }

    pub fn body_inertia(&self, body: BodyHandle) -> Option<BodyInertia> {
        self.solver.body_inertia(body)
    }

    pub fn set_body_inertia(&mut self, body: BodyHandle, inertia: BodyInertia) {
        self.solver.set_body_inertia(body, inertia);
    }

    pub fn set_body_velocity(&mut self, body: BodyHandle, velocity: BodyVelocity) {
        self.solver.set_body_velocity(body, velocity);
    }

    /// Apply an impulse at the center of mass, waking the body
    pub fn apply_linear_impulse(&mut self, body: BodyHandle, impulse: Vec3) {
        self.solver.wake_body(body);
        self.solver.apply_linear_impulse(body, impulse);
    }

    pub fn wake_body(&mut self, body: BodyHandle) {
        self.solver.wake_body(body);
    }

    pub fn is_body_awake(&self, body: BodyHandle) -> bool {
        self.solver.is_body_awake(body)
    }

    pub fn static_pose(&self, handle: StaticHandle) -> Option<RigidPose> {
        self.solver.static_pose(handle)
    }

    // --- Constraints ---

    pub fn add_constraint(&mut self, description: ConstraintDescription) -> ConstraintHandle {
        self.solver.add_constraint(description)
    }

    pub fn update_constraint(
        &mut self,
        handle: ConstraintHandle,
        description: ConstraintDescription,
    ) {
        self.solver.update_constraint(handle, description);
    }

    pub fn remove_constraint(&mut self, handle: ConstraintHandle) {
        self.solver.remove_constraint(handle);
    }

    pub fn constraint_exists(&self, handle: ConstraintHandle) -> bool {
        self.solver.constraint_exists(handle)
    }

    pub fn constraint(&self, handle: ConstraintHandle) -> Option<ConstraintDescription> {
        self.solver.constraint(handle)
    }

    // --- Characters ---

    /// Drive `body` as a character
    pub fn add_character(
        &mut self,
        body: BodyHandle,
        description: CharacterDescription,
    ) -> &mut CharacterController {
        log::trace!("Character controller allocated for {:?}", body);
        self.characters.allocate(body, description)
    }

    /// Stop driving `body`; returns false if it was not a character
    pub fn remove_character(&mut self, body: BodyHandle) -> bool {
        self.characters.remove(body).is_some()
    }

    pub fn character(&self, body: BodyHandle) -> Option<&CharacterController> {
        self.characters.get(body)
    }

    pub fn character_mut(&mut self, body: BodyHandle) -> Option<&mut CharacterController> {
        self.characters.get_mut(body)
    }

    /// Set a character's movement goals
    ///
    /// A sleeping character is woken when the new goals would move it.
    pub fn move_character(
        &mut self,
        body: BodyHandle,
        target_velocity: Vec2,
        view_direction: Vec3,
    ) {
        let Some(character) = self.characters.get_mut(body) else {
            log::warn!("Cannot move {:?}: not a character", body);
            return;
        };
        let changed = (character.try_jump && character.is_supported())
            || character.target_velocity != target_velocity
            || (target_velocity != Vec2::ZERO && character.view_direction != view_direction);
        character.target_velocity = target_velocity;
        character.view_direction = view_direction;
        if changed && !self.solver.is_body_awake(body) {
            self.solver.wake_body(body);
        }
    }

    /// Jump at the next step if the character is supported by then
    pub fn jump_character(&mut self, body: BodyHandle) {
        let Some(character) = self.characters.get_mut(body) else {
            log::warn!("Cannot jump {:?}: not a character", body);
            return;
        };
        character.try_jump = true;
        if character.is_supported() && !self.solver.is_body_awake(body) {
            self.solver.wake_body(body);
        }
    }

    // --- Stepping ---

    /// Advance the solver and finalize contact tracking
    ///
    /// Steps by the fixed timestep when one is configured, otherwise by
    /// `dt`. Does nothing while disabled or for a non-positive `dt`.
    pub fn simulate(&mut self, dt: f32) {
        if self.config.disabled || dt <= 0.0 {
            return;
        }
        let step = self.config.fixed_timestep.unwrap_or(dt);

        self.characters.apply_motion(self.solver.as_mut(), step);

        let router = EventRouter::new(&self.tables.tags, self.events.sender());
        let narrow_phase =
            BridgeNarrowPhase::new(&self.tables, &self.contacts, &self.characters, router);
        let integrator = BridgePoseIntegrator::new(
            &self.tables.body_settings,
            self.config.gravity,
            self.config.damping,
        );
        let outputs =
            self.solver
                .timestep(step, &narrow_phase, &integrator, self.dispatcher.as_ref());

        let (contacts, supports): (Vec<_>, Vec<_>) =
            outputs.into_iter().map(|output| (output.contacts, output.supports)).unzip();
        let solver = &self.solver;
        let body_asleep =
            |body: BodyHandle| solver.body_exists(body) && !solver.is_body_awake(body);
        let is_asleep = |handle: CollidableHandle| handle.body().is_some_and(body_asleep);
        self.contacts.flush(contacts, is_asleep, &router);
        self.characters.update_supports(supports, body_asleep);
    }

    /// Closest hit along a ray among collidables that block traces
    ///
    /// `direction` is normalized, so the reported distance is in world
    /// units. Hits at distance zero (ray starting inside a shape) are
    /// ignored by the solver.
    pub fn raycast(
        &self,
        origin: Vec3,
        direction: Vec3,
        max_distance: f32,
    ) -> Option<RaycastHit> {
        let direction = direction.normalized();
        if direction == Vec3::ZERO || max_distance <= 0.0 {
            return None;
        }
        let collision = &self.tables.collision;
        let filter = |handle: CollidableHandle| {
            collision.try_get(handle).is_some_and(CollisionProperty::blocks_trace)
        };
        let hit = self.solver.ray_cast(origin, direction, max_distance, &filter)?;
        let component = self.tables.component(hit.collidable)?;
        Some(RaycastHit {
            collidable: hit.collidable,
            component,
            point: origin + direction * hit.t,
            normal: hit.normal,
            distance: hit.t,
        })
    }

    /// Take every event queued since the last drain
    pub fn drain_events(&self) -> Vec<PhysicsEvent> {
        self.events.drain()
    }

    /// Number of events waiting to be drained
    pub fn pending_event_count(&self) -> usize {
        self.events.len()
    }
}
