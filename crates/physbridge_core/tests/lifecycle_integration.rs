//! Integration tests for the component lifecycle
//!
//! A scripted solver replays a fixed contact between two bodies so the
//! tests can check exactly which handlers run on which tick. The reference
//! solver covers transform sync, handle reuse, characters and ray queries.

use std::cell::RefCell;
use std::rc::Rc;

use physbridge_core::{
    CharacterSettings, CollisionPreset, ComponentState, ConstraintComponent, Entity, EntityKey,
    Handler, Joint, PhysicsComponent, PhysicsProcessor, RigidbodySettings, ShapeDescription,
    Transform, World,
};
use physbridge_math::{Vec2, Vec3};
use physbridge_physics::{
    BodyDescription, BodyHandle, BodyInertia, BodyVelocity, CollidableHandle, CollidablePair,
    ComponentId, ConstraintDescription, ConstraintHandle, ContactManifold, ContactPoint, FeatureId,
    NarrowPhaseCallbacks, PoseIntegratorCallbacks, RayHit, ReferenceSolver, RigidBodySolver,
    RigidPose, ShapeIndex, Simulation, SimulationConfig, StaticDescription, StaticHandle,
    ThreadDispatcher, WorkerOutput,
};

// ==================== Scripted solver ====================

/// Two bodies touching on frames `touching`, nothing else
struct ScriptedSolver {
    frame: u32,
    touching: std::ops::RangeInclusive<u32>,
    bodies: Vec<Option<RigidPose>>,
}

impl ScriptedSolver {
    fn new(touching: std::ops::RangeInclusive<u32>) -> Self {
        Self {
            frame: 0,
            touching,
            bodies: Vec::new(),
        }
    }
}

impl RigidBodySolver for ScriptedSolver {
    fn add_shape(&mut self, _: ShapeDescription) -> ShapeIndex {
        ShapeIndex(0)
    }
    fn remove_shape(&mut self, _: ShapeIndex) {}
    fn shape(&self, _: ShapeIndex) -> Option<ShapeDescription> {
        None
    }

    fn add_body(&mut self, description: BodyDescription) -> BodyHandle {
        self.bodies.push(Some(description.pose));
        BodyHandle(self.bodies.len() as u32 - 1)
    }
    fn remove_body(&mut self, body: BodyHandle) {
        self.bodies[body.0 as usize] = None;
    }
    fn body_exists(&self, body: BodyHandle) -> bool {
        self.bodies.get(body.0 as usize).is_some_and(Option::is_some)
    }

    fn add_static(&mut self, _: StaticDescription) -> StaticHandle {
        StaticHandle(0)
    }
    fn remove_static(&mut self, _: StaticHandle) {}
    fn static_exists(&self, _: StaticHandle) -> bool {
        false
    }

    fn add_constraint(&mut self, _: ConstraintDescription) -> ConstraintHandle {
        ConstraintHandle(0)
    }
    fn update_constraint(&mut self, _: ConstraintHandle, _: ConstraintDescription) {}
    fn remove_constraint(&mut self, _: ConstraintHandle) {}
    fn constraint_exists(&self, _: ConstraintHandle) -> bool {
        false
    }
    fn constraint(&self, _: ConstraintHandle) -> Option<ConstraintDescription> {
        None
    }

    fn body_pose(&self, body: BodyHandle) -> Option<RigidPose> {
        self.bodies.get(body.0 as usize).copied().flatten()
    }
    fn set_body_pose(&mut self, body: BodyHandle, pose: RigidPose) {
        self.bodies[body.0 as usize] = Some(pose);
    }
    fn body_velocity(&self, _: BodyHandle) -> Option<BodyVelocity> {
        Some(BodyVelocity::default())
    }
    fn set_body_velocity(&mut self, _: BodyHandle, _: BodyVelocity) {}
    fn body_inertia(&self, _: BodyHandle) -> Option<BodyInertia> {
        Some(BodyInertia::KINEMATIC)
    }
    fn set_body_inertia(&mut self, _: BodyHandle, _: BodyInertia) {}
    fn apply_linear_impulse(&mut self, _: BodyHandle, _: Vec3) {}
    fn is_body_awake(&self, body: BodyHandle) -> bool {
        self.body_exists(body)
    }
    fn wake_body(&mut self, _: BodyHandle) {}
    fn static_pose(&self, _: StaticHandle) -> Option<RigidPose> {
        None
    }

    fn timestep(
        &mut self,
        _dt: f32,
        narrow: &dyn NarrowPhaseCallbacks,
        _integrator: &dyn PoseIntegratorCallbacks,
        _dispatcher: Option<&ThreadDispatcher>,
    ) -> Vec<WorkerOutput> {
        let mut output = WorkerOutput::new();
        self.frame += 1;
        if !self.touching.contains(&self.frame) {
            return vec![output];
        }
        if !self.body_exists(BodyHandle(0)) || !self.body_exists(BodyHandle(1)) {
            return vec![output];
        }
        let pair = CollidablePair::new(BodyHandle(0), BodyHandle(1));
        if narrow.allow_contact_generation(pair.a, pair.b) {
            let contact = ContactPoint::new(Vec3::ZERO, Vec3::Y, 0.02, FeatureId(7));
            let manifold = ContactManifold::new().with_contact(contact);
            narrow.configure_contact_manifold(&mut output, pair, &manifold);
        }
        vec![output]
    }

    fn ray_cast(
        &self,
        _: Vec3,
        _: Vec3,
        _: f32,
        _: &dyn Fn(CollidableHandle) -> bool,
    ) -> Option<RayHit> {
        None
    }
}

type Log = Rc<RefCell<Vec<String>>>;

type Scripted = (PhysicsProcessor, World, [ComponentId; 2], Log);

/// Processor with two attached listening bodies, each logging every event kind
fn scripted(touching: std::ops::RangeInclusive<u32>) -> Scripted {
    let solver = Box::new(ScriptedSolver::new(touching));
    let simulation = Simulation::new(solver, SimulationConfig::default());
    let mut processor = PhysicsProcessor::new(simulation);
    let mut world = World::new();
    let log: Log = Rc::new(RefCell::new(Vec::new()));

    let mut ids = Vec::new();
    for name in ["a", "b"] {
        let entity = world.add_entity(Entity::default().with_name(name));
        let component = PhysicsComponent::rigidbody(entity, RigidbodySettings::default())
            .with_shape(ShapeDescription::sphere(0.5))
            .with_overlap_events(true);
        let id = processor.add(&mut world, component);
        subscribe_all(&mut processor, id, name, &log);
        ids.push(id);
    }
    (processor, world, [ids[0], ids[1]], log)
}

fn subscribe_all(processor: &mut PhysicsProcessor, id: ComponentId, name: &'static str, log: &Log) {
    let sink = log.clone();
    processor.subscribe(
        id,
        Handler::collider_enter(move |_, _| sink.borrow_mut().push(format!("{name}:enter"))),
    );
    let sink = log.clone();
    processor.subscribe(
        id,
        Handler::collider_exit(move |_, _| sink.borrow_mut().push(format!("{name}:exit"))),
    );
    let sink = log.clone();
    processor.subscribe(
        id,
        Handler::contact_added(move |e, _| {
            sink.borrow_mut().push(format!("{name}:added:{}", e.contact.feature_id.0))
        }),
    );
    let sink = log.clone();
    processor.subscribe(
        id,
        Handler::contact_removed(move |e, _| {
            sink.borrow_mut().push(format!("{name}:removed:{}", e.contact.feature_id.0))
        }),
    );
}

fn tick(processor: &mut PhysicsProcessor, world: &mut World) {
    processor.update_removals(world);
    processor.simulate(1.0 / 60.0);
    processor.update_bodies(world);
    processor.send_events();
}

/// Log entries since the last call, sorted so per-side order does not matter
fn take_sorted(log: &Log) -> Vec<String> {
    let mut entries = std::mem::take(&mut *log.borrow_mut());
    entries.sort();
    entries
}

// ==================== Event delivery ====================

#[test]
fn test_both_components_get_enter_and_exit() {
    let (mut processor, mut world, _, log) = scripted(2..=3);

    tick(&mut processor, &mut world);
    assert!(take_sorted(&log).is_empty());

    tick(&mut processor, &mut world);
    assert_eq!(take_sorted(&log), ["a:added:7", "a:enter", "b:added:7", "b:enter"]);

    tick(&mut processor, &mut world);
    assert!(take_sorted(&log).is_empty());

    // A pair that stops reporting retires with an exit only
    tick(&mut processor, &mut world);
    assert_eq!(take_sorted(&log), ["a:exit", "b:exit"]);
}

#[test]
fn test_queued_events_dropped_after_detach() {
    let (mut processor, mut world, [a, _], log) = scripted(1..=5);

    processor.update_removals(&mut world);
    processor.simulate(1.0 / 60.0);
    // Events for `a` are already queued when it is detached
    processor.detach(a);
    processor.update_bodies(&mut world);
    processor.send_events();

    assert_eq!(take_sorted(&log), ["b:added:7", "b:enter"]);
}

#[test]
fn test_handler_removal_applies_next_tick() {
    let (mut processor, mut world, [a, b], log) = scripted(1..=10);
    processor.subscribe(a, Handler::collider_enter(|e, commands| commands.remove(e.acting)));

    tick(&mut processor, &mut world);
    assert_eq!(take_sorted(&log), ["a:added:7", "a:enter", "b:added:7", "b:enter"]);
    assert_eq!(processor.get(a).unwrap().state(), ComponentState::Attached);

    // The removal is applied by this tick's flush. `b` was still touching
    // `a`, so it sees it leave.
    tick(&mut processor, &mut world);
    assert!(processor.get(a).is_none());
    assert_eq!(take_sorted(&log), ["b:exit"]);
    assert_eq!(world.get_by_name("a").unwrap().1.physics, None);

    tick(&mut processor, &mut world);
    assert!(take_sorted(&log).is_empty());
    assert_eq!(processor.get(b).unwrap().state(), ComponentState::Attached);
}

#[test]
fn test_detach_and_reattach_keeps_tracking() {
    let (mut processor, mut world, [a, _], log) = scripted(1..=10);

    tick(&mut processor, &mut world);
    take_sorted(&log);
    let handle = processor.get(a).unwrap().handle();

    // Same tick: no churn, so no exit and no new enter
    processor.detach(a);
    processor.attach(a, &world).unwrap();
    tick(&mut processor, &mut world);
    tick(&mut processor, &mut world);

    assert!(take_sorted(&log).is_empty());
    assert_eq!(processor.get(a).unwrap().handle(), handle);
}

#[test]
fn test_unsubscribed_handler_is_silent() {
    let (mut processor, mut world, [a, _], _) = scripted(1..=10);
    let count = Rc::new(RefCell::new(0));
    let sink = count.clone();
    let handler = processor
        .subscribe(a, Handler::collider_enter(move |_, _| *sink.borrow_mut() += 1))
        .unwrap();
    assert!(processor.unsubscribe(a, handler));

    tick(&mut processor, &mut world);
    assert_eq!(*count.borrow(), 0);
}

// ==================== Reference solver ====================

fn reference() -> (PhysicsProcessor, World) {
    let solver = Box::new(ReferenceSolver::new());
    let simulation = Simulation::new(solver, SimulationConfig::default());
    (PhysicsProcessor::new(simulation), World::new())
}

fn spawn_floor(processor: &mut PhysicsProcessor, world: &mut World) -> EntityKey {
    let transform = Transform::from_position(Vec3::new(0.0, -0.5, 0.0));
    let entity = world.add_entity(Entity::new(transform).with_name("floor"));
    let component = PhysicsComponent::static_collider(entity)
        .with_shape(ShapeDescription::cuboid(Vec3::new(10.0, 0.5, 10.0)))
        .with_preset(CollisionPreset::BlockAll);
    processor.add(world, component);
    entity
}

#[test]
fn test_interpolated_sync_blends_previous_pose() {
    let (mut processor, mut world) = reference();
    let entity = world.add_entity(Entity::new(Transform::from_position(Vec3::new(0.0, 10.0, 0.0))));
    let settings = RigidbodySettings::default().with_interpolation(true);
    let component =
        PhysicsComponent::rigidbody(entity, settings).with_shape(ShapeDescription::sphere(0.5));
    let id = processor.add(&mut world, component);

    tick(&mut processor, &mut world);
    let first = processor.rigidbody(id).unwrap().position().y;
    // Nothing to blend with yet
    assert!((world.get_entity(entity).unwrap().transform.position.y - first).abs() < 1e-6);

    tick(&mut processor, &mut world);
    let second = processor.rigidbody(id).unwrap().position().y;
    let synced = world.get_entity(entity).unwrap().transform.position.y;
    assert!(second < first);
    assert!((synced - (first + second) * 0.5).abs() < 1e-5);
}

#[test]
fn test_ball_settles_on_floor() {
    let (mut processor, mut world) = reference();
    spawn_floor(&mut processor, &mut world);
    let entity = world.add_entity(Entity::new(Transform::from_position(Vec3::new(0.0, 2.0, 0.0))));
    let component = PhysicsComponent::rigidbody(entity, RigidbodySettings::default())
        .with_shape(ShapeDescription::sphere(0.5))
        .with_overlap_events(true);
    let id = processor.add(&mut world, component);

    let enters = Rc::new(RefCell::new(0));
    let sink = enters.clone();
    processor.subscribe(id, Handler::collider_enter(move |_, _| *sink.borrow_mut() += 1));

    for _ in 0..240 {
        tick(&mut processor, &mut world);
    }
    let y = world.get_entity(entity).unwrap().transform.position.y;
    assert!((y - 0.5).abs() < 0.05, "ball should rest on the floor, y = {}", y);
    assert_eq!(*enters.borrow(), 1);
}

#[test]
fn test_raycast_reports_entity() {
    let (mut processor, mut world) = reference();
    let floor = spawn_floor(&mut processor, &mut world);

    let (origin, down) = (Vec3::new(0.0, 10.0, 0.0), Vec3::new(0.0, -1.0, 0.0));
    let hit = processor.raycast(origin, down, 100.0).unwrap();
    assert_eq!(hit.entity, floor);
    assert_eq!(world.get_entity(floor).unwrap().physics, Some(hit.component));
    assert!((hit.distance - 10.0).abs() < 1e-4);
    assert!((hit.normal.y - 1.0).abs() < 1e-4);

    // Detached colliders are not reported once flushed
    processor.detach(hit.component);
    processor.update_removals(&mut world);
    assert!(processor.raycast(origin, down, 100.0).is_none());
}

#[test]
fn test_disabled_simulation_attaches_nothing() {
    let simulation = Simulation::new(
        Box::new(ReferenceSolver::new()),
        SimulationConfig::default().with_disabled(true),
    );
    let mut processor = PhysicsProcessor::new(simulation);
    let mut world = World::new();
    spawn_floor(&mut processor, &mut world);

    assert_eq!(processor.component_count(), 1);
    assert_eq!(processor.attached_count(), 0);
    tick(&mut processor, &mut world);
    let down = Vec3::new(0.0, -1.0, 0.0);
    assert!(processor.raycast(Vec3::new(0.0, 10.0, 0.0), down, 100.0).is_none());
}

#[test]
fn test_teardown_then_reattach() {
    let (mut processor, mut world) = reference();
    let floor = spawn_floor(&mut processor, &mut world);
    let id = world.get_entity(floor).unwrap().physics.unwrap();

    processor.teardown();
    assert_eq!(processor.get(id).unwrap().state(), ComponentState::Removed);

    processor.attach(id, &world).unwrap();
    let down = Vec3::new(0.0, -1.0, 0.0);
    assert!(processor.raycast(Vec3::new(0.0, 10.0, 0.0), down, 100.0).is_some());
}

// ==================== Handle reuse ====================

type OtherLog = Rc<RefCell<Vec<(&'static str, ComponentId)>>>;

fn spawn_ball(processor: &mut PhysicsProcessor, world: &mut World, y: f32) -> ComponentId {
    let entity = world.add_entity(Entity::new(Transform::from_position(Vec3::new(0.0, y, 0.0))));
    let component = PhysicsComponent::rigidbody(entity, RigidbodySettings::default())
        .with_shape(ShapeDescription::sphere(0.5));
    processor.add(world, component)
}

#[test]
fn test_reused_body_handle_enters_floor_listener() {
    let (mut processor, mut world) = reference();
    let transform = Transform::from_position(Vec3::new(0.0, -0.5, 0.0));
    let entity = world.add_entity(Entity::new(transform));
    let floor = PhysicsComponent::static_collider(entity)
        .with_shape(ShapeDescription::cuboid(Vec3::new(10.0, 0.5, 10.0)))
        .with_preset(CollisionPreset::BlockAll)
        .with_overlap_events(true);
    let floor = processor.add(&mut world, floor);

    let log: OtherLog = Rc::new(RefCell::new(Vec::new()));
    let sink = log.clone();
    processor.subscribe(
        floor,
        Handler::collider_enter(move |e, _| sink.borrow_mut().push(("enter", e.other))),
    );
    let sink = log.clone();
    processor.subscribe(
        floor,
        Handler::collider_exit(move |e, _| sink.borrow_mut().push(("exit", e.other))),
    );

    let b = spawn_ball(&mut processor, &mut world, 0.49);
    tick(&mut processor, &mut world);
    assert_eq!(std::mem::take(&mut *log.borrow_mut()), [("enter", b)]);
    let handle = processor.get(b).unwrap().handle();

    processor.detach(b);
    processor.update_removals(&mut world);
    // Same spot, same solver handle
    let c = spawn_ball(&mut processor, &mut world, 0.49);
    assert_eq!(processor.get(c).unwrap().handle(), handle);

    processor.simulate(1.0 / 60.0);
    processor.update_bodies(&mut world);
    processor.send_events();
    assert_eq!(std::mem::take(&mut *log.borrow_mut()), [("exit", b), ("enter", c)]);

    tick(&mut processor, &mut world);
    assert!(log.borrow().is_empty());
}

// ==================== Characters ====================

#[test]
fn test_character_lifecycle() {
    let (mut processor, mut world) = reference();
    spawn_floor(&mut processor, &mut world);
    let entity = world.add_entity(Entity::new(Transform::from_position(Vec3::new(0.0, 0.6, 0.0))));
    let component = PhysicsComponent::character(entity, CharacterSettings::default())
        .with_shape(ShapeDescription::sphere(0.5));
    let id = processor.add(&mut world, component);

    for _ in 0..60 {
        tick(&mut processor, &mut world);
    }
    assert!(processor.character(id).unwrap().is_supported());
    let start = world.get_entity(entity).unwrap().transform.position;

    processor.character(id).unwrap().set_movement(Vec2::new(0.0, 2.0), -Vec3::Z);
    for _ in 0..60 {
        tick(&mut processor, &mut world);
    }
    let end = world.get_entity(entity).unwrap().transform.position;
    assert!(end.z < start.z - 0.5, "walked from {:?} to {:?}", start, end);

    processor.detach(id);
    tick(&mut processor, &mut world);
    assert!(processor.character(id).is_none());
    assert!(processor.simulation().characters().is_empty());

    // Re-attaching starts from fresh goals
    processor.attach(id, &world).unwrap();
    let character = processor.character(id).unwrap();
    assert_eq!(character.target_velocity(), Vec2::ZERO);
    assert!(!character.is_supported());
}

// ==================== Constraints ====================

#[test]
fn test_constraint_follows_removed_body() {
    let (mut processor, mut world) = reference();
    let a = spawn_ball(&mut processor, &mut world, 2.0);
    let b = spawn_ball(&mut processor, &mut world, 3.0);
    let hinge = processor.add_constraint(ConstraintComponent::new(Joint::SwivelHinge {
        body_a: a,
        body_b: b,
        local_offset_a: Vec3::new(0.0, 0.5, 0.0),
        local_offset_b: Vec3::new(0.0, -0.5, 0.0),
        local_swivel_axis_a: Vec3::X,
        local_hinge_axis_b: Vec3::Y,
    }));
    let handle = processor.get_constraint(hinge).unwrap().handle().unwrap();

    processor
        .update_constraint(hinge, |c| {
            if let Joint::SwivelHinge { local_hinge_axis_b, .. } = &mut c.joint {
                *local_hinge_axis_b = Vec3::Z;
            }
        })
        .unwrap();
    let Some(ConstraintDescription::SwivelHinge { local_hinge_axis_b, .. }) =
        processor.simulation().constraint(handle)
    else {
        panic!("swivel hinge should be live");
    };
    assert_eq!(local_hinge_axis_b, Vec3::Z);

    // A handler removes `b`; the hinge goes with it at the next flush
    let sender = processor.command_sender();
    sender.remove(b);
    tick(&mut processor, &mut world);
    assert!(processor.get(b).is_none());
    assert_eq!(processor.get_constraint(hinge).unwrap().state(), ComponentState::Removed);
    assert!(!processor.simulation().constraint_exists(handle));
    assert!(processor.get(a).unwrap().is_attached());
}
