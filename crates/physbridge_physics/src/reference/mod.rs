//! A small rigid-body solver implementing [`RigidBodySolver`]
//!
//! Good enough to run scenes end to end and to exercise the bridge in
//! tests: brute-force broad phase, one contact per pair, positional
//! projection plus impulse response, and sleeping. Constraints are stored
//! and reported but not solved.

mod geometry;

pub use geometry::{collide, Aabb, Contact, Sphere, Volume};

use physbridge_math::{Quat, Vec3};

use crate::dispatcher::ThreadDispatcher;
use crate::handle::{
    BodyHandle, CollidableHandle, CollidablePair, ConstraintHandle, ShapeIndex, StaticHandle,
};
use crate::material::PairMaterial;
use crate::shapes::ShapeDescription;
use crate::solver::{
    BodyDescription, BodyInertia, BodyVelocity, ConstraintDescription, ContactManifold,
    ContactPoint, NarrowPhaseCallbacks, PoseIntegratorCallbacks, RayHit, RigidBodySolver,
    RigidPose, StaticDescription, WorkerOutput,
};

/// Consecutive quiet frames before a body falls asleep
pub const DEFAULT_FRAMES_TO_SLEEP: u32 = 30;

/// Free-list arena handing out reusable integer slots
#[derive(Debug)]
struct Slots<T> {
    entries: Vec<Option<T>>,
    free: Vec<u32>,
}

impl<T> Slots<T> {
    fn new() -> Self {
        Self {
            entries: Vec::new(),
            free: Vec::new(),
        }
    }

    fn insert(&mut self, value: T) -> u32 {
        if let Some(index) = self.free.pop() {
            self.entries[index as usize] = Some(value);
            index
        } else {
            self.entries.push(Some(value));
            (self.entries.len() - 1) as u32
        }
    }

    fn remove(&mut self, index: u32) -> Option<T> {
        let value = self.entries.get_mut(index as usize)?.take()?;
        self.free.push(index);
        Some(value)
    }

    fn get(&self, index: u32) -> Option<&T> {
        self.entries.get(index as usize).and_then(Option::as_ref)
    }

    fn get_mut(&mut self, index: u32) -> Option<&mut T> {
        self.entries.get_mut(index as usize).and_then(Option::as_mut)
    }

    fn iter(&self) -> impl Iterator<Item = (u32, &T)> + '_ {
        self.entries
            .iter()
            .enumerate()
            .filter_map(|(i, e)| e.as_ref().map(|v| (i as u32, v)))
    }

    fn iter_mut(&mut self) -> impl Iterator<Item = (u32, &mut T)> + '_ {
        self.entries
            .iter_mut()
            .enumerate()
            .filter_map(|(i, e)| e.as_mut().map(|v| (i as u32, v)))
    }

    fn len(&self) -> usize {
        self.entries.len() - self.free.len()
    }
}

#[derive(Clone, Debug)]
struct Body {
    pose: RigidPose,
    velocity: BodyVelocity,
    inertia: BodyInertia,
    shape: ShapeIndex,
    speculative_margin: f32,
    sleep_threshold: f32,
    awake: bool,
    quiet_frames: u32,
}

#[derive(Clone, Debug)]
struct Static {
    pose: RigidPose,
    shape: ShapeIndex,
}

/// Pair handed to the narrow phase
#[derive(Clone, Copy, Debug)]
struct Candidate {
    pair: CollidablePair,
    a: Volume,
    b: Volume,
    margin: f32,
}

/// Narrow-phase output for one pair
struct PairResult {
    order: usize,
    pair: CollidablePair,
    manifold: ContactManifold,
    material: Option<PairMaterial>,
}

/// Reference backend
#[derive(Debug)]
pub struct ReferenceSolver {
    shapes: Slots<ShapeDescription>,
    bodies: Slots<Body>,
    statics: Slots<Static>,
    constraints: Slots<ConstraintDescription>,
    frames_to_sleep: u32,
}

impl Default for ReferenceSolver {
    fn default() -> Self {
        Self::new()
    }
}

impl ReferenceSolver {
    pub fn new() -> Self {
        Self {
            shapes: Slots::new(),
            bodies: Slots::new(),
            statics: Slots::new(),
            constraints: Slots::new(),
            frames_to_sleep: DEFAULT_FRAMES_TO_SLEEP,
        }
    }

    /// Set how many quiet frames a body needs before sleeping
    pub fn with_frames_to_sleep(mut self, frames: u32) -> Self {
        self.frames_to_sleep = frames.max(1);
        self
    }

    pub fn body_count(&self) -> usize {
        self.bodies.len()
    }

    pub fn static_count(&self) -> usize {
        self.statics.len()
    }

    fn volume_of(&self, handle: CollidableHandle) -> Option<Volume> {
        let (shape, pose) = match handle {
            CollidableHandle::Body(h) => {
                let body = self.bodies.get(h.0)?;
                (body.shape, body.pose)
            }
            CollidableHandle::Static(h) => {
                let stat = self.statics.get(h.0)?;
                (stat.shape, stat.pose)
            }
        };
        Some(Volume::new(self.shapes.get(shape.0)?, &pose))
    }

    fn integrate(&mut self, dt: f32, integrator: &dyn PoseIntegratorCallbacks) {
        for (index, body) in self.bodies.iter_mut() {
            if !body.awake {
                continue;
            }
            let handle = BodyHandle(index);
            integrator.integrate_velocity(handle, &body.inertia, &mut body.velocity, dt);
            body.pose.position += body.velocity.linear * dt;
            let spin = Quat::from_scaled_axis(body.velocity.angular * dt);
            body.pose.orientation = (spin * body.pose.orientation).normalize();
        }
    }

    fn broad_phase(&self) -> Vec<Candidate> {
        struct Entry {
            handle: CollidableHandle,
            volume: Volume,
            bounds: Aabb,
            margin: f32,
            awake: bool,
            kinematic: bool,
        }

        let mut bodies = Vec::with_capacity(self.bodies.len());
        for (index, body) in self.bodies.iter() {
            let handle = CollidableHandle::Body(BodyHandle(index));
            let Some(volume) = self.volume_of(handle) else {
                continue;
            };
            bodies.push(Entry {
                handle,
                volume,
                bounds: volume.bounds(),
                margin: body.speculative_margin,
                awake: body.awake,
                kinematic: body.inertia.is_kinematic(),
            });
        }

        let mut candidates = Vec::new();
        for (i, a) in bodies.iter().enumerate() {
            for b in &bodies[i + 1..] {
                if !(a.awake || b.awake) || (a.kinematic && b.kinematic) {
                    continue;
                }
                let margin = a.margin.max(b.margin);
                if a.bounds.expanded(margin).intersects(&b.bounds) {
                    candidates.push(Candidate {
                        pair: CollidablePair { a: a.handle, b: b.handle },
                        a: a.volume,
                        b: b.volume,
                        margin,
                    });
                }
            }
        }

        for (index, _) in self.statics.iter() {
            let handle = CollidableHandle::Static(StaticHandle(index));
            let Some(volume) = self.volume_of(handle) else {
                continue;
            };
            let bounds = volume.bounds();
            for body in bodies.iter().filter(|b| b.awake && !b.kinematic) {
                if body.bounds.expanded(body.margin).intersects(&bounds) {
                    candidates.push(Candidate {
                        pair: CollidablePair { a: body.handle, b: handle },
                        a: body.volume,
                        b: volume,
                        margin: body.margin,
                    });
                }
            }
        }
        candidates
    }

    fn resolve(&mut self, pair: CollidablePair, contact: &ContactPoint, material: &PairMaterial) {
        let (pos_a, vel_a, im_a) = self.dynamics(pair.a);
        let (pos_b, vel_b, im_b) = self.dynamics(pair.b);
        let total = im_a + im_b;
        if total <= 0.0 {
            return;
        }
        let n = contact.normal;

        // Push apart in proportion to inverse mass
        let correction = n * (contact.depth / total);
        let (mut va, mut vb) = (vel_a, vel_b);

        let vn = (va - vb).dot(n);
        if vn < 0.0 {
            let j = -(1.0 + material.restitution) * vn / total;
            va += n * (j * im_a);
            vb -= n * (j * im_b);

            let rel = va - vb;
            let tangent = rel - n * rel.dot(n);
            let speed = tangent.length();
            if speed > 0.0001 {
                let t = tangent / speed;
                let jt = (speed / total).min(material.friction * j);
                va -= t * (jt * im_a);
                vb += t * (jt * im_b);
            }
        }

        self.write_dynamics(pair.a, pos_a + correction * im_a, va);
        self.write_dynamics(pair.b, pos_b - correction * im_b, vb);
    }

    /// Position, linear velocity and inverse mass; statics are immovable
    fn dynamics(&self, handle: CollidableHandle) -> (Vec3, Vec3, f32) {
        match handle {
            CollidableHandle::Body(h) => match self.bodies.get(h.0) {
                Some(body) => {
                    (body.pose.position, body.velocity.linear, body.inertia.inverse_mass)
                }
                None => (Vec3::ZERO, Vec3::ZERO, 0.0),
            },
            CollidableHandle::Static(_) => (Vec3::ZERO, Vec3::ZERO, 0.0),
        }
    }

    fn write_dynamics(&mut self, handle: CollidableHandle, position: Vec3, velocity: Vec3) {
        if let CollidableHandle::Body(h) = handle {
            if let Some(body) = self.bodies.get_mut(h.0) {
                if !body.inertia.is_kinematic() {
                    body.pose.position = position;
                    body.velocity.linear = velocity;
                }
            }
        }
    }

    fn wake_if_asleep(&mut self, handle: CollidableHandle) {
        if let CollidableHandle::Body(h) = handle {
            if let Some(body) = self.bodies.get_mut(h.0) {
                body.awake = true;
                body.quiet_frames = 0;
            }
        }
    }

    fn update_sleep(&mut self) {
        let frames_to_sleep = self.frames_to_sleep;
        for (_, body) in self.bodies.iter_mut() {
            if !body.awake || body.inertia.is_kinematic() {
                continue;
            }
            let energy =
                body.velocity.linear.length_squared() + body.velocity.angular.length_squared();
            if energy < body.sleep_threshold {
                body.quiet_frames += 1;
                if body.quiet_frames >= frames_to_sleep {
                    body.awake = false;
                    body.velocity = BodyVelocity::default();
                }
            } else {
                body.quiet_frames = 0;
            }
        }
    }
}

/// One worker's share of the candidates: every `stride`-th pair from `worker`
fn narrow_phase(
    candidates: &[Candidate],
    worker: usize,
    stride: usize,
    callbacks: &dyn NarrowPhaseCallbacks,
) -> (Vec<PairResult>, WorkerOutput) {
    let mut results = Vec::new();
    let mut output = WorkerOutput::new();
    for (order, candidate) in candidates.iter().enumerate().skip(worker).step_by(stride) {
        let pair = candidate.pair;
        if !callbacks.allow_contact_generation(pair.a, pair.b) {
            continue;
        }
        let Some(contact) = collide(&candidate.a, &candidate.b, candidate.margin) else {
            continue;
        };
        let manifold = ContactManifold::new().with_contact(ContactPoint::new(
            contact.point - candidate.a.center(),
            contact.normal,
            contact.depth,
            contact.feature,
        ));
        let material = callbacks.configure_contact_manifold(&mut output, pair, &manifold);
        results.push(PairResult {
            order,
            pair,
            manifold,
            material,
        });
    }
    (results, output)
}

impl RigidBodySolver for ReferenceSolver {
    fn add_shape(&mut self, shape: ShapeDescription) -> ShapeIndex {
        ShapeIndex(self.shapes.insert(shape))
    }

    fn remove_shape(&mut self, shape: ShapeIndex) {
        if self.shapes.remove(shape.0).is_none() {
            log::warn!("Removing unknown shape {:?}", shape);
        }
    }

    fn shape(&self, shape: ShapeIndex) -> Option<ShapeDescription> {
        self.shapes.get(shape.0).copied()
    }

    fn add_body(&mut self, description: BodyDescription) -> BodyHandle {
        if self.shapes.get(description.shape.0).is_none() {
            log::warn!(
                "Body added with unknown shape {:?}; it will not collide",
                description.shape
            );
        }
        BodyHandle(self.bodies.insert(Body {
            pose: description.pose,
            velocity: description.velocity,
            inertia: description.inertia,
            shape: description.shape,
            speculative_margin: description.speculative_margin.max(0.0),
            sleep_threshold: description.sleep_threshold,
            awake: true,
            quiet_frames: 0,
        }))
    }

    fn remove_body(&mut self, body: BodyHandle) {
        if self.bodies.remove(body.0).is_none() {
            log::warn!("Removing unknown body {:?}", body);
            return;
        }
        let attached: Vec<u32> = self
            .constraints
            .iter()
            .filter(|(_, c)| c.bodies().contains(&body))
            .map(|(index, _)| index)
            .collect();
        for index in attached {
            self.constraints.remove(index);
        }
    }

    fn body_exists(&self, body: BodyHandle) -> bool {
        self.bodies.get(body.0).is_some()
    }

    fn add_static(&mut self, description: StaticDescription) -> StaticHandle {
        StaticHandle(self.statics.insert(Static {
            pose: description.pose,
            shape: description.shape,
        }))
    }

    fn remove_static(&mut self, handle: StaticHandle) {
        if self.statics.remove(handle.0).is_none() {
            log::warn!("Removing unknown static {:?}", handle);
        }
    }

    fn static_exists(&self, handle: StaticHandle) -> bool {
        self.statics.get(handle.0).is_some()
    }

    fn add_constraint(&mut self, description: ConstraintDescription) -> ConstraintHandle {
        for body in description.bodies() {
            self.wake_if_asleep(body.into());
        }
        ConstraintHandle(self.constraints.insert(description))
    }

    fn update_constraint(
        &mut self,
        handle: ConstraintHandle,
        description: ConstraintDescription,
    ) {
        match self.constraints.get_mut(handle.0) {
            Some(existing) => *existing = description,
            None => log::warn!("Updating unknown constraint {:?}", handle),
        }
    }

    fn remove_constraint(&mut self, handle: ConstraintHandle) {
        if self.constraints.remove(handle.0).is_none() {
            log::warn!("Removing unknown constraint {:?}", handle);
        }
    }

    fn constraint_exists(&self, handle: ConstraintHandle) -> bool {
        self.constraints.get(handle.0).is_some()
    }

    fn constraint(&self, handle: ConstraintHandle) -> Option<ConstraintDescription> {
        self.constraints.get(handle.0).copied()
    }

    fn body_pose(&self, body: BodyHandle) -> Option<RigidPose> {
        self.bodies.get(body.0).map(|b| b.pose)
    }

    fn set_body_pose(&mut self, body: BodyHandle, pose: RigidPose) {
        if let Some(b) = self.bodies.get_mut(body.0) {
            b.pose = pose;
            b.awake = true;
            b.quiet_frames = 0;
        }
    }

    fn body_velocity(&self, body: BodyHandle) -> Option<BodyVelocity> {
        self.bodies.get(body.0).map(|b| b.velocity)
    }

    fn set_body_velocity(&mut self, body: BodyHandle, velocity: BodyVelocity) {
        if let Some(b) = self.bodies.get_mut(body.0) {
            b.velocity = velocity;
            b.awake = true;
            b.quiet_frames = 0;
        }
    }

    fn body_inertia(&self, body: BodyHandle) -> Option<BodyInertia> {
        self.bodies.get(body.0).map(|b| b.inertia)
    }

    fn set_body_inertia(&mut self, body: BodyHandle, inertia: BodyInertia) {
        if let Some(b) = self.bodies.get_mut(body.0) {
            b.inertia = inertia;
            b.awake = true;
            b.quiet_frames = 0;
        }
    }

    fn apply_linear_impulse(&mut self, body: BodyHandle, impulse: Vec3) {
        if let Some(b) = self.bodies.get_mut(body.0) {
            b.velocity.linear += impulse * b.inertia.inverse_mass;
        }
    }

    fn is_body_awake(&self, body: BodyHandle) -> bool {
        self.bodies.get(body.0).is_some_and(|b| b.awake)
    }

    fn wake_body(&mut self, body: BodyHandle) {
        self.wake_if_asleep(body.into());
    }

    fn static_pose(&self, handle: StaticHandle) -> Option<RigidPose> {
        self.statics.get(handle.0).map(|s| s.pose)
    }

    fn timestep(
        &mut self,
        dt: f32,
        narrow: &dyn NarrowPhaseCallbacks,
        integrator: &dyn PoseIntegratorCallbacks,
        dispatcher: Option<&ThreadDispatcher>,
    ) -> Vec<WorkerOutput> {
        self.integrate(dt, integrator);

        let candidates = self.broad_phase();
        let per_worker = match dispatcher {
            Some(dispatcher) => {
                let stride = dispatcher.thread_count();
                dispatcher.dispatch_workers(|worker| {
                    narrow_phase(&candidates, worker, stride, narrow)
                })
            }
            None => vec![narrow_phase(&candidates, 0, 1, narrow)],
        };

        // Resolve in broad-phase order regardless of how pairs were split
        let (per_worker, outputs): (Vec<_>, Vec<_>) = per_worker.into_iter().unzip();
        let mut results: Vec<PairResult> = per_worker.into_iter().flatten().collect();
        results.sort_by_key(|r| r.order);

        for result in results {
            let Some(material) = result.material else {
                continue;
            };
            for contact in result.manifold.contacts() {
                if contact.depth > 0.0 {
                    self.wake_if_asleep(result.pair.a);
                    self.wake_if_asleep(result.pair.b);
                    self.resolve(result.pair, contact, &material);
                }
            }
        }

        self.update_sleep();
        outputs
    }

    fn ray_cast(
        &self,
        origin: Vec3,
        direction: Vec3,
        max_distance: f32,
        filter: &dyn Fn(CollidableHandle) -> bool,
    ) -> Option<RayHit> {
        let bodies = self.bodies.iter().map(|(i, _)| CollidableHandle::Body(BodyHandle(i)));
        let statics = self
            .statics
            .iter()
            .map(|(i, _)| CollidableHandle::Static(StaticHandle(i)));

        let mut closest: Option<RayHit> = None;
        for collidable in bodies.chain(statics) {
            if !filter(collidable) {
                continue;
            }
            let Some(volume) = self.volume_of(collidable) else {
                continue;
            };
            let Some((t, normal)) = geometry::ray_cast(&volume, origin, direction, max_distance)
            else {
                continue;
            };
            // Rays starting inside a shape do not count as hits
            if t <= 0.0 {
                continue;
            }
            if closest.map_or(true, |c| t < c.t) {
                closest = Some(RayHit { collidable, t, normal });
            }
        }
        closest
    }
}
