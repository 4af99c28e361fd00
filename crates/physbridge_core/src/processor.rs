//! Physics processor
//!
//! Owns the [`Simulation`] and every [`PhysicsComponent`], and drives their
//! lifecycle. Each tick runs, in order:
//!
//! 1. [`update_removals`](PhysicsProcessor::update_removals): apply queued
//!    commands, then remove every component detached since the last flush
//! 2. [`simulate`](PhysicsProcessor::simulate)
//! 3. [`update_bodies`](PhysicsProcessor::update_bodies): copy body poses to
//!    entity transforms
//! 4. [`send_events`](PhysicsProcessor::send_events): deliver contact events
//!    to component handlers
//!
//! Detaching is deferred: a component detached and re-attached before the
//! next flush keeps its solver collidable untouched. Constraint components
//! follow the same rules and are released before the bodies they join.

use crossbeam_channel::Receiver;
use physbridge_math::Vec3;
use physbridge_physics::{
    BodyDescription, BodyHandle, BodyInertia, BodyVelocity, CollidableHandle, CollidableRecord,
    ComponentId, ContinuousDetection, Simulation, StaticDescription,
};
use rustc_hash::FxHashSet;
use slotmap::SlotMap;

use crate::character::Character;
use crate::component::{
    AttachError, ComponentKind, ComponentState, Interpolation, PhysicsComponent,
};
use crate::constraint::{ConstraintComponent, ConstraintError, ConstraintId};
use crate::debug::{ColliderVisual, DebugScene};
use crate::entity::DirtyFlags;
use crate::handlers::{CommandSender, Handler, HandlerId, LifecycleCommand};
use crate::hit::HitResult;
use crate::rigidbody::Rigidbody;
use crate::world::World;

/// Keeps entity-side physics components in sync with the simulation
pub struct PhysicsProcessor {
    simulation: Simulation,
    components: SlotMap<ComponentId, PhysicsComponent>,
    /// Attached rigid bodies, in attach order
    rigid_elements: Vec<ComponentId>,
    /// Components detached since the last flush
    current_frame_removals: FxHashSet<ComponentId>,
    /// Detached components to drop entirely at the next flush
    pending_drops: FxHashSet<ComponentId>,
    constraints: SlotMap<ConstraintId, ConstraintComponent>,
    /// Constraints detached since the last flush
    constraint_removals: FxHashSet<ConstraintId>,
    /// Detached constraints to drop entirely at the next flush
    constraint_drops: FxHashSet<ConstraintId>,
    commands: CommandSender,
    command_receiver: Receiver<LifecycleCommand>,
    debug_scene: Option<DebugScene>,
    next_handler: u64,
}

impl PhysicsProcessor {
    pub fn new(simulation: Simulation) -> Self {
        let (sender, receiver) = crossbeam_channel::unbounded();
        Self {
            simulation,
            components: SlotMap::with_key(),
            rigid_elements: Vec::new(),
            current_frame_removals: FxHashSet::default(),
            pending_drops: FxHashSet::default(),
            constraints: SlotMap::with_key(),
            constraint_removals: FxHashSet::default(),
            constraint_drops: FxHashSet::default(),
            commands: CommandSender::new(sender),
            command_receiver: receiver,
            debug_scene: None,
            next_handler: 0,
        }
    }

    pub fn simulation(&self) -> &Simulation {
        &self.simulation
    }

    pub fn simulation_mut(&mut self) -> &mut Simulation {
        &mut self.simulation
    }

    /// A sender for lifecycle requests applied at the next removal flush
    pub fn command_sender(&self) -> CommandSender {
        self.commands.clone()
    }

    // --- Components ---

    /// Take ownership of a component without attaching it
    pub fn insert(&mut self, component: PhysicsComponent) -> ComponentId {
        self.components.insert(component)
    }

    /// Insert a component, link it to its entity and attach it
    ///
    /// Attach failures are logged and leave the component unattached.
    pub fn add(&mut self, world: &mut World, component: PhysicsComponent) -> ComponentId {
        let entity = component.entity;
        let id = self.insert(component);
        if let Some(entity) = world.get_entity_mut(entity) {
            entity.set_physics(Some(id));
        }
        let _ = self.attach(id, world);
        id
    }

    pub fn get(&self, id: ComponentId) -> Option<&PhysicsComponent> {
        self.components.get(id)
    }

    /// Mutable access to a component
    ///
    /// Shape, preset and material changes take effect on the next attach.
    pub fn get_mut(&mut self, id: ComponentId) -> Option<&mut PhysicsComponent> {
        self.components.get_mut(id)
    }

    pub fn component_count(&self) -> usize {
        self.components.len()
    }

    /// Number of components with a live collidable
    pub fn attached_count(&self) -> usize {
        self.components.values().filter(|c| c.is_attached()).count()
    }

    pub fn is_pending_removal(&self, id: ComponentId) -> bool {
        self.current_frame_removals.contains(&id)
    }

    pub fn iter(&self) -> impl Iterator<Item = (ComponentId, &PhysicsComponent)> {
        self.components.iter()
    }

    // --- Lifecycle ---

    /// Create the component's collidable in the simulation
    ///
    /// Does nothing while the simulation is disabled or the component is
    /// already attached. Attaching a component waiting for removal cancels
    /// the removal and keeps its collidable.
    pub fn attach(&mut self, id: ComponentId, world: &World) -> Result<(), AttachError> {
        if self.simulation.is_disabled() {
            log::debug!("Simulation disabled, not attaching {:?}", id);
            return Ok(());
        }
        let Some(component) = self.components.get_mut(id) else {
            log::warn!("Cannot attach unknown physics component {:?}", id);
            return Err(AttachError::UnknownComponent);
        };

        match component.state {
            ComponentState::Attached => return Ok(()),
            ComponentState::PendingRemoval => {
                self.current_frame_removals.remove(&id);
                self.pending_drops.remove(&id);
                component.state = ComponentState::Attached;
                log::trace!("Re-attached {:?} before removal", id);
                return Ok(());
            }
            ComponentState::Unattached | ComponentState::Removed => {}
        }

        let shape = match component.resolve_shape() {
            Ok(shape) => shape,
            Err(e) => {
                log::error!(
                    "Cannot attach physics component of entity {:?}: {}",
                    component.entity,
                    e
                );
                return Err(e);
            }
        };
        let Some(entity) = world.get_entity(component.entity) else {
            log::error!("Cannot attach {:?}: entity {:?} is gone", id, component.entity);
            return Err(AttachError::MissingEntity);
        };
        let transform = entity.transform;

        let shape_index = self.simulation.add_shape(shape);
        let collision = component.preset.to_property(component.generate_overlap_events);
        let record = CollidableRecord::new(id, collision).with_material(component.material);
        let handle: CollidableHandle = match component.kind {
            ComponentKind::Rigidbody(settings) => {
                let inertia = if settings.kinematic {
                    BodyInertia::KINEMATIC
                } else {
                    shape.inertia(settings.mass)
                };
                let description = BodyDescription {
                    pose: transform.pose(),
                    velocity: BodyVelocity::default(),
                    inertia,
                    shape: shape_index,
                    speculative_margin: settings.speculative_margin,
                    sleep_threshold: settings.sleep_threshold,
                    continuous: settings.continuous,
                };
                self.rigid_elements.push(id);
                self.simulation.add_body(description, record).into()
            }
            ComponentKind::Character(settings) => {
                let description = BodyDescription {
                    pose: transform.pose(),
                    velocity: BodyVelocity::default(),
                    inertia: settings.inertia(),
                    shape: shape_index,
                    speculative_margin: settings.speculative_margin,
                    sleep_threshold: settings.sleep_threshold,
                    continuous: ContinuousDetection::Discrete,
                };
                self.rigid_elements.push(id);
                let body = self.simulation.add_body(description, record);
                self.simulation.add_character(body, settings.description());
                body.into()
            }
            ComponentKind::StaticCollider => {
                let description = StaticDescription {
                    pose: transform.pose(),
                    shape: shape_index,
                    continuous: ContinuousDetection::Discrete,
                };
                self.simulation.add_static(description, record).into()
            }
        };

        component.handle = Some(handle);
        component.shape_index = Some(shape_index);
        component.state = ComponentState::Attached;
        component.interpolation = Interpolation::default();

        if let Some(debug) = &mut self.debug_scene {
            debug.insert(id, ColliderVisual { shape, transform });
        }
        log::debug!("Attached {:?} as {}", id, handle);
        Ok(())
    }

    /// Mark an attached component for removal at the next flush
    pub fn detach(&mut self, id: ComponentId) {
        let Some(component) = self.components.get_mut(id) else {
            log::trace!("Ignoring detach of unknown component {:?}", id);
            return;
        };
        if component.state == ComponentState::Attached {
            component.state = ComponentState::PendingRemoval;
            self.current_frame_removals.insert(id);
        }
    }

    /// Detach a component and drop it at the next flush
    ///
    /// Components without a live collidable are dropped immediately.
    /// Returns false if `id` is unknown.
    pub fn remove(&mut self, id: ComponentId, world: &mut World) -> bool {
        let Some(component) = self.components.get(id) else {
            return false;
        };
        if component.is_attached() {
            self.detach(id);
            self.pending_drops.insert(id);
        } else {
            self.drop_component(id, world);
        }
        true
    }

    /// Apply queued commands, then remove everything detached since the last flush
    ///
    /// Constraints go first. Calling this again with nothing pending does
    /// nothing.
    pub fn update_removals(&mut self, world: &mut World) {
        self.apply_commands(world);

        for id in std::mem::take(&mut self.constraint_removals) {
            self.release_constraint(id);
            if self.constraint_drops.remove(&id) {
                self.constraints.remove(id);
            }
        }

        let removals = std::mem::take(&mut self.current_frame_removals);
        for id in removals {
            self.release(id);
            if self.pending_drops.remove(&id) {
                self.drop_component(id, world);
            }
        }
    }

    fn apply_commands(&mut self, world: &mut World) {
        while let Ok(command) = self.command_receiver.try_recv() {
            log::trace!("Applying {:?}", command);
            match command {
                LifecycleCommand::Attach(id) => {
                    // Failures are logged by attach
                    let _ = self.attach(id, world);
                }
                LifecycleCommand::Detach(id) => self.detach(id),
                LifecycleCommand::Remove(id) => {
                    self.remove(id, world);
                }
            }
        }
    }

    /// Remove a component's collidable and shape from the simulation
    ///
    /// Live constraints joining the component are released with it.
    fn release(&mut self, id: ComponentId) {
        let dependents: Vec<ConstraintId> = self
            .constraints
            .iter()
            .filter(|(_, c)| c.is_attached() && c.joint.references(id))
            .map(|(constraint, _)| constraint)
            .collect();
        for constraint in dependents {
            log::debug!("Releasing {:?} along with {:?}", constraint, id);
            self.constraint_removals.remove(&constraint);
            self.release_constraint(constraint);
            if self.constraint_drops.remove(&constraint) {
                self.constraints.remove(constraint);
            }
        }

        let Some(component) = self.components.get_mut(id) else {
            return;
        };
        if let Some(handle) = component.handle.take() {
            self.simulation.remove_collidable(handle);
            log::debug!("Removed {} of {:?}", handle, id);
        }
        if let Some(shape) = component.shape_index.take() {
            self.simulation.remove_shape(shape);
        }
        component.state = ComponentState::Removed;
        component.interpolation = Interpolation::default();
        self.rigid_elements.retain(|c| *c != id);
        if let Some(debug) = &mut self.debug_scene {
            debug.remove(id);
        }
    }

    fn drop_component(&mut self, id: ComponentId, world: &mut World) {
        if let Some(component) = self.components.remove(id) {
            if let Some(entity) = world.get_entity_mut(component.entity) {
                if entity.physics == Some(id) {
                    entity.set_physics(None);
                }
            }
        }
    }

    // --- Per tick ---

    /// Advance the simulation by `dt`
    pub fn simulate(&mut self, dt: f32) {
        self.simulation.simulate(dt);
    }

    /// Copy body poses onto the transforms of their entities
    pub fn update_bodies(&mut self, world: &mut World) {
        for id in &self.rigid_elements {
            let Some(component) = self.components.get_mut(*id) else {
                continue;
            };
            let Some(CollidableHandle::Body(body)) = component.handle else {
                continue;
            };
            let Some(mut pose) = self.simulation.body_pose(body) else {
                continue;
            };
            if component.rigidbody_settings().is_some_and(|s| s.interpolate) {
                pose = component.interpolation.advance(pose);
            }
            let Some(entity) = world.get_entity_mut(component.entity) else {
                continue;
            };
            if entity.transform.pose() != pose {
                entity.transform.set_pose(pose);
                entity.mark_dirty(DirtyFlags::TRANSFORM);
            }
            if let Some(debug) = &mut self.debug_scene {
                debug.update_transform(*id, entity.transform);
            }
        }
    }

    /// Deliver queued events to the handlers of their acting component
    ///
    /// Events for components that are no longer attached are dropped.
    /// Returns the number of handler invocations.
    pub fn send_events(&mut self) -> usize {
        let mut invoked = 0;
        for event in self.simulation.drain_events() {
            let acting = event.acting();
            let Some(component) = self.components.get_mut(acting) else {
                log::trace!("Dropping {:?} event for removed component {:?}", event.kind(), acting);
                continue;
            };
            if component.state != ComponentState::Attached {
                log::trace!(
                    "Dropping {:?} event for detached component {:?}",
                    event.kind(),
                    acting
                );
                continue;
            }
            invoked += component.handlers.dispatch(&event, &self.commands);
        }
        invoked
    }

    // --- Handlers ---

    /// Subscribe a handler to one of the component's events
    pub fn subscribe(&mut self, id: ComponentId, handler: Handler) -> Option<HandlerId> {
        let component = self.components.get_mut(id)?;
        let handler_id = HandlerId(self.next_handler);
        self.next_handler += 1;
        component.handlers.insert(handler_id, handler);
        Some(handler_id)
    }

    pub fn unsubscribe(&mut self, id: ComponentId, handler: HandlerId) -> bool {
        self.components
            .get_mut(id)
            .is_some_and(|component| component.handlers.remove(handler))
    }

    // --- Queries ---

    /// Closest attached component hit by a ray
    pub fn raycast(&self, origin: Vec3, direction: Vec3, max_distance: f32) -> Option<HitResult> {
        let hit = self.simulation.raycast(origin, direction, max_distance)?;
        let component = self.components.get(hit.component).filter(|c| c.is_attached())?;
        Some(HitResult {
            entity: component.entity,
            component: hit.component,
            point: hit.point,
            normal: hit.normal,
            distance: hit.distance,
        })
    }

    /// Runtime access to an attached rigid body
    pub fn rigidbody(&mut self, id: ComponentId) -> Option<Rigidbody<'_>> {
        match self.components.get(id)?.handle? {
            CollidableHandle::Body(body) => Some(Rigidbody::new(&mut self.simulation, body)),
            CollidableHandle::Static(_) => None,
        }
    }

    /// Runtime access to an attached character
    pub fn character(&mut self, id: ComponentId) -> Option<Character<'_>> {
        let component = self.components.get_mut(id)?;
        let Some(CollidableHandle::Body(body)) = component.handle else {
            return None;
        };
        match &mut component.kind {
            ComponentKind::Character(settings) => {
                Some(Character::new(&mut self.simulation, settings, body))
            }
            _ => None,
        }
    }

    // --- Constraints ---

    /// Take ownership of a constraint and attach it
    ///
    /// Attach failures are logged and leave the constraint unattached.
    pub fn add_constraint(&mut self, constraint: ConstraintComponent) -> ConstraintId {
        let id = self.constraints.insert(constraint);
        if let Err(e) = self.attach_constraint(id) {
            log::error!("Cannot attach {:?}: {}", id, e);
        }
        id
    }

    pub fn get_constraint(&self, id: ConstraintId) -> Option<&ConstraintComponent> {
        self.constraints.get(id)
    }

    pub fn constraint_count(&self) -> usize {
        self.constraints.len()
    }

    /// Create the solver constraint
    ///
    /// Every joined component must be an attached body. Attaching a
    /// constraint waiting for removal cancels the removal.
    pub fn attach_constraint(&mut self, id: ConstraintId) -> Result<(), ConstraintError> {
        if self.simulation.is_disabled() {
            log::debug!("Simulation disabled, not attaching {:?}", id);
            return Ok(());
        }
        let Some(constraint) = self.constraints.get(id) else {
            return Err(ConstraintError::UnknownConstraint);
        };
        match constraint.state {
            ComponentState::Attached => return Ok(()),
            ComponentState::PendingRemoval => {
                self.constraint_removals.remove(&id);
                self.constraint_drops.remove(&id);
                if let Some(constraint) = self.constraints.get_mut(id) {
                    constraint.state = ComponentState::Attached;
                }
                return Ok(());
            }
            ComponentState::Unattached | ComponentState::Removed => {}
        }

        let description = constraint.description(|c| self.constrained_body(c))?;
        let handle = self.simulation.add_constraint(description);
        if let Some(constraint) = self.constraints.get_mut(id) {
            constraint.handle = Some(handle);
            constraint.state = ComponentState::Attached;
        }
        log::debug!("Attached {:?} as {:?}", id, handle);
        Ok(())
    }

    /// Mark an attached constraint for removal at the next flush
    pub fn detach_constraint(&mut self, id: ConstraintId) {
        let Some(constraint) = self.constraints.get_mut(id) else {
            log::trace!("Ignoring detach of unknown constraint {:?}", id);
            return;
        };
        if constraint.state == ComponentState::Attached {
            constraint.state = ComponentState::PendingRemoval;
            self.constraint_removals.insert(id);
        }
    }

    /// Detach a constraint and drop it at the next flush
    ///
    /// Returns false if `id` is unknown.
    pub fn remove_constraint(&mut self, id: ConstraintId) -> bool {
        let Some(constraint) = self.constraints.get(id) else {
            return false;
        };
        if constraint.is_attached() {
            self.detach_constraint(id);
            self.constraint_drops.insert(id);
        } else {
            self.constraints.remove(id);
        }
        true
    }

    /// Edit a constraint, pushing the change to a live solver constraint
    pub fn update_constraint(
        &mut self,
        id: ConstraintId,
        edit: impl FnOnce(&mut ConstraintComponent),
    ) -> Result<(), ConstraintError> {
        let Some(constraint) = self.constraints.get_mut(id) else {
            return Err(ConstraintError::UnknownConstraint);
        };
        edit(constraint);
        let Some(handle) = constraint.handle else {
            return Ok(());
        };
        if !self.simulation.constraint_exists(handle) {
            return Ok(());
        }
        let constraint = &self.constraints[id];
        let description = constraint.description(|c| self.constrained_body(c))?;
        self.simulation.update_constraint(handle, description);
        Ok(())
    }

    /// Solver body and inertia behind a constrained component
    fn constrained_body(
        &self,
        id: ComponentId,
    ) -> Result<(BodyHandle, BodyInertia), ConstraintError> {
        let component = self
            .components
            .get(id)
            .filter(|c| c.is_attached())
            .ok_or(ConstraintError::BodyNotAttached(id))?;
        match component.handle {
            Some(CollidableHandle::Body(body)) => {
                let inertia = self
                    .simulation
                    .body_inertia(body)
                    .ok_or(ConstraintError::BodyNotAttached(id))?;
                Ok((body, inertia))
            }
            Some(CollidableHandle::Static(_)) => Err(ConstraintError::NotABody(id)),
            None => Err(ConstraintError::BodyNotAttached(id)),
        }
    }

    fn release_constraint(&mut self, id: ConstraintId) {
        let Some(constraint) = self.constraints.get_mut(id) else {
            return;
        };
        if let Some(handle) = constraint.handle.take() {
            if self.simulation.constraint_exists(handle) {
                self.simulation.remove_constraint(handle);
            }
            log::debug!("Removed {:?} of {:?}", handle, id);
        }
        constraint.state = ComponentState::Removed;
    }

    // --- Debug ---

    /// Toggle collider visuals for every attached component
    pub fn set_collider_shapes_rendering(&mut self, enabled: bool, world: &World) {
        if !enabled {
            self.debug_scene = None;
            return;
        }
        if self.debug_scene.is_some() {
            return;
        }
        let mut scene = DebugScene::new();
        for (id, component) in self.components.iter().filter(|(_, c)| c.is_attached()) {
            let entity = world.get_entity(component.entity);
            let (Ok(shape), Some(entity)) = (component.resolve_shape(), entity) else {
                continue;
            };
            scene.insert(
                id,
                ColliderVisual {
                    shape,
                    transform: entity.transform,
                },
            );
        }
        log::debug!("Collider rendering enabled for {} collider(s)", scene.len());
        self.debug_scene = Some(scene);
    }

    pub fn debug_scene(&self) -> Option<&DebugScene> {
        self.debug_scene.as_ref()
    }

    // --- Teardown ---

    /// Detach every constraint and component and flush the removals
    ///
    /// Both stay owned by the processor and can be attached again.
    pub fn teardown(&mut self) {
        let constraints: Vec<ConstraintId> = self
            .constraints
            .iter()
            .filter(|(_, c)| c.is_attached())
            .map(|(id, _)| id)
            .collect();
        for id in constraints {
            self.release_constraint(id);
        }
        self.constraint_removals.clear();
        for id in std::mem::take(&mut self.constraint_drops) {
            self.constraints.remove(id);
        }

        let attached: Vec<ComponentId> = self
            .components
            .iter()
            .filter(|(_, c)| c.is_attached())
            .map(|(id, _)| id)
            .collect();
        for id in attached {
            self.detach(id);
            self.release(id);
        }
        self.current_frame_removals.clear();
        // Drops of components whose collidable is now gone
        for id in std::mem::take(&mut self.pending_drops) {
            self.components.remove(id);
        }
        // Events queued for the released collidables
        let dropped = self.simulation.drain_events().len();
        log::debug!("Physics processor torn down, {} pending event(s) dropped", dropped);
    }
}

impl Drop for PhysicsProcessor {
    fn drop(&mut self) {
        self.teardown();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::component::{CharacterSettings, RigidbodySettings};
    use crate::constraint::Joint;
    use crate::{Entity, Transform};
    use physbridge_math::{Quat, Vec2};
    use physbridge_physics::{
        CollisionPreset, ConstraintDescription, ReferenceSolver, ShapeDescription, SimulationConfig,
        SpringSettings,
    };
    use std::cell::RefCell;
    use std::rc::Rc;

    fn processor() -> PhysicsProcessor {
        processor_with(SimulationConfig::default())
    }

    fn processor_with(config: SimulationConfig) -> PhysicsProcessor {
        PhysicsProcessor::new(Simulation::new(Box::new(ReferenceSolver::new()), config))
    }

    fn ball(world: &mut World, y: f32) -> PhysicsComponent {
        let transform = Transform::from_position(Vec3::new(0.0, y, 0.0));
        let entity = world.add_entity(Entity::new(transform));
        PhysicsComponent::rigidbody(entity, RigidbodySettings::default())
            .with_shape(ShapeDescription::sphere(0.5))
    }

    fn floor(world: &mut World) -> PhysicsComponent {
        let transform = Transform::from_position(Vec3::new(0.0, -0.5, 0.0));
        let entity = world.add_entity(Entity::new(transform));
        PhysicsComponent::static_collider(entity)
            .with_shape(ShapeDescription::cuboid(Vec3::new(10.0, 0.5, 10.0)))
            .with_preset(CollisionPreset::BlockAll)
    }

    fn tick(processor: &mut PhysicsProcessor, world: &mut World) -> usize {
        processor.update_removals(world);
        processor.simulate(1.0 / 60.0);
        processor.update_bodies(world);
        processor.send_events()
    }

    #[test]
    fn test_add_links_and_attaches() {
        let mut world = World::new();
        let mut processor = processor();
        let component = ball(&mut world, 2.0);
        let entity = component.entity;
        let id = processor.add(&mut world, component);

        assert_eq!(world.get_entity(entity).unwrap().physics, Some(id));
        assert_eq!(processor.get(id).unwrap().state(), ComponentState::Attached);
        let handle = processor.get(id).unwrap().handle().unwrap();
        assert!(processor.simulation().collidable_exists(handle));
    }

    #[test]
    fn test_missing_shape_stays_unattached() {
        let mut world = World::new();
        let mut processor = processor();
        let entity = world.add_entity(Entity::default());
        let id = processor.insert(PhysicsComponent::static_collider(entity));

        assert_eq!(processor.attach(id, &world), Err(AttachError::MissingShape));
        assert_eq!(processor.get(id).unwrap().state(), ComponentState::Unattached);
        assert!(processor.get(id).unwrap().handle().is_none());
    }

    #[test]
    fn test_disabled_simulation_does_not_attach() {
        let mut world = World::new();
        let mut processor = processor_with(SimulationConfig::default().with_disabled(true));
        let component = ball(&mut world, 0.0);
        let id = processor.add(&mut world, component);

        assert_eq!(processor.get(id).unwrap().state(), ComponentState::Unattached);
        assert!(processor.get(id).unwrap().handle().is_none());
    }

    #[test]
    fn test_detach_then_attach_keeps_collidable() {
        let mut world = World::new();
        let mut processor = processor();
        let component = ball(&mut world, 2.0);
        let id = processor.add(&mut world, component);
        let handle = processor.get(id).unwrap().handle();

        processor.detach(id);
        assert!(processor.is_pending_removal(id));
        processor.attach(id, &world).unwrap();
        processor.update_removals(&mut world);

        assert_eq!(processor.get(id).unwrap().state(), ComponentState::Attached);
        assert_eq!(processor.get(id).unwrap().handle(), handle);
        assert!(processor.simulation().collidable_exists(handle.unwrap()));
    }

    #[test]
    fn test_removal_flush_is_idempotent() {
        let mut world = World::new();
        let mut processor = processor();
        let component = ball(&mut world, 2.0);
        let id = processor.add(&mut world, component);
        let handle = processor.get(id).unwrap().handle().unwrap();

        processor.detach(id);
        processor.detach(id);
        processor.update_removals(&mut world);
        assert_eq!(processor.get(id).unwrap().state(), ComponentState::Removed);
        assert!(!processor.simulation().collidable_exists(handle));

        processor.update_removals(&mut world);
        assert_eq!(processor.get(id).unwrap().state(), ComponentState::Removed);
        assert!(processor.get(id).unwrap().handle().is_none());

        // A removed component can come back
        processor.attach(id, &world).unwrap();
        let handle = processor.get(id).unwrap().handle().unwrap();
        assert!(processor.simulation().collidable_exists(handle));
    }

    #[test]
    fn test_remove_drops_and_unlinks() {
        let mut world = World::new();
        let mut processor = processor();
        let component = ball(&mut world, 2.0);
        let entity = component.entity;
        let id = processor.add(&mut world, component);

        assert!(processor.remove(id, &mut world));
        // Still owned until the flush
        assert!(processor.get(id).is_some());
        processor.update_removals(&mut world);

        assert!(processor.get(id).is_none());
        assert_eq!(world.get_entity(entity).unwrap().physics, None);
        assert!(!processor.remove(id, &mut world));
    }

    #[test]
    fn test_events_skip_detached_component() {
        let mut world = World::new();
        let mut processor = processor();
        let floor = floor(&mut world);
        processor.add(&mut world, floor);
        let component = ball(&mut world, 0.45).with_overlap_events(true);
        let id = processor.add(&mut world, component);

        let entered = Rc::new(RefCell::new(0));
        let counter = entered.clone();
        processor
            .subscribe(id, Handler::collider_enter(move |_, _| *counter.borrow_mut() += 1))
            .unwrap();

        processor.simulate(1.0 / 60.0);
        processor.detach(id);
        assert_eq!(processor.send_events(), 0);
        assert_eq!(*entered.borrow(), 0);
    }

    #[test]
    fn test_handler_command_applies_next_flush() {
        let mut world = World::new();
        let mut processor = processor();
        let floor = floor(&mut world);
        processor.add(&mut world, floor);
        let component = ball(&mut world, 0.45).with_overlap_events(true);
        let id = processor.add(&mut world, component);
        processor
            .subscribe(id, Handler::collider_enter(move |e, commands| commands.detach(e.acting)))
            .unwrap();

        assert!(tick(&mut processor, &mut world) >= 1);
        // The request waits for the next flush
        assert_eq!(processor.get(id).unwrap().state(), ComponentState::Attached);
        processor.update_removals(&mut world);
        assert_eq!(processor.get(id).unwrap().state(), ComponentState::Removed);
    }

    #[test]
    fn test_update_bodies_moves_entity() {
        let mut world = World::new();
        let mut processor = processor();
        let component = ball(&mut world, 5.0);
        let entity = component.entity;
        processor.add(&mut world, component);
        world.get_entity_mut(entity).unwrap().clear_dirty();

        tick(&mut processor, &mut world);
        let entity = world.get_entity(entity).unwrap();
        assert!(entity.transform.position.y < 5.0);
        assert!(entity.dirty_flags().contains(DirtyFlags::TRANSFORM));
    }

    #[test]
    fn test_unsubscribe() {
        let mut world = World::new();
        let mut processor = processor();
        let component = ball(&mut world, 0.0);
        let id = processor.insert(component);
        let handler = processor.subscribe(id, Handler::collider_exit(|_, _| {})).unwrap();

        assert!(processor.unsubscribe(id, handler));
        assert!(!processor.unsubscribe(id, handler));
    }

    #[test]
    fn test_rigidbody_access() {
        let mut world = World::new();
        let mut processor = processor();
        let floor_component = floor(&mut world);
        let floor_id = processor.add(&mut world, floor_component);
        let component = ball(&mut world, 3.0);
        let id = processor.add(&mut world, component);

        assert!(processor.rigidbody(floor_id).is_none());
        let mut body = processor.rigidbody(id).unwrap();
        body.set_gravity(Some(Vec3::ZERO));
        body.set_linear_velocity(Vec3::new(1.0, 0.0, 0.0));
        assert_eq!(body.gravity(), Vec3::ZERO);
        assert_eq!(body.linear_velocity(), Vec3::new(1.0, 0.0, 0.0));
    }

    #[test]
    fn test_debug_scene_tracks_attachment() {
        let mut world = World::new();
        let mut processor = processor();
        let component = ball(&mut world, 2.0);
        let id = processor.add(&mut world, component);

        processor.set_collider_shapes_rendering(true, &world);
        assert_eq!(processor.debug_scene().unwrap().len(), 1);

        let component = ball(&mut world, 4.0);
        processor.add(&mut world, component);
        assert_eq!(processor.debug_scene().unwrap().len(), 2);

        processor.detach(id);
        processor.update_removals(&mut world);
        assert!(processor.debug_scene().unwrap().get(id).is_none());

        processor.set_collider_shapes_rendering(false, &world);
        assert!(processor.debug_scene().is_none());
    }

    #[test]
    fn test_teardown_releases_everything() {
        let mut world = World::new();
        let mut processor = processor();
        let floor = floor(&mut world);
        let floor_id = processor.add(&mut world, floor);
        let component = ball(&mut world, 2.0);
        let id = processor.add(&mut world, component);
        let handles = [
            processor.get(floor_id).unwrap().handle().unwrap(),
            processor.get(id).unwrap().handle().unwrap(),
        ];

        processor.teardown();
        assert_eq!(processor.attached_count(), 0);
        for handle in handles {
            assert!(!processor.simulation().collidable_exists(handle));
        }
        assert_eq!(processor.get(id).unwrap().state(), ComponentState::Removed);
    }

    // ==================== Characters ====================

    fn character(world: &mut World, y: f32) -> PhysicsComponent {
        let transform = Transform::from_position(Vec3::new(0.0, y, 0.0));
        let entity = world.add_entity(Entity::new(transform));
        PhysicsComponent::character(entity, CharacterSettings::default().with_mass(2.0))
            .with_shape(ShapeDescription::sphere(0.5))
    }

    #[test]
    fn test_character_attach_and_detach() {
        let mut world = World::new();
        let mut processor = processor();
        let component = character(&mut world, 2.0);
        let id = processor.add(&mut world, component);

        let Some(CollidableHandle::Body(body)) = processor.get(id).unwrap().handle() else {
            panic!("character should be a body");
        };
        assert!(processor.simulation().characters().contains(body));
        let inertia = processor.simulation().body_inertia(body).unwrap();
        assert_eq!(inertia.inverse_mass, 0.5);
        assert_eq!(inertia.inverse_inertia, Vec3::ZERO);
        let controller = processor.simulation().character(body).unwrap();
        assert_eq!(controller.description.minimum_support_continuation_depth, -0.1);

        processor.detach(id);
        // Still driven until the flush
        assert!(processor.simulation().characters().contains(body));
        processor.update_removals(&mut world);
        assert!(processor.simulation().characters().is_empty());
        assert!(processor.character(id).is_none());

        processor.attach(id, &world).unwrap();
        assert_eq!(processor.simulation().characters().len(), 1);
    }

    #[test]
    fn test_character_view() {
        let mut world = World::new();
        let mut processor = processor();
        let floor = floor(&mut world);
        let floor_id = processor.add(&mut world, floor);
        let ball = ball(&mut world, 3.0);
        let ball_id = processor.add(&mut world, ball);
        processor.rigidbody(ball_id).unwrap().set_position(Vec3::new(5.0, 3.0, 0.0));
        let component = character(&mut world, 0.6);
        let id = processor.add(&mut world, component);
        assert!(processor.character(floor_id).is_none());
        assert!(processor.character(ball_id).is_none());

        for _ in 0..60 {
            tick(&mut processor, &mut world);
        }
        let mut character = processor.character(id).unwrap();
        assert!(character.is_supported());
        character.set_movement(Vec2::new(1.0, 0.0), -Vec3::Z);
        assert_eq!(character.target_velocity(), Vec2::new(1.0, 0.0));

        character.teleport(Vec3::new(3.0, 0.5, 0.0));
        assert_eq!(character.position(), Vec3::new(3.0, 0.5, 0.0));

        character.set_mass(4.0);
        assert_eq!(character.mass(), 4.0);
        let body = character.handle();
        assert_eq!(processor.simulation().body_inertia(body).unwrap().inverse_mass, 0.25);
        assert_eq!(processor.get(id).unwrap().character_settings().unwrap().mass, 4.0);

        // Something else changed the inertia; reset restores the mass-derived one
        processor.simulation_mut().set_body_inertia(body, BodyInertia::KINEMATIC);
        processor.character(id).unwrap().reset_inertia();
        assert_eq!(processor.simulation().body_inertia(body).unwrap().inverse_mass, 0.25);
    }

    #[test]
    fn test_character_jumps_off_floor() {
        let mut world = World::new();
        let mut processor = processor();
        let floor = floor(&mut world);
        processor.add(&mut world, floor);
        let component = character(&mut world, 0.6);
        let entity = component.entity;
        let id = processor.add(&mut world, component);
        for _ in 0..60 {
            tick(&mut processor, &mut world);
        }
        let rest = world.get_entity(entity).unwrap().transform.position.y;

        processor.character(id).unwrap().jump();
        for _ in 0..10 {
            tick(&mut processor, &mut world);
        }
        assert!(world.get_entity(entity).unwrap().transform.position.y > rest + 0.3);
        assert!(!processor.character(id).unwrap().is_supported());
    }

    // ==================== Constraints ====================

    fn hinge(a: ComponentId, b: ComponentId) -> ConstraintComponent {
        ConstraintComponent::new(Joint::Hinge {
            body_a: a,
            body_b: b,
            local_offset_a: Vec3::new(0.5, 0.0, 0.0),
            local_offset_b: Vec3::new(-0.5, 0.0, 0.0),
            local_hinge_axis_a: Vec3::Z,
            local_hinge_axis_b: Vec3::Z,
        })
    }

    fn two_balls(processor: &mut PhysicsProcessor, world: &mut World) -> [ComponentId; 2] {
        let a = ball(world, 2.0);
        let a = processor.add(world, a);
        let b = ball(world, 4.0);
        let b = processor.add(world, b);
        [a, b]
    }

    #[test]
    fn test_constraint_attach_adds_to_solver() {
        let mut world = World::new();
        let mut processor = processor();
        let [a, b] = two_balls(&mut processor, &mut world);

        let id = processor.add_constraint(hinge(a, b));
        let constraint = processor.get_constraint(id).unwrap();
        assert_eq!(constraint.state(), ComponentState::Attached);
        let handle = constraint.handle().unwrap();
        assert!(processor.simulation().constraint_exists(handle));
        // Attaching again is a no-op
        processor.attach_constraint(id).unwrap();
        assert_eq!(processor.get_constraint(id).unwrap().handle(), Some(handle));
    }

    #[test]
    fn test_constraint_needs_attached_bodies() {
        let mut world = World::new();
        let mut processor = processor();
        let [a, _] = two_balls(&mut processor, &mut world);
        let floor = floor(&mut world);
        let floor_id = processor.add(&mut world, floor);
        let loose = ball(&mut world, 6.0);
        let loose = processor.insert(loose);

        let id = processor.add_constraint(hinge(a, loose));
        assert_eq!(processor.get_constraint(id).unwrap().state(), ComponentState::Unattached);
        let result = processor.attach_constraint(id);
        assert_eq!(result, Err(ConstraintError::BodyNotAttached(loose)));

        let id = processor.add_constraint(hinge(a, floor_id));
        assert_eq!(processor.attach_constraint(id), Err(ConstraintError::NotABody(floor_id)));
        assert!(processor.get_constraint(id).unwrap().handle().is_none());
    }

    #[test]
    fn test_constraint_update_reaches_solver() {
        let mut world = World::new();
        let mut processor = processor();
        let [a, b] = two_balls(&mut processor, &mut world);
        let id = processor.add_constraint(hinge(a, b));

        processor
            .update_constraint(id, |c| c.spring = SpringSettings::new(12.0, 0.5))
            .unwrap();
        let handle = processor.get_constraint(id).unwrap().handle().unwrap();
        match processor.simulation().constraint(handle).unwrap() {
            ConstraintDescription::Hinge { spring, .. } => {
                assert_eq!(spring, SpringSettings::new(12.0, 0.5));
            }
            other => panic!("unexpected {:?}", other),
        }

        // Unattached constraints only keep the edit
        let loose = processor.insert(ball(&mut world, 8.0));
        let pending = processor.add_constraint(hinge(a, loose));
        let relaxed = SpringSettings::new(1.0, 1.0);
        processor.update_constraint(pending, |c| c.spring = relaxed).unwrap();
        assert_eq!(processor.get_constraint(pending).unwrap().spring, relaxed);
    }

    #[test]
    fn test_angular_servo_force_from_mass() {
        let mut world = World::new();
        let mut processor = processor();
        let transform = Transform::from_position(Vec3::new(0.0, 2.0, 0.0));
        let entity = world.add_entity(Entity::new(transform));
        let settings = RigidbodySettings::default().with_mass(3.0);
        let component = PhysicsComponent::rigidbody(entity, settings)
            .with_shape(ShapeDescription::sphere(0.5));
        let body = processor.add(&mut world, component);

        let target = Quat::from_axis_angle(Vec3::Y, 0.5);
        let id = processor.add_constraint(ConstraintComponent::new(Joint::OneBodyAngularServo {
            body,
            target_orientation: target,
        }));
        let handle = processor.get_constraint(id).unwrap().handle().unwrap();
        let Some(ConstraintDescription::OneBodyAngularServo {
            target_orientation,
            servo,
            spring,
            ..
        }) = processor.simulation().constraint(handle)
        else {
            panic!("servo should be stored");
        };
        assert_eq!(target_orientation, target);
        assert!((servo.max_force - 1080.0).abs() < 1e-2);
        assert_eq!(servo.max_speed, f32::MAX);
        assert_eq!(spring, SpringSettings::new(5.0, 2.0));
    }

    #[test]
    fn test_constraint_detach_is_deferred() {
        let mut world = World::new();
        let mut processor = processor();
        let [a, b] = two_balls(&mut processor, &mut world);
        let id = processor.add_constraint(hinge(a, b));
        let handle = processor.get_constraint(id).unwrap().handle().unwrap();

        processor.detach_constraint(id);
        let state = processor.get_constraint(id).unwrap().state();
        assert_eq!(state, ComponentState::PendingRemoval);
        assert!(processor.simulation().constraint_exists(handle));

        // Re-attaching before the flush keeps the solver constraint
        processor.attach_constraint(id).unwrap();
        processor.update_removals(&mut world);
        assert!(processor.simulation().constraint_exists(handle));

        processor.detach_constraint(id);
        processor.update_removals(&mut world);
        assert_eq!(processor.get_constraint(id).unwrap().state(), ComponentState::Removed);
        assert!(!processor.simulation().constraint_exists(handle));

        assert!(processor.remove_constraint(id));
        assert!(processor.get_constraint(id).is_none());
        assert!(!processor.remove_constraint(id));
    }

    #[test]
    fn test_body_removal_releases_constraints_first() {
        let mut world = World::new();
        let mut processor = processor();
        let [a, b] = two_balls(&mut processor, &mut world);
        let id = processor.add_constraint(hinge(a, b));
        let removed = processor.add_constraint(hinge(a, b));
        let handles = [id, removed].map(|c| processor.get_constraint(c).unwrap().handle().unwrap());
        assert!(processor.remove_constraint(removed));

        processor.detach(b);
        processor.update_removals(&mut world);
        assert_eq!(processor.get_constraint(id).unwrap().state(), ComponentState::Removed);
        assert!(processor.get_constraint(id).unwrap().handle().is_none());
        assert!(processor.get_constraint(removed).is_none());
        for handle in handles {
            assert!(!processor.simulation().constraint_exists(handle));
        }

        // Needs both bodies back
        assert!(processor.attach_constraint(id).is_err());
        processor.attach(b, &world).unwrap();
        processor.attach_constraint(id).unwrap();
    }

    #[test]
    fn test_teardown_releases_constraints() {
        let mut world = World::new();
        let mut processor = processor();
        let [a, b] = two_balls(&mut processor, &mut world);
        let id = processor.add_constraint(hinge(a, b));
        let handle = processor.get_constraint(id).unwrap().handle().unwrap();

        processor.teardown();
        assert_eq!(processor.get_constraint(id).unwrap().state(), ComponentState::Removed);
        assert!(!processor.simulation().constraint_exists(handle));
        assert_eq!(processor.constraint_count(), 1);
    }
}
