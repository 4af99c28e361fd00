//! The bridge's side of the solver callbacks
//!
//! These borrow the simulation's tables for the duration of one timestep.

use crossbeam_channel::Sender;
use physbridge_math::Vec3;

use crate::characters::CharacterControllers;
use crate::collision::{allow_contact, is_blocking, is_overlap};
use crate::contacts::{ContactEventHandler, ContactEvents};
use crate::events::{ContactData, PhysicsEvent};
use crate::handle::{BodyHandle, CollidableHandle, CollidablePair};
use crate::material::PairMaterial;
use crate::properties::{
    BodySettings, CollidableProperty, ComponentId, Damping, PhysicsTag, PropertyTables,
};
use crate::solver::{
    BodyInertia, BodyVelocity, ContactManifold, ContactPoint, NarrowPhaseCallbacks,
    PoseIntegratorCallbacks, WorkerOutput,
};

/// Translates tracker callbacks into [`PhysicsEvent`]s for owning components
#[derive(Clone, Copy)]
pub struct EventRouter<'a> {
    tags: &'a CollidableProperty<PhysicsTag>,
    sender: &'a Sender<PhysicsEvent>,
}

impl<'a> EventRouter<'a> {
    pub fn new(
        tags: &'a CollidableProperty<PhysicsTag>,
        sender: &'a Sender<PhysicsEvent>,
    ) -> Self {
        Self { tags, sender }
    }

    fn post(
        &self,
        source: CollidableHandle,
        other: CollidableHandle,
        build: impl FnOnce(ComponentId, ComponentId) -> PhysicsEvent,
    ) {
        let (Some(acting), Some(other)) = (self.tags.try_get(source), self.tags.try_get(other))
        else {
            log::trace!("Dropping contact event for untagged pair {} / {}", source, other);
            return;
        };
        let _ = self.sender.send(build(acting.component, other.component));
    }
}

impl ContactEventHandler for EventRouter<'_> {
    fn on_contact_added(
        &self,
        source: CollidableHandle,
        other: CollidableHandle,
        contact: &ContactPoint,
    ) {
        let contact = ContactData::from(contact);
        self.post(source, other, |acting, other| PhysicsEvent::ContactAdded {
            acting,
            other,
            contact,
        });
    }

    fn on_contact_removed(
        &self,
        source: CollidableHandle,
        other: CollidableHandle,
        contact: &ContactPoint,
    ) {
        let contact = ContactData::from(contact);
        self.post(source, other, |acting, other| PhysicsEvent::ContactRemoved {
            acting,
            other,
            contact,
        });
    }

    fn on_collider_enter(&self, source: CollidableHandle, other: CollidableHandle) {
        self.post(source, other, |acting, other| PhysicsEvent::ColliderEnter { acting, other });
    }

    fn on_collider_exit(&self, source: CollidableHandle, other: CollidableHandle) {
        self.post(source, other, |acting, other| PhysicsEvent::ColliderExit { acting, other });
    }
}

/// Narrow-phase hooks: collision filtering, pair materials, event routing
/// and character support detection
pub struct BridgeNarrowPhase<'a> {
    tables: &'a PropertyTables,
    contacts: &'a ContactEvents,
    characters: &'a CharacterControllers,
    router: EventRouter<'a>,
}

impl<'a> BridgeNarrowPhase<'a> {
    pub fn new(
        tables: &'a PropertyTables,
        contacts: &'a ContactEvents,
        characters: &'a CharacterControllers,
        router: EventRouter<'a>,
    ) -> Self {
        Self {
            tables,
            contacts,
            characters,
            router,
        }
    }
}

impl NarrowPhaseCallbacks for BridgeNarrowPhase<'_> {
    fn allow_contact_generation(&self, a: CollidableHandle, b: CollidableHandle) -> bool {
        allow_contact(&self.tables.collision[a], &self.tables.collision[b])
    }

    fn configure_contact_manifold(
        &self,
        output: &mut WorkerOutput,
        pair: CollidablePair,
        manifold: &ContactManifold,
    ) -> Option<PairMaterial> {
        let a = &self.tables.collision[pair.a];
        let b = &self.tables.collision[pair.b];

        if is_overlap(a, b) {
            // Each side that asked for events sees the pair from its own side
            let batch = &mut output.contacts;
            if a.generate_overlap_events {
                self.contacts.handle_manifold(batch, pair, manifold, &self.router);
            }
            if b.generate_overlap_events {
                self.contacts.handle_manifold(batch, pair.flipped(), manifold, &self.router);
            }
        }

        if !is_blocking(a, b) {
            return None;
        }
        // Only surfaces the character actually rests on can carry it
        self.characters.try_report_contacts(&mut output.supports, pair, manifold);
        Some(PairMaterial::combine(
            &self.tables.materials[pair.a],
            &self.tables.materials[pair.b],
        ))
    }
}

/// Velocity integration with gravity and damping, honoring per-body overrides
pub struct BridgePoseIntegrator<'a> {
    settings: &'a CollidableProperty<BodySettings>,
    gravity: Vec3,
    damping: Damping,
}

impl<'a> BridgePoseIntegrator<'a> {
    pub fn new(
        settings: &'a CollidableProperty<BodySettings>,
        gravity: Vec3,
        damping: Damping,
    ) -> Self {
        Self {
            settings,
            gravity,
            damping,
        }
    }
}

/// Fraction of velocity kept after damping over `dt`
#[inline]
fn damping_factor(damping: f32, dt: f32) -> f32 {
    (1.0 - damping).clamp(0.0, 1.0).powf(dt)
}

impl PoseIntegratorCallbacks for BridgePoseIntegrator<'_> {
    fn integrate_velocity(
        &self,
        body: BodyHandle,
        inertia: &BodyInertia,
        velocity: &mut BodyVelocity,
        dt: f32,
    ) {
        if inertia.is_kinematic() {
            return;
        }
        let settings = self.settings.try_get(body.into()).copied().unwrap_or_default();
        let gravity = settings.custom_gravity.unwrap_or(self.gravity);
        let damping = settings.custom_damping.unwrap_or(self.damping);

        velocity.linear = (velocity.linear + gravity * dt) * damping_factor(damping.linear, dt);
        velocity.angular = velocity.angular * damping_factor(damping.angular, dt);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::collision::CollisionProperty;
    use crate::events::EventQueue;
    use crate::handle::StaticHandle;
    use crate::presets::CollisionPreset;
    use crate::properties::CollidableRecord;
    use crate::characters::CharacterDescription;
    use crate::solver::FeatureId;
    use slotmap::SlotMap;

    struct Fixture {
        tables: PropertyTables,
        contacts: ContactEvents,
        characters: CharacterControllers,
        queue: EventQueue,
        ids: SlotMap<ComponentId, ()>,
    }

    impl Fixture {
        fn new() -> Self {
            Self {
                tables: PropertyTables::new(),
                contacts: ContactEvents::new(),
                characters: CharacterControllers::new(),
                queue: EventQueue::new(),
                ids: SlotMap::with_key(),
            }
        }

        fn add(&mut self, handle: CollidableHandle, collision: CollisionProperty) -> ComponentId {
            let id = self.ids.insert(());
            self.tables.allocate(handle, CollidableRecord::new(id, collision));
            if collision.generate_overlap_events {
                self.contacts.register_listener(handle);
            }
            id
        }

        fn narrow_phase(&self) -> BridgeNarrowPhase<'_> {
            let router = EventRouter::new(&self.tables.tags, self.queue.sender());
            BridgeNarrowPhase::new(&self.tables, &self.contacts, &self.characters, router)
        }

        fn configure_into(
            &self,
            output: &mut WorkerOutput,
            pair: CollidablePair,
            manifold: &ContactManifold,
        ) -> Option<PairMaterial> {
            self.narrow_phase().configure_contact_manifold(output, pair, manifold)
        }

        fn configure(
            &self,
            pair: CollidablePair,
            manifold: &ContactManifold,
        ) -> Option<PairMaterial> {
            self.configure_into(&mut WorkerOutput::new(), pair, manifold)
        }
    }

    fn touching() -> ContactManifold {
        let contact = ContactPoint::new(Vec3::ZERO, Vec3::Y, 0.05, FeatureId(1));
        ContactManifold::new().with_contact(contact)
    }

    #[test]
    fn test_blocking_pair_gets_material() {
        let mut fx = Fixture::new();
        let a: CollidableHandle = BodyHandle(0).into();
        let b: CollidableHandle = StaticHandle(0).into();
        fx.add(a, CollisionPreset::PhysicsActor.to_property(false));
        fx.add(b, CollisionPreset::BlockAll.to_property(false));

        let pair = CollidablePair::new(BodyHandle(0), StaticHandle(0));
        let material = fx.configure(pair, &touching());
        assert!(material.is_some());
        assert!(fx.queue.is_empty());
    }

    #[test]
    fn test_query_only_overlap_routes_events_without_response() {
        let mut fx = Fixture::new();
        let pawn: CollidableHandle = BodyHandle(0).into();
        let wall: CollidableHandle = StaticHandle(0).into();
        let mut pawn_prop = CollisionPreset::Pawn.to_property(true);
        pawn_prop.enabled = crate::collision::CollisionEnabled::QueryOnly;
        let pawn_id = fx.add(pawn, pawn_prop);
        let wall_id = fx.add(wall, CollisionPreset::BlockAll.to_property(false));

        let pair = CollidablePair::new(BodyHandle(0), StaticHandle(0));
        let mut output = WorkerOutput::new();
        let material = fx.configure_into(&mut output, pair, &touching());
        assert!(material.is_none());
        // Tracker messages wait in the worker's own output
        assert_eq!(output.contacts.len(), 1);

        let events = fx.queue.drain();
        assert_eq!(events.len(), 2);
        assert!(events.iter().all(|e| e.acting() == pawn_id && e.other() == wall_id));
    }

    #[test]
    fn test_both_listeners_receive_events() {
        let mut fx = Fixture::new();
        let a_id = fx.add(BodyHandle(0).into(), CollisionPreset::PhysicsActor.to_property(true));
        let b_id = fx.add(BodyHandle(1).into(), CollisionPreset::PhysicsActor.to_property(true));

        fx.configure(CollidablePair::new(BodyHandle(0), BodyHandle(1)), &touching());
        let events = fx.queue.drain();
        assert!(events.iter().any(|e| e.acting() == a_id && e.other() == b_id));
        assert!(events.iter().any(|e| e.acting() == b_id && e.other() == a_id));
    }

    #[test]
    fn test_allow_contact_uses_tables() {
        let mut fx = Fixture::new();
        fx.add(BodyHandle(0).into(), CollisionPreset::NoCollision.to_property(false));
        fx.add(BodyHandle(1).into(), CollisionPreset::PhysicsActor.to_property(false));
        let narrow = fx.narrow_phase();
        assert!(!narrow.allow_contact_generation(BodyHandle(0).into(), BodyHandle(1).into()));
    }

    #[test]
    fn test_character_support_needs_blocking_pair() {
        let mut fx = Fixture::new();
        fx.add(BodyHandle(0).into(), CollisionPreset::Pawn.to_property(false));
        fx.add(StaticHandle(0).into(), CollisionPreset::BlockAll.to_property(false));
        fx.add(StaticHandle(1).into(), CollisionPreset::OverlapAll.to_property(false));
        fx.characters.allocate(BodyHandle(0), CharacterDescription::default());

        let mut output = WorkerOutput::new();
        let ground = CollidablePair::new(BodyHandle(0), StaticHandle(0));
        fx.configure_into(&mut output, ground, &touching());
        assert_eq!(output.supports.len(), 1);

        let trigger = CollidablePair::new(BodyHandle(0), StaticHandle(1));
        fx.configure_into(&mut output, trigger, &touching());
        assert_eq!(output.supports.len(), 1);
    }

    #[test]
    fn test_integrator_gravity_and_damping() {
        let settings = CollidableProperty::new();
        let gravity = Vec3::new(0.0, -10.0, 0.0);
        let integrator = BridgePoseIntegrator::new(&settings, gravity, Damping::new(0.0, 0.5));
        let inertia = BodyInertia {
            inverse_mass: 1.0,
            inverse_inertia: Vec3::ONE,
        };
        let mut velocity = BodyVelocity { linear: Vec3::ZERO, angular: Vec3::X };

        integrator.integrate_velocity(BodyHandle(0), &inertia, &mut velocity, 1.0);
        assert!((velocity.linear.y + 10.0).abs() < 1e-5);
        assert!((velocity.angular.x - 0.5).abs() < 1e-5);
    }

    #[test]
    fn test_integrator_overrides_are_per_body() {
        let mut settings = CollidableProperty::new();
        settings.allocate(
            BodyHandle(0).into(),
            BodySettings {
                custom_gravity: Some(Vec3::ZERO),
                custom_damping: None,
            },
        );
        let gravity = Vec3::new(0.0, -10.0, 0.0);
        let integrator = BridgePoseIntegrator::new(&settings, gravity, Damping::new(0.0, 0.0));
        let inertia = BodyInertia {
            inverse_mass: 1.0,
            inverse_inertia: Vec3::ONE,
        };

        let mut floating = BodyVelocity::default();
        integrator.integrate_velocity(BodyHandle(0), &inertia, &mut floating, 0.5);
        let mut falling = BodyVelocity::default();
        integrator.integrate_velocity(BodyHandle(1), &inertia, &mut falling, 0.5);

        assert_eq!(floating.linear, Vec3::ZERO);
        assert!((falling.linear.y + 5.0).abs() < 1e-5);
    }

    #[test]
    fn test_integrator_skips_kinematic() {
        let settings = CollidableProperty::new();
        let gravity = Vec3::new(0.0, -10.0, 0.0);
        let integrator = BridgePoseIntegrator::new(&settings, gravity, Damping::default());
        let mut velocity = BodyVelocity {
            linear: Vec3::X,
            angular: Vec3::ZERO,
        };
        let kinematic = BodyInertia::KINEMATIC;
        integrator.integrate_velocity(BodyHandle(0), &kinematic, &mut velocity, 1.0);
        assert_eq!(velocity.linear, Vec3::X);
    }
}
