//! physbridge demo
//!
//! Loads a scene, runs the physics tick loop for a fixed number of ticks and
//! logs contact events and final body positions.

use std::cell::Cell;
use std::rc::Rc;

use physbridge::config::AppConfig;
use physbridge::systems::PhysicsSystem;
use physbridge_core::{
    CharacterSettings, CollisionPreset, EntityTemplate, Handler, PhysicsKind, PhysicsMaterial,
    PhysicsProcessor, PhysicsTemplate, RigidbodySettings, Scene, ShapeDescription, Transform, World,
};
use physbridge_math::{Vec2, Vec3};
use physbridge_physics::{ReferenceSolver, Simulation};

/// Scene used when the configured scene file cannot be loaded
fn fallback_scene() -> Scene {
    let floor = EntityTemplate::new(Transform::from_position(Vec3::new(0.0, -0.5, 0.0)))
        .with_name("floor")
        .with_physics(PhysicsTemplate {
            kind: PhysicsKind::Static,
            shape: ShapeDescription::cuboid(Vec3::new(20.0, 0.5, 20.0)),
            preset: Some(CollisionPreset::BlockAll),
            generate_overlap_events: false,
            material: PhysicsMaterial::default(),
        });

    let mut scene = Scene::new("fallback").with_entity(floor);
    for i in 0..3 {
        let position = Vec3::new(i as f32 * 1.5 - 1.5, 2.0 + i as f32, 0.0);
        scene.add_entity(
            EntityTemplate::new(Transform::from_position(position))
                .with_name(format!("ball_{}", i))
                .with_tag("dynamic")
                .with_physics(PhysicsTemplate {
                    kind: PhysicsKind::Rigidbody(
                        RigidbodySettings::default().with_interpolation(true),
                    ),
                    shape: ShapeDescription::sphere(0.5),
                    preset: None,
                    generate_overlap_events: true,
                    material: PhysicsMaterial::new(0.6, 0.3),
                }),
        );
    }
    scene.add_entity(
        EntityTemplate::new(Transform::from_position(Vec3::new(3.0, 1.0, 4.0)))
            .with_name("player")
            .with_physics(PhysicsTemplate {
                kind: PhysicsKind::Character(CharacterSettings::default()),
                shape: ShapeDescription::sphere(0.5),
                preset: None,
                generate_overlap_events: false,
                material: PhysicsMaterial::default(),
            }),
    );
    scene
}

fn main() {
    // Load configuration before logging so the configured level can apply
    let (config, config_error) = match AppConfig::load() {
        Ok(config) => (config, None),
        Err(e) => (AppConfig::default(), Some(e)),
    };
    let env = env_logger::Env::default().default_filter_or(config.debug.log_level.as_str());
    env_logger::Builder::from_env(env).init();
    if let Some(e) = config_error {
        log::warn!("Failed to load config: {}. Using defaults.", e);
    }
    log::info!("Starting physbridge demo");

    let scene = Scene::load(&config.demo.scene).unwrap_or_else(|e| {
        log::warn!("Failed to load scene '{}': {}. Using fallback scene.", config.demo.scene, e);
        fallback_scene()
    });

    let simulation = Simulation::new(Box::new(ReferenceSolver::new()), config.simulation_config());
    let mut processor = PhysicsProcessor::new(simulation);
    let mut world = World::new();
    let entities = scene.instantiate(&mut world, &mut processor);
    processor.set_collider_shapes_rendering(config.debug.show_colliders, &world);

    // Count enters on every component that asked for events
    let enters = Rc::new(Cell::new(0u32));
    let listeners: Vec<_> = processor
        .iter()
        .filter(|(_, c)| c.generate_overlap_events)
        .map(|(id, c)| (id, c.entity))
        .collect();
    for (id, entity) in listeners {
        let name = world
            .get_entity(entity)
            .and_then(|e| e.name.clone())
            .unwrap_or_else(|| format!("{:?}", entity));
        let enters = enters.clone();
        processor.subscribe(
            id,
            Handler::collider_enter(move |event, _| {
                enters.set(enters.get() + 1);
                log::info!("{} touched {:?}", name, event.other);
            }),
        );
    }

    // Walk every character toward -Z
    let characters: Vec<_> = processor
        .iter()
        .filter(|(_, c)| c.is_character())
        .map(|(id, _)| id)
        .collect();
    for id in characters {
        if let Some(mut character) = processor.character(id) {
            character.set_movement(Vec2::new(0.0, 1.5), Vec3::new(0.0, 0.0, -1.0));
        }
    }

    let mut system = PhysicsSystem::new();
    let dt = 1.0 / config.demo.tick_rate.max(1.0);
    for _ in 0..config.demo.ticks {
        system.step(&mut processor, &mut world, dt);
        for key in &entities {
            if let Some(entity) = world.get_entity_mut(*key) {
                entity.clear_dirty();
            }
        }
    }

    for key in &entities {
        if let Some(entity) = world.get_entity(*key) {
            let p = entity.transform.position;
            log::info!(
                "{}: ({:.3}, {:.3}, {:.3})",
                entity.name.as_deref().unwrap_or("<unnamed>"),
                p.x,
                p.y,
                p.z
            );
        }
    }
    let down = Vec3::new(0.0, -1.0, 0.0);
    if let Some(hit) = processor.raycast(Vec3::new(0.0, 50.0, 0.0), down, 100.0) {
        log::info!("Ray from above hit {:?} at distance {:.3}", hit.entity, hit.distance);
    }
    if let Some(debug) = processor.debug_scene() {
        log::info!("{} collider visual(s)", debug.len());
    }
    log::info!("{} enter event(s) over {} ticks", enters.get(), config.demo.ticks);

    processor.teardown();
}
