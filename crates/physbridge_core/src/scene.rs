//! Scene serialization
//!
//! Provides Scene struct for loading/saving scenes from RON files.
//! Scenes contain entity templates with optional physics components.

use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use std::fs;
use std::io;
use std::path::Path;

use physbridge_math::Vec3;
use physbridge_physics::{CollisionPreset, PhysicsMaterial, ShapeDescription};

use crate::component::{CharacterSettings, PhysicsComponent, RigidbodySettings};
use crate::processor::PhysicsProcessor;
use crate::world::{EntityKey, World};
use crate::{Entity, Transform};

/// Kind of physics component a template creates
#[derive(Clone, Copy, Debug, PartialEq, Serialize, Deserialize)]
pub enum PhysicsKind {
    Rigidbody(RigidbodySettings),
    Character(CharacterSettings),
    Static,
}

/// Serializable description of a physics component
#[derive(Clone, Copy, Debug, PartialEq, Serialize, Deserialize)]
pub struct PhysicsTemplate {
    pub kind: PhysicsKind,
    pub shape: ShapeDescription,
    /// Falls back to the kind's default preset
    #[serde(default)]
    pub preset: Option<CollisionPreset>,
    #[serde(default)]
    pub generate_overlap_events: bool,
    #[serde(default)]
    pub material: PhysicsMaterial,
}

impl PhysicsTemplate {
    fn build(&self, entity: EntityKey) -> PhysicsComponent {
        let component = match self.kind {
            PhysicsKind::Rigidbody(settings) => PhysicsComponent::rigidbody(entity, settings),
            PhysicsKind::Character(settings) => PhysicsComponent::character(entity, settings),
            PhysicsKind::Static => PhysicsComponent::static_collider(entity),
        };
        let component = component
            .with_shape(self.shape)
            .with_overlap_events(self.generate_overlap_events)
            .with_material(self.material);
        match self.preset {
            Some(preset) => component.with_preset(preset),
            None => component,
        }
    }
}

/// Serializable description of an entity
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct EntityTemplate {
    #[serde(default)]
    pub name: Option<String>,
    #[serde(default)]
    pub tags: HashSet<String>,
    #[serde(default)]
    pub transform: Transform,
    #[serde(default)]
    pub physics: Option<PhysicsTemplate>,
}

impl EntityTemplate {
    pub fn new(transform: Transform) -> Self {
        Self {
            transform,
            ..Self::default()
        }
    }

    pub fn with_name(mut self, name: impl Into<String>) -> Self {
        self.name = Some(name.into());
        self
    }

    pub fn with_tag(mut self, tag: impl Into<String>) -> Self {
        self.tags.insert(tag.into());
        self
    }

    pub fn with_physics(mut self, physics: PhysicsTemplate) -> Self {
        self.physics = Some(physics);
        self
    }

    fn to_entity(&self) -> Entity {
        let mut entity = Entity::new(self.transform);
        entity.name = self.name.clone();
        entity.tags = self.tags.clone();
        entity
    }
}

/// A serializable scene containing entity templates
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Scene {
    /// Scene name (for display/debugging)
    pub name: String,
    /// Entity templates in this scene
    pub entities: Vec<EntityTemplate>,
    /// Overrides the simulation's gravity when instantiated
    #[serde(default)]
    pub gravity: Option<[f32; 3]>,
}

impl Scene {
    /// Create a new empty scene
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            entities: Vec::new(),
            gravity: None,
        }
    }

    /// Load a scene from a RON file
    pub fn load<P: AsRef<Path>>(path: P) -> Result<Self, SceneLoadError> {
        let contents = fs::read_to_string(path)?;
        Self::from_ron(&contents)
    }

    /// Parse a scene from RON text
    pub fn from_ron(contents: &str) -> Result<Self, SceneLoadError> {
        Ok(ron::from_str(contents)?)
    }

    /// Save a scene to a RON file
    pub fn save<P: AsRef<Path>>(&self, path: P) -> Result<(), SceneSaveError> {
        let pretty = ron::ser::PrettyConfig::new()
            .struct_names(true)
            .enumerate_arrays(false);
        let contents = ron::ser::to_string_pretty(self, pretty)?;
        fs::write(path, contents)?;
        Ok(())
    }

    /// Add an entity template to this scene
    pub fn add_entity(&mut self, entity: EntityTemplate) {
        self.entities.push(entity);
    }

    pub fn with_entity(mut self, entity: EntityTemplate) -> Self {
        self.entities.push(entity);
        self
    }

    pub fn with_gravity(mut self, gravity: Vec3) -> Self {
        self.gravity = Some(gravity.to_array());
        self
    }

    /// Spawn every entity into `world` and attach its physics component
    ///
    /// Returns the spawned entities in template order. Components that fail
    /// to attach stay owned by the processor, unattached.
    pub fn instantiate(
        &self,
        world: &mut World,
        processor: &mut PhysicsProcessor,
    ) -> Vec<EntityKey> {
        if let Some([x, y, z]) = self.gravity {
            processor.simulation_mut().set_gravity(Vec3::new(x, y, z));
        }
        let keys: Vec<EntityKey> = self
            .entities
            .iter()
            .map(|template| {
                let key = world.add_entity(template.to_entity());
                if let Some(physics) = &template.physics {
                    processor.add(world, physics.build(key));
                }
                key
            })
            .collect();
        log::info!("Instantiated scene '{}' with {} entities", self.name, keys.len());
        keys
    }
}

/// Error loading a scene
#[derive(Debug)]
pub enum SceneLoadError {
    /// IO error (file not found, permission denied, etc.)
    Io(io::Error),
    /// Parse error (invalid RON syntax)
    Parse(ron::error::SpannedError),
}

impl From<io::Error> for SceneLoadError {
    fn from(e: io::Error) -> Self {
        SceneLoadError::Io(e)
    }
}

impl From<ron::error::SpannedError> for SceneLoadError {
    fn from(e: ron::error::SpannedError) -> Self {
        SceneLoadError::Parse(e)
    }
}

impl std::fmt::Display for SceneLoadError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            SceneLoadError::Io(e) => write!(f, "IO error: {}", e),
            SceneLoadError::Parse(e) => write!(f, "Parse error: {}", e),
        }
    }
}

impl std::error::Error for SceneLoadError {}

/// Error saving a scene
#[derive(Debug)]
pub enum SceneSaveError {
    /// IO error (permission denied, disk full, etc.)
    Io(io::Error),
    /// Serialization error
    Serialize(ron::Error),
}

impl From<io::Error> for SceneSaveError {
    fn from(e: io::Error) -> Self {
        SceneSaveError::Io(e)
    }
}

impl From<ron::Error> for SceneSaveError {
    fn from(e: ron::Error) -> Self {
        SceneSaveError::Serialize(e)
    }
}

impl std::fmt::Display for SceneSaveError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            SceneSaveError::Io(e) => write!(f, "IO error: {}", e),
            SceneSaveError::Serialize(e) => write!(f, "Serialize error: {}", e),
        }
    }
}

impl std::error::Error for SceneSaveError {}
