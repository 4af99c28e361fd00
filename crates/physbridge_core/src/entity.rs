//! Entity type
//!
//! An Entity is an object in the scene with a transform and, optionally, a
//! physics component owned by the [`PhysicsProcessor`](crate::PhysicsProcessor).

use std::collections::HashSet;

use bitflags::bitflags;
use physbridge_math::Vec3;
use physbridge_physics::ComponentId;

use crate::Transform;

bitflags! {
    /// Flags indicating which parts of an entity have changed and need updating
    #[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
    pub struct DirtyFlags: u8 {
        /// No changes
        const NONE = 0;
        /// Transform (position, rotation, scale) has changed
        const TRANSFORM = 1 << 0;
        /// The physics component was linked or unlinked
        const PHYSICS = 1 << 1;
        /// All flags set
        const ALL = Self::TRANSFORM.bits() | Self::PHYSICS.bits();
    }
}

/// An entity in the scene
///
/// Each entity has:
/// - An optional name (for lookup by name)
/// - Tags (for categorization and filtering)
/// - A transform
/// - An optional physics component id
/// - Dirty flags (for change tracking)
#[derive(Clone, Debug)]
pub struct Entity {
    /// Optional name for this entity (for lookup)
    pub name: Option<String>,
    /// Tags for categorization (e.g., "dynamic", "static", "trigger")
    pub tags: HashSet<String>,
    /// The entity's transform
    pub transform: Transform,
    /// Physics component driving or observing this entity
    pub physics: Option<ComponentId>,
    dirty: DirtyFlags,
}

impl Default for Entity {
    fn default() -> Self {
        Self::new(Transform::identity())
    }
}

impl Entity {
    /// Create a new entity at the given transform
    pub fn new(transform: Transform) -> Self {
        Self {
            name: None,
            tags: HashSet::new(),
            transform,
            physics: None,
            dirty: DirtyFlags::ALL, // New entities are dirty
        }
    }

    /// Set the name of this entity (for lookup)
    pub fn with_name(mut self, name: impl Into<String>) -> Self {
        self.name = Some(name.into());
        self
    }

    /// Add a tag to this entity
    pub fn with_tag(mut self, tag: impl Into<String>) -> Self {
        self.tags.insert(tag.into());
        self
    }

    /// Check if this entity has a specific tag
    pub fn has_tag(&self, tag: &str) -> bool {
        self.tags.contains(tag)
    }

    // --- Dirty tracking methods ---

    #[inline]
    pub fn is_dirty(&self) -> bool {
        !self.dirty.is_empty()
    }

    #[inline]
    pub fn dirty_flags(&self) -> DirtyFlags {
        self.dirty
    }

    #[inline]
    pub fn mark_dirty(&mut self, flags: DirtyFlags) {
        self.dirty |= flags;
    }

    #[inline]
    pub fn clear_dirty(&mut self) {
        self.dirty = DirtyFlags::NONE;
    }

    /// Set the position and mark the transform as dirty
    pub fn set_position(&mut self, position: Vec3) {
        self.transform.position = position;
        self.mark_dirty(DirtyFlags::TRANSFORM);
    }

    /// Set the transform and mark it as dirty
    pub fn set_transform(&mut self, transform: Transform) {
        self.transform = transform;
        self.mark_dirty(DirtyFlags::TRANSFORM);
    }

    /// Link or unlink the physics component
    pub fn set_physics(&mut self, component: Option<ComponentId>) {
        self.physics = component;
        self.mark_dirty(DirtyFlags::PHYSICS);
    }
}
