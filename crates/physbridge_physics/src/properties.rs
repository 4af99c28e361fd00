//! Collidable property tables
//!
//! Sparse storage that attaches bridge-side data to solver handles. Bodies
//! and statics live in separate handle spaces, so each table keeps one slot
//! vector per kind, indexed directly by the handle payload.
//!
//! Existence is tracked by the solver. Reading a slot that was never
//! allocated is a programming error and panics; use [`CollidableProperty::try_get`]
//! when the caller cannot guarantee the handle is live.

use std::ops::{Index, IndexMut};

use physbridge_math::Vec3;
use slotmap::new_key_type;

use crate::collision::CollisionProperty;
use crate::handle::CollidableHandle;
use crate::material::PhysicsMaterial;

new_key_type! {
    /// Identity of the entity-side component that owns a collidable
    pub struct ComponentId;
}

/// Per-body integration overrides
#[derive(Clone, Copy, Debug, Default, PartialEq)]
pub struct BodySettings {
    /// Replaces the global gravity for this body when set
    pub custom_gravity: Option<Vec3>,
    /// Replaces the global damping for this body when set
    pub custom_damping: Option<Damping>,
}

/// Linear and angular damping coefficients, both in [0, 1]
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct Damping {
    pub linear: f32,
    pub angular: f32,
}

impl Damping {
    pub fn new(linear: f32, angular: f32) -> Self {
        Self {
            linear: linear.clamp(0.0, 1.0),
            angular: angular.clamp(0.0, 1.0),
        }
    }
}

impl Default for Damping {
    fn default() -> Self {
        Self { linear: 0.03, angular: 0.03 }
    }
}

/// Owner tag stored for every collidable
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct PhysicsTag {
    pub component: ComponentId,
}

/// Handle-indexed sparse table
#[derive(Debug, Clone)]
pub struct CollidableProperty<T> {
    bodies: Vec<Option<T>>,
    statics: Vec<Option<T>>,
}

impl<T> Default for CollidableProperty<T> {
    fn default() -> Self {
        Self::new()
    }
}

impl<T> CollidableProperty<T> {
    /// Create an empty table
    pub fn new() -> Self {
        Self {
            bodies: Vec::new(),
            statics: Vec::new(),
        }
    }

    fn slots(&self, handle: CollidableHandle) -> &Vec<Option<T>> {
        match handle {
            CollidableHandle::Body(_) => &self.bodies,
            CollidableHandle::Static(_) => &self.statics,
        }
    }

    fn slots_mut(&mut self, handle: CollidableHandle) -> &mut Vec<Option<T>> {
        match handle {
            CollidableHandle::Body(_) => &mut self.bodies,
            CollidableHandle::Static(_) => &mut self.statics,
        }
    }

    /// Allocate the slot for `handle`, overwriting any previous value
    ///
    /// Growth is amortized by `Vec`; allocating never fails.
    pub fn allocate(&mut self, handle: CollidableHandle, value: T) -> &mut T {
        let index = handle.index();
        let slots = self.slots_mut(handle);
        if index >= slots.len() {
            slots.resize_with(index + 1, || None);
        }
        slots[index].insert(value)
    }

    /// Check whether the slot for `handle` is allocated
    pub fn contains(&self, handle: CollidableHandle) -> bool {
        self.try_get(handle).is_some()
    }

    /// Look up a slot, returning None if it was never allocated
    pub fn try_get(&self, handle: CollidableHandle) -> Option<&T> {
        self.slots(handle).get(handle.index()).and_then(Option::as_ref)
    }

    /// Mutable lookup, returning None if the slot was never allocated
    pub fn try_get_mut(&mut self, handle: CollidableHandle) -> Option<&mut T> {
        let index = handle.index();
        self.slots_mut(handle).get_mut(index).and_then(Option::as_mut)
    }

    /// Look up an allocated slot
    ///
    /// # Panics
    /// Panics if `handle` has no allocated slot.
    pub fn get(&self, handle: CollidableHandle) -> &T {
        match self.try_get(handle) {
            Some(value) => value,
            None => panic!("property lookup of unallocated collidable {}", handle),
        }
    }

    /// Mutable lookup of an allocated slot
    ///
    /// # Panics
    /// Panics if `handle` has no allocated slot.
    pub fn get_mut(&mut self, handle: CollidableHandle) -> &mut T {
        match self.try_get_mut(handle) {
            Some(value) => value,
            None => panic!("property lookup of unallocated collidable {}", handle),
        }
    }

    /// Free the slot for `handle`, returning its value
    pub fn remove(&mut self, handle: CollidableHandle) -> Option<T> {
        let index = handle.index();
        self.slots_mut(handle).get_mut(index).and_then(Option::take)
    }

    /// Number of allocated slots
    pub fn len(&self) -> usize {
        self.bodies.iter().chain(self.statics.iter()).filter(|s| s.is_some()).count()
    }

    /// Check whether no slots are allocated
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

impl<T> Index<CollidableHandle> for CollidableProperty<T> {
    type Output = T;

    fn index(&self, handle: CollidableHandle) -> &T {
        self.get(handle)
    }
}

impl<T> IndexMut<CollidableHandle> for CollidableProperty<T> {
    fn index_mut(&mut self, handle: CollidableHandle) -> &mut T {
        self.get_mut(handle)
    }
}

/// Everything the bridge stores for one collidable
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct CollidableRecord {
    pub material: PhysicsMaterial,
    /// Only stored for bodies
    pub settings: BodySettings,
    pub tag: PhysicsTag,
    pub collision: CollisionProperty,
}

impl CollidableRecord {
    pub fn new(component: ComponentId, collision: CollisionProperty) -> Self {
        Self {
            material: PhysicsMaterial::default(),
            settings: BodySettings::default(),
            tag: PhysicsTag { component },
            collision,
        }
    }

    pub fn with_material(mut self, material: PhysicsMaterial) -> Self {
        self.material = material;
        self
    }

    pub fn with_settings(mut self, settings: BodySettings) -> Self {
        self.settings = settings;
        self
    }
}

/// The four tables the bridge keeps per collidable
#[derive(Debug, Default)]
pub struct PropertyTables {
    pub materials: CollidableProperty<PhysicsMaterial>,
    pub body_settings: CollidableProperty<BodySettings>,
    pub tags: CollidableProperty<PhysicsTag>,
    pub collision: CollidableProperty<CollisionProperty>,
}

impl PropertyTables {
    pub fn new() -> Self {
        Self::default()
    }

    /// Populate every table for `handle`
    pub fn allocate(&mut self, handle: CollidableHandle, record: CollidableRecord) {
        self.materials.allocate(handle, record.material);
        if let CollidableHandle::Body(_) = handle {
            self.body_settings.allocate(handle, record.settings);
        }
        self.tags.allocate(handle, record.tag);
        self.collision.allocate(handle, record.collision);
    }

    /// Free every table slot of `handle`
    pub fn remove(&mut self, handle: CollidableHandle) {
        self.materials.remove(handle);
        self.body_settings.remove(handle);
        self.tags.remove(handle);
        self.collision.remove(handle);
    }

    /// Owning component of `handle`, if it is still allocated
    pub fn component(&self, handle: CollidableHandle) -> Option<ComponentId> {
        self.tags.try_get(handle).map(|tag| tag.component)
    }
}
