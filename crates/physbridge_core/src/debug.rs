//! Collider debug visuals
//!
//! The debug scene mirrors attached collidables as plain shape + transform
//! records a renderer can draw as wireframes.

use physbridge_physics::{ComponentId, ShapeDescription};
use rustc_hash::FxHashMap;

use crate::Transform;

/// One collider to draw
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct ColliderVisual {
    pub shape: ShapeDescription,
    pub transform: Transform,
}

/// Visual records keyed by owning component
#[derive(Clone, Debug, Default)]
pub struct DebugScene {
    visuals: FxHashMap<ComponentId, ColliderVisual>,
}

impl DebugScene {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&mut self, component: ComponentId, visual: ColliderVisual) {
        self.visuals.insert(component, visual);
    }

    pub fn remove(&mut self, component: ComponentId) -> Option<ColliderVisual> {
        self.visuals.remove(&component)
    }

    /// Move an existing visual; unknown components are ignored
    pub fn update_transform(&mut self, component: ComponentId, transform: Transform) {
        if let Some(visual) = self.visuals.get_mut(&component) {
            visual.transform = transform;
        }
    }

    pub fn get(&self, component: ComponentId) -> Option<&ColliderVisual> {
        self.visuals.get(&component)
    }

    pub fn len(&self) -> usize {
        self.visuals.len()
    }

    pub fn is_empty(&self) -> bool {
        self.visuals.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = (ComponentId, &ColliderVisual)> {
        self.visuals.iter().map(|(id, visual)| (*id, visual))
    }
}
