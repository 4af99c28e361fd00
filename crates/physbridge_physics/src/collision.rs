//! Collision filtering
//!
//! Every collidable carries a [`CollisionProperty`]: an enable flag, the
//! category it belongs to and the response it wants against each category.
//! The functions here turn two properties into a decision for the pair:
//! whether contacts are generated at all, and whether the pair blocks,
//! overlaps, or both.
//!
//! Two collidables A and B match a response predicate if it holds for
//! B's response to A's category or for A's response to B's category.

use bitflags::bitflags;
use serde::{Deserialize, Serialize};

/// How far a collidable participates in collision
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum CollisionEnabled {
    /// Never generates contacts
    NoCollision,
    /// Generates contacts for queries and overlap events, never a physical response
    QueryOnly,
    /// Generates contacts for physical response
    PhysicsOnly,
    /// Queries and physical response
    #[default]
    Collision,
}

/// Object category of a collidable, fixed at creation
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum CollisionCategory {
    #[default]
    WorldStatic,
    WorldDynamic,
    Pawn,
    PhysicsBody,
}

impl CollisionCategory {
    pub const ALL: [CollisionCategory; 4] = [
        CollisionCategory::WorldStatic,
        CollisionCategory::WorldDynamic,
        CollisionCategory::Pawn,
        CollisionCategory::PhysicsBody,
    ];
}

/// Response of one collidable toward a category or trace channel
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum CollisionResponse {
    Ignore,
    Overlap,
    #[default]
    Block,
}

/// Responses to query channels
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct TraceResponses {
    pub visibility: CollisionResponse,
    pub camera: CollisionResponse,
}

impl TraceResponses {
    pub const fn uniform(response: CollisionResponse) -> Self {
        Self {
            visibility: response,
            camera: response,
        }
    }
}

/// Responses to each object category
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ObjectResponses {
    pub world_static: CollisionResponse,
    pub world_dynamic: CollisionResponse,
    pub pawn: CollisionResponse,
    pub physics_body: CollisionResponse,
}

impl ObjectResponses {
    pub const fn uniform(response: CollisionResponse) -> Self {
        Self {
            world_static: response,
            world_dynamic: response,
            pawn: response,
            physics_body: response,
        }
    }

    /// Response toward `category`
    #[inline]
    pub fn get(&self, category: CollisionCategory) -> CollisionResponse {
        match category {
            CollisionCategory::WorldStatic => self.world_static,
            CollisionCategory::WorldDynamic => self.world_dynamic,
            CollisionCategory::Pawn => self.pawn,
            CollisionCategory::PhysicsBody => self.physics_body,
        }
    }

    /// Set the response toward `category`
    pub fn set(&mut self, category: CollisionCategory, response: CollisionResponse) {
        match category {
            CollisionCategory::WorldStatic => self.world_static = response,
            CollisionCategory::WorldDynamic => self.world_dynamic = response,
            CollisionCategory::Pawn => self.pawn = response,
            CollisionCategory::PhysicsBody => self.physics_body = response,
        }
    }
}

/// Full response matrix of one collidable
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct CollisionResponses {
    pub traces: TraceResponses,
    pub objects: ObjectResponses,
}

impl CollisionResponses {
    pub const fn uniform(response: CollisionResponse) -> Self {
        Self {
            traces: TraceResponses::uniform(response),
            objects: ObjectResponses::uniform(response),
        }
    }
}

/// Collision filter settings stored per collidable
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct CollisionProperty {
    pub enabled: CollisionEnabled,
    pub category: CollisionCategory,
    pub responses: CollisionResponses,
    /// Whether this collidable wants contact events
    pub generate_overlap_events: bool,
}

impl CollisionProperty {
    pub fn new(
        enabled: CollisionEnabled,
        category: CollisionCategory,
        responses: CollisionResponses,
    ) -> Self {
        Self {
            enabled,
            category,
            responses,
            generate_overlap_events: false,
        }
    }

    /// Request contact events for this collidable
    pub fn with_overlap_events(mut self, enabled: bool) -> Self {
        self.generate_overlap_events = enabled;
        self
    }

    /// Check whether ray queries stop at this collidable
    pub fn blocks_trace(&self) -> bool {
        self.responses.traces.camera == CollisionResponse::Block
            || self.responses.traces.visibility == CollisionResponse::Block
    }
}

bitflags! {
    /// Outcome of classifying a collidable pair
    #[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
    pub struct PairResponse: u8 {
        /// The pair gets a physical contact response
        const BLOCKING = 1 << 0;
        /// The pair is routed to contact event listeners
        const OVERLAP = 1 << 1;
    }
}

#[inline]
fn matches(
    a: &CollisionProperty,
    b: &CollisionProperty,
    pred: impl Fn(CollisionResponse) -> bool,
) -> bool {
    pred(b.responses.objects.get(a.category)) || pred(a.responses.objects.get(b.category))
}

/// Check whether the solver should generate contacts between `a` and `b`
pub fn allow_contact(a: &CollisionProperty, b: &CollisionProperty) -> bool {
    if a.enabled == CollisionEnabled::NoCollision || b.enabled == CollisionEnabled::NoCollision {
        return false;
    }
    matches(a, b, |r| r != CollisionResponse::Ignore)
}

/// Check whether the pair should be routed to contact event listeners
///
/// Blocking responses count too, so a pair can both collide and notify.
pub fn is_overlap(a: &CollisionProperty, b: &CollisionProperty) -> bool {
    (a.generate_overlap_events || b.generate_overlap_events)
        && matches(a, b, |r| r != CollisionResponse::Ignore)
}

/// Check whether the pair gets a physical response
pub fn is_blocking(a: &CollisionProperty, b: &CollisionProperty) -> bool {
    a.enabled != CollisionEnabled::QueryOnly
        && b.enabled != CollisionEnabled::QueryOnly
        && matches(a, b, |r| r == CollisionResponse::Block)
}

/// Classify a pair into blocking and overlap responses
pub fn classify(a: &CollisionProperty, b: &CollisionProperty) -> PairResponse {
    let mut response = PairResponse::empty();
    if !allow_contact(a, b) {
        return response;
    }
    if is_blocking(a, b) {
        response |= PairResponse::BLOCKING;
    }
    if is_overlap(a, b) {
        response |= PairResponse::OVERLAP;
    }
    response
}
