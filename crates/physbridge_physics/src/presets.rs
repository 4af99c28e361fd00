//! Named collision presets
//!
//! A preset is a designer-facing shorthand for a full [`CollisionProperty`]
//! matrix. Presets are plain data so they can live in scene files; the
//! expanded matrix is what the filter actually evaluates.

use serde::{Deserialize, Serialize};

use crate::collision::{
    CollisionCategory, CollisionEnabled, CollisionProperty, CollisionResponse, CollisionResponses,
    ObjectResponses, TraceResponses,
};

use CollisionResponse::{Block, Ignore, Overlap};

/// User-defined preset
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct CustomPreset {
    pub enabled: CollisionEnabled,
    pub category: CollisionCategory,
    pub responses: CollisionResponses,
}

/// Collision preset selected on a physics component
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub enum CollisionPreset {
    #[default]
    Default,
    NoCollision,
    BlockAll,
    OverlapAll,
    BlockAllDynamic,
    OverlapAllDynamic,
    IgnoreOnlyPawn,
    OverlapOnlyPawn,
    Pawn,
    Spectator,
    CharacterMesh,
    PhysicsActor,
    Trigger,
    Custom(CustomPreset),
}

const fn objects(
    pawn: CollisionResponse,
    physics_body: CollisionResponse,
    world_dynamic: CollisionResponse,
    world_static: CollisionResponse,
) -> ObjectResponses {
    ObjectResponses {
        world_static,
        world_dynamic,
        pawn,
        physics_body,
    }
}

const fn traces(camera: CollisionResponse, visibility: CollisionResponse) -> TraceResponses {
    TraceResponses { visibility, camera }
}

impl CollisionPreset {
    /// Expand the preset into its enable flag, category and responses
    pub fn expand(&self) -> CustomPreset {
        let (enabled, category, traces, objects) = match *self {
            CollisionPreset::Custom(custom) => return custom,
            CollisionPreset::Default => (
                CollisionEnabled::PhysicsOnly,
                CollisionCategory::WorldStatic,
                TraceResponses::uniform(Block),
                ObjectResponses::uniform(Block),
            ),
            CollisionPreset::NoCollision => (
                CollisionEnabled::NoCollision,
                CollisionCategory::WorldStatic,
                TraceResponses::uniform(Ignore),
                ObjectResponses::uniform(Ignore),
            ),
            CollisionPreset::BlockAll => (
                CollisionEnabled::Collision,
                CollisionCategory::WorldStatic,
                TraceResponses::uniform(Block),
                ObjectResponses::uniform(Block),
            ),
            CollisionPreset::OverlapAll => (
                CollisionEnabled::QueryOnly,
                CollisionCategory::WorldStatic,
                TraceResponses::uniform(Overlap),
                ObjectResponses::uniform(Overlap),
            ),
            CollisionPreset::BlockAllDynamic => (
                CollisionEnabled::Collision,
                CollisionCategory::WorldDynamic,
                TraceResponses::uniform(Block),
                ObjectResponses::uniform(Block),
            ),
            CollisionPreset::OverlapAllDynamic => (
                CollisionEnabled::QueryOnly,
                CollisionCategory::WorldStatic,
                TraceResponses::uniform(Overlap),
                ObjectResponses::uniform(Overlap),
            ),
            CollisionPreset::IgnoreOnlyPawn => (
                CollisionEnabled::QueryOnly,
                CollisionCategory::WorldDynamic,
                TraceResponses::uniform(Block),
                objects(Ignore, Block, Block, Block),
            ),
            CollisionPreset::OverlapOnlyPawn => (
                CollisionEnabled::QueryOnly,
                CollisionCategory::WorldDynamic,
                TraceResponses::uniform(Block),
                objects(Overlap, Block, Block, Block),
            ),
            CollisionPreset::Pawn => (
                CollisionEnabled::Collision,
                CollisionCategory::Pawn,
                traces(Ignore, Block),
                ObjectResponses::uniform(Block),
            ),
            CollisionPreset::Spectator => (
                CollisionEnabled::QueryOnly,
                CollisionCategory::Pawn,
                TraceResponses::uniform(Ignore),
                objects(Ignore, Ignore, Ignore, Block),
            ),
            CollisionPreset::CharacterMesh => (
                CollisionEnabled::QueryOnly,
                CollisionCategory::Pawn,
                traces(Block, Ignore),
                objects(Ignore, Block, Block, Block),
            ),
            CollisionPreset::PhysicsActor => (
                CollisionEnabled::Collision,
                CollisionCategory::PhysicsBody,
                TraceResponses::uniform(Block),
                ObjectResponses::uniform(Block),
            ),
            CollisionPreset::Trigger => (
                CollisionEnabled::QueryOnly,
                CollisionCategory::WorldDynamic,
                traces(Overlap, Ignore),
                ObjectResponses::uniform(Overlap),
            ),
        };
        CustomPreset {
            enabled,
            category,
            responses: CollisionResponses { traces, objects },
        }
    }

    /// Build the filter property for a collidable using this preset
    pub fn to_property(&self, generate_overlap_events: bool) -> CollisionProperty {
        let expanded = self.expand();
        CollisionProperty::new(expanded.enabled, expanded.category, expanded.responses)
            .with_overlap_events(generate_overlap_events)
    }

    /// Check whether this preset is user-defined
    pub fn is_custom(&self) -> bool {
        matches!(self, CollisionPreset::Custom(_))
    }
}

impl From<CollisionPreset> for CollisionProperty {
    fn from(preset: CollisionPreset) -> Self {
        preset.to_property(false)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::collision::{allow_contact, classify, PairResponse};

    #[test]
    fn test_default_preset() {
        let p = CollisionPreset::Default.expand();
        assert_eq!(p.enabled, CollisionEnabled::PhysicsOnly);
        assert_eq!(p.category, CollisionCategory::WorldStatic);
        assert_eq!(p.responses, CollisionResponses::uniform(Block));
    }

    #[test]
    fn test_pawn_traces() {
        let p = CollisionPreset::Pawn.expand();
        assert_eq!(p.responses.traces.camera, Ignore);
        assert_eq!(p.responses.traces.visibility, Block);
        assert!(CollisionPreset::Pawn.to_property(false).blocks_trace());
    }

    #[test]
    fn test_spectator_only_hits_world_static() {
        let spectator = CollisionPreset::Spectator.to_property(false);
        let floor = CollisionPreset::BlockAll.to_property(false);
        let crate_body = CollisionPreset::PhysicsActor.to_property(false);
        // The floor blocks the spectator and the spectator blocks world statics
        assert!(allow_contact(&spectator, &floor));
        // Query-only never produces a physical response
        assert!(!classify(&spectator, &floor).contains(PairResponse::BLOCKING));
        // PhysicsActor blocks pawns, so contacts are still generated
        assert!(allow_contact(&spectator, &crate_body));
    }

    #[test]
    fn test_no_collision_preset() {
        let none = CollisionPreset::NoCollision.to_property(true);
        let all = CollisionPreset::BlockAll.to_property(true);
        assert!(!allow_contact(&none, &all));
    }

    #[test]
    fn test_trigger_overlaps_actors() {
        let trigger = CollisionPreset::Trigger.to_property(true);
        let actor = CollisionPreset::PhysicsActor.to_property(false);
        assert_eq!(classify(&trigger, &actor), PairResponse::OVERLAP);
        assert!(!trigger.blocks_trace());
    }

    #[test]
    fn test_custom_round_trips_through_expand() {
        let custom = CustomPreset {
            enabled: CollisionEnabled::Collision,
            category: CollisionCategory::Pawn,
            responses: CollisionResponses::uniform(Overlap),
        };
        let preset = CollisionPreset::Custom(custom);
        assert!(preset.is_custom());
        assert_eq!(preset.expand(), custom);
    }

    #[test]
    fn test_physics_actor_pair_blocks() {
        let a: CollisionProperty = CollisionPreset::PhysicsActor.into();
        let b: CollisionProperty = CollisionPreset::PhysicsActor.into();
        assert_eq!(classify(&a, &b), PairResponse::BLOCKING);
    }
}
