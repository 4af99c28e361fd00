//! Contact event tracking
//!
//! Turns the per-frame manifolds reported by the narrow phase into discrete
//! events. For every registered listener collidable, the tracker remembers
//! which opposing collidables it touched last frame and by which contact
//! features. Comparing each new manifold against that record tells whether
//! a contact is new, persisting, or separating.
//!
//! The work is split in two phases:
//!
//! - [`ContactEvents::handle_manifold`] runs on solver workers during the
//!   narrow phase. It only reads the authoritative record table and appends
//!   messages (record updates and pending additions) to a [`ContactBatch`]
//!   owned by the calling worker.
//! - [`ContactEvents::flush`] runs once per tick after the workers have
//!   joined. It consumes the batches in worker order, retires pairs that
//!   stopped reporting, and merges new pairs into the table.
//!
//! The table is therefore only ever written by the flush, so its contents
//! do not depend on how the scheduler interleaved the workers.

use arrayvec::ArrayVec;
use rustc_hash::FxHashMap;

use crate::handle::{CollidableHandle, CollidablePair};
use crate::solver::{ContactManifold, ContactPoint, FeatureId, MAX_CONTACTS};

/// Depth below which a previously seen contact counts as separated
pub const SEPARATION_TOLERANCE: f32 = -1e-3;

type FeatureSet = ArrayVec<FeatureId, MAX_CONTACTS>;

/// Receiver of the events produced by the tracker
///
/// `source` is always the listener the event is reported to and `other` the
/// opposing collidable. Manifold-driven methods are called from solver
/// workers; flush-driven ones from the flushing thread.
pub trait ContactEventHandler: Sync {
    /// A contact feature appeared that was not part of last frame's manifold
    fn on_contact_added(
        &self,
        source: CollidableHandle,
        other: CollidableHandle,
        contact: &ContactPoint,
    );

    /// A touching contact separated beyond [`SEPARATION_TOLERANCE`]
    fn on_contact_removed(
        &self,
        source: CollidableHandle,
        other: CollidableHandle,
        contact: &ContactPoint,
    );

    /// The pair went from no touching contacts to at least one
    fn on_collider_enter(&self, source: CollidableHandle, other: CollidableHandle);

    /// The pair went from touching to no touching contacts
    fn on_collider_exit(&self, source: CollidableHandle, other: CollidableHandle);

    /// The pair stopped reporting manifolds and its record was retired
    fn on_all_contacts_removed(&self, _source: CollidableHandle, _other: CollidableHandle) {}
}

/// What the tracker remembers about one (listener, other) pair
#[derive(Clone, Debug)]
struct PreviousCollision {
    other: CollidableHandle,
    /// Set when the pair reported a manifold since the last flush
    fresh: bool,
    /// Feature ids of last frame's manifold
    feature_ids: FeatureSet,
    /// Subset of `feature_ids` reported as added and not yet removed
    touching: FeatureSet,
}

/// First manifold of a pair nobody has seen before
#[derive(Debug)]
struct PendingAddition {
    listener: CollidableHandle,
    record: PreviousCollision,
}

/// New state for an existing record
#[derive(Debug)]
struct RecordUpdate {
    listener: CollidableHandle,
    other: CollidableHandle,
    feature_ids: FeatureSet,
    touching: FeatureSet,
}

/// Tracker messages produced by one narrow-phase worker
///
/// Each worker writes only to its own batch; the flush consumes them all.
#[derive(Debug, Default)]
pub struct ContactBatch {
    additions: Vec<PendingAddition>,
    updates: Vec<RecordUpdate>,
}

impl ContactBatch {
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of messages waiting for the flush
    pub fn len(&self) -> usize {
        self.additions.len() + self.updates.len()
    }

    pub fn is_empty(&self) -> bool {
        self.additions.is_empty() && self.updates.is_empty()
    }
}

/// Per-listener contact history
#[derive(Debug, Default)]
pub struct ContactEvents {
    listeners: FxHashMap<CollidableHandle, Vec<PreviousCollision>>,
}

impl ContactEvents {
    pub fn new() -> Self {
        Self::default()
    }

    /// Start tracking contacts for `handle`
    pub fn register_listener(&mut self, handle: CollidableHandle) {
        if self.listeners.contains_key(&handle) {
            debug_assert!(false, "collidable {} is already a contact listener", handle);
            log::warn!("Collidable {} registered as contact listener twice", handle);
            return;
        }
        self.listeners.insert(handle, Vec::new());
    }

    /// Stop tracking contacts for `handle`, dropping its history silently
    ///
    /// # Panics
    /// In debug builds, panics if `handle` was never registered.
    pub fn unregister_listener(&mut self, handle: CollidableHandle) {
        if self.listeners.remove(&handle).is_none() {
            debug_assert!(false, "collidable {} is not a contact listener", handle);
            log::warn!("Tried to unregister unknown contact listener {}", handle);
        }
    }

    /// Drop every record in which `handle` is the opposing collidable
    ///
    /// Must run before the solver releases `handle`, since it may hand the
    /// same handle to the next collidable it creates. Listeners that were
    /// still touching `handle` get an exit.
    pub fn forget_collidable<H>(&mut self, handle: CollidableHandle, handler: &H)
    where
        H: ContactEventHandler + ?Sized,
    {
        for (&listener, collisions) in self.listeners.iter_mut() {
            collisions.retain(|record| {
                if record.other != handle {
                    return true;
                }
                if !record.touching.is_empty() {
                    handler.on_collider_exit(listener, handle);
                }
                false
            });
        }
    }

    /// Check whether `handle` is a registered listener
    pub fn is_listener(&self, handle: CollidableHandle) -> bool {
        self.listeners.contains_key(&handle)
    }

    /// Number of registered listeners
    pub fn listener_count(&self) -> usize {
        self.listeners.len()
    }

    /// Number of pairs tracked for `listener`
    pub fn tracked_pair_count(&self, listener: CollidableHandle) -> usize {
        self.listeners.get(&listener).map_or(0, Vec::len)
    }

    /// Number of contacts in the last recorded manifold of a pair
    pub fn contact_count(
        &self,
        listener: CollidableHandle,
        other: CollidableHandle,
    ) -> Option<usize> {
        self.listeners
            .get(&listener)?
            .iter()
            .find(|record| record.other == other)
            .map(|record| record.feature_ids.len())
    }

    /// Classify a manifold of `pair` from the point of view of `pair.a`
    ///
    /// Does nothing unless `pair.a` is a registered listener. Record changes
    /// go to `batch` and take effect at the next [`ContactEvents::flush`].
    pub fn handle_manifold<H>(
        &self,
        batch: &mut ContactBatch,
        pair: CollidablePair,
        manifold: &ContactManifold,
        handler: &H,
    ) where
        H: ContactEventHandler + ?Sized,
    {
        let Some(collisions) = self.listeners.get(&pair.a) else {
            return;
        };
        let (source, other) = (pair.a, pair.b);
        let feature_ids: FeatureSet = manifold.contacts().iter().map(|c| c.feature_id).collect();

        let Some(previous) = collisions.iter().find(|record| record.other == other) else {
            let touching: FeatureSet = manifold
                .contacts()
                .iter()
                .filter(|c| c.depth >= SEPARATION_TOLERANCE)
                .map(|c| c.feature_id)
                .collect();
            if !touching.is_empty() {
                handler.on_collider_enter(source, other);
            }
            for contact in manifold.contacts() {
                handler.on_contact_added(source, other, contact);
            }
            let record = PreviousCollision {
                other,
                fresh: false,
                touching,
                feature_ids,
            };
            batch.additions.push(PendingAddition {
                listener: source,
                record,
            });
            return;
        };

        let mut added: ArrayVec<&ContactPoint, MAX_CONTACTS> = ArrayVec::new();
        let mut removed: ArrayVec<&ContactPoint, MAX_CONTACTS> = ArrayVec::new();
        let mut touching = FeatureSet::new();
        for contact in manifold.contacts() {
            let id = contact.feature_id;
            let separated = contact.depth < SEPARATION_TOLERANCE;
            if !previous.feature_ids.contains(&id) {
                added.push(contact);
            } else if separated && previous.touching.contains(&id) {
                removed.push(contact);
            }
            if !separated {
                touching.push(id);
            }
        }

        let was_touching = !previous.touching.is_empty();
        if !was_touching && !touching.is_empty() {
            handler.on_collider_enter(source, other);
        }
        for contact in added {
            handler.on_contact_added(source, other, contact);
        }
        for contact in removed {
            handler.on_contact_removed(source, other, contact);
        }
        if was_touching && touching.is_empty() {
            handler.on_collider_exit(source, other);
        }

        batch.updates.push(RecordUpdate {
            listener: source,
            other,
            feature_ids,
            touching,
        });
    }

    /// Finalize one tick of tracking
    ///
    /// Must run after every worker of the timestep has finished, with the
    /// workers' batches in worker order. Applies record updates, retires
    /// pairs that reported nothing since the last flush, then merges the
    /// pending additions. `is_asleep` decides which collidables are resting;
    /// pairs involving a resting body keep their record untouched since the
    /// solver stops reporting them.
    pub fn flush<H, F>(&mut self, batches: Vec<ContactBatch>, is_asleep: F, handler: &H)
    where
        H: ContactEventHandler + ?Sized,
        F: Fn(CollidableHandle) -> bool,
    {
        let mut additions = Vec::new();
        for batch in batches {
            for update in batch.updates {
                let record = self
                    .listeners
                    .get_mut(&update.listener)
                    .and_then(|records| records.iter_mut().find(|r| r.other == update.other));
                if let Some(record) = record {
                    record.feature_ids = update.feature_ids;
                    record.touching = update.touching;
                    record.fresh = true;
                }
            }
            additions.extend(batch.additions);
        }

        for (&listener, collisions) in self.listeners.iter_mut() {
            if is_asleep(listener) {
                continue;
            }
            collisions.retain_mut(|record| {
                if is_asleep(record.other) {
                    return true;
                }
                if record.fresh {
                    record.fresh = false;
                    return true;
                }
                handler.on_all_contacts_removed(listener, record.other);
                if !record.touching.is_empty() {
                    handler.on_collider_exit(listener, record.other);
                }
                false
            });
        }

        for addition in additions {
            let Some(collisions) = self.listeners.get_mut(&addition.listener) else {
                log::warn!("Dropping contacts for unregistered listener {}", addition.listener);
                continue;
            };
            match collisions.iter_mut().find(|r| r.other == addition.record.other) {
                Some(existing) => *existing = addition.record,
                None => collisions.push(addition.record),
            }
        }
    }
}
