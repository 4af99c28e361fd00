//! High-level physics events and the queue that carries them
//!
//! Events are produced on solver workers while the narrow phase runs and
//! consumed once per tick on the thread that owns the simulation.

use crossbeam_channel::{unbounded, Receiver, Sender};
use physbridge_math::Vec3;

use crate::properties::ComponentId;
use crate::solver::{ContactPoint, FeatureId};

/// Geometry of the contact behind a contact event
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct ContactData {
    pub offset: Vec3,
    pub normal: Vec3,
    pub depth: f32,
    pub feature_id: FeatureId,
}

impl From<&ContactPoint> for ContactData {
    fn from(contact: &ContactPoint) -> Self {
        Self {
            offset: contact.offset,
            normal: contact.normal,
            depth: contact.depth,
            feature_id: contact.feature_id,
        }
    }
}

/// Kind of a [`PhysicsEvent`], used to key handler tables
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum PhysicsEventKind {
    ContactAdded,
    ContactRemoved,
    ColliderEnter,
    ColliderExit,
}

impl PhysicsEventKind {
    pub const ALL: [PhysicsEventKind; 4] = [
        PhysicsEventKind::ContactAdded,
        PhysicsEventKind::ContactRemoved,
        PhysicsEventKind::ColliderEnter,
        PhysicsEventKind::ColliderExit,
    ];
}

/// Event delivered to the component that owns `acting`
#[derive(Clone, Copy, Debug, PartialEq)]
pub enum PhysicsEvent {
    ContactAdded {
        acting: ComponentId,
        other: ComponentId,
        contact: ContactData,
    },
    ContactRemoved {
        acting: ComponentId,
        other: ComponentId,
        contact: ContactData,
    },
    ColliderEnter {
        acting: ComponentId,
        other: ComponentId,
    },
    ColliderExit {
        acting: ComponentId,
        other: ComponentId,
    },
}

impl PhysicsEvent {
    /// Component the event is reported to
    pub fn acting(&self) -> ComponentId {
        match *self {
            PhysicsEvent::ContactAdded { acting, .. }
            | PhysicsEvent::ContactRemoved { acting, .. }
            | PhysicsEvent::ColliderEnter { acting, .. }
            | PhysicsEvent::ColliderExit { acting, .. } => acting,
        }
    }

    /// Component on the other side of the pair
    pub fn other(&self) -> ComponentId {
        match *self {
            PhysicsEvent::ContactAdded { other, .. }
            | PhysicsEvent::ContactRemoved { other, .. }
            | PhysicsEvent::ColliderEnter { other, .. }
            | PhysicsEvent::ColliderExit { other, .. } => other,
        }
    }

    /// Contact geometry, for contact events
    pub fn contact(&self) -> Option<&ContactData> {
        match self {
            PhysicsEvent::ContactAdded { contact, .. }
            | PhysicsEvent::ContactRemoved { contact, .. } => Some(contact),
            _ => None,
        }
    }

    pub fn kind(&self) -> PhysicsEventKind {
        match self {
            PhysicsEvent::ContactAdded { .. } => PhysicsEventKind::ContactAdded,
            PhysicsEvent::ContactRemoved { .. } => PhysicsEventKind::ContactRemoved,
            PhysicsEvent::ColliderEnter { .. } => PhysicsEventKind::ColliderEnter,
            PhysicsEvent::ColliderExit { .. } => PhysicsEventKind::ColliderExit,
        }
    }
}

/// Multi-producer, single-consumer FIFO of physics events
///
/// Producers post through [`EventQueue::sender`] from any thread without
/// further locking; the owner drains it once per tick.
#[derive(Debug)]
pub struct EventQueue {
    sender: Sender<PhysicsEvent>,
    receiver: Receiver<PhysicsEvent>,
}

impl Default for EventQueue {
    fn default() -> Self {
        Self::new()
    }
}

impl EventQueue {
    pub fn new() -> Self {
        let (sender, receiver) = unbounded();
        Self { sender, receiver }
    }

    /// Producer end of the queue
    pub fn sender(&self) -> &Sender<PhysicsEvent> {
        &self.sender
    }

    /// Enqueue an event
    pub fn post(&self, event: PhysicsEvent) {
        // The receiver lives in `self`, so the channel cannot be disconnected
        let _ = self.sender.send(event);
    }

    /// Take every queued event in FIFO order
    pub fn drain(&self) -> Vec<PhysicsEvent> {
        self.receiver.try_iter().collect()
    }

    pub fn len(&self) -> usize {
        self.receiver.len()
    }

    pub fn is_empty(&self) -> bool {
        self.receiver.is_empty()
    }
}
