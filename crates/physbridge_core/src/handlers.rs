//! Per-component physics event handlers
//!
//! Each event kind has its own typed handler list. Handlers run on the
//! thread that calls [`PhysicsProcessor::send_events`](crate::PhysicsProcessor::send_events)
//! and receive a [`CommandSender`] for lifecycle requests, which are applied
//! on the next removal flush rather than while events are being dispatched.

use crossbeam_channel::Sender;
use physbridge_physics::{ComponentId, ContactData, PhysicsEvent, PhysicsEventKind};

/// Identifies one subscription so it can be removed again
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct HandlerId(pub(crate) u64);

/// Payload of contact added/removed events
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct ContactEvent {
    /// The component the handler belongs to
    pub acting: ComponentId,
    pub other: ComponentId,
    pub contact: ContactData,
}

/// Payload of collider enter/exit events
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct ColliderEvent {
    /// The component the handler belongs to
    pub acting: ComponentId,
    pub other: ComponentId,
}

pub type ContactHandler = Box<dyn FnMut(&ContactEvent, &CommandSender)>;
pub type ColliderHandler = Box<dyn FnMut(&ColliderEvent, &CommandSender)>;

/// A handler for exactly one event kind
pub enum Handler {
    ContactAdded(ContactHandler),
    ContactRemoved(ContactHandler),
    ColliderEnter(ColliderHandler),
    ColliderExit(ColliderHandler),
}

impl Handler {
    pub fn contact_added(f: impl FnMut(&ContactEvent, &CommandSender) + 'static) -> Self {
        Handler::ContactAdded(Box::new(f))
    }

    pub fn contact_removed(f: impl FnMut(&ContactEvent, &CommandSender) + 'static) -> Self {
        Handler::ContactRemoved(Box::new(f))
    }

    pub fn collider_enter(f: impl FnMut(&ColliderEvent, &CommandSender) + 'static) -> Self {
        Handler::ColliderEnter(Box::new(f))
    }

    pub fn collider_exit(f: impl FnMut(&ColliderEvent, &CommandSender) + 'static) -> Self {
        Handler::ColliderExit(Box::new(f))
    }

    pub fn kind(&self) -> PhysicsEventKind {
        match self {
            Handler::ContactAdded(_) => PhysicsEventKind::ContactAdded,
            Handler::ContactRemoved(_) => PhysicsEventKind::ContactRemoved,
            Handler::ColliderEnter(_) => PhysicsEventKind::ColliderEnter,
            Handler::ColliderExit(_) => PhysicsEventKind::ColliderExit,
        }
    }
}

impl std::fmt::Debug for Handler {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "Handler({:?})", self.kind())
    }
}

/// Handler lists of one component, kept in registration order
#[derive(Default)]
pub struct EventHandlers {
    contact_added: Vec<(HandlerId, ContactHandler)>,
    contact_removed: Vec<(HandlerId, ContactHandler)>,
    collider_enter: Vec<(HandlerId, ColliderHandler)>,
    collider_exit: Vec<(HandlerId, ColliderHandler)>,
}

impl EventHandlers {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&mut self, id: HandlerId, handler: Handler) {
        match handler {
            Handler::ContactAdded(f) => self.contact_added.push((id, f)),
            Handler::ContactRemoved(f) => self.contact_removed.push((id, f)),
            Handler::ColliderEnter(f) => self.collider_enter.push((id, f)),
            Handler::ColliderExit(f) => self.collider_exit.push((id, f)),
        }
    }

    /// Remove a subscription; returns false if `id` was not subscribed
    pub fn remove(&mut self, id: HandlerId) -> bool {
        fn remove_from<T>(list: &mut Vec<(HandlerId, T)>, id: HandlerId) -> bool {
            match list.iter().position(|(h, _)| *h == id) {
                Some(index) => {
                    list.remove(index);
                    true
                }
                None => false,
            }
        }
        remove_from(&mut self.contact_added, id)
            || remove_from(&mut self.contact_removed, id)
            || remove_from(&mut self.collider_enter, id)
            || remove_from(&mut self.collider_exit, id)
    }

    /// Number of handlers subscribed to `kind`
    pub fn count(&self, kind: PhysicsEventKind) -> usize {
        match kind {
            PhysicsEventKind::ContactAdded => self.contact_added.len(),
            PhysicsEventKind::ContactRemoved => self.contact_removed.len(),
            PhysicsEventKind::ColliderEnter => self.collider_enter.len(),
            PhysicsEventKind::ColliderExit => self.collider_exit.len(),
        }
    }

    pub fn is_empty(&self) -> bool {
        PhysicsEventKind::ALL.iter().all(|kind| self.count(*kind) == 0)
    }

    pub fn clear(&mut self) {
        *self = Self::default();
    }

    /// Invoke every handler registered for the event's kind
    ///
    /// Returns the number of handlers invoked.
    pub fn dispatch(&mut self, event: &PhysicsEvent, commands: &CommandSender) -> usize {
        match *event {
            PhysicsEvent::ContactAdded { acting, other, contact } => {
                let event = ContactEvent { acting, other, contact };
                call_all(&mut self.contact_added, &event, commands)
            }
            PhysicsEvent::ContactRemoved { acting, other, contact } => {
                let event = ContactEvent { acting, other, contact };
                call_all(&mut self.contact_removed, &event, commands)
            }
            PhysicsEvent::ColliderEnter { acting, other } => {
                call_all(&mut self.collider_enter, &ColliderEvent { acting, other }, commands)
            }
            PhysicsEvent::ColliderExit { acting, other } => {
                call_all(&mut self.collider_exit, &ColliderEvent { acting, other }, commands)
            }
        }
    }
}

fn call_all<E: ?Sized>(
    handlers: &mut [(HandlerId, Box<dyn FnMut(&E, &CommandSender)>)],
    event: &E,
    commands: &CommandSender,
) -> usize {
    for (_, handler) in handlers.iter_mut() {
        handler(event, commands);
    }
    handlers.len()
}

impl std::fmt::Debug for EventHandlers {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("EventHandlers")
            .field("contact_added", &self.contact_added.len())
            .field("contact_removed", &self.contact_removed.len())
            .field("collider_enter", &self.collider_enter.len())
            .field("collider_exit", &self.collider_exit.len())
            .finish()
    }
}

/// Deferred lifecycle request
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum LifecycleCommand {
    Attach(ComponentId),
    Detach(ComponentId),
    /// Detach and drop the component
    Remove(ComponentId),
}

/// Queues lifecycle requests for the next removal flush
///
/// Cheap to clone; handlers may keep one around.
#[derive(Clone, Debug)]
pub struct CommandSender {
    sender: Sender<LifecycleCommand>,
}

impl CommandSender {
    pub(crate) fn new(sender: Sender<LifecycleCommand>) -> Self {
        Self { sender }
    }

    pub fn send(&self, command: LifecycleCommand) {
        if self.sender.send(command).is_err() {
            log::warn!("Physics processor is gone, dropping {:?}", command);
        }
    }

    pub fn attach(&self, component: ComponentId) {
        self.send(LifecycleCommand::Attach(component));
    }

    pub fn detach(&self, component: ComponentId) {
        self.send(LifecycleCommand::Detach(component));
    }

    pub fn remove(&self, component: ComponentId) {
        self.send(LifecycleCommand::Remove(component));
    }
}
