use std::collections::BTreeMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use crate::error::SourceError;

pub type EventName = &'static str;

pub const DATA: EventName = "data";
pub const ERROR: EventName = "error";
pub const END: EventName = "end";

/// The events a streaming source can raise, in race order.
pub const SOURCE_EVENTS: [EventName; 3] = [DATA, ERROR, END];

pub type Listener<P> = Arc<dyn Fn(P) + Send + Sync>;

/// Identity of one registration; `off` removes exactly that registration.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct ListenerId(u64);

/// A push-based source that calls listeners on its own schedule.
///
/// Implementations must not hold internal locks while invoking listeners:
/// a listener is allowed to call [`Emitter::off`] on the emitter that is
/// currently calling it.
pub trait Emitter: Send + Sync + 'static {
    type Payload: Clone + Send + 'static;

    fn on(&self, event: EventName, listener: Listener<Self::Payload>) -> ListenerId;

    /// Returns `false` when `id` was not registered for `event`.
    fn off(&self, event: EventName, id: ListenerId) -> bool;
}

/// Payload carried by the `data` / `error` / `end` events of a source.
#[derive(Debug, Clone)]
pub enum SourcePayload {
    Text(String),
    Failure(SourceError),
    Empty,
}

/// In-memory emitter with identity-addressed listeners.
pub struct EventHub<P> {
    next_id: AtomicU64,
    listeners: Mutex<BTreeMap<EventName, Vec<(ListenerId, Listener<P>)>>>,
}

impl<P> Default for EventHub<P> {
    fn default() -> Self {
        Self {
            next_id: AtomicU64::new(1),
            listeners: Mutex::new(BTreeMap::new()),
        }
    }
}

impl<P: Clone> EventHub<P> {
    pub fn new() -> Self {
        Self::default()
    }

    /// Calls every listener registered for `event` and returns how many ran.
    ///
    /// Listeners are snapshotted before the first call, so one that is removed
    /// mid-emission by a sibling still runs for this emission.
    pub fn emit(&self, event: EventName, payload: P) -> usize {
        let snapshot: Vec<Listener<P>> = self
            .lock()
            .get(event)
            .map(|entries| entries.iter().map(|(_, l)| Arc::clone(l)).collect())
            .unwrap_or_default();

        tracing::trace!(event, listeners = snapshot.len(), "emit");
        for listener in &snapshot {
            listener(payload.clone());
        }
        snapshot.len()
    }

    pub fn listener_count(&self, event: EventName) -> usize {
        self.lock().get(event).map_or(0, Vec::len)
    }

    fn lock(&self) -> MutexGuard<'_, BTreeMap<EventName, Vec<(ListenerId, Listener<P>)>>> {
        self.listeners.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

impl<P: Clone + Send + 'static> Emitter for EventHub<P> {
    type Payload = P;

    fn on(&self, event: EventName, listener: Listener<P>) -> ListenerId {
        let id = ListenerId(self.next_id.fetch_add(1, Ordering::Relaxed));
        self.lock().entry(event).or_default().push((id, listener));
        id
    }

    fn off(&self, event: EventName, id: ListenerId) -> bool {
        let mut listeners = self.lock();
        let Some(entries) = listeners.get_mut(event) else {
            return false;
        };
        let before = entries.len();
        entries.retain(|(registered, _)| *registered != id);
        let removed = entries.len() != before;
        if entries.is_empty() {
            listeners.remove(event);
        }
        removed
    }
}
