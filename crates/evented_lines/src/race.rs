use std::collections::{BTreeMap, BTreeSet};
use std::future::Future;
use std::mem;
use std::pin::Pin;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError, Weak};
use std::task::{Context, Poll, Waker};

use crate::emitter::{Emitter, EventName, Listener, ListenerId};

/// The first event to fire in a [`Race`], with its payload.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RaceResult<P> {
    pub event: EventName,
    pub payload: P,
}

struct RaceSlot<P> {
    settled: bool,
    outcome: Option<RaceResult<P>>,
    registered: BTreeMap<EventName, ListenerId>,
    waker: Option<Waker>,
}

/// Resolves with whichever of a fixed set of events fires first.
///
/// One listener is registered per distinct event name. The listener that wins
/// removes every sibling registration before it returns, and any event that
/// still reaches a listener after settlement (an emitter that snapshotted its
/// listeners before the teardown, for instance) is dropped by the settled
/// flag. Dropping an unresolved race removes its listeners as well.
pub struct Race<E: Emitter> {
    emitter: Arc<E>,
    slot: Arc<Mutex<RaceSlot<E::Payload>>>,
}

/// Starts a race over `events` on `emitter`.
pub fn race<E: Emitter>(emitter: &Arc<E>, events: &[EventName]) -> Race<E> {
    Race::new(Arc::clone(emitter), events)
}

impl<E: Emitter> Race<E> {
    /// # Panics
    ///
    /// Panics if `events` is empty; such a race could never resolve.
    pub fn new(emitter: Arc<E>, events: &[EventName]) -> Self {
        assert!(!events.is_empty(), "a race needs at least one event");

        let slot = Arc::new(Mutex::new(RaceSlot {
            settled: false,
            outcome: None,
            registered: BTreeMap::new(),
            waker: None,
        }));

        let mut seen = BTreeSet::new();
        for &event in events {
            if !seen.insert(event) {
                continue;
            }
            let listener = settling_listener(event, Arc::downgrade(&emitter), Arc::clone(&slot));
            let id = emitter.on(event, listener);

            let mut guard = lock(&slot);
            if guard.settled {
                // An earlier registration already fired; this one never joins.
                drop(guard);
                emitter.off(event, id);
            } else {
                guard.registered.insert(event, id);
            }
        }

        Self { emitter, slot }
    }

    /// Number of listeners this race still holds on the emitter.
    pub fn pending_listeners(&self) -> usize {
        lock(&self.slot).registered.len()
    }

    fn teardown(&self) {
        let registered = mem::take(&mut lock(&self.slot).registered);
        for (event, id) in registered {
            self.emitter.off(event, id);
        }
    }
}

fn settling_listener<E: Emitter>(
    event: EventName,
    emitter: Weak<E>,
    slot: Arc<Mutex<RaceSlot<E::Payload>>>,
) -> Listener<E::Payload> {
    Arc::new(move |payload: E::Payload| {
        let (registered, waker) = {
            let mut guard = lock(&slot);
            if guard.settled {
                tracing::trace!(event, "ignoring event after race settled");
                return;
            }
            guard.settled = true;
            guard.outcome = Some(RaceResult { event, payload });
            (mem::take(&mut guard.registered), guard.waker.take())
        };

        if let Some(emitter) = emitter.upgrade() {
            for (name, id) in registered {
                emitter.off(name, id);
            }
        }
        tracing::trace!(event, "race settled");

        if let Some(waker) = waker {
            waker.wake();
        }
    })
}

impl<E: Emitter> Future for Race<E> {
    type Output = RaceResult<E::Payload>;

    fn poll(self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Self::Output> {
        let this = self.get_mut();
        let mut guard = lock(&this.slot);

        if let Some(result) = guard.outcome.take() {
            drop(guard);
            this.teardown();
            return Poll::Ready(result);
        }

        assert!(!guard.settled, "`Race` polled after completion");
        match &guard.waker {
            Some(waker) if waker.will_wake(cx.waker()) => {}
            _ => guard.waker = Some(cx.waker().clone()),
        }
        Poll::Pending
    }
}

impl<E: Emitter> Drop for Race<E> {
    fn drop(&mut self) {
        self.teardown();
    }
}

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(PoisonError::into_inner)
}

#[cfg(test)]
mod tests {
    use futures_util::FutureExt;

    use super::*;
    use crate::emitter::{EventHub, DATA, END, ERROR, SOURCE_EVENTS};

    fn total_listeners(hub: &EventHub<&'static str>) -> usize {
        SOURCE_EVENTS
            .iter()
            .map(|&event| hub.listener_count(event))
            .sum()
    }

    #[tokio::test]
    async fn first_event_wins_and_siblings_are_removed_before_resolution() {
        let hub = Arc::new(EventHub::new());
        let pending = race(&hub, &SOURCE_EVENTS);
        assert_eq!(total_listeners(&hub), 3);

        hub.emit(ERROR, "disk on fire");
        assert_eq!(total_listeners(&hub), 0);

        let result = pending.await;
        assert_eq!(result.event, ERROR);
        assert_eq!(result.payload, "disk on fire");
    }

    #[test]
    fn duplicate_event_names_register_once() {
        let hub: Arc<EventHub<&'static str>> = Arc::new(EventHub::new());
        let pending = race(&hub, &[DATA, DATA, END, DATA]);

        assert_eq!(hub.listener_count(DATA), 1);
        assert_eq!(hub.listener_count(END), 1);
        assert_eq!(pending.pending_listeners(), 2);
    }

    #[test]
    fn unresolved_race_stays_pending() {
        let hub: Arc<EventHub<&'static str>> = Arc::new(EventHub::new());
        let mut pending = race(&hub, &SOURCE_EVENTS);

        assert!((&mut pending).now_or_never().is_none());
        assert_eq!(total_listeners(&hub), 3);
    }

    #[test]
    fn event_after_settlement_is_ignored() {
        let hub: Arc<EventHub<&'static str>> = Arc::new(EventHub::new());
        let pending = race(&hub, &SOURCE_EVENTS);

        assert_eq!(hub.emit(DATA, "chunk"), 1);
        assert_eq!(hub.emit(END, ""), 0);

        let result = pending.now_or_never().expect("settled");
        assert_eq!(result, RaceResult { event: DATA, payload: "chunk" });
    }

    #[test]
    fn sibling_fired_from_a_stale_snapshot_does_not_resettle() {
        // Invoke a second settling listener by hand after settlement, the way an
        // emitter delivering from a snapshot taken before teardown would.
        let hub: Arc<EventHub<&'static str>> = Arc::new(EventHub::new());
        let pending = race(&hub, &[DATA]);
        let stale = settling_listener(END, Arc::downgrade(&hub), Arc::clone(&pending.slot));

        hub.emit(DATA, "first");
        stale("second");

        let result = pending.now_or_never().expect("settled");
        assert_eq!(result.payload, "first");
    }

    #[test]
    fn dropping_a_pending_race_removes_its_listeners() {
        let hub: Arc<EventHub<&'static str>> = Arc::new(EventHub::new());
        let pending = race(&hub, &SOURCE_EVENTS);
        assert_eq!(total_listeners(&hub), 3);

        drop(pending);
        assert_eq!(total_listeners(&hub), 0);
    }

    #[tokio::test]
    async fn successive_races_see_data_then_end_and_leave_no_listeners() {
        let hub = Arc::new(EventHub::new());

        let first = race(&hub, &SOURCE_EVENTS);
        hub.emit(DATA, "payload");
        let first = first.await;
        assert_eq!((first.event, first.payload), (DATA, "payload"));

        let second = race(&hub, &SOURCE_EVENTS);
        hub.emit(END, "");
        let second = second.await;
        assert_eq!(second.event, END);

        assert_eq!(total_listeners(&hub), 0);
    }

    #[test]
    #[should_panic(expected = "at least one event")]
    fn empty_event_set_is_rejected() {
        let hub: Arc<EventHub<&'static str>> = Arc::new(EventHub::new());
        let _ = race(&hub, &[]);
    }
}
