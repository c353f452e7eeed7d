//! State store - holds the current Snapshot and notifies subscribers
//!
//! Single-threaded by construction (`Rc`/`RefCell`): the engine runs on the
//! host page's event loop. Callbacks never run while the store is borrowed,
//! so a listener may read `current()`, unsubscribe itself or others, or
//! publish again. Publications made during a notification round are queued
//! and delivered after it, which keeps every listener's view in version order.

use std::cell::{Cell, RefCell};
use std::collections::VecDeque;
use std::rc::{Rc, Weak};
use std::sync::Arc;

use tracing::{debug, warn};

use super::types::Snapshot;

/// Default number of accepted snapshots kept for diagnostics
pub const DEFAULT_HISTORY: usize = 8;

type Listener = Box<dyn FnMut(&Arc<Snapshot>)>;

struct ListenerSlot {
    id: u64,
    active: Cell<bool>,
    callback: RefCell<Listener>,
}

struct StoreInner {
    current: Option<Arc<Snapshot>>,
    listeners: Vec<Rc<ListenerSlot>>,
    next_listener_id: u64,
    history: VecDeque<Arc<Snapshot>>,
    history_limit: usize,
    pending: VecDeque<Arc<Snapshot>>,
    notifying: bool,
}

/// What happened to a published snapshot
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PublishOutcome {
    Accepted,
    /// Dropped: the snapshot's validity flag was false
    Invalid,
    /// Dropped: not newer than the current snapshot
    Stale { current: u64 },
}

#[derive(Clone)]
pub struct StateStore {
    inner: Rc<RefCell<StoreInner>>,
}

impl StateStore {
    pub fn new() -> Self {
        Self::with_history(DEFAULT_HISTORY)
    }

    pub fn with_history(history_limit: usize) -> Self {
        Self {
            inner: Rc::new(RefCell::new(StoreInner {
                current: None,
                listeners: Vec::new(),
                next_listener_id: 0,
                history: VecDeque::with_capacity(history_limit),
                history_limit,
                pending: VecDeque::new(),
                notifying: false,
            })),
        }
    }

    /// Latest valid snapshot, or None if extraction never succeeded
    pub fn current(&self) -> Option<Arc<Snapshot>> {
        self.inner.borrow().current.clone()
    }

    /// Accepted snapshots, oldest first
    pub fn history(&self) -> Vec<Arc<Snapshot>> {
        self.inner.borrow().history.iter().cloned().collect()
    }

    pub fn listener_count(&self) -> usize {
        self.inner
            .borrow()
            .listeners
            .iter()
            .filter(|slot| slot.active.get())
            .count()
    }

    /// Offer a snapshot. Only valid, strictly newer snapshots replace the
    /// current one and reach subscribers; everything else is logged and dropped.
    pub fn publish(&self, snapshot: impl Into<Arc<Snapshot>>) -> PublishOutcome {
        let snapshot = snapshot.into();
        {
            let mut inner = self.inner.borrow_mut();

            if !snapshot.is_valid() {
                warn!(version = snapshot.version(), "[STORE] Dropping invalid snapshot");
                return PublishOutcome::Invalid;
            }
            if let Some(current) = &inner.current {
                if snapshot.version() <= current.version() {
                    debug!(
                        version = snapshot.version(),
                        current = current.version(),
                        "[STORE] Dropping stale snapshot"
                    );
                    return PublishOutcome::Stale {
                        current: current.version(),
                    };
                }
            }

            inner.current = Some(snapshot.clone());
            if inner.history_limit > 0 {
                if inner.history.len() == inner.history_limit {
                    inner.history.pop_front();
                }
                inner.history.push_back(snapshot.clone());
            }

            if inner.notifying {
                inner.pending.push_back(snapshot);
                return PublishOutcome::Accepted;
            }
            inner.notifying = true;
        }

        self.notify_from(snapshot);
        PublishOutcome::Accepted
    }

    fn notify_from(&self, first: Arc<Snapshot>) {
        let mut next = Some(first);
        while let Some(snapshot) = next {
            let slots: Vec<Rc<ListenerSlot>> = {
                let mut inner = self.inner.borrow_mut();
                inner.listeners.retain(|slot| slot.active.get());
                inner.listeners.clone()
            };

            debug!(
                version = snapshot.version(),
                listeners = slots.len(),
                "[STORE] Notifying"
            );
            for slot in slots {
                // Re-checked per call: an earlier listener may have unsubscribed this one
                if !slot.active.get() {
                    continue;
                }
                if let Ok(mut callback) = slot.callback.try_borrow_mut() {
                    (*callback)(&snapshot);
                }
            }

            let mut inner = self.inner.borrow_mut();
            next = inner.pending.pop_front();
            if next.is_none() {
                inner.notifying = false;
            }
        }
    }

    /// Register a listener called on every accepted publish
    pub fn subscribe<F>(&self, listener: F) -> Subscription
    where
        F: FnMut(&Arc<Snapshot>) + 'static,
    {
        let mut inner = self.inner.borrow_mut();
        let id = inner.next_listener_id;
        inner.next_listener_id += 1;

        let slot = Rc::new(ListenerSlot {
            id,
            active: Cell::new(true),
            callback: RefCell::new(Box::new(listener)),
        });
        inner.listeners.push(slot.clone());

        Subscription {
            slot: Rc::downgrade(&slot),
            store: Rc::downgrade(&self.inner),
        }
    }
}

impl Default for StateStore {
    fn default() -> Self {
        Self::new()
    }
}

/// Capability to stop receiving notifications
pub struct Subscription {
    slot: Weak<ListenerSlot>,
    store: Weak<RefCell<StoreInner>>,
}

impl Subscription {
    /// After this returns the listener is never invoked again
    pub fn unsubscribe(self) {
        let Some(slot) = self.slot.upgrade() else {
            return;
        };
        slot.active.set(false);
        if let Some(store) = self.store.upgrade() {
            // Busy only while a notification round is preparing; pruned there instead
            if let Ok(mut inner) = store.try_borrow_mut() {
                inner.listeners.retain(|s| s.id != slot.id);
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::types::{timestamp_from_ms, FieldValue};
    use std::collections::BTreeMap;

    fn snap(version: u64, valid: bool) -> Snapshot {
        let mut fields = BTreeMap::new();
        fields.insert("resourceLevel".to_string(), FieldValue::Integer(version as i64 * 10));
        Snapshot::new(version, timestamp_from_ms(version * 1000), fields, valid, Vec::new())
    }

    fn recorder(store: &StateStore) -> (Rc<RefCell<Vec<u64>>>, Subscription) {
        let seen = Rc::new(RefCell::new(Vec::new()));
        let sink = seen.clone();
        let sub = store.subscribe(move |s| sink.borrow_mut().push(s.version()));
        (seen, sub)
    }

    #[test]
    fn test_initial_current_is_none() {
        let store = StateStore::new();
        assert!(store.current().is_none());
        assert!(store.history().is_empty());
    }

    #[test]
    fn test_publish_newer_replaces_and_notifies_once() {
        let store = StateStore::new();
        let (seen, _sub) = recorder(&store);

        assert_eq!(store.publish(snap(1, true)), PublishOutcome::Accepted);
        assert_eq!(store.publish(snap(2, true)), PublishOutcome::Accepted);

        assert_eq!(*seen.borrow(), vec![1, 2]);
        assert_eq!(store.current().unwrap().version(), 2);
    }

    #[test]
    fn test_invalid_snapshot_is_dropped_silently() {
        let store = StateStore::new();
        let (seen, _sub) = recorder(&store);
        store.publish(snap(1, true));

        assert_eq!(store.publish(snap(5, false)), PublishOutcome::Invalid);
        assert_eq!(store.current().unwrap().version(), 1);
        assert_eq!(*seen.borrow(), vec![1]);
    }

    #[test]
    fn test_invalid_first_snapshot_leaves_store_empty() {
        let store = StateStore::new();
        let (seen, _sub) = recorder(&store);
        assert_eq!(store.publish(snap(1, false)), PublishOutcome::Invalid);
        assert!(store.current().is_none());
        assert!(seen.borrow().is_empty());
    }

    #[test]
    fn test_stale_and_duplicate_versions_are_dropped() {
        let store = StateStore::new();
        let (seen, _sub) = recorder(&store);
        store.publish(snap(3, true));

        assert_eq!(store.publish(snap(2, true)), PublishOutcome::Stale { current: 3 });
        assert_eq!(store.publish(snap(3, true)), PublishOutcome::Stale { current: 3 });
        assert_eq!(*seen.borrow(), vec![3]);
    }

    #[test]
    fn test_arbitrary_sequence_keeps_order_and_max() {
        let store = StateStore::new();
        let (seen, _sub) = recorder(&store);
        let sequence = [(4, true), (2, true), (6, false), (5, true), (5, true), (9, true), (7, true)];

        let mut max_valid = 0;
        for (version, valid) in sequence {
            store.publish(snap(version, valid));
            if valid {
                max_valid = max_valid.max(version);
            }
            assert_eq!(store.current().unwrap().version(), max_valid);
        }

        let seen = seen.borrow();
        assert_eq!(*seen, vec![4, 5, 9]);
        assert!(seen.windows(2).all(|w| w[0] < w[1]));
    }

    #[test]
    fn test_unsubscribe_stops_notifications() {
        let store = StateStore::new();
        let (seen, sub) = recorder(&store);
        store.publish(snap(1, true));
        sub.unsubscribe();
        store.publish(snap(2, true));

        assert_eq!(*seen.borrow(), vec![1]);
        assert_eq!(store.listener_count(), 0);
    }

    #[test]
    fn test_unsubscribe_from_inside_earlier_listener() {
        let store = StateStore::new();
        let victim: Rc<RefCell<Option<Subscription>>> = Rc::new(RefCell::new(None));

        let killer_handle = victim.clone();
        let _killer = store.subscribe(move |_| {
            if let Some(sub) = killer_handle.borrow_mut().take() {
                sub.unsubscribe();
            }
        });
        let (seen, sub) = recorder(&store);
        *victim.borrow_mut() = Some(sub);

        store.publish(snap(1, true));
        store.publish(snap(2, true));

        assert!(seen.borrow().is_empty());
    }

    #[test]
    fn test_publish_from_listener_is_delivered_in_order() {
        let store = StateStore::new();
        let republisher = store.clone();
        let _chain = store.subscribe(move |s| {
            if s.version() == 1 {
                republisher.publish(snap(2, true));
            }
        });
        let (seen, _sub) = recorder(&store);

        store.publish(snap(1, true));

        assert_eq!(*seen.borrow(), vec![1, 2]);
        assert_eq!(store.current().unwrap().version(), 2);
    }

    #[test]
    fn test_listener_can_read_current() {
        let store = StateStore::new();
        let reader = store.clone();
        let observed = Rc::new(Cell::new(0));
        let sink = observed.clone();
        let _sub = store.subscribe(move |_| {
            sink.set(reader.current().map(|s| s.version()).unwrap_or(0));
        });
        store.publish(snap(4, true));
        assert_eq!(observed.get(), 4);
    }

    #[test]
    fn test_history_is_bounded() {
        let store = StateStore::with_history(3);
        for v in 1..=5 {
            store.publish(snap(v, true));
        }
        let versions: Vec<u64> = store.history().iter().map(|s| s.version()).collect();
        assert_eq!(versions, vec![3, 4, 5]);
    }

    #[test]
    fn test_unsubscribe_after_store_dropped_is_harmless() {
        let store = StateStore::new();
        let (_seen, sub) = recorder(&store);
        drop(store);
        sub.unsubscribe();
    }
}
