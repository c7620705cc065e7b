use std::collections::HashMap;
use std::fmt;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use chrono::{DateTime, Utc};

use crate::hub::SubscriberSink;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct SubscriberId(u64);

impl fmt::Display for SubscriberId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "sub-{}", self.0)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SubscriberState {
    Registered,
    Streaming,
    Evicted,
}

pub struct Subscriber {
    pub id: SubscriberId,
    pub sink: Arc<dyn SubscriberSink>,
    pub state: SubscriberState,
    pub registered_at: DateTime<Utc>,
}

/// Live subscriber set. The lock is only held to insert, remove or copy.
#[derive(Default)]
pub struct SubscriberRegistry {
    subscribers: Mutex<HashMap<SubscriberId, Subscriber>>,
    next_id: AtomicU64,
}

impl SubscriberRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    fn lock(&self) -> MutexGuard<'_, HashMap<SubscriberId, Subscriber>> {
        // No invariant spans more than one map operation, so a poisoned map is still usable.
        self.subscribers.lock().unwrap_or_else(PoisonError::into_inner)
    }

    pub fn register(&self, sink: Arc<dyn SubscriberSink>) -> SubscriberId {
        let id = SubscriberId(self.next_id.fetch_add(1, Ordering::Relaxed));
        let mut subscriber = Subscriber {
            id,
            sink,
            state: SubscriberState::Registered,
            registered_at: Utc::now(),
        };
        // No handshake phase: streaming starts as soon as the entry exists.
        subscriber.state = SubscriberState::Streaming;

        self.lock().insert(id, subscriber);
        id
    }

    /// Removes and returns the subscriber, marked `Evicted`. `None` if it was already gone.
    pub fn remove(&self, id: SubscriberId) -> Option<Subscriber> {
        let mut subscriber = self.lock().remove(&id)?;
        subscriber.state = SubscriberState::Evicted;
        Some(subscriber)
    }

    pub fn snapshot(&self) -> Vec<(SubscriberId, Arc<dyn SubscriberSink>)> {
        self.lock()
            .values()
            .map(|subscriber| (subscriber.id, subscriber.sink.clone()))
            .collect()
    }

    /// `None` for ids this registry never issued.
    pub fn state(&self, id: SubscriberId) -> Option<SubscriberState> {
        if let Some(subscriber) = self.lock().get(&id) {
            return Some(subscriber.state);
        }
        (id.0 < self.next_id.load(Ordering::Relaxed)).then_some(SubscriberState::Evicted)
    }

    pub fn len(&self) -> usize {
        self.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::hub::sink::testing::RecordingSink;
    use std::collections::HashSet;

    #[test]
    fn test_ids_are_unique() {
        let registry = SubscriberRegistry::new();
        let ids: HashSet<SubscriberId> = (0..100)
            .map(|_| registry.register(Arc::new(RecordingSink::default())))
            .collect();

        assert_eq!(ids.len(), 100);
        assert_eq!(registry.len(), 100);
    }

    #[test]
    fn test_register_then_unregister_restores_size() {
        let registry = SubscriberRegistry::new();
        registry.register(Arc::new(RecordingSink::default()));
        let before = registry.len();

        let id = registry.register(Arc::new(RecordingSink::default()));
        assert_eq!(registry.state(id), Some(SubscriberState::Streaming));
        let removed = registry.remove(id).unwrap();

        assert_eq!(removed.state, SubscriberState::Evicted);
        assert_eq!(registry.len(), before);
        assert_eq!(registry.state(id), Some(SubscriberState::Evicted));
    }

    #[test]
    fn test_remove_is_idempotent() {
        let registry = SubscriberRegistry::new();
        let id = registry.register(Arc::new(RecordingSink::default()));

        assert!(registry.remove(id).is_some());
        assert!(registry.remove(id).is_none());
        assert!(registry.remove(SubscriberId(999)).is_none());
        assert!(registry.is_empty());
    }

    #[test]
    fn test_unknown_id_has_no_state() {
        let registry = SubscriberRegistry::new();
        assert_eq!(registry.state(SubscriberId(7)), None);
    }

    #[test]
    fn test_concurrent_registration() {
        let registry = Arc::new(SubscriberRegistry::new());
        let workers: Vec<_> = (0..8)
            .map(|_| {
                let registry = registry.clone();
                std::thread::spawn(move || {
                    (0..50)
                        .map(|_| registry.register(Arc::new(RecordingSink::default())))
                        .collect::<Vec<_>>()
                })
            })
            .collect();

        let ids: HashSet<SubscriberId> = workers
            .into_iter()
            .flat_map(|worker| worker.join().unwrap())
            .collect();
        assert_eq!(ids.len(), 400);
        assert_eq!(registry.snapshot().len(), 400);
    }
}
