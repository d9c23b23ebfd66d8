//! Publish/subscribe lists for cross-cutting events.

use parking_lot::Mutex;
use std::sync::{Arc, Weak};

type Subscriber<T> = Arc<dyn Fn(&T) + Send + Sync>;

struct Entries<T> {
    next_token: u64,
    subscribers: Vec<(u64, Subscriber<T>)>,
}

/// An ordered list of subscribers for one category of event.
pub struct SubscriberList<T> {
    entries: Arc<Mutex<Entries<T>>>,
}

impl<T: 'static> SubscriberList<T> {
    pub fn new() -> Self {
        SubscriberList {
            entries: Arc::new(Mutex::new(Entries {
                next_token: 0,
                subscribers: Vec::new(),
            })),
        }
    }

    /// Append a subscriber. It stays registered until the returned
    /// `Subscription` is disposed.
    pub fn subscribe<F>(&self, subscriber: F) -> Subscription
    where
        F: Fn(&T) + Send + Sync + 'static,
    {
        let mut entries = self.entries.lock();
        let token = entries.next_token;
        entries.next_token += 1;
        entries.subscribers.push((token, Arc::new(subscriber)));

        let weak: Weak<Mutex<Entries<T>>> = Arc::downgrade(&self.entries);
        Subscription::new(move || {
            if let Some(entries) = weak.upgrade() {
                entries.lock().subscribers.retain(|(t, _)| *t != token);
            }
        })
    }

    /// Call every subscriber registered at the time of the call, in
    /// registration order.
    pub fn publish(&self, event: &T) {
        let snapshot: Vec<Subscriber<T>> = self
            .entries
            .lock()
            .subscribers
            .iter()
            .map(|(_, s)| s.clone())
            .collect();
        for subscriber in snapshot {
            subscriber(event);
        }
    }

    pub fn len(&self) -> usize {
        self.entries.lock().subscribers.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

impl<T: 'static> Default for SubscriberList<T> {
    fn default() -> Self {
        Self::new()
    }
}

/// Handle returned by `subscribe`. Disposing it more than once is a no-op.
///
/// Dropping the handle does not unsubscribe.
pub struct Subscription {
    unsubscribe: Mutex<Option<Box<dyn FnOnce() + Send>>>,
}

impl Subscription {
    fn new(unsubscribe: impl FnOnce() + Send + 'static) -> Self {
        Subscription {
            unsubscribe: Mutex::new(Some(Box::new(unsubscribe))),
        }
    }

    pub fn dispose(&self) {
        // Take first so the list lock isn't taken while ours is held.
        let unsubscribe = self.unsubscribe.lock().take();
        if let Some(unsubscribe) = unsubscribe {
            unsubscribe();
        }
    }

    pub fn is_disposed(&self) -> bool {
        self.unsubscribe.lock().is_none()
    }
}

impl std::fmt::Debug for Subscription {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Subscription")
            .field("disposed", &self.is_disposed())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};

    #[test]
    fn test_publish_in_registration_order() {
        let list = SubscriberList::<u32>::new();
        let seen = Arc::new(Mutex::new(Vec::new()));

        for tag in ["a", "b", "c"] {
            let seen = seen.clone();
            let _sub = list.subscribe(move |n: &u32| seen.lock().push(format!("{}{}", tag, n)));
        }

        list.publish(&1);
        assert_eq!(*seen.lock(), vec!["a1", "b1", "c1"]);
    }

    #[test]
    fn test_dispose_removes_only_that_subscriber() {
        let list = SubscriberList::<()>::new();
        let count = Arc::new(AtomicUsize::new(0));

        let c1 = count.clone();
        let first = list.subscribe(move |_| {
            c1.fetch_add(1, Ordering::SeqCst);
        });
        let c2 = count.clone();
        let _second = list.subscribe(move |_| {
            c2.fetch_add(10, Ordering::SeqCst);
        });

        first.dispose();
        first.dispose();
        assert!(first.is_disposed());
        assert_eq!(list.len(), 1);

        list.publish(&());
        assert_eq!(count.load(Ordering::SeqCst), 10);
    }

    #[test]
    fn test_subscribe_during_publish_waits_for_next_publish() {
        let list = Arc::new(SubscriberList::<()>::new());
        let late_calls = Arc::new(AtomicUsize::new(0));

        let list_in_cb = list.clone();
        let late_in_cb = late_calls.clone();
        let _sub = list.subscribe(move |_| {
            let late = late_in_cb.clone();
            let _ = list_in_cb.subscribe(move |_| {
                late.fetch_add(1, Ordering::SeqCst);
            });
        });

        list.publish(&());
        assert_eq!(late_calls.load(Ordering::SeqCst), 0);
        assert_eq!(list.len(), 2);

        list.publish(&());
        assert_eq!(late_calls.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn test_dispose_after_list_dropped() {
        let list = SubscriberList::<()>::new();
        let sub = list.subscribe(|_| {});
        drop(list);
        sub.dispose();
        assert!(sub.is_disposed());
    }
}
