//! A generic listener registry: subscribe to a mutable external cell, get notified on change,
//! unsubscribe on teardown. This is the seam UI bindings build their reactive adapters on
//! without polling the cache.
use std::collections::{BTreeMap, HashMap};
use std::sync::{Arc, Mutex, Weak};

type Callback<T> = Arc<dyn Fn(T) + Send + Sync>;

/// Handle returned from listener registration. Calling [`ListenerHandle::unsubscribe`]
/// removes that one listener; other listeners for the same key are unaffected.
///
/// Dropping the handle without calling `unsubscribe` leaves the listener registered for the
/// lifetime of the client.
pub struct ListenerHandle {
    remove: Box<dyn FnOnce() + Send>,
}

impl ListenerHandle {
    fn new(remove: impl FnOnce() + Send + 'static) -> ListenerHandle {
        ListenerHandle {
            remove: Box::new(remove),
        }
    }

    /// Remove the listener this handle was returned for.
    pub fn unsubscribe(self) {
        (self.remove)();
    }
}

impl std::fmt::Debug for ListenerHandle {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ListenerHandle").finish_non_exhaustive()
    }
}

struct ListenerMap<T> {
    next_id: u64,
    callbacks: BTreeMap<u64, Callback<T>>,
}

impl<T> Default for ListenerMap<T> {
    fn default() -> ListenerMap<T> {
        ListenerMap {
            next_id: 0,
            callbacks: BTreeMap::new(),
        }
    }
}

/// An unkeyed set of listeners, all notified with each value.
pub(crate) struct Listeners<T> {
    inner: Arc<Mutex<ListenerMap<T>>>,
}

impl<T: Clone + 'static> Listeners<T> {
    pub(crate) fn new() -> Listeners<T> {
        Listeners {
            inner: Arc::new(Mutex::new(ListenerMap::default())),
        }
    }

    pub(crate) fn subscribe(
        &self,
        callback: impl Fn(T) + Send + Sync + 'static,
    ) -> ListenerHandle {
        let mut map = self
            .inner
            .lock()
            .expect("thread holding listener lock should not panic");
        let id = map.next_id;
        map.next_id += 1;
        map.callbacks.insert(id, Arc::new(callback));

        let weak: Weak<Mutex<ListenerMap<T>>> = Arc::downgrade(&self.inner);
        ListenerHandle::new(move || {
            if let Some(inner) = weak.upgrade() {
                inner
                    .lock()
                    .expect("thread holding listener lock should not panic")
                    .callbacks
                    .remove(&id);
            }
        })
    }

    /// Invoke all listeners synchronously. Invocation order is unspecified.
    pub(crate) fn notify(&self, value: &T) {
        // Callbacks are invoked outside the lock so a callback may itself
        // subscribe or unsubscribe.
        let callbacks: Vec<Callback<T>> = {
            let map = self
                .inner
                .lock()
                .expect("thread holding listener lock should not panic");
            map.callbacks.values().cloned().collect()
        };
        for callback in callbacks {
            callback(value.clone());
        }
    }
}

/// Listeners keyed by flag key; notification for one key only reaches that key's listeners.
pub(crate) struct KeyedListeners<T> {
    inner: Arc<Mutex<HashMap<String, ListenerMap<T>>>>,
}

impl<T: Clone + 'static> KeyedListeners<T> {
    pub(crate) fn new() -> KeyedListeners<T> {
        KeyedListeners {
            inner: Arc::new(Mutex::new(HashMap::new())),
        }
    }

    pub(crate) fn subscribe(
        &self,
        key: &str,
        callback: impl Fn(T) + Send + Sync + 'static,
    ) -> ListenerHandle {
        let mut keyed = self
            .inner
            .lock()
            .expect("thread holding listener lock should not panic");
        let map = keyed.entry(key.to_owned()).or_default();
        let id = map.next_id;
        map.next_id += 1;
        map.callbacks.insert(id, Arc::new(callback));

        let weak: Weak<Mutex<HashMap<String, ListenerMap<T>>>> = Arc::downgrade(&self.inner);
        let key = key.to_owned();
        ListenerHandle::new(move || {
            if let Some(inner) = weak.upgrade() {
                let mut keyed = inner
                    .lock()
                    .expect("thread holding listener lock should not panic");
                if let Some(map) = keyed.get_mut(&key) {
                    map.callbacks.remove(&id);
                    if map.callbacks.is_empty() {
                        keyed.remove(&key);
                    }
                }
            }
        })
    }

    pub(crate) fn notify(&self, key: &str, value: &T) {
        let callbacks: Vec<Callback<T>> = {
            let keyed = self
                .inner
                .lock()
                .expect("thread holding listener lock should not panic");
            match keyed.get(key) {
                Some(map) => map.callbacks.values().cloned().collect(),
                None => return,
            }
        };
        for callback in callbacks {
            callback(value.clone());
        }
    }
}

#[cfg(test)]
mod tests {
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Arc;

    use super::*;

    #[test]
    fn notifies_all_subscribers() {
        let listeners = Listeners::<bool>::new();
        let count = Arc::new(AtomicUsize::new(0));

        let _first = {
            let count = count.clone();
            listeners.subscribe(move |_| {
                count.fetch_add(1, Ordering::SeqCst);
            })
        };
        let _second = {
            let count = count.clone();
            listeners.subscribe(move |_| {
                count.fetch_add(1, Ordering::SeqCst);
            })
        };

        listeners.notify(&true);
        assert_eq!(count.load(Ordering::SeqCst), 2);
    }

    #[test]
    fn unsubscribe_removes_only_that_listener() {
        let listeners = KeyedListeners::<bool>::new();
        let first_count = Arc::new(AtomicUsize::new(0));
        let second_count = Arc::new(AtomicUsize::new(0));

        let first = {
            let count = first_count.clone();
            listeners.subscribe("flag", move |_| {
                count.fetch_add(1, Ordering::SeqCst);
            })
        };
        let _second = {
            let count = second_count.clone();
            listeners.subscribe("flag", move |_| {
                count.fetch_add(1, Ordering::SeqCst);
            })
        };

        listeners.notify("flag", &true);
        first.unsubscribe();
        listeners.notify("flag", &false);

        assert_eq!(first_count.load(Ordering::SeqCst), 1);
        assert_eq!(second_count.load(Ordering::SeqCst), 2);
    }

    #[test]
    fn keyed_notification_is_scoped_to_the_key() {
        let listeners = KeyedListeners::<bool>::new();
        let count = Arc::new(AtomicUsize::new(0));

        let _handle = {
            let count = count.clone();
            listeners.subscribe("flag-a", move |_| {
                count.fetch_add(1, Ordering::SeqCst);
            })
        };

        listeners.notify("flag-b", &true);
        assert_eq!(count.load(Ordering::SeqCst), 0);
    }

    #[test]
    fn subscribing_from_a_callback_does_not_deadlock() {
        let listeners = Arc::new(Listeners::<bool>::new());
        let inner = listeners.clone();

        let _handle = listeners.subscribe(move |_| {
            // Registration during notification must not block on the registry lock.
            let _nested = inner.subscribe(|_| {});
        });

        listeners.notify(&true);
    }
}
