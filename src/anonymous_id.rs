//! Anonymous identity: a generated UUID persisted across client instances through a
//! pluggable storage backend.
use std::collections::HashMap;
use std::sync::{Arc, Mutex};

/// Pluggable persistent storage used to memoize the anonymous id (and any future
/// client-side state) across sessions.
///
/// Implementations must be cheap to call; both methods are invoked synchronously.
pub trait StoragePersister: Send + Sync {
    /// Read a previously stored value.
    fn get_item(&self, key: &str) -> Option<String>;
    /// Store a value. Failures should be swallowed by the implementation; the SDK
    /// degrades to non-persistent ids rather than propagating storage errors.
    fn set_item(&self, key: &str, value: String);
}

/// Default [`StoragePersister`]: an in-process map, persistent for the lifetime of the
/// process only.
#[derive(Default)]
pub struct MemoryStoragePersister {
    items: Mutex<HashMap<String, String>>,
}

impl MemoryStoragePersister {
    /// Create an empty in-memory store.
    pub fn new() -> MemoryStoragePersister {
        MemoryStoragePersister::default()
    }
}

impl StoragePersister for MemoryStoragePersister {
    fn get_item(&self, key: &str) -> Option<String> {
        let items = self
            .items
            .lock()
            .expect("thread holding storage lock should not panic");
        items.get(key).cloned()
    }

    fn set_item(&self, key: &str, value: String) {
        let mut items = self
            .items
            .lock()
            .expect("thread holding storage lock should not panic");
        items.insert(key.to_owned(), value);
    }
}

/// Storage key under which the anonymous id is persisted.
const ANONYMOUS_ID_KEY: &str = "schematicId";

/// Lazily creates and memoizes the anonymous tracker id. Without a storage backend it
/// degrades to a fresh id per call instead of failing.
pub(crate) struct AnonymousIdStore {
    storage: Option<Arc<dyn StoragePersister>>,
}

impl AnonymousIdStore {
    pub(crate) fn new(storage: Option<Arc<dyn StoragePersister>>) -> AnonymousIdStore {
        AnonymousIdStore { storage }
    }

    pub(crate) fn anonymous_id(&self) -> String {
        let Some(storage) = &self.storage else {
            return uuid::Uuid::new_v4().to_string();
        };

        match storage.get_item(ANONYMOUS_ID_KEY) {
            Some(id) => id,
            None => {
                let id = uuid::Uuid::new_v4().to_string();
                storage.set_item(ANONYMOUS_ID_KEY, id.clone());
                id
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn memoizes_id_through_storage() {
        let storage = Arc::new(MemoryStoragePersister::new());
        let store = AnonymousIdStore::new(Some(storage.clone()));

        let first = store.anonymous_id();
        let second = store.anonymous_id();

        assert_eq!(first, second);
        assert_eq!(storage.get_item(ANONYMOUS_ID_KEY), Some(first));
    }

    #[test]
    fn shares_id_between_clients_using_the_same_storage() {
        let storage: Arc<dyn StoragePersister> = Arc::new(MemoryStoragePersister::new());
        let first = AnonymousIdStore::new(Some(storage.clone()));
        let second = AnonymousIdStore::new(Some(storage));

        assert_eq!(first.anonymous_id(), second.anonymous_id());
    }

    #[test]
    fn degrades_to_fresh_ids_without_storage() {
        let store = AnonymousIdStore::new(None);

        assert_ne!(store.anonymous_id(), store.anonymous_id());
    }
}
