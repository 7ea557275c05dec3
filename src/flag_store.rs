//! A thread-safe in-memory store for flag check results. [`FlagStore`] holds one snapshot of
//! flag values per canonical context key, tracks which context is currently active, and
//! notifies registered listeners when a visible value changes.
use std::collections::HashMap;
use std::sync::RwLock;

use crate::context::EvaluationContext;
use crate::flags::FlagCheckResult;
use crate::listeners::{KeyedListeners, ListenerHandle, Listeners};

struct CurrentContext {
    context: EvaluationContext,
    key: String,
}

#[derive(Default)]
struct FlagStoreInner {
    /// `None` until a context has been stored (REST mode) or acknowledged with a snapshot
    /// (WebSocket mode).
    current: Option<CurrentContext>,
    /// True between a context send and its first snapshot.
    pending: bool,
    /// Canonical context key -> flag key -> check result. Entries only exist for contexts
    /// that were explicitly sent over the wire and acknowledged with a snapshot.
    checks: HashMap<String, HashMap<String, FlagCheckResult>>,
}

/// `FlagStore` provides thread-safe (`Sync`) storage for flag check results, read
/// synchronously by consumers and replaced wholesale per context whenever a snapshot arrives.
pub struct FlagStore {
    inner: RwLock<FlagStoreInner>,
    value_listeners: KeyedListeners<bool>,
    check_listeners: KeyedListeners<FlagCheckResult>,
    pending_listeners: Listeners<bool>,
}

impl FlagStore {
    pub(crate) fn new() -> FlagStore {
        FlagStore {
            inner: RwLock::new(FlagStoreInner::default()),
            value_listeners: KeyedListeners::new(),
            check_listeners: KeyedListeners::new(),
            pending_listeners: Listeners::new(),
        }
    }

    /// The context currently used for cache lookups, if one has been set.
    pub(crate) fn current_context(&self) -> Option<EvaluationContext> {
        let inner = self
            .inner
            .read()
            .expect("thread holding flag store lock should not panic");
        inner.current.as_ref().map(|c| c.context.clone())
    }

    /// Canonical key of the current context, if one has been set.
    pub(crate) fn context_key(&self) -> Option<String> {
        let inner = self
            .inner
            .read()
            .expect("thread holding flag store lock should not panic");
        inner.current.as_ref().map(|c| c.key.clone())
    }

    /// Switch the current context. Listeners are notified for every flag whose visible
    /// value changes because of the switch.
    pub(crate) fn set_current_context(&self, context: EvaluationContext, key: String) {
        let changes = {
            let mut inner = self
                .inner
                .write()
                .expect("thread holding flag store lock should not panic");

            let old_key = inner.current.as_ref().map(|c| c.key.clone());
            inner.current = Some(CurrentContext { context, key });
            let new_key = inner.current.as_ref().map(|c| c.key.clone());

            visible_changes(&inner.checks, old_key.as_deref(), new_key.as_deref())
        };
        self.notify_changes(changes);
    }

    /// Store a snapshot for `context_key`, replacing any prior entry for that context.
    /// If `context_key` is the current context, listeners are notified of changed values.
    pub(crate) fn apply_snapshot(&self, context_key: &str, flags: Vec<FlagCheckResult>) {
        let changes = {
            let mut inner = self
                .inner
                .write()
                .expect("thread holding flag store lock should not panic");

            let snapshot: HashMap<String, FlagCheckResult> = flags
                .into_iter()
                .map(|check| (check.flag.clone(), check))
                .collect();

            let is_current = inner
                .current
                .as_ref()
                .is_some_and(|c| c.key == context_key);
            let changes = if is_current {
                let old = inner.checks.get(context_key);
                snapshot
                    .values()
                    .filter(|check| old.and_then(|m| m.get(&check.flag)) != Some(check))
                    .cloned()
                    .collect()
            } else {
                Vec::new()
            };

            inner.checks.insert(context_key.to_owned(), snapshot);
            changes
        };
        self.notify_changes(changes);
    }

    /// Synchronous read of the cached value for `flag` under the current context.
    pub(crate) fn flag_value(&self, flag: &str) -> Option<bool> {
        self.flag_check(flag).map(|check| check.value)
    }

    /// Full cached check result for `flag` under the current context.
    pub(crate) fn flag_check(&self, flag: &str) -> Option<FlagCheckResult> {
        let inner = self
            .inner
            .read()
            .expect("thread holding flag store lock should not panic");
        let current = inner.current.as_ref()?;
        inner.checks.get(&current.key)?.get(flag).cloned()
    }

    /// Whether the client is between a context send and its first snapshot.
    pub(crate) fn is_pending(&self) -> bool {
        let inner = self
            .inner
            .read()
            .expect("thread holding flag store lock should not panic");
        inner.pending
    }

    /// Update the pending indicator, notifying pending listeners on transitions only.
    pub(crate) fn set_pending(&self, pending: bool) {
        let changed = {
            let mut inner = self
                .inner
                .write()
                .expect("thread holding flag store lock should not panic");
            let changed = inner.pending != pending;
            inner.pending = pending;
            changed
        };
        if changed {
            self.pending_listeners.notify(&pending);
        }
    }

    pub(crate) fn on_flag_value(
        &self,
        flag: &str,
        callback: impl Fn(bool) + Send + Sync + 'static,
    ) -> ListenerHandle {
        self.value_listeners.subscribe(flag, callback)
    }

    pub(crate) fn on_flag_check(
        &self,
        flag: &str,
        callback: impl Fn(FlagCheckResult) + Send + Sync + 'static,
    ) -> ListenerHandle {
        self.check_listeners.subscribe(flag, callback)
    }

    pub(crate) fn on_pending_change(
        &self,
        callback: impl Fn(bool) + Send + Sync + 'static,
    ) -> ListenerHandle {
        self.pending_listeners.subscribe(callback)
    }

    fn notify_changes(&self, changes: Vec<FlagCheckResult>) {
        for check in changes {
            self.value_listeners.notify(&check.flag, &check.value);
            self.check_listeners.notify(&check.flag, &check);
        }
    }
}

/// Flags whose value under the new context differs from what was visible under the old one.
/// A flag that disappears entirely has no concrete value to report and is skipped.
fn visible_changes(
    checks: &HashMap<String, HashMap<String, FlagCheckResult>>,
    old_key: Option<&str>,
    new_key: Option<&str>,
) -> Vec<FlagCheckResult> {
    let empty = HashMap::new();
    let old = old_key.and_then(|k| checks.get(k)).unwrap_or(&empty);
    let new = new_key.and_then(|k| checks.get(k)).unwrap_or(&empty);

    new.values()
        .filter(|check| old.get(&check.flag) != Some(check))
        .cloned()
        .collect()
}
