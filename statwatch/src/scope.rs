//! Lifecycle + named-event contract that pollers attach to.
//!
//! A view owns one scope. Pollers register a teardown callback on it (run
//! exactly once, on `destroy`) and may wire named events to `reload`.

use std::collections::HashMap;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use tracing::trace;

pub type EventHandler = Arc<dyn Fn() + Send + Sync>;
pub type Teardown = Box<dyn FnOnce() + Send>;

pub trait Scope: Send + Sync {
    /// Register a callback run once when the scope is destroyed.
    fn on_destroy(&self, teardown: Teardown);
    /// Run `handler` every time `event` is broadcast on this scope.
    fn on(&self, event: &str, handler: EventHandler);
}

#[derive(Default)]
struct ScopeInner {
    destroyed: bool,
    teardowns: Vec<Teardown>,
    handlers: HashMap<String, Vec<EventHandler>>,
}

/// In-process [`Scope`]: handlers are called synchronously by `broadcast`.
#[derive(Default)]
pub struct EventScope {
    inner: Mutex<ScopeInner>,
}

impl EventScope {
    pub fn new() -> Self {
        Self::default()
    }

    fn lock(&self) -> MutexGuard<'_, ScopeInner> {
        self.inner.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Invoke every handler registered for `event`. Returns how many ran.
    pub fn broadcast(&self, event: &str) -> usize {
        // Handlers may broadcast again or register more handlers; run them unlocked.
        let handlers = {
            let inner = self.lock();
            if inner.destroyed {
                return 0;
            }
            inner.handlers.get(event).cloned().unwrap_or_default()
        };
        trace!(event, handlers = handlers.len(), "scope broadcast");
        for handler in &handlers {
            handler();
        }
        handlers.len()
    }

    /// Run all teardown callbacks and drop every event handler. Idempotent.
    pub fn destroy(&self) {
        let teardowns = {
            let mut inner = self.lock();
            if inner.destroyed {
                return;
            }
            inner.destroyed = true;
            inner.handlers.clear();
            std::mem::take(&mut inner.teardowns)
        };
        for teardown in teardowns {
            teardown();
        }
    }

    pub fn is_destroyed(&self) -> bool {
        self.lock().destroyed
    }
}

impl Scope for EventScope {
    fn on_destroy(&self, teardown: Teardown) {
        let mut inner = self.lock();
        if inner.destroyed {
            drop(inner);
            teardown();
            return;
        }
        inner.teardowns.push(teardown);
    }

    fn on(&self, event: &str, handler: EventHandler) {
        let mut inner = self.lock();
        if inner.destroyed {
            return;
        }
        inner.handlers.entry(event.to_string()).or_default().push(handler);
    }
}

/// One event name or several, as accepted by `reload_on_scope_event`.
pub trait EventNames {
    fn into_names(self) -> Vec<String>;
}

impl EventNames for &str {
    fn into_names(self) -> Vec<String> {
        vec![self.to_string()]
    }
}

impl EventNames for String {
    fn into_names(self) -> Vec<String> {
        vec![self]
    }
}

impl EventNames for &[&str] {
    fn into_names(self) -> Vec<String> {
        self.iter().map(|s| s.to_string()).collect()
    }
}

impl<const N: usize> EventNames for [&str; N] {
    fn into_names(self) -> Vec<String> {
        self.iter().map(|s| s.to_string()).collect()
    }
}

impl EventNames for Vec<String> {
    fn into_names(self) -> Vec<String> {
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};

    #[test]
    fn broadcast_reaches_only_matching_handlers() {
        let scope = EventScope::new();
        let hits = Arc::new(AtomicUsize::new(0));
        let h = hits.clone();
        scope.on("nodesChanged", Arc::new(move || {
            h.fetch_add(1, Ordering::SeqCst);
        }));

        assert_eq!(scope.broadcast("nodesChanged"), 1);
        assert_eq!(scope.broadcast("somethingElse"), 0);
        assert_eq!(hits.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn destroy_runs_teardown_once_and_silences_events() {
        let scope = EventScope::new();
        let torn = Arc::new(AtomicUsize::new(0));
        let t = torn.clone();
        scope.on_destroy(Box::new(move || {
            t.fetch_add(1, Ordering::SeqCst);
        }));
        scope.on("e", Arc::new(|| panic!("handler must not run after destroy")));

        scope.destroy();
        scope.destroy();
        assert_eq!(torn.load(Ordering::SeqCst), 1);
        assert!(scope.is_destroyed());
        assert_eq!(scope.broadcast("e"), 0);

        // late registration runs immediately
        let t = torn.clone();
        scope.on_destroy(Box::new(move || {
            t.fetch_add(1, Ordering::SeqCst);
        }));
        assert_eq!(torn.load(Ordering::SeqCst), 2);
    }
}
