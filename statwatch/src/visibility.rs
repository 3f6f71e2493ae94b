//! Page-visibility signal. Pollers built with a source stop while hidden and
//! reload when visible again.

use std::collections::BTreeMap;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Visibility {
    Visible,
    Hidden,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub struct ListenerId(u64);

pub type VisibilityListener = Arc<dyn Fn(Visibility) + Send + Sync>;

pub trait VisibilitySource: Send + Sync {
    fn subscribe(&self, listener: VisibilityListener) -> ListenerId;
    fn unsubscribe(&self, id: ListenerId);
}

struct SignalInner {
    current: Visibility,
    next_id: u64,
    listeners: BTreeMap<ListenerId, VisibilityListener>,
}

/// Settable [`VisibilitySource`]; listeners fire only when the value changes.
pub struct VisibilitySignal {
    inner: Mutex<SignalInner>,
}

impl Default for VisibilitySignal {
    fn default() -> Self {
        Self {
            inner: Mutex::new(SignalInner {
                current: Visibility::Visible,
                next_id: 0,
                listeners: BTreeMap::new(),
            }),
        }
    }
}

impl VisibilitySignal {
    pub fn new() -> Self {
        Self::default()
    }

    fn lock(&self) -> MutexGuard<'_, SignalInner> {
        self.inner.lock().unwrap_or_else(PoisonError::into_inner)
    }

    pub fn current(&self) -> Visibility {
        self.lock().current
    }

    pub fn listener_count(&self) -> usize {
        self.lock().listeners.len()
    }

    pub fn set(&self, visibility: Visibility) {
        let listeners: Vec<VisibilityListener> = {
            let mut inner = self.lock();
            if inner.current == visibility {
                return;
            }
            inner.current = visibility;
            inner.listeners.values().cloned().collect()
        };
        for listener in listeners {
            listener(visibility);
        }
    }
}

impl VisibilitySource for VisibilitySignal {
    fn subscribe(&self, listener: VisibilityListener) -> ListenerId {
        let mut inner = self.lock();
        let id = ListenerId(inner.next_id);
        inner.next_id += 1;
        inner.listeners.insert(id, listener);
        id
    }

    fn unsubscribe(&self, id: ListenerId) {
        self.lock().listeners.remove(&id);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn notifies_on_change_only() {
        let signal = VisibilitySignal::new();
        let seen = Arc::new(Mutex::new(Vec::new()));
        let s = seen.clone();
        let id = signal.subscribe(Arc::new(move |v: Visibility| s.lock().unwrap().push(v)));

        signal.set(Visibility::Visible);
        signal.set(Visibility::Hidden);
        signal.set(Visibility::Hidden);
        signal.set(Visibility::Visible);
        assert_eq!(*seen.lock().unwrap(), vec![Visibility::Hidden, Visibility::Visible]);

        signal.unsubscribe(id);
        assert_eq!(signal.listener_count(), 0);
        signal.set(Visibility::Hidden);
        assert_eq!(seen.lock().unwrap().len(), 2);
        assert_eq!(signal.current(), Visibility::Hidden);
    }
}
