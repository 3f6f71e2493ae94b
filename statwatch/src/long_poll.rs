//! Poller for endpoints that block server side until something changes.
//!
//! Each accepted result immediately starts the next request, passing the
//! result along so the request can carry its etag. There is no timer, so at
//! most one request per poller is outstanding at any time.

use std::future::Future;
use std::sync::Arc;
use std::time::Duration;

use tokio::sync::watch;

use crate::poll::{Chaining, Poller};
use crate::scope::{EventNames, Scope};
use crate::spinner::LoadingFlags;
use crate::visibility::VisibilitySource;

pub struct EtagPoller<T> {
    inner: Poller<T>,
}

impl<T> Clone for EtagPoller<T> {
    fn clone(&self) -> Self {
        Self {
            inner: self.inner.clone(),
        }
    }
}

impl<T> EtagPoller<T>
where
    T: Clone + Send + Sync + 'static,
{
    pub fn new<F, Fut>(
        scope: Arc<dyn Scope>,
        request: F,
        visibility: Option<Arc<dyn VisibilitySource>>,
    ) -> Self
    where
        F: Fn(Option<T>) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = anyhow::Result<T>> + Send + 'static,
    {
        Self {
            inner: Poller::with_chaining(Chaining::Immediate, scope, request, visibility),
        }
    }

    pub fn subscribe<F>(&self, subscriber: F) -> &Self
    where
        F: Fn(&T, Option<&T>) + Send + Sync + 'static,
    {
        self.inner.subscribe(subscriber);
        self
    }

    pub fn watch(&self) -> watch::Receiver<Option<T>> {
        self.inner.watch()
    }

    pub fn reload_on_scope_event<N: EventNames>(&self, names: N) -> &Self {
        self.inner.reload_on_scope_event(names);
        self
    }

    pub fn reload_on_scope_event_with_spinner<N: EventNames>(
        &self,
        names: N,
        flags: &LoadingFlags,
        name: &str,
    ) -> &Self {
        self.inner.reload_on_scope_event_with_spinner(names, flags, name);
        self
    }

    pub fn cycle(&self) -> &Self {
        self.inner.cycle();
        self
    }

    pub fn reload(&self, keep_latest_result: bool) -> &Self {
        self.inner.reload(keep_latest_result);
        self
    }

    pub fn reload_throttled(&self, window: Duration) -> &Self {
        self.inner.reload_throttled(window);
        self
    }

    pub fn stop(&self) -> &Self {
        self.inner.stop();
        self
    }

    pub fn show_spinner(&self, flags: &LoadingFlags, name: &str) -> &Self {
        self.inner.show_spinner(flags, name);
        self
    }

    pub fn latest_result(&self) -> Option<T> {
        self.inner.latest_result()
    }

    pub fn is_launched(&self) -> bool {
        self.inner.is_launched()
    }

    pub fn has_request_in_flight(&self) -> bool {
        self.inner.has_request_in_flight()
    }
}
