//! Repeating request scheduler used by every live view.
//!
//! A [`Poller`] wraps a request factory. Each cycle calls the factory with the
//! last accepted value, waits for the result and, if the result still belongs
//! to the current generation, hands it to the subscribers and schedules the
//! next cycle. Results of requests issued before a `stop()`/`reload()` are
//! dropped on arrival; the request itself is left to the transport.
//!
//! Delivery to subscribers is serialized with `stop()`: once `stop()` returns,
//! no subscriber call is running or will start for an older request, even
//! when the result arrived on another worker thread.
//!
//! All methods must be called from inside a Tokio runtime.

use std::future::Future;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError, Weak};
use std::thread::{self, ThreadId};
use std::time::Duration;

use futures::future::BoxFuture;
use futures::FutureExt;
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tokio::time::Instant;
use tracing::{debug, trace, warn};

use crate::scope::{EventNames, Scope};
use crate::spinner::LoadingFlags;
use crate::visibility::{Visibility, VisibilitySource};

pub type RequestFuture<T> = BoxFuture<'static, anyhow::Result<T>>;
type RequestFactory<T> = Box<dyn Fn(Option<T>) -> RequestFuture<T> + Send + Sync>;
pub type Subscriber<T> = Arc<dyn Fn(&T, Option<&T>) + Send + Sync>;

/// How long to wait after an accepted result before the next cycle.
pub enum PollInterval<T> {
    Fixed(Duration),
    /// Computed from the value just accepted (e.g. a server refresh hint).
    Derived(Arc<dyn Fn(&T) -> Duration + Send + Sync>),
}

impl<T> PollInterval<T> {
    pub fn derived<F>(f: F) -> Self
    where
        F: Fn(&T) -> Duration + Send + Sync + 'static,
    {
        PollInterval::Derived(Arc::new(f))
    }

    fn delay_after(&self, value: &T) -> Duration {
        match self {
            PollInterval::Fixed(d) => *d,
            PollInterval::Derived(f) => f(value),
        }
    }
}

impl<T> Clone for PollInterval<T> {
    fn clone(&self) -> Self {
        match self {
            PollInterval::Fixed(d) => PollInterval::Fixed(*d),
            PollInterval::Derived(f) => PollInterval::Derived(f.clone()),
        }
    }
}

/// Identifies one issued request; only the newest one may be accepted.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RequestToken(u64);

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum Chaining {
    /// Next cycle after the configured interval; none without one.
    Timer,
    /// Next cycle as soon as a result is accepted.
    Immediate,
}

struct PollerState<T> {
    launched: bool,
    stopped_at: Option<Instant>,
    latest: Option<T>,
    interval: Option<PollInterval<T>>,
    timer: Option<JoinHandle<()>>,
    throttle: Option<JoinHandle<()>>,
    // Bumped for every issued request and every stop.
    generation: u64,
    in_flight: Option<RequestToken>,
    subscribers: Vec<Subscriber<T>>,
    spinners: Vec<(RequestToken, LoadingFlags, String)>,
    // Thread currently handing a result to subscribers.
    delivering: Option<ThreadId>,
}

impl<T> PollerState<T> {
    fn accepts(&self, token: RequestToken, started_at: Instant) -> bool {
        token.0 == self.generation && self.stopped_at.map_or(true, |stop| stop < started_at)
    }

    fn take_spinners(&mut self, token: RequestToken) -> Vec<(LoadingFlags, String)> {
        let (done, rest): (Vec<_>, Vec<_>) = std::mem::take(&mut self.spinners)
            .into_iter()
            .partition(|(t, _, _)| *t == token);
        self.spinners = rest;
        done.into_iter().map(|(_, flags, name)| (flags, name)).collect()
    }
}

struct Shared<T> {
    request: RequestFactory<T>,
    chaining: Chaining,
    scope: Arc<dyn Scope>,
    state: Mutex<PollerState<T>>,
    // Held for the whole of a delivery; `stop()` from another thread waits on it.
    delivery: Mutex<()>,
}

/// Handle to a repeating request cycle. Clones share the same state.
pub struct Poller<T> {
    shared: Arc<Shared<T>>,
}

impl<T> Clone for Poller<T> {
    fn clone(&self) -> Self {
        Self {
            shared: self.shared.clone(),
        }
    }
}

impl<T> Shared<T>
where
    T: Clone + Send + Sync + 'static,
{
    fn lock(&self) -> MutexGuard<'_, PollerState<T>> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Issue one request, provided nothing stopped or restarted the chain
    /// since `expected` was observed.
    fn run_cycle(self: &Arc<Self>, expected: u64) {
        let (token, started_at, previous) = {
            let mut st = self.lock();
            if !st.launched || st.generation != expected {
                return;
            }
            st.timer = None;
            st.generation += 1;
            let token = RequestToken(st.generation);
            st.in_flight = Some(token);
            (token, Instant::now(), st.latest.clone())
        };
        trace!(token = token.0, "poll cycle started");

        let request = (self.request)(previous);
        let weak = Arc::downgrade(self);
        tokio::spawn(async move {
            let outcome = request.await;
            if let Some(shared) = weak.upgrade() {
                shared.complete(token, started_at, outcome);
            }
        });
    }

    fn complete(self: &Arc<Self>, token: RequestToken, started_at: Instant, outcome: anyhow::Result<T>) {
        let spinners = {
            let mut st = self.lock();
            if st.in_flight == Some(token) {
                st.in_flight = None;
            }
            st.take_spinners(token)
        };
        for (flags, name) in spinners {
            flags.set(&name, false);
        }

        let value = match outcome {
            Ok(value) => value,
            Err(err) => {
                // No retry here: backoff and error display belong to the caller.
                warn!(token = token.0, "poll request failed, stopping: {err:#}");
                self.stop();
                return;
            }
        };

        let delivery = self.delivery.lock().unwrap_or_else(PoisonError::into_inner);
        let (subscribers, previous) = {
            let mut st = self.lock();
            if !st.accepts(token, started_at) {
                trace!(token = token.0, "discarding stale poll result");
                return;
            }
            st.delivering = Some(thread::current().id());
            (st.subscribers.clone(), st.latest.clone())
        };
        // Re-checked per subscriber so a stop() in between ends the delivery
        for subscriber in &subscribers {
            if !self.lock().accepts(token, started_at) {
                break;
            }
            subscriber(&value, previous.as_ref());
        }

        let chain_now = {
            let mut st = self.lock();
            st.delivering = None;
            if !st.accepts(token, started_at) {
                debug!(token = token.0, "poller stopped during delivery, dropping result");
                return;
            }
            let delay = st.interval.as_ref().map(|i| i.delay_after(&value));
            st.latest = Some(value);
            match (self.chaining, delay) {
                (Chaining::Immediate, _) => true,
                (Chaining::Timer, Some(delay)) => {
                    self.schedule(&mut st, delay);
                    false
                }
                (Chaining::Timer, None) => false,
            }
        };
        drop(delivery);
        if chain_now {
            self.run_cycle(token.0);
        }
    }

    fn schedule(self: &Arc<Self>, st: &mut PollerState<T>, delay: Duration) {
        if let Some(old) = st.timer.take() {
            old.abort();
        }
        let expected = st.generation;
        let weak: Weak<Self> = Arc::downgrade(self);
        trace!(delay_ms = delay.as_millis() as u64, "next poll scheduled");
        st.timer = Some(tokio::spawn(async move {
            tokio::time::sleep(delay).await;
            if let Some(shared) = weak.upgrade() {
                shared.run_cycle(expected);
            }
        }));
    }

    fn stop(&self) {
        let delivering = {
            let mut st = self.lock();
            st.launched = false;
            st.stopped_at = Some(Instant::now());
            st.generation += 1;
            if let Some(timer) = st.timer.take() {
                timer.abort();
            }
            st.delivering
        };
        // A subscriber stopping its own poller must not wait on itself
        if delivering.is_some_and(|id| id != thread::current().id()) {
            drop(self.delivery.lock().unwrap_or_else(PoisonError::into_inner));
        }
    }

    fn cycle(self: &Arc<Self>) {
        let expected = {
            let mut st = self.lock();
            if st.launched {
                return;
            }
            st.stopped_at = None;
            st.launched = true;
            st.generation
        };
        self.run_cycle(expected);
    }

    fn reload(self: &Arc<Self>, keep_latest_result: bool) {
        if !keep_latest_result {
            self.lock().latest = None;
        }
        self.stop();
        self.cycle();
    }

    fn teardown(&self) {
        self.stop();
        if let Some(pending) = self.lock().throttle.take() {
            pending.abort();
        }
    }
}

impl<T> Poller<T>
where
    T: Clone + Send + Sync + 'static,
{
    /// Create a poller bound to `scope`. With a visibility source the poller
    /// stops while hidden and reloads once visible again. Destroying the scope
    /// stops the poller and detaches the visibility listener.
    pub fn new<F, Fut>(
        scope: Arc<dyn Scope>,
        request: F,
        visibility: Option<Arc<dyn VisibilitySource>>,
    ) -> Self
    where
        F: Fn(Option<T>) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = anyhow::Result<T>> + Send + 'static,
    {
        Self::with_chaining(Chaining::Timer, scope, request, visibility)
    }

    pub(crate) fn with_chaining<F, Fut>(
        chaining: Chaining,
        scope: Arc<dyn Scope>,
        request: F,
        visibility: Option<Arc<dyn VisibilitySource>>,
    ) -> Self
    where
        F: Fn(Option<T>) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = anyhow::Result<T>> + Send + 'static,
    {
        let shared = Arc::new(Shared {
            request: Box::new(move |previous| request(previous).boxed()),
            chaining,
            scope: scope.clone(),
            state: Mutex::new(PollerState {
                launched: false,
                stopped_at: None,
                latest: None,
                interval: None,
                timer: None,
                throttle: None,
                generation: 0,
                in_flight: None,
                subscribers: Vec::new(),
                spinners: Vec::new(),
                delivering: None,
            }),
            delivery: Mutex::new(()),
        });

        let listener = visibility.map(|source| {
            let weak = Arc::downgrade(&shared);
            let id = source.subscribe(Arc::new(move |visibility: Visibility| {
                let Some(shared) = weak.upgrade() else { return };
                match visibility {
                    Visibility::Hidden => shared.stop(),
                    Visibility::Visible => shared.reload(false),
                }
            }));
            (source, id)
        });

        let weak = Arc::downgrade(&shared);
        scope.on_destroy(Box::new(move || {
            if let Some((source, id)) = listener {
                source.unsubscribe(id);
            }
            if let Some(shared) = weak.upgrade() {
                shared.teardown();
            }
        }));

        Self { shared }
    }

    pub fn set_interval(&self, interval: PollInterval<T>) -> &Self {
        self.shared.lock().interval = Some(interval);
        self
    }

    pub fn set_fixed_interval(&self, every: Duration) -> &Self {
        self.set_interval(PollInterval::Fixed(every))
    }

    pub fn set_derived_interval<F>(&self, f: F) -> &Self
    where
        F: Fn(&T) -> Duration + Send + Sync + 'static,
    {
        self.set_interval(PollInterval::derived(f))
    }

    /// Register a callback receiving every accepted value together with the
    /// value accepted before it. Callbacks run in registration order.
    pub fn subscribe<F>(&self, subscriber: F) -> &Self
    where
        F: Fn(&T, Option<&T>) + Send + Sync + 'static,
    {
        self.shared.lock().subscribers.push(Arc::new(subscriber));
        self
    }

    /// Latest accepted value published through a watch channel.
    pub fn watch(&self) -> watch::Receiver<Option<T>> {
        let (tx, rx) = watch::channel(self.latest_result());
        self.subscribe(move |value, _| {
            tx.send_replace(Some(value.clone()));
        });
        rx
    }

    /// Reload whenever any of `names` is broadcast on the poller's scope.
    pub fn reload_on_scope_event<N: EventNames>(&self, names: N) -> &Self {
        self.on_scope_events(names, None)
    }

    /// Like [`reload_on_scope_event`](Self::reload_on_scope_event), also
    /// raising `flags[name]` until the reload's request completes.
    pub fn reload_on_scope_event_with_spinner<N: EventNames>(
        &self,
        names: N,
        flags: &LoadingFlags,
        name: &str,
    ) -> &Self {
        self.on_scope_events(names, Some((flags.clone(), name.to_string())))
    }

    fn on_scope_events<N: EventNames>(&self, names: N, spinner: Option<(LoadingFlags, String)>) -> &Self {
        let weak = Arc::downgrade(&self.shared);
        let handler: Arc<dyn Fn() + Send + Sync> = Arc::new(move || {
            let Some(shared) = weak.upgrade() else { return };
            let poller = Poller { shared };
            poller.reload(false);
            if let Some((flags, name)) = &spinner {
                poller.show_spinner(flags, name);
            }
        });
        for event in names.into_names() {
            self.shared.scope.on(&event, handler.clone());
        }
        self
    }

    /// Start polling. Does nothing if already running.
    pub fn cycle(&self) -> &Self {
        self.shared.cycle();
        self
    }

    /// Stop, then start a fresh cycle. Unless `keep_latest_result`, the next
    /// request is built without a previous value.
    pub fn reload(&self, keep_latest_result: bool) -> &Self {
        self.shared.reload(keep_latest_result);
        self
    }

    /// Trailing-edge debounced `reload(false)`: calls made within `window` of
    /// each other collapse into one reload, `window` after the last call.
    pub fn reload_throttled(&self, window: Duration) -> &Self {
        let weak = Arc::downgrade(&self.shared);
        let mut st = self.shared.lock();
        if let Some(pending) = st.throttle.take() {
            pending.abort();
        }
        st.throttle = Some(tokio::spawn(async move {
            tokio::time::sleep(window).await;
            if let Some(shared) = weak.upgrade() {
                shared.reload(false);
            }
        }));
        drop(st);
        self
    }

    /// Stop scheduling and ignore the result of anything still in flight.
    pub fn stop(&self) -> &Self {
        self.shared.stop();
        self
    }

    /// Set `flags[name]` until the request currently in flight completes.
    pub fn show_spinner(&self, flags: &LoadingFlags, name: &str) -> &Self {
        let mut st = self.shared.lock();
        if let Some(token) = st.in_flight {
            flags.set(name, true);
            st.spinners.push((token, flags.clone(), name.to_string()));
        } else {
            flags.set(name, false);
        }
        drop(st);
        self
    }

    pub fn latest_result(&self) -> Option<T> {
        self.shared.lock().latest.clone()
    }

    pub fn is_launched(&self) -> bool {
        self.shared.lock().launched
    }

    pub fn stopped_at(&self) -> Option<Instant> {
        self.shared.lock().stopped_at
    }

    /// Whether the current generation has a request outstanding.
    pub fn has_request_in_flight(&self) -> bool {
        self.shared.lock().in_flight.is_some()
    }

    /// Whether a next cycle is waiting on its timer.
    pub fn has_pending_timer(&self) -> bool {
        self.shared
            .lock()
            .timer
            .as_ref()
            .is_some_and(|t| !t.is_finished())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::scope::EventScope;

    #[tokio::test(start_paused = true)]
    async fn stop_before_cycle_only_records_time() {
        let scope = Arc::new(EventScope::new());
        let poller: Poller<u32> = Poller::new(scope, |_| async { Ok(1) }, None);
        poller.stop();
        poller.stop();
        assert!(poller.stopped_at().is_some());
        assert!(!poller.is_launched());
        assert_eq!(poller.latest_result(), None);

        poller.cycle();
        assert!(poller.stopped_at().is_none());
        tokio::time::sleep(Duration::from_millis(1)).await;
        assert_eq!(poller.latest_result(), Some(1));
    }

    #[test]
    fn state_rejects_old_tokens_and_pre_stop_starts() {
        let now = Instant::now();
        let mut st: PollerState<u8> = PollerState {
            launched: true,
            stopped_at: None,
            latest: None,
            interval: None,
            timer: None,
            throttle: None,
            generation: 2,
            in_flight: Some(RequestToken(2)),
            subscribers: Vec::new(),
            spinners: Vec::new(),
            delivering: None,
        };
        assert!(st.accepts(RequestToken(2), now));
        assert!(!st.accepts(RequestToken(1), now));
        st.stopped_at = Some(now);
        assert!(!st.accepts(RequestToken(2), now));
    }
}
