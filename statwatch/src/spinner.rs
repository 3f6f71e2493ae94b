//! Loading indicators shared by concurrent requests.
//!
//! [`SpinnerCoordinator`] ref-counts outstanding requests so one request
//! finishing never hides the spinner another request still needs.
//! [`LoadingFlags`] holds named per-view booleans toggled by a poller for the
//! lifetime of a single in-flight request.

use std::collections::{BTreeMap, HashMap};
use std::future::Future;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::Duration;

use tokio::task::JoinHandle;

/// Delay before the global spinner shows, so fast responses never flicker.
pub const DEFAULT_SPINNER_DELAY: Duration = Duration::from_millis(100);

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct SpinnerToken(u64);

#[derive(Default)]
struct Pending {
    next: u64,
    timers: BTreeMap<SpinnerToken, JoinHandle<()>>,
}

#[derive(Clone, Default)]
pub struct SpinnerCoordinator {
    pending: Arc<Mutex<Pending>>,
    flag: Arc<AtomicBool>,
}

impl SpinnerCoordinator {
    pub fn new() -> Self {
        Self::default()
    }

    fn lock(&self) -> MutexGuard<'_, Pending> {
        self.pending.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Register a pending request; the flag goes up after `delay` unless the
    /// request ended first. Must be called inside a Tokio runtime.
    pub fn begin(&self, delay: Duration) -> SpinnerToken {
        let mut pending = self.lock();
        let token = SpinnerToken(pending.next);
        pending.next += 1;

        let shared = self.pending.clone();
        let flag = self.flag.clone();
        let timer = tokio::spawn(async move {
            tokio::time::sleep(delay).await;
            let pending = shared.lock().unwrap_or_else(PoisonError::into_inner);
            if pending.timers.contains_key(&token) {
                flag.store(true, Ordering::SeqCst);
            }
        });
        pending.timers.insert(token, timer);
        token
    }

    /// Finish a pending request. The flag drops once no request is pending.
    pub fn end(&self, token: SpinnerToken) {
        let mut pending = self.lock();
        if let Some(timer) = pending.timers.remove(&token) {
            timer.abort();
        }
        if pending.timers.is_empty() {
            self.flag.store(false, Ordering::SeqCst);
        }
    }

    pub fn is_active(&self) -> bool {
        self.flag.load(Ordering::SeqCst)
    }

    pub fn pending(&self) -> usize {
        self.lock().timers.len()
    }

    /// Like [`begin`](Self::begin), ending automatically when the guard drops.
    pub fn guard(&self, delay: Duration) -> SpinnerGuard {
        SpinnerGuard {
            coordinator: self.clone(),
            token: self.begin(delay),
        }
    }

    /// Keep the spinner pending for as long as `fut` runs.
    pub async fn track<F: Future>(&self, delay: Duration, fut: F) -> F::Output {
        let _guard = self.guard(delay);
        fut.await
    }
}

pub struct SpinnerGuard {
    coordinator: SpinnerCoordinator,
    token: SpinnerToken,
}

impl Drop for SpinnerGuard {
    fn drop(&mut self) {
        self.coordinator.end(self.token);
    }
}

/// Named booleans a view renders as per-panel loading indicators.
#[derive(Clone, Default)]
pub struct LoadingFlags {
    flags: Arc<Mutex<HashMap<String, bool>>>,
}

impl LoadingFlags {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn set(&self, name: &str, on: bool) {
        self.flags
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .insert(name.to_string(), on);
    }

    pub fn get(&self, name: &str) -> bool {
        self.flags
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .get(name)
            .copied()
            .unwrap_or(false)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test(start_paused = true)]
    async fn flag_waits_for_delay() {
        let spinner = SpinnerCoordinator::new();
        let token = spinner.begin(Duration::from_millis(100));
        assert!(!spinner.is_active());

        tokio::time::sleep(Duration::from_millis(150)).await;
        assert!(spinner.is_active());

        spinner.end(token);
        assert!(!spinner.is_active());
    }

    #[tokio::test(start_paused = true)]
    async fn fast_request_never_raises_flag() {
        let spinner = SpinnerCoordinator::new();
        let token = spinner.begin(Duration::from_millis(100));
        tokio::time::sleep(Duration::from_millis(20)).await;
        spinner.end(token);

        tokio::time::sleep(Duration::from_millis(200)).await;
        assert!(!spinner.is_active());
        assert_eq!(spinner.pending(), 0);
    }

    #[tokio::test(start_paused = true)]
    async fn overlapping_requests_clear_only_after_last_end() {
        for reverse in [false, true] {
            let spinner = SpinnerCoordinator::new();
            let a = spinner.begin(Duration::ZERO);
            let b = spinner.begin(Duration::ZERO);
            tokio::time::sleep(Duration::from_millis(1)).await;
            assert!(spinner.is_active());

            let (first, second) = if reverse { (b, a) } else { (a, b) };
            spinner.end(first);
            assert!(spinner.is_active(), "flag dropped while a request was pending");
            spinner.end(second);
            assert!(!spinner.is_active());
        }
    }

    #[tokio::test(start_paused = true)]
    async fn track_ends_when_future_completes() {
        let spinner = SpinnerCoordinator::new();
        let out = spinner
            .track(Duration::ZERO, async {
                tokio::time::sleep(Duration::from_millis(50)).await;
                7
            })
            .await;
        assert_eq!(out, 7);
        assert_eq!(spinner.pending(), 0);
        assert!(!spinner.is_active());
    }

    #[test]
    fn loading_flags_default_off() {
        let flags = LoadingFlags::new();
        assert!(!flags.get("tasks"));
        flags.set("tasks", true);
        assert!(flags.get("tasks"));
    }
}
