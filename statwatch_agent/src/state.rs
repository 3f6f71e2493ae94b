//! Shared agent state: sample history, task board and client bookkeeping.

use std::sync::atomic::AtomicUsize;
use std::sync::Arc;
use std::time::Duration;

use tokio::sync::RwLock;

use crate::store::SampleStore;
use crate::tasks::TaskBoard;

#[derive(Clone)]
pub struct AppState {
    pub hostname: Arc<str>,
    pub store: Arc<RwLock<SampleStore>>,
    pub tasks: Arc<TaskBoard>,
    pub long_poll: Duration,

    pub client_count: Arc<AtomicUsize>,
    pub auth_token: Option<String>,
}

impl AppState {
    pub fn new(samples: usize, interval: Duration, long_poll: Duration, auth_token: Option<String>) -> Self {
        let hostname = sysinfo::System::host_name().unwrap_or_else(|| "unknown".into());
        Self {
            hostname: hostname.into(),
            store: Arc::new(RwLock::new(SampleStore::new(samples, interval.as_millis() as u64))),
            tasks: Arc::new(TaskBoard::new()),
            long_poll,
            client_count: Arc::new(AtomicUsize::new(0)),
            auth_token,
        }
    }
}
