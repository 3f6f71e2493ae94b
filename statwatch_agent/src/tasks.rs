//! Task list published by the sampler and long-polled by clients.
//!
//! The etag only changes when the list changes at display precision (whole
//! CPU percent, whole MiB), so a waiting client is not woken on every sample.

use std::sync::{Mutex, MutexGuard, PoisonError};
use std::time::Duration;

use tokio::sync::Notify;
use tokio::time::Instant;

use crate::types::{TaskInfo, TasksResponse};

#[derive(Default)]
struct Board {
    version: u64,
    fingerprint: Vec<(u32, String, u32, u64)>,
    tasks: Vec<TaskInfo>,
}

#[derive(Default)]
pub struct TaskBoard {
    board: Mutex<Board>,
    changed: Notify,
}

fn fingerprint(tasks: &[TaskInfo]) -> Vec<(u32, String, u32, u64)> {
    tasks
        .iter()
        .map(|t| {
            (
                t.pid,
                t.name.clone(),
                t.cpu_usage.round() as u32,
                t.mem_bytes >> 20,
            )
        })
        .collect()
}

impl TaskBoard {
    pub fn new() -> Self {
        Self::default()
    }

    fn lock(&self) -> MutexGuard<'_, Board> {
        self.board.lock().unwrap_or_else(PoisonError::into_inner)
    }

    pub fn snapshot(&self) -> TasksResponse {
        let board = self.lock();
        TasksResponse {
            etag: format!("{:x}", board.version),
            tasks: board.tasks.clone(),
        }
    }

    /// Replace the list. Returns whether the etag changed (waiters are woken).
    pub fn publish(&self, tasks: Vec<TaskInfo>) -> bool {
        let fp = fingerprint(&tasks);
        {
            let mut board = self.lock();
            board.tasks = tasks;
            if board.fingerprint == fp {
                return false;
            }
            board.fingerprint = fp;
            board.version += 1;
        }
        self.changed.notify_waiters();
        true
    }

    /// Current list once its etag differs from `known`, or whatever is
    /// current when `timeout` elapses.
    pub async fn wait_for_change(&self, known: Option<&str>, timeout: Duration) -> TasksResponse {
        let deadline = Instant::now() + timeout;
        loop {
            let notified = self.changed.notified();
            tokio::pin!(notified);
            // Register before reading so a publish in between is not missed
            notified.as_mut().enable();

            let current = self.snapshot();
            if known != Some(current.etag.as_str()) {
                return current;
            }
            if tokio::time::timeout_at(deadline, notified).await.is_err() {
                return self.snapshot();
            }
        }
    }
}
