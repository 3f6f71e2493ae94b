//! Background sampler: periodically collects cpu/mem/net into the sample store
//! and publishes the top tasks, so WS replies only read shared state.

use std::time::{SystemTime, UNIX_EPOCH};

use sysinfo::{CpuRefreshKind, MemoryRefreshKind, Networks, ProcessRefreshKind, ProcessesToUpdate, RefreshKind, System};
use tokio::task::JoinHandle;
use tokio::time::{interval, Duration, Instant, MissedTickBehavior};
use tracing::{debug, info};

use crate::state::AppState;
use crate::store::Frame;
use crate::types::TaskInfo;

pub const TOP_TASKS: usize = 20;

pub struct Sampler {
    sys: System,
    // Kept alive across samples so received()/transmitted() are deltas
    nets: Networks,
    last_net: Option<Instant>,
}

impl Default for Sampler {
    fn default() -> Self {
        Self::new()
    }
}

impl Sampler {
    pub fn new() -> Self {
        let refresh_kind = RefreshKind::nothing()
            .with_cpu(CpuRefreshKind::everything())
            .with_memory(MemoryRefreshKind::everything());
        let mut sys = System::new_with_specifics(refresh_kind);
        sys.refresh_cpu_usage();
        sys.refresh_memory();
        Self {
            sys,
            nets: Networks::new_with_refreshed_list(),
            last_net: None,
        }
    }

    pub fn sample(&mut self, ts: i64) -> Frame {
        let mut frame = Frame::new(ts);

        self.sys.refresh_cpu_usage();
        frame.set("cpu", "total", Some(self.sys.global_cpu_usage() as f64));
        for (i, cpu) in self.sys.cpus().iter().enumerate() {
            frame.set("cpu", &format!("cpu{i}"), Some(cpu.cpu_usage() as f64));
        }

        self.sys.refresh_memory();
        frame.set("mem", "used", percent(self.sys.used_memory(), self.sys.total_memory()));
        frame.set("mem", "swap", percent(self.sys.used_swap(), self.sys.total_swap()));

        // First sample has no baseline, so rates are unknown
        let now = Instant::now();
        self.nets.refresh(true);
        let (rx, tx) = self
            .nets
            .iter()
            .fold((0u64, 0u64), |(rx, tx), (_, data)| {
                (rx.saturating_add(data.received()), tx.saturating_add(data.transmitted()))
            });
        let rates = self.last_net.map(|prev| {
            let secs = now.duration_since(prev).as_secs_f64().max(1e-3);
            (rx as f64 / secs / 1024.0, tx as f64 / secs / 1024.0)
        });
        self.last_net = Some(now);
        frame.set("net", "rx_kbps", rates.map(|r| r.0));
        frame.set("net", "tx_kbps", rates.map(|r| r.1));

        frame
    }

    /// Top `k` processes by CPU.
    pub fn top_tasks(&mut self, k: usize) -> Vec<TaskInfo> {
        let kind = ProcessRefreshKind::nothing().with_cpu().with_memory();
        self.sys.refresh_processes_specifics(ProcessesToUpdate::All, true, kind);
        let n_cpus = self.sys.cpus().len().max(1) as f32;
        let mut tasks: Vec<TaskInfo> = self
            .sys
            .processes()
            .values()
            .map(|p| TaskInfo {
                pid: p.pid().as_u32(),
                name: p.name().to_string_lossy().to_string(),
                cpu_usage: (p.cpu_usage() / n_cpus).min(100.0),
                mem_bytes: p.memory(),
            })
            .collect();
        tasks.sort_by(|a, b| {
            b.cpu_usage
                .partial_cmp(&a.cpu_usage)
                .unwrap_or(std::cmp::Ordering::Equal)
                .then(b.mem_bytes.cmp(&a.mem_bytes))
        });
        tasks.truncate(k);
        tasks
    }
}

fn percent(used: u64, total: u64) -> Option<f64> {
    (total > 0).then(|| used as f64 / total as f64 * 100.0)
}

pub fn now_millis() -> i64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_millis() as i64)
        .unwrap_or_default()
}

pub fn spawn_sampler(state: AppState, period: Duration) -> JoinHandle<()> {
    tokio::spawn(async move {
        info!(period_ms = period.as_millis() as u64, "sampler started");
        let mut sampler = Sampler::new();
        let mut ticker = interval(period);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);
        loop {
            ticker.tick().await;
            let frame = sampler.sample(now_millis());
            state.store.write().await.push(frame);
            if state.tasks.publish(sampler.top_tasks(TOP_TASKS)) {
                debug!("task list changed");
            }
        }
    })
}
