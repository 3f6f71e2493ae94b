//! Data types exchanged with the client over WebSocket.
//! Keep this module minimal and stable: it defines the wire format.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum Zoom {
    #[default]
    Minute,
    Hour,
    Day,
}

#[derive(Debug, Deserialize)]
#[serde(tag = "op", rename_all = "lowercase")]
pub enum Request {
    Stats {
        #[serde(default)]
        zoom: Zoom,
        #[serde(default)]
        have_tstamp: Option<i64>,
    },
    Tasks {
        #[serde(default)]
        etag: Option<String>,
    },
}

#[derive(Debug, Serialize, Clone, Default, PartialEq)]
pub struct StatsBlock {
    pub timestamp: Vec<i64>,
    #[serde(flatten)]
    pub series: BTreeMap<String, Vec<Option<f64>>>,
}

#[derive(Debug, Serialize, Clone)]
pub struct StatsResponse {
    pub hostname: String,
    pub samples_count: usize,
    pub interval: u64,
    pub next_req_after: u64,
    pub last_tstamp: i64,
    pub main_stats_block: String,
    pub stats: BTreeMap<String, StatsBlock>,
}

#[derive(Debug, Serialize, Clone, PartialEq)]
pub struct TaskInfo {
    pub pid: u32,
    pub name: String,
    pub cpu_usage: f32,
    pub mem_bytes: u64,
}

#[derive(Debug, Serialize, Clone, PartialEq)]
pub struct TasksResponse {
    pub etag: String,
    pub tasks: Vec<TaskInfo>,
}

/// Sent instead of a response when a request cannot be served.
#[derive(Debug, Serialize)]
pub struct ErrorReply {
    pub error: String,
}
