//! Types that mirror the agent's JSON schema.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

/// Time span covered by one stats window.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum Zoom {
    #[default]
    Minute,
    Hour,
    Day,
}

impl Zoom {
    pub fn next(self) -> Self {
        match self {
            Zoom::Minute => Zoom::Hour,
            Zoom::Hour => Zoom::Day,
            Zoom::Day => Zoom::Minute,
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            Zoom::Minute => "minute",
            Zoom::Hour => "hour",
            Zoom::Day => "day",
        }
    }

    /// Refresh period used when the agent does not suggest one.
    pub fn default_refresh_ms(self) -> u64 {
        match self {
            Zoom::Minute => 1_000,
            _ => 15_000,
        }
    }
}

impl std::str::FromStr for Zoom {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "minute" => Ok(Zoom::Minute),
            "hour" => Ok(Zoom::Hour),
            "day" => Ok(Zoom::Day),
            other => Err(format!("unknown zoom '{other}' (expected minute, hour or day)")),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(tag = "op", rename_all = "lowercase")]
pub enum Request {
    Stats {
        zoom: Zoom,
        // timestamp of the newest sample the client already holds
        have_tstamp: Option<i64>,
    },
    Tasks {
        etag: Option<String>,
    },
}

/// One "kind" of stats: a shared timestamp column plus one value column per key.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct StatsBlock {
    #[serde(default)]
    pub timestamp: Vec<i64>,
    #[serde(flatten)]
    pub series: BTreeMap<String, Vec<Option<f64>>>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct StatsResponse {
    pub hostname: String,
    pub samples_count: usize,
    // ms between two samples
    pub interval: u64,
    // ms the agent suggests waiting before the next request
    pub next_req_after: u64,
    pub last_tstamp: i64,
    pub main_stats_block: String,
    pub stats: BTreeMap<String, StatsBlock>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TaskInfo {
    pub pid: u32,
    pub name: String,
    pub cpu_usage: f32,
    pub mem_bytes: u64,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct TasksResponse {
    pub etag: String,
    pub tasks: Vec<TaskInfo>,
}
