//! Rolling sample history, one ring per zoom level.
//!
//! Raw frames land in the minute ring as they are sampled; the hour and day
//! rings store one averaged frame per 60 and 1440 raw frames. Every ring keeps
//! `samples + 1` frames so a full window and its boundary sample fit.

use std::collections::{BTreeMap, BTreeSet, VecDeque};

use crate::types::{StatsBlock, StatsResponse, Zoom};

pub const MAIN_STATS_BLOCK: &str = "cpu";

pub type Values = BTreeMap<String, Option<f64>>;

/// All values sampled at one instant, grouped by block kind.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Frame {
    pub ts: i64,
    pub blocks: BTreeMap<String, Values>,
}

impl Frame {
    pub fn new(ts: i64) -> Self {
        Self {
            ts,
            blocks: BTreeMap::new(),
        }
    }

    pub fn set(&mut self, kind: &str, key: &str, value: Option<f64>) {
        self.blocks
            .entry(kind.to_string())
            .or_default()
            .insert(key.to_string(), value);
    }

    fn get(&self, kind: &str, key: &str) -> Option<f64> {
        self.blocks.get(kind).and_then(|b| b.get(key)).copied().flatten()
    }
}

fn zoom_step(zoom: Zoom) -> usize {
    match zoom {
        Zoom::Minute => 1,
        Zoom::Hour => 60,
        Zoom::Day => 1440,
    }
}

// Mean of the present values per key; the newest timestamp labels the result.
fn average(frames: &[Frame]) -> Option<Frame> {
    let last = frames.last()?;
    let mut out = Frame::new(last.ts);
    let mut keys: BTreeSet<(&str, &str)> = BTreeSet::new();
    for f in frames {
        for (kind, values) in &f.blocks {
            keys.extend(values.keys().map(|k| (kind.as_str(), k.as_str())));
        }
    }
    for (kind, key) in keys {
        let present: Vec<f64> = frames.iter().filter_map(|f| f.get(kind, key)).collect();
        let mean = (!present.is_empty()).then(|| present.iter().sum::<f64>() / present.len() as f64);
        out.set(kind, key, mean);
    }
    Some(out)
}

struct ZoomRing {
    step: usize,
    capacity: usize,
    pending: Vec<Frame>,
    frames: VecDeque<Frame>,
}

impl ZoomRing {
    fn new(step: usize, capacity: usize) -> Self {
        Self {
            step,
            capacity,
            pending: Vec::with_capacity(step),
            frames: VecDeque::with_capacity(capacity),
        }
    }

    fn push(&mut self, frame: Frame) {
        let frame = if self.step == 1 {
            frame
        } else {
            self.pending.push(frame);
            if self.pending.len() < self.step {
                return;
            }
            match average(&std::mem::take(&mut self.pending)) {
                Some(f) => f,
                None => return,
            }
        };
        self.frames.push_back(frame);
        while self.frames.len() > self.capacity {
            self.frames.pop_front();
        }
    }
}

pub struct SampleStore {
    samples: usize,
    interval_ms: u64,
    minute: ZoomRing,
    hour: ZoomRing,
    day: ZoomRing,
}

impl SampleStore {
    pub fn new(samples: usize, interval_ms: u64) -> Self {
        let capacity = samples + 1;
        Self {
            samples,
            interval_ms,
            minute: ZoomRing::new(zoom_step(Zoom::Minute), capacity),
            hour: ZoomRing::new(zoom_step(Zoom::Hour), capacity),
            day: ZoomRing::new(zoom_step(Zoom::Day), capacity),
        }
    }

    fn ring(&self, zoom: Zoom) -> &ZoomRing {
        match zoom {
            Zoom::Minute => &self.minute,
            Zoom::Hour => &self.hour,
            Zoom::Day => &self.day,
        }
    }

    pub fn push(&mut self, frame: Frame) {
        self.minute.push(frame.clone());
        self.hour.push(frame.clone());
        self.day.push(frame);
    }

    /// Window for `zoom`. When `have_tstamp` is still held the window starts
    /// at that sample (so the client sees the boundary again); otherwise it is
    /// everything held, at most `samples + 1` frames.
    pub fn window(&self, zoom: Zoom, have_tstamp: Option<i64>, hostname: &str) -> StatsResponse {
        let ring = self.ring(zoom);
        let start = have_tstamp
            .and_then(|t| ring.frames.iter().position(|f| f.ts == t))
            .unwrap_or(0);
        let frames: Vec<&Frame> = ring.frames.iter().skip(start).collect();

        let mut layout: BTreeMap<&str, BTreeSet<&str>> = BTreeMap::new();
        for f in &frames {
            for (kind, values) in &f.blocks {
                layout
                    .entry(kind.as_str())
                    .or_default()
                    .extend(values.keys().map(String::as_str));
            }
        }
        let timestamp: Vec<i64> = frames.iter().map(|f| f.ts).collect();
        let stats = layout
            .into_iter()
            .map(|(kind, keys)| {
                let series = keys
                    .into_iter()
                    .map(|key| {
                        let column = frames.iter().map(|f| f.get(kind, key)).collect();
                        (key.to_string(), column)
                    })
                    .collect();
                let block = StatsBlock {
                    timestamp: timestamp.clone(),
                    series,
                };
                (kind.to_string(), block)
            })
            .collect();

        let step_ms = self.interval_ms * ring.step as u64;
        let next_req_after = if ring.step == 1 {
            self.interval_ms
        } else {
            (ring.step - ring.pending.len()) as u64 * self.interval_ms
        };
        StatsResponse {
            hostname: hostname.to_string(),
            samples_count: self.samples,
            interval: step_ms,
            next_req_after,
            last_tstamp: timestamp.last().copied().unwrap_or(0),
            main_stats_block: MAIN_STATS_BLOCK.to_string(),
            stats,
        }
    }
}
