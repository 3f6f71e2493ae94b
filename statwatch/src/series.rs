//! Sliding-window merge of timestamped samples across successive polls.
//!
//! Each poll returns a short window per metric key. When the first sample of
//! the fresh window repeats the last sample we already hold, the two windows
//! are stitched together; otherwise the fresh window replaces the old one.
//! Every merged window is bounded to `keep_count` samples with strictly
//! increasing timestamps.

use std::collections::BTreeMap;

use crate::types::{StatsBlock, StatsResponse};

/// `(timestamp_ms, value)`; `None` means the source had no value at that instant.
pub type Sample = (i64, Option<f64>);

#[derive(Debug, Clone, Default, PartialEq)]
pub struct SampleWindow {
    samples: Vec<Sample>,
}

impl SampleWindow {
    pub fn new(samples: Vec<Sample>) -> Self {
        Self { samples }
    }

    pub fn samples(&self) -> &[Sample] {
        &self.samples
    }

    pub fn len(&self) -> usize {
        self.samples.len()
    }

    pub fn is_empty(&self) -> bool {
        self.samples.is_empty()
    }

    pub fn first_timestamp(&self) -> Option<i64> {
        self.samples.first().map(|(ts, _)| *ts)
    }

    pub fn last_timestamp(&self) -> Option<i64> {
        self.samples.last().map(|(ts, _)| *ts)
    }

    /// Most recent sample that carries a value.
    pub fn latest_value(&self) -> Option<f64> {
        self.samples.iter().rev().find_map(|(_, v)| *v)
    }

    pub fn into_samples(self) -> Vec<Sample> {
        self.samples
    }
}

impl From<Vec<Sample>> for SampleWindow {
    fn from(samples: Vec<Sample>) -> Self {
        Self::new(samples)
    }
}

impl FromIterator<Sample> for SampleWindow {
    fn from_iter<I: IntoIterator<Item = Sample>>(iter: I) -> Self {
        Self::new(iter.into_iter().collect())
    }
}

// Drop samples that do not move time forward, then keep the newest `keep_count`.
fn bounded(mut samples: Vec<Sample>, keep_count: usize) -> Vec<Sample> {
    let mut last: Option<i64> = None;
    samples.retain(|(ts, _)| {
        if last.is_some_and(|l| *ts <= l) {
            return false;
        }
        last = Some(*ts);
        true
    });
    let excess = samples.len().saturating_sub(keep_count);
    samples.drain(..excess);
    samples
}

/// Merge a freshly polled window into the previous one for the same key.
///
/// - empty `incoming`: the previous history is kept if there is any
/// - no previous history, or its last timestamp differs from the first
///   incoming one: `incoming` wins (first poll, or the source restarted)
/// - otherwise the duplicated boundary sample is dropped and the two are
///   concatenated, keeping only the newest `keep_count` samples
pub fn merge_window(
    previous: Option<&SampleWindow>,
    incoming: SampleWindow,
    keep_count: usize,
) -> SampleWindow {
    if incoming.is_empty() {
        return match previous {
            Some(prev) if !prev.is_empty() => prev.clone(),
            _ => incoming,
        };
    }
    let prev = match previous {
        Some(prev) if prev.last_timestamp() == incoming.first_timestamp() => prev,
        _ => return SampleWindow::new(bounded(incoming.samples, keep_count)),
    };
    let mut samples = Vec::with_capacity(prev.len() + incoming.len() - 1);
    samples.extend_from_slice(&prev.samples);
    samples.extend(incoming.samples.into_iter().skip(1));
    SampleWindow::new(bounded(samples, keep_count))
}

/// Apply [`merge_window`] per key. Keys missing from `incoming` keep their
/// previous window untouched.
pub fn merge_windows(
    previous: &BTreeMap<String, SampleWindow>,
    incoming: BTreeMap<String, SampleWindow>,
    keep_count: usize,
) -> BTreeMap<String, SampleWindow> {
    let mut merged: BTreeMap<String, SampleWindow> = previous
        .iter()
        .filter(|(key, _)| !incoming.contains_key(*key))
        .map(|(key, window)| (key.clone(), window.clone()))
        .collect();
    for (key, window) in incoming {
        let next = merge_window(previous.get(&key), window, keep_count);
        merged.insert(key, next);
    }
    merged
}

impl StatsBlock {
    /// Split the block into one window per key, pairing each value with the
    /// shared timestamp at the same position.
    pub fn windows(&self) -> BTreeMap<String, SampleWindow> {
        self.series
            .iter()
            .map(|(key, values)| {
                let window = self
                    .timestamp
                    .iter()
                    .zip(values.iter())
                    .map(|(ts, v)| (*ts, *v))
                    .collect();
                (key.clone(), window)
            })
            .collect()
    }
}

/// Block-level version of [`merge_window`]: the stitching decision is taken
/// once on the shared timestamp column and applied to every value column.
///
/// A key that the previous block did not carry is padded with `None` for
/// each previous timestamp, and a key the fresh block dropped is padded for
/// each new one, so all columns stay aligned. A dropped key disappears once
/// none of its held values is left.
pub fn merge_block(previous: Option<&StatsBlock>, incoming: StatsBlock, keep_count: usize) -> StatsBlock {
    if incoming.timestamp.is_empty() {
        return match previous {
            Some(prev) if !prev.timestamp.is_empty() => prev.clone(),
            _ => incoming,
        };
    }
    let prev = match previous {
        Some(prev) if prev.timestamp.last() == incoming.timestamp.first() => prev,
        _ => return bound_block(incoming, keep_count),
    };

    let mut timestamp = prev.timestamp.clone();
    timestamp.extend(incoming.timestamp.iter().skip(1));
    let added = incoming.timestamp.len() - 1;
    let gone: Vec<String> = prev
        .series
        .keys()
        .filter(|key| !incoming.series.contains_key(*key))
        .cloned()
        .collect();
    let mut series: BTreeMap<String, Vec<Option<f64>>> = prev
        .series
        .iter()
        .filter(|(key, _)| gone.contains(key))
        .map(|(key, old)| {
            let mut column = old.clone();
            column.resize(prev.timestamp.len() + added, None);
            (key.clone(), column)
        })
        .collect();
    for (key, values) in incoming.series {
        let mut column = prev.series.get(&key).cloned().unwrap_or_default();
        column.resize(prev.timestamp.len(), None);
        column.extend(values.into_iter().skip(1));
        series.insert(key, column);
    }
    let mut merged = bound_block(StatsBlock { timestamp, series }, keep_count);
    merged
        .series
        .retain(|key, column| !gone.contains(key) || column.iter().any(Option::is_some));
    merged
}

// Column-wise equivalent of `bounded`.
fn bound_block(block: StatsBlock, keep_count: usize) -> StatsBlock {
    let mut keep = Vec::with_capacity(block.timestamp.len());
    let mut last: Option<i64> = None;
    for ts in &block.timestamp {
        let forward = !last.is_some_and(|l| *ts <= l);
        if forward {
            last = Some(*ts);
        }
        keep.push(forward);
    }
    let kept = keep.iter().filter(|k| **k).count();
    let idx: Vec<usize> = (0..keep.len())
        .filter(|i| keep[*i])
        .skip(kept.saturating_sub(keep_count))
        .collect();
    let timestamp = idx.iter().map(|i| block.timestamp[*i]).collect();
    let series = block
        .series
        .into_iter()
        .map(|(key, values)| {
            let column = idx.iter().map(|i| values.get(*i).copied().flatten()).collect();
            (key, column)
        })
        .collect();
    StatsBlock { timestamp, series }
}

/// Merge every block of a fresh stats response into the previously accepted
/// one. Blocks are bounded to `samples_count + 1` samples (the boundary
/// sample is shared between consecutive windows).
pub fn apply_delta(previous: &StatsResponse, mut incoming: StatsResponse) -> StatsResponse {
    let keep_count = incoming.samples_count + 1;
    let blocks = std::mem::take(&mut incoming.stats);
    incoming.stats = blocks
        .into_iter()
        .map(|(kind, block)| {
            let merged = merge_block(previous.stats.get(&kind), block, keep_count);
            (kind, merged)
        })
        .collect();
    incoming
}
