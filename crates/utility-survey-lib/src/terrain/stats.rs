//! Scheduler counters
//!
//! These are informational only; nothing in the scheduler reads them back to make decisions.

use dashmap::DashMap;
#[cfg(feature = "serde")]
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;

/// Live counters updated by the drain loop
#[derive(Debug, Default)]
pub struct TerrainStats {
    /// Calls made to the elevation service
    requests: AtomicU64,
    /// Profile points that needed a terrain sample
    points_requested: AtomicU64,
    /// Profile points answered from the cache
    points_from_cache: AtomicU64,
    /// Summed service latency in microseconds
    latency_micros: AtomicU64,
    /// Lines that ended in the error state
    errors: AtomicU64,
    /// Lines that completed successfully
    lines_done: AtomicU64,
    /// Sampled points per terrain type
    terrain_types: DashMap<String, u64>,
}

impl TerrainStats {
    pub(crate) fn record_request(&self, latency: Duration) {
        self.requests.fetch_add(1, Ordering::Relaxed);
        self.latency_micros.fetch_add(
            u64::try_from(latency.as_micros()).unwrap_or(u64::MAX),
            Ordering::Relaxed,
        );
    }

    pub(crate) fn record_points(&self, requested: usize) {
        self.points_requested
            .fetch_add(requested as u64, Ordering::Relaxed);
    }

    pub(crate) fn record_cache_hit(&self) {
        self.points_from_cache.fetch_add(1, Ordering::Relaxed);
    }

    pub(crate) fn record_error(&self) {
        self.errors.fetch_add(1, Ordering::Relaxed);
    }

    pub(crate) fn record_line_done<'a>(&self, terrain_types: impl Iterator<Item = &'a str>) {
        self.lines_done.fetch_add(1, Ordering::Relaxed);
        for terrain_type in terrain_types {
            *self
                .terrain_types
                .entry(terrain_type.to_string())
                .or_insert(0) += 1;
        }
    }

    /// Get a snapshot of current statistics
    pub fn snapshot(&self) -> TerrainStatsSnapshot {
        let requests = self.requests.load(Ordering::Relaxed);
        let points_requested = self.points_requested.load(Ordering::Relaxed);
        let points_from_cache = self.points_from_cache.load(Ordering::Relaxed);
        let latency_micros = self.latency_micros.load(Ordering::Relaxed);

        TerrainStatsSnapshot {
            requests,
            points_requested,
            points_from_cache,
            cache_hit_ratio: if points_requested == 0 {
                0.0
            } else {
                points_from_cache as f64 / points_requested as f64
            },
            average_latency_ms: if requests == 0 {
                0.0
            } else {
                latency_micros as f64 / requests as f64 / 1000.0
            },
            errors: self.errors.load(Ordering::Relaxed),
            lines_done: self.lines_done.load(Ordering::Relaxed),
            terrain_types: self
                .terrain_types
                .iter()
                .map(|entry| (entry.key().clone(), *entry.value()))
                .collect(),
        }
    }
}

/// Snapshot of scheduler statistics
#[derive(Debug, Clone, Default, PartialEq)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
#[cfg_attr(feature = "serde", serde(rename_all = "camelCase"))]
pub struct TerrainStatsSnapshot {
    pub requests: u64,
    pub points_requested: u64,
    pub points_from_cache: u64,
    pub cache_hit_ratio: f64,
    pub average_latency_ms: f64,
    pub errors: u64,
    pub lines_done: u64,
    pub terrain_types: BTreeMap<String, u64>,
}
