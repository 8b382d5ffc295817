//! Process-lifetime terrain sample cache

use super::TerrainSample;
use crate::{Coordinate, utils};
use dashmap::DashMap;
use std::collections::HashMap;

/// Cache identity of a terrain sample: rounded planar position plus CRS
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct CacheKey {
    x: i64,
    y: i64,
    epsg: u32,
}

impl CacheKey {
    /// Build the key for a coordinate, rounding to [`utils::CACHE_KEY_DECIMALS`] decimals
    #[inline]
    pub fn new(x: f64, y: f64, epsg: u32) -> Self {
        Self {
            x: utils::round_to_grid(x),
            y: utils::round_to_grid(y),
            epsg,
        }
    }

    #[inline]
    pub fn for_coordinate(coordinate: &Coordinate, epsg: u32) -> Self {
        Self::new(coordinate.x, coordinate.y, epsg)
    }
}

/// Terrain samples keyed by rounded position
///
/// Entries are never evicted or overwritten with different data for the lifetime of the
/// cache. Samples gathered while processing a line are committed together through
/// [`TerrainCache::commit`], so an interrupted line leaves no partial entries behind.
#[derive(Debug, Default)]
pub struct TerrainCache {
    entries: DashMap<CacheKey, TerrainSample>,
}

impl TerrainCache {
    pub fn new() -> Self {
        Self::default()
    }

    /// Look up a sample
    #[inline]
    pub fn get(&self, key: &CacheKey) -> Option<TerrainSample> {
        self.entries.get(key).map(|entry| entry.value().clone())
    }

    #[inline]
    pub fn contains(&self, key: &CacheKey) -> bool {
        self.entries.contains_key(key)
    }

    /// Insert a batch of freshly fetched samples
    ///
    /// Keys that are already cached keep their existing sample.
    pub fn commit(&self, samples: HashMap<CacheKey, TerrainSample>) {
        for (key, sample) in samples {
            self.entries.entry(key).or_insert(sample);
        }
    }

    /// Number of cached samples
    #[inline]
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}
