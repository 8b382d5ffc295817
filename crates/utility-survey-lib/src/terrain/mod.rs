//! Terrain correlation: elevation sampling along pipe profiles
//!
//! The [`TerrainScheduler`] turns each pipe into profile points, samples ground elevation for
//! them through an [`ElevationService`], and caches the samples for the life of the scheduler.
//! Lines are processed one at a time from an ordered queue; promoted lines jump ahead.

mod cache;
mod clock;
#[cfg(feature = "http")]
mod http;
mod scheduler;
mod service;
mod stats;

pub use cache::{CacheKey, TerrainCache};
pub use clock::{Clock, ManualClock, SystemClock};
#[cfg(feature = "http")]
pub use http::HttpElevationService;
pub use scheduler::{
    LineState, LineTerrain, ProfileSample, SchedulerConfig, StatusListener, TerrainScheduler,
};
pub use service::{ElevationError, ElevationService, Priority, TerrainSample};
pub use stats::{TerrainStats, TerrainStatsSnapshot};
