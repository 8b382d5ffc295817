//! Elevation service abstraction
//!
//! The scheduler talks to the external elevation service only through [`ElevationService`],
//! so tests can inject an in-memory fake and applications can plug in the HTTP client.

use crate::Coordinate;
#[cfg(feature = "serde")]
use serde::{Deserialize, Serialize};
use std::future::Future;

/// Errors that can occur while sampling elevation
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum ElevationError {
    /// Transport level failure
    #[error("HTTP error: {0}")]
    Http(String),

    /// The service answered with a non-success status
    #[error("Elevation service returned status {0}")]
    Status(u16),

    /// The service answered with data that could not be decoded
    #[error("Invalid response: {0}")]
    InvalidResponse(String),
}

/// Ground elevation at one point
#[derive(Debug, Clone, PartialEq)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
#[cfg_attr(feature = "serde", serde(rename_all = "camelCase"))]
pub struct TerrainSample {
    /// Ground height in the dataset's vertical datum
    pub z: f64,
    /// Terrain classification reported by the service (e.g. "road", "grass")
    pub terrain_type: String,
    /// Name of the elevation model the sample came from
    pub source: String,
}

impl TerrainSample {
    pub fn new(z: f64, terrain_type: impl Into<String>, source: impl Into<String>) -> Self {
        Self {
            z,
            terrain_type: terrain_type.into(),
            source: source.into(),
        }
    }
}

/// Request variant to use against the service
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
#[cfg_attr(feature = "serde", serde(rename_all = "lowercase"))]
pub enum Priority {
    #[default]
    Normal,
    /// Used for lines that were promoted ahead of the queue
    High,
}

/// An external elevation lookup
///
/// Implementations must be cheap to share; the scheduler keeps one instance for its whole
/// lifetime and issues at most one call at a time.
pub trait ElevationService: Send + Sync + 'static {
    /// Sample ground elevation at a single coordinate
    ///
    /// # Arguments
    /// * `coordinate` - Position to sample (z is ignored)
    /// * `epsg` - EPSG code of the coordinate's reference system
    /// * `priority` - Which request variant to use
    ///
    /// # Returns
    /// `Ok(None)` when the service has no elevation for the position.
    fn sample(
        &self,
        coordinate: Coordinate,
        epsg: u32,
        priority: Priority,
    ) -> impl Future<Output = Result<Option<TerrainSample>, ElevationError>> + Send;
}
