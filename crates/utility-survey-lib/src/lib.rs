//! Utility Survey Library - Core analyses for underground utility survey data
//!
//! This library works on an already-parsed survey dataset (chambers, pipes and lids as point and
//! line features with attribute maps) and provides the analyses a reporting layer needs.
//!
//! # Architecture
//!
//! - **[`profile()`]**: Dense, evenly spaced profile points along a pipe centerline
//! - **[`TerrainScheduler`]**: Ordered, single-in-flight elevation fetching with a process-wide cache
//! - **[`match_lids()`]**: Size-aware nearest-lid matching for chamber-like features
//! - **[`validate_dataset()`]**: Declarative attribute rules with custom field predicates
//!
//! Profiling, matching and validation are pure functions. The scheduler is the only stateful
//! component; it owns its queue, cache and counters and takes the elevation service and clock
//! as injected dependencies.

mod feature;
mod matcher;
mod profile;
pub mod terrain;
pub mod utils;
mod validation;

// Public API exports
pub use feature::{
    Attributes, Coordinate, Dataset, DatasetHeader, DatasetInfo, FeatureKind, FeatureRef,
    LineFeature, PointFeature, Scalar,
};
pub use matcher::{LidMatch, MatchReport, MatchStatus, MatcherConfig, OrphanLid, match_lids};
pub use profile::{
    MAX_SEGMENT_STEPS, MIN_SEGMENT_LENGTH, ProfilePoint, polyline_length, profile,
};
pub use terrain::{
    Clock, ElevationError, ElevationService, LineState, LineTerrain, ManualClock, Priority,
    ProfileSample, SchedulerConfig, SystemClock, TerrainSample, TerrainScheduler,
    TerrainStatsSnapshot,
};
pub use validation::{
    CustomPredicate, Requirement, RuleSet, Severity, ValidationError, ValidationReport,
    ValidationRule, ValidationSchema, validate_dataset, validate_feature,
};

/// Error types for the survey analyses
#[derive(Debug, thiserror::Error)]
pub enum SurveyError {
    #[error("Invalid profile spacing: {0} (must be finite and > 0)")]
    InvalidSpacing(f64),

    #[error("Segment {segment} cannot be profiled: length {length} at spacing {spacing}")]
    SegmentTooLong {
        segment: usize,
        length: f64,
        spacing: f64,
    },

    #[error("Unknown line index {index} (dataset has {count} lines)")]
    UnknownLine { index: usize, count: usize },

    #[error("Line {id} has {vertices} coordinates, at least 2 are required")]
    MalformedLine { id: String, vertices: usize },

    #[error("A terrain drain is already in progress")]
    DrainInProgress,

    #[error("Elevation service error: {0}")]
    Elevation(#[from] ElevationError),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[cfg(feature = "serde")]
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
}

pub type Result<T> = std::result::Result<T, SurveyError>;
