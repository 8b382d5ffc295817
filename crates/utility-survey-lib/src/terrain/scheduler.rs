//! Ordered, single-in-flight terrain fetch scheduler
//!
//! Each line moves through `unqueued -> queued -> loading -> done | error`. Callers add lines
//! with [`TerrainScheduler::enqueue`] or jump them ahead with [`TerrainScheduler::promote`];
//! a single drain loop pops the queue head, profiles the line, samples every profile point
//! (cache first) and records the outcome before moving on.
//!
//! Queue mutations and the drain loop's read of the queue head happen under one lock, and the
//! in-progress flag lives under the same lock, so a drain that observes an empty queue
//! releases the flag atomically with that observation.

use super::cache::{CacheKey, TerrainCache};
use super::clock::{Clock, SystemClock};
use super::service::{ElevationService, Priority, TerrainSample};
use super::stats::{TerrainStats, TerrainStatsSnapshot};
use crate::{Coordinate, Dataset, LineFeature, ProfilePoint, Result, SurveyError, profile};
#[cfg(feature = "serde")]
use serde::{Deserialize, Serialize};
use std::collections::{HashMap, HashSet, VecDeque};
use std::sync::{Arc, Mutex, MutexGuard, RwLock};
use std::time::Duration;
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

/// Scheduler configuration
#[derive(Debug, Clone)]
pub struct SchedulerConfig {
    /// Nominal distance between profile points, in CRS units
    pub spacing: f64,
    /// Pause between queue items so the host gets a chance to run other work.
    /// Zero means a bare task yield.
    pub yield_interval: Duration,
}

impl Default for SchedulerConfig {
    fn default() -> Self {
        Self {
            spacing: 1.0,
            yield_interval: Duration::from_millis(10),
        }
    }
}

/// Fetch state of a line
#[derive(Debug, Clone, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
#[cfg_attr(feature = "serde", serde(tag = "state", content = "message", rename_all = "lowercase"))]
pub enum LineState {
    Unqueued,
    Queued,
    Loading,
    Done,
    Error(String),
}

impl LineState {
    /// Whether the line has finished, successfully or not
    #[inline]
    pub fn is_settled(&self) -> bool {
        matches!(self, LineState::Done | LineState::Error(_))
    }
}

/// A profile point together with the ground elevation found for it
#[derive(Debug, Clone, PartialEq)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
#[cfg_attr(feature = "serde", serde(rename_all = "camelCase"))]
pub struct ProfileSample {
    pub point: ProfilePoint,
    /// None when the service had no elevation for this point
    pub terrain: Option<TerrainSample>,
    /// Ground height minus pipe height, when both are known
    pub cover_depth: Option<f64>,
}

impl ProfileSample {
    pub fn new(point: ProfilePoint, terrain: Option<TerrainSample>) -> Self {
        let cover_depth = terrain
            .as_ref()
            .zip(point.z)
            .map(|(sample, pipe_z)| sample.z - pipe_z);
        Self {
            point,
            terrain,
            cover_depth,
        }
    }
}

/// Terrain correlation result for one line
#[derive(Debug, Clone, PartialEq)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
#[cfg_attr(feature = "serde", serde(rename_all = "camelCase"))]
pub struct LineTerrain {
    pub line_id: String,
    pub samples: Vec<ProfileSample>,
}

impl LineTerrain {
    /// Smallest cover depth along the line
    pub fn min_cover_depth(&self) -> Option<f64> {
        self.samples
            .iter()
            .filter_map(|sample| sample.cover_depth)
            .reduce(f64::min)
    }

    /// Number of profile points the service had no elevation for
    pub fn missing_terrain(&self) -> usize {
        self.samples
            .iter()
            .filter(|sample| sample.terrain.is_none())
            .count()
    }

    /// Profiled length of the line
    pub fn length(&self) -> f64 {
        self.samples.last().map_or(0.0, |sample| sample.point.dist)
    }
}

/// Callback invoked on every line state transition
pub type StatusListener = Arc<dyn Fn(usize, &LineState) + Send + Sync>;

#[derive(Default)]
struct QueueState {
    queue: VecDeque<usize>,
    /// Members of `queue`, for constant-time duplicate checks
    queued: HashSet<usize>,
    /// Queued lines that were promoted
    priority: HashSet<usize>,
    /// Only loading, done and error lines have an entry
    statuses: HashMap<usize, LineState>,
    results: HashMap<usize, Arc<LineTerrain>>,
    draining: bool,
}

struct Inner<S, C> {
    service: S,
    clock: C,
    config: SchedulerConfig,
    epsg: u32,
    lines: Arc<[LineFeature]>,
    state: Mutex<QueueState>,
    cache: TerrainCache,
    stats: TerrainStats,
    worker: Mutex<Option<JoinHandle<()>>>,
    listeners: RwLock<Vec<StatusListener>>,
}

impl<S, C> Inner<S, C> {
    fn lock_state(&self) -> MutexGuard<'_, QueueState> {
        self.state.lock().unwrap_or_else(|e| e.into_inner())
    }

    fn notify(&self, line: usize, state: &LineState) {
        // Callbacks run outside the lock so they may subscribe further listeners
        let listeners: Vec<StatusListener> = self
            .listeners
            .read()
            .unwrap_or_else(|e| e.into_inner())
            .clone();
        for listener in &listeners {
            listener(line, state);
        }
    }
}

/// Marks a drain as active; clears the flag and discards the in-flight line if the drain
/// is dropped before it finishes (task abort or caller cancellation).
struct DrainGuard<S, C> {
    inner: Arc<Inner<S, C>>,
    current: Option<usize>,
    released: bool,
}

impl<S, C> Drop for DrainGuard<S, C> {
    fn drop(&mut self) {
        if self.released {
            return;
        }
        let reverted = {
            let mut state = self.inner.lock_state();
            state.draining = false;
            match self.current {
                Some(line) if state.statuses.get(&line) == Some(&LineState::Loading) => {
                    state.statuses.remove(&line);
                    Some(line)
                }
                _ => None,
            }
        };
        if let Some(line) = reverted {
            debug!(line, "Terrain drain cancelled, discarding in-flight line");
            self.inner.notify(line, &LineState::Unqueued);
        }
    }
}

/// Priority-aware terrain fetch scheduler with a process-lifetime cache
///
/// Cloning is cheap and every clone shares the same queue, cache and counters.
pub struct TerrainScheduler<S, C = SystemClock> {
    inner: Arc<Inner<S, C>>,
}

impl<S, C> Clone for TerrainScheduler<S, C> {
    fn clone(&self) -> Self {
        Self {
            inner: Arc::clone(&self.inner),
        }
    }
}

impl<S: ElevationService> TerrainScheduler<S, SystemClock> {
    /// Create a scheduler for every line of a dataset, using the wall clock
    pub fn from_dataset(dataset: &Dataset, config: SchedulerConfig, service: S) -> Self {
        Self::new(
            dataset.lines.clone(),
            dataset.epsg(),
            config,
            service,
            SystemClock,
        )
    }
}

impl<S: ElevationService, C: Clock> TerrainScheduler<S, C> {
    /// Create a new scheduler
    ///
    /// # Arguments
    /// * `lines` - Lines addressed by index in every queue operation
    /// * `epsg` - EPSG code of the line coordinates
    /// * `config` - Scheduler configuration
    /// * `service` - Elevation service used for cache misses
    /// * `clock` - Time source for latency measurement and pauses
    pub fn new(
        lines: impl Into<Arc<[LineFeature]>>,
        epsg: u32,
        config: SchedulerConfig,
        service: S,
        clock: C,
    ) -> Self {
        Self {
            inner: Arc::new(Inner {
                service,
                clock,
                config,
                epsg,
                lines: lines.into(),
                state: Mutex::new(QueueState::default()),
                cache: TerrainCache::new(),
                stats: TerrainStats::default(),
                worker: Mutex::new(None),
                listeners: RwLock::new(Vec::new()),
            }),
        }
    }

    /// Append a line to the queue tail
    ///
    /// Only lines without any status that are not already queued are added. A line with
    /// fewer than two coordinates goes straight to the error state instead.
    ///
    /// # Returns
    /// Whether the line was queued.
    pub fn enqueue(&self, line: usize) -> Result<bool> {
        self.schedule(line, false)
    }

    /// Move a never-fetched line to the queue head
    ///
    /// The line is inserted (or moved) ahead of every waiting entry and will use the
    /// priority variant of the elevation service. Lines that already have a status are left
    /// alone, so promotion never triggers a re-fetch.
    ///
    /// # Returns
    /// Whether the line is now at the queue head.
    pub fn promote(&self, line: usize) -> Result<bool> {
        self.schedule(line, true)
    }

    fn schedule(&self, line: usize, promote: bool) -> Result<bool> {
        let feature = self.line(line)?;

        let transition = {
            let mut state = self.inner.lock_state();
            if state.statuses.contains_key(&line) {
                return Ok(false);
            }

            if feature.geometry.len() < 2 {
                let message = SurveyError::MalformedLine {
                    id: feature.id.clone(),
                    vertices: feature.geometry.len(),
                }
                .to_string();
                let rejected = LineState::Error(message);
                state.statuses.insert(line, rejected.clone());
                Some(rejected)
            } else if promote {
                let already_queued = !state.queued.insert(line);
                if already_queued {
                    state.queue.retain(|&queued| queued != line);
                }
                state.queue.push_front(line);
                state.priority.insert(line);
                (!already_queued).then_some(LineState::Queued)
            } else if state.queued.insert(line) {
                state.queue.push_back(line);
                Some(LineState::Queued)
            } else {
                return Ok(false);
            }
        };

        match transition {
            Some(LineState::Error(message)) => {
                warn!(line, %message, "Rejected malformed line");
                self.inner.stats.record_error();
                self.inner.notify(line, &LineState::Error(message));
                Ok(false)
            }
            Some(state) => {
                debug!(line, promote, "Queued line for terrain");
                self.inner.notify(line, &state);
                Ok(true)
            }
            None => Ok(true),
        }
    }

    /// Enqueue a line and make sure a background drain is running
    pub fn request(&self, line: usize) -> Result<bool> {
        let queued = self.enqueue(line)?;
        self.ensure_draining();
        Ok(queued)
    }

    /// Promote a line and make sure a background drain is running
    pub fn request_priority(&self, line: usize) -> Result<bool> {
        let promoted = self.promote(line)?;
        self.ensure_draining();
        Ok(promoted)
    }

    /// Start a background drain unless one is already active
    ///
    /// Must be called from within a tokio runtime.
    ///
    /// # Returns
    /// Whether a new drain was started.
    pub fn ensure_draining(&self) -> bool {
        self.spawn_drain().is_ok()
    }

    /// Run the drain loop on a background task
    ///
    /// Fails with [`SurveyError::DrainInProgress`] if a drain is already active.
    /// Must be called from within a tokio runtime.
    pub fn spawn_drain(&self) -> Result<()> {
        let guard = self.try_begin_drain()?;
        let scheduler = self.clone();
        let handle = tokio::spawn(async move {
            scheduler.run_drain(guard).await;
        });
        *self.inner.worker.lock().unwrap_or_else(|e| e.into_inner()) = Some(handle);
        Ok(())
    }

    /// Process the queue until it is empty
    ///
    /// Fails with [`SurveyError::DrainInProgress`] if another drain is active. Dropping the
    /// returned future cancels the drain and discards the line being fetched.
    ///
    /// # Returns
    /// The number of lines processed.
    pub async fn drain(&self) -> Result<usize> {
        let guard = self.try_begin_drain()?;
        Ok(self.run_drain(guard).await)
    }

    /// Wait for the current background drain, if any, to finish
    pub async fn join(&self) {
        let handle = self
            .inner
            .worker
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .take();
        if let Some(handle) = handle {
            if let Err(err) = handle.await {
                if !err.is_cancelled() {
                    warn!("Terrain drain task failed: {err}");
                }
            }
        }
    }

    /// Abort the background drain
    ///
    /// The line being fetched is discarded and returns to the unqueued state; nothing it
    /// sampled reaches the cache. Queued lines stay queued.
    pub async fn shutdown(&self) {
        let handle = self
            .inner
            .worker
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .take();
        if let Some(handle) = handle {
            handle.abort();
            let _ = handle.await;
            info!("Terrain scheduler shut down");
        }
    }

    fn try_begin_drain(&self) -> Result<DrainGuard<S, C>> {
        let mut state = self.inner.lock_state();
        if state.draining {
            return Err(SurveyError::DrainInProgress);
        }
        state.draining = true;
        Ok(DrainGuard {
            inner: Arc::clone(&self.inner),
            current: None,
            released: false,
        })
    }

    async fn run_drain(&self, mut guard: DrainGuard<S, C>) -> usize {
        info!(
            queued = self.inner.lock_state().queue.len(),
            "Terrain drain started"
        );
        let mut processed = 0;

        loop {
            let next = {
                let mut state = self.inner.lock_state();
                match state.queue.pop_front() {
                    Some(line) => {
                        state.queued.remove(&line);
                        let priority = state.priority.remove(&line);
                        state.statuses.insert(line, LineState::Loading);
                        Some((line, priority))
                    }
                    None => {
                        state.draining = false;
                        guard.released = true;
                        None
                    }
                }
            };
            let Some((line, priority)) = next else {
                break;
            };

            guard.current = Some(line);
            self.inner.notify(line, &LineState::Loading);

            let priority = if priority {
                Priority::High
            } else {
                Priority::Normal
            };
            let outcome = match self.fetch_line(line, priority).await {
                Ok(terrain) => {
                    debug!(
                        line,
                        samples = terrain.samples.len(),
                        "Terrain fetched for line"
                    );
                    self.inner.stats.record_line_done(
                        terrain
                            .samples
                            .iter()
                            .filter_map(|sample| sample.terrain.as_ref())
                            .map(|sample| sample.terrain_type.as_str()),
                    );
                    Ok(Arc::new(terrain))
                }
                Err(err) => {
                    warn!(line, "Terrain fetch failed: {err}");
                    self.inner.stats.record_error();
                    Err(err.to_string())
                }
            };

            let settled = {
                let mut state = self.inner.lock_state();
                let settled = match outcome {
                    Ok(terrain) => {
                        state.results.insert(line, terrain);
                        LineState::Done
                    }
                    Err(message) => LineState::Error(message),
                };
                state.statuses.insert(line, settled.clone());
                settled
            };
            guard.current = None;
            self.inner.notify(line, &settled);
            processed += 1;

            self.inner.clock.sleep(self.inner.config.yield_interval).await;
        }

        info!(processed, "Terrain drain finished");
        processed
    }

    async fn fetch_line(&self, line: usize, priority: Priority) -> Result<LineTerrain> {
        let feature = self.line(line)?;
        if feature.geometry.len() < 2 {
            return Err(SurveyError::MalformedLine {
                id: feature.id.clone(),
                vertices: feature.geometry.len(),
            });
        }

        let points = profile(&feature.geometry, self.inner.config.spacing)?;
        self.inner.stats.record_points(points.len());

        let epsg = self.inner.epsg;
        let mut fetched: HashMap<CacheKey, TerrainSample> = HashMap::new();
        let mut samples = Vec::with_capacity(points.len());

        for point in points {
            let key = CacheKey::new(point.x, point.y, epsg);
            let cached = self
                .inner
                .cache
                .get(&key)
                .or_else(|| fetched.get(&key).cloned());

            let terrain = match cached {
                Some(sample) => {
                    self.inner.stats.record_cache_hit();
                    Some(sample)
                }
                None => {
                    let started = self.inner.clock.now();
                    let result = self
                        .inner
                        .service
                        .sample(point.coordinate(), epsg, priority)
                        .await;
                    self.inner
                        .stats
                        .record_request(self.inner.clock.now().saturating_duration_since(started));

                    let sample = result?;
                    if let Some(sample) = &sample {
                        fetched.insert(key, sample.clone());
                    }
                    sample
                }
            };
            samples.push(ProfileSample::new(point, terrain));
        }

        self.inner.cache.commit(fetched);
        Ok(LineTerrain {
            line_id: feature.id.clone(),
            samples,
        })
    }

    fn line(&self, line: usize) -> Result<&LineFeature> {
        self.inner.lines.get(line).ok_or(SurveyError::UnknownLine {
            index: line,
            count: self.inner.lines.len(),
        })
    }
}

impl<S, C> TerrainScheduler<S, C> {
    /// Register a callback for line state transitions
    ///
    /// Callbacks run on the task that caused the transition and must not block.
    pub fn subscribe(&self, listener: impl Fn(usize, &LineState) + Send + Sync + 'static) {
        self.inner
            .listeners
            .write()
            .unwrap_or_else(|e| e.into_inner())
            .push(Arc::new(listener));
    }

    /// Current state of a line
    pub fn state(&self, line: usize) -> LineState {
        let state = self.inner.lock_state();
        match state.statuses.get(&line) {
            Some(status) => status.clone(),
            None if state.queued.contains(&line) => LineState::Queued,
            None => LineState::Unqueued,
        }
    }

    /// Terrain result of a line that finished successfully
    pub fn terrain(&self, line: usize) -> Option<Arc<LineTerrain>> {
        self.inner.lock_state().results.get(&line).cloned()
    }

    /// Lines waiting in the queue, head first
    pub fn queued(&self) -> Vec<usize> {
        self.inner.lock_state().queue.iter().copied().collect()
    }

    /// Whether a drain is currently active
    pub fn is_draining(&self) -> bool {
        self.inner.lock_state().draining
    }

    /// Cached terrain sample for a position, if any
    pub fn cached(&self, coordinate: &Coordinate) -> Option<TerrainSample> {
        self.inner
            .cache
            .get(&CacheKey::for_coordinate(coordinate, self.inner.epsg))
    }

    /// Number of cached terrain samples
    pub fn cache_len(&self) -> usize {
        self.inner.cache.len()
    }

    /// Snapshot of the scheduler counters
    pub fn stats(&self) -> TerrainStatsSnapshot {
        self.inner.stats.snapshot()
    }

    /// Lines known to the scheduler
    pub fn lines(&self) -> &[LineFeature] {
        &self.inner.lines
    }

    /// EPSG code used for every request
    pub fn epsg(&self) -> u32 {
        self.inner.epsg
    }

    pub fn config(&self) -> &SchedulerConfig {
        &self.inner.config
    }

    pub fn service(&self) -> &S {
        &self.inner.service
    }

    pub fn clock(&self) -> &C {
        &self.inner.clock
    }
}
