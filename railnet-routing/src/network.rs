//! Rail network lifecycle
//!
//! [`RailNetwork`] owns everything a load cycle produces: the graph, both
//! caches and the scaling factor. A build is started at most once per cycle,
//! runs off the caller's thread and publishes its result in one step, so
//! readers see either nothing or a fully calibrated network.

use parking_lot::RwLock;
use std::any::Any;
use std::fmt;
use std::panic::{catch_unwind, AssertUnwindSafe};
use std::sync::atomic::{AtomicU64, AtomicU8, AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Instant;
use thiserror::Error;
use tokio::task::JoinHandle;

use railnet_common::{Error, Result};

use crate::config::NetworkConfig;
use crate::graph::{BuildStats, Graph, TrackSegment};
use crate::pathfinding::PathFinder;
use crate::service::{DistanceService, Station};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[repr(u8)]
pub enum GraphState {
    Uninitialized = 0,
    InProgress = 1,
    Built = 2,
    Faulty = 3,
}

impl GraphState {
    fn from_u8(value: u8) -> Self {
        match value {
            0 => GraphState::Uninitialized,
            1 => GraphState::InProgress,
            2 => GraphState::Built,
            _ => GraphState::Faulty,
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            GraphState::Uninitialized => "uninitialized",
            GraphState::InProgress => "in-progress",
            GraphState::Built => "built",
            GraphState::Faulty => "faulty",
        }
    }
}

impl fmt::Display for GraphState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Why a station-to-station distance could not be served
#[derive(Debug, Clone, Error, PartialEq)]
pub enum QueryError {
    #[error("rail graph is not available (state: {0})")]
    Unavailable(GraphState),

    #[error("station '{0}' has no graph node")]
    UnmappedStation(String),

    #[error("no path between stations '{from}' and '{to}'")]
    NoPath { from: String, to: String },
}

/// Claim on the build of one cycle. Counts as a running build until dropped.
#[derive(Debug)]
struct BuildClaim {
    generation: u64,
    running: Arc<AtomicUsize>,
}

impl Drop for BuildClaim {
    fn drop(&mut self) {
        self.running.fetch_sub(1, Ordering::AcqRel);
    }
}

#[derive(Debug)]
struct Published {
    service: Arc<DistanceService>,
    stats: BuildStats,
}

/// Owned context for one rail network: graph, caches, factor and state
#[derive(Debug)]
pub struct RailNetwork {
    config: NetworkConfig,
    state: AtomicU8,
    /// Bumped by `clear`; a build only publishes into the cycle it started in
    generation: AtomicU64,
    /// Builds still executing, including ones discarded by `clear`
    running: Arc<AtomicUsize>,
    published: RwLock<Option<Published>>,
}

impl RailNetwork {
    pub fn new(config: NetworkConfig) -> Self {
        Self {
            config,
            state: AtomicU8::new(GraphState::Uninitialized as u8),
            generation: AtomicU64::new(0),
            running: Arc::new(AtomicUsize::new(0)),
            published: RwLock::new(None),
        }
    }

    pub fn config(&self) -> &NetworkConfig {
        &self.config
    }

    pub fn state(&self) -> GraphState {
        GraphState::from_u8(self.state.load(Ordering::Acquire))
    }

    /// Calibrated factor of the built network, 1.0 otherwise
    pub fn scaling_factor(&self) -> f64 {
        self.service().map_or(1.0, |s| s.scaling_factor())
    }

    pub fn service(&self) -> Option<Arc<DistanceService>> {
        self.published
            .read()
            .as_ref()
            .map(|p| Arc::clone(&p.service))
    }

    pub fn build_stats(&self) -> Option<BuildStats> {
        self.published.read().as_ref().map(|p| p.stats.clone())
    }

    /// Start a background build unless one already ran this cycle.
    ///
    /// Returns `None` without doing anything when the network is not
    /// `Uninitialized`, when there are no tracks or no stations yet, when a
    /// build discarded by [`Self::clear`] is still running, or when called
    /// outside a Tokio runtime. The handle resolves to the final state.
    pub fn try_build(
        self: &Arc<Self>,
        tracks: Vec<TrackSegment>,
        stations: Vec<Station>,
    ) -> Option<JoinHandle<GraphState>> {
        if !has_build_input(&tracks, &stations) {
            return None;
        }
        let Ok(runtime) = tokio::runtime::Handle::try_current() else {
            tracing::warn!("No Tokio runtime available, rail graph build not started");
            return None;
        };

        let claim = self.begin_build()?;
        let network = Arc::clone(self);
        Some(runtime.spawn_blocking(move || network.run_build(claim, &tracks, stations)))
    }

    /// Same as [`Self::try_build`], on the calling thread
    pub fn build_blocking(
        &self,
        tracks: &[TrackSegment],
        stations: Vec<Station>,
    ) -> Option<GraphState> {
        if !has_build_input(tracks, &stations) {
            return None;
        }
        let claim = self.begin_build()?;
        Some(self.run_build(claim, tracks, stations))
    }

    /// Drop the graph, both caches and the factor, and go back to
    /// `Uninitialized`. A build still running from before is discarded, and
    /// the next build only starts once it has finished.
    pub fn clear(&self) {
        let mut published = self.published.write();
        self.generation.fetch_add(1, Ordering::AcqRel);
        *published = None;
        self.state
            .store(GraphState::Uninitialized as u8, Ordering::Release);
        tracing::info!("Rail graph cleared");
    }

    pub fn distance_between(
        &self,
        from: &Station,
        to: &Station,
    ) -> std::result::Result<f64, QueryError> {
        let state = self.state();
        if state != GraphState::Built {
            return Err(QueryError::Unavailable(state));
        }
        let service = self.service().ok_or(QueryError::Unavailable(state))?;

        service.try_distance_between(from, to).inspect_err(|err| {
            tracing::warn!(
                from = %from.id,
                to = %to.id,
                error = %err,
                "Could not find path between stations"
            );
        })
    }

    /// Graph distance when available, straight-line distance otherwise
    pub fn distance_or_fallback(&self, from: &Station, to: &Station) -> f64 {
        match self.distance_between(from, to) {
            Ok(distance) => distance,
            Err(err) => {
                tracing::debug!(
                    from = %from.id,
                    to = %to.id,
                    reason = %err,
                    "Falling back to straight-line distance"
                );
                from.straight_line_distance(to)
            }
        }
    }

    /// Atomically claim the build for this cycle
    fn begin_build(&self) -> Option<BuildClaim> {
        let _published = self.published.write();
        if self.running.load(Ordering::Acquire) > 0 {
            tracing::debug!("A discarded build is still running, not starting another");
            return None;
        }
        self.state
            .compare_exchange(
                GraphState::Uninitialized as u8,
                GraphState::InProgress as u8,
                Ordering::AcqRel,
                Ordering::Acquire,
            )
            .ok()?;
        self.running.fetch_add(1, Ordering::AcqRel);
        Some(BuildClaim {
            generation: self.generation.load(Ordering::Acquire),
            running: Arc::clone(&self.running),
        })
    }

    fn run_build(
        &self,
        claim: BuildClaim,
        tracks: &[TrackSegment],
        stations: Vec<Station>,
    ) -> GraphState {
        let start_time = Instant::now();
        tracing::info!(
            segments = tracks.len(),
            stations = stations.len(),
            "Building rail graph"
        );

        let outcome = catch_unwind(AssertUnwindSafe(|| {
            build_service(&self.config, tracks, stations)
        }));
        let result = match outcome {
            Ok(result) => result,
            Err(payload) => Err(Error::Build(panic_message(payload.as_ref()))),
        };

        let state = self.publish(claim.generation, result);
        drop(claim);
        tracing::info!(
            state = %state,
            elapsed_ms = start_time.elapsed().as_millis() as u64,
            "Rail graph build finished"
        );
        state
    }

    fn publish(
        &self,
        generation: u64,
        result: Result<(DistanceService, BuildStats)>,
    ) -> GraphState {
        let mut published = self.published.write();
        if self.generation.load(Ordering::Acquire) != generation {
            tracing::debug!(generation, "Discarding build result of a cleared network");
            return self.state();
        }

        let state = match result {
            Ok((service, stats)) => {
                *published = Some(Published {
                    service: Arc::new(service),
                    stats,
                });
                GraphState::Built
            }
            Err(err) => {
                tracing::error!(error = %err, "Rail graph build failed");
                GraphState::Faulty
            }
        };
        self.state.store(state as u8, Ordering::Release);
        state
    }
}

/// Tracks and stations are loaded by the host over time; until both exist the
/// cycle stays `Uninitialized` so a later trigger can build.
fn has_build_input(tracks: &[TrackSegment], stations: &[Station]) -> bool {
    if tracks.is_empty() || stations.is_empty() {
        tracing::debug!(
            tracks = tracks.len(),
            stations = stations.len(),
            "Tracks or stations not loaded yet, rail graph build not started"
        );
        return false;
    }
    true
}

/// Graph, precompute and calibration for one load cycle
fn build_service(
    config: &NetworkConfig,
    tracks: &[TrackSegment],
    stations: Vec<Station>,
) -> Result<(DistanceService, BuildStats)> {
    config.validate()?;

    let (graph, stats) = Graph::build(tracks, config.merge_epsilon)?;
    let mut service = DistanceService::new(PathFinder::new(Arc::new(graph)), stations, config);

    if config.precompute_station_distances {
        service.precompute_station_distances();
    }

    if config.calibrate {
        let factor = service.compute_scaling_factor()?;
        service.set_scaling_factor(factor);
    }

    Ok((service, stats))
}

fn panic_message(payload: &(dyn Any + Send)) -> String {
    if let Some(msg) = payload.downcast_ref::<&str>() {
        format!("panic during build: {msg}")
    } else if let Some(msg) = payload.downcast_ref::<String>() {
        format!("panic during build: {msg}")
    } else {
        "panic during build".to_string()
    }
}
