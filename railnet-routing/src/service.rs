//! Station-to-station distances
//!
//! Stations are mapped to their nearest graph node once (by stable id) and
//! the node-to-node distance comes from the [`PathFinder`]. After a build the
//! service derives a scaling factor that keeps graph distances comparable to
//! the straight-line distances used before.

use parking_lot::RwLock;
use rustc_hash::{FxHashMap, FxHashSet};
use serde::{Deserialize, Serialize};
use std::time::Instant;
use thiserror::Error;

use crate::config::NetworkConfig;
use crate::geometry::Vec3;
use crate::graph::{Graph, NodeId};
use crate::network::QueryError;
use crate::pathfinding::PathFinder;

/// A place distances are asked for, identified by a stable id
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Station {
    pub id: String,
    pub position: Vec3,
}

impl Station {
    pub fn new(id: impl Into<String>, position: Vec3) -> Self {
        Self {
            id: id.into(),
            position,
        }
    }

    /// Straight-line distance to another station
    pub fn straight_line_distance(&self, other: &Station) -> f64 {
        self.position.distance(other.position)
    }
}

/// Graph node closest to a station, with the station-to-node gap
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct NearestNode {
    pub node: NodeId,
    pub offset: f64,
}

/// Station id → nearest node, filled on first lookup
#[derive(Debug, Default)]
pub struct NearestNodeCache {
    map: RwLock<FxHashMap<String, NearestNode>>,
}

impl NearestNodeCache {
    pub fn get(&self, station_id: &str) -> Option<NearestNode> {
        self.map.read().get(station_id).copied()
    }

    pub fn insert(&self, station_id: &str, nearest: NearestNode) {
        self.map.write().insert(station_id.to_string(), nearest);
    }

    pub fn len(&self) -> usize {
        self.map.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.map.read().is_empty()
    }
}

#[derive(Debug, Error, PartialEq)]
pub enum CalibrationError {
    #[error("station '{0}' could not be mapped to a graph node")]
    UnmappedStation(String),

    #[error("no path between stations '{from}' and '{to}'")]
    NoPath { from: String, to: String },

    #[error("cumulated graph distance is zero")]
    ZeroGraphDistance,

    #[error("scaling factor {0} is not a positive number")]
    InvalidFactor(f64),
}

impl From<CalibrationError> for railnet_common::Error {
    fn from(err: CalibrationError) -> Self {
        railnet_common::Error::Calibration(err.to_string())
    }
}

/// Linear scan for the node closest to `position`
pub fn find_nearest_node(graph: &Graph, position: Vec3) -> Option<NearestNode> {
    graph
        .nodes()
        .iter()
        .map(|node| NearestNode {
            node: node.id,
            offset: node.position.distance(position),
        })
        .min_by(|a, b| a.offset.total_cmp(&b.offset))
}

/// Distance queries between stations on a built graph
#[derive(Debug)]
pub struct DistanceService {
    pathfinder: PathFinder,
    nearest: NearestNodeCache,
    stations: Vec<Station>,
    scaling_factor: f64,
    use_distance_balancing: bool,
    include_station_offset: bool,
}

impl DistanceService {
    pub fn new(pathfinder: PathFinder, stations: Vec<Station>, config: &NetworkConfig) -> Self {
        Self {
            pathfinder,
            nearest: NearestNodeCache::default(),
            stations,
            scaling_factor: 1.0,
            use_distance_balancing: config.use_distance_balancing,
            include_station_offset: config.include_station_offset,
        }
    }

    pub fn pathfinder(&self) -> &PathFinder {
        &self.pathfinder
    }

    pub fn graph(&self) -> &Graph {
        self.pathfinder.graph()
    }

    pub fn stations(&self) -> &[Station] {
        &self.stations
    }

    pub fn station(&self, id: &str) -> Option<&Station> {
        self.stations.iter().find(|s| s.id == id)
    }

    pub fn nearest_cache(&self) -> &NearestNodeCache {
        &self.nearest
    }

    pub fn scaling_factor(&self) -> f64 {
        self.scaling_factor
    }

    /// Set the calibrated factor. Ignored unless finite and positive.
    pub fn set_scaling_factor(&mut self, factor: f64) {
        if factor.is_finite() && factor > 0.0 {
            self.scaling_factor = factor;
        } else {
            tracing::warn!(factor, "Ignoring invalid distance scaling factor");
        }
    }

    /// Resolve a station to its nearest node, caching by station id
    pub fn nearest_node(&self, station: &Station) -> Option<NearestNode> {
        if let Some(nearest) = self.nearest.get(&station.id) {
            return Some(nearest);
        }

        let nearest = find_nearest_node(self.graph(), station.position)?;
        self.nearest.insert(&station.id, nearest);
        Some(nearest)
    }

    /// Distance along the track between two stations.
    ///
    /// Scaled by the calibration factor when distance balancing is enabled.
    /// `None` when either station has no node or the nodes are not connected.
    pub fn distance_between(&self, from: &Station, to: &Station) -> Option<f64> {
        match self.try_distance_between(from, to) {
            Ok(distance) => Some(distance),
            Err(err) => {
                tracing::warn!(
                    from = %from.id,
                    to = %to.id,
                    error = %err,
                    "Could not find path between stations"
                );
                None
            }
        }
    }

    /// Same as [`Self::distance_between`], with the reason for a miss
    pub fn try_distance_between(&self, from: &Station, to: &Station) -> Result<f64, QueryError> {
        let start = self
            .nearest_node(from)
            .ok_or_else(|| QueryError::UnmappedStation(from.id.clone()))?;
        let end = self
            .nearest_node(to)
            .ok_or_else(|| QueryError::UnmappedStation(to.id.clone()))?;

        let mut distance = self
            .pathfinder
            .shortest_distance(start.node, end.node)
            .ok_or_else(|| QueryError::NoPath {
                from: from.id.clone(),
                to: to.id.clone(),
            })?;

        if self.include_station_offset {
            distance += start.offset + end.offset;
        }
        if self.use_distance_balancing {
            distance *= self.scaling_factor;
        }

        Ok(distance)
    }

    /// Warm the distance cache with every station pair.
    ///
    /// One batched search per station toward all stations after it, so later
    /// station-to-station lookups are pure cache hits. Unreachable pairs are
    /// left uncached. Returns the number of pairs resolved.
    pub fn precompute_station_distances(&self) -> usize {
        let start_time = Instant::now();
        let nodes: Vec<Option<NodeId>> = self
            .stations
            .iter()
            .map(|s| self.nearest_node(s).map(|n| n.node))
            .collect();

        let mut resolved = 0usize;
        for (i, start) in nodes.iter().enumerate() {
            let Some(start) = *start else {
                continue;
            };
            let targets: FxHashSet<NodeId> = nodes[i + 1..].iter().flatten().copied().collect();
            if targets.is_empty() {
                continue;
            }
            resolved += self.pathfinder.shortest_distances(start, &targets).len();
        }

        tracing::debug!(
            stations = self.stations.len(),
            resolved,
            elapsed_ms = start_time.elapsed().as_millis() as u64,
            "Finished precomputing station distances"
        );

        resolved
    }

    /// Ratio of summed straight-line distances to summed graph distances over
    /// every unordered station pair.
    ///
    /// Fails if any pair cannot be resolved or the graph total is zero.
    pub fn compute_scaling_factor(&self) -> Result<f64, CalibrationError> {
        let start_time = Instant::now();
        let mut total_graph = 0.0;
        let mut total_straight = 0.0;

        for (i, from) in self.stations.iter().enumerate() {
            for to in &self.stations[i + 1..] {
                let start = self
                    .nearest_node(from)
                    .ok_or_else(|| CalibrationError::UnmappedStation(from.id.clone()))?;
                let end = self
                    .nearest_node(to)
                    .ok_or_else(|| CalibrationError::UnmappedStation(to.id.clone()))?;

                let distance = self
                    .pathfinder
                    .shortest_distance(start.node, end.node)
                    .ok_or_else(|| CalibrationError::NoPath {
                        from: from.id.clone(),
                        to: to.id.clone(),
                    })?;

                total_graph += distance;
                total_straight += from.straight_line_distance(to);
            }
        }

        if total_graph <= 0.0 {
            return Err(CalibrationError::ZeroGraphDistance);
        }

        let factor = total_straight / total_graph;
        if !(factor.is_finite() && factor > 0.0) {
            return Err(CalibrationError::InvalidFactor(factor));
        }

        tracing::info!(
            factor,
            pairs = self.stations.len() * self.stations.len().saturating_sub(1) / 2,
            elapsed_ms = start_time.elapsed().as_millis() as u64,
            "Finished distance scaling"
        );

        Ok(factor)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::graph::TrackSegment;
    use crate::merge::MERGE_EPSILON;
    use std::sync::Arc;

    fn v(x: f64, z: f64) -> Vec3 {
        Vec3::new(x, 0.0, z)
    }

    fn l_shape() -> Vec<TrackSegment> {
        vec![
            TrackSegment::straight("a", v(0.0, 0.0), v(10.0, 0.0)),
            TrackSegment::straight("b", v(10.0, 0.0), v(10.0, 10.0)),
        ]
    }

    fn service(
        segments: &[TrackSegment],
        stations: Vec<Station>,
        config: &NetworkConfig,
    ) -> DistanceService {
        let (graph, _) = Graph::build(segments, MERGE_EPSILON).expect("build");
        DistanceService::new(PathFinder::new(Arc::new(graph)), stations, config)
    }

    fn triangle_stations() -> Vec<Station> {
        vec![
            Station::new("A", v(0.0, 0.0)),
            Station::new("B", v(10.0, 0.0)),
            Station::new("C", v(10.0, 10.0)),
        ]
    }

    #[test]
    fn test_nearest_node_linear_scan() {
        let (graph, _) = Graph::build(&l_shape(), MERGE_EPSILON).expect("build");

        let nearest = find_nearest_node(&graph, Vec3::new(9.0, 0.0, 8.0)).expect("node");
        assert_eq!(nearest.node, 2);
        assert!((nearest.offset - (1.0f64 + 4.0).sqrt()).abs() < 1e-9);
    }

    #[test]
    fn test_nearest_node_on_empty_graph() {
        let (graph, _) = Graph::build(&[], MERGE_EPSILON).expect("build");
        assert!(find_nearest_node(&graph, v(0.0, 0.0)).is_none());
    }

    #[test]
    fn test_nearest_node_is_cached_by_station_id() {
        let svc = service(&l_shape(), vec![], &NetworkConfig::default());
        let station = Station::new("yard", v(0.5, 0.5));

        let first = svc.nearest_node(&station).expect("node");
        assert_eq!(svc.nearest_cache().len(), 1);

        // Same id, different position: the cached answer is kept
        let moved = Station::new("yard", v(10.0, 10.0));
        assert_eq!(svc.nearest_node(&moved), Some(first));
    }

    #[test]
    fn test_calibration_on_right_triangle() {
        let svc = service(&l_shape(), triangle_stations(), &NetworkConfig::default());

        let factor = svc.compute_scaling_factor().expect("calibrated");

        // Graph: AB 10, AC 20, BC 10. Straight: 10, 10*sqrt(2), 10.
        let expected = (20.0 + 10.0 * 2f64.sqrt()) / 40.0;
        assert!((factor - expected).abs() < 1e-9, "got {factor}");
    }

    #[test]
    fn test_calibration_fails_without_path() {
        let segments = vec![
            TrackSegment::straight("west", v(0.0, 0.0), v(10.0, 0.0)),
            TrackSegment::straight("east", v(100.0, 0.0), v(110.0, 0.0)),
        ];
        let stations = vec![Station::new("W", v(0.0, 0.0)), Station::new("E", v(110.0, 0.0))];
        let svc = service(&segments, stations, &NetworkConfig::default());

        assert_eq!(
            svc.compute_scaling_factor(),
            Err(CalibrationError::NoPath {
                from: "W".to_string(),
                to: "E".to_string()
            })
        );
    }

    #[test]
    fn test_calibration_fails_on_zero_distance() {
        let stations = vec![Station::new("only", v(0.0, 0.0))];
        let svc = service(&l_shape(), stations, &NetworkConfig::default());
        assert_eq!(svc.compute_scaling_factor(), Err(CalibrationError::ZeroGraphDistance));
    }

    #[test]
    fn test_calibration_fails_on_unmapped_station() {
        let svc = service(&[], triangle_stations(), &NetworkConfig::default());
        assert_eq!(
            svc.compute_scaling_factor(),
            Err(CalibrationError::UnmappedStation("A".to_string()))
        );
    }

    #[test]
    fn test_distance_is_scaled_when_balancing() {
        let mut svc = service(&l_shape(), triangle_stations(), &NetworkConfig::default());
        svc.set_scaling_factor(0.5);

        let stations = triangle_stations();
        let d = svc.distance_between(&stations[0], &stations[2]).expect("path");
        assert!((d - 10.0).abs() < 1e-9);
    }

    #[test]
    fn test_distance_unscaled_without_balancing() {
        let config = NetworkConfig {
            use_distance_balancing: false,
            ..NetworkConfig::default()
        };
        let mut svc = service(&l_shape(), triangle_stations(), &config);
        svc.set_scaling_factor(0.5);

        let stations = triangle_stations();
        let d = svc.distance_between(&stations[0], &stations[2]).expect("path");
        assert!((d - 20.0).abs() < 1e-9);
    }

    #[test]
    fn test_station_offset_is_added() {
        let config = NetworkConfig {
            use_distance_balancing: false,
            include_station_offset: true,
            ..NetworkConfig::default()
        };
        let svc = service(&l_shape(), vec![], &config);

        let from = Station::new("P", Vec3::new(0.0, 3.0, 0.0));
        let to = Station::new("Q", Vec3::new(10.0, 0.0, 12.0));
        let d = svc.distance_between(&from, &to).expect("path");
        assert!((d - 25.0).abs() < 1e-9, "got {d}");
    }

    #[test]
    fn test_miss_reports_reason() {
        let segments = vec![
            TrackSegment::straight("west", v(0.0, 0.0), v(10.0, 0.0)),
            TrackSegment::straight("east", v(100.0, 0.0), v(110.0, 0.0)),
        ];
        let svc = service(&segments, vec![], &NetworkConfig::default());
        let w = Station::new("W", v(1.0, 0.0));
        let e = Station::new("E", v(109.0, 0.0));

        assert_eq!(
            svc.try_distance_between(&w, &e),
            Err(QueryError::NoPath {
                from: "W".to_string(),
                to: "E".to_string()
            })
        );
        assert_eq!(svc.distance_between(&w, &e), None);

        let empty = service(&[], vec![], &NetworkConfig::default());
        assert_eq!(
            empty.try_distance_between(&w, &e),
            Err(QueryError::UnmappedStation("W".to_string()))
        );
    }

    #[test]
    fn test_invalid_factor_is_ignored() {
        let mut svc = service(&l_shape(), vec![], &NetworkConfig::default());
        svc.set_scaling_factor(0.0);
        svc.set_scaling_factor(f64::NAN);
        assert_eq!(svc.scaling_factor(), 1.0);
    }

    #[test]
    fn test_precompute_makes_pairs_cache_hits() {
        let svc = service(&l_shape(), triangle_stations(), &NetworkConfig::default());

        let resolved = svc.precompute_station_distances();
        assert_eq!(resolved, 3);
        assert_eq!(svc.pathfinder().traversal_count(), 2);

        svc.compute_scaling_factor().expect("calibrated");
        let stations = triangle_stations();
        svc.distance_between(&stations[2], &stations[0]).expect("path");
        assert_eq!(svc.pathfinder().traversal_count(), 2);
    }
}
