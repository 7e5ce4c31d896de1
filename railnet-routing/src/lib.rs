//! Track graph and station distances for rail networks
//!
//! Track segments (cubic Bézier curves) become an undirected weighted graph,
//! near-duplicate endpoints are merged, and station-to-station distances are
//! answered by a cached Dijkstra search, calibrated against straight-line
//! distances.

pub mod config;
pub mod geometry;
pub mod graph;
pub mod merge;
pub mod network;
pub mod pathfinding;
pub mod service;

pub use config::NetworkConfig;
pub use geometry::Vec3;
pub use graph::{BezierPoint, BuildStats, Graph, NodeId, TrackSegment};
pub use network::{GraphState, QueryError, RailNetwork};
pub use pathfinding::PathFinder;
pub use service::{CalibrationError, DistanceService, Station};
