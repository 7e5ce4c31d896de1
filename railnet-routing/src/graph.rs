//! Track graph construction
//!
//! Every track segment becomes one undirected connection between the nodes at
//! its first and last control point; interior control points only contribute
//! to the segment length. The finished graph is stored as a flat adjacency
//! (CSR): nodes in one vector, outgoing edges of node `u` in
//! `edges[offsets[u]..offsets[u + 1]]`, in the order they were added.

use serde::{Deserialize, Serialize};
use std::time::{Duration, Instant};

use railnet_common::{Error, Result};

use crate::geometry::{approximate_length, Vec3};
use crate::merge::NodeMerger;

/// Dense, 0-based node identifier
pub type NodeId = u32;

/// One control point of a track curve
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct BezierPoint {
    pub position: Vec3,
    /// Handle pointing back toward the previous point
    pub handle_in: Vec3,
    /// Handle pointing on toward the next point
    pub handle_out: Vec3,
}

impl BezierPoint {
    pub fn new(position: Vec3, handle_in: Vec3, handle_out: Vec3) -> Self {
        Self {
            position,
            handle_in,
            handle_out,
        }
    }

    /// Control point whose handles sit on the point itself
    pub fn linear(position: Vec3) -> Self {
        Self::new(position, position, position)
    }

    fn is_finite(&self) -> bool {
        self.position.is_finite() && self.handle_in.is_finite() && self.handle_out.is_finite()
    }
}

/// A physical piece of track as exported by the track source
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TrackSegment {
    #[serde(default)]
    pub name: String,
    pub points: Vec<BezierPoint>,
}

impl TrackSegment {
    pub fn new(name: impl Into<String>, points: Vec<BezierPoint>) -> Self {
        Self {
            name: name.into(),
            points,
        }
    }

    /// Straight segment between two points
    pub fn straight(name: impl Into<String>, from: Vec3, to: Vec3) -> Self {
        Self::new(name, vec![BezierPoint::linear(from), BezierPoint::linear(to)])
    }

    /// Sum of the approximated lengths of all consecutive spans
    pub fn length(&self) -> f64 {
        self.points
            .windows(2)
            .map(|pair| {
                let (a, b) = (&pair[0], &pair[1]);
                approximate_length(a.position, a.handle_out, b.handle_in, b.position)
            })
            .sum()
    }

    fn endpoints(&self) -> Option<(Vec3, Vec3)> {
        match (self.points.first(), self.points.last()) {
            (Some(first), Some(last)) if self.points.len() >= 2 => {
                Some((first.position, last.position))
            }
            _ => None,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Node {
    pub id: NodeId,
    pub position: Vec3,
}

/// Directed, weighted connection. Each segment yields one in each direction.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Edge {
    pub target: NodeId,
    pub length: f64,
}

/// Summary of one build, logged and handed back to the caller
#[derive(Debug, Clone, PartialEq)]
pub struct BuildStats {
    pub segments: usize,
    pub skipped_segments: usize,
    pub nodes: usize,
    pub edges: usize,
    /// Sum of segment lengths (each segment counted once)
    pub total_length: f64,
    pub elapsed: Duration,
}

/// Immutable track graph
#[derive(Debug, Clone)]
pub struct Graph {
    nodes: Vec<Node>,
    offsets: Vec<u32>,
    edges: Vec<Edge>,
}

impl Graph {
    /// Build a graph from an ordered collection of track segments.
    ///
    /// Segments with fewer than two control points are skipped with a warning.
    /// Non-finite coordinates are rejected as malformed input.
    pub fn build(segments: &[TrackSegment], merge_epsilon: f64) -> Result<(Self, BuildStats)> {
        let start_time = Instant::now();
        let mut builder = GraphBuilder::with_capacity(segments.len(), merge_epsilon);
        let mut skipped = 0usize;
        let mut total_length = 0.0;

        for (index, segment) in segments.iter().enumerate() {
            let Some((start, end)) = segment.endpoints() else {
                tracing::warn!(
                    segment = index,
                    name = %segment.name,
                    points = segment.points.len(),
                    "Invalid track segment: curve needs at least two points, skipping"
                );
                skipped += 1;
                continue;
            };

            if !segment.points.iter().all(BezierPoint::is_finite) {
                return Err(Error::InvalidInput(format!(
                    "track segment {index} ('{}') has a non-finite coordinate",
                    segment.name
                )));
            }

            let length = segment.length();
            let from = builder.resolve_node(start)?;
            let to = builder.resolve_node(end)?;
            builder.add_connection(from, to, length);
            total_length += length;
        }

        let graph = builder.finish()?;
        let stats = BuildStats {
            segments: segments.len(),
            skipped_segments: skipped,
            nodes: graph.node_count(),
            edges: graph.edge_count(),
            total_length,
            elapsed: start_time.elapsed(),
        };

        tracing::debug!(
            nodes = stats.nodes,
            edges = stats.edges,
            skipped = stats.skipped_segments,
            elapsed_ms = stats.elapsed.as_millis() as u64,
            "Finished building graph"
        );

        Ok((graph, stats))
    }

    pub fn node_count(&self) -> usize {
        self.nodes.len()
    }

    pub fn edge_count(&self) -> usize {
        self.edges.len()
    }

    pub fn is_empty(&self) -> bool {
        self.nodes.is_empty()
    }

    pub fn nodes(&self) -> &[Node] {
        &self.nodes
    }

    pub fn node(&self, id: NodeId) -> Option<&Node> {
        self.nodes.get(id as usize)
    }

    /// Outgoing edges of `id`, empty for unknown ids
    #[inline]
    pub fn edges(&self, id: NodeId) -> &[Edge] {
        let u = id as usize;
        if u >= self.nodes.len() {
            return &[];
        }
        let start = self.offsets[u] as usize;
        let end = self.offsets[u + 1] as usize;
        &self.edges[start..end]
    }
}

/// Mutable state of a build in progress
struct GraphBuilder {
    positions: Vec<Vec3>,
    merger: NodeMerger,
    arcs: Vec<(NodeId, Edge)>,
}

impl GraphBuilder {
    fn with_capacity(segment_count: usize, merge_epsilon: f64) -> Self {
        // Every segment contributes at most two endpoints and exactly two arcs
        let node_capacity = segment_count.saturating_mul(2);
        Self {
            positions: Vec::with_capacity(node_capacity),
            merger: NodeMerger::with_capacity(merge_epsilon, node_capacity),
            arcs: Vec::with_capacity(node_capacity),
        }
    }

    fn resolve_node(&mut self, position: Vec3) -> Result<NodeId> {
        if let Some(id) = self.merger.find(position, &self.positions) {
            return Ok(id);
        }

        let id = NodeId::try_from(self.positions.len())
            .map_err(|_| Error::Build("node count exceeds u32 range".to_string()))?;
        self.positions.push(position);
        self.merger.insert(position, id);
        Ok(id)
    }

    fn add_connection(&mut self, from: NodeId, to: NodeId, length: f64) {
        self.arcs.push((from, Edge { target: to, length }));
        self.arcs.push((to, Edge { target: from, length }));
    }

    /// Assemble the CSR adjacency, keeping per-node insertion order
    fn finish(self) -> Result<Graph> {
        let n_nodes = self.positions.len();
        if u32::try_from(self.arcs.len()).is_err() {
            return Err(Error::Build("edge count exceeds u32 range".to_string()));
        }

        // First pass: count outgoing arcs per node
        let mut counts = vec![0u32; n_nodes];
        for (from, _) in &self.arcs {
            counts[*from as usize] += 1;
        }

        let mut offsets = Vec::with_capacity(n_nodes + 1);
        let mut offset = 0u32;
        for &count in &counts {
            offsets.push(offset);
            offset += count;
        }
        offsets.push(offset);

        // Second pass: place arcs, reusing counts as write cursors
        counts.fill(0);
        let mut edges = vec![
            Edge {
                target: 0,
                length: 0.0
            };
            self.arcs.len()
        ];
        for (from, edge) in self.arcs {
            let u = from as usize;
            edges[(offsets[u] + counts[u]) as usize] = edge;
            counts[u] += 1;
        }

        let nodes = self
            .positions
            .into_iter()
            .zip(0..)
            .map(|(position, id)| Node { id, position })
            .collect();

        Ok(Graph {
            nodes,
            offsets,
            edges,
        })
    }
}
