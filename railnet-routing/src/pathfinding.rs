//! Shortest-path distances over the track graph
//!
//! Plain Dijkstra with a priority queue, stopped as soon as every requested
//! target is settled. Every settled target distance goes into a symmetric
//! pairwise cache, so repeated and reversed queries never traverse twice.

use parking_lot::RwLock;
use priority_queue::PriorityQueue;
use rustc_hash::{FxHashMap, FxHashSet};
use std::cmp::{Ordering, Reverse};
use std::sync::atomic::{AtomicUsize, Ordering as AtomicOrdering};
use std::sync::Arc;

use crate::graph::{Graph, NodeId};

/// Tentative distance with a total order for the priority queue
#[derive(Debug, Clone, Copy, PartialEq)]
struct Dist(f64);

impl Eq for Dist {}

impl PartialOrd for Dist {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl Ord for Dist {
    fn cmp(&self, other: &Self) -> Ordering {
        self.0.total_cmp(&other.0)
    }
}

/// Symmetric node-pair → distance memo, shared by all readers of a built graph
#[derive(Debug, Default)]
pub struct DistanceCache {
    map: RwLock<FxHashMap<(NodeId, NodeId), f64>>,
}

impl DistanceCache {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn get(&self, a: NodeId, b: NodeId) -> Option<f64> {
        self.map.read().get(&(a, b)).copied()
    }

    /// Insert both orientations under one lock
    pub fn insert(&self, a: NodeId, b: NodeId, distance: f64) {
        let mut map = self.map.write();
        map.insert((a, b), distance);
        map.insert((b, a), distance);
    }

    fn insert_from(&self, start: NodeId, distances: &FxHashMap<NodeId, f64>) {
        if distances.is_empty() {
            return;
        }
        let mut map = self.map.write();
        for (&target, &distance) in distances {
            map.insert((start, target), distance);
            map.insert((target, start), distance);
        }
    }

    /// Number of cached ordered pairs
    pub fn len(&self) -> usize {
        self.map.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.map.read().is_empty()
    }

    pub fn clear(&self) {
        self.map.write().clear();
    }
}

/// Distance queries against one immutable graph
#[derive(Debug)]
pub struct PathFinder {
    graph: Arc<Graph>,
    cache: DistanceCache,
    traversals: AtomicUsize,
}

impl PathFinder {
    pub fn new(graph: Arc<Graph>) -> Self {
        Self {
            graph,
            cache: DistanceCache::new(),
            traversals: AtomicUsize::new(0),
        }
    }

    pub fn graph(&self) -> &Graph {
        &self.graph
    }

    pub fn cache(&self) -> &DistanceCache {
        &self.cache
    }

    /// How many graph searches have actually run
    pub fn traversal_count(&self) -> usize {
        self.traversals.load(AtomicOrdering::Relaxed)
    }

    /// Shortest distance from `start` to `target`.
    ///
    /// `None` means the pair is not connected (or an id is unknown). That is a
    /// valid answer, not a failure; logging it is left to the caller.
    pub fn shortest_distance(&self, start: NodeId, target: NodeId) -> Option<f64> {
        if !self.contains(start) || !self.contains(target) {
            return None;
        }
        if start == target {
            return Some(0.0);
        }
        if let Some(distance) = self.cache.get(start, target) {
            return Some(distance);
        }

        let pending: FxHashSet<NodeId> = std::iter::once(target).collect();
        let settled = self.settle(start, &pending);
        self.cache.insert_from(start, &settled);
        settled.get(&target).copied()
    }

    /// Shortest distances from `start` to every node in `targets`.
    ///
    /// Targets already in the cache are answered from it; a single search
    /// covers the rest and stops once all of them are settled. Unreachable
    /// targets are absent from the result and never cached.
    pub fn shortest_distances(
        &self,
        start: NodeId,
        targets: &FxHashSet<NodeId>,
    ) -> FxHashMap<NodeId, f64> {
        let mut result = FxHashMap::default();
        if !self.contains(start) {
            return result;
        }

        let mut pending = FxHashSet::default();
        for &target in targets {
            if target == start {
                result.insert(target, 0.0);
            } else if let Some(distance) = self.cache.get(start, target) {
                result.insert(target, distance);
            } else if self.contains(target) {
                pending.insert(target);
            }
        }

        if pending.is_empty() {
            return result;
        }

        let settled = self.settle(start, &pending);
        self.cache.insert_from(start, &settled);
        result.extend(settled);
        result
    }

    fn contains(&self, id: NodeId) -> bool {
        (id as usize) < self.graph.node_count()
    }

    /// Dijkstra from `start` until every node of `pending` is settled or the
    /// reachable component is exhausted. Returns the settled pending nodes.
    fn settle(&self, start: NodeId, pending: &FxHashSet<NodeId>) -> FxHashMap<NodeId, f64> {
        self.traversals.fetch_add(1, AtomicOrdering::Relaxed);

        let n = self.graph.node_count();
        let mut dist = vec![f64::INFINITY; n];
        let mut visited = vec![false; n];
        let mut queue: PriorityQueue<NodeId, Reverse<Dist>> = PriorityQueue::new();
        let mut found = FxHashMap::with_capacity_and_hasher(pending.len(), Default::default());
        let mut remaining = pending.len();

        dist[start as usize] = 0.0;
        queue.push(start, Reverse(Dist(0.0)));

        while let Some((u, Reverse(Dist(d)))) = queue.pop() {
            visited[u as usize] = true;

            if pending.contains(&u) {
                found.insert(u, d);
                remaining -= 1;
                if remaining == 0 {
                    break;
                }
            }

            for edge in self.graph.edges(u) {
                let v = edge.target as usize;
                if visited[v] {
                    continue;
                }
                let alt = d + edge.length;
                if alt < dist[v] {
                    dist[v] = alt;
                    queue.push(edge.target, Reverse(Dist(alt)));
                }
            }
        }

        tracing::trace!(
            start,
            requested = pending.len(),
            settled = found.len(),
            "search finished"
        );

        found
    }
}
