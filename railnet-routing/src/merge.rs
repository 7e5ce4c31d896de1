//! Endpoint merging
//!
//! Track segments are exported independently, so the end of one segment and
//! the start of the next rarely share bit-identical coordinates. Endpoints
//! whose horizontal coordinates both lie within the merge epsilon are folded
//! into one graph node.
//!
//! Lookup goes through a grid of 1x1 cells keyed by the truncated `(x, z)`
//! position. The exact cell is checked first, then its 8 neighbours. The
//! merge is approximate: two points that are each within epsilon of a third
//! point but sit more than one cell apart may end up as different nodes, and
//! a cell only remembers the most recently created node.

use rustc_hash::FxHashMap;

use crate::geometry::Vec3;
use crate::graph::NodeId;

/// Default maximum per-axis horizontal delta for two endpoints to share a node
pub const MERGE_EPSILON: f64 = 0.1;

/// Neighbour ring scanned around the exact cell
const CELL_RADIUS: i32 = 1;

/// Quantized horizontal position used to bucket nodes.
///
/// Coordinates are truncated toward zero (not floored), so the cells on
/// either side of an axis both map to 0. This keeps node layouts identical
/// to earlier exports of the same network.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct CellKey {
    pub x: i32,
    pub z: i32,
}

impl CellKey {
    pub fn quantize(position: Vec3) -> Self {
        Self {
            x: position.x as i32,
            z: position.z as i32,
        }
    }

    pub fn shift(self, dx: i32, dz: i32) -> Self {
        Self {
            x: self.x.saturating_add(dx),
            z: self.z.saturating_add(dz),
        }
    }
}

/// Spatial index from quantized cell to the node created there
#[derive(Debug)]
pub struct NodeMerger {
    epsilon: f64,
    index: FxHashMap<CellKey, NodeId>,
}

impl NodeMerger {
    pub fn new(epsilon: f64) -> Self {
        Self::with_capacity(epsilon, 0)
    }

    pub fn with_capacity(epsilon: f64, capacity: usize) -> Self {
        Self {
            epsilon,
            index: FxHashMap::with_capacity_and_hasher(capacity, Default::default()),
        }
    }

    pub fn epsilon(&self) -> f64 {
        self.epsilon
    }

    /// Find an existing node that represents the same place as `position`.
    ///
    /// `positions` is indexed by node id. Returns the first match in scan
    /// order: exact cell, then `dx, dz` in `-1..=1` row-major.
    pub fn find(&self, position: Vec3, positions: &[Vec3]) -> Option<NodeId> {
        let cell = CellKey::quantize(position);

        if let Some(id) = self.match_in_cell(cell, position, positions) {
            return Some(id);
        }

        for dx in -CELL_RADIUS..=CELL_RADIUS {
            for dz in -CELL_RADIUS..=CELL_RADIUS {
                if dx == 0 && dz == 0 {
                    continue;
                }
                if let Some(id) = self.match_in_cell(cell.shift(dx, dz), position, positions) {
                    return Some(id);
                }
            }
        }

        None
    }

    /// Register a freshly created node under its cell. Overwrites whatever node
    /// previously owned that cell.
    pub fn insert(&mut self, position: Vec3, id: NodeId) {
        self.index.insert(CellKey::quantize(position), id);
    }

    pub fn cell_count(&self) -> usize {
        self.index.len()
    }

    fn match_in_cell(&self, cell: CellKey, position: Vec3, positions: &[Vec3]) -> Option<NodeId> {
        let id = *self.index.get(&cell)?;
        let candidate = positions.get(id as usize)?;

        let within = (candidate.x - position.x).abs() <= self.epsilon
            && (candidate.z - position.z).abs() <= self.epsilon;
        within.then_some(id)
    }
}
