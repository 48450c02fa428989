//! Layout adapter.
//!
//! Graph builders describe boxes and connections; a [`LayoutEngine`] turns
//! them into center coordinates. Builders only ever talk to the trait, so the
//! layered and column strategies can be swapped without touching graph
//! construction.

mod column;
mod layered;

pub use column::ColumnLayout;
pub use layered::LayeredLayout;

use crate::graph::Point;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;

/// Direction in which ranks advance.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum RankDir {
    /// Ranks advance along x, nodes of one rank share a column.
    #[serde(rename = "LR")]
    LeftRight,
    /// Ranks advance along y, nodes of one rank share a row.
    #[serde(rename = "TB")]
    TopBottom,
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct LayoutOptions {
    pub rank_dir: RankDir,
    /// Gap between neighbouring nodes of one rank.
    pub node_sep: f64,
    /// Gap between consecutive ranks.
    pub rank_sep: f64,
}

impl Default for LayoutOptions {
    fn default() -> Self {
        Self { rank_dir: RankDir::LeftRight, node_sep: 60.0, rank_sep: 150.0 }
    }
}

impl LayoutOptions {
    pub fn new(rank_dir: RankDir, node_sep: f64, rank_sep: f64) -> Self {
        Self { rank_dir, node_sep, rank_sep }
    }

    /// Splits a box into (extent along the ranks, extent across them).
    pub(crate) fn main_and_cross(&self, width: f64, height: f64) -> (f64, f64) {
        match self.rank_dir {
            RankDir::LeftRight => (width, height),
            RankDir::TopBottom => (height, width),
        }
    }

    pub(crate) fn point(&self, main: f64, cross: f64) -> Point {
        match self.rank_dir {
            RankDir::LeftRight => Point::new(main, cross),
            RankDir::TopBottom => Point::new(cross, main),
        }
    }

    /// Inverse of [`LayoutOptions::point`].
    pub(crate) fn split(&self, point: Point) -> (f64, f64) {
        match self.rank_dir {
            RankDir::LeftRight => (point.x, point.y),
            RankDir::TopBottom => (point.y, point.x),
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct LayoutNode {
    pub id: String,
    pub width: f64,
    pub height: f64,
}

impl LayoutNode {
    pub fn new(id: impl Into<String>, width: f64, height: f64) -> Self {
        Self { id: id.into(), width, height }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct LayoutEdge {
    pub id: String,
    pub source: String,
    pub target: String,
}

impl LayoutEdge {
    pub fn new(id: impl Into<String>, source: impl Into<String>, target: impl Into<String>) -> Self {
        Self { id: id.into(), source: source.into(), target: target.into() }
    }
}

/// Result of a layout run.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Layout {
    /// Center of every laid out node, keyed by node ID.
    pub centers: HashMap<String, Point>,
    /// Bend points of edges that span more than one rank, keyed by edge ID.
    pub waypoints: HashMap<String, Vec<Point>>,
}

impl Layout {
    pub fn center(&self, id: &str) -> Option<Point> {
        self.centers.get(id).copied()
    }
}

/// A strategy that assigns center coordinates to a set of boxes.
///
/// Edges whose endpoints are not among `nodes`, and self loops, are ignored.
pub trait LayoutEngine {
    fn layout(&self, nodes: &[LayoutNode], edges: &[LayoutEdge], options: &LayoutOptions) -> Layout;
}

/// Successor and predecessor lists over dense node indices.
pub(crate) struct IndexedGraph {
    pub successors: Vec<Vec<usize>>,
    pub predecessors: Vec<Vec<usize>>,
}

impl IndexedGraph {
    /// Builds adjacency from `(source, target)` pairs, dropping self loops
    /// and duplicates.
    pub(crate) fn new(node_count: usize, pairs: impl IntoIterator<Item = (usize, usize)>) -> Self {
        let mut successors = vec![Vec::new(); node_count];
        let mut predecessors = vec![Vec::new(); node_count];
        for (source, target) in pairs {
            if source == target || successors[source].contains(&target) {
                continue;
            }
            successors[source].push(target);
            predecessors[target].push(source);
        }
        Self { successors, predecessors }
    }

    /// Longest-path rank of every node; cycles must already be broken.
    pub(crate) fn longest_path_ranks(&self) -> Vec<usize> {
        let order = self.topological_order();
        let mut ranks = vec![0usize; self.successors.len()];
        for &node in &order {
            for &next in &self.successors[node] {
                ranks[next] = ranks[next].max(ranks[node] + 1);
            }
        }
        ranks
    }

    /// Kahn's algorithm, lowest index first. Nodes left on a cycle are
    /// appended in index order.
    pub(crate) fn topological_order(&self) -> Vec<usize> {
        let mut in_degree: Vec<usize> = self.predecessors.iter().map(Vec::len).collect();
        let mut ready: std::collections::BTreeSet<usize> =
            (0..in_degree.len()).filter(|&n| in_degree[n] == 0).collect();
        let mut order = Vec::with_capacity(in_degree.len());
        while let Some(node) = ready.pop_first() {
            order.push(node);
            for &next in &self.successors[node] {
                in_degree[next] -= 1;
                if in_degree[next] == 0 {
                    ready.insert(next);
                }
            }
        }
        if order.len() < in_degree.len() {
            let placed: std::collections::HashSet<usize> = order.iter().copied().collect();
            order.extend((0..in_degree.len()).filter(|n| !placed.contains(n)));
        }
        order
    }
}

/// Edge endpoints resolved to node indices as `(edge index, source, target)`.
/// Unknown endpoints and self loops are dropped.
pub(crate) fn resolve_edges(
    index: &HashMap<&str, usize>,
    edges: &[LayoutEdge],
) -> Vec<(usize, usize, usize)> {
    edges
        .iter()
        .enumerate()
        .filter_map(|(i, edge)| {
            let source = *index.get(edge.source.as_str())?;
            let target = *index.get(edge.target.as_str())?;
            (source != target).then_some((i, source, target))
        })
        .collect()
}

pub(crate) fn index_nodes(nodes: &[LayoutNode]) -> HashMap<&str, usize> {
    let mut index = HashMap::with_capacity(nodes.len());
    for (i, node) in nodes.iter().enumerate() {
        index.entry(node.id.as_str()).or_insert(i);
    }
    index
}
