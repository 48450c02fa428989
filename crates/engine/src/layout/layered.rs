//! Sugiyama style layered layout.
//!
//! The pipeline is the classic one: break cycles, assign ranks, split long
//! edges with dummy vertices, reduce crossings with barycenter sweeps and
//! finally assign coordinates. Every step is deterministic, so identical
//! input always yields identical coordinates.

use super::{
    index_nodes, resolve_edges, IndexedGraph, Layout, LayoutEdge, LayoutEngine, LayoutNode,
    LayoutOptions,
};
use petgraph::graph::{DiGraph, NodeIndex};
use petgraph::visit::{depth_first_search, DfsEvent};
use std::collections::{BTreeMap, HashMap, HashSet};

const DEFAULT_SWEEPS: usize = 8;
const PLACEMENT_ROUNDS: usize = 4;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct LayeredLayout {
    sweeps: usize,
}

impl Default for LayeredLayout {
    fn default() -> Self {
        Self { sweeps: DEFAULT_SWEEPS }
    }
}

impl LayeredLayout {
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of barycenter sweeps used for crossing reduction.
    pub fn with_sweeps(mut self, sweeps: usize) -> Self {
        self.sweeps = sweeps;
        self
    }
}

/// One vertex of the proper layered graph: a real node or a dummy on a long edge.
#[derive(Debug, Clone)]
struct Vertex {
    rank: usize,
    main: f64,
    cross: f64,
}

/// Layered graph in which every edge joins two adjacent ranks.
struct ProperGraph {
    vertices: Vec<Vertex>,
    /// Neighbours one rank further along the flow.
    down: Vec<Vec<usize>>,
    /// Neighbours one rank back.
    up: Vec<Vec<usize>>,
    /// Dummy chain per oriented `(source, target)` pair, in flow order.
    chains: HashMap<(usize, usize), Vec<usize>>,
}

impl ProperGraph {
    fn build(
        nodes: &[LayoutNode],
        ranks: &[usize],
        pairs: &[(usize, usize)],
        options: &LayoutOptions,
    ) -> Self {
        let mut vertices: Vec<Vertex> = nodes
            .iter()
            .zip(ranks)
            .map(|(node, &rank)| {
                let (main, cross) = options.main_and_cross(node.width, node.height);
                Vertex { rank, main, cross }
            })
            .collect();
        let mut links = Vec::new();
        let mut chains = HashMap::new();
        for &(source, target) in pairs {
            if chains.contains_key(&(source, target)) {
                continue;
            }
            let mut chain = Vec::new();
            let mut previous = source;
            for rank in ranks[source] + 1..ranks[target] {
                let dummy = vertices.len();
                vertices.push(Vertex { rank, main: 0.0, cross: 0.0 });
                links.push((previous, dummy));
                chain.push(dummy);
                previous = dummy;
            }
            links.push((previous, target));
            chains.insert((source, target), chain);
        }

        let mut down = vec![Vec::new(); vertices.len()];
        let mut up = vec![Vec::new(); vertices.len()];
        for (from, to) in links {
            down[from].push(to);
            up[to].push(from);
        }
        Self { vertices, down, up, chains }
    }

    fn layers(&self) -> Vec<Vec<usize>> {
        let depth = self.vertices.iter().map(|v| v.rank + 1).max().unwrap_or(0);
        let mut layers = vec![Vec::new(); depth];
        for (id, vertex) in self.vertices.iter().enumerate() {
            layers[vertex.rank].push(id);
        }
        layers
    }
}

impl LayoutEngine for LayeredLayout {
    fn layout(&self, nodes: &[LayoutNode], edges: &[LayoutEdge], options: &LayoutOptions) -> Layout {
        if nodes.is_empty() {
            return Layout::default();
        }
        let index = index_nodes(nodes);
        let resolved = resolve_edges(&index, edges);

        let back_edges = find_back_edges(nodes.len(), &resolved);
        let oriented: Vec<(usize, usize, usize, bool)> = resolved
            .iter()
            .map(|&(edge, source, target)| {
                if back_edges.contains(&(source, target)) {
                    (edge, target, source, true)
                } else {
                    (edge, source, target, false)
                }
            })
            .collect();
        let pairs: Vec<(usize, usize)> = oriented.iter().map(|&(_, s, t, _)| (s, t)).collect();

        let graph = IndexedGraph::new(nodes.len(), pairs.iter().copied());
        let ranks = assign_ranks(&graph);
        let proper = ProperGraph::build(nodes, &ranks, &pairs, options);

        let layers = self.order_layers(&proper);
        let cross = assign_cross(&proper, &layers, options.node_sep);
        let main = assign_main(&proper, &layers, options.rank_sep);

        let mut layout = Layout::default();
        for (i, node) in nodes.iter().enumerate() {
            layout
                .centers
                .entry(node.id.clone())
                .or_insert_with(|| options.point(main[i], cross[i]));
        }
        for &(edge, source, target, reversed) in &oriented {
            let Some(chain) = proper.chains.get(&(source, target)) else {
                continue;
            };
            if chain.is_empty() {
                continue;
            }
            let mut points: Vec<_> =
                chain.iter().map(|&dummy| options.point(main[dummy], cross[dummy])).collect();
            if reversed {
                points.reverse();
            }
            layout.waypoints.insert(edges[edge].id.clone(), points);
        }
        layout
    }
}

impl LayeredLayout {
    /// Alternating barycenter sweeps; the ordering with the fewest crossings wins.
    fn order_layers(&self, graph: &ProperGraph) -> Vec<Vec<usize>> {
        let mut layers = graph.layers();
        let mut best = layers.clone();
        let mut best_crossings = count_crossings(&layers, &graph.down, graph.vertices.len());
        let depth = layers.len();
        for sweep in 0..self.sweeps {
            if best_crossings == 0 {
                break;
            }
            if sweep % 2 == 0 {
                barycenter_pass(&mut layers, &graph.up, 1..depth);
            } else {
                barycenter_pass(&mut layers, &graph.down, (0..depth.saturating_sub(1)).rev());
            }
            let crossings = count_crossings(&layers, &graph.down, graph.vertices.len());
            if crossings < best_crossings {
                best_crossings = crossings;
                best = layers.clone();
            }
        }
        best
    }
}

/// Edges that close a cycle during a depth first search.
fn find_back_edges(node_count: usize, edges: &[(usize, usize, usize)]) -> HashSet<(usize, usize)> {
    let mut graph = DiGraph::<(), ()>::with_capacity(node_count, edges.len());
    for _ in 0..node_count {
        graph.add_node(());
    }
    for &(_, source, target) in edges {
        graph.update_edge(NodeIndex::new(source), NodeIndex::new(target), ());
    }
    let mut back_edges = HashSet::new();
    depth_first_search(&graph, graph.node_indices(), |event| {
        if let DfsEvent::BackEdge(u, v) = event {
            back_edges.insert((u.index(), v.index()));
        }
    });
    back_edges
}

/// Longest-path ranks with pure sources moved next to their nearest
/// successor, then compressed so no rank is empty.
fn assign_ranks(graph: &IndexedGraph) -> Vec<usize> {
    let mut ranks = graph.longest_path_ranks();
    for node in 0..ranks.len() {
        if !graph.predecessors[node].is_empty() {
            continue;
        }
        if let Some(nearest) = graph.successors[node].iter().map(|&s| ranks[s]).min() {
            ranks[node] = nearest.saturating_sub(1);
        }
    }
    let dense: BTreeMap<usize, usize> = ranks
        .iter()
        .copied()
        .collect::<std::collections::BTreeSet<_>>()
        .into_iter()
        .enumerate()
        .map(|(dense, rank)| (rank, dense))
        .collect();
    ranks.iter().map(|rank| dense[rank]).collect()
}

/// Reorders each visited layer by the mean position of its neighbours in the
/// previously visited layer. Vertices without neighbours keep their slot.
fn barycenter_pass(
    layers: &mut [Vec<usize>],
    neighbours: &[Vec<usize>],
    visit: impl Iterator<Item = usize>,
) {
    let mut position = vec![0usize; neighbours.len()];
    for layer in layers.iter() {
        for (slot, &v) in layer.iter().enumerate() {
            position[v] = slot;
        }
    }
    for rank in visit {
        let layer = &mut layers[rank];
        let mut keyed: Vec<(usize, f64)> = layer
            .iter()
            .enumerate()
            .map(|(slot, &v)| {
                let adjacent = &neighbours[v];
                let key = if adjacent.is_empty() {
                    slot as f64
                } else {
                    adjacent.iter().map(|&u| position[u] as f64).sum::<f64>() / adjacent.len() as f64
                };
                (v, key)
            })
            .collect();
        keyed.sort_by(|a, b| a.1.total_cmp(&b.1));
        for (slot, (v, _)) in keyed.into_iter().enumerate() {
            layer[slot] = v;
            position[v] = slot;
        }
    }
}

/// Total number of edge crossings between adjacent layers.
fn count_crossings(layers: &[Vec<usize>], down: &[Vec<usize>], vertex_count: usize) -> usize {
    let mut position = vec![0usize; vertex_count];
    for layer in layers {
        for (slot, &v) in layer.iter().enumerate() {
            position[v] = slot;
        }
    }
    layers
        .windows(2)
        .map(|pair| {
            let mut segments: Vec<(usize, usize)> = pair[0]
                .iter()
                .flat_map(|&u| down[u].iter().map(move |&v| (u, v)))
                .map(|(u, v)| (position[u], position[v]))
                .collect();
            segments.sort_unstable();
            inversions(segments.into_iter().map(|(_, lower)| lower), pair[1].len())
        })
        .sum()
}

// Counts pairs i < j with value[i] > value[j] using a Fenwick tree.
fn inversions(values: impl Iterator<Item = usize>, bound: usize) -> usize {
    let mut tree = vec![0usize; bound + 1];
    let mut seen = 0;
    let mut total = 0;
    for value in values {
        let mut i = value + 1;
        let mut not_greater = 0;
        while i > 0 {
            not_greater += tree[i];
            i &= i - 1;
        }
        total += seen - not_greater;
        let mut i = value + 1;
        while i <= bound {
            tree[i] += 1;
            i += i & i.wrapping_neg();
        }
        seen += 1;
    }
    total
}

/// Cross-axis centers. Each round pulls vertices toward the mean of their
/// neighbours, then resolves overlaps with a left and a right pass whose
/// results are averaged.
fn assign_cross(graph: &ProperGraph, layers: &[Vec<usize>], node_sep: f64) -> Vec<f64> {
    let gap = |a: usize, b: usize| {
        (graph.vertices[a].cross + graph.vertices[b].cross) / 2.0 + node_sep
    };
    let mut cross = vec![0.0; graph.vertices.len()];
    for layer in layers {
        let mut cursor = 0.0;
        for (slot, &v) in layer.iter().enumerate() {
            if slot > 0 {
                cursor += gap(layer[slot - 1], v);
            }
            cross[v] = cursor;
        }
    }

    for round in 0..PLACEMENT_ROUNDS {
        let visit: Vec<usize> = if round % 2 == 0 {
            (0..layers.len()).collect()
        } else {
            (0..layers.len()).rev().collect()
        };
        for rank in visit {
            let layer = &layers[rank];
            if layer.is_empty() {
                continue;
            }
            let desired: Vec<f64> = layer
                .iter()
                .map(|&v| {
                    let adjacent: Vec<usize> =
                        graph.up[v].iter().chain(&graph.down[v]).copied().collect();
                    if adjacent.is_empty() {
                        cross[v]
                    } else {
                        adjacent.iter().map(|&u| cross[u]).sum::<f64>() / adjacent.len() as f64
                    }
                })
                .collect();

            let mut left = desired.clone();
            for slot in 1..layer.len() {
                left[slot] = left[slot].max(left[slot - 1] + gap(layer[slot - 1], layer[slot]));
            }
            let mut right = desired;
            for slot in (0..layer.len() - 1).rev() {
                right[slot] = right[slot].min(right[slot + 1] - gap(layer[slot], layer[slot + 1]));
            }
            for (slot, &v) in layer.iter().enumerate() {
                cross[v] = (left[slot] + right[slot]) / 2.0;
            }
        }
    }

    let min_edge = graph
        .vertices
        .iter()
        .enumerate()
        .map(|(v, vertex)| cross[v] - vertex.cross / 2.0)
        .fold(f64::INFINITY, f64::min);
    if min_edge.is_finite() {
        for value in &mut cross {
            *value -= min_edge;
        }
    }
    cross
}

/// Main-axis centers: each rank is as thick as its thickest vertex and ranks
/// are separated by `rank_sep`.
fn assign_main(graph: &ProperGraph, layers: &[Vec<usize>], rank_sep: f64) -> Vec<f64> {
    let mut main = vec![0.0; graph.vertices.len()];
    let mut start = 0.0;
    for layer in layers {
        let thickness = layer.iter().map(|&v| graph.vertices[v].main).fold(0.0, f64::max);
        for &v in layer {
            main[v] = start + thickness / 2.0;
        }
        start += thickness + rank_sep;
    }
    main
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::layout::RankDir;

    fn boxes(ids: &[&str]) -> Vec<LayoutNode> {
        ids.iter().map(|id| LayoutNode::new(*id, 100.0, 50.0)).collect()
    }

    fn edge(source: &str, target: &str) -> LayoutEdge {
        LayoutEdge::new(format!("e-{source}-{target}"), source, target)
    }

    #[test]
    fn test_chain_advances_along_x() {
        let nodes = boxes(&["a", "b", "c"]);
        let edges = vec![edge("a", "b"), edge("b", "c")];
        let layout = LayeredLayout::new().layout(&nodes, &edges, &LayoutOptions::default());

        let a = layout.center("a").unwrap();
        let b = layout.center("b").unwrap();
        let c = layout.center("c").unwrap();
        assert_eq!(a.x, 50.0);
        assert_eq!(b.x, 50.0 + 100.0 + 150.0);
        assert_eq!(c.x, b.x + 250.0);
        assert_eq!(a.y, b.y);
        assert_eq!(b.y, c.y);
    }

    #[test]
    fn test_top_bottom_swaps_axes() {
        let nodes = boxes(&["a", "b"]);
        let options = LayoutOptions::new(RankDir::TopBottom, 60.0, 150.0);
        let layout = LayeredLayout::new().layout(&nodes, &[edge("a", "b")], &options);

        let a = layout.center("a").unwrap();
        let b = layout.center("b").unwrap();
        assert_eq!(a.y, 25.0);
        assert_eq!(b.y, 25.0 + 50.0 + 150.0);
        assert_eq!(a.x, b.x);
    }

    #[test]
    fn test_nodes_in_one_rank_do_not_overlap() {
        let nodes = boxes(&["s1", "s2", "s3", "sink"]);
        let edges = vec![edge("s1", "sink"), edge("s2", "sink"), edge("s3", "sink")];
        let layout = LayeredLayout::new().layout(&nodes, &edges, &LayoutOptions::default());

        let mut ys: Vec<f64> =
            ["s1", "s2", "s3"].iter().map(|id| layout.center(id).unwrap().y).collect();
        ys.sort_by(f64::total_cmp);
        for pair in ys.windows(2) {
            assert!(pair[1] - pair[0] >= 50.0 + 60.0 - 1e-9);
        }
        let sink = layout.center("sink").unwrap();
        assert!((sink.y - ys[1]).abs() < 1e-9);
    }

    #[test]
    fn test_sources_sit_next_to_their_successor() {
        // `late` only feeds `d`, so it belongs one rank before `d`, not at rank 0.
        let nodes = boxes(&["a", "b", "c", "d", "late"]);
        let edges = vec![edge("a", "b"), edge("b", "c"), edge("c", "d"), edge("late", "d")];
        let layout = LayeredLayout::new().layout(&nodes, &edges, &LayoutOptions::default());
        assert_eq!(layout.center("late").unwrap().x, layout.center("c").unwrap().x);
    }

    #[test]
    fn test_long_edges_get_waypoints() {
        let nodes = boxes(&["a", "b", "c"]);
        let edges = vec![edge("a", "b"), edge("b", "c"), edge("a", "c")];
        let layout = LayeredLayout::new().layout(&nodes, &edges, &LayoutOptions::default());

        let points = &layout.waypoints["e-a-c"];
        assert_eq!(points.len(), 1);
        assert_eq!(points[0].x, layout.center("b").unwrap().x);
        assert!(!layout.waypoints.contains_key("e-a-b"));
    }

    #[test]
    fn test_cycles_are_laid_out() {
        let nodes = boxes(&["a", "b", "c"]);
        let edges = vec![edge("a", "b"), edge("b", "c"), edge("c", "a")];
        let layout = LayeredLayout::new().layout(&nodes, &edges, &LayoutOptions::default());
        assert_eq!(layout.centers.len(), 3);
        assert!(layout.center("a").unwrap().x < layout.center("c").unwrap().x);
    }

    #[test]
    fn test_layout_is_deterministic() {
        let nodes = boxes(&["a", "b", "c", "d", "e", "f"]);
        let edges = vec![
            edge("a", "d"),
            edge("b", "d"),
            edge("c", "e"),
            edge("a", "e"),
            edge("d", "f"),
            edge("e", "f"),
            edge("b", "f"),
        ];
        let first = LayeredLayout::new().layout(&nodes, &edges, &LayoutOptions::default());
        let second = LayeredLayout::new().layout(&nodes, &edges, &LayoutOptions::default());
        assert_eq!(first, second);
    }

    #[test]
    fn test_sweeps_remove_avoidable_crossings() {
        // a->d and b->c cross in the initial order a,b / c,d.
        let nodes = boxes(&["a", "b", "c", "d"]);
        let edges = vec![edge("a", "d"), edge("b", "c")];
        let layout = LayeredLayout::new().layout(&nodes, &edges, &LayoutOptions::default());
        let order = |first: &str, second: &str| {
            layout.center(first).unwrap().y < layout.center(second).unwrap().y
        };
        assert_eq!(order("a", "b"), order("d", "c"));
    }

    #[test]
    fn test_inversions() {
        assert_eq!(inversions([0, 1, 2].into_iter(), 3), 0);
        assert_eq!(inversions([2, 1, 0].into_iter(), 3), 3);
        assert_eq!(inversions([1, 0, 1].into_iter(), 2), 1);
    }

    #[test]
    fn test_empty_input() {
        let layout = LayeredLayout::new().layout(&[], &[], &LayoutOptions::default());
        assert!(layout.centers.is_empty());
    }
}
