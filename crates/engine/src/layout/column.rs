//! Two-column heuristic layout for flat fragment lists.

use super::{
    index_nodes, resolve_edges, IndexedGraph, Layout, LayoutEdge, LayoutEngine, LayoutNode,
    LayoutOptions,
};

/// Stacks every node without incoming edges in one column and lines the rest
/// up in a single chain after it, ordered by rank and then insertion order.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ColumnLayout;

impl ColumnLayout {
    pub fn new() -> Self {
        Self
    }
}

impl LayoutEngine for ColumnLayout {
    fn layout(&self, nodes: &[LayoutNode], edges: &[LayoutEdge], options: &LayoutOptions) -> Layout {
        let mut layout = Layout::default();
        if nodes.is_empty() {
            return layout;
        }
        let index = index_nodes(nodes);
        let resolved = resolve_edges(&index, edges);
        let graph = IndexedGraph::new(nodes.len(), resolved.iter().map(|&(_, s, t)| (s, t)));
        let ranks = graph.longest_path_ranks();

        let mut column: Vec<usize> =
            (0..nodes.len()).filter(|&n| graph.predecessors[n].is_empty()).collect();
        if column.is_empty() {
            column.push(0);
        }
        let mut chain: Vec<usize> = (0..nodes.len()).filter(|n| !column.contains(n)).collect();
        chain.sort_by_key(|&n| (ranks[n], n));

        let extents: Vec<(f64, f64)> =
            nodes.iter().map(|node| options.main_and_cross(node.width, node.height)).collect();

        let thickness = column.iter().map(|&n| extents[n].0).fold(0.0, f64::max);
        let column_main = thickness / 2.0;
        let mut cursor = 0.0;
        let mut positions = vec![None; nodes.len()];
        for (slot, &n) in column.iter().enumerate() {
            if slot > 0 {
                cursor += options.node_sep;
            }
            positions[n] = Some(options.point(column_main, cursor + extents[n].1 / 2.0));
            cursor += extents[n].1;
        }
        let column_mid = cursor / 2.0;

        let mut previous_main = column_main;
        let mut previous_half = thickness / 2.0;
        for &n in &chain {
            let half = extents[n].0 / 2.0;
            let main = previous_main + previous_half + options.rank_sep + half;
            positions[n] = Some(options.point(main, column_mid));
            previous_main = main;
            previous_half = half;
        }

        for (node, position) in nodes.iter().zip(positions) {
            if let Some(center) = position {
                layout.centers.entry(node.id.clone()).or_insert(center);
            }
        }
        layout
    }
}
