//! Graphs for queries without a JSON plan.
//!
//! A flat fragment list becomes a source column feeding a chain of the
//! remaining fragments. A parent/child operator tree or an event timeline is
//! drawn with the layered layout. Databases sit in a fixed column outside the
//! layout in both modes.

use crate::classify::classify_sources;
use crate::config::GraphConfig;
use crate::graph::{
    database_node_id, fragment_node_id, unique_databases, EdgeKind, FragmentView, Metric,
    NodeKind, NodePayload, OutputView, QueryFacts, QueryNodeView, RenderEdge, RenderGraph,
    RenderNode, OUTPUT_NODE_ID,
};
use crate::layout::{ColumnLayout, LayeredLayout, LayoutEdge, LayoutEngine, LayoutNode};
use planscope_common::format::format_megabytes;
use planscope_common::{Database, PlanFragment, QueryStatus, QueryTree, QueryTreeNode};
use std::collections::HashSet;
use tracing::debug;

/// Node of a tree or timeline view.
#[derive(Debug, Clone, PartialEq)]
pub struct TreeNode {
    pub view: QueryNodeView,
    pub children: Vec<TreeNode>,
    /// ID of the node that follows this one in a sequence.
    pub next: Option<String>,
}

impl TreeNode {
    pub fn new(view: QueryNodeView) -> Self {
        Self { view, children: Vec::new(), next: None }
    }

    pub fn id(&self) -> &str {
        &self.view.id
    }

    /// Converts the service's operator tree, keeping its shape.
    pub fn from_query_node(node: &QueryTreeNode) -> Self {
        let stage = node.node_type.as_deref().or(node.operator_type.as_deref()).unwrap_or("Query Stage");
        let title = node.operator_type.as_deref().or(node.node_type.as_deref()).unwrap_or("Query Node");
        let mut view = QueryNodeView::new(&node.id, stage, title);
        view.connector = node.source_system.clone();
        view.status = QueryStatus::from_state(&node.state);
        view.duration_ms = positive(node.execution_time).or(positive(node.wall_time));
        view.rows = node.output_rows.filter(|r| *r > 0).or(node.input_rows);
        view.push_count("Input Rows", node.input_rows);
        view.push_count("Output Rows", node.output_rows);
        if let Some(memory) = node.memory_bytes.filter(|m| *m > 0) {
            view.metrics.push(Metric::new("Memory", format_megabytes(memory)));
        }

        Self {
            view,
            children: node.children.iter().map(TreeNode::from_query_node).collect(),
            next: None,
        }
    }

    /// One node per event, each linked to the event after it.
    pub fn timeline(tree: &QueryTree) -> Vec<TreeNode> {
        let count = tree.events.len();
        tree.events
            .iter()
            .enumerate()
            .map(|(i, event)| {
                let id = event_node_id(&tree.query_id, i);
                let title = format!("{} - {}", event.event_type, event.state);
                let mut view = QueryNodeView::new(id, &event.event_type, title);
                view.connector = event.catalog.clone().or_else(|| event.source.clone());
                view.status = QueryStatus::from_state(&event.state);
                view.duration_ms = positive(event.cpu_time_ms).or(positive(event.wall_time_ms));
                view.rows = event.total_rows;
                view.timestamp = event.timestamp.clone();

                view.metrics.push(Metric::new("Event Type", &event.event_type));
                view.metrics.push(Metric::new("State", &event.state));
                view.metrics.push(Metric::new("User", &event.user));
                for (label, value) in [
                    ("CPU Time", event.cpu_time_ms),
                    ("Wall Time", event.wall_time_ms),
                    ("Queued Time", event.queued_time_ms),
                ] {
                    if let Some(ms) = positive(value) {
                        view.metrics.push(Metric::new(label, format!("{ms} ms")));
                    }
                }
                view.push_count("Total Rows", event.total_rows);
                for (label, value) in
                    [("Total Bytes", event.total_bytes), ("Peak Memory", event.peak_memory_bytes)]
                {
                    if let Some(bytes) = value.filter(|b| *b > 0) {
                        view.metrics.push(Metric::new(label, format_megabytes(bytes)));
                    }
                }
                view.push_count("Completed Splits", event.completed_splits);

                TreeNode {
                    view,
                    children: Vec::new(),
                    next: (i + 1 < count).then(|| event_node_id(&tree.query_id, i + 1)),
                }
            })
            .collect()
    }
}

fn event_node_id(query_id: &str, index: usize) -> String {
    format!("{query_id}-event-{index}")
}

fn positive(value: Option<f64>) -> Option<f64> {
    value.filter(|v| *v > 0.0)
}

pub struct FallbackGraphBuilder<'a> {
    config: &'a GraphConfig,
    list_layout: Box<dyn LayoutEngine + 'a>,
    tree_layout: Box<dyn LayoutEngine + 'a>,
}

impl<'a> FallbackGraphBuilder<'a> {
    pub fn new(config: &'a GraphConfig) -> Self {
        Self::with_layouts(config, ColumnLayout::new(), LayeredLayout::new())
    }

    pub fn with_layouts(
        config: &'a GraphConfig,
        list_layout: impl LayoutEngine + 'a,
        tree_layout: impl LayoutEngine + 'a,
    ) -> Self {
        Self { config, list_layout: Box::new(list_layout), tree_layout: Box::new(tree_layout) }
    }

    /// Draws a flat fragment list: sources in one column, the remaining
    /// fragments chained by descending ID, then the Output node.
    pub fn from_fragments(
        &self,
        fragments: &[PlanFragment],
        databases: &[Database],
        facts: &QueryFacts,
    ) -> RenderGraph {
        let mut ordered: Vec<&PlanFragment> = fragments.iter().collect();
        ordered.sort_by(|a, b| b.fragment_id.cmp(&a.fragment_id));
        ordered.dedup_by_key(|fragment| fragment.fragment_id);
        if ordered.is_empty() {
            return RenderGraph::empty();
        }

        let config = self.config;
        let owned: Vec<PlanFragment> = ordered.iter().map(|f| (*f).clone()).collect();
        let sources = classify_sources(&owned);
        let (source_list, chain): (Vec<&PlanFragment>, Vec<&PlanFragment>) =
            ordered.iter().copied().partition(|f| sources.contains(&f.fragment_id));
        let running = facts.is_running();

        let mut flows = Vec::new();
        if let Some(first) = chain.first() {
            for source in &source_list {
                flows.push(self.flow(source, first, running));
            }
        }
        for pair in chain.windows(2) {
            flows.push(self.flow(pair[0], pair[1], running));
        }
        let last_stage: Vec<&PlanFragment> = match chain.last() {
            Some(last) => vec![*last],
            None => source_list.clone(),
        };
        let outputs: Vec<RenderEdge> = last_stage
            .iter()
            .map(|f| RenderEdge::new(fragment_node_id(f.fragment_id), OUTPUT_NODE_ID, EdgeKind::Output))
            .collect();

        let mut layout_nodes: Vec<LayoutNode> = ordered
            .iter()
            .map(|f| {
                LayoutNode::new(fragment_node_id(f.fragment_id), config.fragment.width, config.fragment.height)
            })
            .collect();
        layout_nodes.push(LayoutNode::new(OUTPUT_NODE_ID, config.output.width, config.output.height));
        let layout_edges: Vec<LayoutEdge> = flows
            .iter()
            .chain(&outputs)
            .map(|edge| LayoutEdge::new(&edge.id, &edge.source, &edge.target))
            .collect();
        let layout = self.list_layout.layout(&layout_nodes, &layout_edges, &config.fragment_layout);

        let databases = unique_databases(databases);
        let mut nodes = self.database_nodes(&databases);
        for fragment in &ordered {
            let id = fragment_node_id(fragment.fragment_id);
            let center = layout.center(&id).unwrap_or_default();
            let view = FragmentView::new(
                fragment.fragment_id,
                Some(*fragment),
                sources.contains(&fragment.fragment_id),
            );
            nodes.push(RenderNode::centered(
                id,
                NodeKind::Fragment,
                center,
                config.fragment,
                NodePayload::Fragment(view),
            ));
        }
        let terminal = ordered.iter().copied().min_by_key(|f| f.fragment_id);
        let center = layout.center(OUTPUT_NODE_ID).unwrap_or_default();
        nodes.push(RenderNode::centered(
            OUTPUT_NODE_ID,
            NodeKind::Output,
            center,
            config.output,
            NodePayload::Output(OutputView::new(facts, terminal)),
        ));

        let mut edges = Vec::new();
        for database in &databases {
            let db_node = database_node_id(database);
            for source in &source_list {
                edges.push(RenderEdge::new(
                    &db_node,
                    fragment_node_id(source.fragment_id),
                    EdgeKind::DatabaseFeed,
                ));
            }
        }
        edges.extend(flows);
        edges.extend(outputs);

        debug!(
            fragments = ordered.len(),
            sources = source_list.len(),
            edges = edges.len(),
            "Built fragment list graph"
        );
        RenderGraph { nodes, edges }
    }

    /// Draws tree or timeline nodes with child and sequence edges. Databases
    /// feed every node that nothing else points at.
    pub fn from_tree(&self, roots: &[TreeNode], databases: &[Database]) -> RenderGraph {
        let flat = flatten(roots);
        if flat.is_empty() {
            return RenderGraph::empty();
        }
        let config = self.config;
        let known: HashSet<&str> = flat.iter().map(|node| node.id()).collect();

        let mut structure = Vec::new();
        let mut seen_edges = HashSet::new();
        let mut targets = HashSet::new();
        for node in &flat {
            let links = node
                .children
                .iter()
                .map(|child| (child.id(), EdgeKind::Child))
                .chain(node.next.as_deref().map(|next| (next, EdgeKind::Next)));
            for (target, kind) in links {
                targets.insert(target);
                if target == node.id() || !known.contains(target) {
                    continue;
                }
                let edge = RenderEdge::new(node.id(), target, kind);
                if seen_edges.insert(edge.id.clone()) {
                    structure.push(edge);
                }
            }
        }

        let mut first_nodes: Vec<&TreeNode> =
            flat.iter().copied().filter(|node| !targets.contains(node.id())).collect();
        if first_nodes.is_empty() {
            first_nodes.push(flat[0]);
        }

        let layout_nodes: Vec<LayoutNode> = flat
            .iter()
            .map(|node| LayoutNode::new(node.id(), config.query.width, config.query.height))
            .collect();
        let layout_edges: Vec<LayoutEdge> = structure
            .iter()
            .map(|edge| LayoutEdge::new(&edge.id, &edge.source, &edge.target))
            .collect();
        let layout = self.tree_layout.layout(&layout_nodes, &layout_edges, &config.tree_layout);

        let databases = unique_databases(databases);
        let mut nodes = self.database_nodes(&databases);
        for node in &flat {
            let center = layout.center(node.id()).unwrap_or_default();
            nodes.push(RenderNode::centered(
                node.id(),
                NodeKind::Query,
                center,
                config.query,
                NodePayload::Query(node.view.clone()),
            ));
        }

        let mut edges = Vec::new();
        for database in &databases {
            let db_node = database_node_id(database);
            for first in &first_nodes {
                edges.push(RenderEdge::new(&db_node, first.id(), EdgeKind::DatabaseFeed));
            }
        }
        for mut edge in structure {
            edge.waypoints = layout.waypoints.get(&edge.id).cloned();
            edges.push(edge);
        }

        debug!(nodes = flat.len(), roots = first_nodes.len(), edges = edges.len(), "Built tree graph");
        RenderGraph { nodes, edges }
    }

    fn flow(&self, from: &PlanFragment, to: &PlanFragment, running: bool) -> RenderEdge {
        RenderEdge::new(fragment_node_id(from.fragment_id), fragment_node_id(to.fragment_id), EdgeKind::DataFlow)
            .animated(running)
    }

    fn database_nodes(&self, databases: &[&Database]) -> Vec<RenderNode> {
        databases
            .iter()
            .enumerate()
            .map(|(i, database)| {
                RenderNode::at(
                    database_node_id(database),
                    NodeKind::Database,
                    self.config.database_column.position(i),
                    self.config.database,
                    NodePayload::Database((*database).clone()),
                )
            })
            .collect()
    }
}

/// Depth-first pre-order, first occurrence of an ID wins.
fn flatten(roots: &[TreeNode]) -> Vec<&TreeNode> {
    let mut seen = HashSet::new();
    let mut flat = Vec::new();
    let mut stack: Vec<&TreeNode> = roots.iter().rev().collect();
    while let Some(node) = stack.pop() {
        if !seen.insert(node.id()) {
            continue;
        }
        flat.push(node);
        stack.extend(node.children.iter().rev());
    }
    flat
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::graph::{Anchor, Point};
    use planscope_common::{FragmentOperator, QueryEvent};
    use pretty_assertions::assert_eq;

    fn fragment(id: u32, partitioning: &str) -> PlanFragment {
        PlanFragment { partitioning_type: Some(partitioning.to_string()), ..PlanFragment::new(id) }
    }

    fn database(id: &str) -> Database {
        Database { id: id.to_string(), name: id.to_string(), db_type: "mysql".to_string(), ..Default::default() }
    }

    fn facts() -> QueryFacts {
        QueryFacts { query_id: "q1".to_string(), state: "FINISHED".to_string(), ..Default::default() }
    }

    fn edge_ids(graph: &RenderGraph) -> Vec<&str> {
        graph.edges.iter().map(|edge| edge.id.as_str()).collect()
    }

    fn view(id: &str) -> QueryNodeView {
        QueryNodeView::new(id, "Stage", "Title")
    }

    #[test]
    fn test_fragment_list_edges() {
        let config = GraphConfig::default();
        let fragments = vec![fragment(0, "SINGLE"), fragment(2, "SOURCE"), fragment(1, "HASH"), fragment(3, "SOURCE")];
        let graph = FallbackGraphBuilder::new(&config).from_fragments(&fragments, &[database("pg")], &facts());

        let ids: Vec<&str> = graph.nodes.iter().map(|node| node.id.as_str()).collect();
        assert_eq!(ids, vec!["db_pg", "fragment_3", "fragment_2", "fragment_1", "fragment_0", "output_node"]);
        assert_eq!(
            edge_ids(&graph),
            vec![
                "e-db_pg-fragment_3",
                "e-db_pg-fragment_2",
                "e-fragment_3-fragment_1",
                "e-fragment_2-fragment_1",
                "e-fragment_1-fragment_0",
                "e-fragment_0-output_node",
            ]
        );
    }

    #[test]
    fn test_fragment_list_positions() {
        let config = GraphConfig::default();
        let fragments = vec![fragment(2, "SOURCE"), fragment(1, "SOURCE"), fragment(0, "SINGLE")];
        let graph = FallbackGraphBuilder::new(&config).from_fragments(&fragments, &[database("pg")], &facts());

        assert_eq!(graph.node("db_pg").unwrap().position, Point::new(-600.0, 0.0));
        let s2 = graph.node("fragment_2").unwrap().center();
        let s1 = graph.node("fragment_1").unwrap().center();
        assert_eq!(s2.x, s1.x);
        assert!(s1.y > s2.y);
        let sink = graph.node("fragment_0").unwrap().center();
        assert_eq!(sink.y, (s1.y + s2.y) / 2.0);
        let output = graph.node(OUTPUT_NODE_ID).unwrap().center();
        assert!(output.x > sink.x);
        assert_eq!(output.y, sink.y);
    }

    #[test]
    fn test_all_sources_feed_output() {
        let config = GraphConfig::default();
        let fragments = vec![fragment(1, "SOURCE"), fragment(0, "SOURCE")];
        let graph = FallbackGraphBuilder::new(&config).from_fragments(&fragments, &[], &facts());
        assert_eq!(edge_ids(&graph), vec!["e-fragment_1-output_node", "e-fragment_0-output_node"]);
    }

    #[test]
    fn test_highest_id_is_source_without_signals() {
        let config = GraphConfig::default();
        let mut scan = fragment(1, "HASH");
        scan.operators.push(FragmentOperator::Text("RemoteSource[sourceFragmentIds = [2]]".to_string()));
        let fragments = vec![fragment(0, "SINGLE"), scan, fragment(2, "HASH")];
        let graph = FallbackGraphBuilder::new(&config).from_fragments(&fragments, &[], &facts());
        let NodePayload::Fragment(view) = &graph.node("fragment_2").unwrap().payload else {
            panic!("expected fragment payload");
        };
        assert!(view.is_source);
        assert_eq!(graph.edges[0].id, "e-fragment_2-fragment_1");
    }

    #[test]
    fn test_empty_fragment_list() {
        let config = GraphConfig::default();
        assert!(FallbackGraphBuilder::new(&config).from_fragments(&[], &[database("pg")], &facts()).is_empty());
    }

    #[test]
    fn test_tree_edges_and_first_nodes() {
        let config = GraphConfig::default();
        let mut root = TreeNode::new(view("root"));
        let mut scan = TreeNode::new(view("scan"));
        scan.children.push(TreeNode::new(view("scan")));
        root.children.push(scan);
        root.children.push(TreeNode::new(view("filter")));
        root.children[1].next = Some("root".to_string());

        let graph = FallbackGraphBuilder::new(&config).from_tree(&[root], &[database("pg")]);

        let ids: Vec<&str> = graph.nodes.iter().map(|node| node.id.as_str()).collect();
        assert_eq!(ids, vec!["db_pg", "root", "scan", "filter"]);
        assert_eq!(
            edge_ids(&graph),
            vec!["e-db_pg-root", "root__child__scan", "root__child__filter", "filter__next__root"]
        );
        let child = graph.edge("root__child__scan").unwrap();
        assert_eq!((child.source_anchor, child.target_anchor), (Anchor::OutBottom, Anchor::InTop));
        assert!(graph.nodes_of_kind(NodeKind::Query).all(|node| node.width == 300.0));
    }

    #[test]
    fn test_tree_without_first_node_uses_first() {
        let config = GraphConfig::default();
        let mut a = TreeNode::new(view("a"));
        a.next = Some("b".to_string());
        let mut b = TreeNode::new(view("b"));
        b.next = Some("a".to_string());
        let graph = FallbackGraphBuilder::new(&config).from_tree(&[a, b], &[database("pg")]);
        assert_eq!(edge_ids(&graph), vec!["e-db_pg-a", "a__next__b", "b__next__a"]);
    }

    #[test]
    fn test_timeline_nodes() {
        let tree = QueryTree {
            query_id: "q7".to_string(),
            events: vec![
                QueryEvent {
                    event_type: "QueryCreated".to_string(),
                    state: "QUEUED".to_string(),
                    user: "alice".to_string(),
                    source: Some("trino-cli".to_string()),
                    ..Default::default()
                },
                QueryEvent {
                    event_type: "QueryCompleted".to_string(),
                    state: "FINISHED".to_string(),
                    user: "alice".to_string(),
                    catalog: Some("tpch".to_string()),
                    cpu_time_ms: Some(0.0),
                    wall_time_ms: Some(420.0),
                    total_rows: Some(12345),
                    peak_memory_bytes: Some(2 * 1024 * 1024),
                    ..Default::default()
                },
            ],
            ..Default::default()
        };

        let nodes = TreeNode::timeline(&tree);

        assert_eq!(nodes.len(), 2);
        assert_eq!(nodes[0].id(), "q7-event-0");
        assert_eq!(nodes[0].next.as_deref(), Some("q7-event-1"));
        assert_eq!(nodes[1].next, None);
        assert_eq!(nodes[0].view.connector.as_deref(), Some("trino-cli"));
        assert_eq!(nodes[0].view.status, QueryStatus::Queued);

        let done = &nodes[1].view;
        assert_eq!(done.title, "QueryCompleted - FINISHED");
        assert_eq!(done.connector.as_deref(), Some("tpch"));
        assert_eq!(done.duration_ms, Some(420.0));
        assert_eq!(done.rows, Some(12345));
        let labels: Vec<(&str, &str)> =
            done.metrics.iter().map(|m| (m.label.as_str(), m.value.as_str())).collect();
        assert_eq!(
            labels,
            vec![
                ("Event Type", "QueryCompleted"),
                ("State", "FINISHED"),
                ("User", "alice"),
                ("Wall Time", "420 ms"),
                ("Total Rows", "12,345"),
                ("Peak Memory", "2.00 MB"),
            ]
        );
    }

    #[test]
    fn test_from_query_node_fallbacks() {
        let node = QueryTreeNode {
            id: "n1".to_string(),
            operator_type: Some("TableScan".to_string()),
            source_system: Some("postgresql".to_string()),
            state: "RUNNING".to_string(),
            wall_time: Some(15.0),
            input_rows: Some(10),
            children: vec![QueryTreeNode { id: "n2".to_string(), ..Default::default() }],
            ..Default::default()
        };

        let tree = TreeNode::from_query_node(&node);

        assert_eq!(tree.view.stage, "TableScan");
        assert_eq!(tree.view.title, "TableScan");
        assert_eq!(tree.view.status, QueryStatus::Ok);
        assert_eq!(tree.view.duration_ms, Some(15.0));
        assert_eq!(tree.view.rows, Some(10));
        assert_eq!(tree.children[0].view.stage, "Query Stage");
        assert_eq!(tree.children[0].view.title, "Query Node");
    }
}
