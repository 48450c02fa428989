//! Graph construction from a JSON execution plan.
//!
//! Topology comes from the plan: one node per fragment, one edge per
//! `RemoteSource`/`RemoteMerge` reference. Metrics come from the fragment
//! records, joined on the fragment ID. Databases feed every source fragment
//! and a synthesized Output node closes the graph after the terminal fragment.

use crate::config::GraphConfig;
use crate::dependency::{decode_plan, DependencyGraph};
use crate::graph::{
    database_node_id, fragment_node_id, unique_databases, EdgeKind, FragmentView, NodeKind,
    NodePayload, OutputView, QueryFacts, RenderEdge, RenderGraph, RenderNode, OUTPUT_NODE_ID,
};
use crate::layout::{LayoutEdge, LayoutEngine, LayoutNode};
use planscope_common::{Database, FragmentId, JsonPlan, PlanFragment, QueryTree};
use std::collections::{BTreeSet, HashMap};
use tracing::{debug, warn};

/// Everything one plan build needs.
#[derive(Debug, Clone)]
pub struct PlanInput<'a> {
    pub json_plan: &'a JsonPlan,
    pub fragments: &'a [PlanFragment],
    pub databases: &'a [Database],
    pub facts: QueryFacts,
}

impl<'a> PlanInput<'a> {
    pub fn new(
        json_plan: &'a JsonPlan,
        fragments: &'a [PlanFragment],
        databases: &'a [Database],
        facts: QueryFacts,
    ) -> Self {
        Self { json_plan, fragments, databases, facts }
    }

    pub fn from_tree(tree: &'a QueryTree, json_plan: &'a JsonPlan, databases: &'a [Database]) -> Self {
        Self::new(json_plan, &tree.fragments, databases, QueryFacts::from_tree(tree))
    }

    pub fn state(&self) -> &str {
        &self.facts.state
    }
}

pub struct PlanGraphBuilder<'a> {
    config: &'a GraphConfig,
    layout: &'a dyn LayoutEngine,
}

impl<'a> PlanGraphBuilder<'a> {
    pub fn new(config: &'a GraphConfig, layout: &'a dyn LayoutEngine) -> Self {
        Self { config, layout }
    }

    /// Builds the plan graph. An undecodable or empty plan yields
    /// [`RenderGraph::empty`] so the caller can fall back to another view.
    pub fn build(&self, input: &PlanInput<'_>) -> RenderGraph {
        let plan = match decode_plan(input.json_plan) {
            Ok(plan) => plan,
            Err(err) => {
                warn!(error = %err, "Discarding JSON plan that could not be decoded");
                return RenderGraph::empty();
            }
        };
        if plan.is_empty() {
            debug!("JSON plan has no fragments");
            return RenderGraph::empty();
        }
        let dependencies = DependencyGraph::from_plan(&plan);
        self.assemble(&dependencies, input)
    }

    fn assemble(&self, dependencies: &DependencyGraph, input: &PlanInput<'_>) -> RenderGraph {
        let config = self.config;
        let options = &config.plan_layout;
        let records = index_records(input.fragments);
        let sources: BTreeSet<FragmentId> = dependencies.sources().into_iter().collect();
        let databases = unique_databases(input.databases);

        for id in records.keys().filter(|id| !dependencies.contains(**id)) {
            debug!(fragment = id, "Fragment record has no plan entry, not drawn");
        }

        let mut feeds = Vec::new();
        for database in &databases {
            let db_node = database_node_id(database);
            for &source in &sources {
                feeds.push(RenderEdge::new(&db_node, fragment_node_id(source), EdgeKind::DatabaseFeed));
            }
        }
        let running = input.facts.is_running();
        let flows: Vec<RenderEdge> = dependencies
            .edges()
            .into_iter()
            .map(|(upstream, downstream)| {
                RenderEdge::new(
                    fragment_node_id(upstream),
                    fragment_node_id(downstream),
                    EdgeKind::DataFlow,
                )
                .animated(running)
            })
            .collect();

        let layout_nodes: Vec<LayoutNode> = databases
            .iter()
            .map(|db| LayoutNode::new(database_node_id(db), config.database.width, config.database.height))
            .chain(dependencies.fragments().map(|id| {
                LayoutNode::new(fragment_node_id(id), config.fragment.width, config.fragment.height)
            }))
            .collect();
        let layout_edges: Vec<LayoutEdge> = feeds
            .iter()
            .chain(&flows)
            .map(|edge| LayoutEdge::new(&edge.id, &edge.source, &edge.target))
            .collect();
        let layout = self.layout.layout(&layout_nodes, &layout_edges, options);

        let mut nodes = Vec::with_capacity(layout_nodes.len() + 1);
        for database in &databases {
            let id = database_node_id(database);
            let center = layout.center(&id).unwrap_or_default();
            let payload = NodePayload::Database((*database).clone());
            nodes.push(RenderNode::centered(id, NodeKind::Database, center, config.database, payload));
        }
        for id in dependencies.fragments() {
            let node_id = fragment_node_id(id);
            let center = layout.center(&node_id).unwrap_or_default();
            let view = FragmentView::new(id, records.get(&id).copied(), sources.contains(&id));
            nodes.push(RenderNode::centered(
                node_id,
                NodeKind::Fragment,
                center,
                config.fragment,
                NodePayload::Fragment(view),
            ));
        }

        let mut edges: Vec<RenderEdge> = feeds.into_iter().chain(flows).collect();
        for edge in &mut edges {
            edge.waypoints = layout.waypoints.get(&edge.id).cloned();
        }

        if let Some(terminal) = terminal_fragment(dependencies) {
            let terminal_node = fragment_node_id(terminal);
            let (main, cross) = options.split(layout.center(&terminal_node).unwrap_or_default());
            let (terminal_extent, _) = options.main_and_cross(config.fragment.width, config.fragment.height);
            let center = options.point(main + terminal_extent / 2.0 + config.output_gap, cross);
            let view = OutputView::new(&input.facts, records.get(&terminal).copied());
            nodes.push(RenderNode::centered(
                OUTPUT_NODE_ID,
                NodeKind::Output,
                center,
                config.output,
                NodePayload::Output(view),
            ));
            edges.push(RenderEdge::new(terminal_node, OUTPUT_NODE_ID, EdgeKind::Output));
        }

        debug!(
            fragments = dependencies.len(),
            sources = sources.len(),
            databases = databases.len(),
            edges = edges.len(),
            "Built plan graph"
        );
        RenderGraph { nodes, edges }
    }
}

/// Fragment records by ID; the first record of a repeated ID wins.
fn index_records(fragments: &[PlanFragment]) -> HashMap<FragmentId, &PlanFragment> {
    let mut records = HashMap::with_capacity(fragments.len());
    for fragment in fragments {
        records.entry(fragment.fragment_id).or_insert(fragment);
    }
    records
}

/// The fragment feeding the Output node: sink `0` when present, else the
/// lowest sink. Plans whose fragments all sit on a cycle have no sink and
/// fall back to fragment `0` or the lowest ID.
fn terminal_fragment(dependencies: &DependencyGraph) -> Option<FragmentId> {
    let sinks = dependencies.sinks();
    if sinks.contains(&0) {
        return Some(0);
    }
    if let Some(&first) = sinks.first() {
        return Some(first);
    }
    if dependencies.contains(0) {
        return Some(0);
    }
    dependencies.fragments().next()
}
