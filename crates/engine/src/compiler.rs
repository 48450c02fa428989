//! Picks the richest representation a query offers and builds its graph.

use crate::config::GraphConfig;
use crate::fallback::{FallbackGraphBuilder, TreeNode};
use crate::graph::{QueryFacts, RenderGraph};
use crate::layout::LayeredLayout;
use crate::plan::{PlanGraphBuilder, PlanInput};
use crate::text_plan::parse_text_plan;
use planscope_common::{Database, Error, Result, QueryTree};
use tracing::{debug, info};

/// Compiles `tree` into a positioned graph.
///
/// Tries, in order: the JSON plan, the fragment list (taken from the query or
/// parsed from an event's text plan), the operator tree and the event
/// timeline. Fails with [`Error::NoVisualizationData`] when none of them
/// yields anything to draw.
pub fn compile(tree: &QueryTree, databases: &[Database], config: &GraphConfig) -> Result<RenderGraph> {
    if let Some(json_plan) = tree.find_json_plan() {
        let layout = LayeredLayout::new();
        let input = PlanInput::from_tree(tree, json_plan, databases);
        let graph = PlanGraphBuilder::new(config, &layout).build(&input);
        if !graph.is_empty() {
            debug!(query_id = %tree.query_id, "Compiled graph from JSON plan");
            return Ok(graph);
        }
        info!(query_id = %tree.query_id, "JSON plan produced no graph, falling back");
    }

    let fallback = FallbackGraphBuilder::new(config);
    let facts = QueryFacts::from_tree(tree);

    if !tree.fragments.is_empty() {
        debug!(query_id = %tree.query_id, fragments = tree.fragments.len(), "Compiling fragment list");
        return Ok(fallback.from_fragments(&tree.fragments, databases, &facts));
    }

    if let Some(text) = tree.find_text_plan() {
        let fragments = parse_text_plan(text);
        if !fragments.is_empty() {
            debug!(query_id = %tree.query_id, fragments = fragments.len(), "Compiling text plan fragments");
            return Ok(fallback.from_fragments(&fragments, databases, &facts));
        }
    }

    if let Some(root) = tree.root.as_ref().filter(|_| tree.has_operator_tree()) {
        debug!(query_id = %tree.query_id, "Compiling operator tree");
        return Ok(fallback.from_tree(&[TreeNode::from_query_node(root)], databases));
    }

    if !tree.events.is_empty() {
        debug!(query_id = %tree.query_id, events = tree.events.len(), "Compiling event timeline");
        return Ok(fallback.from_tree(&TreeNode::timeline(tree), databases));
    }

    Err(Error::NoVisualizationData)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::graph::{EdgeKind, NodeKind, OUTPUT_NODE_ID};
    use planscope_common::{JsonPlan, PlanFragment, QueryEvent, QueryTreeNode};
    use pretty_assertions::assert_eq;

    fn event(event_type: &str) -> QueryEvent {
        QueryEvent { event_type: event_type.to_string(), state: "FINISHED".to_string(), ..Default::default() }
    }

    #[test]
    fn test_nothing_to_draw() {
        let tree = QueryTree { query_id: "q1".to_string(), ..Default::default() };
        let err = compile(&tree, &[], &GraphConfig::default()).unwrap_err();
        assert!(matches!(err, Error::NoVisualizationData));
    }

    #[test]
    fn test_json_plan_on_event_is_used() {
        let mut completed = event("QueryCompleted");
        completed.json_plan = Some(JsonPlan::Text(r#"{"0": {"id": "1", "name": "Output"}}"#.to_string()));
        let tree = QueryTree { query_id: "q1".to_string(), events: vec![completed], ..Default::default() };

        let graph = compile(&tree, &[], &GraphConfig::default()).unwrap();

        let ids: Vec<&str> = graph.nodes.iter().map(|node| node.id.as_str()).collect();
        assert_eq!(ids, vec!["fragment_0", OUTPUT_NODE_ID]);
    }

    #[test]
    fn test_broken_plan_falls_back_to_fragments() {
        let tree = QueryTree {
            query_id: "q1".to_string(),
            json_plan: Some(JsonPlan::Text("not valid json{".to_string())),
            fragments: vec![PlanFragment::new(1), PlanFragment::new(0)],
            ..Default::default()
        };

        let graph = compile(&tree, &[], &GraphConfig::default()).unwrap();

        assert_eq!(graph.nodes_of_kind(NodeKind::Fragment).count(), 2);
        assert_eq!(graph.edges_of_kind(EdgeKind::DataFlow).count(), 1);
    }

    #[test]
    fn test_text_plan_fragments() {
        let mut created = event("QueryCompleted");
        created.plan = Some(
            "Fragment 0 [SINGLE]\n    Output[columnNames = [x]]\n    └─ RemoteSource[sourceFragmentIds = [1]]\n\
             Fragment 1 [SOURCE]\n    TableScan[table = tpch:tiny:nation]\n"
                .to_string(),
        );
        let tree = QueryTree { query_id: "q1".to_string(), events: vec![created], ..Default::default() };

        let graph = compile(&tree, &[], &GraphConfig::default()).unwrap();

        let edges: Vec<&str> = graph.edges.iter().map(|edge| edge.id.as_str()).collect();
        assert_eq!(edges, vec!["e-fragment_1-fragment_0", "e-fragment_0-output_node"]);
    }

    #[test]
    fn test_operator_tree_before_timeline() {
        let tree = QueryTree {
            query_id: "q1".to_string(),
            root: Some(QueryTreeNode {
                id: "root".to_string(),
                children: vec![QueryTreeNode { id: "scan".to_string(), ..Default::default() }],
                ..Default::default()
            }),
            events: vec![event("QueryCreated")],
            ..Default::default()
        };

        let graph = compile(&tree, &[], &GraphConfig::default()).unwrap();

        let ids: Vec<&str> = graph.nodes.iter().map(|node| node.id.as_str()).collect();
        assert_eq!(ids, vec!["root", "scan"]);
    }

    #[test]
    fn test_childless_root_uses_timeline() {
        let tree = QueryTree {
            query_id: "q1".to_string(),
            root: Some(QueryTreeNode { id: "root".to_string(), ..Default::default() }),
            events: vec![event("QueryCreated"), event("QueryCompleted")],
            ..Default::default()
        };

        let graph = compile(&tree, &[], &GraphConfig::default()).unwrap();

        let edges: Vec<&str> = graph.edges.iter().map(|edge| edge.id.as_str()).collect();
        assert_eq!(edges, vec!["q1-event-0__next__q1-event-1"]);
    }
}
