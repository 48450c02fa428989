//! The `{nodes, edges}` document handed to the rendering layer.

use crate::config::NodeSize;
use planscope_common::format::{format_bytes, format_count, format_time};
use planscope_common::{Database, FragmentId, PlanFragment, QueryStatus, QueryTree};
use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use tracing::warn;

/// Node ID of the synthesized Output node.
pub const OUTPUT_NODE_ID: &str = "output_node";

#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct Point {
    pub x: f64,
    pub y: f64,
}

impl Point {
    pub fn new(x: f64, y: f64) -> Self {
        Self { x, y }
    }
}

pub fn fragment_node_id(id: FragmentId) -> String {
    format!("fragment_{id}")
}

pub fn database_node_id(database: &Database) -> String {
    format!("db_{}", database.id)
}

/// Databases with distinct IDs, first occurrence wins.
pub(crate) fn unique_databases(databases: &[Database]) -> Vec<&Database> {
    let mut seen = HashSet::new();
    databases
        .iter()
        .filter(|database| {
            let fresh = seen.insert(database.id.as_str());
            if !fresh {
                warn!(database = %database.id, "Ignoring duplicate database");
            }
            fresh
        })
        .collect()
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum NodeKind {
    Database,
    Fragment,
    Output,
    Query,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(untagged)]
pub enum NodePayload {
    Database(Database),
    Fragment(FragmentView),
    Output(OutputView),
    Query(QueryNodeView),
}

/// A positioned node. `position` is the top-left corner.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct RenderNode {
    pub id: String,
    pub kind: NodeKind,
    pub position: Point,
    pub width: f64,
    pub height: f64,
    pub payload: NodePayload,
}

impl RenderNode {
    /// Builds a node from its layout center.
    pub fn centered(
        id: impl Into<String>,
        kind: NodeKind,
        center: Point,
        size: NodeSize,
        payload: NodePayload,
    ) -> Self {
        let position = Point::new(center.x - size.width / 2.0, center.y - size.height / 2.0);
        Self::at(id, kind, position, size, payload)
    }

    /// Builds a node from its top-left corner.
    pub fn at(
        id: impl Into<String>,
        kind: NodeKind,
        position: Point,
        size: NodeSize,
        payload: NodePayload,
    ) -> Self {
        Self { id: id.into(), kind, position, width: size.width, height: size.height, payload }
    }

    pub fn center(&self) -> Point {
        Point::new(self.position.x + self.width / 2.0, self.position.y + self.height / 2.0)
    }
}

/// Connection point on a node box.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub enum Anchor {
    In,
    Out,
    Right,
    InTop,
    OutBottom,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub enum EdgeKind {
    /// Fragment to fragment.
    DataFlow,
    /// Database to the node it feeds.
    DatabaseFeed,
    /// Into the Output node.
    Output,
    /// Parent to child in tree mode.
    Child,
    /// Timeline entry to its successor.
    Next,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct RenderEdge {
    pub id: String,
    pub source: String,
    pub target: String,
    pub source_anchor: Anchor,
    pub target_anchor: Anchor,
    pub kind: EdgeKind,
    pub animated: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub waypoints: Option<Vec<Point>>,
}

impl RenderEdge {
    pub fn new(source: impl Into<String>, target: impl Into<String>, kind: EdgeKind) -> Self {
        let source = source.into();
        let target = target.into();
        let (id, source_anchor, target_anchor) = match kind {
            EdgeKind::Child => {
                (format!("{source}__child__{target}"), Anchor::OutBottom, Anchor::InTop)
            }
            EdgeKind::Next => (format!("{source}__next__{target}"), Anchor::Out, Anchor::In),
            EdgeKind::DatabaseFeed => (format!("e-{source}-{target}"), Anchor::Right, Anchor::In),
            EdgeKind::DataFlow | EdgeKind::Output => {
                (format!("e-{source}-{target}"), Anchor::Out, Anchor::In)
            }
        };
        Self {
            id,
            source,
            target,
            source_anchor,
            target_anchor,
            kind,
            animated: false,
            waypoints: None,
        }
    }

    pub fn animated(mut self, animated: bool) -> Self {
        self.animated = animated;
        self
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct RenderGraph {
    pub nodes: Vec<RenderNode>,
    pub edges: Vec<RenderEdge>,
}

impl RenderGraph {
    /// The "no plan" signal of the plan builder.
    pub fn empty() -> Self {
        Self::default()
    }

    pub fn is_empty(&self) -> bool {
        self.nodes.is_empty() && self.edges.is_empty()
    }

    pub fn node(&self, id: &str) -> Option<&RenderNode> {
        self.nodes.iter().find(|node| node.id == id)
    }

    pub fn edge(&self, id: &str) -> Option<&RenderEdge> {
        self.edges.iter().find(|edge| edge.id == id)
    }

    pub fn nodes_of_kind(&self, kind: NodeKind) -> impl Iterator<Item = &RenderNode> {
        self.nodes.iter().filter(move |node| node.kind == kind)
    }

    pub fn edges_of_kind(&self, kind: EdgeKind) -> impl Iterator<Item = &RenderEdge> {
        self.edges.iter().filter(move |edge| edge.kind == kind)
    }
}

/// Fragment node payload: the fragment record with display placeholders
/// filled in.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct FragmentView {
    pub fragment: PlanFragment,
    pub is_source: bool,
    /// True when the plan names the fragment but no fragment record exists.
    pub is_placeholder: bool,
}

impl FragmentView {
    pub fn new(id: FragmentId, record: Option<&PlanFragment>, is_source: bool) -> Self {
        let mut fragment = record.cloned().unwrap_or_else(|| PlanFragment::new(id));
        fragment.fragment_id = id;
        if fragment.partitioning_type.as_deref().is_none_or(str::is_empty) {
            fragment.partitioning_type = Some("UNKNOWN".to_string());
        }
        if fragment.cpu_time.as_deref().is_none_or(str::is_empty) {
            fragment.cpu_time = Some(format_time(fragment.cpu_time_ms));
        }
        if fragment.peak_memory.as_deref().is_none_or(str::is_empty) {
            fragment.peak_memory = Some(format_bytes(fragment.peak_memory_bytes));
        }
        fragment.input_rows = Some(fragment.input_rows.unwrap_or(0));
        fragment.output_rows = Some(fragment.output_rows.unwrap_or(0));
        Self { fragment, is_source, is_placeholder: record.is_none() }
    }
}

/// Query-level facts shown on the Output node.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct QueryFacts {
    pub query_id: String,
    pub query: String,
    pub state: String,
    pub total_rows: Option<u64>,
    pub execution_time: Option<f64>,
}

impl QueryFacts {
    pub fn from_tree(tree: &QueryTree) -> Self {
        Self {
            query_id: if tree.query_id.is_empty() {
                "unknown".to_string()
            } else {
                tree.query_id.clone()
            },
            query: tree.query.clone(),
            state: tree.state.clone(),
            total_rows: tree.total_rows(),
            execution_time: tree.total_execution_time,
        }
    }

    pub fn is_running(&self) -> bool {
        self.state == "RUNNING"
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct OutputView {
    pub query_id: String,
    pub query: String,
    pub state: String,
    pub total_rows: Option<u64>,
    pub execution_time: Option<f64>,
    pub output_layout: Option<String>,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub output_columns: Vec<String>,
}

impl OutputView {
    /// Output payload whose column list comes from `terminal`'s output layout.
    pub fn new(facts: &QueryFacts, terminal: Option<&PlanFragment>) -> Self {
        Self {
            query_id: facts.query_id.clone(),
            query: facts.query.clone(),
            state: facts.state.clone(),
            total_rows: facts.total_rows,
            execution_time: facts.execution_time,
            output_layout: terminal.and_then(|fragment| fragment.output_layout.clone()),
            output_columns: terminal.map(PlanFragment::output_columns).unwrap_or_default(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Metric {
    pub label: String,
    pub value: String,
}

impl Metric {
    pub fn new(label: impl Into<String>, value: impl Into<String>) -> Self {
        Self { label: label.into(), value: value.into() }
    }
}

/// Payload of tree and timeline nodes.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct QueryNodeView {
    pub id: String,
    pub stage: String,
    pub title: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub connector: Option<String>,
    pub status: QueryStatus,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub duration_ms: Option<f64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub rows: Option<u64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub timestamp: Option<String>,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub metrics: Vec<Metric>,
}

impl QueryNodeView {
    pub fn new(id: impl Into<String>, stage: impl Into<String>, title: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            stage: stage.into(),
            title: title.into(),
            connector: None,
            status: QueryStatus::Unknown,
            duration_ms: None,
            rows: None,
            timestamp: None,
            metrics: Vec::new(),
        }
    }

    pub(crate) fn push_count(&mut self, label: &str, value: Option<u64>) {
        if let Some(value) = value.filter(|v| *v > 0) {
            self.metrics.push(Metric::new(label, format_count(value)));
        }
    }
}
