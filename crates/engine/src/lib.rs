//! Engine crate
//!
//! Compiles a query's execution plan into a positioned `{nodes, edges}` graph.
//!
//! # Example
//! ```rust
//! use planscope_common::{JsonPlan, QueryTree};
//! use planscope_engine::{compile, GraphConfig};
//!
//! let tree = QueryTree {
//!     query_id: "q1".to_string(),
//!     json_plan: Some(JsonPlan::Text(r#"{"0": {"id": "1", "name": "Output"}}"#.to_string())),
//!     ..Default::default()
//! };
//! let graph = compile(&tree, &[], &GraphConfig::default()).unwrap();
//! assert_eq!(graph.nodes.len(), 2);
//! ```

pub mod classify;
pub mod compiler;
pub mod config;
pub mod dependency;
pub mod fallback;
pub mod graph;
pub mod layout;
pub mod plan;
pub mod text_plan;

pub use compiler::compile;
pub use config::{DatabaseColumn, GraphConfig, NodeSize};
pub use dependency::{
    decode_plan, extract_dependencies, parse_source_fragment_ids, DependencyGraph, PlanMap,
    PlanOperator,
};
pub use fallback::{FallbackGraphBuilder, TreeNode};
pub use graph::{
    Anchor, EdgeKind, NodeKind, NodePayload, Point, QueryFacts, RenderEdge, RenderGraph,
    RenderNode, OUTPUT_NODE_ID,
};
pub use layout::{
    ColumnLayout, LayeredLayout, Layout, LayoutEdge, LayoutEngine, LayoutNode, LayoutOptions,
    RankDir,
};
pub use plan::{PlanGraphBuilder, PlanInput};
pub use text_plan::parse_text_plan;
