//! Common crate
//!
//! Shared data model, formatting helpers and error handling for Planscope.
//!
//! # Example
//! ```rust
//! use planscope_common::{Error, QueryTree};
//! let tree: QueryTree = serde_json::from_str(r#"{"queryId": "q1", "state": "RUNNING"}"#).unwrap();
//! assert_eq!(tree.query_id, "q1");
//! let err = Error::new("example error");
//! assert_eq!(err.to_string(), "An internal error occurred: example error");
//! ```

pub mod error;
pub mod format;
pub mod model;

pub use error::{Error, Result};
pub use model::{
    parse_output_columns, Database, FragmentId, FragmentOperator, JsonPlan, PlanFragment,
    QueryEvent, QueryStatus, QueryTree, QueryTreeNode,
};
