//! Client crate
//!
//! Talks to the query-status service and keeps a query's graph up to date.
//!
//! # Example
//! ```rust,no_run
//! use planscope_client::{ApiClient, PollOutcome, QueryPoller};
//! use planscope_engine::GraphConfig;
//! use std::time::Duration;
//!
//! # async fn demo() -> Result<(), planscope_client::ClientError> {
//! let client = ApiClient::new("http://localhost:8080/api", Duration::from_secs(10))?;
//! let mut poller = QueryPoller::new(client, GraphConfig::default());
//! if let PollOutcome::Rebuilt(graph) = poller.poll_once().await {
//!     println!("{} nodes", graph.nodes.len());
//! }
//! # Ok(())
//! # }
//! ```

pub mod api;
pub mod error;
pub mod poller;

pub use api::{ApiClient, DEFAULT_BASE_URL};
pub use error::ClientError;
pub use poller::{latest_user_query, PollOutcome, QueryPoller, Snapshot, DEFAULT_POLL_INTERVAL};

use async_trait::async_trait;
use planscope_common::{Database, QueryTree};

/// Where snapshots come from. [`ApiClient`] reads the HTTP service; tests
/// substitute in-memory sources.
#[async_trait]
pub trait QuerySource: Send + Sync {
    async fn list_queries(&self) -> Result<Vec<QueryTree>, ClientError>;
    async fn fetch_query(&self, query_id: &str) -> Result<QueryTree, ClientError>;
    async fn list_databases(&self) -> Result<Vec<Database>, ClientError>;
}
