//! Periodic snapshot fetch and graph rebuild.

use crate::error::ClientError;
use crate::QuerySource;
use planscope_common::{Database, Error, QueryTree};
use planscope_engine::{compile, GraphConfig, RenderGraph};
use std::time::Duration;
use tokio::sync::watch;
use tokio::time::MissedTickBehavior;
use tracing::{debug, info, warn};

pub const DEFAULT_POLL_INTERVAL: Duration = Duration::from_secs(2);

/// One poll's view of the service.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Snapshot {
    pub query: QueryTree,
    pub databases: Vec<Database>,
}

#[derive(Debug)]
pub enum PollOutcome {
    Rebuilt(RenderGraph),
    /// Same query in the same state as the previous poll.
    Unchanged,
    NoData,
    Failed(ClientError),
}

/// The last user query in service order.
pub fn latest_user_query(queries: Vec<QueryTree>) -> Option<QueryTree> {
    queries.into_iter().rev().find(QueryTree::is_user_query)
}

pub struct QueryPoller<S> {
    source: S,
    config: GraphConfig,
    interval: Duration,
    query_id: Option<String>,
    last_seen: Option<(String, String)>,
}

impl<S: QuerySource> QueryPoller<S> {
    pub fn new(source: S, config: GraphConfig) -> Self {
        Self { source, config, interval: DEFAULT_POLL_INTERVAL, query_id: None, last_seen: None }
    }

    pub fn with_interval(mut self, interval: Duration) -> Self {
        self.interval = interval;
        self
    }

    /// Follows one query instead of the latest user query.
    pub fn with_query_id(mut self, query_id: Option<String>) -> Self {
        self.query_id = query_id;
        self
    }

    pub fn source(&self) -> &S {
        &self.source
    }

    pub async fn snapshot(&self) -> Result<Snapshot, ClientError> {
        let databases = self.source.list_databases().await?;
        let query = match &self.query_id {
            Some(id) => self.source.fetch_query(id).await?,
            None => latest_user_query(self.source.list_queries().await?).ok_or(ClientError::NoUserQueries)?,
        };
        Ok(Snapshot { query, databases })
    }

    /// Fetches a snapshot and rebuilds the graph unless the query's ID and
    /// state match the previous poll.
    pub async fn poll_once(&mut self) -> PollOutcome {
        let snapshot = match self.snapshot().await {
            Ok(snapshot) => snapshot,
            Err(err) => return PollOutcome::Failed(err),
        };
        let key = (snapshot.query.query_id.clone(), snapshot.query.state.clone());
        if self.last_seen.as_ref() == Some(&key) {
            debug!(query_id = %key.0, state = %key.1, "Query unchanged, skipping rebuild");
            return PollOutcome::Unchanged;
        }
        self.last_seen = Some(key);

        match compile(&snapshot.query, &snapshot.databases, &self.config) {
            Ok(graph) => {
                info!(
                    query_id = %snapshot.query.query_id,
                    state = %snapshot.query.state,
                    nodes = graph.nodes.len(),
                    edges = graph.edges.len(),
                    "Rebuilt query graph"
                );
                PollOutcome::Rebuilt(graph)
            }
            Err(Error::NoVisualizationData) => PollOutcome::NoData,
            Err(err) => {
                warn!(query_id = %snapshot.query.query_id, error = %err, "Failed to compile query graph");
                PollOutcome::NoData
            }
        }
    }

    /// Polls until `shutdown` turns true or its sender is dropped. Each
    /// outcome is handed to `on_outcome` before the next tick.
    pub async fn run<F>(&mut self, mut shutdown: watch::Receiver<bool>, mut on_outcome: F)
    where
        F: FnMut(PollOutcome),
    {
        let mut ticker = tokio::time::interval(self.interval);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);
        info!(interval_ms = self.interval.as_millis() as u64, "Polling started");
        loop {
            if *shutdown.borrow() {
                break;
            }
            tokio::select! {
                _ = ticker.tick() => {
                    let outcome = self.poll_once().await;
                    on_outcome(outcome);
                }
                changed = shutdown.changed() => {
                    if changed.is_err() {
                        break;
                    }
                }
            }
        }
        info!("Polling stopped");
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn query(id: &str, user: &str) -> QueryTree {
        QueryTree { query_id: id.to_string(), user: user.to_string(), ..Default::default() }
    }

    #[test]
    fn test_latest_user_query_skips_system_queries() {
        let queries = vec![
            query("q1", "alice"),
            query("q2", "bob"),
            query("q3", "system"),
            query("q4", "$internal"),
            query("system_q5", "carol"),
            query("q6", ""),
        ];
        assert_eq!(latest_user_query(queries).map(|q| q.query_id), Some("q2".to_string()));
    }

    #[test]
    fn test_latest_user_query_none() {
        assert_eq!(latest_user_query(vec![query("q1", "system")]), None);
    }
}
