use async_trait::async_trait;
use planscope_client::{ClientError, PollOutcome, QueryPoller, QuerySource};
use planscope_common::{Database, JsonPlan, QueryTree};
use planscope_engine::GraphConfig;
use pretty_assertions::assert_eq;
use std::collections::VecDeque;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tokio::sync::watch;

/// Serves scripted `list_queries` answers; `None` entries fail.
struct ScriptedSource {
    answers: Mutex<VecDeque<Option<Vec<QueryTree>>>>,
    database_calls: AtomicUsize,
}

impl ScriptedSource {
    fn new(answers: Vec<Option<Vec<QueryTree>>>) -> Self {
        Self { answers: Mutex::new(answers.into()), database_calls: AtomicUsize::new(0) }
    }
}

#[async_trait]
impl QuerySource for ScriptedSource {
    async fn list_queries(&self) -> Result<Vec<QueryTree>, ClientError> {
        let next = self.answers.lock().unwrap().pop_front().unwrap_or_default();
        next.ok_or_else(|| ClientError::NotFound("scripted failure".to_string()))
    }

    async fn fetch_query(&self, query_id: &str) -> Result<QueryTree, ClientError> {
        let queries = self.list_queries().await?;
        queries
            .into_iter()
            .find(|q| q.query_id == query_id)
            .ok_or_else(|| ClientError::NotFound(query_id.to_string()))
    }

    async fn list_databases(&self) -> Result<Vec<Database>, ClientError> {
        self.database_calls.fetch_add(1, Ordering::SeqCst);
        Ok(vec![Database { id: "pg".to_string(), name: "pg".to_string(), ..Default::default() }])
    }
}

fn user_query(id: &str, state: &str) -> QueryTree {
    QueryTree {
        query_id: id.to_string(),
        user: "alice".to_string(),
        state: state.to_string(),
        json_plan: Some(JsonPlan::Text(
            r#"{"0": {"id": "1", "name": "Output", "children": [
                {"id": "2", "name": "RemoteSource", "descriptor": {"sourceFragmentIds": "[1]"}}]},
               "1": {"id": "3", "name": "TableScan"}}"#
                .to_string(),
        )),
        ..Default::default()
    }
}

fn label(outcome: &PollOutcome) -> &'static str {
    match outcome {
        PollOutcome::Rebuilt(_) => "rebuilt",
        PollOutcome::Unchanged => "unchanged",
        PollOutcome::NoData => "no-data",
        PollOutcome::Failed(_) => "failed",
    }
}

#[tokio::test]
async fn test_unchanged_snapshots_skip_rebuild() {
    let source = ScriptedSource::new(vec![
        Some(vec![user_query("q1", "RUNNING")]),
        Some(vec![user_query("q1", "RUNNING")]),
        Some(vec![user_query("q1", "FINISHED")]),
        Some(vec![user_query("q1", "FINISHED"), user_query("q2", "QUEUED")]),
    ]);
    let mut poller = QueryPoller::new(source, GraphConfig::default());

    let mut labels = Vec::new();
    for _ in 0..4 {
        labels.push(label(&poller.poll_once().await));
    }

    assert_eq!(labels, vec!["rebuilt", "unchanged", "rebuilt", "rebuilt"]);
}

#[tokio::test]
async fn test_rebuilt_graph_wires_databases() {
    let source = ScriptedSource::new(vec![Some(vec![user_query("q1", "RUNNING")])]);
    let mut poller = QueryPoller::new(source, GraphConfig::default());

    let PollOutcome::Rebuilt(graph) = poller.poll_once().await else {
        panic!("expected a rebuilt graph");
    };

    assert!(graph.edge("e-db_pg-fragment_1").is_some());
    assert!(graph.edge("e-fragment_1-fragment_0").unwrap().animated);
}

#[tokio::test]
async fn test_recovers_after_failure() {
    let source = ScriptedSource::new(vec![None, Some(vec![user_query("q1", "RUNNING")])]);
    let mut poller = QueryPoller::new(source, GraphConfig::default());

    assert_eq!(label(&poller.poll_once().await), "failed");
    assert_eq!(label(&poller.poll_once().await), "rebuilt");
}

#[tokio::test]
async fn test_no_user_queries() {
    let mut system = user_query("q1", "RUNNING");
    system.user = "system".to_string();
    let source = ScriptedSource::new(vec![Some(vec![system])]);
    let mut poller = QueryPoller::new(source, GraphConfig::default());

    let outcome = poller.poll_once().await;

    assert!(matches!(outcome, PollOutcome::Failed(ClientError::NoUserQueries)));
}

#[tokio::test]
async fn test_query_without_data() {
    let bare = QueryTree { query_id: "q1".to_string(), user: "alice".to_string(), ..Default::default() };
    let source = ScriptedSource::new(vec![Some(vec![bare])]);
    let mut poller = QueryPoller::new(source, GraphConfig::default()).with_query_id(Some("q1".to_string()));

    assert_eq!(label(&poller.poll_once().await), "no-data");
}

#[tokio::test]
async fn test_run_stops_on_shutdown() {
    let answers = (0..50).map(|i| Some(vec![user_query("q1", if i % 2 == 0 { "RUNNING" } else { "FINISHED" })]));
    let source = ScriptedSource::new(answers.collect());
    let mut poller = QueryPoller::new(source, GraphConfig::default()).with_interval(Duration::from_millis(10));
    let (shutdown_tx, shutdown_rx) = watch::channel(false);
    let seen = Arc::new(AtomicUsize::new(0));

    let counter = seen.clone();
    let stopper = tokio::spawn(async move {
        tokio::time::sleep(Duration::from_millis(80)).await;
        let _ = shutdown_tx.send(true);
    });
    poller
        .run(shutdown_rx, |outcome| {
            assert!(matches!(outcome, PollOutcome::Rebuilt(_)));
            counter.fetch_add(1, Ordering::SeqCst);
        })
        .await;
    stopper.await.unwrap();

    let polls = seen.load(Ordering::SeqCst);
    assert!(polls >= 1, "expected at least one poll");
    assert_eq!(poller.source().database_calls.load(Ordering::SeqCst), polls);
}
