//! Documents served by the query-status service.
//!
//! Field names follow the service's camelCase JSON. Metrics are optional
//! because a running query reports them only once its tasks have progressed.

use chrono::{DateTime, NaiveDateTime, Utc};
use serde::{Deserialize, Deserializer, Serialize};

/// Identifier of a plan fragment, unique within one query.
pub type FragmentId = u32;

/// Accepts `null` wherever a collection or string is expected.
fn null_as_default<'de, D, T>(deserializer: D) -> Result<T, D::Error>
where
    D: Deserializer<'de>,
    T: Default + Deserialize<'de>,
{
    Ok(Option::<T>::deserialize(deserializer)?.unwrap_or_default())
}

/// The raw JSON execution plan: either still encoded or already decoded.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum JsonPlan {
    Text(String),
    Structured(serde_json::Value),
}

/// One operator entry of a fragment summary.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum FragmentOperator {
    /// A line of the text plan, e.g. `└─ TableScan[table = tpch:orders]`.
    Text(String),
    Structured(OperatorSummary),
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct OperatorSummary {
    pub operator_type: Option<String>,
    pub name: Option<String>,
    pub details: Option<String>,
}

impl FragmentOperator {
    /// Operator type name, e.g. `TableScan`.
    ///
    /// For text lines this is the first identifier after the tree glyphs.
    pub fn operator_type(&self) -> Option<&str> {
        match self {
            FragmentOperator::Text(line) => {
                let trimmed = line.trim_start_matches(|c: char| {
                    c.is_whitespace() || matches!(c, '│' | '└' | '├' | '─' | '|' | '-')
                });
                let end = trimmed
                    .find(|c: char| !(c.is_alphanumeric() || c == '_'))
                    .unwrap_or(trimmed.len());
                (end > 0).then(|| &trimmed[..end])
            }
            FragmentOperator::Structured(summary) => {
                summary.operator_type.as_deref().or(summary.name.as_deref())
            }
        }
    }
}

/// Per-fragment summary of a distributed plan.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct PlanFragment {
    pub fragment_id: FragmentId,
    pub partitioning_type: Option<String>,
    pub cpu_time: Option<String>,
    pub cpu_time_ms: Option<f64>,
    pub scheduled_time: Option<String>,
    pub scheduled_time_ms: Option<f64>,
    pub blocked_time: Option<String>,
    pub blocked_time_ms: Option<f64>,
    pub input_rows: Option<u64>,
    pub input_bytes: Option<String>,
    pub input_bytes_value: Option<u64>,
    pub output_rows: Option<u64>,
    pub output_bytes: Option<String>,
    pub output_bytes_value: Option<u64>,
    pub peak_memory: Option<String>,
    pub peak_memory_bytes: Option<u64>,
    pub task_count: Option<u32>,
    pub output_layout: Option<String>,
    pub output_partitioning: Option<String>,
    #[serde(deserialize_with = "null_as_default")]
    pub operators: Vec<FragmentOperator>,
    pub raw_text: Option<String>,
}

impl PlanFragment {
    pub fn new(fragment_id: FragmentId) -> Self {
        Self { fragment_id, ..Default::default() }
    }

    /// Column names declared by `outputLayout`, without type annotations.
    pub fn output_columns(&self) -> Vec<String> {
        self.output_layout.as_deref().map(parse_output_columns).unwrap_or_default()
    }
}

/// Splits an output layout such as `[orderkey:bigint, total]` into names.
pub fn parse_output_columns(layout: &str) -> Vec<String> {
    layout
        .split(',')
        .filter_map(|column| {
            let name = column.trim().split(':').next().unwrap_or_default();
            let name = name.replace(['[', ']'], "");
            let name = name.trim();
            (!name.is_empty()).then(|| name.to_string())
        })
        .collect()
}

/// Node of the generic operator tree the service builds when it has no plan.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct QueryTreeNode {
    pub id: String,
    pub query_id: String,
    pub node_type: Option<String>,
    pub operator_type: Option<String>,
    pub source_system: Option<String>,
    #[serde(deserialize_with = "null_as_default")]
    pub state: String,
    pub execution_time: Option<f64>,
    pub input_rows: Option<u64>,
    pub output_rows: Option<u64>,
    pub input_bytes: Option<u64>,
    pub output_bytes: Option<u64>,
    pub cpu_time: Option<f64>,
    pub wall_time: Option<f64>,
    pub memory_bytes: Option<u64>,
    pub error_message: Option<String>,
    #[serde(deserialize_with = "null_as_default")]
    pub warnings: Vec<String>,
    pub metadata: Option<serde_json::Map<String, serde_json::Value>>,
    #[serde(deserialize_with = "null_as_default")]
    pub children: Vec<QueryTreeNode>,
    pub parent_id: Option<String>,
}

/// Lifecycle event recorded for a query.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct QueryEvent {
    pub query_id: String,
    #[serde(deserialize_with = "null_as_default")]
    pub event_type: String,
    pub timestamp: Option<String>,
    pub query: Option<String>,
    #[serde(deserialize_with = "null_as_default")]
    pub state: String,
    #[serde(deserialize_with = "null_as_default")]
    pub user: String,
    pub source: Option<String>,
    pub catalog: Option<String>,
    pub schema: Option<String>,
    pub execution_time: Option<f64>,
    pub cpu_time_ms: Option<f64>,
    pub wall_time_ms: Option<f64>,
    pub queued_time_ms: Option<f64>,
    pub peak_memory_bytes: Option<u64>,
    pub total_bytes: Option<u64>,
    pub total_rows: Option<u64>,
    pub completed_splits: Option<u64>,
    /// Text `EXPLAIN ANALYZE` plan.
    pub plan: Option<String>,
    pub json_plan: Option<JsonPlan>,
    pub error_code: Option<String>,
    pub error_message: Option<String>,
    pub statistics: Option<serde_json::Map<String, serde_json::Value>>,
}

/// Everything the service knows about one query.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct QueryTree {
    pub query_id: String,
    #[serde(deserialize_with = "null_as_default")]
    pub query: String,
    #[serde(deserialize_with = "null_as_default")]
    pub user: String,
    #[serde(deserialize_with = "null_as_default")]
    pub state: String,
    pub start_time: Option<String>,
    pub end_time: Option<String>,
    pub total_execution_time: Option<f64>,
    pub total_rows: Option<u64>,
    pub error_message: Option<String>,
    pub json_plan: Option<JsonPlan>,
    #[serde(deserialize_with = "null_as_default")]
    pub fragments: Vec<PlanFragment>,
    pub root: Option<QueryTreeNode>,
    #[serde(deserialize_with = "null_as_default")]
    pub events: Vec<QueryEvent>,
}

impl QueryTree {
    pub fn started_at(&self) -> Option<DateTime<Utc>> {
        self.start_time.as_deref().and_then(parse_timestamp)
    }

    pub fn ended_at(&self) -> Option<DateTime<Utc>> {
        self.end_time.as_deref().and_then(parse_timestamp)
    }

    /// The JSON plan, looked up on the query first and then on its events.
    pub fn find_json_plan(&self) -> Option<&JsonPlan> {
        self.json_plan
            .as_ref()
            .or_else(|| self.events.iter().find_map(|event| event.json_plan.as_ref()))
    }

    /// First non-empty text plan carried by an event.
    pub fn find_text_plan(&self) -> Option<&str> {
        self.events
            .iter()
            .filter_map(|event| event.plan.as_deref())
            .find(|plan| !plan.trim().is_empty())
    }

    pub fn total_rows(&self) -> Option<u64> {
        self.total_rows.or_else(|| self.events.iter().find_map(|event| event.total_rows))
    }

    /// True when `root` has at least one child worth drawing as a tree.
    pub fn has_operator_tree(&self) -> bool {
        self.root.as_ref().is_some_and(|root| !root.children.is_empty())
    }

    /// Queries issued by users, as opposed to the engine's own bookkeeping.
    pub fn is_user_query(&self) -> bool {
        !self.user.is_empty()
            && self.user != "system"
            && !self.user.starts_with('$')
            && !self.query_id.is_empty()
            && !self.query_id.contains("system")
    }
}

fn parse_timestamp(value: &str) -> Option<DateTime<Utc>> {
    if let Ok(parsed) = DateTime::parse_from_rfc3339(value) {
        return Some(parsed.with_timezone(&Utc));
    }
    NaiveDateTime::parse_from_str(value, "%Y-%m-%dT%H:%M:%S%.f")
        .ok()
        .map(|naive| naive.and_utc())
}

/// Coarse status of a query or operator, derived from its state string.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum QueryStatus {
    Finished,
    Failed,
    Ok,
    Queued,
    Idle,
    Unknown,
}

impl QueryStatus {
    pub fn from_state(state: &str) -> Self {
        let state = state.to_lowercase();
        if state.contains("finish") || state.contains("complete") {
            QueryStatus::Finished
        } else if state.contains("fail") || state.contains("error") {
            QueryStatus::Failed
        } else if state.contains("running") {
            QueryStatus::Ok
        } else if state.contains("queued") {
            QueryStatus::Queued
        } else if state.contains("idle") {
            QueryStatus::Idle
        } else {
            QueryStatus::Unknown
        }
    }
}

/// An external data source attached to the graph.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct Database {
    pub id: String,
    pub name: String,
    #[serde(rename = "type")]
    pub db_type: String,
    pub host: Option<String>,
    pub port: Option<u16>,
    #[serde(deserialize_with = "null_as_default")]
    pub status: String,
    #[serde(deserialize_with = "null_as_default")]
    pub schemas: Vec<DatabaseSchema>,
    #[serde(deserialize_with = "null_as_default")]
    pub collections: Vec<DatabaseCollection>,
    pub total_queries: Option<u64>,
    pub last_seen: Option<String>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct DatabaseSchema {
    pub name: String,
    #[serde(deserialize_with = "null_as_default")]
    pub tables: Vec<DatabaseTable>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct DatabaseTable {
    pub name: String,
    #[serde(deserialize_with = "null_as_default")]
    pub columns: Vec<ColumnInfo>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct DatabaseCollection {
    pub name: String,
    #[serde(deserialize_with = "null_as_default")]
    pub fields: Vec<ColumnInfo>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ColumnInfo {
    pub name: String,
    #[serde(rename = "type")]
    pub column_type: String,
}
