//! Cross-fragment dependencies of a JSON execution plan.
//!
//! Fragments only reference each other through `RemoteSource` and
//! `RemoteMerge` operators, whose `descriptor.sourceFragmentIds` names the
//! fragments they read from.

use planscope_common::{Error, FragmentId, JsonPlan, Result};
use serde::{Deserialize, Deserializer, Serialize};
use serde_json::{Map, Value};
use std::collections::{BTreeMap, BTreeSet};
use tracing::warn;

const REMOTE_READ_OPERATORS: [&str; 2] = ["RemoteSource", "RemoteMerge"];
const SOURCE_FRAGMENT_IDS: &str = "sourceFragmentIds";

/// Root operator of every fragment, keyed by fragment ID.
pub type PlanMap = BTreeMap<FragmentId, PlanOperator>;

/// One operator of a fragment's local plan tree, as found in the JSON plan.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct PlanOperator {
    #[serde(deserialize_with = "lenient_id")]
    pub id: Option<String>,
    #[serde(deserialize_with = "null_as_default")]
    pub name: String,
    #[serde(deserialize_with = "lenient_descriptor")]
    pub descriptor: Option<Map<String, Value>>,
    pub details: Option<Value>,
    pub outputs: Option<Value>,
    #[serde(deserialize_with = "null_as_default")]
    pub children: Vec<PlanOperator>,
}

impl PlanOperator {
    pub fn new(name: impl Into<String>) -> Self {
        Self { name: name.into(), ..Default::default() }
    }

    pub fn with_descriptor(mut self, key: &str, value: impl Into<Value>) -> Self {
        self.descriptor.get_or_insert_with(Map::new).insert(key.to_string(), value.into());
        self
    }

    pub fn with_child(mut self, child: PlanOperator) -> Self {
        self.children.push(child);
        self
    }

    pub fn is_remote_read(&self) -> bool {
        REMOTE_READ_OPERATORS.contains(&self.name.as_str())
    }

    /// Fragment IDs named by this operator's own descriptor.
    fn referenced_fragments(&self) -> Vec<FragmentId> {
        if !self.is_remote_read() {
            return Vec::new();
        }
        match self.descriptor.as_ref().and_then(|d| d.get(SOURCE_FRAGMENT_IDS)) {
            Some(Value::String(list)) => parse_source_fragment_ids(list),
            Some(Value::Array(items)) => items.iter().filter_map(fragment_id_from_value).collect(),
            _ => Vec::new(),
        }
    }
}

fn null_as_default<'de, D, T>(deserializer: D) -> std::result::Result<T, D::Error>
where
    D: Deserializer<'de>,
    T: Default + Deserialize<'de>,
{
    Ok(Option::<T>::deserialize(deserializer)?.unwrap_or_default())
}

// Operator IDs are strings in current plans and numbers in some older ones.
fn lenient_id<'de, D>(deserializer: D) -> std::result::Result<Option<String>, D::Error>
where
    D: Deserializer<'de>,
{
    Ok(match Option::<Value>::deserialize(deserializer)? {
        Some(Value::String(id)) => Some(id),
        Some(Value::Number(id)) => Some(id.to_string()),
        _ => None,
    })
}

// A descriptor that is not an object names no fragments.
fn lenient_descriptor<'de, D>(deserializer: D) -> std::result::Result<Option<Map<String, Value>>, D::Error>
where
    D: Deserializer<'de>,
{
    Ok(match Option::<Value>::deserialize(deserializer)? {
        Some(Value::Object(map)) => Some(map),
        _ => None,
    })
}

fn fragment_id_from_value(value: &Value) -> Option<FragmentId> {
    match value {
        Value::Number(n) => n.as_u64().and_then(|n| FragmentId::try_from(n).ok()),
        Value::String(s) => s.trim().parse().ok(),
        _ => None,
    }
}

/// Parses a bracketed list such as `"[3, 7]"`. Tokens that are not
/// fragment IDs are skipped.
pub fn parse_source_fragment_ids(list: &str) -> Vec<FragmentId> {
    list.trim()
        .trim_start_matches('[')
        .trim_end_matches(']')
        .split(',')
        .filter_map(|token| token.trim().parse().ok())
        .collect()
}

/// Every fragment the operator tree rooted at `root` reads from.
pub fn extract_dependencies(root: &PlanOperator) -> BTreeSet<FragmentId> {
    let mut found = BTreeSet::new();
    let mut stack = vec![root];
    while let Some(operator) = stack.pop() {
        found.extend(operator.referenced_fragments());
        stack.extend(operator.children.iter());
    }
    found
}

/// Decodes a JSON plan into fragment root operators. Keys that are not
/// fragment IDs are skipped.
pub fn decode_plan(plan: &JsonPlan) -> Result<PlanMap> {
    let raw = match plan {
        JsonPlan::Text(text) => serde_json::from_str::<BTreeMap<String, PlanOperator>>(text)?,
        JsonPlan::Structured(value) if value.is_object() => {
            BTreeMap::<String, PlanOperator>::deserialize(value)?
        }
        JsonPlan::Structured(other) => {
            return Err(Error::InvalidPlan(format!("expected a JSON object, got {}", kind_of(other))));
        }
    };
    let mut decoded = PlanMap::new();
    for (key, root) in raw {
        match key.trim().parse::<FragmentId>() {
            Ok(id) => {
                decoded.insert(id, root);
            }
            Err(_) => warn!(key = %key, "Skipping plan entry with a non-numeric fragment key"),
        }
    }
    Ok(decoded)
}

fn kind_of(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "a boolean",
        Value::Number(_) => "a number",
        Value::String(_) => "a string",
        Value::Array(_) => "an array",
        Value::Object(_) => "an object",
    }
}

/// For every fragment of a plan, the set of upstream fragments it reads from.
///
/// Data flows from each upstream fragment into the fragment that lists it.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct DependencyGraph {
    upstream: BTreeMap<FragmentId, BTreeSet<FragmentId>>,
}

impl DependencyGraph {
    /// Runs the extractor on every fragment. References to the fragment
    /// itself or to fragments outside the plan are dropped.
    pub fn from_plan(plan: &PlanMap) -> Self {
        let upstream = plan
            .iter()
            .map(|(&id, root)| {
                let mut reads = extract_dependencies(root);
                reads.retain(|&dep| {
                    if dep == id {
                        warn!(fragment = id, "Dropping self reference in plan");
                        false
                    } else if !plan.contains_key(&dep) {
                        warn!(fragment = id, missing = dep, "Dropping reference to unknown fragment");
                        false
                    } else {
                        true
                    }
                });
                (id, reads)
            })
            .collect();
        Self { upstream }
    }

    pub fn len(&self) -> usize {
        self.upstream.len()
    }

    pub fn is_empty(&self) -> bool {
        self.upstream.is_empty()
    }

    pub fn contains(&self, id: FragmentId) -> bool {
        self.upstream.contains_key(&id)
    }

    /// Fragment IDs in ascending order.
    pub fn fragments(&self) -> impl Iterator<Item = FragmentId> + '_ {
        self.upstream.keys().copied()
    }

    /// Fragments `id` reads from.
    pub fn upstream_of(&self, id: FragmentId) -> impl Iterator<Item = FragmentId> + '_ {
        self.upstream.get(&id).into_iter().flatten().copied()
    }

    /// Fragments that read from `id`.
    pub fn downstream_of(&self, id: FragmentId) -> impl Iterator<Item = FragmentId> + '_ {
        self.upstream
            .iter()
            .filter(move |(_, reads)| reads.contains(&id))
            .map(|(&fragment, _)| fragment)
    }

    /// Fragments that read from nobody.
    pub fn sources(&self) -> Vec<FragmentId> {
        self.upstream.iter().filter(|(_, reads)| reads.is_empty()).map(|(&id, _)| id).collect()
    }

    /// Fragments nobody reads from.
    pub fn sinks(&self) -> Vec<FragmentId> {
        let read: BTreeSet<FragmentId> = self.upstream.values().flatten().copied().collect();
        self.fragments().filter(|id| !read.contains(id)).collect()
    }

    /// `(upstream, downstream)` pairs, ordered by downstream then upstream.
    pub fn edges(&self) -> Vec<(FragmentId, FragmentId)> {
        self.upstream
            .iter()
            .flat_map(|(&fragment, reads)| reads.iter().map(move |&dep| (dep, fragment)))
            .collect()
    }
}
