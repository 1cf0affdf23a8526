//! Workflow graph snapshots.
//!
//! Graphs use a JSON (or YAML) document of nodes and edges:
//!
//! ```json
//! {
//!   "nodes": [
//!     {"id": "n1", "type": "action", "label": "Notify sales team"},
//!     {"id": "n2", "type": "condition", "props": {"variable": "amount", "operator": ">", "value": "1000"}},
//!     {"id": "n3", "type": "action", "label": "Approve", "action": "user_assignment"},
//!     {"id": "n4", "type": "terminal", "label": "Rejected"}
//!   ],
//!   "edges": [
//!     {"fromId": "n1", "toId": "n2"},
//!     {"fromId": "n2", "toId": "n3", "label": "true"},
//!     {"fromId": "n2", "toId": "n4", "label": "false"}
//!   ]
//! }
//! ```
//!
//! A running instance owns its own copy of the graph, captured at start.

use crate::action::ActionKind;
use crate::error::CoreError;
use serde::{Deserialize, Deserializer, Serialize};
use serde_json::Value;
use std::collections::{BTreeMap, HashMap, HashSet};

/// Kind of a graph vertex.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum NodeKind {
    Action,
    Condition,
    #[serde(alias = "end")]
    Terminal,
}

impl NodeKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            NodeKind::Action => "action",
            NodeKind::Condition => "condition",
            NodeKind::Terminal => "terminal",
        }
    }
}

/// A graph vertex.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Node {
    pub id: String,

    #[serde(rename = "type")]
    pub kind: NodeKind,

    /// Free-text label shown to users.
    #[serde(default)]
    pub label: String,

    /// Node properties; condition nodes read `variable`, `operator` and
    /// `value` from here.
    #[serde(
        rename = "props",
        alias = "properties",
        default,
        deserialize_with = "deserialize_props",
        skip_serializing_if = "BTreeMap::is_empty"
    )]
    pub properties: BTreeMap<String, String>,

    /// Action tag chosen when the graph was authored.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub action: Option<ActionKind>,
}

impl Node {
    pub fn new(id: impl Into<String>, kind: NodeKind) -> Self {
        Self {
            id: id.into(),
            kind,
            label: String::new(),
            properties: BTreeMap::new(),
            action: None,
        }
    }

    pub fn with_label(mut self, label: impl Into<String>) -> Self {
        self.label = label.into();
        self
    }

    pub fn with_property(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.properties.insert(key.into(), value.into());
        self
    }

    pub fn with_action(mut self, action: ActionKind) -> Self {
        self.action = Some(action);
        self
    }

    pub fn property(&self, key: &str) -> Option<&str> {
        self.properties.get(key).map(String::as_str)
    }
}

/// Property values may be authored as strings, numbers or booleans; all are
/// kept in string form. Nulls are dropped and nested values keep their JSON
/// text.
fn deserialize_props<'de, D>(deserializer: D) -> Result<BTreeMap<String, String>, D::Error>
where
    D: Deserializer<'de>,
{
    let raw = Option::<BTreeMap<String, Value>>::deserialize(deserializer)?.unwrap_or_default();
    Ok(raw
        .into_iter()
        .filter_map(|(key, value)| match value {
            Value::Null => None,
            Value::String(s) => Some((key, s)),
            other => Some((key, other.to_string())),
        })
        .collect())
}

/// A directed, optionally labeled edge.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Edge {
    #[serde(rename = "fromId", alias = "from_id", alias = "from")]
    pub from_id: String,

    #[serde(rename = "toId", alias = "to_id", alias = "to")]
    pub to_id: String,

    /// `"true"` / `"false"` on edges leaving condition nodes.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub label: Option<String>,
}

impl Edge {
    pub fn new(from: impl Into<String>, to: impl Into<String>) -> Self {
        Self {
            from_id: from.into(),
            to_id: to.into(),
            label: None,
        }
    }

    pub fn labeled(
        from: impl Into<String>,
        to: impl Into<String>,
        label: impl Into<String>,
    ) -> Self {
        Self {
            from_id: from.into(),
            to_id: to.into(),
            label: Some(label.into()),
        }
    }
}

/// Immutable snapshot of a workflow's structure.
///
/// Node and outgoing-edge indexes are built once, when the graph is
/// constructed or deserialized, so lookups on the advance path are O(1).
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(from = "GraphDocument")]
pub struct WorkflowGraph {
    nodes: Vec<Node>,
    edges: Vec<Edge>,

    /// Node id → position in `nodes`. First declaration wins.
    #[serde(skip)]
    node_index: HashMap<String, usize>,

    /// Node id → positions in `edges` of its outgoing edges.
    #[serde(skip)]
    outgoing: HashMap<String, Vec<usize>>,
}

/// Wire form of a graph, before indexing.
#[derive(Deserialize)]
struct GraphDocument {
    #[serde(default)]
    nodes: Vec<Node>,
    #[serde(default)]
    edges: Vec<Edge>,
}

impl From<GraphDocument> for WorkflowGraph {
    fn from(doc: GraphDocument) -> Self {
        Self::new(doc.nodes, doc.edges)
    }
}

impl WorkflowGraph {
    pub fn new(nodes: Vec<Node>, edges: Vec<Edge>) -> Self {
        let mut node_index = HashMap::with_capacity(nodes.len());
        for (i, node) in nodes.iter().enumerate() {
            node_index.entry(node.id.clone()).or_insert(i);
        }
        let mut outgoing: HashMap<String, Vec<usize>> = HashMap::new();
        for (i, edge) in edges.iter().enumerate() {
            outgoing.entry(edge.from_id.clone()).or_default().push(i);
        }
        Self {
            nodes,
            edges,
            node_index,
            outgoing,
        }
    }

    /// Parses a graph from its JSON document form.
    pub fn from_json(json: &Value) -> Result<Self, CoreError> {
        Ok(serde_json::from_value(json.clone())?)
    }

    pub fn from_json_str(s: &str) -> Result<Self, CoreError> {
        Ok(serde_json::from_str(s)?)
    }

    pub fn from_yaml_str(s: &str) -> Result<Self, CoreError> {
        Ok(serde_yaml::from_str(s)?)
    }

    pub fn to_json(&self) -> Value {
        serde_json::to_value(self).unwrap_or(Value::Null)
    }

    /// Nodes in declaration order.
    pub fn nodes(&self) -> &[Node] {
        &self.nodes
    }

    /// Edges in declaration order.
    pub fn edges(&self) -> &[Edge] {
        &self.edges
    }

    pub fn is_empty(&self) -> bool {
        self.nodes.is_empty()
    }

    /// Looks a node up by id. With repeated ids the first declaration wins.
    pub fn node(&self, id: &str) -> Option<&Node> {
        self.node_index.get(id).map(|&i| &self.nodes[i])
    }

    pub fn contains(&self, id: &str) -> bool {
        self.node_index.contains_key(id)
    }

    /// Outgoing edges of `node_id` in declaration order.
    pub fn outgoing_edges(&self, node_id: &str) -> Vec<&Edge> {
        self.outgoing
            .get(node_id)
            .map(|ids| ids.iter().map(|&i| &self.edges[i]).collect())
            .unwrap_or_default()
    }

    pub fn has_outgoing(&self, node_id: &str) -> bool {
        self.outgoing.contains_key(node_id)
    }

    /// Nodes without incoming edges, in declaration order.
    pub fn entry_candidates(&self) -> Vec<&Node> {
        let targets: HashSet<&str> = self.edges.iter().map(|e| e.to_id.as_str()).collect();
        self.nodes
            .iter()
            .filter(|n| !targets.contains(n.id.as_str()))
            .collect()
    }

    /// The node an instance starts on: the only node without incoming
    /// edges, or the first declared node when that is ambiguous.
    pub fn entry_node(&self) -> Option<&Node> {
        match self.entry_candidates().as_slice() {
            [single] => Some(*single),
            _ => self.nodes.first(),
        }
    }

    /// Checksum of the canonical JSON encoding.
    pub fn checksum(&self) -> String {
        let bytes = serde_json::to_vec(self).unwrap_or_default();
        format!("{:08x}", crc32c::crc32c(&bytes))
    }
}
