//! Action nodes.
//!
//! Each action node carries an [`ActionKind`] tag. Graphs authored before
//! tags existed leave `action` unset; their kind is then inferred from the
//! node label. Reaching an action node dispatches to the handler registered
//! for its kind.

use crate::graph::{Node, NodeKind};
use crate::instance::WorkflowInstance;
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;
use thiserror::Error;

/// What an action node does.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ActionKind {
    Notification,
    DocumentGeneration,
    UserAssignment,
    SectionAssignment,
    Unknown,
}

/// Label fragments per kind, checked in this order.
const LABEL_VOCABULARY: &[(ActionKind, &[&str])] = &[
    (ActionKind::Notification, &["notif", "email", "alert", "remind"]),
    (ActionKind::DocumentGeneration, &["document", "pdf", "generate", "invoice"]),
    (ActionKind::UserAssignment, &["assign user", "assign to user", "user"]),
    (ActionKind::SectionAssignment, &["section", "department"]),
];

impl ActionKind {
    pub const ALL: [ActionKind; 5] = [
        ActionKind::Notification,
        ActionKind::DocumentGeneration,
        ActionKind::UserAssignment,
        ActionKind::SectionAssignment,
        ActionKind::Unknown,
    ];

    /// Infers a kind from a free-text label (case-insensitive substring match).
    pub fn classify_label(label: &str) -> Self {
        let label = label.to_lowercase();
        LABEL_VOCABULARY
            .iter()
            .find(|(_, words)| words.iter().any(|w| label.contains(w)))
            .map(|(kind, _)| *kind)
            .unwrap_or(ActionKind::Unknown)
    }

    /// The kind for `node`: its explicit tag, else inferred from its label.
    pub fn for_node(node: &Node) -> Self {
        node.action.unwrap_or_else(|| Self::classify_label(&node.label))
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            ActionKind::Notification => "notification",
            ActionKind::DocumentGeneration => "document_generation",
            ActionKind::UserAssignment => "user_assignment",
            ActionKind::SectionAssignment => "section_assignment",
            ActionKind::Unknown => "unknown",
        }
    }
}

impl fmt::Display for ActionKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Everything a handler may look at when an action node is reached.
pub struct ActionRequest<'a> {
    pub kind: ActionKind,
    pub instance: &'a WorkflowInstance,
    pub node: &'a Node,
}

impl ActionRequest<'_> {
    /// Node properties as a JSON object, recorded as the action parameters.
    pub fn params(&self) -> Value {
        let mut params = serde_json::Map::new();
        params.insert("label".to_string(), Value::String(self.node.label.clone()));
        for (key, value) in &self.node.properties {
            params.insert(key.clone(), Value::String(value.clone()));
        }
        Value::Object(params)
    }
}

/// A handler failure; recorded on the action log, never raised to callers.
#[derive(Debug, Clone, Error)]
#[error("{message}")]
pub struct ActionError {
    pub message: String,
}

impl ActionError {
    pub fn new(message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
        }
    }
}

/// Performs the side effect of an action node.
pub trait ActionHandler: Send + Sync {
    fn execute(&self, request: &ActionRequest<'_>) -> Result<Value, ActionError>;
}

impl<F> ActionHandler for F
where
    F: Fn(&ActionRequest<'_>) -> Result<Value, ActionError> + Send + Sync,
{
    fn execute(&self, request: &ActionRequest<'_>) -> Result<Value, ActionError> {
        self(request)
    }
}

/// Records that the node was reached and does nothing else.
#[derive(Debug, Default, Clone, Copy)]
pub struct LogOnlyHandler;

impl ActionHandler for LogOnlyHandler {
    fn execute(&self, request: &ActionRequest<'_>) -> Result<Value, ActionError> {
        tracing::debug!(
            instance_id = %request.instance.id,
            node_id = %request.node.id,
            kind = %request.kind,
            "action reached (log only)"
        );
        Ok(json!({"executed": true, "node_id": request.node.id}))
    }
}

/// Handlers keyed by action kind; kinds without a registration use the
/// fallback handler.
#[derive(Clone)]
pub struct ActionRegistry {
    handlers: HashMap<ActionKind, Arc<dyn ActionHandler>>,
    fallback: Arc<dyn ActionHandler>,
}

impl Default for ActionRegistry {
    fn default() -> Self {
        Self::new()
    }
}

impl ActionRegistry {
    pub fn new() -> Self {
        Self {
            handlers: HashMap::new(),
            fallback: Arc::new(LogOnlyHandler),
        }
    }

    /// Registers `handler` for `kind`, replacing any previous one.
    pub fn register(&mut self, kind: ActionKind, handler: Arc<dyn ActionHandler>) {
        self.handlers.insert(kind, handler);
    }

    pub fn set_fallback(&mut self, handler: Arc<dyn ActionHandler>) {
        self.fallback = handler;
    }

    pub fn handler_for(&self, kind: ActionKind) -> Arc<dyn ActionHandler> {
        self.handlers
            .get(&kind)
            .cloned()
            .unwrap_or_else(|| self.fallback.clone())
    }

    pub fn is_registered(&self, kind: ActionKind) -> bool {
        self.handlers.contains_key(&kind)
    }
}

/// Whether reaching `node` dispatches an action.
pub fn is_action(node: &Node) -> bool {
    node.kind == NodeKind::Action
}
