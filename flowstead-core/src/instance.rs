//! Workflow instances.

use crate::graph::{Node, WorkflowGraph};
use crate::Context;
use serde::{Deserialize, Serialize};
use std::fmt;

/// Current wall-clock time in Unix milliseconds.
pub fn now_millis() -> i64 {
    chrono::Utc::now().timestamp_millis()
}

/// Lifecycle status of an instance.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum InstanceStatus {
    #[default]
    Running,
    Completed,
    Failed,
    Paused,
}

impl InstanceStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            InstanceStatus::Running => "running",
            InstanceStatus::Completed => "completed",
            InstanceStatus::Failed => "failed",
            InstanceStatus::Paused => "paused",
        }
    }
}

impl fmt::Display for InstanceStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// The business record an instance was started for.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EntityRef {
    pub entity_type: String,
    pub entity_id: String,
}

impl EntityRef {
    pub fn new(entity_type: impl Into<String>, entity_id: impl Into<String>) -> Self {
        Self {
            entity_type: entity_type.into(),
            entity_id: entity_id.into(),
        }
    }

    /// Parses `type:id`.
    pub fn parse(s: &str) -> Option<Self> {
        let (ty, id) = s.split_once(':')?;
        if ty.is_empty() || id.is_empty() {
            return None;
        }
        Some(Self::new(ty, id))
    }
}

impl fmt::Display for EntityRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}", self.entity_type, self.entity_id)
    }
}

/// One running execution of a workflow graph.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct WorkflowInstance {
    pub id: String,
    pub tenant_id: String,
    pub workflow_name: String,

    /// Graph snapshot taken at start.
    pub graph: WorkflowGraph,
    pub graph_checksum: String,

    pub current_node_id: String,
    pub status: InstanceStatus,

    #[serde(default)]
    pub context: Context,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub entity: Option<EntityRef>,

    /// Unix millis.
    pub created_at: i64,
    pub updated_at: i64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub completed_at: Option<i64>,
}

impl WorkflowInstance {
    /// Creates a running instance positioned on `entry_node_id`.
    pub fn new(
        tenant_id: impl Into<String>,
        workflow_name: impl Into<String>,
        graph: WorkflowGraph,
        entry_node_id: impl Into<String>,
        context: Context,
        entity: Option<EntityRef>,
    ) -> Self {
        let now = now_millis();
        Self {
            id: uuid::Uuid::new_v4().to_string(),
            tenant_id: tenant_id.into(),
            workflow_name: workflow_name.into(),
            graph_checksum: graph.checksum(),
            graph,
            current_node_id: entry_node_id.into(),
            status: InstanceStatus::Running,
            context,
            entity,
            created_at: now,
            updated_at: now,
            completed_at: None,
        }
    }

    pub fn current_node(&self) -> Option<&Node> {
        self.graph.node(&self.current_node_id)
    }

    pub fn is_running(&self) -> bool {
        self.status == InstanceStatus::Running
    }

    pub fn is_completed(&self) -> bool {
        self.status == InstanceStatus::Completed
    }

    /// Moves the token to `node_id`.
    pub fn move_to(&mut self, node_id: impl Into<String>, now: i64) {
        self.current_node_id = node_id.into();
        self.updated_at = now;
    }

    pub fn complete(&mut self, now: i64) {
        self.status = InstanceStatus::Completed;
        self.completed_at = Some(now);
        self.updated_at = now;
    }

    pub fn set_status(&mut self, status: InstanceStatus, now: i64) {
        self.status = status;
        self.updated_at = now;
    }

    /// Shallow merge: each key in `updates` replaces the existing value.
    pub fn merge_context(&mut self, updates: Context, now: i64) {
        for (key, value) in updates {
            self.context.insert(key, value);
        }
        self.updated_at = now;
    }
}
