//! Core error types.

use thiserror::Error;

/// Errors from the workflow engine.
#[derive(Debug, Error)]
pub enum CoreError {
    #[error("workflow graph has no nodes")]
    EmptyGraph,

    #[error("invalid workflow graph: {reason}")]
    InvalidGraph { reason: String },

    #[error("instance not found: {instance_id}")]
    InstanceNotFound { instance_id: String },

    #[error("instance already exists: {instance_id}")]
    InstanceExists { instance_id: String },

    #[error("node '{node_id}' is not part of the workflow graph")]
    UnknownNode { node_id: String },

    #[error("invalid condition on node '{node_id}': {reason}")]
    InvalidCondition { node_id: String, reason: String },

    #[error("invalid transition from '{node_id}': {reason}")]
    InvalidTransition { node_id: String, reason: String },

    #[error("instance {instance_id} is {actual}, expected {expected}")]
    InvalidStatus {
        instance_id: String,
        expected: String,
        actual: String,
    },

    #[error("tenant mismatch: instance belongs to '{actual}', store serves '{expected}'")]
    TenantMismatch { expected: String, actual: String },

    #[error("storage error: {reason}")]
    Storage { reason: String, retryable: bool },

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("YAML error: {0}")]
    Yaml(#[from] serde_yaml::Error),
}

impl CoreError {
    /// Returns whether this error indicates the operation can be retried.
    pub fn is_retryable(&self) -> bool {
        matches!(self, CoreError::Storage { retryable: true, .. })
    }

    /// Returns a stable code for callers that map errors onto responses.
    pub fn error_code(&self) -> &'static str {
        match self {
            CoreError::EmptyGraph => "EMPTY_GRAPH",
            CoreError::InvalidGraph { .. } => "INVALID_GRAPH",
            CoreError::InstanceNotFound { .. } => "INSTANCE_NOT_FOUND",
            CoreError::InstanceExists { .. } => "INSTANCE_EXISTS",
            CoreError::UnknownNode { .. } => "UNKNOWN_NODE",
            CoreError::InvalidCondition { .. } => "INVALID_CONDITION",
            CoreError::InvalidTransition { .. } => "INVALID_TRANSITION",
            CoreError::InvalidStatus { .. } => "INVALID_STATUS",
            CoreError::TenantMismatch { .. } => "TENANT_MISMATCH",
            CoreError::Storage { .. } => "STORAGE_ERROR",
            CoreError::Json(_) | CoreError::Yaml(_) => "BAD_REQUEST",
        }
    }

    pub(crate) fn not_found(instance_id: &str) -> Self {
        CoreError::InstanceNotFound {
            instance_id: instance_id.to_string(),
        }
    }
}
