//! # flowstead-core
//!
//! Workflow execution engine.
//!
//! This crate provides:
//! - Workflow graph snapshots and structural validation
//! - Condition evaluation against an instance context
//! - Next-node resolution for action, condition and terminal nodes
//! - Action dispatch through registered handlers
//! - The instance lifecycle manager and its persistence contract

pub mod action;
pub mod condition;
pub mod engine;
pub mod error;
pub mod graph;
pub mod history;
pub mod instance;
pub mod resolver;
pub mod store;
pub mod validate;

pub use action::{ActionError, ActionHandler, ActionKind, ActionRegistry, ActionRequest};
pub use condition::{Condition, Operator};
pub use engine::{EngineConfig, StartRequest, WorkflowEngine};
pub use error::CoreError;
pub use graph::{Edge, Node, NodeKind, WorkflowGraph};
pub use history::{ActionLog, ActionOutcome, ActionStatus, ConditionOutcome, TransitionRecord};
pub use instance::{EntityRef, InstanceStatus, WorkflowInstance};
pub use resolver::{resolve_next, Resolution};
pub use store::{MemoryStore, Step, WorkflowStore};
pub use validate::{validate_graph, ValidationReport};

/// Context map carried by an instance.
pub type Context = serde_json::Map<String, serde_json::Value>;
