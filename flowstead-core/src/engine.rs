//! Instance lifecycle: start, advance, context updates and history.

use crate::action::{is_action, ActionHandler, ActionKind, ActionRegistry, ActionRequest};
use crate::error::CoreError;
use crate::graph::{NodeKind, WorkflowGraph};
use crate::history::{ActionLog, ActionOutcome, ActionStatus, TransitionRecord};
use crate::instance::{now_millis, EntityRef, InstanceStatus, WorkflowInstance};
use crate::resolver::{resolve_next, Resolution};
use crate::store::{Step, WorkflowStore};
use crate::validate::validate_graph;
use crate::Context;
use parking_lot::RwLock;
use serde::{Deserialize, Serialize};
use serde_json::json;
use std::sync::Arc;

/// Engine behavior switches.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct EngineConfig {
    /// Reject graphs and moves that lenient mode silently repairs.
    pub strict: bool,
    /// Mark the instance `failed` when an action handler returns an error.
    pub halt_on_action_failure: bool,
}

/// Parameters for [`WorkflowEngine::start`].
#[derive(Debug, Clone)]
pub struct StartRequest {
    pub tenant_id: String,
    pub workflow_name: String,
    pub graph: WorkflowGraph,
    pub initial_context: Context,
    pub entity: Option<EntityRef>,
}

impl StartRequest {
    pub fn new(
        tenant_id: impl Into<String>,
        workflow_name: impl Into<String>,
        graph: WorkflowGraph,
    ) -> Self {
        Self {
            tenant_id: tenant_id.into(),
            workflow_name: workflow_name.into(),
            graph,
            initial_context: Context::new(),
            entity: None,
        }
    }

    pub fn with_context(mut self, context: Context) -> Self {
        self.initial_context = context;
        self
    }

    pub fn with_entity(mut self, entity: EntityRef) -> Self {
        self.entity = Some(entity);
        self
    }
}

/// Drives workflow instances through their graphs.
pub struct WorkflowEngine<S> {
    store: S,
    actions: RwLock<ActionRegistry>,
    config: EngineConfig,
}

impl<S: WorkflowStore> WorkflowEngine<S> {
    pub fn new(store: S) -> Self {
        Self::with_config(store, EngineConfig::default())
    }

    pub fn with_config(store: S, config: EngineConfig) -> Self {
        Self {
            store,
            actions: RwLock::new(ActionRegistry::new()),
            config,
        }
    }

    /// Registers the handler for an action kind.
    pub fn register_action(&self, kind: ActionKind, handler: impl ActionHandler + 'static) {
        self.actions.write().register(kind, Arc::new(handler));
    }

    /// Replaces the handler used for kinds without a registration.
    pub fn set_fallback_action(&self, handler: impl ActionHandler + 'static) {
        self.actions.write().set_fallback(Arc::new(handler));
    }

    pub fn store(&self) -> &S {
        &self.store
    }

    pub fn config(&self) -> EngineConfig {
        self.config
    }

    // =========================================================================
    // Lifecycle
    // =========================================================================

    /// Creates a running instance on the graph's entry node and runs that
    /// node's side effects.
    pub fn start(&self, request: StartRequest) -> Result<WorkflowInstance, CoreError> {
        let StartRequest {
            tenant_id,
            workflow_name,
            graph,
            initial_context,
            entity,
        } = request;

        if graph.is_empty() {
            return Err(CoreError::EmptyGraph);
        }
        if self.config.strict {
            check_strict(&graph)?;
        }

        let entry = graph.entry_node().ok_or(CoreError::EmptyGraph)?.id.clone();
        let mut instance = WorkflowInstance::new(
            tenant_id,
            workflow_name,
            graph,
            entry,
            initial_context,
            entity,
        );
        let effect = self.execute_node_side_effects(&mut instance);
        let step = Step::create(instance).with_action_logs(effect.map(|(_, log)| log));
        self.store.commit_step(&step)?;

        let instance = step.instance;
        tracing::info!(
            instance_id = %instance.id,
            tenant_id = %instance.tenant_id,
            workflow = %instance.workflow_name,
            entry = %instance.current_node_id,
            "workflow started"
        );
        Ok(instance)
    }

    /// Moves the instance one step.
    ///
    /// With `target` set the token jumps there directly; otherwise the
    /// resolver picks the next node. `edge_label` overrides the label
    /// recorded on the transition. Instances that are not running are
    /// returned unchanged.
    pub fn advance(
        &self,
        instance_id: &str,
        target: Option<&str>,
        edge_label: Option<&str>,
    ) -> Result<WorkflowInstance, CoreError> {
        let mut instance = self.get(instance_id)?;
        if !instance.is_running() {
            tracing::debug!(
                instance_id,
                status = %instance.status,
                "advance ignored, instance not running"
            );
            return Ok(instance);
        }

        let resolution = match target {
            Some(node_id) => Some(Resolution {
                to_node_id: node_id.to_string(),
                edge_label: instance
                    .graph
                    .outgoing_edges(&instance.current_node_id)
                    .iter()
                    .find(|e| e.to_id == node_id)
                    .and_then(|e| e.label.clone()),
                condition: None,
            }),
            None => resolve_next(
                &instance.graph,
                &instance.current_node_id,
                &instance.context,
                self.config.strict,
            )?,
        };

        let now = now_millis();
        let Some(resolution) = resolution else {
            instance.complete(now);
            let step = Step::update(instance);
            self.store.commit_step(&step)?;
            tracing::info!(
                instance_id,
                node_id = %step.instance.current_node_id,
                "workflow completed"
            );
            return Ok(step.instance);
        };

        if !instance.graph.contains(&resolution.to_node_id) {
            return Err(CoreError::UnknownNode {
                node_id: resolution.to_node_id,
            });
        }

        let from_node_id = instance.current_node_id.clone();
        instance.move_to(resolution.to_node_id.clone(), now);
        let (action_executed, action_log) = self.execute_node_side_effects(&mut instance).unzip();

        let record = TransitionRecord {
            sequence: self.store.next_sequence(),
            instance_id: instance.id.clone(),
            from_node_id,
            to_node_id: resolution.to_node_id,
            edge_label: edge_label.map(str::to_string).or(resolution.edge_label),
            condition_evaluated: resolution.condition,
            action_executed,
            created_at: now,
        };
        tracing::debug!(
            instance_id,
            from = %record.from_node_id,
            to = %record.to_node_id,
            label = ?record.edge_label,
            "transition"
        );

        if instance.is_running() && is_final(&instance.graph, &instance.current_node_id) {
            instance.complete(now);
            tracing::info!(instance_id, node_id = %instance.current_node_id, "workflow completed");
        }

        let step = Step::update(instance)
            .with_transition(record)
            .with_action_logs(action_log);
        self.store.commit_step(&step)?;
        Ok(step.instance)
    }

    /// Shallow-merges `updates` into the instance context.
    pub fn update_context(
        &self,
        instance_id: &str,
        updates: Context,
    ) -> Result<WorkflowInstance, CoreError> {
        let mut instance = self.get(instance_id)?;
        let keys = updates.len();
        instance.merge_context(updates, now_millis());
        self.store.commit_step(&Step::update(instance.clone()))?;
        tracing::debug!(instance_id, keys, "context updated");
        Ok(instance)
    }

    pub fn pause(&self, instance_id: &str) -> Result<WorkflowInstance, CoreError> {
        self.switch_status(instance_id, InstanceStatus::Running, InstanceStatus::Paused)
    }

    pub fn resume(&self, instance_id: &str) -> Result<WorkflowInstance, CoreError> {
        self.switch_status(instance_id, InstanceStatus::Paused, InstanceStatus::Running)
    }

    /// Removes the instance and its audit trail.
    pub fn delete(&self, instance_id: &str) -> Result<(), CoreError> {
        if !self.store.delete_instance(instance_id)? {
            return Err(CoreError::not_found(instance_id));
        }
        tracing::info!(instance_id, "instance deleted");
        Ok(())
    }

    // =========================================================================
    // Queries
    // =========================================================================

    pub fn get(&self, instance_id: &str) -> Result<WorkflowInstance, CoreError> {
        self.store
            .load_instance(instance_id)?
            .ok_or_else(|| CoreError::not_found(instance_id))
    }

    /// Transitions in the order they happened.
    pub fn history(&self, instance_id: &str) -> Result<Vec<TransitionRecord>, CoreError> {
        self.get(instance_id)?;
        self.store.transitions(instance_id)
    }

    pub fn action_logs(&self, instance_id: &str) -> Result<Vec<ActionLog>, CoreError> {
        self.get(instance_id)?;
        self.store.action_logs(instance_id)
    }

    pub fn list(&self, tenant_id: Option<&str>) -> Result<Vec<WorkflowInstance>, CoreError> {
        self.store.list_instances(tenant_id)
    }

    // =========================================================================
    // Internals
    // =========================================================================

    fn switch_status(
        &self,
        instance_id: &str,
        from: InstanceStatus,
        to: InstanceStatus,
    ) -> Result<WorkflowInstance, CoreError> {
        let mut instance = self.get(instance_id)?;
        if instance.status != from {
            return Err(CoreError::InvalidStatus {
                instance_id: instance_id.to_string(),
                expected: from.to_string(),
                actual: instance.status.to_string(),
            });
        }
        instance.set_status(to, now_millis());
        self.store.commit_step(&Step::update(instance.clone()))?;
        tracing::info!(instance_id, status = %to, "status changed");
        Ok(instance)
    }

    /// Runs the action of the node the instance sits on.
    ///
    /// Handler failures never propagate; they are logged and, with
    /// `halt_on_action_failure`, fail the instance. The caller persists the
    /// instance together with the returned log.
    fn execute_node_side_effects(
        &self,
        instance: &mut WorkflowInstance,
    ) -> Option<(ActionOutcome, ActionLog)> {
        let node = match instance.current_node() {
            Some(node) if is_action(node) => node.clone(),
            _ => return None,
        };

        let kind = ActionKind::for_node(&node);
        let handler = self.actions.read().handler_for(kind);
        let request = ActionRequest {
            kind,
            instance: &*instance,
            node: &node,
        };
        let params = request.params();
        let executed = handler.execute(&request);

        let now = now_millis();
        let mut log = ActionLog {
            sequence: self.store.next_sequence(),
            instance_id: instance.id.clone(),
            node_id: node.id.clone(),
            action_type: kind,
            action_params: params.clone(),
            status: ActionStatus::Success,
            result: None,
            error_message: None,
            created_at: now,
        };

        let result = match executed {
            Ok(value) => {
                log.result = Some(value.clone());
                value
            }
            Err(err) => {
                tracing::warn!(
                    instance_id = %instance.id,
                    node_id = %node.id,
                    kind = %kind,
                    error = %err,
                    "action failed"
                );
                log.status = ActionStatus::Failed;
                log.error_message = Some(err.message.clone());
                if self.config.halt_on_action_failure {
                    instance.set_status(InstanceStatus::Failed, now);
                }
                json!({ "error": err.message })
            }
        };
        let outcome = ActionOutcome {
            action_type: kind,
            params,
            result,
        };
        Some((outcome, log))
    }
}

/// Whether a token on `node_id` has nowhere further to go.
fn is_final(graph: &WorkflowGraph, node_id: &str) -> bool {
    match graph.node(node_id) {
        Some(node) => node.kind == NodeKind::Terminal || !graph.has_outgoing(node_id),
        None => true,
    }
}

fn check_strict(graph: &WorkflowGraph) -> Result<(), CoreError> {
    let report = validate_graph(graph);
    if !report.is_valid() {
        return Err(CoreError::InvalidGraph {
            reason: report.errors.join("; "),
        });
    }
    let entries = graph.entry_candidates().len();
    if entries != 1 {
        return Err(CoreError::InvalidGraph {
            reason: format!("expected exactly one entry node, found {}", entries),
        });
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::action::ActionError;
    use crate::graph::{Edge, Node};
    use crate::store::MemoryStore;
    use serde_json::Value;

    struct Failing;

    impl ActionHandler for Failing {
        fn execute(&self, _request: &ActionRequest<'_>) -> Result<Value, ActionError> {
            Err(ActionError::new("smtp down"))
        }
    }

    fn chain() -> WorkflowGraph {
        WorkflowGraph::new(
            vec![
                Node::new("a", NodeKind::Action).with_label("Send email"),
                Node::new("b", NodeKind::Action).with_label("Generate invoice"),
                Node::new("c", NodeKind::Terminal),
            ],
            vec![Edge::new("a", "b"), Edge::new("b", "c")],
        )
    }

    #[test]
    fn test_start_runs_entry_action() {
        let engine = WorkflowEngine::new(MemoryStore::new());
        let inst = engine.start(StartRequest::new("acme", "order", chain())).unwrap();

        assert_eq!(inst.current_node_id, "a");
        assert_eq!(inst.status, InstanceStatus::Running);
        let logs = engine.action_logs(&inst.id).unwrap();
        assert_eq!(logs.len(), 1);
        assert_eq!(logs[0].action_type, ActionKind::Notification);
        assert_eq!(logs[0].status, ActionStatus::Success);
    }

    #[test]
    fn test_transition_carries_action_outcome() {
        let engine = WorkflowEngine::new(MemoryStore::new());
        let inst = engine.start(StartRequest::new("acme", "order", chain())).unwrap();
        engine.advance(&inst.id, None, None).unwrap();

        let history = engine.history(&inst.id).unwrap();
        let action = history[0].action_executed.as_ref().unwrap();
        assert_eq!(action.action_type, ActionKind::DocumentGeneration);
        assert_eq!(action.params["label"], "Generate invoice");
    }

    #[test]
    fn test_halt_on_action_failure() {
        let config = EngineConfig {
            halt_on_action_failure: true,
            ..Default::default()
        };
        let engine = WorkflowEngine::with_config(MemoryStore::new(), config);
        engine.register_action(ActionKind::DocumentGeneration, Failing);

        let inst = engine.start(StartRequest::new("acme", "order", chain())).unwrap();
        let inst = engine.advance(&inst.id, None, None).unwrap();
        assert_eq!(inst.status, InstanceStatus::Failed);
        assert_eq!(inst.current_node_id, "b");

        // Failed instances no longer move.
        let again = engine.advance(&inst.id, None, None).unwrap();
        assert_eq!(again.current_node_id, "b");
        assert_eq!(engine.history(&inst.id).unwrap().len(), 1);
    }

    #[test]
    fn test_failure_without_halt_keeps_running() {
        let engine = WorkflowEngine::new(MemoryStore::new());
        engine.register_action(ActionKind::Notification, Failing);

        let inst = engine.start(StartRequest::new("acme", "order", chain())).unwrap();
        assert_eq!(inst.status, InstanceStatus::Running);
        let logs = engine.action_logs(&inst.id).unwrap();
        assert_eq!(logs[0].status, ActionStatus::Failed);
        assert_eq!(logs[0].error_message.as_deref(), Some("smtp down"));
    }

    #[test]
    fn test_strict_rejects_ambiguous_entry() {
        let graph = WorkflowGraph::new(
            vec![
                Node::new("a", NodeKind::Terminal),
                Node::new("b", NodeKind::Terminal),
            ],
            vec![],
        );
        let strict = WorkflowEngine::with_config(
            MemoryStore::new(),
            EngineConfig {
                strict: true,
                ..Default::default()
            },
        );
        assert!(matches!(
            strict.start(StartRequest::new("acme", "wf", graph.clone())),
            Err(CoreError::InvalidGraph { .. })
        ));

        let lenient = WorkflowEngine::new(MemoryStore::new());
        let inst = lenient.start(StartRequest::new("acme", "wf", graph)).unwrap();
        assert_eq!(inst.current_node_id, "a");
    }

    #[test]
    fn test_explicit_target_must_exist() {
        let engine = WorkflowEngine::new(MemoryStore::new());
        let inst = engine.start(StartRequest::new("acme", "order", chain())).unwrap();
        assert!(matches!(
            engine.advance(&inst.id, Some("zz"), None),
            Err(CoreError::UnknownNode { .. })
        ));

        let jumped = engine.advance(&inst.id, Some("c"), Some("skip")).unwrap();
        assert_eq!(jumped.current_node_id, "c");
        assert!(jumped.is_completed());
        let history = engine.history(&inst.id).unwrap();
        assert_eq!(history[0].edge_label.as_deref(), Some("skip"));
    }

    #[test]
    fn test_pause_resume() {
        let engine = WorkflowEngine::new(MemoryStore::new());
        let inst = engine.start(StartRequest::new("acme", "order", chain())).unwrap();

        assert!(matches!(
            engine.resume(&inst.id),
            Err(CoreError::InvalidStatus { .. })
        ));
        let paused = engine.pause(&inst.id).unwrap();
        assert_eq!(paused.status, InstanceStatus::Paused);
        assert_eq!(engine.advance(&inst.id, None, None).unwrap().current_node_id, "a");

        let resumed = engine.resume(&inst.id).unwrap();
        assert!(resumed.is_running());
        assert_eq!(engine.advance(&inst.id, None, None).unwrap().current_node_id, "b");
    }

    #[test]
    fn test_delete() {
        let engine = WorkflowEngine::new(MemoryStore::new());
        let inst = engine.start(StartRequest::new("acme", "order", chain())).unwrap();
        engine.delete(&inst.id).unwrap();
        assert!(matches!(
            engine.get(&inst.id),
            Err(CoreError::InstanceNotFound { .. })
        ));
        assert!(matches!(
            engine.delete(&inst.id),
            Err(CoreError::InstanceNotFound { .. })
        ));
    }
}
