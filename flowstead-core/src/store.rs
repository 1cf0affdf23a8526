//! Persistence contract for instances and their audit trail.

use crate::error::CoreError;
use crate::history::{sort_action_logs, sort_history, ActionLog, TransitionRecord};
use crate::instance::WorkflowInstance;
use dashmap::mapref::entry::Entry;
use dashmap::DashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

/// Everything one engine operation changes: the new instance image and the
/// audit records produced on the way. Stores persist a step all-or-nothing.
#[derive(Debug, Clone)]
pub struct Step {
    pub instance: WorkflowInstance,
    /// The step creates the instance rather than replacing it.
    pub creates: bool,
    pub transitions: Vec<TransitionRecord>,
    pub action_logs: Vec<ActionLog>,
}

impl Step {
    pub fn create(instance: WorkflowInstance) -> Self {
        Self {
            instance,
            creates: true,
            transitions: Vec::new(),
            action_logs: Vec::new(),
        }
    }

    pub fn update(instance: WorkflowInstance) -> Self {
        Self {
            creates: false,
            ..Self::create(instance)
        }
    }

    pub fn with_transition(mut self, record: TransitionRecord) -> Self {
        self.transitions.push(record);
        self
    }

    pub fn with_action_logs(mut self, logs: impl IntoIterator<Item = ActionLog>) -> Self {
        self.action_logs.extend(logs);
        self
    }

    /// Id of the instance the step belongs to.
    pub fn instance_id(&self) -> &str {
        &self.instance.id
    }
}

/// Where the engine keeps instances, transitions and action logs.
///
/// Implementations must be internally synchronized. The engine serializes
/// nothing itself; callers serialize access per instance.
pub trait WorkflowStore: Send + Sync {
    /// Persists a step atomically.
    ///
    /// A creating step fails with `InstanceExists` on a duplicate id; any
    /// other step fails with `InstanceNotFound` when the instance is gone.
    fn commit_step(&self, step: &Step) -> Result<(), CoreError>;

    fn load_instance(&self, instance_id: &str) -> Result<Option<WorkflowInstance>, CoreError>;

    /// Removes an instance with its transitions and action logs. Returns
    /// whether anything was removed.
    fn delete_instance(&self, instance_id: &str) -> Result<bool, CoreError>;

    /// Instances ordered by creation time, optionally restricted to a tenant.
    fn list_instances(&self, tenant_id: Option<&str>) -> Result<Vec<WorkflowInstance>, CoreError>;

    /// Allocates the next audit sequence number. Strictly increasing.
    fn next_sequence(&self) -> u64;

    /// Transitions of an instance in history order.
    fn transitions(&self, instance_id: &str) -> Result<Vec<TransitionRecord>, CoreError>;

    /// Action logs of an instance in dispatch order.
    fn action_logs(&self, instance_id: &str) -> Result<Vec<ActionLog>, CoreError>;
}

impl<S: WorkflowStore + ?Sized> WorkflowStore for Arc<S> {
    fn commit_step(&self, step: &Step) -> Result<(), CoreError> {
        (**self).commit_step(step)
    }

    fn load_instance(&self, instance_id: &str) -> Result<Option<WorkflowInstance>, CoreError> {
        (**self).load_instance(instance_id)
    }

    fn delete_instance(&self, instance_id: &str) -> Result<bool, CoreError> {
        (**self).delete_instance(instance_id)
    }

    fn list_instances(&self, tenant_id: Option<&str>) -> Result<Vec<WorkflowInstance>, CoreError> {
        (**self).list_instances(tenant_id)
    }

    fn next_sequence(&self) -> u64 {
        (**self).next_sequence()
    }

    fn transitions(&self, instance_id: &str) -> Result<Vec<TransitionRecord>, CoreError> {
        (**self).transitions(instance_id)
    }

    fn action_logs(&self, instance_id: &str) -> Result<Vec<ActionLog>, CoreError> {
        (**self).action_logs(instance_id)
    }
}

/// Volatile store backed by concurrent maps.
#[derive(Debug)]
pub struct MemoryStore {
    instances: DashMap<String, WorkflowInstance>,
    transitions: DashMap<String, Vec<TransitionRecord>>,
    action_logs: DashMap<String, Vec<ActionLog>>,
    sequence: AtomicU64,
}

impl Default for MemoryStore {
    fn default() -> Self {
        Self::new()
    }
}

impl MemoryStore {
    pub fn new() -> Self {
        Self {
            instances: DashMap::new(),
            transitions: DashMap::new(),
            action_logs: DashMap::new(),
            sequence: AtomicU64::new(1),
        }
    }

    pub fn instance_count(&self) -> usize {
        self.instances.len()
    }
}

impl WorkflowStore for MemoryStore {
    fn commit_step(&self, step: &Step) -> Result<(), CoreError> {
        let id = step.instance_id();
        // The instance entry stays locked until the audit records are in.
        let _slot = match (self.instances.entry(id.to_string()), step.creates) {
            (Entry::Occupied(_), true) => {
                return Err(CoreError::InstanceExists {
                    instance_id: id.to_string(),
                })
            }
            (Entry::Vacant(_), false) => return Err(CoreError::not_found(id)),
            (Entry::Occupied(mut slot), false) => {
                slot.insert(step.instance.clone());
                slot.into_ref()
            }
            (Entry::Vacant(slot), true) => slot.insert(step.instance.clone()),
        };

        if !step.transitions.is_empty() {
            self.transitions
                .entry(id.to_string())
                .or_default()
                .extend(step.transitions.iter().cloned());
        }
        if !step.action_logs.is_empty() {
            self.action_logs
                .entry(id.to_string())
                .or_default()
                .extend(step.action_logs.iter().cloned());
        }
        Ok(())
    }

    fn load_instance(&self, instance_id: &str) -> Result<Option<WorkflowInstance>, CoreError> {
        Ok(self.instances.get(instance_id).map(|r| r.value().clone()))
    }

    fn delete_instance(&self, instance_id: &str) -> Result<bool, CoreError> {
        let removed = self.instances.remove(instance_id).is_some();
        self.transitions.remove(instance_id);
        self.action_logs.remove(instance_id);
        Ok(removed)
    }

    fn list_instances(&self, tenant_id: Option<&str>) -> Result<Vec<WorkflowInstance>, CoreError> {
        let mut out: Vec<WorkflowInstance> = self
            .instances
            .iter()
            .filter(|r| tenant_id.map_or(true, |t| r.tenant_id == t))
            .map(|r| r.value().clone())
            .collect();
        out.sort_by(|a, b| (a.created_at, &a.id).cmp(&(b.created_at, &b.id)));
        Ok(out)
    }

    fn next_sequence(&self) -> u64 {
        self.sequence.fetch_add(1, Ordering::SeqCst)
    }

    fn transitions(&self, instance_id: &str) -> Result<Vec<TransitionRecord>, CoreError> {
        let mut records = self
            .transitions
            .get(instance_id)
            .map(|r| r.value().clone())
            .unwrap_or_default();
        sort_history(&mut records);
        Ok(records)
    }

    fn action_logs(&self, instance_id: &str) -> Result<Vec<ActionLog>, CoreError> {
        let mut logs = self
            .action_logs
            .get(instance_id)
            .map(|r| r.value().clone())
            .unwrap_or_default();
        sort_action_logs(&mut logs);
        Ok(logs)
    }
}
