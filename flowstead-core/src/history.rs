//! Audit records: transitions and action logs.

use crate::action::ActionKind;
use serde::{Deserialize, Serialize};
use serde_json::Value;

/// A condition as it was evaluated during a transition.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ConditionOutcome {
    pub variable: String,
    pub operator: String,
    pub value: String,
    pub result: bool,
}

/// The action run on arrival at the transition's target node.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ActionOutcome {
    pub action_type: ActionKind,
    pub params: Value,
    pub result: Value,
}

/// A recorded move of the token from one node to another.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TransitionRecord {
    /// Store-wide ordering key; breaks ties between equal timestamps.
    pub sequence: u64,
    pub instance_id: String,
    pub from_node_id: String,
    pub to_node_id: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub edge_label: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub condition_evaluated: Option<ConditionOutcome>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub action_executed: Option<ActionOutcome>,
    pub created_at: i64,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ActionStatus {
    Success,
    Failed,
}

/// Record of one action dispatch.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ActionLog {
    pub sequence: u64,
    pub instance_id: String,
    pub node_id: String,
    pub action_type: ActionKind,
    pub action_params: Value,
    pub status: ActionStatus,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub result: Option<Value>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error_message: Option<String>,
    pub created_at: i64,
}

/// Sorts transitions into history order: by time, then sequence.
pub fn sort_history(records: &mut [TransitionRecord]) {
    records.sort_by_key(|r| (r.created_at, r.sequence));
}

pub fn sort_action_logs(logs: &mut [ActionLog]) {
    logs.sort_by_key(|l| (l.created_at, l.sequence));
}

#[cfg(test)]
mod tests {
    use super::*;

    fn record(sequence: u64, created_at: i64) -> TransitionRecord {
        TransitionRecord {
            sequence,
            instance_id: "wf-1".into(),
            from_node_id: "a".into(),
            to_node_id: "b".into(),
            edge_label: None,
            condition_evaluated: None,
            action_executed: None,
            created_at,
        }
    }

    #[test]
    fn test_sort_history_by_time_then_sequence() {
        let mut records = vec![record(3, 20), record(2, 10), record(1, 10), record(4, 15)];
        sort_history(&mut records);
        let order: Vec<u64> = records.iter().map(|r| r.sequence).collect();
        assert_eq!(order, vec![1, 2, 4, 3]);
    }

    #[test]
    fn test_optional_fields_omitted() {
        let json = serde_json::to_value(record(1, 1)).unwrap();
        assert!(json.get("edge_label").is_none());
        assert!(json.get("condition_evaluated").is_none());
        let back: TransitionRecord = serde_json::from_value(json).unwrap();
        assert_eq!(back, record(1, 1));
    }
}
