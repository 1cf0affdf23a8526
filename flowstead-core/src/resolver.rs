//! Next-node resolution.

use crate::condition::Condition;
use crate::error::CoreError;
use crate::graph::{Edge, NodeKind, WorkflowGraph};
use crate::history::ConditionOutcome;
use crate::Context;

/// Where the token goes next, and why.
#[derive(Debug, Clone, PartialEq)]
pub struct Resolution {
    pub to_node_id: String,
    pub edge_label: Option<String>,
    /// Set when the move was decided by a condition node.
    pub condition: Option<ConditionOutcome>,
}

impl Resolution {
    fn along(edge: &Edge, condition: Option<ConditionOutcome>) -> Self {
        Self {
            to_node_id: edge.to_id.clone(),
            edge_label: edge.label.clone(),
            condition,
        }
    }
}

/// Computes the next node for a token on `current_node_id`.
///
/// Returns `Ok(None)` when the node has no outgoing edges. Only one path is
/// ever taken: condition nodes pick the edge labeled with the evaluated
/// result, every other node follows its first edge.
///
/// With `strict` unset, a condition node lacking an edge for its result
/// follows its first edge and an unknown operator compares as `==`. With
/// `strict` set both are errors.
pub fn resolve_next(
    graph: &WorkflowGraph,
    current_node_id: &str,
    context: &Context,
    strict: bool,
) -> Result<Option<Resolution>, CoreError> {
    let node = graph
        .node(current_node_id)
        .ok_or_else(|| CoreError::UnknownNode {
            node_id: current_node_id.to_string(),
        })?;

    let outgoing = graph.outgoing_edges(current_node_id);
    let Some(first) = outgoing.first() else {
        return Ok(None);
    };

    if node.kind != NodeKind::Condition {
        return Ok(Some(Resolution::along(first, None)));
    }

    let condition = Condition::from_node(node);
    let result = if strict {
        condition.evaluate_strict(context, &node.id)?
    } else {
        condition.evaluate(context)
    };
    let outcome = ConditionOutcome {
        variable: condition.variable,
        operator: condition.operator,
        value: condition.value,
        result,
    };

    let wanted = if result { "true" } else { "false" };
    match outgoing
        .iter()
        .find(|e| e.label.as_deref().map(str::trim) == Some(wanted))
    {
        Some(edge) => Ok(Some(Resolution::along(edge, Some(outcome)))),
        None if strict => Err(CoreError::InvalidTransition {
            node_id: node.id.clone(),
            reason: format!("no outgoing edge labeled '{}'", wanted),
        }),
        None => {
            tracing::warn!(
                node_id = %node.id,
                wanted,
                fallback = %first.to_id,
                "no edge for condition result, following first edge"
            );
            Ok(Some(Resolution::along(first, Some(outcome))))
        }
    }
}
