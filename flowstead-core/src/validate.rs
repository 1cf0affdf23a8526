//! Structural checks for workflow graphs.

use crate::action::ActionKind;
use crate::condition::Operator;
use crate::graph::{NodeKind, WorkflowGraph};
use serde::Serialize;
use std::collections::HashSet;

/// Outcome of [`validate_graph`]. Errors make a graph unusable in strict
/// mode; warnings flag places where the engine falls back to a default.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct ValidationReport {
    pub errors: Vec<String>,
    pub warnings: Vec<String>,
}

impl ValidationReport {
    pub fn is_valid(&self) -> bool {
        self.errors.is_empty()
    }
}

/// Validate a graph for structural correctness.
pub fn validate_graph(graph: &WorkflowGraph) -> ValidationReport {
    let mut report = ValidationReport::default();

    if graph.is_empty() {
        report.errors.push("Graph has no nodes".to_string());
        return report;
    }

    // 1. No duplicate node IDs.
    let mut seen = HashSet::new();
    for node in graph.nodes() {
        if !seen.insert(node.id.as_str()) {
            report.errors.push(format!("Duplicate node ID: {}", node.id));
        }
    }

    // 2. All edge endpoints reference existing nodes.
    for (i, edge) in graph.edges().iter().enumerate() {
        if !seen.contains(edge.from_id.as_str()) {
            report.errors.push(format!(
                "Edge #{} references unknown source node: {}",
                i, edge.from_id
            ));
        }
        if !seen.contains(edge.to_id.as_str()) {
            report.errors.push(format!(
                "Edge #{} references unknown target node: {}",
                i, edge.to_id
            ));
        }
    }

    // 3. Exactly one entry node.
    let entries = graph.entry_candidates();
    match entries.len() {
        1 => {}
        0 => report.warnings.push(format!(
            "No entry node (all nodes have incoming edges); starting at {}",
            graph.nodes()[0].id
        )),
        n => report.warnings.push(format!(
            "{} entry candidates; starting at {}",
            n, graph.nodes()[0].id
        )),
    }

    // 4. Per-node checks.
    for node in graph.nodes() {
        match node.kind {
            NodeKind::Condition => {
                match node.property("variable") {
                    Some(v) if !v.trim().is_empty() => {}
                    _ => report
                        .errors
                        .push(format!("Condition node {} has no variable", node.id)),
                }
                let op = node.property("operator").unwrap_or_default();
                if !op.trim().is_empty() && Operator::parse(op).is_none() {
                    report.errors.push(format!(
                        "Condition node {} has unknown operator '{}'",
                        node.id, op
                    ));
                }

                let labels: HashSet<&str> = graph
                    .outgoing_edges(&node.id)
                    .iter()
                    .filter_map(|e| e.label.as_deref().map(str::trim))
                    .collect();
                if !(labels.contains("true") && labels.contains("false")) {
                    report.warnings.push(format!(
                        "Condition node {} lacks a 'true' or 'false' edge",
                        node.id
                    ));
                }
            }
            NodeKind::Action => {
                if ActionKind::for_node(node) == ActionKind::Unknown {
                    report.warnings.push(format!(
                        "Action node {} has no recognizable action type",
                        node.id
                    ));
                }
            }
            NodeKind::Terminal => {
                if graph.has_outgoing(&node.id) {
                    report.warnings.push(format!(
                        "Terminal node {} has outgoing edges that are never taken",
                        node.id
                    ));
                }
            }
        }
    }

    report
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::graph::{Edge, Node};

    fn condition(id: &str, variable: &str, op: &str) -> Node {
        Node::new(id, NodeKind::Condition)
            .with_property("variable", variable)
            .with_property("operator", op)
            .with_property("value", "1")
    }

    #[test]
    fn test_valid_graph() {
        let graph = WorkflowGraph::new(
            vec![
                Node::new("a", NodeKind::Action).with_label("Send email"),
                condition("c", "n", ">="),
                Node::new("t", NodeKind::Terminal),
                Node::new("f", NodeKind::Terminal),
            ],
            vec![
                Edge::new("a", "c"),
                Edge::labeled("c", "t", "true"),
                Edge::labeled("c", "f", "false"),
            ],
        );
        let report = validate_graph(&graph);
        assert!(report.is_valid(), "{:?}", report);
        assert!(report.warnings.is_empty(), "{:?}", report);
    }

    #[test]
    fn test_empty_graph() {
        let report = validate_graph(&WorkflowGraph::default());
        assert!(!report.is_valid());
        assert_eq!(report.errors.len(), 1);
    }

    #[test]
    fn test_duplicate_ids_and_dangling_edges() {
        let graph = WorkflowGraph::new(
            vec![
                Node::new("a", NodeKind::Terminal),
                Node::new("a", NodeKind::Terminal),
            ],
            vec![Edge::new("a", "ghost")],
        );
        let report = validate_graph(&graph);
        assert!(report.errors.iter().any(|e| e.contains("Duplicate node ID: a")));
        assert!(report.errors.iter().any(|e| e.contains("unknown target node: ghost")));
    }

    #[test]
    fn test_bad_condition_nodes() {
        let graph = WorkflowGraph::new(
            vec![condition("c1", "", ">"), condition("c2", "x", "=~")],
            vec![],
        );
        let report = validate_graph(&graph);
        assert!(report.errors.iter().any(|e| e.contains("c1 has no variable")));
        assert!(report.errors.iter().any(|e| e.contains("unknown operator '=~'")));
        assert!(report.warnings.iter().any(|w| w.contains("c1 lacks")));
    }

    #[test]
    fn test_warnings_do_not_invalidate() {
        let graph = WorkflowGraph::new(
            vec![
                Node::new("a", NodeKind::Action).with_label("do something"),
                Node::new("b", NodeKind::Action).with_action(ActionKind::Notification),
            ],
            vec![],
        );
        let report = validate_graph(&graph);
        assert!(report.is_valid());
        assert!(report.warnings.iter().any(|w| w.contains("2 entry candidates")));
        assert!(report.warnings.iter().any(|w| w.contains("Action node a")));
        assert!(!report.warnings.iter().any(|w| w.contains("Action node b")));
    }
}
