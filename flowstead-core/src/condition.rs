//! Condition evaluation.
//!
//! A condition compares one context variable against a literal:
//!
//! - the variable is looked up by exact key first, then as a dotted path
//!   (`customer.tier`) through nested objects;
//! - a variable that is absent makes the condition false;
//! - when both sides parse as numbers they are compared numerically,
//!   otherwise as strings (JSON strings raw, other values by their JSON text);
//! - operators are `==`, `!=`, `<`, `>`, `<=`, `>=`.

use crate::error::CoreError;
use crate::graph::Node;
use crate::Context;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::cmp::Ordering;
use std::fmt;

/// Comparison operator.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Operator {
    Eq,
    Ne,
    Lt,
    Gt,
    Le,
    Ge,
}

impl Operator {
    /// Parses an operator symbol.
    pub fn parse(s: &str) -> Option<Self> {
        match s.trim() {
            "==" => Some(Operator::Eq),
            "!=" => Some(Operator::Ne),
            "<" => Some(Operator::Lt),
            ">" => Some(Operator::Gt),
            "<=" => Some(Operator::Le),
            ">=" => Some(Operator::Ge),
            _ => None,
        }
    }

    /// Parses an operator, treating anything unrecognized as `==`.
    pub fn parse_lenient(s: &str) -> Self {
        Self::parse(s).unwrap_or(Operator::Eq)
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Operator::Eq => "==",
            Operator::Ne => "!=",
            Operator::Lt => "<",
            Operator::Gt => ">",
            Operator::Le => "<=",
            Operator::Ge => ">=",
        }
    }

    /// Applies the operator to an ordering. `None` (incomparable, e.g. NaN)
    /// only satisfies `!=`.
    fn holds(&self, ordering: Option<Ordering>) -> bool {
        let Some(ord) = ordering else {
            return *self == Operator::Ne;
        };
        match self {
            Operator::Eq => ord == Ordering::Equal,
            Operator::Ne => ord != Ordering::Equal,
            Operator::Lt => ord == Ordering::Less,
            Operator::Gt => ord == Ordering::Greater,
            Operator::Le => ord != Ordering::Greater,
            Operator::Ge => ord != Ordering::Less,
        }
    }
}

impl fmt::Display for Operator {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A single comparison, as authored on a condition node.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Condition {
    pub variable: String,
    pub operator: String,
    pub value: String,
}

impl Condition {
    pub fn new(
        variable: impl Into<String>,
        operator: impl Into<String>,
        value: impl Into<String>,
    ) -> Self {
        Self {
            variable: variable.into(),
            operator: operator.into(),
            value: value.into(),
        }
    }

    /// Reads the condition from a node's properties. Missing properties
    /// become empty strings (an empty variable never matches; an empty
    /// operator reads as `==`).
    pub fn from_node(node: &Node) -> Self {
        Self::new(
            node.property("variable").unwrap_or_default(),
            node.property("operator").unwrap_or_default(),
            node.property("value").unwrap_or_default(),
        )
    }

    /// Evaluates with lenient operator parsing.
    pub fn evaluate(&self, context: &Context) -> bool {
        evaluate(self, context)
    }

    /// Evaluates, rejecting unknown operators.
    pub fn evaluate_strict(&self, context: &Context, node_id: &str) -> Result<bool, CoreError> {
        let op = Operator::parse(&self.operator).ok_or_else(|| CoreError::InvalidCondition {
            node_id: node_id.to_string(),
            reason: format!("unknown operator '{}'", self.operator),
        })?;
        Ok(compare_variable(op, &self.variable, &self.value, context))
    }
}

impl fmt::Display for Condition {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} {} {}", self.variable, self.operator, self.value)
    }
}

/// Evaluates `condition` against `context`. Pure; unknown operators act as `==`.
pub fn evaluate(condition: &Condition, context: &Context) -> bool {
    let op = Operator::parse_lenient(&condition.operator);
    compare_variable(op, &condition.variable, &condition.value, context)
}

fn compare_variable(op: Operator, variable: &str, expected: &str, context: &Context) -> bool {
    match lookup(context, variable) {
        Some(actual) => compare(op, actual, expected),
        None => false,
    }
}

/// Finds `variable` in the context: exact key first, then dotted path.
pub fn lookup<'a>(context: &'a Context, variable: &str) -> Option<&'a Value> {
    if variable.is_empty() {
        return None;
    }
    if let Some(value) = context.get(variable) {
        return Some(value);
    }
    if !variable.contains('.') {
        return None;
    }

    let mut parts = variable.split('.');
    let mut current = context.get(parts.next()?)?;
    for part in parts {
        current = match current {
            Value::Object(map) => map.get(part)?,
            Value::Array(items) => items.get(part.parse::<usize>().ok()?)?,
            _ => return None,
        };
    }
    Some(current)
}

fn compare(op: Operator, actual: &Value, expected: &str) -> bool {
    match (as_number(actual), parse_number(expected)) {
        (Some(a), Some(b)) => op.holds(a.partial_cmp(&b)),
        _ => op.holds(Some(as_text(actual).as_str().cmp(expected))),
    }
}

fn parse_number(s: &str) -> Option<f64> {
    s.trim().parse::<f64>().ok().filter(|n| n.is_finite())
}

fn as_number(value: &Value) -> Option<f64> {
    match value {
        Value::Number(n) => n.as_f64(),
        Value::String(s) => parse_number(s),
        _ => None,
    }
}

fn as_text(value: &Value) -> String {
    match value {
        Value::String(s) => s.clone(),
        other => other.to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;
    use serde_json::json;

    fn ctx(value: Value) -> Context {
        match value {
            Value::Object(map) => map,
            _ => panic!("context must be an object"),
        }
    }

    #[test]
    fn test_stock_threshold() {
        let cond = Condition::new("stock", ">", "10");
        assert!(!evaluate(&cond, &ctx(json!({"stock": 5}))));
        assert!(evaluate(&cond, &ctx(json!({"stock": 15}))));
        assert!(!evaluate(&cond, &ctx(json!({"stock": 10}))));
    }

    #[test]
    fn test_missing_variable_is_false() {
        let cond = Condition::new("missing_var", "==", "x");
        assert!(!evaluate(&cond, &Context::new()));

        // Even for operators that would otherwise hold.
        let ne = Condition::new("missing_var", "!=", "x");
        assert!(!evaluate(&ne, &Context::new()));
    }

    #[test]
    fn test_numeric_strings_compare_numerically() {
        let cond = Condition::new("qty", "<", "10");
        // "9" < "10" numerically even though "9" > "10" as text.
        assert!(evaluate(&cond, &ctx(json!({"qty": "9"}))));
        assert!(evaluate(&Condition::new("qty", "==", "2.50"), &ctx(json!({"qty": 2.5}))));
    }

    #[test]
    fn test_string_fallback() {
        let cond = Condition::new("status", "==", "approved");
        assert!(evaluate(&cond, &ctx(json!({"status": "approved"}))));
        assert!(!evaluate(&cond, &ctx(json!({"status": "draft"}))));

        // One numeric side is not enough for numeric comparison.
        let mixed = Condition::new("code", "<", "b");
        assert!(evaluate(&mixed, &ctx(json!({"code": 5}))));

        assert!(evaluate(&Condition::new("name", "<", "bob"), &ctx(json!({"name": "alice"}))));
    }

    #[test]
    fn test_non_string_values_compare_by_json_text() {
        assert!(evaluate(&Condition::new("flag", "==", "true"), &ctx(json!({"flag": true}))));
        assert!(evaluate(&Condition::new("note", "==", "null"), &ctx(json!({"note": null}))));
    }

    #[test]
    fn test_all_operators() {
        let c = ctx(json!({"n": 7}));
        let cases = [
            ("==", "7", true),
            ("!=", "7", false),
            ("<", "8", true),
            (">", "8", false),
            ("<=", "7", true),
            (">=", "7", true),
            (">=", "8", false),
        ];
        for (op, value, expected) in cases {
            assert_eq!(
                evaluate(&Condition::new("n", op, value), &c),
                expected,
                "7 {} {}",
                op,
                value
            );
        }
    }

    #[test]
    fn test_unknown_operator_lenient_and_strict() {
        let cond = Condition::new("n", "~=", "7");
        let c = ctx(json!({"n": 7}));
        assert!(evaluate(&cond, &c));
        assert!(!evaluate(&Condition::new("n", "contains", "8"), &c));
        assert!(matches!(
            cond.evaluate_strict(&c, "n2"),
            Err(CoreError::InvalidCondition { .. })
        ));
        assert!(Condition::new("n", ">", "1").evaluate_strict(&c, "n2").unwrap());
    }

    #[test]
    fn test_dotted_lookup() {
        let c = ctx(json!({
            "customer": {"tier": "gold", "orders": [{"total": 40}]},
            "a.b": 1
        }));
        assert!(evaluate(&Condition::new("customer.tier", "==", "gold"), &c));
        assert!(evaluate(&Condition::new("customer.orders.0.total", ">=", "40"), &c));
        assert!(evaluate(&Condition::new("a.b", "==", "1"), &c));
        assert!(!evaluate(&Condition::new("customer.region", "==", "null"), &c));
        assert!(lookup(&c, "").is_none());
    }

    #[test]
    fn test_condition_from_node_props() {
        use crate::graph::{Node, NodeKind};
        let node = Node::new("n2", NodeKind::Condition)
            .with_property("variable", "amount")
            .with_property("operator", ">")
            .with_property("value", "1000");
        let cond = Condition::from_node(&node);
        assert_eq!(cond, Condition::new("amount", ">", "1000"));
        assert_eq!(cond.to_string(), "amount > 1000");

        let bare = Condition::from_node(&Node::new("n", NodeKind::Condition));
        assert!(!bare.evaluate(&ctx(json!({"": 1}))));
    }

    proptest! {
        #[test]
        fn prop_numeric_gt_matches_f64(a in -1.0e6f64..1.0e6, b in -1.0e6f64..1.0e6) {
            let c = ctx(json!({"x": a}));
            let cond = Condition::new("x", ">", b.to_string());
            prop_assert_eq!(evaluate(&cond, &c), a > b);
        }

        #[test]
        fn prop_eq_and_ne_are_complements(v in "[a-z0-9]{0,6}", w in "[a-z0-9]{0,6}") {
            let c = ctx(json!({"x": v}));
            let eq = evaluate(&Condition::new("x", "==", w.clone()), &c);
            let ne = evaluate(&Condition::new("x", "!=", w), &c);
            prop_assert_ne!(eq, ne);
        }

        #[test]
        fn prop_absent_variable_never_matches(op in "(==|!=|<|>|<=|>=)", value in "[a-z0-9]{0,4}") {
            let cond = Condition::new("absent", op, value);
            prop_assert!(!evaluate(&cond, &Context::new()));
        }
    }
}
