//! Decision-tree type definitions
//!
//! JSON format for declarative policies. All types deserialize from JSON
//! and are validated before use (see `validation`).

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

// ============================================================================
// DECISION TREE DEFINITION
// ============================================================================

/// Complete decision tree definition
///
/// Root object deserialized from JSON policy files.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PolicyTreeDef {
    /// Schema version (currently "1.0")
    pub version: String,

    /// Unique identifier for this policy
    pub policy_id: String,

    /// Optional human-readable description
    #[serde(default)]
    pub description: Option<String>,

    /// Root of the payment decision tree
    pub root: TreeNode,

    /// Named parameters (thresholds, constants)
    #[serde(default)]
    pub parameters: BTreeMap<String, f64>,
}

// ============================================================================
// TREE NODES
// ============================================================================

/// A node in the decision tree
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "lowercase")]
pub enum TreeNode {
    /// Conditional branch node
    Condition {
        /// Unique node identifier
        node_id: String,

        /// Optional human-readable description
        #[serde(default)]
        description: String,

        /// Boolean expression to evaluate
        condition: Expression,

        /// Node to visit if condition is true
        on_true: Box<TreeNode>,

        /// Node to visit if condition is false
        on_false: Box<TreeNode>,
    },

    /// Terminal action node
    Action {
        /// Unique node identifier
        node_id: String,

        /// Action to take
        action: ActionType,

        /// Optional action parameters (e.g. `parts` for Split)
        #[serde(default)]
        parameters: BTreeMap<String, ValueOrCompute>,
    },
}

impl TreeNode {
    /// Get the node ID
    pub fn node_id(&self) -> &str {
        match self {
            TreeNode::Condition { node_id, .. } => node_id,
            TreeNode::Action { node_id, .. } => node_id,
        }
    }

    /// Check if this is an action node
    pub fn is_action(&self) -> bool {
        matches!(self, TreeNode::Action { .. })
    }
}

// ============================================================================
// EXPRESSIONS
// ============================================================================

/// Boolean expression over the evaluation context
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "op")]
pub enum Expression {
    // Comparison operators
    /// Equal (with epsilon tolerance for floats)
    #[serde(rename = "==")]
    Equal { left: Value, right: Value },

    /// Not equal
    #[serde(rename = "!=")]
    NotEqual { left: Value, right: Value },

    /// Less than
    #[serde(rename = "<")]
    LessThan { left: Value, right: Value },

    /// Less than or equal
    #[serde(rename = "<=")]
    LessOrEqual { left: Value, right: Value },

    /// Greater than
    #[serde(rename = ">")]
    GreaterThan { left: Value, right: Value },

    /// Greater than or equal
    #[serde(rename = ">=")]
    GreaterOrEqual { left: Value, right: Value },

    // Logical operators
    /// Logical AND (short-circuit evaluation)
    #[serde(rename = "and")]
    And { conditions: Vec<Expression> },

    /// Logical OR (short-circuit evaluation)
    #[serde(rename = "or")]
    Or { conditions: Vec<Expression> },

    /// Logical NOT
    #[serde(rename = "not")]
    Not { condition: Box<Expression> },
}

// ============================================================================
// VALUES
// ============================================================================

/// A value in an expression
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(untagged)]
pub enum Value {
    /// Reference to a field in the evaluation context
    /// (e.g. "balance", "amount", "ticks_to_deadline")
    Field { field: String },

    /// Reference to a named tree parameter
    Param { param: String },

    /// Literal value (number or boolean)
    Literal { value: serde_json::Value },

    /// Computed value (arithmetic expression)
    Compute { compute: Box<Computation> },
}

/// A value or computation used in action parameters
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(untagged)]
pub enum ValueOrCompute {
    /// Direct literal value
    Direct { value: serde_json::Value },

    /// Field reference
    Field { field: String },

    /// Parameter reference
    Param { param: String },

    /// Computed value
    Compute { compute: Computation },
}

// ============================================================================
// COMPUTATIONS
// ============================================================================

/// Arithmetic computation evaluating to a numeric value
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "op")]
pub enum Computation {
    /// Addition
    #[serde(rename = "+")]
    Add { left: Value, right: Value },

    /// Subtraction
    #[serde(rename = "-")]
    Subtract { left: Value, right: Value },

    /// Multiplication
    #[serde(rename = "*")]
    Multiply { left: Value, right: Value },

    /// Division (checked for divide-by-zero at runtime)
    #[serde(rename = "/")]
    Divide { left: Value, right: Value },

    /// Maximum of multiple values
    #[serde(rename = "max")]
    Max { values: Vec<Value> },

    /// Minimum of multiple values
    #[serde(rename = "min")]
    Min { values: Vec<Value> },

    /// Absolute value
    #[serde(rename = "abs")]
    Abs { value: Value },

    /// Round down to nearest integer
    #[serde(rename = "floor")]
    Floor { value: Value },
}

// ============================================================================
// ACTIONS
// ============================================================================

/// Action type for terminal nodes
///
/// Maps one-to-one onto [`crate::policy::Decision`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub enum ActionType {
    /// Release the transaction to the RTGS path
    Release,

    /// Hold the transaction in Queue 1
    Hold,

    /// Drop the transaction (penalized)
    Drop,

    /// Split a divisible transaction; requires a `parts` parameter >= 2
    Split,

    /// Change priority; requires a `new_priority` parameter
    Reprioritize,
}

// ============================================================================
// TESTS
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_minimal_tree() {
        let json = r#"{
            "version": "1.0",
            "policy_id": "minimal_test",
            "root": {
                "node_id": "N1",
                "type": "condition",
                "condition": {
                    "op": ">",
                    "left": {"field": "balance"},
                    "right": {"field": "amount"}
                },
                "on_true": {
                    "node_id": "A1",
                    "type": "action",
                    "action": "Release"
                },
                "on_false": {
                    "node_id": "A2",
                    "type": "action",
                    "action": "Hold"
                }
            }
        }"#;

        let tree: PolicyTreeDef = serde_json::from_str(json).unwrap();
        assert_eq!(tree.version, "1.0");
        assert_eq!(tree.policy_id, "minimal_test");
        assert!(matches!(tree.root, TreeNode::Condition { .. }));
    }

    #[test]
    fn test_parse_all_comparison_operators() {
        for op in ["==", "!=", "<", "<=", ">", ">="] {
            let json = format!(
                r#"{{
                    "op": "{}",
                    "left": {{"field": "balance"}},
                    "right": {{"value": 0}}
                }}"#,
                op
            );
            let expr: Result<Expression, _> = serde_json::from_str(&json);
            assert!(expr.is_ok(), "failed to parse operator {}: {:?}", op, expr.err());
        }
    }

    #[test]
    fn test_parse_action_with_parameters() {
        let json = r#"{
            "node_id": "A1",
            "type": "action",
            "action": "Split",
            "parameters": {
                "parts": {"value": 2}
            }
        }"#;

        let node: TreeNode = serde_json::from_str(json).unwrap();
        assert!(node.is_action());
        match node {
            TreeNode::Action { action, parameters, .. } => {
                assert_eq!(action, ActionType::Split);
                assert!(parameters.contains_key("parts"));
            }
            _ => unreachable!(),
        }
    }

    #[test]
    fn test_parse_all_value_types() {
        let field: Value = serde_json::from_str(r#"{"field": "balance"}"#).unwrap();
        assert!(matches!(field, Value::Field { .. }));

        let param: Value = serde_json::from_str(r#"{"param": "threshold"}"#).unwrap();
        assert!(matches!(param, Value::Param { .. }));

        let literal: Value = serde_json::from_str(r#"{"value": 100}"#).unwrap();
        assert!(matches!(literal, Value::Literal { .. }));

        let compute: Value = serde_json::from_str(
            r#"{"compute": {"op": "+", "left": {"field": "balance"}, "right": {"value": 1}}}"#,
        )
        .unwrap();
        assert!(matches!(compute, Value::Compute { .. }));
    }

    #[test]
    fn test_reject_missing_version() {
        let json = r#"{
            "policy_id": "invalid",
            "root": {"node_id": "A1", "type": "action", "action": "Hold"}
        }"#;

        let tree: Result<PolicyTreeDef, _> = serde_json::from_str(json);
        assert!(tree.is_err());
    }
}
