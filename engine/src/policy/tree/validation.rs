//! Decision-tree validation
//!
//! Pre-execution safety checks, run once at config load:
//! - Node ID uniqueness (forbids recursive self-reference)
//! - Tree depth limits
//! - Field and parameter reference validity
//! - Literal division-by-zero
//! - Category toggles (feature filtering)
//!
//! A tree that passes validation is treated as invariant for the rest of
//! the simulation.

use crate::policy::tree::context::EvalContext;
use crate::policy::tree::types::{
    Computation, Expression, PolicyTreeDef, TreeNode, Value, ValueOrCompute,
};
use crate::policy::{NodeCategory, PolicyToggles};
use std::collections::BTreeSet;
use thiserror::Error;

/// Maximum allowed tree depth
const MAX_TREE_DEPTH: usize = 64;

/// Validation errors
#[derive(Debug, Error, PartialEq, Eq)]
pub enum ValidationError {
    #[error("Duplicate node ID: {0}")]
    DuplicateNodeId(String),

    #[error("Tree depth {actual} exceeds maximum {max}")]
    ExcessiveDepth { actual: usize, max: usize },

    #[error("Field reference '{0}' not found in context")]
    InvalidFieldReference(String),

    #[error("Parameter reference '{0}' not found in tree parameters")]
    InvalidParameterReference(String),

    #[error("Division by literal zero at node {0}")]
    DivisionByZeroRisk(String),

    #[error("Node category {category:?} is forbidden by the policy feature toggles")]
    ForbiddenCategory { category: NodeCategory },
}

/// Validation result: all errors found, not just the first
pub type ValidationResult = Result<(), Vec<ValidationError>>;

/// Validate a decision tree before execution
///
/// `sample_context` is a representative context used to check field
/// references; field availability does not vary at runtime.
pub fn validate_tree(
    tree: &PolicyTreeDef,
    sample_context: &EvalContext,
    toggles: &PolicyToggles,
) -> ValidationResult {
    let mut errors = Vec::new();

    validate_node_id_uniqueness(&tree.root, &mut errors);
    validate_tree_depth(&tree.root, &mut errors);
    validate_field_references(&tree.root, sample_context, &mut errors);
    validate_parameter_references(tree, &mut errors);
    validate_division_safety(&tree.root, &mut errors);
    validate_categories(&tree.root, toggles, &mut errors);

    if errors.is_empty() {
        Ok(())
    } else {
        Err(errors)
    }
}

// ============================================================================
// Node ID uniqueness
// ============================================================================

fn validate_node_id_uniqueness(root: &TreeNode, errors: &mut Vec<ValidationError>) {
    let mut seen = BTreeSet::new();
    collect_node_ids(root, &mut seen, errors);
}

fn collect_node_ids(
    node: &TreeNode,
    seen: &mut BTreeSet<String>,
    errors: &mut Vec<ValidationError>,
) {
    if !seen.insert(node.node_id().to_string()) {
        errors.push(ValidationError::DuplicateNodeId(node.node_id().to_string()));
    }

    if let TreeNode::Condition {
        on_true, on_false, ..
    } = node
    {
        collect_node_ids(on_true, seen, errors);
        collect_node_ids(on_false, seen, errors);
    }
}

// ============================================================================
// Depth
// ============================================================================

fn validate_tree_depth(root: &TreeNode, errors: &mut Vec<ValidationError>) {
    let depth = compute_tree_depth(root, 0);
    if depth > MAX_TREE_DEPTH {
        errors.push(ValidationError::ExcessiveDepth {
            actual: depth,
            max: MAX_TREE_DEPTH,
        });
    }
}

fn compute_tree_depth(node: &TreeNode, current: usize) -> usize {
    match node {
        TreeNode::Action { .. } => current,
        TreeNode::Condition {
            on_true, on_false, ..
        } => compute_tree_depth(on_true, current + 1).max(compute_tree_depth(on_false, current + 1)),
    }
}

// ============================================================================
// Field references
// ============================================================================

fn validate_field_references(
    root: &TreeNode,
    sample_context: &EvalContext,
    errors: &mut Vec<ValidationError>,
) {
    let mut fields = BTreeSet::new();
    collect_field_references(root, &mut fields);
    for field in fields {
        if !sample_context.has_field(&field) {
            errors.push(ValidationError::InvalidFieldReference(field));
        }
    }
}

fn collect_field_references(node: &TreeNode, fields: &mut BTreeSet<String>) {
    match node {
        TreeNode::Condition {
            condition,
            on_true,
            on_false,
            ..
        } => {
            collect_fields_from_expression(condition, fields);
            collect_field_references(on_true, fields);
            collect_field_references(on_false, fields);
        }
        TreeNode::Action { parameters, .. } => {
            for voc in parameters.values() {
                collect_fields_from_voc(voc, fields);
            }
        }
    }
}

fn collect_fields_from_expression(expr: &Expression, fields: &mut BTreeSet<String>) {
    match expr {
        Expression::Equal { left, right }
        | Expression::NotEqual { left, right }
        | Expression::LessThan { left, right }
        | Expression::LessOrEqual { left, right }
        | Expression::GreaterThan { left, right }
        | Expression::GreaterOrEqual { left, right } => {
            collect_fields_from_value(left, fields);
            collect_fields_from_value(right, fields);
        }
        Expression::And { conditions } | Expression::Or { conditions } => {
            for cond in conditions {
                collect_fields_from_expression(cond, fields);
            }
        }
        Expression::Not { condition } => collect_fields_from_expression(condition, fields),
    }
}

fn collect_fields_from_value(value: &Value, fields: &mut BTreeSet<String>) {
    match value {
        Value::Field { field } => {
            fields.insert(field.clone());
        }
        Value::Compute { compute } => collect_fields_from_computation(compute, fields),
        _ => {}
    }
}

fn collect_fields_from_computation(comp: &Computation, fields: &mut BTreeSet<String>) {
    match comp {
        Computation::Add { left, right }
        | Computation::Subtract { left, right }
        | Computation::Multiply { left, right }
        | Computation::Divide { left, right } => {
            collect_fields_from_value(left, fields);
            collect_fields_from_value(right, fields);
        }
        Computation::Max { values } | Computation::Min { values } => {
            for value in values {
                collect_fields_from_value(value, fields);
            }
        }
        Computation::Abs { value } | Computation::Floor { value } => {
            collect_fields_from_value(value, fields);
        }
    }
}

fn collect_fields_from_voc(voc: &ValueOrCompute, fields: &mut BTreeSet<String>) {
    match voc {
        ValueOrCompute::Field { field } => {
            fields.insert(field.clone());
        }
        ValueOrCompute::Compute { compute } => collect_fields_from_computation(compute, fields),
        _ => {}
    }
}

// ============================================================================
// Parameter references
// ============================================================================

fn validate_parameter_references(tree: &PolicyTreeDef, errors: &mut Vec<ValidationError>) {
    let mut referenced = BTreeSet::new();
    collect_parameter_references(&tree.root, &mut referenced);

    for param in referenced {
        if !tree.parameters.contains_key(&param) {
            errors.push(ValidationError::InvalidParameterReference(param));
        }
    }
}

fn collect_parameter_references(node: &TreeNode, params: &mut BTreeSet<String>) {
    match node {
        TreeNode::Condition {
            condition,
            on_true,
            on_false,
            ..
        } => {
            collect_params_from_expression(condition, params);
            collect_parameter_references(on_true, params);
            collect_parameter_references(on_false, params);
        }
        TreeNode::Action { parameters, .. } => {
            for voc in parameters.values() {
                collect_params_from_voc(voc, params);
            }
        }
    }
}

fn collect_params_from_expression(expr: &Expression, params: &mut BTreeSet<String>) {
    match expr {
        Expression::Equal { left, right }
        | Expression::NotEqual { left, right }
        | Expression::LessThan { left, right }
        | Expression::LessOrEqual { left, right }
        | Expression::GreaterThan { left, right }
        | Expression::GreaterOrEqual { left, right } => {
            collect_params_from_value(left, params);
            collect_params_from_value(right, params);
        }
        Expression::And { conditions } | Expression::Or { conditions } => {
            for cond in conditions {
                collect_params_from_expression(cond, params);
            }
        }
        Expression::Not { condition } => collect_params_from_expression(condition, params),
    }
}

fn collect_params_from_value(value: &Value, params: &mut BTreeSet<String>) {
    match value {
        Value::Param { param } => {
            params.insert(param.clone());
        }
        Value::Compute { compute } => collect_params_from_computation(compute, params),
        _ => {}
    }
}

fn collect_params_from_computation(comp: &Computation, params: &mut BTreeSet<String>) {
    match comp {
        Computation::Add { left, right }
        | Computation::Subtract { left, right }
        | Computation::Multiply { left, right }
        | Computation::Divide { left, right } => {
            collect_params_from_value(left, params);
            collect_params_from_value(right, params);
        }
        Computation::Max { values } | Computation::Min { values } => {
            for value in values {
                collect_params_from_value(value, params);
            }
        }
        Computation::Abs { value } | Computation::Floor { value } => {
            collect_params_from_value(value, params);
        }
    }
}

fn collect_params_from_voc(voc: &ValueOrCompute, params: &mut BTreeSet<String>) {
    match voc {
        ValueOrCompute::Param { param } => {
            params.insert(param.clone());
        }
        ValueOrCompute::Compute { compute } => collect_params_from_computation(compute, params),
        _ => {}
    }
}

// ============================================================================
// Division safety
// ============================================================================

fn validate_division_safety(root: &TreeNode, errors: &mut Vec<ValidationError>) {
    check_division_in_node(root, errors);
}

fn check_division_in_node(node: &TreeNode, errors: &mut Vec<ValidationError>) {
    match node {
        TreeNode::Condition {
            condition,
            on_true,
            on_false,
            ..
        } => {
            check_division_in_expression(condition, node.node_id(), errors);
            check_division_in_node(on_true, errors);
            check_division_in_node(on_false, errors);
        }
        TreeNode::Action { parameters, .. } => {
            for voc in parameters.values() {
                if let ValueOrCompute::Compute { compute } = voc {
                    check_division_in_computation(compute, node.node_id(), errors);
                }
            }
        }
    }
}

fn check_division_in_expression(
    expr: &Expression,
    node_id: &str,
    errors: &mut Vec<ValidationError>,
) {
    match expr {
        Expression::Equal { left, right }
        | Expression::NotEqual { left, right }
        | Expression::LessThan { left, right }
        | Expression::LessOrEqual { left, right }
        | Expression::GreaterThan { left, right }
        | Expression::GreaterOrEqual { left, right } => {
            check_division_in_value(left, node_id, errors);
            check_division_in_value(right, node_id, errors);
        }
        Expression::And { conditions } | Expression::Or { conditions } => {
            for cond in conditions {
                check_division_in_expression(cond, node_id, errors);
            }
        }
        Expression::Not { condition } => check_division_in_expression(condition, node_id, errors),
    }
}

fn check_division_in_value(value: &Value, node_id: &str, errors: &mut Vec<ValidationError>) {
    if let Value::Compute { compute } = value {
        check_division_in_computation(compute, node_id, errors);
    }
}

fn check_division_in_computation(
    comp: &Computation,
    node_id: &str,
    errors: &mut Vec<ValidationError>,
) {
    match comp {
        Computation::Divide { left, right } => {
            if is_literal_zero(right) {
                errors.push(ValidationError::DivisionByZeroRisk(node_id.to_string()));
            }
            check_division_in_value(left, node_id, errors);
            check_division_in_value(right, node_id, errors);
        }
        Computation::Add { left, right }
        | Computation::Subtract { left, right }
        | Computation::Multiply { left, right } => {
            check_division_in_value(left, node_id, errors);
            check_division_in_value(right, node_id, errors);
        }
        Computation::Max { values } | Computation::Min { values } => {
            for value in values {
                check_division_in_value(value, node_id, errors);
            }
        }
        Computation::Abs { value } | Computation::Floor { value } => {
            check_division_in_value(value, node_id, errors);
        }
    }
}

fn is_literal_zero(value: &Value) -> bool {
    match value {
        Value::Literal { value } => {
            if let Some(num) = value.as_f64() {
                num.abs() < f64::EPSILON
            } else {
                false
            }
        }
        _ => false,
    }
}

// ============================================================================
// Category toggles
// ============================================================================

fn validate_categories(
    root: &TreeNode,
    toggles: &PolicyToggles,
    errors: &mut Vec<ValidationError>,
) {
    let mut used = BTreeSet::new();
    collect_categories(root, &mut used);

    for category in used {
        if !toggles.allows(category) {
            errors.push(ValidationError::ForbiddenCategory { category });
        }
    }
}

fn collect_categories(node: &TreeNode, used: &mut BTreeSet<NodeCategory>) {
    match node {
        TreeNode::Condition {
            condition,
            on_true,
            on_false,
            ..
        } => {
            collect_categories_from_expression(condition, used);
            collect_categories(on_true, used);
            collect_categories(on_false, used);
        }
        TreeNode::Action { parameters, .. } => {
            used.insert(NodeCategory::Action);
            for voc in parameters.values() {
                match voc {
                    ValueOrCompute::Compute { compute } => {
                        used.insert(NodeCategory::Arithmetic);
                        collect_categories_from_computation(compute, used);
                    }
                    _ => {
                        used.insert(NodeCategory::ValueSource);
                    }
                }
            }
        }
    }
}

fn collect_categories_from_expression(expr: &Expression, used: &mut BTreeSet<NodeCategory>) {
    match expr {
        Expression::Equal { left, right }
        | Expression::NotEqual { left, right }
        | Expression::LessThan { left, right }
        | Expression::LessOrEqual { left, right }
        | Expression::GreaterThan { left, right }
        | Expression::GreaterOrEqual { left, right } => {
            used.insert(NodeCategory::Comparison);
            collect_categories_from_value(left, used);
            collect_categories_from_value(right, used);
        }
        Expression::And { conditions } | Expression::Or { conditions } => {
            used.insert(NodeCategory::Logical);
            for cond in conditions {
                collect_categories_from_expression(cond, used);
            }
        }
        Expression::Not { condition } => {
            used.insert(NodeCategory::Logical);
            collect_categories_from_expression(condition, used);
        }
    }
}

fn collect_categories_from_value(value: &Value, used: &mut BTreeSet<NodeCategory>) {
    match value {
        Value::Compute { compute } => {
            used.insert(NodeCategory::Arithmetic);
            collect_categories_from_computation(compute, used);
        }
        _ => {
            used.insert(NodeCategory::ValueSource);
        }
    }
}

fn collect_categories_from_computation(comp: &Computation, used: &mut BTreeSet<NodeCategory>) {
    match comp {
        Computation::Add { left, right }
        | Computation::Subtract { left, right }
        | Computation::Multiply { left, right }
        | Computation::Divide { left, right } => {
            collect_categories_from_value(left, used);
            collect_categories_from_value(right, used);
        }
        Computation::Max { values } | Computation::Min { values } => {
            for value in values {
                collect_categories_from_value(value, used);
            }
        }
        Computation::Abs { value } | Computation::Floor { value } => {
            collect_categories_from_value(value, used);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::costs::CostRates;
    use crate::models::agent::Agent;
    use crate::models::state::SimulationState;
    use crate::models::transaction::Transaction;
    use crate::policy::PolicyClock;

    fn sample_context() -> EvalContext {
        let tx = Transaction::new(
            "tx-1".to_string(),
            "BANK_A".to_string(),
            "BANK_B".to_string(),
            100_000,
            0,
            50,
        );
        let state = SimulationState::new(vec![
            Agent::new("BANK_A".to_string(), 500_000, 0),
            Agent::new("BANK_B".to_string(), 0, 0),
        ]);
        EvalContext::build(
            &tx,
            state.get_agent("BANK_A").unwrap(),
            &state,
            PolicyClock {
                tick: 10,
                ticks_per_day: 100,
            },
            &CostRates::default(),
        )
    }

    fn parse(json: &str) -> PolicyTreeDef {
        serde_json::from_str(json).unwrap()
    }

    const VALID_TREE: &str = r#"{
        "version": "1.0",
        "policy_id": "test",
        "root": {
            "node_id": "N1",
            "type": "condition",
            "condition": {
                "op": ">",
                "left": {"field": "balance"},
                "right": {"field": "amount"}
            },
            "on_true": {"node_id": "A1", "type": "action", "action": "Release"},
            "on_false": {"node_id": "A2", "type": "action", "action": "Hold"}
        }
    }"#;

    #[test]
    fn test_valid_tree_passes() {
        let tree = parse(VALID_TREE);
        let result = validate_tree(&tree, &sample_context(), &PolicyToggles::default());
        assert!(result.is_ok());
    }

    #[test]
    fn test_duplicate_node_ids_rejected() {
        let json = VALID_TREE.replace("\"A2\"", "\"A1\"");
        let tree = parse(&json);
        let errors = validate_tree(&tree, &sample_context(), &PolicyToggles::default())
            .unwrap_err();
        assert!(errors
            .iter()
            .any(|e| matches!(e, ValidationError::DuplicateNodeId(_))));
    }

    #[test]
    fn test_invalid_field_reference_rejected() {
        let json = VALID_TREE.replace("\"balance\"", "\"no_such_field\"");
        let tree = parse(&json);
        let errors = validate_tree(&tree, &sample_context(), &PolicyToggles::default())
            .unwrap_err();
        assert!(errors
            .iter()
            .any(|e| matches!(e, ValidationError::InvalidFieldReference(_))));
    }

    #[test]
    fn test_unknown_parameter_rejected() {
        let json = r#"{
            "version": "1.0",
            "policy_id": "test",
            "root": {
                "node_id": "N1",
                "type": "condition",
                "condition": {
                    "op": ">",
                    "left": {"field": "balance"},
                    "right": {"param": "missing"}
                },
                "on_true": {"node_id": "A1", "type": "action", "action": "Release"},
                "on_false": {"node_id": "A2", "type": "action", "action": "Hold"}
            }
        }"#;
        let tree = parse(json);
        let errors = validate_tree(&tree, &sample_context(), &PolicyToggles::default())
            .unwrap_err();
        assert!(errors
            .iter()
            .any(|e| matches!(e, ValidationError::InvalidParameterReference(_))));
    }

    #[test]
    fn test_literal_zero_division_rejected() {
        let json = r#"{
            "version": "1.0",
            "policy_id": "test",
            "root": {
                "node_id": "N1",
                "type": "condition",
                "condition": {
                    "op": ">",
                    "left": {"compute": {
                        "op": "/",
                        "left": {"field": "balance"},
                        "right": {"value": 0}
                    }},
                    "right": {"value": 100}
                },
                "on_true": {"node_id": "A1", "type": "action", "action": "Release"},
                "on_false": {"node_id": "A2", "type": "action", "action": "Hold"}
            }
        }"#;
        let tree = parse(json);
        let errors = validate_tree(&tree, &sample_context(), &PolicyToggles::default())
            .unwrap_err();
        assert!(errors
            .iter()
            .any(|e| matches!(e, ValidationError::DivisionByZeroRisk(_))));
    }

    #[test]
    fn test_empty_include_rejects_tree() {
        let tree = parse(VALID_TREE);
        let toggles = PolicyToggles {
            include: Some(vec![]),
            exclude: None,
        };
        let errors = validate_tree(&tree, &sample_context(), &toggles).unwrap_err();
        assert!(errors
            .iter()
            .any(|e| matches!(e, ValidationError::ForbiddenCategory { .. })));
    }

    #[test]
    fn test_exclude_comparison_rejects_tree() {
        let tree = parse(VALID_TREE);
        let toggles = PolicyToggles {
            include: None,
            exclude: Some(vec![NodeCategory::Comparison]),
        };
        let errors = validate_tree(&tree, &sample_context(), &toggles).unwrap_err();
        assert!(errors.iter().any(|e| matches!(
            e,
            ValidationError::ForbiddenCategory {
                category: NodeCategory::Comparison
            }
        )));
    }

    #[test]
    fn test_include_full_set_accepts_tree() {
        let tree = parse(VALID_TREE);
        let toggles = PolicyToggles {
            include: Some(vec![
                NodeCategory::Comparison,
                NodeCategory::Logical,
                NodeCategory::Arithmetic,
                NodeCategory::ValueSource,
                NodeCategory::Action,
            ]),
            exclude: None,
        };
        assert!(validate_tree(&tree, &sample_context(), &toggles).is_ok());
    }
}
