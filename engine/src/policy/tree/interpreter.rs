//! Decision-tree interpreter
//!
//! Evaluates expressions and traverses decision trees to produce policy
//! decisions. Evaluation is a pure projection of the context: no state,
//! no side effects, bounded depth.

use crate::models::transaction::MAX_PRIORITY;
use crate::policy::tree::context::{ContextError, EvalContext};
use crate::policy::tree::types::{
    ActionType, Computation, Expression, PolicyTreeDef, TreeNode, Value, ValueOrCompute,
};
use crate::policy::Decision;
use std::collections::BTreeMap;
use thiserror::Error;

/// Maximum tree depth the interpreter will traverse
const MAX_TREE_DEPTH: usize = 64;

/// Epsilon for floating point equality comparison
const FLOAT_EPSILON: f64 = 1e-9;

/// Errors that can occur during tree interpretation
#[derive(Debug, Error, PartialEq)]
pub enum EvalError {
    #[error("Field not found: {0}")]
    FieldNotFound(String),

    #[error("Parameter not found: {0}")]
    ParameterNotFound(String),

    #[error("Division by zero in computation")]
    DivisionByZero,

    #[error("Invalid literal type: expected number or boolean")]
    InvalidLiteralType,

    #[error("Empty value list for min/max computation")]
    EmptyValueList,

    #[error("Tree traversal exceeded maximum depth")]
    MaxDepthExceeded,

    #[error("Missing required action parameter: {0}")]
    MissingActionParameter(String),

    #[error("Invalid action parameter: {0}")]
    InvalidActionParameter(String),

    #[error("Context error: {0}")]
    ContextError(#[from] ContextError),
}

/// Evaluate a value to a numeric result
pub fn evaluate_value(
    value: &Value,
    context: &EvalContext,
    params: &BTreeMap<String, f64>,
) -> Result<f64, EvalError> {
    match value {
        Value::Field { field } => context
            .get_field(field)
            .map_err(|_| EvalError::FieldNotFound(field.clone())),

        Value::Param { param } => params
            .get(param)
            .copied()
            .ok_or_else(|| EvalError::ParameterNotFound(param.clone())),

        Value::Literal { value: json_value } => {
            if let Some(num) = json_value.as_f64() {
                Ok(num)
            } else if let Some(flag) = json_value.as_bool() {
                Ok(if flag { 1.0 } else { 0.0 })
            } else {
                Err(EvalError::InvalidLiteralType)
            }
        }

        Value::Compute { compute } => evaluate_computation(compute, context, params),
    }
}

/// Evaluate an arithmetic computation
pub fn evaluate_computation(
    computation: &Computation,
    context: &EvalContext,
    params: &BTreeMap<String, f64>,
) -> Result<f64, EvalError> {
    match computation {
        Computation::Add { left, right } => Ok(evaluate_value(left, context, params)?
            + evaluate_value(right, context, params)?),

        Computation::Subtract { left, right } => Ok(evaluate_value(left, context, params)?
            - evaluate_value(right, context, params)?),

        Computation::Multiply { left, right } => Ok(evaluate_value(left, context, params)?
            * evaluate_value(right, context, params)?),

        Computation::Divide { left, right } => {
            let left_val = evaluate_value(left, context, params)?;
            let right_val = evaluate_value(right, context, params)?;

            if right_val.abs() < f64::EPSILON {
                return Err(EvalError::DivisionByZero);
            }

            Ok(left_val / right_val)
        }

        Computation::Max { values } => {
            if values.is_empty() {
                return Err(EvalError::EmptyValueList);
            }
            let mut max_val = f64::NEG_INFINITY;
            for value in values {
                max_val = max_val.max(evaluate_value(value, context, params)?);
            }
            Ok(max_val)
        }

        Computation::Min { values } => {
            if values.is_empty() {
                return Err(EvalError::EmptyValueList);
            }
            let mut min_val = f64::INFINITY;
            for value in values {
                min_val = min_val.min(evaluate_value(value, context, params)?);
            }
            Ok(min_val)
        }

        Computation::Abs { value } => Ok(evaluate_value(value, context, params)?.abs()),

        Computation::Floor { value } => Ok(evaluate_value(value, context, params)?.floor()),
    }
}

/// Evaluate a boolean expression
pub fn evaluate_expression(
    expr: &Expression,
    context: &EvalContext,
    params: &BTreeMap<String, f64>,
) -> Result<bool, EvalError> {
    match expr {
        Expression::Equal { left, right } => {
            let l = evaluate_value(left, context, params)?;
            let r = evaluate_value(right, context, params)?;
            Ok((l - r).abs() < FLOAT_EPSILON)
        }

        Expression::NotEqual { left, right } => {
            let l = evaluate_value(left, context, params)?;
            let r = evaluate_value(right, context, params)?;
            Ok((l - r).abs() >= FLOAT_EPSILON)
        }

        Expression::LessThan { left, right } => {
            Ok(evaluate_value(left, context, params)? < evaluate_value(right, context, params)?)
        }

        Expression::LessOrEqual { left, right } => {
            let l = evaluate_value(left, context, params)?;
            let r = evaluate_value(right, context, params)?;
            Ok(l <= r || (l - r).abs() < FLOAT_EPSILON)
        }

        Expression::GreaterThan { left, right } => {
            Ok(evaluate_value(left, context, params)? > evaluate_value(right, context, params)?)
        }

        Expression::GreaterOrEqual { left, right } => {
            let l = evaluate_value(left, context, params)?;
            let r = evaluate_value(right, context, params)?;
            Ok(l >= r || (l - r).abs() < FLOAT_EPSILON)
        }

        Expression::And { conditions } => {
            for condition in conditions {
                if !evaluate_expression(condition, context, params)? {
                    return Ok(false);
                }
            }
            Ok(true)
        }

        Expression::Or { conditions } => {
            for condition in conditions {
                if evaluate_expression(condition, context, params)? {
                    return Ok(true);
                }
            }
            Ok(false)
        }

        Expression::Not { condition } => {
            Ok(!evaluate_expression(condition, context, params)?)
        }
    }
}

/// Evaluate a full tree: traverse to an action node, build the decision
pub fn evaluate_tree(def: &PolicyTreeDef, context: &EvalContext) -> Result<Decision, EvalError> {
    let action_node = traverse_node(&def.root, context, &def.parameters, 0)?;
    build_decision(action_node, context, &def.parameters)
}

/// Recursive tree traversal with depth tracking
fn traverse_node<'a>(
    node: &'a TreeNode,
    context: &EvalContext,
    params: &BTreeMap<String, f64>,
    depth: usize,
) -> Result<&'a TreeNode, EvalError> {
    if depth > MAX_TREE_DEPTH {
        return Err(EvalError::MaxDepthExceeded);
    }

    match node {
        TreeNode::Action { .. } => Ok(node),

        TreeNode::Condition {
            condition,
            on_true,
            on_false,
            ..
        } => {
            let result = evaluate_expression(condition, context, params)?;
            let next = if result { on_true } else { on_false };
            traverse_node(next, context, params, depth + 1)
        }
    }
}

/// Convert an action node into a [`Decision`]
fn build_decision(
    action_node: &TreeNode,
    context: &EvalContext,
    params: &BTreeMap<String, f64>,
) -> Result<Decision, EvalError> {
    let (action, action_params) = match action_node {
        TreeNode::Action {
            action, parameters, ..
        } => (action, parameters),
        // Traversal only returns action nodes
        TreeNode::Condition { .. } => unreachable!("traverse_node returns action nodes"),
    };

    match action {
        ActionType::Release => Ok(Decision::Release),
        ActionType::Hold => Ok(Decision::Hold),
        ActionType::Drop => Ok(Decision::Drop),

        ActionType::Split => {
            let parts = evaluate_action_parameter(action_params, "parts", context, params)?;
            let parts = parts as usize;
            if parts < 2 {
                return Err(EvalError::InvalidActionParameter(
                    "parts must be >= 2".to_string(),
                ));
            }
            Ok(Decision::Split { parts })
        }

        ActionType::Reprioritize => {
            let raw =
                evaluate_action_parameter(action_params, "new_priority", context, params)?;
            let new_priority = raw.clamp(0.0, MAX_PRIORITY as f64) as u8;
            Ok(Decision::Reprioritize { new_priority })
        }
    }
}

/// Evaluate an action parameter (literal, field, param, or computation)
fn evaluate_action_parameter(
    action_params: &BTreeMap<String, ValueOrCompute>,
    param_name: &str,
    context: &EvalContext,
    params: &BTreeMap<String, f64>,
) -> Result<f64, EvalError> {
    let value_or_compute = action_params
        .get(param_name)
        .ok_or_else(|| EvalError::MissingActionParameter(param_name.to_string()))?;

    match value_or_compute {
        ValueOrCompute::Direct { value } => {
            if let Some(num) = value.as_f64() {
                Ok(num)
            } else {
                Err(EvalError::InvalidActionParameter(param_name.to_string()))
            }
        }

        ValueOrCompute::Field { field } => context
            .get_field(field)
            .map_err(|_| EvalError::FieldNotFound(field.clone())),

        ValueOrCompute::Param { param } => params
            .get(param)
            .copied()
            .ok_or_else(|| EvalError::ParameterNotFound(param.clone())),

        ValueOrCompute::Compute { compute } => evaluate_computation(compute, context, params),
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
    use serde_json::json;

    fn test_context() -> (EvalContext, BTreeMap<String, f64>) {
        let tx = Transaction::new(
            "tx-1".to_string(),
            "BANK_A".to_string(),
            "BANK_B".to_string(),
            100_000,
            0,
            50,
        );
        let state = SimulationState::new(vec![
            Agent::new("BANK_A".to_string(), 500_000, 200_000),
            Agent::new("BANK_B".to_string(), 0, 0),
        ]);
        let ctx = EvalContext::build(
            &tx,
            state.get_agent("BANK_A").unwrap(),
            &state,
            PolicyClock {
                tick: 10,
                ticks_per_day: 100,
            },
            &CostRates::default(),
        );

        let mut params = BTreeMap::new();
        params.insert("threshold".to_string(), 100_000.0);
        (ctx, params)
    }

    #[test]
    fn test_eval_field_and_param() {
        let (ctx, params) = test_context();

        let field = Value::Field {
            field: "balance".to_string(),
        };
        assert_eq!(evaluate_value(&field, &ctx, &params).unwrap(), 500_000.0);

        let param = Value::Param {
            param: "threshold".to_string(),
        };
        assert_eq!(evaluate_value(&param, &ctx, &params).unwrap(), 100_000.0);
    }

    #[test]
    fn test_eval_literal_boolean() {
        let (ctx, params) = test_context();

        let value = Value::Literal { value: json!(true) };
        assert_eq!(evaluate_value(&value, &ctx, &params).unwrap(), 1.0);
    }

    #[test]
    fn test_divide_by_zero_error() {
        let (ctx, params) = test_context();

        let computation = Computation::Divide {
            left: Value::Literal { value: json!(100) },
            right: Value::Literal { value: json!(0) },
        };

        assert_eq!(
            evaluate_computation(&computation, &ctx, &params),
            Err(EvalError::DivisionByZero)
        );
    }

    #[test]
    fn test_nested_computation() {
        let (ctx, params) = test_context();

        // (balance + credit_limit) / 2
        let computation = Computation::Divide {
            left: Value::Compute {
                compute: Box::new(Computation::Add {
                    left: Value::Field {
                        field: "balance".to_string(),
                    },
                    right: Value::Field {
                        field: "credit_limit".to_string(),
                    },
                }),
            },
            right: Value::Literal { value: json!(2) },
        };

        assert_eq!(
            evaluate_computation(&computation, &ctx, &params).unwrap(),
            350_000.0
        );
    }

    #[test]
    fn test_short_circuit_and() {
        let (ctx, params) = test_context();

        // First condition false → second (invalid field) never evaluated
        let expr = Expression::And {
            conditions: vec![
                Expression::LessThan {
                    left: Value::Field {
                        field: "balance".to_string(),
                    },
                    right: Value::Literal { value: json!(0) },
                },
                Expression::GreaterThan {
                    left: Value::Field {
                        field: "nonexistent".to_string(),
                    },
                    right: Value::Literal { value: json!(0) },
                },
            ],
        };

        assert!(!evaluate_expression(&expr, &ctx, &params).unwrap());
    }

    #[test]
    fn test_evaluate_tree_release_branch() {
        let (ctx, _) = test_context();

        let json = r#"{
            "version": "1.0",
            "policy_id": "liquidity_check",
            "root": {
                "node_id": "N1",
                "type": "condition",
                "condition": {
                    "op": ">=",
                    "left": {"field": "balance"},
                    "right": {"field": "amount"}
                },
                "on_true": {"node_id": "A1", "type": "action", "action": "Release"},
                "on_false": {"node_id": "A2", "type": "action", "action": "Hold"}
            }
        }"#;
        let def: PolicyTreeDef = serde_json::from_str(json).unwrap();

        // balance 500k >= amount 100k → Release
        assert_eq!(evaluate_tree(&def, &ctx).unwrap(), Decision::Release);
    }

    #[test]
    fn test_split_action_requires_parts() {
        let (ctx, _) = test_context();

        let json = r#"{
            "version": "1.0",
            "policy_id": "bad_split",
            "root": {"node_id": "A1", "type": "action", "action": "Split"}
        }"#;
        let def: PolicyTreeDef = serde_json::from_str(json).unwrap();

        assert_eq!(
            evaluate_tree(&def, &ctx),
            Err(EvalError::MissingActionParameter("parts".to_string()))
        );
    }

    #[test]
    fn test_split_action_with_parts() {
        let (ctx, _) = test_context();

        let json = r#"{
            "version": "1.0",
            "policy_id": "split2",
            "root": {
                "node_id": "A1",
                "type": "action",
                "action": "Split",
                "parameters": {"parts": {"value": 2}}
            }
        }"#;
        let def: PolicyTreeDef = serde_json::from_str(json).unwrap();

        assert_eq!(
            evaluate_tree(&def, &ctx).unwrap(),
            Decision::Split { parts: 2 }
        );
    }

    #[test]
    fn test_reprioritize_capped() {
        let (ctx, _) = test_context();

        let json = r#"{
            "version": "1.0",
            "policy_id": "boost",
            "root": {
                "node_id": "A1",
                "type": "action",
                "action": "Reprioritize",
                "parameters": {"new_priority": {"value": 42}}
            }
        }"#;
        let def: PolicyTreeDef = serde_json::from_str(json).unwrap();

        assert_eq!(
            evaluate_tree(&def, &ctx).unwrap(),
            Decision::Reprioritize { new_priority: 9 }
        );
    }
}
