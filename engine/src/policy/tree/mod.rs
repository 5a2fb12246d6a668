//! Declarative JSON decision-tree policies
//!
//! Policies arrive as JSON trees: internal nodes are conditions over the
//! evaluation context, leaves are actions. The interpreter is a stateless
//! projection (context → decision) and all structural safety checks run
//! once at load time.

pub mod context;
pub mod interpreter;
pub mod types;
pub mod validation;

pub use context::{ContextError, EvalContext};
pub use interpreter::{evaluate_expression, evaluate_value, EvalError};
pub use types::{ActionType, Computation, Expression, PolicyTreeDef, TreeNode, Value};
pub use validation::{validate_tree, ValidationError};

use crate::policy::{Decision, Policy};

/// A loaded, validated decision-tree policy
///
/// Validation happens in the engine's config loader; by the time a
/// `TreePolicy` is constructed the tree is structurally sound, so runtime
/// evaluation failures (e.g. division by zero on live data) degrade to
/// `Hold`, the only decision that leaves state untouched.
pub struct TreePolicy {
    def: PolicyTreeDef,
}

impl TreePolicy {
    /// Wrap a validated tree definition
    pub fn new(def: PolicyTreeDef) -> Self {
        Self { def }
    }

    /// The underlying definition
    pub fn def(&self) -> &PolicyTreeDef {
        &self.def
    }
}

impl Policy for TreePolicy {
    fn name(&self) -> &str {
        &self.def.policy_id
    }

    fn decide(&self, ctx: &EvalContext) -> Decision {
        match interpreter::evaluate_tree(&self.def, ctx) {
            Ok(decision) => decision,
            Err(err) => {
                tracing::warn!(
                    policy = %self.def.policy_id,
                    error = %err,
                    "tree evaluation failed; holding transaction"
                );
                Decision::Hold
            }
        }
    }
}
