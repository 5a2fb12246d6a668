//! Payment-release policies for Queue 1 decisions
//!
//! Each agent's policy decides, transaction by transaction, what to do
//! with its private outgoing queue: release to the RTGS path, hold, drop,
//! split a divisible payment, or change its priority.
//!
//! The ABI is a pure function: policies read a read-only [`EvalContext`]
//! built from (transaction, agent snapshot, system snapshot, clock) and
//! return a [`Decision`]. They cannot touch engine internals, so the only
//! way a policy influences the simulation is through its returned
//! decision. Built-in policies and declarative JSON trees implement the
//! same trait.

use serde::{Deserialize, Serialize};

pub mod deadline;
pub mod fifo;
pub mod liquidity_aware;
pub mod tree;

pub use deadline::DeadlinePolicy;
pub use fifo::FifoPolicy;
pub use liquidity_aware::LiquidityAwarePolicy;
pub use tree::context::EvalContext;
pub use tree::TreePolicy;

/// Decision about a single Queue 1 transaction
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Decision {
    /// Release the transaction to the RTGS path this tick
    Release,

    /// Leave the transaction in Queue 1; re-evaluated next tick
    Hold,

    /// Remove the transaction without settling (penalized)
    Drop,

    /// Replace a divisible transaction with `parts` equal children
    Split { parts: usize },

    /// Change the transaction's priority; it stays in Queue 1
    Reprioritize { new_priority: u8 },
}

impl Decision {
    /// Short action name used in PolicyDecision events
    pub fn action_name(&self) -> &'static str {
        match self {
            Decision::Release => "release",
            Decision::Hold => "hold",
            Decision::Drop => "drop",
            Decision::Split { .. } => "split",
            Decision::Reprioritize { .. } => "reprioritize",
        }
    }
}

/// Read-only clock passed into context construction
#[derive(Debug, Clone, Copy)]
pub struct PolicyClock {
    pub tick: usize,
    pub ticks_per_day: usize,
}

impl PolicyClock {
    pub fn day(&self) -> usize {
        self.tick / self.ticks_per_day
    }

    pub fn tick_in_day(&self) -> usize {
        self.tick % self.ticks_per_day
    }
}

/// Cash-manager policy trait
///
/// Implementations must be deterministic and side-effect free; the
/// orchestrator owns queue iteration and applies the returned decisions.
pub trait Policy: Send + Sync {
    /// Stable policy name (recorded in config errors and logs)
    fn name(&self) -> &str;

    /// Decide what to do with the transaction described by `ctx`
    fn decide(&self, ctx: &EvalContext) -> Decision;
}

/// Node categories a declarative policy tree may contain
///
/// Used by the feature toggles to restrict the surface available to
/// non-builtin policies.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum NodeCategory {
    /// Comparison operators (==, !=, <, <=, >, >=)
    Comparison,
    /// Logical operators (and, or, not)
    Logical,
    /// Arithmetic computations (binary and n-ary)
    Arithmetic,
    /// Value sources (constants, fields, parameters, derived metrics)
    ValueSource,
    /// Terminal actions
    Action,
}

/// Category filter for declarative policies
///
/// `include` and `exclude` are mutually exclusive. With `include`, a tree
/// may only contain the listed categories (an empty list rejects every
/// tree). With `exclude`, the listed categories are forbidden. Built-in
/// policies are not subject to toggles.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct PolicyToggles {
    #[serde(default)]
    pub include: Option<Vec<NodeCategory>>,
    #[serde(default)]
    pub exclude: Option<Vec<NodeCategory>>,
}

impl PolicyToggles {
    /// Check the include/exclude exclusivity rule
    pub fn is_valid(&self) -> bool {
        !(self.include.is_some() && self.exclude.is_some())
    }

    /// Whether a category is allowed under these toggles
    pub fn allows(&self, category: NodeCategory) -> bool {
        if let Some(include) = &self.include {
            return include.contains(&category);
        }
        if let Some(exclude) = &self.exclude {
            return !exclude.contains(&category);
        }
        true
    }
}
