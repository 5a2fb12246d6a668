//! FIFO (First-In-First-Out) policy
//!
//! Simplest baseline: release every transaction immediately, in queue
//! order. No consideration of liquidity, deadlines, or urgency.

use super::{Decision, EvalContext, Policy};

/// FIFO policy: release everything immediately
#[derive(Debug, Default)]
pub struct FifoPolicy;

impl FifoPolicy {
    /// Create new FIFO policy
    pub fn new() -> Self {
        Self
    }
}

impl Policy for FifoPolicy {
    fn name(&self) -> &str {
        "fifo"
    }

    fn decide(&self, _ctx: &EvalContext) -> Decision {
        Decision::Release
    }
}
