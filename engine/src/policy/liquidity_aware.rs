//! Liquidity-aware policy
//!
//! Holds payments that would push the balance below a target buffer,
//! overriding the buffer rule for transactions close to their deadline.
//! The classic cash-manager trade-off: delay cost against overdraft cost.

use super::{Decision, EvalContext, Policy};

/// Liquidity-aware policy: preserve buffer, override for urgency
#[derive(Debug)]
pub struct LiquidityAwarePolicy {
    /// Target minimum balance to maintain (cents)
    target_buffer: i64,

    /// Ticks before deadline at which urgency overrides the buffer rule
    urgency_threshold: usize,
}

impl LiquidityAwarePolicy {
    /// Create new liquidity-aware policy
    pub fn new(target_buffer: i64, urgency_threshold: usize) -> Self {
        Self {
            target_buffer,
            urgency_threshold,
        }
    }
}

impl Policy for LiquidityAwarePolicy {
    fn name(&self) -> &str {
        "liquidity_aware"
    }

    fn decide(&self, ctx: &EvalContext) -> Decision {
        let ticks_to_deadline = ctx
            .get_field("ticks_to_deadline")
            .expect("context always carries ticks_to_deadline");
        if ticks_to_deadline <= self.urgency_threshold as f64 {
            return Decision::Release;
        }

        let balance = ctx.get_field("balance").expect("context carries balance");
        let amount = ctx.get_field("amount").expect("context carries amount");
        if balance - amount >= self.target_buffer as f64 {
            Decision::Release
        } else {
            Decision::Hold
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

    fn ctx(balance: i64, amount: i64, tick: usize, deadline: usize) -> EvalContext {
        let tx = Transaction::new(
            "tx-1".to_string(),
            "BANK_A".to_string(),
            "BANK_B".to_string(),
            amount,
            0,
            deadline,
        );
        let state = SimulationState::new(vec![
            Agent::new("BANK_A".to_string(), balance, 0),
            Agent::new("BANK_B".to_string(), 0, 0),
        ]);
        EvalContext::build(
            &tx,
            state.get_agent("BANK_A").unwrap(),
            &state,
            PolicyClock {
                tick,
                ticks_per_day: 100,
            },
            &CostRates::default(),
        )
    }

    #[test]
    fn test_releases_with_ample_buffer() {
        let policy = LiquidityAwarePolicy::new(500_000, 5);
        // 1M - 300k = 700k >= 500k buffer
        assert_eq!(
            policy.decide(&ctx(1_000_000, 300_000, 10, 90)),
            Decision::Release
        );
    }

    #[test]
    fn test_holds_to_protect_buffer() {
        let policy = LiquidityAwarePolicy::new(500_000, 5);
        // 600k - 300k = 300k < 500k buffer, deadline far away
        assert_eq!(
            policy.decide(&ctx(600_000, 300_000, 10, 90)),
            Decision::Hold
        );
    }

    #[test]
    fn test_urgency_overrides_buffer() {
        let policy = LiquidityAwarePolicy::new(500_000, 5);
        // Same shortfall, but deadline within threshold
        assert_eq!(
            policy.decide(&ctx(600_000, 300_000, 10, 13)),
            Decision::Release
        );
    }
}
