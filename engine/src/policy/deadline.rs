//! Deadline-aware policy
//!
//! Releases transactions within `urgency_threshold` ticks of their
//! deadline (including transactions already past it) and holds the rest.
//! Minimizes deadline penalties while preserving liquidity for longer.

use super::{Decision, EvalContext, Policy};

/// Deadline-aware policy: release expiring transactions first
#[derive(Debug)]
pub struct DeadlinePolicy {
    /// Ticks before deadline at which a transaction becomes urgent
    urgency_threshold: usize,
}

impl DeadlinePolicy {
    /// Create new deadline policy
    pub fn new(urgency_threshold: usize) -> Self {
        Self { urgency_threshold }
    }
}

impl Default for DeadlinePolicy {
    fn default() -> Self {
        Self::new(5)
    }
}

impl Policy for DeadlinePolicy {
    fn name(&self) -> &str {
        "deadline"
    }

    fn decide(&self, ctx: &EvalContext) -> Decision {
        let ticks_to_deadline = ctx
            .get_field("ticks_to_deadline")
            .expect("context always carries ticks_to_deadline");

        if ticks_to_deadline <= self.urgency_threshold as f64 {
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

    fn ctx_at(tick: usize, deadline: usize) -> EvalContext {
        let tx = Transaction::new(
            "tx-1".to_string(),
            "BANK_A".to_string(),
            "BANK_B".to_string(),
            100_000,
            0,
            deadline,
        );
        let state = SimulationState::new(vec![
            Agent::new("BANK_A".to_string(), 1_000_000, 0),
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
    fn test_urgent_released() {
        let policy = DeadlinePolicy::new(5);
        // deadline 10, tick 8 → 2 ticks remaining, urgent
        assert_eq!(policy.decide(&ctx_at(8, 10)), Decision::Release);
    }

    #[test]
    fn test_distant_held() {
        let policy = DeadlinePolicy::new(5);
        // deadline 50, tick 8 → 42 ticks remaining
        assert_eq!(policy.decide(&ctx_at(8, 50)), Decision::Hold);
    }

    #[test]
    fn test_past_deadline_released() {
        let policy = DeadlinePolicy::new(5);
        assert_eq!(policy.decide(&ctx_at(20, 10)), Decision::Release);
    }
}
