//! Scheduled scenario events
//!
//! A scenario is a list of `{tick, kind, params}` entries applied to the
//! running simulation: forced transfers, arrival-rate shocks, deadline
//! window changes, counterparty rewiring, collateral adjustments, and
//! injected payments. Each entry fires exactly once at its scheduled
//! tick; within a tick, execution order is the insertion order of the
//! schedule. Execution itself lives in the orchestrator, which emits a
//! `ScenarioEventExecuted` event with before/after values.

use serde::{Deserialize, Serialize};

/// When within the tick a scenario event fires
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ScenarioTiming {
    /// Before arrivals (phase 1)
    PreTick,
    /// After cost accrual, before end-of-day bookkeeping (phase 10)
    PostTick,
}

impl Default for ScenarioTiming {
    fn default() -> Self {
        ScenarioTiming::PreTick
    }
}

/// Scenario event kinds
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum ScenarioKind {
    /// Forced settlement between two agents (bypasses liquidity checks)
    DirectTransfer {
        from: String,
        to: String,
        amount: i64,
    },

    /// Multiply one agent's arrival rate (relative to its base rate)
    AgentArrivalRateChange { agent_id: String, multiplier: f64 },

    /// Multiply every agent's arrival rate (relative to base rates)
    GlobalArrivalRateChange { multiplier: f64 },

    /// Replace an agent's deadline offset window
    DeadlineWindowChange {
        agent_id: String,
        deadline_min: usize,
        deadline_max: usize,
    },

    /// Set one counterparty weight, optionally rebalancing the others
    /// proportionally so the total weight is preserved
    CounterpartyWeightChange {
        agent_id: String,
        counterparty: String,
        weight: f64,
        #[serde(default)]
        rebalance_others: bool,
    },

    /// Post (positive amount) or withdraw (negative amount) collateral
    ///
    /// Withdrawals go through the safety-buffer guard and are clamped;
    /// as an external intervention they are not subject to the
    /// minimum-holding timer.
    CollateralAdjustment {
        agent_id: String,
        amount: i64,
        haircut: f64,
    },

    /// Inject a specific transaction into the sender's Queue 1
    CustomTransactionArrival {
        sender_id: String,
        receiver_id: String,
        amount: i64,
        priority: u8,
        /// Deadline as an offset from the firing tick
        deadline_offset: usize,
        #[serde(default)]
        divisible: bool,
    },
}

impl ScenarioKind {
    /// Short name recorded in `ScenarioEventExecuted`
    pub fn name(&self) -> &'static str {
        match self {
            ScenarioKind::DirectTransfer { .. } => "DirectTransfer",
            ScenarioKind::AgentArrivalRateChange { .. } => "AgentArrivalRateChange",
            ScenarioKind::GlobalArrivalRateChange { .. } => "GlobalArrivalRateChange",
            ScenarioKind::DeadlineWindowChange { .. } => "DeadlineWindowChange",
            ScenarioKind::CounterpartyWeightChange { .. } => "CounterpartyWeightChange",
            ScenarioKind::CollateralAdjustment { .. } => "CollateralAdjustment",
            ScenarioKind::CustomTransactionArrival { .. } => "CustomTransactionArrival",
        }
    }
}

/// One scheduled scenario event
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ScenarioEvent {
    /// Tick at which the event fires
    pub tick: usize,

    /// Pre- or post-tick execution
    #[serde(default)]
    pub timing: ScenarioTiming,

    #[serde(flatten)]
    pub kind: ScenarioKind,
}

/// Holds the schedule and tracks which entries have fired
#[derive(Debug, Clone)]
pub struct ScenarioDispatcher {
    events: Vec<ScenarioEvent>,
    fired: Vec<bool>,
}

impl ScenarioDispatcher {
    /// Create a dispatcher over a schedule (insertion order preserved)
    pub fn new(events: Vec<ScenarioEvent>) -> Self {
        let fired = vec![false; events.len()];
        Self { events, fired }
    }

    /// Take the events due at `(tick, timing)`, in insertion order
    ///
    /// Each entry is returned at most once over the simulation.
    pub fn take_due(&mut self, tick: usize, timing: ScenarioTiming) -> Vec<ScenarioEvent> {
        let mut due = Vec::new();
        for (idx, event) in self.events.iter().enumerate() {
            if !self.fired[idx] && event.tick == tick && event.timing == timing {
                self.fired[idx] = true;
                due.push(event.clone());
            }
        }
        due
    }

    /// The full schedule
    pub fn events(&self) -> &[ScenarioEvent] {
        &self.events
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn transfer_at(tick: usize) -> ScenarioEvent {
        ScenarioEvent {
            tick,
            timing: ScenarioTiming::PreTick,
            kind: ScenarioKind::DirectTransfer {
                from: "A".to_string(),
                to: "B".to_string(),
                amount: 100,
            },
        }
    }

    #[test]
    fn test_events_fire_exactly_once() {
        let mut dispatcher = ScenarioDispatcher::new(vec![transfer_at(5)]);

        assert!(dispatcher.take_due(4, ScenarioTiming::PreTick).is_empty());
        assert_eq!(dispatcher.take_due(5, ScenarioTiming::PreTick).len(), 1);
        assert!(dispatcher.take_due(5, ScenarioTiming::PreTick).is_empty());
    }

    #[test]
    fn test_insertion_order_within_tick() {
        let mut second = transfer_at(3);
        if let ScenarioKind::DirectTransfer { amount, .. } = &mut second.kind {
            *amount = 200;
        }
        let mut dispatcher = ScenarioDispatcher::new(vec![transfer_at(3), second]);

        let due = dispatcher.take_due(3, ScenarioTiming::PreTick);
        assert_eq!(due.len(), 2);
        match (&due[0].kind, &due[1].kind) {
            (
                ScenarioKind::DirectTransfer { amount: first, .. },
                ScenarioKind::DirectTransfer { amount: second, .. },
            ) => {
                assert_eq!(*first, 100);
                assert_eq!(*second, 200);
            }
            _ => panic!("unexpected kinds"),
        }
    }

    #[test]
    fn test_timing_separates_phases() {
        let mut post = transfer_at(3);
        post.timing = ScenarioTiming::PostTick;
        let mut dispatcher = ScenarioDispatcher::new(vec![transfer_at(3), post]);

        assert_eq!(dispatcher.take_due(3, ScenarioTiming::PreTick).len(), 1);
        assert_eq!(dispatcher.take_due(3, ScenarioTiming::PostTick).len(), 1);
    }

    #[test]
    fn test_scenario_event_deserializes_flat() {
        let json = r#"{
            "tick": 10,
            "kind": "agent_arrival_rate_change",
            "agent_id": "BANK_A",
            "multiplier": 2.0
        }"#;

        let event: ScenarioEvent = serde_json::from_str(json).unwrap();
        assert_eq!(event.tick, 10);
        assert_eq!(event.timing, ScenarioTiming::PreTick);
        assert!(matches!(
            event.kind,
            ScenarioKind::AgentArrivalRateChange { .. }
        ));
    }
}
