//! Deadline violation and penalty accrual tests
//!
//! A payment that cannot settle violates its deadline exactly once, then
//! accrues one deadline penalty per tick while it remains unsettled.

use rtgs_engine_rs::scenario::{ScenarioEvent, ScenarioKind, ScenarioTiming};
use rtgs_engine_rs::{
    AgentConfig, CollateralConfig, CostRates, Engine, EngineConfig, EventKind, LsmConfig,
    PolicyConfig, SimulationParams, TransactionStatus,
};

fn stuck_payment_config() -> EngineConfig {
    EngineConfig {
        simulation: SimulationParams {
            ticks_per_day: 25,
            num_days: 1,
            rng_seed: 9,
        },
        agents: vec![
            AgentConfig {
                id: "BANK_A".to_string(),
                opening_balance: 0,
                credit_limit: 0,
                policy: PolicyConfig::Fifo,
                arrival_config: None,
                initial_collateral_lots: Vec::new(),
            },
            AgentConfig {
                id: "BANK_B".to_string(),
                opening_balance: 0,
                credit_limit: 0,
                policy: PolicyConfig::Fifo,
                arrival_config: None,
                initial_collateral_lots: Vec::new(),
            },
        ],
        scenario_events: vec![ScenarioEvent {
            tick: 0,
            timing: ScenarioTiming::PreTick,
            kind: ScenarioKind::CustomTransactionArrival {
                sender_id: "BANK_A".to_string(),
                receiver_id: "BANK_B".to_string(),
                amount: 100_000,
                priority: 5,
                deadline_offset: 10, // deadline at tick 10
                divisible: false,
            },
        }],
        policy_feature_toggles: Default::default(),
        cost_rates: CostRates::default(),
        lsm: LsmConfig::default(),
        collateral: CollateralConfig::default(),
    }
}

fn deadline_penalty_at(engine: &Engine, tick: usize, agent: &str) -> i64 {
    engine
        .get_tick_events(tick)
        .iter()
        .filter_map(|e| match &e.kind {
            EventKind::CostAccrual { agent_id, costs } if agent_id == agent => {
                Some(costs.deadline_penalty)
            }
            _ => None,
        })
        .sum()
}

#[test]
fn test_violation_fires_once_then_overdue_each_tick() {
    let mut engine = Engine::new(stuck_payment_config()).unwrap();

    for _ in 0..=20 {
        engine.tick().unwrap();
    }

    let violations = engine.event_log().events_of_kind("DeadlineViolation");
    assert_eq!(violations.len(), 1);
    assert_eq!(violations[0].tick, 11, "first tick past the deadline");

    // Ticks 12..=20 each carry an Overdue marker
    let overdue = engine.event_log().events_of_kind("Overdue");
    assert_eq!(overdue.len(), 9);
    assert!(overdue.iter().all(|e| (12..=20).contains(&e.tick)));

    // The obligation stays live and past-deadline
    assert!(matches!(
        engine.get_transaction("tx-BANK_A-000001").unwrap().status(),
        TransactionStatus::Expired
    ));
}

#[test]
fn test_penalty_accrues_per_tick_past_deadline() {
    let mut engine = Engine::new(stuck_payment_config()).unwrap();
    let penalty_rate = CostRates::default().deadline_penalty_per_tick;

    for _ in 0..=20 {
        engine.tick().unwrap();
    }

    // No penalty up to and including the deadline tick
    for tick in 0..=10 {
        assert_eq!(deadline_penalty_at(&engine, tick, "BANK_A"), 0);
    }

    // One penalty per tick from the violation tick onward
    for tick in 11..=20 {
        assert_eq!(
            deadline_penalty_at(&engine, tick, "BANK_A"),
            penalty_rate,
            "tick {} missing its penalty delta",
            tick
        );
    }

    let costs = engine.get_agent_state("BANK_A").unwrap().accrued_costs;
    assert_eq!(costs.total_deadline_penalty, penalty_rate * 10);
}

#[test]
fn test_overdue_payment_still_settles_when_funded() {
    let mut config = stuck_payment_config();
    // Liquidity arrives at tick 15 via a forced transfer
    config.scenario_events.push(ScenarioEvent {
        tick: 15,
        timing: ScenarioTiming::PreTick,
        kind: ScenarioKind::DirectTransfer {
            from: "BANK_B".to_string(),
            to: "BANK_A".to_string(),
            amount: 100_000,
        },
    });
    // Fund BANK_B so the forced transfer doesn't breach its floor
    config.agents[1].opening_balance = 100_000;

    let mut engine = Engine::new(config).unwrap();
    for _ in 0..=20 {
        engine.tick().unwrap();
    }

    // The Queue 2 sweep settles it at tick 15
    let releases = engine.event_log().events_of_kind("Queue2Release");
    assert_eq!(releases.len(), 1);
    assert_eq!(releases[0].tick, 15);

    // Penalties accrued ticks 11..=15 only (settled during tick 15's
    // sweep, before that tick's deadline check)
    let costs = engine.get_agent_state("BANK_A").unwrap().accrued_costs;
    let penalty_rate = CostRates::default().deadline_penalty_per_tick;
    assert_eq!(costs.total_deadline_penalty, penalty_rate * 4);
}
