//! Collateral lifecycle tests
//!
//! The withdrawal guard (manual and timer paths), haircut math, the
//! minimum-holding timer, and clamped partial auto-withdrawals.

use rtgs_engine_rs::{
    AgentConfig, CollateralConfig, CollateralLotConfig, CostRates, Engine, EngineConfig,
    EngineError, LsmConfig, PolicyConfig, SimulationParams,
};

fn config_with(
    balance: i64,
    credit_limit: i64,
    lots: Vec<CollateralLotConfig>,
    collateral: CollateralConfig,
) -> EngineConfig {
    EngineConfig {
        simulation: SimulationParams {
            ticks_per_day: 50,
            num_days: 1,
            rng_seed: 3,
        },
        agents: vec![
            AgentConfig {
                id: "BANK_A".to_string(),
                opening_balance: balance,
                credit_limit,
                policy: PolicyConfig::Fifo,
                arrival_config: None,
                initial_collateral_lots: lots,
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
        scenario_events: Vec::new(),
        policy_feature_toggles: Default::default(),
        cost_rates: CostRates::default(),
        lsm: LsmConfig::default(),
        collateral,
    }
}

#[test]
fn test_guarded_withdrawal_preserves_credit_coverage() {
    // Deep overdraft backed by a large haircut lot: a modest withdrawal
    // must still be allowed, and must leave credit usage covered
    let mut engine = Engine::new(config_with(
        -300_000,
        120_000,
        vec![CollateralLotConfig {
            face_value: 39_345_897,
            haircut: 0.02,
            auto_withdraw_after_ticks: None,
        }],
        CollateralConfig {
            min_holding_ticks: 0,
            safety_buffer: 100,
        },
    ))
    .unwrap();

    let snapshot = engine.get_agent_state("BANK_A").unwrap();
    assert_eq!(snapshot.credit_used, 300_000);
    // floor(39_345_897 × 0.98) = 38_558_979
    assert_eq!(snapshot.allowed_overdraft_limit, 120_000 + 38_558_979);

    let withdrawn = engine
        .withdraw_collateral("BANK_A", "BANK_A-lot-0001", 529_812)
        .unwrap();
    assert_eq!(withdrawn, 529_812);

    let after = engine.get_agent_state("BANK_A").unwrap();
    assert!(after.allowed_overdraft_limit >= after.credit_used + 100);
    assert!(after.balance >= -after.allowed_overdraft_limit);
}

#[test]
fn test_withdrawal_clamped_to_guard() {
    // credit_used 90_000 + buffer 5_000 leaves only 5_000 of face free
    let mut engine = Engine::new(config_with(
        -90_000,
        0,
        vec![CollateralLotConfig {
            face_value: 100_000,
            haircut: 0.0,
            auto_withdraw_after_ticks: None,
        }],
        CollateralConfig {
            min_holding_ticks: 0,
            safety_buffer: 5_000,
        },
    ))
    .unwrap();

    let withdrawn = engine
        .withdraw_collateral("BANK_A", "BANK_A-lot-0001", 50_000)
        .unwrap();
    assert_eq!(withdrawn, 5_000);
    assert_eq!(
        engine.get_agent_state("BANK_A").unwrap().posted_collateral,
        95_000
    );
}

#[test]
fn test_withdrawal_refused_when_fully_pledged() {
    let mut engine = Engine::new(config_with(
        -100_000,
        0,
        vec![CollateralLotConfig {
            face_value: 100_000,
            haircut: 0.0,
            auto_withdraw_after_ticks: None,
        }],
        CollateralConfig {
            min_holding_ticks: 0,
            safety_buffer: 0,
        },
    ))
    .unwrap();

    assert!(matches!(
        engine.withdraw_collateral("BANK_A", "BANK_A-lot-0001", 1),
        Err(EngineError::ConstraintViolation(_))
    ));
}

#[test]
fn test_min_holding_blocks_manual_withdrawal() {
    let mut engine = Engine::new(config_with(
        1_000_000,
        0,
        vec![CollateralLotConfig {
            face_value: 100_000,
            haircut: 0.0,
            auto_withdraw_after_ticks: None,
        }],
        CollateralConfig {
            min_holding_ticks: 5,
            safety_buffer: 0,
        },
    ))
    .unwrap();

    // Inside the holding period
    assert!(matches!(
        engine.withdraw_collateral("BANK_A", "BANK_A-lot-0001", 100_000),
        Err(EngineError::ConstraintViolation(_))
    ));

    for _ in 0..5 {
        engine.tick().unwrap();
    }

    // current_tick = 5, posted at 0, holding elapsed
    let withdrawn = engine
        .withdraw_collateral("BANK_A", "BANK_A-lot-0001", 100_000)
        .unwrap();
    assert_eq!(withdrawn, 100_000);
    assert_eq!(engine.get_agent_state("BANK_A").unwrap().posted_collateral, 0);
}

#[test]
fn test_post_then_withdraw_round_trip() {
    let mut engine = Engine::new(config_with(
        500_000,
        250_000,
        Vec::new(),
        CollateralConfig {
            min_holding_ticks: 0,
            safety_buffer: 0,
        },
    ))
    .unwrap();

    let limit_before = engine
        .get_agent_state("BANK_A")
        .unwrap()
        .allowed_overdraft_limit;

    let lot_id = engine.post_collateral("BANK_A", 777_777, 0.13).unwrap();
    let withdrawn = engine
        .withdraw_collateral("BANK_A", &lot_id, 777_777)
        .unwrap();
    assert_eq!(withdrawn, 777_777);

    let limit_after = engine
        .get_agent_state("BANK_A")
        .unwrap()
        .allowed_overdraft_limit;
    assert_eq!(limit_before, limit_after);
}

#[test]
fn test_timer_withdraws_whole_lot_when_safe() {
    let mut engine = Engine::new(config_with(
        1_000_000,
        0,
        vec![CollateralLotConfig {
            face_value: 200_000,
            haircut: 0.1,
            auto_withdraw_after_ticks: Some(3),
        }],
        CollateralConfig {
            min_holding_ticks: 2,
            safety_buffer: 0,
        },
    ))
    .unwrap();

    for _ in 0..3 {
        engine.tick().unwrap();
        assert_eq!(
            engine.get_agent_state("BANK_A").unwrap().posted_collateral,
            200_000
        );
    }

    // Timer fires during tick 3's collateral phase
    engine.tick().unwrap();
    assert_eq!(engine.get_agent_state("BANK_A").unwrap().posted_collateral, 0);

    let withdrawals = engine.event_log().events_of_kind("CollateralWithdrawn");
    assert_eq!(withdrawals.len(), 1);
    assert_eq!(withdrawals[0].tick, 3);
}

#[test]
fn test_timer_withdrawal_clamped_while_in_overdraft() {
    // Overdraft pins most of the lot; the timer takes only the free part
    // and keeps retrying the remainder
    let mut engine = Engine::new(config_with(
        -90_000,
        0,
        vec![CollateralLotConfig {
            face_value: 100_000,
            haircut: 0.0,
            auto_withdraw_after_ticks: Some(0),
        }],
        CollateralConfig {
            min_holding_ticks: 0,
            safety_buffer: 5_000,
        },
    ))
    .unwrap();

    engine.tick().unwrap();
    assert_eq!(
        engine.get_agent_state("BANK_A").unwrap().posted_collateral,
        95_000
    );

    // Nothing more is free while the overdraft persists
    engine.tick().unwrap();
    assert_eq!(
        engine.get_agent_state("BANK_A").unwrap().posted_collateral,
        95_000
    );

    let snapshot = engine.get_agent_state("BANK_A").unwrap();
    assert!(snapshot.allowed_overdraft_limit >= snapshot.credit_used + 5_000);
}
