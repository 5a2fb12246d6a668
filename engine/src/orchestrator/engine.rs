//! Engine - main simulation loop
//!
//! Owns all simulation state and drives each tick through a fixed phase
//! ordering:
//!
//! ```text
//! 1. Scenario pre-tick events
//! 2. Arrivals (per-agent streams → Queue 1)
//! 3. Policy pass (Queue 1, front-to-back, agents in ID order)
//! 4. RTGS submission (immediate settlement or Queue 2)
//! 5. LSM pass (bilateral offsets, multilateral cycles)
//! 6. Queue 2 sweep (priority order)
//! 7. Collateral timers (guarded auto-withdrawals)
//! 8. Deadline check (mark overdue, accrue penalties)
//! 9. Cost accrual (liquidity, delay, collateral)
//! 10. Scenario post-tick events, end-of-day bookkeeping
//! ```
//!
//! All iteration is over explicitly ordered collections, so given the
//! same configuration the engine produces a byte-identical event stream.
//! Invariant violations (overdraft floor, conservation) halt the
//! simulation with full context.

use crate::arrivals::ArrivalGenerator;
use crate::core::time::TimeManager;
use crate::costs::{bps_cost, CostBreakdown, CostLedger, CostRates};
use crate::models::agent::Agent;
use crate::models::event::{EventKind, EventLog};
use crate::models::state::SimulationState;
use crate::models::transaction::Transaction;
use crate::orchestrator::config::{
    CollateralConfig, ConfigError, EngineConfig, PolicyConfig,
};
use crate::policy::{
    Decision, DeadlinePolicy, EvalContext, FifoPolicy, LiquidityAwarePolicy, Policy, PolicyClock,
    TreePolicy,
};
use crate::scenario::{ScenarioDispatcher, ScenarioEvent, ScenarioKind, ScenarioTiming};
use crate::settlement::lsm::{run_lsm_pass, LsmConfig};
use crate::settlement::rtgs::{settle, sweep_queue2, SettlementError};
use std::collections::BTreeMap;
use thiserror::Error;
use tracing::{debug, warn};

/// Runtime errors surfaced by the engine API
#[derive(Debug, Error)]
pub enum EngineError {
    #[error("Not found: {0}")]
    NotFound(String),

    #[error("Constraint violation: {0}")]
    ConstraintViolation(String),

    #[error("Invariant violation: {0}")]
    InvariantViolation(String),

    #[error("Simulation has run its full horizon")]
    SimulationComplete,
}

/// Per-tick summary returned by [`Engine::tick`]
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct TickSummary {
    pub tick: usize,
    pub day: usize,

    /// New arrivals this tick (generated plus injected)
    pub arrivals: usize,

    /// Transactions settled this tick across all paths
    pub settlements: usize,

    /// Bilateral offsets settled by the LSM pass
    pub lsm_offsets: usize,

    /// Multilateral cycles settled by the LSM pass
    pub lsm_cycles: usize,

    /// Total Queue 1 population after the tick
    pub queue1_total_size: usize,

    /// Queue 2 population after the tick
    pub queue2_size: usize,

    /// Total cost accrued across all agents this tick (cents)
    pub total_cost_delta: i64,
}

/// Point-in-time view of one agent for observers
#[derive(Debug, Clone)]
pub struct AgentStateSnapshot {
    pub agent_id: String,
    pub balance: i64,
    pub credit_limit: i64,
    pub credit_used: i64,
    pub allowed_overdraft_limit: i64,
    pub posted_collateral: i64,
    pub queue1_size: usize,
    pub accrued_costs: CostLedger,
}

/// Engine-lifetime aggregate metrics
#[derive(Debug, Clone, PartialEq)]
pub struct SystemMetrics {
    pub total_arrivals: usize,
    pub total_settlements: usize,
    /// Settled ÷ arrived (0.0 before any arrival)
    pub settlement_rate: f64,
    pub avg_delay_ticks: f64,
    pub max_delay_ticks: usize,
    pub queue1_total_size: usize,
    pub queue2_total_size: usize,
    /// Deepest overdraft any agent has run (positive magnitude)
    pub peak_overdraft: i64,
    /// Agents currently below zero
    pub agents_in_overdraft: usize,
}

/// The deterministic discrete-event settlement engine
pub struct Engine {
    state: SimulationState,
    time: TimeManager,
    arrivals: ArrivalGenerator,
    policies: BTreeMap<String, Box<dyn Policy>>,
    scenario: ScenarioDispatcher,
    cost_rates: CostRates,
    lsm_config: LsmConfig,
    collateral_config: CollateralConfig,
    event_log: EventLog,

    /// Flat charges (split friction, deadline penalties, drop penalties)
    /// accumulated during the tick, folded into phase 9's CostAccrual
    tick_costs: BTreeMap<String, CostBreakdown>,

    // Lifetime metrics
    total_arrivals: usize,
    total_settlements: usize,
    delay_sum: usize,
    max_delay_ticks: usize,
    min_balance_seen: i64,

    // Day counters (reset at end of day)
    settled_today: usize,
    cost_today: i64,

    /// Opening total balance; conservation is checked every tick
    expected_total_balance: i64,
}

impl Engine {
    /// Build an engine from a validated configuration
    pub fn new(config: EngineConfig) -> Result<Self, ConfigError> {
        config.validate()?;

        let horizon = config.simulation.horizon();

        // Agents with their initial collateral books
        let mut agents = Vec::with_capacity(config.agents.len());
        for agent_config in &config.agents {
            let mut agent = Agent::new(
                agent_config.id.clone(),
                agent_config.opening_balance,
                agent_config.credit_limit,
            );
            for lot in &agent_config.initial_collateral_lots {
                agent.post_collateral(lot.face_value, lot.haircut, 0, lot.auto_withdraw_after_ticks);
            }
            agents.push(agent);
        }

        let state = SimulationState::new(agents);
        let expected_total_balance = state.total_balance();

        // Policies, in agent order
        let mut policies: BTreeMap<String, Box<dyn Policy>> = BTreeMap::new();
        for agent_config in &config.agents {
            policies.insert(agent_config.id.clone(), build_policy(&agent_config.policy));
        }

        // Arrival streams for every agent, configs where present
        let mut arrival_configs = BTreeMap::new();
        for agent_config in &config.agents {
            if let Some(arrival) = &agent_config.arrival_config {
                arrival_configs.insert(agent_config.id.clone(), arrival.clone());
            }
        }
        let all_agent_ids: Vec<String> =
            config.agents.iter().map(|a| a.id.clone()).collect();
        let arrivals = ArrivalGenerator::new(
            arrival_configs,
            all_agent_ids,
            config.simulation.rng_seed,
            horizon,
        );

        Ok(Self {
            state,
            time: TimeManager::new(config.simulation.ticks_per_day, config.simulation.num_days),
            arrivals,
            policies,
            scenario: ScenarioDispatcher::new(config.scenario_events.clone()),
            cost_rates: config.cost_rates.clone(),
            lsm_config: config.lsm.clone(),
            collateral_config: config.collateral.clone(),
            event_log: EventLog::new(),
            tick_costs: BTreeMap::new(),
            total_arrivals: 0,
            total_settlements: 0,
            delay_sum: 0,
            max_delay_ticks: 0,
            min_balance_seen: 0,
            settled_today: 0,
            cost_today: 0,
            expected_total_balance,
        })
    }

    // ========================================================================
    // Tick loop
    // ========================================================================

    /// Execute one simulation tick
    pub fn tick(&mut self) -> Result<TickSummary, EngineError> {
        if self.time.is_finished() {
            return Err(EngineError::SimulationComplete);
        }

        let tick = self.time.current_tick();
        self.tick_costs.clear();

        // Phase 1: scenario pre-tick
        self.run_scenario_phase(tick, ScenarioTiming::PreTick);

        // Phase 2: arrivals
        let arrivals = self.run_arrivals(tick);

        // Phase 3: policy pass
        let released = self.run_policy_pass(tick);

        // Phase 4: RTGS submission
        let mut settlements = self.run_submissions(tick, released)?;

        // Phase 5: LSM pass
        let (lsm_offsets, lsm_cycles, lsm_settled) = self.run_lsm(tick);
        settlements += lsm_settled;

        // Phase 6: Queue 2 sweep
        settlements += self.run_sweep(tick);

        // Phase 7: collateral timers
        self.run_collateral_timers(tick);

        // Phase 8: deadline check
        self.run_deadline_check(tick);

        // Phase 9: cost accrual
        let total_cost_delta = self.run_cost_accrual(tick);

        // Phase 10: scenario post-tick and end-of-day
        self.run_scenario_phase(tick, ScenarioTiming::PostTick);
        if self.time.is_end_of_day() {
            self.handle_end_of_day(tick);
        }

        self.check_invariants(tick)?;

        let summary = TickSummary {
            tick,
            day: self.time.current_day(),
            arrivals,
            settlements,
            lsm_offsets,
            lsm_cycles,
            queue1_total_size: self.state.total_queue1_size(),
            queue2_size: self.state.queue2_size(),
            total_cost_delta,
        };

        self.time.advance_tick();
        Ok(summary)
    }

    fn run_arrivals(&mut self, tick: usize) -> usize {
        let mut count = 0;

        for agent_id in self.state.agent_ids() {
            let new_transactions = self.arrivals.generate_for_agent(&agent_id, tick);
            count += new_transactions.len();

            for tx in new_transactions {
                self.admit_transaction(tick, tx);
            }
        }

        count
    }

    /// Place a new transaction into its sender's Queue 1 and log it
    fn admit_transaction(&mut self, tick: usize, mut tx: Transaction) {
        tx.mark_queued1();
        let tx_id = tx.id().to_string();

        self.event_log.record(
            tick,
            EventKind::Arrival {
                tx_id: tx_id.clone(),
                sender_id: tx.sender_id().to_string(),
                receiver_id: tx.receiver_id().to_string(),
                amount: tx.amount(),
                priority: tx.priority(),
                deadline_tick: tx.deadline_tick(),
                divisible: tx.is_divisible(),
            },
        );

        let sender = tx.sender_id().to_string();
        self.state.add_transaction(tx);
        self.state
            .get_agent_mut(&sender)
            .expect("arrival sender exists")
            .queue1_push(tx_id);
        self.total_arrivals += 1;
    }

    /// Evaluate every agent's policy over its Queue 1, front to back
    ///
    /// Returns the released transactions in release order. Split children
    /// take the parent's queue position and are evaluated in the same
    /// pass; they are born indivisible, so the pass terminates.
    fn run_policy_pass(&mut self, tick: usize) -> Vec<(String, String)> {
        let mut released = Vec::new();
        let clock = PolicyClock {
            tick,
            ticks_per_day: self.time.ticks_per_day(),
        };

        for agent_id in self.state.agent_ids() {
            let mut idx = 0;
            loop {
                let tx_id = match self
                    .state
                    .get_agent(&agent_id)
                    .and_then(|a| a.queue1().get(idx).cloned())
                {
                    Some(id) => id,
                    None => break,
                };

                let decision = {
                    let tx = self.state.get_transaction(&tx_id).expect("queued tx exists");
                    let agent = self.state.get_agent(&agent_id).expect("agent exists");
                    let ctx =
                        EvalContext::build(tx, agent, &self.state, clock, &self.cost_rates);
                    self.policies
                        .get(&agent_id)
                        .expect("policy exists")
                        .decide(&ctx)
                };

                self.event_log.record(
                    tick,
                    EventKind::PolicyDecision {
                        agent_id: agent_id.clone(),
                        tx_id: tx_id.clone(),
                        action: decision.action_name().to_string(),
                    },
                );

                match decision {
                    Decision::Release => {
                        self.state
                            .get_agent_mut(&agent_id)
                            .unwrap()
                            .queue1_remove(&tx_id);
                        self.event_log.record(
                            tick,
                            EventKind::Queue1Release {
                                agent_id: agent_id.clone(),
                                tx_id: tx_id.clone(),
                            },
                        );
                        released.push((agent_id.clone(), tx_id));
                        // Next entry slides into this index
                    }

                    Decision::Hold => {
                        idx += 1;
                    }

                    Decision::Drop => {
                        self.state
                            .get_agent_mut(&agent_id)
                            .unwrap()
                            .queue1_remove(&tx_id);
                        self.state
                            .get_transaction_mut(&tx_id)
                            .unwrap()
                            .drop_transaction(tick);
                        // Dropped obligations are penalized once
                        self.tick_costs
                            .entry(agent_id.clone())
                            .or_default()
                            .deadline_penalty += self.cost_rates.deadline_penalty_per_tick;
                    }

                    Decision::Split { parts } => {
                        if !self.apply_split(tick, &agent_id, &tx_id, idx, parts) {
                            idx += 1;
                        }
                        // On success the first child sits at idx
                    }

                    Decision::Reprioritize { new_priority } => {
                        self.state
                            .get_transaction_mut(&tx_id)
                            .unwrap()
                            .set_priority(new_priority);
                        idx += 1;
                    }
                }
            }
        }

        released
    }

    /// Replace a divisible parent with `parts` children at its queue slot
    ///
    /// Returns false (and leaves the queue untouched) when the split is
    /// not permitted; the transaction is then treated as held.
    fn apply_split(
        &mut self,
        tick: usize,
        agent_id: &str,
        tx_id: &str,
        queue_index: usize,
        parts: usize,
    ) -> bool {
        let parent = self.state.get_transaction(tx_id).unwrap().clone();

        if !parent.is_divisible() || parts < 2 || (parts as i64) > parent.amount() {
            warn!(
                agent = agent_id,
                tx = tx_id,
                parts,
                "split rejected; holding transaction"
            );
            return false;
        }

        // Equal children, remainder on the last so amounts sum exactly
        let base = parent.amount() / parts as i64;
        let remainder = parent.amount() % parts as i64;

        let mut child_ids = Vec::with_capacity(parts);
        for i in 0..parts {
            let amount = if i == parts - 1 { base + remainder } else { base };
            let child_id = format!("{}-s{}", tx_id, i + 1);
            let mut child = Transaction::new_child(&parent, child_id.clone(), amount);
            child.mark_queued1();
            child_ids.push(child_id);
            self.state.add_transaction(child);
        }

        // Parent leaves the system, superseded by its children
        let agent = self.state.get_agent_mut(agent_id).unwrap();
        agent.queue1_remove(tx_id);
        agent.queue1_insert_at(queue_index, child_ids.clone());
        self.state
            .get_transaction_mut(tx_id)
            .unwrap()
            .drop_transaction(tick);

        let friction = self.cost_rates.split_friction_cost * (parts as i64 - 1);
        self.tick_costs
            .entry(agent_id.to_string())
            .or_default()
            .split_friction_cost += friction;

        self.event_log.record(
            tick,
            EventKind::Split {
                agent_id: agent_id.to_string(),
                parent_tx_id: tx_id.to_string(),
                child_ids,
                num_parts: parts,
            },
        );

        true
    }

    /// Attempt immediate settlement of each released transaction; queue
    /// the failures
    fn run_submissions(
        &mut self,
        tick: usize,
        released: Vec<(String, String)>,
    ) -> Result<usize, EngineError> {
        let mut settlements = 0;

        for (_agent_id, tx_id) in released {
            self.state
                .get_transaction_mut(&tx_id)
                .unwrap()
                .mark_submitted(tick);

            match settle(&mut self.state, &tx_id, tick) {
                Ok(leg) => {
                    self.event_log.record(
                        tick,
                        EventKind::RtgsImmediateSettlement {
                            tx_id: leg.tx_id.clone(),
                            sender_id: leg.sender_id,
                            receiver_id: leg.receiver_id,
                            amount: leg.amount,
                        },
                    );
                    self.note_settled(tick, &leg.tx_id);
                    settlements += 1;
                }
                Err(SettlementError::InsufficientLiquidity { .. }) => {
                    let sender = self
                        .state
                        .get_transaction(&tx_id)
                        .unwrap()
                        .sender_id()
                        .to_string();
                    let position = self.state.queue2_insert(tx_id.clone());
                    self.event_log.record(
                        tick,
                        EventKind::Queue2Hold {
                            tx_id,
                            sender_id: sender,
                            position,
                        },
                    );
                }
                Err(other) => {
                    return Err(EngineError::InvariantViolation(format!(
                        "submission of {} failed unexpectedly: {}",
                        tx_id, other
                    )));
                }
            }
        }

        Ok(settlements)
    }

    fn run_lsm(&mut self, tick: usize) -> (usize, usize, usize) {
        let result = run_lsm_pass(&mut self.state, &self.lsm_config, tick);

        for offset in &result.offsets {
            self.event_log.record(
                tick,
                EventKind::LsmBilateralOffset {
                    agent_a: offset.agent_a.clone(),
                    agent_b: offset.agent_b.clone(),
                    tx_id_a: offset.tx_id_a.clone(),
                    tx_id_b: offset.tx_id_b.clone(),
                    amount_a: offset.amount_a,
                    amount_b: offset.amount_b,
                },
            );
        }
        for cycle in &result.cycles {
            self.event_log.record(
                tick,
                EventKind::LsmCycleSettlement {
                    agents: cycle.agents.clone(),
                    tx_ids: cycle.tx_ids.clone(),
                    total_value: cycle.total_value,
                    max_net_outflow: cycle.max_net_outflow,
                },
            );
        }

        for tx_id in result.settled_tx_ids() {
            self.note_settled(tick, &tx_id);
        }

        (
            result.offsets.len(),
            result.cycles.len(),
            result.settled_count(),
        )
    }

    fn run_sweep(&mut self, tick: usize) -> usize {
        let result = sweep_queue2(&mut self.state, tick);

        for leg in &result.settled {
            self.event_log.record(
                tick,
                EventKind::Queue2Release {
                    tx_id: leg.tx_id.clone(),
                    sender_id: leg.sender_id.clone(),
                    receiver_id: leg.receiver_id.clone(),
                    amount: leg.amount,
                },
            );
            self.note_settled(tick, &leg.tx_id);
        }

        result.settled.len()
    }

    /// Fire expired auto-withdraw timers, clamped by the shared guard
    fn run_collateral_timers(&mut self, tick: usize) {
        for agent_id in self.state.agent_ids() {
            let due: Vec<String> = {
                let agent = self.state.get_agent(&agent_id).unwrap();
                agent
                    .collateral_lots()
                    .iter()
                    .filter(|lot| {
                        lot.auto_withdraw_tick().map_or(false, |t| t <= tick)
                            && lot.holding_elapsed(tick, self.collateral_config.min_holding_ticks)
                    })
                    .map(|lot| lot.lot_id().to_string())
                    .collect()
            };

            for lot_id in due {
                let (face, max_safe) = {
                    let agent = self.state.get_agent(&agent_id).unwrap();
                    let face = agent.get_lot(&lot_id).map(|l| l.face_value()).unwrap_or(0);
                    let max_safe = agent
                        .max_safe_withdrawal(&lot_id, self.collateral_config.safety_buffer);
                    (face, max_safe)
                };

                // Clamped: may be partial; the armed timer keeps retrying
                // the remainder on later ticks
                let amount = max_safe.min(face);
                if amount <= 0 {
                    continue;
                }

                let agent = self.state.get_agent_mut(&agent_id).unwrap();
                agent.withdraw_from_lot(&lot_id, amount);
                let remaining = agent
                    .get_lot(&lot_id)
                    .map(|l| l.face_value())
                    .unwrap_or(0);

                self.event_log.record(
                    tick,
                    EventKind::CollateralWithdrawn {
                        agent_id: agent_id.clone(),
                        lot_id,
                        amount,
                        remaining_face_value: remaining,
                    },
                );
            }
        }
    }

    /// Mark overdue transactions and accrue per-tick deadline penalties
    fn run_deadline_check(&mut self, tick: usize) {
        // (sender, tx_id) pairs still awaiting settlement, queue1 first
        // (agents in ID order), then Queue 2 in sweep order
        let mut pending: Vec<(String, String)> = Vec::new();
        for agent_id in self.state.agent_ids() {
            let agent = self.state.get_agent(&agent_id).unwrap();
            for tx_id in agent.queue1() {
                pending.push((agent_id.clone(), tx_id.clone()));
            }
        }
        for tx_id in self.state.rtgs_queue() {
            if let Some(tx) = self.state.get_transaction(tx_id) {
                pending.push((tx.sender_id().to_string(), tx_id.clone()));
            }
        }

        for (sender, tx_id) in pending {
            let (past_deadline, first_time, deadline) = {
                let tx = self.state.get_transaction(&tx_id).unwrap();
                (
                    tx.is_past_deadline(tick) && !tx.is_settled() && !tx.is_dropped(),
                    !tx.is_overdue(),
                    tx.deadline_tick(),
                )
            };
            if !past_deadline {
                continue;
            }

            if first_time {
                self.state
                    .get_transaction_mut(&tx_id)
                    .unwrap()
                    .mark_overdue(tick);
                self.event_log.record(
                    tick,
                    EventKind::DeadlineViolation {
                        tx_id: tx_id.clone(),
                        agent_id: sender.clone(),
                        deadline_tick: deadline,
                    },
                );
            } else {
                self.event_log.record(
                    tick,
                    EventKind::Overdue {
                        tx_id: tx_id.clone(),
                        agent_id: sender.clone(),
                        ticks_overdue: tick - deadline,
                    },
                );
            }

            self.tick_costs.entry(sender).or_default().deadline_penalty +=
                self.cost_rates.deadline_penalty_per_tick;
        }
    }

    /// Accrue proportional costs and fold in the tick's flat charges
    fn run_cost_accrual(&mut self, tick: usize) -> i64 {
        let mut total_delta = 0;

        for agent_id in self.state.agent_ids() {
            let (liquidity, collateral, balance) = {
                let agent = self.state.get_agent(&agent_id).unwrap();
                (
                    bps_cost(agent.credit_used(), self.cost_rates.liquidity_bps_per_tick),
                    bps_cost(
                        agent.posted_collateral(),
                        self.cost_rates.collateral_bps_per_tick,
                    ),
                    agent.balance(),
                )
            };
            let delay = bps_cost(
                self.state.agent_queue1_value(&agent_id),
                self.cost_rates.delay_bps_per_tick,
            );

            let buffered = self.tick_costs.remove(&agent_id).unwrap_or_default();
            let costs = CostBreakdown {
                liquidity_cost: liquidity,
                delay_cost: delay,
                collateral_cost: collateral,
                split_friction_cost: buffered.split_friction_cost,
                deadline_penalty: buffered.deadline_penalty,
            };

            {
                let agent = self.state.get_agent_mut(&agent_id).unwrap();
                agent.costs_mut().add(&costs);
                agent.costs_mut().update_peak_debit(balance);
            }
            self.min_balance_seen = self.min_balance_seen.min(balance);

            if !costs.is_zero() {
                total_delta += costs.total();
                self.event_log.record(
                    tick,
                    EventKind::CostAccrual {
                        agent_id: agent_id.clone(),
                        costs,
                    },
                );
            }
        }

        self.cost_today += total_delta;
        total_delta
    }

    fn handle_end_of_day(&mut self, tick: usize) {
        let unsettled = self.state.total_queue1_size() + self.state.queue2_size();

        self.event_log.record(
            tick,
            EventKind::EndOfDay {
                day: self.time.current_day(),
                unsettled_count: unsettled,
                settled_today: self.settled_today,
                total_cost_today: self.cost_today,
            },
        );

        debug!(
            day = self.time.current_day(),
            unsettled,
            settled_today = self.settled_today,
            "end of day"
        );

        self.settled_today = 0;
        self.cost_today = 0;
    }

    // ========================================================================
    // Scenario execution
    // ========================================================================

    fn run_scenario_phase(&mut self, tick: usize, timing: ScenarioTiming) {
        let due = self.scenario.take_due(tick, timing);
        for event in due {
            self.execute_scenario(tick, event);
        }
    }

    fn execute_scenario(&mut self, tick: usize, event: ScenarioEvent) {
        let mut details: BTreeMap<String, String> = BTreeMap::new();
        let kind_name = event.kind.name().to_string();

        match event.kind {
            ScenarioKind::DirectTransfer { from, to, amount } => {
                let from_before = self.state.get_agent(&from).unwrap().balance();
                let to_before = self.state.get_agent(&to).unwrap().balance();

                // Forced settlement: bypasses the liquidity check but
                // conserves total balance
                self.state.get_agent_mut(&from).unwrap().adjust_balance(-amount);
                self.state.get_agent_mut(&to).unwrap().adjust_balance(amount);

                details.insert("from".to_string(), from.clone());
                details.insert("to".to_string(), to.clone());
                details.insert("amount".to_string(), amount.to_string());
                details.insert("from_balance_before".to_string(), from_before.to_string());
                details.insert(
                    "from_balance_after".to_string(),
                    (from_before - amount).to_string(),
                );
                details.insert("to_balance_before".to_string(), to_before.to_string());
                details.insert(
                    "to_balance_after".to_string(),
                    (to_before + amount).to_string(),
                );
            }

            ScenarioKind::AgentArrivalRateChange {
                agent_id,
                multiplier,
            } => {
                let before = self.arrivals.get_rate(&agent_id).unwrap_or(0.0);
                self.arrivals.multiply_rate(&agent_id, multiplier);
                let after = self.arrivals.get_rate(&agent_id).unwrap_or(0.0);

                details.insert("agent_id".to_string(), agent_id);
                details.insert("multiplier".to_string(), multiplier.to_string());
                details.insert("rate_before".to_string(), before.to_string());
                details.insert("rate_after".to_string(), after.to_string());
            }

            ScenarioKind::GlobalArrivalRateChange { multiplier } => {
                self.arrivals.multiply_all_rates(multiplier);
                details.insert("multiplier".to_string(), multiplier.to_string());
            }

            ScenarioKind::DeadlineWindowChange {
                agent_id,
                deadline_min,
                deadline_max,
            } => {
                let before = self.arrivals.get_deadline_range(&agent_id);
                self.arrivals
                    .set_deadline_range(&agent_id, (deadline_min, deadline_max));

                details.insert("agent_id".to_string(), agent_id);
                details.insert(
                    "range_before".to_string(),
                    format!("{:?}", before.unwrap_or((0, 0))),
                );
                details.insert(
                    "range_after".to_string(),
                    format!("({}, {})", deadline_min, deadline_max),
                );
            }

            ScenarioKind::CounterpartyWeightChange {
                agent_id,
                counterparty,
                weight,
                rebalance_others,
            } => {
                let before = self
                    .arrivals
                    .get_counterparty_weight(&agent_id, &counterparty)
                    .unwrap_or(0.0);
                self.arrivals
                    .set_counterparty_weight(&agent_id, &counterparty, weight, rebalance_others);

                details.insert("agent_id".to_string(), agent_id);
                details.insert("counterparty".to_string(), counterparty);
                details.insert("weight_before".to_string(), before.to_string());
                details.insert("weight_after".to_string(), weight.to_string());
                details.insert("rebalance_others".to_string(), rebalance_others.to_string());
            }

            ScenarioKind::CollateralAdjustment {
                agent_id,
                amount,
                haircut,
            } => {
                let before = self.state.get_agent(&agent_id).unwrap().posted_collateral();

                if amount > 0 {
                    let lot_id = self
                        .state
                        .get_agent_mut(&agent_id)
                        .unwrap()
                        .post_collateral(amount, haircut, tick, None);
                    self.event_log.record(
                        tick,
                        EventKind::CollateralPosted {
                            agent_id: agent_id.clone(),
                            lot_id,
                            face_value: amount,
                            haircut,
                        },
                    );
                } else {
                    // External withdrawal: guard-clamped across lots in
                    // posting order, not subject to the holding timer
                    let mut remaining_request = -amount;
                    let lot_ids: Vec<String> = self
                        .state
                        .get_agent(&agent_id)
                        .unwrap()
                        .collateral_lots()
                        .iter()
                        .map(|l| l.lot_id().to_string())
                        .collect();

                    for lot_id in lot_ids {
                        if remaining_request <= 0 {
                            break;
                        }
                        let (face, max_safe) = {
                            let agent = self.state.get_agent(&agent_id).unwrap();
                            (
                                agent.get_lot(&lot_id).map(|l| l.face_value()).unwrap_or(0),
                                agent.max_safe_withdrawal(
                                    &lot_id,
                                    self.collateral_config.safety_buffer,
                                ),
                            )
                        };
                        let take = remaining_request.min(max_safe).min(face);
                        if take <= 0 {
                            continue;
                        }

                        let agent = self.state.get_agent_mut(&agent_id).unwrap();
                        agent.withdraw_from_lot(&lot_id, take);
                        let remaining_face =
                            agent.get_lot(&lot_id).map(|l| l.face_value()).unwrap_or(0);
                        remaining_request -= take;

                        self.event_log.record(
                            tick,
                            EventKind::CollateralWithdrawn {
                                agent_id: agent_id.clone(),
                                lot_id,
                                amount: take,
                                remaining_face_value: remaining_face,
                            },
                        );
                    }
                }

                let after = self.state.get_agent(&agent_id).unwrap().posted_collateral();
                details.insert("agent_id".to_string(), agent_id);
                details.insert("amount".to_string(), amount.to_string());
                details.insert("posted_before".to_string(), before.to_string());
                details.insert("posted_after".to_string(), after.to_string());
            }

            ScenarioKind::CustomTransactionArrival {
                sender_id,
                receiver_id,
                amount,
                priority,
                deadline_offset,
                divisible,
            } => {
                let tx_id = self.arrivals.allocate_tx_id(&sender_id);
                let deadline = (tick + deadline_offset).min(self.time.horizon());
                let mut tx = Transaction::new(
                    tx_id.clone(),
                    sender_id.clone(),
                    receiver_id.clone(),
                    amount,
                    tick,
                    deadline,
                )
                .with_priority(priority);
                if divisible {
                    tx = tx.divisible();
                }
                self.admit_transaction(tick, tx);

                details.insert("tx_id".to_string(), tx_id);
                details.insert("sender_id".to_string(), sender_id);
                details.insert("receiver_id".to_string(), receiver_id);
                details.insert("amount".to_string(), amount.to_string());
            }
        }

        self.event_log.record(
            tick,
            EventKind::ScenarioEventExecuted {
                kind: kind_name,
                details,
            },
        );
    }

    // ========================================================================
    // Invariants & metrics plumbing
    // ========================================================================

    fn note_settled(&mut self, tick: usize, tx_id: &str) {
        let arrival = self
            .state
            .get_transaction(tx_id)
            .map(|tx| tx.arrival_tick())
            .unwrap_or(tick);
        let delay = tick.saturating_sub(arrival);

        self.delay_sum += delay;
        self.max_delay_ticks = self.max_delay_ticks.max(delay);
        self.total_settlements += 1;
        self.settled_today += 1;
    }

    fn check_invariants(&self, tick: usize) -> Result<(), EngineError> {
        let total = self.state.total_balance();
        if total != self.expected_total_balance {
            return Err(EngineError::InvariantViolation(format!(
                "tick {}: total balance {} diverged from opening total {}",
                tick, total, self.expected_total_balance
            )));
        }

        for (agent_id, agent) in self.state.agents() {
            let floor = -agent.allowed_overdraft_limit();
            if agent.balance() < floor {
                return Err(EngineError::InvariantViolation(format!(
                    "tick {}: agent {} balance {} below overdraft floor {}",
                    tick,
                    agent_id,
                    agent.balance(),
                    floor
                )));
            }
        }

        Ok(())
    }

    // ========================================================================
    // Collateral API (manual path; shares the timer path's guard)
    // ========================================================================

    /// Post a new collateral lot for an agent, returning the lot ID
    pub fn post_collateral(
        &mut self,
        agent_id: &str,
        amount: i64,
        haircut: f64,
    ) -> Result<String, EngineError> {
        if amount <= 0 {
            return Err(EngineError::ConstraintViolation(
                "collateral amount must be positive".to_string(),
            ));
        }
        if !(0.0..1.0).contains(&haircut) {
            return Err(EngineError::ConstraintViolation(
                "haircut must be in [0, 1)".to_string(),
            ));
        }

        let tick = self.time.current_tick();
        let agent = self
            .state
            .get_agent_mut(agent_id)
            .ok_or_else(|| EngineError::NotFound(format!("agent {}", agent_id)))?;
        let lot_id = agent.post_collateral(amount, haircut, tick, None);

        self.event_log.record(
            tick,
            EventKind::CollateralPosted {
                agent_id: agent_id.to_string(),
                lot_id: lot_id.clone(),
                face_value: amount,
                haircut,
            },
        );

        Ok(lot_id)
    }

    /// Withdraw up to `amount` of face value from a lot
    ///
    /// Permitted only after the minimum-holding period, and clamped so
    /// the remaining book still covers `credit_used + safety_buffer`.
    /// Returns the amount actually withdrawn.
    pub fn withdraw_collateral(
        &mut self,
        agent_id: &str,
        lot_id: &str,
        amount: i64,
    ) -> Result<i64, EngineError> {
        if amount <= 0 {
            return Err(EngineError::ConstraintViolation(
                "withdrawal amount must be positive".to_string(),
            ));
        }

        let tick = self.time.current_tick();
        let agent = self
            .state
            .get_agent(agent_id)
            .ok_or_else(|| EngineError::NotFound(format!("agent {}", agent_id)))?;
        let lot = agent
            .get_lot(lot_id)
            .ok_or_else(|| EngineError::NotFound(format!("lot {}", lot_id)))?;

        if !lot.holding_elapsed(tick, self.collateral_config.min_holding_ticks) {
            return Err(EngineError::ConstraintViolation(format!(
                "lot {} is inside its minimum holding period",
                lot_id
            )));
        }

        let max_safe = agent.max_safe_withdrawal(lot_id, self.collateral_config.safety_buffer);
        let actually_withdrawn = amount.min(max_safe).min(lot.face_value());
        if actually_withdrawn <= 0 {
            return Err(EngineError::ConstraintViolation(format!(
                "withdrawal from {} would leave credit usage uncovered",
                lot_id
            )));
        }

        let agent = self.state.get_agent_mut(agent_id).unwrap();
        agent.withdraw_from_lot(lot_id, actually_withdrawn);
        let remaining = agent.get_lot(lot_id).map(|l| l.face_value()).unwrap_or(0);

        self.event_log.record(
            tick,
            EventKind::CollateralWithdrawn {
                agent_id: agent_id.to_string(),
                lot_id: lot_id.to_string(),
                amount: actually_withdrawn,
                remaining_face_value: remaining,
            },
        );

        Ok(actually_withdrawn)
    }

    // ========================================================================
    // Query interface
    // ========================================================================

    /// Current tick (the next tick to execute)
    pub fn current_tick(&self) -> usize {
        self.time.current_tick()
    }

    /// Current day (0-indexed)
    pub fn current_day(&self) -> usize {
        self.time.current_day()
    }

    /// True once the configured horizon has run
    pub fn is_complete(&self) -> bool {
        self.time.is_finished()
    }

    /// Snapshot of one agent's state
    pub fn get_agent_state(&self, agent_id: &str) -> Result<AgentStateSnapshot, EngineError> {
        let agent = self
            .state
            .get_agent(agent_id)
            .ok_or_else(|| EngineError::NotFound(format!("agent {}", agent_id)))?;

        Ok(AgentStateSnapshot {
            agent_id: agent.id().to_string(),
            balance: agent.balance(),
            credit_limit: agent.credit_limit(),
            credit_used: agent.credit_used(),
            allowed_overdraft_limit: agent.allowed_overdraft_limit(),
            posted_collateral: agent.posted_collateral(),
            queue1_size: agent.queue1_size(),
            accrued_costs: agent.costs().clone(),
        })
    }

    /// Size of one agent's Queue 1
    pub fn get_queue1_size(&self, agent_id: &str) -> Result<usize, EngineError> {
        self.state
            .get_agent(agent_id)
            .map(|a| a.queue1_size())
            .ok_or_else(|| EngineError::NotFound(format!("agent {}", agent_id)))
    }

    /// Size of Queue 2
    pub fn get_queue2_size(&self) -> usize {
        self.state.queue2_size()
    }

    /// All events recorded at `tick`, in seq order
    pub fn get_tick_events(&self, tick: usize) -> &[crate::models::event::Event] {
        self.event_log.events_at_tick(tick)
    }

    /// The full event log
    pub fn event_log(&self) -> &EventLog {
        &self.event_log
    }

    /// Look up a transaction by ID
    pub fn get_transaction(&self, tx_id: &str) -> Result<&Transaction, EngineError> {
        self.state
            .get_transaction(tx_id)
            .ok_or_else(|| EngineError::NotFound(format!("transaction {}", tx_id)))
    }

    /// Engine-lifetime aggregate metrics
    pub fn get_system_metrics(&self) -> SystemMetrics {
        let settlement_rate = if self.total_arrivals > 0 {
            self.total_settlements as f64 / self.total_arrivals as f64
        } else {
            0.0
        };
        let avg_delay_ticks = if self.total_settlements > 0 {
            self.delay_sum as f64 / self.total_settlements as f64
        } else {
            0.0
        };
        let agents_in_overdraft = self
            .state
            .agents()
            .values()
            .filter(|a| a.is_in_overdraft())
            .count();

        SystemMetrics {
            total_arrivals: self.total_arrivals,
            total_settlements: self.total_settlements,
            settlement_rate,
            avg_delay_ticks,
            max_delay_ticks: self.max_delay_ticks,
            queue1_total_size: self.state.total_queue1_size(),
            queue2_total_size: self.state.queue2_size(),
            peak_overdraft: (-self.min_balance_seen).max(0),
            agents_in_overdraft,
        }
    }

    /// Read-only view of the full state (tests and replay checks)
    pub fn state(&self) -> &SimulationState {
        &self.state
    }
}

impl std::fmt::Debug for Engine {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Engine")
            .field("current_tick", &self.current_tick())
            .field("current_day", &self.current_day())
            .field("num_agents", &self.state.num_agents())
            .field("events", &self.event_log.len())
            .finish()
    }
}

fn build_policy(config: &PolicyConfig) -> Box<dyn Policy> {
    match config {
        PolicyConfig::Fifo => Box::new(FifoPolicy::new()),
        PolicyConfig::Deadline { urgency_threshold } => {
            Box::new(DeadlinePolicy::new(*urgency_threshold))
        }
        PolicyConfig::LiquidityAware {
            target_buffer,
            urgency_threshold,
        } => Box::new(LiquidityAwarePolicy::new(*target_buffer, *urgency_threshold)),
        PolicyConfig::Tree { tree } => Box::new(TreePolicy::new(tree.clone())),
    }
}

// ============================================================================
// Tests
// ============================================================================
