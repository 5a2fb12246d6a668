//! Engine configuration and load-time validation
//!
//! Configuration errors are fatal: a simulation never starts from an
//! invalid config. Validation covers the full surface the loader passes
//! in (agents, arrival distributions, counterparty weights, collateral,
//! policies, toggles, scenario schedule), so the runtime can rely on the
//! config being internally consistent.

use crate::arrivals::{AmountDistribution, ArrivalConfig};
use crate::costs::CostRates;
use crate::models::agent::Agent;
use crate::models::state::SimulationState;
use crate::models::transaction::Transaction;
use crate::policy::tree::{validate_tree, EvalContext, PolicyTreeDef};
use crate::policy::{PolicyClock, PolicyToggles};
use crate::scenario::{ScenarioEvent, ScenarioKind};
use crate::settlement::lsm::LsmConfig;
use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;
use thiserror::Error;

/// Fatal configuration errors
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Invalid simulation parameters: {0}")]
    InvalidSimulation(String),

    #[error("Duplicate agent ID: {0}")]
    DuplicateAgent(String),

    #[error("Unknown agent '{agent_id}' referenced by {context}")]
    UnknownAgent { context: String, agent_id: String },

    #[error("Invalid arrival config for agent '{agent_id}': {reason}")]
    InvalidArrivalConfig { agent_id: String, reason: String },

    #[error("Invalid collateral config for agent '{agent_id}': {reason}")]
    InvalidCollateral { agent_id: String, reason: String },

    #[error("Invalid policy feature toggles: {0}")]
    InvalidToggles(String),

    #[error("Invalid policy for agent '{agent_id}': {reasons}")]
    InvalidPolicy { agent_id: String, reasons: String },

    #[error("Invalid scenario event at index {index}: {reason}")]
    InvalidScenario { index: usize, reason: String },
}

/// Simulation-level parameters
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SimulationParams {
    /// Number of ticks per business day
    pub ticks_per_day: usize,

    /// Number of business days to simulate
    pub num_days: usize,

    /// Seed for the deterministic RNG streams
    pub rng_seed: u64,
}

impl SimulationParams {
    /// Total ticks the simulation will run
    pub fn horizon(&self) -> usize {
        self.ticks_per_day * self.num_days
    }
}

/// Policy selection for an agent
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum PolicyConfig {
    /// Release every transaction immediately (baseline)
    Fifo,

    /// Release transactions approaching their deadline
    Deadline { urgency_threshold: usize },

    /// Preserve a balance buffer, override for urgency
    LiquidityAware {
        target_buffer: i64,
        urgency_threshold: usize,
    },

    /// Declarative JSON decision tree
    Tree { tree: PolicyTreeDef },
}

/// Initial collateral lot for an agent
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CollateralLotConfig {
    /// Face value of the lot (cents)
    pub face_value: i64,

    /// Haircut fraction in [0, 1)
    pub haircut: f64,

    /// Arm the auto-withdraw timer this many ticks after posting
    #[serde(default)]
    pub auto_withdraw_after_ticks: Option<usize>,
}

/// Collateral lifecycle parameters
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CollateralConfig {
    /// Ticks a lot must be held before any withdrawal
    #[serde(default = "default_min_holding_ticks")]
    pub min_holding_ticks: usize,

    /// Extra secured headroom every withdrawal must preserve (cents)
    #[serde(default)]
    pub safety_buffer: i64,
}

fn default_min_holding_ticks() -> usize {
    10
}

impl Default for CollateralConfig {
    fn default() -> Self {
        Self {
            min_holding_ticks: default_min_holding_ticks(),
            safety_buffer: 0,
        }
    }
}

/// Per-agent configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AgentConfig {
    /// Unique agent identifier
    pub id: String,

    /// Opening balance (cents, may be negative)
    pub opening_balance: i64,

    /// Unsecured intraday credit cap (cents)
    pub credit_limit: i64,

    /// Queue 1 release policy
    pub policy: PolicyConfig,

    /// Arrival generation parameters (None = no automatic arrivals)
    #[serde(default)]
    pub arrival_config: Option<ArrivalConfig>,

    /// Collateral lots posted at tick 0
    #[serde(default)]
    pub initial_collateral_lots: Vec<CollateralLotConfig>,
}

/// Complete engine configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EngineConfig {
    pub simulation: SimulationParams,

    pub agents: Vec<AgentConfig>,

    #[serde(default)]
    pub scenario_events: Vec<ScenarioEvent>,

    #[serde(default)]
    pub policy_feature_toggles: PolicyToggles,

    #[serde(default)]
    pub cost_rates: CostRates,

    #[serde(default)]
    pub lsm: LsmConfig,

    #[serde(default)]
    pub collateral: CollateralConfig,
}

impl EngineConfig {
    /// Validate the full configuration; any failure prevents simulation
    /// start
    pub fn validate(&self) -> Result<(), ConfigError> {
        self.validate_simulation()?;
        let agent_ids = self.validate_agents()?;
        self.validate_toggles()?;
        self.validate_policies()?;
        self.validate_scenarios(&agent_ids)?;
        Ok(())
    }

    fn validate_simulation(&self) -> Result<(), ConfigError> {
        if self.simulation.ticks_per_day == 0 {
            return Err(ConfigError::InvalidSimulation(
                "ticks_per_day must be > 0".to_string(),
            ));
        }
        if self.simulation.num_days == 0 {
            return Err(ConfigError::InvalidSimulation(
                "num_days must be > 0".to_string(),
            ));
        }
        if self.agents.is_empty() {
            return Err(ConfigError::InvalidSimulation(
                "at least one agent is required".to_string(),
            ));
        }
        if self.collateral.safety_buffer < 0 {
            return Err(ConfigError::InvalidSimulation(
                "collateral safety_buffer must be non-negative".to_string(),
            ));
        }
        if self.lsm.max_cycle_length < 2 {
            return Err(ConfigError::InvalidSimulation(
                "lsm max_cycle_length must be >= 2".to_string(),
            ));
        }
        Ok(())
    }

    fn validate_agents(&self) -> Result<BTreeSet<String>, ConfigError> {
        let mut ids = BTreeSet::new();
        for agent in &self.agents {
            if agent.id.is_empty() {
                return Err(ConfigError::InvalidSimulation(
                    "agent ID must not be empty".to_string(),
                ));
            }
            if !ids.insert(agent.id.clone()) {
                return Err(ConfigError::DuplicateAgent(agent.id.clone()));
            }
            if agent.credit_limit < 0 {
                return Err(ConfigError::InvalidSimulation(format!(
                    "agent '{}' has negative credit_limit",
                    agent.id
                )));
            }
        }

        for agent in &self.agents {
            if let Some(arrival) = &agent.arrival_config {
                self.validate_arrival(&agent.id, arrival, &ids)?;
            }
            for (idx, lot) in agent.initial_collateral_lots.iter().enumerate() {
                if lot.face_value <= 0 {
                    return Err(ConfigError::InvalidCollateral {
                        agent_id: agent.id.clone(),
                        reason: format!("lot {} face_value must be positive", idx),
                    });
                }
                if !(0.0..1.0).contains(&lot.haircut) {
                    return Err(ConfigError::InvalidCollateral {
                        agent_id: agent.id.clone(),
                        reason: format!("lot {} haircut must be in [0, 1)", idx),
                    });
                }
            }
        }

        Ok(ids)
    }

    fn validate_arrival(
        &self,
        agent_id: &str,
        arrival: &ArrivalConfig,
        known: &BTreeSet<String>,
    ) -> Result<(), ConfigError> {
        let err = |reason: String| ConfigError::InvalidArrivalConfig {
            agent_id: agent_id.to_string(),
            reason,
        };

        if !arrival.rate_per_tick.is_finite() || arrival.rate_per_tick < 0.0 {
            return Err(err("rate_per_tick must be finite and >= 0".to_string()));
        }
        if arrival.rate_per_tick > 0.0 && self.agents.len() < 2 {
            return Err(err(
                "arrivals require at least one counterparty agent".to_string()
            ));
        }

        let (min, max) = arrival.deadline_range;
        if min > max {
            return Err(err("deadline_range min exceeds max".to_string()));
        }

        match &arrival.amount_distribution {
            AmountDistribution::Uniform { min, max } => {
                if *min <= 0 || min > max {
                    return Err(err("uniform amount range must be positive".to_string()));
                }
            }
            AmountDistribution::Normal { mean, std_dev } => {
                if *mean <= 0 || *std_dev < 0 {
                    return Err(err(
                        "normal amount needs positive mean, non-negative std_dev".to_string(),
                    ));
                }
            }
            AmountDistribution::LogNormal { sigma, .. } => {
                if *sigma < 0.0 {
                    return Err(err("lognormal sigma must be non-negative".to_string()));
                }
            }
            AmountDistribution::Exponential { mean } => {
                if *mean <= 0.0 {
                    return Err(err("exponential mean must be positive".to_string()));
                }
            }
        }

        let mut positive_weight = false;
        for (counterparty, weight) in &arrival.counterparty_weights {
            if !known.contains(counterparty) {
                return Err(ConfigError::UnknownAgent {
                    context: format!("counterparty weights of '{}'", agent_id),
                    agent_id: counterparty.clone(),
                });
            }
            if !weight.is_finite() || *weight < 0.0 {
                return Err(err(format!(
                    "weight for '{}' must be finite and >= 0",
                    counterparty
                )));
            }
            if counterparty == agent_id && *weight > 0.0 {
                return Err(err("agent cannot weight itself as counterparty".to_string()));
            }
            if counterparty != agent_id && *weight > 0.0 {
                positive_weight = true;
            }
        }
        if !arrival.counterparty_weights.is_empty() && !positive_weight {
            return Err(err(
                "counterparty weights leave no selectable receiver".to_string(),
            ));
        }

        Ok(())
    }

    fn validate_toggles(&self) -> Result<(), ConfigError> {
        if !self.policy_feature_toggles.is_valid() {
            return Err(ConfigError::InvalidToggles(
                "include and exclude are mutually exclusive".to_string(),
            ));
        }
        Ok(())
    }

    fn validate_policies(&self) -> Result<(), ConfigError> {
        let sample = self.sample_eval_context();

        for agent in &self.agents {
            match &agent.policy {
                PolicyConfig::Tree { tree } => {
                    if let Err(errors) =
                        validate_tree(tree, &sample, &self.policy_feature_toggles)
                    {
                        let reasons = errors
                            .iter()
                            .map(|e| e.to_string())
                            .collect::<Vec<_>>()
                            .join("; ");
                        return Err(ConfigError::InvalidPolicy {
                            agent_id: agent.id.clone(),
                            reasons,
                        });
                    }
                }
                // Built-ins carry no tree and bypass toggles
                PolicyConfig::Fifo
                | PolicyConfig::Deadline { .. }
                | PolicyConfig::LiquidityAware { .. } => {}
            }
        }
        Ok(())
    }

    /// Representative context for field-reference validation
    fn sample_eval_context(&self) -> EvalContext {
        let sender = self.agents[0].id.clone();
        let receiver = self
            .agents
            .get(1)
            .map(|a| a.id.clone())
            .unwrap_or_else(|| "COUNTERPARTY".to_string());

        let tx = Transaction::new(
            "tx-sample".to_string(),
            sender.clone(),
            receiver,
            1,
            0,
            0,
        );
        let state = SimulationState::new(vec![Agent::new(
            sender.clone(),
            self.agents[0].opening_balance,
            self.agents[0].credit_limit,
        )]);

        EvalContext::build(
            &tx,
            state.get_agent(&sender).unwrap(),
            &state,
            PolicyClock {
                tick: 0,
                ticks_per_day: self.simulation.ticks_per_day,
            },
            &self.cost_rates,
        )
    }

    fn validate_scenarios(&self, known: &BTreeSet<String>) -> Result<(), ConfigError> {
        let horizon = self.simulation.horizon();

        for (index, event) in self.scenario_events.iter().enumerate() {
            let err = |reason: String| ConfigError::InvalidScenario { index, reason };
            let check_agent = |agent_id: &str, context: &str| {
                if known.contains(agent_id) {
                    Ok(())
                } else {
                    Err(ConfigError::UnknownAgent {
                        context: format!("scenario event {} ({})", index, context),
                        agent_id: agent_id.to_string(),
                    })
                }
            };

            if event.tick >= horizon {
                return Err(err(format!(
                    "scheduled at tick {} beyond horizon {}",
                    event.tick, horizon
                )));
            }

            match &event.kind {
                ScenarioKind::DirectTransfer { from, to, amount } => {
                    check_agent(from, "direct transfer sender")?;
                    check_agent(to, "direct transfer receiver")?;
                    if amount <= &0 {
                        return Err(err("transfer amount must be positive".to_string()));
                    }
                    if from == to {
                        return Err(err("transfer endpoints must differ".to_string()));
                    }
                }
                ScenarioKind::AgentArrivalRateChange {
                    agent_id,
                    multiplier,
                } => {
                    check_agent(agent_id, "arrival rate change")?;
                    if !multiplier.is_finite() || *multiplier < 0.0 {
                        return Err(err("multiplier must be finite and >= 0".to_string()));
                    }
                }
                ScenarioKind::GlobalArrivalRateChange { multiplier } => {
                    if !multiplier.is_finite() || *multiplier < 0.0 {
                        return Err(err("multiplier must be finite and >= 0".to_string()));
                    }
                }
                ScenarioKind::DeadlineWindowChange {
                    agent_id,
                    deadline_min,
                    deadline_max,
                } => {
                    check_agent(agent_id, "deadline window change")?;
                    if deadline_min > deadline_max {
                        return Err(err("deadline window min exceeds max".to_string()));
                    }
                }
                ScenarioKind::CounterpartyWeightChange {
                    agent_id,
                    counterparty,
                    weight,
                    ..
                } => {
                    check_agent(agent_id, "weight change owner")?;
                    check_agent(counterparty, "weight change counterparty")?;
                    if !weight.is_finite() || *weight < 0.0 {
                        return Err(err("weight must be finite and >= 0".to_string()));
                    }
                }
                ScenarioKind::CollateralAdjustment {
                    agent_id,
                    amount,
                    haircut,
                } => {
                    check_agent(agent_id, "collateral adjustment")?;
                    if *amount == 0 {
                        return Err(err("adjustment amount must be non-zero".to_string()));
                    }
                    if !(0.0..1.0).contains(haircut) {
                        return Err(err("haircut must be in [0, 1)".to_string()));
                    }
                }
                ScenarioKind::CustomTransactionArrival {
                    sender_id,
                    receiver_id,
                    amount,
                    ..
                } => {
                    check_agent(sender_id, "custom arrival sender")?;
                    check_agent(receiver_id, "custom arrival receiver")?;
                    if amount <= &0 {
                        return Err(err("amount must be positive".to_string()));
                    }
                    if sender_id == receiver_id {
                        return Err(err("sender and receiver must differ".to_string()));
                    }
                }
            }
        }
        Ok(())
    }
}
