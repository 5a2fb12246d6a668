//! Arrival generation for deterministic transaction creation
//!
//! Creates new transactions according to configured distributions. Each
//! agent draws from its own RNG stream seeded by
//! `(global_seed, agent_id)`, so one agent's arrivals are unaffected by
//! the order in which other agents are processed.
//!
//! # Key principles
//!
//! 1. Determinism: same seed + same config → same arrivals
//! 2. Per-agent configuration: each agent has its own parameters
//! 3. Poisson arrivals: transaction count per tick follows Poisson
//! 4. Flexible amounts: normal / lognormal / uniform / exponential,
//!    truncated to positive

use crate::models::Transaction;
use crate::rng::{stream_seed, RngManager};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// Priority distribution types for transaction generation
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum PriorityDistribution {
    /// Fixed priority (all transactions get same value)
    Fixed { value: u8 },

    /// Categorical distribution (discrete values with weights)
    Categorical { values: Vec<u8>, weights: Vec<f64> },

    /// Uniform distribution (random integer in [min, max])
    Uniform { min: u8, max: u8 },
}

impl Default for PriorityDistribution {
    fn default() -> Self {
        PriorityDistribution::Fixed { value: 5 }
    }
}

/// Amount distribution types for transaction generation
///
/// Every variant is truncated to at least one cent.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum AmountDistribution {
    /// Uniform between min and max (inclusive)
    Uniform { min: i64, max: i64 },

    /// Normal with mean and standard deviation (cents)
    Normal { mean: i64, std_dev: i64 },

    /// Log-normal over the underlying normal (heavy-tailed amounts)
    LogNormal { mu: f64, sigma: f64 },

    /// Exponential with the given mean (cents)
    Exponential { mean: f64 },
}

/// Configuration for transaction arrivals for a single agent
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ArrivalConfig {
    /// Expected number of arrivals per tick (Poisson λ)
    pub rate_per_tick: f64,

    /// Distribution for transaction amounts
    pub amount_distribution: AmountDistribution,

    /// Counterparty selection weights (agent_id → weight)
    ///
    /// Weights are normalized at draw time; a zero weight means the
    /// counterparty is never selected. Empty means uniform over all
    /// other agents.
    #[serde(default)]
    pub counterparty_weights: BTreeMap<String, f64>,

    /// Deadline offset range in ticks from arrival (min, max), inclusive
    pub deadline_range: (usize, usize),

    /// Priority distribution for generated transactions
    #[serde(default)]
    pub priority_distribution: PriorityDistribution,

    /// Whether generated transactions are divisible
    #[serde(default)]
    pub divisible: bool,
}

/// Generator for transaction arrivals across all agents
#[derive(Debug, Clone)]
pub struct ArrivalGenerator {
    /// Per-agent arrival configurations (mutated by scenario events)
    configs: BTreeMap<String, ArrivalConfig>,

    /// Base configurations (original rates, never mutated), so scenario
    /// multipliers do not compound
    base_configs: BTreeMap<String, ArrivalConfig>,

    /// Per-agent RNG streams
    streams: BTreeMap<String, RngManager>,

    /// Per-agent transaction ID counters
    tx_counters: BTreeMap<String, usize>,

    /// All agent IDs, sorted (for counterparty selection)
    all_agent_ids: Vec<String>,

    /// Final tick of the simulation (deadline cap)
    horizon_tick: usize,
}

impl ArrivalGenerator {
    /// Create a new arrival generator
    ///
    /// One RNG stream per agent (including agents without an arrival
    /// config, so IDs can still be allocated for scenario injections).
    pub fn new(
        configs: BTreeMap<String, ArrivalConfig>,
        all_agent_ids: Vec<String>,
        global_seed: u64,
        horizon_tick: usize,
    ) -> Self {
        let mut sorted_ids = all_agent_ids;
        sorted_ids.sort();

        let streams = sorted_ids
            .iter()
            .map(|id| (id.clone(), RngManager::new(stream_seed(global_seed, id))))
            .collect();
        let tx_counters = sorted_ids.iter().map(|id| (id.clone(), 0)).collect();

        Self {
            base_configs: configs.clone(),
            configs,
            streams,
            tx_counters,
            all_agent_ids: sorted_ids,
            horizon_tick,
        }
    }

    /// Allocate the next transaction ID for an agent
    pub fn allocate_tx_id(&mut self, agent_id: &str) -> String {
        let counter = self
            .tx_counters
            .get_mut(agent_id)
            .expect("unknown agent in id allocation");
        *counter += 1;
        format!("tx-{}-{:06}", agent_id, counter)
    }

    /// Generate arrivals for a specific agent at the given tick
    ///
    /// Draws only from the agent's own stream.
    pub fn generate_for_agent(&mut self, agent_id: &str, tick: usize) -> Vec<Transaction> {
        let config = match self.configs.get(agent_id) {
            Some(c) => c.clone(),
            None => return Vec::new(),
        };

        let num_arrivals = {
            let rng = self
                .streams
                .get_mut(agent_id)
                .expect("unknown agent stream");
            rng.poisson(config.rate_per_tick)
        };

        let mut transactions = Vec::with_capacity(num_arrivals);

        for _ in 0..num_arrivals {
            let (amount, receiver, deadline, priority) = {
                let rng = self
                    .streams
                    .get_mut(agent_id)
                    .expect("unknown agent stream");

                let amount = sample_amount(&config.amount_distribution, rng);
                let receiver = select_counterparty(
                    &self.all_agent_ids,
                    agent_id,
                    &config.counterparty_weights,
                    rng,
                );
                let deadline =
                    sample_deadline(tick, config.deadline_range, self.horizon_tick, rng);
                let priority = sample_priority(&config.priority_distribution, rng);
                (amount, receiver, deadline, priority)
            };

            let tx_id = self.allocate_tx_id(agent_id);
            let mut tx = Transaction::new(
                tx_id,
                agent_id.to_string(),
                receiver,
                amount,
                tick,
                deadline,
            )
            .with_priority(priority);
            if config.divisible {
                tx = tx.divisible();
            }

            transactions.push(tx);
        }

        transactions
    }

    // ========================================================================
    // Query methods (for scenario before/after reporting)
    // ========================================================================

    /// Get arrival rate for an agent
    pub fn get_rate(&self, agent_id: &str) -> Option<f64> {
        self.configs.get(agent_id).map(|c| c.rate_per_tick)
    }

    /// Get deadline range for an agent
    pub fn get_deadline_range(&self, agent_id: &str) -> Option<(usize, usize)> {
        self.configs.get(agent_id).map(|c| c.deadline_range)
    }

    /// Get counterparty weight for an agent
    pub fn get_counterparty_weight(&self, agent_id: &str, counterparty: &str) -> Option<f64> {
        self.configs
            .get(agent_id)
            .and_then(|c| c.counterparty_weights.get(counterparty).copied())
    }

    // ========================================================================
    // Mutation methods (for scenario events)
    // ========================================================================

    /// Multiply an agent's rate relative to its base rate
    pub fn multiply_rate(&mut self, agent_id: &str, multiplier: f64) {
        if let (Some(config), Some(base)) = (
            self.configs.get_mut(agent_id),
            self.base_configs.get(agent_id),
        ) {
            config.rate_per_tick = base.rate_per_tick * multiplier;
        }
    }

    /// Multiply all rates relative to base rates
    ///
    /// Applying relative to base ensures repeated global changes do not
    /// compound.
    pub fn multiply_all_rates(&mut self, multiplier: f64) {
        for (agent_id, config) in self.configs.iter_mut() {
            if let Some(base) = self.base_configs.get(agent_id) {
                config.rate_per_tick = base.rate_per_tick * multiplier;
            }
        }
    }

    /// Set deadline range for an agent
    pub fn set_deadline_range(&mut self, agent_id: &str, range: (usize, usize)) {
        if let Some(config) = self.configs.get_mut(agent_id) {
            config.deadline_range = range;
        }
    }

    /// Set one counterparty weight, optionally rescaling the others so
    /// the total weight is unchanged
    pub fn set_counterparty_weight(
        &mut self,
        agent_id: &str,
        counterparty: &str,
        weight: f64,
        rebalance_others: bool,
    ) {
        let config = match self.configs.get_mut(agent_id) {
            Some(c) => c,
            None => return,
        };

        let old = config
            .counterparty_weights
            .get(counterparty)
            .copied()
            .unwrap_or(0.0);
        let others_total: f64 = config
            .counterparty_weights
            .iter()
            .filter(|(id, _)| id.as_str() != counterparty)
            .map(|(_, w)| w)
            .sum();

        if rebalance_others && others_total > 0.0 {
            // Keep the total constant: distribute the weight delta across
            // the remaining counterparties in proportion.
            let scale = (others_total + old - weight) / others_total;
            for (id, w) in config.counterparty_weights.iter_mut() {
                if id.as_str() != counterparty {
                    *w = (*w * scale).max(0.0);
                }
            }
        }

        config
            .counterparty_weights
            .insert(counterparty.to_string(), weight.max(0.0));
    }
}

// ============================================================================
// Sampling helpers
// ============================================================================

fn sample_amount(distribution: &AmountDistribution, rng: &mut RngManager) -> i64 {
    match distribution {
        AmountDistribution::Uniform { min, max } => rng.range(*min, *max + 1),
        AmountDistribution::Normal { mean, std_dev } => {
            let z = sample_standard_normal(rng);
            let amount = *mean + ((*std_dev as f64) * z) as i64;
            amount.max(1)
        }
        AmountDistribution::LogNormal { mu, sigma } => {
            let z = sample_standard_normal(rng);
            let amount = (mu + sigma * z).exp() as i64;
            amount.max(1)
        }
        AmountDistribution::Exponential { mean } => {
            let u = rng.next_f64();
            let amount = (-(1.0 - u).ln() * mean) as i64;
            amount.max(1)
        }
    }
}

/// Box-Muller transform over two uniform draws
fn sample_standard_normal(rng: &mut RngManager) -> f64 {
    let u1 = rng.next_f64().max(f64::MIN_POSITIVE);
    let u2 = rng.next_f64();
    (-2.0 * u1.ln()).sqrt() * (2.0 * std::f64::consts::PI * u2).cos()
}

fn sample_deadline(
    arrival_tick: usize,
    range: (usize, usize),
    horizon_tick: usize,
    rng: &mut RngManager,
) -> usize {
    let (min_offset, max_offset) = range;
    let offset = if min_offset == max_offset {
        min_offset
    } else {
        rng.range(min_offset as i64, max_offset as i64 + 1) as usize
    };
    // Deadlines past the horizon can never be met or penalized
    (arrival_tick + offset).min(horizon_tick)
}

fn sample_priority(distribution: &PriorityDistribution, rng: &mut RngManager) -> u8 {
    match distribution {
        PriorityDistribution::Fixed { value } => (*value).min(9),
        PriorityDistribution::Categorical { values, weights } => {
            if values.is_empty() {
                return 5;
            }
            let total: f64 = weights.iter().filter(|w| **w > 0.0).sum();
            if total <= 0.0 {
                return values[0].min(9);
            }
            let mut target = rng.next_f64() * total;
            for (value, weight) in values.iter().zip(weights.iter()) {
                if *weight <= 0.0 {
                    continue;
                }
                target -= weight;
                if target <= 0.0 {
                    return (*value).min(9);
                }
            }
            values.last().copied().unwrap_or(5).min(9)
        }
        PriorityDistribution::Uniform { min, max } => {
            if min >= max {
                return (*min).min(9);
            }
            (rng.range(*min as i64, *max as i64 + 1) as u8).min(9)
        }
    }
}

/// Select a receiver for `sender_id` using the configured weights
///
/// Zero-weight counterparties are never selected. With no weights at all,
/// selection is uniform over the other agents.
fn select_counterparty(
    all_agent_ids: &[String],
    sender_id: &str,
    weights: &BTreeMap<String, f64>,
    rng: &mut RngManager,
) -> String {
    let candidates: Vec<&String> = all_agent_ids
        .iter()
        .filter(|id| id.as_str() != sender_id)
        .collect();

    assert!(
        !candidates.is_empty(),
        "cannot generate transaction: no valid receivers"
    );

    if weights.is_empty() {
        let idx = rng.range(0, candidates.len() as i64) as usize;
        return candidates[idx].clone();
    }

    let weighted: Vec<(&String, f64)> = candidates
        .iter()
        .filter_map(|id| {
            let w = weights.get(id.as_str()).copied().unwrap_or(0.0);
            (w > 0.0).then_some((*id, w))
        })
        .collect();

    assert!(
        !weighted.is_empty(),
        "counterparty weights leave no selectable receiver"
    );

    let total: f64 = weighted.iter().map(|(_, w)| w).sum();
    let mut target = rng.next_f64() * total;
    for (id, w) in &weighted {
        target -= w;
        if target <= 0.0 {
            return (*id).clone();
        }
    }
    weighted.last().unwrap().0.clone()
}
