//! Evaluation context
//!
//! Builds the read-only field map a policy evaluates against: transaction
//! fields, agent-snapshot fields, system-snapshot fields, derived metrics,
//! and the configured cost rates. All fields are f64 for uniform
//! arithmetic inside tree computations.

use crate::costs::CostRates;
use crate::models::agent::Agent;
use crate::models::state::SimulationState;
use crate::models::transaction::Transaction;
use crate::policy::PolicyClock;
use std::collections::BTreeMap;
use thiserror::Error;

/// Errors that can occur during context lookups
#[derive(Debug, Error, PartialEq, Eq)]
pub enum ContextError {
    #[error("Field '{0}' not found in evaluation context")]
    FieldNotFound(String),
}

/// Read-only field map for policy evaluation
///
/// # Field catalogue
///
/// **Transaction**: `amount`, `priority`, `arrival_tick`, `deadline_tick`,
/// `is_divisible`, `is_split_child`, `is_overdue`, `ticks_to_deadline`
/// (negative when past deadline), `queue_age`, `urgency_score`.
///
/// **Agent**: `balance`, `credit_limit`, `secured_credit`,
/// `allowed_overdraft_limit`, `credit_used`, `available_liquidity`,
/// `posted_collateral`, `queue1_size`, `queue1_value`,
/// `liquidity_pressure`.
///
/// **System**: `current_tick`, `current_day`, `tick_in_day`,
/// `ticks_per_day`, `ticks_remaining_in_day`, `queue2_size`,
/// `queue2_value`, `total_agents`.
///
/// **Costs**: `cost_liquidity_bps_per_tick`, `cost_delay_bps_per_tick`,
/// `cost_collateral_bps_per_tick`, `cost_split_friction`,
/// `cost_deadline_penalty_per_tick`.
#[derive(Debug, Clone)]
pub struct EvalContext {
    fields: BTreeMap<String, f64>,
}

impl EvalContext {
    /// Build the context for one transaction of one agent
    pub fn build(
        tx: &Transaction,
        agent: &Agent,
        state: &SimulationState,
        clock: PolicyClock,
        cost_rates: &CostRates,
    ) -> Self {
        let mut fields = BTreeMap::new();
        let tick = clock.tick;

        // Transaction fields
        fields.insert("amount".to_string(), tx.amount() as f64);
        fields.insert("priority".to_string(), tx.priority() as f64);
        fields.insert("arrival_tick".to_string(), tx.arrival_tick() as f64);
        fields.insert("deadline_tick".to_string(), tx.deadline_tick() as f64);
        fields.insert("is_divisible".to_string(), bool_field(tx.is_divisible()));
        fields.insert(
            "is_split_child".to_string(),
            bool_field(tx.parent_id().is_some()),
        );
        fields.insert("is_overdue".to_string(), bool_field(tx.is_overdue()));

        let ticks_to_deadline = tx.deadline_tick() as i64 - tick as i64;
        fields.insert("ticks_to_deadline".to_string(), ticks_to_deadline as f64);
        fields.insert(
            "queue_age".to_string(),
            tick.saturating_sub(tx.arrival_tick()) as f64,
        );

        // Derived urgency: 1.0 at/past deadline, decaying with headroom
        let urgency = if ticks_to_deadline <= 0 {
            1.0
        } else {
            1.0 / (1.0 + ticks_to_deadline as f64)
        };
        fields.insert("urgency_score".to_string(), urgency);

        // Agent fields
        fields.insert("balance".to_string(), agent.balance() as f64);
        fields.insert("credit_limit".to_string(), agent.credit_limit() as f64);
        fields.insert("secured_credit".to_string(), agent.secured_credit() as f64);
        fields.insert(
            "allowed_overdraft_limit".to_string(),
            agent.allowed_overdraft_limit() as f64,
        );
        fields.insert("credit_used".to_string(), agent.credit_used() as f64);
        fields.insert(
            "available_liquidity".to_string(),
            agent.available_liquidity() as f64,
        );
        fields.insert(
            "posted_collateral".to_string(),
            agent.posted_collateral() as f64,
        );
        fields.insert("queue1_size".to_string(), agent.queue1_size() as f64);

        let queue1_value = state.agent_queue1_value(agent.id());
        fields.insert("queue1_value".to_string(), queue1_value as f64);

        // Derived pressure: queued obligations relative to what the agent
        // could pay right now
        let pressure = queue1_value as f64 / (agent.available_liquidity().max(1)) as f64;
        fields.insert("liquidity_pressure".to_string(), pressure);

        // System fields
        fields.insert("current_tick".to_string(), tick as f64);
        fields.insert("current_day".to_string(), clock.day() as f64);
        fields.insert("tick_in_day".to_string(), clock.tick_in_day() as f64);
        fields.insert("ticks_per_day".to_string(), clock.ticks_per_day as f64);
        fields.insert(
            "ticks_remaining_in_day".to_string(),
            (clock.ticks_per_day - 1).saturating_sub(clock.tick_in_day()) as f64,
        );
        fields.insert("queue2_size".to_string(), state.queue2_size() as f64);
        fields.insert("queue2_value".to_string(), state.queue2_value() as f64);
        fields.insert("total_agents".to_string(), state.num_agents() as f64);

        // Cost fields (read-only; lets policies weigh delay against
        // overdraft, friction against penalty)
        fields.insert(
            "cost_liquidity_bps_per_tick".to_string(),
            cost_rates.liquidity_bps_per_tick,
        );
        fields.insert(
            "cost_delay_bps_per_tick".to_string(),
            cost_rates.delay_bps_per_tick,
        );
        fields.insert(
            "cost_collateral_bps_per_tick".to_string(),
            cost_rates.collateral_bps_per_tick,
        );
        fields.insert(
            "cost_split_friction".to_string(),
            cost_rates.split_friction_cost as f64,
        );
        fields.insert(
            "cost_deadline_penalty_per_tick".to_string(),
            cost_rates.deadline_penalty_per_tick as f64,
        );

        Self { fields }
    }

    /// Get field value by name
    pub fn get_field(&self, name: &str) -> Result<f64, ContextError> {
        self.fields
            .get(name)
            .copied()
            .ok_or_else(|| ContextError::FieldNotFound(name.to_string()))
    }

    /// Check if field exists in context
    pub fn has_field(&self, name: &str) -> bool {
        self.fields.contains_key(name)
    }

    /// All field names (for validation)
    pub fn field_names(&self) -> Vec<&str> {
        self.fields.keys().map(|s| s.as_str()).collect()
    }
}

fn bool_field(value: bool) -> f64 {
    if value {
        1.0
    } else {
        0.0
    }
}
