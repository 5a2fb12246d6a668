//! Cost accounting
//!
//! Rates, per-tick breakdowns, and per-agent cumulative ledgers.
//! All accrued costs are exact integer cents; rate math floors so that the
//! accumulators stay integral and monotonically non-decreasing.

use serde::{Deserialize, Serialize};

/// Cost rates configuration
///
/// Proportional rates are in basis points per tick; flat charges in cents.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CostRates {
    /// Liquidity (overdraft) cost in basis points per tick, applied to
    /// `max(-balance, 0)`
    pub liquidity_bps_per_tick: f64,

    /// Delay cost in basis points per tick, applied to the total value
    /// held in an agent's Queue 1
    pub delay_bps_per_tick: f64,

    /// Collateral opportunity cost in basis points per tick, applied to
    /// posted face value
    pub collateral_bps_per_tick: f64,

    /// Split friction cost per extra child (cents)
    ///
    /// Splitting a transaction into N parts charges
    /// `split_friction_cost × (N−1)`.
    pub split_friction_cost: i64,

    /// Penalty per overdue transaction per tick past deadline (cents)
    pub deadline_penalty_per_tick: i64,
}

impl Default for CostRates {
    fn default() -> Self {
        Self {
            liquidity_bps_per_tick: 1.0,      // 1 bp/tick on overdraft
            delay_bps_per_tick: 0.1,          // 0.1 bp/tick on queued value
            collateral_bps_per_tick: 0.02,    // 2 bps annualized over ~100 ticks
            split_friction_cost: 1_000,       // $10 per extra child
            deadline_penalty_per_tick: 5_000, // $50 per overdue tx per tick
        }
    }
}

/// Apply a bps-per-tick rate to an amount, flooring to whole cents.
///
/// Non-positive amounts cost nothing.
pub fn bps_cost(amount: i64, bps_per_tick: f64) -> i64 {
    if amount <= 0 {
        return 0;
    }
    ((amount as f64) * bps_per_tick / 10_000.0).floor() as i64
}

/// Cost breakdown for a single tick and agent
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct CostBreakdown {
    /// Overdraft cost accrued this tick (cents)
    pub liquidity_cost: i64,

    /// Queue 1 delay cost accrued this tick (cents)
    pub delay_cost: i64,

    /// Collateral opportunity cost accrued this tick (cents)
    pub collateral_cost: i64,

    /// Transaction splitting friction cost (cents)
    pub split_friction_cost: i64,

    /// Deadline penalties incurred this tick (cents)
    pub deadline_penalty: i64,
}

impl CostBreakdown {
    /// Total cost across all categories
    pub fn total(&self) -> i64 {
        self.liquidity_cost
            + self.delay_cost
            + self.collateral_cost
            + self.split_friction_cost
            + self.deadline_penalty
    }

    /// True if every category is zero
    pub fn is_zero(&self) -> bool {
        self.total() == 0
    }
}

/// Accumulated costs for an agent over the simulation
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct CostLedger {
    pub total_liquidity_cost: i64,
    pub total_delay_cost: i64,
    pub total_collateral_cost: i64,
    pub total_split_friction_cost: i64,
    pub total_deadline_penalty: i64,

    /// Most negative balance observed (0 if never in overdraft)
    pub peak_net_debit: i64,
}

impl CostLedger {
    /// Create new empty ledger
    pub fn new() -> Self {
        Self::default()
    }

    /// Add one tick's breakdown
    pub fn add(&mut self, costs: &CostBreakdown) {
        self.total_liquidity_cost += costs.liquidity_cost;
        self.total_delay_cost += costs.delay_cost;
        self.total_collateral_cost += costs.collateral_cost;
        self.total_split_friction_cost += costs.split_friction_cost;
        self.total_deadline_penalty += costs.deadline_penalty;
    }

    /// Update peak net debit if the current balance is more negative
    pub fn update_peak_debit(&mut self, current_balance: i64) {
        if current_balance < 0 {
            self.peak_net_debit = self.peak_net_debit.min(current_balance);
        }
    }

    /// Total cost across all categories
    pub fn total(&self) -> i64 {
        self.total_liquidity_cost
            + self.total_delay_cost
            + self.total_collateral_cost
            + self.total_split_friction_cost
            + self.total_deadline_penalty
    }
}
