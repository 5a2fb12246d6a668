//! Agent (bank) model
//!
//! Each agent holds a settlement balance, an unsecured credit line, a book
//! of collateral lots that extend that line, its private outgoing queue
//! (Queue 1), and a cumulative cost ledger.
//!
//! The central invariant: at every post-settlement boundary,
//! `balance ≥ −allowed_overdraft_limit()` where
//! `allowed_overdraft_limit = credit_limit + floor(Σ face_value · (1 − haircut))`.
//!
//! CRITICAL: All money values are i64 (cents)

use crate::costs::CostLedger;
use crate::models::collateral::CollateralLot;
use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Errors that can occur during agent operations
#[derive(Debug, Error, PartialEq, Eq)]
pub enum AgentError {
    #[error("Insufficient liquidity: required {required}, available {available}")]
    InsufficientLiquidity { required: i64, available: i64 },
}

/// Represents a bank (agent) in the payment system
///
/// # Example
/// ```
/// use rtgs_engine_rs::Agent;
///
/// let mut agent = Agent::new("BANK_A".to_string(), 1_000_000, 500_000);
/// assert_eq!(agent.balance(), 1_000_000);
/// assert_eq!(agent.allowed_overdraft_limit(), 500_000);
///
/// agent.debit(1_200_000).unwrap(); // dips into credit
/// assert_eq!(agent.balance(), -200_000);
/// assert_eq!(agent.credit_used(), 200_000);
/// ```
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Agent {
    /// Unique agent identifier (e.g., "BANK_A")
    id: String,

    /// Current balance in settlement account (i64 cents)
    balance: i64,

    /// Unsecured intraday credit cap (i64 cents)
    credit_limit: i64,

    /// Posted collateral lots, in posting order
    collateral: Vec<CollateralLot>,

    /// Queue 1: outgoing hold queue, ordered by (arrival_tick, tx_id)
    queue1: Vec<String>,

    /// Cumulative cost accounting
    costs: CostLedger,

    /// Counter for allocating lot IDs
    next_lot_seq: usize,
}

impl Agent {
    /// Create a new agent
    ///
    /// # Panics
    /// Panics if `credit_limit` is negative; config validation rejects
    /// that earlier.
    pub fn new(id: String, balance: i64, credit_limit: i64) -> Self {
        assert!(credit_limit >= 0, "credit_limit must be non-negative");
        Self {
            id,
            balance,
            credit_limit,
            collateral: Vec::new(),
            queue1: Vec::new(),
            costs: CostLedger::new(),
            next_lot_seq: 0,
        }
    }

    /// Get agent ID
    pub fn id(&self) -> &str {
        &self.id
    }

    /// Get current balance (i64 cents)
    pub fn balance(&self) -> i64 {
        self.balance
    }

    /// Get unsecured credit limit (i64 cents)
    pub fn credit_limit(&self) -> i64 {
        self.credit_limit
    }

    /// Set unsecured credit limit (scenario events)
    pub fn set_credit_limit(&mut self, new_limit: i64) {
        assert!(new_limit >= 0, "credit_limit must be non-negative");
        self.credit_limit = new_limit;
    }

    /// Secured credit contributed by the collateral book:
    /// `floor(Σ face_value · (1 − haircut))`
    pub fn secured_credit(&self) -> i64 {
        let sum: f64 = self.collateral.iter().map(|l| l.secured_value_f64()).sum();
        sum.floor() as i64
    }

    /// Total overdraft the agent may run:
    /// `credit_limit + secured_credit()`
    pub fn allowed_overdraft_limit(&self) -> i64 {
        self.credit_limit + self.secured_credit()
    }

    /// Amount of overdraft currently used: `max(−balance, 0)`
    pub fn credit_used(&self) -> i64 {
        (-self.balance).max(0)
    }

    /// Liquidity available before hitting the overdraft floor
    pub fn available_liquidity(&self) -> i64 {
        self.balance + self.allowed_overdraft_limit()
    }

    /// Check if agent is currently in overdraft
    pub fn is_in_overdraft(&self) -> bool {
        self.balance < 0
    }

    /// Check if agent can pay a given amount without breaching the floor
    pub fn can_pay(&self, amount: i64) -> bool {
        amount <= self.available_liquidity()
    }

    /// Debit (decrease) balance
    ///
    /// Fails with `InsufficientLiquidity` if the resulting balance would
    /// breach `−allowed_overdraft_limit()`; nothing is mutated on failure.
    pub fn debit(&mut self, amount: i64) -> Result<(), AgentError> {
        assert!(amount >= 0, "amount must be non-negative");

        if !self.can_pay(amount) {
            return Err(AgentError::InsufficientLiquidity {
                required: amount,
                available: self.available_liquidity(),
            });
        }

        self.balance -= amount;
        Ok(())
    }

    /// Credit (increase) balance
    pub fn credit(&mut self, amount: i64) {
        assert!(amount >= 0, "amount must be non-negative");
        self.balance += amount;
    }

    /// Adjust balance by a signed delta without the overdraft check
    ///
    /// Used only by net-settlement primitives (LSM legs, forced scenario
    /// transfers) that verify net positions before applying gross flows.
    pub fn adjust_balance(&mut self, delta: i64) {
        self.balance += delta;
    }

    // =========================================================================
    // Queue 1
    // =========================================================================

    /// Append a transaction to the back of Queue 1
    pub fn queue1_push(&mut self, tx_id: String) {
        self.queue1.push(tx_id);
    }

    /// Insert transactions at `index` in Queue 1 (split children take the
    /// parent's position)
    pub fn queue1_insert_at(&mut self, index: usize, tx_ids: Vec<String>) {
        let tail = self.queue1.split_off(index);
        self.queue1.extend(tx_ids);
        self.queue1.extend(tail);
    }

    /// Remove a transaction from Queue 1, returning whether it was present
    pub fn queue1_remove(&mut self, tx_id: &str) -> bool {
        if let Some(pos) = self.queue1.iter().position(|id| id == tx_id) {
            self.queue1.remove(pos);
            true
        } else {
            false
        }
    }

    /// Queue 1 contents in order
    pub fn queue1(&self) -> &[String] {
        &self.queue1
    }

    /// Queue 1 length
    pub fn queue1_size(&self) -> usize {
        self.queue1.len()
    }

    // =========================================================================
    // Collateral book
    // =========================================================================

    /// Post a new collateral lot, returning its ID
    ///
    /// Lot IDs are counter-based per agent, so posting order is stable and
    /// replayable.
    pub fn post_collateral(
        &mut self,
        face_value: i64,
        haircut: f64,
        posted_tick: usize,
        auto_withdraw_tick: Option<usize>,
    ) -> String {
        self.next_lot_seq += 1;
        let lot_id = format!("{}-lot-{:04}", self.id, self.next_lot_seq);
        let mut lot = CollateralLot::new(lot_id.clone(), face_value, haircut, posted_tick);
        if let Some(tick) = auto_withdraw_tick {
            lot = lot.with_auto_withdraw_tick(tick);
        }
        self.collateral.push(lot);
        lot_id
    }

    /// Posted collateral face value across all lots
    pub fn posted_collateral(&self) -> i64 {
        self.collateral.iter().map(|l| l.face_value()).sum()
    }

    /// Collateral lots in posting order
    pub fn collateral_lots(&self) -> &[CollateralLot] {
        &self.collateral
    }

    /// Look up a lot by ID
    pub fn get_lot(&self, lot_id: &str) -> Option<&CollateralLot> {
        self.collateral.iter().find(|l| l.lot_id() == lot_id)
    }

    /// Secured credit after withdrawing `amount` of face value from `lot_id`
    ///
    /// Returns None if the lot does not exist or the amount exceeds its
    /// face value.
    pub fn secured_credit_after_withdrawal(&self, lot_id: &str, amount: i64) -> Option<i64> {
        let lot = self.get_lot(lot_id)?;
        if amount > lot.face_value() {
            return None;
        }
        let sum: f64 = self
            .collateral
            .iter()
            .map(|l| {
                if l.lot_id() == lot_id {
                    (l.face_value() - amount) as f64 * (1.0 - l.haircut())
                } else {
                    l.secured_value_f64()
                }
            })
            .sum();
        Some(sum.floor() as i64)
    }

    /// Largest face-value withdrawal from `lot_id` that keeps
    /// `allowed_overdraft_limit ≥ credit_used + safety_buffer`
    ///
    /// Returns 0 when no withdrawal is currently safe.
    pub fn max_safe_withdrawal(&self, lot_id: &str, safety_buffer: i64) -> i64 {
        let lot = match self.get_lot(lot_id) {
            Some(l) => l,
            None => return 0,
        };

        let required = self.credit_used() + safety_buffer;
        let slack = self.allowed_overdraft_limit() - required;
        if slack <= 0 {
            return 0;
        }

        // Secured value falls by ~(1 − haircut) per cent of face withdrawn.
        // Start from the analytic bound and correct for the book-level
        // floor with a short downward walk.
        let per_cent = 1.0 - lot.haircut();
        let mut candidate = if per_cent > 0.0 {
            ((slack as f64) / per_cent).floor() as i64
        } else {
            lot.face_value()
        };
        candidate = candidate.min(lot.face_value());

        while candidate > 0 {
            if let Some(secured) = self.secured_credit_after_withdrawal(lot_id, candidate) {
                if self.credit_limit + secured >= required {
                    return candidate;
                }
            }
            candidate -= 1;
        }
        0
    }

    /// Withdraw `amount` of face value from a lot, removing it when drained
    ///
    /// Callers must have already run the guard; this is the mechanical
    /// book update.
    pub fn withdraw_from_lot(&mut self, lot_id: &str, amount: i64) {
        let pos = self
            .collateral
            .iter()
            .position(|l| l.lot_id() == lot_id)
            .expect("lot must exist after guard");
        if amount == self.collateral[pos].face_value() {
            self.collateral.remove(pos);
        } else {
            self.collateral[pos].reduce_face_value(amount);
        }
    }

    // =========================================================================
    // Costs
    // =========================================================================

    /// Cumulative cost ledger
    pub fn costs(&self) -> &CostLedger {
        &self.costs
    }

    /// Mutable cumulative cost ledger
    pub fn costs_mut(&mut self) -> &mut CostLedger {
        &mut self.costs
    }
}
