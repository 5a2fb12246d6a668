//! Transaction model
//!
//! Represents a payment between two agents. A transaction settles in full
//! or not at all; partial settlement of the same ID is forbidden. A policy
//! may instead replace a divisible transaction with child transactions
//! (each carrying `parent_id`), which then settle in full themselves.
//!
//! CRITICAL: All money values are i64 (cents)

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Highest priority level a transaction may carry
pub const MAX_PRIORITY: u8 = 9;

/// Transaction status
///
/// Tracks the lifecycle of a payment through the system.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum TransactionStatus {
    /// Created but not yet queued anywhere
    Pending,

    /// Held in the sender's Queue 1
    Queued1,

    /// Released to the central RTGS queue (Queue 2)
    Queued2,

    /// Fully settled
    Settled {
        /// Tick when settlement occurred
        tick: usize,
    },

    /// Removed without settling (policy drop, or superseded by split children)
    Dropped {
        /// Tick when transaction was dropped
        tick: usize,
    },

    /// Past deadline but still awaiting settlement
    Expired,
}

/// Errors that can occur during transaction operations
#[derive(Debug, Error, PartialEq, Eq)]
pub enum TransactionError {
    #[error("Transaction already settled")]
    AlreadySettled,

    #[error("Cannot settle dropped transaction")]
    TransactionDropped,
}

/// Represents a payment transaction between two agents
///
/// # Example
/// ```
/// use rtgs_engine_rs::Transaction;
///
/// let tx = Transaction::new(
///     "tx-BANK_A-000001".to_string(),
///     "BANK_A".to_string(),
///     "BANK_B".to_string(),
///     100_000, // $1,000.00 in cents
///     10,      // arrival_tick
///     50,      // deadline_tick
/// )
/// .with_priority(8)
/// .divisible();
///
/// assert_eq!(tx.amount(), 100_000);
/// assert!(tx.is_divisible());
/// ```
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Transaction {
    /// Stable transaction identifier
    id: String,

    /// Sender agent ID
    sender_id: String,

    /// Receiver agent ID
    receiver_id: String,

    /// Transaction amount (i64 cents, always positive)
    amount: i64,

    /// Tick when transaction arrived in the system
    arrival_tick: usize,

    /// Tick by which transaction must settle to avoid penalties
    deadline_tick: usize,

    /// Priority level (0-9, higher = more urgent)
    priority: u8,

    /// Can the transaction be replaced by split children?
    is_divisible: bool,

    /// Parent transaction ID for split children
    parent_id: Option<String>,

    /// Current status
    status: TransactionStatus,

    /// Tick when the transaction was released into the RTGS path
    submission_tick: Option<usize>,

    /// First tick at which the transaction was past its deadline unsettled
    overdue_since_tick: Option<usize>,
}

impl Transaction {
    /// Create a new transaction
    ///
    /// # Panics
    /// Panics if amount <= 0 or deadline < arrival. Arrivals and scenario
    /// injection validate both before construction.
    pub fn new(
        id: String,
        sender_id: String,
        receiver_id: String,
        amount: i64,
        arrival_tick: usize,
        deadline_tick: usize,
    ) -> Self {
        assert!(amount > 0, "amount must be positive");
        assert!(
            deadline_tick >= arrival_tick,
            "deadline must not precede arrival"
        );

        Self {
            id,
            sender_id,
            receiver_id,
            amount,
            arrival_tick,
            deadline_tick,
            priority: 5,
            is_divisible: false,
            parent_id: None,
            status: TransactionStatus::Pending,
            submission_tick: None,
            overdue_since_tick: None,
        }
    }

    /// Create a split child of `parent`
    ///
    /// Children inherit sender, receiver, deadline, and priority. They are
    /// born indivisible: the parent's friction was already charged and a
    /// second split of the same obligation is not allowed.
    pub fn new_child(parent: &Transaction, child_id: String, amount: i64) -> Self {
        assert!(amount > 0, "child amount must be positive");
        Self {
            id: child_id,
            sender_id: parent.sender_id.clone(),
            receiver_id: parent.receiver_id.clone(),
            amount,
            arrival_tick: parent.arrival_tick,
            deadline_tick: parent.deadline_tick,
            priority: parent.priority,
            is_divisible: false,
            parent_id: Some(parent.id.clone()),
            status: TransactionStatus::Pending,
            submission_tick: None,
            overdue_since_tick: None,
        }
    }

    /// Set priority (builder pattern), capped at [`MAX_PRIORITY`]
    pub fn with_priority(mut self, priority: u8) -> Self {
        self.priority = priority.min(MAX_PRIORITY);
        self
    }

    /// Mark transaction as divisible (builder pattern)
    pub fn divisible(mut self) -> Self {
        self.is_divisible = true;
        self
    }

    /// Get transaction ID
    pub fn id(&self) -> &str {
        &self.id
    }

    /// Get sender agent ID
    pub fn sender_id(&self) -> &str {
        &self.sender_id
    }

    /// Get receiver agent ID
    pub fn receiver_id(&self) -> &str {
        &self.receiver_id
    }

    /// Get transaction amount (i64 cents)
    pub fn amount(&self) -> i64 {
        self.amount
    }

    /// Get arrival tick
    pub fn arrival_tick(&self) -> usize {
        self.arrival_tick
    }

    /// Get deadline tick
    pub fn deadline_tick(&self) -> usize {
        self.deadline_tick
    }

    /// Get priority level
    pub fn priority(&self) -> u8 {
        self.priority
    }

    /// Set priority, capped at [`MAX_PRIORITY`]
    pub fn set_priority(&mut self, priority: u8) {
        self.priority = priority.min(MAX_PRIORITY);
    }

    /// Check if transaction is divisible
    pub fn is_divisible(&self) -> bool {
        self.is_divisible
    }

    /// Get parent transaction ID (split children only)
    pub fn parent_id(&self) -> Option<&str> {
        self.parent_id.as_deref()
    }

    /// Get current status
    pub fn status(&self) -> &TransactionStatus {
        &self.status
    }

    /// Tick when the transaction was released to the RTGS path
    pub fn submission_tick(&self) -> Option<usize> {
        self.submission_tick
    }

    /// First tick at which the transaction was overdue
    pub fn overdue_since_tick(&self) -> Option<usize> {
        self.overdue_since_tick
    }

    /// Check if transaction has fully settled
    pub fn is_settled(&self) -> bool {
        matches!(self.status, TransactionStatus::Settled { .. })
    }

    /// Check if transaction was dropped
    pub fn is_dropped(&self) -> bool {
        matches!(self.status, TransactionStatus::Dropped { .. })
    }

    /// Check if the transaction has been marked overdue
    pub fn is_overdue(&self) -> bool {
        self.overdue_since_tick.is_some()
    }

    /// Check if transaction is past its deadline at `current_tick`
    pub fn is_past_deadline(&self, current_tick: usize) -> bool {
        current_tick > self.deadline_tick
    }

    /// Transition into Queue 1
    pub fn mark_queued1(&mut self) {
        self.status = TransactionStatus::Queued1;
    }

    /// Transition into the RTGS path at `tick`
    ///
    /// Records the submission tick used for Queue 2 ordering.
    pub fn mark_submitted(&mut self, tick: usize) {
        self.submission_tick = Some(tick);
        self.status = TransactionStatus::Queued2;
    }

    /// Mark the transaction overdue at `tick`
    ///
    /// The transaction stays in its queue and remains settleable.
    pub fn mark_overdue(&mut self, tick: usize) {
        if self.overdue_since_tick.is_none() {
            self.overdue_since_tick = Some(tick);
            self.status = TransactionStatus::Expired;
        }
    }

    /// Settle the transaction in full at `tick`
    pub fn settle(&mut self, tick: usize) -> Result<(), TransactionError> {
        if self.is_settled() {
            return Err(TransactionError::AlreadySettled);
        }
        if self.is_dropped() {
            return Err(TransactionError::TransactionDropped);
        }

        self.status = TransactionStatus::Settled { tick };
        Ok(())
    }

    /// Drop the transaction at `tick` (policy drop or split supersession)
    pub fn drop_transaction(&mut self, tick: usize) {
        self.status = TransactionStatus::Dropped { tick };
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn tx(amount: i64) -> Transaction {
        Transaction::new(
            "tx-1".to_string(),
            "BANK_A".to_string(),
            "BANK_B".to_string(),
            amount,
            10,
            50,
        )
    }

    #[test]
    fn test_priority_capped() {
        let t = tx(100_000).with_priority(255);
        assert_eq!(t.priority(), MAX_PRIORITY);
    }

    #[test]
    fn test_settle_is_full_or_nothing() {
        let mut t = tx(100_000);
        t.settle(20).unwrap();
        assert!(t.is_settled());
        assert_eq!(t.settle(21), Err(TransactionError::AlreadySettled));
    }

    #[test]
    fn test_cannot_settle_dropped() {
        let mut t = tx(100_000);
        t.drop_transaction(15);
        assert_eq!(t.settle(16), Err(TransactionError::TransactionDropped));
    }

    #[test]
    fn test_child_inherits_and_is_indivisible() {
        let parent = tx(100_000).with_priority(8).divisible();
        let child = Transaction::new_child(&parent, "tx-1-s1".to_string(), 50_000);

        assert_eq!(child.sender_id(), parent.sender_id());
        assert_eq!(child.receiver_id(), parent.receiver_id());
        assert_eq!(child.deadline_tick(), parent.deadline_tick());
        assert_eq!(child.priority(), 8);
        assert_eq!(child.parent_id(), Some("tx-1"));
        assert!(!child.is_divisible());
    }

    #[test]
    fn test_mark_overdue_is_sticky() {
        let mut t = tx(100_000);
        t.mark_overdue(51);
        t.mark_overdue(60);
        assert_eq!(t.overdue_since_tick(), Some(51));
        assert_eq!(*t.status(), TransactionStatus::Expired);
    }

    #[test]
    fn test_overdue_still_settleable() {
        let mut t = tx(100_000);
        t.mark_overdue(51);
        t.settle(55).unwrap();
        assert!(t.is_settled());
    }

    #[test]
    #[should_panic(expected = "amount must be positive")]
    fn test_zero_amount_panics() {
        tx(0);
    }
}
