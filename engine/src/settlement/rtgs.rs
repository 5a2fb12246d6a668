//! RTGS (Real-Time Gross Settlement) engine
//!
//! `settle` is the only primitive that moves money for individual
//! payments. The LSM net-settlement primitives (`settle_offset_pair`,
//! `settle_cycle_legs`) apply several legs atomically after a net
//! feasibility check, so gross leg amounts may exceed what any single
//! gross settlement would allow.
//!
//! # Settlement flow
//!
//! 1. Released payment → immediate `settle` attempt
//! 2. On `InsufficientLiquidity` the payment enters Queue 2
//! 3. The per-tick sweep retries Queue 2 in priority order
//! 4. The LSM resolver settles offsetting sets by net position

use crate::models::agent::AgentError;
use crate::models::state::SimulationState;
use crate::models::transaction::TransactionError;
use std::collections::BTreeMap;
use thiserror::Error;

/// Errors that can occur during settlement
#[derive(Debug, Error, PartialEq, Eq)]
pub enum SettlementError {
    #[error("Insufficient liquidity: required {required}, available {available}")]
    InsufficientLiquidity { required: i64, available: i64 },

    #[error("Transaction already settled")]
    AlreadySettled,

    #[error("Transaction has been dropped")]
    Dropped,

    #[error("Unknown transaction: {0}")]
    UnknownTransaction(String),

    #[error("Unknown agent: {0}")]
    UnknownAgent(String),

    #[error("Agent error: {0}")]
    Agent(#[from] AgentError),

    #[error("Transaction error: {0}")]
    Transaction(#[from] TransactionError),
}

/// A settled transaction leg (for event emission by the caller)
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SettledLeg {
    pub tx_id: String,
    pub sender_id: String,
    pub receiver_id: String,
    pub amount: i64,
}

/// Attempt immediate gross settlement of a transaction
///
/// Atomically checks `balance − amount ≥ −allowed_overdraft_limit` for
/// the sender, debits sender, credits receiver, and marks the
/// transaction settled. On failure nothing is mutated.
pub fn settle(
    state: &mut SimulationState,
    tx_id: &str,
    tick: usize,
) -> Result<SettledLeg, SettlementError> {
    let (sender_id, receiver_id, amount) = {
        let tx = state
            .get_transaction(tx_id)
            .ok_or_else(|| SettlementError::UnknownTransaction(tx_id.to_string()))?;

        if tx.is_settled() {
            return Err(SettlementError::AlreadySettled);
        }
        if tx.is_dropped() {
            return Err(SettlementError::Dropped);
        }

        (
            tx.sender_id().to_string(),
            tx.receiver_id().to_string(),
            tx.amount(),
        )
    };

    let can_pay = state
        .get_agent(&sender_id)
        .ok_or_else(|| SettlementError::UnknownAgent(sender_id.clone()))?
        .can_pay(amount);
    if !can_pay {
        let available = state.get_agent(&sender_id).unwrap().available_liquidity();
        return Err(SettlementError::InsufficientLiquidity {
            required: amount,
            available,
        });
    }
    if state.get_agent(&receiver_id).is_none() {
        return Err(SettlementError::UnknownAgent(receiver_id));
    }

    // All checks passed; apply atomically
    state.get_agent_mut(&sender_id).unwrap().debit(amount)?;
    state.get_agent_mut(&receiver_id).unwrap().credit(amount);
    state.get_transaction_mut(tx_id).unwrap().settle(tick)?;

    Ok(SettledLeg {
        tx_id: tx_id.to_string(),
        sender_id,
        receiver_id,
        amount,
    })
}

/// Net positions of a set of legs: agent → inflow − outflow
pub fn net_positions(
    state: &SimulationState,
    tx_ids: &[String],
) -> Result<BTreeMap<String, i64>, SettlementError> {
    let mut positions: BTreeMap<String, i64> = BTreeMap::new();

    for tx_id in tx_ids {
        let tx = state
            .get_transaction(tx_id)
            .ok_or_else(|| SettlementError::UnknownTransaction(tx_id.clone()))?;
        if tx.is_settled() {
            return Err(SettlementError::AlreadySettled);
        }
        if tx.is_dropped() {
            return Err(SettlementError::Dropped);
        }
        *positions.entry(tx.sender_id().to_string()).or_insert(0) -= tx.amount();
        *positions.entry(tx.receiver_id().to_string()).or_insert(0) += tx.amount();
    }

    Ok(positions)
}

/// Settle a set of legs atomically against net positions
///
/// Two phases, T2 style:
/// 1. Feasibility (read-only): conservation of the net positions, and
///    every net payer must cover its net outflow from the current
///    balance without breaching the overdraft floor.
/// 2. Commit: apply every leg at full value and mark each settled.
///
/// Returns the computed net positions for event enrichment.
pub fn settle_legs_net(
    state: &mut SimulationState,
    tx_ids: &[String],
    tick: usize,
) -> Result<BTreeMap<String, i64>, SettlementError> {
    let positions = net_positions(state, tx_ids)?;

    // Conservation: what flows out must flow in
    let sum: i64 = positions.values().sum();
    assert_eq!(sum, 0, "net positions must conserve value");

    for (agent_id, net) in &positions {
        if *net < 0 {
            let agent = state
                .get_agent(agent_id)
                .ok_or_else(|| SettlementError::UnknownAgent(agent_id.clone()))?;
            let projected = agent.balance() + net;
            if projected < -agent.allowed_overdraft_limit() {
                return Err(SettlementError::InsufficientLiquidity {
                    required: -net,
                    available: agent.available_liquidity(),
                });
            }
        }
    }

    // Commit: apply every leg at full value
    for tx_id in tx_ids {
        let (sender_id, receiver_id, amount) = {
            let tx = state.get_transaction(tx_id).unwrap();
            (
                tx.sender_id().to_string(),
                tx.receiver_id().to_string(),
                tx.amount(),
            )
        };
        state.get_agent_mut(&sender_id).unwrap().adjust_balance(-amount);
        state.get_agent_mut(&receiver_id).unwrap().adjust_balance(amount);
        state.get_transaction_mut(tx_id).unwrap().settle(tick)?;
    }

    Ok(positions)
}

/// Result of one Queue 2 sweep
#[derive(Debug, Clone, Default)]
pub struct SweepResult {
    /// Legs settled this sweep, in sweep order
    pub settled: Vec<SettledLeg>,
}

/// Sweep Queue 2 in priority order, settling payments that now clear
///
/// Overdue payments stay queued; obligations persist until settled.
pub fn sweep_queue2(state: &mut SimulationState, tick: usize) -> SweepResult {
    let mut settled = Vec::new();
    let mut still_pending = Vec::new();

    let queue: Vec<String> = state.rtgs_queue_mut().drain(..).collect();

    for tx_id in queue {
        match settle(state, &tx_id, tick) {
            Ok(leg) => settled.push(leg),
            Err(SettlementError::InsufficientLiquidity { .. }) => {
                still_pending.push(tx_id);
            }
            // Settled elsewhere this tick (LSM) or dropped: leave it out
            Err(_) => {}
        }
    }

    *state.rtgs_queue_mut() = still_pending;

    SweepResult { settled }
}
