//! Simulation state
//!
//! Holds all agents, all transactions, and the central RTGS queue
//! (Queue 2). Queue 1 lives on each agent; Queue 2 is kept sorted by
//! `(priority desc, submission_tick asc, tx_id asc)` so sweep order is
//! structural rather than recomputed.
//!
//! # Critical invariants
//!
//! 1. Balance conservation: the sum of agent balances is constant
//! 2. Transaction uniqueness: each transaction ID appears exactly once
//! 3. Queue validity: every ID in the RTGS queue exists in the
//!    transactions map
//! 4. Each transaction is referenced by at most one queue at a time

use crate::models::agent::Agent;
use crate::models::transaction::Transaction;
use std::collections::BTreeMap;
use std::collections::BTreeSet;

/// Complete simulation state
#[derive(Debug, Clone)]
pub struct SimulationState {
    /// All agents, keyed by ID (sorted, deterministic iteration)
    agents: BTreeMap<String, Agent>,

    /// All transactions, keyed by ID
    transactions: BTreeMap<String, Transaction>,

    /// Queue 2: transaction IDs awaiting liquidity, sorted by
    /// (priority desc, submission_tick asc, tx_id asc)
    rtgs_queue: Vec<String>,
}

impl SimulationState {
    /// Create a new simulation state with given agents
    pub fn new(agents: Vec<Agent>) -> Self {
        let agents_map = agents
            .into_iter()
            .map(|agent| (agent.id().to_string(), agent))
            .collect();

        Self {
            agents: agents_map,
            transactions: BTreeMap::new(),
            rtgs_queue: Vec::new(),
        }
    }

    /// Get reference to an agent by ID
    pub fn get_agent(&self, id: &str) -> Option<&Agent> {
        self.agents.get(id)
    }

    /// Get mutable reference to an agent by ID
    pub fn get_agent_mut(&mut self, id: &str) -> Option<&mut Agent> {
        self.agents.get_mut(id)
    }

    /// All agent IDs in sorted order
    pub fn agent_ids(&self) -> Vec<String> {
        self.agents.keys().cloned().collect()
    }

    /// Get reference to all agents
    pub fn agents(&self) -> &BTreeMap<String, Agent> {
        &self.agents
    }

    /// Get reference to a transaction by ID
    pub fn get_transaction(&self, id: &str) -> Option<&Transaction> {
        self.transactions.get(id)
    }

    /// Get mutable reference to a transaction by ID
    pub fn get_transaction_mut(&mut self, id: &str) -> Option<&mut Transaction> {
        self.transactions.get_mut(id)
    }

    /// Add a transaction to the system
    ///
    /// # Panics
    /// Panics on a duplicate ID; ID allocation is counter-based so a
    /// collision is an engine bug.
    pub fn add_transaction(&mut self, transaction: Transaction) {
        let id = transaction.id().to_string();
        assert!(
            !self.transactions.contains_key(&id),
            "Transaction ID {} already exists",
            id
        );
        self.transactions.insert(id, transaction);
    }

    /// Get reference to all transactions
    pub fn transactions(&self) -> &BTreeMap<String, Transaction> {
        &self.transactions
    }

    /// Number of agents in system
    pub fn num_agents(&self) -> usize {
        self.agents.len()
    }

    // =========================================================================
    // Queue 2
    // =========================================================================

    /// Insert a transaction into Queue 2 at its ordered position,
    /// returning the 0-indexed position
    ///
    /// # Panics
    /// Panics if the ID is unknown or lacks a submission tick.
    pub fn queue2_insert(&mut self, tx_id: String) -> usize {
        let key = self.queue2_key(&tx_id);
        let pos = self
            .rtgs_queue
            .partition_point(|other| self.queue2_key(other) < key);
        self.rtgs_queue.insert(pos, tx_id);
        pos
    }

    /// Ordering key for Queue 2: (priority desc, submission_tick, tx_id)
    fn queue2_key(&self, tx_id: &str) -> (u8, usize, String) {
        let tx = self
            .transactions
            .get(tx_id)
            .expect("queued transaction must exist");
        (
            u8::MAX - tx.priority(),
            tx.submission_tick().expect("queued transaction must be submitted"),
            tx_id.to_string(),
        )
    }

    /// Remove a batch of settled IDs from Queue 2 in one pass
    pub fn queue2_remove_batch(&mut self, ids: &BTreeSet<String>) {
        if !ids.is_empty() {
            self.rtgs_queue.retain(|id| !ids.contains(id));
        }
    }

    /// Queue 2 contents in sweep order
    pub fn rtgs_queue(&self) -> &[String] {
        &self.rtgs_queue
    }

    /// Mutable access to Queue 2 (sweep replaces the remainder)
    pub fn rtgs_queue_mut(&mut self) -> &mut Vec<String> {
        &mut self.rtgs_queue
    }

    /// Current size of Queue 2
    pub fn queue2_size(&self) -> usize {
        self.rtgs_queue.len()
    }

    /// Total value awaiting liquidity in Queue 2
    pub fn queue2_value(&self) -> i64 {
        self.rtgs_queue
            .iter()
            .filter_map(|tx_id| self.transactions.get(tx_id))
            .map(|tx| tx.amount())
            .sum()
    }

    // =========================================================================
    // Aggregates
    // =========================================================================

    /// Sum of all agent balances (conservation check)
    pub fn total_balance(&self) -> i64 {
        self.agents.values().map(|agent| agent.balance()).sum()
    }

    /// Total number of transactions across all Queue 1s
    pub fn total_queue1_size(&self) -> usize {
        self.agents.values().map(|agent| agent.queue1_size()).sum()
    }

    /// Total value held in an agent's Queue 1
    pub fn agent_queue1_value(&self, agent_id: &str) -> i64 {
        match self.agents.get(agent_id) {
            Some(agent) => agent
                .queue1()
                .iter()
                .filter_map(|tx_id| self.transactions.get(tx_id))
                .map(|tx| tx.amount())
                .sum(),
            None => 0,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn tx(id: &str, sender: &str, receiver: &str, amount: i64, priority: u8) -> Transaction {
        Transaction::new(
            id.to_string(),
            sender.to_string(),
            receiver.to_string(),
            amount,
            0,
            100,
        )
        .with_priority(priority)
    }

    fn two_agent_state() -> SimulationState {
        SimulationState::new(vec![
            Agent::new("A".to_string(), 1_000_000, 0),
            Agent::new("B".to_string(), 2_000_000, 0),
        ])
    }

    #[test]
    fn test_new_state() {
        let state = two_agent_state();
        assert_eq!(state.num_agents(), 2);
        assert_eq!(state.queue2_size(), 0);
        assert_eq!(state.total_balance(), 3_000_000);
    }

    #[test]
    fn test_queue2_ordered_by_priority_then_submission() {
        let mut state = two_agent_state();

        let mut low = tx("tx-1", "A", "B", 100, 2);
        low.mark_submitted(5);
        let mut high = tx("tx-2", "A", "B", 100, 8);
        high.mark_submitted(7);
        let mut mid_early = tx("tx-3", "A", "B", 100, 5);
        mid_early.mark_submitted(1);

        state.add_transaction(low);
        state.add_transaction(high);
        state.add_transaction(mid_early);

        state.queue2_insert("tx-1".to_string());
        state.queue2_insert("tx-2".to_string());
        state.queue2_insert("tx-3".to_string());

        assert_eq!(state.rtgs_queue(), &["tx-2", "tx-3", "tx-1"]);
    }

    #[test]
    fn test_queue2_tx_id_tiebreak() {
        let mut state = two_agent_state();

        for id in ["tx-b", "tx-a"] {
            let mut t = tx(id, "A", "B", 100, 5);
            t.mark_submitted(3);
            state.add_transaction(t);
            state.queue2_insert(id.to_string());
        }

        assert_eq!(state.rtgs_queue(), &["tx-a", "tx-b"]);
    }

    #[test]
    fn test_queue2_remove_batch() {
        let mut state = two_agent_state();
        for id in ["tx-1", "tx-2", "tx-3"] {
            let mut t = tx(id, "A", "B", 100, 5);
            t.mark_submitted(0);
            state.add_transaction(t);
            state.queue2_insert(id.to_string());
        }

        let remove: BTreeSet<String> =
            ["tx-1".to_string(), "tx-3".to_string()].into_iter().collect();
        state.queue2_remove_batch(&remove);

        assert_eq!(state.rtgs_queue(), &["tx-2"]);
    }

    #[test]
    fn test_agent_queue1_value() {
        let mut state = two_agent_state();
        let t = tx("tx-1", "A", "B", 500_000, 5);
        state.add_transaction(t);
        state.get_agent_mut("A").unwrap().queue1_push("tx-1".to_string());

        assert_eq!(state.agent_queue1_value("A"), 500_000);
        assert_eq!(state.agent_queue1_value("B"), 0);
        assert_eq!(state.total_queue1_size(), 1);
    }
}
