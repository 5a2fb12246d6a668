//! LSM (Liquidity-Saving Mechanisms)
//!
//! Reduces liquidity requirements by settling net positions instead of
//! gross flows. Two passes over Queue 2, once per tick:
//!
//! - **Bilateral offsetting**: mutual A⇄B pairs settle atomically when
//!   both participants can cover the net flow. Pairs are matched
//!   smallest-amount-first, ties broken by lowest tx_id.
//! - **Multilateral cycles**: A→B→…→A cycles with (possibly unequal) leg
//!   values settle atomically when every participant covers its net
//!   position. Shortest cycles are tried first, ties by lowest
//!   concatenated agent sequence.
//!
//! Each leg settles at full value or not at all; all settlement goes
//! through the settlement-engine net primitives so the event log remains
//! the canonical history. The resolver's output is a pure function of
//! Queue 2 contents and agent states at the start of the pass.

use crate::models::state::SimulationState;
use crate::settlement::rtgs::{settle_legs_net, SettlementError};
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, BTreeSet};
use tracing::debug;

pub mod graph;

use graph::PaymentGraph;

/// Configuration for LSM behavior
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LsmConfig {
    /// Enable the resolver (disabled ⇒ no LSM events at all)
    #[serde(default = "default_enabled")]
    pub enabled: bool,

    /// Maximum cycle length to detect (legs per cycle)
    #[serde(default = "default_max_cycle_length")]
    pub max_cycle_length: usize,
}

fn default_enabled() -> bool {
    true
}

fn default_max_cycle_length() -> usize {
    4
}

impl Default for LsmConfig {
    fn default() -> Self {
        Self {
            enabled: default_enabled(),
            max_cycle_length: default_max_cycle_length(),
        }
    }
}

/// One settled bilateral offset
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BilateralOffsetRecord {
    pub agent_a: String,
    pub agent_b: String,
    /// The a→b leg
    pub tx_id_a: String,
    /// The b→a leg
    pub tx_id_b: String,
    pub amount_a: i64,
    pub amount_b: i64,
}

/// One settled multilateral cycle
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CycleRecord {
    /// Agents in cycle order, first repeated at the end
    pub agents: Vec<String>,
    /// Settled legs in cycle order
    pub tx_ids: Vec<String>,
    /// Gross value of all legs
    pub total_value: i64,
    /// Largest net outflow any participant covered
    pub max_net_outflow: i64,
}

/// Result of a complete LSM pass
#[derive(Debug, Clone, Default)]
pub struct LsmPassResult {
    pub offsets: Vec<BilateralOffsetRecord>,
    pub cycles: Vec<CycleRecord>,
}

impl LsmPassResult {
    /// All transaction IDs settled by this pass, in settlement order
    pub fn settled_tx_ids(&self) -> Vec<String> {
        let mut ids = Vec::new();
        for offset in &self.offsets {
            ids.push(offset.tx_id_a.clone());
            ids.push(offset.tx_id_b.clone());
        }
        for cycle in &self.cycles {
            ids.extend(cycle.tx_ids.iter().cloned());
        }
        ids
    }

    /// Number of transactions settled by this pass
    pub fn settled_count(&self) -> usize {
        self.offsets.len() * 2 + self.cycles.iter().map(|c| c.tx_ids.len()).sum::<usize>()
    }
}

/// Run the complete LSM pass over Queue 2
pub fn run_lsm_pass(
    state: &mut SimulationState,
    config: &LsmConfig,
    tick: usize,
) -> LsmPassResult {
    let mut result = LsmPassResult::default();

    if !config.enabled || state.rtgs_queue().is_empty() {
        return result;
    }

    let mut settled: BTreeSet<String> = BTreeSet::new();

    bilateral_pass(state, tick, &mut settled, &mut result.offsets);
    cycle_pass(
        state,
        tick,
        config.max_cycle_length,
        &mut settled,
        &mut result.cycles,
    );

    // Batch removal: single pass over the queue
    state.queue2_remove_batch(&settled);

    if !settled.is_empty() {
        debug!(
            tick,
            offsets = result.offsets.len(),
            cycles = result.cycles.len(),
            settled = settled.len(),
            "lsm pass settled queued payments"
        );
    }

    result
}

/// Bilateral offsetting over mutual pairs
///
/// For every agent pair with flows in both directions, legs are matched
/// smallest-first from each side (ties by tx_id). A matched pair settles
/// if both participants pass the net-position check; on the first
/// infeasible match the pair is abandoned for this tick.
fn bilateral_pass(
    state: &mut SimulationState,
    tick: usize,
    settled: &mut BTreeSet<String>,
    offsets: &mut Vec<BilateralOffsetRecord>,
) {
    // Directed flows: (sender, receiver) → [(amount, tx_id)]
    let mut flows: BTreeMap<(String, String), Vec<(i64, String)>> = BTreeMap::new();
    for tx_id in state.rtgs_queue() {
        if let Some(tx) = state.get_transaction(tx_id) {
            if tx.is_settled() {
                continue;
            }
            flows
                .entry((tx.sender_id().to_string(), tx.receiver_id().to_string()))
                .or_default()
                .push((tx.amount(), tx_id.clone()));
        }
    }
    for legs in flows.values_mut() {
        legs.sort();
    }

    // Unordered pairs with mutual flows, in sorted order
    let pairs: Vec<(String, String)> = flows
        .keys()
        .filter(|(a, b)| a < b && flows.contains_key(&(b.clone(), a.clone())))
        .cloned()
        .collect();

    for (agent_a, agent_b) in pairs {
        let mut forward = flows
            .get(&(agent_a.clone(), agent_b.clone()))
            .cloned()
            .unwrap_or_default();
        let mut backward = flows
            .get(&(agent_b.clone(), agent_a.clone()))
            .cloned()
            .unwrap_or_default();

        while !forward.is_empty() && !backward.is_empty() {
            let (amount_a, tx_id_a) = forward[0].clone();
            let (amount_b, tx_id_b) = backward[0].clone();

            let legs = vec![tx_id_a.clone(), tx_id_b.clone()];
            match settle_legs_net(state, &legs, tick) {
                Ok(_) => {
                    settled.insert(tx_id_a.clone());
                    settled.insert(tx_id_b.clone());
                    offsets.push(BilateralOffsetRecord {
                        agent_a: agent_a.clone(),
                        agent_b: agent_b.clone(),
                        tx_id_a,
                        tx_id_b,
                        amount_a,
                        amount_b,
                    });
                    forward.remove(0);
                    backward.remove(0);
                }
                Err(SettlementError::InsufficientLiquidity { .. }) => break,
                Err(_) => {
                    // A leg went stale mid-pass; skip the smaller side
                    if amount_a <= amount_b {
                        forward.remove(0);
                    } else {
                        backward.remove(0);
                    }
                }
            }
        }
    }
}

/// Multilateral cycle settlement
///
/// Candidates come from the deterministic payment graph, shortest-first.
/// Each surviving candidate is re-checked against current balances, so a
/// cycle settled earlier in the pass is visible to later feasibility
/// checks.
fn cycle_pass(
    state: &mut SimulationState,
    tick: usize,
    max_cycle_length: usize,
    settled: &mut BTreeSet<String>,
    cycles: &mut Vec<CycleRecord>,
) {
    if max_cycle_length < 3 {
        return;
    }

    let graph = PaymentGraph::from_queue2(state, settled);
    if graph.vertex_count() < 3 {
        return;
    }

    let candidates = graph.find_cycles(max_cycle_length);

    for candidate in candidates {
        if candidate.tx_ids.iter().any(|id| settled.contains(id)) {
            continue;
        }

        match settle_legs_net(state, &candidate.tx_ids, tick) {
            Ok(positions) => {
                let max_net_outflow = positions
                    .values()
                    .filter(|net| **net < 0)
                    .map(|net| -net)
                    .max()
                    .unwrap_or(0);

                for tx_id in &candidate.tx_ids {
                    settled.insert(tx_id.clone());
                }
                cycles.push(CycleRecord {
                    agents: candidate.agents,
                    tx_ids: candidate.tx_ids,
                    total_value: candidate.total_value,
                    max_net_outflow,
                });
            }
            Err(_) => continue,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::agent::Agent;
    use crate::models::transaction::Transaction;

    fn queue_tx(
        state: &mut SimulationState,
        id: &str,
        sender: &str,
        receiver: &str,
        amount: i64,
        tick: usize,
    ) {
        let mut tx = Transaction::new(
            id.to_string(),
            sender.to_string(),
            receiver.to_string(),
            amount,
            0,
            100,
        );
        tx.mark_submitted(tick);
        state.add_transaction(tx);
        state.queue2_insert(id.to_string());
    }

    #[test]
    fn test_bilateral_exact_offset() {
        // A→B 500, B→A 500 with balances of 100: only net settlement works
        let mut state = SimulationState::new(vec![
            Agent::new("A".to_string(), 100, 0),
            Agent::new("B".to_string(), 100, 0),
        ]);
        queue_tx(&mut state, "tx-1", "A", "B", 500, 1);
        queue_tx(&mut state, "tx-2", "B", "A", 500, 1);

        let result = run_lsm_pass(&mut state, &LsmConfig::default(), 5);

        assert_eq!(result.offsets.len(), 1);
        assert_eq!(result.settled_count(), 2);
        assert_eq!(state.queue2_size(), 0);
        assert_eq!(state.get_agent("A").unwrap().balance(), 100);
        assert_eq!(state.get_agent("B").unwrap().balance(), 100);
    }

    #[test]
    fn test_bilateral_minimum_amount_pair_first() {
        // Two mutual pairs; the smallest legs from each side pair up first
        let mut state = SimulationState::new(vec![
            Agent::new("A".to_string(), 1_000, 0),
            Agent::new("B".to_string(), 1_000, 0),
        ]);
        queue_tx(&mut state, "tx-big-ab", "A", "B", 900, 1);
        queue_tx(&mut state, "tx-small-ab", "A", "B", 200, 1);
        queue_tx(&mut state, "tx-big-ba", "B", "A", 800, 1);
        queue_tx(&mut state, "tx-small-ba", "B", "A", 300, 1);

        let result = run_lsm_pass(&mut state, &LsmConfig::default(), 5);

        assert!(!result.offsets.is_empty());
        let first = &result.offsets[0];
        assert_eq!(first.tx_id_a, "tx-small-ab");
        assert_eq!(first.tx_id_b, "tx-small-ba");
    }

    #[test]
    fn test_bilateral_amount_tie_broken_by_tx_id() {
        let mut state = SimulationState::new(vec![
            Agent::new("A".to_string(), 1_000, 0),
            Agent::new("B".to_string(), 1_000, 0),
        ]);
        queue_tx(&mut state, "tx-z", "A", "B", 500, 1);
        queue_tx(&mut state, "tx-a", "A", "B", 500, 1);
        queue_tx(&mut state, "tx-m", "B", "A", 500, 1);

        let result = run_lsm_pass(&mut state, &LsmConfig::default(), 5);

        assert_eq!(result.offsets.len(), 1);
        assert_eq!(result.offsets[0].tx_id_a, "tx-a");
    }

    #[test]
    fn test_cycle_with_unequal_amounts() {
        // A→B 300, B→C 400, C→A 500; each agent gets enough overdraft to
        // cover its net position
        let mut state = SimulationState::new(vec![
            Agent::new("A".to_string(), 0, 200),
            Agent::new("B".to_string(), 0, 200),
            Agent::new("C".to_string(), 0, 200),
        ]);
        queue_tx(&mut state, "tx-1", "A", "B", 300, 1);
        queue_tx(&mut state, "tx-2", "B", "C", 400, 1);
        queue_tx(&mut state, "tx-3", "C", "A", 500, 1);

        let result = run_lsm_pass(&mut state, &LsmConfig::default(), 5);

        assert_eq!(result.cycles.len(), 1);
        let cycle = &result.cycles[0];
        assert_eq!(cycle.tx_ids, vec!["tx-1", "tx-2", "tx-3"]);
        assert_eq!(cycle.total_value, 1_200);
        assert_eq!(cycle.max_net_outflow, 100);

        // Net positions: A +200, B −100, C −100
        assert_eq!(state.get_agent("A").unwrap().balance(), 200);
        assert_eq!(state.get_agent("B").unwrap().balance(), -100);
        assert_eq!(state.get_agent("C").unwrap().balance(), -100);
        assert_eq!(state.queue2_size(), 0);
    }

    #[test]
    fn test_cycle_blocked_by_net_position() {
        // Same cycle but no overdraft: B and C cannot cover −100
        let mut state = SimulationState::new(vec![
            Agent::new("A".to_string(), 0, 0),
            Agent::new("B".to_string(), 0, 0),
            Agent::new("C".to_string(), 0, 0),
        ]);
        queue_tx(&mut state, "tx-1", "A", "B", 300, 1);
        queue_tx(&mut state, "tx-2", "B", "C", 400, 1);
        queue_tx(&mut state, "tx-3", "C", "A", 500, 1);

        let result = run_lsm_pass(&mut state, &LsmConfig::default(), 5);

        assert!(result.cycles.is_empty());
        assert_eq!(state.queue2_size(), 3);
        assert_eq!(state.get_agent("A").unwrap().balance(), 0);
    }

    #[test]
    fn test_disabled_resolver_does_nothing() {
        let mut state = SimulationState::new(vec![
            Agent::new("A".to_string(), 100, 0),
            Agent::new("B".to_string(), 100, 0),
        ]);
        queue_tx(&mut state, "tx-1", "A", "B", 500, 1);
        queue_tx(&mut state, "tx-2", "B", "A", 500, 1);

        let config = LsmConfig {
            enabled: false,
            max_cycle_length: 4,
        };
        let result = run_lsm_pass(&mut state, &config, 5);

        assert_eq!(result.settled_count(), 0);
        assert_eq!(state.queue2_size(), 2);
    }

    #[test]
    fn test_pass_conserves_total_balance() {
        let mut state = SimulationState::new(vec![
            Agent::new("A".to_string(), 700, 500),
            Agent::new("B".to_string(), 300, 500),
            Agent::new("C".to_string(), 0, 500),
        ]);
        let before = state.total_balance();

        queue_tx(&mut state, "tx-1", "A", "B", 300, 1);
        queue_tx(&mut state, "tx-2", "B", "C", 400, 1);
        queue_tx(&mut state, "tx-3", "C", "A", 500, 1);
        queue_tx(&mut state, "tx-4", "B", "A", 250, 2);

        run_lsm_pass(&mut state, &LsmConfig::default(), 5);

        assert_eq!(state.total_balance(), before);
    }
}
