//! Payment graph for LSM cycle detection
//!
//! A transient directed graph built from Queue 2: nodes are agents
//! (arena-indexed in lexicographic order), edges are individual queued
//! transactions in ordered adjacency lists. No hash iteration anywhere,
//! so traversal order is a pure function of queue contents.

use crate::models::state::SimulationState;
use std::collections::{BTreeMap, BTreeSet};

/// One queued transaction as a graph edge
#[derive(Debug, Clone)]
pub struct Edge {
    /// Receiver's vertex index
    pub to: usize,
    pub tx_id: String,
    pub amount: i64,
    priority: u8,
    submission_tick: usize,
}

/// A candidate cycle of queued payments
#[derive(Debug, Clone)]
pub struct CycleCandidate {
    /// Agents in cycle order, first repeated at the end
    pub agents: Vec<String>,

    /// Transaction legs in cycle order
    pub tx_ids: Vec<String>,

    /// Gross value of all legs
    pub total_value: i64,
}

impl CycleCandidate {
    /// Number of legs in the cycle
    pub fn len(&self) -> usize {
        self.tx_ids.len()
    }

    pub fn is_empty(&self) -> bool {
        self.tx_ids.is_empty()
    }
}

/// Directed payment graph over Queue 2 contents
#[derive(Debug, Clone)]
pub struct PaymentGraph {
    /// Vertex index → agent ID, in lexicographic order
    agents: Vec<String>,

    /// Adjacency lists, per vertex, ordered by
    /// (priority desc, submission_tick asc, tx_id asc)
    adjacency: Vec<Vec<Edge>>,
}

impl PaymentGraph {
    /// Build the graph from the current Queue 2, skipping `exclude`d IDs
    pub fn from_queue2(state: &SimulationState, exclude: &BTreeSet<String>) -> Self {
        // Collect participating agents in sorted order
        let mut agent_set: BTreeSet<String> = BTreeSet::new();
        for tx_id in state.rtgs_queue() {
            if exclude.contains(tx_id) {
                continue;
            }
            if let Some(tx) = state.get_transaction(tx_id) {
                agent_set.insert(tx.sender_id().to_string());
                agent_set.insert(tx.receiver_id().to_string());
            }
        }

        let agents: Vec<String> = agent_set.into_iter().collect();
        let index: BTreeMap<&str, usize> = agents
            .iter()
            .enumerate()
            .map(|(i, id)| (id.as_str(), i))
            .collect();

        let mut adjacency: Vec<Vec<Edge>> = vec![Vec::new(); agents.len()];
        for tx_id in state.rtgs_queue() {
            if exclude.contains(tx_id) {
                continue;
            }
            if let Some(tx) = state.get_transaction(tx_id) {
                let from = index[tx.sender_id()];
                let to = index[tx.receiver_id()];
                adjacency[from].push(Edge {
                    to,
                    tx_id: tx_id.clone(),
                    amount: tx.amount(),
                    priority: tx.priority(),
                    submission_tick: tx.submission_tick().unwrap_or(0),
                });
            }
        }

        for edges in &mut adjacency {
            edges.sort_by(|a, b| {
                b.priority
                    .cmp(&a.priority)
                    .then(a.submission_tick.cmp(&b.submission_tick))
                    .then(a.tx_id.cmp(&b.tx_id))
            });
        }

        Self { agents, adjacency }
    }

    /// Number of vertices
    pub fn vertex_count(&self) -> usize {
        self.agents.len()
    }

    /// Enumerate simple multilateral cycles up to `max_cycle_length` legs
    ///
    /// DFS from each start vertex in ascending index order; within a
    /// search only vertices above the start are visited, so each cycle is
    /// found exactly once, rooted at its lowest agent. Results are sorted
    /// shortest-first, ties by the concatenated agent sequence, then by
    /// leg IDs.
    pub fn find_cycles(&self, max_cycle_length: usize) -> Vec<CycleCandidate> {
        let mut cycles = Vec::new();

        if max_cycle_length < 3 {
            // Two-leg offsets belong to the bilateral pass
            return cycles;
        }

        for start in 0..self.agents.len() {
            let mut visited = vec![false; self.agents.len()];
            visited[start] = true;
            let mut path: Vec<&Edge> = Vec::new();
            self.dfs(start, start, max_cycle_length, &mut visited, &mut path, &mut cycles);
        }

        cycles.sort_by(|a, b| {
            a.len()
                .cmp(&b.len())
                .then_with(|| a.agents.cmp(&b.agents))
                .then_with(|| a.tx_ids.cmp(&b.tx_ids))
        });

        cycles
    }

    fn dfs<'a>(
        &'a self,
        start: usize,
        current: usize,
        max_len: usize,
        visited: &mut Vec<bool>,
        path: &mut Vec<&'a Edge>,
        cycles: &mut Vec<CycleCandidate>,
    ) {
        for edge in &self.adjacency[current] {
            if edge.to == start {
                // Closing edge; only record true multilateral cycles
                if path.len() >= 2 {
                    let mut agents = vec![self.agents[start].clone()];
                    let mut tx_ids = Vec::with_capacity(path.len() + 1);
                    let mut total_value = 0i64;
                    for hop in path.iter() {
                        agents.push(self.agents[hop.to].clone());
                        tx_ids.push(hop.tx_id.clone());
                        total_value += hop.amount;
                    }
                    agents.push(self.agents[start].clone());
                    tx_ids.push(edge.tx_id.clone());
                    total_value += edge.amount;

                    cycles.push(CycleCandidate {
                        agents,
                        tx_ids,
                        total_value,
                    });
                }
            } else if edge.to > start && !visited[edge.to] && path.len() + 1 < max_len {
                visited[edge.to] = true;
                path.push(edge);
                self.dfs(start, edge.to, max_len, visited, path, cycles);
                path.pop();
                visited[edge.to] = false;
            }
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
    ) {
        let mut tx = Transaction::new(
            id.to_string(),
            sender.to_string(),
            receiver.to_string(),
            amount,
            0,
            100,
        );
        tx.mark_submitted(1);
        state.add_transaction(tx);
        state.queue2_insert(id.to_string());
    }

    fn three_agent_state() -> SimulationState {
        SimulationState::new(vec![
            Agent::new("A".to_string(), 0, 1_000_000),
            Agent::new("B".to_string(), 0, 1_000_000),
            Agent::new("C".to_string(), 0, 1_000_000),
        ])
    }

    #[test]
    fn test_triangle_detected_once() {
        let mut state = three_agent_state();
        queue_tx(&mut state, "tx-1", "A", "B", 300);
        queue_tx(&mut state, "tx-2", "B", "C", 400);
        queue_tx(&mut state, "tx-3", "C", "A", 500);

        let graph = PaymentGraph::from_queue2(&state, &BTreeSet::new());
        let cycles = graph.find_cycles(4);

        assert_eq!(cycles.len(), 1);
        let cycle = &cycles[0];
        assert_eq!(cycle.agents, vec!["A", "B", "C", "A"]);
        assert_eq!(cycle.tx_ids, vec!["tx-1", "tx-2", "tx-3"]);
        assert_eq!(cycle.total_value, 1_200);
    }

    #[test]
    fn test_two_leg_pairs_not_reported() {
        let mut state = three_agent_state();
        queue_tx(&mut state, "tx-1", "A", "B", 300);
        queue_tx(&mut state, "tx-2", "B", "A", 300);

        let graph = PaymentGraph::from_queue2(&state, &BTreeSet::new());
        assert!(graph.find_cycles(4).is_empty());
    }

    #[test]
    fn test_max_length_respected() {
        let mut state = SimulationState::new(vec![
            Agent::new("A".to_string(), 0, 0),
            Agent::new("B".to_string(), 0, 0),
            Agent::new("C".to_string(), 0, 0),
            Agent::new("D".to_string(), 0, 0),
        ]);
        queue_tx(&mut state, "tx-1", "A", "B", 100);
        queue_tx(&mut state, "tx-2", "B", "C", 100);
        queue_tx(&mut state, "tx-3", "C", "D", 100);
        queue_tx(&mut state, "tx-4", "D", "A", 100);

        let graph = PaymentGraph::from_queue2(&state, &BTreeSet::new());
        assert!(graph.find_cycles(3).is_empty());
        assert_eq!(graph.find_cycles(4).len(), 1);
    }

    #[test]
    fn test_excluded_transactions_invisible() {
        let mut state = three_agent_state();
        queue_tx(&mut state, "tx-1", "A", "B", 300);
        queue_tx(&mut state, "tx-2", "B", "C", 400);
        queue_tx(&mut state, "tx-3", "C", "A", 500);

        let exclude: BTreeSet<String> = ["tx-2".to_string()].into_iter().collect();
        let graph = PaymentGraph::from_queue2(&state, &exclude);
        assert!(graph.find_cycles(4).is_empty());
    }

    #[test]
    fn test_parallel_edges_yield_distinct_cycles() {
        let mut state = three_agent_state();
        queue_tx(&mut state, "tx-1", "A", "B", 300);
        queue_tx(&mut state, "tx-1b", "A", "B", 350);
        queue_tx(&mut state, "tx-2", "B", "C", 400);
        queue_tx(&mut state, "tx-3", "C", "A", 500);

        let graph = PaymentGraph::from_queue2(&state, &BTreeSet::new());
        let cycles = graph.find_cycles(4);

        // One cycle per A→B leg choice
        assert_eq!(cycles.len(), 2);
        assert!(cycles.iter().all(|c| c.len() == 3));
    }
}
