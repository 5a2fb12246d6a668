//! Event logging for simulation replay and auditing
//!
//! Every observable state change is recorded as an immutable
//! `Event { tick, seq, kind }`. `seq` is a per-tick monotonic counter, so
//! `(tick, seq)` totally orders the log. Events are created once, never
//! mutated, never deleted; they are the sole coordination signal for
//! external observers, and replaying the stream reconstructs every
//! user-visible state.

use crate::costs::CostBreakdown;
use std::collections::BTreeMap;

/// What happened, with its payload
#[derive(Debug, Clone, PartialEq)]
pub enum EventKind {
    /// New transaction entered the sender's Queue 1
    Arrival {
        tx_id: String,
        sender_id: String,
        receiver_id: String,
        amount: i64,
        priority: u8,
        deadline_tick: usize,
        divisible: bool,
    },

    /// Policy returned a decision for a Queue 1 transaction
    PolicyDecision {
        agent_id: String,
        tx_id: String,
        action: String,
    },

    /// Transaction left Queue 1 for the RTGS path
    Queue1Release { agent_id: String, tx_id: String },

    /// Released transaction settled immediately
    RtgsImmediateSettlement {
        tx_id: String,
        sender_id: String,
        receiver_id: String,
        amount: i64,
    },

    /// Released transaction failed the liquidity check and entered Queue 2
    Queue2Hold {
        tx_id: String,
        sender_id: String,
        position: usize,
    },

    /// Queued transaction settled during the Queue 2 sweep
    Queue2Release {
        tx_id: String,
        sender_id: String,
        receiver_id: String,
        amount: i64,
    },

    /// A mutual pair settled atomically against net positions
    LsmBilateralOffset {
        agent_a: String,
        agent_b: String,
        tx_id_a: String,
        tx_id_b: String,
        amount_a: i64,
        amount_b: i64,
    },

    /// A multilateral cycle settled atomically against net positions
    LsmCycleSettlement {
        /// Agents in cycle order (first repeated at the end)
        agents: Vec<String>,
        /// Settled legs in cycle order
        tx_ids: Vec<String>,
        /// Gross value of all legs
        total_value: i64,
        /// Largest net outflow any participant covered
        max_net_outflow: i64,
    },

    /// Divisible transaction replaced by children
    Split {
        agent_id: String,
        parent_tx_id: String,
        child_ids: Vec<String>,
        num_parts: usize,
    },

    /// Collateral lot posted
    CollateralPosted {
        agent_id: String,
        lot_id: String,
        face_value: i64,
        haircut: f64,
    },

    /// Collateral withdrawn (possibly partially) from a lot
    CollateralWithdrawn {
        agent_id: String,
        lot_id: String,
        amount: i64,
        remaining_face_value: i64,
    },

    /// Costs accrued for an agent this tick
    CostAccrual {
        agent_id: String,
        costs: CostBreakdown,
    },

    /// Transaction first observed past its deadline, still unsettled
    DeadlineViolation {
        tx_id: String,
        agent_id: String,
        deadline_tick: usize,
    },

    /// Transaction remains overdue on a later tick
    Overdue {
        tx_id: String,
        agent_id: String,
        ticks_overdue: usize,
    },

    /// Scheduled scenario event fired
    ScenarioEventExecuted {
        kind: String,
        /// Before/after values and parameters, keyed deterministically
        details: BTreeMap<String, String>,
    },

    /// End-of-day bookkeeping
    EndOfDay {
        day: usize,
        unsettled_count: usize,
        settled_today: usize,
        total_cost_today: i64,
    },
}

impl EventKind {
    /// Short name of the event kind
    pub fn name(&self) -> &'static str {
        match self {
            EventKind::Arrival { .. } => "Arrival",
            EventKind::PolicyDecision { .. } => "PolicyDecision",
            EventKind::Queue1Release { .. } => "Queue1Release",
            EventKind::RtgsImmediateSettlement { .. } => "RtgsImmediateSettlement",
            EventKind::Queue2Hold { .. } => "Queue2Hold",
            EventKind::Queue2Release { .. } => "Queue2Release",
            EventKind::LsmBilateralOffset { .. } => "LsmBilateralOffset",
            EventKind::LsmCycleSettlement { .. } => "LsmCycleSettlement",
            EventKind::Split { .. } => "Split",
            EventKind::CollateralPosted { .. } => "CollateralPosted",
            EventKind::CollateralWithdrawn { .. } => "CollateralWithdrawn",
            EventKind::CostAccrual { .. } => "CostAccrual",
            EventKind::DeadlineViolation { .. } => "DeadlineViolation",
            EventKind::Overdue { .. } => "Overdue",
            EventKind::ScenarioEventExecuted { .. } => "ScenarioEventExecuted",
            EventKind::EndOfDay { .. } => "EndOfDay",
        }
    }

    /// Transaction ID if the event concerns a single transaction
    pub fn tx_id(&self) -> Option<&str> {
        match self {
            EventKind::Arrival { tx_id, .. }
            | EventKind::PolicyDecision { tx_id, .. }
            | EventKind::Queue1Release { tx_id, .. }
            | EventKind::RtgsImmediateSettlement { tx_id, .. }
            | EventKind::Queue2Hold { tx_id, .. }
            | EventKind::Queue2Release { tx_id, .. }
            | EventKind::DeadlineViolation { tx_id, .. }
            | EventKind::Overdue { tx_id, .. } => Some(tx_id),
            EventKind::Split { parent_tx_id, .. } => Some(parent_tx_id),
            _ => None,
        }
    }

    /// Agent ID if the event concerns a single agent
    pub fn agent_id(&self) -> Option<&str> {
        match self {
            EventKind::Arrival { sender_id, .. }
            | EventKind::RtgsImmediateSettlement { sender_id, .. }
            | EventKind::Queue2Hold { sender_id, .. }
            | EventKind::Queue2Release { sender_id, .. } => Some(sender_id),
            EventKind::PolicyDecision { agent_id, .. }
            | EventKind::Queue1Release { agent_id, .. }
            | EventKind::Split { agent_id, .. }
            | EventKind::CollateralPosted { agent_id, .. }
            | EventKind::CollateralWithdrawn { agent_id, .. }
            | EventKind::CostAccrual { agent_id, .. }
            | EventKind::DeadlineViolation { agent_id, .. }
            | EventKind::Overdue { agent_id, .. } => Some(agent_id),
            _ => None,
        }
    }

    /// True for the kinds that record a transaction settling
    pub fn is_settlement(&self) -> bool {
        matches!(
            self,
            EventKind::RtgsImmediateSettlement { .. }
                | EventKind::Queue2Release { .. }
                | EventKind::LsmBilateralOffset { .. }
                | EventKind::LsmCycleSettlement { .. }
        )
    }
}

/// An immutable log record
#[derive(Debug, Clone, PartialEq)]
pub struct Event {
    /// Tick at which the event occurred
    pub tick: usize,

    /// Per-tick monotonic sequence number
    pub seq: usize,

    /// Kind and payload
    pub kind: EventKind,
}

/// Append-only, totally ordered event log
///
/// Ticks are appended monotonically, so per-tick ranges are resolved with
/// binary search rather than a scan.
#[derive(Debug, Clone, Default)]
pub struct EventLog {
    events: Vec<Event>,
    /// Tick of the last appended event (seq counter scope)
    last_tick: Option<usize>,
    /// Next seq within `last_tick`
    next_seq: usize,
}

impl EventLog {
    /// Create a new empty log
    pub fn new() -> Self {
        Self::default()
    }

    /// Append an event at `tick`, assigning the next per-tick seq
    ///
    /// # Panics
    /// Panics if `tick` regresses; the orchestrator only appends at the
    /// current tick.
    pub fn record(&mut self, tick: usize, kind: EventKind) {
        if self.last_tick != Some(tick) {
            assert!(
                self.last_tick.map_or(true, |t| tick > t),
                "event log tick regressed"
            );
            self.last_tick = Some(tick);
            self.next_seq = 0;
        }
        self.events.push(Event {
            tick,
            seq: self.next_seq,
            kind,
        });
        self.next_seq += 1;
    }

    /// Number of events logged
    pub fn len(&self) -> usize {
        self.events.len()
    }

    /// Check if the log is empty
    pub fn is_empty(&self) -> bool {
        self.events.is_empty()
    }

    /// All events in order
    pub fn events(&self) -> &[Event] {
        &self.events
    }

    /// Events for a specific tick, in seq order
    pub fn events_at_tick(&self, tick: usize) -> &[Event] {
        let start = self.events.partition_point(|e| e.tick < tick);
        let end = self.events.partition_point(|e| e.tick <= tick);
        &self.events[start..end]
    }

    /// Point query by (tick, seq)
    pub fn event_at(&self, tick: usize, seq: usize) -> Option<&Event> {
        self.events_at_tick(tick).get(seq)
    }

    /// Events that concern a specific transaction
    pub fn events_for_tx(&self, tx_id: &str) -> Vec<&Event> {
        self.events
            .iter()
            .filter(|e| e.kind.tx_id() == Some(tx_id) || Self::mentions_tx(&e.kind, tx_id))
            .collect()
    }

    /// Events that concern a specific agent
    pub fn events_for_agent(&self, agent_id: &str) -> Vec<&Event> {
        self.events
            .iter()
            .filter(|e| e.kind.agent_id() == Some(agent_id))
            .collect()
    }

    /// Events of a specific kind name
    pub fn events_of_kind(&self, name: &str) -> Vec<&Event> {
        self.events.iter().filter(|e| e.kind.name() == name).collect()
    }

    fn mentions_tx(kind: &EventKind, tx_id: &str) -> bool {
        match kind {
            EventKind::LsmBilateralOffset { tx_id_a, tx_id_b, .. } => {
                tx_id_a == tx_id || tx_id_b == tx_id
            }
            EventKind::LsmCycleSettlement { tx_ids, .. } => {
                tx_ids.iter().any(|id| id == tx_id)
            }
            EventKind::Split { child_ids, .. } => child_ids.iter().any(|id| id == tx_id),
            _ => false,
        }
    }
}
