//! RTGS settlement engine with liquidity-saving mechanisms
//!
//! A deterministic discrete-event simulator of a Real-Time Gross
//! Settlement network: per-agent payment queues, a central RTGS queue,
//! bilateral/multilateral offset resolution, collateralized credit,
//! deadline-bound payments, per-agent decision policies, and exact
//! per-agent cost accounting over many simulated days.
//!
//! # Architecture
//!
//! - **core**: time management
//! - **rng**: deterministic per-agent random streams
//! - **models**: domain types (Agent, Transaction, CollateralLot, Event,
//!   SimulationState)
//! - **arrivals**: deterministic transaction generation
//! - **policy**: the release-decision ABI, built-ins, and the JSON tree DSL
//! - **settlement**: RTGS primitives and the LSM resolver
//! - **costs**: rates and per-agent ledgers
//! - **scenario**: scheduled scenario events
//! - **orchestrator**: the [`Engine`] tick loop and query API
//!
//! # Critical invariants
//!
//! 1. All money values are i64 (cents); no floats touch balances
//! 2. All randomness is seeded and per-agent (exact replay)
//! 3. Every tick emits a totally ordered event stream; same config and
//!    seed ⇒ byte-identical events

// Module declarations
pub mod arrivals;
pub mod core;
pub mod costs;
pub mod models;
pub mod orchestrator;
pub mod policy;
pub mod rng;
pub mod scenario;
pub mod settlement;

// Re-exports for convenience
pub use crate::core::time::TimeManager;
pub use costs::{CostBreakdown, CostLedger, CostRates};
pub use models::{
    agent::{Agent, AgentError},
    collateral::CollateralLot,
    event::{Event, EventKind, EventLog},
    state::SimulationState,
    transaction::{Transaction, TransactionError, TransactionStatus},
};
pub use orchestrator::{
    AgentConfig, CollateralConfig, CollateralLotConfig, ConfigError, Engine, EngineConfig,
    EngineError, PolicyConfig, SimulationParams, SystemMetrics, TickSummary,
};
pub use policy::{Decision, Policy, PolicyToggles};
pub use rng::RngManager;
pub use settlement::lsm::LsmConfig;
pub use settlement::{settle, SettlementError};
