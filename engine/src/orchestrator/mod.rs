//! Orchestrator - the engine's tick loop and query surface
//!
//! `config` holds the full configuration surface and its fatal load-time
//! validation; `engine` drives the ten-phase tick loop and owns all
//! mutable state.

pub mod config;
pub mod engine;

pub use config::{
    AgentConfig, CollateralConfig, CollateralLotConfig, ConfigError, EngineConfig, PolicyConfig,
    SimulationParams,
};
pub use engine::{AgentStateSnapshot, Engine, EngineError, SystemMetrics, TickSummary};
