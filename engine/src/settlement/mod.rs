//! Settlement engines (RTGS and LSM)
//!
//! # Critical invariants
//!
//! 1. Atomicity: every settlement primitive is all-or-nothing
//! 2. Balance conservation: total system balance never changes
//! 3. Overdraft floor: no agent ends a settlement below
//!    `−allowed_overdraft_limit`
//! 4. At most one successful settlement per transaction ID

pub mod lsm;
pub mod rtgs;

pub use rtgs::{settle, sweep_queue2, SettledLeg, SettlementError, SweepResult};
