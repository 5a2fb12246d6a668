//! Deterministic random number generation
//!
//! Uses the xorshift64* algorithm for fast, deterministic random number
//! generation. All randomness in the simulator MUST go through this module.
//!
//! Each agent draws from its own stream, seeded by hashing
//! `(global_seed, agent_id)`. Streams are independent: reordering agent
//! iteration cannot change any individual agent's draws.

mod xorshift;

pub use xorshift::RngManager;

use sha2::{Digest, Sha256};

/// Derive a per-agent stream seed from the global seed and a stable ID.
///
/// SHA-256 over `global_seed || agent_id` collapsed to the first 8 bytes.
/// Deterministic across platforms and runs.
///
/// # Example
/// ```
/// use rtgs_engine_rs::rng::stream_seed;
///
/// let a = stream_seed(42, "BANK_A");
/// let b = stream_seed(42, "BANK_B");
/// assert_ne!(a, b);
/// assert_eq!(a, stream_seed(42, "BANK_A"));
/// ```
pub fn stream_seed(global_seed: u64, agent_id: &str) -> u64 {
    let mut hasher = Sha256::new();
    hasher.update(global_seed.to_le_bytes());
    hasher.update(agent_id.as_bytes());
    let digest = hasher.finalize();
    let mut bytes = [0u8; 8];
    bytes.copy_from_slice(&digest[..8]);
    u64::from_le_bytes(bytes)
}
