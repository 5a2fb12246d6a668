//! Collateral lot model
//!
//! A lot is posted at a tick with a face value and a haircut, and backs
//! the owner's overdraft capacity with `floor(face_value × (1 − haircut))`
//! of secured credit. Lots may carry an auto-withdraw timer; both the
//! timer path and manual withdrawals go through the same guard in the
//! orchestrator.

use serde::{Deserialize, Serialize};

/// A single posted collateral lot
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CollateralLot {
    /// Stable lot identifier
    lot_id: String,

    /// Face value of the lot (i64 cents)
    face_value: i64,

    /// Haircut fraction in [0, 1)
    haircut: f64,

    /// Tick when the lot was posted (minimum-holding timer base)
    posted_tick: usize,

    /// Tick at which an automatic withdrawal is attempted, if any
    auto_withdraw_tick: Option<usize>,
}

impl CollateralLot {
    /// Create a new lot
    ///
    /// # Panics
    /// Panics on non-positive face value or haircut outside [0, 1).
    /// Config validation and the engine API reject both before
    /// construction.
    pub fn new(lot_id: String, face_value: i64, haircut: f64, posted_tick: usize) -> Self {
        assert!(face_value > 0, "face_value must be positive");
        assert!(
            (0.0..1.0).contains(&haircut),
            "haircut must be in [0, 1)"
        );
        Self {
            lot_id,
            face_value,
            haircut,
            posted_tick,
            auto_withdraw_tick: None,
        }
    }

    /// Arm the auto-withdraw timer (builder pattern)
    pub fn with_auto_withdraw_tick(mut self, tick: usize) -> Self {
        self.auto_withdraw_tick = Some(tick);
        self
    }

    /// Get lot ID
    pub fn lot_id(&self) -> &str {
        &self.lot_id
    }

    /// Get face value (i64 cents)
    pub fn face_value(&self) -> i64 {
        self.face_value
    }

    /// Get haircut fraction
    pub fn haircut(&self) -> f64 {
        self.haircut
    }

    /// Get posting tick
    pub fn posted_tick(&self) -> usize {
        self.posted_tick
    }

    /// Get the armed auto-withdraw tick, if any
    pub fn auto_withdraw_tick(&self) -> Option<usize> {
        self.auto_withdraw_tick
    }

    /// Secured value this lot contributes before the book-level floor:
    /// `face_value × (1 − haircut)`
    pub fn secured_value_f64(&self) -> f64 {
        self.face_value as f64 * (1.0 - self.haircut)
    }

    /// Check whether the minimum-holding period has elapsed
    pub fn holding_elapsed(&self, current_tick: usize, min_holding_ticks: usize) -> bool {
        current_tick.saturating_sub(self.posted_tick) >= min_holding_ticks
    }

    /// Reduce the face value by `amount`
    ///
    /// # Panics
    /// Panics if `amount` exceeds the face value; the withdrawal guard
    /// clamps before calling.
    pub fn reduce_face_value(&mut self, amount: i64) {
        assert!(
            amount > 0 && amount <= self.face_value,
            "withdrawal must be within face value"
        );
        self.face_value -= amount;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_secured_value_applies_haircut() {
        let lot = CollateralLot::new("lot-1".to_string(), 100_000, 0.02, 0);
        assert_eq!(lot.secured_value_f64(), 98_000.0);
    }

    #[test]
    fn test_holding_elapsed() {
        let lot = CollateralLot::new("lot-1".to_string(), 100_000, 0.0, 10);
        assert!(!lot.holding_elapsed(12, 5));
        assert!(lot.holding_elapsed(15, 5));
    }

    #[test]
    #[should_panic(expected = "haircut must be in [0, 1)")]
    fn test_full_haircut_rejected() {
        CollateralLot::new("lot-1".to_string(), 100_000, 1.0, 0);
    }

    #[test]
    fn test_reduce_face_value() {
        let mut lot = CollateralLot::new("lot-1".to_string(), 100_000, 0.0, 0);
        lot.reduce_face_value(40_000);
        assert_eq!(lot.face_value(), 60_000);
    }
}
