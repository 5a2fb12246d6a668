//! Time management for the simulation
//!
//! The simulation operates in discrete ticks. Multiple ticks form a day,
//! and the simulation runs for a fixed horizon of `ticks_per_day × num_days`
//! ticks. This module provides deterministic time advancement.

use serde::{Deserialize, Serialize};

/// Manages simulation time in discrete ticks and days
///
/// # Example
/// ```
/// use rtgs_engine_rs::TimeManager;
///
/// let mut time = TimeManager::new(100, 2); // 100 ticks per day, 2 days
/// assert_eq!(time.current_tick(), 0);
/// assert_eq!(time.horizon(), 200);
///
/// time.advance_tick();
/// assert_eq!(time.current_tick(), 1);
/// ```
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TimeManager {
    /// Total ticks elapsed since simulation start
    current_tick: usize,
    /// Number of ticks in one day
    ticks_per_day: usize,
    /// Total ticks in the simulation (`ticks_per_day × num_days`)
    horizon: usize,
}

impl TimeManager {
    /// Create a new TimeManager
    ///
    /// # Panics
    /// Panics if `ticks_per_day` or `num_days` is zero. Config validation
    /// rejects those values before a TimeManager is ever constructed.
    pub fn new(ticks_per_day: usize, num_days: usize) -> Self {
        assert!(ticks_per_day > 0, "ticks_per_day must be positive");
        assert!(num_days > 0, "num_days must be positive");
        Self {
            current_tick: 0,
            ticks_per_day,
            horizon: ticks_per_day * num_days,
        }
    }

    /// Advance time by one tick
    pub fn advance_tick(&mut self) {
        self.current_tick += 1;
    }

    /// Get the current tick (total ticks since start)
    pub fn current_tick(&self) -> usize {
        self.current_tick
    }

    /// Get the current day (0-indexed)
    pub fn current_day(&self) -> usize {
        self.current_tick / self.ticks_per_day
    }

    /// Get the tick within the current day (0-indexed)
    pub fn tick_within_day(&self) -> usize {
        self.current_tick % self.ticks_per_day
    }

    /// Check if current tick is the last tick of the day
    ///
    /// # Example
    /// ```
    /// use rtgs_engine_rs::TimeManager;
    ///
    /// let mut time = TimeManager::new(100, 1);
    /// for _ in 0..99 {
    ///     time.advance_tick();
    /// }
    /// assert!(time.is_end_of_day());
    /// ```
    pub fn is_end_of_day(&self) -> bool {
        self.tick_within_day() == self.ticks_per_day - 1
    }

    /// Get ticks per day
    pub fn ticks_per_day(&self) -> usize {
        self.ticks_per_day
    }

    /// Total ticks in the simulation
    pub fn horizon(&self) -> usize {
        self.horizon
    }

    /// Check if the simulation has run its full horizon
    pub fn is_finished(&self) -> bool {
        self.current_tick >= self.horizon
    }
}
