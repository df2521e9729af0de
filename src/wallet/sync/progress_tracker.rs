//! Progress tracking for rescans.
//!
//! This module provides the `RescanProgressTracker`, which turns the engine's "scanned through
//! height" ticks into a running total of scanned heights. The total is the sum of per-tick
//! deltas, so it only ever grows; ticks that do not advance past the highest height seen so far
//! are logged and contribute nothing.

use tracing::{info, warn};

/// Heights between periodic progress log lines
const LOG_INTERVAL: i32 = 1000;

/// Tracks progress of a single rescan session
#[derive(Debug, Clone)]
pub struct RescanProgressTracker {
    /// Height the rescan started from
    start_height: i32,
    /// Highest height reported scanned so far
    scanned_through: i32,
    /// Running total of scanned heights
    total_scanned: i32,
    /// Number of ticks received
    ticks: usize,
    /// Height at which progress was last logged
    last_logged_height: i32,
}

impl RescanProgressTracker {
    /// Create a new tracker for a rescan starting at `start_height`.
    pub fn new(start_height: i32) -> Self {
        // Nothing below the start height counts as scanned by this session.
        let before_start = start_height.saturating_sub(1);
        Self {
            start_height,
            scanned_through: before_start,
            total_scanned: 0,
            ticks: 0,
            last_logged_height: before_start,
        }
    }

    /// Record a progress tick, returning the number of heights it added to the total.
    pub fn record_tick(&mut self, scanned_through: i32) -> i32 {
        self.ticks += 1;

        if scanned_through <= self.scanned_through {
            warn!(
                "Rescan progress did not advance: {} after {}",
                scanned_through, self.scanned_through
            );
            return 0;
        }

        let delta = scanned_through - self.scanned_through;
        self.scanned_through = scanned_through;
        self.total_scanned = self.total_scanned.saturating_add(delta);
        delta
    }

    pub fn total_scanned(&self) -> i32 {
        self.total_scanned
    }

    pub fn scanned_through(&self) -> i32 {
        self.scanned_through
    }

    /// Log progress at regular intervals or when forced
    pub fn log_progress(&mut self, force: bool) {
        let heights_since_last_log = self.scanned_through.saturating_sub(self.last_logged_height);
        if force || heights_since_last_log >= LOG_INTERVAL {
            info!(
                "Rescan progress: scanned through {} ({} heights in {} ticks)",
                self.scanned_through, self.total_scanned, self.ticks
            );
            self.last_logged_height = self.scanned_through;
        }
    }

    /// Get rescan statistics
    pub fn get_stats(&self) -> RescanStats {
        RescanStats {
            start_height: self.start_height,
            scanned_through: self.scanned_through,
            total_scanned: self.total_scanned,
            ticks: self.ticks,
        }
    }
}

/// Statistics about a rescan session
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RescanStats {
    pub start_height: i32,
    pub scanned_through: i32,
    pub total_scanned: i32,
    pub ticks: usize,
}

impl RescanStats {
    /// Get a human-readable summary of the rescan statistics
    pub fn summary(&self) -> String {
        format!(
            "Rescan from {} through {}: {} heights in {} ticks",
            self.start_height, self.scanned_through, self.total_scanned, self.ticks
        )
    }
}
