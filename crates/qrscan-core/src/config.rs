// SPDX-License-Identifier: PMPL-1.0-or-later
// Copyright (c) 2026 Jonathan D.A. Jewell (hyperpolymath) <jonathan.jewell@open.ac.uk>
//
// Scan configuration.

use std::time::Duration;

use serde::{Deserialize, Serialize};

/// Tunables for the classification heuristic, progress retention, and
/// consumer-side following. Persisted as JSON; missing fields take defaults.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ScanConfig {
    /// How long a terminal session snapshot stays queryable.
    pub grace_period_ms: u64,
    /// Lower bound of width/height for an image to count as square-like.
    pub square_ratio_min: f32,
    /// Upper bound of width/height for an image to count as square-like.
    pub square_ratio_max: f32,
    /// Diagonal offset (pixels) of the outer contrast sample points.
    pub sample_offset: u32,
    /// Luminance below this is "extreme" dark.
    pub dark_luma: f32,
    /// Luminance above this is "extreme" light.
    pub light_luma: f32,
    /// Extreme samples (out of three) needed to call an undecodable square QR-like.
    pub min_extreme_samples: usize,
    /// Interval between `get` polls while following an id not yet produced.
    pub poll_interval_ms: u64,
    /// Give up following an id that never appears after this long.
    pub follow_timeout_ms: u64,
    /// Per-session broadcast buffer; slower subscribers lose older events.
    pub event_capacity: usize,
    /// Extra attempts for a failed record write before it is dropped.
    pub store_write_retries: u32,
}

impl ScanConfig {
    pub fn grace_period(&self) -> Duration {
        Duration::from_millis(self.grace_period_ms)
    }

    pub fn poll_interval(&self) -> Duration {
        Duration::from_millis(self.poll_interval_ms)
    }

    pub fn follow_timeout(&self) -> Duration {
        Duration::from_millis(self.follow_timeout_ms)
    }
}

impl Default for ScanConfig {
    fn default() -> Self {
        Self {
            grace_period_ms: 5_000,
            square_ratio_min: 0.9,
            square_ratio_max: 1.1,
            sample_offset: 10,
            dark_luma: 50.0,
            light_luma: 200.0,
            min_extreme_samples: 2,
            poll_interval_ms: 1_000,
            follow_timeout_ms: 8_000,
            event_capacity: 256,
            store_write_retries: 1,
        }
    }
}
