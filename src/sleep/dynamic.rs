//! Error-rate driven sleep adjustment
//!
//! Each thread counts the outcomes of its exchanges. Once enough have been
//! seen and the share of errors is above a sample-size dependent threshold,
//! the adjustment factor applied to every sleep grows by
//! [`ADJUSTMENT_INCREMENT`], up to `MAX_ADJUSTED_SLEEP_FACTOR / global
//! multiplier factor`. It never shrinks on its own; only
//! [`ErrorRateMonitor::reset`] brings it back to 1.0.

use crate::types::{StatusClass, StatusCode};
use serde::Serialize;
use tracing::{debug, warn};

/// Observations needed before the error rate is evaluated.
pub const MIN_SAMPLE_SIZE: u32 = 3;

pub const ADJUSTMENT_INCREMENT: f64 = 0.5;

/// Ceiling on the product of adjustment factor and global multiplier factor.
pub const MAX_ADJUSTED_SLEEP_FACTOR: f64 = 3.0;

/// Per-thread error counters and the resulting adjustment factor.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ErrorStats {
    pub ok_count: u32,
    pub error_count: u32,
    pub other_count: u32,
    pub adjustment_count: u32,
    /// Times an increase was due but refused by the ceiling.
    pub max_adjustment_count_reached: u32,
    pub current_adjustment_factor: f64,
    /// Replaces the global multiplier factor for this thread.
    pub sleep_multiplier_factor_override: Option<f64>,
}

impl Default for ErrorStats {
    fn default() -> Self {
        Self {
            ok_count: 0,
            error_count: 0,
            other_count: 0,
            adjustment_count: 0,
            max_adjustment_count_reached: 0,
            current_adjustment_factor: 1.0,
            sleep_multiplier_factor_override: None,
        }
    }
}

/// Error-rate threshold for a sample of `n` observations, `None` while the
/// sample is too small to judge.
pub fn error_rate_threshold(n: u32) -> Option<f64> {
    match n {
        n if n <= MIN_SAMPLE_SIZE => None,
        4 => Some(0.5),
        5..=10 => Some(0.3),
        _ => Some(0.1),
    }
}

#[derive(Debug, Clone, Default)]
pub struct ErrorRateMonitor {
    stats: ErrorStats,
}

impl ErrorRateMonitor {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn stats(&self) -> &ErrorStats {
        &self.stats
    }

    pub fn current_factor(&self) -> f64 {
        self.stats.current_adjustment_factor
    }

    pub fn record_status(&mut self, code: StatusCode) {
        match code.class() {
            StatusClass::Ok => self.stats.ok_count += 1,
            StatusClass::Error => self.stats.error_count += 1,
            StatusClass::Other => self.stats.other_count += 1,
        }
    }

    /// Re-evaluates the error rate and returns the adjustment factor to apply.
    ///
    /// Returns 1.0 without touching any state while `enabled` is false.
    pub fn adjustment_factor(&mut self, enabled: bool, global_factor: f64) -> f64 {
        if !enabled {
            return 1.0;
        }

        let stats = &mut self.stats;
        let n = stats.ok_count + stats.error_count;
        let Some(threshold) = error_rate_threshold(n) else {
            return stats.current_adjustment_factor;
        };

        let error_rate = f64::from(stats.error_count) / f64::from(n);
        if error_rate <= threshold {
            return stats.current_adjustment_factor;
        }

        let proposed = stats.current_adjustment_factor + ADJUSTMENT_INCREMENT;
        let ceiling = MAX_ADJUSTED_SLEEP_FACTOR / global_factor;
        if proposed <= ceiling {
            stats.current_adjustment_factor = proposed;
            stats.adjustment_count += 1;
            stats.ok_count = 0;
            stats.error_count = 0;
            debug!(n, error_rate, threshold, factor = proposed, "Raised sleep adjustment factor");
        } else {
            stats.max_adjustment_count_reached += 1;
            warn!(
                n,
                error_rate,
                factor = stats.current_adjustment_factor,
                ceiling,
                "Sleep adjustment factor at ceiling"
            );
        }
        stats.current_adjustment_factor
    }

    /// Clears the counters and returns the factor to 1.0, keeping any
    /// multiplier override.
    pub fn reset(&mut self) {
        self.stats = ErrorStats {
            sleep_multiplier_factor_override: self.stats.sleep_multiplier_factor_override,
            ..ErrorStats::default()
        };
    }

    pub(crate) fn set_multiplier_factor_override(&mut self, factor: Option<f64>) {
        self.stats.sleep_multiplier_factor_override = factor;
    }
}
