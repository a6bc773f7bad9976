//! Per-thread state
//!
//! Everything that adapts to one thread's view of the bus lives in a
//! [`ThreadContext`]: the sleep multiplier count raised by retries, the
//! error-rate monitor and the max-tries overrides. A context is created by
//! the thread that uses it and passed by `&mut` into every session and
//! scheduler call. It is neither `Send` nor `Sync`, so another thread can
//! never observe or change it.

use crate::error::{DdcError, Result};
use crate::retry::validate_max_tries;
use crate::sleep::{ErrorRateMonitor, ErrorStats, validate_multiplier_factor};
use crate::types::RetryClass;
use serde::Serialize;
use std::marker::PhantomData;
use tracing::debug;

/// Upper bound (exclusive) for the sleep multiplier count.
pub const MAX_SLEEP_MULTIPLIER_COUNT: u16 = 100;

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct PerThreadSleepState {
    pub sleep_multiplier_count: u16,
    pub max_sleep_multiplier_count_seen: u16,
    pub multiplier_changed_count: u32,
}

impl Default for PerThreadSleepState {
    fn default() -> Self {
        Self {
            sleep_multiplier_count: 1,
            max_sleep_multiplier_count_seen: 1,
            multiplier_changed_count: 0,
        }
    }
}

/// Copy of a thread's sleep and error-rate state for diagnostics.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ThreadSleepSnapshot {
    pub sleep: PerThreadSleepState,
    pub error_stats: ErrorStats,
    pub max_tries_overrides: Vec<(RetryClass, u16)>,
}

#[derive(Debug, Default)]
pub struct ThreadContext {
    sleep: PerThreadSleepState,
    monitor: ErrorRateMonitor,
    max_tries: [Option<u16>; RetryClass::ALL.len()],
    _not_send: PhantomData<*const ()>,
}

impl ThreadContext {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn sleep_state(&self) -> &PerThreadSleepState {
        &self.sleep
    }

    pub fn sleep_multiplier_count(&self) -> u16 {
        self.sleep.sleep_multiplier_count
    }

    pub fn set_sleep_multiplier_count(&mut self, count: u16) -> Result<()> {
        if !(1..MAX_SLEEP_MULTIPLIER_COUNT).contains(&count) {
            return Err(DdcError::config(format!(
                "sleep multiplier count {count} outside 1..{MAX_SLEEP_MULTIPLIER_COUNT}"
            )));
        }
        self.put_sleep_multiplier_count(count);
        Ok(())
    }

    /// Sets the multiplier count, clamped into range. Used by the retry
    /// loop, which raises the count and later restores it.
    pub(crate) fn put_sleep_multiplier_count(&mut self, count: u16) {
        let count = count.clamp(1, MAX_SLEEP_MULTIPLIER_COUNT - 1);
        let sleep = &mut self.sleep;
        if sleep.sleep_multiplier_count != count {
            debug!(from = sleep.sleep_multiplier_count, to = count, "Sleep multiplier count changed");
            sleep.sleep_multiplier_count = count;
            sleep.multiplier_changed_count += 1;
            sleep.max_sleep_multiplier_count_seen = sleep.max_sleep_multiplier_count_seen.max(count);
        }
    }

    pub fn error_monitor(&self) -> &ErrorRateMonitor {
        &self.monitor
    }

    pub fn error_monitor_mut(&mut self) -> &mut ErrorRateMonitor {
        &mut self.monitor
    }

    /// Replaces the global sleep multiplier factor for this thread only.
    pub fn set_sleep_multiplier_factor_override(&mut self, factor: Option<f64>) -> Result<()> {
        let factor = factor.map(validate_multiplier_factor).transpose()?;
        self.monitor.set_multiplier_factor_override(factor);
        Ok(())
    }

    pub fn max_tries_override(&self, class: RetryClass) -> Option<u16> {
        self.max_tries[class.ordinal()]
    }

    /// Sets this thread's max tries for `class`; `None` falls back to the
    /// process-wide default.
    pub fn set_max_tries_override(&mut self, class: RetryClass, tries: Option<u16>) -> Result<()> {
        self.max_tries[class.ordinal()] = tries.map(validate_max_tries).transpose()?;
        Ok(())
    }

    pub fn snapshot(&self) -> ThreadSleepSnapshot {
        ThreadSleepSnapshot {
            sleep: self.sleep.clone(),
            error_stats: self.monitor.stats().clone(),
            max_tries_overrides: RetryClass::ALL
                .iter()
                .filter_map(|&class| self.max_tries_override(class).map(|tries| (class, tries)))
                .collect(),
        }
    }
}
