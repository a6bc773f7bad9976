//! Display references
//!
//! A [`DisplayRef`] names one display and carries the `deferred_until`
//! deadline used by deferred sleep scheduling. The deadline sits behind a
//! mutex, so a reference can be shared between threads even though
//! exchanges with one display are expected to stay on one thread.

use crate::sync::lock;
use crate::types::IoMode;
use std::sync::Mutex;
use std::time::{Duration, Instant};

#[derive(Debug)]
pub struct DisplayRef {
    io_mode: IoMode,
    label: String,
    deferred_until: Mutex<Option<Instant>>,
}

impl DisplayRef {
    pub fn new(io_mode: IoMode, label: impl Into<String>) -> Self {
        Self { io_mode, label: label.into(), deferred_until: Mutex::new(None) }
    }

    /// Display on `/dev/i2c-{bus}`.
    pub fn i2c(bus: u32) -> Self {
        Self::new(IoMode::I2c, format!("i2c-{bus}"))
    }

    pub fn io_mode(&self) -> IoMode {
        self.io_mode
    }

    pub fn label(&self) -> &str {
        &self.label
    }

    /// Earliest time the next I/O on this display may start.
    pub fn deferred_until(&self) -> Option<Instant> {
        *lock(&self.deferred_until)
    }

    /// Moves the deadline to `deadline` unless one later is already set.
    pub fn defer_until(&self, deadline: Instant) {
        let mut current = lock(&self.deferred_until);
        if current.is_none_or(|existing| deadline > existing) {
            *current = Some(deadline);
        }
    }

    /// Clears the deadline, returning the time still left on it.
    pub(crate) fn take_remaining(&self, now: Instant) -> Option<Duration> {
        lock(&self.deferred_until).take().map(|deadline| deadline.saturating_duration_since(now))
    }
}
