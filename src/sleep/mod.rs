//! DDC/CI inter-message delays
//!
//! The protocol has no flow control: the host has to wait between a write
//! and the following read, after a write, after saving settings, and so on.
//! [`SleepScheduler::tuned_sleep`] looks up the mandated delay for a
//! [`SleepEvent`] and scales it:
//!
//! ```text
//! effective = base × thread multiplier count × multiplier factor × adjustment
//! ```
//!
//! - the multiplier count is raised by the retry loop while an operation
//!   keeps failing
//! - the multiplier factor is global, unless the thread has an override
//! - the adjustment comes from the thread's [`ErrorRateMonitor`]
//!
//! Suppressible events are skipped entirely while the suppression flag is
//! set. Deferrable events do not block: the deadline is stored on the
//! [`DisplayRef`] and [`SleepScheduler::check_deferred_sleep`] waits out
//! whatever is left of it right before the next I/O on that display.

mod dynamic;

pub use dynamic::{
    ADJUSTMENT_INCREMENT, ErrorRateMonitor, ErrorStats, MAX_ADJUSTED_SLEEP_FACTOR,
    MIN_SAMPLE_SIZE, error_rate_threshold,
};

use crate::config::SleepSettings;
use crate::context::ThreadContext;
use crate::display::DisplayRef;
use crate::error::{DdcError, Result};
use crate::stats::StatsSink;
use crate::sync::lock;
use crate::types::{IoMode, SleepEvent};
use std::fmt;
use std::sync::{Arc, Mutex};
use std::time::{Duration, Instant};
use tracing::trace;

/// Default DDC/CI response timeout and inter-message delay.
pub const DDC_TIMEOUT_MILLIS_DEFAULT: u64 = 50;
/// Delay after Save Current Settings.
pub const DDC_TIMEOUT_POST_SAVE_SETTINGS: u64 = 200;
/// Backoff step after a DDC Null Message.
pub const DDC_TIMEOUT_NULL_RESPONSE_INCREMENT: u64 = 100;
/// Delay before the first fragment of a multi-part read. Longer than the
/// protocol asks for; slow displays need it to assemble capabilities.
pub const DDC_TIMEOUT_PRE_MULTI_PART_READ: u64 = 200;

/// Mandated delay for `event` on a display reached through `mode`.
///
/// [`SleepEvent::Special`] has no table entry; its duration is supplied by
/// the caller through [`SleepScheduler::special_sleep`].
pub fn base_sleep(mode: IoMode, event: SleepEvent) -> Duration {
    let millis = match mode {
        IoMode::Usb => 0,
        IoMode::I2c => match event {
            SleepEvent::WriteToRead
            | SleepEvent::PostOpen
            | SleepEvent::PostWrite
            | SleepEvent::PostRead
            | SleepEvent::PostMultiPartRead => DDC_TIMEOUT_MILLIS_DEFAULT,
            SleepEvent::PostSaveSettings => DDC_TIMEOUT_POST_SAVE_SETTINGS,
            SleepEvent::DdcNull => DDC_TIMEOUT_NULL_RESPONSE_INCREMENT,
            SleepEvent::PreMultiPartRead => DDC_TIMEOUT_PRE_MULTI_PART_READ,
            SleepEvent::Special => 0,
        },
    };
    Duration::from_millis(millis)
}

/// Checks a multiplier factor lies in the open range (0, 100).
pub fn validate_multiplier_factor(factor: f64) -> Result<f64> {
    if factor.is_finite() && factor > 0.0 && factor < 100.0 {
        Ok(factor)
    } else {
        Err(DdcError::config(format!("sleep multiplier factor {factor} outside (0, 100)")))
    }
}

/// Blocks the calling thread.
pub trait Sleeper: Send + Sync {
    fn sleep(&self, duration: Duration);
}

/// [`Sleeper`] backed by [`std::thread::sleep`].
#[derive(Debug, Clone, Copy, Default)]
pub struct ThreadSleeper;

impl Sleeper for ThreadSleeper {
    fn sleep(&self, duration: Duration) {
        if !duration.is_zero() {
            std::thread::sleep(duration);
        }
    }
}

/// What [`SleepScheduler::tuned_sleep`] did.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SleepAction {
    /// Blocked for this long (zero for USB displays).
    Slept(Duration),
    /// Deadline stored on the display, nothing blocked.
    Deferred { until: Instant, duration: Duration },
    Suppressed,
}

/// Computes and performs protocol delays.
pub struct SleepScheduler {
    multiplier_factor: Mutex<f64>,
    suppress_optional: Mutex<bool>,
    deferred_enabled: Mutex<bool>,
    dynamic_adjustment: Mutex<bool>,
    stats: Arc<dyn StatsSink>,
    sleeper: Arc<dyn Sleeper>,
}

impl fmt::Debug for SleepScheduler {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SleepScheduler")
            .field("multiplier_factor", &self.multiplier_factor())
            .field("suppress_optional", &self.suppress_optional())
            .field("deferred_enabled", &self.deferred_enabled())
            .field("dynamic_adjustment", &self.dynamic_adjustment_enabled())
            .finish_non_exhaustive()
    }
}

impl SleepScheduler {
    pub fn new(
        settings: &SleepSettings,
        stats: Arc<dyn StatsSink>,
        sleeper: Arc<dyn Sleeper>,
    ) -> Result<Self> {
        let factor = validate_multiplier_factor(settings.multiplier_factor)?;
        Ok(Self {
            multiplier_factor: Mutex::new(factor),
            suppress_optional: Mutex::new(settings.suppress_optional),
            deferred_enabled: Mutex::new(settings.deferred),
            dynamic_adjustment: Mutex::new(settings.dynamic_adjustment),
            stats,
            sleeper,
        })
    }

    pub fn multiplier_factor(&self) -> f64 {
        *lock(&self.multiplier_factor)
    }

    pub fn set_multiplier_factor(&self, factor: f64) -> Result<()> {
        *lock(&self.multiplier_factor) = validate_multiplier_factor(factor)?;
        Ok(())
    }

    pub fn suppress_optional(&self) -> bool {
        *lock(&self.suppress_optional)
    }

    pub fn set_suppress_optional(&self, suppress: bool) {
        *lock(&self.suppress_optional) = suppress;
    }

    pub fn deferred_enabled(&self) -> bool {
        *lock(&self.deferred_enabled)
    }

    pub fn set_deferred_enabled(&self, enabled: bool) {
        *lock(&self.deferred_enabled) = enabled;
    }

    pub fn dynamic_adjustment_enabled(&self) -> bool {
        *lock(&self.dynamic_adjustment)
    }

    pub fn set_dynamic_adjustment(&self, enabled: bool) {
        *lock(&self.dynamic_adjustment) = enabled;
    }

    /// Takes the delay mandated for `event` on `display`.
    pub fn tuned_sleep(
        &self,
        ctx: &mut ThreadContext,
        display: &DisplayRef,
        event: SleepEvent,
    ) -> SleepAction {
        self.sleep_for_event(ctx, display, event, base_sleep(display.io_mode(), event))
    }

    /// Sleeps for a caller-supplied base duration, scaled like any other event.
    pub fn special_sleep(
        &self,
        ctx: &mut ThreadContext,
        display: &DisplayRef,
        base: Duration,
    ) -> SleepAction {
        self.sleep_for_event(ctx, display, SleepEvent::Special, base)
    }

    /// Waits out what is left of a deferred deadline on `display`.
    ///
    /// Returns how long it blocked.
    pub fn check_deferred_sleep(&self, display: &DisplayRef) -> Duration {
        match display.take_remaining(Instant::now()) {
            Some(remaining) if !remaining.is_zero() => {
                let bus = display.label();
                trace!(bus, ?remaining, "Waiting out deferred sleep");
                self.sleeper.sleep(remaining);
                remaining
            }
            _ => Duration::ZERO,
        }
    }

    /// `base` scaled by every multiplier in effect on this thread.
    ///
    /// Evaluating the adjustment factor may raise it, so this takes the
    /// context mutably.
    pub fn adjusted_duration(&self, ctx: &mut ThreadContext, base: Duration) -> Duration {
        let global = self.multiplier_factor();
        let factor = ctx.error_monitor().stats().sleep_multiplier_factor_override.unwrap_or(global);
        let adjustment =
            ctx.error_monitor_mut().adjustment_factor(self.dynamic_adjustment_enabled(), global);
        let scale = f64::from(ctx.sleep_multiplier_count()) * factor * adjustment;
        Duration::from_nanos((base.as_nanos() as f64 * scale).round() as u64)
    }

    fn sleep_for_event(
        &self,
        ctx: &mut ThreadContext,
        display: &DisplayRef,
        event: SleepEvent,
        base: Duration,
    ) -> SleepAction {
        self.stats.record_sleep_event(event);

        let traits = event.traits();
        if traits.suppressible && self.suppress_optional() {
            trace!(event = event.name(), "Sleep suppressed");
            return SleepAction::Suppressed;
        }

        let duration = self.adjusted_duration(ctx, base);
        if traits.deferrable && self.deferred_enabled() && !duration.is_zero() {
            let until = Instant::now() + duration;
            display.defer_until(until);
            let bus = display.label();
            trace!(event = event.name(), ?duration, bus, "Sleep deferred");
            return SleepAction::Deferred { until, duration };
        }

        trace!(event = event.name(), ?duration, "Sleeping");
        self.sleeper.sleep(duration);
        SleepAction::Slept(duration)
    }
}
