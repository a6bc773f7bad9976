//! DDC/CI packet codec with adaptive bus timing and retry management.
//!
//! `ddclink` covers the part of monitor control that sits between a raw I2C
//! channel and a feature-level API:
//!
//! - **Packets**: building host requests and validating display replies,
//!   including the protocol's altmode checksum and multi-part fragments
//! - **Timing**: the mandatory delays between bus operations, scaled per
//!   thread by the observed error rate and optionally deferred
//! - **Retries**: per-class max tries, backoff on DDC Null Messages and
//!   the raised sleep multiplier while an operation keeps failing
//! - **Statistics**: I/O timing, status-code tallies, sleep events and
//!   tries-per-operation histograms
//!
//! The byte transport is supplied by the caller through [`Transport`].
//!
//! # Quick Start
//!
//! ```rust,no_run
//! use ddclink::{Ddc, DdcSettings, DisplayRef, ThreadContext, Transport, TransportError};
//!
//! struct I2cDevice; // wraps /dev/i2c-N
//!
//! impl Transport for I2cDevice {
//!     fn write(&mut self, _addr: u8, bytes: &[u8]) -> Result<usize, TransportError> {
//!         Ok(bytes.len())
//!     }
//!     fn read(&mut self, _addr: u8, _single: bool, count: usize) -> Result<Vec<u8>, TransportError> {
//!         Ok(vec![0; count])
//!     }
//! }
//!
//! fn main() -> anyhow::Result<()> {
//!     ddclink::logging::init_from_env();
//!     let ddc = Ddc::new(&DdcSettings::default())?;
//!     let display = DisplayRef::i2c(4);
//!     let mut ctx = ThreadContext::new();
//!
//!     let mut session = ddc.session(&mut ctx, &display, I2cDevice);
//!     let brightness = session.get_nontable_vcp(0x10)?;
//!     println!("brightness {}/{}", brightness.cur_value, brightness.max_value);
//!     println!("{}", session.get_capabilities()?);
//!     Ok(())
//! }
//! ```

pub mod config;
pub mod context;
pub mod display;
mod error;
pub mod logging;
pub mod packet;
pub mod retry;
pub mod session;
pub mod sleep;
pub mod stats;
mod sync;
#[cfg_attr(any(test, feature = "benchmark"), path = "test_utils.rs")]
#[cfg(any(test, feature = "benchmark"))]
pub mod test_utils;
pub mod transport;
pub mod types;

pub use config::{DdcSettings, MaxTriesSettings, SleepSettings};
pub use context::{PerThreadSleepState, ThreadContext, ThreadSleepSnapshot};
pub use display::DisplayRef;
pub use error::*;
pub use packet::{MultiPartRead, NonTableVcpValue, Packet, PacketKind, ResponseKind};
pub use retry::RetryController;
pub use session::Session;
pub use sleep::{ErrorStats, SleepAction, SleepScheduler, Sleeper, ThreadSleeper};
pub use stats::{ExecutionStats, StatsSink, StatsSnapshot, StatusTally, TryOutcome};
pub use transport::{Transport, TransportError};
pub use types::*;

use serde::Serialize;
use std::sync::Arc;
use tracing::info;

/// Process-wide DDC state: settings, statistics and the sleep scheduler.
///
/// Share one `Ddc` between threads (it is `Sync`); give every thread its
/// own [`ThreadContext`].
pub struct Ddc {
    stats: Arc<dyn StatsSink>,
    scheduler: SleepScheduler,
    retry: RetryController,
}

impl std::fmt::Debug for Ddc {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Ddc")
            .field("scheduler", &self.scheduler)
            .field("retry", &self.retry)
            .finish_non_exhaustive()
    }
}

/// Statistics and one thread's adaptive state, for reporting.
#[derive(Debug, Clone, Serialize)]
pub struct Diagnostics {
    pub stats: StatsSnapshot,
    pub thread: ThreadSleepSnapshot,
    pub multiplier_factor: f64,
}

impl Ddc {
    /// Creates an instance that really sleeps and collects its own statistics.
    pub fn new(settings: &DdcSettings) -> Result<Self> {
        Self::with_parts(settings, Arc::new(ExecutionStats::new()), Arc::new(ThreadSleeper))
    }

    pub fn with_parts(
        settings: &DdcSettings,
        stats: Arc<dyn StatsSink>,
        sleeper: Arc<dyn Sleeper>,
    ) -> Result<Self> {
        settings.validate()?;
        let scheduler = SleepScheduler::new(&settings.sleep, stats.clone(), sleeper)?;
        let retry = RetryController::new(&settings.max_tries)?;
        info!(
            multiplier_factor = settings.sleep.multiplier_factor,
            dynamic_adjustment = settings.sleep.dynamic_adjustment,
            deferred = settings.sleep.deferred,
            "DDC layer initialized"
        );
        Ok(Self { stats, scheduler, retry })
    }

    pub fn stats(&self) -> &dyn StatsSink {
        self.stats.as_ref()
    }

    pub fn scheduler(&self) -> &SleepScheduler {
        &self.scheduler
    }

    pub fn retry(&self) -> &RetryController {
        &self.retry
    }

    /// Opens a session on `display` for the calling thread.
    pub fn session<'a, T: Transport>(
        &'a self,
        ctx: &'a mut ThreadContext,
        display: &'a DisplayRef,
        transport: T,
    ) -> Session<'a, T> {
        Session::new(self, ctx, display, transport)
    }

    pub fn diagnostics(&self, ctx: &ThreadContext) -> Diagnostics {
        Diagnostics {
            stats: self.stats.snapshot(),
            thread: ctx.snapshot(),
            multiplier_factor: self.scheduler.multiplier_factor(),
        }
    }
}
