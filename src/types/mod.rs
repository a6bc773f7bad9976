//! Closed vocabularies shared by the codec, the scheduler and the statistics.
//!
//! - [`StatusCode`] keys the status-code tallies and drives the error-rate
//!   classification ([`StatusClass`])
//! - [`IoEvent`] and [`SleepEvent`] key the I/O timing and sleep-event tables
//! - [`RetryClass`] selects one of the three independent max-tries settings
//! - [`IoMode`] selects the sleep table for a display

mod events;
mod io_mode;
mod retry_class;
mod status_code;

pub use events::{IoEvent, SleepEvent, SleepEventTraits};
pub use io_mode::IoMode;
pub use retry_class::RetryClass;
pub use status_code::{DDCRC_RANGE_START, StatusClass, StatusCode};
