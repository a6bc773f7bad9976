//! Error types for DDC/CI exchanges.
//!
//! Every failure a display or the bus can produce is a [`DdcError`] variant.
//! None of them are fatal to the process: the caller (usually the retry loop
//! in [`crate::session`]) decides whether to try again or give up.
//!
//! ## Error Categories
//!
//! - **Frame errors**: the bytes read back do not form a valid DDC/CI reply
//!   (`Envelope`, `DoubleByte`, `PacketSize`, `Checksum`, `ResponseType`,
//!   `InvalidData`, `ShortTransfer`, `MultiPartFragment`)
//! - **Protocol answers**: valid replies that still mean "no value"
//!   (`NullResponse`, `ReportedUnsupported`)
//! - **Bus errors**: errno-like failures from the transport, or a read that
//!   returned nothing but zeros
//! - **Exhaustion**: a retry loop ran out of tries (`Retries`,
//!   `AllTriesZero`, `AllResponsesNull`)
//! - **Configuration**: out-of-range settings
//!
//! Each error maps onto a [`StatusCode`], which is the key used by the
//! execution statistics and by the error-rate monitor:
//!
//! ```rust
//! use ddclink::{DdcError, StatusCode};
//!
//! let error = DdcError::Checksum { expected: 0x1d, actual: 0x00 };
//! assert_eq!(error.status_code(), StatusCode::Checksum);
//! assert!(error.status_code().is_data_integrity());
//! assert!(error.is_retryable());
//! ```

use crate::StatusCode;
use crate::transport::TransportError;
use thiserror::Error;

/// Result type alias for DDC operations.
pub type Result<T, E = DdcError> = std::result::Result<T, E>;

/// Main error type for DDC/CI operations.
#[derive(Error, Debug, Clone, PartialEq)]
#[non_exhaustive]
pub enum DdcError {
    #[error("Invalid source address in reply: {found:#04x}, expected 0x6e")]
    Envelope { found: u8 },

    #[error("Duplicated byte in reply header ({byte:#04x})")]
    DoubleByte { byte: u8 },

    #[error("Invalid data length in reply: {declared} exceeds {max} (or buffer holds {available} bytes)")]
    PacketSize { declared: usize, max: usize, available: usize },

    #[error("Reply checksum {actual:#04x} does not match expected {expected:#04x}")]
    Checksum { expected: u8, actual: u8 },

    #[error("DDC Null Message received")]
    NullResponse,

    #[error("Unexpected response type {actual:#04x}, expected {expected:#04x}")]
    ResponseType { expected: u8, actual: u8 },

    #[error("Invalid data in {context}: {details}")]
    InvalidData { context: String, details: String },

    #[error("Read returned only zero bytes")]
    ReadAllZero,

    #[error("Short {operation}: expected {expected} bytes, transferred {actual}")]
    ShortTransfer { operation: &'static str, expected: usize, actual: usize },

    #[error("Multi-part fragment offset {actual} does not match requested offset {expected}")]
    MultiPartFragment { expected: u16, actual: u16 },

    #[error(transparent)]
    Transport(#[from] TransportError),

    #[error("Feature {vcp_code:#04x} reported unsupported by display")]
    ReportedUnsupported { vcp_code: u8 },

    #[error("Maximum tries ({tries}) exceeded, try errors: {history}")]
    Retries { tries: u16, history: RetryHistoryText },

    #[error("All {tries} tries returned all-zero data")]
    AllTriesZero { tries: u16 },

    #[error("All {tries} tries returned DDC Null Message")]
    AllResponsesNull { tries: u16 },

    #[error("Invalid configuration: {reason}")]
    Config { reason: String },
}

/// Rendered form of a [`crate::retry::RetryHistory`], kept inside
/// [`DdcError::Retries`] so the error stays `Clone + PartialEq`.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct RetryHistoryText(pub Vec<StatusCode>);

impl std::fmt::Display for RetryHistoryText {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let names: Vec<&str> = self.0.iter().map(|c| c.name()).collect();
        write!(f, "[{}]", names.join(", "))
    }
}

impl DdcError {
    /// Status code under which this error is tallied.
    pub fn status_code(&self) -> StatusCode {
        match self {
            DdcError::Envelope { .. } => StatusCode::ResponseEnvelope,
            DdcError::DoubleByte { .. } => StatusCode::DoubleByte,
            DdcError::PacketSize { .. } => StatusCode::PacketSize,
            DdcError::Checksum { .. } => StatusCode::Checksum,
            DdcError::NullResponse => StatusCode::NullResponse,
            DdcError::ResponseType { .. } => StatusCode::ResponseType,
            DdcError::InvalidData { .. } => StatusCode::InvalidData,
            DdcError::ReadAllZero => StatusCode::ReadAllZero,
            DdcError::ShortTransfer { .. } => StatusCode::DdcData,
            DdcError::MultiPartFragment { .. } => StatusCode::MultiPartReadFragment,
            DdcError::Transport(err) => StatusCode::Errno(err.errno),
            DdcError::ReportedUnsupported { .. } => StatusCode::ReportedUnsupported,
            DdcError::Retries { .. } => StatusCode::Retries,
            DdcError::AllTriesZero { .. } => StatusCode::AllTriesZero,
            DdcError::AllResponsesNull { .. } => StatusCode::AllResponsesNull,
            DdcError::Config { .. } => StatusCode::Config,
        }
    }

    /// Returns whether another attempt of the same exchange may succeed.
    pub fn is_retryable(&self) -> bool {
        match self {
            DdcError::Envelope { .. } => true,
            DdcError::DoubleByte { .. } => true,
            DdcError::PacketSize { .. } => true,
            DdcError::Checksum { .. } => true,
            DdcError::NullResponse => true,
            DdcError::ResponseType { .. } => true,
            DdcError::InvalidData { .. } => true,
            DdcError::ReadAllZero => true,
            DdcError::ShortTransfer { .. } => true,
            DdcError::MultiPartFragment { .. } => true,
            DdcError::Transport(err) => err.is_transient(),
            DdcError::ReportedUnsupported { .. } => false,
            DdcError::Retries { .. } => false,
            DdcError::AllTriesZero { .. } => false,
            DdcError::AllResponsesNull { .. } => false,
            DdcError::Config { .. } => false,
        }
    }

    /// Returns suggested recovery actions for this error.
    pub fn recovery_suggestions(&self) -> Vec<&'static str> {
        match self {
            DdcError::Envelope { .. }
            | DdcError::PacketSize { .. }
            | DdcError::Checksum { .. }
            | DdcError::ResponseType { .. }
            | DdcError::InvalidData { .. }
            | DdcError::ShortTransfer { .. }
            | DdcError::MultiPartFragment { .. } => vec![
                "Retry the exchange",
                "Increase the sleep multiplier factor",
                "Check the cable and any docking station or KVM in the path",
            ],
            DdcError::DoubleByte { .. } => vec![
                "Retry the exchange",
                "Known firmware quirk on some displays, usually transient",
            ],
            DdcError::NullResponse => vec![
                "Retry after a short delay",
                "Check the feature is implemented by the display",
            ],
            DdcError::ReadAllZero | DdcError::AllTriesZero { .. } => vec![
                "Check DDC/CI is enabled in the display's on-screen menu",
                "Verify the display is powered on",
            ],
            DdcError::Transport(_) => vec![
                "Check permissions on the I2C device",
                "Verify the bus is not held by another process",
                "Reopen the display",
            ],
            DdcError::ReportedUnsupported { .. } => vec![
                "Query the capabilities string for supported features",
            ],
            DdcError::Retries { .. } | DdcError::AllResponsesNull { .. } => vec![
                "Increase max tries for the retry class",
                "Increase the sleep multiplier factor",
                "Enable dynamic sleep adjustment",
            ],
            DdcError::Config { .. } => vec![
                "Check max tries are between 1 and 99",
                "Check the sleep multiplier is between 0 and 100",
            ],
        }
    }

    /// Helper constructor for payload-level parse faults.
    pub fn invalid_data(context: impl Into<String>, details: impl Into<String>) -> Self {
        DdcError::InvalidData { context: context.into(), details: details.into() }
    }

    /// Helper constructor for configuration errors.
    pub fn config(reason: impl Into<String>) -> Self {
        DdcError::Config { reason: reason.into() }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::transport::{EIO, ENXIO};
    use proptest::prelude::*;

    proptest! {
        #[test]
        fn invalid_data_messages_carry_context(context in "\\w+", details in ".*") {
            let error = DdcError::invalid_data(context.clone(), details.clone());
            let message = error.to_string();
            prop_assert!(message.contains(&context));
            prop_assert!(message.contains(&details));
            prop_assert_eq!(error.status_code(), StatusCode::InvalidData);
        }

        #[test]
        fn transport_errors_map_to_errno_codes(errno in 1i32..200) {
            let error: DdcError = TransportError::new(errno, "read").into();
            prop_assert_eq!(error.status_code(), StatusCode::Errno(errno));
        }
    }

    #[test]
    fn error_traits_validation() {
        fn assert_send_sync_static<T: Send + Sync + 'static>() {}
        assert_send_sync_static::<DdcError>();

        let error = DdcError::NullResponse;
        let _: &dyn std::error::Error = &error;
    }

    #[test]
    fn frame_errors_are_data_integrity() {
        let frame_errors = [
            DdcError::Envelope { found: 0x00 },
            DdcError::PacketSize { declared: 40, max: 35, available: 40 },
            DdcError::Checksum { expected: 1, actual: 2 },
            DdcError::ResponseType { expected: 0x02, actual: 0xe3 },
            DdcError::invalid_data("vcp reply", "bad length"),
            DdcError::ShortTransfer { operation: "read", expected: 11, actual: 4 },
            DdcError::MultiPartFragment { expected: 32, actual: 0 },
        ];
        for error in frame_errors {
            assert!(error.status_code().is_data_integrity(), "{error}");
            assert!(error.is_retryable());
        }

        assert!(!DdcError::DoubleByte { byte: 0x6e }.status_code().is_data_integrity());
        assert!(!DdcError::NullResponse.status_code().is_data_integrity());
    }

    #[test]
    fn exhaustion_is_not_retryable() {
        let retries = DdcError::Retries {
            tries: 3,
            history: RetryHistoryText(vec![StatusCode::Checksum, StatusCode::NullResponse]),
        };
        assert!(!retries.is_retryable());
        assert!(retries.to_string().contains("DDCRC_CHECKSUM"));
        assert!(!DdcError::AllTriesZero { tries: 4 }.is_retryable());
        assert!(!DdcError::config("bad").is_retryable());
    }

    #[test]
    fn transport_retryability_follows_errno() {
        assert!(DdcError::from(TransportError::new(EIO, "write")).is_retryable());
        assert!(DdcError::from(TransportError::new(ENXIO, "read")).is_retryable());
        assert!(!DdcError::from(TransportError::new(13, "open")).is_retryable());
    }

    #[test]
    fn recovery_suggestions_are_descriptive() {
        for error in [
            DdcError::NullResponse,
            DdcError::ReadAllZero,
            DdcError::config("x"),
            DdcError::DoubleByte { byte: 0x6e },
        ] {
            let suggestions = error.recovery_suggestions();
            assert!(!suggestions.is_empty());
            for suggestion in suggestions {
                assert!(suggestion.len() > 5);
            }
        }
    }
}
