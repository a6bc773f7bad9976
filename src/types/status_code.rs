//! Status codes tallied by the execution statistics

use crate::transport::{EIO, ENXIO};
use serde::{Deserialize, Serialize};

/// Base of the DDC-specific status code range, as reported to operators.
pub const DDCRC_RANGE_START: i32 = 3000;

/// Outcome of one exchange, as recorded in the statistics tables.
///
/// The reported integer form ([`StatusCode::code`]) is stable: DDC codes are
/// negative offsets from [`DDCRC_RANGE_START`] and errno values are negated.
/// New codes are appended, existing offsets are never reused.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub enum StatusCode {
    Ok,
    PacketSize,
    ResponseEnvelope,
    Checksum,
    InvalidData,
    ResponseType,
    NullResponse,
    MultiPartReadFragment,
    AllTriesZero,
    DoubleByte,
    ReportedUnsupported,
    ReadAllZero,
    Retries,
    AllResponsesNull,
    DdcData,
    Config,
    /// Host errno reported by the transport (positive value).
    Errno(i32),
}

/// How the error-rate monitor counts a status code.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StatusClass {
    Ok,
    Error,
    Other,
}

impl StatusCode {
    /// Reported integer form of the code.
    pub fn code(self) -> i32 {
        let offset = match self {
            StatusCode::Ok => return 0,
            StatusCode::Errno(errno) => return -errno,
            StatusCode::PacketSize => 1,
            StatusCode::ResponseEnvelope => 2,
            StatusCode::Checksum => 3,
            StatusCode::InvalidData => 4,
            StatusCode::ResponseType => 5,
            StatusCode::NullResponse => 6,
            StatusCode::MultiPartReadFragment => 7,
            StatusCode::AllTriesZero => 8,
            StatusCode::DoubleByte => 9,
            StatusCode::ReportedUnsupported => 10,
            StatusCode::ReadAllZero => 11,
            StatusCode::Retries => 15,
            StatusCode::Config => 18,
            StatusCode::AllResponsesNull => 30,
            StatusCode::DdcData => 31,
        };
        -(DDCRC_RANGE_START + offset)
    }

    /// Symbolic name used in diagnostics.
    pub fn name(self) -> &'static str {
        match self {
            StatusCode::Ok => "OK",
            StatusCode::PacketSize => "DDCRC_PACKET_SIZE",
            StatusCode::ResponseEnvelope => "DDCRC_RESPONSE_ENVELOPE",
            StatusCode::Checksum => "DDCRC_CHECKSUM",
            StatusCode::InvalidData => "DDCRC_INVALID_DATA",
            StatusCode::ResponseType => "DDCRC_RESPONSE_TYPE",
            StatusCode::NullResponse => "DDCRC_NULL_RESPONSE",
            StatusCode::MultiPartReadFragment => "DDCRC_MULTI_PART_READ_FRAGMENT",
            StatusCode::AllTriesZero => "DDCRC_ALL_TRIES_ZERO",
            StatusCode::DoubleByte => "DDCRC_DOUBLE_BYTE",
            StatusCode::ReportedUnsupported => "DDCRC_REPORTED_UNSUPPORTED",
            StatusCode::ReadAllZero => "DDCRC_READ_ALL_ZERO",
            StatusCode::Retries => "DDCRC_RETRIES",
            StatusCode::AllResponsesNull => "DDCRC_ALL_RESPONSES_NULL",
            StatusCode::DdcData => "DDCRC_DDC_DATA",
            StatusCode::Config => "DDCRC_ARG",
            StatusCode::Errno(EIO) => "EIO",
            StatusCode::Errno(ENXIO) => "ENXIO",
            StatusCode::Errno(_) => "ERRNO",
        }
    }

    /// True for malformed-frame faults, the "data-integrity" class.
    ///
    /// Double bytes and null responses are excluded: the first is a known
    /// display quirk, the second a valid protocol answer.
    pub fn is_data_integrity(self) -> bool {
        matches!(
            self,
            StatusCode::PacketSize
                | StatusCode::ResponseEnvelope
                | StatusCode::Checksum
                | StatusCode::InvalidData
                | StatusCode::ResponseType
                | StatusCode::MultiPartReadFragment
                | StatusCode::DdcData
        )
    }

    /// Classification used by the error-rate monitor.
    pub fn class(self) -> StatusClass {
        match self {
            StatusCode::Ok => StatusClass::Ok,
            StatusCode::ReadAllZero | StatusCode::Errno(EIO) => StatusClass::Error,
            code if code.is_data_integrity() => StatusClass::Error,
            _ => StatusClass::Other,
        }
    }
}

impl std::fmt::Display for StatusCode {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{} ({})", self.name(), self.code())
    }
}
