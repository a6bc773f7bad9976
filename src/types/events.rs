//! I/O and sleep event vocabularies
//!
//! Both enumerations are versioned: discriminants are part of the reported
//! form and new kinds are only ever appended.

use serde::{Deserialize, Serialize};

/// Kind of transport call, timed by the execution statistics.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[repr(u8)]
pub enum IoEvent {
    Write = 0,
    Read = 1,
    WriteRead = 2,
    Open = 3,
    Close = 4,
    Other = 5,
}

impl IoEvent {
    /// All kinds, in ordinal order.
    pub const ALL: [IoEvent; 6] = [
        IoEvent::Write,
        IoEvent::Read,
        IoEvent::WriteRead,
        IoEvent::Open,
        IoEvent::Close,
        IoEvent::Other,
    ];

    pub fn ordinal(self) -> usize {
        self as usize
    }

    pub fn name(self) -> &'static str {
        match self {
            IoEvent::Write => "IE_WRITE",
            IoEvent::Read => "IE_READ",
            IoEvent::WriteRead => "IE_WRITE_READ",
            IoEvent::Open => "IE_OPEN",
            IoEvent::Close => "IE_CLOSE",
            IoEvent::Other => "IE_OTHER",
        }
    }

    pub fn description(self) -> &'static str {
        match self {
            IoEvent::Write => "write calls",
            IoEvent::Read => "read calls",
            IoEvent::WriteRead => "write/read calls",
            IoEvent::Open => "open file calls",
            IoEvent::Close => "close file calls",
            IoEvent::Other => "other I/O calls",
        }
    }
}

/// Protocol point at which a mandatory delay is taken.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[repr(u8)]
pub enum SleepEvent {
    WriteToRead = 0,
    PostOpen = 1,
    PostWrite = 2,
    PostRead = 3,
    PostSaveSettings = 4,
    /// Incremental backoff after a DDC Null Message.
    DdcNull = 5,
    PreMultiPartRead = 6,
    PostMultiPartRead = 7,
    /// Caller-supplied duration, no table lookup.
    Special = 8,
}

/// Scheduling properties of a sleep event.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SleepEventTraits {
    /// Skipped entirely while the global suppression flag is set.
    pub suppressible: bool,
    /// Recorded as a deadline on the display instead of blocking.
    pub deferrable: bool,
}

impl SleepEvent {
    /// All kinds, in ordinal order.
    pub const ALL: [SleepEvent; 9] = [
        SleepEvent::WriteToRead,
        SleepEvent::PostOpen,
        SleepEvent::PostWrite,
        SleepEvent::PostRead,
        SleepEvent::PostSaveSettings,
        SleepEvent::DdcNull,
        SleepEvent::PreMultiPartRead,
        SleepEvent::PostMultiPartRead,
        SleepEvent::Special,
    ];

    pub fn ordinal(self) -> usize {
        self as usize
    }

    pub fn name(self) -> &'static str {
        match self {
            SleepEvent::WriteToRead => "SE_WRITE_TO_READ",
            SleepEvent::PostOpen => "SE_POST_OPEN",
            SleepEvent::PostWrite => "SE_POST_WRITE",
            SleepEvent::PostRead => "SE_POST_READ",
            SleepEvent::PostSaveSettings => "SE_POST_SAVE_SETTINGS",
            SleepEvent::DdcNull => "SE_DDC_NULL",
            SleepEvent::PreMultiPartRead => "SE_PRE_MULTI_PART_READ",
            SleepEvent::PostMultiPartRead => "SE_POST_MULTI_PART_READ",
            SleepEvent::Special => "SE_SPECIAL",
        }
    }

    pub fn traits(self) -> SleepEventTraits {
        let (suppressible, deferrable) = match self {
            SleepEvent::WriteToRead => (true, false),
            SleepEvent::PostOpen => (true, true),
            SleepEvent::PostWrite => (false, true),
            SleepEvent::PostRead => (true, true),
            SleepEvent::PostSaveSettings => (false, true),
            SleepEvent::DdcNull => (false, false),
            SleepEvent::PreMultiPartRead => (false, false),
            SleepEvent::PostMultiPartRead => (false, true),
            SleepEvent::Special => (false, false),
        };
        SleepEventTraits { suppressible, deferrable }
    }
}
