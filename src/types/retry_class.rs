//! Retry classes with independent max-tries settings

use serde::{Deserialize, Serialize};

/// Kind of exchange a retry limit applies to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[repr(u8)]
pub enum RetryClass {
    WriteOnly = 0,
    WriteRead = 1,
    MultiPartRead = 2,
}

impl RetryClass {
    pub const ALL: [RetryClass; 3] =
        [RetryClass::WriteOnly, RetryClass::WriteRead, RetryClass::MultiPartRead];

    pub fn ordinal(self) -> usize {
        self as usize
    }

    pub fn name(self) -> &'static str {
        match self {
            RetryClass::WriteOnly => "write-only",
            RetryClass::WriteRead => "write-read",
            RetryClass::MultiPartRead => "multi-part-read",
        }
    }

    /// Built-in default maximum tries.
    pub fn default_max_tries(self) -> u16 {
        match self {
            RetryClass::WriteOnly => 4,
            RetryClass::WriteRead => 10,
            RetryClass::MultiPartRead => 8,
        }
    }
}
