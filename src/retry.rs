//! Retry limits and per-operation retry history

use crate::config::MaxTriesSettings;
use crate::context::ThreadContext;
use crate::error::{DdcError, Result, RetryHistoryText};
use crate::sync::lock;
use crate::types::{RetryClass, StatusCode};
use std::sync::Mutex;
use tracing::debug;

/// Largest max-tries value any retry class accepts.
pub const MAX_MAX_TRIES: u16 = 99;

/// Checks a max-tries value lies in `1..=MAX_MAX_TRIES`.
pub fn validate_max_tries(tries: u16) -> Result<u16> {
    if (1..=MAX_MAX_TRIES).contains(&tries) {
        Ok(tries)
    } else {
        Err(DdcError::config(format!("max tries {tries} outside 1..={MAX_MAX_TRIES}")))
    }
}

/// Process-wide default max tries per [`RetryClass`].
#[derive(Debug)]
pub struct RetryController {
    defaults: Mutex<[u16; RetryClass::ALL.len()]>,
}

impl Default for RetryController {
    fn default() -> Self {
        Self { defaults: Mutex::new(RetryClass::ALL.map(RetryClass::default_max_tries)) }
    }
}

impl RetryController {
    pub fn new(settings: &MaxTriesSettings) -> Result<Self> {
        let controller = Self::default();
        for class in RetryClass::ALL {
            controller.set_default_max_tries(class, settings.get(class))?;
        }
        Ok(controller)
    }

    pub fn default_max_tries(&self, class: RetryClass) -> u16 {
        lock(&self.defaults)[class.ordinal()]
    }

    pub fn set_default_max_tries(&self, class: RetryClass, tries: u16) -> Result<()> {
        let tries = validate_max_tries(tries)?;
        lock(&self.defaults)[class.ordinal()] = tries;
        debug!(class = class.name(), tries, "Default max tries set");
        Ok(())
    }

    /// Max tries in effect on this thread.
    pub fn max_tries(&self, ctx: &ThreadContext, class: RetryClass) -> u16 {
        ctx.max_tries_override(class).unwrap_or_else(|| self.default_max_tries(class))
    }
}

/// Statuses of the failed tries of one operation, in order.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RetryHistory {
    codes: Vec<StatusCode>,
}

impl RetryHistory {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push(&mut self, code: StatusCode) {
        self.codes.push(code);
    }

    pub fn len(&self) -> usize {
        self.codes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.codes.is_empty()
    }

    pub fn codes(&self) -> &[StatusCode] {
        &self.codes
    }

    pub fn all(&self, code: StatusCode) -> bool {
        !self.codes.is_empty() && self.codes.iter().all(|&c| c == code)
    }

    pub fn count(&self, code: StatusCode) -> usize {
        self.codes.iter().filter(|&&c| c == code).count()
    }

    /// Error for an operation that used up `tries` without success.
    ///
    /// Uniform all-null and all-zero histories get their own errors.
    pub fn into_exhausted_error(self, tries: u16) -> DdcError {
        if self.all(StatusCode::NullResponse) {
            DdcError::AllResponsesNull { tries }
        } else if self.all(StatusCode::ReadAllZero) {
            DdcError::AllTriesZero { tries }
        } else {
            DdcError::Retries { tries, history: RetryHistoryText(self.codes) }
        }
    }
}
