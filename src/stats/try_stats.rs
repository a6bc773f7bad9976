//! Try-count histogram per retry class

use crate::types::RetryClass;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// How one retried operation ended.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TryOutcome {
    /// Succeeded on try number `tries` (1-based).
    Succeeded { tries: u16 },
    /// Every allowed try failed with a retryable error.
    Exhausted { tries: u16 },
    /// A non-retryable error ended the loop early.
    Fatal { tries: u16 },
}

/// Histogram of operation outcomes for one retry class.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TryStats {
    pub retry_class: RetryClass,
    /// Number of operations that succeeded, keyed by the try they succeeded on.
    pub succeeded_on_try: BTreeMap<u16, u64>,
    pub exhausted: u64,
    pub fatal: u64,
}

impl TryStats {
    pub fn new(retry_class: RetryClass) -> Self {
        Self { retry_class, succeeded_on_try: BTreeMap::new(), exhausted: 0, fatal: 0 }
    }

    pub fn record(&mut self, outcome: TryOutcome) {
        match outcome {
            TryOutcome::Succeeded { tries } => {
                *self.succeeded_on_try.entry(tries).or_insert(0) += 1;
            }
            TryOutcome::Exhausted { .. } => self.exhausted += 1,
            TryOutcome::Fatal { .. } => self.fatal += 1,
        }
    }

    pub fn succeeded(&self) -> u64 {
        self.succeeded_on_try.values().sum()
    }

    pub fn total_operations(&self) -> u64 {
        self.succeeded() + self.exhausted + self.fatal
    }

    /// Mean number of tries among successful operations.
    pub fn average_successful_tries(&self) -> Option<f64> {
        let succeeded = self.succeeded();
        if succeeded == 0 {
            return None;
        }
        let weighted: u64 =
            self.succeeded_on_try.iter().map(|(tries, count)| u64::from(*tries) * count).sum();
        Some(weighted as f64 / succeeded as f64)
    }

    pub fn reset(&mut self) {
        *self = Self::new(self.retry_class);
    }
}
