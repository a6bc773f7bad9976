//! Execution statistics
//!
//! Process-wide counters fed by the session layer and the sleep scheduler:
//!
//! - I/O event kind → call count and total elapsed time
//! - status code → occurrences, in two tallies: [`StatusTally::Primary`]
//!   for the final outcome of an operation, [`StatusTally::Retry`] for
//!   failures seen inside a retry loop
//! - sleep event kind → occurrences
//! - retry class → [`TryStats`] histogram
//!
//! Each table sits behind its own mutex and every lock covers a single
//! read-modify-write, never an I/O call or a sleep. Readers get a copy
//! through [`StatsSink::snapshot`].

mod try_stats;

pub use try_stats::{TryOutcome, TryStats};

use crate::sync::lock;
use crate::types::{IoEvent, RetryClass, SleepEvent, StatusCode};
use serde::Serialize;
use std::collections::BTreeMap;
use std::fmt;
use std::sync::Mutex;
use std::time::Duration;

/// Which status-code tally an observation goes to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum StatusTally {
    Primary,
    Retry,
}

/// Destination for execution statistics.
///
/// Implemented by [`ExecutionStats`].
pub trait StatsSink: Send + Sync {
    fn record_io_event(&self, event: IoEvent, elapsed: Duration);

    fn record_status(&self, code: StatusCode, tally: StatusTally);

    fn record_sleep_event(&self, event: SleepEvent);

    fn record_tries(&self, class: RetryClass, outcome: TryOutcome);

    fn snapshot(&self) -> StatsSnapshot;

    fn reset(&self);
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
struct IoCounter {
    count: u64,
    elapsed: Duration,
}

#[derive(Debug, Default)]
struct StatusTallies {
    primary: BTreeMap<StatusCode, u64>,
    retry: BTreeMap<StatusCode, u64>,
}

impl StatusTallies {
    fn tally_mut(&mut self, tally: StatusTally) -> &mut BTreeMap<StatusCode, u64> {
        match tally {
            StatusTally::Primary => &mut self.primary,
            StatusTally::Retry => &mut self.retry,
        }
    }
}

/// Thread-safe execution counters.
#[derive(Debug)]
pub struct ExecutionStats {
    io_events: Mutex<[IoCounter; IoEvent::ALL.len()]>,
    status_codes: Mutex<StatusTallies>,
    sleep_events: Mutex<[u64; SleepEvent::ALL.len()]>,
    tries: Mutex<[TryStats; RetryClass::ALL.len()]>,
}

impl Default for ExecutionStats {
    fn default() -> Self {
        Self::new()
    }
}

impl ExecutionStats {
    pub fn new() -> Self {
        Self {
            io_events: Mutex::new([IoCounter::default(); IoEvent::ALL.len()]),
            status_codes: Mutex::new(StatusTallies::default()),
            sleep_events: Mutex::new([0; SleepEvent::ALL.len()]),
            tries: Mutex::new(RetryClass::ALL.map(TryStats::new)),
        }
    }

    pub fn status_count(&self, code: StatusCode, tally: StatusTally) -> u64 {
        let mut tallies = lock(&self.status_codes);
        tallies.tally_mut(tally).get(&code).copied().unwrap_or(0)
    }

    pub fn sleep_event_count(&self, event: SleepEvent) -> u64 {
        lock(&self.sleep_events)[event.ordinal()]
    }

    pub fn io_event_count(&self, event: IoEvent) -> u64 {
        lock(&self.io_events)[event.ordinal()].count
    }
}

impl StatsSink for ExecutionStats {
    fn record_io_event(&self, event: IoEvent, elapsed: Duration) {
        let mut counters = lock(&self.io_events);
        let counter = &mut counters[event.ordinal()];
        counter.count += 1;
        counter.elapsed += elapsed;
    }

    fn record_status(&self, code: StatusCode, tally: StatusTally) {
        let mut tallies = lock(&self.status_codes);
        *tallies.tally_mut(tally).entry(code).or_insert(0) += 1;
    }

    fn record_sleep_event(&self, event: SleepEvent) {
        lock(&self.sleep_events)[event.ordinal()] += 1;
    }

    fn record_tries(&self, class: RetryClass, outcome: TryOutcome) {
        lock(&self.tries)[class.ordinal()].record(outcome);
    }

    fn snapshot(&self) -> StatsSnapshot {
        let io_events = {
            let counters = lock(&self.io_events);
            IoEvent::ALL
                .iter()
                .map(|&event| {
                    let counter = counters[event.ordinal()];
                    IoEventSummary { event, count: counter.count, total_elapsed: counter.elapsed }
                })
                .collect()
        };
        let (primary_status, retry_status) = {
            let tallies = lock(&self.status_codes);
            (status_counts(&tallies.primary), status_counts(&tallies.retry))
        };
        let sleep_events = {
            let counts = lock(&self.sleep_events);
            SleepEvent::ALL
                .iter()
                .map(|&event| SleepEventCount { event, count: counts[event.ordinal()] })
                .collect()
        };
        let tries = lock(&self.tries).to_vec();

        StatsSnapshot { io_events, primary_status, retry_status, sleep_events, tries }
    }

    fn reset(&self) {
        *lock(&self.io_events) = [IoCounter::default(); IoEvent::ALL.len()];
        *lock(&self.status_codes) = StatusTallies::default();
        *lock(&self.sleep_events) = [0; SleepEvent::ALL.len()];
        for stats in lock(&self.tries).iter_mut() {
            stats.reset();
        }
    }
}

fn status_counts(tally: &BTreeMap<StatusCode, u64>) -> Vec<StatusCount> {
    tally
        .iter()
        .map(|(&code, &count)| StatusCount { code, reported: code.code(), count })
        .collect()
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct IoEventSummary {
    pub event: IoEvent,
    pub count: u64,
    pub total_elapsed: Duration,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct StatusCount {
    pub code: StatusCode,
    /// Integer form reported to operators.
    pub reported: i32,
    pub count: u64,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct SleepEventCount {
    pub event: SleepEvent,
    pub count: u64,
}

/// Read-only copy of the execution counters.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct StatsSnapshot {
    pub io_events: Vec<IoEventSummary>,
    pub primary_status: Vec<StatusCount>,
    pub retry_status: Vec<StatusCount>,
    pub sleep_events: Vec<SleepEventCount>,
    pub tries: Vec<TryStats>,
}

impl StatsSnapshot {
    pub fn status_count(&self, code: StatusCode, tally: StatusTally) -> u64 {
        let counts = match tally {
            StatusTally::Primary => &self.primary_status,
            StatusTally::Retry => &self.retry_status,
        };
        counts.iter().find(|c| c.code == code).map_or(0, |c| c.count)
    }

    pub fn sleep_event_count(&self, event: SleepEvent) -> u64 {
        self.sleep_events.iter().find(|c| c.event == event).map_or(0, |c| c.count)
    }

    pub fn try_stats(&self, class: RetryClass) -> Option<&TryStats> {
        self.tries.iter().find(|t| t.retry_class == class)
    }
}

impl fmt::Display for StatsSnapshot {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(f, "I/O events:")?;
        for summary in self.io_events.iter().filter(|s| s.count > 0) {
            writeln!(
                f,
                "  {:<16} {:>8} calls {:>10.3} ms  ({})",
                summary.event.name(),
                summary.count,
                summary.total_elapsed.as_secs_f64() * 1000.0,
                summary.event.description()
            )?;
        }
        for (title, counts) in
            [("Primary status codes", &self.primary_status), ("Retry status codes", &self.retry_status)]
        {
            writeln!(f, "{title}:")?;
            for count in counts {
                writeln!(f, "  {:<32} {:>6} {:>8}", count.code.name(), count.reported, count.count)?;
            }
        }
        writeln!(f, "Sleep events:")?;
        for count in self.sleep_events.iter().filter(|c| c.count > 0) {
            writeln!(f, "  {:<24} {:>8}", count.event.name(), count.count)?;
        }
        writeln!(f, "Tries:")?;
        for stats in &self.tries {
            write!(
                f,
                "  {:<16} succeeded {} exhausted {} fatal {}",
                stats.retry_class.name(),
                stats.succeeded(),
                stats.exhausted,
                stats.fatal
            )?;
            if let Some(average) = stats.average_successful_tries() {
                write!(f, " (avg {average:.2} tries)")?;
            }
            writeln!(f)?;
        }
        Ok(())
    }
}
