//! Test doubles for the bus and the clock
//!
//! [`ScriptedTransport`] plays back display replies queued by the test and
//! records every request written. [`RecordingSleeper`] records sleeps
//! without blocking, so timing tests run instantly.

#![cfg(any(test, feature = "benchmark"))]

use crate::Ddc;
use crate::config::DdcSettings;
use crate::packet::{DISPLAY_ADDR_BYTE, HOST_DEST_BYTE, LENGTH_FLAG, checksum};
use crate::sleep::Sleeper;
use crate::stats::ExecutionStats;
use crate::sync::lock;
use crate::transport::{EIO, Transport, TransportError};
use std::collections::{BTreeMap, VecDeque};
use std::sync::{Arc, Mutex};
use std::time::Duration;

/// Sleeper that records requested durations and returns immediately.
#[derive(Debug, Default)]
pub struct RecordingSleeper {
    calls: Mutex<Vec<Duration>>,
}

impl RecordingSleeper {
    pub fn calls(&self) -> Vec<Duration> {
        lock(&self.calls).clone()
    }

    pub fn total(&self) -> Duration {
        lock(&self.calls).iter().sum()
    }

    pub fn clear(&self) {
        lock(&self.calls).clear();
    }
}

impl Sleeper for RecordingSleeper {
    fn sleep(&self, duration: Duration) {
        lock(&self.calls).push(duration);
    }
}

/// Builds the bytes a display puts on the bus for a reply carrying `data`
/// (opcode first), checksum included.
pub fn display_response(data: &[u8]) -> Vec<u8> {
    let len = u8::try_from(data.len()).unwrap_or(u8::MAX) & !LENGTH_FLAG;
    let mut normalized = vec![HOST_DEST_BYTE, DISPLAY_ADDR_BYTE, LENGTH_FLAG | len];
    normalized.extend_from_slice(data);
    let chk = checksum(&normalized, true);

    let mut raw = normalized[1..].to_vec();
    raw.push(chk);
    raw
}

/// Get VCP Feature reply payload for `vcp_code`.
pub fn getvcp_reply(vcp_code: u8, max: u16, cur: u16) -> Vec<u8> {
    let [mh, ml] = max.to_be_bytes();
    let [sh, sl] = cur.to_be_bytes();
    display_response(&[0x02, 0x00, vcp_code, 0x00, mh, ml, sh, sl])
}

/// Fragment reply payload with the given reply opcode and offset.
pub fn fragment_reply(opcode: u8, offset: u16, data: &[u8]) -> Vec<u8> {
    let mut payload = vec![opcode];
    payload.extend_from_slice(&offset.to_be_bytes());
    payload.extend_from_slice(data);
    display_response(&payload)
}

/// Splits `text` into capabilities fragment replies of `size` bytes,
/// ending with the empty terminator.
pub fn capabilities_replies(text: &[u8], size: usize) -> Vec<Vec<u8>> {
    let mut replies: Vec<Vec<u8>> = text
        .chunks(size)
        .scan(0u16, |offset, chunk| {
            let reply = fragment_reply(0xe3, *offset, chunk);
            *offset += chunk.len() as u16;
            Some(reply)
        })
        .collect();
    replies.push(fragment_reply(0xe3, text.len() as u16, &[]));
    replies
}

/// One scripted answer to a read.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ScriptedRead {
    /// Zero-padded (or truncated) to the requested count, like a bus
    /// clocking out a fixed-size buffer.
    Reply(Vec<u8>),
    /// Returned exactly as given.
    Exact(Vec<u8>),
    Fail(i32),
}

/// Transport replaying queued reads and recording writes.
#[derive(Debug, Default)]
pub struct ScriptedTransport {
    reads: VecDeque<ScriptedRead>,
    write_attempts: usize,
    write_failures: BTreeMap<usize, i32>,
    writes: Vec<Vec<u8>>,
    read_sizes: Vec<usize>,
}

impl ScriptedTransport {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_replies<I>(replies: I) -> Self
    where
        I: IntoIterator<Item = Vec<u8>>,
    {
        let mut transport = Self::new();
        for reply in replies {
            transport.push_reply(reply);
        }
        transport
    }

    pub fn push_reply(&mut self, raw: Vec<u8>) {
        self.reads.push_back(ScriptedRead::Reply(raw));
    }

    pub fn push_read(&mut self, read: ScriptedRead) {
        self.reads.push_back(read);
    }

    /// The next write fails with `errno`.
    pub fn fail_next_write(&mut self, errno: i32) {
        self.write_failures.insert(self.write_attempts, errno);
    }

    /// Write attempt number `attempt` (0-based) fails with `errno`.
    pub fn fail_write_attempt(&mut self, attempt: usize, errno: i32) {
        self.write_failures.insert(attempt, errno);
    }

    /// Every request written, without the destination address byte.
    pub fn writes(&self) -> &[Vec<u8>] {
        &self.writes
    }

    pub fn read_sizes(&self) -> &[usize] {
        &self.read_sizes
    }

    pub fn pending_reads(&self) -> usize {
        self.reads.len()
    }
}

impl Transport for ScriptedTransport {
    fn write(&mut self, _dest_addr: u8, bytes: &[u8]) -> Result<usize, TransportError> {
        let attempt = self.write_attempts;
        self.write_attempts += 1;
        if let Some(errno) = self.write_failures.remove(&attempt) {
            return Err(TransportError::new(errno, "write"));
        }
        self.writes.push(bytes.to_vec());
        Ok(bytes.len())
    }

    fn read(
        &mut self,
        _dest_addr: u8,
        _single_byte: bool,
        count: usize,
    ) -> Result<Vec<u8>, TransportError> {
        self.read_sizes.push(count);
        match self.reads.pop_front() {
            Some(ScriptedRead::Reply(mut raw)) => {
                raw.resize(count, 0);
                Ok(raw)
            }
            Some(ScriptedRead::Exact(raw)) => Ok(raw),
            Some(ScriptedRead::Fail(errno)) => Err(TransportError::new(errno, "read")),
            None => Err(TransportError::new(EIO, "read")),
        }
    }
}

/// A [`Ddc`] wired to fresh statistics and a recording sleeper.
pub fn recording_ddc(settings: &DdcSettings) -> (Ddc, Arc<ExecutionStats>, Arc<RecordingSleeper>) {
    let stats = Arc::new(ExecutionStats::new());
    let sleeper = Arc::new(RecordingSleeper::default());
    let ddc = Ddc::with_parts(settings, stats.clone(), sleeper.clone())
        .expect("valid test settings");
    (ddc, stats, sleeper)
}
