//! Multi-part read reassembly

use super::{MultiPartFragment, MultiPartRead};
use crate::error::{DdcError, Result};
use tracing::trace;

/// Outcome of feeding one fragment to a [`FragmentAssembler`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FragmentProgress {
    /// More data expected; request the next fragment at this offset.
    NeedMore { next_offset: u16 },
    Complete,
}

/// Accumulates fragments of one capabilities or table read.
///
/// Each fragment must start exactly where the previous one ended. An empty
/// fragment terminates the read.
#[derive(Debug, Clone)]
pub struct FragmentAssembler {
    request: MultiPartRead,
    buffer: Vec<u8>,
    complete: bool,
}

impl FragmentAssembler {
    pub fn new(request: MultiPartRead) -> Self {
        Self { request, buffer: Vec::new(), complete: false }
    }

    pub fn request(&self) -> MultiPartRead {
        self.request
    }

    /// Offset the next fragment must carry.
    pub fn expected_offset(&self) -> u16 {
        // accept() rejects anything that would push the length past u16::MAX
        self.buffer.len() as u16
    }

    pub fn is_complete(&self) -> bool {
        self.complete
    }

    pub fn accept(&mut self, fragment: &MultiPartFragment) -> Result<FragmentProgress> {
        if self.complete {
            return Err(DdcError::invalid_data(
                "multi-part read",
                "fragment received after terminating fragment",
            ));
        }

        let expected = self.expected_offset();
        if fragment.offset != expected {
            return Err(DdcError::MultiPartFragment { expected, actual: fragment.offset });
        }

        if fragment.is_terminal() {
            self.complete = true;
            trace!(total = self.buffer.len(), "Multi-part read complete");
            return Ok(FragmentProgress::Complete);
        }

        let next_len = self.buffer.len() + fragment.data.len();
        let next_offset = u16::try_from(next_len).map_err(|_| {
            DdcError::invalid_data("multi-part read", format!("total length {next_len} exceeds 65535"))
        })?;
        self.buffer.extend_from_slice(&fragment.data);
        trace!(offset = fragment.offset, len = fragment.data.len(), "Accepted fragment");
        Ok(FragmentProgress::NeedMore { next_offset })
    }

    pub fn as_bytes(&self) -> &[u8] {
        &self.buffer
    }

    pub fn into_bytes(self) -> Vec<u8> {
        self.buffer
    }

    /// Capabilities text, trailing NULs dropped.
    ///
    /// Some displays terminate the string with one or more NUL bytes inside
    /// the last fragment.
    pub fn capabilities_string(&self) -> String {
        let end = self.buffer.iter().rposition(|&b| b != 0).map_or(0, |pos| pos + 1);
        String::from_utf8_lossy(&self.buffer[..end]).into_owned()
    }
}
