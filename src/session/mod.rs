//! DDC exchanges with retry
//!
//! A [`Session`] binds one thread's [`ThreadContext`], one [`DisplayRef`] and
//! one [`Transport`] to a [`Ddc`] instance. Every exchange follows the same
//! shape:
//!
//! 1. wait out any deferred sleep still pending on the display
//! 2. write the request, timed as [`IoEvent::Write`]
//! 3. take the write-to-read delay, read a fixed number of bytes
//! 4. take the post-read delay and parse the reply
//!
//! The `*_with_retry` operations repeat an exchange up to the max tries of
//! its [`RetryClass`], feeding every outcome to the thread's error-rate
//! monitor and the shared statistics.

use crate::Ddc;
use crate::context::{MAX_SLEEP_MULTIPLIER_COUNT, ThreadContext};
use crate::display::DisplayRef;
use crate::error::{DdcError, Result};
use crate::packet::{
    FragmentAssembler, FragmentProgress, GETVCP_READ_SIZE, MULTI_PART_READ_SIZE, MultiPartRead,
    NonTableVcpValue, Packet, ResponseKind, TABLE_WRITE_FRAGMENT_SIZE, get_vcp_request,
    multipart_read_request, parse_response, save_settings_request, set_vcp_request,
    table_write_request,
};
use crate::retry::RetryHistory;
use crate::sleep::SleepAction;
use crate::stats::{StatusTally, TryOutcome};
use crate::transport::{DDC_SLAVE_ADDR, Transport};
use crate::types::{IoEvent, RetryClass, SleepEvent, StatusCode};
use std::time::Instant;
use tracing::{debug, trace, warn};

#[cfg(test)]
mod tests;

/// One thread's conversation with one display.
pub struct Session<'a, T: Transport> {
    ddc: &'a Ddc,
    ctx: &'a mut ThreadContext,
    display: &'a DisplayRef,
    transport: T,
    single_byte_reads: bool,
    retry_depth: u8,
    /// Set when a retry loop finishes, so an enclosing loop can tell that
    /// the exchanges of its attempt were already tallied.
    nested: Option<NestedLoop>,
}

/// How the last retry loop nested inside an attempt ended.
#[derive(Debug, Clone, Copy)]
struct NestedLoop {
    failed: bool,
}

impl<'a, T: Transport> Session<'a, T> {
    pub fn new(
        ddc: &'a Ddc,
        ctx: &'a mut ThreadContext,
        display: &'a DisplayRef,
        transport: T,
    ) -> Self {
        Self { ddc, ctx, display, transport, single_byte_reads: false, retry_depth: 0, nested: None }
    }

    /// Read replies one byte per bus transaction.
    pub fn with_single_byte_reads(mut self, enabled: bool) -> Self {
        self.single_byte_reads = enabled;
        self
    }

    pub fn display(&self) -> &DisplayRef {
        self.display
    }

    pub fn context(&self) -> &ThreadContext {
        &*self.ctx
    }

    pub fn transport(&self) -> &T {
        &self.transport
    }

    pub fn into_transport(self) -> T {
        self.transport
    }

    /// Sends `request` once, with no reply expected.
    pub fn write_only(&mut self, request: &Packet) -> Result<()> {
        self.write_only_then(request, SleepEvent::PostWrite)
    }

    pub fn write_only_with_retry(&mut self, request: &Packet) -> Result<()> {
        self.with_retry(RetryClass::WriteOnly, DdcError::is_retryable, |session| {
            session.write_only(request)
        })
    }

    /// Sends `request` once and parses the `read_size` byte reply.
    pub fn write_read(
        &mut self,
        request: &Packet,
        read_size: usize,
        expected: ResponseKind,
        expected_subtype: u8,
    ) -> Result<Packet> {
        self.ddc.scheduler().check_deferred_sleep(self.display);
        self.timed_write(request)?;
        self.tuned_sleep(SleepEvent::WriteToRead);
        let raw = self.timed_read(read_size)?;
        self.tuned_sleep(SleepEvent::PostRead);

        if raw.iter().all(|&b| b == 0) {
            return Err(DdcError::ReadAllZero);
        }
        let reply = parse_response(&raw, expected, expected_subtype)?;
        trace!(display = self.display.label(), reply = %reply, "Reply parsed");
        Ok(reply)
    }

    pub fn write_read_with_retry(
        &mut self,
        request: &Packet,
        read_size: usize,
        expected: ResponseKind,
        expected_subtype: u8,
    ) -> Result<Packet> {
        self.with_retry(RetryClass::WriteRead, DdcError::is_retryable, |session| {
            session.write_read(request, read_size, expected, expected_subtype)
        })
    }

    /// Reads a non-table feature.
    ///
    /// A display that answers with the unsupported result code yields
    /// [`DdcError::ReportedUnsupported`], which ends the retry loop.
    pub fn get_nontable_vcp(&mut self, vcp_code: u8) -> Result<NonTableVcpValue> {
        let request = get_vcp_request(vcp_code, "get_vcp");
        let value = self.with_retry(RetryClass::WriteRead, DdcError::is_retryable, |session| {
            let reply =
                session.write_read(&request, GETVCP_READ_SIZE, ResponseKind::GetVcp, vcp_code)?;
            let value = reply.nontable_value().copied().ok_or_else(|| {
                DdcError::invalid_data("get_vcp", "reply carries no feature value")
            })?;
            if !value.supported_opcode {
                return Err(DdcError::ReportedUnsupported { vcp_code });
            }
            Ok(value)
        })?;
        debug!(
            display = self.display.label(),
            vcp_code = format_args!("0x{vcp_code:02x}"),
            current = value.cur_value,
            maximum = value.max_value,
            "Feature read"
        );
        Ok(value)
    }

    pub fn set_nontable_vcp(&mut self, vcp_code: u8, new_value: u16) -> Result<()> {
        let request = set_vcp_request(vcp_code, new_value, "set_vcp");
        self.write_only_with_retry(&request)
    }

    /// Asks the display to persist its current settings.
    ///
    /// Takes the long post-save delay in place of the usual post-write one.
    pub fn save_settings(&mut self) -> Result<()> {
        let request = save_settings_request("save_settings");
        self.with_retry(RetryClass::WriteOnly, DdcError::is_retryable, |session| {
            session.write_only_then(&request, SleepEvent::PostSaveSettings)
        })
    }

    /// Reads a complete multi-part value, retrying the whole read.
    pub fn multi_part_read_with_retry(&mut self, request: MultiPartRead) -> Result<Vec<u8>> {
        self.assemble_with_retry(request).map(FragmentAssembler::into_bytes)
    }

    pub fn get_capabilities(&mut self) -> Result<String> {
        let assembler = self.assemble_with_retry(MultiPartRead::Capabilities)?;
        Ok(assembler.capabilities_string())
    }

    pub fn get_table_vcp(&mut self, vcp_code: u8) -> Result<Vec<u8>> {
        self.multi_part_read_with_retry(MultiPartRead::TableRead { vcp_code })
    }

    /// Writes a table feature in fragments, ending with an empty fragment.
    ///
    /// A failure anywhere restarts the write from offset zero.
    pub fn set_table_vcp(&mut self, vcp_code: u8, value: &[u8]) -> Result<()> {
        self.with_retry(RetryClass::MultiPartRead, multi_part_retryable, |session| {
            session.multi_part_write(vcp_code, value)
        })
    }

    fn assemble_with_retry(&mut self, request: MultiPartRead) -> Result<FragmentAssembler> {
        self.with_retry(RetryClass::MultiPartRead, multi_part_retryable, |session| {
            session.multi_part_read(request)
        })
    }

    fn multi_part_read(&mut self, request: MultiPartRead) -> Result<FragmentAssembler> {
        self.tuned_sleep(SleepEvent::PreMultiPartRead);

        let mut assembler = FragmentAssembler::new(request);
        let mut packet = multipart_read_request(request, 0, "multi_part_read");
        loop {
            packet.update_multipart_offset(assembler.expected_offset());
            let reply = self.write_read_with_retry(
                &packet,
                MULTI_PART_READ_SIZE,
                request.response_kind(),
                request.subtype(),
            )?;
            let fragment = reply.multipart_fragment().ok_or_else(|| {
                DdcError::invalid_data("multi_part_read", "reply carries no fragment")
            })?;
            match assembler.accept(fragment)? {
                FragmentProgress::NeedMore { next_offset } => {
                    trace!(next_offset, "Fragment accepted");
                }
                FragmentProgress::Complete => break,
            }
        }

        self.tuned_sleep(SleepEvent::PostMultiPartRead);
        debug!(
            display = self.display.label(),
            bytes = assembler.as_bytes().len(),
            "Multi-part read complete"
        );
        Ok(assembler)
    }

    fn multi_part_write(&mut self, vcp_code: u8, value: &[u8]) -> Result<()> {
        let mut offset = 0usize;
        loop {
            let end = (offset + TABLE_WRITE_FRAGMENT_SIZE).min(value.len());
            let chunk = &value[offset..end];
            let wire_offset = u16::try_from(offset).map_err(|_| {
                DdcError::invalid_data("table_write", format!("offset {offset} exceeds 16 bits"))
            })?;
            let packet = table_write_request(vcp_code, wire_offset, chunk, "table_write");
            self.write_only_with_retry(&packet)?;
            if chunk.is_empty() {
                return Ok(());
            }
            offset = end;
        }
    }

    fn write_only_then(&mut self, request: &Packet, post: SleepEvent) -> Result<()> {
        self.ddc.scheduler().check_deferred_sleep(self.display);
        self.timed_write(request)?;
        self.tuned_sleep(post);
        Ok(())
    }

    fn timed_write(&mut self, request: &Packet) -> Result<()> {
        let bytes = request.wire_bytes();
        let start = Instant::now();
        let result = self.transport.write(DDC_SLAVE_ADDR, bytes);
        self.ddc.stats().record_io_event(IoEvent::Write, start.elapsed());

        let written = result?;
        if written != bytes.len() {
            return Err(DdcError::ShortTransfer {
                operation: "write",
                expected: bytes.len(),
                actual: written,
            });
        }
        trace!(display = self.display.label(), request = %request, "Request written");
        Ok(())
    }

    fn timed_read(&mut self, count: usize) -> Result<Vec<u8>> {
        let start = Instant::now();
        let result = self.transport.read(DDC_SLAVE_ADDR, self.single_byte_reads, count);
        self.ddc.stats().record_io_event(IoEvent::Read, start.elapsed());

        let raw = result?;
        if raw.len() != count {
            return Err(DdcError::ShortTransfer {
                operation: "read",
                expected: count,
                actual: raw.len(),
            });
        }
        Ok(raw)
    }

    fn tuned_sleep(&mut self, event: SleepEvent) -> SleepAction {
        self.ddc.scheduler().tuned_sleep(self.ctx, self.display, event)
    }

    /// Runs `attempt` until it succeeds, fails with an error `retryable`
    /// rejects, or the class's max tries are used up.
    ///
    /// From the second failure on, the thread's sleep multiplier count is
    /// raised by one per failure. It is restored before returning.
    ///
    /// Loops nest: a multi-part read retries each fragment exchange inside
    /// its own retry of the whole read. The error-rate monitor and the retry
    /// tally see each exchange once, from the innermost loop that ran it.
    /// Only the outermost loop records the operation's primary status.
    fn with_retry<R>(
        &mut self,
        class: RetryClass,
        retryable: fn(&DdcError) -> bool,
        mut attempt: impl FnMut(&mut Self) -> Result<R>,
    ) -> Result<R> {
        let max_tries = self.ddc.retry().max_tries(self.ctx, class);
        let saved_count = self.ctx.sleep_multiplier_count();
        let outermost = self.retry_depth == 0;
        self.retry_depth += 1;
        let mut history = RetryHistory::new();
        let mut tries: u16 = 0;

        let result = loop {
            tries += 1;
            self.nested = None;
            let outcome = attempt(self);
            let nested = self.nested.take();
            let error = match outcome {
                Ok(value) => {
                    if nested.is_none() {
                        self.ctx.error_monitor_mut().record_status(StatusCode::Ok);
                    }
                    self.ddc.stats().record_tries(class, TryOutcome::Succeeded { tries });
                    break Ok(value);
                }
                Err(error) => error,
            };

            let code = error.status_code();
            if !nested.is_some_and(|inner| inner.failed) {
                self.ctx.error_monitor_mut().record_status(code);
                self.ddc.stats().record_status(code, StatusTally::Retry);
            }
            history.push(code);
            debug!(
                display = self.display.label(),
                class = class.name(),
                tries,
                max_tries,
                error = %error,
                "Try failed"
            );

            if !retryable(&error) {
                self.ddc.stats().record_tries(class, TryOutcome::Fatal { tries });
                break Err(error);
            }
            if tries >= max_tries {
                self.ddc.stats().record_tries(class, TryOutcome::Exhausted { tries });
                let exhausted = history.into_exhausted_error(tries);
                warn!(
                    display = self.display.label(),
                    class = class.name(),
                    tries,
                    error = %exhausted,
                    "Retries exhausted"
                );
                break Err(exhausted);
            }

            if matches!(error, DdcError::NullResponse) {
                self.tuned_sleep(SleepEvent::DdcNull);
            }
            if tries >= 2 {
                let raised =
                    saved_count.saturating_add(tries - 1).min(MAX_SLEEP_MULTIPLIER_COUNT - 1);
                self.ctx.put_sleep_multiplier_count(raised);
            }
        };

        if self.ctx.sleep_multiplier_count() != saved_count {
            self.ctx.put_sleep_multiplier_count(saved_count);
        }
        self.retry_depth -= 1;
        self.nested = Some(NestedLoop { failed: result.is_err() });
        if outermost {
            let final_code = match &result {
                Ok(_) => StatusCode::Ok,
                Err(error) => error.status_code(),
            };
            self.ddc.stats().record_status(final_code, StatusTally::Primary);
        }
        result
    }
}

/// A whole multi-part operation is worth repeating after one of its
/// fragment exchanges ran out of tries.
fn multi_part_retryable(error: &DdcError) -> bool {
    error.is_retryable() || matches!(error, DdcError::Retries { .. })
}
