//! Exchange and retry behavior against a scripted display
//!
//! Most tests run with deferral and dynamic adjustment off so that every
//! delay shows up in the recording sleeper at its table value.

use super::*;
use crate::config::{DdcSettings, SleepSettings};
use crate::stats::{ExecutionStats, StatsSink};
use crate::test_utils::{
    ScriptedRead, ScriptedTransport, capabilities_replies, display_response, fragment_reply,
    getvcp_reply, recording_ddc,
};
use crate::transport::{EBUSY, EIO};
use crate::types::IoMode;
use std::time::Duration;

const EACCES: i32 = 13;

fn ms(millis: u64) -> Duration {
    Duration::from_millis(millis)
}

fn immediate_settings() -> DdcSettings {
    DdcSettings {
        sleep: SleepSettings {
            deferred: false,
            dynamic_adjustment: false,
            ..SleepSettings::default()
        },
        ..DdcSettings::default()
    }
}

fn corrupt(mut raw: Vec<u8>) -> Vec<u8> {
    if let Some(last) = raw.last_mut() {
        *last ^= 0xff;
    }
    raw
}

fn wire_offset(write: &[u8], at: usize) -> u16 {
    u16::from_be_bytes([write[at], write[at + 1]])
}

fn primary_total(stats: &ExecutionStats) -> u64 {
    stats.snapshot().primary_status.iter().map(|c| c.count).sum()
}

fn succeeded_on(stats: &ExecutionStats, class: RetryClass, tries: u16) -> u64 {
    stats
        .snapshot()
        .try_stats(class)
        .and_then(|t| t.succeeded_on_try.get(&tries).copied())
        .unwrap_or(0)
}

#[test]
fn get_vcp_single_exchange() {
    let (ddc, stats, sleeper) = recording_ddc(&immediate_settings());
    let display = DisplayRef::i2c(3);
    let mut ctx = ThreadContext::new();
    let mut transport = ScriptedTransport::with_replies([getvcp_reply(0x10, 100, 42)]);

    let value = ddc.session(&mut ctx, &display, &mut transport).get_nontable_vcp(0x10).unwrap();
    assert_eq!(value.current(), Some(42));
    assert_eq!(value.maximum(), Some(100));

    let expected_request = get_vcp_request(0x10, "expected");
    assert_eq!(transport.writes(), &[expected_request.wire_bytes().to_vec()]);
    assert_eq!(transport.read_sizes(), &[GETVCP_READ_SIZE]);

    // write-to-read, post-read
    assert_eq!(sleeper.calls(), vec![ms(50), ms(50)]);
    assert_eq!(stats.status_count(StatusCode::Ok, StatusTally::Primary), 1);
    assert_eq!(stats.io_event_count(IoEvent::Write), 1);
    assert_eq!(stats.io_event_count(IoEvent::Read), 1);
    assert_eq!(succeeded_on(&stats, RetryClass::WriteRead, 1), 1);
    assert_eq!(ctx.error_monitor().stats().ok_count, 1);
}

#[test]
fn checksum_failure_is_retried() {
    let _ = tracing_subscriber::fmt::try_init();
    let (ddc, stats, _sleeper) = recording_ddc(&immediate_settings());
    let display = DisplayRef::i2c(3);
    let mut ctx = ThreadContext::new();
    let mut transport = ScriptedTransport::with_replies([
        corrupt(getvcp_reply(0x10, 100, 42)),
        getvcp_reply(0x10, 100, 42),
    ]);

    let value = ddc.session(&mut ctx, &display, &mut transport).get_nontable_vcp(0x10).unwrap();
    assert_eq!(value.current(), Some(42));
    assert_eq!(transport.writes().len(), 2);
    assert_eq!(stats.status_count(StatusCode::Checksum, StatusTally::Retry), 1);
    assert_eq!(stats.status_count(StatusCode::Checksum, StatusTally::Primary), 0);
    assert_eq!(stats.status_count(StatusCode::Ok, StatusTally::Primary), 1);
    assert_eq!(succeeded_on(&stats, RetryClass::WriteRead, 2), 1);

    let monitor = ctx.error_monitor().stats();
    assert_eq!((monitor.ok_count, monitor.error_count), (1, 1));
}

#[test]
fn repeated_failures_raise_multiplier_count() {
    let (ddc, _stats, sleeper) = recording_ddc(&immediate_settings());
    let display = DisplayRef::i2c(3);
    let mut ctx = ThreadContext::new();
    let mut transport = ScriptedTransport::with_replies([
        corrupt(getvcp_reply(0x10, 100, 42)),
        corrupt(getvcp_reply(0x10, 100, 42)),
        getvcp_reply(0x10, 100, 42),
    ]);

    ddc.session(&mut ctx, &display, &mut transport).get_nontable_vcp(0x10).unwrap();

    // Third try runs at multiplier count 2.
    assert_eq!(sleeper.calls(), vec![ms(50), ms(50), ms(50), ms(50), ms(100), ms(100)]);
    let state = ctx.sleep_state();
    assert_eq!(state.sleep_multiplier_count, 1);
    assert_eq!(state.max_sleep_multiplier_count_seen, 2);
    assert_eq!(state.multiplier_changed_count, 2);
}

#[test]
fn raised_multiplier_count_returns_to_caller_setting() {
    let (ddc, _stats, sleeper) = recording_ddc(&immediate_settings());
    let display = DisplayRef::i2c(3);
    let mut ctx = ThreadContext::new();
    ctx.set_sleep_multiplier_count(3).unwrap();
    let mut transport = ScriptedTransport::with_replies([
        corrupt(getvcp_reply(0x10, 100, 42)),
        corrupt(getvcp_reply(0x10, 100, 42)),
        getvcp_reply(0x10, 100, 42),
    ]);

    ddc.session(&mut ctx, &display, &mut transport).get_nontable_vcp(0x10).unwrap();

    // 3, 3, then 3 + 1 on the third try
    assert_eq!(
        sleeper.calls(),
        vec![ms(150), ms(150), ms(150), ms(150), ms(200), ms(200)]
    );
    assert_eq!(ctx.sleep_multiplier_count(), 3);
    assert_eq!(ctx.sleep_state().max_sleep_multiplier_count_seen, 4);
}

#[test]
fn null_responses_back_off_and_exhaust() {
    let _ = tracing_subscriber::fmt::try_init();
    let (ddc, stats, sleeper) = recording_ddc(&immediate_settings());
    let display = DisplayRef::i2c(3);
    let mut ctx = ThreadContext::new();
    ctx.set_max_tries_override(RetryClass::WriteRead, Some(3)).unwrap();
    let null = display_response(&[]);
    let mut transport = ScriptedTransport::with_replies([null.clone(), null.clone(), null]);

    let err = ddc.session(&mut ctx, &display, &mut transport).get_nontable_vcp(0x10).unwrap_err();
    assert_eq!(err, DdcError::AllResponsesNull { tries: 3 });

    assert_eq!(
        sleeper.calls(),
        vec![ms(50), ms(50), ms(100), ms(50), ms(50), ms(100), ms(100), ms(100)]
    );
    assert_eq!(stats.sleep_event_count(SleepEvent::DdcNull), 2);
    assert_eq!(stats.status_count(StatusCode::NullResponse, StatusTally::Retry), 3);
    assert_eq!(stats.status_count(StatusCode::AllResponsesNull, StatusTally::Primary), 1);
    assert_eq!(stats.snapshot().try_stats(RetryClass::WriteRead).map(|t| t.exhausted), Some(1));
    assert_eq!(ctx.sleep_multiplier_count(), 1);
}

#[test]
fn all_zero_reads_exhaust_to_all_tries_zero() {
    let (ddc, stats, _sleeper) = recording_ddc(&immediate_settings());
    let display = DisplayRef::i2c(3);
    let mut ctx = ThreadContext::new();
    ctx.set_max_tries_override(RetryClass::WriteRead, Some(2)).unwrap();
    let mut transport = ScriptedTransport::with_replies([Vec::new(), Vec::new()]);

    let err = ddc.session(&mut ctx, &display, &mut transport).get_nontable_vcp(0x10).unwrap_err();
    assert_eq!(err, DdcError::AllTriesZero { tries: 2 });
    assert_eq!(stats.status_count(StatusCode::ReadAllZero, StatusTally::Retry), 2);
    assert_eq!(ctx.error_monitor().stats().error_count, 2);
}

#[test]
fn mixed_failures_exhaust_to_retries() {
    let (ddc, _stats, _sleeper) = recording_ddc(&immediate_settings());
    let display = DisplayRef::i2c(3);
    let mut ctx = ThreadContext::new();
    ctx.set_max_tries_override(RetryClass::WriteRead, Some(2)).unwrap();
    let mut transport =
        ScriptedTransport::with_replies([Vec::new(), corrupt(getvcp_reply(0x10, 1, 1))]);

    let err = ddc.session(&mut ctx, &display, &mut transport).get_nontable_vcp(0x10).unwrap_err();
    match err {
        DdcError::Retries { tries, history } => {
            assert_eq!(tries, 2);
            assert_eq!(history.0, vec![StatusCode::ReadAllZero, StatusCode::Checksum]);
        }
        other => panic!("expected Retries, got {other:?}"),
    }
}

#[test]
fn non_transient_transport_error_stops_retrying() {
    let (ddc, stats, _sleeper) = recording_ddc(&immediate_settings());
    let display = DisplayRef::i2c(3);
    let mut ctx = ThreadContext::new();
    let mut transport = ScriptedTransport::new();
    transport.push_read(ScriptedRead::Fail(EACCES));
    transport.push_reply(getvcp_reply(0x10, 100, 42));

    let err = ddc.session(&mut ctx, &display, &mut transport).get_nontable_vcp(0x10).unwrap_err();
    assert_eq!(err.status_code(), StatusCode::Errno(EACCES));
    assert_eq!(transport.writes().len(), 1);
    assert_eq!(transport.pending_reads(), 1);
    assert_eq!(stats.snapshot().try_stats(RetryClass::WriteRead).map(|t| t.fatal), Some(1));
    assert_eq!(stats.status_count(StatusCode::Errno(EACCES), StatusTally::Primary), 1);
}

#[test]
fn short_read_is_retried() {
    let (ddc, stats, _sleeper) = recording_ddc(&immediate_settings());
    let display = DisplayRef::i2c(3);
    let mut ctx = ThreadContext::new();
    let mut transport = ScriptedTransport::new();
    transport.push_read(ScriptedRead::Exact(vec![0x6e, 0x88]));
    transport.push_reply(getvcp_reply(0x10, 100, 7));

    let value = ddc.session(&mut ctx, &display, &mut transport).get_nontable_vcp(0x10).unwrap();
    assert_eq!(value.current(), Some(7));
    assert_eq!(stats.status_count(StatusCode::DdcData, StatusTally::Retry), 1);
}

#[test]
fn unsupported_feature_is_an_error() {
    let (ddc, stats, _sleeper) = recording_ddc(&immediate_settings());
    let display = DisplayRef::i2c(3);
    let mut ctx = ThreadContext::new();
    let mut transport = ScriptedTransport::with_replies([display_response(&[
        0x02, 0x01, 0x14, 0x00, 0x00, 0x00, 0x00, 0x00,
    ])]);

    let err = ddc.session(&mut ctx, &display, &mut transport).get_nontable_vcp(0x14).unwrap_err();
    assert_eq!(err, DdcError::ReportedUnsupported { vcp_code: 0x14 });
    assert_eq!(transport.writes().len(), 1);
    assert_eq!(stats.status_count(StatusCode::ReportedUnsupported, StatusTally::Primary), 1);
    assert_eq!(stats.status_count(StatusCode::Ok, StatusTally::Primary), 0);
    assert_eq!(primary_total(&stats), 1);
    assert_eq!(stats.snapshot().try_stats(RetryClass::WriteRead).map(|t| t.fatal), Some(1));
}

#[test]
fn set_vcp_retries_busy_write() {
    let (ddc, stats, sleeper) = recording_ddc(&immediate_settings());
    let display = DisplayRef::i2c(3);
    let mut ctx = ThreadContext::new();
    let mut transport = ScriptedTransport::new();
    transport.fail_next_write(EBUSY);

    ddc.session(&mut ctx, &display, &mut transport).set_nontable_vcp(0x10, 0x0132).unwrap();

    let expected = set_vcp_request(0x10, 0x0132, "expected");
    assert_eq!(transport.writes(), &[expected.wire_bytes().to_vec()]);
    assert_eq!(stats.status_count(StatusCode::Errno(EBUSY), StatusTally::Retry), 1);
    assert_eq!(succeeded_on(&stats, RetryClass::WriteOnly, 2), 1);
    // Only the successful write takes the post-write delay.
    assert_eq!(sleeper.calls(), vec![ms(50)]);
}

#[test]
fn save_settings_takes_long_delay() {
    let (ddc, stats, sleeper) = recording_ddc(&immediate_settings());
    let display = DisplayRef::i2c(3);
    let mut ctx = ThreadContext::new();
    let mut transport = ScriptedTransport::new();

    ddc.session(&mut ctx, &display, &mut transport).save_settings().unwrap();

    assert_eq!(transport.writes(), &[vec![0x51, 0x81, 0x0c, 0xb2]]);
    assert_eq!(sleeper.calls(), vec![ms(200)]);
    assert_eq!(stats.sleep_event_count(SleepEvent::PostSaveSettings), 1);
    assert_eq!(stats.sleep_event_count(SleepEvent::PostWrite), 0);
}

#[test]
fn deferred_post_write_is_waited_out_before_next_exchange() {
    let (ddc, _stats, sleeper) = recording_ddc(&DdcSettings::default());
    let display = DisplayRef::i2c(3);
    let mut ctx = ThreadContext::new();
    let mut transport = ScriptedTransport::with_replies([getvcp_reply(0x10, 100, 80)]);

    {
        let mut session = ddc.session(&mut ctx, &display, &mut transport);
        session.set_nontable_vcp(0x10, 80).unwrap();
        assert!(sleeper.calls().is_empty());
        assert!(session.display().deferred_until().is_some());

        session.get_nontable_vcp(0x10).unwrap();
    }

    // Whatever was left of the post-write deadline, then write-to-read.
    let calls = sleeper.calls();
    assert!(calls.len() <= 2, "unexpected sleeps {calls:?}");
    assert_eq!(calls.last(), Some(&ms(50)));
    assert!(calls.iter().all(|&d| d <= ms(50)));
    // Post-read was deferred again.
    assert!(display.deferred_until().is_some());
}

#[test]
fn usb_display_never_sleeps() {
    let (ddc, _stats, sleeper) = recording_ddc(&immediate_settings());
    let display = DisplayRef::new(IoMode::Usb, "usb-1");
    let mut ctx = ThreadContext::new();
    let mut transport = ScriptedTransport::with_replies([getvcp_reply(0x10, 100, 42)]);

    ddc.session(&mut ctx, &display, &mut transport).get_nontable_vcp(0x10).unwrap();
    assert_eq!(sleeper.total(), Duration::ZERO);
}

#[test]
fn capabilities_are_reassembled() {
    let _ = tracing_subscriber::fmt::try_init();
    let (ddc, stats, sleeper) = recording_ddc(&immediate_settings());
    let display = DisplayRef::i2c(3);
    let mut ctx = ThreadContext::new();
    let text = b"(prot(monitor)type(lcd)vcp(10))";
    let mut transport = ScriptedTransport::with_replies(capabilities_replies(text, 8));

    let caps = ddc.session(&mut ctx, &display, &mut transport).get_capabilities().unwrap();
    assert_eq!(caps.as_bytes(), text);

    let writes = transport.writes();
    assert_eq!(writes.len(), 5);
    let offsets: Vec<u16> = writes.iter().map(|w| wire_offset(w, 3)).collect();
    assert_eq!(offsets, vec![0, 8, 16, 24, 31]);
    assert!(writes.iter().all(|w| w[2] == 0xf3));
    assert!(transport.read_sizes().iter().all(|&n| n == MULTI_PART_READ_SIZE));

    // pre-read, two per fragment, post-read
    let calls = sleeper.calls();
    assert_eq!(calls.first(), Some(&ms(200)));
    assert_eq!(calls.len(), 1 + 2 * 5 + 1);
    assert_eq!(sleeper.total(), ms(200 + 2 * 5 * 50 + 50));
    assert_eq!(succeeded_on(&stats, RetryClass::MultiPartRead, 1), 1);
    assert_eq!(succeeded_on(&stats, RetryClass::WriteRead, 1), 5);
}

#[test]
fn multi_part_read_is_one_primary_outcome() {
    let (ddc, stats, _sleeper) = recording_ddc(&immediate_settings());
    let display = DisplayRef::i2c(3);
    let mut ctx = ThreadContext::new();
    let mut replies = capabilities_replies(b"(prot(monitor)vcp(10 12))", 8);
    replies.insert(1, corrupt(replies[1].clone()));
    let fragments = replies.len() - 1;
    let mut transport = ScriptedTransport::with_replies(replies);

    ddc.session(&mut ctx, &display, &mut transport).get_capabilities().unwrap();

    assert_eq!(stats.status_count(StatusCode::Ok, StatusTally::Primary), 1);
    assert_eq!(primary_total(&stats), 1);
    assert_eq!(stats.status_count(StatusCode::Checksum, StatusTally::Retry), 1);
    assert_eq!(stats.snapshot().retry_status.iter().map(|c| c.count).sum::<u64>(), 1);

    // one status per bus exchange
    let monitor = ctx.error_monitor().stats();
    assert_eq!((monitor.ok_count, monitor.error_count), (fragments as u32, 1));
}

#[test]
fn fragment_failure_is_tallied_once() {
    let (ddc, stats, _sleeper) = recording_ddc(&immediate_settings());
    let display = DisplayRef::i2c(3);
    let mut ctx = ThreadContext::new();
    ctx.set_max_tries_override(RetryClass::WriteRead, Some(1)).unwrap();
    let mut replies = vec![corrupt(fragment_reply(0xe3, 0, b"ab"))];
    replies.extend(capabilities_replies(b"ab", 8));
    let mut transport = ScriptedTransport::with_replies(replies);

    let caps = ddc.session(&mut ctx, &display, &mut transport).get_capabilities().unwrap();
    assert_eq!(caps, "ab");

    // the exhausted fragment exchange is not counted again by the outer loop
    assert_eq!(stats.status_count(StatusCode::Checksum, StatusTally::Retry), 1);
    assert_eq!(stats.status_count(StatusCode::Retries, StatusTally::Retry), 0);
    assert_eq!(stats.status_count(StatusCode::Ok, StatusTally::Primary), 1);
    assert_eq!(primary_total(&stats), 1);
    assert_eq!(ctx.error_monitor().stats().error_count, 1);
    assert_eq!(succeeded_on(&stats, RetryClass::MultiPartRead, 2), 1);
}

#[test]
fn capabilities_trailing_nul_is_dropped() {
    let (ddc, _stats, _sleeper) = recording_ddc(&immediate_settings());
    let display = DisplayRef::i2c(3);
    let mut ctx = ThreadContext::new();
    let mut transport =
        ScriptedTransport::with_replies(capabilities_replies(b"(vcp(10 12))\0", 32));

    let caps = ddc.session(&mut ctx, &display, &mut transport).get_capabilities().unwrap();
    assert_eq!(caps, "(vcp(10 12))");
}

#[test]
fn fragment_offset_mismatch_restarts_read() {
    let (ddc, stats, _sleeper) = recording_ddc(&immediate_settings());
    let display = DisplayRef::i2c(3);
    let mut ctx = ThreadContext::new();
    let mut transport = ScriptedTransport::with_replies([
        fragment_reply(0xe3, 0, b"abcd"),
        fragment_reply(0xe3, 9, b"zz"),
        fragment_reply(0xe3, 0, b"abcd"),
        fragment_reply(0xe3, 4, b"ef"),
        fragment_reply(0xe3, 6, b""),
    ]);

    let caps = ddc.session(&mut ctx, &display, &mut transport).get_capabilities().unwrap();
    assert_eq!(caps, "abcdef");
    assert_eq!(stats.status_count(StatusCode::MultiPartReadFragment, StatusTally::Retry), 1);
    assert_eq!(stats.sleep_event_count(SleepEvent::PreMultiPartRead), 2);
    assert_eq!(succeeded_on(&stats, RetryClass::MultiPartRead, 2), 1);
}

#[test]
fn table_read_carries_feature_code() {
    let (ddc, _stats, _sleeper) = recording_ddc(&immediate_settings());
    let display = DisplayRef::i2c(3);
    let mut ctx = ThreadContext::new();
    let mut transport = ScriptedTransport::with_replies([
        fragment_reply(0xe4, 0, &[1, 2, 3]),
        fragment_reply(0xe4, 3, &[]),
    ]);

    let value = ddc.session(&mut ctx, &display, &mut transport).get_table_vcp(0x73).unwrap();
    assert_eq!(value, vec![1, 2, 3]);

    let writes = transport.writes();
    assert_eq!(writes.len(), 2);
    assert!(writes.iter().all(|w| w[2] == 0xe2 && w[3] == 0x73));
    assert_eq!(wire_offset(&writes[1], 4), 3);
}

#[test]
fn table_write_is_fragmented_and_terminated() {
    let (ddc, _stats, _sleeper) = recording_ddc(&immediate_settings());
    let display = DisplayRef::i2c(3);
    let mut ctx = ThreadContext::new();
    let mut transport = ScriptedTransport::new();
    let value: Vec<u8> = (0..30).collect();

    ddc.session(&mut ctx, &display, &mut transport).set_table_vcp(0x73, &value).unwrap();

    let writes = transport.writes();
    let lengths: Vec<u8> = writes.iter().map(|w| w[1]).collect();
    assert_eq!(lengths, vec![0x80 | 32, 0x80 | 6, 0x80 | 4]);
    let offsets: Vec<u16> = writes.iter().map(|w| wire_offset(w, 4)).collect();
    assert_eq!(offsets, vec![0, 28, 30]);
    assert_eq!(&writes[1][6..8], &[28, 29]);
}

#[test]
fn table_write_restarts_after_fragment_failure() {
    let _ = tracing_subscriber::fmt::try_init();
    let (ddc, stats, _sleeper) = recording_ddc(&immediate_settings());
    let display = DisplayRef::i2c(3);
    let mut ctx = ThreadContext::new();
    ctx.set_max_tries_override(RetryClass::WriteOnly, Some(1)).unwrap();
    let mut transport = ScriptedTransport::new();
    transport.fail_write_attempt(1, EIO);
    let value: Vec<u8> = (0..30).collect();

    ddc.session(&mut ctx, &display, &mut transport).set_table_vcp(0x73, &value).unwrap();

    let offsets: Vec<u16> = transport.writes().iter().map(|w| wire_offset(w, 4)).collect();
    assert_eq!(offsets, vec![0, 0, 28, 30]);
    assert_eq!(stats.status_count(StatusCode::Errno(EIO), StatusTally::Retry), 1);
    assert_eq!(stats.status_count(StatusCode::Retries, StatusTally::Retry), 0);
    assert_eq!(primary_total(&stats), 1);
    assert_eq!(stats.snapshot().try_stats(RetryClass::WriteOnly).map(|t| t.exhausted), Some(1));
    assert_eq!(succeeded_on(&stats, RetryClass::MultiPartRead, 2), 1);
}
