//! Benchmarks for sleep scheduling bookkeeping
//!
//! Measures the per-event cost the scheduler adds on top of the sleep
//! itself (the sleeper records instead of blocking):
//! - Error-rate evaluation with and without dynamic adjustment
//! - Immediate vs deferred scheduling of a post-write delay
//! - A complete Get VCP exchange against a scripted display
//!
//! Platform: Cross-platform (no real sleeps, CI-safe)

use criterion::{Criterion, criterion_group, criterion_main};
use ddclink::sleep::{ErrorRateMonitor, SleepScheduler};
use ddclink::test_utils::{RecordingSleeper, ScriptedTransport, getvcp_reply, recording_ddc};
use ddclink::{DdcSettings, DisplayRef, ExecutionStats, SleepEvent, StatusCode, ThreadContext};
use std::hint::black_box;
use std::sync::Arc;

fn bench_error_rate_monitor(c: &mut Criterion) {
    let mut group = c.benchmark_group("error_rate_monitor");

    for (name, enabled) in [("enabled", true), ("disabled", false)] {
        group.bench_function(name, |b| {
            let mut monitor = ErrorRateMonitor::new();
            let mut tick = 0u32;
            b.iter(|| {
                tick = tick.wrapping_add(1);
                let code = if tick % 7 == 0 { StatusCode::Checksum } else { StatusCode::Ok };
                monitor.record_status(code);
                let factor = monitor.adjustment_factor(black_box(enabled), 1.0);
                if factor >= 3.0 {
                    monitor.reset();
                }
                black_box(factor)
            })
        });
    }

    group.finish();
}

fn bench_tuned_sleep(c: &mut Criterion) {
    let mut group = c.benchmark_group("tuned_sleep");

    for (name, deferred) in [("immediate", false), ("deferred", true)] {
        let mut settings = DdcSettings::default();
        settings.sleep.deferred = deferred;
        let scheduler = SleepScheduler::new(
            &settings.sleep,
            Arc::new(ExecutionStats::new()),
            Arc::new(RecordingSleeper::default()),
        )
        .unwrap();
        let display = DisplayRef::i2c(1);
        let mut ctx = ThreadContext::new();

        group.bench_function(name, |b| {
            b.iter(|| black_box(scheduler.tuned_sleep(&mut ctx, &display, SleepEvent::PostWrite)))
        });
    }

    group.finish();
}

fn bench_get_vcp_exchange(c: &mut Criterion) {
    let (ddc, _stats, sleeper) = recording_ddc(&DdcSettings::default());
    let display = DisplayRef::i2c(1);
    let mut ctx = ThreadContext::new();
    let reply = getvcp_reply(0x10, 100, 50);

    c.bench_function("get_vcp_exchange", |b| {
        b.iter(|| {
            let mut transport = ScriptedTransport::with_replies([reply.clone()]);
            let value = ddc.session(&mut ctx, &display, &mut transport).get_nontable_vcp(0x10);
            sleeper.clear();
            black_box(value.map(|v| v.current()))
        })
    });
}

criterion_group!(benches, bench_error_rate_monitor, bench_tuned_sleep, bench_get_vcp_exchange);
criterion_main!(benches);
