//! Hot-path overhead benchmark.
//!
//! The record path runs on every contended lock and every condition
//! operation in the traced program, so it has to stay at clock-read +
//! append cost. Call-site discovery is the one deliberately heavier piece;
//! it is only paid when an event is actually recorded.
//!
//! ```bash
//! cargo bench --bench record_overhead
//! ```

use contienda::callsite;
use contienda::clock::Baseline;
use contienda::events::{Event, EventBuffer, EventKind};
use contienda::sink::format_line;
use criterion::{black_box, criterion_group, criterion_main, BatchSize, Criterion};

fn bench_clock_read(c: &mut Criterion) {
    let clock = Baseline::now();
    c.bench_function("clock_elapsed_seconds", |b| {
        b.iter(|| black_box(clock.elapsed_seconds()))
    });
}

fn bench_event_record(c: &mut Criterion) {
    let clock = Baseline::now();
    c.bench_function("event_record", |b| {
        b.iter_batched_ref(
            || EventBuffer::try_with_capacity(100_000).unwrap(),
            |buffer| {
                buffer.record(
                    &clock,
                    black_box(EventKind::WaitMutex),
                    black_box(0x7f00_0010),
                    black_box(0x40_0a2c),
                );
            },
            BatchSize::SmallInput,
        )
    });
}

fn bench_call_site_capture(c: &mut Criterion) {
    c.bench_function("call_site_capture", |b| {
        b.iter(|| black_box(callsite::caller(black_box(2))))
    });
}

fn bench_line_format(c: &mut Criterion) {
    let event = Event {
        when: 1.000513612,
        what: EventKind::ContinueMutex,
        subject: 0x7f00_0010,
        call_site: 0x40_0a2c,
    };
    c.bench_function("trace_line_format", |b| {
        b.iter(|| black_box(format_line(black_box(3), &event)))
    });
}

criterion_group!(
    benches,
    bench_clock_read,
    bench_event_record,
    bench_call_site_capture,
    bench_line_format
);
criterion_main!(benches);
