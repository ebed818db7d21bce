//! Configuration and trace serialization.

use contienda::clock::Baseline;
use contienda::config::{Config, OUTPUT_ENV_VAR, TRYLOCK_ENV_VAR};
use contienda::events::{Event, EventBuffer, EventKind};
use contienda::sink::{format_line, TraceSink};
use serial_test::serial;
use std::env;

fn event(when: f64, what: EventKind) -> Event {
    Event {
        when,
        what,
        subject: 0x7f12_3400,
        call_site: 0x40_1a2b,
    }
}

#[test]
#[serial]
fn test_output_env_var_selects_path() {
    env::set_var(OUTPUT_ENV_VAR, "/tmp/contienda-test.log");
    let config = Config::from_env();
    env::remove_var(OUTPUT_ENV_VAR);

    assert_eq!(
        config.output_path.as_deref(),
        Some(std::path::Path::new("/tmp/contienda-test.log"))
    );
}

#[test]
#[serial]
fn test_output_env_var_pid_token() {
    env::set_var(OUTPUT_ENV_VAR, "/tmp/contienda-%p.log");
    let config = Config::from_env();
    env::remove_var(OUTPUT_ENV_VAR);

    let expected = format!("/tmp/contienda-{}.log", std::process::id());
    assert_eq!(config.output_path.unwrap().to_str().unwrap(), expected);
}

#[test]
#[serial]
fn test_missing_output_env_var_means_stderr() {
    env::remove_var(OUTPUT_ENV_VAR);
    let config = Config::from_env();
    assert!(config.output_path.is_none());
    assert!(TraceSink::open(&config).path().is_none());
}

#[test]
#[serial]
fn test_trylock_env_var_disables_fast_path() {
    env::set_var(TRYLOCK_ENV_VAR, "0");
    let config = Config::from_env();
    env::remove_var(TRYLOCK_ENV_VAR);
    assert!(!config.trylock_first);

    let config = Config::from_env();
    assert!(config.trylock_first);
}

#[test]
fn test_trace_line_fields_in_order() {
    let line = format_line(7, &event(12.000000345, EventKind::WaitMutex));
    let fields: Vec<&str> = line.split(' ').collect();
    assert_eq!(fields.len(), 5);
    assert_eq!(fields[0], "12.000000345");
    assert_eq!(fields[1], "7");
    assert_eq!(fields[2], "11");
    assert_eq!(fields[3], "0x7f123400");
    assert_eq!(fields[4], "0x401a2b");
}

#[test]
fn test_trace_line_kind_codes() {
    let codes = [
        (EventKind::ContinueMutex, "10"),
        (EventKind::WaitMutex, "11"),
        (EventKind::ContinueCond, "20"),
        (EventKind::WaitCond, "21"),
        (EventKind::SignalCond, "30"),
        (EventKind::BroadcastCond, "40"),
    ];
    for (kind, expected) in codes {
        let line = format_line(0, &event(0.0, kind));
        assert_eq!(line.split(' ').nth(2).unwrap(), expected);
    }
}

#[test]
fn test_flushed_buffer_round_trips_through_file() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("trace.out");
    let sink = TraceSink::to_path(&path).unwrap();

    let clock = Baseline::now();
    let mut buffer = EventBuffer::try_with_capacity(16).unwrap();
    buffer.record(&clock, EventKind::WaitMutex, 0xa0, 0xb0);
    buffer.record(&clock, EventKind::ContinueMutex, 0xa0, 0xb0);
    buffer.record(&clock, EventKind::SignalCond, 0xc0, 0xd0);

    sink.write_events(4, buffer.events());
    sink.close().unwrap();

    let contents = std::fs::read_to_string(&path).unwrap();
    let lines: Vec<&str> = contents.lines().collect();
    assert_eq!(lines.len(), 3);
    for line in &lines {
        let fields: Vec<&str> = line.split(' ').collect();
        assert_eq!(fields.len(), 5);
        assert_eq!(fields[1], "4");
        // %.9f: exactly nine fractional digits.
        let (_, frac) = fields[0].split_once('.').unwrap();
        assert_eq!(frac.len(), 9);
        assert!(fields[3].starts_with("0x"));
        assert!(fields[4].starts_with("0x"));
    }
    assert!(lines[0].contains(" 11 "));
    assert!(lines[1].contains(" 10 "));
    assert!(lines[2].contains(" 30 "));
}

#[test]
fn test_interleaved_thread_flushes_keep_batches_contiguous() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("trace.out");
    let sink = TraceSink::to_path(&path).unwrap();

    sink.write_events(0, &[event(0.1, EventKind::WaitMutex), event(0.2, EventKind::ContinueMutex)]);
    sink.write_events(1, &[event(0.15, EventKind::SignalCond)]);
    sink.close().unwrap();

    let contents = std::fs::read_to_string(&path).unwrap();
    let thread_ids: Vec<&str> = contents
        .lines()
        .map(|l| l.split(' ').nth(1).unwrap())
        .collect();
    assert_eq!(thread_ids, ["0", "0", "1"]);
}
