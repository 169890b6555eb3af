//! Scenario tests for the liveness state machine.
//!
//! Wall-clock times drive the minute-parity slots; monotonic instants are
//! manufactured forward from a base so elapsed-time checks are deterministic.

use std::time::{Duration, Instant};

use chrono::{DateTime, TimeZone, Utc};
use pulsecheck::codec::Role;
use pulsecheck::error::FailureKind;
use pulsecheck::monitor::{Monitor, Received};

fn monitor(role: Role) -> Monitor {
    Monitor::new(role, Duration::from_secs(90), Duration::from_secs(30), 10)
}

fn clock(minute: u32, second: u32) -> DateTime<Utc> {
    Utc.with_ymd_and_hms(2025, 1, 1, 8, minute, second).unwrap()
}

#[test]
fn iot_opens_the_exchange_with_a_plain_beat_on_an_odd_minute() {
    let mut m = monitor(Role::Iot);
    let tick = m.on_tick(clock(13, 0), Instant::now());

    assert_eq!(tick.send.as_deref(), Some("[from: iot] [01/01/2025 08:13]"));
    assert_eq!(m.last_sent_minute(), Some(13));
    assert_eq!(tick.failure, None);
}

#[test]
fn a_second_tick_in_the_same_minute_sends_nothing() {
    let mut m = monitor(Role::Iot);
    let t0 = Instant::now();
    let first = m.on_tick(clock(13, 0), t0);
    let second = m.on_tick(clock(13, 30), t0 + Duration::from_secs(30));

    assert!(first.send.is_some());
    assert!(second.send.is_none());
    assert_eq!(second.failure, None);
}

#[test]
fn iot_does_not_send_on_even_minutes() {
    let mut m = monitor(Role::Iot);
    let tick = m.on_tick(clock(14, 0), Instant::now());
    assert!(tick.send.is_none());
}

#[test]
fn vm_stays_silent_until_first_contact() {
    let mut m = monitor(Role::Vm);
    let t0 = Instant::now();

    // Even minute, but nothing has ever arrived.
    let tick = m.on_tick(clock(14, 0), t0);
    assert!(tick.send.is_none());
    assert_eq!(tick.failure, None);

    // First inbound beat arms the machine; the next owned minute is used.
    let received = m.on_receive("[from: iot] [01/01/2025 08:15]", t0);
    assert!(matches!(received, Received::Accepted(_)));
    let tick = m.on_tick(clock(16, 10), t0 + Duration::from_secs(70));
    assert!(tick.send.is_some());
}

#[test]
fn grace_period_withholds_the_reply_without_failing() {
    let mut m = monitor(Role::Vm);
    let t0 = Instant::now();
    m.on_receive("[from: iot] [01/01/2025 13:00]", t0);

    // Minute 14, last receive only 25 s old: no send yet, no failure either.
    let tick = m.on_tick(clock(14, 30), t0 + Duration::from_secs(25));
    assert!(tick.send.is_none());
    assert_eq!(tick.failure, None);

    // Same minute once the grace period has passed: the reply goes out.
    let tick = m.on_tick(clock(14, 35), t0 + Duration::from_secs(31));
    assert!(tick.send.is_some());
}

#[test]
fn elapsed_timeout_is_terminal_and_reported_once() {
    let mut m = monitor(Role::Vm);
    let t0 = Instant::now();
    m.on_receive("[from: iot] [01/01/2025 08:13]", t0);

    let tick = m.on_tick(clock(15, 0), t0 + Duration::from_secs(95));
    assert_eq!(tick.failure, Some(FailureKind::ElapsedTimeout));
    assert_eq!(m.failure(), Some(FailureKind::ElapsedTimeout));

    // Later ticks stay silent: the alert fires exactly once.
    let tick = m.on_tick(clock(16, 0), t0 + Duration::from_secs(155));
    assert_eq!(tick.failure, None);
    assert!(tick.send.is_none());
}

#[test]
fn no_elapsed_timeout_before_anything_was_received() {
    let mut m = monitor(Role::Vm);
    let tick = m.on_tick(clock(15, 0), Instant::now() + Duration::from_secs(600));
    assert_eq!(tick.failure, None);
}

#[test]
fn repeated_beats_from_the_same_side_trip_the_duplicate_slot_check() {
    let mut m = monitor(Role::Vm);
    let t0 = Instant::now();

    // Normal opening round trip: iot beat, vm reply.
    m.on_receive("[from: iot] [01/01/2025 08:13]", t0);
    let tick = m.on_tick(clock(14, 0), t0 + Duration::from_secs(45));
    assert!(tick.send.is_some());

    // The counterpart keeps talking without ever acknowledging the reply.
    m.on_receive("[from: iot] [01/01/2025 08:15]", t0 + Duration::from_secs(105));
    m.on_receive("[from: iot] [01/01/2025 08:17]", t0 + Duration::from_secs(225));

    // Odd minute (vm silent), well within the elapsed-time window.
    let tick = m.on_tick(clock(17, 30), t0 + Duration::from_secs(255));
    assert!(tick.send.is_none());
    assert_eq!(tick.failure, Some(FailureKind::DuplicateSlotTimeout));
}

#[test]
fn self_echo_never_touches_receive_state() {
    let mut m = monitor(Role::Iot);
    let t0 = Instant::now();

    let received = m.on_receive("[from: iot] [01/01/2025 08:13]", t0);
    assert!(matches!(received, Received::SelfEcho));
    assert!(m.last_received().is_none());

    // With nothing genuinely received, the timeout still cannot fire.
    let tick = m.on_tick(clock(14, 0), t0 + Duration::from_secs(600));
    assert_eq!(tick.failure, None);
}

#[test]
fn malformed_payloads_are_dropped_without_state_change() {
    let mut m = monitor(Role::Vm);
    let t0 = Instant::now();

    let received = m.on_receive("[01/01/2025 08:13] : OK", t0);
    assert!(matches!(received, Received::Undecodable(_)));
    assert!(m.last_received().is_none());

    let tick = m.on_tick(clock(14, 0), t0 + Duration::from_secs(5));
    assert_eq!(tick.failure, None);

    // The machine was left waiting: a later valid beat still arms it.
    let received = m.on_receive("[from: iot] [01/01/2025 08:15]", t0 + Duration::from_secs(10));
    assert!(matches!(received, Received::Accepted(_)));
}

#[test]
fn acknowledging_form_is_used_once_a_round_trip_exists() {
    let mut m = monitor(Role::Vm);
    let t0 = Instant::now();
    m.on_receive("[from: iot] [01/01/2025 08:13]", t0);

    let tick = m.on_tick(clock(14, 5), t0 + Duration::from_secs(65));
    let payload = tick.send.expect("vm owns even minutes");
    assert_eq!(
        payload,
        "[from: vm] [01/01/2025 08:13] : OK / [01/01/2025 08:14]"
    );
}
