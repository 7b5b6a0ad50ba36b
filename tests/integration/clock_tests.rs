//! Clock sync end to end: `AT+CCLK?` → system clock → retained drift.

use crate::mock_modem::{ScriptedModem, context, modem, ok};

use waterpal::ErrorCode;
use waterpal::app::ports::ClockPort;
use waterpal::clock;

/// `24/10/08,23:39:49-16` in UTC.
const MODEM_UTC: i64 = 1_728_445_189;

#[test]
fn sync_sets_utc_and_records_drift() {
    let (mut m, _, _) = modem(ScriptedModem::sim7000());
    let mut ctx = context(5, MODEM_UTC - 42);
    m.power_on(&mut ctx);

    let sync = clock::sync_clock(&mut m, &mut ctx).unwrap();

    assert_eq!(sync.utc_s, MODEM_UTC);
    assert_eq!(sync.timestamp.tz_quarter_hours(), -16);
    assert_eq!(sync.timestamp.utc_correction_quarter_hours(), 16);
    assert_eq!(ctx.clock.now_unix(), MODEM_UTC);
    assert_eq!(sync.drift_s, 42);
    assert!(sync.recorded);
    assert_eq!(ctx.memory.last_time_drift_s(), 42);
}

#[test]
fn first_boot_drift_is_not_recorded() {
    let (mut m, _, _) = modem(ScriptedModem::sim7000());
    let mut ctx = context(1, 0);
    m.power_on(&mut ctx);

    let sync = clock::sync_clock(&mut m, &mut ctx).unwrap();

    assert_eq!(ctx.clock.now_unix(), MODEM_UTC);
    assert!(!sync.recorded);
    assert_eq!(ctx.memory.last_time_drift_s(), 0);
}

#[test]
fn garbage_clock_logs_timestamp_parse() {
    let mut link = ScriptedModem::sim7000();
    link.on("+CCLK?", &[ok(&["+CCLK: \"80/00/00,99:99:99+00\""])]);
    let (mut m, _, _) = modem(link);
    let mut ctx = context(5, 1_000);
    m.power_on(&mut ctx);

    assert!(clock::sync_clock(&mut m, &mut ctx).is_err());
    assert_eq!(ctx.clock.now_unix(), 1_000);
    assert_eq!(ctx.memory.last_error(), (ErrorCode::TimestampParse, 1_000));
}

#[test]
fn powered_off_modem_leaves_clock_alone() {
    let (mut m, _, _) = modem(ScriptedModem::sim7000());
    let mut ctx = context(5, 1_000);

    assert!(clock::sync_clock(&mut m, &mut ctx).is_err());
    assert_eq!(ctx.clock.now_unix(), 1_000);
    assert_eq!(ctx.memory.last_error().0, ErrorCode::None);
}

#[test]
fn drift_survives_into_the_next_wake_cycle() {
    let (mut m, _, _) = modem(ScriptedModem::sim7000());
    let mut ctx = context(5, MODEM_UTC + 30);
    m.power_on(&mut ctx);
    clock::sync_clock(&mut m, &mut ctx).unwrap();

    let storage = ctx.memory.into_storage();
    let next = waterpal::state::PersistentState::new(storage);
    assert_eq!(next.last_time_drift_s(), -30);
    assert_eq!(next.boot_count(), 5);
}
