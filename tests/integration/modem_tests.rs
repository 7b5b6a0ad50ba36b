//! Modem lifecycle against the scripted SIM7000: power sequencing,
//! idempotence, IMEI caching and the retried reads.

use crate::mock_modem::{ScriptedModem, context, error, modem, ok};

use waterpal::ErrorCode;
use waterpal::modem::{ModemState, PowerState};
use waterpal::retry::{Retried, RetryPolicy};

const NOW: i64 = 1_728_000_000;

// ── Power sequencing ──────────────────────────────────────────

#[test]
fn power_on_brings_modem_to_ready() {
    let (mut m, pin, _) = modem(ScriptedModem::sim7000());
    let mut ctx = context(1, NOW);

    m.power_on(&mut ctx);

    assert_eq!(m.state(), ModemState::Ready);
    assert_eq!(m.power_state(), PowerState::On);
    assert_eq!(pin.pulses.get(), 1);
    let link = m.at().link();
    assert!(link.is_open());
    assert!(link.sent("+CFUN=0"));
    assert!(link.sent("+CFUN=1,1"));
    assert!(link.sent("E0"));
    assert!(ctx.watchdog.pets() >= 1);
    assert_eq!(ctx.memory.last_error().0, ErrorCode::None);
}

#[test]
fn power_on_twice_pulses_once() {
    let (mut m, pin, _) = modem(ScriptedModem::sim7000());
    let mut ctx = context(1, NOW);

    m.power_on(&mut ctx);
    m.power_on(&mut ctx);

    assert_eq!(pin.pulses.get(), 1);
    assert_eq!(m.at().link().count("+CFUN=0"), 1);
}

#[test]
fn network_mode_applied_on_first_boot_only() {
    let (mut first, _, _) = modem(ScriptedModem::sim7000());
    let mut ctx = context(1, NOW);
    first.power_on(&mut ctx);
    assert!(first.at().link().sent("+CNMP=13"));

    let (mut later, _, _) = modem(ScriptedModem::sim7000());
    let mut ctx = context(4, NOW);
    later.power_on(&mut ctx);
    assert_eq!(later.at().link().count("+CNMP"), 0);
}

#[test]
fn power_off_twice_shuts_down_once() {
    let (mut m, pin, _) = modem(ScriptedModem::sim7000());
    let mut ctx = context(2, NOW);

    m.power_on(&mut ctx);
    m.power_off();
    m.power_off();

    assert_eq!(m.state(), ModemState::Off);
    assert_eq!(pin.pulses.get(), 2);
    let link = m.at().link();
    assert_eq!(link.count("+CPOWD=1"), 1);
    assert!(!link.is_open());
}

#[test]
fn power_off_when_never_on_is_a_no_op() {
    let (mut m, pin, _) = modem(ScriptedModem::sim7000());
    m.power_off();
    assert_eq!(pin.pulses.get(), 0);
    assert!(m.at().link().log.is_empty());
}

#[test]
fn silent_modem_is_recorded_as_modem_failure() {
    let mut link = ScriptedModem::sim7000();
    link.silent = true;
    let (mut m, _, _) = modem(link);
    let mut ctx = context(3, NOW);

    m.power_on(&mut ctx);

    assert_eq!(ctx.memory.last_error(), (ErrorCode::ModemFailure, NOW));
}

#[test]
fn restart_failure_falls_back_to_init() {
    let mut link = ScriptedModem::sim7000();
    link.on("+CFUN=0", &[error()]);
    let (mut m, _, _) = modem(link);
    let mut ctx = context(2, NOW);

    m.power_on(&mut ctx);

    assert_eq!(m.state(), ModemState::Ready);
    assert!(!m.at().link().sent("+CFUN=1,1"));
    assert!(m.at().link().count("E0") >= 1);
    assert_eq!(ctx.memory.last_error().0, ErrorCode::None);
}

#[test]
fn stalled_restart_keeps_the_watchdog_fed() {
    let mut link = ScriptedModem::sim7000();
    link.on("+CFUN=0", &[""]);
    let (mut m, _, _) = modem(link);
    let mut ctx = context(2, NOW);

    m.power_on(&mut ctx);

    assert_eq!(m.state(), ModemState::Ready);
    // ten silent seconds on CFUN=0, petted once a second
    assert!(ctx.watchdog.pets() >= 10);
    assert_eq!(ctx.memory.last_error().0, ErrorCode::None);
}

#[test]
fn silent_module_keeps_the_watchdog_fed_while_waking() {
    let mut link = ScriptedModem::sim7000();
    link.silent = true;
    let (mut m, _, _) = modem(link);
    let mut ctx = context(3, NOW);

    m.power_on(&mut ctx);

    // restart and init each poll `AT` for ten seconds
    assert!(ctx.watchdog.pets() >= 2 * 50);
}

// ── IMEI ──────────────────────────────────────────────────────

#[test]
fn imei_is_cached_while_powered() {
    let (mut m, _, _) = modem(ScriptedModem::sim7000());
    let mut ctx = context(2, NOW);
    m.power_on(&mut ctx);

    assert_eq!(m.imei(&mut ctx, 100), 861_234_567_890_123);
    assert_eq!(m.imei(&mut ctx, 100), 861_234_567_890_123);
    assert_eq!(m.at().link().count("+GSN"), 1);
}

#[test]
fn imei_powers_modem_on_when_off() {
    let (mut m, pin, _) = modem(ScriptedModem::sim7000());
    let mut ctx = context(2, NOW);

    assert_eq!(m.imei(&mut ctx, 100), 861_234_567_890_123);
    assert!(m.is_on());
    assert_eq!(pin.pulses.get(), 1);
}

#[test]
fn imei_cache_dropped_by_power_off() {
    let (mut m, _, _) = modem(ScriptedModem::sim7000());
    let mut ctx = context(2, NOW);

    m.imei(&mut ctx, 100);
    m.power_off();
    m.imei(&mut ctx, 100);

    assert_eq!(m.at().link().count("+GSN"), 2);
}

#[test]
fn imei_retries_until_a_number_arrives() {
    let mut link = ScriptedModem::sim7000();
    link.on("+GSN", &[error(), ok(&["NOT A NUMBER"]), ok(&["861234567890123"])]);
    let (mut m, _, delay) = modem(link);
    let mut ctx = context(2, NOW);
    m.power_on(&mut ctx);
    let before = delay.elapsed_ms.get();
    let restarts_before = m.at().link().count("+CFUN=0");

    assert_eq!(m.imei(&mut ctx, 250), 861_234_567_890_123);

    let link = m.at().link();
    assert_eq!(link.count("+GSN"), 3);
    // attempts two and three restart the module
    assert_eq!(link.count("+CFUN=0") - restarts_before, 2);
    assert!(delay.elapsed_ms.get() - before >= 2 * 250);
}

// ── Buffer hygiene ────────────────────────────────────────────

#[test]
fn stale_bytes_are_drained() {
    let (mut m, _, _) = modem(ScriptedModem::sim7000());
    let mut ctx = context(2, NOW);
    m.power_on(&mut ctx);

    m.at().link_mut().inject("\r\nOK\r\n");
    assert_eq!(m.clear_receive_buffer(), 6);
    assert_eq!(m.at().link().pending_rx(), 0);
}

// ── Retried reads ─────────────────────────────────────────────

#[test]
fn battery_and_signal_reads() {
    let (mut m, _, _) = modem(ScriptedModem::sim7000());
    let mut ctx = context(2, NOW);
    m.power_on(&mut ctx);
    let policy = RetryPolicy::limited(3, 10);

    let battery = m.battery_info(&mut ctx, &policy).valid().unwrap();
    assert_eq!(battery.percent, 85);
    assert_eq!(battery.voltage_mv, 4_120);

    // CSQ 20 of 31
    assert_eq!(m.signal_quality(&mut ctx, &policy).valid(), Some(64));
}

#[test]
fn implausible_battery_exhausts_budget_and_logs() {
    let mut link = ScriptedModem::sim7000();
    link.on("+CBC", &[ok(&["+CBC: 0,0,3300"])]);
    let (mut m, _, _) = modem(link);
    let mut ctx = context(2, NOW);
    m.power_on(&mut ctx);

    let outcome = m.battery_info(&mut ctx, &RetryPolicy::limited(4, 10));

    assert!(matches!(outcome, Retried::Implausible { attempts: 4, .. }));
    assert_eq!(m.at().link().count("+CBC"), 4);
    assert_eq!(ctx.memory.last_error().0, ErrorCode::BatteryRead);
}

#[test]
fn reads_fail_fast_when_powered_off() {
    let (mut m, _, _) = modem(ScriptedModem::sim7000());
    let mut ctx = context(2, NOW);

    let outcome = m.battery_info(&mut ctx, &RetryPolicy::limited(2, 10));

    assert!(matches!(outcome, Retried::Failed { attempts: 2, .. }));
    assert!(m.at().link().log.is_empty());
}

#[test]
fn gps_fix_after_polling() {
    let mut link = ScriptedModem::sim7000();
    link.on(
        "+CGNSINF",
        &[
            ok(&["+CGNSINF: 1,0,,,,"]),
            ok(&["+CGNSINF: 1,1,20241008233949.000,-1.286389,36.817223,1650.0"]),
        ],
    );
    let (mut m, _, _) = modem(link);
    let mut ctx = context(2, NOW);
    m.power_on(&mut ctx);

    let fix = m.gps_fix(&mut ctx, 30_000).unwrap();

    assert!((fix.latitude + 1.286_389).abs() < 1e-9);
    let link = m.at().link();
    assert_eq!(link.count("+CGNSINF"), 2);
    assert!(link.sent("+CGNSPWR=1"));
    assert!(link.sent("+CGNSPWR=0"));
}

#[test]
fn gps_timeout_logs_failure() {
    let mut link = ScriptedModem::sim7000();
    link.on("+CGNSINF", &[ok(&["+CGNSINF: 1,0,,,,"])]);
    let (mut m, _, _) = modem(link);
    let mut ctx = context(2, NOW);
    m.power_on(&mut ctx);

    assert!(m.gps_fix(&mut ctx, 10_000).is_err());
    assert_eq!(ctx.memory.last_error().0, ErrorCode::GpsFailure);
    assert!(m.at().link().sent("+CGNSPWR=0"));
}
