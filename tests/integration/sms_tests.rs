//! SMS broadcast over the scripted modem.

use crate::mock_modem::{ScriptedModem, context, modem, ok};

use waterpal::ErrorCode;
use waterpal::sms;

const NOW: i64 = 1_728_000_000;
const RECIPIENTS: [&str; 2] = ["+15550001", "+15550002"];

#[test]
fn every_recipient_gets_the_text() {
    let (mut m, _, _) = modem(ScriptedModem::sim7000());
    let mut ctx = context(2, NOW);
    m.power_on(&mut ctx);

    assert!(sms::broadcast(&mut m, &mut ctx, &RECIPIENTS, "usage 42 s", 3, 1_000));

    let link = m.at().link();
    assert_eq!(link.sms_sent.len(), 2);
    assert_eq!(link.sms_sent[0].number, "+15550001");
    assert_eq!(link.sms_sent[1].text, "usage 42 s");
    assert!(link.sent("+CMGF=1"));
    assert_eq!(ctx.memory.last_error().0, ErrorCode::None);
}

#[test]
fn exhausted_recipient_does_not_block_the_next() {
    let mut link = ScriptedModem::sim7000();
    link.sms_outcomes.extend([false, false, false]);
    let (mut m, _, delay) = modem(link);
    let mut ctx = context(2, NOW);
    m.power_on(&mut ctx);
    let before = delay.elapsed_ms.get();

    assert!(!sms::broadcast(&mut m, &mut ctx, &RECIPIENTS, "hello", 3, 1_000));

    let link = m.at().link();
    assert_eq!(link.count("+CMGS=\"+15550001\""), 3);
    assert_eq!(link.count("+CMGS=\"+15550002\""), 1);
    assert_eq!(link.sms_sent.len(), 1);
    assert_eq!(link.sms_sent[0].number, "+15550002");
    // signal sampled after each failure
    assert_eq!(link.count("+CSQ"), 3);
    // two pauses: none after the final attempt
    let paused = delay.elapsed_ms.get() - before;
    assert!((2_000..3_000).contains(&paused), "paused {paused} ms");
    assert_eq!(ctx.memory.last_error(), (ErrorCode::SmsFailure, NOW));
}

#[test]
fn zero_retries_still_attempts_once() {
    let (mut m, _, _) = modem(ScriptedModem::sim7000());
    let mut ctx = context(2, NOW);
    m.power_on(&mut ctx);

    assert!(sms::broadcast(&mut m, &mut ctx, &RECIPIENTS[..1], "x", 0, 1_000));
    assert_eq!(m.at().link().count("+CMGS="), 1);
}

#[test]
fn powered_off_modem_fails_every_recipient() {
    let (mut m, _, _) = modem(ScriptedModem::sim7000());
    let mut ctx = context(2, NOW);

    assert!(!sms::broadcast(&mut m, &mut ctx, &RECIPIENTS, "x", 2, 10));
    assert!(m.at().link().sms_sent.is_empty());
    assert_eq!(ctx.memory.last_error().0, ErrorCode::SmsFailure);
}

#[test]
fn late_rejection_is_drained_before_the_next_attempt() {
    let mut link = ScriptedModem::sim7000();
    // the failed submit's final report trails the signal sample
    link.on("+CSQ", &[format!("{}\r\n+CMS ERROR: 500\r\n", ok(&["+CSQ: 20,99"]))]);
    link.sms_outcomes.extend([false, true]);
    let (mut m, _, _) = modem(link);
    let mut ctx = context(2, NOW);
    m.power_on(&mut ctx);

    assert!(sms::broadcast(&mut m, &mut ctx, &RECIPIENTS[..1], "hello", 2, 1_000));

    let link = m.at().link();
    assert_eq!(link.count("+CMGS="), 2);
    assert_eq!(link.sms_sent.len(), 1);
    assert_eq!(link.pending_rx(), 0);
    assert_eq!(ctx.memory.last_error().0, ErrorCode::None);
}

#[test]
fn unacknowledged_submit_keeps_the_watchdog_fed() {
    let mut link = ScriptedModem::sim7000();
    link.sms_unacknowledged = true;
    let (mut m, _, delay) = modem(link);
    let mut ctx = context(2, NOW);
    m.power_on(&mut ctx);
    let pets_before = ctx.watchdog.pets();
    let before = delay.elapsed_ms.get();

    assert!(!sms::broadcast(&mut m, &mut ctx, &RECIPIENTS[..1], "x", 1, 1_000));

    // a full minute waiting for the submit report
    assert!(delay.elapsed_ms.get() - before >= 60_000);
    assert!(ctx.watchdog.pets() - pets_before >= 60);
    assert_eq!(ctx.memory.last_error().0, ErrorCode::SmsFailure);
}
