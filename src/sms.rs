//! SMS broadcast with per-recipient retry.
//!
//! Recipients are served in order.  Each recipient's attempts run through
//! [`retry::retry`], so the modem receive buffer is drained between them
//! and a late `+CMS ERROR` from one attempt cannot answer the next.  A
//! recipient that exhausts its attempts is recorded as `SmsFailure` and
//! skipped; the rest still get the message.

use log::{info, warn};

use crate::app::context::DeviceContext;
use crate::app::ports::{ClockPort, RetainedStorage, SmsSender, WatchdogPort};
use crate::error::ErrorCode;
use crate::retry::{self, RetryPolicy};

/// Per-recipient result of a [`broadcast`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Delivery {
    pub delivered: bool,
    pub attempts: u32,
}

/// Send `message` to every recipient.  Returns `true` only if all of them
/// accepted it.
pub fn broadcast<S, R, C, W, N>(
    sender: &mut S,
    ctx: &mut DeviceContext<R, C, W>,
    recipients: &[N],
    message: &str,
    max_retries: u32,
    retry_delay_ms: u32,
) -> bool
where
    S: SmsSender + ?Sized,
    R: RetainedStorage,
    C: ClockPort,
    W: WatchdogPort,
    N: AsRef<str>,
{
    let policy = RetryPolicy::limited(max_retries, retry_delay_ms);
    let mut all_ok = true;
    for number in recipients {
        let number = number.as_ref();
        let d = send_with_retry(sender, &mut ctx.watchdog, number, message, &policy);
        if d.delivered {
            info!("SMS: sent to {} ({} attempt(s))", number, d.attempts);
        } else {
            warn!("SMS: giving up on {} after {} attempt(s)", number, d.attempts);
            ctx.log_error(ErrorCode::SmsFailure);
            all_ok = false;
        }
    }
    all_ok
}

fn send_with_retry<S, W>(
    sender: &mut S,
    watchdog: &mut W,
    number: &str,
    message: &str,
    policy: &RetryPolicy,
) -> Delivery
where
    S: SmsSender + ?Sized,
    W: WatchdogPort,
{
    let outcome = retry::retry(
        sender,
        watchdog,
        policy,
        |s, wd, attempt| {
            let sent = s.send_sms(number, message, wd);
            if let Err(e) = &sent {
                // Signal is sampled for the log only.
                let signal = s.signal_percent();
                warn!(
                    "SMS: attempt {} to {} failed: {} (signal {:?}%)",
                    attempt, number, e, signal
                );
            }
            sent
        },
        |_| true,
    );
    Delivery {
        delivered: outcome.is_valid(),
        attempts: outcome.attempts(),
    }
}
