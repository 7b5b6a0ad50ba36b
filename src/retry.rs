//! Bounded / unbounded retry for unreliable hardware and network calls.
//!
//! Every flaky read in the firmware (battery, signal, humidity, temperature,
//! IMEI) goes through [`retry`].  Between attempts the wrapper:
//!
//! 1. pauses for the policy delay,
//! 2. drains the modem receive buffer so a late reply to the previous
//!    attempt cannot be parsed as the answer to the next one,
//! 3. pets the watchdog.
//!
//! Nothing happens after the final attempt.  The caller gets a [`Retried`]
//! that says whether the value passed the plausibility predicate, failed it,
//! or never arrived.

use log::debug;
use serde::{Deserialize, Serialize};

use crate::app::ports::WatchdogPort;

// ───────────────────────────────────────────────────────────────
// Policy
// ───────────────────────────────────────────────────────────────

/// How many attempts an operation gets.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Budget {
    /// At most this many attempts in total (0 is treated as 1).
    Limited(u32),
    /// Keep trying until the predicate passes.  Only the watchdog can end
    /// this loop early.
    Unbounded,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct RetryPolicy {
    pub budget: Budget,
    pub delay_ms: u32,
}

impl RetryPolicy {
    pub const fn limited(attempts: u32, delay_ms: u32) -> Self {
        Self {
            budget: Budget::Limited(attempts),
            delay_ms,
        }
    }

    pub const fn unbounded(delay_ms: u32) -> Self {
        Self {
            budget: Budget::Unbounded,
            delay_ms,
        }
    }

    fn allows(&self, attempts_made: u32) -> bool {
        match self.budget {
            Budget::Limited(n) => attempts_made < n.max(1),
            Budget::Unbounded => true,
        }
    }
}

// ───────────────────────────────────────────────────────────────
// Host
// ───────────────────────────────────────────────────────────────

/// What the wrapper needs from the thing owning the AT channel.
pub trait RetryHost {
    /// Block for `ms` milliseconds.
    fn pause(&mut self, ms: u32);

    /// Discard stale bytes on the receive buffer, returning how many.
    fn clear_receive_buffer(&mut self) -> usize;
}

// ───────────────────────────────────────────────────────────────
// Outcome
// ───────────────────────────────────────────────────────────────

/// Result of a retried operation.
///
/// `Implausible` and `Failed` are both "no good value"; they are kept apart
/// because the underlying operation distinguished them (an implausible
/// reading still carries the value for diagnostics).
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum Retried<T, E> {
    Valid { value: T, attempts: u32 },
    Implausible { value: T, attempts: u32 },
    Failed { error: E, attempts: u32 },
}

impl<T, E> Retried<T, E> {
    pub fn attempts(&self) -> u32 {
        match self {
            Self::Valid { attempts, .. }
            | Self::Implausible { attempts, .. }
            | Self::Failed { attempts, .. } => *attempts,
        }
    }

    pub fn is_valid(&self) -> bool {
        matches!(self, Self::Valid { .. })
    }

    /// The value, only if it passed the predicate.
    pub fn valid(self) -> Option<T> {
        match self {
            Self::Valid { value, .. } => Some(value),
            _ => None,
        }
    }

    /// The last value the operation produced, plausible or not.
    pub fn last_value(self) -> Option<T> {
        match self {
            Self::Valid { value, .. } | Self::Implausible { value, .. } => Some(value),
            Self::Failed { .. } => None,
        }
    }
}

// ───────────────────────────────────────────────────────────────
// Wrapper
// ───────────────────────────────────────────────────────────────

/// Run `op` until `valid` accepts its value or the budget runs out.
///
/// `op` receives the host, the watchdog and the 1-based attempt number.
/// An attempt that can block for longer than the watchdog period (SMS
/// submit, module restart) must pet it itself.
pub fn retry<H, W, T, E>(
    host: &mut H,
    watchdog: &mut W,
    policy: &RetryPolicy,
    mut op: impl FnMut(&mut H, &mut W, u32) -> Result<T, E>,
    valid: impl Fn(&T) -> bool,
) -> Retried<T, E>
where
    H: RetryHost + ?Sized,
    W: WatchdogPort + ?Sized,
{
    let mut attempt = 0u32;
    loop {
        attempt = attempt.saturating_add(1);
        let outcome = match op(host, watchdog, attempt) {
            Ok(value) if valid(&value) => {
                return Retried::Valid {
                    value,
                    attempts: attempt,
                };
            }
            Ok(value) => Retried::Implausible {
                value,
                attempts: attempt,
            },
            Err(error) => Retried::Failed {
                error,
                attempts: attempt,
            },
        };

        if !policy.allows(attempt) {
            return outcome;
        }

        host.pause(policy.delay_ms);
        let stale = host.clear_receive_buffer();
        if stale > 0 {
            debug!("retry: discarded {} stale bytes before attempt {}", stale, attempt + 1);
        }
        watchdog.pet();
    }
}

// ───────────────────────────────────────────────────────────────
// Plausibility predicates
// ───────────────────────────────────────────────────────────────

/// Predicates shared by the retried reads.
pub mod plausible {
    /// Battery percentage, exclusive (0, 1000).
    pub fn battery(percent: &i32) -> bool {
        *percent > 0 && *percent < 1000
    }

    /// Signal quality percentage after the `99 → 0` mapping.
    pub fn signal(percent: &u8) -> bool {
        *percent > 0
    }

    /// Relative humidity, (0, 100].
    pub fn humidity(rh: &f32) -> bool {
        *rh > 0.0 && *rh <= 100.0
    }

    /// Temperature in °C.  A genuine 0.0 reading is rejected too; the
    /// sensor reports 0 on a failed read and the two are indistinguishable.
    pub fn temperature(celsius: &f32) -> bool {
        celsius.is_finite() && *celsius != 0.0
    }

    pub fn imei(imei: &u64) -> bool {
        *imei != 0
    }
}
