//! Retried climate reads and daily low/avg/high statistics.
//!
//! A failed DHT read usually returns NaN or 0, so both reads go through the
//! shared retry wrapper with a plausibility predicate.  Exhaustion records
//! `SensorFailure`; the caller still gets the last value for diagnostics.

use log::warn;
use serde::Serialize;

use crate::app::context::DeviceContext;
use crate::app::ports::{ClimatePort, ClockPort, RetainedStorage, WatchdogPort};
use crate::error::{ErrorCode, SensorError};
use crate::retry::{self, Retried, RetryHost, RetryPolicy, plausible};

fn read_with<H, S, R, C, W>(
    host: &mut H,
    sensor: &mut S,
    ctx: &mut DeviceContext<R, C, W>,
    policy: &RetryPolicy,
    what: &str,
    mut read: impl FnMut(&mut S) -> Result<f32, SensorError>,
    valid: fn(&f32) -> bool,
) -> Retried<f32, SensorError>
where
    H: RetryHost + ?Sized,
    S: ClimatePort + ?Sized,
    R: RetainedStorage,
    C: ClockPort,
    W: WatchdogPort,
{
    let outcome = retry::retry(host, &mut ctx.watchdog, policy, |_, _, _| read(sensor), valid);
    if !outcome.is_valid() {
        warn!("Sensor: no plausible {} after {} attempt(s)", what, outcome.attempts());
        ctx.log_error(ErrorCode::SensorFailure);
    }
    outcome
}

/// Relative humidity, accepted in (0, 100].
pub fn read_humidity<H, S, R, C, W>(
    host: &mut H,
    sensor: &mut S,
    ctx: &mut DeviceContext<R, C, W>,
    policy: &RetryPolicy,
) -> Retried<f32, SensorError>
where
    H: RetryHost + ?Sized,
    S: ClimatePort + ?Sized,
    R: RetainedStorage,
    C: ClockPort,
    W: WatchdogPort,
{
    read_with(host, sensor, ctx, policy, "humidity", |s| s.read_humidity(), plausible::humidity)
}

/// Temperature in °C.  A true 0.0 °C reading cannot be told apart from a
/// failed read and is retried like one.
pub fn read_temperature<H, S, R, C, W>(
    host: &mut H,
    sensor: &mut S,
    ctx: &mut DeviceContext<R, C, W>,
    policy: &RetryPolicy,
) -> Retried<f32, SensorError>
where
    H: RetryHost + ?Sized,
    S: ClimatePort + ?Sized,
    R: RetainedStorage,
    C: ClockPort,
    W: WatchdogPort,
{
    read_with(
        host,
        sensor,
        ctx,
        policy,
        "temperature",
        |s| s.read_temperature(),
        plausible::temperature,
    )
}

/// Low / average / high over a set of samples.
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize)]
pub struct Stats {
    pub low: f32,
    pub avg: f32,
    pub high: f32,
}

impl Stats {
    /// Non-finite samples are ignored.  `None` when nothing is left.
    pub fn from_samples(samples: &[f32]) -> Option<Self> {
        let mut n = 0u32;
        let mut sum = 0.0f32;
        let mut low = f32::INFINITY;
        let mut high = f32::NEG_INFINITY;
        for &s in samples.iter().filter(|s| s.is_finite()) {
            n += 1;
            sum += s;
            low = low.min(s);
            high = high.max(s);
        }
        (n > 0).then(|| Self {
            low,
            avg: sum / n as f32,
            high,
        })
    }
}
