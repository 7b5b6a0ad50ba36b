//! Status queries: battery, signal, serving cell, real-time clock.

use embedded_hal::delay::DelayNs;
use embedded_hal::digital::OutputPin;
use log::{debug, warn};
use serde::Serialize;

use super::Modem;
use super::at::{DEFAULT_TIMEOUT_MS, fields};
use super::transport::Transport;
use crate::app::context::DeviceContext;
use crate::app::ports::{ClockPort, RetainedStorage, RtcSource, WatchdogPort};
use crate::error::{AtError, ErrorCode, ModemError};
use crate::retry::{self, Retried, RetryPolicy, plausible};

/// `AT+CBC` reading.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize)]
pub struct BatteryInfo {
    /// 0 not charging, 1 charging, 2 charged.
    pub charge_state: u8,
    pub percent: i32,
    pub voltage_mv: i32,
}

impl BatteryInfo {
    /// Parse the payload of `+CBC: <bcs>,<bcl>,<mV>`.
    pub fn parse(payload: &str) -> Option<Self> {
        let f = fields(payload);
        if f.len() < 3 {
            return None;
        }
        Some(Self {
            charge_state: f[0].parse().ok()?,
            percent: f[1].parse().ok()?,
            voltage_mv: f[2].parse().ok()?,
        })
    }
}

/// Map a `+CSQ` RSSI index (0..=31, 99 unknown) to a percentage.
pub fn csq_to_percent(rssi: u8) -> u8 {
    if rssi > 31 {
        return 0;
    }
    (u32::from(rssi) * 100 / 31) as u8
}

impl<T: Transport, P: OutputPin, D: DelayNs> Modem<T, P, D> {
    pub fn battery_once(&mut self) -> Result<BatteryInfo, ModemError> {
        self.ensure_on()?;
        let payload = self.at.query("+CBC", "+CBC:", DEFAULT_TIMEOUT_MS)?;
        BatteryInfo::parse(&payload).ok_or(ModemError::At(AtError::Malformed))
    }

    /// Retried battery read.  Logs `BatteryRead` if no plausible value
    /// arrives within the policy.
    pub fn battery_info<R, C, W>(
        &mut self,
        ctx: &mut DeviceContext<R, C, W>,
        policy: &RetryPolicy,
    ) -> Retried<BatteryInfo, ModemError>
    where
        R: RetainedStorage,
        C: ClockPort,
        W: WatchdogPort,
    {
        let outcome = retry::retry(
            self,
            &mut ctx.watchdog,
            policy,
            |modem, _, _| modem.battery_once(),
            |b| plausible::battery(&b.percent),
        );
        if !outcome.is_valid() {
            warn!("Modem: battery read failed after {} attempt(s)", outcome.attempts());
            ctx.log_error(ErrorCode::BatteryRead);
        }
        outcome
    }

    /// Single `AT+CSQ` read, already mapped to percent.
    pub fn signal_once(&mut self) -> Result<u8, ModemError> {
        self.ensure_on()?;
        let payload = self.at.query("+CSQ", "+CSQ:", DEFAULT_TIMEOUT_MS)?;
        let rssi: u8 = fields(&payload)
            .first()
            .and_then(|s| s.parse().ok())
            .ok_or(ModemError::At(AtError::Malformed))?;
        Ok(csq_to_percent(rssi))
    }

    pub fn signal_quality<R, C, W>(
        &mut self,
        ctx: &mut DeviceContext<R, C, W>,
        policy: &RetryPolicy,
    ) -> Retried<u8, ModemError>
    where
        R: RetainedStorage,
        C: ClockPort,
        W: WatchdogPort,
    {
        let outcome = retry::retry(
            self,
            &mut ctx.watchdog,
            policy,
            |modem, _, _| modem.signal_once(),
            plausible::signal,
        );
        if !outcome.is_valid() {
            warn!("Modem: no usable signal after {} attempt(s)", outcome.attempts());
        }
        outcome
    }

    /// Free-form serving cell description from `AT+CPSI?`.  Empty when the
    /// module does not answer.
    pub fn cell_info(&mut self) -> String {
        if self.ensure_on().is_err() {
            return String::new();
        }
        match self.at.query("+CPSI?", "+CPSI:", DEFAULT_TIMEOUT_MS) {
            Ok(info) => info,
            Err(e) => {
                debug!("Modem: CPSI failed: {}", e);
                String::new()
            }
        }
    }

    /// Raw `AT+CCLK?` payload, e.g. `"24/10/08,23:39:49-16"`.
    pub fn rtc_timestamp(&mut self) -> Result<String, ModemError> {
        self.ensure_on()?;
        Ok(self.at.query("+CCLK?", "+CCLK:", DEFAULT_TIMEOUT_MS)?)
    }
}

impl<T: Transport, P: OutputPin, D: DelayNs> RtcSource for Modem<T, P, D> {
    fn rtc_timestamp(&mut self) -> Result<String, ModemError> {
        Modem::rtc_timestamp(self)
    }
}
