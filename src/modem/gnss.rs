//! GNSS fix via `AT+CGNSPWR` / `AT+CGNSINF`.

use embedded_hal::delay::DelayNs;
use embedded_hal::digital::OutputPin;
use log::{info, warn};
use serde::Serialize;

use super::Modem;
use super::at::{DEFAULT_TIMEOUT_MS, fields};
use super::transport::Transport;
use crate::app::context::DeviceContext;
use crate::app::ports::{ClockPort, RetainedStorage, WatchdogPort};
use crate::error::{ErrorCode, ModemError};

const FIX_POLL_MS: u32 = 2_000;

#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct GpsFix {
    pub latitude: f64,
    pub longitude: f64,
}

/// Parse `+CGNSINF: <run>,<fix>,<utc>,<lat>,<lon>,...`.  `None` until the
/// receiver reports a fix.
pub fn parse_cgnsinf(payload: &str) -> Option<GpsFix> {
    let f = fields(payload);
    if f.get(1).map(String::as_str) != Some("1") {
        return None;
    }
    Some(GpsFix {
        latitude: f.get(3)?.parse().ok()?,
        longitude: f.get(4)?.parse().ok()?,
    })
}

impl<T: Transport, P: OutputPin, D: DelayNs> Modem<T, P, D> {
    /// Power the GNSS engine, poll for a fix up to `timeout_ms`, power it
    /// down again.  Logs `GpsFailure` on timeout.
    pub fn gps_fix<R, C, W>(
        &mut self,
        ctx: &mut DeviceContext<R, C, W>,
        timeout_ms: u32,
    ) -> Result<GpsFix, ModemError>
    where
        R: RetainedStorage,
        C: ClockPort,
        W: WatchdogPort,
    {
        self.ensure_on()?;
        if let Err(e) = self.at.command("+CGNSPWR=1", DEFAULT_TIMEOUT_MS) {
            warn!("GPS: power on failed: {}", e);
        }

        let mut waited = 0;
        let fix = loop {
            if let Some(fix) = self
                .at
                .query("+CGNSINF", "+CGNSINF:", DEFAULT_TIMEOUT_MS)
                .ok()
                .and_then(|p| parse_cgnsinf(&p))
            {
                break Some(fix);
            }
            if waited >= timeout_ms {
                break None;
            }
            self.at.pause(FIX_POLL_MS);
            ctx.watchdog.pet();
            waited += FIX_POLL_MS;
        };

        if let Err(e) = self.at.command("+CGNSPWR=0", DEFAULT_TIMEOUT_MS) {
            warn!("GPS: power off failed: {}", e);
        }

        match fix {
            Some(fix) => {
                info!("GPS: fix {:.6},{:.6}", fix.latitude, fix.longitude);
                Ok(fix)
            }
            None => {
                ctx.log_error(ErrorCode::GpsFailure);
                Err(ModemError::NoFix)
            }
        }
    }
}
