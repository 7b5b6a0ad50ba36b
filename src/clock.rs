//! Clock synchronisation and drift detection.
//!
//! The modem reports network time as `YY/MM/DD,HH:MM:SS±TZ`, local time
//! with the zone in signed quarter-hours (3GPP: local minus UTC, so
//! `-16` is UTC−4 and `+22` is UTC+5:30).  The zone field is optional and
//! so are the surrounding quotes; anything else is rejected.
//!
//! [`sync_clock`] commits the UTC instant to the system clock and measures
//! how far the system clock had wandered since the last sync.  The first
//! boot has no trustworthy prior reference, so drift is only recorded from
//! the second boot on.

use log::{info, warn};
use time::{Date, Month, OffsetDateTime, PrimitiveDateTime, Time};

use crate::app::context::DeviceContext;
use crate::app::ports::{ClockPort, RetainedStorage, RtcSource, WatchdogPort};
use crate::error::{Error, ErrorCode, TimestampError};

/// Widest zone the 3GPP field can carry, in quarter-hours.
const MAX_TZ_QUARTERS: i8 = 56;

/// A parsed modem clock reading.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ModemTimestamp {
    local: PrimitiveDateTime,
    tz_quarters: Option<i8>,
}

impl ModemTimestamp {
    pub fn parse(raw: &str) -> Result<Self, TimestampError> {
        let s = strip_quotes(raw.trim())?;
        let b = s.as_bytes();
        if b.len() < 17 {
            return Err(TimestampError::Grammar);
        }
        for (i, sep) in [(2, b'/'), (5, b'/'), (8, b','), (11, b':'), (14, b':')] {
            if b[i] != sep {
                return Err(TimestampError::Grammar);
            }
        }

        let yy = two_digits(b, 0)?;
        let mo = two_digits(b, 3)?;
        let dd = two_digits(b, 6)?;
        let hh = two_digits(b, 9)?;
        let mi = two_digits(b, 12)?;
        let ss = two_digits(b, 15)?;

        let tz_quarters = match &s[17..] {
            "" => None,
            tz => Some(parse_tz(tz)?),
        };

        let month = Month::try_from(mo).map_err(|_| TimestampError::OutOfRange)?;
        let date = Date::from_calendar_date(2000 + i32::from(yy), month, dd)
            .map_err(|_| TimestampError::OutOfRange)?;
        let time = Time::from_hms(hh, mi, ss).map_err(|_| TimestampError::OutOfRange)?;

        Ok(Self {
            local: PrimitiveDateTime::new(date, time),
            tz_quarters,
        })
    }

    /// Zone as reported (local minus UTC, quarter-hours); 0 when absent.
    pub fn tz_quarter_hours(&self) -> i8 {
        self.tz_quarters.unwrap_or(0)
    }

    pub fn has_zone(&self) -> bool {
        self.tz_quarters.is_some()
    }

    /// Quarter-hours to add to local time to obtain UTC.  This is the
    /// reported zone with the sign inverted (`-16` → `+16`).
    pub fn utc_correction_quarter_hours(&self) -> i32 {
        -i32::from(self.tz_quarter_hours())
    }

    /// The wall-clock fields read as if they were UTC.
    pub fn local_unix(&self) -> i64 {
        self.local.assume_utc().unix_timestamp()
    }

    pub fn utc_unix(&self) -> i64 {
        self.local_unix() + i64::from(self.utc_correction_quarter_hours()) * 15 * 60
    }

    pub fn to_utc(&self) -> OffsetDateTime {
        self.local.assume_utc() + time::Duration::minutes(i64::from(self.utc_correction_quarter_hours()) * 15)
    }
}

fn strip_quotes(s: &str) -> Result<&str, TimestampError> {
    match (s.strip_prefix('"'), s.ends_with('"')) {
        (Some(inner), true) => inner.strip_suffix('"').ok_or(TimestampError::Grammar),
        (None, false) => Ok(s),
        _ => Err(TimestampError::Grammar),
    }
}

fn two_digits(b: &[u8], at: usize) -> Result<u8, TimestampError> {
    let (hi, lo) = (b[at], b[at + 1]);
    if !hi.is_ascii_digit() || !lo.is_ascii_digit() {
        return Err(TimestampError::Grammar);
    }
    Ok((hi - b'0') * 10 + (lo - b'0'))
}

fn parse_tz(tz: &str) -> Result<i8, TimestampError> {
    let (sign, digits) = match tz.as_bytes().first() {
        Some(b'+') => (1, &tz[1..]),
        Some(b'-') => (-1, &tz[1..]),
        _ => return Err(TimestampError::Grammar),
    };
    if digits.is_empty() || digits.len() > 2 || !digits.bytes().all(|c| c.is_ascii_digit()) {
        return Err(TimestampError::Grammar);
    }
    let q: i8 = digits.parse().map_err(|_| TimestampError::Grammar)?;
    if q > MAX_TZ_QUARTERS {
        return Err(TimestampError::OutOfRange);
    }
    Ok(sign * q)
}

/// What one synchronisation did.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ClockSync {
    pub timestamp: ModemTimestamp,
    /// New UTC time committed to the system clock.
    pub utc_s: i64,
    /// `new − old` in seconds.
    pub drift_s: i64,
    /// Whether the drift was written to retained memory.
    pub recorded: bool,
}

/// Read the modem clock, set the system clock to it and measure drift.
///
/// Logs `TimestampParse` when the modem answers with something that is not
/// a clock string.
pub fn sync_clock<M, R, C, W>(modem: &mut M, ctx: &mut DeviceContext<R, C, W>) -> Result<ClockSync, Error>
where
    M: RtcSource + ?Sized,
    R: RetainedStorage,
    C: ClockPort,
    W: WatchdogPort,
{
    let old = ctx.clock.now_unix();

    let raw = modem.rtc_timestamp().map_err(|e| {
        warn!("Clock: modem time unavailable: {}", e);
        Error::Modem(e)
    })?;

    let timestamp = match ModemTimestamp::parse(&raw) {
        Ok(ts) => ts,
        Err(e) => {
            warn!("Clock: cannot parse {:?}: {}", raw, e);
            ctx.log_error(ErrorCode::TimestampParse);
            return Err(e.into());
        }
    };

    let utc_s = timestamp.utc_unix();
    ctx.clock.set_unix(utc_s);
    let drift_s = utc_s - old;

    let recorded = ctx.boot_count() > 1;
    if recorded {
        ctx.memory.record_time_drift(drift_s);
    }
    info!(
        "Clock: set to {} (tz {} q), drift {} s{}",
        utc_s,
        timestamp.tz_quarter_hours(),
        drift_s,
        if recorded { "" } else { " (first boot, not recorded)" }
    );

    Ok(ClockSync {
        timestamp,
        utc_s,
        drift_s,
        recorded,
    })
}
