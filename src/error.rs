//! Unified error types for the WaterPAL firmware.
//!
//! Two different things live here:
//!
//! - [`ErrorCode`]: the persisted diagnostic taxonomy.  A single slot in
//!   retained memory holds the most recent code; it travels to the backend
//!   inside the next report and is cleared by the caller afterwards.
//! - [`Error`]: the typed error every subsystem funnels into.  All variants
//!   are `Copy` so they can be passed through the retry wrapper without
//!   allocation.
//!
//! Nothing in this layer is fatal.  Errors are logged, recorded as an
//! [`ErrorCode`] and the wake cycle carries on in degraded mode.

use core::fmt;

use serde::{Deserialize, Serialize};

// ---------------------------------------------------------------------------
// Persisted diagnostic code
// ---------------------------------------------------------------------------

/// Last-error taxonomy stored in retained memory.
///
/// The numeric values are part of the report format (`ERROR: <code> ...`)
/// and must not be renumbered.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[repr(u8)]
pub enum ErrorCode {
    #[default]
    None = 0,
    Unknown = 1,
    GpsFailure = 2,
    SmsFailure = 3,
    ModemFailure = 4,
    SensorFailure = 5,
    WaterSensorFailure = 6,
    BatteryRead = 7,
    TimestampParse = 8,
}

impl ErrorCode {
    pub const fn code(self) -> u8 {
        self as u8
    }

    /// Inverse of [`code`](Self::code).  Unrecognised values map to
    /// `Unknown` so a corrupted slot still reports something.
    pub const fn from_code(code: u8) -> Self {
        match code {
            0 => Self::None,
            2 => Self::GpsFailure,
            3 => Self::SmsFailure,
            4 => Self::ModemFailure,
            5 => Self::SensorFailure,
            6 => Self::WaterSensorFailure,
            7 => Self::BatteryRead,
            8 => Self::TimestampParse,
            _ => Self::Unknown,
        }
    }

    pub const fn is_none(self) -> bool {
        matches!(self, Self::None)
    }
}

/// Strict decoding for raw retained bytes: anything outside the table is
/// rejected and handed back.
impl TryFrom<u8> for ErrorCode {
    type Error = u8;

    fn try_from(code: u8) -> core::result::Result<Self, u8> {
        match code {
            0 => Ok(Self::None),
            1 => Ok(Self::Unknown),
            2..=8 => Ok(Self::from_code(code)),
            other => Err(other),
        }
    }
}

impl fmt::Display for ErrorCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::None => write!(f, "none"),
            Self::Unknown => write!(f, "unknown"),
            Self::GpsFailure => write!(f, "GPS failure"),
            Self::SmsFailure => write!(f, "SMS failure"),
            Self::ModemFailure => write!(f, "modem failure"),
            Self::SensorFailure => write!(f, "sensor failure"),
            Self::WaterSensorFailure => write!(f, "water sensor failure"),
            Self::BatteryRead => write!(f, "battery read failure"),
            Self::TimestampParse => write!(f, "timestamp parse failure"),
        }
    }
}

// ---------------------------------------------------------------------------
// Top-level firmware error
// ---------------------------------------------------------------------------

/// Every fallible operation in the firmware funnels into this type.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Error {
    /// The AT channel misbehaved (timeout, rejection, overflow).
    At(AtError),
    /// A modem-level operation failed after the AT exchange.
    Modem(ModemError),
    /// The modem clock string could not be parsed.
    Timestamp(TimestampError),
    /// An HTTP report could not be delivered.
    Telemetry(TelemetryError),
    /// A compact identifier could not be decoded.
    Identity(IdentityError),
}

impl fmt::Display for Error {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::At(e) => write!(f, "AT: {e}"),
            Self::Modem(e) => write!(f, "modem: {e}"),
            Self::Timestamp(e) => write!(f, "timestamp: {e}"),
            Self::Telemetry(e) => write!(f, "telemetry: {e}"),
            Self::Identity(e) => write!(f, "identity: {e}"),
        }
    }
}

// ---------------------------------------------------------------------------
// AT channel errors
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AtError {
    /// No terminator or marker arrived within the timeout.
    Timeout,
    /// The modem answered `ERROR`, `+CME ERROR` or `+CMS ERROR`.
    Rejected,
    /// The serial link refused a read or write.
    Link,
    /// The reply did not have the expected shape.
    Malformed,
}

impl fmt::Display for AtError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Timeout => write!(f, "response timeout"),
            Self::Rejected => write!(f, "command rejected"),
            Self::Link => write!(f, "serial link error"),
            Self::Malformed => write!(f, "malformed response"),
        }
    }
}

impl From<AtError> for Error {
    fn from(e: AtError) -> Self {
        Self::At(e)
    }
}

// ---------------------------------------------------------------------------
// Modem errors
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ModemError {
    /// The modem is powered off.
    PoweredOff,
    /// Underlying AT exchange failed.
    At(AtError),
    /// Network registration did not complete in time.
    NotRegistered,
    /// The data context could not be activated.
    AttachFailed,
    /// Socket open / send / receive failed.
    Socket,
    /// SMS submission failed.
    SmsRejected,
    /// No GNSS fix within the timeout.
    NoFix,
}

impl fmt::Display for ModemError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::PoweredOff => write!(f, "modem powered off"),
            Self::At(e) => write!(f, "{e}"),
            Self::NotRegistered => write!(f, "network registration timed out"),
            Self::AttachFailed => write!(f, "data context activation failed"),
            Self::Socket => write!(f, "socket failure"),
            Self::SmsRejected => write!(f, "SMS rejected"),
            Self::NoFix => write!(f, "no GNSS fix"),
        }
    }
}

impl From<AtError> for ModemError {
    fn from(e: AtError) -> Self {
        Self::At(e)
    }
}

impl From<ModemError> for Error {
    fn from(e: ModemError) -> Self {
        Self::Modem(e)
    }
}

// ---------------------------------------------------------------------------
// Timestamp parse errors
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TimestampError {
    /// Neither accepted grammar matched.
    Grammar,
    /// The grammar matched but the fields are not a real calendar date/time.
    OutOfRange,
}

impl fmt::Display for TimestampError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Grammar => write!(f, "unrecognised clock format"),
            Self::OutOfRange => write!(f, "calendar field out of range"),
        }
    }
}

impl From<TimestampError> for Error {
    fn from(e: TimestampError) -> Self {
        Self::Timestamp(e)
    }
}

// ---------------------------------------------------------------------------
// Telemetry errors
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TelemetryError {
    /// `connect()` has not succeeded.
    NotConnected,
    /// The modem socket layer failed.
    Link(ModemError),
    /// No usable status line came back.  Transient: the caller may retry
    /// the whole report.
    NoStatus,
    /// The backend answered with a status outside the accepted set.
    Rejected(u16),
    /// The request could not be encoded.
    Encoding,
}

impl TelemetryError {
    /// Whether retrying the same report later is meaningful.
    pub const fn is_transient(self) -> bool {
        matches!(self, Self::NoStatus | Self::Link(_) | Self::NotConnected)
    }
}

impl fmt::Display for TelemetryError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::NotConnected => write!(f, "data connection not established"),
            Self::Link(e) => write!(f, "link: {e}"),
            Self::NoStatus => write!(f, "no HTTP status code received"),
            Self::Rejected(code) => write!(f, "unexpected HTTP status {code}"),
            Self::Encoding => write!(f, "request encoding failed"),
        }
    }
}

impl From<ModemError> for TelemetryError {
    fn from(e: ModemError) -> Self {
        Self::Link(e)
    }
}

impl From<TelemetryError> for Error {
    fn from(e: TelemetryError) -> Self {
        Self::Telemetry(e)
    }
}

// ---------------------------------------------------------------------------
// Sensor errors
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SensorError {
    /// The sensor did not answer.
    Timeout,
    /// Frame received but the checksum did not match.
    Checksum,
}

impl fmt::Display for SensorError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Timeout => write!(f, "sensor timeout"),
            Self::Checksum => write!(f, "sensor checksum mismatch"),
        }
    }
}

// ---------------------------------------------------------------------------
// Identity errors
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum IdentityError {
    /// Not valid standard base64 (no padding).
    Encoding,
    /// Decodes to more than 8 bytes.
    TooLong,
    /// Decimal IMEI string empty, too long or non-numeric.
    InvalidDigits,
}

impl fmt::Display for IdentityError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Encoding => write!(f, "invalid base64"),
            Self::TooLong => write!(f, "identifier wider than 64 bits"),
            Self::InvalidDigits => write!(f, "invalid decimal identifier"),
        }
    }
}

impl From<IdentityError> for Error {
    fn from(e: IdentityError) -> Self {
        Self::Identity(e)
    }
}

// ---------------------------------------------------------------------------
// Convenience Result alias
// ---------------------------------------------------------------------------

/// Firmware-wide `Result` alias.
pub type Result<T> = core::result::Result<T, Error>;
