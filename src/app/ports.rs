//! Port traits: the hexagonal boundary between the resilience layer and
//! the outside world.
//!
//! ```text
//!   Adapter ──▶ Port trait ──▶ modem / clock / sms / telemetry (domain)
//! ```
//!
//! Driven adapters (RTC memory, system clock, task watchdog, NVS, the modem
//! itself) implement these traits.  The domain consumes them via generics,
//! so every component is testable on the host with mock adapters.

use crate::config::DeviceConfig;
use crate::error::{ModemError, SensorError};
use crate::retry::RetryHost;
use crate::state::DeviceMemory;

// ───────────────────────────────────────────────────────────────
// Retained storage (survives deep sleep, not power loss)
// ───────────────────────────────────────────────────────────────

/// Backing store for the [`DeviceMemory`] record.
///
/// Implementations live in memory that deep sleep does not clear (RTC slow
/// memory on the ESP32).  A full power loss or a reflash resets the record
/// to [`DeviceMemory::default`].
pub trait RetainedStorage {
    fn load(&self) -> DeviceMemory;

    /// Persist the whole record in one write.
    fn store(&mut self, memory: &DeviceMemory);
}

// ───────────────────────────────────────────────────────────────
// Wall clock
// ───────────────────────────────────────────────────────────────

/// System real-time clock, UTC seconds since the Unix epoch.
pub trait ClockPort {
    fn now_unix(&self) -> i64;
    fn set_unix(&mut self, secs: i64);
}

// ───────────────────────────────────────────────────────────────
// Watchdog
// ───────────────────────────────────────────────────────────────

/// Hardware watchdog.  Failing to [`pet`](Self::pet) within the timeout
/// resets the chip, which is the last-resort recovery from a wedged radio.
pub trait WatchdogPort {
    /// Arm the watchdog for the current task.  Idempotent.
    fn enable(&mut self);
    /// Disarm.  Idempotent.
    fn disable(&mut self);
    fn pet(&mut self);
}

// ───────────────────────────────────────────────────────────────
// Climate sensor
// ───────────────────────────────────────────────────────────────

/// Temperature / humidity sensor (DHT-class on the board).
pub trait ClimatePort {
    /// Relative humidity in percent.
    fn read_humidity(&mut self) -> Result<f32, SensorError>;
    /// Temperature in °C.
    fn read_temperature(&mut self) -> Result<f32, SensorError>;
}

// ───────────────────────────────────────────────────────────────
// Modem clock
// ───────────────────────────────────────────────────────────────

/// Source of the network-provided local time (`AT+CCLK?`).
pub trait RtcSource {
    /// Raw clock string, e.g. `"24/10/08,23:39:49-16"`.
    fn rtc_timestamp(&mut self) -> Result<String, ModemError>;
}

// ───────────────────────────────────────────────────────────────
// SMS
// ───────────────────────────────────────────────────────────────

/// Anything that can submit a single text message.
///
/// The [`RetryHost`] half lets the broadcast run every attempt through the
/// shared retry wrapper, which clears the receive buffer between attempts.
pub trait SmsSender: RetryHost {
    /// Submit one message.  The submit acknowledgement can take up to a
    /// minute; `watchdog` must be petted while waiting for it.
    fn send_sms(
        &mut self,
        number: &str,
        text: &str,
        watchdog: &mut dyn WatchdogPort,
    ) -> Result<(), ModemError>;

    /// Raw signal percentage for diagnostics.  Never used for control flow.
    fn signal_percent(&mut self) -> Option<u8>;
}

// ───────────────────────────────────────────────────────────────
// Cellular data
// ───────────────────────────────────────────────────────────────

/// Network registration and packet-data context control.
pub trait NetworkPort {
    /// Discard stale bytes on the AT channel.
    fn clear_receive_buffer(&mut self) -> usize;

    /// Poll registration until attached or `timeout_ms` elapses.  Must pet
    /// `watchdog` while waiting.
    fn wait_for_network(&mut self, timeout_ms: u32, watchdog: &mut dyn WatchdogPort) -> bool;

    fn is_network_connected(&mut self) -> bool;

    /// Configure and activate the data context, polling until an address
    /// is assigned.  Must pet `watchdog` on every poll.
    fn attach(
        &mut self,
        apn: &str,
        user: &str,
        pass: &str,
        watchdog: &mut dyn WatchdogPort,
    ) -> Result<(), ModemError>;

    fn detach(&mut self) -> Result<(), ModemError>;
}

/// A single TCP (optionally TLS) stream through the modem.
pub trait SocketPort {
    fn open(&mut self, host: &str, port: u16, secure: bool) -> Result<(), ModemError>;

    fn send(&mut self, data: &[u8]) -> Result<(), ModemError>;

    /// Read up to `max` bytes already buffered by the modem.  Returns an
    /// empty vector when nothing is pending.
    fn recv(&mut self, max: usize) -> Result<Vec<u8>, ModemError>;

    fn close(&mut self);

    fn is_open(&self) -> bool;

    /// Block for `ms` milliseconds while polling.
    fn idle(&mut self, ms: u32);
}

// ───────────────────────────────────────────────────────────────
// Configuration port (driven adapter: domain ↔ persistent config)
// ───────────────────────────────────────────────────────────────

/// Loads and persists device configuration.
///
/// Implementations MUST validate config values before persisting.
/// Invalid values are rejected with [`ConfigError::ValidationFailed`],
/// not silently clamped.
pub trait ConfigPort {
    /// Load configuration from persistent storage.
    /// Returns [`DeviceConfig::default()`] if no stored config exists.
    fn load(&self) -> Result<DeviceConfig, ConfigError>;

    /// Validate and persist configuration.
    fn save(&self, config: &DeviceConfig) -> Result<(), ConfigError>;
}

// ───────────────────────────────────────────────────────────────
// Error types
// ───────────────────────────────────────────────────────────────

/// Errors from [`ConfigPort`] operations.
#[derive(Debug, PartialEq, Eq)]
pub enum ConfigError {
    /// Stored config failed integrity / deserialization check.
    Corrupted,
    /// A config field failed range validation.
    /// The `&'static str` describes which field and why.
    ValidationFailed(&'static str),
    /// Generic I/O error from the storage backend.
    IoError,
}

impl core::fmt::Display for ConfigError {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        match self {
            Self::Corrupted => write!(f, "config corrupted"),
            Self::ValidationFailed(msg) => write!(f, "validation failed: {}", msg),
            Self::IoError => write!(f, "I/O error"),
        }
    }
}
