//! Retained-memory adapters for [`DeviceMemory`].
//!
//! - **`target_os = "espidf"`**: [`RtcMemory`] keeps the record in RTC
//!   slow memory (`.rtc.data`).  The ROM loader initialises the section on
//!   power-on and after a flash, and leaves it untouched across deep sleep.
//!   The section holds an [`RtcRecord`] of plain integers; the error code is
//!   decoded on load so a corrupted byte cannot become an invalid enum.
//! - **all targets**: [`RetainedRam`] holds the record in an ordinary
//!   field, with [`RetainedRam::power_loss`] to model a cold reset in
//!   host-side tests.

use log::warn;

use crate::app::ports::RetainedStorage;
use crate::error::ErrorCode;
use crate::state::DeviceMemory;

// ───────────────────────────────────────────────────────────────
// Raw layout
// ───────────────────────────────────────────────────────────────

/// [`DeviceMemory`] as it sits in retained RAM.  Every bit pattern is a
/// valid value.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(C)]
pub struct RtcRecord {
    pub boot_count: u32,
    pub sms_count: u32,
    pub usage_s: u32,
    pub last_error_code: u8,
    pub last_error_time_s: i64,
    pub last_time_drift_s: i64,
}

impl RtcRecord {
    pub const INITIAL: Self = Self::encode(&DeviceMemory::INITIAL);

    pub const fn encode(memory: &DeviceMemory) -> Self {
        Self {
            boot_count: memory.boot_count,
            sms_count: memory.sms_count,
            usage_s: memory.usage_s,
            last_error_code: memory.last_error_code.code(),
            last_error_time_s: memory.last_error_time_s,
            last_time_drift_s: memory.last_time_drift_s,
        }
    }

    /// An unknown error byte reads back as "no error".
    pub fn decode(&self) -> DeviceMemory {
        let last_error_code = ErrorCode::try_from(self.last_error_code).unwrap_or_else(|raw| {
            warn!("Retained error code {} is not valid; clearing it", raw);
            ErrorCode::None
        });
        DeviceMemory {
            boot_count: self.boot_count,
            last_error_code,
            last_error_time_s: self.last_error_time_s,
            last_time_drift_s: self.last_time_drift_s,
            sms_count: self.sms_count,
            usage_s: self.usage_s,
        }
    }
}

// ───────────────────────────────────────────────────────────────
// RTC slow memory (target)
// ───────────────────────────────────────────────────────────────

#[cfg(target_os = "espidf")]
#[unsafe(link_section = ".rtc.data")]
static mut RTC_RECORD: RtcRecord = RtcRecord::INITIAL;

/// Handle to the record in RTC slow memory.
///
/// Construct exactly once per boot.  The firmware is single-threaded, so
/// the `static mut` is never accessed concurrently.
#[cfg(target_os = "espidf")]
pub struct RtcMemory {
    _private: (),
}

#[cfg(target_os = "espidf")]
impl RtcMemory {
    pub fn take() -> Self {
        Self { _private: () }
    }
}

#[cfg(target_os = "espidf")]
impl RetainedStorage for RtcMemory {
    fn load(&self) -> DeviceMemory {
        // SAFETY: single-threaded access; the record is plain integers.
        let raw = unsafe { *(&raw const RTC_RECORD) };
        raw.decode()
    }

    fn store(&mut self, memory: &DeviceMemory) {
        // SAFETY: as above; one whole-record write.
        unsafe {
            *(&raw mut RTC_RECORD) = RtcRecord::encode(memory);
        }
    }
}

// ───────────────────────────────────────────────────────────────
// Plain RAM (host / simulation)
// ───────────────────────────────────────────────────────────────

/// In-memory retained storage.  Survives as long as the value does.
///
/// Holds the same [`RtcRecord`] layout as the target so decoding is
/// exercised on the host.
#[derive(Debug)]
pub struct RetainedRam {
    record: RtcRecord,
    writes: u32,
}

impl Default for RetainedRam {
    fn default() -> Self {
        Self {
            record: RtcRecord::INITIAL,
            writes: 0,
        }
    }
}

impl RetainedRam {
    pub fn new() -> Self {
        Self::default()
    }

    /// Seed the record, e.g. to start a test at boot 5.
    pub fn with(memory: DeviceMemory) -> Self {
        Self {
            record: RtcRecord::encode(&memory),
            writes: 0,
        }
    }

    /// Seed the raw record, e.g. with a corrupted error byte.
    pub fn with_raw(record: RtcRecord) -> Self {
        Self { record, writes: 0 }
    }

    /// Model a full power loss: the record returns to its power-on value.
    pub fn power_loss(&mut self) {
        self.record = RtcRecord::INITIAL;
    }

    /// Number of `store` calls seen.
    pub fn writes(&self) -> u32 {
        self.writes
    }
}

impl RetainedStorage for RetainedRam {
    fn load(&self) -> DeviceMemory {
        self.record.decode()
    }

    fn store(&mut self, memory: &DeviceMemory) {
        self.record = RtcRecord::encode(memory);
        self.writes += 1;
    }
}
