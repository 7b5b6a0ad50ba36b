//! Persistent device memory.
//!
//! [`DeviceMemory`] is the one record that survives deep sleep.  It lives in
//! a [`RetainedStorage`] (RTC slow memory on target) and is reset to its
//! default by power loss or a reflash.
//!
//! [`PersistentState`] caches the record and writes the whole thing back on
//! every mutation, so a reset at any point leaves either the old or the new
//! record in retained memory and never a half-updated error pair.

use serde::{Deserialize, Serialize};

use crate::app::ports::RetainedStorage;
use crate::error::ErrorCode;

/// The retained record.
///
/// `sms_count` is the running total of delivered messages since power-on.
/// `usage_s` is the flow time accumulated by the float-switch driver since
/// the last delivered report.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct DeviceMemory {
    pub boot_count: u32,
    pub last_error_code: ErrorCode,
    pub last_error_time_s: i64,
    pub last_time_drift_s: i64,
    pub sms_count: u32,
    pub usage_s: u32,
}

impl DeviceMemory {
    /// Power-on value; `const` so it can initialise a `static`.
    pub const INITIAL: Self = Self {
        boot_count: 0,
        last_error_code: ErrorCode::None,
        last_error_time_s: 0,
        last_time_drift_s: 0,
        sms_count: 0,
        usage_s: 0,
    };
}

/// Single-owner accessors over the retained record.
pub struct PersistentState<R: RetainedStorage> {
    storage: R,
    memory: DeviceMemory,
}

impl<R: RetainedStorage> PersistentState<R> {
    pub fn new(storage: R) -> Self {
        let memory = storage.load();
        Self { storage, memory }
    }

    /// Give the backing store back (e.g. to simulate a deep-sleep cycle).
    pub fn into_storage(self) -> R {
        self.storage
    }

    pub fn snapshot(&self) -> DeviceMemory {
        self.memory
    }

    // ── Boot count ────────────────────────────────────────────

    pub fn boot_count(&self) -> u32 {
        self.memory.boot_count
    }

    /// Count this wake cycle.  Call exactly once per wake, before anything
    /// else reads the boot count.
    pub fn begin_wake_cycle(&mut self) -> u32 {
        self.memory.boot_count = self.memory.boot_count.saturating_add(1);
        self.commit();
        self.memory.boot_count
    }

    // ── Last error ────────────────────────────────────────────

    /// Record `code` as the last error, overwriting whatever was there.
    pub fn log_error(&mut self, code: ErrorCode, now_s: i64) {
        self.memory.last_error_code = code;
        self.memory.last_error_time_s = now_s;
        self.commit();
        log::error!("  >>> ERROR: {} ({}) at {}", code.code(), code, now_s);
    }

    pub fn clear_error(&mut self) {
        self.memory.last_error_code = ErrorCode::None;
        self.memory.last_error_time_s = 0;
        self.commit();
    }

    pub fn last_error(&self) -> (ErrorCode, i64) {
        (self.memory.last_error_code, self.memory.last_error_time_s)
    }

    /// Diagnostic string for outbound reports, `None` when no error is
    /// pending.  Never use this for control flow.
    pub fn error_report(&self) -> Option<String> {
        if self.memory.last_error_code.is_none() {
            return None;
        }
        Some(format!(
            "ERROR: {} (at {})",
            self.memory.last_error_code.code(),
            self.memory.last_error_time_s
        ))
    }

    // ── Clock drift ───────────────────────────────────────────

    pub fn last_time_drift_s(&self) -> i64 {
        self.memory.last_time_drift_s
    }

    /// Written only by the clock synchroniser.
    pub(crate) fn record_time_drift(&mut self, drift_s: i64) {
        self.memory.last_time_drift_s = drift_s;
        self.commit();
    }

    // ── Counters ──────────────────────────────────────────────

    pub fn sms_count(&self) -> u32 {
        self.memory.sms_count
    }

    /// Add `delivered` messages to the running total.
    pub fn record_sms_sent(&mut self, delivered: u32) {
        if delivered == 0 {
            return;
        }
        self.memory.sms_count = self.memory.sms_count.saturating_add(delivered);
        self.commit();
    }

    pub fn usage_s(&self) -> u32 {
        self.memory.usage_s
    }

    /// Called by the float-switch driver with the flow time of one event.
    pub fn add_usage(&mut self, seconds: u32) {
        self.memory.usage_s = self.memory.usage_s.saturating_add(seconds);
        self.commit();
    }

    /// Start a new usage window once a report carrying it was delivered.
    pub fn clear_usage(&mut self) {
        self.memory.usage_s = 0;
        self.commit();
    }

    fn commit(&mut self) {
        self.storage.store(&self.memory);
    }
}
