//! Wall-clock adapters.
//!
//! - [`SystemClock`]: the real clock.
//!   - **`target_os = "espidf"`** wraps `gettimeofday` / `settimeofday`;
//!     the ESP32 RTC keeps counting through deep sleep.
//!   - **`not(target_os = "espidf")`** uses `std::time::SystemTime` plus an
//!     offset so `set_unix` works without touching the host clock.
//! - [`SimClock`]: a manually advanced clock for deterministic tests.

use crate::app::ports::ClockPort;

/// System real-time clock.
pub struct SystemClock {
    #[cfg(not(target_os = "espidf"))]
    offset_s: i64,
}

impl Default for SystemClock {
    fn default() -> Self {
        Self::new()
    }
}

impl SystemClock {
    pub fn new() -> Self {
        Self {
            #[cfg(not(target_os = "espidf"))]
            offset_s: 0,
        }
    }

    #[cfg(not(target_os = "espidf"))]
    fn host_now() -> i64 {
        std::time::SystemTime::now()
            .duration_since(std::time::UNIX_EPOCH)
            .map_or(0, |d| d.as_secs() as i64)
    }
}

#[cfg(target_os = "espidf")]
impl ClockPort for SystemClock {
    fn now_unix(&self) -> i64 {
        let mut tv = esp_idf_svc::sys::timeval {
            tv_sec: 0,
            tv_usec: 0,
        };
        // SAFETY: plain libc call writing into a local.
        if unsafe { esp_idf_svc::sys::gettimeofday(&mut tv, core::ptr::null_mut()) } != 0 {
            return 0;
        }
        tv.tv_sec as i64
    }

    fn set_unix(&mut self, secs: i64) {
        let tv = esp_idf_svc::sys::timeval {
            tv_sec: secs as esp_idf_svc::sys::time_t,
            tv_usec: 0,
        };
        // SAFETY: plain libc call reading a local.
        let ret = unsafe { esp_idf_svc::sys::settimeofday(&tv, core::ptr::null()) };
        if ret != 0 {
            log::warn!("SystemClock: settimeofday returned {}", ret);
        }
    }
}

#[cfg(not(target_os = "espidf"))]
impl ClockPort for SystemClock {
    fn now_unix(&self) -> i64 {
        Self::host_now() + self.offset_s
    }

    fn set_unix(&mut self, secs: i64) {
        self.offset_s = secs - Self::host_now();
    }
}

/// Deterministic clock: only moves when told to.
#[derive(Debug, Default, Clone, Copy)]
pub struct SimClock {
    now_s: i64,
}

impl SimClock {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn at(now_s: i64) -> Self {
        Self { now_s }
    }

    pub fn advance(&mut self, secs: i64) {
        self.now_s += secs;
    }
}

impl ClockPort for SimClock {
    fn now_unix(&self) -> i64 {
        self.now_s
    }

    fn set_unix(&mut self, secs: i64) {
        self.now_s = secs;
    }
}
