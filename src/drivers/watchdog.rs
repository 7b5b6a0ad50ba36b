//! Task Watchdog Timer (TWDT) driver.
//!
//! Wraps the ESP-IDF TWDT API to reset the device if the wake cycle stalls
//! for more than [`WATCHDOG_TIMEOUT_SECS`].  The TWDT ceiling is 60 s, so
//! every loop that can block that long (registration wait, GPS polling,
//! sensor retries, HTTP receive) must call `pet()` inside the loop.
//!
//! `enable()` / `disable()` bracket the active part of the wake cycle and
//! are idempotent.

#[cfg(target_os = "espidf")]
use esp_idf_svc::sys::*;

use log::info;

use crate::app::ports::WatchdogPort;

/// Hardware maximum for the task watchdog.
pub const WATCHDOG_TIMEOUT_SECS: u32 = 60;

pub struct TaskWatchdog {
    enabled: bool,
    pets: u32,
}

impl Default for TaskWatchdog {
    fn default() -> Self {
        Self::new()
    }
}

impl TaskWatchdog {
    /// Construct disarmed.  Call [`WatchdogPort::enable`] to arm.
    pub fn new() -> Self {
        Self {
            enabled: false,
            pets: 0,
        }
    }

    pub fn is_enabled(&self) -> bool {
        self.enabled
    }

    /// Pets since construction (diagnostics and tests).
    pub fn pets(&self) -> u32 {
        self.pets
    }

    #[cfg(target_os = "espidf")]
    fn platform_enable(&mut self) {
        unsafe {
            let cfg = esp_task_wdt_config_t {
                timeout_ms: WATCHDOG_TIMEOUT_SECS * 1000,
                idle_core_mask: 0,
                trigger_panic: true,
            };
            let ret = esp_task_wdt_reconfigure(&cfg);
            if ret != ESP_OK {
                log::warn!("TWDT reconfigure returned {} (may already be configured)", ret);
            }

            let ret = esp_task_wdt_add(core::ptr::null_mut());
            if ret != ESP_OK {
                log::warn!("Watchdog: failed to subscribe ({})", ret);
            }
        }
    }

    #[cfg(not(target_os = "espidf"))]
    fn platform_enable(&mut self) {}

    #[cfg(target_os = "espidf")]
    fn platform_disable(&mut self) {
        let ret = unsafe { esp_task_wdt_delete(core::ptr::null_mut()) };
        if ret != ESP_OK {
            log::warn!("Watchdog: failed to unsubscribe ({})", ret);
        }
    }

    #[cfg(not(target_os = "espidf"))]
    fn platform_disable(&mut self) {}

    #[cfg(target_os = "espidf")]
    fn platform_pet(&mut self) {
        unsafe {
            esp_task_wdt_reset();
        }
    }

    #[cfg(not(target_os = "espidf"))]
    fn platform_pet(&mut self) {}
}

impl WatchdogPort for TaskWatchdog {
    fn enable(&mut self) {
        if self.enabled {
            return;
        }
        self.platform_enable();
        self.enabled = true;
        info!("Watchdog enabled ({}s, panic on trigger)", WATCHDOG_TIMEOUT_SECS);
    }

    fn disable(&mut self) {
        if !self.enabled {
            return;
        }
        self.platform_disable();
        self.enabled = false;
        info!("Watchdog disabled");
    }

    fn pet(&mut self) {
        if self.enabled {
            self.platform_pet();
        }
        self.pets = self.pets.wrapping_add(1);
        log::trace!("Watchdog petted");
    }
}
