//! Adapters: concrete implementations of the hexagonal port traits.
//!
//! | Adapter      | Implements        | Connects to                    |
//! |--------------|-------------------|--------------------------------|
//! | `nvs`        | ConfigPort        | NVS / in-memory store          |
//! | `rtc_memory` | RetainedStorage   | RTC slow memory / host RAM     |
//! | `time`       | ClockPort         | libc `timeofday` / sim clock   |
//! | `uart`       | Transport         | ESP32 UART to the modem        |

pub mod nvs;
pub mod rtc_memory;
pub mod time;
#[cfg(target_os = "espidf")]
pub mod uart;
