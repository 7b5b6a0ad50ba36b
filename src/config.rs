//! Device configuration parameters
//!
//! All tunable parameters for the WaterPAL device.
//! Values can be overridden via NVS (non-volatile storage); see
//! [`NvsAdapter`](crate::adapters::nvs::NvsAdapter).

use serde::{Deserialize, Serialize};

use crate::retry::RetryPolicy;

/// International-format phone number, e.g. `+1987654321`.
pub type PhoneNumber = heapless::String<20>;

/// Maximum number of SMS recipients.
pub const MAX_RECIPIENTS: usize = 4;

/// Radio access technology preference (`AT+CNMP=<mode>`).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[repr(u8)]
pub enum NetworkMode {
    Automatic = 2,
    GsmOnly = 13,
    LteOnly = 38,
    GsmAndLte = 51,
}

impl NetworkMode {
    pub const fn at_value(self) -> u8 {
        self as u8
    }
}

/// HTTP endpoint of the legacy query-string backend.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct QueryEndpoint {
    pub host: heapless::String<64>,
    pub port: u16,
    pub secure: bool,
    /// Request path up to (not including) the `?`.
    pub path: heapless::String<128>,
}

/// HTTP endpoint of the JSON backend.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct JsonEndpoint {
    pub host: heapless::String<64>,
    pub port: u16,
    pub secure: bool,
    pub path: heapless::String<128>,
    /// Name of the header carrying the static key.
    pub key_header: heapless::String<32>,
    /// Opaque static key.
    pub api_key: heapless::String<64>,
}

/// Core device configuration
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DeviceConfig {
    // --- SMS ---
    /// Recipients of every SMS broadcast, in send order.
    pub sms_recipients: heapless::Vec<PhoneNumber, MAX_RECIPIENTS>,
    /// Attempts per recipient for regular reports
    pub sms_retry_count: u32,
    /// Attempts per recipient for short status messages
    pub sms_short_retry_count: u32,
    /// Delay between SMS attempts (milliseconds)
    pub sms_retry_delay_ms: u32,

    // --- Cellular data ---
    /// Send reports over the data connection
    pub use_gprs: bool,
    pub apn: heapless::String<32>,
    pub gprs_user: heapless::String<32>,
    pub gprs_pass: heapless::String<32>,
    /// Maximum wait for an HTTP response (milliseconds)
    pub http_timeout_ms: u32,
    /// Maximum wait for network registration (milliseconds)
    pub network_timeout_ms: u32,
    /// Applied on first boot only
    pub network_mode: NetworkMode,

    // --- GPS ---
    pub use_gps: bool,
    /// Maximum time to wait for a fix (milliseconds)
    pub gps_fix_timeout_ms: u32,

    // --- Water usage ---
    /// Flow through the metered outlet while the float switch is active (L/h)
    pub flow_rate_lph: f32,

    // --- Retry policies ---
    pub battery_retry: RetryPolicy,
    pub signal_retry: RetryPolicy,
    pub humidity_retry: RetryPolicy,
    pub temperature_retry: RetryPolicy,
    /// Delay between IMEI attempts; the budget itself is always unbounded.
    pub imei_retry_delay_ms: u32,

    // --- Scheduling ---
    /// Deep-sleep period between wake cycles (seconds)
    pub report_interval_s: u32,

    // --- Backends ---
    pub query_backend: QueryEndpoint,
    pub json_backend: Option<JsonEndpoint>,
}

fn hs<const N: usize>(s: &str) -> heapless::String<N> {
    let mut out = heapless::String::new();
    let _ = out.push_str(&s[..s.len().min(N)]);
    out
}

impl Default for DeviceConfig {
    fn default() -> Self {
        let mut sms_recipients = heapless::Vec::new();
        let _ = sms_recipients.push(hs("+1987654321"));
        let _ = sms_recipients.push(hs("+1987654322"));

        Self {
            // SMS
            sms_recipients,
            sms_retry_count: 10,
            sms_short_retry_count: 10,
            sms_retry_delay_ms: 5_000,

            // Cellular data
            use_gprs: true,
            apn: hs("wholesale"),
            gprs_user: heapless::String::new(),
            gprs_pass: heapless::String::new(),
            http_timeout_ms: 60_000,
            network_timeout_ms: 60_000,
            network_mode: NetworkMode::GsmOnly,

            // GPS (off by default to conserve power)
            use_gps: false,
            gps_fix_timeout_ms: 120_000,

            // Water usage
            flow_rate_lph: 480.0, // 8 L/min household tap

            // Retry policies
            battery_retry: RetryPolicy::limited(5, 500),
            signal_retry: RetryPolicy::limited(5, 1_000),
            humidity_retry: RetryPolicy::limited(5, 2_000),
            temperature_retry: RetryPolicy::limited(5, 2_000),
            imei_retry_delay_ms: 1_000,

            // Scheduling
            report_interval_s: 22 * 60 * 60,

            // Backends
            query_backend: QueryEndpoint {
                host: hs("script.google.com"),
                port: 443,
                secure: true,
                path: hs(
                    "/macros/s/AKfycbzc-xMFUDC5eisYN_rSOkV5UM0mTLd9s9ssqyqLW0LbzR1giPq5MqnKENSFYLHzFPvGUg/exec",
                ),
            },
            json_backend: None,
        }
    }
}
