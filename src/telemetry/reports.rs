//! Report payloads and their query-string encoding.

use serde::Serialize;

use crate::identity;
use crate::modem::BatteryInfo;
use crate::sensors::Stats;

/// Identity, SMS count, usage and drift.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct GenericReport {
    pub imei: u64,
    pub sms_count: u32,
    pub usage_s: u32,
    pub drift_s: i64,
}

/// Location and serving-cell diagnostics, sent once a week.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct WeeklySummary {
    pub imei: u64,
    pub sms_count: u32,
    pub latitude: f64,
    pub longitude: f64,
    /// Raw `AT+CPSI?` payload.
    pub cell_info: String,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct DailySummary {
    pub imei: u64,
    pub sms_count: u32,
    pub usage_s: u32,
    pub drift_s: i64,
    pub temperature: Stats,
    pub humidity: Stats,
    pub signal_percent: u8,
    pub battery: BatteryInfo,
    pub boot_count: u32,
    /// Pending diagnostic, e.g. `ERROR: 3 (at 1728445189)`.
    pub error: Option<String>,
}

impl GenericReport {
    pub fn query(&self) -> String {
        QueryString::new()
            .pair("IMEI", &identity::format_imei(self.imei))
            .pair("totalSMSCount", &self.sms_count.to_string())
            .pair("dailyWaterUsageTime", &self.usage_s.to_string())
            .pair("detectedClockTimeDrift", &self.drift_s.to_string())
            .finish()
    }
}

impl WeeklySummary {
    pub fn query(&self) -> String {
        QueryString::new()
            .pair("IMEI", &identity::format_imei(self.imei))
            .pair("totalSMSCount", &self.sms_count.to_string())
            .pair("lat", &format!("{:.6}", self.latitude))
            .pair("lon", &format!("{:.6}", self.longitude))
            .pair("cellInfo", &self.cell_info)
            .finish()
    }
}

impl DailySummary {
    pub fn query(&self) -> String {
        let mut q = QueryString::new()
            .pair("IMEI", &identity::format_imei(self.imei))
            .pair("totalSMSCount", &self.sms_count.to_string())
            .pair("dailyWaterUsageTime", &self.usage_s.to_string())
            .pair("detectedClockTimeDrift", &self.drift_s.to_string())
            .pair("tempLow", &format!("{:.1}", self.temperature.low))
            .pair("tempAvg", &format!("{:.1}", self.temperature.avg))
            .pair("tempHigh", &format!("{:.1}", self.temperature.high))
            .pair("humidityLow", &format!("{:.1}", self.humidity.low))
            .pair("humidityAvg", &format!("{:.1}", self.humidity.avg))
            .pair("humidityHigh", &format!("{:.1}", self.humidity.high))
            .pair("signalStrength", &self.signal_percent.to_string())
            .pair("batteryChargeState", &self.battery.charge_state.to_string())
            .pair("batteryPercent", &self.battery.percent.to_string())
            .pair("batteryVoltage", &self.battery.voltage_mv.to_string())
            .pair("bootCount", &self.boot_count.to_string());
        if let Some(err) = &self.error {
            q = q.pair("error", err);
        }
        q.finish()
    }
}

/// `k=v&k=v` builder; values are percent-encoded.
#[derive(Debug, Default)]
pub struct QueryString(String);

impl QueryString {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn pair(mut self, key: &str, value: &str) -> Self {
        if !self.0.is_empty() {
            self.0.push('&');
        }
        self.0.push_str(key);
        self.0.push('=');
        self.0.push_str(&url_encode(value));
        self
    }

    pub fn finish(self) -> String {
        self.0
    }
}

/// RFC 3986 percent-encoding; only unreserved characters pass through.
pub fn url_encode(s: &str) -> String {
    const HEX: &[u8; 16] = b"0123456789ABCDEF";
    let mut out = String::with_capacity(s.len());
    for b in s.bytes() {
        if b.is_ascii_alphanumeric() || matches!(b, b'-' | b'_' | b'.' | b'~') {
            out.push(char::from(b));
        } else {
            out.push('%');
            out.push(char::from(HEX[usize::from(b >> 4)]));
            out.push(char::from(HEX[usize::from(b & 0x0F)]));
        }
    }
    out
}
