//! Daily-summary backends.
//!
//! Two protocols coexist and are interchangeable behind
//! [`DailyReportSink`]:
//!
//! | Backend            | Request                          | Accepts     |
//! |--------------------|----------------------------------|-------------|
//! | [`LegacyQuery`]    | `GET <path>?IMEI=..&..`          | 200, 302    |
//! | [`JsonIngest`]     | `POST` flat JSON + key header    | 200, 201    |

use serde::Serialize;
use time::OffsetDateTime;
use time::format_description::well_known::Rfc3339;

use super::http::Request;
use super::reports::DailySummary;
use crate::config::{JsonEndpoint, QueryEndpoint};
use crate::error::TelemetryError;
use crate::identity;

const LITRES_PER_US_GALLON: f64 = 3.785_411_784;

/// Something that knows how to ship a [`DailySummary`].
pub trait DailyReportSink {
    fn name(&self) -> &'static str;

    /// Build the request for `report`, stamped with `now_utc_s`.
    fn build(&self, report: &DailySummary, now_utc_s: i64) -> Result<Request, TelemetryError>;

    fn accepts(&self, status: u16) -> bool;
}

/// Query-string GET against the original spreadsheet script.
#[derive(Debug, Clone)]
pub struct LegacyQuery {
    endpoint: QueryEndpoint,
}

impl LegacyQuery {
    pub fn new(endpoint: QueryEndpoint) -> Self {
        Self { endpoint }
    }
}

impl DailyReportSink for LegacyQuery {
    fn name(&self) -> &'static str {
        "legacy-query"
    }

    fn build(&self, report: &DailySummary, _now_utc_s: i64) -> Result<Request, TelemetryError> {
        let e = &self.endpoint;
        Ok(Request::get(
            &e.host,
            e.port,
            e.secure,
            format!("{}?{}", e.path, report.query()),
        ))
    }

    fn accepts(&self, status: u16) -> bool {
        matches!(status, 200 | 302)
    }
}

/// JSON POST with a static key header.
#[derive(Debug, Clone)]
pub struct JsonIngest {
    endpoint: JsonEndpoint,
    flow_rate_lph: f32,
}

#[derive(Serialize)]
struct DailyJson<'a> {
    imei: String,
    timestamp: String,
    sms_count: u32,
    usage_seconds: u32,
    gallons_per_day: f64,
    clock_drift_s: i64,
    temp_low_c: f32,
    temp_avg_c: f32,
    temp_high_c: f32,
    humidity_low: f32,
    humidity_avg: f32,
    humidity_high: f32,
    signal_percent: u8,
    battery_charge_state: u8,
    battery_percent: i32,
    battery_mv: i32,
    boot_count: u32,
    #[serde(skip_serializing_if = "Option::is_none")]
    error: Option<&'a str>,
}

/// Gallons that flow in `usage_s` seconds at `flow_rate_lph` litres/hour.
pub fn gallons(usage_s: u32, flow_rate_lph: f32) -> f64 {
    f64::from(usage_s) * f64::from(flow_rate_lph) / 3_600.0 / LITRES_PER_US_GALLON
}

impl JsonIngest {
    pub fn new(endpoint: JsonEndpoint, flow_rate_lph: f32) -> Self {
        Self {
            endpoint,
            flow_rate_lph,
        }
    }

    pub fn body(&self, report: &DailySummary, now_utc_s: i64) -> Result<String, TelemetryError> {
        let timestamp = OffsetDateTime::from_unix_timestamp(now_utc_s)
            .map_err(|_| TelemetryError::Encoding)?
            .format(&Rfc3339)
            .map_err(|_| TelemetryError::Encoding)?;

        let doc = DailyJson {
            imei: identity::format_imei(report.imei),
            timestamp,
            sms_count: report.sms_count,
            usage_seconds: report.usage_s,
            gallons_per_day: gallons(report.usage_s, self.flow_rate_lph),
            clock_drift_s: report.drift_s,
            temp_low_c: report.temperature.low,
            temp_avg_c: report.temperature.avg,
            temp_high_c: report.temperature.high,
            humidity_low: report.humidity.low,
            humidity_avg: report.humidity.avg,
            humidity_high: report.humidity.high,
            signal_percent: report.signal_percent,
            battery_charge_state: report.battery.charge_state,
            battery_percent: report.battery.percent,
            battery_mv: report.battery.voltage_mv,
            boot_count: report.boot_count,
            error: report.error.as_deref(),
        };
        serde_json::to_string(&doc).map_err(|_| TelemetryError::Encoding)
    }
}

impl DailyReportSink for JsonIngest {
    fn name(&self) -> &'static str {
        "json-ingest"
    }

    fn build(&self, report: &DailySummary, now_utc_s: i64) -> Result<Request, TelemetryError> {
        let e = &self.endpoint;
        let body = self.body(report, now_utc_s)?;
        Ok(Request::post(
            &e.host,
            e.port,
            e.secure,
            &e.path,
            "application/json",
            body.into_bytes(),
        )
        .header(&e.key_header, &e.api_key))
    }

    fn accepts(&self, status: u16) -> bool {
        matches!(status, 200 | 201)
    }
}
