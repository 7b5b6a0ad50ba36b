//! Cellular-data telemetry client.
//!
//! ```text
//!   connect ──▶ send_generic / send_weekly / send_daily ──▶ disconnect
//! ```
//!
//! `connect` and `disconnect` are idempotent through the `connected` flag.
//! Every report is a single HTTP request on its own socket; the accepted
//! status set depends on the report:
//!
//! | Report          | Accepted       |
//! |-----------------|----------------|
//! | generic         | 200            |
//! | weekly summary  | 200, 302       |
//! | daily summary   | per backend    |

pub mod backends;
pub mod http;
pub mod reports;

use log::{info, warn};

use crate::app::ports::{NetworkPort, SocketPort, WatchdogPort};
use crate::config::{DeviceConfig, QueryEndpoint};
use crate::error::TelemetryError;

pub use backends::{DailyReportSink, JsonIngest, LegacyQuery};
pub use http::{Request, Response};
pub use reports::{DailySummary, GenericReport, WeeklySummary};

pub const GENERIC_ACCEPTED: &[u16] = &[200];
pub const WEEKLY_ACCEPTED: &[u16] = &[200, 302];

pub struct TelemetryClient {
    endpoint: QueryEndpoint,
    apn: String,
    user: String,
    pass: String,
    network_timeout_ms: u32,
    http_timeout_ms: u32,
    connected: bool,
    keep_alive: bool,
}

impl TelemetryClient {
    pub fn from_config(config: &DeviceConfig) -> Self {
        Self {
            endpoint: config.query_backend.clone(),
            apn: config.apn.as_str().to_owned(),
            user: config.gprs_user.as_str().to_owned(),
            pass: config.gprs_pass.as_str().to_owned(),
            network_timeout_ms: config.network_timeout_ms,
            http_timeout_ms: config.http_timeout_ms,
            connected: false,
            keep_alive: false,
        }
    }

    pub fn is_connected(&self) -> bool {
        self.connected
    }

    pub fn keep_alive(&self) -> bool {
        self.keep_alive
    }

    /// Bring the data connection up.  Returns `true` immediately when it
    /// already is.
    pub fn connect<L, W>(&mut self, link: &mut L, watchdog: &mut W) -> bool
    where
        L: NetworkPort + ?Sized,
        W: WatchdogPort,
    {
        if self.connected {
            return true;
        }
        info!("GPRS connecting...");
        link.clear_receive_buffer();

        if !link.wait_for_network(self.network_timeout_ms, watchdog) {
            warn!("GPRS: failed to wait for network");
            return false;
        }
        if let Err(e) = link.attach(&self.apn, &self.user, &self.pass, watchdog) {
            warn!("GPRS: attach failed: {}", e);
            return false;
        }
        if !link.is_network_connected() {
            warn!("GPRS: network dropped after attach");
            return false;
        }

        self.connected = true;
        self.keep_alive = true;
        info!("GPRS connected");
        true
    }

    /// Release the data connection.  A no-op when not connected.
    pub fn disconnect<L: NetworkPort + ?Sized>(&mut self, link: &mut L) -> bool {
        if !self.connected {
            return true;
        }
        info!("GPRS disconnecting...");
        self.connected = false;
        self.keep_alive = false;
        match link.detach() {
            Ok(()) => {
                info!("GPRS disconnected");
                true
            }
            Err(e) => {
                warn!("GPRS: disconnect failed: {}", e);
                false
            }
        }
    }

    pub fn send_generic<S, W>(
        &mut self,
        sock: &mut S,
        watchdog: &mut W,
        report: &GenericReport,
    ) -> Result<u16, TelemetryError>
    where
        S: SocketPort + ?Sized,
        W: WatchdogPort,
    {
        let request = self.query_request(&report.query());
        self.deliver(sock, watchdog, &request, |s| GENERIC_ACCEPTED.contains(&s))
    }

    pub fn send_weekly<S, W>(
        &mut self,
        sock: &mut S,
        watchdog: &mut W,
        report: &WeeklySummary,
    ) -> Result<u16, TelemetryError>
    where
        S: SocketPort + ?Sized,
        W: WatchdogPort,
    {
        let request = self.query_request(&report.query());
        self.deliver(sock, watchdog, &request, |s| WEEKLY_ACCEPTED.contains(&s))
    }

    pub fn send_daily<S, W>(
        &mut self,
        sock: &mut S,
        watchdog: &mut W,
        sink: &dyn DailyReportSink,
        report: &DailySummary,
        now_utc_s: i64,
    ) -> Result<u16, TelemetryError>
    where
        S: SocketPort + ?Sized,
        W: WatchdogPort,
    {
        let request = sink.build(report, now_utc_s)?;
        info!("Telemetry: daily summary via {}", sink.name());
        self.deliver(sock, watchdog, &request, |s| sink.accepts(s))
    }

    fn query_request(&self, query: &str) -> Request {
        let e = &self.endpoint;
        Request::get(&e.host, e.port, e.secure, format!("{}?{}", e.path, query))
    }

    fn deliver<S, W>(
        &mut self,
        sock: &mut S,
        watchdog: &mut W,
        request: &Request,
        accepted: impl Fn(u16) -> bool,
    ) -> Result<u16, TelemetryError>
    where
        S: SocketPort + ?Sized,
        W: WatchdogPort,
    {
        if !self.connected {
            return Err(TelemetryError::NotConnected);
        }
        let response = http::exchange(sock, watchdog, request, self.keep_alive, self.http_timeout_ms)?;
        if accepted(response.status) {
            Ok(response.status)
        } else {
            warn!("HTTP: invalid response code {}", response.status);
            Err(TelemetryError::Rejected(response.status))
        }
    }
}
