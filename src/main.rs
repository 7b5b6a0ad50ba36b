//! WaterPAL Firmware: Main Entry Point
//!
//! One wake cycle, then deep sleep.
//!
//! ```text
//! ┌────────────────────────────────────────────────────────────────┐
//! │                      Adapters (outer ring)                     │
//! │                                                                │
//! │  UartLink       RtcMemory         NvsAdapter    SystemClock    │
//! │  (Transport)    (RetainedStorage) (ConfigPort)  (ClockPort)    │
//! │  PinDriver      TaskWatchdog                                   │
//! │  (PWRKEY)       (WatchdogPort)                                 │
//! │                                                                │
//! │  ──────────────── Port Trait Boundary ───────────────────      │
//! │                                                                │
//! │  ┌────────────────────────────────────────────────────────┐    │
//! │  │  Modem · clock sync · SMS broadcast · TelemetryClient  │    │
//! │  └────────────────────────────────────────────────────────┘    │
//! │                                                                │
//! │  DeviceContext { memory, clock, watchdog }                     │
//! └────────────────────────────────────────────────────────────────┘
//! ```

// ── Imports ───────────────────────────────────────────────────
use anyhow::Result;
use log::{error, info, warn};

use esp_idf_hal::delay::Delay;
use esp_idf_hal::gpio::{AnyIOPin, AnyOutputPin, PinDriver};
use esp_idf_hal::peripherals::Peripherals;
use esp_idf_hal::uart::{UartDriver, config::Config as UartConfig};
use esp_idf_hal::units::Hertz;

use waterpal::adapters::nvs::NvsAdapter;
use waterpal::adapters::rtc_memory::RtcMemory;
use waterpal::adapters::time::SystemClock;
use waterpal::adapters::uart::UartLink;
use waterpal::app::context::DeviceContext;
use waterpal::app::ports::{ClockPort, ConfigPort, WatchdogPort};
use waterpal::config::DeviceConfig;
use waterpal::drivers::watchdog::TaskWatchdog;
use waterpal::modem::Modem;
use waterpal::modem::transport::MODEM_BAUD;
use waterpal::sensors::{self, Stats};
use waterpal::telemetry::{
    DailyReportSink, DailySummary, JsonIngest, LegacyQuery, TelemetryClient, WeeklySummary,
};
use waterpal::{clock, identity, pins, sms};

const SECONDS_PER_WEEK: u32 = 7 * 24 * 60 * 60;

// ── Main ──────────────────────────────────────────────────────

fn main() -> Result<()> {
    // ── 1. ESP-IDF bootstrap ──────────────────────────────────
    esp_idf_svc::sys::link_patches();
    esp_idf_logger::init()?;

    info!("╔══════════════════════════════════════╗");
    info!("║  WaterPAL v{}                        ║", env!("CARGO_PKG_VERSION"));
    info!("╚══════════════════════════════════════╝");

    // ── 2. Load config from NVS (or defaults) ─────────────────
    let config = match NvsAdapter::new().and_then(|nvs| nvs.load()) {
        Ok(cfg) => cfg,
        Err(e) => {
            warn!("NVS config load failed ({}), using defaults", e);
            DeviceConfig::default()
        }
    };

    // ── 3. Wake cycle bookkeeping ─────────────────────────────
    let mut ctx = DeviceContext::new(RtcMemory::take(), SystemClock::new(), TaskWatchdog::new());
    let boot = ctx.memory.begin_wake_cycle();
    info!("Boot #{}", boot);
    ctx.watchdog.enable();

    // ── 4. Modem peripherals ──────────────────────────────────
    let peripherals = Peripherals::take()?;
    // SAFETY: these GPIOs are dedicated to the modem on this board and
    // are not handed out anywhere else.
    let (tx, rx, pwrkey, dtr) = unsafe {
        (
            AnyIOPin::new(pins::MODEM_TX_GPIO),
            AnyIOPin::new(pins::MODEM_RX_GPIO),
            AnyOutputPin::new(pins::MODEM_PWRKEY_GPIO),
            AnyOutputPin::new(pins::MODEM_DTR_GPIO),
        )
    };
    let uart = UartDriver::new(
        peripherals.uart1,
        tx,
        rx,
        Option::<AnyIOPin>::None,
        Option::<AnyIOPin>::None,
        &UartConfig::default().baudrate(Hertz(MODEM_BAUD)),
    )?;
    let mut power_key = PinDriver::output(pwrkey)?;
    power_key.set_high()?;
    let mut dtr = PinDriver::output(dtr)?;
    dtr.set_low()?;

    let mut modem = Modem::new(UartLink::new(uart), power_key, Delay::new_default(), config.network_mode);

    // ── 5. Run the cycle ──────────────────────────────────────
    run_cycle(&config, &mut ctx, &mut modem);

    // ── 6. Shut down and sleep ────────────────────────────────
    modem.power_off();
    ctx.watchdog.disable();

    let sleep_us = u64::from(config.report_interval_s) * 1_000_000;
    info!("Deep sleep for {} s", config.report_interval_s);
    // SAFETY: plain ESP-IDF calls; `esp_deep_sleep_start` does not return.
    unsafe {
        esp_idf_svc::sys::esp_sleep_enable_timer_wakeup(sleep_us);
        esp_idf_svc::sys::esp_deep_sleep_start();
    }
}

type BoardModem<'d> = Modem<UartLink<'d>, PinDriver<'d, AnyOutputPin, esp_idf_hal::gpio::Output>, Delay>;
type BoardContext = DeviceContext<RtcMemory, SystemClock, TaskWatchdog>;

fn run_cycle(config: &DeviceConfig, ctx: &mut BoardContext, modem: &mut BoardModem<'_>) {
    modem.power_on(ctx);
    if !modem.is_on() {
        error!("Modem did not come up; skipping reports this cycle");
        return;
    }

    if let Err(e) = clock::sync_clock(modem, ctx) {
        warn!("Clock sync failed: {}", e);
    }

    let imei = modem.imei(ctx, config.imei_retry_delay_ms);
    info!("IMEI {} ({})", identity::format_imei(imei), identity::encode_u64(imei));

    // ── Measurements ──────────────────────────────────────────
    let battery = modem
        .battery_info(ctx, &config.battery_retry)
        .last_value()
        .unwrap_or_default();
    let signal_percent = modem
        .signal_quality(ctx, &config.signal_retry)
        .last_value()
        .unwrap_or(0);

    let mut climate = sensors::Unfitted;
    let humidity = sensors::read_humidity(modem, &mut climate, ctx, &config.humidity_retry).valid();
    let temperature =
        sensors::read_temperature(modem, &mut climate, ctx, &config.temperature_retry).valid();

    // Written by the float-switch driver between wakes.
    let usage_s = ctx.memory.usage_s();
    let drift_s = ctx.memory.last_time_drift_s();

    // ── Short status on first boot ────────────────────────────
    if boot_is_first(ctx) {
        let text = format!("WaterPAL online, IMEI {}", identity::format_imei(imei));
        let sent = broadcast_counted(modem, ctx, config, &text, config.sms_short_retry_count);
        ctx.memory.record_sms_sent(sent);
    }

    // ── Daily summary ─────────────────────────────────────────
    let mut delivered = false;
    if config.use_gprs {
        let report = DailySummary {
            imei,
            sms_count: ctx.memory.sms_count(),
            usage_s,
            drift_s,
            temperature: temperature.and_then(|t| Stats::from_samples(&[t])).unwrap_or_default(),
            humidity: humidity.and_then(|h| Stats::from_samples(&[h])).unwrap_or_default(),
            signal_percent,
            battery,
            boot_count: ctx.boot_count(),
            error: ctx.memory.error_report(),
        };
        delivered = send_over_data(config, ctx, modem, &report);
    }

    if !delivered {
        let text = format!(
            "WaterPAL {} usage {} s, drift {} s, battery {}%, signal {}%{}",
            identity::encode_u64(imei),
            usage_s,
            drift_s,
            battery.percent,
            signal_percent,
            ctx.memory.error_report().map(|e| format!(", {e}")).unwrap_or_default(),
        );
        let sent = broadcast_counted(modem, ctx, config, &text, config.sms_retry_count);
        ctx.memory.record_sms_sent(sent);
        delivered = sent == config.sms_recipients.len() as u32;
    }

    if delivered {
        ctx.memory.clear_error();
        ctx.memory.clear_usage();
    }
}

fn boot_is_first(ctx: &BoardContext) -> bool {
    ctx.boot_count() <= 1
}

/// Broadcast recipient by recipient so the number actually delivered is
/// known for the report.
fn broadcast_counted(
    modem: &mut BoardModem<'_>,
    ctx: &mut BoardContext,
    config: &DeviceConfig,
    text: &str,
    retries: u32,
) -> u32 {
    let mut sent = 0;
    for number in &config.sms_recipients {
        if sms::broadcast(modem, ctx, &[number], text, retries, config.sms_retry_delay_ms) {
            sent += 1;
        }
    }
    sent
}

fn send_over_data(
    config: &DeviceConfig,
    ctx: &mut BoardContext,
    modem: &mut BoardModem<'_>,
    report: &DailySummary,
) -> bool {
    let mut client = TelemetryClient::from_config(config);
    if !client.connect(modem, &mut ctx.watchdog) {
        return false;
    }

    let sink: Box<dyn DailyReportSink> = match &config.json_backend {
        Some(endpoint) => Box::new(JsonIngest::new(endpoint.clone(), config.flow_rate_lph)),
        None => Box::new(LegacyQuery::new(config.query_backend.clone())),
    };
    let now = ctx.clock.now_unix();
    let ok = match client.send_daily(modem, &mut ctx.watchdog, sink.as_ref(), report, now) {
        Ok(status) => {
            info!("Daily summary accepted ({})", status);
            true
        }
        Err(e) => {
            warn!("Daily summary failed: {}", e);
            false
        }
    };

    let weekly_every = (SECONDS_PER_WEEK / config.report_interval_s.max(1)).max(1);
    if config.use_gps && ctx.boot_count() % weekly_every == 1 % weekly_every {
        match modem.gps_fix(ctx, config.gps_fix_timeout_ms) {
            Ok(fix) => {
                let weekly = WeeklySummary {
                    imei: report.imei,
                    sms_count: report.sms_count,
                    latitude: fix.latitude,
                    longitude: fix.longitude,
                    cell_info: modem.cell_info(),
                };
                if let Err(e) = client.send_weekly(modem, &mut ctx.watchdog, &weekly) {
                    warn!("Weekly summary failed: {}", e);
                }
            }
            Err(e) => warn!("No GPS fix for weekly summary: {}", e),
        }
    }

    client.disconnect(modem);
    ok
}
