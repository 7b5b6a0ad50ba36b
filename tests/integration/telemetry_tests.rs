//! Telemetry client over the scripted modem's data socket.

use crate::mock_modem::{ScriptedModem, TestContext, TestModem, context, modem, ok};

use waterpal::config::{DeviceConfig, JsonEndpoint};
use waterpal::error::TelemetryError;
use waterpal::modem::BatteryInfo;
use waterpal::sensors::Stats;
use waterpal::telemetry::{
    DailySummary, GenericReport, JsonIngest, LegacyQuery, TelemetryClient, WeeklySummary,
};

const NOW: i64 = 1_728_445_189;
const IMEI: u64 = 861_234_567_890_123;

fn config() -> DeviceConfig {
    DeviceConfig {
        http_timeout_ms: 5_000,
        network_timeout_ms: 5_000,
        ..DeviceConfig::default()
    }
}

fn online(link: ScriptedModem) -> (TestModem, TestContext, TelemetryClient) {
    let (mut m, _, _) = modem(link);
    let mut ctx = context(3, NOW);
    m.power_on(&mut ctx);
    let mut client = TelemetryClient::from_config(&config());
    assert!(client.connect(&mut m, &mut ctx.watchdog));
    (m, ctx, client)
}

fn http(status: &str, body: &str) -> String {
    format!(
        "HTTP/1.1 {}\r\nContent-Type: text/plain\r\nContent-Length: {}\r\n\r\n{}",
        status,
        body.len(),
        body
    )
}

fn generic() -> GenericReport {
    GenericReport {
        imei: IMEI,
        sms_count: 2,
        usage_s: 3_600,
        drift_s: -4,
    }
}

fn daily() -> DailySummary {
    DailySummary {
        imei: IMEI,
        sms_count: 2,
        usage_s: 3_600,
        drift_s: -4,
        temperature: Stats { low: 18.0, avg: 21.5, high: 25.0 },
        humidity: Stats { low: 40.0, avg: 45.0, high: 50.0 },
        signal_percent: 64,
        battery: BatteryInfo {
            charge_state: 0,
            percent: 85,
            voltage_mv: 4_120,
        },
        boot_count: 3,
        error: Some("ERROR: 3 (at 1728445000)".to_owned()),
    }
}

fn sent_text(m: &mut TestModem) -> String {
    String::from_utf8_lossy(&m.at().link().socket_tx).into_owned()
}

// ── Connection ────────────────────────────────────────────────

#[test]
fn connect_and_disconnect_are_idempotent() {
    let (mut m, mut ctx, mut client) = online(ScriptedModem::sim7000());

    assert!(client.connect(&mut m, &mut ctx.watchdog));
    assert!(client.is_connected());
    assert!(client.keep_alive());
    assert_eq!(m.at().link().count("+CGDCONT"), 1);

    assert!(client.disconnect(&mut m));
    assert!(client.disconnect(&mut m));
    assert!(!client.is_connected());
    assert_eq!(m.at().link().count("+CNACT=0"), 1);
}

#[test]
fn unregistered_modem_does_not_connect() {
    let mut link = ScriptedModem::sim7000();
    link.on("+CREG?", &[ok(&["+CREG: 0,2"])]);
    let (mut m, _, _) = modem(link);
    let mut ctx = context(3, NOW);
    m.power_on(&mut ctx);
    let pets_before = ctx.watchdog.pets();

    let mut client = TelemetryClient::from_config(&config());
    assert!(!client.connect(&mut m, &mut ctx.watchdog));
    assert!(!client.is_connected());
    assert!(ctx.watchdog.pets() > pets_before);
    assert_eq!(m.at().link().count("+CGDCONT"), 0);
}

#[test]
fn attach_waits_for_context_activation() {
    let mut link = ScriptedModem::sim7000();
    link.on(
        "+CNACT?",
        &[
            ok(&["+CNACT: 0,\"0.0.0.0\""]),
            ok(&["+CNACT: 0,\"0.0.0.0\""]),
            ok(&["+CNACT: 1,\"10.64.0.2\""]),
        ],
    );
    let (mut m, _ctx, client) = online(link);

    assert!(client.is_connected());
    assert!(m.at().link().sent("+CNACT=1,\"wholesale\""));
    assert_eq!(m.at().link().count("+CNACT?"), 3);
}

#[test]
fn stalled_attach_keeps_the_watchdog_fed() {
    let mut link = ScriptedModem::sim7000();
    link.on("+CNACT?", &[ok(&["+CNACT: 0,\"0.0.0.0\""])]);
    let (mut m, _, delay) = modem(link);
    let mut ctx = context(3, NOW);
    m.power_on(&mut ctx);
    let pets_before = ctx.watchdog.pets();
    let before = delay.elapsed_ms.get();

    let mut client = TelemetryClient::from_config(&config());
    assert!(!client.connect(&mut m, &mut ctx.watchdog));

    assert!(!client.is_connected());
    // one check before activation, then one per second for a minute
    assert_eq!(m.at().link().count("+CNACT?"), 61);
    assert!(delay.elapsed_ms.get() - before >= 60_000);
    assert!(ctx.watchdog.pets() - pets_before >= 60);
}

#[test]
fn reports_need_a_connection() {
    let (mut m, _, _) = modem(ScriptedModem::sim7000());
    let mut ctx = context(3, NOW);
    m.power_on(&mut ctx);
    let mut client = TelemetryClient::from_config(&config());

    assert_eq!(
        client.send_generic(&mut m, &mut ctx.watchdog, &generic()),
        Err(TelemetryError::NotConnected)
    );
    assert_eq!(m.at().link().count("+CAOPEN"), 0);
}

// ── Report status sets ────────────────────────────────────────

#[test]
fn generic_report_accepts_200_only() {
    let mut link = ScriptedModem::sim7000();
    link.queue_http(&http("200 OK", "ok"));
    link.queue_http(&http("302 Found", ""));
    let (mut m, mut ctx, mut client) = online(link);

    assert_eq!(client.send_generic(&mut m, &mut ctx.watchdog, &generic()), Ok(200));
    let request = sent_text(&mut m);
    assert!(request.starts_with("GET /macros/s/"));
    assert!(request.contains("/exec?IMEI=861234567890123&totalSMSCount=2&dailyWaterUsageTime=3600&detectedClockTimeDrift=-4 HTTP/1.1\r\n"));
    assert!(request.contains("Host: script.google.com\r\n"));
    assert!(request.contains("Connection: keep-alive\r\n"));

    assert_eq!(
        client.send_generic(&mut m, &mut ctx.watchdog, &generic()),
        Err(TelemetryError::Rejected(302))
    );
    let link = m.at().link();
    assert_eq!(link.count("+CAOPEN"), 2);
    assert_eq!(link.count("+CACLOSE"), 2);
    assert!(link.sent("+CASSLCFG=0,\"SSL\",1"));
}

#[test]
fn weekly_summary_accepts_redirect() {
    let mut link = ScriptedModem::sim7000();
    link.queue_http(&http("302 Moved Temporarily", ""));
    let (mut m, mut ctx, mut client) = online(link);

    let weekly = WeeklySummary {
        imei: IMEI,
        sms_count: 9,
        latitude: -1.286_389,
        longitude: 36.817_223,
        cell_info: "GSM,Online,639-02".to_owned(),
    };
    assert_eq!(client.send_weekly(&mut m, &mut ctx.watchdog, &weekly), Ok(302));
    let request = sent_text(&mut m);
    assert!(request.contains("lat=-1.286389"));
    assert!(request.contains("cellInfo=GSM%2COnline%2C639-02"));
}

#[test]
fn daily_legacy_backend_is_a_query_get() {
    let mut link = ScriptedModem::sim7000();
    link.queue_http(&http("302 Found", ""));
    let (mut m, mut ctx, mut client) = online(link);
    let sink = LegacyQuery::new(config().query_backend);

    assert_eq!(client.send_daily(&mut m, &mut ctx.watchdog, &sink, &daily(), NOW), Ok(302));
    let request = sent_text(&mut m);
    assert!(request.starts_with("GET "));
    assert!(request.contains("tempAvg=21.5"));
    assert!(request.contains("bootCount=3"));
    assert!(request.contains("error=ERROR%3A%203%20%28at%201728445000%29"));
}

#[test]
fn daily_json_backend_posts_with_key_header() {
    let mut link = ScriptedModem::sim7000();
    link.queue_http(&http("201 Created", "{\"id\":7}"));
    link.queue_http(&http("302 Found", ""));
    let (mut m, mut ctx, mut client) = online(link);
    let endpoint = JsonEndpoint {
        host: "ingest.example.com".try_into().unwrap(),
        port: 8080,
        secure: false,
        path: "/v1/daily".try_into().unwrap(),
        key_header: "X-Api-Key".try_into().unwrap(),
        api_key: "k-123".try_into().unwrap(),
    };
    let sink = JsonIngest::new(endpoint, 480.0);

    assert_eq!(client.send_daily(&mut m, &mut ctx.watchdog, &sink, &daily(), NOW), Ok(201));
    let request = sent_text(&mut m);
    assert!(request.starts_with("POST /v1/daily HTTP/1.1\r\n"));
    assert!(request.contains("X-Api-Key: k-123\r\n"));
    assert!(request.contains("Content-Type: application/json\r\n"));
    let body = &request[request.find("\r\n\r\n").unwrap() + 4..];
    let v: serde_json::Value = serde_json::from_str(body).unwrap();
    assert_eq!(v["timestamp"], "2024-10-09T03:39:49Z");
    assert_eq!(v["imei"], "861234567890123");
    assert_eq!(v["error"], "ERROR: 3 (at 1728445000)");
    assert!(m.at().link().sent("+CAOPEN=0,0,\"TCP\",\"ingest.example.com\",8080"));
    assert!(m.at().link().sent("+CASSLCFG=0,\"SSL\",0"));

    // a redirect is not an acceptance for the JSON backend
    assert_eq!(
        client.send_daily(&mut m, &mut ctx.watchdog, &sink, &daily(), NOW),
        Err(TelemetryError::Rejected(302))
    );
}

// ── Response handling ─────────────────────────────────────────

#[test]
fn large_response_is_read_in_chunks() {
    let body = "x".repeat(1_500);
    let mut link = ScriptedModem::sim7000();
    link.queue_http(&http("200 OK", &body));
    let (mut m, mut ctx, mut client) = online(link);

    assert_eq!(client.send_generic(&mut m, &mut ctx.watchdog, &generic()), Ok(200));
    assert!(m.at().link().count("+CARECV") >= 3);
}

#[test]
fn chunked_response_is_accepted() {
    let mut link = ScriptedModem::sim7000();
    link.queue_http("HTTP/1.1 200 OK\r\nTransfer-Encoding: chunked\r\n\r\n5\r\nhello\r\n0\r\n\r\n");
    let (mut m, mut ctx, mut client) = online(link);

    assert_eq!(client.send_generic(&mut m, &mut ctx.watchdog, &generic()), Ok(200));
}

#[test]
fn silence_is_no_status() {
    let (mut m, mut ctx, mut client) = online(ScriptedModem::sim7000());
    let pets_before = ctx.watchdog.pets();

    let result = client.send_generic(&mut m, &mut ctx.watchdog, &generic());

    assert_eq!(result, Err(TelemetryError::NoStatus));
    assert!(result.unwrap_err().is_transient());
    assert!(ctx.watchdog.pets() > pets_before);
    assert!(m.at().link().sent("+CACLOSE=0"));
}

#[test]
fn failed_socket_open_is_a_link_error() {
    let mut link = ScriptedModem::sim7000();
    link.on("+CAOPEN=", &[ok(&["+CAOPEN: 0,1"])]);
    let (mut m, mut ctx, mut client) = online(link);

    assert!(matches!(
        client.send_generic(&mut m, &mut ctx.watchdog, &generic()),
        Err(TelemetryError::Link(_))
    ));
}
