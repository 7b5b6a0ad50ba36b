//! Scripted SIM7000 double for integration tests.
//!
//! [`ScriptedModem`] implements the byte [`Transport`] the AT client talks
//! to.  Every `AT…\r\n` line is parsed, logged and answered from a rule
//! table; the two body-carrying commands (`+CMGS` and `+CASEND`) switch the
//! double into a raw mode until the body is complete.  An HTTP response
//! queue feeds the `+CARECV` data channel, one response per `+CAOPEN`.

use std::cell::Cell;
use std::collections::VecDeque;
use std::convert::Infallible;
use std::rc::Rc;

use embedded_hal::delay::DelayNs;
use embedded_hal::digital::{ErrorType, OutputPin};
use waterpal::modem::transport::Transport;

const CTRL_Z: u8 = 0x1A;

/// Wrap payload lines the way the module frames a successful reply.
pub fn ok(lines: &[&str]) -> String {
    let mut out = String::new();
    for l in lines {
        out.push_str("\r\n");
        out.push_str(l);
        out.push_str("\r\n");
    }
    out.push_str("\r\nOK\r\n");
    out
}

pub fn error() -> String {
    "\r\nERROR\r\n".to_owned()
}

// ── Rule table ────────────────────────────────────────────────

struct Rule {
    prefix: String,
    replies: VecDeque<String>,
}

impl Rule {
    /// The queue advances until one reply is left; that one sticks.
    fn next(&mut self) -> String {
        if self.replies.len() > 1 {
            self.replies.pop_front().unwrap_or_default()
        } else {
            self.replies.front().cloned().unwrap_or_default()
        }
    }
}

#[derive(Debug)]
enum Mode {
    Command,
    SmsBody { number: String },
    SocketBody { remaining: usize },
}

/// A submitted text message.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SentSms {
    pub number: String,
    pub text: String,
}

// ── ScriptedModem ─────────────────────────────────────────────

pub struct ScriptedModem {
    rules: Vec<Rule>,
    mode: Mode,
    line: Vec<u8>,
    body: Vec<u8>,
    rx: VecDeque<u8>,
    open: bool,
    /// When set the module never answers (unpowered / broken UART).
    pub silent: bool,
    /// Every command, without the `AT` prefix.
    pub log: Vec<String>,
    /// Outcome of each `+CMGS` submit; an empty queue accepts.
    pub sms_outcomes: VecDeque<bool>,
    /// Swallow submits without any final report (network never acks).
    pub sms_unacknowledged: bool,
    pub sms_sent: Vec<SentSms>,
    /// Raw bytes written through `+CASEND`.
    pub socket_tx: Vec<u8>,
    socket_rx: VecDeque<u8>,
    http_responses: VecDeque<Vec<u8>>,
}

#[allow(dead_code)]
impl ScriptedModem {
    pub fn new() -> Self {
        Self {
            rules: Vec::new(),
            mode: Mode::Command,
            line: Vec::new(),
            body: Vec::new(),
            rx: VecDeque::new(),
            open: false,
            silent: false,
            log: Vec::new(),
            sms_outcomes: VecDeque::new(),
            sms_unacknowledged: false,
            sms_sent: Vec::new(),
            socket_tx: Vec::new(),
            socket_rx: VecDeque::new(),
            http_responses: VecDeque::new(),
        }
    }

    /// A healthy, registered SIM7000G with an active data context.
    pub fn sim7000() -> Self {
        let mut m = Self::new();
        m.on("+CPIN?", &[ok(&["+CPIN: READY"])]);
        m.on("+GSN", &[ok(&["861234567890123"])]);
        m.on("+CCLK?", &[ok(&["+CCLK: \"24/10/08,23:39:49-16\""])]);
        m.on("+CBC", &[ok(&["+CBC: 0,85,4120"])]);
        m.on("+CSQ", &[ok(&["+CSQ: 20,99"])]);
        m.on("+CREG?", &[ok(&["+CREG: 0,1"])]);
        m.on("+CNACT?", &[ok(&["+CNACT: 1,\"10.64.0.2\""])]);
        m.on("+CAOPEN=", &[ok(&["+CAOPEN: 0,0"])]);
        m.on("+CPSI?", &[ok(&["+CPSI: GSM,Online,639-02,0x1234,5678,23 EGSM 900,-68,0,38-38"])]);
        m.on("+CPOWD=1", &["\r\nNORMAL POWER DOWN\r\n"]);
        m
    }

    /// Answer commands starting with `prefix` with `replies` in order; the
    /// last reply repeats.  Later rules shadow earlier ones.
    pub fn on<R: AsRef<str>>(&mut self, prefix: &str, replies: &[R]) {
        self.rules.push(Rule {
            prefix: prefix.to_owned(),
            replies: replies.iter().map(|r| r.as_ref().to_owned()).collect(),
        });
    }

    pub fn queue_http(&mut self, raw: &str) {
        self.http_responses.push_back(raw.as_bytes().to_vec());
    }

    /// Push unsolicited bytes (a late URC, line noise).
    pub fn inject(&mut self, bytes: &str) {
        self.rx.extend(bytes.bytes());
    }

    pub fn count(&self, prefix: &str) -> usize {
        self.log.iter().filter(|c| c.starts_with(prefix)).count()
    }

    pub fn sent(&self, cmd: &str) -> bool {
        self.log.iter().any(|c| c == cmd)
    }

    pub fn is_open(&self) -> bool {
        self.open
    }

    pub fn pending_rx(&self) -> usize {
        self.rx.len()
    }

    fn reply(&mut self, text: &str) {
        if !self.silent {
            self.rx.extend(text.bytes());
        }
    }

    fn handle_command(&mut self, cmd: String) {
        self.log.push(cmd.clone());

        if let Some(rest) = cmd.strip_prefix("+CMGS=") {
            self.mode = Mode::SmsBody {
                number: rest.trim_matches('"').to_owned(),
            };
            self.reply("\r\n> ");
            return;
        }
        if let Some(rest) = cmd.strip_prefix("+CASEND=0,") {
            self.mode = Mode::SocketBody {
                remaining: rest.parse().unwrap_or(0),
            };
            self.reply("\r\n> ");
            return;
        }
        if let Some(rest) = cmd.strip_prefix("+CARECV=0,") {
            let max: usize = rest.parse().unwrap_or(0);
            let n = max.min(self.socket_rx.len());
            let chunk: Vec<u8> = self.socket_rx.drain(..n).collect();
            let mut out = format!("\r\n+CARECV: {}", n).into_bytes();
            if n > 0 {
                out.push(b',');
                out.extend_from_slice(&chunk);
            }
            out.extend_from_slice(b"\r\n\r\nOK\r\n");
            if !self.silent {
                self.rx.extend(out);
            }
            return;
        }
        if cmd.starts_with("+CAOPEN=") {
            if let Some(resp) = self.http_responses.pop_front() {
                self.socket_rx.extend(resp);
            }
        }

        let reply = self
            .rules
            .iter_mut()
            .rev()
            .find(|r| cmd.starts_with(&r.prefix))
            .map(Rule::next)
            .unwrap_or_else(|| ok(&[]));
        self.reply(&reply);
    }

    fn feed(&mut self, b: u8) {
        match &mut self.mode {
            Mode::Command => {
                self.line.push(b);
                if self.line.ends_with(b"\r\n") {
                    let text = String::from_utf8_lossy(&self.line[..self.line.len() - 2]).into_owned();
                    self.line.clear();
                    if let Some(cmd) = text.strip_prefix("AT") {
                        self.handle_command(cmd.to_owned());
                    }
                }
            }
            Mode::SmsBody { number } => {
                if b == CTRL_Z {
                    let number = std::mem::take(number);
                    let text = String::from_utf8_lossy(&self.body).into_owned();
                    self.body.clear();
                    self.mode = Mode::Command;
                    if self.sms_unacknowledged {
                        return;
                    }
                    if self.sms_outcomes.pop_front().unwrap_or(true) {
                        self.sms_sent.push(SentSms { number, text });
                        self.reply(&ok(&["+CMGS: 17"]));
                    } else {
                        self.reply("\r\n+CMS ERROR: 500\r\n");
                    }
                } else {
                    self.body.push(b);
                }
            }
            Mode::SocketBody { remaining } => {
                self.socket_tx.push(b);
                *remaining = remaining.saturating_sub(1);
                if *remaining == 0 {
                    self.mode = Mode::Command;
                    self.reply(&ok(&[]));
                }
            }
        }
    }
}

impl Default for ScriptedModem {
    fn default() -> Self {
        Self::new()
    }
}

impl Transport for ScriptedModem {
    type Error = Infallible;

    fn open(&mut self, _baud: u32) -> Result<(), Infallible> {
        self.open = true;
        Ok(())
    }

    fn close(&mut self) {
        self.open = false;
    }

    fn read(&mut self, buf: &mut [u8]) -> Result<usize, Infallible> {
        if !self.open {
            return Ok(0);
        }
        let n = buf.len().min(self.rx.len());
        for (slot, b) in buf.iter_mut().zip(self.rx.drain(..n)) {
            *slot = b;
        }
        Ok(n)
    }

    fn write(&mut self, data: &[u8]) -> Result<usize, Infallible> {
        if !self.open {
            return Ok(0);
        }
        for &b in data {
            self.feed(b);
        }
        Ok(data.len())
    }

    fn flush(&mut self) -> Result<(), Infallible> {
        Ok(())
    }

    fn available(&self) -> bool {
        self.open && !self.rx.is_empty()
    }
}

// ── Power key ─────────────────────────────────────────────────

/// Counts LOW pulses on the power key.
#[derive(Clone, Default)]
pub struct MockPin {
    pub pulses: Rc<Cell<u32>>,
}

impl ErrorType for MockPin {
    type Error = Infallible;
}

impl OutputPin for MockPin {
    fn set_low(&mut self) -> Result<(), Infallible> {
        self.pulses.set(self.pulses.get() + 1);
        Ok(())
    }

    fn set_high(&mut self) -> Result<(), Infallible> {
        Ok(())
    }
}

// ── Delay ─────────────────────────────────────────────────────

/// Returns immediately; totals the requested time.
#[derive(Clone, Default)]
pub struct NoDelay {
    pub elapsed_ms: Rc<Cell<u64>>,
}

impl DelayNs for NoDelay {
    fn delay_ns(&mut self, ns: u32) {
        self.elapsed_ms.set(self.elapsed_ms.get() + u64::from(ns) / 1_000_000);
    }

    fn delay_ms(&mut self, ms: u32) {
        self.elapsed_ms.set(self.elapsed_ms.get() + u64::from(ms));
    }
}

// ── Harness ───────────────────────────────────────────────────

pub type TestModem = waterpal::modem::Modem<ScriptedModem, MockPin, NoDelay>;
pub type TestContext = waterpal::app::context::DeviceContext<
    waterpal::adapters::rtc_memory::RetainedRam,
    waterpal::adapters::time::SimClock,
    waterpal::drivers::watchdog::TaskWatchdog,
>;

/// Modem over `link`, plus handles on its power key and delay.
pub fn modem(link: ScriptedModem) -> (TestModem, MockPin, NoDelay) {
    let pin = MockPin::default();
    let delay = NoDelay::default();
    let m = waterpal::modem::Modem::new(
        link,
        pin.clone(),
        delay.clone(),
        waterpal::config::NetworkMode::GsmOnly,
    );
    (m, pin, delay)
}

/// A context already inside wake cycle `boot`, clock at `now_s`.
pub fn context(boot: u32, now_s: i64) -> TestContext {
    use waterpal::app::ports::WatchdogPort;
    use waterpal::state::DeviceMemory;

    let memory = DeviceMemory {
        boot_count: boot.saturating_sub(1),
        ..DeviceMemory::INITIAL
    };
    let mut ctx = waterpal::app::context::DeviceContext::new(
        waterpal::adapters::rtc_memory::RetainedRam::with(memory),
        waterpal::adapters::time::SimClock::at(now_s),
        waterpal::drivers::watchdog::TaskWatchdog::new(),
    );
    ctx.memory.begin_wake_cycle();
    ctx.watchdog.enable();
    ctx
}
