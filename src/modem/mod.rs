//! SIM7000-class modem lifecycle manager.
//!
//! ```text
//!   Off ──power_on──▶ PoweringOn ──▶ Initializing ──▶ Ready
//!    ▲                                                  │
//!    └──────────────────── power_off ───────────────────┘
//! ```
//!
//! There is no failure state.  If both restart and init fail the manager
//! records `ModemFailure` and still reaches `Ready`; callers find out on
//! their own commands and degrade.
//!
//! The manager owns the AT channel exclusively.  Queries live in
//! [`info`], SMS in [`messages`], data sockets in [`net`] and GNSS in
//! [`gnss`].

pub mod at;
pub mod gnss;
pub mod info;
pub mod messages;
pub mod net;
pub mod transport;

use embedded_hal::delay::DelayNs;
use embedded_hal::digital::OutputPin;
use log::{debug, info, warn};

use crate::app::context::DeviceContext;
use crate::app::ports::{ClockPort, RetainedStorage, WatchdogPort};
use crate::config::NetworkMode;
use crate::error::{ErrorCode, ModemError};
use crate::identity;
use crate::retry::{self, RetryHost, RetryPolicy, plausible};

use self::at::{AtClient, DEFAULT_TIMEOUT_MS};
use self::transport::{MODEM_BAUD, Transport};

pub use self::gnss::GpsFix;
pub use self::info::BatteryInfo;
pub use self::messages::SmsMessage;

/// Length of the PWRKEY low pulse that toggles the module.
pub const POWER_KEY_PULSE_MS: u32 = 1_000;

/// How long `init` keeps probing with bare `AT`.
const AT_PROBE_TIMEOUT_MS: u32 = 10_000;
const AT_PROBE_REPLY_MS: u32 = 200;

/// Settle time after `AT+CFUN=1,1` before the module answers again.
const RESTART_SETTLE_MS: u32 = 3_000;
const CFUN_TIMEOUT_MS: u32 = 10_000;
const POWER_DOWN_TIMEOUT_MS: u32 = 5_000;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ModemState {
    Off,
    PoweringOn,
    Initializing,
    Ready,
}

/// What the power pin says.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PowerState {
    Off,
    On,
}

pub struct Modem<T: Transport, P: OutputPin, D: DelayNs> {
    at: AtClient<T, D>,
    power_key: P,
    state: ModemState,
    network_mode: NetworkMode,
    imei: Option<u64>,
    socket_open: bool,
}

impl<T: Transport, P: OutputPin, D: DelayNs> Modem<T, P, D> {
    pub fn new(link: T, power_key: P, delay: D, network_mode: NetworkMode) -> Self {
        Self {
            at: AtClient::new(link, delay),
            power_key,
            state: ModemState::Off,
            network_mode,
            imei: None,
            socket_open: false,
        }
    }

    pub fn state(&self) -> ModemState {
        self.state
    }

    pub fn power_state(&self) -> PowerState {
        match self.state {
            ModemState::Off => PowerState::Off,
            _ => PowerState::On,
        }
    }

    pub fn is_on(&self) -> bool {
        self.power_state() == PowerState::On
    }

    /// Direct access to the AT channel (diagnostics, tests).
    pub fn at(&mut self) -> &mut AtClient<T, D> {
        &mut self.at
    }

    pub fn pause(&mut self, ms: u32) {
        self.at.pause(ms);
    }

    fn transition(&mut self, next: ModemState) {
        if self.state != next {
            info!("Modem: {:?} -> {:?}", self.state, next);
            self.state = next;
        }
    }

    fn pulse_power_key(&mut self) {
        if let Err(e) = self.power_key.set_low() {
            warn!("Modem: PWRKEY low failed: {:?}", e);
        }
        self.at.pause(POWER_KEY_PULSE_MS);
        if let Err(e) = self.power_key.set_high() {
            warn!("Modem: PWRKEY high failed: {:?}", e);
        }
    }

    // ── Lifecycle ─────────────────────────────────────────────

    /// Power the module up and bring the AT channel to a usable state.
    ///
    /// No-op unless the modem is `Off`.
    pub fn power_on<R, C, W>(&mut self, ctx: &mut DeviceContext<R, C, W>)
    where
        R: RetainedStorage,
        C: ClockPort,
        W: WatchdogPort,
    {
        if self.state != ModemState::Off {
            debug!("Modem: power_on ignored in {:?}", self.state);
            return;
        }

        self.transition(ModemState::PoweringOn);
        self.pulse_power_key();
        if let Err(e) = self.at.open(MODEM_BAUD) {
            warn!("Modem: serial open failed: {}", e);
        }

        self.transition(ModemState::Initializing);
        ctx.watchdog.pet();
        let ready = if self.restart(&mut ctx.watchdog) {
            true
        } else {
            warn!("Modem: restart failed, trying init");
            self.init(&mut ctx.watchdog)
        };
        if !ready {
            ctx.log_error(ErrorCode::ModemFailure);
        }

        if ctx.boot_count() <= 1 {
            self.apply_network_mode();
        }

        self.transition(ModemState::Ready);
    }

    /// Shut the module down and release the serial link.
    ///
    /// No-op when already `Off`.  The IMEI cache is dropped.
    pub fn power_off(&mut self) {
        if self.state == ModemState::Off {
            debug!("Modem: already off");
            return;
        }

        match self
            .at
            .send("+CPOWD=1")
            .and_then(|()| self.at.wait_for(POWER_DOWN_TIMEOUT_MS, Some("NORMAL POWER DOWN")))
        {
            Ok(_) => debug!("Modem: normal power down"),
            Err(e) => warn!("Modem: CPOWD not acknowledged ({}), forcing", e),
        }
        self.pulse_power_key();
        self.at.close();

        self.imei = None;
        self.socket_open = false;
        self.transition(ModemState::Off);
    }

    /// Wait for the module to answer `AT`, then apply the base settings.
    pub fn init(&mut self, watchdog: &mut dyn WatchdogPort) -> bool {
        if !self.probe(watchdog) {
            warn!("Modem: no answer to AT");
            return false;
        }
        if let Err(e) = self.at.command("E0", DEFAULT_TIMEOUT_MS) {
            debug!("Modem: echo off failed: {}", e);
        }
        if let Err(e) = self.at.command("+CMEE=2", DEFAULT_TIMEOUT_MS) {
            debug!("Modem: verbose errors failed: {}", e);
        }
        match self.at.query("+CPIN?", "+CPIN:", DEFAULT_TIMEOUT_MS) {
            Ok(sim) if sim == "READY" => {}
            Ok(sim) => warn!("Modem: SIM status {}", sim),
            Err(e) => warn!("Modem: SIM status unavailable: {}", e),
        }
        true
    }

    /// Functionality reset (`CFUN=0` then `CFUN=1,1`) followed by `init`.
    ///
    /// The whole sequence can outlast the watchdog period, so every wait
    /// in it pets `watchdog`.
    pub fn restart(&mut self, watchdog: &mut dyn WatchdogPort) -> bool {
        if !self.probe(watchdog) {
            return false;
        }
        if self.at.command_petted("+CFUN=0", CFUN_TIMEOUT_MS, watchdog).is_err() {
            return false;
        }
        if self.at.command_petted("+CFUN=1,1", CFUN_TIMEOUT_MS, watchdog).is_err() {
            return false;
        }
        self.at.pause_petted(RESTART_SETTLE_MS, watchdog);
        self.init(watchdog)
    }

    fn probe(&mut self, watchdog: &mut dyn WatchdogPort) -> bool {
        let mut waited = 0;
        while waited < AT_PROBE_TIMEOUT_MS {
            if self.at.command("", AT_PROBE_REPLY_MS).is_ok() {
                return true;
            }
            watchdog.pet();
            waited += AT_PROBE_REPLY_MS;
        }
        false
    }

    fn apply_network_mode(&mut self) {
        let cmd = format!("+CNMP={}", self.network_mode.at_value());
        match self.at.command(&cmd, DEFAULT_TIMEOUT_MS) {
            Ok(_) => info!("Modem: network mode {:?}", self.network_mode),
            Err(e) => warn!("Modem: network mode not applied: {}", e),
        }
    }

    // ── Identity ──────────────────────────────────────────────

    /// The module's IMEI.
    ///
    /// Cached while the modem stays on.  Otherwise powers on if needed and
    /// retries without limit: the first attempt uses `init`, later ones a
    /// full `restart`, each followed by `AT+GSN`.
    pub fn imei<R, C, W>(&mut self, ctx: &mut DeviceContext<R, C, W>, retry_delay_ms: u32) -> u64
    where
        R: RetainedStorage,
        C: ClockPort,
        W: WatchdogPort,
    {
        if self.is_on() {
            if let Some(imei) = self.imei {
                return imei;
            }
        } else {
            self.power_on(ctx);
        }

        let policy = RetryPolicy::unbounded(retry_delay_ms);
        let outcome = retry::retry(
            self,
            &mut ctx.watchdog,
            &policy,
            |modem, wd, attempt| {
                let ready = if attempt == 1 { modem.init(wd) } else { modem.restart(wd) };
                if !ready {
                    debug!("Modem: not ready on IMEI attempt {}", attempt);
                }
                modem.query_imei()
            },
            plausible::imei,
        );

        let attempts = outcome.attempts();
        let imei = outcome.valid().unwrap_or(0);
        info!("Modem: IMEI {} after {} attempt(s)", identity::format_imei(imei), attempts);
        self.imei = Some(imei).filter(|&i| i != 0);
        imei
    }

    fn query_imei(&mut self) -> Result<u64, ModemError> {
        let reply = self.at.command("+GSN", DEFAULT_TIMEOUT_MS)?;
        let line = reply
            .lines
            .iter()
            .find(|l| !l.is_empty() && l.bytes().all(|b| b.is_ascii_digit()))
            .ok_or(ModemError::At(crate::error::AtError::Malformed))?;
        Ok(identity::parse_imei(line).unwrap_or(0))
    }

    // ── Buffer hygiene ────────────────────────────────────────

    /// Drain and discard whatever the modem has already sent.
    pub fn clear_receive_buffer(&mut self) -> usize {
        let n = self.at.drain();
        if n > 0 {
            debug!("Modem: cleared {} stale bytes", n);
        }
        n
    }

    fn ensure_on(&self) -> Result<(), ModemError> {
        if self.is_on() {
            Ok(())
        } else {
            Err(ModemError::PoweredOff)
        }
    }
}

impl<T: Transport, P: OutputPin, D: DelayNs> RetryHost for Modem<T, P, D> {
    fn pause(&mut self, ms: u32) {
        self.at.pause(ms);
    }

    fn clear_receive_buffer(&mut self) -> usize {
        Modem::clear_receive_buffer(self)
    }
}
