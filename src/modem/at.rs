//! AT command client.
//!
//! Frames commands as `AT<cmd>\r\n` and reads line-oriented replies until a
//! terminator:
//!
//! | Line                          | Meaning                    |
//! |-------------------------------|----------------------------|
//! | `OK`                          | success                    |
//! | `ERROR`, `+CME ERROR: …`, `+CMS ERROR: …` | rejection      |
//! | caller-supplied marker        | command-specific (prompt `>`, URC, data header) |
//!
//! Bytes are pulled one at a time so nothing after the terminator is
//! consumed; a late URC stays in the link for the next caller (or for
//! [`AtClient::drain`]).  Every wait is bounded by an idle timeout measured
//! in [`POLL_INTERVAL_MS`] steps of the injected delay.  The `*_petted`
//! variants also pet a watchdog every [`WATCHDOG_PET_MS`] of waiting, for
//! commands whose reply can take longer than the watchdog period.
//!
//! Lines are collected as bytes and decoded as UTF-8 (lossily) once
//! complete, so operator names and SMS bodies keep their multi-byte
//! characters.

use embedded_hal::delay::DelayNs;
use log::{debug, trace};

use super::transport::Transport;
use crate::app::ports::WatchdogPort;
use crate::error::AtError;

/// Idle poll step while waiting for bytes.
pub const POLL_INTERVAL_MS: u32 = 5;

/// Default reply timeout for simple commands.
pub const DEFAULT_TIMEOUT_MS: u32 = 1_000;

/// Watchdog pet interval during a petted wait.
pub const WATCHDOG_PET_MS: u32 = 1_000;

/// Longest line kept before the client gives up on it.
const MAX_LINE: usize = 512;

/// Optional watchdog carried through a wait.
struct Keepalive<'w> {
    watchdog: Option<&'w mut dyn WatchdogPort>,
    since_pet_ms: u32,
}

impl<'w> Keepalive<'w> {
    fn none() -> Self {
        Self {
            watchdog: None,
            since_pet_ms: 0,
        }
    }

    fn with(watchdog: &'w mut dyn WatchdogPort) -> Self {
        Self {
            watchdog: Some(watchdog),
            since_pet_ms: 0,
        }
    }

    fn waited(&mut self, ms: u32) {
        self.since_pet_ms += ms;
        if self.since_pet_ms >= WATCHDOG_PET_MS {
            self.since_pet_ms = 0;
            if let Some(wd) = self.watchdog.as_deref_mut() {
                wd.pet();
            }
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Terminator {
    Ok,
    Marker,
}

/// Lines received before the terminator (blank lines dropped).
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Reply {
    pub lines: Vec<String>,
    pub terminator: Terminator,
}

impl Reply {
    /// Remainder of the first line starting with `prefix`, trimmed.
    pub fn field(&self, prefix: &str) -> Option<&str> {
        self.lines
            .iter()
            .find_map(|l| l.strip_prefix(prefix))
            .map(str::trim)
    }
}

pub struct AtClient<T: Transport, D: DelayNs> {
    link: T,
    delay: D,
}

impl<T: Transport, D: DelayNs> AtClient<T, D> {
    pub fn new(link: T, delay: D) -> Self {
        Self { link, delay }
    }

    pub fn link(&self) -> &T {
        &self.link
    }

    pub fn link_mut(&mut self) -> &mut T {
        &mut self.link
    }

    pub fn open(&mut self, baud: u32) -> Result<(), AtError> {
        self.link.open(baud).map_err(|e| {
            log::warn!("AT link open failed: {:?}", e);
            AtError::Link
        })
    }

    pub fn close(&mut self) {
        self.link.close();
    }

    pub fn pause(&mut self, ms: u32) {
        self.delay.delay_ms(ms);
    }

    /// Like [`pause`](Self::pause), petting `watchdog` every
    /// [`WATCHDOG_PET_MS`].
    pub fn pause_petted(&mut self, ms: u32, watchdog: &mut dyn WatchdogPort) {
        let mut left = ms;
        while left > 0 {
            let step = left.min(WATCHDOG_PET_MS);
            self.delay.delay_ms(step);
            watchdog.pet();
            left -= step;
        }
    }

    // ── Writing ───────────────────────────────────────────────

    /// Send `AT<cmd>\r\n`.
    pub fn send(&mut self, cmd: &str) -> Result<(), AtError> {
        debug!("AT> AT{}", cmd);
        self.write_raw(b"AT")?;
        self.write_raw(cmd.as_bytes())?;
        self.write_raw(b"\r\n")
    }

    /// Write bytes verbatim (SMS bodies, socket payloads, Ctrl-Z).
    pub fn write_raw(&mut self, data: &[u8]) -> Result<(), AtError> {
        let mut sent = 0;
        let mut idle_ms = 0;
        while sent < data.len() {
            let n = self.link.write(&data[sent..]).map_err(|_| AtError::Link)?;
            if n == 0 {
                if idle_ms >= DEFAULT_TIMEOUT_MS {
                    return Err(AtError::Link);
                }
                self.delay.delay_ms(POLL_INTERVAL_MS);
                idle_ms += POLL_INTERVAL_MS;
            } else {
                sent += n;
                idle_ms = 0;
            }
        }
        self.link.flush().map_err(|_| AtError::Link)
    }

    // ── Reading ───────────────────────────────────────────────

    fn read_byte(&mut self) -> Result<Option<u8>, AtError> {
        let mut b = [0u8; 1];
        match self.link.read(&mut b) {
            Ok(1) => Ok(Some(b[0])),
            Ok(_) => Ok(None),
            Err(_) => Err(AtError::Link),
        }
    }

    /// Next byte, polling until `timeout_ms` of idle time has passed.
    fn next_byte(
        &mut self,
        idle_ms: &mut u32,
        timeout_ms: u32,
        keepalive: &mut Keepalive<'_>,
    ) -> Result<u8, AtError> {
        loop {
            if let Some(b) = self.read_byte()? {
                *idle_ms = 0;
                return Ok(b);
            }
            if *idle_ms >= timeout_ms {
                return Err(AtError::Timeout);
            }
            self.delay.delay_ms(POLL_INTERVAL_MS);
            *idle_ms += POLL_INTERVAL_MS;
            keepalive.waited(POLL_INTERVAL_MS);
        }
    }

    /// Collect lines until `OK`, an error line, or `marker`.
    ///
    /// `marker` matches as soon as the line being assembled ends with it,
    /// so prompts without a line ending (`> `) and data headers
    /// (`+CARECV: `) are recognised mid-line.
    pub fn wait_for(&mut self, timeout_ms: u32, marker: Option<&str>) -> Result<Reply, AtError> {
        self.collect(timeout_ms, marker, &mut Keepalive::none())
    }

    /// [`wait_for`](Self::wait_for) that pets `watchdog` while idle.
    pub fn wait_for_petted(
        &mut self,
        timeout_ms: u32,
        marker: Option<&str>,
        watchdog: &mut dyn WatchdogPort,
    ) -> Result<Reply, AtError> {
        self.collect(timeout_ms, marker, &mut Keepalive::with(watchdog))
    }

    fn collect(
        &mut self,
        timeout_ms: u32,
        marker: Option<&str>,
        keepalive: &mut Keepalive<'_>,
    ) -> Result<Reply, AtError> {
        let mut lines = Vec::new();
        let mut line: Vec<u8> = Vec::new();
        let mut idle_ms = 0;

        loop {
            let b = self.next_byte(&mut idle_ms, timeout_ms, keepalive)?;
            match b {
                b'\n' => {
                    let text = String::from_utf8_lossy(&line);
                    let done = text.trim();
                    if !done.is_empty() {
                        trace!("AT< {}", done);
                        if done == "OK" {
                            return Ok(Reply {
                                lines,
                                terminator: Terminator::Ok,
                            });
                        }
                        if is_error_line(done) {
                            debug!("AT< {}", done);
                            return Err(AtError::Rejected);
                        }
                        lines.push(done.to_owned());
                    }
                    line.clear();
                }
                b'\r' => {}
                other => {
                    if line.len() >= MAX_LINE {
                        return Err(AtError::Malformed);
                    }
                    line.push(other);
                    if let Some(m) = marker {
                        if line.ends_with(m.as_bytes()) {
                            let text = String::from_utf8_lossy(&line).into_owned();
                            trace!("AT< {} (marker)", text);
                            lines.push(text);
                            return Ok(Reply {
                                lines,
                                terminator: Terminator::Marker,
                            });
                        }
                    }
                }
            }
        }
    }

    /// Send a command and wait for its final `OK`.
    pub fn command(&mut self, cmd: &str, timeout_ms: u32) -> Result<Reply, AtError> {
        self.send(cmd)?;
        self.wait_for(timeout_ms, None)
    }

    /// [`command`](Self::command) that pets `watchdog` while waiting.
    pub fn command_petted(
        &mut self,
        cmd: &str,
        timeout_ms: u32,
        watchdog: &mut dyn WatchdogPort,
    ) -> Result<Reply, AtError> {
        self.send(cmd)?;
        self.wait_for_petted(timeout_ms, None, watchdog)
    }

    /// Send a command and return the payload of its `prefix` line.
    pub fn query(&mut self, cmd: &str, prefix: &str, timeout_ms: u32) -> Result<String, AtError> {
        let reply = self.command(cmd, timeout_ms)?;
        reply
            .field(prefix)
            .map(str::to_owned)
            .ok_or(AtError::Malformed)
    }

    /// Read up to (not including) the first byte in `stops`; returns the
    /// token and the stop byte.
    pub fn read_token(&mut self, stops: &[u8], timeout_ms: u32) -> Result<(String, u8), AtError> {
        let mut token = Vec::new();
        let mut idle_ms = 0;
        let mut keepalive = Keepalive::none();
        loop {
            let b = self.next_byte(&mut idle_ms, timeout_ms, &mut keepalive)?;
            if stops.contains(&b) {
                return Ok((String::from_utf8_lossy(&token).into_owned(), b));
            }
            if token.len() >= MAX_LINE {
                return Err(AtError::Malformed);
            }
            token.push(b);
        }
    }

    /// Read exactly `n` raw bytes.
    pub fn read_exact(&mut self, n: usize, timeout_ms: u32) -> Result<Vec<u8>, AtError> {
        let mut out = Vec::with_capacity(n);
        let mut idle_ms = 0;
        let mut keepalive = Keepalive::none();
        while out.len() < n {
            out.push(self.next_byte(&mut idle_ms, timeout_ms, &mut keepalive)?);
        }
        Ok(out)
    }

    /// Discard everything currently buffered.  Returns the byte count.
    pub fn drain(&mut self) -> usize {
        let mut buf = [0u8; 64];
        let mut total = 0;
        while let Ok(n) = self.link.read(&mut buf) {
            if n == 0 {
                break;
            }
            total += n;
        }
        total
    }
}

fn is_error_line(line: &str) -> bool {
    line == "ERROR" || line.starts_with("+CME ERROR") || line.starts_with("+CMS ERROR")
}

/// Split a comma-separated AT payload, honouring double quotes and
/// stripping them: `1,"REC READ","+1555",,"24/10/08,23:39:49-16"`.
pub fn fields(payload: &str) -> Vec<String> {
    let mut out = Vec::new();
    let mut cur = String::new();
    let mut quoted = false;
    for c in payload.chars() {
        match c {
            '"' => quoted = !quoted,
            ',' if !quoted => out.push(core::mem::take(&mut cur).trim().to_owned()),
            _ => cur.push(c),
        }
    }
    out.push(cur.trim().to_owned());
    out
}
