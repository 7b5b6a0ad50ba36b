//! Packet data: registration, PDP context, and the single TCP/TLS socket
//! (SIM7000 `+CA*` application socket commands, connection id 0).

use embedded_hal::delay::DelayNs;
use embedded_hal::digital::OutputPin;
use log::{debug, info, warn};

use super::Modem;
use super::at::{DEFAULT_TIMEOUT_MS, fields};
use super::transport::Transport;
use crate::app::ports::{NetworkPort, SocketPort, WatchdogPort};
use crate::error::{AtError, ModemError};

const REGISTRATION_POLL_MS: u32 = 500;
const ATTACH_TIMEOUT_MS: u32 = 60_000;
const ATTACH_POLL_MS: u32 = 1_000;
const OPEN_TIMEOUT_MS: u32 = 15_000;
const PROMPT_TIMEOUT_MS: u32 = 5_000;
const IO_TIMEOUT_MS: u32 = 5_000;

/// Largest payload one `AT+CASEND` accepts.
pub const MAX_SEND_CHUNK: usize = 1_024;

/// `+CREG` / `+CGREG` stat: 1 home, 5 roaming.
fn registered(payload: &str) -> bool {
    let f = fields(payload);
    let stat = if f.len() >= 2 { &f[1] } else { &f[0] };
    matches!(stat.as_str(), "1" | "5")
}

impl<T: Transport, P: OutputPin, D: DelayNs> Modem<T, P, D> {
    fn context_active(&mut self) -> bool {
        match self.at.query("+CNACT?", "+CNACT:", DEFAULT_TIMEOUT_MS) {
            Ok(payload) => fields(&payload).first().is_some_and(|s| s == "1"),
            Err(_) => false,
        }
    }
}

impl<T: Transport, P: OutputPin, D: DelayNs> NetworkPort for Modem<T, P, D> {
    fn clear_receive_buffer(&mut self) -> usize {
        Modem::clear_receive_buffer(self)
    }

    fn wait_for_network(&mut self, timeout_ms: u32, watchdog: &mut dyn WatchdogPort) -> bool {
        let mut waited = 0;
        loop {
            if self.is_network_connected() {
                info!("Network: registered after ~{} ms", waited);
                return true;
            }
            if waited >= timeout_ms {
                warn!("Network: not registered within {} ms", timeout_ms);
                return false;
            }
            self.at.pause(REGISTRATION_POLL_MS);
            watchdog.pet();
            waited += REGISTRATION_POLL_MS;
        }
    }

    fn is_network_connected(&mut self) -> bool {
        if self.ensure_on().is_err() {
            return false;
        }
        self.at
            .query("+CREG?", "+CREG:", DEFAULT_TIMEOUT_MS)
            .is_ok_and(|p| registered(&p))
    }

    fn attach(
        &mut self,
        apn: &str,
        user: &str,
        pass: &str,
        watchdog: &mut dyn WatchdogPort,
    ) -> Result<(), ModemError> {
        self.ensure_on()?;
        self.at
            .command(&format!("+CGDCONT=1,\"IP\",\"{}\"", apn), DEFAULT_TIMEOUT_MS)?;
        if !user.is_empty() {
            self.at.command(
                &format!("+CNCFG=1,\"{}\",\"{}\",\"{}\"", apn, user, pass),
                DEFAULT_TIMEOUT_MS,
            )?;
        }
        if self.context_active() {
            debug!("Network: context already active");
            return Ok(());
        }
        self.at
            .command(&format!("+CNACT=1,\"{}\"", apn), DEFAULT_TIMEOUT_MS)
            .map_err(|_| ModemError::AttachFailed)?;

        let mut waited = 0;
        while waited < ATTACH_TIMEOUT_MS {
            if self.context_active() {
                info!("Network: data context active ({})", apn);
                return Ok(());
            }
            self.at.pause(ATTACH_POLL_MS);
            watchdog.pet();
            waited += ATTACH_POLL_MS;
        }
        warn!("Network: data context not active within {} ms", ATTACH_TIMEOUT_MS);
        Err(ModemError::AttachFailed)
    }

    fn detach(&mut self) -> Result<(), ModemError> {
        self.ensure_on()?;
        self.at.command("+CNACT=0", ATTACH_POLL_MS * 10)?;
        info!("Network: data context released");
        Ok(())
    }
}

impl<T: Transport, P: OutputPin, D: DelayNs> SocketPort for Modem<T, P, D> {
    fn open(&mut self, host: &str, port: u16, secure: bool) -> Result<(), ModemError> {
        self.ensure_on()?;
        if self.socket_open {
            SocketPort::close(self);
        }
        let ssl = if secure { 1 } else { 0 };
        self.at
            .command(&format!("+CASSLCFG=0,\"SSL\",{}", ssl), DEFAULT_TIMEOUT_MS)?;

        let payload = self.at.query(
            &format!("+CAOPEN=0,0,\"TCP\",\"{}\",{}", host, port),
            "+CAOPEN:",
            OPEN_TIMEOUT_MS,
        )?;
        let result = fields(&payload);
        if result.get(1).map(String::as_str) != Some("0") {
            warn!("Socket: open {}:{} failed ({})", host, port, payload);
            return Err(ModemError::Socket);
        }
        debug!("Socket: open {}:{} tls={}", host, port, secure);
        self.socket_open = true;
        Ok(())
    }

    fn send(&mut self, data: &[u8]) -> Result<(), ModemError> {
        if !self.socket_open {
            return Err(ModemError::Socket);
        }
        for chunk in data.chunks(MAX_SEND_CHUNK) {
            self.at.send(&format!("+CASEND=0,{}", chunk.len()))?;
            self.at.wait_for(PROMPT_TIMEOUT_MS, Some(">"))?;
            self.at.write_raw(chunk)?;
            self.at.wait_for(IO_TIMEOUT_MS, None)?;
        }
        Ok(())
    }

    fn recv(&mut self, max: usize) -> Result<Vec<u8>, ModemError> {
        if !self.socket_open {
            return Err(ModemError::Socket);
        }
        self.at.send(&format!("+CARECV=0,{}", max))?;
        self.at.wait_for(IO_TIMEOUT_MS, Some("+CARECV: "))?;
        let (len, stop) = self.at.read_token(b",\r\n", IO_TIMEOUT_MS)?;
        let len: usize = len.trim().parse().map_err(|_| AtError::Malformed)?;
        let data = if stop == b',' && len > 0 {
            self.at.read_exact(len, IO_TIMEOUT_MS)?
        } else {
            Vec::new()
        };
        self.at.wait_for(IO_TIMEOUT_MS, None)?;
        Ok(data)
    }

    fn close(&mut self) {
        if !self.socket_open {
            return;
        }
        if let Err(e) = self.at.command("+CACLOSE=0", DEFAULT_TIMEOUT_MS) {
            debug!("Socket: close not acknowledged: {}", e);
        }
        self.socket_open = false;
    }

    fn is_open(&self) -> bool {
        self.socket_open
    }

    fn idle(&mut self, ms: u32) {
        self.at.pause(ms);
    }
}
