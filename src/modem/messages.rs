//! Text-mode SMS: submit, list, delete.

use embedded_hal::delay::DelayNs;
use embedded_hal::digital::OutputPin;
use log::{debug, info, warn};

use super::Modem;
use super::at::{DEFAULT_TIMEOUT_MS, fields};
use super::transport::Transport;
use crate::app::ports::{SmsSender, WatchdogPort};
use crate::error::{AtError, ModemError};

const PROMPT_TIMEOUT_MS: u32 = 5_000;
const SUBMIT_TIMEOUT_MS: u32 = 60_000;
const LIST_TIMEOUT_MS: u32 = 10_000;
const CTRL_Z: u8 = 0x1A;

/// One entry of `AT+CMGL="ALL"`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SmsMessage {
    pub index: u16,
    /// `REC UNREAD`, `REC READ`, `STO SENT`, ...
    pub status: String,
    pub sender: String,
    /// Raw modem timestamp, same grammar as `AT+CCLK?`.
    pub timestamp: String,
    pub body: String,
}

/// Parse a `+CMGL` listing.  Body lines follow each header until the next
/// header.
pub fn parse_inbox(lines: &[String]) -> Vec<SmsMessage> {
    let mut out: Vec<SmsMessage> = Vec::new();
    for line in lines {
        if let Some(header) = line.strip_prefix("+CMGL:") {
            let f = fields(header);
            let Some(index) = f.first().and_then(|s| s.parse().ok()) else {
                warn!("SMS: unparsable list header {:?}", line);
                continue;
            };
            out.push(SmsMessage {
                index,
                status: f.get(1).cloned().unwrap_or_default(),
                sender: f.get(2).cloned().unwrap_or_default(),
                timestamp: f.get(4).cloned().unwrap_or_default(),
                body: String::new(),
            });
        } else if let Some(msg) = out.last_mut() {
            if !msg.body.is_empty() {
                msg.body.push('\n');
            }
            msg.body.push_str(line);
        }
    }
    out
}

impl<T: Transport, P: OutputPin, D: DelayNs> Modem<T, P, D> {
    fn text_mode(&mut self) -> Result<(), ModemError> {
        self.at.command("+CMGF=1", DEFAULT_TIMEOUT_MS)?;
        self.at.command("+CSCS=\"GSM\"", DEFAULT_TIMEOUT_MS)?;
        Ok(())
    }

    /// Submit one text message, petting `watchdog` while the network
    /// acknowledges it.
    pub fn send_sms(
        &mut self,
        number: &str,
        text: &str,
        watchdog: &mut dyn WatchdogPort,
    ) -> Result<(), ModemError> {
        self.ensure_on()?;
        self.text_mode()?;

        self.at.send(&format!("+CMGS=\"{}\"", number))?;
        self.at
            .wait_for_petted(PROMPT_TIMEOUT_MS, Some(">"), watchdog)?;
        self.at.write_raw(text.as_bytes())?;
        self.at.write_raw(&[CTRL_Z])?;

        match self.at.wait_for_petted(SUBMIT_TIMEOUT_MS, None, watchdog) {
            Ok(reply) => {
                debug!("SMS: submitted to {} ({:?})", number, reply.field("+CMGS:"));
                Ok(())
            }
            Err(AtError::Rejected) => Err(ModemError::SmsRejected),
            Err(e) => Err(e.into()),
        }
    }

    pub fn sms_inbox(&mut self) -> Result<Vec<SmsMessage>, ModemError> {
        self.ensure_on()?;
        self.text_mode()?;
        let reply = self.at.command("+CMGL=\"ALL\"", LIST_TIMEOUT_MS)?;
        Ok(parse_inbox(&reply.lines))
    }

    pub fn delete_sms(&mut self, index: u16) -> Result<(), ModemError> {
        self.ensure_on()?;
        self.at.command(&format!("+CMGD={}", index), DEFAULT_TIMEOUT_MS)?;
        Ok(())
    }

    /// List the inbox, then delete every listed message.  Messages whose
    /// delete fails are still returned.
    pub fn read_and_clear_inbox(&mut self) -> Result<Vec<SmsMessage>, ModemError> {
        let messages = self.sms_inbox()?;
        for msg in &messages {
            if let Err(e) = self.delete_sms(msg.index) {
                warn!("SMS: delete {} failed: {}", msg.index, e);
            }
        }
        info!("SMS: read and cleared {} message(s)", messages.len());
        Ok(messages)
    }
}

impl<T: Transport, P: OutputPin, D: DelayNs> SmsSender for Modem<T, P, D> {
    fn send_sms(
        &mut self,
        number: &str,
        text: &str,
        watchdog: &mut dyn WatchdogPort,
    ) -> Result<(), ModemError> {
        Modem::send_sms(self, number, text, watchdog)
    }

    fn signal_percent(&mut self) -> Option<u8> {
        self.signal_once().ok()
    }
}
