//! UART link to the modem AT port.
//!
//! The driver is created once in `main` (it owns the UART peripheral and
//! the TX/RX pins).  `open` re-applies the baud rate and flushes RX so a
//! power-cycled modem starts from a clean buffer; `close` only marks the
//! link down, further reads return 0.

use esp_idf_hal::delay::NON_BLOCK;
use esp_idf_hal::uart::UartDriver;
use esp_idf_hal::units::Hertz;
use esp_idf_svc::sys::EspError;
use log::{debug, warn};

use crate::modem::transport::Transport;

pub struct UartLink<'d> {
    driver: UartDriver<'d>,
    open: bool,
}

impl<'d> UartLink<'d> {
    pub fn new(driver: UartDriver<'d>) -> Self {
        Self {
            driver,
            open: false,
        }
    }
}

impl Transport for UartLink<'_> {
    type Error = EspError;

    fn open(&mut self, baud: u32) -> Result<(), EspError> {
        self.driver.change_baudrate(Hertz(baud))?;
        self.driver.clear_rx()?;
        self.open = true;
        debug!("UART: open at {} baud", baud);
        Ok(())
    }

    fn close(&mut self) {
        self.open = false;
        if let Err(e) = self.driver.clear_rx() {
            warn!("UART: RX flush on close failed: {:?}", e);
        }
    }

    fn read(&mut self, buf: &mut [u8]) -> Result<usize, EspError> {
        if !self.open {
            return Ok(0);
        }
        self.driver.read(buf, NON_BLOCK)
    }

    fn write(&mut self, data: &[u8]) -> Result<usize, EspError> {
        if !self.open {
            return Ok(0);
        }
        self.driver.write(data)
    }

    fn flush(&mut self) -> Result<(), EspError> {
        self.driver.wait_tx_done(esp_idf_hal::delay::BLOCK)
    }

    fn available(&self) -> bool {
        self.open && self.driver.remaining_read().is_ok_and(|n| n > 0)
    }
}
