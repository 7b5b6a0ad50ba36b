//! Transport abstraction: the byte channel to the modem's AT port.
//!
//! Concrete implementations:
//! - UART (`adapters::uart::UartLink`) on the ESP32
//! - Scripted modem doubles in the host test suites
//!
//! The AT client is generic over `Transport`, so the modem logic never
//! touches a UART register.

/// Modem serial framing: 115200 baud, 8 data bits, no parity, 1 stop bit.
pub const MODEM_BAUD: u32 = 115_200;

/// Byte-oriented serial channel.
pub trait Transport {
    /// Error type for this transport.
    type Error: core::fmt::Debug;

    /// Open (or re-open) the channel at `baud`, 8N1.
    fn open(&mut self, baud: u32) -> Result<(), Self::Error>;

    /// Release the channel.  Further reads return 0.
    fn close(&mut self);

    /// Read up to `buf.len()` bytes into `buf`.
    /// Returns the number of bytes actually read.
    /// Returns 0 if no data is available (non-blocking).
    fn read(&mut self, buf: &mut [u8]) -> Result<usize, Self::Error>;

    /// Write `data` to the transport.
    /// Returns the number of bytes actually written.
    fn write(&mut self, data: &[u8]) -> Result<usize, Self::Error>;

    /// Flush any buffered output.
    fn flush(&mut self) -> Result<(), Self::Error>;

    /// Check if data is available for reading.
    fn available(&self) -> bool;
}
