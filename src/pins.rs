//! GPIO / peripheral pin assignments for the LilyGO T-SIM7000G board.
//!
//! Single source of truth: the binary references this module rather than
//! hard-coding pin numbers.

// ---------------------------------------------------------------------------
// SIM7000G modem
// ---------------------------------------------------------------------------

/// PWRKEY line.  Idle HIGH; a LOW pulse toggles the modem power state.
pub const MODEM_PWRKEY_GPIO: i32 = 4;
/// ESP32 TX → modem RX.
pub const MODEM_TX_GPIO: i32 = 27;
/// ESP32 RX ← modem TX.
pub const MODEM_RX_GPIO: i32 = 26;
/// Modem DTR (sleep control).  Held LOW while awake.
pub const MODEM_DTR_GPIO: i32 = 25;
