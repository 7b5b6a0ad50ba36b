//! Integration test driver for `tests/integration/` submodule.
//!
//! Each `mod` below maps to a file that exercises a specific subsystem
//! against the scripted modem in [`mock_modem`].  All tests run on the
//! host (x86_64) with no real hardware required.

mod clock_tests;
mod mock_modem;
mod modem_tests;
mod sms_tests;
mod telemetry_tests;
