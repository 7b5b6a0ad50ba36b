//! WaterPAL firmware library.
//!
//! Exposes the communication resilience layer for integration testing and
//! external inspection: persistent state, retry discipline, modem
//! lifecycle, clock sync, SMS broadcast and the telemetry client.  All
//! ESP-IDF-specific code is guarded by `#[cfg(target_os = "espidf")]`
//! within each module.

#![deny(unused_must_use)]

pub mod app;
pub mod clock;
pub mod config;
pub mod error;
pub mod identity;
pub mod modem;
pub mod pins;
pub mod retry;
pub mod sms;
pub mod state;
pub mod telemetry;

// Adapter and driver modules carry host stubs so the crate compiles off
// target; the real implementations are guarded by cfg attributes inside.
pub mod adapters;
pub mod drivers;
pub mod sensors;

pub use error::{Error, ErrorCode, Result};
