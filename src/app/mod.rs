//! Application core: domain wiring with zero I/O.
//!
//! All interaction with hardware happens through **port traits** defined
//! in [`ports`]; [`context::DeviceContext`] bundles the ones every
//! component needs for a wake cycle, keeping the layer above fully
//! testable without real peripherals.

pub mod context;
pub mod ports;
