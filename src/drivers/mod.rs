//! On-chip supervisor drivers.

pub mod watchdog;
