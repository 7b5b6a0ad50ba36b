//! Sensor subsystem.
//!
//! The DHT driver itself sits outside this crate; everything here talks to
//! it through [`ClimatePort`].  Two stand-ins are provided:
//!
//! - [`Unfitted`] for boards without a climate sensor (every read times
//!   out, so reports carry `SensorFailure`);
//! - [`SimClimate`] with injected readings for host tests.

pub mod climate;

use std::collections::VecDeque;

use crate::app::ports::ClimatePort;
use crate::error::SensorError;

pub use climate::{Stats, read_humidity, read_temperature};

/// No sensor on the board.
#[derive(Debug, Default, Clone, Copy)]
pub struct Unfitted;

impl ClimatePort for Unfitted {
    fn read_humidity(&mut self) -> Result<f32, SensorError> {
        Err(SensorError::Timeout)
    }

    fn read_temperature(&mut self) -> Result<f32, SensorError> {
        Err(SensorError::Timeout)
    }
}

/// Replays queued readings; an empty queue reads as a timeout.
#[derive(Debug, Default)]
pub struct SimClimate {
    humidity: VecDeque<Result<f32, SensorError>>,
    temperature: VecDeque<Result<f32, SensorError>>,
}

impl SimClimate {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push_humidity(&mut self, reading: Result<f32, SensorError>) {
        self.humidity.push_back(reading);
    }

    pub fn push_temperature(&mut self, reading: Result<f32, SensorError>) {
        self.temperature.push_back(reading);
    }
}

impl ClimatePort for SimClimate {
    fn read_humidity(&mut self) -> Result<f32, SensorError> {
        self.humidity.pop_front().unwrap_or(Err(SensorError::Timeout))
    }

    fn read_temperature(&mut self) -> Result<f32, SensorError> {
        self.temperature.pop_front().unwrap_or(Err(SensorError::Timeout))
    }
}
