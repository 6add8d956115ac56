// Copyright (c) 2026 Pegasus Heavy Industries LLC
// Licensed under the MIT License

//! Error kinds surfaced by the controller and its collaborators.
//!
//! Every variant is fatal at the control-loop layer. A stalled or
//! disconnected tachometer is not an error and never appears here.

use thiserror::Error;

pub type Result<T> = std::result::Result<T, Error>;

#[derive(Debug, Error)]
pub enum Error {
    /// The temperature source could not be read or parsed.
    #[error("temperature sensor {sensor} unavailable: {reason}")]
    SensorUnavailable { sensor: String, reason: String },

    /// The drive output or the edge-event registration failed.
    #[error("actuator {actuator} fault: {reason}")]
    ActuatorFault { actuator: String, reason: String },

    /// A fan curve failed validation or could not be parsed.
    #[error("invalid fan curve: {0}")]
    InvalidCurve(String),

    /// A sampling or tachometer setting is out of range.
    #[error("invalid setting: {0}")]
    InvalidSetting(String),
}

impl Error {
    pub fn sensor(sensor: impl Into<String>, reason: impl ToString) -> Self {
        Error::SensorUnavailable {
            sensor: sensor.into(),
            reason: reason.to_string(),
        }
    }

    pub fn actuator(actuator: impl Into<String>, reason: impl ToString) -> Self {
        Error::ActuatorFault {
            actuator: actuator.into(),
            reason: reason.to_string(),
        }
    }
}
