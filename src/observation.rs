// Copyright (c) 2026 Pegasus Heavy Industries LLC
// Licensed under the MIT License

//! Per-cycle observations and where they go.
//!
//! Each control cycle produces one [`Observation`]. The console sink prints
//! it as a human-readable line or as newline-delimited JSON.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::io::{self, Write};
use std::str::FromStr;

/// What one control cycle saw and did.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Observation {
    /// Temperature in degrees Celsius
    pub temperature_c: f64,
    /// Drive percentage applied this cycle
    pub drive_percent: u8,
    /// Estimated fan speed over the cycle's sampling window
    pub rpm: u32,
    /// Raw tachometer pulses counted in the window
    pub pulses: u64,
}

impl fmt::Display for Observation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "Temp: {:.1}°C | Fan: {}% | RPM: {}",
            self.temperature_c, self.drive_percent, self.rpm
        )
    }
}

/// Receives every observation, in cycle order.
pub trait ObservationSink: Send {
    fn emit(&mut self, observation: &Observation);
}

/// Line format for [`ConsoleSink`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum OutputFormat {
    #[default]
    Text,
    Json,
}

impl FromStr for OutputFormat {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "text" => Ok(OutputFormat::Text),
            "json" => Ok(OutputFormat::Json),
            other => Err(format!("unknown output format '{other}'")),
        }
    }
}

/// Encode an observation as a single line, newline included.
pub fn encode(observation: &Observation, format: OutputFormat) -> Result<String, serde_json::Error> {
    let mut s = match format {
        OutputFormat::Text => observation.to_string(),
        OutputFormat::Json => serde_json::to_string(observation)?,
    };
    s.push('\n');
    Ok(s)
}

/// Writes observations to stdout.
#[derive(Debug, Default)]
pub struct ConsoleSink {
    format: OutputFormat,
}

impl ConsoleSink {
    pub fn new(format: OutputFormat) -> Self {
        Self { format }
    }
}

impl ObservationSink for ConsoleSink {
    fn emit(&mut self, observation: &Observation) {
        let line = match encode(observation, self.format) {
            Ok(line) => line,
            Err(e) => {
                log::error!("Failed to encode observation: {e}");
                return;
            }
        };
        let mut stdout = io::stdout().lock();
        if let Err(e) = stdout.write_all(line.as_bytes()).and_then(|()| stdout.flush()) {
            log::warn!("Failed to write observation: {e}");
        }
    }
}

/// Keeps every observation in memory.
#[derive(Debug, Default, Clone)]
pub struct MemorySink {
    pub observations: Vec<Observation>,
}

impl ObservationSink for MemorySink {
    fn emit(&mut self, observation: &Observation) {
        self.observations.push(*observation);
    }
}
