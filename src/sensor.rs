// Copyright (c) 2026 Pegasus Heavy Industries LLC
// Licensed under the MIT License

//! Temperature sources.
//!
//! Two backends: a sysfs thermal zone file holding millidegrees Celsius,
//! and the Raspberry Pi firmware's `vcgencmd measure_temp` command.

use crate::error::{Error, Result};
use std::fs;
use std::path::{Path, PathBuf};
use std::process::Command;

/// Default thermal zone of the SoC on Raspberry Pi OS.
pub const DEFAULT_THERMAL_ZONE: &str = "/sys/class/thermal/thermal_zone0/temp";

/// Default firmware temperature command.
pub const VCGENCMD: &str = "vcgencmd";

/// Read the current temperature in degrees Celsius.
pub trait TemperatureSource: Send {
    /// Human-readable name used in logs and error messages.
    fn name(&self) -> String;

    /// Fails with [`Error::SensorUnavailable`] if the value cannot be
    /// read, parsed, or is not finite.
    fn read(&mut self) -> Result<f64>;
}

impl<T: TemperatureSource + ?Sized> TemperatureSource for Box<T> {
    fn name(&self) -> String {
        (**self).name()
    }

    fn read(&mut self) -> Result<f64> {
        (**self).read()
    }
}

// ---------------------------------------------------------------------------
// sysfs thermal zone
// ---------------------------------------------------------------------------

/// A sysfs file containing an integer temperature in millidegrees.
#[derive(Debug, Clone)]
pub struct ThermalZone {
    path: PathBuf,
}

impl ThermalZone {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }
}

impl Default for ThermalZone {
    fn default() -> Self {
        Self::new(DEFAULT_THERMAL_ZONE)
    }
}

impl TemperatureSource for ThermalZone {
    fn name(&self) -> String {
        self.path.display().to_string()
    }

    fn read(&mut self) -> Result<f64> {
        let raw = fs::read_to_string(&self.path).map_err(|e| Error::sensor(self.name(), e))?;
        parse_millidegrees(&raw).map_err(|reason| Error::sensor(self.name(), reason))
    }
}

/// Parse `"48312\n"` into `48.312`.
pub fn parse_millidegrees(raw: &str) -> std::result::Result<f64, String> {
    let trimmed = raw.trim();
    let milli = trimmed
        .parse::<i64>()
        .map_err(|e| format!("'{trimmed}' is not a millidegree value: {e}"))?;
    Ok(milli as f64 / 1000.0)
}

// ---------------------------------------------------------------------------
// vcgencmd
// ---------------------------------------------------------------------------

/// Runs `<program> measure_temp` and parses its `temp=48.3'C` output.
#[derive(Debug, Clone)]
pub struct VcgencmdSource {
    program: String,
}

impl VcgencmdSource {
    pub fn new(program: impl Into<String>) -> Self {
        Self {
            program: program.into(),
        }
    }
}

impl Default for VcgencmdSource {
    fn default() -> Self {
        Self::new(VCGENCMD)
    }
}

impl TemperatureSource for VcgencmdSource {
    fn name(&self) -> String {
        format!("{} measure_temp", self.program)
    }

    fn read(&mut self) -> Result<f64> {
        let output = Command::new(&self.program)
            .arg("measure_temp")
            .output()
            .map_err(|e| Error::sensor(self.name(), e))?;
        if !output.status.success() {
            return Err(Error::sensor(
                self.name(),
                format!(
                    "exited with {}: {}",
                    output.status,
                    String::from_utf8_lossy(&output.stderr).trim()
                ),
            ));
        }
        let stdout = String::from_utf8_lossy(&output.stdout);
        parse_measure_temp(&stdout).map_err(|reason| Error::sensor(self.name(), reason))
    }
}

/// Parse `"temp=48.3'C\n"` into `48.3`.
pub fn parse_measure_temp(raw: &str) -> std::result::Result<f64, String> {
    let line = raw.lines().next().unwrap_or_default().trim();
    let value = line
        .strip_prefix("temp=")
        .ok_or_else(|| format!("unexpected output '{line}'"))?;
    let value = value.trim_end_matches("'C").trim_end_matches('C').trim_end_matches('\'');
    let temp = value
        .parse::<f64>()
        .map_err(|e| format!("'{value}' is not a temperature: {e}"))?;
    if !temp.is_finite() {
        return Err(format!("'{value}' is not a finite temperature"));
    }
    Ok(temp)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    #[test]
    fn test_parse_millidegrees() {
        assert_eq!(parse_millidegrees("48312\n").unwrap(), 48.312);
        assert_eq!(parse_millidegrees("-5000").unwrap(), -5.0);
        assert!(parse_millidegrees("").is_err());
        assert!(parse_millidegrees("48.3").is_err());
    }

    #[test]
    fn test_parse_measure_temp() {
        assert_eq!(parse_measure_temp("temp=48.3'C\n").unwrap(), 48.3);
        assert_eq!(parse_measure_temp("temp=72.0'C").unwrap(), 72.0);
        assert!(parse_measure_temp("error=1\n").is_err());
        assert!(parse_measure_temp("temp=hot'C").is_err());
        assert!(parse_measure_temp("temp=nan'C").is_err());
    }

    #[test]
    fn test_thermal_zone_reads_file() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        writeln!(file, "55000").unwrap();
        let mut zone = ThermalZone::new(file.path());
        assert_eq!(zone.read().unwrap(), 55.0);
    }

    #[test]
    fn test_thermal_zone_missing_file_is_sensor_unavailable() {
        let dir = tempfile::tempdir().unwrap();
        let mut zone = ThermalZone::new(dir.path().join("temp"));
        assert!(matches!(
            zone.read(),
            Err(Error::SensorUnavailable { .. })
        ));
    }

    #[test]
    fn test_thermal_zone_garbage_is_sensor_unavailable() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        writeln!(file, "not a number").unwrap();
        let mut zone = ThermalZone::new(file.path());
        let err = zone.read().unwrap_err();
        assert!(matches!(err, Error::SensorUnavailable { .. }));
        assert!(err.to_string().contains("not a millidegree value"));
    }

    #[test]
    fn test_missing_command_is_sensor_unavailable() {
        let mut source = VcgencmdSource::new("/nonexistent/pifan-vcgencmd");
        assert!(matches!(
            source.read(),
            Err(Error::SensorUnavailable { .. })
        ));
    }
}
