// Copyright (c) 2026 Pegasus Heavy Industries LLC
// Licensed under the MIT License

//! Runtime settings.
//!
//! There is no configuration file: everything comes from the command line,
//! with the defaults below matching a 4-pin 25 kHz fan wired to a
//! Raspberry Pi (PWM on GPIO18, tach on GPIO17).

use crate::curve::{self, Boundary, FanCurve};
use crate::error::{Error, Result};
use std::fmt;
use std::str::FromStr;
use std::time::Duration;

/// Default sampling window in seconds.
pub const DEFAULT_WINDOW_SECS: f64 = 2.0;

/// Tach pulses per revolution of a standard PC fan.
pub const DEFAULT_PULSES_PER_REV: u32 = 2;

/// Default BCM pin of the tachometer (sense) line.
pub const DEFAULT_TACH_PIN: u8 = 17;

/// PWM frequency for hardware PWM (4-pin fan spec).
pub const DEFAULT_HW_PWM_FREQ_HZ: f64 = 25_000.0;

/// PWM frequency for software PWM.
pub const DEFAULT_SOFT_PWM_FREQ_HZ: f64 = 25.0;

// ---------------------------------------------------------------------------
// Curve presets
// ---------------------------------------------------------------------------

/// Built-in curve configurations.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Preset {
    /// 50/60/70C -> 40/70/100%, inclusive thresholds.
    #[default]
    Standard,
    /// 45/50/60/70C -> 25/50/80/100%, exclusive thresholds.
    Gradual,
}

impl Preset {
    pub fn curve(self) -> FanCurve {
        match self {
            Preset::Standard => curve::standard_curve(),
            Preset::Gradual => curve::gradual_curve(),
        }
    }
}

impl FromStr for Preset {
    type Err = String;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "standard" => Ok(Preset::Standard),
            "gradual" => Ok(Preset::Gradual),
            other => Err(format!("unknown preset '{other}' (expected standard or gradual)")),
        }
    }
}

// ---------------------------------------------------------------------------
// Backend selection
// ---------------------------------------------------------------------------

/// Where temperatures come from.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SensorSpec {
    /// `thermal[:<path>]`: sysfs millidegree file.
    Thermal(String),
    /// `vcgencmd`: firmware command.
    Vcgencmd,
}

impl Default for SensorSpec {
    fn default() -> Self {
        SensorSpec::Thermal(crate::sensor::DEFAULT_THERMAL_ZONE.to_string())
    }
}

impl FromStr for SensorSpec {
    type Err = String;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        let (kind, arg) = split_spec(s);
        match (kind, arg) {
            ("thermal", None) => Ok(SensorSpec::default()),
            ("thermal", Some(path)) => Ok(SensorSpec::Thermal(path.to_string())),
            ("vcgencmd", None) => Ok(SensorSpec::Vcgencmd),
            _ => Err(format!(
                "unknown sensor '{s}' (expected thermal[:PATH] or vcgencmd)"
            )),
        }
    }
}

impl fmt::Display for SensorSpec {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SensorSpec::Thermal(path) => write!(f, "thermal:{path}"),
            SensorSpec::Vcgencmd => write!(f, "vcgencmd"),
        }
    }
}

/// Which PWM backend drives the fan.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DriveSpec {
    /// `hw-pwm[:<channel>]`: SoC PWM channel.
    HardwarePwm(u8),
    /// `soft-pwm:<bcm pin>`: software PWM on a GPIO.
    SoftwarePwm(u8),
    /// `hwmon:<id or path>`: sysfs hwmon `pwmN` file.
    Hwmon(String),
}

impl DriveSpec {
    /// Frequency to use when none is given on the command line.
    pub fn default_frequency(&self) -> f64 {
        match self {
            DriveSpec::SoftwarePwm(_) => DEFAULT_SOFT_PWM_FREQ_HZ,
            _ => DEFAULT_HW_PWM_FREQ_HZ,
        }
    }
}

impl Default for DriveSpec {
    fn default() -> Self {
        DriveSpec::HardwarePwm(0)
    }
}

impl FromStr for DriveSpec {
    type Err = String;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        let parse_u8 = |v: &str| {
            v.parse::<u8>()
                .map_err(|e| format!("bad number '{v}' in drive '{s}': {e}"))
        };
        match split_spec(s) {
            ("hw-pwm", None) => Ok(DriveSpec::HardwarePwm(0)),
            ("hw-pwm", Some(ch)) => Ok(DriveSpec::HardwarePwm(parse_u8(ch)?)),
            ("soft-pwm", Some(pin)) => Ok(DriveSpec::SoftwarePwm(parse_u8(pin)?)),
            ("hwmon", Some(target)) => Ok(DriveSpec::Hwmon(target.to_string())),
            _ => Err(format!(
                "unknown drive '{s}' (expected hw-pwm[:CHANNEL], soft-pwm:PIN or hwmon:PWM)"
            )),
        }
    }
}

impl fmt::Display for DriveSpec {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            DriveSpec::HardwarePwm(ch) => write!(f, "hw-pwm:{ch}"),
            DriveSpec::SoftwarePwm(pin) => write!(f, "soft-pwm:{pin}"),
            DriveSpec::Hwmon(target) => write!(f, "hwmon:{target}"),
        }
    }
}

fn split_spec(s: &str) -> (&str, Option<&str>) {
    match s.trim().split_once(':') {
        Some((kind, arg)) => (kind, Some(arg).filter(|a| !a.is_empty())),
        None => (s.trim(), None),
    }
}

// ---------------------------------------------------------------------------
// Control loop settings
// ---------------------------------------------------------------------------

/// Everything the control loop needs besides its collaborators.
#[derive(Debug, Clone, PartialEq)]
pub struct Settings {
    /// Length of each tach sampling window.
    pub window: Duration,
    /// Tach pulses per fan revolution.
    pub pulses_per_rev: u32,
    /// Temperature-to-drive curve.
    pub curve: FanCurve,
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            window: Duration::from_secs_f64(DEFAULT_WINDOW_SECS),
            pulses_per_rev: DEFAULT_PULSES_PER_REV,
            curve: Preset::default().curve(),
        }
    }
}

impl Settings {
    /// Build settings from command-line style inputs. A custom curve
    /// replaces the preset; an explicit boundary overrides either.
    pub fn build(
        window_secs: f64,
        pulses_per_rev: u32,
        preset: Preset,
        custom_curve: Option<&str>,
        boundary: Option<Boundary>,
    ) -> Result<Self> {
        if !window_secs.is_finite() || window_secs <= 0.0 {
            return Err(Error::InvalidSetting(format!(
                "sampling window must be a positive number of seconds, got {window_secs}"
            )));
        }

        let mut curve = match custom_curve {
            Some(points) => {
                FanCurve::parse("custom", points, boundary.unwrap_or_default())?
            }
            None => preset.curve(),
        };
        if let Some(boundary) = boundary {
            curve = curve.with_boundary(boundary);
        }

        let settings = Self {
            window: Duration::from_secs_f64(window_secs),
            pulses_per_rev,
            curve,
        };
        settings.validate()?;
        Ok(settings)
    }

    /// Check the window and pulse constant are positive and the curve is valid.
    pub fn validate(&self) -> Result<()> {
        if self.window.is_zero() {
            return Err(Error::InvalidSetting("sampling window must be positive".into()));
        }
        if self.pulses_per_rev == 0 {
            return Err(Error::InvalidSetting(
                "pulses per revolution must be positive".into(),
            ));
        }
        self.curve.validate()
    }
}
