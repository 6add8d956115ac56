// Copyright (c) 2026 Pegasus Heavy Industries LLC
// Licensed under the MIT License

//! hwmon sysfs PWM drive backend.
//!
//! Boards that expose their fan header through a kernel `pwm-fan` style
//! driver publish `pwmN` (duty 0-255) and `pwmN_enable` files under
//! `/sys/class/hwmon/`. The backend takes manual control at startup and
//! hands control back to the kernel when released.

use crate::drive::{self, DriveOutput};
use crate::error::{Error, Result};
use std::fs;
use std::path::{Path, PathBuf};

const HWMON_ROOT: &str = "/sys/class/hwmon";

/// Native duty range of hwmon `pwmN` files.
pub const PWM_MAX: u32 = 255;

/// `pwmN_enable` modes.
const ENABLE_MANUAL: u8 = 1;
const ENABLE_AUTOMATIC: u8 = 2;

/// A hwmon PWM channel under manual control.
#[derive(Debug)]
pub struct HwmonPwm {
    /// Absolute path to the `pwmN` file
    pwm_path: PathBuf,
    /// Absolute path to the `pwmN_enable` file, if the driver has one
    pwm_enable_path: Option<PathBuf>,
    /// Last value written, to keep repeated applies write-free
    last: Option<u32>,
}

impl HwmonPwm {
    /// Open a channel by id (`hwmon3/pwm1`) or absolute path and switch it
    /// to manual mode.
    pub fn open(target: &str) -> Result<Self> {
        let pwm_path = resolve_pwm_path(target);
        if !pwm_path.exists() {
            return Err(Error::actuator(
                pwm_path.display().to_string(),
                "PWM file does not exist",
            ));
        }

        let enable = enable_path_for(&pwm_path).filter(|p| p.exists());
        let pwm = Self {
            pwm_path,
            pwm_enable_path: enable,
            last: None,
        };
        if let Some(path) = &pwm.pwm_enable_path {
            write_value(path, ENABLE_MANUAL).map_err(|e| Error::actuator(pwm.name(), e))?;
        }
        log::info!("Took manual control of {}", pwm.name());
        Ok(pwm)
    }
}

impl DriveOutput for HwmonPwm {
    fn name(&self) -> String {
        self.pwm_path.display().to_string()
    }

    fn apply(&mut self, percent: u8) -> Result<()> {
        let value = drive::to_native(percent, PWM_MAX);
        if self.last == Some(value) {
            return Ok(());
        }
        write_value(&self.pwm_path, value).map_err(|e| Error::actuator(self.name(), e))?;
        self.last = Some(value);
        Ok(())
    }

    fn release(&mut self) -> Result<()> {
        if let Some(path) = &self.pwm_enable_path {
            write_value(path, ENABLE_AUTOMATIC).map_err(|e| Error::actuator(self.name(), e))?;
            log::info!("Restored automatic control of {}", self.name());
        }
        Ok(())
    }
}

/// Scan `/sys/class/hwmon` and return the ids of all PWM channels.
pub fn discover_pwm_channels() -> std::io::Result<Vec<String>> {
    discover_in(Path::new(HWMON_ROOT))
}

fn discover_in(root: &Path) -> std::io::Result<Vec<String>> {
    let mut ids = Vec::new();

    for entry in fs::read_dir(root)? {
        let entry = entry?;
        let hwmon_dir = entry.path();
        let hwmon_basename = entry.file_name().to_string_lossy().to_string();

        // pwmN files are numbered contiguously from 1
        for n in 1..=16 {
            if !hwmon_dir.join(format!("pwm{n}")).exists() {
                break;
            }
            ids.push(format!("{hwmon_basename}/pwm{n}"));
        }
    }

    ids.sort();
    Ok(ids)
}

// ---------------------------------------------------------------------------
// Helpers
// ---------------------------------------------------------------------------

fn resolve_pwm_path(target: &str) -> PathBuf {
    let path = Path::new(target);
    if path.is_absolute() {
        path.to_path_buf()
    } else {
        Path::new(HWMON_ROOT).join(path)
    }
}

fn enable_path_for(pwm_path: &Path) -> Option<PathBuf> {
    let file_name = pwm_path.file_name()?.to_str()?;
    Some(pwm_path.with_file_name(format!("{file_name}_enable")))
}

fn write_value(path: &Path, value: impl std::fmt::Display) -> std::io::Result<()> {
    fs::write(path, format!("{value}"))
}
