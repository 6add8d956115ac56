// Copyright (c) 2026 Pegasus Heavy Industries LLC
// Licensed under the MIT License

//! Drive output: applying a fan duty percentage to a PWM backend.

use crate::error::Result;

/// Duty percentage that switches the fan off.
pub const OFF_PERCENT: u8 = 0;

/// Something that turns a 0-100 percentage into a PWM duty cycle.
///
/// Backends are initialized (pin direction, frequency) before they are
/// handed to the control loop. `apply` must be idempotent and
/// `apply(OFF_PERCENT)` must always be accepted.
pub trait DriveOutput: Send {
    /// Human-readable name used in logs and error messages.
    fn name(&self) -> String;

    /// Commit `percent` (clamped to 0-100) to the output.
    fn apply(&mut self, percent: u8) -> Result<()>;

    /// Release the output at shutdown, after the final `apply(0)`.
    fn release(&mut self) -> Result<()> {
        Ok(())
    }
}

/// Scale a percentage into an integer duty range `0..=max`, truncating.
///
/// 40% of 255 is 102.
pub fn to_native(percent: u8, max: u32) -> u32 {
    let percent = u64::from(percent.min(100));
    (percent * u64::from(max) / 100) as u32
}

/// Scale a percentage into a 0.0-1.0 duty fraction.
pub fn to_fraction(percent: u8) -> f64 {
    f64::from(percent.min(100)) / 100.0
}

impl<D: DriveOutput + ?Sized> DriveOutput for Box<D> {
    fn name(&self) -> String {
        (**self).name()
    }

    fn apply(&mut self, percent: u8) -> Result<()> {
        (**self).apply(percent)
    }

    fn release(&mut self) -> Result<()> {
        (**self).release()
    }
}
