// Copyright (c) 2026 Pegasus Heavy Industries LLC
// Licensed under the MIT License

//! Raspberry Pi GPIO backends built on `rppal`.
//!
//! - [`HardwarePwm`]: the SoC PWM peripheral (`Pwm0` is GPIO18 with the
//!   default `pwm` overlay), suitable for 25 kHz 4-pin fans.
//! - [`SoftwarePwm`]: software PWM on any output pin, for low frequencies.
//! - [`GpioTach`]: falling-edge interrupts on the fan's sense line.

use crate::drive::{self, DriveOutput};
use crate::error::{Error, Result};
use crate::tach::{EdgeSource, PulseCounter};
use rppal::gpio::{Gpio, InputPin, OutputPin, Trigger};
use rppal::pwm::{Channel, Polarity, Pwm};
use std::sync::Arc;

/// Hardware PWM channel driven as a 0.0-1.0 duty fraction.
pub struct HardwarePwm {
    pwm: Pwm,
    channel: u8,
    last: Option<u8>,
}

impl HardwarePwm {
    /// Configure `channel` (0 or 1) at `frequency_hz`, enabled at 0% duty.
    pub fn new(channel: u8, frequency_hz: f64) -> Result<Self> {
        let name = format!("pwm{channel}");
        let ch = match channel {
            0 => Channel::Pwm0,
            1 => Channel::Pwm1,
            other => {
                return Err(Error::actuator(
                    name,
                    format!("no hardware PWM channel {other} (expected 0 or 1)"),
                ));
            }
        };
        let pwm = Pwm::with_frequency(ch, frequency_hz, 0.0, Polarity::Normal, true)
            .map_err(|e| Error::actuator(&name, e))?;
        log::info!("Hardware PWM channel {channel} enabled at {frequency_hz} Hz");
        Ok(Self {
            pwm,
            channel,
            last: None,
        })
    }
}

impl DriveOutput for HardwarePwm {
    fn name(&self) -> String {
        format!("pwm{}", self.channel)
    }

    fn apply(&mut self, percent: u8) -> Result<()> {
        let percent = percent.min(100);
        if self.last == Some(percent) {
            return Ok(());
        }
        self.pwm
            .set_duty_cycle(drive::to_fraction(percent))
            .map_err(|e| Error::actuator(self.name(), e))?;
        self.last = Some(percent);
        Ok(())
    }

    fn release(&mut self) -> Result<()> {
        self.pwm
            .disable()
            .map_err(|e| Error::actuator(self.name(), e))
    }
}

/// Software PWM on a BCM-numbered output pin.
pub struct SoftwarePwm {
    pin: OutputPin,
    frequency_hz: f64,
    last: Option<u8>,
}

impl SoftwarePwm {
    /// Claim `bcm_pin` as an output and start it at 0% duty.
    pub fn new(bcm_pin: u8, frequency_hz: f64) -> Result<Self> {
        let name = format!("gpio{bcm_pin}");
        let mut pin = Gpio::new()
            .and_then(|gpio| gpio.get(bcm_pin))
            .map_err(|e| Error::actuator(&name, e))?
            .into_output_low();
        pin.set_pwm_frequency(frequency_hz, 0.0)
            .map_err(|e| Error::actuator(&name, e))?;
        log::info!("Software PWM on GPIO{bcm_pin} at {frequency_hz} Hz");
        Ok(Self {
            pin,
            frequency_hz,
            last: None,
        })
    }
}

impl DriveOutput for SoftwarePwm {
    fn name(&self) -> String {
        format!("gpio{}", self.pin.pin())
    }

    fn apply(&mut self, percent: u8) -> Result<()> {
        let percent = percent.min(100);
        if self.last == Some(percent) {
            return Ok(());
        }
        self.pin
            .set_pwm_frequency(self.frequency_hz, drive::to_fraction(percent))
            .map_err(|e| Error::actuator(self.name(), e))?;
        self.last = Some(percent);
        Ok(())
    }

    fn release(&mut self) -> Result<()> {
        self.pin
            .clear_pwm()
            .map_err(|e| Error::actuator(self.name(), e))?;
        self.pin.set_low();
        Ok(())
    }
}

/// Tachometer input with pull-up, counting falling edges.
pub struct GpioTach {
    // Holds the interrupt registration for as long as it lives.
    pin: InputPin,
    attached: bool,
}

impl GpioTach {
    /// Claim `bcm_pin` as an input with the internal pull-up enabled
    /// (fan tach outputs are open-collector).
    pub fn new(bcm_pin: u8) -> Result<Self> {
        let pin = Gpio::new()
            .and_then(|gpio| gpio.get(bcm_pin))
            .map_err(|e| Error::actuator(format!("gpio{bcm_pin}"), e))?
            .into_input_pullup();
        Ok(Self {
            pin,
            attached: false,
        })
    }
}

impl EdgeSource for GpioTach {
    fn name(&self) -> String {
        format!("gpio{}", self.pin.pin())
    }

    fn attach(&mut self, counter: Arc<PulseCounter>) -> Result<()> {
        self.pin
            .set_async_interrupt(Trigger::FallingEdge, move |_| counter.increment())
            .map_err(|e| Error::actuator(self.name(), e))?;
        self.attached = true;
        log::info!("Counting falling edges on {}", self.name());
        Ok(())
    }

    fn detach(&mut self) -> Result<()> {
        if !self.attached {
            return Ok(());
        }
        self.pin
            .clear_async_interrupt()
            .map_err(|e| Error::actuator(self.name(), e))?;
        self.attached = false;
        Ok(())
    }
}
