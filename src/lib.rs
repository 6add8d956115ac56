// Copyright (c) 2026 Pegasus Heavy Industries LLC
// Licensed under the MIT License

//! Temperature-driven PWM fan control with tachometer RPM monitoring.
//!
//! [`control::ControlLoop`] ties a [`sensor::TemperatureSource`], a
//! [`curve::FanCurve`] and a [`drive::DriveOutput`] together, and reports
//! the fan speed measured through a [`tach::EdgeSource`] each cycle.

pub mod config;
pub mod control;
pub mod curve;
pub mod drive;
pub mod error;
#[cfg(feature = "rpi")]
pub mod gpio;
pub mod hwmon;
pub mod observation;
pub mod sensor;
pub mod shutdown;
pub mod tach;
