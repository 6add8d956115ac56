// Copyright (c) 2026 Pegasus Heavy Industries LLC
// Licensed under the MIT License

//! Tachometer pulse counting and RPM estimation.
//!
//! The sense line of a PC fan pulls low a fixed number of times per
//! revolution. An edge-event callback bumps a [`PulseCounter`] on every
//! falling edge while the control loop opens and closes sampling windows
//! with [`PulseCounter::reset`] and [`PulseCounter::snapshot`].

use crate::error::Result;
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;

/// Pulse counter shared between the edge callback and the control loop.
///
/// All three operations are single atomic instructions, so an edge racing
/// a window boundary is counted exactly once, in one window or the other.
#[derive(Debug, Default)]
pub struct PulseCounter {
    count: AtomicU64,
}

impl PulseCounter {
    pub fn new() -> Self {
        Self::default()
    }

    /// Record one edge. Called from the edge-event context.
    pub fn increment(&self) {
        self.count.fetch_add(1, Ordering::AcqRel);
    }

    /// Open a new window. Returns the pulses discarded from before it.
    pub fn reset(&self) -> u64 {
        self.count.swap(0, Ordering::AcqRel)
    }

    /// Read the count accumulated since the last reset.
    pub fn snapshot(&self) -> u64 {
        self.count.load(Ordering::Acquire)
    }
}

/// Convert a window's pulse count into revolutions per minute.
///
/// `(pulses / pulses_per_rev) * (60 / window)`, truncated toward zero.
/// Zero pulses is a stopped fan or a disconnected sense line; the two are
/// indistinguishable here and both report 0. Callers guarantee a positive
/// window and pulse constant (see [`crate::config::Settings::validate`]).
pub fn estimate_rpm(pulses: u64, window: Duration, pulses_per_rev: u32) -> u32 {
    let window_secs = window.as_secs_f64();
    if pulses == 0 || pulses_per_rev == 0 || window_secs <= 0.0 {
        return 0;
    }
    let revolutions = pulses as f64 / pulses_per_rev as f64;
    let rpm = revolutions * (60.0 / window_secs);
    rpm.min(u32::MAX as f64) as u32
}

/// A source of tachometer edges that can feed a [`PulseCounter`].
///
/// Registration happens once at startup; the registration is held until
/// [`EdgeSource::detach`] is called during shutdown.
pub trait EdgeSource: Send {
    /// Human-readable name used in logs and error messages.
    fn name(&self) -> String;

    /// Start invoking `counter.increment()` on every falling edge.
    fn attach(&mut self, counter: Arc<PulseCounter>) -> Result<()>;

    /// Stop delivering edges. Safe to call when not attached.
    fn detach(&mut self) -> Result<()>;
}

impl<E: EdgeSource + ?Sized> EdgeSource for Box<E> {
    fn name(&self) -> String {
        (**self).name()
    }

    fn attach(&mut self, counter: Arc<PulseCounter>) -> Result<()> {
        (**self).attach(counter)
    }

    fn detach(&mut self) -> Result<()> {
        (**self).detach()
    }
}

/// Edge source for fans without a wired sense line. RPM always reads 0.
#[derive(Debug, Default)]
pub struct NoTach;

impl EdgeSource for NoTach {
    fn name(&self) -> String {
        "none".to_string()
    }

    fn attach(&mut self, _counter: Arc<PulseCounter>) -> Result<()> {
        log::info!("No tachometer configured, RPM will read 0");
        Ok(())
    }

    fn detach(&mut self) -> Result<()> {
        Ok(())
    }
}
