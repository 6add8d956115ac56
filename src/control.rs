// Copyright (c) 2026 Pegasus Heavy Industries LLC
// Licensed under the MIT License

//! The sampling-and-control loop.
//!
//! Each cycle reads the temperature, evaluates the curve, applies the drive
//! level, then opens a tach sampling window and waits it out before
//! estimating RPM and emitting an [`Observation`]. The measured RPM is only
//! reported; it never feeds back into the drive decision.
//!
//! The window wait is the only suspension point and races the shutdown
//! signal, so cancellation lands within a scheduler tick rather than at
//! the end of the window. Whatever ends the loop, the fan is driven to 0%
//! exactly once on the way out.

use crate::config::Settings;
use crate::drive::{DriveOutput, OFF_PERCENT};
use crate::error::Result;
use crate::observation::{Observation, ObservationSink};
use crate::sensor::TemperatureSource;
use crate::shutdown::ShutdownSignal;
use crate::tach::{self, EdgeSource, PulseCounter};
use std::sync::Arc;

/// Lifecycle of a [`ControlLoop`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LoopState {
    Running,
    ShuttingDown,
    Stopped,
}

/// How a completed run went.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RunReport {
    /// Cycles that reached the observation step.
    pub cycles: u64,
    pub final_state: LoopState,
}

/// Result of a single cycle.
enum Cycle {
    Completed(Observation),
    Cancelled,
}

/// Orchestrates sensor, curve, drive and tach for one fan.
pub struct ControlLoop<T, D, E, S> {
    sensor: T,
    drive: D,
    edges: E,
    sink: S,
    settings: Settings,
    counter: Arc<PulseCounter>,
    state: LoopState,
    drive_percent: u8,
}

impl<T, D, E, S> ControlLoop<T, D, E, S>
where
    T: TemperatureSource,
    D: DriveOutput,
    E: EdgeSource,
    S: ObservationSink,
{
    /// Validate the settings and register the edge source.
    ///
    /// No partial startup: if registration fails the fan is driven off and
    /// the fault is returned before any cycle runs.
    pub fn start(sensor: T, mut drive: D, mut edges: E, sink: S, settings: Settings) -> Result<Self> {
        settings.validate()?;

        let counter = Arc::new(PulseCounter::new());
        if let Err(e) = edges.attach(counter.clone()) {
            force_off(&mut drive);
            return Err(e);
        }

        log::info!(
            "Control loop starting: sensor {}, drive {}, tach {}, window {:?}, {} pulse(s)/rev, curve {}",
            sensor.name(),
            drive.name(),
            edges.name(),
            settings.window,
            settings.pulses_per_rev,
            settings.curve
        );

        Ok(Self {
            sensor,
            drive,
            edges,
            sink,
            settings,
            counter,
            state: LoopState::Running,
            drive_percent: OFF_PERCENT,
        })
    }

    pub fn state(&self) -> LoopState {
        self.state
    }

    /// Drive level applied by the most recent cycle (0 once stopped).
    pub fn drive_percent(&self) -> u8 {
        self.drive_percent
    }

    pub fn sink(&self) -> &S {
        &self.sink
    }

    /// Run cycles until `shutdown` fires or a collaborator fails, then shut
    /// down. Returns the fatal error, if any, after the fan is off.
    pub async fn run(&mut self, mut shutdown: ShutdownSignal) -> Result<RunReport> {
        let mut cycles = 0;
        let mut fatal = None;

        while self.state == LoopState::Running {
            if shutdown.is_triggered() {
                break;
            }
            match self.cycle(&mut shutdown).await {
                Ok(Cycle::Completed(observation)) => {
                    cycles += 1;
                    self.sink.emit(&observation);
                }
                Ok(Cycle::Cancelled) => break,
                Err(e) => {
                    log::error!("{e}");
                    fatal = Some(e);
                    break;
                }
            }
        }

        self.shut_down();

        match fatal {
            Some(e) => Err(e),
            None => Ok(RunReport {
                cycles,
                final_state: self.state,
            }),
        }
    }

    async fn cycle(&mut self, shutdown: &mut ShutdownSignal) -> Result<Cycle> {
        let temperature_c = self.sensor.read()?;
        let percent = self.settings.curve.evaluate(temperature_c);
        self.drive.apply(percent)?;
        self.drive_percent = percent;

        let stale = self.counter.reset();
        log::debug!("Window opened at {temperature_c:.1}C / {percent}%, discarded {stale} stale pulse(s)");

        tokio::select! {
            _ = tokio::time::sleep(self.settings.window) => {}
            _ = shutdown.triggered() => return Ok(Cycle::Cancelled),
        }

        let pulses = self.counter.snapshot();
        let rpm = tach::estimate_rpm(pulses, self.settings.window, self.settings.pulses_per_rev);
        log::debug!("Window closed with {pulses} pulse(s)");

        Ok(Cycle::Completed(Observation {
            temperature_c,
            drive_percent: percent,
            rpm,
            pulses,
        }))
    }

    /// `Running -> ShuttingDown -> Stopped`. Runs at most once.
    fn shut_down(&mut self) {
        if self.state != LoopState::Running {
            return;
        }
        self.state = LoopState::ShuttingDown;
        log::info!("Stopping, turning fan off");

        force_off(&mut self.drive);
        self.drive_percent = OFF_PERCENT;

        if let Err(e) = self.edges.detach() {
            log::warn!("Failed to release tachometer {}: {e}", self.edges.name());
        }
        if let Err(e) = self.drive.release() {
            log::warn!("Failed to release drive {}: {e}", self.drive.name());
        }

        self.state = LoopState::Stopped;
    }
}

/// Best-effort 0% write. A failure here is logged, never returned, so it
/// cannot mask the error that triggered the shutdown.
fn force_off<D: DriveOutput>(drive: &mut D) {
    if let Err(e) = drive.apply(OFF_PERCENT) {
        log::error!("Could not turn fan off via {}: {e}", drive.name());
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::curve;
    use crate::error::Error;
    use crate::observation::MemorySink;
    use crate::shutdown;
    use crate::tach::NoTach;
    use std::collections::VecDeque;
    use std::sync::Mutex;
    use std::time::Duration;
    use tokio::time::Instant;

    /// Replays queued readings, then repeats the last one.
    struct FakeSensor {
        readings: VecDeque<Result<f64>>,
        last: f64,
    }

    impl FakeSensor {
        fn fixed(temp: f64) -> Self {
            Self {
                readings: VecDeque::new(),
                last: temp,
            }
        }

        fn sequence(readings: Vec<Result<f64>>) -> Self {
            Self {
                readings: readings.into(),
                last: 0.0,
            }
        }
    }

    impl TemperatureSource for FakeSensor {
        fn name(&self) -> String {
            "fake".into()
        }

        fn read(&mut self) -> Result<f64> {
            match self.readings.pop_front() {
                Some(Ok(t)) => {
                    self.last = t;
                    Ok(t)
                }
                Some(Err(e)) => Err(e),
                None => Ok(self.last),
            }
        }
    }

    /// Records every applied percentage.
    #[derive(Clone, Default)]
    struct FakeDrive {
        applied: Arc<Mutex<Vec<u8>>>,
        fail_nonzero: bool,
        fail_all: bool,
    }

    impl FakeDrive {
        fn applied(&self) -> Vec<u8> {
            self.applied.lock().unwrap().clone()
        }
    }

    impl DriveOutput for FakeDrive {
        fn name(&self) -> String {
            "fake".into()
        }

        fn apply(&mut self, percent: u8) -> Result<()> {
            if self.fail_all || (self.fail_nonzero && percent > 0) {
                return Err(Error::actuator("fake", "write failed"));
            }
            self.applied.lock().unwrap().push(percent);
            Ok(())
        }
    }

    /// Emits a fixed number of pulses at the start of every window.
    #[derive(Clone, Default)]
    struct FakeTach {
        counter: Arc<Mutex<Option<Arc<PulseCounter>>>>,
        fail_attach: bool,
        detached: Arc<Mutex<u32>>,
    }

    impl FakeTach {
        fn pulse(&self, n: u64) {
            if let Some(c) = self.counter.lock().unwrap().as_ref() {
                for _ in 0..n {
                    c.increment();
                }
            }
        }
    }

    impl EdgeSource for FakeTach {
        fn name(&self) -> String {
            "fake".into()
        }

        fn attach(&mut self, counter: Arc<PulseCounter>) -> Result<()> {
            if self.fail_attach {
                return Err(Error::actuator("fake", "no such pin"));
            }
            *self.counter.lock().unwrap() = Some(counter);
            Ok(())
        }

        fn detach(&mut self) -> Result<()> {
            *self.detached.lock().unwrap() += 1;
            self.counter.lock().unwrap().take();
            Ok(())
        }
    }

    fn settings(window: Duration) -> Settings {
        Settings {
            window,
            pulses_per_rev: 2,
            curve: curve::standard_curve(),
        }
    }

    #[tokio::test]
    async fn test_cycle_reports_temperature_drive_and_rpm() {
        let drive = FakeDrive::default();
        let tach = FakeTach::default();
        let mut ctl = ControlLoop::start(
            FakeSensor::fixed(55.0),
            drive.clone(),
            tach.clone(),
            MemorySink::default(),
            settings(Duration::from_millis(250)),
        )
        .unwrap();

        let (stop, signal) = shutdown::channel();
        let pulser = tokio::spawn({
            let tach = tach.clone();
            async move {
                // Land inside the first window.
                tokio::time::sleep(Duration::from_millis(50)).await;
                tach.pulse(20);
                tokio::time::sleep(Duration::from_millis(300)).await;
                stop.trigger();
            }
        });

        let report = ctl.run(signal).await.unwrap();
        pulser.await.unwrap();

        let first = ctl.sink().observations[0];
        assert_eq!(first.temperature_c, 55.0);
        assert_eq!(first.drive_percent, 40);
        assert_eq!(first.pulses, 20);
        // 20 pulses / 2 per rev over 0.25s
        assert_eq!(first.rpm, 2400);
        assert_eq!(report.cycles, 1);
        assert_eq!(report.final_state, LoopState::Stopped);
        assert_eq!(drive.applied(), vec![40, 40, 0]);
    }

    #[tokio::test]
    async fn test_pulses_before_window_are_not_attributed() {
        let tach = FakeTach::default();
        let mut ctl = ControlLoop::start(
            FakeSensor::fixed(72.0),
            FakeDrive::default(),
            tach.clone(),
            MemorySink::default(),
            settings(Duration::from_millis(100)),
        )
        .unwrap();

        // Arrive before the first window opens.
        tach.pulse(500);

        let (stop, signal) = shutdown::channel();
        tokio::spawn(async move {
            tokio::time::sleep(Duration::from_millis(150)).await;
            stop.trigger();
        });
        ctl.run(signal).await.unwrap();

        let first = ctl.sink().observations[0];
        assert_eq!(first.drive_percent, 100);
        assert_eq!(first.pulses, 0);
        assert_eq!(first.rpm, 0);
    }

    #[tokio::test]
    async fn test_cancel_mid_window_stops_promptly_and_turns_fan_off_once() {
        let drive = FakeDrive::default();
        let tach = FakeTach::default();
        let mut ctl = ControlLoop::start(
            FakeSensor::fixed(55.0),
            drive.clone(),
            tach.clone(),
            MemorySink::default(),
            settings(Duration::from_secs(30)),
        )
        .unwrap();

        let (stop, signal) = shutdown::channel();
        let run = tokio::spawn(async move {
            let report = ctl.run(signal).await;
            (report, Instant::now(), ctl.state(), ctl.drive_percent())
        });

        tokio::time::sleep(Duration::from_millis(50)).await;
        let cancelled_at = Instant::now();
        stop.trigger();

        let (report, finished_at, state, percent) = run.await.unwrap();
        let report = report.unwrap();

        assert!(finished_at - cancelled_at < Duration::from_millis(100));
        assert_eq!(report.cycles, 0);
        assert_eq!(state, LoopState::Stopped);
        assert_eq!(percent, 0);
        assert_eq!(drive.applied(), vec![40, 0]);
        assert_eq!(drive.applied().iter().filter(|p| **p == 0).count(), 1);
        assert_eq!(*tach.detached.lock().unwrap(), 1);
    }

    #[tokio::test]
    async fn test_already_cancelled_runs_no_cycle() {
        let drive = FakeDrive::default();
        let mut ctl = ControlLoop::start(
            FakeSensor::fixed(65.0),
            drive.clone(),
            NoTach,
            MemorySink::default(),
            settings(Duration::from_secs(5)),
        )
        .unwrap();

        let (stop, signal) = shutdown::channel();
        stop.trigger();
        let report = ctl.run(signal).await.unwrap();

        assert_eq!(report.cycles, 0);
        assert_eq!(drive.applied(), vec![0]);
        assert!(ctl.sink().observations.is_empty());
    }

    #[tokio::test]
    async fn test_sensor_failure_is_fatal_and_turns_fan_off() {
        let drive = FakeDrive::default();
        let tach = FakeTach::default();
        let mut ctl = ControlLoop::start(
            FakeSensor::sequence(vec![Ok(61.0), Err(Error::sensor("fake", "gone"))]),
            drive.clone(),
            tach.clone(),
            MemorySink::default(),
            settings(Duration::from_millis(10)),
        )
        .unwrap();

        let (_stop, signal) = shutdown::channel();
        let err = ctl.run(signal).await.unwrap_err();

        assert!(matches!(err, Error::SensorUnavailable { .. }));
        assert_eq!(ctl.state(), LoopState::Stopped);
        assert_eq!(ctl.sink().observations.len(), 1);
        assert_eq!(drive.applied(), vec![70, 0]);
        assert_eq!(*tach.detached.lock().unwrap(), 1);
    }

    #[tokio::test]
    async fn test_failed_off_write_does_not_mask_original_error() {
        let drive = FakeDrive {
            fail_all: true,
            ..Default::default()
        };
        let mut ctl = ControlLoop::start(
            FakeSensor::sequence(vec![Err(Error::sensor("fake", "gone"))]),
            drive,
            FakeTach::default(),
            MemorySink::default(),
            settings(Duration::from_millis(10)),
        )
        .unwrap();

        let (_stop, signal) = shutdown::channel();
        let err = ctl.run(signal).await.unwrap_err();
        assert!(matches!(err, Error::SensorUnavailable { .. }));
        assert_eq!(ctl.state(), LoopState::Stopped);
    }

    #[tokio::test]
    async fn test_drive_failure_mid_loop_is_actuator_fault() {
        let drive = FakeDrive {
            fail_nonzero: true,
            ..Default::default()
        };
        let mut ctl = ControlLoop::start(
            FakeSensor::fixed(80.0),
            drive.clone(),
            FakeTach::default(),
            MemorySink::default(),
            settings(Duration::from_millis(10)),
        )
        .unwrap();

        let (_stop, signal) = shutdown::channel();
        let err = ctl.run(signal).await.unwrap_err();
        assert!(matches!(err, Error::ActuatorFault { .. }));
        assert_eq!(drive.applied(), vec![0]);
    }

    #[test]
    fn test_failed_registration_aborts_startup() {
        let drive = FakeDrive::default();
        let tach = FakeTach {
            fail_attach: true,
            ..Default::default()
        };
        let result = ControlLoop::start(
            FakeSensor::fixed(40.0),
            drive.clone(),
            tach,
            MemorySink::default(),
            settings(Duration::from_secs(2)),
        );
        assert!(matches!(result, Err(Error::ActuatorFault { .. })));
        assert_eq!(drive.applied(), vec![0]);
    }

    #[test]
    fn test_invalid_settings_rejected_before_registration() {
        let tach = FakeTach::default();
        let mut bad = settings(Duration::from_secs(2));
        bad.pulses_per_rev = 0;
        let result = ControlLoop::start(
            FakeSensor::fixed(40.0),
            FakeDrive::default(),
            tach.clone(),
            MemorySink::default(),
            bad,
        );
        assert!(matches!(result, Err(Error::InvalidSetting(_))));
        assert!(tach.counter.lock().unwrap().is_none());
    }
}
