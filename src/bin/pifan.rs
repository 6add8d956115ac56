// Copyright (c) 2026 Pegasus Heavy Industries LLC
// Licensed under the MIT License

//! pifan: drives a PWM fan from a temperature curve and reports its
//! tachometer speed every sampling window until interrupted.

use anyhow::Context;
use clap::Parser;
use pi_fan_controller::config::{self, DriveSpec, Preset, SensorSpec, Settings};
use pi_fan_controller::control::ControlLoop;
use pi_fan_controller::curve::Boundary;
use pi_fan_controller::drive::DriveOutput;
use pi_fan_controller::hwmon::{self, HwmonPwm};
use pi_fan_controller::observation::{ConsoleSink, OutputFormat};
use pi_fan_controller::sensor::{TemperatureSource, ThermalZone, VcgencmdSource};
use pi_fan_controller::shutdown;
use pi_fan_controller::tach::{EdgeSource, NoTach};

// ---------------------------------------------------------------------------
// CLI
// ---------------------------------------------------------------------------

#[derive(Parser, Debug)]
#[command(name = "pifan", about = "Temperature-driven PWM fan controller", version)]
struct Cli {
    /// Temperature source: thermal[:PATH] or vcgencmd.
    #[arg(long, default_value_t = SensorSpec::default())]
    sensor: SensorSpec,

    /// PWM output: hw-pwm[:CHANNEL], soft-pwm:PIN or hwmon:PWM.
    #[arg(long, default_value_t = DriveSpec::default())]
    drive: DriveSpec,

    /// PWM frequency in Hz (defaults to 25000, or 25 for soft-pwm).
    #[arg(long)]
    frequency: Option<f64>,

    /// BCM pin of the tachometer line.
    #[arg(long, default_value_t = config::DEFAULT_TACH_PIN, conflicts_with = "no_tach")]
    tach: u8,

    /// Run without a tachometer; RPM reads 0.
    #[arg(long)]
    no_tach: bool,

    /// Tachometer pulses per fan revolution.
    #[arg(long, default_value_t = config::DEFAULT_PULSES_PER_REV)]
    pulses_per_rev: u32,

    /// Sampling window in seconds.
    #[arg(short, long, default_value_t = config::DEFAULT_WINDOW_SECS)]
    window: f64,

    /// Built-in curve: standard or gradual.
    #[arg(long, default_value = "standard")]
    preset: Preset,

    /// Custom curve as TEMP:PERCENT pairs, e.g. "50:40,60:70,70:100".
    #[arg(long)]
    curve: Option<String>,

    /// Whether a reading equal to a threshold enters its band: inclusive or exclusive.
    #[arg(long)]
    boundary: Option<Boundary>,

    /// Observation line format: text or json.
    #[arg(long, default_value = "text")]
    format: OutputFormat,

    /// List hwmon PWM channels and exit.
    #[arg(long)]
    list_hwmon: bool,
}

// ---------------------------------------------------------------------------
// Main
// ---------------------------------------------------------------------------

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();

    let cli = Cli::parse();
    if cli.list_hwmon {
        for id in hwmon::discover_pwm_channels().context("Failed to scan hwmon")? {
            println!("{id}");
        }
        return Ok(());
    }

    let settings = Settings::build(
        cli.window,
        cli.pulses_per_rev,
        cli.preset,
        cli.curve.as_deref(),
        cli.boundary,
    )
    .context("Invalid settings")?;

    // Claim the tach pin before touching the fan so a bad pin leaves the
    // drive untouched.
    let edges = open_tach(&cli).context("Failed to initialize tachometer")?;
    let sensor = open_sensor(&cli.sensor);
    let frequency = cli.frequency.unwrap_or_else(|| cli.drive.default_frequency());
    let drive = open_drive(&cli.drive, frequency)
        .with_context(|| format!("Failed to initialize drive {}", cli.drive))?;

    let mut control = ControlLoop::start(sensor, drive, edges, ConsoleSink::new(cli.format), settings)
        .context("Failed to start control loop")?;

    let (trigger, signal) = shutdown::channel();
    shutdown::listen_for_signals(trigger).context("Failed to install signal handlers")?;
    log::info!("Fan control running, press Ctrl+C to stop");

    let report = control.run(signal).await?;
    log::info!("Stopped after {} cycle(s), fan off", report.cycles);
    Ok(())
}

// ---------------------------------------------------------------------------
// Backend construction
// ---------------------------------------------------------------------------

fn open_sensor(spec: &SensorSpec) -> Box<dyn TemperatureSource> {
    match spec {
        SensorSpec::Thermal(path) => Box::new(ThermalZone::new(path)),
        SensorSpec::Vcgencmd => Box::new(VcgencmdSource::default()),
    }
}

fn open_drive(spec: &DriveSpec, frequency: f64) -> anyhow::Result<Box<dyn DriveOutput>> {
    match spec {
        DriveSpec::Hwmon(target) => Ok(Box::new(HwmonPwm::open(target)?)),
        #[cfg(feature = "rpi")]
        DriveSpec::HardwarePwm(channel) => Ok(Box::new(
            pi_fan_controller::gpio::HardwarePwm::new(*channel, frequency)?,
        )),
        #[cfg(feature = "rpi")]
        DriveSpec::SoftwarePwm(pin) => Ok(Box::new(
            pi_fan_controller::gpio::SoftwarePwm::new(*pin, frequency)?,
        )),
        #[cfg(not(feature = "rpi"))]
        other => {
            let _ = frequency;
            anyhow::bail!("{other} needs GPIO support (build with the `rpi` feature)")
        }
    }
}

fn open_tach(cli: &Cli) -> anyhow::Result<Box<dyn EdgeSource>> {
    if cli.no_tach {
        return Ok(Box::new(NoTach));
    }
    #[cfg(feature = "rpi")]
    {
        Ok(Box::new(pi_fan_controller::gpio::GpioTach::new(cli.tach)?))
    }
    #[cfg(not(feature = "rpi"))]
    {
        anyhow::bail!(
            "tachometer on GPIO{} needs GPIO support (build with the `rpi` feature or pass --no-tach)",
            cli.tach
        )
    }
}
