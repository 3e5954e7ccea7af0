//! CLI entry point for peakwatt.
//!
//! Two subcommands wire the engine to the terminal:
//!
//! - `run` loads the settings, builds the configured meter driver (mock or
//!   PM100 over serial) and drives the acquisition loop, printing each
//!   published snapshot through the readout formatting until Ctrl-C or the
//!   optional `--duration` elapses.
//! - `calc` performs a one-shot peak-power computation from explicit
//!   fields, mirroring the manual trigger.
//!
//! # Usage
//!
//! ```bash
//! peakwatt run --config config/peakwatt.toml
//! peakwatt calc --power 100 --frequency 1 --frequency-unit kHz \
//!     --pulse-width 100 --pulse-width-unit ns --attenuation 50
//! ```

// Global allocator (Microsoft Rust Guidelines: M-MIMALLOC-APPS)
#[cfg(not(test))]
#[global_allocator]
static GLOBAL: mimalloc::MiMalloc = mimalloc::MiMalloc;

use anyhow::{anyhow, Result};
use clap::{Parser, Subcommand};
use std::path::PathBuf;
use std::time::Duration;

use peakwatt::acquisition::{AcquisitionLoop, Controls, LoopState, MeterConfig};
use peakwatt::calculator::{self, PulseSettings};
use peakwatt::config::Settings;
use peakwatt::instrument::mock::MockPowerMeter;
use peakwatt::instrument::pm100::{Pm100Config, ThorlabsPm100};
use peakwatt::instrument::PowerMeter;
use peakwatt::units::{FrequencyUnit, PowerUnit, TimeUnit};
use peakwatt::{logging, readout};

#[derive(Parser)]
#[command(name = "peakwatt")]
#[command(about = "Peak pulse power measurement for optical power meter consoles", long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Poll the meter and print corrected power and derived peak power
    Run {
        /// Settings file
        #[arg(long, default_value = "config/peakwatt.toml")]
        config: PathBuf,

        /// Stop after this many seconds (runs until Ctrl-C otherwise)
        #[arg(long)]
        duration: Option<u64>,

        /// Force the mock driver regardless of the settings file
        #[arg(long)]
        mock: bool,

        /// Emit snapshots as JSON lines instead of display strings
        #[arg(long)]
        json: bool,
    },

    /// One-shot peak power computation from explicit fields
    Calc {
        /// Average power field
        #[arg(long)]
        power: String,

        /// Unit for the average power (W, mW, µW)
        #[arg(long, default_value = "mW")]
        power_unit: String,

        /// Pulse repetition frequency field
        #[arg(long)]
        frequency: String,

        /// Unit for the frequency (Hz, kHz, MHz, GHz)
        #[arg(long, default_value = "Hz")]
        frequency_unit: String,

        /// Pulse width field
        #[arg(long)]
        pulse_width: String,

        /// Unit for the pulse width (s, ms, µs, ns)
        #[arg(long, default_value = "ns")]
        pulse_width_unit: String,

        /// Attenuation in percent (omit when no attenuator is installed)
        #[arg(long, default_value = "")]
        attenuation: String,
    },
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();
    match cli.command {
        Commands::Run {
            config,
            duration,
            mock,
            json,
        } => run(config, duration, mock, json).await,
        Commands::Calc {
            power,
            power_unit,
            frequency,
            frequency_unit,
            pulse_width,
            pulse_width_unit,
            attenuation,
        } => calc(
            power,
            &power_unit,
            frequency,
            &frequency_unit,
            pulse_width,
            &pulse_width_unit,
            attenuation,
        ),
    }
}

async fn run(
    config_path: PathBuf,
    duration: Option<u64>,
    force_mock: bool,
    json: bool,
) -> Result<()> {
    let settings = Settings::load_from(&config_path)?;
    settings.validate()?;
    logging::init_from_settings(&settings)?;

    let meter = build_meter(&settings, force_mock)?;
    let controls = Controls::new(
        settings.pulse.clone(),
        MeterConfig::new(
            settings.instrument.wavelength_nm,
            settings.instrument.averaging_count,
        ),
    );
    let mut acquisition = AcquisitionLoop::new(
        meter,
        std::sync::Arc::clone(&controls),
        settings.acquisition.interval,
    );

    let mut snapshots = acquisition.snapshots();
    let mut states = acquisition.state_channel();
    acquisition.start().await;

    let deadline = duration.map(|secs| tokio::time::Instant::now() + Duration::from_secs(secs));
    loop {
        tokio::select! {
            _ = tokio::signal::ctrl_c() => break,
            () = sleep_until_deadline(deadline) => break,
            changed = snapshots.changed() => {
                if changed.is_err() {
                    break;
                }
                let Some(snapshot) = snapshots.borrow_and_update().clone() else {
                    continue;
                };
                if json {
                    println!("{}", serde_json::to_string(&snapshot)?);
                } else {
                    println!(
                        "Average Power: {} W    {}",
                        readout::format_average_power(snapshot.corrected_watts),
                        readout::format_peak_power(&snapshot.peak)
                    );
                }
            }
            changed = states.changed() => {
                if changed.is_err() {
                    break;
                }
                let state = states.borrow_and_update().clone();
                if let LoopState::Halted { reason } = state {
                    eprintln!("acquisition halted: {reason} (restart required)");
                    break;
                }
            }
        }
    }

    acquisition.stop().await;
    Ok(())
}

async fn sleep_until_deadline(deadline: Option<tokio::time::Instant>) {
    match deadline {
        Some(instant) => tokio::time::sleep_until(instant).await,
        None => std::future::pending().await,
    }
}

fn build_meter(settings: &Settings, force_mock: bool) -> Result<Box<dyn PowerMeter>> {
    if force_mock || settings.instrument.driver == "mock" {
        return Ok(Box::new(MockPowerMeter::new(
            settings.instrument.mock_power_watts,
        )));
    }

    let port = settings
        .instrument
        .port
        .clone()
        .ok_or_else(|| anyhow!("instrument.port is required for the pm100 driver"))?;
    let meter = ThorlabsPm100::open(&Pm100Config {
        port,
        baud_rate: settings.instrument.baud_rate,
        timeout: Duration::from_millis(settings.instrument.timeout_ms),
    })?;
    Ok(Box::new(meter))
}

fn calc(
    power: String,
    power_unit: &str,
    frequency: String,
    frequency_unit: &str,
    pulse_width: String,
    pulse_width_unit: &str,
    attenuation: String,
) -> Result<()> {
    let power_unit: PowerUnit = power_unit.parse()?;
    let frequency_unit: FrequencyUnit = frequency_unit.parse()?;
    let pulse_width_unit: TimeUnit = pulse_width_unit.parse()?;

    let pulse = PulseSettings {
        frequency,
        frequency_unit,
        pulse_width,
        pulse_width_unit,
        attenuation_percent: attenuation,
    };
    let result = calculator::compute_fields(&power, power_unit, &pulse);
    println!("{}", readout::format_peak_power(&result));
    Ok(())
}
