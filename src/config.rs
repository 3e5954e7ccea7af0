//! Application settings loaded from TOML and environment.
//!
//! Settings come from a TOML file merged with `PEAKWATT_`-prefixed
//! environment variables (double underscore separates nesting levels, e.g.
//! `PEAKWATT_APPLICATION__LOG_LEVEL=debug`). Every field carries a default,
//! so a missing file yields a usable mock-driver configuration. Semantic
//! checks that parsing cannot catch live in [`Settings::validate`].

use crate::calculator::PulseSettings;
use crate::error::{MeterError, MeterResult};
use figment::{
    providers::{Env, Format, Toml},
    Figment,
};
use serde::{Deserialize, Serialize};
use std::path::Path;
use std::time::Duration;

/// Wavelength pushed to the console when the operator leaves the field
/// empty.
pub const DEFAULT_WAVELENGTH_NM: f64 = 905.0;

/// Averaging sample count pushed when the field is left empty.
pub const DEFAULT_AVERAGING_COUNT: u32 = 100;

/// Top-level settings.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Settings {
    /// Application-level settings.
    #[serde(default)]
    pub application: ApplicationConfig,
    /// Acquisition loop settings.
    #[serde(default)]
    pub acquisition: AcquisitionConfig,
    /// Instrument selection and parameters.
    #[serde(default)]
    pub instrument: InstrumentConfig,
    /// Pulse fields used for headless auto-computation.
    #[serde(default)]
    pub pulse: PulseSettings,
}

/// Application-level configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ApplicationConfig {
    /// Application name.
    #[serde(default = "default_name")]
    pub name: String,
    /// Logging level (trace, debug, info, warn, error).
    #[serde(default = "default_log_level")]
    pub log_level: String,
}

/// Acquisition loop configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AcquisitionConfig {
    /// Delay between ticks, e.g. "500ms".
    #[serde(with = "humantime_serde", default = "default_interval")]
    pub interval: Duration,
}

/// Instrument selection and parameters.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct InstrumentConfig {
    /// Driver name: "mock" or "pm100".
    #[serde(default = "default_driver")]
    pub driver: String,
    /// Serial port for the pm100 driver.
    #[serde(default)]
    pub port: Option<String>,
    /// Baud rate for the pm100 driver.
    #[serde(default = "default_baud_rate")]
    pub baud_rate: u32,
    /// Per-command timeout for the pm100 driver, in milliseconds.
    #[serde(default = "default_timeout_ms")]
    pub timeout_ms: u64,
    /// Wavelength correction in nm; 905 when unset.
    #[serde(default)]
    pub wavelength_nm: Option<f64>,
    /// Averaging sample count; 100 when unset.
    #[serde(default)]
    pub averaging_count: Option<u32>,
    /// Mock driver baseline power in watts.
    #[serde(default = "default_mock_power")]
    pub mock_power_watts: f64,
}

fn default_name() -> String {
    "peakwatt".to_string()
}

fn default_log_level() -> String {
    "info".to_string()
}

fn default_interval() -> Duration {
    crate::acquisition::DEFAULT_INTERVAL
}

fn default_driver() -> String {
    "mock".to_string()
}

fn default_baud_rate() -> u32 {
    115_200
}

fn default_timeout_ms() -> u64 {
    500
}

fn default_mock_power() -> f64 {
    0.001
}

impl Default for ApplicationConfig {
    fn default() -> Self {
        Self {
            name: default_name(),
            log_level: default_log_level(),
        }
    }
}

impl Default for AcquisitionConfig {
    fn default() -> Self {
        Self {
            interval: default_interval(),
        }
    }
}

impl Default for InstrumentConfig {
    fn default() -> Self {
        Self {
            driver: default_driver(),
            port: None,
            baud_rate: default_baud_rate(),
            timeout_ms: default_timeout_ms(),
            wavelength_nm: None,
            averaging_count: None,
            mock_power_watts: default_mock_power(),
        }
    }
}

impl Settings {
    /// Load from the given TOML file merged with `PEAKWATT_` environment
    /// variables. A missing file is not an error; defaults apply.
    pub fn load_from<P: AsRef<Path>>(path: P) -> MeterResult<Self> {
        let settings = Figment::new()
            .merge(Toml::file(path.as_ref()))
            .merge(Env::prefixed("PEAKWATT_").split("__"))
            .extract()?;
        Ok(settings)
    }

    /// Semantic validation after loading.
    pub fn validate(&self) -> MeterResult<()> {
        let valid_levels = ["trace", "debug", "info", "warn", "error"];
        if !valid_levels.contains(&self.application.log_level.as_str()) {
            return Err(MeterError::Configuration(format!(
                "Invalid log_level '{}'. Must be one of: {}",
                self.application.log_level,
                valid_levels.join(", ")
            )));
        }

        let valid_drivers = ["mock", "pm100"];
        if !valid_drivers.contains(&self.instrument.driver.as_str()) {
            return Err(MeterError::Configuration(format!(
                "Invalid driver '{}'. Must be one of: {}",
                self.instrument.driver,
                valid_drivers.join(", ")
            )));
        }

        if self.instrument.driver == "pm100" && self.instrument.port.is_none() {
            return Err(MeterError::Configuration(
                "instrument.port is required for the pm100 driver".to_string(),
            ));
        }

        if self.acquisition.interval.is_zero() {
            return Err(MeterError::Configuration(
                "acquisition.interval must be greater than zero".to_string(),
            ));
        }

        if let Some(nm) = self.instrument.wavelength_nm {
            if !nm.is_finite() || nm <= 0.0 {
                return Err(MeterError::Configuration(format!(
                    "Invalid wavelength_nm {nm}"
                )));
            }
        }

        if self.instrument.averaging_count == Some(0) {
            return Err(MeterError::Configuration(
                "averaging_count must be at least 1".to_string(),
            ));
        }

        if !self.instrument.mock_power_watts.is_finite() {
            return Err(MeterError::Configuration(
                "mock_power_watts must be finite".to_string(),
            ));
        }

        Ok(())
    }
}
