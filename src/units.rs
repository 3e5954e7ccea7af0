//! Unit tags and SI-base conversion for power, frequency and time.
//!
//! Three closed unit families exist: power (base watts), frequency (base
//! hertz) and time (base seconds). A tag belongs to exactly one family, so
//! cross-family conversion is unrepresentable; converting a magnitude to its
//! family base unit is a single multiply against a fixed table:
//!
//! | family    | units                | multipliers            |
//! |-----------|----------------------|------------------------|
//! | power     | W, mW, µW            | 1, 1e-3, 1e-6          |
//! | frequency | Hz, kHz, MHz, GHz    | 1, 1e3, 1e6, 1e9       |
//! | time      | s, ms, µs, ns        | 1, 1e-3, 1e-6, 1e-9    |
//!
//! Unit labels parsed from text (the CLI surface) fail with
//! [`MeterError::InvalidUnit`] outside the enumeration; the ASCII spellings
//! `uW`/`us` are accepted alongside `µW`/`µs`.

use crate::error::MeterError;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// A unit tag convertible to its family's SI base unit.
pub trait Unit: Copy + fmt::Debug {
    /// Multiplier taking a magnitude in this unit to the family base unit.
    fn multiplier(self) -> f64;

    /// Display label, as offered to the operator.
    fn label(self) -> &'static str;
}

/// Power units, base watts. Defaults to mW, the console's usual display.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum PowerUnit {
    /// Watts.
    #[serde(rename = "W")]
    Watts,
    /// Milliwatts.
    #[default]
    #[serde(rename = "mW")]
    Milliwatts,
    /// Microwatts.
    #[serde(rename = "µW", alias = "uW")]
    Microwatts,
}

impl Unit for PowerUnit {
    fn multiplier(self) -> f64 {
        match self {
            PowerUnit::Watts => 1.0,
            PowerUnit::Milliwatts => 1e-3,
            PowerUnit::Microwatts => 1e-6,
        }
    }

    fn label(self) -> &'static str {
        match self {
            PowerUnit::Watts => "W",
            PowerUnit::Milliwatts => "mW",
            PowerUnit::Microwatts => "µW",
        }
    }
}

/// Frequency units, base hertz.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum FrequencyUnit {
    /// Hertz.
    #[default]
    #[serde(rename = "Hz")]
    Hertz,
    /// Kilohertz.
    #[serde(rename = "kHz")]
    Kilohertz,
    /// Megahertz.
    #[serde(rename = "MHz")]
    Megahertz,
    /// Gigahertz.
    #[serde(rename = "GHz")]
    Gigahertz,
}

impl Unit for FrequencyUnit {
    fn multiplier(self) -> f64 {
        match self {
            FrequencyUnit::Hertz => 1.0,
            FrequencyUnit::Kilohertz => 1e3,
            FrequencyUnit::Megahertz => 1e6,
            FrequencyUnit::Gigahertz => 1e9,
        }
    }

    fn label(self) -> &'static str {
        match self {
            FrequencyUnit::Hertz => "Hz",
            FrequencyUnit::Kilohertz => "kHz",
            FrequencyUnit::Megahertz => "MHz",
            FrequencyUnit::Gigahertz => "GHz",
        }
    }
}

/// Time units, base seconds. Defaults to ns, the usual pulse-width scale.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum TimeUnit {
    /// Seconds.
    #[serde(rename = "s")]
    Seconds,
    /// Milliseconds.
    #[serde(rename = "ms")]
    Milliseconds,
    /// Microseconds.
    #[serde(rename = "µs", alias = "us")]
    Microseconds,
    /// Nanoseconds.
    #[default]
    #[serde(rename = "ns")]
    Nanoseconds,
}

impl Unit for TimeUnit {
    fn multiplier(self) -> f64 {
        match self {
            TimeUnit::Seconds => 1.0,
            TimeUnit::Milliseconds => 1e-3,
            TimeUnit::Microseconds => 1e-6,
            TimeUnit::Nanoseconds => 1e-9,
        }
    }

    fn label(self) -> &'static str {
        match self {
            TimeUnit::Seconds => "s",
            TimeUnit::Milliseconds => "ms",
            TimeUnit::Microseconds => "µs",
            TimeUnit::Nanoseconds => "ns",
        }
    }
}

impl FromStr for PowerUnit {
    type Err = MeterError;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        match value.to_lowercase().as_str() {
            "w" => Ok(PowerUnit::Watts),
            "mw" => Ok(PowerUnit::Milliwatts),
            "µw" | "uw" => Ok(PowerUnit::Microwatts),
            _ => Err(MeterError::InvalidUnit(value.to_string())),
        }
    }
}

impl FromStr for FrequencyUnit {
    type Err = MeterError;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        match value.to_lowercase().as_str() {
            "hz" => Ok(FrequencyUnit::Hertz),
            "khz" => Ok(FrequencyUnit::Kilohertz),
            "mhz" => Ok(FrequencyUnit::Megahertz),
            "ghz" => Ok(FrequencyUnit::Gigahertz),
            _ => Err(MeterError::InvalidUnit(value.to_string())),
        }
    }
}

impl FromStr for TimeUnit {
    type Err = MeterError;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        match value.to_lowercase().as_str() {
            "s" => Ok(TimeUnit::Seconds),
            "ms" => Ok(TimeUnit::Milliseconds),
            "µs" | "us" => Ok(TimeUnit::Microseconds),
            "ns" => Ok(TimeUnit::Nanoseconds),
            _ => Err(MeterError::InvalidUnit(value.to_string())),
        }
    }
}

impl fmt::Display for PowerUnit {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.label())
    }
}

impl fmt::Display for FrequencyUnit {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.label())
    }
}

impl fmt::Display for TimeUnit {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.label())
    }
}

/// A numeric magnitude paired with its unit tag.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Quantity<U: Unit> {
    /// Magnitude as entered or measured.
    pub value: f64,
    /// The unit the magnitude is expressed in.
    pub unit: U,
}

impl<U: Unit> Quantity<U> {
    /// Pair a magnitude with its unit.
    pub fn new(value: f64, unit: U) -> Self {
        Self { value, unit }
    }

    /// Convert to the family's SI base unit.
    pub fn to_base(self) -> f64 {
        to_base(self.value, self.unit)
    }
}

/// Convert `value` expressed in `unit` to the family's SI base unit.
pub fn to_base<U: Unit>(value: f64, unit: U) -> f64 {
    value * unit.multiplier()
}
