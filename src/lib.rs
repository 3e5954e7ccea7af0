//! # peakwatt
//!
//! Measurement-and-derivation engine for Thorlabs PM100-series optical power
//! meter consoles. The engine polls the meter on a fixed cadence, applies an
//! operator-captured zero offset to each raw reading, and derives the peak
//! power of a pulsed signal from the averaged continuous-wave reading, the
//! pulse repetition frequency and the pulse width (duty-cycle inversion),
//! optionally compensated for attenuation.
//!
//! ## Crate Structure
//!
//! - **`units`**: Closed unit enumerations for power, frequency and time,
//!   with the fixed multiplier table converting magnitudes to SI base units.
//! - **`zero`**: The optional zero-offset baseline subtracted from raw
//!   readings, captured and cleared by explicit operator actions.
//! - **`calculator`**: Pure peak-power derivation producing a tagged
//!   [`calculator::PeakPower`] result; no presentation strings inside.
//! - **`readout`**: The presentation boundary, turning results into the
//!   fixed-format display strings.
//! - **`instrument`**: The [`instrument::PowerMeter`] session trait, the
//!   PM100 SCPI driver and a mock meter for hardware-free operation.
//! - **`acquisition`**: The cancellable periodic acquisition loop publishing
//!   immutable reading snapshots and an explicit lifecycle state.
//! - **`config`**: Figment-backed settings (TOML file plus `PEAKWATT_`
//!   environment overrides) with validation.
//! - **`error`**: Centralized error types via `thiserror`.
//! - **`logging`**: Tracing initialization driven by the settings.

pub mod acquisition;
pub mod calculator;
pub mod config;
pub mod error;
pub mod instrument;
pub mod logging;
pub mod readout;
pub mod units;
pub mod zero;
