//! Custom error types for the application.
//!
//! `MeterError` consolidates the error sources the application layer deals
//! with: configuration loading and validation, I/O, unit parsing and the
//! instrument boundary. Instrument drivers report through the narrower
//! [`InstrumentError`], which distinguishes the three failure classes the
//! acquisition loop cares about (connection, configuration, read).
//!
//! User-input conditions on the computation path (missing or unparseable
//! fields) are deliberately *not* errors; they are variants of
//! [`crate::calculator::PeakPower`] so the computation layer stays free of
//! presentation concerns.

use thiserror::Error;

/// Convenience alias for results using the application error type.
pub type MeterResult<T> = std::result::Result<T, MeterError>;

/// Errors originating from the instrument boundary.
#[derive(Error, Debug)]
pub enum InstrumentError {
    /// The device is unreachable or the transport backend is absent.
    #[error("connection failed: {0}")]
    Connection(String),

    /// The device rejected a configuration command.
    #[error("configuration rejected: {0}")]
    Configuration(String),

    /// A power read timed out or the device faulted.
    #[error("read failed: {0}")]
    Read(String),
}

/// Top-level application error.
#[derive(Error, Debug)]
pub enum MeterError {
    #[error("Configuration error: {0}")]
    Config(#[from] figment::Error),

    #[error("Configuration validation error: {0}")]
    Configuration(String),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Instrument error: {0}")]
    Instrument(#[from] InstrumentError),

    #[error("Unknown unit '{0}'")]
    InvalidUnit(String),

    #[error("Serial support not enabled. Rebuild with --features instrument_serial")]
    SerialFeatureDisabled,
}
