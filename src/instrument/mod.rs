//! Instrument boundary: the power meter session trait and its drivers.
//!
//! All readings cross this boundary in watts; drivers convert device-native
//! units. The acquisition loop owns the boxed meter exclusively while it is
//! running, so implementations take `&mut self` and need only be `Send`.

pub mod mock;
pub mod pm100;

use crate::error::InstrumentError;
use async_trait::async_trait;

/// Session with an optical power meter console.
#[async_trait]
pub trait PowerMeter: Send {
    /// Establish the session. Fails with [`InstrumentError::Connection`]
    /// when the device is unreachable or the transport backend is absent.
    async fn connect(&mut self) -> Result<(), InstrumentError>;

    /// Set the sensing range upper bound to the device's reported maximum.
    async fn configure_max_range(&mut self) -> Result<(), InstrumentError>;

    /// Read the current averaged power in watts.
    async fn read_power(&mut self) -> Result<f64, InstrumentError>;

    /// Push the wavelength correction in nanometers.
    async fn set_wavelength(&mut self, nm: f64) -> Result<(), InstrumentError>;

    /// Push the averaging sample count.
    async fn set_averaging_count(&mut self, count: u32) -> Result<(), InstrumentError>;

    /// Whether a session is currently established.
    fn is_connected(&self) -> bool;
}
