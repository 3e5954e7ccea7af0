//! Thorlabs PM100-series console driver (SCPI over a serial transport).
//!
//! The console speaks the SCPI `SENSe` subsystem: `READ?` returns the
//! averaged power in watts, `SENS:CORR:WAV` sets the wavelength correction,
//! `SENS:AVER:COUN` the averaging count, and the sensing range upper bound
//! is pinned to the device's reported maximum at connect time. The
//! transport is abstracted behind a small trait so unit tests operate
//! entirely in-process; the real serial backend is gated behind the
//! `instrument_serial` feature.

use super::PowerMeter;
use crate::error::{InstrumentError, MeterResult};
use async_trait::async_trait;
use log::{debug, info};
use std::sync::Arc;
use std::time::Duration;

type TransportHandle = Arc<dyn ScpiTransport>;

/// Transport abstraction over SCPI communication so tests can substitute
/// an in-process mock for the serial backend.
#[async_trait]
trait ScpiTransport: Send + Sync {
    async fn connect(&self) -> anyhow::Result<()>;
    async fn disconnect(&self) -> anyhow::Result<()>;
    async fn query(&self, command: &str) -> anyhow::Result<String>;
    async fn send(&self, command: &str) -> anyhow::Result<()>;
}

/// Serial parameters for the console.
#[derive(Clone, Debug)]
pub struct Pm100Config {
    /// Serial port name, e.g. `/dev/ttyUSB0`.
    pub port: String,
    /// Baud rate; the consoles default to 115200.
    pub baud_rate: u32,
    /// Per-command timeout.
    pub timeout: Duration,
}

/// Driver for a PM100-series console.
pub struct ThorlabsPm100 {
    transport: TransportHandle,
    connected: bool,
}

impl ThorlabsPm100 {
    /// Open a driver for the console described by `config`. Fails with
    /// [`crate::error::MeterError::SerialFeatureDisabled`] when the serial
    /// backend is not compiled in; no I/O happens until
    /// [`PowerMeter::connect`].
    pub fn open(config: &Pm100Config) -> MeterResult<Self> {
        let transport = build_transport(config)?;
        Ok(Self::with_transport(transport))
    }

    fn with_transport(transport: TransportHandle) -> Self {
        Self {
            transport,
            connected: false,
        }
    }
}

#[async_trait]
impl PowerMeter for ThorlabsPm100 {
    async fn connect(&mut self) -> Result<(), InstrumentError> {
        self.transport.connect().await.map_err(connection_error)?;
        let idn = self
            .transport
            .query("*IDN?")
            .await
            .map_err(connection_error)?;
        info!("power meter identified as {}", idn.trim());
        self.connected = true;
        Ok(())
    }

    async fn configure_max_range(&mut self) -> Result<(), InstrumentError> {
        let reply = self
            .transport
            .query("SENS:POW:RANG:UPP? MAX")
            .await
            .map_err(configuration_error)?;
        let max: f64 = reply.trim().parse().map_err(|err| {
            InstrumentError::Configuration(format!(
                "unparseable maximum range '{}': {}",
                reply.trim(),
                err
            ))
        })?;
        self.transport
            .send(&format!("SENS:POW:RANG:UPP {max:.6e}"))
            .await
            .map_err(configuration_error)?;
        debug!("sensing range upper bound set to {max:.6e} W");
        Ok(())
    }

    async fn read_power(&mut self) -> Result<f64, InstrumentError> {
        let reply = self.transport.query("READ?").await.map_err(read_error)?;
        reply.trim().parse().map_err(|err| {
            InstrumentError::Read(format!("unparseable power '{}': {}", reply.trim(), err))
        })
    }

    async fn set_wavelength(&mut self, nm: f64) -> Result<(), InstrumentError> {
        // Span covered by the PM100 sensor heads.
        if !(185.0..=2500.0).contains(&nm) {
            return Err(InstrumentError::Configuration(format!(
                "wavelength {nm} nm outside supported span (185-2500)"
            )));
        }
        self.transport
            .send(&format!("SENS:CORR:WAV {nm:.1}"))
            .await
            .map_err(configuration_error)?;
        debug!("wavelength correction set to {nm:.1} nm");
        Ok(())
    }

    async fn set_averaging_count(&mut self, count: u32) -> Result<(), InstrumentError> {
        if count == 0 {
            return Err(InstrumentError::Configuration(
                "averaging count must be at least 1".into(),
            ));
        }
        self.transport
            .send(&format!("SENS:AVER:COUN {count}"))
            .await
            .map_err(configuration_error)?;
        debug!("averaging count set to {count}");
        Ok(())
    }

    fn is_connected(&self) -> bool {
        self.connected
    }
}

fn connection_error(err: anyhow::Error) -> InstrumentError {
    InstrumentError::Connection(err.to_string())
}

fn configuration_error(err: anyhow::Error) -> InstrumentError {
    InstrumentError::Configuration(err.to_string())
}

fn read_error(err: anyhow::Error) -> InstrumentError {
    InstrumentError::Read(err.to_string())
}

#[cfg(feature = "instrument_serial")]
fn build_transport(config: &Pm100Config) -> MeterResult<TransportHandle> {
    Ok(Arc::new(SerialScpiTransport::new(
        config.port.clone(),
        config.baud_rate,
        config.timeout,
    )))
}

#[cfg(not(feature = "instrument_serial"))]
fn build_transport(_config: &Pm100Config) -> MeterResult<TransportHandle> {
    Err(crate::error::MeterError::SerialFeatureDisabled)
}

#[cfg(feature = "instrument_serial")]
struct SerialScpiTransport {
    port_name: String,
    baud_rate: u32,
    timeout: Duration,
    port: Arc<std::sync::Mutex<Option<Box<dyn serialport::SerialPort>>>>,
}

#[cfg(feature = "instrument_serial")]
impl SerialScpiTransport {
    fn new(port_name: String, baud_rate: u32, timeout: Duration) -> Self {
        Self {
            port_name,
            baud_rate,
            timeout,
            port: Arc::new(std::sync::Mutex::new(None)),
        }
    }
}

#[cfg(feature = "instrument_serial")]
#[async_trait]
impl ScpiTransport for SerialScpiTransport {
    async fn connect(&self) -> anyhow::Result<()> {
        use anyhow::{anyhow, Context};

        let port = serialport::new(&self.port_name, self.baud_rate)
            .timeout(self.timeout)
            .open()
            .with_context(|| {
                format!(
                    "failed to open serial port '{}' @ {} baud",
                    self.port_name, self.baud_rate
                )
            })?;
        *self
            .port
            .lock()
            .map_err(|_| anyhow!("serial port mutex poisoned"))? = Some(port);
        Ok(())
    }

    async fn disconnect(&self) -> anyhow::Result<()> {
        use anyhow::anyhow;

        self.port
            .lock()
            .map_err(|_| anyhow!("serial port mutex poisoned"))?
            .take();
        Ok(())
    }

    async fn query(&self, command: &str) -> anyhow::Result<String> {
        use anyhow::anyhow;

        let command = format!("{command}\n");
        let port = Arc::clone(&self.port);
        let timeout = self.timeout;

        tokio::task::spawn_blocking(move || -> anyhow::Result<String> {
            use std::io::{Read, Write};

            let mut guard = port
                .lock()
                .map_err(|_| anyhow!("serial port mutex poisoned"))?;
            let port = guard
                .as_mut()
                .ok_or_else(|| anyhow!("serial port not connected"))?;

            port.write_all(command.as_bytes())?;
            port.flush()?;
            debug!("sent SCPI command: {}", command.trim());

            let start = std::time::Instant::now();
            let mut response = String::new();
            let mut byte = [0u8; 1];
            loop {
                if start.elapsed() > timeout {
                    return Err(anyhow!("serial read timeout after {:?}", timeout));
                }

                match port.read(&mut byte) {
                    Ok(0) => continue,
                    Ok(_) => {
                        let ch = byte[0] as char;
                        if ch == '\n' {
                            return Ok(response);
                        }
                        if ch != '\r' {
                            response.push(ch);
                        }
                    }
                    Err(err) if err.kind() == std::io::ErrorKind::TimedOut => continue,
                    Err(err) => return Err(err.into()),
                }
            }
        })
        .await?
    }

    async fn send(&self, command: &str) -> anyhow::Result<()> {
        use anyhow::anyhow;

        let command = format!("{command}\n");
        let port = Arc::clone(&self.port);

        tokio::task::spawn_blocking(move || -> anyhow::Result<()> {
            use std::io::Write;

            let mut guard = port
                .lock()
                .map_err(|_| anyhow!("serial port mutex poisoned"))?;
            let port = guard
                .as_mut()
                .ok_or_else(|| anyhow!("serial port not connected"))?;

            port.write_all(command.as_bytes())?;
            port.flush()?;
            debug!("sent SCPI command: {}", command.trim());
            Ok(())
        })
        .await?
    }
}
