//! Mock power meter for tests and hardware-free runs.
//!
//! Generates readings around a configurable baseline with ±fraction noise
//! and records everything pushed to it, so tests can assert on the session
//! lifecycle without a device attached. Fault injection covers the failure
//! paths the acquisition loop must handle: a connect that never succeeds, a
//! single failing read, and a read delay for cancellation/overlap tests.

use super::PowerMeter;
use crate::error::InstrumentError;
use async_trait::async_trait;
use rand::Rng;
use std::sync::atomic::{AtomicBool, AtomicU32, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

/// Introspection handle shared between the mock and its test.
#[derive(Debug, Default)]
pub struct MockState {
    /// Last wavelength pushed, in nm.
    pub wavelength_nm: Mutex<Option<f64>>,
    /// Last averaging count pushed.
    pub averaging_count: Mutex<Option<u32>>,
    /// Whether the sensing range was configured.
    pub range_configured: AtomicBool,
    /// Number of connect attempts.
    pub connects: AtomicU32,
    /// Number of read attempts.
    pub reads: AtomicU32,
    /// Reads currently in flight.
    pub reads_in_flight: AtomicU32,
    /// High-water mark of concurrent reads.
    pub max_reads_in_flight: AtomicU32,
}

/// Simulated power meter.
pub struct MockPowerMeter {
    base_power_watts: f64,
    noise_fraction: f64,
    read_delay: Duration,
    fail_connect: bool,
    fail_on_read: Option<u32>,
    connected: bool,
    state: Arc<MockState>,
}

impl MockPowerMeter {
    /// A meter reading `base_power_watts` with the default ±5 % noise.
    pub fn new(base_power_watts: f64) -> Self {
        Self {
            base_power_watts,
            noise_fraction: 0.05,
            read_delay: Duration::ZERO,
            fail_connect: false,
            fail_on_read: None,
            connected: false,
            state: Arc::new(MockState::default()),
        }
    }

    /// Override the noise fraction; zero makes readings deterministic.
    pub fn with_noise(mut self, fraction: f64) -> Self {
        self.noise_fraction = fraction;
        self
    }

    /// Delay every read, simulating instrument integration time.
    pub fn with_read_delay(mut self, delay: Duration) -> Self {
        self.read_delay = delay;
        self
    }

    /// Make every connect attempt fail.
    pub fn failing_connect(mut self) -> Self {
        self.fail_connect = true;
        self
    }

    /// Fail exactly the `n`-th read (1-based); later reads succeed again.
    pub fn failing_read_at(mut self, n: u32) -> Self {
        self.fail_on_read = Some(n);
        self
    }

    /// Handle for asserting on what reached the mock.
    pub fn state(&self) -> Arc<MockState> {
        Arc::clone(&self.state)
    }
}

#[async_trait]
impl PowerMeter for MockPowerMeter {
    async fn connect(&mut self) -> Result<(), InstrumentError> {
        self.state.connects.fetch_add(1, Ordering::SeqCst);
        if self.fail_connect {
            return Err(InstrumentError::Connection(
                "mock device unreachable".into(),
            ));
        }
        self.connected = true;
        Ok(())
    }

    async fn configure_max_range(&mut self) -> Result<(), InstrumentError> {
        if !self.connected {
            return Err(InstrumentError::Configuration("no session".into()));
        }
        self.state.range_configured.store(true, Ordering::SeqCst);
        Ok(())
    }

    async fn read_power(&mut self) -> Result<f64, InstrumentError> {
        if !self.connected {
            return Err(InstrumentError::Read("no session".into()));
        }

        let in_flight = self.state.reads_in_flight.fetch_add(1, Ordering::SeqCst) + 1;
        self.state
            .max_reads_in_flight
            .fetch_max(in_flight, Ordering::SeqCst);

        if !self.read_delay.is_zero() {
            tokio::time::sleep(self.read_delay).await;
        }

        self.state.reads_in_flight.fetch_sub(1, Ordering::SeqCst);
        let read_number = self.state.reads.fetch_add(1, Ordering::SeqCst) + 1;

        if self.fail_on_read == Some(read_number) {
            return Err(InstrumentError::Read("mock read fault".into()));
        }

        let noise = if self.noise_fraction > 0.0 {
            rand::thread_rng().gen_range(-self.noise_fraction..self.noise_fraction)
        } else {
            0.0
        };
        Ok(self.base_power_watts * (1.0 + noise))
    }

    async fn set_wavelength(&mut self, nm: f64) -> Result<(), InstrumentError> {
        if !self.connected {
            return Err(InstrumentError::Configuration("no session".into()));
        }
        if let Ok(mut guard) = self.state.wavelength_nm.lock() {
            *guard = Some(nm);
        }
        Ok(())
    }

    async fn set_averaging_count(&mut self, count: u32) -> Result<(), InstrumentError> {
        if !self.connected {
            return Err(InstrumentError::Configuration("no session".into()));
        }
        if count == 0 {
            return Err(InstrumentError::Configuration(
                "averaging count must be at least 1".into(),
            ));
        }
        if let Ok(mut guard) = self.state.averaging_count.lock() {
            *guard = Some(count);
        }
        Ok(())
    }

    fn is_connected(&self) -> bool {
        self.connected
    }
}
