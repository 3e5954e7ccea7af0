//! Periodic acquisition: read the meter, correct, derive, publish.
//!
//! One worker task owns the boxed [`PowerMeter`] exclusively and drives the
//! tick cycle; the foreground only observes immutable [`ReadingSnapshot`]
//! values and the [`LoopState`] through watch channels, and edits the shared
//! [`Controls`] block. The worker takes one consistent snapshot of the zero
//! offset, pulse settings and meter configuration per tick, at the tick
//! boundary.
//!
//! Ticks are strictly sequential: the instrument read is awaited inline, so
//! no two reads are ever concurrently in flight. Cancellation is
//! cooperative; the stop signal is raced against the inter-tick sleep, so
//! an in-flight read completes before the loop exits. Any instrument error
//! moves the loop to [`LoopState::Halted`] with the reason and stops
//! scheduling; restarting is an explicit operator action.

use chrono::{DateTime, Utc};
use serde::Serialize;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{oneshot, watch, RwLock};
use tokio::task::JoinHandle;
use tracing::{debug, error, info, warn};

use crate::calculator::{self, PeakPower, PulseSettings};
use crate::config::{DEFAULT_AVERAGING_COUNT, DEFAULT_WAVELENGTH_NM};
use crate::error::InstrumentError;
use crate::instrument::PowerMeter;
use crate::units::{PowerUnit, Quantity};
use crate::zero::ZeroOffset;

/// Default delay between acquisition ticks.
pub const DEFAULT_INTERVAL: Duration = Duration::from_millis(500);

/// Pending device configuration plus a revision counter so the worker can
/// tell at each tick boundary whether it must push changes.
#[derive(Debug, Clone)]
pub struct MeterConfig {
    wavelength_nm: Option<f64>,
    averaging_count: Option<u32>,
    revision: u64,
}

impl MeterConfig {
    /// Configuration with `None` meaning "operator left the field empty".
    pub fn new(wavelength_nm: Option<f64>, averaging_count: Option<u32>) -> Self {
        Self {
            wavelength_nm,
            averaging_count,
            revision: 0,
        }
    }

    /// Wavelength pushed to the device; 905 nm when unset.
    pub fn effective_wavelength_nm(&self) -> f64 {
        self.wavelength_nm.unwrap_or(DEFAULT_WAVELENGTH_NM)
    }

    /// Averaging count pushed to the device; 100 when unset.
    pub fn effective_averaging_count(&self) -> u32 {
        self.averaging_count.unwrap_or(DEFAULT_AVERAGING_COUNT)
    }

    /// Replace the wavelength; bumps the revision.
    pub fn set_wavelength_nm(&mut self, nm: Option<f64>) {
        self.wavelength_nm = nm;
        self.revision += 1;
    }

    /// Replace the averaging count; bumps the revision.
    pub fn set_averaging_count(&mut self, count: Option<u32>) {
        self.averaging_count = count;
        self.revision += 1;
    }

    /// Monotonic edit counter.
    pub fn revision(&self) -> u64 {
        self.revision
    }
}

/// Shared state written by the foreground (operator edits) and
/// snapshot-read by the worker at tick boundaries only.
#[derive(Debug)]
pub struct Controls {
    zero: RwLock<ZeroOffset>,
    pulse: RwLock<PulseSettings>,
    meter: RwLock<MeterConfig>,
}

impl Controls {
    /// Build the shared control block.
    pub fn new(pulse: PulseSettings, meter: MeterConfig) -> Arc<Self> {
        Arc::new(Self {
            zero: RwLock::new(ZeroOffset::unset()),
            pulse: RwLock::new(pulse),
            meter: RwLock::new(meter),
        })
    }

    /// Capture `corrected_watts` as the zero offset. Non-finite values are
    /// logged and ignored.
    pub async fn zero(&self, corrected_watts: f64) {
        if !self.zero.write().await.set_from_current(corrected_watts) {
            warn!("ignoring non-finite zero value {corrected_watts}");
        }
    }

    /// Clear the zero offset.
    pub async fn reset_zero(&self) {
        self.zero.write().await.reset();
    }

    /// Snapshot of the zero offset.
    pub async fn zero_offset(&self) -> ZeroOffset {
        *self.zero.read().await
    }

    /// Replace the pulse fields.
    pub async fn set_pulse(&self, pulse: PulseSettings) {
        *self.pulse.write().await = pulse;
    }

    /// Snapshot of the pulse fields.
    pub async fn pulse(&self) -> PulseSettings {
        self.pulse.read().await.clone()
    }

    /// Replace the wavelength; pushed to the device at the next tick.
    pub async fn set_wavelength_nm(&self, nm: Option<f64>) {
        self.meter.write().await.set_wavelength_nm(nm);
    }

    /// Replace the averaging count; pushed to the device at the next tick.
    pub async fn set_averaging_count(&self, count: Option<u32>) {
        self.meter.write().await.set_averaging_count(count);
    }

    /// Snapshot of the meter configuration.
    pub async fn meter_config(&self) -> MeterConfig {
        self.meter.read().await.clone()
    }
}

/// Acquisition loop lifecycle.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum LoopState {
    /// Not started; no schedule active.
    Idle,
    /// Schedule active.
    Running,
    /// Stop requested; the last tick may still complete.
    Stopping,
    /// Stopped after an instrument failure; restart is an explicit action.
    Halted {
        /// Human-readable failure description.
        reason: String,
    },
}

/// One acquisition cycle's published result.
#[derive(Debug, Clone, Serialize)]
pub struct ReadingSnapshot {
    /// Raw instrument sample in watts.
    pub raw_watts: f64,
    /// Sample after zero-offset correction.
    pub corrected_watts: f64,
    /// Peak power derived from the corrected sample and the pulse fields.
    pub peak: PeakPower,
    /// When the sample was taken.
    pub timestamp: DateTime<Utc>,
}

struct Worker {
    stop_tx: oneshot::Sender<()>,
    handle: JoinHandle<Box<dyn PowerMeter>>,
}

/// Drives the periodic read-correct-derive cycle on a worker task.
///
/// Dropping the loop detaches the worker; it observes the closed stop
/// channel at the next tick boundary and exits.
pub struct AcquisitionLoop {
    meter: Option<Box<dyn PowerMeter>>,
    controls: Arc<Controls>,
    interval: Duration,
    state_tx: Arc<watch::Sender<LoopState>>,
    snapshot_tx: Arc<watch::Sender<Option<ReadingSnapshot>>>,
    worker: Option<Worker>,
}

impl AcquisitionLoop {
    /// Wrap a meter (connected lazily on the first start) and the shared
    /// controls.
    pub fn new(meter: Box<dyn PowerMeter>, controls: Arc<Controls>, interval: Duration) -> Self {
        let (state_tx, _) = watch::channel(LoopState::Idle);
        let (snapshot_tx, _) = watch::channel(None);
        Self {
            meter: Some(meter),
            controls,
            interval,
            state_tx: Arc::new(state_tx),
            snapshot_tx: Arc::new(snapshot_tx),
            worker: None,
        }
    }

    /// Current lifecycle state.
    pub fn state(&self) -> LoopState {
        self.state_tx.borrow().clone()
    }

    /// Subscribe to lifecycle transitions.
    pub fn state_channel(&self) -> watch::Receiver<LoopState> {
        self.state_tx.subscribe()
    }

    /// Subscribe to published reading snapshots.
    pub fn snapshots(&self) -> watch::Receiver<Option<ReadingSnapshot>> {
        self.snapshot_tx.subscribe()
    }

    /// Latest published snapshot, if any tick has completed yet.
    pub fn latest(&self) -> Option<ReadingSnapshot> {
        self.snapshot_tx.borrow().clone()
    }

    /// Capture the latest corrected reading as the zero offset.
    ///
    /// Returns `false` when no reading has been published yet.
    pub async fn zero_from_latest(&self) -> bool {
        match self.latest() {
            Some(snapshot) => {
                self.controls.zero(snapshot.corrected_watts).await;
                true
            }
            None => false,
        }
    }

    /// Start the loop. A start while the loop is already active is a no-op
    /// returning `false`; starting from [`LoopState::Halted`] restarts with
    /// the existing session.
    pub async fn start(&mut self) -> bool {
        if matches!(self.state(), LoopState::Running | LoopState::Stopping) {
            debug!("start ignored; acquisition already active");
            return false;
        }

        // Reap a worker left over from a halt so the meter comes back.
        if let Some(worker) = self.worker.take() {
            drop(worker.stop_tx);
            match worker.handle.await {
                Ok(meter) => self.meter = Some(meter),
                Err(err) => error!("acquisition worker panicked: {err}"),
            }
        }

        let Some(meter) = self.meter.take() else {
            error!("meter unavailable; cannot start acquisition");
            return false;
        };

        let (stop_tx, stop_rx) = oneshot::channel();
        self.state_tx.send_replace(LoopState::Running);
        let handle = tokio::spawn(run_loop(
            meter,
            Arc::clone(&self.controls),
            self.interval,
            Arc::clone(&self.state_tx),
            Arc::clone(&self.snapshot_tx),
            stop_rx,
        ));
        self.worker = Some(Worker { stop_tx, handle });
        true
    }

    /// Request a cooperative stop and wait for the worker to exit. An
    /// in-flight read completes; no further tick is scheduled.
    pub async fn stop(&mut self) {
        if !matches!(self.state(), LoopState::Running) {
            return;
        }
        self.state_tx.send_replace(LoopState::Stopping);

        if let Some(worker) = self.worker.take() {
            let _ = worker.stop_tx.send(());
            match worker.handle.await {
                Ok(meter) => self.meter = Some(meter),
                Err(err) => error!("acquisition worker panicked: {err}"),
            }
        }

        // The worker reports Halted itself; only a cooperative stop lands
        // on Idle.
        if matches!(self.state(), LoopState::Stopping) {
            self.state_tx.send_replace(LoopState::Idle);
        }
    }
}

async fn run_loop(
    mut meter: Box<dyn PowerMeter>,
    controls: Arc<Controls>,
    interval: Duration,
    state_tx: Arc<watch::Sender<LoopState>>,
    snapshot_tx: Arc<watch::Sender<Option<ReadingSnapshot>>>,
    mut stop_rx: oneshot::Receiver<()>,
) -> Box<dyn PowerMeter> {
    if !meter.is_connected() {
        info!("establishing meter session");
        if let Err(err) = establish(meter.as_mut()).await {
            error!("failed to establish meter session: {err}");
            state_tx.send_replace(LoopState::Halted {
                reason: err.to_string(),
            });
            return meter;
        }
    }

    let mut applied_revision = None;
    loop {
        match tick(meter.as_mut(), &controls, &mut applied_revision).await {
            Ok(snapshot) => {
                snapshot_tx.send_replace(Some(snapshot));
            }
            Err(err) => {
                error!("acquisition tick failed: {err}");
                state_tx.send_replace(LoopState::Halted {
                    reason: err.to_string(),
                });
                return meter;
            }
        }

        tokio::select! {
            _ = &mut stop_rx => break,
            _ = tokio::time::sleep(interval) => {}
        }
    }

    meter
}

async fn establish(meter: &mut dyn PowerMeter) -> Result<(), InstrumentError> {
    meter.connect().await?;
    meter.configure_max_range().await?;
    Ok(())
}

async fn tick(
    meter: &mut dyn PowerMeter,
    controls: &Controls,
    applied_revision: &mut Option<u64>,
) -> Result<ReadingSnapshot, InstrumentError> {
    // Configuration edits land before the read.
    let config = controls.meter_config().await;
    if *applied_revision != Some(config.revision()) {
        meter.set_wavelength(config.effective_wavelength_nm()).await?;
        meter
            .set_averaging_count(config.effective_averaging_count())
            .await?;
        *applied_revision = Some(config.revision());
        info!(
            wavelength_nm = config.effective_wavelength_nm(),
            averaging_count = config.effective_averaging_count(),
            "meter configuration applied"
        );
    }

    let raw_watts = meter.read_power().await?;
    let corrected_watts = controls.zero_offset().await.apply(raw_watts);
    let pulse = controls.pulse().await;
    let peak =
        calculator::compute_with_power(Quantity::new(corrected_watts, PowerUnit::Watts), &pulse);

    Ok(ReadingSnapshot {
        raw_watts,
        corrected_watts,
        peak,
        timestamp: Utc::now(),
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn meter_config_defaults_apply_when_fields_are_empty() {
        let config = MeterConfig::new(None, None);
        assert_eq!(config.effective_wavelength_nm(), 905.0);
        assert_eq!(config.effective_averaging_count(), 100);
    }

    #[test]
    fn meter_config_edits_bump_the_revision() {
        let mut config = MeterConfig::new(Some(1064.0), Some(10));
        assert_eq!(config.revision(), 0);
        config.set_wavelength_nm(Some(532.0));
        assert_eq!(config.revision(), 1);
        config.set_averaging_count(None);
        assert_eq!(config.revision(), 2);
        assert_eq!(config.effective_averaging_count(), 100);
    }

    #[tokio::test]
    async fn non_finite_zero_values_are_ignored() {
        let controls = Controls::new(PulseSettings::default(), MeterConfig::new(None, None));
        controls.zero(f64::NAN).await;
        assert_eq!(controls.zero_offset().await.get(), None);
        controls.zero(0.5).await;
        assert_eq!(controls.zero_offset().await.get(), Some(0.5));
    }
}
