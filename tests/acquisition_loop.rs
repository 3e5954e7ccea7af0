//! Integration tests driving the acquisition loop against the mock meter.

use std::sync::atomic::Ordering;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::watch;
use tokio::time::timeout;

use peakwatt::acquisition::{AcquisitionLoop, Controls, LoopState, MeterConfig, ReadingSnapshot};
use peakwatt::calculator::{PeakPower, PulseSettings};
use peakwatt::instrument::mock::{MockPowerMeter, MockState};
use peakwatt::readout;
use peakwatt::units::{FrequencyUnit, TimeUnit};

const TICK: Duration = Duration::from_millis(20);
const WAIT: Duration = Duration::from_secs(2);

fn pulse_1khz_100ns() -> PulseSettings {
    PulseSettings {
        frequency: "1".into(),
        frequency_unit: FrequencyUnit::Kilohertz,
        pulse_width: "100".into(),
        pulse_width_unit: TimeUnit::Nanoseconds,
        attenuation_percent: String::new(),
    }
}

fn looped(
    meter: MockPowerMeter,
    pulse: PulseSettings,
    config: MeterConfig,
) -> (AcquisitionLoop, Arc<Controls>, Arc<MockState>) {
    let state = meter.state();
    let controls = Controls::new(pulse, config);
    let acquisition = AcquisitionLoop::new(Box::new(meter), Arc::clone(&controls), TICK);
    (acquisition, controls, state)
}

async fn next_snapshot(rx: &mut watch::Receiver<Option<ReadingSnapshot>>) -> ReadingSnapshot {
    timeout(WAIT, async {
        loop {
            rx.changed().await.expect("snapshot channel closed");
            if let Some(snapshot) = rx.borrow_and_update().clone() {
                return snapshot;
            }
        }
    })
    .await
    .expect("timed out waiting for a snapshot")
}

async fn wait_for_snapshot<F>(
    rx: &mut watch::Receiver<Option<ReadingSnapshot>>,
    pred: F,
) -> ReadingSnapshot
where
    F: Fn(&ReadingSnapshot) -> bool,
{
    timeout(WAIT, async {
        loop {
            rx.changed().await.expect("snapshot channel closed");
            if let Some(snapshot) = rx.borrow_and_update().clone() {
                if pred(&snapshot) {
                    return snapshot;
                }
            }
        }
    })
    .await
    .expect("timed out waiting for a matching snapshot")
}

async fn wait_for_halt(rx: &mut watch::Receiver<LoopState>) -> String {
    timeout(WAIT, async {
        loop {
            if let LoopState::Halted { reason } = rx.borrow_and_update().clone() {
                return reason;
            }
            rx.changed().await.expect("state channel closed");
        }
    })
    .await
    .expect("timed out waiting for the loop to halt")
}

#[tokio::test]
async fn lazy_connect_and_config_push_happen_on_first_start() {
    let meter = MockPowerMeter::new(0.1).with_noise(0.0);
    let (mut acq, _controls, state) = looped(meter, pulse_1khz_100ns(), MeterConfig::new(None, None));

    assert_eq!(acq.state(), LoopState::Idle);
    assert!(acq.latest().is_none());
    assert_eq!(state.connects.load(Ordering::SeqCst), 0);

    assert!(acq.start().await);
    let mut snapshots = acq.snapshots();
    next_snapshot(&mut snapshots).await;

    assert_eq!(state.connects.load(Ordering::SeqCst), 1);
    assert!(state.range_configured.load(Ordering::SeqCst));
    assert_eq!(*state.wavelength_nm.lock().unwrap(), Some(905.0));
    assert_eq!(*state.averaging_count.lock().unwrap(), Some(100));

    acq.stop().await;
    assert_eq!(acq.state(), LoopState::Idle);
}

#[tokio::test]
async fn start_while_running_is_a_no_op() {
    let meter = MockPowerMeter::new(0.1).with_noise(0.0);
    let (mut acq, _controls, state) = looped(meter, pulse_1khz_100ns(), MeterConfig::new(None, None));

    assert!(acq.start().await);
    assert!(!acq.start().await);

    let mut snapshots = acq.snapshots();
    next_snapshot(&mut snapshots).await;
    assert_eq!(state.connects.load(Ordering::SeqCst), 1);

    acq.stop().await;
}

#[tokio::test]
async fn zero_offset_corrects_subsequent_readings() {
    let meter = MockPowerMeter::new(7.0).with_noise(0.0);
    let (mut acq, controls, _state) = looped(meter, pulse_1khz_100ns(), MeterConfig::new(None, None));

    acq.start().await;
    let mut snapshots = acq.snapshots();

    let first = next_snapshot(&mut snapshots).await;
    assert_eq!(first.raw_watts, 7.0);
    assert_eq!(first.corrected_watts, 7.0);

    controls.zero(5.0).await;
    let corrected = wait_for_snapshot(&mut snapshots, |s| s.corrected_watts == 2.0).await;
    assert_eq!(corrected.raw_watts, 7.0);
    assert_eq!(
        readout::format_average_power(corrected.corrected_watts),
        "2.0000000000"
    );

    controls.reset_zero().await;
    wait_for_snapshot(&mut snapshots, |s| s.corrected_watts == 7.0).await;

    acq.stop().await;
}

#[tokio::test]
async fn zero_from_latest_captures_the_current_reading() {
    let meter = MockPowerMeter::new(7.0).with_noise(0.0);
    let (mut acq, _controls, _state) = looped(meter, pulse_1khz_100ns(), MeterConfig::new(None, None));

    assert!(!acq.zero_from_latest().await);

    acq.start().await;
    let mut snapshots = acq.snapshots();
    next_snapshot(&mut snapshots).await;

    assert!(acq.zero_from_latest().await);
    wait_for_snapshot(&mut snapshots, |s| s.corrected_watts == 0.0).await;

    acq.stop().await;
}

#[tokio::test]
async fn auto_computation_follows_the_manual_contract() {
    let meter = MockPowerMeter::new(0.1).with_noise(0.0);
    let (mut acq, controls, _state) = looped(meter, pulse_1khz_100ns(), MeterConfig::new(None, None));

    acq.start().await;
    let mut snapshots = acq.snapshots();

    let snapshot = next_snapshot(&mut snapshots).await;
    assert_eq!(
        readout::format_peak_power(&snapshot.peak),
        "Peak Power: 1000.00 W"
    );

    let mut attenuated = pulse_1khz_100ns();
    attenuated.attenuation_percent = "50".into();
    controls.set_pulse(attenuated).await;
    wait_for_snapshot(&mut snapshots, |s| {
        readout::format_peak_power(&s.peak) == "Peak Power: 2000.00 W"
    })
    .await;

    let mut incomplete = pulse_1khz_100ns();
    incomplete.frequency = String::new();
    controls.set_pulse(incomplete).await;
    let snapshot = wait_for_snapshot(&mut snapshots, |s| s.peak == PeakPower::Incomplete).await;
    assert_eq!(
        readout::format_peak_power(&snapshot.peak),
        "Please fill in all fields"
    );

    acq.stop().await;
}

#[tokio::test]
async fn read_failure_halts_the_loop_until_an_explicit_restart() {
    let meter = MockPowerMeter::new(0.1).with_noise(0.0).failing_read_at(3);
    let (mut acq, _controls, state) = looped(meter, pulse_1khz_100ns(), MeterConfig::new(None, None));

    acq.start().await;
    let mut states = acq.state_channel();
    let reason = wait_for_halt(&mut states).await;
    assert!(reason.contains("mock read fault"), "reason: {reason}");
    assert_eq!(state.reads.load(Ordering::SeqCst), 3);

    // Halted means halted: no further reads get scheduled.
    tokio::time::sleep(TICK * 5).await;
    assert_eq!(state.reads.load(Ordering::SeqCst), 3);

    // Restart reuses the established session.
    assert!(acq.start().await);
    assert_eq!(acq.state(), LoopState::Running);
    let mut snapshots = acq.snapshots();
    next_snapshot(&mut snapshots).await;
    assert_eq!(state.connects.load(Ordering::SeqCst), 1);

    acq.stop().await;
    assert_eq!(acq.state(), LoopState::Idle);
}

#[tokio::test]
async fn connect_failure_halts_before_any_read() {
    let meter = MockPowerMeter::new(0.1).failing_connect();
    let (mut acq, _controls, state) = looped(meter, pulse_1khz_100ns(), MeterConfig::new(None, None));

    acq.start().await;
    let mut states = acq.state_channel();
    let reason = wait_for_halt(&mut states).await;
    assert!(reason.contains("unreachable"), "reason: {reason}");
    assert_eq!(state.reads.load(Ordering::SeqCst), 0);
    assert!(acq.latest().is_none());
}

#[tokio::test]
async fn stop_is_cooperative_and_nothing_reschedules_afterwards() {
    let meter = MockPowerMeter::new(0.1)
        .with_noise(0.0)
        .with_read_delay(Duration::from_millis(60));
    let (mut acq, _controls, state) =
        looped(meter, pulse_1khz_100ns(), MeterConfig::new(None, None));

    acq.start().await;
    let mut snapshots = acq.snapshots();
    next_snapshot(&mut snapshots).await;

    // Land inside the next tick's read before requesting the stop.
    tokio::time::sleep(TICK + Duration::from_millis(10)).await;
    acq.stop().await;
    assert_eq!(acq.state(), LoopState::Idle);

    let reads_after_stop = state.reads.load(Ordering::SeqCst);
    tokio::time::sleep(TICK * 10).await;
    assert_eq!(state.reads.load(Ordering::SeqCst), reads_after_stop);
}

#[tokio::test]
async fn reads_are_single_flight_for_any_schedule_timing() {
    // Read takes twice the tick interval; overlapping schedules would show
    // up as a high-water mark above one.
    let meter = MockPowerMeter::new(0.1)
        .with_noise(0.0)
        .with_read_delay(TICK * 2);
    let (mut acq, _controls, state) =
        looped(meter, pulse_1khz_100ns(), MeterConfig::new(None, None));

    acq.start().await;
    tokio::time::sleep(TICK * 15).await;
    acq.stop().await;

    assert!(state.reads.load(Ordering::SeqCst) >= 3);
    assert_eq!(state.max_reads_in_flight.load(Ordering::SeqCst), 1);
}

#[tokio::test]
async fn configuration_edits_reach_the_meter_at_the_next_tick_boundary() {
    let meter = MockPowerMeter::new(0.1).with_noise(0.0);
    let (mut acq, controls, state) = looped(
        meter,
        pulse_1khz_100ns(),
        MeterConfig::new(Some(532.0), Some(10)),
    );

    acq.start().await;
    let mut snapshots = acq.snapshots();
    next_snapshot(&mut snapshots).await;
    assert_eq!(*state.wavelength_nm.lock().unwrap(), Some(532.0));
    assert_eq!(*state.averaging_count.lock().unwrap(), Some(10));

    controls.set_wavelength_nm(Some(1064.0)).await;
    timeout(WAIT, async {
        loop {
            if *state.wavelength_nm.lock().unwrap() == Some(1064.0) {
                break;
            }
            tokio::time::sleep(Duration::from_millis(5)).await;
        }
    })
    .await
    .expect("edited wavelength never reached the meter");

    // Clearing the field falls back to the boundary default.
    controls.set_wavelength_nm(None).await;
    timeout(WAIT, async {
        loop {
            if *state.wavelength_nm.lock().unwrap() == Some(905.0) {
                break;
            }
            tokio::time::sleep(Duration::from_millis(5)).await;
        }
    })
    .await
    .expect("cleared wavelength never fell back to the default");

    acq.stop().await;
}
