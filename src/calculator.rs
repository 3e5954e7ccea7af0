//! Peak pulse power derivation from an averaged continuous-wave reading.
//!
//! Peak power is the duty-cycle inversion of the average power:
//!
//! ```text
//! P_peak = P_avg / (f_rep × t_pulse)              without attenuation
//! P_peak = P_avg / (f_rep × t_pulse × a/100)      with attenuation a in %
//! ```
//!
//! All inputs are converted to SI base units first. The computation returns
//! a tagged [`PeakPower`] so missing or unparseable operator fields are
//! ordinary values, not errors, and no display formatting happens here; the
//! string contract lives in [`crate::readout`].
//!
//! A zero denominator (frequency, pulse width or attenuation fraction equal
//! to zero) is not special-cased: the IEEE result propagates.

use crate::units::{to_base, FrequencyUnit, PowerUnit, Quantity, TimeUnit};
use serde::{Deserialize, Serialize};

/// Outcome of a peak-power computation.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub enum PeakPower {
    /// Derived peak power in watts.
    Computed(f64),
    /// The frequency or pulse-width field was left empty.
    Incomplete,
    /// The attenuation field is present but not a number.
    InvalidAttenuation,
    /// A numeric field failed to parse.
    InvalidInput,
}

impl PeakPower {
    /// The computed value in watts, if any.
    pub fn watts(&self) -> Option<f64> {
        match self {
            PeakPower::Computed(watts) => Some(*watts),
            _ => None,
        }
    }
}

/// Operator-entered pulse fields, kept exactly as entered.
///
/// Empty attenuation means "no attenuator installed". The unit tags default
/// to the choices the operator panel preselects (Hz, ns).
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct PulseSettings {
    /// Pulse repetition frequency field.
    #[serde(default)]
    pub frequency: String,
    /// Unit tag for the frequency field.
    #[serde(default)]
    pub frequency_unit: FrequencyUnit,
    /// Pulse width field.
    #[serde(default)]
    pub pulse_width: String,
    /// Unit tag for the pulse-width field.
    #[serde(default)]
    pub pulse_width_unit: TimeUnit,
    /// Attenuation in percent; empty when absent.
    #[serde(default)]
    pub attenuation_percent: String,
}

/// Compute peak power from an already-known average power (auto mode).
///
/// The acquisition loop calls this with the corrected reading each cycle;
/// the result contract is identical to a manual trigger.
pub fn compute_with_power(avg_power: Quantity<PowerUnit>, pulse: &PulseSettings) -> PeakPower {
    let frequency = pulse.frequency.trim();
    let pulse_width = pulse.pulse_width.trim();
    if frequency.is_empty() || pulse_width.is_empty() {
        return PeakPower::Incomplete;
    }

    let Ok(frequency) = frequency.parse::<f64>() else {
        return PeakPower::InvalidInput;
    };
    let Ok(pulse_width) = pulse_width.parse::<f64>() else {
        return PeakPower::InvalidInput;
    };

    let avg_watts = avg_power.to_base();
    let frequency_hz = to_base(frequency, pulse.frequency_unit);
    let pulse_width_s = to_base(pulse_width, pulse.pulse_width_unit);

    let attenuation = pulse.attenuation_percent.trim();
    if attenuation.is_empty() {
        return PeakPower::Computed(avg_watts / (frequency_hz * pulse_width_s));
    }

    match attenuation.parse::<f64>() {
        // Percentage to fraction. No range clamp; any finite value passes.
        Ok(percent) => {
            PeakPower::Computed(avg_watts / (frequency_hz * pulse_width_s * (percent / 100.0)))
        }
        Err(_) => PeakPower::InvalidAttenuation,
    }
}

/// Compute peak power from textual fields (manual mode).
///
/// The average-power field is parsed first; its failure wins over the
/// presence check on the remaining fields.
pub fn compute_fields(
    avg_power: &str,
    avg_power_unit: PowerUnit,
    pulse: &PulseSettings,
) -> PeakPower {
    match avg_power.trim().parse::<f64>() {
        Ok(value) => compute_with_power(Quantity::new(value, avg_power_unit), pulse),
        Err(_) => PeakPower::InvalidInput,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::readout::format_peak_power;

    fn pulse(frequency: &str, width: &str, attenuation: &str) -> PulseSettings {
        PulseSettings {
            frequency: frequency.into(),
            frequency_unit: FrequencyUnit::Kilohertz,
            pulse_width: width.into(),
            pulse_width_unit: TimeUnit::Nanoseconds,
            attenuation_percent: attenuation.into(),
        }
    }

    #[test]
    fn reference_vector_without_attenuation() {
        // 100 mW at 1 kHz, 100 ns pulses -> 1000 W peak.
        let result = compute_fields("100", PowerUnit::Milliwatts, &pulse("1", "100", ""));
        assert_eq!(format_peak_power(&result), "Peak Power: 1000.00 W");
    }

    #[test]
    fn attenuation_scales_the_result() {
        let result = compute_fields("100", PowerUnit::Milliwatts, &pulse("1", "100", "50"));
        assert_eq!(format_peak_power(&result), "Peak Power: 2000.00 W");
    }

    #[test]
    fn empty_frequency_is_incomplete() {
        let result = compute_fields("100", PowerUnit::Milliwatts, &pulse("", "100", ""));
        assert_eq!(result, PeakPower::Incomplete);
    }

    #[test]
    fn empty_pulse_width_is_incomplete() {
        let result = compute_fields("100", PowerUnit::Milliwatts, &pulse("1", "  ", ""));
        assert_eq!(result, PeakPower::Incomplete);
    }

    #[test]
    fn unparseable_attenuation_is_flagged_separately() {
        let result = compute_fields("100", PowerUnit::Milliwatts, &pulse("1", "100", "abc"));
        assert_eq!(result, PeakPower::InvalidAttenuation);
    }

    #[test]
    fn unparseable_average_power_wins_over_missing_fields() {
        // The average-power field is parsed before the presence check, so a
        // bad value reports as invalid input even with an empty frequency.
        let result = compute_fields("watts?", PowerUnit::Watts, &pulse("", "100", ""));
        assert_eq!(result, PeakPower::InvalidInput);
    }

    #[test]
    fn unparseable_frequency_is_invalid_input() {
        let result = compute_fields("100", PowerUnit::Milliwatts, &pulse("fast", "100", ""));
        assert_eq!(result, PeakPower::InvalidInput);
    }

    #[test]
    fn auto_mode_matches_the_manual_contract() {
        let manual = compute_fields("0.1", PowerUnit::Watts, &pulse("1", "100", ""));
        let auto =
            compute_with_power(Quantity::new(0.1, PowerUnit::Watts), &pulse("1", "100", ""));
        assert_eq!(manual, auto);
    }

    #[test]
    fn zero_denominator_propagates_infinity() {
        let result = compute_fields("100", PowerUnit::Milliwatts, &pulse("0", "100", ""));
        match result {
            PeakPower::Computed(watts) => assert!(watts.is_infinite()),
            other => panic!("unexpected result: {other:?}"),
        }
    }

    #[test]
    fn attenuation_is_not_range_clamped() {
        let over = compute_fields("100", PowerUnit::Milliwatts, &pulse("1", "100", "200"));
        match over {
            PeakPower::Computed(watts) => assert!((watts - 500.0).abs() < 1e-9),
            other => panic!("unexpected result: {other:?}"),
        }

        let negative = compute_fields("100", PowerUnit::Milliwatts, &pulse("1", "100", "-50"));
        match negative {
            PeakPower::Computed(watts) => assert!(watts < 0.0),
            other => panic!("unexpected result: {other:?}"),
        }
    }
}
