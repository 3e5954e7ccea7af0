//! Presentation-boundary formatting for published readings.
//!
//! The formatting policy is part of the observable contract: corrected
//! average power carries fixed 10-decimal precision, peak power fixed
//! 2-decimal precision in watts (fixed point, never scientific notation),
//! and the failure variants map to literal guidance messages. Nothing else
//! in the crate produces display strings.

use crate::calculator::PeakPower;
use crate::zero::ZeroOffset;

/// Corrected average power with fixed 10-decimal formatting.
pub fn format_average_power(watts: f64) -> String {
    format!("{watts:.10}")
}

/// Peak-power line: fixed 2 decimals in watts, or a literal guidance message.
pub fn format_peak_power(result: &PeakPower) -> String {
    match result {
        PeakPower::Computed(watts) => format!("Peak Power: {watts:.2} W"),
        PeakPower::Incomplete => "Please fill in all fields".to_string(),
        PeakPower::InvalidAttenuation => "Invalid attenuation value".to_string(),
        PeakPower::InvalidInput => "Invalid input, please enter valid numbers".to_string(),
    }
}

/// Zeroed-value line shown next to the zero controls.
pub fn format_zero_offset(offset: &ZeroOffset) -> String {
    match offset.get() {
        Some(watts) => format!("Zeroed Value: {watts:.10}"),
        None => "Zeroed Value: None".to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn average_power_carries_ten_decimals() {
        assert_eq!(format_average_power(2.0), "2.0000000000");
        assert_eq!(format_average_power(0.0001234567891), "0.0001234568");
    }

    #[test]
    fn computed_peak_power_carries_two_decimals() {
        assert_eq!(
            format_peak_power(&PeakPower::Computed(1000.0)),
            "Peak Power: 1000.00 W"
        );
        assert_eq!(
            format_peak_power(&PeakPower::Computed(0.125)),
            "Peak Power: 0.13 W"
        );
    }

    #[test]
    fn failure_variants_map_to_the_literal_messages() {
        assert_eq!(
            format_peak_power(&PeakPower::Incomplete),
            "Please fill in all fields"
        );
        assert_eq!(
            format_peak_power(&PeakPower::InvalidAttenuation),
            "Invalid attenuation value"
        );
        assert_eq!(
            format_peak_power(&PeakPower::InvalidInput),
            "Invalid input, please enter valid numbers"
        );
    }

    #[test]
    fn zero_offset_line() {
        let mut zero = ZeroOffset::unset();
        assert_eq!(format_zero_offset(&zero), "Zeroed Value: None");
        zero.set_from_current(0.5);
        assert_eq!(format_zero_offset(&zero), "Zeroed Value: 0.5000000000");
    }
}
