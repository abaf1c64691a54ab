// Merge the tuning of two wheel motors into drivebase axis tuning

use crate::control::ControlSettings;
use crate::error::{DriveError, Result};

/// Settings for the distance axis from the left and right motor settings.
///
/// The heading axis starts from a copy of the result. Counts per unit are
/// left at the left motor's value; the drivebase replaces them with its
/// geometry.
pub fn adopt_settings(left: &ControlSettings, right: &ControlSettings) -> Result<ControlSettings> {
    if left.actuation_scale != right.actuation_scale {
        return Err(DriveError::InvalidArgument("motors use different actuation scales"));
    }
    if left.control_offset != right.control_offset {
        return Err(DriveError::InvalidArgument("motors use different control offsets"));
    }

    Ok(ControlSettings {
        counts_per_unit: left.counts_per_unit,
        max_rate: left.max_rate.saturating_add(right.max_rate),
        abs_acceleration: left
            .abs_acceleration
            .saturating_add(right.abs_acceleration)
            .saturating_mul(2),
        rate_tolerance: left.rate_tolerance.saturating_add(right.rate_tolerance),
        count_tolerance: left.count_tolerance.saturating_add(right.count_tolerance),
        stall_rate_limit: left.stall_rate_limit.saturating_add(right.stall_rate_limit),
        stall_time: left.stall_time.min(right.stall_time),
        pid_kp: average_gain(left.pid_kp, right.pid_kp),
        pid_ki: average_gain(left.pid_ki, right.pid_ki),
        pid_kd: average_gain(left.pid_kd, right.pid_kd),
        integral_range: left.integral_range.saturating_add(right.integral_range),
        integral_rate: left.integral_rate.saturating_add(right.integral_rate),
        max_control: left.max_control.min(right.max_control),
        control_offset: left.control_offset,
        actuation_scale: left.actuation_scale,
    })
}

// Each axis count is the sum of two wheels and each wheel gets the sum or
// difference of two axis signals, hence half the average.
fn average_gain(left: i32, right: i32) -> i32 {
    ((left as i64 + right as i64) / 4) as i32
}

#[cfg(test)]
mod tests {
    use super::*;

    fn motor(kp: i32, max_control: i32, stall_time: u32) -> ControlSettings {
        ControlSettings {
            pid_kp: kp,
            max_control,
            stall_time,
            ..ControlSettings::default()
        }
    }

    #[test]
    fn test_combination_rules() {
        let left = motor(200, 9_000, 150_000);
        let right = motor(100, 10_000, 200_000);
        let merged = adopt_settings(&left, &right).unwrap();

        let d = ControlSettings::default();
        assert_eq!(merged.max_rate, 2 * d.max_rate);
        assert_eq!(merged.abs_acceleration, 4 * d.abs_acceleration);
        assert_eq!(merged.rate_tolerance, 2 * d.rate_tolerance);
        assert_eq!(merged.count_tolerance, 2 * d.count_tolerance);
        assert_eq!(merged.stall_rate_limit, 2 * d.stall_rate_limit);
        assert_eq!(merged.integral_range, 2 * d.integral_range);
        assert_eq!(merged.integral_rate, 2 * d.integral_rate);
        assert_eq!(merged.pid_kp, 75);
        assert_eq!(merged.pid_ki, 50);
        assert_eq!(merged.max_control, 9_000);
        assert_eq!(merged.stall_time, 150_000);
    }

    #[test]
    fn test_mismatched_scale_or_offset_rejected() {
        let left = ControlSettings::default();
        let right = ControlSettings {
            actuation_scale: 10,
            ..ControlSettings::default()
        };
        assert!(matches!(
            adopt_settings(&left, &right),
            Err(DriveError::InvalidArgument(_))
        ));

        let right = ControlSettings {
            control_offset: 5,
            ..ControlSettings::default()
        };
        assert!(matches!(
            adopt_settings(&left, &right),
            Err(DriveError::InvalidArgument(_))
        ));
    }
}
