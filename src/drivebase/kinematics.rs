// Differential-drive kinematics
//
// Two wheels on a common axle map to a distance axis (the sum of the wheel
// counts) and a heading axis (their difference). Geometry is in millimeters,
// computed in fixed point.

use crate::fix16::Fix16;

/// Count and rate of one wheel or one virtual axis
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct AxisState {
    pub count: i32,
    pub rate: i32,
}

impl AxisState {
    pub fn new(count: i32, rate: i32) -> Self {
        Self { count, rate }
    }
}

/// Distance (sum) and heading (difference) axes from the two wheels
pub fn wheels_to_axes(left: AxisState, right: AxisState) -> (AxisState, AxisState) {
    let sum = AxisState {
        count: left.count.wrapping_add(right.count),
        rate: left.rate.wrapping_add(right.rate),
    };
    let dif = AxisState {
        count: left.count.wrapping_sub(right.count),
        rate: left.rate.wrapping_sub(right.rate),
    };
    (sum, dif)
}

/// Per-wheel signals `(left, right)` from sum and difference signals
pub fn axes_to_wheels(sum: i32, dif: i32) -> (i32, i32) {
    (sum.saturating_add(dif), sum.saturating_sub(dif))
}

/// Counts of the summed wheels per millimeter driven.
///
/// One wheel turns `360 / (π·d)` degrees per millimeter, and the distance
/// axis sums two wheels: `motor_cpu · 180 · (4/π) / d`.
pub fn distance_counts_per_unit(motor_cpu: Fix16, wheel_diameter: Fix16) -> Fix16 {
    motor_cpu * (Fix16::from_int(180) * Fix16::FOUR_DIV_PI / wheel_diameter)
}

/// Counts of the wheel difference per degree of heading: `motor_cpu · 2·axle / d`
pub fn heading_counts_per_unit(motor_cpu: Fix16, wheel_diameter: Fix16, axle_track: Fix16) -> Fix16 {
    motor_cpu * (axle_track * Fix16::from_int(2) / wheel_diameter)
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    #[test]
    fn test_sum_and_difference() {
        let (sum, dif) = wheels_to_axes(AxisState::new(100, 30), AxisState::new(40, -10));
        assert_eq!(sum, AxisState::new(140, 20));
        assert_eq!(dif, AxisState::new(60, 40));
    }

    #[test]
    fn test_axes_round_trip_to_wheels() {
        // left = sum + dif, right = sum - dif
        assert_eq!(axes_to_wheels(500, 0), (500, 500));
        assert_eq!(axes_to_wheels(0, 300), (300, -300));
        assert_eq!(axes_to_wheels(i32::MAX, 1), (i32::MAX, i32::MAX - 1));
    }

    #[test]
    fn test_geometry_for_56mm_wheels() {
        let d = Fix16::from_int(56);
        let distance = distance_counts_per_unit(Fix16::ONE, d);
        let heading = heading_counts_per_unit(Fix16::ONE, d, Fix16::from_int(114));

        // 720 / (π · 56) and 228 / 56
        assert!((distance.to_f32() - 4.0926).abs() < 1e-3);
        assert!((heading.to_f32() - 4.0714).abs() < 1e-3);
    }

    #[test]
    fn test_geometry_scales_with_gearing() {
        let d = Fix16::from_int(56);
        let geared = distance_counts_per_unit(Fix16::from_int(2), d);
        let plain = distance_counts_per_unit(Fix16::ONE, d);
        assert_eq!(geared.raw(), plain.raw() * 2);
    }

    proptest! {
        #[test]
        fn prop_axes_map_back_to_twice_each_wheel(
            l in -100_000_000i32..100_000_000,
            r in -100_000_000i32..100_000_000,
        ) {
            let (sum, dif) = wheels_to_axes(AxisState::new(l, 0), AxisState::new(r, 0));
            prop_assert_eq!(axes_to_wheels(sum.count, dif.count), (2 * l, 2 * r));
        }
    }
}
