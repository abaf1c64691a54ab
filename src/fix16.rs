// Q16.16 fixed-point arithmetic for gearing and geometry
//
// Every operation truncates toward zero and saturates at the i32 range, so
// unit conversions come out bit-identical on every target.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::ops::{Div, Mul};

/// Q16.16 fixed-point number
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Fix16(i32);

const ONE_RAW: i64 = 1 << 16;

impl Fix16 {
    pub const ZERO: Fix16 = Fix16(0);
    pub const ONE: Fix16 = Fix16(1 << 16);
    pub const MAX: Fix16 = Fix16(i32::MAX);
    pub const MIN: Fix16 = Fix16(i32::MIN);

    /// 4/π
    pub const FOUR_DIV_PI: Fix16 = Fix16(0x0001_45F3);

    pub const fn from_raw(raw: i32) -> Self {
        Self(raw)
    }

    pub const fn raw(self) -> i32 {
        self.0
    }

    pub fn from_int(value: i32) -> Self {
        saturate(value as i64 * ONE_RAW)
    }

    /// Integer part, truncated toward zero
    pub fn to_int(self) -> i32 {
        (self.0 as i64 / ONE_RAW) as i32
    }

    /// `num / den` as a fixed-point value
    pub fn from_ratio(num: i32, den: i32) -> Self {
        Self::from_int(num) / Self::from_int(den)
    }

    pub fn is_positive(self) -> bool {
        self.0 > 0
    }

    /// Scale an integer by this factor, truncating toward zero
    pub fn scale(self, value: i32) -> i32 {
        clamp_i32(value as i64 * self.0 as i64 / ONE_RAW)
    }

    /// Divide an integer by this factor, truncating toward zero.
    /// Division by zero saturates in the direction of `value`.
    pub fn unscale(self, value: i32) -> i32 {
        if self.0 == 0 {
            return if value < 0 { i32::MIN } else { i32::MAX };
        }
        clamp_i32(value as i64 * ONE_RAW / self.0 as i64)
    }

    pub fn to_f32(self) -> f32 {
        self.0 as f32 / ONE_RAW as f32
    }
}

fn clamp_i32(value: i64) -> i32 {
    value.clamp(i32::MIN as i64, i32::MAX as i64) as i32
}

fn saturate(raw: i64) -> Fix16 {
    Fix16(clamp_i32(raw))
}

impl Mul for Fix16 {
    type Output = Fix16;

    fn mul(self, rhs: Fix16) -> Fix16 {
        saturate(self.0 as i64 * rhs.0 as i64 / ONE_RAW)
    }
}

impl Div for Fix16 {
    type Output = Fix16;

    fn div(self, rhs: Fix16) -> Fix16 {
        if rhs.0 == 0 {
            return if self.0 < 0 { Fix16::MIN } else { Fix16::MAX };
        }
        saturate(self.0 as i64 * ONE_RAW / rhs.0 as i64)
    }
}

impl From<i32> for Fix16 {
    fn from(value: i32) -> Self {
        Self::from_int(value)
    }
}

impl fmt::Display for Fix16 {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:.4}", self.to_f32())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    #[test]
    fn test_truncates_toward_zero() {
        let half = Fix16::from_ratio(1, 2);
        assert_eq!(half.scale(3), 1);
        assert_eq!(half.scale(-3), -1);
        assert_eq!(Fix16::from_raw(-(3 << 15)).to_int(), -1);
    }

    #[test]
    fn test_four_div_pi() {
        // 4/π = 1.27323...
        let v = Fix16::FOUR_DIV_PI.to_f32();
        assert!((v - 1.273_24).abs() < 1e-4);
    }

    #[test]
    fn test_mul_div() {
        let a = Fix16::from_int(114) * Fix16::from_int(2);
        assert_eq!(a, Fix16::from_int(228));
        let b = a / Fix16::from_int(56);
        // 228 / 56 = 4.0714..., truncated in the last bit
        assert_eq!(b.raw(), (228i64 * 65536 / 56) as i32);
    }

    #[test]
    fn test_saturates() {
        assert_eq!(Fix16::from_int(40_000), Fix16::MAX);
        assert_eq!(Fix16::from_int(-40_000), Fix16::MIN);
        assert_eq!(Fix16::ONE / Fix16::ZERO, Fix16::MAX);
    }

    #[test]
    fn test_scale_unscale() {
        let cpu = Fix16::from_ratio(4096, 360);
        assert_eq!(cpu.scale(360), 4095);
        assert_eq!(cpu.unscale(4096), 360);
    }

    proptest! {
        #[test]
        fn prop_integer_factor_is_exact(k in -100i32..100, v in -1_000_000i32..1_000_000) {
            let factor = Fix16::from_int(k);
            prop_assert_eq!(factor.scale(v), k * v);
            if k != 0 {
                prop_assert_eq!(factor.unscale(k * v), v);
            }
        }
    }
}
