// Tuning parameters of one controlled axis, in counts

use serde::{Deserialize, Serialize};

use crate::fix16::Fix16;

/// Full-scale duty cycle
pub const MAX_DUTY: i32 = 10_000;

/// Control parameters. Rates are counts/s, accelerations counts/s²,
/// times µs, control signals in duty units (±`MAX_DUTY`).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct ControlSettings {
    /// Counts per user unit (degree or millimeter)
    pub counts_per_unit: Fix16,
    pub max_rate: i32,
    pub abs_acceleration: i32,
    pub rate_tolerance: i32,
    pub count_tolerance: i32,
    pub stall_rate_limit: i32,
    pub stall_time: u32,
    pub pid_kp: i32,
    pub pid_ki: i32,
    pub pid_kd: i32,
    /// Distance to target within which the integral may grow
    pub integral_range: i32,
    /// Maximum integral growth per cycle
    pub integral_rate: i32,
    pub max_control: i32,
    pub control_offset: i32,
    pub actuation_scale: i32,
}

impl Default for ControlSettings {
    fn default() -> Self {
        Self {
            counts_per_unit: Fix16::ONE,
            max_rate: 1_000,
            abs_acceleration: 2_000,
            rate_tolerance: 50,
            count_tolerance: 10,
            stall_rate_limit: 20,
            stall_time: 200_000,
            pid_kp: 200,
            pid_ki: 100,
            pid_kd: 0,
            integral_range: 45,
            integral_rate: 3,
            max_control: MAX_DUTY,
            control_offset: 0,
            actuation_scale: 1,
        }
    }
}

impl ControlSettings {
    pub fn user_to_counts(&self, user: i32) -> i32 {
        self.counts_per_unit.scale(user)
    }

    pub fn counts_to_user(&self, counts: i32) -> i32 {
        self.counts_per_unit.unscale(counts)
    }

    /// Largest integral the I term may hold before it alone saturates
    pub fn integral_max(&self) -> i32 {
        if self.pid_ki <= 0 {
            return 0;
        }
        (self.max_control as i64 * 1000 / self.pid_ki as i64).min(i32::MAX as i64) as i32
    }
}
