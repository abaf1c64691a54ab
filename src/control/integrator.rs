// Error integrators with pause/resume for windup prevention and stall detection
//
// Both integrators are paused by the controller while the actuator saturates
// and resumed once it regains authority. Stall detection looks at how long
// an integrator has been paused while the motor makes no progress.

/// Sign-normalized stall check shared by both integrators
fn stall_check(
    time_now: u32,
    pause_began: u32,
    mut speed_now: i32,
    mut speed_ref: i32,
    stall_time: u32,
    stall_speed: i32,
) -> bool {
    // Checking both directions is the same as checking the positive one
    if speed_ref < 0 {
        speed_ref = speed_ref.saturating_neg();
        speed_now = speed_now.saturating_neg();
    }

    // Still faster than the stall limit
    if speed_ref != 0 && speed_now > stall_speed {
        return false;
    }

    // Not paused for long enough yet
    if time_now.wrapping_sub(pause_began) < stall_time {
        return false;
    }

    true
}

/// Windup-limited rate error integrator for speed (timed) control.
///
/// The position error is the integral of the rate error, so the integral is
/// only reconstructed from error snapshots taken at pause and resume. Paused
/// time does not count towards the integral.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SpeedIntegrator {
    running: bool,
    paused_integral: i32,
    error_at_resume: i32,
    pause_time: u32,
}

impl SpeedIntegrator {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn is_running(&self) -> bool {
        self.running
    }

    pub fn pause(&mut self, time_now: u32, error: i32) {
        if !self.running {
            return;
        }
        self.running = false;
        self.paused_integral = self
            .paused_integral
            .wrapping_add(error.wrapping_sub(self.error_at_resume));
        self.pause_time = time_now;
    }

    pub fn resume(&mut self, _time_now: u32, error: i32) {
        if self.running {
            return;
        }
        self.running = true;
        self.error_at_resume = error;
    }

    /// Discard all history and start integrating from `error`
    pub fn reset(&mut self, time_now: u32, error: i32) {
        self.paused_integral = 0;
        self.running = false;
        self.resume(time_now, error);
    }

    /// Integral of the rate error, given the current position error
    pub fn get_error(&self, error: i32) -> i32 {
        if self.running {
            self.paused_integral
                .wrapping_add(error.wrapping_sub(self.error_at_resume))
        } else {
            self.paused_integral
        }
    }

    pub fn stalled(
        &self,
        time_now: u32,
        speed_now: i32,
        speed_ref: i32,
        stall_time: u32,
        stall_speed: i32,
    ) -> bool {
        if self.running {
            return false;
        }
        stall_check(
            time_now,
            self.pause_time,
            speed_now,
            speed_ref,
            stall_time,
            stall_speed,
        )
    }
}

/// Bounded, rate-limited position error integrator for angle control.
///
/// While paused, the trajectory time is frozen as well: `get_ref_time` hides
/// all paused time so the reference resumes where it left off.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct PositionIntegrator {
    trajectory_running: bool,
    integral: i32,
    prev_error: i32,
    total_paused: u32,
    pause_time: u32,
}

impl PositionIntegrator {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn is_running(&self) -> bool {
        self.trajectory_running
    }

    pub fn integral(&self) -> i32 {
        self.integral
    }

    /// Time at which to evaluate the reference, excluding paused time
    pub fn get_ref_time(&self, time_now: u32) -> u32 {
        let real_time = if self.trajectory_running {
            time_now
        } else {
            self.pause_time
        };
        real_time.wrapping_sub(self.total_paused)
    }

    pub fn pause(&mut self, time_now: u32) {
        if !self.trajectory_running {
            return;
        }
        self.trajectory_running = false;
        self.pause_time = time_now;
    }

    pub fn resume(&mut self, time_now: u32) {
        if self.trajectory_running {
            return;
        }
        self.trajectory_running = true;
        self.total_paused = self
            .total_paused
            .wrapping_add(time_now.wrapping_sub(self.pause_time));
    }

    pub fn reset(&mut self, time_now: u32) {
        self.integral = 0;
        self.total_paused = 0;
        self.pause_time = time_now;
        self.prev_error = 0;
        self.trajectory_running = false;
        self.resume(time_now);
    }

    /// Accumulate the previous cycle's error and return the new integral.
    ///
    /// The error passed in now is only integrated on the next call. Growth is
    /// limited to `integral_change_max` per cycle and only happens within
    /// `integral_range` of the target; shrinking is always allowed.
    pub fn update(
        &mut self,
        _time_now: u32,
        error: i32,
        remaining: i32,
        integral_range: i32,
        integral_max: i32,
        integral_change_max: i32,
    ) -> i32 {
        let mut cerr = self.prev_error;
        let mut decrease = self.shrinks(cerr);

        if self.trajectory_running || decrease {
            if !decrease {
                cerr = cerr.clamp(-integral_change_max.abs(), integral_change_max.abs());
                // A clamped error may still flip the sign of the integral
                decrease = self.shrinks(cerr);
            }

            if remaining.unsigned_abs() <= integral_range.unsigned_abs() || decrease {
                self.integral = self.integral.saturating_add(cerr);
            }

            let limit = integral_max.abs();
            self.integral = self.integral.clamp(-limit, limit);
        }

        self.prev_error = error;
        self.integral
    }

    fn shrinks(&self, cerr: i32) -> bool {
        let integral = self.integral as i64;
        (integral + cerr as i64).abs() < integral.abs()
    }

    pub fn stalled(
        &self,
        time_now: u32,
        speed_now: i32,
        speed_ref: i32,
        stall_time: u32,
        stall_speed: i32,
        integral_max: i32,
    ) -> bool {
        // Running and not saturated
        if self.trajectory_running && self.integral.unsigned_abs() < integral_max.unsigned_abs() {
            return false;
        }
        stall_check(
            time_now,
            self.pause_time,
            speed_now,
            speed_ref,
            stall_time,
            stall_speed,
        )
    }
}
