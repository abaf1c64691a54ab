// Three-phase reference trajectories: accelerate, cruise, decelerate.
//
// Time is in microseconds relative to the start, positions in counts, rates in
// counts/s and accelerations in counts/s². Intermediate products use i128 so
// long maneuvers at high acceleration cannot overflow.

use crate::error::{DriveError, Result};

const US_PER_S: i128 = 1_000_000;

/// Reference position and rate at one instant
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct Reference {
    pub count: i32,
    pub rate: i32,
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Trajectory {
    t0: u32,
    th0: i64,
    w0: i64,
    // Signed accelerations of the first and last phase
    a1: i64,
    a3: i64,
    // Cruise rate
    w1: i64,
    // Phase boundaries, relative to t0
    t1: i64,
    t2: i64,
    t3: i64,
    th1: i64,
    th2: i64,
    th3: i64,
    forever: bool,
}

fn displacement(w0: i64, a: i64, dt: i64) -> i64 {
    let dt = dt as i128;
    (w0 as i128 * dt / US_PER_S + a as i128 * dt * dt / (2 * US_PER_S * US_PER_S)) as i64
}

fn rate_after(w0: i64, a: i64, dt: i64) -> i64 {
    w0 + (a as i128 * dt as i128 / US_PER_S) as i64
}

/// Time in µs to change rate by `dw` at acceleration `a`
fn ramp_time(dw: i64, a: i64) -> i64 {
    (dw.abs() as i128 * US_PER_S / a as i128) as i64
}

fn isqrt(value: i128) -> i64 {
    if value <= 0 {
        return 0;
    }
    let mut x = (value as f64).sqrt() as i128;
    while x * x > value {
        x -= 1;
    }
    while (x + 1) * (x + 1) <= value {
        x += 1;
    }
    x as i64
}

impl Trajectory {
    /// Hold `count` indefinitely
    pub fn stationary(t0: u32, count: i32) -> Self {
        Self {
            t0,
            th0: count as i64,
            th1: count as i64,
            th2: count as i64,
            th3: count as i64,
            ..Default::default()
        }
    }

    /// Move from rest at `th0` to rest at `th3`, cruising at most at `rate`
    pub fn angle(t0: u32, th0: i32, th3: i32, rate: i32, acceleration: i32) -> Result<Self> {
        let distance = th3 as i64 - th0 as i64;
        if distance == 0 {
            return Ok(Self::stationary(t0, th3));
        }
        if rate == 0 || acceleration <= 0 {
            return Err(DriveError::InvalidArgument("rate and acceleration must be nonzero"));
        }

        let sign = distance.signum();
        let d = distance.abs();
        let w = (rate as i64).abs();
        let a = acceleration as i64;

        // Counts covered while ramping up to full rate
        let ramp_distance = (w as i128 * w as i128 / (2 * a as i128)) as i64;

        let (w_peak, t1, t2) = if 2 * ramp_distance >= d {
            let w_peak = isqrt(a as i128 * d as i128).max(1);
            let t1 = ramp_time(w_peak, a);
            (w_peak, t1, t1)
        } else {
            let t1 = ramp_time(w, a);
            let cruise = d - 2 * displacement(0, a, t1);
            let t2 = t1 + (cruise as i128 * US_PER_S / w as i128) as i64;
            (w, t1, t2)
        };
        let t3 = t2 + t1;

        let th1 = th0 as i64 + sign * displacement(0, a, t1);
        let th2 = th1 + sign * displacement(w_peak, 0, t2 - t1);

        Ok(Self {
            t0,
            th0: th0 as i64,
            w0: 0,
            a1: sign * a,
            a3: -sign * a,
            w1: sign * w_peak,
            t1,
            t2,
            t3,
            th1,
            th2,
            th3: th3 as i64,
            forever: false,
        })
    }

    /// Ramp from `rate_now` to `target_rate` and cruise. With a duration, ramp
    /// back down to zero once it has elapsed; without one, cruise forever.
    pub fn timed(
        t0: u32,
        duration: Option<u32>,
        th0: i32,
        rate_now: i32,
        target_rate: i32,
        acceleration: i32,
    ) -> Result<Self> {
        if acceleration <= 0 {
            return Err(DriveError::InvalidArgument("acceleration must be positive"));
        }
        let a = acceleration as i64;
        let w0 = rate_now as i64;
        let w1 = target_rate as i64;

        let t1 = ramp_time(w1 - w0, a);
        let a1 = (w1 - w0).signum() * a;
        let th1 = th0 as i64 + displacement(w0, a1, t1);

        let (t2, t3, forever) = match duration {
            None => (i64::MAX, i64::MAX, true),
            Some(duration) => {
                let t2 = t1.max(duration as i64);
                (t2, t2 + ramp_time(w1, a), false)
            }
        };
        let a3 = -w1.signum() * a;
        let (th2, th3) = if forever {
            (th1, th1)
        } else {
            let th2 = th1 + displacement(w1, 0, t2 - t1);
            (th2, th2 + displacement(w1, a3, t3 - t2))
        };

        Ok(Self {
            t0,
            th0: th0 as i64,
            w0,
            a1,
            a3,
            w1,
            t1,
            t2,
            t3,
            th1,
            th2,
            th3,
            forever,
        })
    }

    pub fn start_time(&self) -> u32 {
        self.t0
    }

    /// Time from start to finish in µs; `None` for endless trajectories
    pub fn duration(&self) -> Option<u32> {
        if self.forever {
            None
        } else {
            Some(self.t3.clamp(0, u32::MAX as i64) as u32)
        }
    }

    /// Holds one position and finishes immediately
    pub fn is_stationary(&self) -> bool {
        !self.forever && self.t3 == 0 && self.th0 == self.th3
    }

    /// Keep a stationary trajectory running until `duration` µs after its start
    pub fn hold_for(&mut self, duration: u32) {
        if self.is_stationary() {
            self.t1 = duration as i64;
            self.t2 = duration as i64;
            self.t3 = duration as i64;
        }
    }

    /// Restart the cruise of an endless trajectory at `time`, keeping the
    /// reference continuous. Elapsed time is u32 µs, so an endless cruise
    /// has to be rebased well within its wraparound.
    pub fn rebase(&mut self, time: u32) {
        let dt = self.elapsed(time);
        if !self.forever || dt < self.t1 {
            return;
        }
        let count = self.th1 + displacement(self.w1, 0, dt - self.t1);
        self.t0 = time;
        self.th0 = count;
        self.th1 = count;
        self.th2 = count;
        self.th3 = count;
        self.w0 = self.w1;
        self.a1 = 0;
        self.t1 = 0;
    }

    /// Elapsed time since start, µs
    pub fn age(&self, time: u32) -> u32 {
        time.wrapping_sub(self.t0)
    }

    /// Final position; for endless trajectories the position where cruising starts
    pub fn target(&self) -> i32 {
        self.th3 as i32
    }

    pub fn is_forever(&self) -> bool {
        self.forever
    }

    pub fn is_done(&self, time: u32) -> bool {
        !self.forever && self.elapsed(time) >= self.t3
    }

    fn elapsed(&self, time: u32) -> i64 {
        time.wrapping_sub(self.t0) as i64
    }

    pub fn reference(&self, time: u32) -> Reference {
        let dt = self.elapsed(time);

        let (count, rate) = if dt < self.t1 {
            (self.th0 + displacement(self.w0, self.a1, dt), rate_after(self.w0, self.a1, dt))
        } else if self.forever || dt < self.t2 {
            (self.th1 + displacement(self.w1, 0, dt - self.t1), self.w1)
        } else if dt < self.t3 {
            let dt = dt - self.t2;
            (self.th2 + displacement(self.w1, self.a3, dt), rate_after(self.w1, self.a3, dt))
        } else {
            (self.th3, 0)
        };

        Reference {
            count: count as i32,
            rate: rate as i32,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    #[test]
    fn test_angle_reaches_target() {
        let traj = Trajectory::angle(1_000, 100, 1_100, 500, 1_000).unwrap();
        assert!(!traj.is_done(1_000));
        let end = traj.reference(1_000 + 10_000_000);
        assert_eq!(end, Reference { count: 1_100, rate: 0 });
        assert!(traj.is_done(1_000 + 10_000_000));
    }

    #[test]
    fn test_angle_monotonic_and_rate_limited() {
        let traj = Trajectory::angle(0, 0, -2_000, 400, 800).unwrap();
        let mut prev = 0;
        for step in 0..800 {
            let r = traj.reference(step * 10_000);
            assert!(r.count <= prev);
            assert!(r.rate.abs() <= 400);
            prev = r.count;
        }
        assert_eq!(prev, -2_000);
    }

    #[test]
    fn test_angle_triangular_profile() {
        // Too short to reach full rate
        let traj = Trajectory::angle(0, 0, 100, 10_000, 1_000).unwrap();
        let peak = (0..200)
            .map(|i| traj.reference(i * 10_000).rate)
            .max()
            .unwrap();
        assert!(peak < 10_000);
        assert!(peak > 0);
    }

    #[test]
    fn test_zero_distance_is_stationary() {
        let traj = Trajectory::angle(500, 42, 42, 0, 0).unwrap();
        assert!(traj.is_done(500));
        assert_eq!(traj.reference(9_999), Reference { count: 42, rate: 0 });
    }

    #[test]
    fn test_angle_rejects_zero_rate() {
        assert!(matches!(
            Trajectory::angle(0, 0, 10, 0, 100),
            Err(DriveError::InvalidArgument(_))
        ));
    }

    #[test]
    fn test_timed_forever_cruises() {
        let traj = Trajectory::timed(0, None, 0, 0, 200, 400).unwrap();
        assert!(traj.is_forever());
        assert!(!traj.is_done(u32::MAX / 2));
        // Ramp takes 0.5 s covering 50 counts, then 200 counts/s
        assert_eq!(traj.reference(500_000), Reference { count: 50, rate: 200 });
        assert_eq!(traj.reference(1_500_000), Reference { count: 250, rate: 200 });
    }

    #[test]
    fn test_timed_with_duration_stops() {
        let traj = Trajectory::timed(0, Some(1_000_000), 0, 0, -100, 1_000).unwrap();
        assert!(!traj.is_done(1_000_000));
        assert!(traj.is_done(1_100_000));
        let end = traj.reference(2_000_000);
        assert_eq!(end.rate, 0);
        assert_eq!(end.count, traj.target());
        assert!(end.count < 0);
    }

    #[test]
    fn test_stationary_hold_for_duration() {
        let mut traj = Trajectory::angle(500, 40, 40, 100, 100).unwrap();
        assert!(traj.is_stationary());
        assert!(traj.is_done(500));

        traj.hold_for(2_000_000);
        assert_eq!(traj.duration(), Some(2_000_000));
        assert!(!traj.is_done(500 + 1_999_999));
        assert!(traj.is_done(500 + 2_000_000));
        assert_eq!(traj.reference(500 + 1_000_000), Reference { count: 40, rate: 0 });
    }

    #[test]
    fn test_hold_for_leaves_moving_trajectory_alone() {
        let mut traj = Trajectory::angle(0, 0, 1_000, 500, 1_000).unwrap();
        let before = traj.clone();
        traj.hold_for(60_000_000);
        assert_eq!(traj, before);
    }

    #[test]
    fn test_rebase_keeps_endless_cruise_continuous() {
        let mut traj = Trajectory::timed(0, None, 0, 0, 100, 1_000).unwrap();
        let mut rebased = traj.clone();

        // 50 minutes in, well past the ramp
        let time: u32 = 3_000_000_000;
        rebased.rebase(time);
        assert_eq!(rebased.start_time(), time);
        assert_eq!(rebased.reference(time), traj.reference(time));

        // Another 50 minutes wraps the u32 clock, the rebased one keeps counting
        let later = time.wrapping_add(3_000_000_000);
        let expected = traj.reference(time).count + 300_000;
        assert_eq!(rebased.reference(later), Reference { count: expected, rate: 100 });

        traj.rebase(50_000);
        assert_eq!(traj.start_time(), 0, "no rebase during the ramp");
    }

    proptest! {
        #[test]
        fn prop_angle_ends_at_target(
            th0 in -100_000i32..100_000,
            distance in -100_000i32..100_000,
            rate in 100i32..5_000,
            acceleration in 100i32..20_000,
        ) {
            let th3 = th0 + distance;
            let traj = Trajectory::angle(0, th0, th3, rate, acceleration).unwrap();
            let end = 2_000_000_000;
            prop_assert!(traj.is_done(end));
            prop_assert_eq!(traj.reference(end), Reference { count: th3, rate: 0 });
            prop_assert_eq!(traj.reference(0).count, th0);
        }
    }
}
