// Fixed-width telemetry log
//
// Rows are appended by the control loop while the log is active. Each row
// starts with the milliseconds elapsed since the log was started, followed by
// the caller's values. Storage is allocated once per start and never grows.

use crate::error::{DriveError, Result};

/// Values the logger adds to every row itself (elapsed time)
pub const NUM_DEFAULT_LOG_VALUES: usize = 1;

/// Widest row the logger accepts, including its own columns
pub const MAX_LOG_VALUES: usize = 20;

/// Memory budget for one log
pub const MAX_LOG_MEM_KB: usize = 2 * 1024;

/// Most rows a single log may hold
pub const MAX_LOG_LEN: usize = (MAX_LOG_MEM_KB * 1024) / (MAX_LOG_VALUES * 4);

#[derive(Debug, Clone)]
pub struct Logger {
    num_values: usize,
    active: bool,
    skip_counter: u32,
    sample_div: u32,
    sampled: u32,
    capacity: usize,
    start_time: u32,
    data: Vec<i32>,
}

impl Logger {
    /// Create an inactive log with `num_values` caller columns per row
    pub fn new(num_values: usize) -> Self {
        Self {
            num_values,
            active: false,
            skip_counter: 0,
            sample_div: 1,
            sampled: 0,
            capacity: 0,
            start_time: 0,
            data: Vec::new(),
        }
    }

    /// Start logging for `duration_ms`, keeping one of every `sample_div`
    /// rows of a loop that runs every `loop_ms`. Discards earlier data.
    pub fn start(
        &mut self,
        time_now: u32,
        duration_ms: u32,
        sample_div: u32,
        loop_ms: u32,
    ) -> Result<()> {
        if sample_div == 0 || loop_ms == 0 {
            return Err(DriveError::InvalidArgument("sample divider and loop time must be positive"));
        }
        if self.cols() > MAX_LOG_VALUES {
            return Err(DriveError::InvalidArgument("too many log columns"));
        }

        let rows = duration_ms as usize / (loop_ms as usize * sample_div as usize);
        self.capacity = rows.min(MAX_LOG_LEN);
        self.data = Vec::with_capacity(self.capacity * self.cols());
        self.sample_div = sample_div;
        self.skip_counter = 0;
        self.sampled = 0;
        self.start_time = time_now;
        self.active = true;
        Ok(())
    }

    pub fn stop(&mut self) {
        self.active = false;
    }

    pub fn is_active(&self) -> bool {
        self.active
    }

    /// Append one row of `values` if the log is active and this row is sampled
    pub fn update(&mut self, time_now: u32, values: &[i32]) -> Result<()> {
        if !self.active {
            return Ok(());
        }
        if values.len() != self.num_values {
            return Err(DriveError::InvalidArgument("log row has wrong width"));
        }

        let sample = self.skip_counter == 0;
        self.skip_counter = (self.skip_counter + 1) % self.sample_div;
        if !sample {
            return Ok(());
        }

        if self.rows() >= self.capacity {
            self.stop();
            return Ok(());
        }

        let elapsed_ms = time_now.wrapping_sub(self.start_time) / 1000;
        self.data.push(elapsed_ms as i32);
        self.data.extend_from_slice(values);
        self.sampled += 1;
        Ok(())
    }

    /// Row at `index`; negative indices count from the end
    pub fn read(&self, index: i32) -> Result<&[i32]> {
        let rows = self.rows() as i64;
        let index = if index < 0 {
            rows + index as i64
        } else {
            index as i64
        };
        if index < 0 || index >= rows {
            return Err(DriveError::InvalidArgument("log index out of range"));
        }
        let start = index as usize * self.cols();
        Ok(&self.data[start..start + self.cols()])
    }

    pub fn rows(&self) -> usize {
        self.sampled as usize
    }

    pub fn cols(&self) -> usize {
        self.num_values + NUM_DEFAULT_LOG_VALUES
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }
}
