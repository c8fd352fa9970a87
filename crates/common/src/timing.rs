//! Timing utilities for capture pacing and export throughput metrics.

use std::collections::VecDeque;
use std::time::Duration;

/// Fixed-period sampling gate for the capture session.
///
/// The live source is sampled on a wall-clock period independent of
/// consumer speed; this controller decides when the next sample is due.
#[derive(Debug)]
pub struct RateController {
    target_interval_ns: u64,
    last_tick_ns: Option<u64>,
}

impl RateController {
    /// Create a controller targeting the given Hz rate.
    pub fn new(target_hz: u32) -> Self {
        Self {
            target_interval_ns: 1_000_000_000 / target_hz.max(1) as u64,
            last_tick_ns: None,
        }
    }

    /// Whether a full period has elapsed since the last accepted
    /// tick. Accepting a tick restarts the period, and the first call
    /// always fires so a session's initial frame is never delayed.
    pub fn should_tick(&mut self, current_ns: u64) -> bool {
        match self.last_tick_ns {
            None => {
                self.last_tick_ns = Some(current_ns);
                true
            }
            Some(last) if current_ns >= last + self.target_interval_ns => {
                self.last_tick_ns = Some(current_ns);
                true
            }
            _ => false,
        }
    }

    /// Target interval in nanoseconds.
    pub fn interval_ns(&self) -> u64 {
        self.target_interval_ns
    }

    /// Target interval as a Duration.
    pub fn interval(&self) -> Duration {
        Duration::from_nanos(self.target_interval_ns)
    }
}

/// Rolling window over the last N per-frame wall times.
///
/// Used for instantaneous throughput and remaining-time estimates
/// during export. A windowed average means one slow frame stops
/// skewing the estimate once it falls out of the window, unlike a
/// cumulative average.
#[derive(Debug)]
pub struct RollingWindow {
    samples: VecDeque<Duration>,
    capacity: usize,
}

impl RollingWindow {
    /// Create a window holding at most `capacity` samples.
    pub fn new(capacity: usize) -> Self {
        Self {
            samples: VecDeque::with_capacity(capacity.max(1)),
            capacity: capacity.max(1),
        }
    }

    /// Record one frame's wall time, evicting the oldest sample when full.
    pub fn push(&mut self, sample: Duration) {
        if self.samples.len() == self.capacity {
            self.samples.pop_front();
        }
        self.samples.push_back(sample);
    }

    /// Number of samples currently held.
    pub fn len(&self) -> usize {
        self.samples.len()
    }

    pub fn is_empty(&self) -> bool {
        self.samples.is_empty()
    }

    /// Mean wall time over the window.
    pub fn average(&self) -> Option<Duration> {
        if self.samples.is_empty() {
            return None;
        }
        let total: Duration = self.samples.iter().sum();
        Some(total / self.samples.len() as u32)
    }

    /// Instantaneous throughput in frames per second.
    pub fn fps(&self) -> Option<f64> {
        self.average().map(|avg| {
            let secs = avg.as_secs_f64();
            if secs > 0.0 {
                1.0 / secs
            } else {
                f64::INFINITY
            }
        })
    }

    /// Estimated wall time to process `remaining` more frames.
    pub fn eta(&self, remaining: u64) -> Option<Duration> {
        self.average().map(|avg| avg.mul_f64(remaining as f64))
    }
}
