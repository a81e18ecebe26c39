//! Slice crossing detection

use super::{normalize_angle, slice_of, SchedulerConfig};
use crate::error::Result;

/// Counters kept by the scheduler
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct SchedulerStats {
    /// Crossing events returned from [`SliceScheduler::poll`]
    pub emitted: u32,
    /// Slices passed over between two consecutive samples
    pub skipped: u32,
    /// Readings discarded as noise (non-finite angle, time regression,
    /// backward step or implausible speed)
    pub rejected: u32,
}

/// Turns angle samples into one event per slice crossing
///
/// The scheduler only moves forward. A sample that lands behind the last
/// emitted slice is treated as sensor jitter around a boundary and dropped,
/// so the angle must advance a full slice width from the start of the last
/// accepted slice before the next event fires.
#[derive(Debug, Clone)]
pub struct SliceScheduler {
    config: SchedulerConfig,
    slices: u16,
    last_emitted: Option<u16>,
    last_time_ms: Option<u32>,
    stats: SchedulerStats,
}

impl SliceScheduler {
    /// Create a scheduler; fails if the slice width does not divide 360
    pub fn new(config: SchedulerConfig) -> Result<Self> {
        config.validate()?;
        Ok(Self {
            config,
            slices: config.slices_per_rev(),
            last_emitted: None,
            last_time_ms: None,
            stats: SchedulerStats::default(),
        })
    }

    /// Active configuration
    pub fn config(&self) -> &SchedulerConfig {
        &self.config
    }

    /// Number of slices per revolution
    pub fn slices_per_rev(&self) -> u16 {
        self.slices
    }

    /// Slice containing `theta_deg`
    pub fn current_slice(&self, theta_deg: f32) -> u16 {
        slice_of(theta_deg, self.config.slice_degrees)
    }

    /// Last slice returned by [`poll`](Self::poll)
    pub fn last_emitted(&self) -> Option<u16> {
        self.last_emitted
    }

    /// Counters since creation
    pub fn stats(&self) -> SchedulerStats {
        self.stats
    }

    /// Forget the last crossing; the next sample emits unconditionally
    pub fn reset(&mut self) {
        self.last_emitted = None;
        self.last_time_ms = None;
    }

    /// Feed one sample and return the slice that just began, if any
    pub fn poll(&mut self, t_ms: u32, theta_deg: f32) -> Option<u16> {
        if normalize_angle(theta_deg).is_none() {
            self.stats.rejected += 1;
            return None;
        }
        let slice = self.current_slice(theta_deg);

        let Some(last) = self.last_emitted else {
            return Some(self.emit(t_ms, slice, 1));
        };
        if slice == last {
            return None;
        }

        // Millisecond counters wrap, so compare by distance
        let elapsed = match self.last_time_ms {
            Some(prev) => {
                let dt = t_ms.wrapping_sub(prev);
                if dt > u32::MAX / 2 {
                    log::trace!("Time went backwards ({} < {})", t_ms, prev);
                    self.stats.rejected += 1;
                    return None;
                }
                dt
            }
            None => 0,
        };

        let step = (slice + self.slices - last) % self.slices;
        if step > self.slices / 2 {
            self.stats.rejected += 1;
            return None;
        }

        if !self.plausible(step, elapsed) {
            log::debug!(
                "Rejecting jump of {} slices in {} ms",
                step,
                elapsed
            );
            self.stats.rejected += 1;
            return None;
        }

        Some(self.emit(t_ms, slice, step))
    }

    fn emit(&mut self, t_ms: u32, slice: u16, step: u16) -> u16 {
        self.stats.emitted += 1;
        self.stats.skipped += u32::from(step - 1);
        self.last_emitted = Some(slice);
        self.last_time_ms = Some(t_ms);
        slice
    }

    /// The sample sits at least `step - 1` whole slices past the end of the
    /// last one; check that distance was reachable in `elapsed_ms` (plus one
    /// millisecond of timer quantization).
    fn plausible(&self, step: u16, elapsed_ms: u32) -> bool {
        let Some(max_rpm) = self.config.max_rpm else {
            return true;
        };
        let min_travel_deg = (step as u64 - 1) * self.config.slice_degrees as u64;
        // rpm * 360 deg / 60_000 ms, kept in integers scaled by 1000
        let reach_mdeg = max_rpm as u64 * 6 * (elapsed_ms as u64 + 1);
        min_travel_deg * 1000 <= reach_mdeg
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::Error;
    use std::vec::Vec;

    fn scheduler() -> SliceScheduler {
        SliceScheduler::new(SchedulerConfig::default()).unwrap()
    }

    #[test]
    fn test_rejects_bad_config() {
        let config = SchedulerConfig {
            slice_degrees: 7,
            max_rpm: None,
        };
        assert_eq!(SliceScheduler::new(config).unwrap_err(), Error::InvalidSchedule);
    }

    #[test]
    fn test_first_sample_emits() {
        let mut sched = scheduler();
        assert_eq!(sched.poll(0, 45.0), Some(15));
        assert_eq!(sched.poll(1, 45.5), None);
        assert_eq!(sched.last_emitted(), Some(15));
    }

    #[test]
    fn test_full_sweep_emits_each_slice_once() {
        let mut sched = scheduler();
        let mut events = Vec::new();
        // 0.25 degree per ms, polled four times per degree
        for i in 0..1440u32 {
            if let Some(slice) = sched.poll(i, i as f32 * 0.25) {
                events.push(slice);
            }
        }
        assert_eq!(events.len(), 120);
        for (i, slice) in events.iter().enumerate() {
            assert_eq!(*slice as usize, i);
        }
        assert_eq!(sched.stats().skipped, 0);
    }

    #[test]
    fn test_wraps_into_next_revolution() {
        let mut sched = scheduler();
        assert_eq!(sched.poll(0, 357.5), Some(119));
        assert_eq!(sched.poll(1, 359.9), None);
        assert_eq!(sched.poll(2, 360.4), Some(0));
        assert_eq!(sched.poll(3, 3.1), Some(1));
    }

    #[test]
    fn test_boundary_jitter_emits_once() {
        let mut sched = scheduler();
        assert_eq!(sched.poll(0, 8.0), Some(2));
        let mut crossings = 0;
        for (t, theta) in [8.99f32, 9.01, 8.98, 9.02, 8.99, 9.0, 8.97, 9.03]
            .iter()
            .enumerate()
        {
            if sched.poll(t as u32 + 1, *theta).is_some() {
                crossings += 1;
            }
        }
        assert_eq!(crossings, 1);
        assert_eq!(sched.last_emitted(), Some(3));
    }

    #[test]
    fn test_time_regression_suppresses() {
        let mut sched = scheduler();
        assert_eq!(sched.poll(100, 0.0), Some(0));
        assert_eq!(sched.poll(90, 4.0), None);
        assert_eq!(sched.stats().rejected, 1);
        // Time has caught up again
        assert_eq!(sched.poll(101, 4.0), Some(1));
    }

    #[test]
    fn test_time_counter_wraparound() {
        let mut sched = scheduler();
        assert_eq!(sched.poll(u32::MAX - 1, 0.0), Some(0));
        assert_eq!(sched.poll(3, 4.0), Some(1));
    }

    #[test]
    fn test_implausible_jump_rejected() {
        let mut sched = scheduler();
        assert_eq!(sched.poll(0, 0.0), Some(0));
        // 150 degrees in 1 ms is 25000 rpm
        assert_eq!(sched.poll(1, 150.0), None);
        assert_eq!(sched.stats().rejected, 1);
        // The same angle 50 ms later is reachable at 3000 rpm
        assert_eq!(sched.poll(50, 150.0), Some(50));
        assert_eq!(sched.stats().skipped, 49);
    }

    #[test]
    fn test_unbounded_rpm_accepts_jumps() {
        let mut sched = SliceScheduler::new(SchedulerConfig {
            max_rpm: None,
            ..Default::default()
        })
        .unwrap();
        assert_eq!(sched.poll(0, 0.0), Some(0));
        assert_eq!(sched.poll(0, 150.0), Some(50));
    }

    #[test]
    fn test_non_finite_ignored() {
        let mut sched = scheduler();
        assert_eq!(sched.poll(0, f32::NAN), None);
        assert_eq!(sched.poll(1, f32::NEG_INFINITY), None);
        assert_eq!(sched.last_emitted(), None);
        assert_eq!(sched.stats().rejected, 2);
        assert_eq!(sched.poll(2, 10.0), Some(3));
    }

    #[test]
    fn test_reset() {
        let mut sched = scheduler();
        sched.poll(0, 30.0);
        sched.reset();
        assert_eq!(sched.last_emitted(), None);
        assert_eq!(sched.poll(1, 30.0), Some(10));
    }
}
