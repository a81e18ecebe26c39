//! Rotation angle to slice conversion
//!
//! A revolution is split into `360 / slice_degrees` equal buckets. The pure
//! mapping lives here; [`SliceScheduler`] turns a stream of readings into
//! one event per boundary crossing.

mod scheduler;

pub use scheduler::{SchedulerStats, SliceScheduler};

use crate::error::{Error, Result};

/// Default slice width in degrees (120 slices per revolution)
pub const DEFAULT_SLICE_DEGREES: u16 = 3;

/// Default upper bound on plausible rotation speed
pub const DEFAULT_MAX_RPM: u32 = 3000;

/// Slice layout and noise rejection settings
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SchedulerConfig {
    /// Width of one slice; must divide 360
    pub slice_degrees: u16,
    /// Readings implying a faster rotation than this are discarded
    pub max_rpm: Option<u32>,
}

impl Default for SchedulerConfig {
    fn default() -> Self {
        Self {
            slice_degrees: DEFAULT_SLICE_DEGREES,
            max_rpm: Some(DEFAULT_MAX_RPM),
        }
    }
}

impl SchedulerConfig {
    /// Check the slice width and speed bound are usable
    pub fn validate(&self) -> Result<()> {
        if !(1..=180).contains(&self.slice_degrees) || 360 % self.slice_degrees != 0 {
            return Err(Error::InvalidSchedule);
        }
        if self.max_rpm == Some(0) {
            return Err(Error::InvalidSchedule);
        }
        Ok(())
    }

    /// Number of slices in one revolution
    pub fn slices_per_rev(&self) -> u16 {
        360 / self.slice_degrees
    }
}

/// Fold any finite angle into `[0, 360)`
///
/// Returns `None` for NaN and infinities.
pub fn normalize_angle(theta_deg: f32) -> Option<f32> {
    if !theta_deg.is_finite() {
        return None;
    }
    let mut angle = theta_deg % 360.0;
    if angle < 0.0 {
        angle += 360.0;
    }
    // -1e-9 + 360.0 rounds up to 360.0
    if angle >= 360.0 {
        angle = 0.0;
    }
    Some(angle)
}

/// Slice containing `theta_deg` for slices `slice_degrees` wide
///
/// Non-finite angles map to slice 0.
pub fn slice_of(theta_deg: f32, slice_degrees: u16) -> u16 {
    let slices = 360 / slice_degrees.max(1);
    match normalize_angle(theta_deg) {
        // Truncation is floor for non-negative values
        Some(angle) => ((angle / slice_degrees as f32) as u16).min(slices - 1),
        None => 0,
    }
}
