//! Calibration gate: decides when an entity has enough history for statistics.

use crate::profile::{AnomalyProfile, ConfigError, FrequencyProfile, SECS_PER_DAY};
use crate::sample::SensorProfile;

/// Number of window entries required before bounds may be computed.
///
/// The threshold is `window span in days × expected samples per day`,
/// rounded up for spans that are not whole days.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CalibrationGate {
    threshold: usize,
}

impl CalibrationGate {
    /// Build the gate for one sensor's profiles.
    ///
    /// A zero rate or zero span is a configuration error; it never degrades
    /// into an always-calibrated gate.
    pub fn new(
        sensor: &SensorProfile,
        frequency: &FrequencyProfile,
        profile: &AnomalyProfile,
    ) -> Result<Self, ConfigError> {
        if frequency.samples_per_day == 0 {
            return Err(ConfigError::ZeroRate(sensor.clone()));
        }
        if profile.window_span_secs == 0 {
            return Err(ConfigError::ZeroWindowSpan(sensor.clone()));
        }

        let samples = u64::from(profile.window_span_secs) * u64::from(frequency.samples_per_day);
        let threshold = samples.div_ceil(u64::from(SECS_PER_DAY));

        Ok(Self {
            threshold: usize::try_from(threshold).unwrap_or(usize::MAX),
        })
    }

    /// Required window size
    pub const fn threshold(&self) -> usize {
        self.threshold
    }

    pub const fn is_calibrated(&self, window_size: usize) -> bool {
        window_size >= self.threshold
    }

    /// Whether a sample arriving after `history` window values is past
    /// calibration.
    ///
    /// The arriving sample counts toward the window size, so the Nth sample
    /// of a fresh entity is the first one classified. At least one prior
    /// value is always required for statistics.
    pub const fn admits(&self, history: usize) -> bool {
        history > 0 && self.is_calibrated(history + 1)
    }

    /// Number of prior values [`admits`](Self::admits) waits for
    pub const fn required_history(&self) -> usize {
        if self.threshold > 1 { self.threshold - 1 } else { 1 }
    }
}
