//! Profile configuration: expected sample rates and per-sensor anomaly profiles.
//!
//! Profiles are owned by the operator side and may change between two
//! classifications. The detector only reads them, through [`ProfileStore`],
//! and does so on every sample so that edits take effect immediately.

use alloc::collections::BTreeMap;
use alloc::sync::Arc;
use core::cell::RefCell;

use embassy_sync::blocking_mutex::Mutex;
use embassy_sync::blocking_mutex::raw::CriticalSectionRawMutex;
use serde::{Deserialize, Serialize};
use thiserror_no_std::Error;

use crate::sample::SensorProfile;

/// Seconds in one day, the unit the expected rate is expressed against
pub const SECS_PER_DAY: u32 = 86_400;

/// Sensor profiles known out of the box (the gas/climate sensor quantities)
pub const BUILTIN_SENSORS: [&str; 6] = [
    "breath_voc",
    "co2e",
    "humidity",
    "iaq",
    "pressure",
    "temp",
];

#[derive(Error, Debug, Clone, PartialEq)]
pub enum ConfigError {
    #[error("no anomaly profile configured for sensor `{0}`")]
    UnknownSensor(SensorProfile),
    #[error("expected sample rate for `{0}` must be greater than zero")]
    ZeroRate(SensorProfile),
    #[error("window span for `{0}` must be greater than zero")]
    ZeroWindowSpan(SensorProfile),
    #[error("manual limits for `{sensor}` must be finite numbers")]
    NonFiniteLimit { sensor: SensorProfile },
    #[error("manual lower limit {lower} exceeds upper limit {upper} for `{sensor}`")]
    InvertedLimits {
        sensor: SensorProfile,
        lower: f64,
        upper: f64,
    },
    #[error("expected sample rate of the deployment must be greater than zero")]
    ZeroDeploymentRate,
}

/// Expected sample frequency, used only to size the calibration window.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct FrequencyProfile {
    /// Samples per day
    pub samples_per_day: u32,
}

impl FrequencyProfile {
    pub const fn new(samples_per_day: u32) -> Self {
        Self { samples_per_day }
    }
}

const fn default_window_span_secs() -> u32 {
    SECS_PER_DAY
}

/// Anomaly settings of one sensor profile.
///
/// When both manual limits are set the profile is in manual mode and the
/// limits are used as bounds directly; otherwise bounds come from the window
/// statistics (auto mode).
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct AnomalyProfile {
    /// How far back window entries count, in seconds
    #[serde(default = "default_window_span_secs")]
    pub window_span_secs: u32,
    #[serde(default)]
    pub lower_limit: Option<f64>,
    #[serde(default)]
    pub upper_limit: Option<f64>,
}

impl Default for AnomalyProfile {
    fn default() -> Self {
        Self::auto(default_window_span_secs())
    }
}

impl AnomalyProfile {
    /// Auto mode profile with the given window span
    pub const fn auto(window_span_secs: u32) -> Self {
        Self {
            window_span_secs,
            lower_limit: None,
            upper_limit: None,
        }
    }

    /// Manual mode profile with fixed limits
    pub const fn manual(window_span_secs: u32, lower: f64, upper: f64) -> Self {
        Self {
            window_span_secs,
            lower_limit: Some(lower),
            upper_limit: Some(upper),
        }
    }

    /// Both limits, if the profile is in manual mode
    pub fn manual_limits(&self) -> Option<(f64, f64)> {
        match (self.lower_limit, self.upper_limit) {
            (Some(lower), Some(upper)) => Some((lower, upper)),
            _ => None,
        }
    }

    /// Window span in milliseconds, matching sample timestamps
    pub fn window_span_ms(&self) -> u64 {
        u64::from(self.window_span_secs) * 1000
    }

    pub fn validate(&self, sensor: &SensorProfile) -> Result<(), ConfigError> {
        if self.window_span_secs == 0 {
            return Err(ConfigError::ZeroWindowSpan(sensor.clone()));
        }

        for limit in [self.lower_limit, self.upper_limit].into_iter().flatten() {
            if !limit.is_finite() {
                return Err(ConfigError::NonFiniteLimit {
                    sensor: sensor.clone(),
                });
            }
        }

        if let Some((lower, upper)) = self.manual_limits() {
            if lower > upper {
                return Err(ConfigError::InvertedLimits {
                    sensor: sensor.clone(),
                    lower,
                    upper,
                });
            }
        }

        Ok(())
    }
}

/// Read-only access to the current profiles.
pub trait ProfileStore {
    /// Expected rate for `sensor`
    fn frequency_profile(&self, sensor: &SensorProfile) -> Result<FrequencyProfile, ConfigError>;

    /// Anomaly profile for `sensor`, or [`ConfigError::UnknownSensor`]
    fn anomaly_profile(&self, sensor: &SensorProfile) -> Result<AnomalyProfile, ConfigError>;
}

impl<T: ProfileStore + ?Sized> ProfileStore for &T {
    fn frequency_profile(&self, sensor: &SensorProfile) -> Result<FrequencyProfile, ConfigError> {
        (**self).frequency_profile(sensor)
    }

    fn anomaly_profile(&self, sensor: &SensorProfile) -> Result<AnomalyProfile, ConfigError> {
        (**self).anomaly_profile(sensor)
    }
}

impl<T: ProfileStore + ?Sized> ProfileStore for Arc<T> {
    fn frequency_profile(&self, sensor: &SensorProfile) -> Result<FrequencyProfile, ConfigError> {
        (**self).frequency_profile(sensor)
    }

    fn anomaly_profile(&self, sensor: &SensorProfile) -> Result<AnomalyProfile, ConfigError> {
        (**self).anomaly_profile(sensor)
    }
}

/// A complete profile configuration for one deployment.
///
/// ```toml
/// [frequency]
/// samples_per_day = 60
///
/// [sensors.temp]
/// window_span_secs = 86400
///
/// [sensors.humidity]
/// lower_limit = 30.0
/// upper_limit = 60.0
///
/// [rates.co2e]
/// samples_per_day = 1440
/// ```
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ProfileSet {
    /// Deployment-wide expected rate
    pub frequency: FrequencyProfile,
    /// Anomaly profile per sensor
    #[serde(default)]
    pub sensors: BTreeMap<SensorProfile, AnomalyProfile>,
    /// Per-sensor overrides of the deployment rate
    #[serde(default)]
    pub rates: BTreeMap<SensorProfile, FrequencyProfile>,
}

impl ProfileSet {
    /// An empty profile set; every sensor is unknown until added.
    pub fn new(frequency: FrequencyProfile) -> Self {
        Self {
            frequency,
            sensors: BTreeMap::new(),
            rates: BTreeMap::new(),
        }
    }

    /// All [`BUILTIN_SENSORS`] in auto mode with a one day window.
    pub fn builtin(samples_per_day: u32) -> Self {
        let mut set = Self::new(FrequencyProfile::new(samples_per_day));
        for name in BUILTIN_SENSORS {
            if let Ok(sensor) = SensorProfile::new(name) {
                set.sensors.insert(sensor, AnomalyProfile::default());
            }
        }
        set
    }

    pub fn with_sensor(mut self, sensor: SensorProfile, profile: AnomalyProfile) -> Self {
        self.sensors.insert(sensor, profile);
        self
    }

    pub fn with_rate(mut self, sensor: SensorProfile, rate: FrequencyProfile) -> Self {
        self.rates.insert(sensor, rate);
        self
    }

    /// Check every profile; called when a configuration is loaded.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.frequency.samples_per_day == 0 {
            return Err(ConfigError::ZeroDeploymentRate);
        }

        for (sensor, rate) in &self.rates {
            if rate.samples_per_day == 0 {
                return Err(ConfigError::ZeroRate(sensor.clone()));
            }
        }

        for (sensor, profile) in &self.sensors {
            profile.validate(sensor)?;
        }

        Ok(())
    }
}

impl ProfileStore for ProfileSet {
    fn frequency_profile(&self, sensor: &SensorProfile) -> Result<FrequencyProfile, ConfigError> {
        Ok(self.rates.get(sensor).copied().unwrap_or(self.frequency))
    }

    fn anomaly_profile(&self, sensor: &SensorProfile) -> Result<AnomalyProfile, ConfigError> {
        self.sensors
            .get(sensor)
            .copied()
            .ok_or_else(|| ConfigError::UnknownSensor(sensor.clone()))
    }
}

/// Hot-reloadable profiles shared between the operator side and the detector.
pub struct SharedProfiles {
    inner: Mutex<CriticalSectionRawMutex, RefCell<ProfileSet>>,
}

impl SharedProfiles {
    pub fn new(profiles: ProfileSet) -> Result<Self, ConfigError> {
        profiles.validate()?;
        Ok(Self {
            inner: Mutex::new(RefCell::new(profiles)),
        })
    }

    /// Swap in a new configuration. An invalid one is rejected and the
    /// current profiles stay active.
    pub fn replace(&self, profiles: ProfileSet) -> Result<(), ConfigError> {
        profiles.validate()?;
        self.inner.lock(|cell| *cell.borrow_mut() = profiles);
        Ok(())
    }

    /// Set or replace the profile of a single sensor.
    pub fn set_sensor(
        &self,
        sensor: SensorProfile,
        profile: AnomalyProfile,
    ) -> Result<(), ConfigError> {
        profile.validate(&sensor)?;
        self.inner.lock(|cell| {
            cell.borrow_mut().sensors.insert(sensor, profile);
        });
        Ok(())
    }

    /// Copy of the current configuration
    pub fn snapshot(&self) -> ProfileSet {
        self.inner.lock(|cell| cell.borrow().clone())
    }
}

impl ProfileStore for SharedProfiles {
    fn frequency_profile(&self, sensor: &SensorProfile) -> Result<FrequencyProfile, ConfigError> {
        self.inner.lock(|cell| cell.borrow().frequency_profile(sensor))
    }

    fn anomaly_profile(&self, sensor: &SensorProfile) -> Result<AnomalyProfile, ConfigError> {
        self.inner.lock(|cell| cell.borrow().anomaly_profile(sensor))
    }
}
