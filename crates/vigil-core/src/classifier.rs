//! The online classifier.
//!
//! For each sample the [`Detector`] resolves the sensor's profiles, builds
//! the calibration gate, and either records the sample as calibrating or
//! derives bounds (manual limits or window statistics) and decides whether
//! the value is anomalous. Every outcome is recorded in the window store and
//! published to the result sink before it is returned.

use alloc::collections::BTreeSet;
use core::fmt;

use log::{debug, error, info, warn};
use serde::{Deserialize, Serialize};

use crate::bounds::{Bounds, BoundsPolicy, NumericDomainError};
use crate::calibration::CalibrationGate;
use crate::error::DetectError;
use crate::profile::ProfileStore;
use crate::sample::{EntityKey, Sample, Timestamp, Unit};
use crate::sink::ResultSink;
use crate::window::WindowStore;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Classification {
    /// Not enough history yet; no verdict
    Calibrating,
    Normal,
    Anomalous,
}

/// Outcome of one classification, as delivered to sinks.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ClassificationResult {
    pub key: EntityKey,
    pub timestamp: Timestamp,
    pub value: f64,
    pub unit: Unit,
    pub classification: Classification,
    /// Bounds the value was judged against; `None` while calibrating
    pub bounds: Option<Bounds>,
}

impl ClassificationResult {
    fn from_sample(
        sample: &Sample,
        classification: Classification,
        bounds: Option<Bounds>,
    ) -> Self {
        Self {
            key: sample.key().clone(),
            timestamp: sample.timestamp(),
            value: sample.value(),
            unit: sample.unit().clone(),
            classification,
            bounds,
        }
    }

    pub fn is_anomalous(&self) -> bool {
        self.classification == Classification::Anomalous
    }

    /// Human-readable notice for this result
    pub fn notice(&self) -> Notice<'_> {
        Notice(self)
    }
}

/// Display adapter produced by [`ClassificationResult::notice`].
pub struct Notice<'a>(&'a ClassificationResult);

impl fmt::Display for Notice<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let r = self.0;
        match r.classification {
            Classification::Anomalous => write!(
                f,
                "check out your property: detected an anomalous {} of {:.3} {} at {}",
                r.key.sensor, r.value, r.unit, r.timestamp
            ),
            Classification::Normal => write!(
                f,
                "all is well at your property: {} was {:.3} {} just now",
                r.key.sensor, r.value, r.unit
            ),
            Classification::Calibrating => {
                write!(f, "calibrating {} on {}...", r.key.sensor, r.key.device)
            }
        }
    }
}

/// What to do when the relative-exponential policy meets a zero window mean.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ZeroMeanPolicy {
    /// Reject the sample with [`NumericDomainError::ZeroMean`]
    #[default]
    Reject,
    /// Use linear bounds for that sample instead
    FallBackToLinear,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct DetectorConfig {
    #[serde(default)]
    pub policy: BoundsPolicy,
    #[serde(default)]
    pub zero_mean: ZeroMeanPolicy,
}

/// Calibration progress of an entity
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Phase {
    /// `have` of the `need` prior window values are present
    Calibrating { have: usize, need: usize },
    /// The next sample will be classified
    Ready,
}

/// Online anomaly detector.
///
/// Generic over where window history lives (`W`), where profiles come from
/// (`P`) and where results go (`S`).
pub struct Detector<W, P, S> {
    store: W,
    profiles: P,
    sink: S,
    config: DetectorConfig,
    /// Entities whose last sample was past calibration, for transition logs
    ready: BTreeSet<EntityKey>,
}

impl<W, P, S> Detector<W, P, S>
where
    W: WindowStore,
    P: ProfileStore,
    S: ResultSink,
{
    pub fn new(store: W, profiles: P, sink: S) -> Self {
        Self {
            store,
            profiles,
            sink,
            config: DetectorConfig::default(),
            ready: BTreeSet::new(),
        }
    }

    pub fn with_config(mut self, config: DetectorConfig) -> Self {
        self.config = config;
        self
    }

    pub fn config(&self) -> DetectorConfig {
        self.config
    }

    pub fn set_config(&mut self, config: DetectorConfig) {
        self.config = config;
    }

    pub fn store(&self) -> &W {
        &self.store
    }

    pub fn store_mut(&mut self) -> &mut W {
        &mut self.store
    }

    pub fn profiles(&self) -> &P {
        &self.profiles
    }

    pub fn sink(&self) -> &S {
        &self.sink
    }

    /// Classify one sample, record it and publish the result.
    ///
    /// On error nothing is recorded or published.
    pub fn classify(&mut self, sample: &Sample) -> Result<ClassificationResult, DetectError> {
        match self.evaluate(sample) {
            Ok(result) => {
                match result.classification {
                    Classification::Anomalous => warn!("{}", result.notice()),
                    _ => info!("{}", result.notice()),
                }
                self.sink.publish(&result);
                Ok(result)
            }
            Err(e @ DetectError::StoreUnavailable(_)) => {
                error!(
                    "Could not classify sample of {} at {}: {}",
                    sample.key(),
                    sample.timestamp(),
                    e
                );
                Err(e)
            }
            Err(e) => {
                warn!(
                    "Rejected sample of {} at {}: {}",
                    sample.key(),
                    sample.timestamp(),
                    e
                );
                Err(e)
            }
        }
    }

    fn evaluate(&mut self, sample: &Sample) -> Result<ClassificationResult, DetectError> {
        let key = sample.key();
        let profile = self.profiles.anomaly_profile(&key.sensor)?;
        let frequency = self.profiles.frequency_profile(&key.sensor)?;
        profile.validate(&key.sensor)?;
        let gate = CalibrationGate::new(&key.sensor, &frequency, &profile)?;

        let bounds = match profile.manual_limits() {
            Some((lower, upper)) => Bounds::new(lower, upper),
            None => {
                let floor = sample.timestamp().saturating_sub(profile.window_span_ms());
                let window = self.store.window(key, floor, sample.timestamp())?;
                debug!(
                    "Window of {} since {}: {} values",
                    key,
                    floor,
                    window.len()
                );

                if !gate.admits(window.len()) {
                    self.store.record(sample, Classification::Calibrating, gate.threshold())?;
                    if self.ready.remove(key) {
                        info!("{} fell back to calibrating", key);
                    }
                    info!(
                        "Calibrating {}: {}/{} values",
                        key,
                        window.len() + 1,
                        gate.threshold()
                    );
                    return Ok(ClassificationResult::from_sample(
                        sample,
                        Classification::Calibrating,
                        None,
                    ));
                }

                let bounds = self.auto_bounds(&window)?;
                if !self.ready.contains(key) {
                    info!(
                        "{} calibrated with {} values ({} bounds)",
                        key,
                        window.len(),
                        self.config.policy.label()
                    );
                }
                bounds
            }
        };

        let classification = if bounds.is_violated_by(sample.value()) {
            Classification::Anomalous
        } else {
            Classification::Normal
        };

        self.store.record(sample, classification, gate.threshold())?;
        if profile.manual_limits().is_none() {
            self.ready.insert(key.clone());
        }

        Ok(ClassificationResult::from_sample(
            sample,
            classification,
            Some(bounds),
        ))
    }

    fn auto_bounds(&self, window: &[f64]) -> Result<Bounds, NumericDomainError> {
        match self.config.policy.compute(window) {
            Err(NumericDomainError::ZeroMean)
                if self.config.zero_mean == ZeroMeanPolicy::FallBackToLinear =>
            {
                debug!("Zero window mean, falling back to linear bounds");
                BoundsPolicy::Linear.compute(window)
            }
            other => other,
        }
    }

    /// Calibration progress of `key` for a sample arriving at `now`.
    ///
    /// A sensor with manual limits is always ready, since its samples are
    /// classified without a window.
    pub fn phase(&self, key: &EntityKey, now: Timestamp) -> Result<Phase, DetectError> {
        let profile = self.profiles.anomaly_profile(&key.sensor)?;
        let frequency = self.profiles.frequency_profile(&key.sensor)?;
        let gate = CalibrationGate::new(&key.sensor, &frequency, &profile)?;
        if profile.manual_limits().is_some() {
            return Ok(Phase::Ready);
        }

        let floor = now.saturating_sub(profile.window_span_ms());
        let have = self.store.window(key, floor, now)?.len();

        if gate.admits(have) {
            Ok(Phase::Ready)
        } else {
            Ok(Phase::Calibrating {
                have,
                need: gate.required_history(),
            })
        }
    }

    /// Forget the history of `key`; it calibrates from scratch.
    pub fn reset(&mut self, key: &EntityKey) -> Result<(), DetectError> {
        self.store.clear(key)?;
        self.ready.remove(key);
        info!("Reset {}", key);
        Ok(())
    }
}
