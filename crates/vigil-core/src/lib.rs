//! Hardware-independent core library for vigil
//!
//! This crate contains the platform-agnostic logic of the vigil telemetry
//! anomaly detector: the sample model, profile configuration, the calibration
//! gate, bounds policies, the classifier and both window store realizations.
//!
//! It is `#![no_std]` with `extern crate alloc` so it compiles on both
//! embedded targets and desktop hosts (for the simulator and tests).
//!
//! ## Deployment
//!
//! [`Detector::classify`](classifier::Detector::classify) reads the window and
//! then writes to it. The pair is not atomic, so two concurrent calls for the
//! same entity may both decide from the same window. Callers that classify
//! from more than one task must serialize per entity, either by partitioning
//! entities onto a single writer or by going through
//! [`SharedDetector`](sync::SharedDetector).

#![no_std]

extern crate alloc;

pub mod bounds;
pub mod calibration;
pub mod classifier;
pub mod error;
pub mod profile;
pub mod sample;
pub mod sink;
pub mod sync;
pub mod window;

pub use bounds::{Bounds, BoundsPolicy, NumericDomainError, WindowStats};
pub use calibration::CalibrationGate;
pub use classifier::{
    Classification, ClassificationResult, Detector, DetectorConfig, Phase, ZeroMeanPolicy,
};
pub use error::DetectError;
pub use profile::{
    AnomalyProfile, ConfigError, FrequencyProfile, ProfileSet, ProfileStore, SharedProfiles,
};
pub use sample::{
    DeviceId, EntityKey, InputError, RawReading, Sample, SensorProfile, Timestamp, Unit,
};
pub use sink::{ChannelSink, NullSink, ResultChannel, ResultSink};
pub use sync::SharedDetector;
pub use window::{JournalStore, ResidentWindow, StoreError, WindowStore};
