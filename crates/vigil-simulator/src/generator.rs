//! Synthetic sensor readings.
//!
//! Each catalogue sensor has a Gaussian "room" model and a uniform anomaly
//! range. Readings are stamped by a simulated clock that advances one nominal
//! sample period per reading, so a day of telemetry replays in seconds.

use rand::Rng;
use rand_distr::{Normal, NormalError};
use vigil_core::profile::SECS_PER_DAY;
use vigil_core::{RawReading, Timestamp};

/// Generation model of one sensor type.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct SensorModel {
    pub sensor: &'static str,
    pub unit: &'static str,
    pub mean: f64,
    pub stddev: f64,
    /// Inclusive range injected anomalies are drawn from
    pub anomaly: (f64, f64),
}

pub const MODELS: [SensorModel; 6] = [
    SensorModel {
        sensor: "breath_voc",
        unit: "ppm",
        mean: 0.70,
        stddev: 0.01,
        anomaly: (0.80, 0.90),
    },
    SensorModel {
        sensor: "co2e",
        unit: "ppm",
        mean: 590.0,
        stddev: 6.0,
        anomaly: (609.0, 611.0),
    },
    SensorModel {
        sensor: "humidity",
        unit: "%",
        mean: 55.0,
        stddev: 0.5,
        anomaly: (25.0, 30.0),
    },
    SensorModel {
        sensor: "iaq",
        unit: "IAQ",
        mean: 80.0,
        stddev: 4.0,
        anomaly: (150.0, 200.0),
    },
    SensorModel {
        sensor: "pressure",
        unit: "hPa",
        mean: 1005.0,
        stddev: 2.0,
        anomaly: (200.0, 700.0),
    },
    SensorModel {
        sensor: "temp",
        unit: "°C",
        mean: 30.0,
        stddev: 1.0,
        anomaly: (-25.0, 25.0),
    },
];

pub fn model(sensor: &str) -> Option<&'static SensorModel> {
    MODELS.iter().find(|m| m.sensor == sensor)
}

/// A generated reading and whether it was drawn from the anomaly range.
#[derive(Debug, Clone)]
pub struct Generated {
    pub reading: RawReading,
    pub injected: bool,
}

pub struct Generator<R> {
    model: &'static SensorModel,
    /// Room distribution, built once from the model
    room: Normal<f64>,
    device: String,
    unit: String,
    rng: R,
    clock: Timestamp,
    period_ms: u64,
    anomaly_ratio: f64,
}

impl<R: Rng> Generator<R> {
    pub fn new(
        model: &'static SensorModel,
        device: &str,
        rng: R,
        start: Timestamp,
        samples_per_day: u32,
        anomaly_ratio: f64,
    ) -> Result<Self, NormalError> {
        let room = Normal::new(model.mean, model.stddev)?;
        let period_ms =
            (u64::from(SECS_PER_DAY) * 1000 / u64::from(samples_per_day.max(1))).max(1);
        Ok(Self {
            model,
            room,
            device: device.to_string(),
            unit: model.unit.to_string(),
            rng,
            clock: start,
            period_ms,
            anomaly_ratio: anomaly_ratio.clamp(0.0, 1.0),
        })
    }

    /// Override the unit label attached to readings.
    pub fn with_unit(mut self, unit: &str) -> Self {
        self.unit = unit.to_string();
        self
    }

    /// Timestamp the next reading will carry
    pub fn clock(&self) -> Timestamp {
        self.clock
    }

    pub fn period_ms(&self) -> u64 {
        self.period_ms
    }

    /// Produce the next reading. Anomalies are only injected once
    /// `calibrated` is true.
    pub fn next_reading(&mut self, calibrated: bool) -> Generated {
        let injected = calibrated && self.rng.gen_bool(self.anomaly_ratio);
        let value = if injected {
            let (low, high) = self.model.anomaly;
            self.rng.gen_range(low..=high)
        } else {
            self.rng.sample(self.room)
        };

        let reading = RawReading {
            device: Some(self.device.clone()),
            sensor: Some(self.model.sensor.to_string()),
            timestamp: Some(self.clock),
            value: Some(value),
            unit: Some(self.unit.clone()),
        };
        self.clock += self.period_ms;

        Generated { reading, injected }
    }
}
