//! Sample model: entity identifiers, validated samples and raw readings.

use alloc::string::String;
use core::fmt;

use serde::{Deserialize, Serialize};
use thiserror_no_std::Error;

/// Milliseconds since the Unix epoch, coarse to the sender's clock.
pub type Timestamp = u64;

/// Maximum length of a device identifier (an IMEI is 15 digits)
pub const MAX_DEVICE_ID_LEN: usize = 32;
/// Maximum length of a sensor profile name
pub const MAX_SENSOR_NAME_LEN: usize = 24;
/// Maximum length of a unit label
pub const MAX_UNIT_LEN: usize = 16;

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum InputError {
    #[error("{field} must not be blank")]
    Blank { field: &'static str },
    #[error("{field} exceeds {max} bytes")]
    TooLong { field: &'static str, max: usize },
    #[error("value must be a finite number")]
    NonFiniteValue,
    #[error("reading is missing field `{0}`")]
    MissingField(&'static str),
}

/// Copy `value` into a fixed-capacity string, rejecting oversized input.
fn bounded<const N: usize>(
    field: &'static str,
    value: &str,
) -> Result<heapless::String<N>, InputError> {
    let mut out = heapless::String::new();
    out.push_str(value)
        .map_err(|_| InputError::TooLong { field, max: N })?;
    Ok(out)
}

fn non_blank<const N: usize>(
    field: &'static str,
    value: &str,
) -> Result<heapless::String<N>, InputError> {
    let value = value.trim();
    if value.is_empty() {
        return Err(InputError::Blank { field });
    }
    bounded(field, value)
}

/// Identifier of the reporting device.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct DeviceId(heapless::String<MAX_DEVICE_ID_LEN>);

impl DeviceId {
    pub fn new(id: &str) -> Result<Self, InputError> {
        non_blank("device", id).map(Self)
    }

    pub fn as_str(&self) -> &str {
        self.0.as_str()
    }
}

/// The measured quantity, e.g. `temp` or `humidity`.
///
/// Selects the [`AnomalyProfile`](crate::profile::AnomalyProfile) used for
/// every sample of this quantity.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct SensorProfile(heapless::String<MAX_SENSOR_NAME_LEN>);

impl SensorProfile {
    pub fn new(name: &str) -> Result<Self, InputError> {
        non_blank("sensor", name).map(Self)
    }

    pub fn as_str(&self) -> &str {
        self.0.as_str()
    }
}

/// Unit label carried along for notices, e.g. `°C` or `%`. May be empty.
#[derive(Debug, Clone, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct Unit(heapless::String<MAX_UNIT_LEN>);

impl Unit {
    pub fn new(label: &str) -> Result<Self, InputError> {
        bounded("unit", label.trim()).map(Self)
    }

    pub fn as_str(&self) -> &str {
        self.0.as_str()
    }
}

macro_rules! string_conversions {
    ($($ty:ty),*) => {
        $(
            impl TryFrom<String> for $ty {
                type Error = InputError;

                fn try_from(value: String) -> Result<Self, Self::Error> {
                    Self::new(&value)
                }
            }

            impl From<$ty> for String {
                fn from(value: $ty) -> Self {
                    String::from(value.as_str())
                }
            }

            impl fmt::Display for $ty {
                fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                    f.write_str(self.as_str())
                }
            }
        )*
    };
}

string_conversions!(DeviceId, SensorProfile, Unit);

/// Scope of all detector state: one device measuring one quantity.
///
/// Windows, calibration and classification never mix two keys.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct EntityKey {
    pub device: DeviceId,
    pub sensor: SensorProfile,
}

impl EntityKey {
    pub fn new(device: &str, sensor: &str) -> Result<Self, InputError> {
        Ok(Self {
            device: DeviceId::new(device)?,
            sensor: SensorProfile::new(sensor)?,
        })
    }
}

impl fmt::Display for EntityKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{}", self.device, self.sensor)
    }
}

/// A validated telemetry sample. Immutable once created.
#[derive(Debug, Clone, PartialEq)]
pub struct Sample {
    key: EntityKey,
    timestamp: Timestamp,
    value: f64,
    unit: Unit,
}

impl Sample {
    pub fn new(
        key: EntityKey,
        timestamp: Timestamp,
        value: f64,
        unit: Unit,
    ) -> Result<Self, InputError> {
        if !value.is_finite() {
            return Err(InputError::NonFiniteValue);
        }

        Ok(Self {
            key,
            timestamp,
            value,
            unit,
        })
    }

    pub fn key(&self) -> &EntityKey {
        &self.key
    }

    pub fn timestamp(&self) -> Timestamp {
        self.timestamp
    }

    pub fn value(&self) -> f64 {
        self.value
    }

    pub fn unit(&self) -> &Unit {
        &self.unit
    }
}

/// A reading as delivered by the ingest side, before validation.
///
/// Every field is optional so that a partially written record can be
/// decoded and then rejected with the name of the missing field.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct RawReading {
    #[serde(default)]
    pub device: Option<String>,
    #[serde(default, alias = "type")]
    pub sensor: Option<String>,
    #[serde(default)]
    pub timestamp: Option<Timestamp>,
    #[serde(default)]
    pub value: Option<f64>,
    #[serde(default)]
    pub unit: Option<String>,
}

impl TryFrom<RawReading> for Sample {
    type Error = InputError;

    fn try_from(reading: RawReading) -> Result<Self, Self::Error> {
        let device = reading.device.ok_or(InputError::MissingField("device"))?;
        let sensor = reading.sensor.ok_or(InputError::MissingField("sensor"))?;
        let timestamp = reading
            .timestamp
            .ok_or(InputError::MissingField("timestamp"))?;
        let value = reading.value.ok_or(InputError::MissingField("value"))?;
        let unit = reading.unit.ok_or(InputError::MissingField("unit"))?;

        Sample::new(
            EntityKey::new(&device, &sensor)?,
            timestamp,
            value,
            Unit::new(&unit)?,
        )
    }
}
