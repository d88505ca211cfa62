use crate::error::{LogResult, SensorLogError};
use nalgebra::Vector3;
use serde::{Deserialize, Serialize};
use std::fmt;

/// Inertial sensor kinds the logger understands.
///
/// The discriminants are the Android `Sensor.TYPE_*` constants so the host can
/// pass `event.sensor.getType()` through unchanged.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum SensorKind {
    Accelerometer = 1,
    MagneticField = 2,
    Gyroscope = 4,
    Gravity = 9,
    LinearAcceleration = 10,
    GyroscopeUncalibrated = 16,
}

impl SensorKind {
    pub const ALL: [SensorKind; 6] = [
        SensorKind::Accelerometer,
        SensorKind::Gravity,
        SensorKind::LinearAcceleration,
        SensorKind::Gyroscope,
        SensorKind::GyroscopeUncalibrated,
        SensorKind::MagneticField,
    ];

    /// Look up a kind from an Android sensor type id
    pub fn from_android_type(sensor_type: i32) -> Option<Self> {
        Self::ALL
            .into_iter()
            .find(|kind| kind.android_type() == sensor_type)
    }

    pub fn android_type(self) -> i32 {
        self as i32
    }

    /// Number of values logged for this kind
    pub fn component_count(self) -> usize {
        match self {
            SensorKind::GyroscopeUncalibrated => 6,
            _ => 3,
        }
    }

    /// CSV tag written in front of the values
    pub fn tag(self) -> &'static str {
        match self {
            SensorKind::Accelerometer => "ACCELEROMETER",
            SensorKind::MagneticField => "MAGNETIC_FIELD",
            SensorKind::Gyroscope => "GYROSCOPE",
            SensorKind::Gravity => "GRAVITY",
            SensorKind::LinearAcceleration => "LINEAR_ACCELERATION",
            SensorKind::GyroscopeUncalibrated => "GYROSCOPE_UNCALIBRATED",
        }
    }
}

impl fmt::Display for SensorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.tag())
    }
}

/// One reading from an Android SensorEvent.
///
/// Only built through [`SensorSample::new`] or deserialization, so `values`
/// always holds exactly `kind.component_count()` components.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(try_from = "RawSensorSample")]
pub struct SensorSample {
    kind: SensorKind,
    values: Vec<f32>,
}

impl SensorSample {
    /// Build a sample, keeping only the components the kind defines.
    ///
    /// Android may hand over a longer `values` array than the sensor type
    /// documents; a shorter one is rejected.
    pub fn new(kind: SensorKind, values: &[f32]) -> LogResult<Self> {
        let expected = kind.component_count();
        if values.len() < expected {
            return Err(SensorLogError::InvalidSample(format!(
                "{} needs {} values, got {}",
                kind,
                expected,
                values.len()
            )));
        }

        Ok(Self {
            kind,
            values: values[..expected].to_vec(),
        })
    }

    pub fn kind(&self) -> SensorKind {
        self.kind
    }

    pub fn values(&self) -> &[f32] {
        &self.values
    }

    /// First three components as a vector
    pub fn vector3(&self) -> Vector3<f32> {
        Vector3::new(self.values[0], self.values[1], self.values[2])
    }

    pub fn magnitude(&self) -> f32 {
        self.vector3().norm()
    }
}

#[derive(Deserialize)]
struct RawSensorSample {
    kind: SensorKind,
    values: Vec<f32>,
}

impl TryFrom<RawSensorSample> for SensorSample {
    type Error = SensorLogError;

    fn try_from(raw: RawSensorSample) -> Result<Self, Self::Error> {
        SensorSample::new(raw.kind, &raw.values)
    }
}

/// GPS location from Android LocationManager
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct LocationSample {
    pub latitude: f64,
    pub longitude: f64,
}

impl LocationSample {
    pub fn new(latitude: f64, longitude: f64) -> Self {
        Self {
            latitude,
            longitude,
        }
    }
}

/// Everything the host can push into the logger
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum SensorEvent {
    Sensor(SensorSample),
    Location(LocationSample),
    ProviderEnabled { provider: String },
    ProviderDisabled { provider: String },
    StatusChanged { provider: String, status: i32 },
    /// Free-text marker, as written by `logEvent`
    Marker { text: String },
}

impl From<SensorSample> for SensorEvent {
    fn from(sample: SensorSample) -> Self {
        SensorEvent::Sensor(sample)
    }
}

impl From<LocationSample> for SensorEvent {
    fn from(location: LocationSample) -> Self {
        SensorEvent::Location(location)
    }
}

/// Event stamped with milliseconds since the trace began, as stored in replay traces
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TimedEvent {
    pub elapsed_ms: i64,
    #[serde(flatten)]
    pub event: SensorEvent,
}
