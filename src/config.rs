use crate::error::{LogResult, SensorLogError};
use crate::sensor_receiver::SensorKind;
use serde::{Deserialize, Serialize};

/// `SensorManager.SENSOR_DELAY_GAME` expressed in microseconds
pub const SENSOR_DELAY_GAME_US: i32 = 20_000;

/// Samples stamped earlier than this after `start` are dropped while sensors settle
pub const DEFAULT_WARMUP_MS: i64 = 1000;

/// Logger configuration, usually handed over from the host as JSON
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct LoggerConfig {
    /// Sensors the host registers on resume; events from other kinds are ignored
    pub enabled_sensors: Vec<SensorKind>,
    pub warmup_ms: i64,
    /// Flush after this many records (0 = only on stop)
    pub flush_every: u32,
    pub sampling_period_us: i32,
    pub gps_min_time_ms: i64,
    pub gps_min_distance_m: f32,
}

impl Default for LoggerConfig {
    fn default() -> Self {
        Self {
            enabled_sensors: vec![SensorKind::Accelerometer, SensorKind::GyroscopeUncalibrated],
            warmup_ms: DEFAULT_WARMUP_MS,
            flush_every: 0,
            sampling_period_us: SENSOR_DELAY_GAME_US,
            gps_min_time_ms: 1000,
            gps_min_distance_m: 0.0,
        }
    }
}

impl LoggerConfig {
    /// Parse a JSON config; an empty or blank string yields the defaults
    pub fn from_json(json: &str) -> LogResult<Self> {
        if json.trim().is_empty() {
            return Ok(Self::default());
        }

        let config: LoggerConfig = serde_json::from_str(json)?;
        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> LogResult<()> {
        if self.warmup_ms < 0 {
            return Err(SensorLogError::Config(format!(
                "warmup_ms must be >= 0, got {}",
                self.warmup_ms
            )));
        }
        if self.sampling_period_us < 0 {
            return Err(SensorLogError::Config(format!(
                "sampling_period_us must be >= 0, got {}",
                self.sampling_period_us
            )));
        }
        if self.gps_min_time_ms < 0 || self.gps_min_distance_m < 0.0 {
            return Err(SensorLogError::Config(
                "GPS request parameters must be non-negative".to_string(),
            ));
        }
        Ok(())
    }

    pub fn is_enabled(&self, kind: SensorKind) -> bool {
        self.enabled_sensors.contains(&kind)
    }

    /// Android sensor type ids to register on resume, without duplicates.
    ///
    /// The host unregisters all of them on pause, so every registration has
    /// exactly one matching unregistration.
    pub fn registrations(&self) -> Vec<i32> {
        let mut types: Vec<i32> = Vec::with_capacity(self.enabled_sensors.len());
        for kind in &self.enabled_sensors {
            let id = kind.android_type();
            if !types.contains(&id) {
                types.push(id);
            }
        }
        types
    }

    /// Everything the logger knows how to record
    pub fn all_sensors() -> Self {
        Self {
            enabled_sensors: SensorKind::ALL.to_vec(),
            ..Self::default()
        }
    }
}
