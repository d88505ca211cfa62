use crate::clock::{Clock, MonotonicClock};
use crate::config::LoggerConfig;
use crate::error::{LogResult, SensorLogError};
use crate::rotation;
use crate::sensor_receiver::{LocationSample, SensorEvent, SensorKind, SensorSample};
use crate::storage::{AppendOutcome, DeviceInfo, LogRecord, LogSink, SessionStats};
use nalgebra::Vector3;
use serde::{Deserialize, Serialize};
use std::fmt::Display;
use std::path::Path;

pub const TAG_GPS: &str = "GPS";
pub const TAG_ORIENTATION: &str = "ORIENTATION";

/// Logging state machine states
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum SessionState {
    /// No file open, every record is dropped
    Inactive,
    /// Writing records to the session file
    Active,
}

struct ActiveSession {
    sink: LogSink,
    start_millis: i64,
}

/// Turns sensor and location callbacks into CSV records.
///
/// Owned by the host (one per activity); all calls are expected to come from
/// one dispatcher at a time, which `&mut self` enforces on the Rust side.
pub struct SensorLogger {
    config: LoggerConfig,
    clock: Box<dyn Clock>,
    session: Option<ActiveSession>,
    last_accel: Option<Vector3<f32>>,
    last_magnetic: Option<Vector3<f32>>,
    last_stats: Option<SessionStats>,
}

impl SensorLogger {
    pub fn new(config: LoggerConfig) -> Self {
        Self::with_clock(config, MonotonicClock::new())
    }

    pub fn with_clock(config: LoggerConfig, clock: impl Clock + 'static) -> Self {
        SensorLogger {
            config,
            clock: Box::new(clock),
            session: None,
            last_accel: None,
            last_magnetic: None,
            last_stats: None,
        }
    }

    pub fn config(&self) -> &LoggerConfig {
        &self.config
    }

    /// Open `<path_base>.csv` and start recording (Inactive → Active).
    ///
    /// On failure nothing changes: the logger stays Inactive.
    pub fn start(&mut self, path_base: impl AsRef<Path>, device: &DeviceInfo) -> LogResult<()> {
        if self.session.is_some() {
            return Err(SensorLogError::AlreadyLogging);
        }

        let path_base = path_base.as_ref();
        log::info!("Logging {}", path_base.display());

        let start_millis = self.clock.now_millis();
        let sink = LogSink::create(path_base, device, self.config.warmup_ms, self.config.flush_every)
            .map_err(|e| {
                log::error!("Could not open log {}: {}", path_base.display(), e);
                e
            })?;

        self.session = Some(ActiveSession { sink, start_millis });
        Ok(())
    }

    /// Flush and close the session file (Active → Inactive)
    pub fn stop(&mut self) -> LogResult<SessionStats> {
        let session = self.session.take().ok_or(SensorLogError::NotLogging)?;

        let path = session.sink.path().to_path_buf();
        let stats = session.sink.close().map_err(|e| {
            log::error!("Closing log {} failed: {}", path.display(), e);
            e
        })?;

        log::info!(
            "Logging stopped: {} records in {}",
            stats.total_written(),
            path.display()
        );
        self.last_stats = Some(stats.clone());
        Ok(stats)
    }

    pub fn state(&self) -> SessionState {
        match self.session {
            Some(_) => SessionState::Active,
            None => SessionState::Inactive,
        }
    }

    pub fn is_logging(&self) -> bool {
        self.session.is_some()
    }

    /// Milliseconds since `start`, if a session is running
    pub fn elapsed_millis(&self) -> Option<i64> {
        self.session
            .as_ref()
            .map(|s| self.clock.now_millis() - s.start_millis)
    }

    /// Counters of the running session, or of the last one if stopped
    pub fn stats(&self) -> Option<SessionStats> {
        match &self.session {
            Some(session) => Some(session.sink.stats().clone()),
            None => self.last_stats.clone(),
        }
    }

    pub fn last_accel(&self) -> Option<Vector3<f32>> {
        self.last_accel
    }

    pub fn last_magnetic(&self) -> Option<Vector3<f32>> {
        self.last_magnetic
    }

    /// Write one record stamped with the current session time.
    ///
    /// Returns `None` when no session is active.
    pub fn append<I, T>(&mut self, tag: &str, fields: I) -> Option<AppendOutcome>
    where
        I: IntoIterator<Item = T>,
        T: Display,
    {
        let now = self.clock.now_millis();
        let session = self.session.as_mut()?;
        let record = LogRecord::new(now - session.start_millis, tag, fields);
        Some(session.sink.append(&record))
    }

    /// Write a free-text marker line, e.g. when recording starts on the camera side.
    ///
    /// The host plays the accompanying tone. The marker becomes the record's
    /// tag, so leading commas and surrounding whitespace are dropped; a marker
    /// with nothing left writes no line and returns `None`.
    pub fn log_event(&mut self, text: &str) -> Option<AppendOutcome> {
        let marker = text.replace(['\r', '\n'], " ");
        let marker = marker.trim().trim_start_matches(',').trim_start();
        if marker.is_empty() {
            log::warn!("Ignoring empty marker {:?}", text);
            return None;
        }
        self.append::<_, f32>(marker, [])
    }

    pub fn handle_event(&mut self, event: &SensorEvent) {
        match event {
            SensorEvent::Sensor(sample) => self.on_sensor_changed(sample),
            SensorEvent::Location(location) => self.on_location_changed(location),
            SensorEvent::ProviderEnabled { provider } => {
                log::info!("Location provider {} turned on", provider);
            }
            SensorEvent::ProviderDisabled { provider } => {
                log::info!("Location provider {} turned off", provider);
            }
            SensorEvent::StatusChanged { provider, status } => {
                log::debug!("Location provider {} status {}", provider, status);
            }
            SensorEvent::Marker { text } => {
                self.log_event(text);
            }
        }
    }

    pub fn on_location_changed(&mut self, location: &LocationSample) {
        self.append(TAG_GPS, [location.latitude, location.longitude]);
    }

    pub fn on_sensor_changed(&mut self, sample: &SensorSample) {
        if !self.config.is_enabled(sample.kind()) {
            log::debug!("Ignoring {} sample, sensor not enabled", sample.kind());
            return;
        }

        self.append(sample.kind().tag(), sample.values().iter());

        match sample.kind() {
            SensorKind::Accelerometer => {
                self.last_accel = Some(sample.vector3());
            }
            SensorKind::MagneticField => {
                let magnetic = sample.vector3();
                self.last_magnetic = Some(magnetic);
                self.log_orientation(&magnetic);
            }
            _ => {}
        }
    }

    fn log_orientation(&mut self, magnetic: &Vector3<f32>) {
        let Some(accel) = self.last_accel else {
            return;
        };

        match rotation::estimate_orientation(&accel, magnetic) {
            Some(orientation) => {
                self.append(TAG_ORIENTATION, orientation.to_array());
            }
            None => log::debug!("Skipping orientation, degenerate gravity/magnetic input"),
        }
    }
}

impl Default for SensorLogger {
    fn default() -> Self {
        Self::new(LoggerConfig::default())
    }
}
