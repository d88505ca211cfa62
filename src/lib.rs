// Sensor Logger Android JNI Library
// Records GPS, inertial sensor readings and derived orientation to CSV

pub mod android_jni;
pub mod clock;
pub mod config;
pub mod error;
pub mod rotation;
pub mod sensor_receiver;
pub mod session;
pub mod storage;

pub use clock::{Clock, ManualClock, MonotonicClock};
pub use config::LoggerConfig;
pub use error::{LogResult, SensorLogError};
pub use rotation::{Orientation, RotationMatrices};
pub use sensor_receiver::{LocationSample, SensorEvent, SensorKind, SensorSample, TimedEvent};
pub use session::{SensorLogger, SessionState};
pub use storage::{read_log, AppendOutcome, DeviceInfo, LogRecord, LogSink, ParsedLog, SessionStats};
