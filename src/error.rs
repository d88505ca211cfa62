use jni::JNIEnv;
use thiserror::Error;

/// Sensor logger error types
#[derive(Error, Debug)]
pub enum SensorLogError {
    #[error("Logging already active")]
    AlreadyLogging,

    #[error("Logging not active")]
    NotLogging,

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Invalid sample: {0}")]
    InvalidSample(String),

    #[error("Invalid record at line {line}: {reason}")]
    InvalidRecord { line: usize, reason: String },

    #[error("Invalid configuration: {0}")]
    Config(String),

    #[error("JNI error: {0}")]
    JniError(String),

    #[error("Internal error: {0}")]
    Internal(String),
}

impl From<serde_json::Error> for SensorLogError {
    fn from(err: serde_json::Error) -> Self {
        SensorLogError::Config(err.to_string())
    }
}

impl From<jni::errors::Error> for SensorLogError {
    fn from(err: jni::errors::Error) -> Self {
        SensorLogError::JniError(err.to_string())
    }
}

/// Result type for logger operations
pub type LogResult<T> = Result<T, SensorLogError>;

/// Throw Java exception from Rust error
pub fn throw_java_exception(env: &mut JNIEnv, error: &SensorLogError) -> LogResult<()> {
    let exception_class = match error {
        SensorLogError::AlreadyLogging | SensorLogError::NotLogging => {
            "java/lang/IllegalStateException"
        }
        SensorLogError::InvalidSample(_) | SensorLogError::Config(_) => {
            "java/lang/IllegalArgumentException"
        }
        SensorLogError::Io(_) | SensorLogError::InvalidRecord { .. } => "java/io/IOException",
        SensorLogError::JniError(_) | SensorLogError::Internal(_) => {
            "java/lang/RuntimeException"
        }
    };

    let message = error.to_string();
    env.throw_new(exception_class, message)
        .map_err(|_| SensorLogError::JniError("Failed to throw exception".to_string()))?;

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_io_error_conversion() {
        let io = std::io::Error::new(std::io::ErrorKind::PermissionDenied, "read-only");
        let err: SensorLogError = io.into();
        assert!(matches!(err, SensorLogError::Io(_)));
        assert!(err.to_string().contains("read-only"));
    }

    #[test]
    fn test_record_error_message() {
        let err = SensorLogError::InvalidRecord {
            line: 12,
            reason: "missing tag".to_string(),
        };
        assert_eq!(err.to_string(), "Invalid record at line 12: missing tag");
    }
}
