use crate::error::{LogResult, SensorLogError};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::ffi::OsString;
use std::fmt::{self, Display};
use std::fs::File;
use std::io::{BufRead, BufWriter, Write};
use std::path::{Path, PathBuf};

/// Build and OS details written as `//KEY value` comment lines at the top of each log.
///
/// Only the JVM side can read `Build.*`, so the host supplies these.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct DeviceInfo {
    pub version_name: String,
    pub model: String,
    pub manufacturer: String,
    pub hardware: String,
    pub serial: String,
    pub android: String,
    pub sdk_int: i32,
    pub incremental: String,
    pub codename: String,
}

impl Default for DeviceInfo {
    fn default() -> Self {
        Self {
            version_name: env!("CARGO_PKG_VERSION").to_string(),
            model: "unknown".to_string(),
            manufacturer: "unknown".to_string(),
            hardware: "unknown".to_string(),
            serial: "unknown".to_string(),
            android: "unknown".to_string(),
            sdk_int: 0,
            incremental: "unknown".to_string(),
            codename: "REL".to_string(),
        }
    }
}

impl DeviceInfo {
    pub fn from_json(json: &str) -> LogResult<Self> {
        if json.trim().is_empty() {
            return Ok(Self::default());
        }
        Ok(serde_json::from_str(json)?)
    }

    /// Header lines in file order
    pub fn header_lines(&self) -> [(&'static str, String); 9] {
        [
            ("VERSION_NAME", self.version_name.clone()),
            ("MODEL", self.model.clone()),
            ("MANUFACTURER", self.manufacturer.clone()),
            ("HARDWARE", self.hardware.clone()),
            ("SERIAL", self.serial.clone()),
            ("ANDROID", self.android.clone()),
            ("SDK_INT", self.sdk_int.to_string()),
            ("INCREMENTAL", self.incremental.clone()),
            ("CODENAME", self.codename.clone()),
        ]
    }

    fn set_header(&mut self, key: &str, value: &str, line: usize) -> LogResult<()> {
        let value = value.to_string();
        match key {
            "VERSION_NAME" => self.version_name = value,
            "MODEL" => self.model = value,
            "MANUFACTURER" => self.manufacturer = value,
            "HARDWARE" => self.hardware = value,
            "SERIAL" => self.serial = value,
            "ANDROID" => self.android = value,
            "SDK_INT" => {
                self.sdk_int = value.parse().map_err(|_| SensorLogError::InvalidRecord {
                    line,
                    reason: format!("SDK_INT is not an integer: {}", value),
                })?
            }
            "INCREMENTAL" => self.incremental = value,
            "CODENAME" => self.codename = value,
            _ => log::debug!("Ignoring unknown header key {} at line {}", key, line),
        }
        Ok(())
    }
}

/// One CSV data line: `elapsed,tag,field0,field1,...`
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LogRecord {
    pub elapsed_millis: i64,
    pub tag: String,
    pub fields: Vec<String>,
}

impl LogRecord {
    pub fn new<I, T>(elapsed_millis: i64, tag: &str, fields: I) -> Self
    where
        I: IntoIterator<Item = T>,
        T: Display,
    {
        Self {
            elapsed_millis,
            tag: tag.to_string(),
            fields: fields.into_iter().map(|f| f.to_string()).collect(),
        }
    }

    /// Parse a data line; `line` is only used for error reporting
    pub fn parse(text: &str, line: usize) -> LogResult<Self> {
        let invalid = |reason: String| SensorLogError::InvalidRecord { line, reason };

        let mut parts = text.split(',');
        let elapsed = parts.next().unwrap_or_default();
        let elapsed_millis = elapsed
            .parse::<i64>()
            .map_err(|_| invalid(format!("bad elapsed time {:?}", elapsed)))?;

        let tag = match parts.next() {
            Some(tag) if !tag.is_empty() => tag.to_string(),
            _ => return Err(invalid("missing tag".to_string())),
        };

        Ok(Self {
            elapsed_millis,
            tag,
            fields: parts.map(str::to_string).collect(),
        })
    }

    /// Fields as numbers, for records whose payload is numeric
    pub fn numeric_fields(&self) -> LogResult<Vec<f64>> {
        self.fields
            .iter()
            .map(|f| {
                f.parse::<f64>().map_err(|_| {
                    SensorLogError::InvalidSample(format!("{} field {:?} is not numeric", self.tag, f))
                })
            })
            .collect()
    }
}

impl Display for LogRecord {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{},{}", self.elapsed_millis, self.tag)?;
        for field in &self.fields {
            write!(f, ",{}", field)?;
        }
        Ok(())
    }
}

/// Counters for one logging session
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct SessionStats {
    pub path: PathBuf,
    pub started_at: String,
    pub records_written: BTreeMap<String, u64>,
    pub suppressed_warmup: u64,
    pub write_failures: u64,
    pub last_elapsed_ms: Option<i64>,
}

impl SessionStats {
    pub fn total_written(&self) -> u64 {
        self.records_written.values().sum()
    }

    pub fn count(&self, tag: &str) -> u64 {
        self.records_written.get(tag).copied().unwrap_or(0)
    }
}

/// What `append` did with a record
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AppendOutcome {
    Written,
    /// Inside the warm-up window
    Suppressed,
    /// The write failed; the error was logged and the session continues
    Failed,
}

/// Append-only CSV file for one session
#[derive(Debug)]
pub struct LogSink {
    writer: Option<BufWriter<File>>,
    warmup_ms: i64,
    flush_every: u32,
    since_flush: u32,
    stats: SessionStats,
}

impl LogSink {
    /// Create `<path_base>.csv`, truncating any previous file, and write the header.
    ///
    /// Fails without leaving an open sink behind if the file cannot be created
    /// or the header cannot be written.
    pub fn create(
        path_base: impl AsRef<Path>,
        device: &DeviceInfo,
        warmup_ms: i64,
        flush_every: u32,
    ) -> LogResult<Self> {
        let path = csv_path(path_base.as_ref());
        let mut writer = BufWriter::new(File::create(&path)?);
        for (key, value) in device.header_lines() {
            writeln!(writer, "//{} {}", key, value)?;
        }
        writer.flush()?;

        Ok(Self {
            writer: Some(writer),
            warmup_ms,
            flush_every,
            since_flush: 0,
            stats: SessionStats {
                path,
                started_at: chrono::Utc::now().to_rfc3339(),
                ..SessionStats::default()
            },
        })
    }

    pub fn path(&self) -> &Path {
        &self.stats.path
    }

    pub fn stats(&self) -> &SessionStats {
        &self.stats
    }

    pub fn append(&mut self, record: &LogRecord) -> AppendOutcome {
        if record.elapsed_millis < self.warmup_ms {
            self.stats.suppressed_warmup += 1;
            return AppendOutcome::Suppressed;
        }

        let Some(writer) = self.writer.as_mut() else {
            return AppendOutcome::Failed;
        };

        if let Err(e) = writeln!(writer, "{}", record) {
            log::warn!("Logging failed: {} ({})", record, e);
            self.stats.write_failures += 1;
            return AppendOutcome::Failed;
        }

        *self
            .stats
            .records_written
            .entry(record.tag.clone())
            .or_insert(0) += 1;
        self.stats.last_elapsed_ms = Some(record.elapsed_millis);

        if self.flush_every > 0 {
            self.since_flush += 1;
            if self.since_flush >= self.flush_every {
                self.since_flush = 0;
                if let Err(e) = writer.flush() {
                    log::warn!("Periodic flush of {} failed: {}", self.stats.path.display(), e);
                    self.stats.write_failures += 1;
                }
            }
        }

        AppendOutcome::Written
    }

    /// Flush and close the file, returning the session counters
    pub fn close(mut self) -> LogResult<SessionStats> {
        let stats = std::mem::take(&mut self.stats);
        if let Some(writer) = self.writer.take() {
            let file = writer.into_inner().map_err(|e| e.into_error())?;
            file.sync_all()?;
        }
        Ok(stats)
    }
}

impl Drop for LogSink {
    fn drop(&mut self) {
        if let Some(mut writer) = self.writer.take() {
            if let Err(e) = writer.flush() {
                log::error!(
                    "Dropping unclosed log {} lost buffered data: {}",
                    self.stats.path.display(),
                    e
                );
            }
        }
    }
}

/// `<path_base>.csv`, appended rather than substituted so dots in the base survive
pub fn csv_path(path_base: &Path) -> PathBuf {
    let mut os: OsString = path_base.as_os_str().to_owned();
    os.push(".csv");
    PathBuf::from(os)
}

/// A log read back from disk
#[derive(Debug, Clone, PartialEq)]
pub struct ParsedLog {
    pub device: DeviceInfo,
    pub records: Vec<LogRecord>,
}

impl ParsedLog {
    /// Records per tag, in tag order
    pub fn tag_counts(&self) -> BTreeMap<&str, usize> {
        let mut counts = BTreeMap::new();
        for record in &self.records {
            *counts.entry(record.tag.as_str()).or_insert(0) += 1;
        }
        counts
    }

    pub fn duration_ms(&self) -> i64 {
        match (self.records.first(), self.records.last()) {
            (Some(first), Some(last)) => last.elapsed_millis - first.elapsed_millis,
            _ => 0,
        }
    }
}

/// Parse a CSV log written by `LogSink`
pub fn read_log<R: BufRead>(reader: R) -> LogResult<ParsedLog> {
    let mut device = DeviceInfo::default();
    let mut records = Vec::new();

    for (index, line) in reader.lines().enumerate() {
        let line = line?;
        let line_no = index + 1;
        let text = line.trim_end_matches('\r');

        if text.is_empty() {
            continue;
        }

        if let Some(header) = text.strip_prefix("//") {
            let (key, value) = header.split_once(' ').unwrap_or((header, ""));
            device.set_header(key, value, line_no)?;
            continue;
        }

        records.push(LogRecord::parse(text, line_no)?);
    }

    Ok(ParsedLog { device, records })
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Cursor;

    fn device() -> DeviceInfo {
        DeviceInfo {
            version_name: "1.0".to_string(),
            model: "Pixel 3".to_string(),
            manufacturer: "Google".to_string(),
            hardware: "blueline".to_string(),
            serial: "8AAX1234".to_string(),
            android: "9".to_string(),
            sdk_int: 28,
            incremental: "5124027".to_string(),
            codename: "REL".to_string(),
        }
    }

    #[test]
    fn test_header_written_in_order() {
        let dir = tempfile::tempdir().unwrap();
        let base = dir.path().join("session");

        let sink = LogSink::create(&base, &device(), 1000, 0).unwrap();
        sink.close().unwrap();

        let text = std::fs::read_to_string(dir.path().join("session.csv")).unwrap();
        let expected = "//VERSION_NAME 1.0\n\
                        //MODEL Pixel 3\n\
                        //MANUFACTURER Google\n\
                        //HARDWARE blueline\n\
                        //SERIAL 8AAX1234\n\
                        //ANDROID 9\n\
                        //SDK_INT 28\n\
                        //INCREMENTAL 5124027\n\
                        //CODENAME REL\n";
        assert_eq!(text, expected);
    }

    #[test]
    fn test_warmup_suppression() {
        let dir = tempfile::tempdir().unwrap();
        let base = dir.path().join("warmup");
        let mut sink = LogSink::create(&base, &device(), 1000, 0).unwrap();

        for elapsed in [0, 1, 500, 999] {
            let record = LogRecord::new(elapsed, "GYROSCOPE", [0.1f32, 0.2, 0.3]);
            assert_eq!(sink.append(&record), AppendOutcome::Suppressed);
        }
        let record = LogRecord::new(1000, "GYROSCOPE", [0.1f32, 0.2, 0.3]);
        assert_eq!(sink.append(&record), AppendOutcome::Written);

        let stats = sink.close().unwrap();
        assert_eq!(stats.suppressed_warmup, 4);
        assert_eq!(stats.count("GYROSCOPE"), 1);
        assert_eq!(stats.last_elapsed_ms, Some(1000));

        let parsed = read_log(Cursor::new(std::fs::read(base.with_extension("csv")).unwrap())).unwrap();
        assert_eq!(parsed.records.len(), 1);
        assert_eq!(parsed.records[0].to_string(), "1000,GYROSCOPE,0.1,0.2,0.3");
    }

    #[test]
    fn test_flush_every_makes_lines_visible() {
        let dir = tempfile::tempdir().unwrap();
        let base = dir.path().join("flushing");
        let mut sink = LogSink::create(&base, &device(), 0, 2).unwrap();

        sink.append(&LogRecord::new(10, "GPS", [47.4979f64, 19.0402]));
        sink.append(&LogRecord::new(20, "GPS", [47.4980f64, 19.0403]));

        let text = std::fs::read_to_string(sink.path()).unwrap();
        assert!(text.ends_with("10,GPS,47.4979,19.0402\n20,GPS,47.498,19.0403\n"));
        sink.close().unwrap();
    }

    #[test]
    fn test_create_truncates_previous_log() {
        let dir = tempfile::tempdir().unwrap();
        let base = dir.path().join("reused");

        let mut sink = LogSink::create(&base, &device(), 0, 0).unwrap();
        sink.append(&LogRecord::new(5, "GRAVITY", [0.0f32, 0.0, 9.8]));
        sink.close().unwrap();

        LogSink::create(&base, &device(), 0, 0).unwrap().close().unwrap();
        let parsed = read_log(std::io::BufReader::new(File::open(dir.path().join("reused.csv")).unwrap())).unwrap();
        assert!(parsed.records.is_empty());
        assert_eq!(parsed.device, device());
    }

    #[test]
    fn test_create_fails_for_missing_directory() {
        let dir = tempfile::tempdir().unwrap();
        let base = dir.path().join("no_such_dir").join("log");
        let err = LogSink::create(&base, &device(), 1000, 0).unwrap_err();
        assert!(matches!(err, SensorLogError::Io(_)));
    }

    #[test]
    fn test_drop_flushes_buffered_records() {
        let dir = tempfile::tempdir().unwrap();
        let base = dir.path().join("dropped");
        {
            let mut sink = LogSink::create(&base, &device(), 0, 0).unwrap();
            sink.append(&LogRecord::new(1, "GYROSCOPE", [1.0f32, 2.0, 3.0]));
        }
        let text = std::fs::read_to_string(dir.path().join("dropped.csv")).unwrap();
        assert!(text.ends_with("1,GYROSCOPE,1,2,3\n"));
    }

    #[test]
    fn test_close_leaves_records_on_disk() {
        let dir = tempfile::tempdir().unwrap();
        let base = dir.path().join("closed");
        let mut sink = LogSink::create(&base, &device(), 0, 0).unwrap();
        sink.append(&LogRecord::new(1200, "GPS", [47.5f64, 19.04]));
        let stats = sink.close().unwrap();

        assert_eq!(stats.count("GPS"), 1);
        let file = std::fs::File::open(&stats.path).unwrap();
        let parsed = read_log(std::io::BufReader::new(file)).unwrap();
        assert_eq!(parsed.records.len(), 1);
        assert_eq!(parsed.records[0].fields, vec!["47.5", "19.04"]);
    }

    #[test]
    fn test_csv_path_keeps_dots() {
        assert_eq!(
            csv_path(Path::new("/sdcard/video.2024-01-01")),
            PathBuf::from("/sdcard/video.2024-01-01.csv")
        );
    }

    #[test]
    fn test_record_round_trip() {
        let lines = [
            "1500,ACCELEROMETER,0,0,9.8",
            "2301,GYROSCOPE_UNCALIBRATED,0.01,-0.02,0.003,0.0001,0.0002,-0.0003",
            "4000,ORIENTATION,-1.5707964,0.12,3.1415927",
            "5000,start of run",
        ];
        for (i, line) in lines.iter().enumerate() {
            let record = LogRecord::parse(line, i + 1).unwrap();
            assert_eq!(record.to_string(), *line);
        }

        let record = LogRecord::parse(lines[0], 1).unwrap();
        assert_eq!(record.elapsed_millis, 1500);
        assert_eq!(record.tag, "ACCELEROMETER");
        assert_eq!(record.numeric_fields().unwrap(), vec![0.0, 0.0, 9.8]);
    }

    #[test]
    fn test_record_parse_errors() {
        assert!(matches!(
            LogRecord::parse("abc,GPS,1,2", 7),
            Err(SensorLogError::InvalidRecord { line: 7, .. })
        ));
        assert!(LogRecord::parse("1200", 1).is_err());
        assert!(LogRecord::parse("1200,", 1).is_err());
    }

    #[test]
    fn test_read_log_with_unknown_header() {
        let text = "//VERSION_NAME 2.1\n//BOARD sdm845\n//SDK_INT 29\n\n1001,GPS,1.5,2.5\r\n";
        let parsed = read_log(Cursor::new(text)).unwrap();

        assert_eq!(parsed.device.version_name, "2.1");
        assert_eq!(parsed.device.sdk_int, 29);
        assert_eq!(parsed.records, vec![LogRecord::new(1001, "GPS", ["1.5", "2.5"])]);
        assert_eq!(parsed.tag_counts().get("GPS"), Some(&1));
    }

    #[test]
    fn test_read_log_rejects_bad_sdk_int() {
        let err = read_log(Cursor::new("//SDK_INT Q\n")).unwrap_err();
        assert!(matches!(err, SensorLogError::InvalidRecord { line: 1, .. }));
    }
}
