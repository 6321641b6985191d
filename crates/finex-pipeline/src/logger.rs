use std::fs::OpenOptions;
use std::io::Write;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex};

use chrono::Utc;
use serde::Serialize;

use finex_core::record::{LogLevel, LogRecord};

/// Destination for audit records.
pub trait LogSink: Send + Sync {
    fn name(&self) -> &str;
    fn append(&self, record: &LogRecord) -> std::io::Result<()>;
}

/// One JSON object per line, appended to a file opened per record.
pub struct JsonlFileSink {
    path: PathBuf,
}

impl JsonlFileSink {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }
}

impl LogSink for JsonlFileSink {
    fn name(&self) -> &str {
        "jsonl"
    }

    fn append(&self, record: &LogRecord) -> std::io::Result<()> {
        let mut line = serde_json::to_vec(record)?;
        line.push(b'\n');
        let mut file = OpenOptions::new()
            .create(true)
            .append(true)
            .open(&self.path)?;
        file.write_all(&line)
    }
}

/// Keeps records in memory.
#[derive(Default)]
pub struct MemorySink {
    records: Mutex<Vec<LogRecord>>,
}

impl MemorySink {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn records(&self) -> Vec<LogRecord> {
        self.records.lock().map(|r| r.clone()).unwrap_or_default()
    }
}

impl LogSink for MemorySink {
    fn name(&self) -> &str {
        "memory"
    }

    fn append(&self, record: &LogRecord) -> std::io::Result<()> {
        self.records
            .lock()
            .map_err(|_| std::io::Error::other("memory sink poisoned"))?
            .push(record.clone());
        Ok(())
    }
}

/// Best-effort recorder of pipeline events.
///
/// Every record goes to `tracing` and then to each sink. Nothing here returns
/// an error: sink and serialization failures become warnings.
#[derive(Clone, Default)]
pub struct ResultLogger {
    sinks: Vec<Arc<dyn LogSink>>,
}

impl ResultLogger {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_sink(mut self, sink: Arc<dyn LogSink>) -> Self {
        self.sinks.push(sink);
        self
    }

    pub fn record<T: Serialize + ?Sized>(&self, event: &str, payload: &T, level: LogLevel) {
        let payload_type = std::any::type_name::<T>();
        let payload = match serde_json::to_value(payload) {
            Ok(value) => value,
            Err(e) => {
                tracing::warn!(event, payload_type, error = %e, "Could not serialize log payload");
                return;
            }
        };

        match level {
            LogLevel::Info => {
                tracing::info!(target: "finex::record", event, payload_type, %payload, "record")
            }
            LogLevel::Notice => {
                tracing::info!(target: "finex::record", severity = "notice", event, payload_type, %payload, "record")
            }
        }

        if self.sinks.is_empty() {
            return;
        }

        let record = LogRecord {
            timestamp: Utc::now(),
            event: event.to_string(),
            level,
            payload_type: payload_type.to_string(),
            payload,
        };

        for sink in &self.sinks {
            if let Err(e) = sink.append(&record) {
                tracing::warn!(sink = sink.name(), event, error = %e, "Log sink unavailable, record dropped");
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use std::io;

    use serde_json::json;

    use super::*;

    struct UnreachableSink;

    impl LogSink for UnreachableSink {
        fn name(&self) -> &str {
            "unreachable"
        }

        fn append(&self, _record: &LogRecord) -> io::Result<()> {
            Err(io::Error::new(io::ErrorKind::ConnectionRefused, "collector down"))
        }
    }

    #[test]
    fn records_reach_every_sink() {
        let memory = Arc::new(MemorySink::new());
        let logger = ResultLogger::new().with_sink(memory.clone());

        logger.record("field_extraction", &json!({"empresa": "Monark"}), LogLevel::Notice);
        logger.record("field_extraction.type", "ExtractionResult", LogLevel::Info);

        let records = memory.records();
        assert_eq!(records.len(), 2);
        assert_eq!(records[0].event, "field_extraction");
        assert_eq!(records[0].level, LogLevel::Notice);
        assert_eq!(records[0].payload["empresa"], "Monark");
        assert_eq!(records[0].payload_type, "serde_json::value::Value");
        assert_eq!(records[1].payload, json!("ExtractionResult"));
        assert_eq!(records[1].payload_type, "str");
    }

    #[test]
    fn unreachable_sink_degrades_to_warning() {
        let memory = Arc::new(MemorySink::new());
        let logger = ResultLogger::new()
            .with_sink(Arc::new(UnreachableSink))
            .with_sink(memory.clone());

        logger.record("text_extracted", &json!({"chars": 42}), LogLevel::Info);

        assert_eq!(memory.records().len(), 1);
    }

    #[test]
    fn jsonl_sink_appends_lines() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("records.jsonl");
        let logger = ResultLogger::new().with_sink(Arc::new(JsonlFileSink::new(&path)));

        logger.record("first", &1u32, LogLevel::Info);
        logger.record("second", &vec!["a", "b"], LogLevel::Notice);

        let contents = std::fs::read_to_string(&path).unwrap();
        let lines: Vec<LogRecord> = contents
            .lines()
            .map(|l| serde_json::from_str(l).unwrap())
            .collect();
        assert_eq!(lines.len(), 2);
        assert_eq!(lines[0].event, "first");
        assert_eq!(lines[1].level, LogLevel::Notice);
        assert_eq!(lines[1].payload, json!(["a", "b"]));
    }

    #[test]
    fn missing_sink_directory_does_not_panic() {
        let logger = ResultLogger::new()
            .with_sink(Arc::new(JsonlFileSink::new("/nonexistent/dir/records.jsonl")));
        logger.record("field_extraction", &json!({}), LogLevel::Notice);
    }
}
