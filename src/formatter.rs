use std::time::{SystemTime, UNIX_EPOCH};

use serde::Serialize;
use serde_json::{Map, Value};
use thiserror::Error;

use crate::buffers::Entry;

pub const TIMESTAMP_FIELD: &str = "_timestamp";

#[derive(Debug, Error)]
pub enum FormatError {
    #[error("failed to serialize log record: {0}")]
    Serialize(#[from] serde_json::Error),
}

/// One structured log event. Serialized as a single JSON object per line.
#[derive(Debug, Clone, Serialize)]
pub struct LogRecord {
    #[serde(rename = "_timestamp")]
    pub timestamp_us: i64,
    pub level: String,
    pub message: String,
    #[serde(flatten)]
    pub fields: Map<String, Value>,
}

impl LogRecord {
    pub fn new(level: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            timestamp_us: now_micros(),
            level: level.into(),
            message: message.into(),
            fields: Map::new(),
        }
    }

    pub fn with_field(mut self, key: impl Into<String>, value: impl Into<Value>) -> Self {
        self.fields.insert(key.into(), value.into());
        self
    }

    pub fn to_entry(&self) -> Result<Entry, FormatError> {
        let mut line = serde_json::to_vec(self)?;
        line.push(b'\n');
        Ok(Entry::from(line))
    }
}

/// Turn one line of input into an entry.
///
/// JSON objects are re-emitted compactly, gaining a `_timestamp` if they
/// lack one. Anything else becomes the message of an `info` record. Blank
/// lines yield `None`.
pub fn format_line(line: &str) -> Result<Option<Entry>, FormatError> {
    let trimmed = line.trim();
    if trimmed.is_empty() {
        return Ok(None);
    }

    match serde_json::from_str::<Value>(trimmed) {
        Ok(Value::Object(mut object)) => {
            object
                .entry(TIMESTAMP_FIELD)
                .or_insert_with(|| Value::from(now_micros()));
            let mut out = serde_json::to_vec(&Value::Object(object))?;
            out.push(b'\n');
            Ok(Some(Entry::from(out)))
        }
        _ => LogRecord::new("info", trimmed).to_entry().map(Some),
    }
}

fn now_micros() -> i64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_micros() as i64)
        .unwrap_or_default()
}
