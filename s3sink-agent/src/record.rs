//! Log record decoding and rendering
//!
//! Input lines carry one record each as a JSON pair `[timestamp, {fields}]`.

use chrono::{DateTime, TimeZone, Utc};
use clap::ValueEnum;
use serde_json::{Map, Value};
use thiserror::Error;
use tracing::warn;

#[derive(Debug, Error)]
pub enum RecordError {
    #[error("invalid JSON: {0}")]
    Json(#[from] serde_json::Error),

    #[error("expected a [timestamp, record] pair")]
    Shape,

    #[error("record body is not a JSON object")]
    Body,
}

/// How a record's timestamp was expressed on the wire
#[derive(Debug, Clone, PartialEq)]
pub enum RecordTime {
    /// Seconds plus nanoseconds, from a float or a `{"sec", "nsec"}` object
    EventTime { sec: i64, nsec: u32 },
    UnixEpochSeconds(i64),
    Unsupported(Value),
}

impl RecordTime {
    pub fn from_value(value: Value) -> Self {
        match &value {
            Value::Number(n) => {
                if let Some(secs) = n.as_i64() {
                    RecordTime::UnixEpochSeconds(secs)
                } else if n.is_f64() {
                    match n.as_f64() {
                        Some(f) => split_float(f),
                        None => RecordTime::Unsupported(value),
                    }
                } else {
                    // u64 beyond i64::MAX
                    RecordTime::Unsupported(value)
                }
            }
            Value::Object(map) => {
                let sec = map.get("sec").and_then(Value::as_i64);
                let nsec = map
                    .get("nsec")
                    .and_then(Value::as_u64)
                    .filter(|n| *n < 1_000_000_000);
                match (sec, nsec) {
                    (Some(sec), Some(nsec)) => RecordTime::EventTime {
                        sec,
                        nsec: nsec as u32,
                    },
                    _ => RecordTime::Unsupported(value),
                }
            }
            _ => RecordTime::Unsupported(value),
        }
    }

    /// The instant this timestamp names, if it names one
    pub fn resolve(&self) -> Option<DateTime<Utc>> {
        match self {
            RecordTime::EventTime { sec, nsec } => Utc.timestamp_opt(*sec, *nsec).single(),
            RecordTime::UnixEpochSeconds(sec) => Utc.timestamp_opt(*sec, 0).single(),
            RecordTime::Unsupported(_) => None,
        }
    }

    /// Resolve, falling back to `now` for timestamps that cannot be read
    pub fn or_now(&self, now: DateTime<Utc>) -> DateTime<Utc> {
        match self.resolve() {
            Some(time) => time,
            None => {
                warn!("Record time {:?} is not supported, defaulting to now", self);
                now
            }
        }
    }
}

fn split_float(f: f64) -> RecordTime {
    let sec = f.floor();
    let nsec = ((f - sec) * 1e9).round().min(999_999_999.0) as u32;
    if sec < i64::MIN as f64 || sec > i64::MAX as f64 {
        return RecordTime::Unsupported(Value::from(f));
    }
    RecordTime::EventTime {
        sec: sec as i64,
        nsec,
    }
}

/// Rendering applied to each record before it is written
#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum OutputFormat {
    /// `[n] tag: [time, {"k": v, ...}]`
    Text,
    /// One JSON object per line with `date` and `tag` merged in
    Json,
}

#[derive(Debug, Clone, PartialEq)]
pub struct LogRecord {
    pub time: RecordTime,
    pub fields: Map<String, Value>,
}

impl LogRecord {
    pub fn decode(line: &str) -> Result<Self, RecordError> {
        let value: Value = serde_json::from_str(line)?;
        let mut pair = match value {
            Value::Array(items) if items.len() == 2 => items.into_iter(),
            _ => return Err(RecordError::Shape),
        };

        let time = pair.next().ok_or(RecordError::Shape)?;
        let fields = match pair.next() {
            Some(Value::Object(fields)) => fields,
            Some(_) => return Err(RecordError::Body),
            None => return Err(RecordError::Shape),
        };

        Ok(LogRecord {
            time: RecordTime::from_value(time),
            fields,
        })
    }

    /// Render as one newline-terminated line
    pub fn render(
        &self,
        format: OutputFormat,
        index: u64,
        tag: &str,
        time: DateTime<Utc>,
    ) -> Result<String, RecordError> {
        let date = time.to_rfc3339();
        let mut line = match format {
            OutputFormat::Text => {
                let fields = self
                    .fields
                    .iter()
                    .map(|(k, v)| format!("{:?}: {}", k, v))
                    .collect::<Vec<_>>()
                    .join(", ");
                format!("[{}] {}: [{}, {{{}}}]", index, tag, date, fields)
            }
            OutputFormat::Json => {
                let mut merged = self.fields.clone();
                merged.insert("date".to_string(), Value::String(date));
                merged.insert("tag".to_string(), Value::String(tag.to_string()));
                serde_json::to_string(&merged)?
            }
        };
        line.push('\n');
        Ok(line)
    }
}
