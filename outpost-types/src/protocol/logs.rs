use std::time::SystemTime;

use serde::{Deserialize, Serialize, Serializer};

use super::trace::{SpanId, TraceId};
use super::{Map, Value};
use crate::utils::ts_seconds_float;

/// The severity of a structured log.
#[derive(Serialize, Deserialize, Debug, Copy, Clone, PartialEq, Eq, PartialOrd, Ord, Hash)]
#[serde(rename_all = "lowercase")]
pub enum LogLevel {
    /// A very fine-grained log, usually disabled.
    Trace,
    /// Debug information.
    Debug,
    /// Informational message.
    Info,
    /// Something may be wrong.
    Warn,
    /// Something is wrong.
    Error,
    /// Something is critically wrong.
    Fatal,
}

impl LogLevel {
    /// The default OpenTelemetry severity number of this level.
    pub fn severity_number(self) -> u8 {
        match self {
            LogLevel::Trace => 1,
            LogLevel::Debug => 5,
            LogLevel::Info => 9,
            LogLevel::Warn => 13,
            LogLevel::Error => 17,
            LogLevel::Fatal => 21,
        }
    }
}

/// A single attribute value of a log or metric.
///
/// Serialized as `{"value": .., "type": ..}` as the logs protocol expects.
#[derive(Deserialize, Debug, Clone, PartialEq)]
pub struct LogAttribute(pub Value);

impl Serialize for LogAttribute {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        use serde::ser::SerializeStruct;

        let mut state = serializer.serialize_struct("LogAttribute", 2)?;
        match &self.0 {
            Value::String(s) => {
                state.serialize_field("value", s)?;
                state.serialize_field("type", "string")?;
            }
            Value::Bool(b) => {
                state.serialize_field("value", b)?;
                state.serialize_field("type", "boolean")?;
            }
            Value::Number(n) if n.is_f64() => {
                state.serialize_field("value", n)?;
                state.serialize_field("type", "double")?;
            }
            Value::Number(n) => {
                state.serialize_field("value", n)?;
                state.serialize_field("type", "integer")?;
            }
            other => {
                state.serialize_field("value", &other.to_string())?;
                state.serialize_field("type", "string")?;
            }
        }
        state.end()
    }
}

/// A structured log.
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
pub struct Log {
    /// The severity of the log.
    pub level: LogLevel,
    /// The formatted log message.
    pub body: String,
    /// The trace the log was emitted in.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub trace_id: Option<TraceId>,
    /// When the log was emitted.
    #[serde(with = "ts_seconds_float")]
    pub timestamp: SystemTime,
    /// Overrides the severity number derived from the level.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub severity_number: Option<u8>,
    /// Additional attributes.
    #[serde(default, skip_serializing_if = "Map::is_empty")]
    pub attributes: Map<String, LogAttribute>,
}

impl Log {
    /// Creates a log at the given level with the current timestamp.
    pub fn new(level: LogLevel, body: impl Into<String>) -> Log {
        Log {
            level,
            body: body.into(),
            trace_id: None,
            timestamp: SystemTime::now(),
            severity_number: None,
            attributes: Map::new(),
        }
    }
}

/// The kind of a trace metric.
#[derive(Serialize, Deserialize, Debug, Copy, Clone, PartialEq, Eq, Hash)]
#[serde(rename_all = "lowercase")]
pub enum TraceMetricType {
    /// Counts occurrences.
    Counter,
    /// Records the current value of something.
    Gauge,
    /// Records a sample of a statistical distribution.
    Distribution,
}

/// A single metric sample, correlated with the active trace.
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
pub struct TraceMetric {
    /// The kind of metric.
    #[serde(rename = "type")]
    pub ty: TraceMetricType,
    /// The metric name.
    pub name: String,
    /// The sampled value.
    pub value: f64,
    /// When the value was recorded.
    #[serde(with = "ts_seconds_float")]
    pub timestamp: SystemTime,
    /// The trace the metric was recorded in.
    pub trace_id: TraceId,
    /// The active span when the metric was recorded.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub span_id: Option<SpanId>,
    /// The measurement unit.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub unit: Option<String>,
    /// Additional attributes.
    #[serde(default, skip_serializing_if = "Map::is_empty")]
    pub attributes: Map<String, LogAttribute>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_log_attribute_serialization() {
        let mut attrs = Map::new();
        attrs.insert("a".to_owned(), LogAttribute("x".into()));
        attrs.insert("b".to_owned(), LogAttribute(42.into()));
        attrs.insert("c".to_owned(), LogAttribute(1.5.into()));
        attrs.insert("d".to_owned(), LogAttribute(true.into()));
        let json = serde_json::to_value(&attrs).unwrap();
        assert_eq!(
            json,
            serde_json::json!({
                "a": {"value": "x", "type": "string"},
                "b": {"value": 42, "type": "integer"},
                "c": {"value": 1.5, "type": "double"},
                "d": {"value": true, "type": "boolean"},
            })
        );
    }
}
