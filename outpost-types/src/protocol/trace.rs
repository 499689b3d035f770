use std::fmt;
use std::str;
use std::time::SystemTime;

use serde::{Deserialize, Serialize};

use super::{Map, Value};
use crate::utils::{ts_seconds_float, ts_seconds_float_opt};

macro_rules! hex_id {
    ($name:ident, $len:literal, $doc:literal) => {
        #[doc = $doc]
        #[derive(Serialize, Deserialize, Copy, Clone, Eq, PartialEq, Hash)]
        #[serde(try_from = "String", into = "String")]
        pub struct $name([u8; $len]);

        impl Default for $name {
            fn default() -> Self {
                Self(rand::random())
            }
        }

        impl $name {
            /// Creates an id from its raw bytes.
            pub const fn from_bytes(bytes: [u8; $len]) -> Self {
                Self(bytes)
            }
        }

        impl fmt::Display for $name {
            fn fmt(&self, fmt: &mut fmt::Formatter) -> fmt::Result {
                write!(fmt, "{}", hex::encode(self.0))
            }
        }

        impl fmt::Debug for $name {
            fn fmt(&self, fmt: &mut fmt::Formatter) -> fmt::Result {
                write!(fmt, "{}({})", stringify!($name), self)
            }
        }

        impl From<$name> for String {
            fn from(id: $name) -> Self {
                id.to_string()
            }
        }

        impl str::FromStr for $name {
            type Err = hex::FromHexError;

            fn from_str(input: &str) -> Result<Self, Self::Err> {
                let mut buf = [0; $len];
                hex::decode_to_slice(input, &mut buf)?;
                Ok(Self(buf))
            }
        }

        impl TryFrom<String> for $name {
            type Error = hex::FromHexError;

            fn try_from(value: String) -> Result<Self, Self::Error> {
                value.parse()
            }
        }
    };
}

hex_id!(TraceId, 16, "A 16 byte trace id, written as 32 hex digits.");
hex_id!(SpanId, 8, "An 8 byte span id, written as 16 hex digits.");

/// Outcome of a span, modelled on gRPC status codes.
#[derive(Serialize, Deserialize, Debug, Copy, Clone, PartialEq, Eq, Hash)]
#[serde(rename_all = "snake_case")]
#[non_exhaustive]
pub enum SpanStatus {
    /// Success.
    Ok,
    /// Timed out.
    DeadlineExceeded,
    /// 401 Unauthorized.
    Unauthenticated,
    /// 403 Forbidden.
    PermissionDenied,
    /// 404 Not Found.
    NotFound,
    /// 429 Too Many Requests.
    ResourceExhausted,
    /// Client specified an invalid argument.
    InvalidArgument,
    /// 501 Not Implemented.
    Unimplemented,
    /// 503 Service Unavailable.
    Unavailable,
    /// Other/generic 5xx.
    InternalError,
    /// Any non-standard status.
    #[serde(rename = "unknown_error")]
    Unknown,
    /// Cancelled by the caller.
    Cancelled,
    /// Already exists (409).
    AlreadyExists,
    /// The system is not in a state required for the operation.
    FailedPrecondition,
    /// Aborted, e.g. by a conflicting transaction.
    Aborted,
    /// Out of the valid range.
    OutOfRange,
    /// Unrecoverable data loss or corruption.
    DataLoss,
}

/// The `trace` context attached to events and transactions.
#[derive(Serialize, Deserialize, Debug, Clone, Default, PartialEq)]
pub struct TraceContext {
    /// Span the event happened in.
    #[serde(default)]
    pub span_id: SpanId,
    /// Trace the event belongs to.
    #[serde(default)]
    pub trace_id: TraceId,
    /// Parent span, for continued traces.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub parent_span_id: Option<SpanId>,
    /// Operation of the span, such as `http.server`.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub op: Option<String>,
    /// Free-form description.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    /// Final status of the span.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub status: Option<SpanStatus>,
    /// Arbitrary data attached to the span.
    #[serde(default, skip_serializing_if = "Map::is_empty")]
    pub data: Map<String, Value>,
    /// The sampling decision of the trace. Never sent over the wire.
    #[serde(skip)]
    pub sampled: Option<bool>,
}

/// A finished child span as it appears in a transaction event.
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
pub struct Span {
    /// Id of this span.
    #[serde(default)]
    pub span_id: SpanId,
    /// Trace shared by the whole span tree.
    #[serde(default)]
    pub trace_id: TraceId,
    /// Span this one was started from.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub parent_span_id: Option<SpanId>,
    /// Operation the span measures, such as `db.query`.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub op: Option<String>,
    /// Longer description of the span's operation.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    /// End time, set by [`Span::finish`].
    #[serde(
        default,
        skip_serializing_if = "Option::is_none",
        with = "ts_seconds_float_opt"
    )]
    pub timestamp: Option<SystemTime>,
    /// Start time.
    #[serde(default = "SystemTime::now", with = "ts_seconds_float")]
    pub start_timestamp: SystemTime,
    /// Final status of the span.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub status: Option<SpanStatus>,
    /// Span tags.
    #[serde(default, skip_serializing_if = "Map::is_empty")]
    pub tags: Map<String, String>,
    /// Structured span data.
    #[serde(default, skip_serializing_if = "Map::is_empty")]
    pub data: Map<String, Value>,
}

impl Default for Span {
    fn default() -> Self {
        Span {
            span_id: SpanId::default(),
            trace_id: TraceId::default(),
            parent_span_id: None,
            op: None,
            description: None,
            timestamp: None,
            start_timestamp: SystemTime::now(),
            status: None,
            tags: Map::new(),
            data: Map::new(),
        }
    }
}

impl Span {
    /// Stamps the end time.
    pub fn finish(&mut self) {
        self.timestamp = Some(SystemTime::now());
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_trace_id_hex() {
        let id: TraceId = "09e04486820349518ac7b5d2adbf6ba5".parse().unwrap();
        assert_eq!(id.to_string(), "09e04486820349518ac7b5d2adbf6ba5");
        assert!("09e0".parse::<TraceId>().is_err());

        let span_id = SpanId::from_bytes([0, 1, 2, 3, 4, 5, 6, 7]);
        assert_eq!(
            serde_json::to_string(&span_id).unwrap(),
            "\"0001020304050607\""
        );
    }

    #[test]
    fn test_sampled_flag_is_not_serialized() {
        let ctx = TraceContext {
            sampled: Some(true),
            ..Default::default()
        };
        let json = serde_json::to_value(&ctx).unwrap();
        assert!(json.get("sampled").is_none());
        assert!(json.get("trace_id").is_some());
    }
}
