use std::fmt;
use std::str;
use std::time::SystemTime;

use serde::{Deserialize, Serialize};
use thiserror::Error;
use uuid::Uuid;

use super::monitor::CheckIn;
use super::trace::{Span, TraceContext};
use super::{Map, Value};
use crate::utils::{ts_seconds_float, ts_seconds_float_opt};

/// Raised for an unknown level name.
#[derive(Debug, Error)]
#[error("invalid level")]
pub struct ParseLevelError;

/// Severity of an event or breadcrumb.
#[derive(Debug, Copy, Clone, Default, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum Level {
    /// Verbose diagnostics.
    Debug,
    /// Regular operation.
    #[default]
    Info,
    /// A warning.
    Warning,
    /// An error.
    Error,
    /// An error the process does not survive.
    Fatal,
}

impl str::FromStr for Level {
    type Err = ParseLevelError;

    fn from_str(string: &str) -> Result<Level, Self::Err> {
        Ok(match string {
            "debug" => Level::Debug,
            "info" | "log" => Level::Info,
            "warning" => Level::Warning,
            "error" => Level::Error,
            "fatal" => Level::Fatal,
            _ => return Err(ParseLevelError),
        })
    }
}

impl fmt::Display for Level {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        match *self {
            Level::Debug => write!(f, "debug"),
            Level::Info => write!(f, "info"),
            Level::Warning => write!(f, "warning"),
            Level::Error => write!(f, "error"),
            Level::Fatal => write!(f, "fatal"),
        }
    }
}

impl Level {
    /// Whether this is [`Level::Info`].
    pub fn is_info(&self) -> bool {
        *self == Level::Info
    }
}

impl Serialize for Level {
    fn serialize<S: serde::Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.collect_str(self)
    }
}

impl<'de> Deserialize<'de> for Level {
    fn deserialize<D: serde::Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let s = String::deserialize(deserializer)?;
        s.parse().map_err(serde::de::Error::custom)
    }
}

/// A record of something that happened before an event.
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
pub struct Breadcrumb {
    /// The timestamp of the breadcrumb.
    #[serde(default = "SystemTime::now", with = "ts_seconds_float")]
    pub timestamp: SystemTime,
    /// Breadcrumb type, `default` unless set.
    #[serde(rename = "type", default = "default_breadcrumb_type")]
    pub ty: String,
    /// A free-form category such as `http` or `db.query`.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub category: Option<String>,
    /// The level of the breadcrumb, defaulting to info.
    #[serde(default, skip_serializing_if = "Level::is_info")]
    pub level: Level,
    /// An optional human readable message for the breadcrumb.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub message: Option<String>,
    /// Arbitrary breadcrumb data that should be sent along.
    #[serde(default, skip_serializing_if = "Map::is_empty")]
    pub data: Map<String, Value>,
}

fn default_breadcrumb_type() -> String {
    "default".into()
}

impl Default for Breadcrumb {
    fn default() -> Breadcrumb {
        Breadcrumb {
            timestamp: SystemTime::now(),
            ty: default_breadcrumb_type(),
            category: None,
            level: Level::Info,
            message: None,
            data: Map::new(),
        }
    }
}

/// Represents user info.
#[derive(Serialize, Deserialize, Debug, Default, Clone, PartialEq)]
pub struct User {
    /// The ID of the user.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub id: Option<String>,
    /// Email address.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub email: Option<String>,
    /// Remote IP address.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub ip_address: Option<String>,
    /// Display name.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub username: Option<String>,
    /// Any other fields.
    #[serde(flatten)]
    pub other: Map<String, Value>,
}

/// A snapshot of the HTTP request being served.
#[derive(Serialize, Deserialize, Debug, Default, Clone, PartialEq)]
pub struct Request {
    /// Full request URL.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub url: Option<String>,
    /// Request method, e.g. `GET`.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub method: Option<String>,
    /// Optionally some associated request data (human readable).
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub data: Option<String>,
    /// Raw query string.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub query_string: Option<String>,
    /// Raw `Cookie` header.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub cookies: Option<String>,
    /// HTTP request headers.
    #[serde(default, skip_serializing_if = "Map::is_empty")]
    pub headers: Map<String, String>,
    /// Server environment variables.
    #[serde(default, skip_serializing_if = "Map::is_empty")]
    pub env: Map<String, String>,
}

/// Represents a single stack frame.
#[derive(Serialize, Deserialize, Debug, Default, Clone, PartialEq)]
pub struct Frame {
    /// Demangled function name.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub function: Option<String>,
    /// Raw symbol name, possibly mangled.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub symbol: Option<String>,
    /// Module path of the function.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub module: Option<String>,
    /// Source file name.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub filename: Option<String>,
    /// Absolute source path.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub abs_path: Option<String>,
    /// Line number.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub lineno: Option<u64>,
    /// Column number.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub colno: Option<u64>,
    /// Optionally changes the in_app behavior.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub in_app: Option<bool>,
}

/// Stack frames, innermost last.
#[derive(Serialize, Deserialize, Debug, Default, Clone, PartialEq)]
pub struct Stacktrace {
    /// The list of frames in the stacktrace, oldest first.
    #[serde(default)]
    pub frames: Vec<Frame>,
}

/// Represents the mechanism that captured an exception.
#[derive(Serialize, Deserialize, Debug, Default, Clone, PartialEq)]
pub struct Mechanism {
    /// How the error was captured, e.g. `panic`.
    #[serde(rename = "type")]
    pub ty: String,
    /// Free-form detail.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    /// `Some(false)` for errors that escaped all handlers.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub handled: Option<bool>,
    /// Mechanism specific data.
    #[serde(default, skip_serializing_if = "Map::is_empty")]
    pub data: Map<String, Value>,
}

/// One error of an error chain.
#[derive(Serialize, Deserialize, Debug, Default, Clone, PartialEq)]
pub struct Exception {
    /// Error type name.
    #[serde(rename = "type")]
    pub ty: String,
    /// Error message.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub value: Option<String>,
    /// Module the error type lives in.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub module: Option<String>,
    /// Where the error was raised.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub stacktrace: Option<Stacktrace>,
    /// The mechanism of the exception.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub mechanism: Option<Mechanism>,
}

/// Typed contextual data attached to an event.
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
#[serde(untagged)]
pub enum Context {
    /// Tracing context.
    Trace(Box<TraceContext>),
    /// Any other context, as a generic object.
    Other(Map<String, Value>),
}

impl From<TraceContext> for Context {
    fn from(data: TraceContext) -> Self {
        Context::Trace(Box::new(data))
    }
}

impl From<Map<String, Value>> for Context {
    fn from(data: Map<String, Value>) -> Self {
        Context::Other(data)
    }
}

/// Information about the SDK that produced an event.
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
pub struct ClientSdkInfo {
    /// The name of the SDK.
    pub name: String,
    /// SDK version.
    pub version: String,
    /// The names of the integrations that were enabled.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub integrations: Vec<String>,
}

/// The kind of an [`Event`].
#[derive(Debug, Copy, Clone, Default, PartialEq, Eq, Hash)]
pub enum EventType {
    /// A regular error or message event.
    #[default]
    Default,
    /// A finished transaction with its child spans.
    Transaction,
    /// A monitor check-in, which is routed as an event through the pipeline
    /// but sent as a `check_in` item.
    CheckIn,
}

/// Represents a full event.
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
pub struct Event {
    /// The ID of the event.
    #[serde(serialize_with = "serialize_event_id")]
    pub event_id: Uuid,
    /// What kind of item this event turns into.
    #[serde(skip)]
    pub ty: EventType,
    /// The level of the event (defaults to error).
    pub level: Level,
    /// Grouping override.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub fingerprint: Vec<String>,
    /// Where the event originated.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub culprit: Option<String>,
    /// Name of the transaction active when the event happened.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub transaction: Option<String>,
    /// Human readable message.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub message: Option<String>,
    /// Name of the logger that produced the event.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub logger: Option<String>,
    /// The platform identifier of this event.
    #[serde(default = "default_platform")]
    pub platform: String,
    /// The timestamp of when the event was created (or a transaction ended).
    #[serde(default = "SystemTime::now", with = "ts_seconds_float")]
    pub timestamp: SystemTime,
    /// The start timestamp of a transaction.
    #[serde(
        default,
        skip_serializing_if = "Option::is_none",
        with = "ts_seconds_float_opt"
    )]
    pub start_timestamp: Option<SystemTime>,
    /// Host the event happened on.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub server_name: Option<String>,
    /// A release identifier.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub release: Option<String>,
    /// Deployment environment, e.g. `production`.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub environment: Option<String>,
    /// The affected user.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub user: Option<User>,
    /// The request being served.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub request: Option<Request>,
    /// Optional contexts.
    #[serde(default, skip_serializing_if = "Map::is_empty")]
    pub contexts: Map<String, Context>,
    /// Breadcrumbs recorded before the event, oldest first.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub breadcrumbs: Vec<Breadcrumb>,
    /// The error chain, outermost error last.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub exception: Vec<Exception>,
    /// The stacktrace of the capturing thread, for events without exceptions.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub stacktrace: Option<Stacktrace>,
    /// Indexed key/value pairs.
    #[serde(default, skip_serializing_if = "Map::is_empty")]
    pub tags: Map<String, String>,
    /// Unindexed arbitrary data.
    #[serde(default, skip_serializing_if = "Map::is_empty")]
    pub extra: Map<String, Value>,
    /// The finished child spans of a transaction.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub spans: Vec<Span>,
    /// SDK metadata.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub sdk: Option<ClientSdkInfo>,
    /// The check-in payload of an [`EventType::CheckIn`] event.
    #[serde(skip)]
    pub check_in: Option<CheckIn>,
}

fn default_platform() -> String {
    "native".into()
}

fn serialize_event_id<S: serde::Serializer>(id: &Uuid, serializer: S) -> Result<S::Ok, S::Error> {
    serializer.collect_str(&id.as_simple())
}

impl Default for Event {
    fn default() -> Self {
        Event {
            event_id: crate::random_uuid(),
            ty: EventType::Default,
            level: Level::Error,
            fingerprint: Vec::new(),
            culprit: None,
            transaction: None,
            message: None,
            logger: None,
            platform: default_platform(),
            timestamp: SystemTime::now(),
            start_timestamp: None,
            server_name: None,
            release: None,
            environment: None,
            user: None,
            request: None,
            contexts: Map::new(),
            breadcrumbs: Vec::new(),
            exception: Vec::new(),
            stacktrace: None,
            tags: Map::new(),
            extra: Map::new(),
            spans: Vec::new(),
            sdk: None,
            check_in: None,
        }
    }
}

impl Event {
    /// A default event with a fresh id and the current time.
    pub fn new() -> Event {
        Default::default()
    }

    /// Returns the trace context of the event, if any.
    pub fn trace_context(&self) -> Option<&TraceContext> {
        match self.contexts.get("trace") {
            Some(Context::Trace(trace)) => Some(trace),
            _ => None,
        }
    }

    /// Returns the trace context of the event for modification, if any.
    pub fn trace_context_mut(&mut self) -> Option<&mut TraceContext> {
        match self.contexts.get_mut("trace") {
            Some(Context::Trace(trace)) => Some(trace),
            _ => None,
        }
    }
}

impl fmt::Display for Event {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(f, "Event(id: {}, ts: {:?})", self.event_id, self.timestamp)
    }
}
