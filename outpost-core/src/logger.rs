//! Macros for structured logging.
//!
//! Logs are only captured when the bound client has `enable_logs` set.  They
//! are batched by the client's log emitter and sent as `log` envelope items.

use crate::protocol::{Log, LogAttribute, LogLevel, Map};
use crate::Hub;

#[doc(hidden)]
pub fn __capture_log(level: LogLevel, body: String, attributes: Map<String, LogAttribute>) {
    Hub::with_active(|hub| {
        let mut log = Log::new(level, body);
        log.attributes = attributes;
        hub.capture_log(log)
    })
}

// Helper macro to capture a log at the given level. Should not be used directly.
#[doc(hidden)]
#[macro_export]
macro_rules! logger_log {
    // No more attributes, simple message
    (@attrs $attrs:ident, $level:expr, $msg:literal) => {{
        $crate::logger::__capture_log($level, ::std::string::String::from($msg), $attrs)
    }};

    // No more attributes, format string with arguments
    (@attrs $attrs:ident, $level:expr, $fmt:literal, $($arg:expr),+ $(,)?) => {{
        $attrs.insert(
            "sentry.message.template".to_owned(),
            $crate::protocol::LogAttribute($crate::protocol::Value::from($fmt)),
        );
        for (i, value) in [$($crate::protocol::Value::from($arg)),+].into_iter().enumerate() {
            $attrs.insert(
                ::std::format!("sentry.message.parameter.{}", i),
                $crate::protocol::LogAttribute(value),
            );
        }
        $crate::logger::__capture_log($level, ::std::format!($fmt, $($arg),+), $attrs)
    }};

    // One `key = value` attribute, then the rest
    (@attrs $attrs:ident, $level:expr, $($key:ident).+ = $value:expr, $($rest:tt)+) => {{
        $attrs.insert(
            ::std::stringify!($($key).+).to_owned(),
            $crate::protocol::LogAttribute($crate::protocol::Value::from($value)),
        );
        $crate::logger_log!(@attrs $attrs, $level, $($rest)+)
    }};

    // Entry point
    ($level:expr, $($rest:tt)+) => {{
        #[allow(unused_mut)]
        let mut attributes = $crate::protocol::Map::new();
        $crate::logger_log!(@attrs attributes, $level, $($rest)+)
    }};
}

/// Captures a log at the trace level.
///
/// Attributes go first with the `key = value` syntax; keys may contain
/// dots.  The message is a string literal, optionally a format string
/// followed by its arguments.
///
/// # Examples
///
/// ```
/// use outpost_core::logger_trace;
///
/// logger_trace!("Entering {}", "handler");
/// logger_trace!(db.system = "postgres", rows = 3, "query done");
/// ```
#[macro_export]
macro_rules! logger_trace {
    ($($arg:tt)+) => {
        $crate::logger_log!($crate::protocol::LogLevel::Trace, $($arg)+)
    };
}

/// Captures a log at the debug level.
///
/// See [`logger_trace!`](crate::logger_trace) for the syntax.
#[macro_export]
macro_rules! logger_debug {
    ($($arg:tt)+) => {
        $crate::logger_log!($crate::protocol::LogLevel::Debug, $($arg)+)
    };
}

/// Captures a log at the info level.
///
/// See [`logger_trace!`](crate::logger_trace) for the syntax.
#[macro_export]
macro_rules! logger_info {
    ($($arg:tt)+) => {
        $crate::logger_log!($crate::protocol::LogLevel::Info, $($arg)+)
    };
}

/// Captures a log at the warn level.
///
/// See [`logger_trace!`](crate::logger_trace) for the syntax.
#[macro_export]
macro_rules! logger_warn {
    ($($arg:tt)+) => {
        $crate::logger_log!($crate::protocol::LogLevel::Warn, $($arg)+)
    };
}

/// Captures a log at the error level.
///
/// See [`logger_trace!`](crate::logger_trace) for the syntax.
#[macro_export]
macro_rules! logger_error {
    ($($arg:tt)+) => {
        $crate::logger_log!($crate::protocol::LogLevel::Error, $($arg)+)
    };
}

/// Captures a log at the fatal level.
///
/// See [`logger_trace!`](crate::logger_trace) for the syntax.
#[macro_export]
macro_rules! logger_fatal {
    ($($arg:tt)+) => {
        $crate::logger_log!($crate::protocol::LogLevel::Fatal, $($arg)+)
    };
}

#[cfg(test)]
mod tests {
    use crate::protocol::{EnvelopeItem, Log, LogAttribute, LogLevel, Value};
    use crate::test::with_captured_envelopes_options;
    use crate::ClientOptions;

    fn captured_logs(f: impl FnOnce()) -> Vec<Log> {
        let envelopes = with_captured_envelopes_options(
            f,
            ClientOptions {
                enable_logs: true,
                ..Default::default()
            },
        );
        envelopes
            .iter()
            .flat_map(|envelope| envelope.items())
            .filter_map(|item| match item {
                EnvelopeItem::Logs(logs) => Some(logs.clone()),
                _ => None,
            })
            .flatten()
            .collect()
    }

    #[test]
    fn test_simple_message() {
        let logs = captured_logs(|| logger_info!("Hello world"));
        assert_eq!(logs.len(), 1);
        assert_eq!(logs[0].level, LogLevel::Info);
        assert_eq!(logs[0].body, "Hello world");
        assert!(!logs[0].attributes.contains_key("sentry.message.template"));
    }

    #[test]
    fn test_format_args_and_attributes() {
        let logs = captured_logs(|| {
            logger_warn!(user.id = 42, flag = true, "{} of {} done", 3, 5);
        });
        assert_eq!(logs.len(), 1);
        let log = &logs[0];
        assert_eq!(log.level, LogLevel::Warn);
        assert_eq!(log.body, "3 of 5 done");
        assert_eq!(log.attributes["user.id"], LogAttribute(Value::from(42)));
        assert_eq!(log.attributes["flag"], LogAttribute(Value::from(true)));
        assert_eq!(
            log.attributes["sentry.message.template"],
            LogAttribute(Value::from("{} of {} done"))
        );
        assert_eq!(
            log.attributes["sentry.message.parameter.1"],
            LogAttribute(Value::from(5))
        );
    }

    #[test]
    fn test_all_levels() {
        let logs = captured_logs(|| {
            logger_trace!("t");
            logger_debug!("d");
            logger_info!("i");
            logger_warn!("w");
            logger_error!("e");
            logger_fatal!("f");
        });
        let levels: Vec<_> = logs.iter().map(|log| log.level).collect();
        assert_eq!(
            levels,
            [
                LogLevel::Trace,
                LogLevel::Debug,
                LogLevel::Info,
                LogLevel::Warn,
                LogLevel::Error,
                LogLevel::Fatal
            ]
        );
    }
}
