use std::time::Duration;

use crate::protocol::{CheckIn, Event, Level, Log, MonitorConfig, TraceMetric};
use crate::types::Uuid;
use crate::{Hub, Integration, IntoBreadcrumbs, Scope};

/// Sends a fully built event through the client of the current hub.
///
/// Most callers want [`capture_error`](crate::capture_error) or
/// [`capture_message`] instead.  Returns the id the event was sent with, or
/// the nil UUID when there is no enabled client or the pipeline dropped it.
///
/// # Example
///
/// ```
/// use outpost_core::protocol::{Event, Level};
///
/// outpost_core::capture_event(Event {
///     message: Some("cache warmed".into()),
///     level: Level::Info,
///     ..Event::default()
/// });
/// ```
pub fn capture_event(event: Event) -> Uuid {
    Hub::with_active(|hub| hub.capture_event(event))
}

/// Sends a plain text event at `level` on the current hub.
pub fn capture_message(msg: &str, level: Level) -> Uuid {
    Hub::with_active(|hub| hub.capture_message(msg, level))
}

/// Captures a structured log on the current hub.
///
/// Usually the `logger_*!` macros are the more convenient way to do this.
pub fn capture_log(log: Log) {
    Hub::with_active(|hub| hub.capture_log(log))
}

/// Captures a trace metric on the current hub.
pub fn capture_metric(metric: TraceMetric) {
    Hub::with_active(|hub| hub.capture_metric(metric))
}

/// Captures a monitor check-in on the current hub.
///
/// Returns the check-in id, or the nil UUID if it was not sent.
///
/// # Example
///
/// ```
/// use outpost_core::protocol::{CheckIn, CheckInStatus};
///
/// let check_in_id = outpost_core::capture_check_in(
///     CheckIn::new("nightly-backup", CheckInStatus::InProgress),
///     None,
/// );
/// // no client is bound in this example
/// assert!(check_in_id.is_nil());
/// ```
pub fn capture_check_in(check_in: CheckIn, monitor_config: Option<MonitorConfig>) -> Uuid {
    Hub::with_active(|hub| hub.capture_check_in(check_in, monitor_config))
}

/// Appends breadcrumbs to the current scope.
///
/// Accepts a single [`Breadcrumb`](crate::protocol::Breadcrumb), a `Vec` or
/// an `Option` of them, or a closure producing any of these.  A closure is
/// only run when an enabled client is bound, so building the breadcrumb
/// costs nothing otherwise.  The client's `max_breadcrumbs` caps how many
/// the scope keeps; the oldest are evicted first.
///
/// # Example
///
/// ```
/// use outpost_core::protocol::{Breadcrumb, Map};
///
/// outpost_core::add_breadcrumb(|| Breadcrumb {
///     ty: "query".into(),
///     category: Some("db".into()),
///     data: {
///         let mut data = Map::new();
///         data.insert("table".into(), "orders".into());
///         data
///     },
///     ..Breadcrumb::default()
/// });
/// ```
pub fn add_breadcrumb<B: IntoBreadcrumbs>(breadcrumb: B) {
    Hub::with_active(|hub| hub.add_breadcrumb(breadcrumb))
}

/// Edits the top scope of the current hub in place.
///
/// Without an enabled client `f` is skipped and `R::default()` is returned.
///
/// # Example
///
/// ```
/// outpost_core::configure_scope(|scope| {
///     scope.set_user(Some(outpost_core::User {
///         id: Some("user-1138".into()),
///         ..outpost_core::User::default()
///     }));
/// });
/// ```
pub fn configure_scope<F, R>(f: F) -> R
where
    R: Default,
    F: FnOnce(&mut Scope) -> R,
{
    Hub::with_active(|hub| hub.configure_scope(f))
}

/// Runs `callback` under a temporary copy of the current scope.
///
/// `scope_config` edits the copy first; the copy is discarded when
/// `callback` returns or unwinds.  Handy for tagging a single capture:
///
/// ```
/// use outpost_core::{capture_message, with_scope, Level};
///
/// with_scope(
///     |scope| scope.set_tag("phase", "migrate"),
///     || capture_message("schema drift detected", Level::Warning),
/// );
/// ```
pub fn with_scope<C, F, R>(scope_config: C, callback: F) -> R
where
    C: FnOnce(&mut Scope),
    F: FnOnce() -> R,
{
    Hub::with(|hub| {
        if hub.is_active_and_usage_safe() {
            hub.with_scope(scope_config, callback)
        } else {
            callback()
        }
    })
}

/// Looks up an integration on the current hub.
///
/// Calls the given function with the requested integration instance when it
/// is active on the currently active client.
pub fn with_integration<I, F, R>(f: F) -> R
where
    I: Integration,
    F: FnOnce(&I) -> R,
    R: Default,
{
    Hub::with_active(|hub| hub.with_integration(f))
}

/// The id of the last event the current hub sent.
pub fn last_event_id() -> Option<Uuid> {
    Hub::with(|hub| hub.last_event_id())
}

/// Drains the queues of the current client, waiting at most `timeout`.
///
/// Without a timeout the client's `shutdown_timeout` applies.  Returns
/// `true` when everything was handed off in time.
pub fn flush(timeout: Option<Duration>) -> bool {
    Hub::with(|hub| hub.flush(timeout))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::protocol::{CheckInStatus, EnvelopeItem, MonitorSchedule};
    use crate::test::{with_captured_envelopes, with_captured_events};
    use crate::ClientOptions;

    #[test]
    fn test_without_client_is_inert() {
        let hub = std::sync::Arc::new(Hub::new(None, Default::default()));
        Hub::run(hub, || {
            assert!(capture_message("nobody listens", Level::Error).is_nil());
            assert_eq!(configure_scope(|_| 42), 0);
            assert_eq!(with_scope(|_| {}, || 7), 7);
            assert_eq!(last_event_id(), None);
            assert!(flush(Some(Duration::from_millis(10))));
        });
    }

    #[test]
    fn test_flush_with_unbounded_timeout() {
        let options = ClientOptions {
            enable_logs: true,
            ..Default::default()
        };
        let envelopes = crate::test::with_captured_envelopes_options(
            || {
                capture_message("before flush", Level::Info);
                assert!(flush(Some(Duration::MAX)));
            },
            options,
        );
        assert_eq!(envelopes.len(), 1);
    }

    #[test]
    fn test_with_scope_only_affects_callback() {
        let events = with_captured_events(|| {
            with_scope(
                |scope| scope.set_level(Some(Level::Warning)),
                || capture_message("inside", Level::Info),
            );
            capture_message("outside", Level::Info);
        });
        assert_eq!(events.len(), 2);
        assert_eq!(events[0].level, Level::Warning);
        assert_eq!(events[1].level, Level::Info);
    }

    #[test]
    fn test_last_event_id() {
        let mut captured = Uuid::nil();
        let events = with_captured_events(|| {
            captured = capture_message("hello", Level::Info);
            assert_eq!(last_event_id(), Some(captured));
        });
        assert_eq!(events[0].event_id, captured);
    }

    #[test]
    fn test_check_in_with_monitor_config() {
        let mut check_in_id = Uuid::nil();
        let envelopes = with_captured_envelopes(|| {
            let config = MonitorConfig {
                schedule: MonitorSchedule::Crontab {
                    value: "0 3 * * *".into(),
                },
                checkin_margin: Some(5),
                max_runtime: None,
                timezone: None,
            };
            check_in_id = capture_check_in(
                CheckIn::new("nightly-backup", CheckInStatus::InProgress),
                Some(config),
            );
        });
        assert!(!check_in_id.is_nil());
        assert_eq!(envelopes.len(), 1);
        let check_in = match envelopes[0].items().next() {
            Some(EnvelopeItem::CheckIn(check_in)) => check_in,
            other => panic!("expected a check-in, got {other:?}"),
        };
        assert_eq!(check_in.check_in_id, check_in_id);
        assert_eq!(check_in.monitor_slug, "nightly-backup");
        assert!(check_in.monitor_config.is_some());
    }

    #[test]
    fn test_check_in_not_sampled() {
        let options = ClientOptions {
            sample_rate: 0.0,
            ..Default::default()
        };
        let envelopes = crate::test::with_captured_envelopes_options(
            || {
                capture_check_in(CheckIn::new("job", CheckInStatus::Ok), None);
                capture_message("sampled out", Level::Error);
            },
            options,
        );
        assert_eq!(envelopes.len(), 1);
    }
}
