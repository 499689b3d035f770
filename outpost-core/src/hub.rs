use std::sync::{Arc, PoisonError, RwLock};
use std::time::Duration;

use crate::client::EventHint;
use crate::hub_impl::HubImpl;
use crate::protocol::{CheckIn, Event, EventType, Level, Log, MonitorConfig, TraceMetric};
use crate::{Integration, IntoBreadcrumbs, Scope, ScopeGuard};
use uuid::Uuid;

/// The central object that manages scopes and clients.
///
/// This can be used to capture events and manage the scope.  This object is
/// [`Send`] and [`Sync`] so it can be used from multiple threads if needed.
///
/// Each thread has its own thread-local ( see [`Hub::current`]) hub, which is
/// automatically derived from the main hub ([`Hub::main`]).
///
/// In most situations, developers do not need to interface with the hub directly.  Instead
/// toplevel convenience functions are exposed that will automatically dispatch
/// to the thread-local ([`Hub::current`]) hub.  In some situations, this might not be
/// possible, in which case it might become necessary to manually work with the
/// hub.  This is for instance the case when working with async code.
///
/// Hubs that are wrapped in [`Arc`]s can be bound to the current thread with
/// the `run` static method.
///
/// A hub is meant to be used by one thread or task at a time. To hand the
/// current context to concurrent work, create a copy with [`Clone`] or
/// [`Hub::new_from_top`] first; the copy has an independent scope stack
/// that shares the same client.
#[derive(Debug)]
pub struct Hub {
    pub(crate) inner: HubImpl,
    pub(crate) last_event_id: RwLock<Option<Uuid>>,
}

impl Clone for Hub {
    /// Deep-copies the whole scope stack; the client is shared.
    fn clone(&self) -> Self {
        let stack = self.inner.with(|stack| stack.clone());
        Hub {
            inner: HubImpl::from_stack(stack),
            last_event_id: RwLock::new(self.last_event_id()),
        }
    }
}

impl AsRef<Hub> for Hub {
    fn as_ref(&self) -> &Hub {
        self
    }
}

impl Hub {
    /// Like [`Hub::with`] but only calls the function if a client is bound.
    ///
    /// This is useful for integrations that want to do efficiently nothing if there is no
    /// client bound.  Additionally this internally ensures that the client can be safely
    /// synchronized.  This prevents accidental recursive calls into the client.
    pub fn with_active<F, R>(f: F) -> R
    where
        F: FnOnce(&Arc<Hub>) -> R,
        R: Default,
    {
        Hub::with(|hub| {
            if hub.is_active_and_usage_safe() {
                f(hub)
            } else {
                Default::default()
            }
        })
    }

    /// Looks up an integration on the hub.
    ///
    /// Calls the given function with the requested integration instance when it
    /// is active on the currently active client.
    ///
    /// See the global [`capture_event`](fn.capture_event.html)
    /// for more documentation.
    pub fn with_integration<I, F, R>(&self, f: F) -> R
    where
        I: Integration,
        F: FnOnce(&I) -> R,
        R: Default,
    {
        match self.client() {
            Some(client) => client.get_integration::<I>().map(f).unwrap_or_default(),
            None => Default::default(),
        }
    }

    /// Returns the last event id.
    pub fn last_event_id(&self) -> Option<Uuid> {
        *self
            .last_event_id
            .read()
            .unwrap_or_else(PoisonError::into_inner)
    }

    /// Sends the event to the current client with the current scope.
    ///
    /// In case no client is bound or the event was dropped along the way,
    /// the nil UUID is returned.
    ///
    /// See the global [`capture_event`](fn.capture_event.html)
    /// for more documentation.
    pub fn capture_event(&self, event: Event) -> Uuid {
        self.capture_event_with_hint(event, &EventHint::default())
    }

    /// Sends the event with an [`EventHint`] describing where it came from.
    ///
    /// The hint is handed to the `before_send` hooks.
    pub fn capture_event_with_hint(&self, event: Event, hint: &EventHint) -> Uuid {
        let (client, scope) = self.top();
        let Some(client) = client else {
            return Uuid::nil();
        };
        let event_id = client.process_event(event, hint, Some(&scope));
        if !event_id.is_nil() {
            *self
                .last_event_id
                .write()
                .unwrap_or_else(PoisonError::into_inner) = Some(event_id);
        }
        event_id
    }

    /// Captures an arbitrary message.
    ///
    /// See the global [`capture_message`](fn.capture_message.html)
    /// for more documentation.
    pub fn capture_message(&self, msg: &str, level: Level) -> Uuid {
        let event = Event {
            message: Some(msg.to_string()),
            level,
            ..Default::default()
        };
        self.capture_event(event)
    }

    /// Captures a structured log.
    ///
    /// The log is only sent if the client has logs enabled.
    pub fn capture_log(&self, log: Log) {
        if let (Some(client), scope) = self.top() {
            client.capture_log(log, &scope);
        }
    }

    /// Captures a trace metric.
    ///
    /// The metric is only sent if the client has metrics enabled.
    pub fn capture_metric(&self, metric: TraceMetric) {
        if let (Some(client), scope) = self.top() {
            client.capture_metric(metric, &scope);
        }
    }

    /// Captures a monitor check-in.
    ///
    /// A given `monitor_config` upserts the monitor together with the check-in.
    /// Returns the id of the check-in, which can be reused to complete an
    /// `InProgress` check-in, or the nil UUID if it was not sent.
    pub fn capture_check_in(
        &self,
        mut check_in: CheckIn,
        monitor_config: Option<MonitorConfig>,
    ) -> Uuid {
        if monitor_config.is_some() {
            check_in.monitor_config = monitor_config;
        }
        let check_in_id = check_in.check_in_id;
        let event = Event {
            ty: EventType::CheckIn,
            level: Level::Info,
            check_in: Some(check_in),
            ..Default::default()
        };
        if self.capture_event(event).is_nil() {
            Uuid::nil()
        } else {
            check_in_id
        }
    }

    /// Drains all queued items of the bound client, waiting at most `timeout`.
    ///
    /// Returns `true` if everything was handed to the network in time, and
    /// also when there is nothing to flush.
    pub fn flush(&self, timeout: Option<Duration>) -> bool {
        match self.client() {
            Some(client) => client.flush(timeout),
            None => true,
        }
    }

    /// Invokes a function that can modify the current scope.
    ///
    /// The scope is modified in place.
    ///
    /// See the global [`configure_scope`](fn.configure_scope.html)
    /// for more documentation.
    pub fn configure_scope<F, R>(&self, f: F) -> R
    where
        F: FnOnce(&mut Scope) -> R,
    {
        self.with_current_scope_mut(f)
    }

    /// Pushes a new scope.
    ///
    /// The new scope starts as a copy of the current one.  This returns a
    /// guard that when dropped will pop the scope again.
    pub fn push_scope(&self) -> ScopeGuard {
        self.inner.with_mut(|stack| {
            stack.push();
            ScopeGuard(Some((self.inner.stack.clone(), stack.depth())))
        })
    }

    /// Pops the topmost scope.
    ///
    /// Popping when only the base scope is left does nothing.  Prefer the
    /// guard returned by [`Hub::push_scope`].
    pub fn pop_scope(&self) {
        self.inner.with_mut(|stack| {
            if !stack.pop() {
                outpost_debug!("[Hub] Tried to pop the base scope, ignoring");
            }
        })
    }

    /// Temporarily pushes a scope for a single call optionally reconfiguring it.
    ///
    /// The scope is popped again on every exit path, including a panic
    /// unwinding through `callback`.
    ///
    /// See the global [`with_scope`](fn.with_scope.html)
    /// for more documentation.
    pub fn with_scope<C, F, R>(&self, scope_config: C, callback: F) -> R
    where
        C: FnOnce(&mut Scope),
        F: FnOnce() -> R,
    {
        let _guard = self.push_scope();
        self.configure_scope(scope_config);
        callback()
    }

    /// Adds a new breadcrumb to the current scope.
    ///
    /// The client's `before_breadcrumb` hook runs first, and the scope keeps
    /// at most `max_breadcrumbs` of them.
    ///
    /// See the global [`add_breadcrumb`](fn.add_breadcrumb.html)
    /// for more documentation.
    pub fn add_breadcrumb<B: IntoBreadcrumbs>(&self, breadcrumb: B) {
        self.inner.with_mut(|stack| {
            let top = stack.top_mut();
            if let Some(ref client) = top.client {
                let scope = Arc::make_mut(&mut top.scope);
                let options = client.options();
                for breadcrumb in breadcrumb.into_breadcrumbs() {
                    let breadcrumb_opt = match options.before_breadcrumb {
                        Some(ref callback) => callback(breadcrumb),
                        None => Some(breadcrumb),
                    };
                    if let Some(breadcrumb) = breadcrumb_opt {
                        scope.add_breadcrumb(breadcrumb, options.max_breadcrumbs);
                    }
                }
            }
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::protocol::Breadcrumb;
    use crate::test::with_captured_events;

    #[test]
    fn test_with_scope_pops_on_panic() {
        let hub = Hub::new(None, Default::default());
        let result = std::panic::catch_unwind(std::panic::AssertUnwindSafe(|| {
            hub.with_scope(
                |scope| scope.set_tag("inner", true),
                || panic!("boom"),
            )
        }));
        assert!(result.is_err());
        assert_eq!(hub.inner.with(|stack| stack.depth()), 0);
        hub.configure_scope(|scope| assert_eq!(scope.tag("inner"), None));
    }

    #[test]
    fn test_pop_scope_on_base_is_noop() {
        let hub = Hub::new(None, Default::default());
        hub.pop_scope();
        hub.pop_scope();
        let _guard = hub.push_scope();
        assert_eq!(hub.inner.with(|stack| stack.depth()), 1);
    }

    #[test]
    fn test_clone_is_independent() {
        let hub = Hub::new(None, Default::default());
        hub.configure_scope(|scope| scope.set_tag("a", 1));
        let _guard = hub.push_scope();
        hub.configure_scope(|scope| scope.set_tag("b", 2));

        let cloned = hub.clone();
        cloned.configure_scope(|scope| {
            scope.set_tag("a", "changed");
            scope.remove_tag("b");
        });
        cloned.pop_scope();

        hub.configure_scope(|scope| {
            assert_eq!(scope.tag("a"), Some("1"));
            assert_eq!(scope.tag("b"), Some("2"));
        });
        assert_eq!(hub.inner.with(|stack| stack.depth()), 1);
        assert_eq!(cloned.inner.with(|stack| stack.depth()), 0);
    }

    #[test]
    fn test_breadcrumbs_use_client_limit() {
        let events = crate::test::with_captured_events_options(
            || {
                let hub = Hub::current();
                for i in 0..5 {
                    hub.add_breadcrumb(Breadcrumb {
                        message: Some(i.to_string()),
                        ..Default::default()
                    });
                }
                hub.capture_message("hello", Level::Info);
            },
            crate::ClientOptions {
                max_breadcrumbs: 2,
                ..Default::default()
            },
        );
        let crumbs: Vec<_> = events[0]
            .breadcrumbs
            .iter()
            .map(|b| b.message.clone().unwrap())
            .collect();
        assert_eq!(crumbs, ["3", "4"]);
    }

    #[test]
    fn test_last_event_id() {
        let events = with_captured_events(|| {
            let hub = Hub::current();
            let id = hub.capture_message("hello", Level::Info);
            assert_eq!(hub.last_event_id(), Some(id));
        });
        assert_eq!(events.len(), 1);
    }
}
