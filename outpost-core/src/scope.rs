use std::collections::VecDeque;
use std::fmt;
use std::sync::{Arc, PoisonError, RwLock};

use crate::performance::{SentryTrace, TraceHeadersIter, TransactionOrSpan};
use crate::protocol::{
    Breadcrumb, Context, Event, EventType, Level, Log, LogAttribute, Map, Request, TraceContext,
    TraceMetric, User, Value,
};
use crate::Client;

/// A callback that can modify or drop an event before it is sent.
///
/// Returning `None` drops the event and skips all later processors.
pub type EventProcessor = Arc<dyn Fn(Event) -> Option<Event> + Send + Sync>;

/// Holds contextual data for the current scope.
///
/// The scope is an object that can be cloned efficiently and stores data that
/// is locally relevant to an event.  For instance the scope will hold recorded
/// breadcrumbs and similar information.
///
/// All containers are shared copy-on-write, so a clone is independent of the
/// scope it was cloned from: mutating one never shows through in the other.
///
/// The scope can be interacted with in two ways:
///
/// 1. the scope is routinely updated with information by functions such as
///    [`add_breadcrumb`] which will modify the currently top-most scope.
/// 2. the topmost scope can also be configured through the [`configure_scope`]
///    method.
///
/// [`add_breadcrumb`]: fn.add_breadcrumb.html
/// [`configure_scope`]: fn.configure_scope.html
#[derive(Clone, Default)]
pub struct Scope {
    pub(crate) level: Option<Level>,
    pub(crate) fingerprint: Option<Arc<[String]>>,
    pub(crate) transaction: Option<Arc<str>>,
    pub(crate) breadcrumbs: Arc<VecDeque<Breadcrumb>>,
    pub(crate) user: Option<Arc<User>>,
    pub(crate) extra: Arc<Map<String, Value>>,
    pub(crate) tags: Arc<Map<String, String>>,
    pub(crate) contexts: Arc<Map<String, Context>>,
    pub(crate) request: Option<Arc<Request>>,
    pub(crate) event_processors: Arc<Vec<EventProcessor>>,
    pub(crate) span: Arc<Option<TransactionOrSpan>>,
    pub(crate) propagation_context: SentryTrace,
}

impl fmt::Debug for Scope {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Scope")
            .field("level", &self.level)
            .field("fingerprint", &self.fingerprint)
            .field("transaction", &self.transaction)
            .field("breadcrumbs", &self.breadcrumbs)
            .field("user", &self.user)
            .field("extra", &self.extra)
            .field("tags", &self.tags)
            .field("contexts", &self.contexts)
            .field("request", &self.request)
            .field("event_processors", &self.event_processors.len())
            .field("span", &self.span)
            .field("propagation_context", &self.propagation_context)
            .finish()
    }
}

#[derive(Debug, Clone)]
pub(crate) struct StackLayer {
    pub client: Option<Arc<Client>>,
    pub scope: Arc<Scope>,
}

/// The layered (client, scope) stack of a hub.
///
/// There is always a base layer; popping it is a no-op.
#[derive(Debug, Clone)]
pub(crate) struct Stack {
    top: StackLayer,
    layers: Vec<StackLayer>,
}

impl Stack {
    pub fn from_client_and_scope(client: Option<Arc<Client>>, scope: Arc<Scope>) -> Stack {
        Stack {
            top: StackLayer { client, scope },
            layers: vec![],
        }
    }

    pub fn push(&mut self) {
        let layer = self.top.clone();
        self.layers.push(layer);
    }

    /// Pops the top layer, returning `false` if only the base layer is left.
    pub fn pop(&mut self) -> bool {
        match self.layers.pop() {
            Some(layer) => {
                self.top = layer;
                true
            }
            None => false,
        }
    }

    #[inline(always)]
    pub fn top(&self) -> &StackLayer {
        &self.top
    }

    #[inline(always)]
    pub fn top_mut(&mut self) -> &mut StackLayer {
        &mut self.top
    }

    pub fn depth(&self) -> usize {
        self.layers.len()
    }
}

/// A scope guard.
///
/// This is returned from [`Hub::push_scope`] and will automatically pop the
/// scope on drop, including when the stack unwinds.
///
/// [`Hub::push_scope`]: crate::Hub::push_scope
#[derive(Default)]
pub struct ScopeGuard(pub(crate) Option<(Arc<RwLock<Stack>>, usize)>);

impl fmt::Debug for ScopeGuard {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "ScopeGuard")
    }
}

impl Drop for ScopeGuard {
    fn drop(&mut self) {
        if let Some((stack, depth)) = self.0.take() {
            let mut stack = stack.write().unwrap_or_else(PoisonError::into_inner);
            // a guard only pops the layer it pushed
            if stack.depth() == depth {
                stack.pop();
            } else {
                outpost_debug!(
                    "[Scope] Scope guard dropped out of order (depth {} != {})",
                    stack.depth(),
                    depth
                );
            }
        }
    }
}

impl Scope {
    /// Clear the scope.
    ///
    /// By default a scope will inherit all values from the higher scope.
    /// In some situations this might not be what a user wants.  Calling
    /// this method will wipe all data contained within.
    pub fn clear(&mut self) {
        *self = Default::default();
    }

    /// Deletes current breadcrumbs from the scope.
    pub fn clear_breadcrumbs(&mut self) {
        self.breadcrumbs = Default::default();
    }

    /// Adds a breadcrumb, evicting the oldest ones beyond `max_breadcrumbs`.
    ///
    /// A `max_breadcrumbs` of zero disables breadcrumbs entirely.
    pub fn add_breadcrumb(&mut self, breadcrumb: Breadcrumb, max_breadcrumbs: usize) {
        if max_breadcrumbs == 0 {
            return;
        }
        let breadcrumbs = Arc::make_mut(&mut self.breadcrumbs);
        breadcrumbs.push_back(breadcrumb);
        while breadcrumbs.len() > max_breadcrumbs {
            breadcrumbs.pop_front();
        }
    }

    /// Returns the recorded breadcrumbs, oldest first.
    pub fn breadcrumbs(&self) -> impl Iterator<Item = &Breadcrumb> {
        self.breadcrumbs.iter()
    }

    /// Sets a level override.
    pub fn set_level(&mut self, level: Option<Level>) {
        self.level = level;
    }

    /// Sets the fingerprint.
    pub fn set_fingerprint(&mut self, fingerprint: Option<&[&str]>) {
        self.fingerprint = fingerprint.map(|fp| fp.iter().map(|s| (*s).to_owned()).collect())
    }

    /// Sets the transaction.
    pub fn set_transaction(&mut self, transaction: Option<&str>) {
        self.transaction = transaction.map(Arc::from);
    }

    /// Sets the user for the current scope.
    pub fn set_user(&mut self, user: Option<User>) {
        self.user = user.map(Arc::new);
    }

    /// Retrieves the user of the current scope.
    pub fn user(&self) -> Option<&User> {
        self.user.as_deref()
    }

    /// Sets the HTTP request snapshot for the current scope.
    pub fn set_request(&mut self, request: Option<Request>) {
        self.request = request.map(Arc::new);
    }

    /// Sets a tag to a specific value.
    pub fn set_tag<V: ToString>(&mut self, key: &str, value: V) {
        Arc::make_mut(&mut self.tags).insert(key.to_string(), value.to_string());
    }

    /// Sets multiple tags at once.
    pub fn set_tags<I, K, V>(&mut self, tags: I)
    where
        I: IntoIterator<Item = (K, V)>,
        K: Into<String>,
        V: ToString,
    {
        let map = Arc::make_mut(&mut self.tags);
        for (key, value) in tags {
            map.insert(key.into(), value.to_string());
        }
    }

    /// Removes a tag.
    ///
    /// If the tag is not set, does nothing.
    pub fn remove_tag(&mut self, key: &str) {
        Arc::make_mut(&mut self.tags).remove(key);
    }

    /// Returns the value of a tag, if set.
    pub fn tag(&self, key: &str) -> Option<&str> {
        self.tags.get(key).map(String::as_str)
    }

    /// Sets a context for a key.
    pub fn set_context<C: Into<Context>>(&mut self, key: &str, value: C) {
        Arc::make_mut(&mut self.contexts).insert(key.to_string(), value.into());
    }

    /// Removes a context for a key.
    pub fn remove_context(&mut self, key: &str) {
        Arc::make_mut(&mut self.contexts).remove(key);
    }

    /// Sets a extra to a specific value.
    pub fn set_extra(&mut self, key: &str, value: Value) {
        Arc::make_mut(&mut self.extra).insert(key.to_string(), value);
    }

    /// Sets multiple extras at once.
    pub fn set_extras<I, K>(&mut self, extras: I)
    where
        I: IntoIterator<Item = (K, Value)>,
        K: Into<String>,
    {
        let map = Arc::make_mut(&mut self.extra);
        for (key, value) in extras {
            map.insert(key.into(), value);
        }
    }

    /// Removes a extra.
    pub fn remove_extra(&mut self, key: &str) {
        Arc::make_mut(&mut self.extra).remove(key);
    }

    /// Add an event processor to the scope.
    ///
    /// Processors run in registration order when the scope is applied to an
    /// event.
    pub fn add_event_processor<F>(&mut self, f: F)
    where
        F: Fn(Event) -> Option<Event> + Send + Sync + 'static,
    {
        Arc::make_mut(&mut self.event_processors).push(Arc::new(f));
    }

    /// Set the given [`TransactionOrSpan`] as the active span for this scope.
    pub fn set_span(&mut self, span: Option<TransactionOrSpan>) {
        self.span = Arc::new(span);
    }

    /// Returns the currently active span.
    pub fn get_span(&self) -> Option<TransactionOrSpan> {
        self.span.as_ref().clone()
    }

    /// Applies the contained scoped data to fill an event.
    ///
    /// Returns `None` if one of the event processors dropped the event.
    pub fn apply_to_event(&self, mut event: Event) -> Option<Event> {
        if event.fingerprint.is_empty() {
            if let Some(fp) = self.fingerprint.as_deref() {
                event.fingerprint = fp.to_vec();
            }
        }

        if event.user.is_none() {
            if let Some(user) = self.user.as_deref() {
                event.user = Some(user.clone());
            }
        }

        if let Some(level) = self.level {
            event.level = level;
        }

        event
            .tags
            .extend(self.tags.iter().map(|(k, v)| (k.to_owned(), v.to_owned())));
        event
            .extra
            .extend(self.extra.iter().map(|(k, v)| (k.to_owned(), v.to_owned())));
        let keep_trace = event.ty == EventType::Transaction;
        for (key, context) in self.contexts.iter() {
            if keep_trace && key == "trace" && event.contexts.contains_key("trace") {
                continue;
            }
            event.contexts.insert(key.to_owned(), context.to_owned());
        }

        if event.transaction.is_none() {
            if let Some(txn) = self.transaction.as_deref() {
                event.transaction = Some(txn.to_owned());
            }
        }

        if event.request.is_none() {
            if let Some(request) = self.request.as_deref() {
                event.request = Some(request.clone());
            }
        }

        match self.span.as_ref() {
            Some(span) => span.apply_to_event(&mut event),
            None => self.apply_propagation_context(&mut event),
        }

        if event.ty == EventType::Default {
            event.breadcrumbs.extend(self.breadcrumbs.iter().cloned());
        }

        for processor in self.event_processors.iter() {
            let id = event.event_id;
            event = match processor(event) {
                Some(event) => event,
                None => {
                    outpost_debug!("[Scope] Event processor dropped event {}", id);
                    return None;
                }
            }
        }

        Some(event)
    }

    /// Applies the contained scoped data to a log, setting the `trace_id` and
    /// certain default attributes.
    pub fn apply_to_log(&self, log: &mut Log, send_default_pii: bool) {
        let (trace_id, span_id) = match self.span.as_ref() {
            Some(span) => (span.get_trace_id(), Some(span.get_span_id())),
            None => (self.propagation_context.trace_id(), None),
        };
        log.trace_id.get_or_insert(trace_id);

        if let Some(span_id) = span_id {
            log.attributes
                .entry("sentry.trace.parent_span_id".to_owned())
                .or_insert_with(|| LogAttribute(span_id.to_string().into()));
        }

        if send_default_pii {
            if let Some(user) = self.user.as_deref() {
                let fields = [
                    ("user.id", &user.id),
                    ("user.name", &user.username),
                    ("user.email", &user.email),
                ];
                for (key, value) in fields {
                    if let Some(value) = value {
                        log.attributes
                            .entry(key.to_owned())
                            .or_insert_with(|| LogAttribute(value.clone().into()));
                    }
                }
            }
        }
    }

    /// Correlates a metric with the active trace and span.
    pub fn apply_to_metric(&self, metric: &mut TraceMetric) {
        match self.span.as_ref() {
            Some(span) => {
                metric.trace_id = span.get_trace_id();
                metric.span_id.get_or_insert(span.get_span_id());
            }
            None => metric.trace_id = self.propagation_context.trace_id(),
        }
    }

    pub(crate) fn apply_propagation_context(&self, event: &mut Event) {
        if event.contexts.contains_key("trace") {
            return;
        }

        let context = TraceContext {
            trace_id: self.propagation_context.trace_id(),
            span_id: self.propagation_context.span_id(),
            ..Default::default()
        };
        event.contexts.insert("trace".into(), context.into());
    }

    /// Returns the headers needed for distributed tracing.
    pub fn iter_trace_propagation_headers(&self) -> TraceHeadersIter {
        match self.get_span() {
            Some(span) => span.iter_headers(),
            None => TraceHeadersIter::new(self.propagation_context.to_string()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn crumb(message: &str) -> Breadcrumb {
        Breadcrumb {
            message: Some(message.into()),
            ..Default::default()
        }
    }

    #[test]
    fn test_breadcrumbs_are_capped() {
        let mut scope = Scope::default();
        for i in 0..10 {
            scope.add_breadcrumb(crumb(&i.to_string()), 3);
        }
        let messages: Vec<_> = scope
            .breadcrumbs()
            .map(|b| b.message.as_deref().unwrap())
            .collect();
        assert_eq!(messages, ["7", "8", "9"]);

        scope.add_breadcrumb(crumb("ignored"), 0);
        assert_eq!(scope.breadcrumbs().count(), 3);
    }

    #[test]
    fn test_clone_is_independent() {
        let mut original = Scope::default();
        original.set_tag("shared", "yes");
        original.add_breadcrumb(crumb("first"), 10);

        let mut cloned = original.clone();
        cloned.set_tag("shared", "no");
        cloned.set_tag("only_clone", 1);
        cloned.add_breadcrumb(crumb("second"), 10);
        cloned.add_event_processor(|_| None);

        assert_eq!(original.tag("shared"), Some("yes"));
        assert_eq!(original.tag("only_clone"), None);
        assert_eq!(original.breadcrumbs().count(), 1);
        assert!(original.apply_to_event(Event::new()).is_some());

        assert_eq!(cloned.tag("shared"), Some("no"));
        assert_eq!(cloned.breadcrumbs().count(), 2);
        assert!(cloned.apply_to_event(Event::new()).is_none());
    }

    #[test]
    fn test_apply_to_event_merges_in_order() {
        let mut scope = Scope::default();
        scope.set_fingerprint(Some(&["scope-fp"]));
        scope.set_user(Some(User {
            id: Some("scope-user".into()),
            ..Default::default()
        }));
        scope.set_tag("env", "scope");
        scope.set_extra("answer", 42.into());
        scope.set_level(Some(Level::Warning));
        scope.add_breadcrumb(crumb("crumb"), 10);

        let mut event = Event::new();
        event.fingerprint = vec!["event-fp".into()];
        event.tags.insert("env".into(), "event".into());
        event.tags.insert("own".into(), "kept".into());

        let event = scope.apply_to_event(event).unwrap();
        assert_eq!(event.fingerprint, ["event-fp"]);
        assert_eq!(event.user.as_ref().unwrap().id.as_deref(), Some("scope-user"));
        assert_eq!(event.tags["env"], "scope");
        assert_eq!(event.tags["own"], "kept");
        assert_eq!(event.extra["answer"], 42);
        assert_eq!(event.level, Level::Warning);
        assert_eq!(event.breadcrumbs.len(), 1);
        assert!(event.trace_context().is_some());
    }

    #[test]
    fn test_event_processors_short_circuit() {
        use std::sync::atomic::{AtomicUsize, Ordering};

        static CALLS: AtomicUsize = AtomicUsize::new(0);

        let mut scope = Scope::default();
        scope.add_event_processor(|mut event| {
            CALLS.fetch_add(1, Ordering::SeqCst);
            event.message = Some("first".into());
            Some(event)
        });
        scope.add_event_processor(|event| {
            CALLS.fetch_add(1, Ordering::SeqCst);
            if event.message.as_deref() == Some("first") {
                None
            } else {
                Some(event)
            }
        });
        scope.add_event_processor(|event| {
            CALLS.fetch_add(1, Ordering::SeqCst);
            Some(event)
        });

        assert!(scope.apply_to_event(Event::new()).is_none());
        assert_eq!(CALLS.load(Ordering::SeqCst), 2);
    }

    #[test]
    fn test_stack_pop_on_base_is_noop() {
        let mut stack = Stack::from_client_and_scope(None, Default::default());
        assert!(!stack.pop());
        stack.push();
        assert_eq!(stack.depth(), 1);
        assert!(stack.pop());
        assert!(!stack.pop());
        assert_eq!(stack.depth(), 0);
    }
}
