use std::any::TypeId;
use std::borrow::Cow;
use std::collections::HashSet;
use std::fmt;
use std::panic::RefUnwindSafe;
use std::sync::{Arc, PoisonError, RwLock};
use std::time::{Duration, Instant};

use regex::Regex;

use crate::backtrace_support::current_stacktrace;
use crate::clientoptions::ConfigError;
use crate::constants::SDK_INFO;
use crate::emitter::{deadline_after, BatchConfig, BatchEmitter};
use crate::performance::TransactionContext;
use crate::protocol::{
    ClientSdkInfo, DataCategory, EnvelopeItem, Event, EventType, Log, LogAttribute, Map,
    TraceMetric,
};
use crate::sampler::{sample_should_send, transaction_sample_rate};
use crate::types::{random_uuid, Dsn, Uuid};
use crate::{ClientOptions, Envelope, Hub, Integration, IntoClientOptions, Scope, Transport};

pub(crate) type TransportArc = Arc<RwLock<Option<Arc<dyn Transport>>>>;

/// Additional information about where an event came from.
///
/// Handed to the `before_send` hooks next to the event itself.
#[derive(Debug, Clone, Default)]
pub struct EventHint {
    /// A rendering of the error or panic payload the event was created from.
    pub original: Option<String>,
    /// The capture mechanism, e.g. `panic`.
    pub mechanism: Option<Cow<'static, str>>,
}

/// The Outpost client.
///
/// The client is responsible for event processing and for handing events to
/// the configured [`Transport`].  It can be created from a [`ClientOptions`].
///
/// # Examples
///
/// ```
/// let client = outpost_core::Client::with_options(Default::default());
/// assert!(!client.is_enabled());
/// ```
pub struct Client {
    options: ClientOptions,
    transport: TransportArc,
    logs: Option<BatchEmitter<Log>>,
    metrics: Option<BatchEmitter<TraceMetric>>,
    integrations: Vec<(TypeId, Arc<dyn Integration>)>,
    ignore_errors: Vec<Regex>,
    ignore_transactions: Vec<Regex>,
    pub(crate) sdk_info: ClientSdkInfo,
}

impl fmt::Debug for Client {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Client")
            .field("dsn", &self.dsn())
            .field("options", &self.options)
            .finish()
    }
}

impl Client {
    /// Creates a new client from anything convertible into options.
    ///
    /// # Supported Configs
    ///
    /// * `ClientOptions`: configure the client with the given client options.
    /// * `()` or empty string: disable the client.
    /// * `&str` / `String` / `Dsn`: configure the client with the given DSN.
    /// * `(dsn, ClientOptions)`: the DSN together with further options.
    pub fn from_config<O: IntoClientOptions>(opts: O) -> Result<Client, ConfigError> {
        Client::try_with_options(opts.into_client_options()?)
    }

    /// Creates a new client for the given options.
    ///
    /// Invalid options are logged and yield a disabled client.  Use
    /// [`Client::try_with_options`] to get the error instead.
    pub fn with_options(options: ClientOptions) -> Client {
        let fallback = options.clone();
        Client::try_with_options(options).unwrap_or_else(|err| {
            tracing::warn!(target: "outpost", "[Client] Invalid options, client disabled: {}", err);
            Client::disabled(fallback)
        })
    }

    /// Creates a new client for the given options, validating them first.
    ///
    /// If the DSN on the options is `None` the client is created but stays
    /// entirely disabled.
    pub fn try_with_options(mut options: ClientOptions) -> Result<Client, ConfigError> {
        let ignore = options.compile()?;
        outpost_debug!(
            "[Client] Creating new client, dsn={:?}",
            options.dsn.as_ref().map(|dsn| dsn.to_string())
        );

        // Create the main hub eagerly so that it is never first touched from
        // the transport thread
        Hub::with(|_| {});

        let mut sdk_info = SDK_INFO.clone();
        let mut seen = HashSet::new();
        let integrations: Vec<_> = options
            .integrations
            .iter()
            .filter(|integration| seen.insert(integration.name()))
            .map(|integration| (integration.as_ref().type_id(), integration.clone()))
            .collect();

        for (_, integration) in integrations.iter() {
            outpost_debug!("[Client] Setting up integration: {}", integration.name());
            integration.setup(&mut options);
            sdk_info.integrations.push(integration.name().to_string());
        }

        let transport = match (options.dsn.as_ref(), options.transport.as_ref()) {
            (Some(_), Some(factory)) => Some(factory.create_transport(&options)),
            (Some(_), None) => {
                outpost_debug!("[Client] No transport factory configured");
                None
            }
            (None, _) => None,
        };
        let transport: TransportArc = Arc::new(RwLock::new(transport));

        let logs = options.enable_logs.then(|| {
            batch_emitter(
                BatchConfig {
                    name: "logs",
                    batch_size: options.log_batch_size,
                    batch_timeout: options.log_batch_timeout,
                    queue_full_policy: options.queue_full_policy,
                },
                transport.clone(),
            )
        });
        let metrics = options.enable_metrics.then(|| {
            batch_emitter(
                BatchConfig {
                    name: "metrics",
                    batch_size: options.metric_batch_size,
                    batch_timeout: options.metric_batch_timeout,
                    queue_full_policy: options.queue_full_policy,
                },
                transport.clone(),
            )
        });

        Ok(Client {
            options,
            transport,
            logs,
            metrics,
            integrations,
            ignore_errors: ignore.errors,
            ignore_transactions: ignore.transactions,
            sdk_info,
        })
    }

    fn disabled(mut options: ClientOptions) -> Client {
        options.dsn = None;
        options.enable_logs = false;
        options.enable_metrics = false;
        options.ignore_errors.clear();
        options.ignore_transactions.clear();
        Client {
            options,
            transport: Arc::new(RwLock::new(None)),
            logs: None,
            metrics: None,
            integrations: Vec::new(),
            ignore_errors: Vec::new(),
            ignore_transactions: Vec::new(),
            sdk_info: SDK_INFO.clone(),
        }
    }

    pub(crate) fn get_integration<I>(&self) -> Option<&I>
    where
        I: Integration,
    {
        let id = TypeId::of::<I>();
        let integration = &self.integrations.iter().find(|(iid, _)| *iid == id)?.1;
        integration.as_ref().as_any().downcast_ref()
    }

    fn transport(&self) -> Option<Arc<dyn Transport>> {
        self.transport
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    /// Prepares an event for transmission.
    ///
    /// Runs every stage up to and including the `before_send` hooks.  Returns
    /// `None` if a stage dropped the event.
    pub fn prepare_event(
        &self,
        mut event: Event,
        hint: &EventHint,
        scope: Option<&Scope>,
    ) -> Option<Event> {
        // event_id and sdk_info are set before the processors run so that the
        // processors can poke around in that data.
        if event.event_id.is_nil() {
            event.event_id = random_uuid();
        }
        if event.sdk.is_none() {
            event.sdk = Some(self.sdk_info.clone());
        }
        if event.release.is_none() {
            event.release = self.options.release.as_deref().map(Into::into);
        }
        if event.environment.is_none() {
            event.environment = self.options.environment.as_deref().map(Into::into);
        }
        if event.server_name.is_none() {
            event.server_name = self.options.server_name.as_deref().map(Into::into);
        }
        if self.options.attach_stacktrace
            && event.ty == EventType::Default
            && event.exception.is_empty()
            && event.stacktrace.is_none()
        {
            event.stacktrace = current_stacktrace();
        }

        if let Some(scope) = scope {
            event = scope.apply_to_event(event)?;
        }

        for (_, integration) in self.integrations.iter() {
            let id = event.event_id;
            event = match integration.process_event(event, &self.options) {
                Some(event) => event,
                None => {
                    outpost_debug!(
                        "[Client] Integration '{}' dropped event {}",
                        integration.name(),
                        id
                    );
                    return None;
                }
            }
        }

        if let Some(pattern) = self.ignored_by(&event) {
            outpost_debug!(
                "[Client] Event {} ignored by pattern `{}`",
                event.event_id,
                pattern
            );
            return None;
        }

        match event.ty {
            EventType::Transaction => {
                if event.trace_context().and_then(|trace| trace.sampled) == Some(false) {
                    outpost_debug!("[Client] Transaction {} was not sampled", event.event_id);
                    return None;
                }
            }
            EventType::Default => {
                if !sample_should_send(self.options.sample_rate) {
                    outpost_debug!(
                        "[Client] Event {} dropped due to sampling (rate: {})",
                        event.event_id,
                        self.options.sample_rate
                    );
                    return None;
                }
            }
            EventType::CheckIn => {}
        }

        let before_send = match event.ty {
            EventType::Default => self.options.before_send.as_ref(),
            EventType::Transaction => self.options.before_send_transaction.as_ref(),
            EventType::CheckIn => None,
        };
        if let Some(func) = before_send {
            let id = event.event_id;
            match func(event, hint) {
                Some(processed) => event = processed,
                None => {
                    outpost_debug!("[Client] before_send dropped event {}", id);
                    return None;
                }
            }
        }

        Some(event)
    }

    fn ignored_by(&self, event: &Event) -> Option<&str> {
        match event.ty {
            EventType::Default => {
                let candidates = event
                    .message
                    .iter()
                    .cloned()
                    .chain(event.exception.iter().flat_map(|exc| {
                        let full = exc.value.as_ref().map(|value| format!("{}: {}", exc.ty, value));
                        [Some(exc.ty.clone()), exc.value.clone(), full]
                            .into_iter()
                            .flatten()
                    }))
                    .collect::<Vec<_>>();
                self.ignore_errors
                    .iter()
                    .find(|re| candidates.iter().any(|c| re.is_match(c)))
                    .map(Regex::as_str)
            }
            EventType::Transaction => {
                let name = event.transaction.as_deref()?;
                self.ignore_transactions
                    .iter()
                    .find(|re| re.is_match(name))
                    .map(Regex::as_str)
            }
            EventType::CheckIn => None,
        }
    }

    /// Runs an event through the full pipeline and hands it to the transport.
    ///
    /// Returns the event id, or the nil UUID if the event was dropped, the
    /// client is disabled or its category is rate limited.
    pub fn process_event(&self, event: Event, hint: &EventHint, scope: Option<&Scope>) -> Uuid {
        let Some(transport) = self.transport() else {
            outpost_debug!("[Client] No transport available, dropping event {}", event.event_id);
            return Uuid::nil();
        };
        let Some(event) = self.prepare_event(event, hint, scope) else {
            return Uuid::nil();
        };

        let event_id = event.event_id;
        let item = EnvelopeItem::from(event);
        let category = item.category();
        if transport.is_rate_limited(category) {
            tracing::info!(
                target: "outpost",
                "[Client] Skipping event {} due to rate limits for {}",
                event_id,
                category
            );
            return Uuid::nil();
        }
        transport.send_envelope(Envelope::from(item));
        event_id
    }

    /// Captures an event and sends it.
    pub fn capture_event(&self, event: Event, scope: Option<&Scope>) -> Uuid {
        self.process_event(event, &EventHint::default(), scope)
    }

    /// Sends the specified [`Envelope`] as is.
    pub fn send_envelope(&self, envelope: Envelope) {
        if let Some(transport) = self.transport() {
            transport.send_envelope(envelope);
        }
    }

    /// Decides whether a new transaction is sampled.
    pub fn sample_transaction(&self, ctx: &TransactionContext) -> bool {
        sample_should_send(transaction_sample_rate(&self.options, ctx))
    }

    /// Returns the options of this client.
    pub fn options(&self) -> &ClientOptions {
        &self.options
    }

    /// Returns the DSN that constructed this client.
    pub fn dsn(&self) -> Option<&Dsn> {
        self.options.dsn.as_ref()
    }

    /// Quick check to see if the client is enabled.
    ///
    /// The client is enabled if it has a valid DSN and a transport.
    pub fn is_enabled(&self) -> bool {
        self.options.dsn.is_some() && self.transport().is_some()
    }

    /// Drains all pending items without shutting down.
    ///
    /// The log and metric emitters are flushed first so that their batches
    /// reach the transport before it is flushed.  If no timeout is provided
    /// the client waits for as long as `shutdown_timeout`.
    pub fn flush(&self, timeout: Option<Duration>) -> bool {
        let deadline = deadline_after(timeout.unwrap_or(self.options.shutdown_timeout));
        let mut flushed = true;
        for emitter in self.logs.iter() {
            flushed &= emitter.flush_until(deadline);
        }
        for emitter in self.metrics.iter() {
            flushed &= emitter.flush_until(deadline);
        }
        if let Some(transport) = self.transport() {
            flushed &= transport.flush_until(deadline);
        }
        outpost_debug!("[Client] Flush completed: {}", flushed);
        flushed
    }

    /// Drains all pending items and shuts down the transport behind the
    /// client.  After shutting down the transport is removed.
    ///
    /// This returns `true` if the queue was successfully drained in the
    /// given time or `false` if not (for instance because of a timeout).
    /// If no timeout is provided the client will wait for as long as
    /// `shutdown_timeout` in the client options.
    pub fn close(&self, timeout: Option<Duration>) -> bool {
        let deadline = deadline_after(timeout.unwrap_or(self.options.shutdown_timeout));
        let remaining = || deadline.saturating_duration_since(Instant::now());
        let mut closed = true;
        for emitter in self.logs.iter() {
            closed &= emitter.shutdown(remaining());
        }
        for emitter in self.metrics.iter() {
            closed &= emitter.shutdown(remaining());
        }
        let transport = self
            .transport
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .take();
        if let Some(transport) = transport {
            closed &= transport.shutdown(remaining());
        }
        outpost_debug!("[Client] Closed: {}", closed);
        closed
    }

    /// Captures a log.
    ///
    /// Does nothing unless `enable_logs` is set.
    pub fn capture_log(&self, log: Log, scope: &Scope) {
        let Some(ref emitter) = self.logs else {
            return;
        };
        let Some(log) = self.prepare_log(log, scope) else {
            return;
        };
        if self.is_rate_limited(DataCategory::LogItem) {
            return;
        }
        emitter.enqueue(log);
    }

    /// Prepares a log to be sent, setting the `trace_id` and other default
    /// attributes, and processing it through `before_send_log`.
    fn prepare_log(&self, mut log: Log, scope: &Scope) -> Option<Log> {
        scope.apply_to_log(&mut log, self.options.send_default_pii);
        self.set_default_attributes(&mut log.attributes);

        match self.options.before_send_log {
            Some(ref func) => func(log),
            None => Some(log),
        }
    }

    /// Captures a trace metric.
    ///
    /// Does nothing unless `enable_metrics` is set.
    pub fn capture_metric(&self, mut metric: TraceMetric, scope: &Scope) {
        let Some(ref emitter) = self.metrics else {
            return;
        };
        scope.apply_to_metric(&mut metric);
        self.set_default_attributes(&mut metric.attributes);
        if let Some(ref func) = self.options.before_send_metric {
            let Some(processed) = func(metric) else {
                return;
            };
            metric = processed;
        }
        if self.is_rate_limited(DataCategory::TraceMetric) {
            return;
        }
        emitter.enqueue(metric);
    }

    fn is_rate_limited(&self, category: DataCategory) -> bool {
        let limited = self
            .transport()
            .is_some_and(|transport| transport.is_rate_limited(category));
        if limited {
            tracing::info!(
                target: "outpost",
                "[Client] Skipping {} due to rate limits",
                category
            );
        }
        limited
    }

    fn set_default_attributes(&self, attributes: &mut Map<String, LogAttribute>) {
        let defaults = [
            ("sentry.environment", self.options.environment.as_deref()),
            ("sentry.release", self.options.release.as_deref()),
            ("sentry.sdk.name", Some(self.sdk_info.name.as_str())),
            ("sentry.sdk.version", Some(self.sdk_info.version.as_str())),
            ("server.address", self.options.server_name.as_deref()),
        ];
        for (key, value) in defaults {
            if let Some(value) = value {
                attributes
                    .entry(key.to_owned())
                    .or_insert_with(|| LogAttribute(value.into()));
            }
        }
    }
}

fn batch_emitter<T>(config: BatchConfig, transport: TransportArc) -> BatchEmitter<T>
where
    T: Send + 'static,
    Vec<T>: Into<EnvelopeItem>,
{
    let emitter = BatchEmitter::new(config, move |items: Vec<T>| {
        let transport = transport
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .clone();
        if let Some(transport) = transport {
            let item: EnvelopeItem = items.into();
            transport.send_envelope(Envelope::from(item));
        }
    });
    emitter.start();
    emitter
}

// Make this unwind safe. It's not out of the box because of the
// callbacks inside `ClientOptions`, and the contained Integrations
impl RefUnwindSafe for Client {}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use super::*;
    use crate::protocol::{Exception, Level, LogLevel};
    use crate::test::{with_captured_envelopes_options, with_captured_events_options};

    #[test]
    fn test_ignore_errors() {
        let events = with_captured_events_options(
            || {
                crate::capture_message("connection reset by peer", Level::Error);
                crate::capture_event(Event {
                    exception: vec![Exception {
                        ty: "Timeout".into(),
                        value: Some("upstream".into()),
                        ..Default::default()
                    }],
                    ..Default::default()
                });
                crate::capture_message("disk full", Level::Error);
            },
            ClientOptions {
                ignore_errors: vec!["reset by peer".into(), "^Timeout: ".into()],
                ..Default::default()
            },
        );
        assert_eq!(events.len(), 1);
        assert_eq!(events[0].message.as_deref(), Some("disk full"));
    }

    #[test]
    fn test_pipeline_order() {
        let events = with_captured_events_options(
            || {
                crate::configure_scope(|scope| {
                    scope.set_tag("stage", "scope");
                    scope.add_event_processor(|mut event| {
                        event.extra.insert("processor".into(), "ran".into());
                        Some(event)
                    });
                });
                crate::capture_message("hello", Level::Warning);
            },
            ClientOptions {
                release: Some("app@1.0".into()),
                before_send: Some(Arc::new(|mut event: Event, _hint: &EventHint| {
                    // scope and processors have already run
                    assert_eq!(event.tags["stage"], "scope");
                    assert_eq!(event.extra["processor"], "ran");
                    event.tags.insert("stage".into(), "before_send".into());
                    Some(event)
                })),
                ..Default::default()
            },
        );
        assert_eq!(events.len(), 1);
        let event = &events[0];
        assert_eq!(event.release.as_deref(), Some("app@1.0"));
        assert_eq!(event.tags["stage"], "before_send");
        assert_eq!(event.sdk.as_ref().unwrap().name, crate::constants::SDK_NAME);
    }

    #[test]
    fn test_before_send_drop_and_sample_rate() {
        let events = with_captured_events_options(
            || {
                crate::capture_message("dropped", Level::Error);
            },
            ClientOptions {
                before_send: Some(Arc::new(|_: Event, _: &EventHint| None)),
                ..Default::default()
            },
        );
        assert!(events.is_empty());

        let events = with_captured_events_options(
            || {
                for _ in 0..100 {
                    crate::capture_message("never", Level::Error);
                }
            },
            ClientOptions {
                sample_rate: 0.0,
                ..Default::default()
            },
        );
        assert!(events.is_empty());
    }

    #[test]
    fn test_check_ins_skip_sampling() {
        let envelopes = with_captured_envelopes_options(
            || {
                let check_in = crate::protocol::CheckIn::new(
                    "nightly",
                    crate::protocol::CheckInStatus::Ok,
                );
                let id = check_in.check_in_id;
                assert_eq!(crate::capture_check_in(check_in, None), id);
            },
            ClientOptions {
                sample_rate: 0.0,
                before_send: Some(Arc::new(|_: Event, _: &EventHint| None)),
                ..Default::default()
            },
        );
        assert_eq!(envelopes.len(), 1);
        assert!(matches!(
            envelopes[0].items().next(),
            Some(EnvelopeItem::CheckIn(_))
        ));
    }

    #[test]
    fn test_logs_get_default_attributes() {
        let envelopes = with_captured_envelopes_options(
            || {
                crate::capture_log(Log::new(LogLevel::Info, "hello"));
                crate::flush(None);
            },
            ClientOptions {
                enable_logs: true,
                environment: Some("production".into()),
                ..Default::default()
            },
        );
        let logs: Vec<_> = envelopes
            .iter()
            .flat_map(|envelope| envelope.items())
            .filter_map(|item| match item {
                EnvelopeItem::Logs(logs) => Some(logs.clone()),
                _ => None,
            })
            .flatten()
            .collect();
        assert_eq!(logs.len(), 1);
        assert_eq!(
            logs[0].attributes["sentry.environment"],
            LogAttribute("production".into())
        );
        assert!(logs[0].trace_id.is_some());
        assert!(logs[0].attributes.contains_key("sentry.sdk.version"));
    }

    #[test]
    fn test_logs_disabled_by_default() {
        let envelopes = with_captured_envelopes_options(
            || crate::capture_log(Log::new(LogLevel::Info, "hello")),
            ClientOptions::default(),
        );
        assert!(envelopes.is_empty());
    }

    #[test]
    fn test_invalid_options_are_rejected() {
        let result = Client::try_with_options(ClientOptions {
            sample_rate: 7.0,
            ..Default::default()
        });
        assert!(result.is_err());

        let client = Client::with_options(ClientOptions {
            dsn: "https://public@example.com/1".parse().ok(),
            ignore_transactions: vec!["[".into()],
            ..Default::default()
        });
        assert!(!client.is_enabled());
    }

    fn log_bodies(envelopes: &[Envelope]) -> Vec<String> {
        envelopes
            .iter()
            .flat_map(|envelope| envelope.items())
            .filter_map(|item| match item {
                EnvelopeItem::Logs(logs) => Some(logs.iter().map(|log| log.body.clone())),
                _ => None,
            })
            .flatten()
            .collect()
    }

    fn metric_names(envelopes: &[Envelope]) -> Vec<String> {
        envelopes
            .iter()
            .flat_map(|envelope| envelope.items())
            .filter_map(|item| match item {
                EnvelopeItem::Metrics(metrics) => {
                    Some(metrics.iter().map(|metric| metric.name.clone()))
                }
                _ => None,
            })
            .flatten()
            .collect()
    }

    #[test]
    fn test_before_send_log_and_metric_can_drop() {
        let envelopes = with_captured_envelopes_options(
            || {
                crate::capture_log(Log::new(LogLevel::Info, "keep"));
                crate::capture_log(Log::new(LogLevel::Info, "drop"));
                crate::metrics_count("kept.count", 1.0, None);
                crate::metrics_count("dropped.count", 1.0, None);
            },
            ClientOptions {
                enable_logs: true,
                enable_metrics: true,
                before_send_log: Some(Arc::new(|log: Log| (log.body != "drop").then_some(log))),
                before_send_metric: Some(Arc::new(|metric: TraceMetric| {
                    (metric.name != "dropped.count").then_some(metric)
                })),
                ..Default::default()
            },
        );
        assert_eq!(log_bodies(&envelopes), ["keep"]);
        assert_eq!(metric_names(&envelopes), ["kept.count"]);
    }

    /// Forwards envelopes and reports a fixed category as rate limited.
    struct LimitedTransport {
        limited: DataCategory,
        inner: Arc<crate::test::TestTransport>,
    }

    impl Transport for LimitedTransport {
        fn send_envelope(&self, envelope: Envelope) {
            self.inner.send_envelope(envelope)
        }

        fn is_rate_limited(&self, category: DataCategory) -> bool {
            category == self.limited
        }
    }

    fn capture_with_limit(limited: DataCategory) -> Vec<Envelope> {
        let inner = crate::test::TestTransport::new();
        let transport = Arc::new(LimitedTransport {
            limited,
            inner: inner.clone(),
        });
        let client = Arc::new(Client::with_options(ClientOptions {
            dsn: "https://public@example.com/1".parse().ok(),
            enable_logs: true,
            enable_metrics: true,
            transport: Some(Arc::new(transport)),
            ..Default::default()
        }));
        let hub = Arc::new(Hub::new(Some(client.clone()), Default::default()));
        Hub::run(hub, || {
            crate::capture_log(Log::new(LogLevel::Warn, "quota"));
            crate::metrics_gauge("queue.depth", 3.0, None);
        });
        client.close(None);
        inner.fetch_and_clear_envelopes()
    }

    #[test]
    fn test_rate_limited_logs_are_not_enqueued() {
        let envelopes = capture_with_limit(DataCategory::LogItem);
        assert!(log_bodies(&envelopes).is_empty());
        assert_eq!(metric_names(&envelopes), ["queue.depth"]);
    }

    #[test]
    fn test_rate_limited_metrics_are_not_enqueued() {
        let envelopes = capture_with_limit(DataCategory::TraceMetric);
        assert_eq!(log_bodies(&envelopes), ["quota"]);
        assert!(metric_names(&envelopes).is_empty());
    }

    #[test]
    fn test_close_with_unbounded_timeout() {
        let client = Client::with_options(ClientOptions {
            dsn: "https://public@example.com/1".parse().ok(),
            enable_logs: true,
            transport: Some(Arc::new(crate::test::TestTransport::new())),
            ..Default::default()
        });
        assert!(client.flush(Some(Duration::MAX)));
        assert!(client.close(Some(Duration::MAX)));
        assert!(!client.is_enabled());
    }
}
