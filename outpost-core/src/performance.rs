use std::fmt;
use std::str::FromStr;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::SystemTime;

use crate::protocol::{self, EventType, SpanId, TraceId};
use crate::{Client, Hub};

const MAX_SPANS: usize = 1_000;

// global API:

/// Starts a transaction on the client of the current hub.
///
/// The sampling decision is made once, here, and every span started below
/// the transaction inherits it.  The transaction is the root of its span
/// tree; call [`Transaction::start_child`] to grow the tree and
/// [`Transaction::finish`] to send it.  An unfinished transaction is lost.
pub fn start_transaction(ctx: TransactionContext) -> Transaction {
    let client = Hub::with_active(|hub| hub.client());
    Transaction::new(client, ctx)
}

// Hub API:

impl Hub {
    /// Starts a transaction on the client of this hub.
    ///
    /// Behaves like the free [`start_transaction`].
    pub fn start_transaction(&self, ctx: TransactionContext) -> Transaction {
        Transaction::new(self.client(), ctx)
    }
}

// "Context" Types:

/// Name, operation and trace linkage of a transaction that is about to start.
#[derive(Debug, Clone)]
pub struct TransactionContext {
    name: String,
    op: String,
    trace_id: TraceId,
    parent_span_id: Option<SpanId>,
    sampled: Option<bool>,
}

impl TransactionContext {
    /// A context for a fresh trace.
    #[must_use = "pass the context to `start_transaction`"]
    pub fn new(name: &str, op: &str) -> Self {
        Self::continue_from_headers(name, op, vec![])
    }

    /// A context continuing the trace found in incoming `headers`.
    ///
    /// Only the `sentry-trace` header is looked at; without a parsable one a
    /// fresh trace is started.  A sampling flag in the header overrides
    /// local sampling.
    #[must_use = "pass the context to `start_transaction`"]
    pub fn continue_from_headers<'a, I: IntoIterator<Item = (&'a str, &'a str)>>(
        name: &str,
        op: &str,
        headers: I,
    ) -> Self {
        let mut trace = None;
        for (k, v) in headers.into_iter() {
            if k.eq_ignore_ascii_case("sentry-trace") {
                trace = v.parse::<SentryTrace>().ok();
            }
        }

        let (trace_id, parent_span_id, sampled) = match trace {
            Some(trace) => (trace.trace_id, Some(trace.span_id), trace.sampled),
            None => (TraceId::default(), None, None),
        };

        Self {
            name: name.into(),
            op: op.into(),
            trace_id,
            parent_span_id,
            sampled,
        }
    }

    /// A context continuing the trace of `span`, typically one running on
    /// another thread.  The sampling decision of `span` is carried over.
    pub fn continue_from_span(name: &str, op: &str, span: Option<TransactionOrSpan>) -> Self {
        let span = match span {
            Some(span) => span,
            None => return Self::new(name, op),
        };

        Self {
            name: name.into(),
            op: op.into(),
            trace_id: span.get_trace_id(),
            parent_span_id: Some(span.get_span_id()),
            sampled: Some(span.is_sampled()),
        }
    }

    /// Forces the sampling decision, or hands it back to the sampler with
    /// [`None`].
    pub fn set_sampled(&mut self, sampled: impl Into<Option<bool>>) {
        self.sampled = sampled.into();
    }

    /// Get the sampling decision for this Transaction.
    pub fn sampled(&self) -> Option<bool> {
        self.sampled
    }

    /// Get the name of this Transaction.
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Get the operation of this Transaction.
    pub fn operation(&self) -> &str {
        &self.op
    }

    /// Get the Trace ID of this Transaction.
    pub fn trace_id(&self) -> TraceId {
        self.trace_id
    }

    /// Get the parent span id, if the transaction continues a trace.
    pub fn parent_span_id(&self) -> Option<SpanId> {
        self.parent_span_id
    }
}

// global API types:

/// Either the root [`Transaction`] or one of its [`Span`]s.
#[derive(Clone, Debug)]
pub enum TransactionOrSpan {
    /// A [`Transaction`].
    Transaction(Transaction),
    /// A [`Span`].
    Span(Span),
}

impl From<Transaction> for TransactionOrSpan {
    fn from(transaction: Transaction) -> Self {
        Self::Transaction(transaction)
    }
}

impl From<Span> for TransactionOrSpan {
    fn from(span: Span) -> Self {
        Self::Span(span)
    }
}

impl TransactionOrSpan {
    /// Attaches an extra data entry.
    pub fn set_data(&self, key: &str, value: protocol::Value) {
        match self {
            TransactionOrSpan::Transaction(transaction) => transaction.set_data(key, value),
            TransactionOrSpan::Span(span) => span.set_data(key, value),
        }
    }

    /// The status, if one was set.
    pub fn get_status(&self) -> Option<protocol::SpanStatus> {
        match self {
            TransactionOrSpan::Transaction(transaction) => transaction.get_status(),
            TransactionOrSpan::Span(span) => span.get_status(),
        }
    }

    /// Sets the status.
    pub fn set_status(&self, status: protocol::SpanStatus) {
        match self {
            TransactionOrSpan::Transaction(transaction) => transaction.set_status(status),
            TransactionOrSpan::Span(span) => span.set_status(status),
        }
    }

    /// Returns the trace id shared by the whole span tree.
    pub fn get_trace_id(&self) -> TraceId {
        match self {
            TransactionOrSpan::Transaction(transaction) => transaction.get_trace_context().trace_id,
            TransactionOrSpan::Span(span) => span.get_trace_id(),
        }
    }

    /// Returns the id of this Transaction/Span.
    pub fn get_span_id(&self) -> SpanId {
        match self {
            TransactionOrSpan::Transaction(transaction) => transaction.get_trace_context().span_id,
            TransactionOrSpan::Span(span) => span.get_span_id(),
        }
    }

    /// Returns the frozen sampling decision of the span tree.
    pub fn is_sampled(&self) -> bool {
        match self {
            TransactionOrSpan::Transaction(transaction) => transaction.is_sampled(),
            TransactionOrSpan::Span(span) => span.is_sampled(),
        }
    }

    /// Headers that propagate this trace to a downstream service.
    pub fn iter_headers(&self) -> TraceHeadersIter {
        match self {
            TransactionOrSpan::Transaction(transaction) => transaction.iter_headers(),
            TransactionOrSpan::Span(span) => span.iter_headers(),
        }
    }

    /// Opens a child span below this node.  It is only recorded once
    /// [`Span::finish`] is called.
    #[must_use = "spans are only recorded after `finish()`"]
    pub fn start_child(&self, op: &str, description: &str) -> Span {
        match self {
            TransactionOrSpan::Transaction(transaction) => transaction.start_child(op, description),
            TransactionOrSpan::Span(span) => span.start_child(op, description),
        }
    }

    pub(crate) fn apply_to_event(&self, event: &mut protocol::Event) {
        if event.contexts.contains_key("trace") {
            return;
        }

        let context = match self {
            TransactionOrSpan::Transaction(transaction) => {
                let inner = transaction.lock();
                if event.transaction.is_none() {
                    event.transaction = inner.name.clone();
                }
                inner.context.clone()
            }
            TransactionOrSpan::Span(span) => {
                let span = span.lock();
                protocol::TraceContext {
                    span_id: span.span_id,
                    trace_id: span.trace_id,
                    op: span.op.clone(),
                    ..Default::default()
                }
            }
        };
        event.contexts.insert("trace".into(), context.into());
    }

    /// Ends the node: a transaction is sent, a span is recorded on its
    /// transaction.
    pub fn finish(self) {
        match self {
            TransactionOrSpan::Transaction(transaction) => transaction.finish(),
            TransactionOrSpan::Span(span) => span.finish(),
        }
    }
}

/// The payload collected while a sampled transaction is running.
#[derive(Debug, Default)]
struct TransactionData {
    spans: Vec<protocol::Span>,
    extra: protocol::Map<String, protocol::Value>,
    tags: protocol::Map<String, String>,
    request: Option<protocol::Request>,
}

#[derive(Debug)]
pub(crate) struct TransactionInner {
    client: Option<Arc<Client>>,
    sampled: bool,
    name: Option<String>,
    start_timestamp: SystemTime,
    context: protocol::TraceContext,
    data: Option<TransactionData>,
}

type TransactionArc = Arc<Mutex<TransactionInner>>;

/// The root of a running span tree.
///
/// Nothing of the tree is sent unless [`Transaction::finish`] is called.
#[derive(Clone, Debug)]
pub struct Transaction {
    pub(crate) inner: TransactionArc,
}

impl Transaction {
    fn new(client: Option<Arc<Client>>, ctx: TransactionContext) -> Self {
        let sampled = match client.as_ref() {
            Some(client) => client.sample_transaction(&ctx),
            None => ctx.sampled.unwrap_or(false),
        };

        let context = protocol::TraceContext {
            trace_id: ctx.trace_id,
            parent_span_id: ctx.parent_span_id,
            op: Some(ctx.op),
            sampled: Some(sampled),
            ..Default::default()
        };

        // an unsampled transaction keeps its ids for propagation but collects nothing
        let (client, data) = match client {
            Some(client) if sampled => (Some(client), Some(TransactionData::default())),
            _ => (None, None),
        };

        Self {
            inner: Arc::new(Mutex::new(TransactionInner {
                client,
                sampled,
                name: Some(ctx.name),
                start_timestamp: SystemTime::now(),
                context,
                data,
            })),
        }
    }

    fn lock(&self) -> MutexGuard<'_, TransactionInner> {
        self.inner.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Attaches an extra data entry to the transaction event.
    pub fn set_data(&self, key: &str, value: protocol::Value) {
        if let Some(data) = self.lock().data.as_mut() {
            data.extra.insert(key.into(), value);
        }
    }

    /// Attaches a tag to the transaction event.
    pub fn set_tag<V: ToString>(&self, key: &str, value: V) {
        if let Some(data) = self.lock().data.as_mut() {
            data.tags.insert(key.into(), value.to_string());
        }
    }

    /// The status, if one was set.
    pub fn get_status(&self) -> Option<protocol::SpanStatus> {
        self.lock().context.status
    }

    /// Sets the status reported in the trace context.
    pub fn set_status(&self, status: protocol::SpanStatus) {
        self.lock().context.status = Some(status);
    }

    /// Attaches the HTTP request this transaction served.
    pub fn set_request(&self, request: protocol::Request) {
        if let Some(data) = self.lock().data.as_mut() {
            data.request = Some(request);
        }
    }

    /// Changes the name of the Transaction.
    pub fn set_name(&self, name: &str) {
        self.lock().name = Some(name.into());
    }

    /// Returns whether the transaction will be sent when finished.
    pub fn is_sampled(&self) -> bool {
        self.lock().sampled
    }

    /// Returns a copy of the trace context of this Transaction.
    pub fn get_trace_context(&self) -> protocol::TraceContext {
        self.lock().context.clone()
    }

    /// Headers that propagate this trace, with this transaction as parent.
    pub fn iter_headers(&self) -> TraceHeadersIter {
        let inner = self.lock();
        let trace = SentryTrace::new(
            inner.context.trace_id,
            inner.context.span_id,
            Some(inner.sampled),
        );
        TraceHeadersIter::new(trace.to_string())
    }

    /// Stamps the end time and sends the transaction with its finished
    /// spans through the client pipeline, applying the current scope.
    ///
    /// Only the first call does anything.
    pub fn finish(self) {
        let (client, event) = {
            let mut inner = self.lock();
            let (Some(data), Some(client)) = (inner.data.take(), inner.client.take()) else {
                return;
            };
            let event = protocol::Event {
                ty: EventType::Transaction,
                level: protocol::Level::Info,
                transaction: inner.name.clone(),
                start_timestamp: Some(inner.start_timestamp),
                timestamp: SystemTime::now(),
                contexts: [("trace".to_owned(), inner.context.clone().into())]
                    .into_iter()
                    .collect(),
                spans: data.spans,
                extra: data.extra,
                tags: data.tags,
                request: data.request,
                ..Default::default()
            };
            (client, event)
        };

        let scope = Hub::with(|hub| hub.current_scope());
        client.capture_event(event, Some(scope.as_ref()));
    }

    /// Opens a direct child of the transaction, sharing its sampling
    /// decision.
    #[must_use = "spans are only recorded after `finish()`"]
    pub fn start_child(&self, op: &str, description: &str) -> Span {
        let inner = self.lock();
        Span::open(
            Arc::clone(&self.inner),
            inner.sampled,
            (inner.context.trace_id, inner.context.span_id),
            op,
            description,
        )
    }
}

/// A timed operation inside a transaction.
///
/// Unfinished spans are left out of the transaction event.
#[derive(Clone, Debug)]
pub struct Span {
    pub(crate) transaction: TransactionArc,
    sampled: bool,
    span: SpanArc,
}

type SpanArc = Arc<Mutex<protocol::Span>>;

impl Span {
    fn open(
        transaction: TransactionArc,
        sampled: bool,
        (trace_id, parent_span_id): (TraceId, SpanId),
        op: &str,
        description: &str,
    ) -> Span {
        let span = protocol::Span {
            trace_id,
            parent_span_id: Some(parent_span_id),
            op: Some(op.into()),
            description: (!description.is_empty()).then(|| description.into()),
            ..Default::default()
        };
        Span {
            transaction,
            sampled,
            span: Arc::new(Mutex::new(span)),
        }
    }

    fn lock(&self) -> MutexGuard<'_, protocol::Span> {
        self.span.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Attaches an extra data entry.
    pub fn set_data(&self, key: &str, value: protocol::Value) {
        self.lock().data.insert(key.into(), value);
    }

    /// Attaches a tag.
    pub fn set_tag<V: ToString>(&self, key: &str, value: V) {
        self.lock().tags.insert(key.into(), value.to_string());
    }

    /// The status, if one was set.
    pub fn get_status(&self) -> Option<protocol::SpanStatus> {
        self.lock().status
    }

    /// Sets the status.
    pub fn set_status(&self, status: protocol::SpanStatus) {
        self.lock().status = Some(status);
    }

    /// Returns the id of this Span.
    pub fn get_span_id(&self) -> SpanId {
        self.lock().span_id
    }

    /// Returns the trace id of this Span.
    pub fn get_trace_id(&self) -> TraceId {
        self.lock().trace_id
    }

    /// Returns the id of the parent of this Span.
    pub fn get_parent_span_id(&self) -> Option<SpanId> {
        self.lock().parent_span_id
    }

    /// Returns the sampling decision inherited from the root transaction.
    pub fn is_sampled(&self) -> bool {
        self.sampled
    }

    /// Headers that propagate this trace, with this span as parent.
    pub fn iter_headers(&self) -> TraceHeadersIter {
        let span = self.lock();
        let trace = SentryTrace::new(span.trace_id, span.span_id, Some(self.sampled));
        TraceHeadersIter::new(trace.to_string())
    }

    /// Stamps the end time and records the span on its transaction.
    ///
    /// Only the first call does anything; past the span limit the span is
    /// dropped.
    pub fn finish(self) {
        let mut span = self.lock();
        if span.timestamp.is_some() {
            return;
        }
        span.finish();
        let mut inner = self.transaction.lock().unwrap_or_else(PoisonError::into_inner);
        if let Some(data) = inner.data.as_mut() {
            if data.spans.len() < MAX_SPANS {
                data.spans.push(span.clone());
            }
        }
    }

    /// Opens a child of this span.
    #[must_use = "spans are only recorded after `finish()`"]
    pub fn start_child(&self, op: &str, description: &str) -> Span {
        let parent = {
            let span = self.lock();
            (span.trace_id, span.span_id)
        };
        Span::open(self.transaction.clone(), self.sampled, parent, op, description)
    }
}

/// Header name and value pairs for trace propagation.
///
/// Yields a single `sentry-trace` entry.
pub struct TraceHeadersIter {
    sentry_trace: Option<String>,
}

impl TraceHeadersIter {
    pub(crate) fn new(sentry_trace: String) -> Self {
        Self {
            sentry_trace: Some(sentry_trace),
        }
    }
}

impl Iterator for TraceHeadersIter {
    type Item = (&'static str, String);

    fn next(&mut self) -> Option<Self::Item> {
        self.sentry_trace.take().map(|st| ("sentry-trace", st))
    }
}

/// The contents of a `sentry-trace` header: `<trace_id>-<span_id>[-<sampled>]`.
#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub struct SentryTrace {
    trace_id: TraceId,
    span_id: SpanId,
    sampled: Option<bool>,
}

impl SentryTrace {
    /// Creates a new trace header value.
    pub fn new(trace_id: TraceId, span_id: SpanId, sampled: Option<bool>) -> Self {
        SentryTrace {
            trace_id,
            span_id,
            sampled,
        }
    }

    /// The trace id.
    pub fn trace_id(&self) -> TraceId {
        self.trace_id
    }

    /// The id of the span that propagated the trace.
    pub fn span_id(&self) -> SpanId {
        self.span_id
    }

    /// The upstream sampling decision, if one was made.
    pub fn sampled(&self) -> Option<bool> {
        self.sampled
    }
}

/// Raised when a `sentry-trace` header is malformed.
#[derive(Debug, thiserror::Error)]
#[error("invalid sentry-trace header")]
pub struct ParseSentryTraceError;

impl FromStr for SentryTrace {
    type Err = ParseSentryTraceError;

    fn from_str(header: &str) -> Result<Self, Self::Err> {
        let mut parts = header.trim().splitn(3, '-');

        let trace_id = parts
            .next()
            .and_then(|s| s.parse().ok())
            .ok_or(ParseSentryTraceError)?;
        let span_id = parts
            .next()
            .and_then(|s| s.parse().ok())
            .ok_or(ParseSentryTraceError)?;
        let sampled = parts.next().and_then(|sampled| match sampled {
            "1" => Some(true),
            "0" => Some(false),
            _ => None,
        });

        Ok(SentryTrace::new(trace_id, span_id, sampled))
    }
}

impl fmt::Display for SentryTrace {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}-{}", self.trace_id, self.span_id)?;
        if let Some(sampled) = self.sampled {
            write!(f, "-{}", if sampled { '1' } else { '0' })?;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_sentry_trace() {
        let trace_id = TraceId::from_str("09e04486820349518ac7b5d2adbf6ba5").unwrap();
        let parent_span_id = SpanId::from_str("9cf635fa5b870b3a").unwrap();

        let trace: SentryTrace = "09e04486820349518ac7b5d2adbf6ba5-9cf635fa5b870b3a-0"
            .parse()
            .unwrap();
        assert_eq!(trace, SentryTrace::new(trace_id, parent_span_id, Some(false)));

        let trace = SentryTrace::default();
        let parsed: SentryTrace = trace.to_string().parse().unwrap();
        assert_eq!(parsed, trace);

        assert!("garbage".parse::<SentryTrace>().is_err());
    }

    #[test]
    fn disabled_forwards_trace_id() {
        let headers = [(
            "SenTrY-TRAce",
            "09e04486820349518ac7b5d2adbf6ba5-9cf635fa5b870b3a-1",
        )];
        let ctx = TransactionContext::continue_from_headers("noop", "noop", headers);
        let trx = start_transaction(ctx);

        let span = trx.start_child("noop", "noop");

        let header = span.iter_headers().next().unwrap().1;
        let parsed: SentryTrace = header.parse().unwrap();

        assert_eq!(
            &parsed.trace_id().to_string(),
            "09e04486820349518ac7b5d2adbf6ba5"
        );
        assert_eq!(parsed.sampled(), Some(true));
    }

    #[test]
    fn children_inherit_sampling() {
        let mut ctx = TransactionContext::new("root", "op");
        ctx.set_sampled(false);
        let trx = start_transaction(ctx);
        let child = trx.start_child("child", "");
        let grandchild = child.start_child("grandchild", "");
        assert!(!trx.is_sampled());
        assert!(!child.is_sampled());
        assert!(!grandchild.is_sampled());
        assert_eq!(grandchild.get_parent_span_id(), Some(child.get_span_id()));
        assert_eq!(grandchild.get_trace_id(), trx.get_trace_context().trace_id);
    }
}
