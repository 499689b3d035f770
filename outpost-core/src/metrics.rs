//! Trace metrics: counters, gauges and distributions correlated with the
//! active trace.
//!
//! Metrics are only captured when the bound client has `enable_metrics` set.

use std::time::SystemTime;

use crate::protocol::{LogAttribute, Map, TraceId, TraceMetric, TraceMetricType, Value};
use crate::Hub;

/// Options for recording a trace metric.
#[derive(Debug, Default, Clone)]
pub struct MetricOptions {
    /// The measurement unit (e.g. "millisecond", "byte").
    pub unit: Option<String>,
    /// Additional key-value attributes.
    pub attributes: Map<String, LogAttribute>,
}

impl MetricOptions {
    /// Options with the given unit.
    pub fn with_unit(unit: impl Into<String>) -> Self {
        MetricOptions {
            unit: Some(unit.into()),
            ..Default::default()
        }
    }

    /// Adds an attribute.
    pub fn attribute(mut self, key: impl Into<String>, value: impl Into<Value>) -> Self {
        self.attributes
            .insert(key.into(), LogAttribute(value.into()));
        self
    }
}

fn capture_metric(ty: TraceMetricType, name: &str, value: f64, options: Option<MetricOptions>) {
    Hub::with_active(|hub| {
        let options = options.unwrap_or_default();
        // the trace id is filled in from the scope
        hub.capture_metric(TraceMetric {
            ty,
            name: name.to_owned(),
            value,
            timestamp: SystemTime::now(),
            trace_id: TraceId::default(),
            span_id: None,
            unit: options.unit,
            attributes: options.attributes,
        });
    })
}

/// Records a counter metric. Counters track event frequency (e.g., requests, errors).
///
/// # Examples
///
/// ```
/// outpost_core::metrics_count("api.requests", 1.0, None);
/// ```
pub fn metrics_count(name: &str, value: f64, options: Option<MetricOptions>) {
    capture_metric(TraceMetricType::Counter, name, value, options);
}

/// Records a gauge metric. Gauges represent current state (e.g., memory usage, pool size).
///
/// # Examples
///
/// ```
/// outpost_core::metrics_gauge("memory.usage", 1024.0, None);
/// ```
pub fn metrics_gauge(name: &str, value: f64, options: Option<MetricOptions>) {
    capture_metric(TraceMetricType::Gauge, name, value, options);
}

/// Records a distribution metric. Distributions measure statistical spread (e.g., response times).
///
/// # Examples
///
/// ```
/// use outpost_core::MetricOptions;
///
/// outpost_core::metrics_distribution(
///     "http.response_time",
///     150.0,
///     Some(MetricOptions::with_unit("millisecond").attribute("route", "/users")),
/// );
/// ```
pub fn metrics_distribution(name: &str, value: f64, options: Option<MetricOptions>) {
    capture_metric(TraceMetricType::Distribution, name, value, options);
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::protocol::EnvelopeItem;
    use crate::test::with_captured_envelopes_options;
    use crate::{ClientOptions, TransactionContext};

    fn captured_metrics(f: impl FnOnce(), enable_metrics: bool) -> Vec<TraceMetric> {
        let envelopes = with_captured_envelopes_options(
            f,
            ClientOptions {
                enable_metrics,
                traces_sample_rate: 1.0,
                ..Default::default()
            },
        );
        envelopes
            .iter()
            .flat_map(|envelope| envelope.items())
            .filter_map(|item| match item {
                EnvelopeItem::Metrics(metrics) => Some(metrics.clone()),
                _ => None,
            })
            .flatten()
            .collect()
    }

    #[test]
    fn test_metrics_are_correlated_with_span() {
        let mut span_ids = None;
        let metrics = captured_metrics(
            || {
                let transaction =
                    crate::start_transaction(TransactionContext::new("work", "task"));
                crate::configure_scope(|scope| scope.set_span(Some(transaction.clone().into())));
                span_ids = Some((
                    transaction.get_trace_context().trace_id,
                    transaction.get_trace_context().span_id,
                ));
                metrics_count("jobs", 1.0, Some(MetricOptions::with_unit("job")));
                metrics_gauge("queue", 7.0, None);
                crate::configure_scope(|scope| scope.set_span(None));
                transaction.finish();
            },
            true,
        );
        let (trace_id, span_id) = span_ids.unwrap();
        assert_eq!(metrics.len(), 2);
        assert_eq!(metrics[0].ty, TraceMetricType::Counter);
        assert_eq!(metrics[0].unit.as_deref(), Some("job"));
        assert_eq!(metrics[1].ty, TraceMetricType::Gauge);
        for metric in &metrics {
            assert_eq!(metric.trace_id, trace_id);
            assert_eq!(metric.span_id, Some(span_id));
        }
    }

    #[test]
    fn test_metrics_disabled() {
        let metrics = captured_metrics(|| metrics_distribution("latency", 3.0, None), false);
        assert!(metrics.is_empty());
    }
}
