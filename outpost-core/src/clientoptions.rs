use std::borrow::Cow;
use std::fmt;
use std::sync::Arc;
use std::time::Duration;

use regex::Regex;
use thiserror::Error;

use crate::client::EventHint;
use crate::constants::USER_AGENT;
use crate::emitter::QueueFullPolicy;
use crate::protocol::{Breadcrumb, Event, Log, TraceMetric};
use crate::sampler::SamplingContext;
use crate::types::{Dsn, ParseDsnError};
use crate::{Integration, IntoDsn, TransportFactory};

/// Type alias for before event/breadcrumb handlers.
pub type BeforeCallback<T> = Arc<dyn Fn(T) -> Option<T> + Send + Sync>;

/// Type alias for the `before_send` hooks, which also see the [`EventHint`].
pub type BeforeSendCallback = Arc<dyn Fn(Event, &EventHint) -> Option<Event> + Send + Sync>;

/// A callback deciding the sample rate of a new transaction.
pub type TracesSampler = dyn Fn(&SamplingContext) -> f32 + Send + Sync;

/// An invalid client configuration.
///
/// Returned by [`ClientOptions::validate`] and everything that builds a client
/// from options.  A client that failed validation is never created.
#[derive(Debug, Error)]
pub enum ConfigError {
    /// The DSN could not be parsed.
    #[error("invalid DSN: {0}")]
    InvalidDsn(#[from] ParseDsnError),
    /// A sample rate is outside of `[0, 1]`.
    #[error("{name} must be between 0 and 1, got {value}")]
    InvalidSampleRate {
        /// The name of the option.
        name: &'static str,
        /// The rejected value.
        value: f32,
    },
    /// An ignore pattern is not a valid regular expression.
    #[error("invalid ignore pattern `{pattern}`")]
    InvalidPattern {
        /// The rejected pattern.
        pattern: String,
        /// The underlying regex error.
        #[source]
        source: regex::Error,
    },
}

/// Configuration settings for the client.
///
/// # Examples
///
/// ```
/// let _options = outpost_core::ClientOptions {
///     sample_rate: 0.5,
///     ..Default::default()
/// };
/// ```
#[derive(Clone)]
pub struct ClientOptions {
    // Common options
    /// The DSN to use.  If not set the client is effectively disabled.
    pub dsn: Option<Dsn>,
    /// The release to be sent with events.
    pub release: Option<Cow<'static, str>>,
    /// The environment to be sent with events.
    pub environment: Option<Cow<'static, str>>,
    /// The server name to be reported.
    pub server_name: Option<Cow<'static, str>>,
    /// The sample rate for error events. (0.0 - 1.0, defaults to 1.0)
    pub sample_rate: f32,
    /// The sample rate for transactions. (0.0 - 1.0, defaults to 0.0)
    pub traces_sample_rate: f32,
    /// Decides the sample rate per transaction, taking precedence over
    /// `traces_sample_rate`.
    pub traces_sampler: Option<Arc<TracesSampler>>,
    /// Maximum number of breadcrumbs. (defaults to 100)
    pub max_breadcrumbs: usize,
    /// Attaches stacktraces to messages.
    pub attach_stacktrace: bool,
    /// If turned on some default PII information is attached.
    pub send_default_pii: bool,
    /// Regular expressions matched against the message and exception values
    /// of error events.  Matching events are dropped.
    pub ignore_errors: Vec<Cow<'static, str>>,
    /// Regular expressions matched against transaction names.  Matching
    /// transactions are dropped.
    pub ignore_transactions: Vec<Cow<'static, str>>,
    // Integration options
    /// A list of integrations to enable.
    pub integrations: Vec<Arc<dyn Integration>>,
    /// Whether to add default integrations.
    pub default_integrations: bool,
    // Hooks
    /// Callback that is executed before error event sending.
    pub before_send: Option<BeforeSendCallback>,
    /// Callback that is executed before transaction sending.
    pub before_send_transaction: Option<BeforeSendCallback>,
    /// Callback that is executed for each Breadcrumb being added.
    pub before_breadcrumb: Option<BeforeCallback<Breadcrumb>>,
    /// Callback that is executed for each Log being added.
    pub before_send_log: Option<BeforeCallback<Log>>,
    /// Callback that is executed for each metric being added.
    pub before_send_metric: Option<BeforeCallback<TraceMetric>>,
    // Logs and metrics
    /// Enables the capture of structured logs.
    pub enable_logs: bool,
    /// Enables the capture of trace metrics.
    pub enable_metrics: bool,
    // Transport options
    /// The transport to use.
    ///
    /// This is typically either a boxed function taking the client options by
    /// reference and returning a `Transport`, or a shared `Arc<Transport>`.
    pub transport: Option<Arc<dyn TransportFactory>>,
    /// An optional HTTP proxy to use.
    ///
    /// This will default to the `http_proxy` environment variable.
    pub http_proxy: Option<Cow<'static, str>>,
    /// An optional HTTPS proxy to use.
    ///
    /// This will default to the `HTTPS_PROXY` environment variable
    /// or `http_proxy` if that one exists.
    pub https_proxy: Option<Cow<'static, str>>,
    /// The timeout on client drop for draining events on shutdown.
    pub shutdown_timeout: Duration,
    /// The user agent that should be reported.
    pub user_agent: Cow<'static, str>,
    // Emitter tuning
    /// Envelopes per transport batch. (defaults to 30)
    pub transport_batch_size: usize,
    /// Maximum time an envelope waits in the transport queue. (defaults to 1s)
    pub transport_batch_timeout: Duration,
    /// Logs per envelope. (defaults to 100)
    pub log_batch_size: usize,
    /// Maximum time a log waits before being sent. (defaults to 5s)
    pub log_batch_timeout: Duration,
    /// Metrics per envelope. (defaults to 100)
    pub metric_batch_size: usize,
    /// Maximum time a metric waits before being sent. (defaults to 5s)
    pub metric_batch_timeout: Duration,
    /// What producers do when a queue is full.
    pub queue_full_policy: QueueFullPolicy,
}

impl ClientOptions {
    /// Creates new Options.
    pub fn new() -> Self {
        Self::default()
    }

    /// Adds a configured integration to the options.
    ///
    /// # Examples
    ///
    /// ```
    /// struct MyIntegration;
    ///
    /// impl outpost_core::Integration for MyIntegration {}
    ///
    /// let options = outpost_core::ClientOptions::new().add_integration(MyIntegration);
    /// assert_eq!(options.integrations.len(), 1);
    /// ```
    pub fn add_integration<I: Integration>(mut self, integration: I) -> Self {
        self.integrations.push(Arc::new(integration));
        self
    }

    /// Checks the sample rates and compiles the ignore patterns.
    pub fn validate(&self) -> Result<(), ConfigError> {
        self.compile().map(|_| ())
    }

    /// Validates the options, keeping the compiled ignore patterns.
    pub(crate) fn compile(&self) -> Result<IgnorePatterns, ConfigError> {
        check_rate("sample_rate", self.sample_rate)?;
        check_rate("traces_sample_rate", self.traces_sample_rate)?;
        Ok(IgnorePatterns {
            errors: compile_patterns(&self.ignore_errors)?,
            transactions: compile_patterns(&self.ignore_transactions)?,
        })
    }
}

/// The compiled `ignore_errors` and `ignore_transactions` patterns.
#[derive(Debug, Default)]
pub(crate) struct IgnorePatterns {
    pub(crate) errors: Vec<Regex>,
    pub(crate) transactions: Vec<Regex>,
}

fn check_rate(name: &'static str, value: f32) -> Result<(), ConfigError> {
    if (0.0..=1.0).contains(&value) {
        Ok(())
    } else {
        Err(ConfigError::InvalidSampleRate { name, value })
    }
}

fn compile_patterns(patterns: &[Cow<'static, str>]) -> Result<Vec<Regex>, ConfigError> {
    patterns
        .iter()
        .map(|pattern| {
            Regex::new(pattern).map_err(|source| ConfigError::InvalidPattern {
                pattern: pattern.to_string(),
                source,
            })
        })
        .collect()
}

impl fmt::Debug for ClientOptions {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        #[derive(Debug)]
        struct Callback;
        let callback = |set: bool| set.then_some(Callback);

        let integrations: Vec<_> = self.integrations.iter().map(|i| i.name()).collect();

        f.debug_struct("ClientOptions")
            .field("dsn", &self.dsn)
            .field("release", &self.release)
            .field("environment", &self.environment)
            .field("server_name", &self.server_name)
            .field("sample_rate", &self.sample_rate)
            .field("traces_sample_rate", &self.traces_sample_rate)
            .field("traces_sampler", &callback(self.traces_sampler.is_some()))
            .field("max_breadcrumbs", &self.max_breadcrumbs)
            .field("attach_stacktrace", &self.attach_stacktrace)
            .field("send_default_pii", &self.send_default_pii)
            .field("ignore_errors", &self.ignore_errors)
            .field("ignore_transactions", &self.ignore_transactions)
            .field("integrations", &integrations)
            .field("default_integrations", &self.default_integrations)
            .field("before_send", &callback(self.before_send.is_some()))
            .field(
                "before_send_transaction",
                &callback(self.before_send_transaction.is_some()),
            )
            .field("before_breadcrumb", &callback(self.before_breadcrumb.is_some()))
            .field("before_send_log", &callback(self.before_send_log.is_some()))
            .field("before_send_metric", &callback(self.before_send_metric.is_some()))
            .field("enable_logs", &self.enable_logs)
            .field("enable_metrics", &self.enable_metrics)
            .field("transport", &callback(self.transport.is_some()))
            .field("http_proxy", &self.http_proxy)
            .field("https_proxy", &self.https_proxy)
            .field("shutdown_timeout", &self.shutdown_timeout)
            .field("user_agent", &self.user_agent)
            .field("transport_batch_size", &self.transport_batch_size)
            .field("transport_batch_timeout", &self.transport_batch_timeout)
            .field("log_batch_size", &self.log_batch_size)
            .field("log_batch_timeout", &self.log_batch_timeout)
            .field("metric_batch_size", &self.metric_batch_size)
            .field("metric_batch_timeout", &self.metric_batch_timeout)
            .field("queue_full_policy", &self.queue_full_policy)
            .finish()
    }
}

impl Default for ClientOptions {
    fn default() -> ClientOptions {
        ClientOptions {
            dsn: None,
            release: None,
            environment: None,
            server_name: None,
            sample_rate: 1.0,
            traces_sample_rate: 0.0,
            traces_sampler: None,
            max_breadcrumbs: 100,
            attach_stacktrace: false,
            send_default_pii: false,
            ignore_errors: vec![],
            ignore_transactions: vec![],
            integrations: vec![],
            default_integrations: true,
            before_send: None,
            before_send_transaction: None,
            before_breadcrumb: None,
            before_send_log: None,
            before_send_metric: None,
            enable_logs: false,
            enable_metrics: false,
            transport: None,
            http_proxy: None,
            https_proxy: None,
            shutdown_timeout: Duration::from_secs(2),
            user_agent: Cow::Borrowed(&USER_AGENT),
            transport_batch_size: 30,
            transport_batch_timeout: Duration::from_secs(1),
            log_batch_size: 100,
            log_batch_timeout: Duration::from_secs(5),
            metric_batch_size: 100,
            metric_batch_timeout: Duration::from_secs(5),
            queue_full_policy: QueueFullPolicy::Block,
        }
    }
}

/// Conversion into validated [`ClientOptions`].
///
/// Implemented for `ClientOptions` itself, for everything that is [`IntoDsn`]
/// and for `(dsn, options)` pairs.  Unlike a plain `From` conversion this
/// reports an invalid DSN instead of panicking.
pub trait IntoClientOptions {
    /// Converts the value, parsing the DSN where needed.
    fn into_client_options(self) -> Result<ClientOptions, ConfigError>;
}

impl IntoClientOptions for ClientOptions {
    fn into_client_options(self) -> Result<ClientOptions, ConfigError> {
        Ok(self)
    }
}

impl<T: IntoDsn> IntoClientOptions for (T, ClientOptions) {
    fn into_client_options(self) -> Result<ClientOptions, ConfigError> {
        let (into_dsn, mut opts) = self;
        opts.dsn = into_dsn.into_dsn()?;
        Ok(opts)
    }
}

impl<T: IntoDsn> IntoClientOptions for T {
    fn into_client_options(self) -> Result<ClientOptions, ConfigError> {
        Ok(ClientOptions {
            dsn: self.into_dsn()?,
            ..ClientOptions::default()
        })
    }
}
