use std::sync::Arc;
use std::time::{Duration, Instant};

use crate::protocol::DataCategory;
use crate::{ClientOptions, Envelope};

/// The trait for transports.
///
/// A transport is responsible for sending envelopes to the ingestion endpoint.
/// Sending is best effort: `send_envelope` must not block on the network and
/// reports no errors.
pub trait Transport: Send + Sync + 'static {
    /// Sends an [`Envelope`].
    fn send_envelope(&self, envelope: Envelope);

    /// Flushes the transport queue, waiting at most `timeout`.
    ///
    /// Returns `true` if the queue was drained in time.
    fn flush(&self, timeout: Duration) -> bool {
        let _timeout = timeout;
        true
    }

    /// Flushes the transport queue, waiting until `deadline`.
    fn flush_until(&self, deadline: Instant) -> bool {
        self.flush(deadline.saturating_duration_since(Instant::now()))
    }

    /// Instructs the transport to shut down.
    ///
    /// Repeated calls must be harmless.
    fn shutdown(&self, timeout: Duration) -> bool {
        self.flush(timeout)
    }

    /// Whether items of `category` are currently suppressed by a rate limit.
    fn is_rate_limited(&self, category: DataCategory) -> bool {
        let _category = category;
        false
    }
}

/// A factory creating transport instances.
///
/// Because options are potentially reused between different clients the
/// options do not actually contain a transport but a factory object that
/// can create transports instead.
///
/// The factory has a single method that creates a new arced transport.
/// Because transports can be wrapped in `Arc`s and those are clonable
/// any `Arc<Transport>` is also a valid transport factory.  This for
/// instance lets you put a `Arc<TestTransport>` directly into the options.
///
/// This is automatically implemented for all closures optionally taking
/// options and returning a boxed factory.
pub trait TransportFactory: Send + Sync {
    /// Given some options creates a transport.
    fn create_transport(&self, options: &ClientOptions) -> Arc<dyn Transport>;
}

impl<F> TransportFactory for F
where
    F: Fn(&ClientOptions) -> Arc<dyn Transport> + Clone + Send + Sync + 'static,
{
    fn create_transport(&self, options: &ClientOptions) -> Arc<dyn Transport> {
        (*self)(options)
    }
}

impl<T: Transport> TransportFactory for Arc<T> {
    fn create_transport(&self, options: &ClientOptions) -> Arc<dyn Transport> {
        let _options = options;
        self.clone()
    }
}
