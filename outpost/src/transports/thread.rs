use std::sync::{Arc, RwLock};
use std::time::{Duration, Instant};

use outpost_core::outpost_debug;

use super::{
    admit, deliver, is_rate_limited, DeliveryResponse, RateLimiter, SharedRateLimiter,
    TransportError,
};
use crate::protocol::DataCategory;
use crate::{BatchConfig, BatchEmitter, ClientOptions, Envelope, Transport};

/// A [`Transport`] delivering envelopes from a background worker.
///
/// Envelopes are queued on a [`BatchEmitter`] sized by the
/// `transport_batch_size`, `transport_batch_timeout` and `queue_full_policy`
/// options.  The worker calls `send` once per envelope.  Rate limited items
/// are removed before they enter the queue.
pub struct AsyncTransport {
    emitter: BatchEmitter<Envelope>,
    rate_limiter: SharedRateLimiter,
}

impl AsyncTransport {
    /// Creates a new transport sending envelopes with `send`.
    ///
    /// # Examples
    ///
    /// ```
    /// use outpost::transports::{AsyncTransport, DeliveryResponse};
    /// use outpost::ClientOptions;
    ///
    /// let transport = AsyncTransport::new(&ClientOptions::default(), |envelope| {
    ///     let _body = envelope.to_vec()?;
    ///     Ok(DeliveryResponse {
    ///         status: 200,
    ///         ..Default::default()
    ///     })
    /// });
    /// ```
    pub fn new<SendFn>(options: &ClientOptions, mut send: SendFn) -> Self
    where
        SendFn: FnMut(Envelope) -> Result<DeliveryResponse, TransportError> + Send + 'static,
    {
        let rate_limiter = Arc::new(RwLock::new(RateLimiter::new()));
        let limiter = rate_limiter.clone();
        let config = BatchConfig {
            name: "transport",
            batch_size: options.transport_batch_size,
            batch_timeout: options.transport_batch_timeout,
            queue_full_policy: options.queue_full_policy,
        };
        let emitter = BatchEmitter::new(config, move |envelopes: Vec<Envelope>| {
            for envelope in envelopes {
                deliver(&mut send, &limiter, envelope);
            }
        });
        emitter.start();
        AsyncTransport {
            emitter,
            rate_limiter,
        }
    }

    /// The number of envelopes dropped because the queue was full.
    pub fn dropped_count(&self) -> u64 {
        self.emitter.dropped_count()
    }
}

impl Transport for AsyncTransport {
    fn send_envelope(&self, envelope: Envelope) {
        let Some(envelope) = admit(&self.rate_limiter, envelope) else {
            return;
        };
        if !self.emitter.enqueue(envelope) {
            outpost_debug!("[AsyncTransport] Envelope rejected, transport is shut down or full");
        }
    }

    fn flush(&self, timeout: Duration) -> bool {
        self.emitter.flush(timeout)
    }

    fn flush_until(&self, deadline: Instant) -> bool {
        self.emitter.flush_until(deadline)
    }

    fn shutdown(&self, timeout: Duration) -> bool {
        self.emitter.shutdown(timeout)
    }

    fn is_rate_limited(&self, category: DataCategory) -> bool {
        is_rate_limited(&self.rate_limiter, category)
    }
}
