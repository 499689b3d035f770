use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, PoisonError, RwLock};
use std::time::Duration;

use outpost_core::outpost_debug;

use super::{
    deliver, is_rate_limited, DeliveryResponse, RateLimiter, SharedRateLimiter, TransportError,
};
use crate::protocol::DataCategory;
use crate::{Envelope, Transport};

type SendFn = Box<dyn FnMut(Envelope) -> Result<DeliveryResponse, TransportError> + Send>;

/// A [`Transport`] sending every envelope inline, on the capturing thread.
///
/// Sends are serialized by a mutex.  This suits short-lived processes and
/// environments without background threads; capture calls block for the
/// duration of the request.
pub struct SyncTransport {
    send: Mutex<SendFn>,
    rate_limiter: SharedRateLimiter,
    shut_down: AtomicBool,
}

impl SyncTransport {
    /// Creates a new transport sending envelopes with `send`.
    pub fn new<F>(send: F) -> Self
    where
        F: FnMut(Envelope) -> Result<DeliveryResponse, TransportError> + Send + 'static,
    {
        SyncTransport {
            send: Mutex::new(Box::new(send)),
            rate_limiter: Arc::new(RwLock::new(RateLimiter::new())),
            shut_down: AtomicBool::new(false),
        }
    }
}

impl Transport for SyncTransport {
    fn send_envelope(&self, envelope: Envelope) {
        if self.shut_down.load(Ordering::SeqCst) {
            outpost_debug!("[SyncTransport] Envelope rejected, transport is shut down");
            return;
        }
        let mut send = self.send.lock().unwrap_or_else(PoisonError::into_inner);
        deliver(&mut *send, &self.rate_limiter, envelope);
    }

    fn shutdown(&self, _timeout: Duration) -> bool {
        self.shut_down.store(true, Ordering::SeqCst);
        true
    }

    fn is_rate_limited(&self, category: DataCategory) -> bool {
        is_rate_limited(&self.rate_limiter, category)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::protocol::{Event, Log, LogLevel};

    #[test]
    fn test_sends_inline_and_honors_limits() {
        let sent = Arc::new(Mutex::new(Vec::new()));
        let collected = sent.clone();
        let transport = SyncTransport::new(move |envelope: Envelope| {
            let count = envelope.items().count();
            collected.lock().unwrap().push(count);
            Ok(DeliveryResponse {
                status: 200,
                rate_limits: Some("60:log_item:project".into()),
                ..Default::default()
            })
        });

        let mut envelope = Envelope::new();
        envelope.add_item(Event::default());
        envelope.add_item(vec![Log::new(LogLevel::Info, "first")]);
        transport.send_envelope(envelope);
        assert!(transport.is_rate_limited(DataCategory::LogItem));

        let mut envelope = Envelope::new();
        envelope.add_item(Event::default());
        envelope.add_item(vec![Log::new(LogLevel::Info, "second")]);
        transport.send_envelope(envelope);

        assert_eq!(*sent.lock().unwrap(), [2, 1]);
    }

    #[test]
    fn test_rejects_after_shutdown() {
        let sent = Arc::new(Mutex::new(0));
        let counter = sent.clone();
        let transport = SyncTransport::new(move |_| {
            *counter.lock().unwrap() += 1;
            Ok(DeliveryResponse::default())
        });
        assert!(transport.shutdown(Duration::ZERO));
        assert!(transport.shutdown(Duration::ZERO));
        let mut envelope = Envelope::new();
        envelope.add_item(Event::default());
        transport.send_envelope(envelope);
        assert_eq!(*sent.lock().unwrap(), 0);
    }
}
