//! The provided transports.
//!
//! [`AsyncTransport`] queues envelopes on a [`BatchEmitter`] worker and
//! [`SyncTransport`] sends them inline.  Both are generic over a send
//! callback performing one request per envelope, and both honor the rate
//! limits reported back by the ingestion endpoint.  The `reqwest` feature
//! turns on [`ReqwestHttpTransport`], the default HTTP transport.
//!
//! [`BatchEmitter`]: crate::BatchEmitter

use std::sync::{Arc, PoisonError, RwLock};

use outpost_core::outpost_debug;

use crate::protocol::DataCategory;
use crate::{ClientOptions, Envelope, Transport, TransportFactory};

mod ratelimit;
mod sync;
mod thread;

#[cfg(feature = "reqwest")]
mod reqwest;

pub use self::ratelimit::RateLimiter;
pub use self::sync::SyncTransport;
pub use self::thread::AsyncTransport;

#[cfg(feature = "reqwest")]
pub use self::reqwest::ReqwestHttpTransport;

/// The default http transport.
#[cfg(feature = "reqwest")]
pub type HttpTransport = ReqwestHttpTransport;

/// What the ingestion endpoint answered to one envelope.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct DeliveryResponse {
    /// The HTTP status code.
    pub status: u16,
    /// The raw `Retry-After` header.
    pub retry_after: Option<String>,
    /// The raw `X-Sentry-Rate-Limits` header.
    pub rate_limits: Option<String>,
}

/// An error while delivering an envelope.
///
/// Delivery errors are logged and the envelope is discarded; they never
/// reach the code that captured the data.
#[derive(Debug, thiserror::Error)]
pub enum TransportError {
    /// The client options carry no DSN to derive the endpoint from.
    #[error("no DSN configured")]
    MissingDsn,
    /// The envelope could not be serialized.
    #[error("failed to serialize envelope")]
    Serialize(#[from] std::io::Error),
    /// The HTTP client could not be built.
    #[error("failed to build HTTP client: {0}")]
    ClientBuild(String),
    /// The request failed before a response was received.
    #[cfg(feature = "reqwest")]
    #[error("request failed")]
    Request(#[from] ::reqwest::Error),
}

/// Creates the default HTTP transport.
///
/// This is the default value for `transport` on the client options.  It
/// creates a [`HttpTransport`].  If no http transport was compiled into the
/// library, or the transport cannot be created, envelopes are discarded.
#[derive(Clone)]
pub struct DefaultTransportFactory;

impl TransportFactory for DefaultTransportFactory {
    fn create_transport(&self, options: &ClientOptions) -> Arc<dyn Transport> {
        #[cfg(feature = "reqwest")]
        {
            match HttpTransport::new(options) {
                Ok(transport) => Arc::new(transport),
                Err(err) => {
                    tracing::warn!(
                        target: "outpost",
                        "[Transport] Failed to create HTTP transport: {}",
                        err
                    );
                    Arc::new(DiscardTransport)
                }
            }
        }
        #[cfg(not(feature = "reqwest"))]
        {
            let _ = options;
            tracing::warn!(
                target: "outpost",
                "[Transport] outpost was compiled without transport, envelopes are discarded"
            );
            Arc::new(DiscardTransport)
        }
    }
}

struct DiscardTransport;

impl Transport for DiscardTransport {
    fn send_envelope(&self, envelope: Envelope) {
        outpost_debug!(
            "[Transport] Discarding envelope {:?}, no transport available",
            envelope.uuid()
        );
    }
}

/// The shared state of a rate limited transport.
pub(crate) type SharedRateLimiter = Arc<RwLock<RateLimiter>>;

/// Removes rate limited items before an envelope is queued.
pub(crate) fn admit(limiter: &SharedRateLimiter, envelope: Envelope) -> Option<Envelope> {
    let filtered = limiter
        .read()
        .unwrap_or_else(PoisonError::into_inner)
        .filter_envelope(envelope);
    if filtered.is_none() {
        tracing::info!(
            target: "outpost",
            "[Transport] Skipping envelope, all items are rate limited"
        );
    }
    filtered
}

pub(crate) fn is_rate_limited(limiter: &SharedRateLimiter, category: DataCategory) -> bool {
    limiter
        .read()
        .unwrap_or_else(PoisonError::into_inner)
        .is_disabled(category)
        .is_some()
}

/// Sends one envelope and records the rate limits of the response.
///
/// Limits may have changed while the envelope was queued, so they are
/// applied once more right before the request.
pub(crate) fn deliver<SendFn>(send: &mut SendFn, limiter: &SharedRateLimiter, envelope: Envelope)
where
    SendFn: FnMut(Envelope) -> Result<DeliveryResponse, TransportError>,
{
    let Some(envelope) = admit(limiter, envelope) else {
        return;
    };
    match send(envelope) {
        Ok(response) => {
            outpost_debug!("[Transport] Envelope delivered, status {}", response.status);
            limiter
                .write()
                .unwrap_or_else(PoisonError::into_inner)
                .update_from_response(&response);
        }
        Err(err) => {
            outpost_debug!("[Transport] Failed to send envelope: {}", err);
        }
    }
}
