use std::time::{Duration, Instant};

use ::reqwest::blocking::Client as ReqwestClient;
use ::reqwest::header::RETRY_AFTER;
use ::reqwest::Proxy;

use super::{AsyncTransport, DeliveryResponse, TransportError};
use crate::protocol::DataCategory;
use crate::{ClientOptions, Envelope, Transport};

/// A [`Transport`] that sends envelopes via the [`reqwest`] library.
///
/// When the `transport` feature is enabled this will currently
/// be the default transport.  This is separately enabled by the
/// `reqwest` feature flag.
///
/// Requests are made from the worker thread of an [`AsyncTransport`] with
/// the blocking reqwest client, which is created on that thread on first
/// use.
///
/// [`reqwest`]: https://crates.io/crates/reqwest
pub struct ReqwestHttpTransport {
    inner: AsyncTransport,
}

impl ReqwestHttpTransport {
    /// Creates a new Transport.
    ///
    /// Fails if the options carry no DSN.
    pub fn new(options: &ClientOptions) -> Result<Self, TransportError> {
        Self::new_internal(options, None)
    }

    /// Creates a new Transport that uses the specified [`ReqwestClient`].
    pub fn with_client(
        options: &ClientOptions,
        client: ReqwestClient,
    ) -> Result<Self, TransportError> {
        Self::new_internal(options, Some(client))
    }

    fn new_internal(
        options: &ClientOptions,
        client: Option<ReqwestClient>,
    ) -> Result<Self, TransportError> {
        let dsn = options.dsn.as_ref().ok_or(TransportError::MissingDsn)?;
        let user_agent = options.user_agent.to_string();
        let auth = dsn.to_auth(Some(&user_agent)).to_string();
        let url = dsn.envelope_api_url().to_string();
        let http_proxy = options.http_proxy.as_ref().map(|proxy| proxy.to_string());
        let https_proxy = options.https_proxy.as_ref().map(|proxy| proxy.to_string());

        let mut client = client;
        let inner = AsyncTransport::new(options, move |envelope: Envelope| {
            if client.is_none() {
                client = Some(build_client(
                    http_proxy.as_deref(),
                    https_proxy.as_deref(),
                    &user_agent,
                )?);
            }
            let Some(ref client) = client else {
                return Err(TransportError::ClientBuild("no client".into()));
            };
            let body = envelope.to_vec()?;
            let response = client
                .post(&url)
                .header("X-Sentry-Auth", &auth)
                .header("Content-Type", "application/x-sentry-envelope")
                .body(body)
                .send()?;

            let headers = response.headers();
            let header = |name| {
                headers
                    .get(name)
                    .and_then(|value| value.to_str().ok())
                    .map(str::to_owned)
            };
            Ok(DeliveryResponse {
                status: response.status().as_u16(),
                retry_after: header(RETRY_AFTER.as_str()),
                rate_limits: header("x-sentry-rate-limits"),
            })
        });
        Ok(ReqwestHttpTransport { inner })
    }
}

fn build_client(
    http_proxy: Option<&str>,
    https_proxy: Option<&str>,
    user_agent: &str,
) -> Result<ReqwestClient, TransportError> {
    let mut builder = ReqwestClient::builder().user_agent(user_agent);
    if let Some(url) = http_proxy {
        let proxy = Proxy::http(url).map_err(|err| TransportError::ClientBuild(err.to_string()))?;
        builder = builder.proxy(proxy);
    }
    if let Some(url) = https_proxy {
        let proxy = Proxy::https(url).map_err(|err| TransportError::ClientBuild(err.to_string()))?;
        builder = builder.proxy(proxy);
    }
    builder
        .build()
        .map_err(|err| TransportError::ClientBuild(err.to_string()))
}

impl Transport for ReqwestHttpTransport {
    fn send_envelope(&self, envelope: Envelope) {
        self.inner.send_envelope(envelope)
    }

    fn flush(&self, timeout: Duration) -> bool {
        self.inner.flush(timeout)
    }

    fn flush_until(&self, deadline: Instant) -> bool {
        self.inner.flush_until(deadline)
    }

    fn shutdown(&self, timeout: Duration) -> bool {
        self.inner.shutdown(timeout)
    }

    fn is_rate_limited(&self, category: DataCategory) -> bool {
        self.inner.is_rate_limited(category)
    }
}
