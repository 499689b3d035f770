use std::sync::Arc;

use outpost_core::outpost_debug;

use crate::defaults::apply_defaults;
use crate::{Client, ConfigError, Hub, IntoClientOptions};

/// Helper struct that is returned from `init`.
///
/// When this is dropped everything still queued is drained, waiting at most
/// the `shutdown_timeout` of the client options.
#[must_use = "when the init guard is dropped the transport will be shut down and no further \
              events can be sent.  If you do want to ignore this use mem::forget on it."]
pub struct ClientInitGuard(Arc<Client>);

impl ClientInitGuard {
    /// Quick check if the client is enabled.
    pub fn is_enabled(&self) -> bool {
        self.0.is_enabled()
    }

    /// The client bound by `init`.
    pub fn client(&self) -> &Arc<Client> {
        &self.0
    }
}

impl Drop for ClientInitGuard {
    fn drop(&mut self) {
        if self.is_enabled() {
            outpost_debug!("[init] Dropping client guard -> disposing client");
        } else {
            outpost_debug!("[init] Dropping client guard (no client to dispose)");
        }
        self.0.close(None);
    }
}

/// Creates the client for a given client config and binds it.
///
/// The options are completed with [`apply_defaults`] first.  This returns a
/// client init guard that must kept in scope will help the client send
/// events before the application closes.  When the guard is dropped then
/// the transport that was initialized shuts down and no further events can
/// be sent on it.
///
/// Invalid options, such as a malformed DSN or a sample rate outside of
/// `0.0..=1.0`, are returned as a [`ConfigError`].  No client is bound then.
///
/// # Examples
///
/// ```
/// let _outpost = outpost::init("https://key@outpost.invalid/1234").unwrap();
/// ```
///
/// Or if draining on shutdown should be ignored:
///
/// ```
/// std::mem::forget(outpost::init("https://key@outpost.invalid/1234"));
/// ```
///
/// Configuration errors are reported:
///
/// ```
/// let result = outpost::init(outpost::ClientOptions {
///     sample_rate: 2.0,
///     ..Default::default()
/// });
/// assert!(result.is_err());
/// ```
pub fn init<C: IntoClientOptions>(cfg: C) -> Result<ClientInitGuard, ConfigError> {
    let options = apply_defaults(cfg.into_client_options()?);
    let client = Arc::new(Client::try_with_options(options)?);
    Hub::with(|hub| hub.bind_client(Some(client.clone())));
    if let Some(dsn) = client.dsn() {
        outpost_debug!("[init] Enabled client for DSN {}", dsn);
    } else {
        outpost_debug!("[init] Initialized disabled client, no DSN configured");
    }
    Ok(ClientInitGuard(client))
}
