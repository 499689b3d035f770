//! This crate captures errors, panics, transactions, structured logs,
//! metrics and monitor check-ins and delivers them to a Sentry-compatible
//! ingestion endpoint.
//!
//! # Quickstart
//!
//! [`init`] builds a client with the default integrations and binds it to
//! the current hub.  It hands back a [`ClientInitGuard`]; dropping the guard
//! drains the queues within `shutdown_timeout`, so hold on to it for the
//! lifetime of the program.
//!
//! ```
//! let _guard = outpost::init("https://key@outpost.invalid/42").unwrap();
//! outpost::capture_message("nightly job finished", outpost::Level::Info);
//! ```
//!
//! A configuration error is returned by [`init`] and no client is bound, so
//! captures turn into no-ops.
//!
//! Libraries that only instrument code, or that provide their own
//! [`Integration`] or [`Transport`], should depend on `outpost-core`.
//!
//! # Features
//!
//! Default features:
//!
//! * `panic`: the panic hook integration and recover boundaries.
//! * `transport`: the HTTP transport, backed by `reqwest` and `native-tls`.
//!
//! Additional features:
//!
//! * `test`: in-memory transport and capture helpers for tests.
//! * `reqwest`: the `reqwest` transport on its own.
//! * `native-tls`: TLS through the platform library for `reqwest`.
//! * `rustls`: TLS through `rustls` for `reqwest`; combine with
//!   `default-features = false` to avoid building `native-tls`.

#![warn(missing_docs)]

mod defaults;
mod init;
pub mod transports;

// re-export from core
#[doc(inline)]
pub use outpost_core::*;

// added public API
pub use crate::defaults::apply_defaults;
pub use crate::init::{init, ClientInitGuard};

/// Bundled integrations.
///
/// Integrations are registered on [`ClientOptions`] before the client is
/// built.  With `default_integrations` enabled, [`apply_defaults`] adds the
/// bundled ones ahead of user supplied integrations.
pub mod integrations {
    #[cfg(feature = "panic")]
    pub mod panic;
}
