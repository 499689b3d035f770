//! This crate provides the core of the Outpost SDK: the [`Hub`] and
//! [`Scope`] context model, the [`Client`] event pipeline and the
//! [`BatchEmitter`] every outbound channel is built on.
//!
//! `outpost-core` is meant for integration authors and library authors that
//! want to instrument their code.  Applications should use the [`outpost`]
//! crate instead, which comes with an HTTP transport, environment defaults
//! and a panic integration.
//!
//! # Core Concepts
//!
//! Captures go through the [`Hub`] bound to the current thread.  The hub
//! holds a stack of [`Scope`]s carrying contextual data, and a [`Client`]
//! which filters, samples and hands items to a [`Transport`].  Extension
//! points are the [`Integration`], [`Transport`] and [`TransportFactory`]
//! traits.
//!
//! # Parallelism, Concurrency and Async
//!
//! The main concurrency primitive is the [`Hub`]. In general, all concurrent
//! code, no matter if multithreaded parallelism or futures concurrency, needs
//! to run with its own copy of a [`Hub`]. Even though the [`Hub`] is internally
//! synchronized, using it concurrently may lead to unexpected results.
//!
//! For threads or tasks that are running concurrently or outlive the current
//! execution context, a new [`Hub`] needs to be created and bound for the computation.
//!
//! ```rust
//! # let rt = tokio::runtime::Builder::new_current_thread().build().unwrap();
//! # rt.block_on(async {
//! use outpost_core::{Hub, OutpostFutureExt};
//! use std::sync::Arc;
//!
//! // Spawned thread that is being joined:
//! let hub = Arc::new(Hub::new_from_top(Hub::current()));
//! let result = std::thread::spawn(move || Hub::run(hub, || 1_u32)).join();
//! assert_eq!(result.unwrap(), 1);
//!
//! // Future bound to its own hub:
//! let hub = Arc::new(Hub::new_from_top(Hub::current()));
//! let result = async { 1_u32 }.bind_hub(hub).await;
//! assert_eq!(result, 1);
//! # });
//! ```
//!
//! # Features
//!
//! - `feature = "test"`: Activates the [`test`] module, which can be used to
//!   write integration tests. It comes with a test transport which can capture
//!   all sent envelopes for inspection.
//!
//! [`outpost`]: https://crates.io/crates/outpost
//! [`test`]: test/index.html

#![warn(missing_docs)]

// macros; these need to be first to be used by other modules
#[macro_use]
mod macros;

mod api;
mod backtrace_support;
mod breadcrumbs;
mod client;
mod clientoptions;
mod constants;
mod emitter;
mod error;
mod futures;
mod hub;
mod hub_impl;
mod integration;
mod intodsn;
#[doc(hidden)]
pub mod logger;
mod metrics;
mod performance;
mod recover;
mod sampler;
mod scope;
mod transport;

// public api or exports from this crate
pub use crate::api::*;
pub use crate::backtrace_support::{
    current_stacktrace, function_starts_with, parse_type_from_debug, strip_symbol,
    trim_stacktrace,
};
pub use crate::breadcrumbs::IntoBreadcrumbs;
pub use crate::client::{Client, EventHint};
pub use crate::clientoptions::{
    BeforeCallback, BeforeSendCallback, ClientOptions, ConfigError, IntoClientOptions,
    TracesSampler,
};
pub use crate::constants::{SDK_NAME, VERSION};
pub use crate::emitter::{BatchConfig, BatchEmitter, FlushCallback, QueueFullPolicy};
pub use crate::error::{capture_error, event_from_error};
pub use crate::futures::{OutpostFuture, OutpostFutureExt};
pub use crate::hub::Hub;
pub use crate::hub_impl::SwitchGuard;
pub use crate::integration::Integration;
#[doc(hidden)]
pub use crate::integration::AsAny;
pub use crate::intodsn::IntoDsn;
pub use crate::metrics::{metrics_count, metrics_distribution, metrics_gauge, MetricOptions};
pub use crate::performance::*;
pub use crate::recover::{
    event_from_panic_message, is_inside_recover_boundary, panic_message, stash_panic_stacktrace,
};
pub use crate::sampler::{sample_should_send, SamplingContext};
pub use crate::scope::{EventProcessor, Scope, ScopeGuard};
pub use crate::transport::{Transport, TransportFactory};

// test utilities
#[cfg(any(test, feature = "test"))]
pub mod test;

// public api from other crates
#[doc(inline)]
pub use outpost_types as types;
pub use outpost_types::protocol;
pub use outpost_types::protocol::{Breadcrumb, Envelope, Level, User};

#[doc(hidden)]
pub use tracing as __tracing;
