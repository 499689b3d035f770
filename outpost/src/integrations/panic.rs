//! The panic handler integration.
//!
//! The `PanicIntegration`, which is enabled by default in `outpost`, installs a
//! panic hook that reports every panic as a fatal event and flushes the
//! client, since the process may be about to end.  Panics are forwarded to
//! the previously registered panic hook afterwards.
//!
//! Inside a [`Hub::catch_unwind`] boundary the hook only records the stack
//! trace of the panic; the boundary reports the panic when it catches it.
//!
//! # Configuration
//!
//! The panic integration can be configured with an additional extractor, which
//! might optionally create an `Event` out of a `PanicHookInfo`.
//!
//! ```
//! let integration = outpost::integrations::panic::PanicIntegration::default()
//!     .add_extractor(|_info| None);
//! ```

use std::panic::{self, PanicHookInfo};
use std::sync::Once;

use outpost_core::outpost_debug;

use crate::protocol::Event;
use crate::{
    current_stacktrace, event_from_panic_message, is_inside_recover_boundary, panic_message,
    stash_panic_stacktrace, ClientOptions, EventHint, Hub, Integration,
};

/// A panic handler that reports panics.
///
/// Does nothing unless the active client has a [`PanicIntegration`].
pub fn panic_handler(info: &PanicHookInfo<'_>) {
    Hub::with_active(|hub| {
        hub.with_integration(|integration: &PanicIntegration| {
            if is_inside_recover_boundary() {
                outpost_debug!("[PanicIntegration] Panic inside recover boundary, deferring");
                stash_panic_stacktrace(current_stacktrace());
                return;
            }
            let msg = message_from_panic_info(info);
            outpost_debug!("[PanicIntegration] Panic detected: {}", msg);
            let event = integration.event_from_panic_info(info);
            let hint = EventHint {
                original: Some(msg.to_owned()),
                mechanism: Some("panic".into()),
            };
            let event_id = hub.capture_event_with_hint(event, &hint);
            outpost_debug!("[PanicIntegration] Captured panic as {}, flushing", event_id);
            hub.flush(None);
        })
    });
}

type PanicExtractor = dyn Fn(&PanicHookInfo<'_>) -> Option<Event> + Send + Sync;

/// The panic handler integration.
#[derive(Default)]
pub struct PanicIntegration {
    extractors: Vec<Box<PanicExtractor>>,
}

impl std::fmt::Debug for PanicIntegration {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PanicIntegration")
            .field("extractors", &self.extractors.len())
            .finish()
    }
}

static INIT: Once = Once::new();

impl Integration for PanicIntegration {
    fn name(&self) -> &'static str {
        "panic"
    }

    fn setup(&self, _cfg: &mut ClientOptions) {
        INIT.call_once(|| {
            outpost_debug!("[PanicIntegration] Installing panic hook");
            let next = panic::take_hook();
            panic::set_hook(Box::new(move |info| {
                panic_handler(info);
                next(info);
            }));
        });
    }
}

/// Extract the message of a panic.
pub fn message_from_panic_info<'a>(info: &'a PanicHookInfo<'_>) -> &'a str {
    panic_message(info.payload())
}

impl PanicIntegration {
    /// Creates a new Panic Integration.
    pub fn new() -> Self {
        Self::default()
    }

    /// Registers a new extractor.
    ///
    /// Extractors run in registration order; the first event returned is
    /// used instead of the default one.
    #[must_use]
    pub fn add_extractor<F>(mut self, f: F) -> Self
    where
        F: Fn(&PanicHookInfo<'_>) -> Option<Event> + Send + Sync + 'static,
    {
        self.extractors.push(Box::new(f));
        self
    }

    /// Creates an event from the given panic info.
    ///
    /// The stacktrace is calculated from the current frame.
    pub fn event_from_panic_info(&self, info: &PanicHookInfo<'_>) -> Event {
        for extractor in &self.extractors {
            if let Some(event) = extractor(info) {
                return event;
            }
        }

        event_from_panic_message(message_from_panic_info(info), current_stacktrace())
    }
}
