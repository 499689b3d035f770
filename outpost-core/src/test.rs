//! This provides testing functionality for building tests.
//!
//! **Feature:** `test` (*disabled by default*)
//!
//! If the crate has been compiled with the test support feature this
//! module becomes available and provides functionality to capture events
//! in a block.
//!
//! # Example usage
//!
//! ```
//! use outpost_core::test::with_captured_events;
//! use outpost_core::{capture_message, Level};
//!
//! let events = with_captured_events(|| {
//!     capture_message("Hello World!", Level::Warning);
//! });
//! assert_eq!(events.len(), 1);
//! assert_eq!(events[0].message.as_ref().unwrap(), "Hello World!");
//! ```

use std::sync::{Arc, LazyLock, Mutex, PoisonError};

use crate::protocol::{EnvelopeItem, Event};
use crate::types::Dsn;
use crate::{Client, ClientOptions, Envelope, Hub, IntoClientOptions, Transport};

static TEST_DSN: LazyLock<Dsn> = LazyLock::new(|| {
    "https://public@outpost.invalid/1"
        .parse()
        .expect("the test dsn is valid")
});

/// Collects envelopes instead of sending them.
///
/// # Examples
///
/// ```
/// use outpost_core::test::TestTransport;
/// use outpost_core::{ClientOptions, Hub};
/// use std::sync::Arc;
///
/// let transport = TestTransport::new();
/// let options = ClientOptions {
///     dsn: Some("https://public@example.com/1".parse().unwrap()),
///     transport: Some(Arc::new(transport.clone())),
///     ..ClientOptions::default()
/// };
/// Hub::current().bind_client(Some(Arc::new(outpost_core::Client::with_options(options))));
/// ```
pub struct TestTransport {
    collected: Mutex<Vec<Envelope>>,
}

impl TestTransport {
    /// Creates a new test transport.
    #[allow(clippy::new_ret_no_self)]
    pub fn new() -> Arc<TestTransport> {
        Arc::new(TestTransport {
            collected: Mutex::new(vec![]),
        })
    }

    /// Fetches and clears the contained envelopes.
    pub fn fetch_and_clear_envelopes(&self) -> Vec<Envelope> {
        let mut guard = self
            .collected
            .lock()
            .unwrap_or_else(PoisonError::into_inner);
        std::mem::take(&mut *guard)
    }

    /// Fetches and clears the contained events and transactions.
    pub fn fetch_and_clear_events(&self) -> Vec<Event> {
        events_from_envelopes(self.fetch_and_clear_envelopes())
    }
}

impl Transport for TestTransport {
    fn send_envelope(&self, envelope: Envelope) {
        self.collected
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .push(envelope);
    }
}

fn events_from_envelopes(envelopes: Vec<Envelope>) -> Vec<Event> {
    envelopes
        .iter()
        .flat_map(|envelope| envelope.items())
        .filter_map(|item| match item {
            EnvelopeItem::Event(event) | EnvelopeItem::Transaction(event) => Some(event.clone()),
            _ => None,
        })
        .collect()
}

/// Runs some code with the default test hub and returns the captured events.
///
/// This is a shortcut for creating a testable hub with default options and
/// to call `run_and_capture_events` on it.
pub fn with_captured_events<F: FnOnce()>(f: F) -> Vec<Event> {
    with_captured_events_options(f, ClientOptions::default())
}

/// Runs some code with the default test hub with the given options and
/// returns the captured events.
///
/// If no DSN is set on the options a default test DSN is inserted.  The
/// transport on the options is also overridden with a `TestTransport`.
pub fn with_captured_events_options<F: FnOnce(), O: IntoClientOptions>(
    f: F,
    options: O,
) -> Vec<Event> {
    events_from_envelopes(with_captured_envelopes_options(f, options))
}

/// Runs some code with the default test hub and returns the captured envelopes.
pub fn with_captured_envelopes<F: FnOnce()>(f: F) -> Vec<Envelope> {
    with_captured_envelopes_options(f, ClientOptions::default())
}

/// Runs some code with the default test hub with the given options and
/// returns the captured envelopes.
///
/// The client is closed afterwards, so logs and metrics still queued in
/// its emitters are part of the result.
///
/// # Panics
///
/// Panics if the options are invalid.
pub fn with_captured_envelopes_options<F: FnOnce(), O: IntoClientOptions>(
    f: F,
    options: O,
) -> Vec<Envelope> {
    let transport = TestTransport::new();
    let mut options = options
        .into_client_options()
        .expect("test options are valid");
    options.dsn = Some(options.dsn.unwrap_or_else(|| TEST_DSN.clone()));
    options.transport = Some(Arc::new(transport.clone()));
    let client = Arc::new(Client::try_with_options(options).expect("test options are valid"));
    Hub::run(
        Arc::new(Hub::new(Some(client.clone()), Arc::new(Default::default()))),
        f,
    );
    client.close(None);
    transport.fetch_and_clear_envelopes()
}
