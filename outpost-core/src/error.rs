use std::error::Error;

use crate::backtrace_support::parse_type_from_debug;
use crate::client::EventHint;
use crate::protocol::{Event, Exception, Level};
use crate::types::Uuid;
use crate::Hub;

impl Hub {
    /// Capture any `std::error::Error`.
    ///
    /// See the global [`capture_error`] for more documentation.
    pub fn capture_error<E: Error + ?Sized>(&self, error: &E) -> Uuid {
        if self.client().is_none() {
            return Uuid::nil();
        }
        let hint = EventHint {
            original: Some(error.to_string()),
            mechanism: None,
        };
        self.capture_event_with_hint(event_from_error(error), &hint)
    }
}

/// Captures a `std::error::Error`.
///
/// Creates an event from the given error and sends it to the current hub.
/// A chain of errors will be resolved as well, and sorted oldest to newest.
///
/// # Examples
/// ```
/// outpost_core::capture_error(&std::io::Error::last_os_error());
/// ```
pub fn capture_error<E: Error + ?Sized>(error: &E) -> Uuid {
    Hub::with_active(|hub| hub.capture_error(error))
}

/// Create an `Event` from a `std::error::Error`.
///
/// The error and its chain of sources become exceptions, sorted oldest
/// (innermost source) to newest.
///
/// # Examples
///
/// ```
/// use thiserror::Error;
///
/// #[derive(Debug, Error)]
/// #[error("inner")]
/// struct InnerError;
///
/// #[derive(Debug, Error)]
/// #[error("outer")]
/// struct OuterError(#[from] InnerError);
///
/// let event = outpost_core::event_from_error(&OuterError(InnerError));
/// assert_eq!(event.level, outpost_core::protocol::Level::Error);
/// assert_eq!(event.exception.len(), 2);
/// assert_eq!(&event.exception[0].ty, "InnerError");
/// assert_eq!(event.exception[0].value, Some("inner".into()));
/// assert_eq!(&event.exception[1].ty, "OuterError");
/// assert_eq!(event.exception[1].value, Some("outer".into()));
/// ```
pub fn event_from_error<E: Error + ?Sized>(err: &E) -> Event {
    let mut exceptions = vec![exception_from_error(err)];

    let mut source = err.source();
    while let Some(err) = source {
        exceptions.push(exception_from_error(err));
        source = err.source();
    }

    exceptions.reverse();
    Event {
        exception: exceptions,
        level: Level::Error,
        ..Default::default()
    }
}

fn exception_from_error<E: Error + ?Sized>(err: &E) -> Exception {
    let dbg = format!("{err:?}");
    Exception {
        ty: parse_type_from_debug(&dbg).to_owned(),
        value: Some(err.to_string()),
        ..Default::default()
    }
}
