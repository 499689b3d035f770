//! Panic capture at explicit unwind boundaries.
//!
//! [`Hub::catch_unwind`] runs a closure, reports a panic escaping it as a
//! fatal event and then re-raises the panic.  Boundaries may be nested; a
//! panic is reported once, by the innermost boundary it crosses.  A panic
//! that was already reported is recognized by its payload, which
//! `resume_unwind` passes on unchanged.

use std::any::Any;
use std::cell::{Cell, RefCell};
use std::panic::{self, UnwindSafe};

use crate::client::EventHint;
use crate::protocol::{Event, Exception, Level, Mechanism, Stacktrace};
use crate::types::Uuid;
use crate::Hub;

thread_local! {
    static BOUNDARY_DEPTH: Cell<usize> = const { Cell::new(0) };
    static PANIC_STACKTRACE: RefCell<Option<Stacktrace>> = const { RefCell::new(None) };
    static CAPTURED_PAYLOAD: RefCell<Option<CapturedPayload>> = const { RefCell::new(None) };
}

/// Identifies the payload of the last panic reported on this thread.
///
/// The address alone is not enough: once a caught payload is dropped the
/// allocator may hand the same address to the next panic.
#[derive(Debug, PartialEq)]
struct CapturedPayload {
    address: usize,
    message: String,
}

impl CapturedPayload {
    fn of(payload: &(dyn Any + Send)) -> Self {
        CapturedPayload {
            address: payload as *const (dyn Any + Send) as *const () as usize,
            message: panic_message(payload).to_owned(),
        }
    }
}

/// Returns `true` while the current thread runs inside [`Hub::catch_unwind`].
///
/// The panic hook uses this to leave the reporting to the boundary.
pub fn is_inside_recover_boundary() -> bool {
    BOUNDARY_DEPTH.with(|depth| depth.get() > 0)
}

/// Hands the stacktrace of a panic in flight to the enclosing boundary.
///
/// Called from the panic hook, where the panicking frames are still on the
/// stack.  A new panic also resets the reported state of the thread.
pub fn stash_panic_stacktrace(stacktrace: Option<Stacktrace>) {
    PANIC_STACKTRACE.with(|stash| *stash.borrow_mut() = stacktrace);
    CAPTURED_PAYLOAD.with(|captured| captured.borrow_mut().take());
}

fn take_panic_stacktrace() -> Option<Stacktrace> {
    PANIC_STACKTRACE.with(|stash| stash.borrow_mut().take())
}

/// Extracts the message of a panic payload.
pub fn panic_message(payload: &(dyn Any + Send)) -> &str {
    match payload.downcast_ref::<&'static str>() {
        Some(s) => s,
        None => match payload.downcast_ref::<String>() {
            Some(s) => &s[..],
            None => "Box<Any>",
        },
    }
}

/// Creates a fatal, unhandled `panic` event from a panic message.
pub fn event_from_panic_message(msg: &str, stacktrace: Option<Stacktrace>) -> Event {
    Event {
        exception: vec![Exception {
            ty: "panic".into(),
            mechanism: Some(Mechanism {
                ty: "panic".into(),
                handled: Some(false),
                ..Default::default()
            }),
            value: Some(msg.to_string()),
            stacktrace,
            ..Default::default()
        }],
        level: Level::Fatal,
        ..Default::default()
    }
}

impl Hub {
    /// Reports a recovered panic payload as a fatal event.
    ///
    /// The stacktrace stashed by the panic hook, if any, is attached.
    pub fn recover(&self, payload: &(dyn Any + Send)) -> Uuid {
        let msg = panic_message(payload);
        let hint = EventHint {
            original: Some(msg.to_string()),
            mechanism: Some("panic".into()),
        };
        let event = event_from_panic_message(msg, take_panic_stacktrace());
        self.capture_event_with_hint(event, &hint)
    }

    /// Runs `f`, reporting a panic that escapes it before re-raising it.
    ///
    /// The outermost boundary also flushes the client so the report leaves
    /// the process even if the unwind ends it.
    ///
    /// # Examples
    ///
    /// ```
    /// use outpost_core::Hub;
    ///
    /// let hub = Hub::current();
    /// let result = std::panic::catch_unwind(|| hub.catch_unwind(|| panic!("boom")));
    /// assert!(result.is_err());
    /// ```
    pub fn catch_unwind<F, R>(&self, f: F) -> R
    where
        F: FnOnce() -> R + UnwindSafe,
    {
        BOUNDARY_DEPTH.with(|depth| depth.set(depth.get() + 1));
        let rv = panic::catch_unwind(f);
        let depth = BOUNDARY_DEPTH.with(|depth| {
            let remaining = depth.get().saturating_sub(1);
            depth.set(remaining);
            remaining
        });

        let payload = match rv {
            Ok(rv) => return rv,
            Err(payload) => payload,
        };

        let current = CapturedPayload::of(&*payload);
        let reported = CAPTURED_PAYLOAD.with(|captured| {
            let mut captured = captured.borrow_mut();
            if captured.as_ref() == Some(&current) {
                true
            } else {
                *captured = Some(current);
                false
            }
        });
        if !reported {
            let event_id = self.recover(&*payload);
            outpost_debug!("[Hub] Captured panic at recover boundary: {}", event_id);
        }
        if depth == 0 {
            CAPTURED_PAYLOAD.with(|captured| captured.borrow_mut().take());
            self.flush(None);
        }
        panic::resume_unwind(payload)
    }
}
