use std::any::{type_name, Any};

use crate::protocol::Event;
use crate::ClientOptions;

/// Integration abstraction.
///
/// An integration can act as an *event source* that captures new events, or
/// as an *event processor* that modifies or drops every `Event` flowing
/// through the client pipeline.
///
/// Integrations are deduplicated by [`name`](Integration::name) when a client
/// is created; the first one registered under a name wins.
// `Any` lets `with_integration` downcast to the concrete type.
pub trait Integration: Sync + Send + Any + AsAny {
    /// Key used for deduplication; also listed in the SDK info of events.
    fn name(&self) -> &'static str {
        type_name::<Self>()
    }

    /// Called once when the integration is attached to a client.
    fn setup(&self, options: &mut ClientOptions) {
        let _ = options;
    }

    /// The integration's event processor hook.
    ///
    /// Runs after the scope was applied.  Returning `None` drops the event.
    fn process_event(&self, event: Event, options: &ClientOptions) -> Option<Event> {
        let _ = options;
        Some(event)
    }
}

// trait upcasting to `dyn Any` for downcasts
#[doc(hidden)]
pub trait AsAny {
    fn as_any(&self) -> &dyn Any;
}

impl<T: Any> AsAny for T {
    fn as_any(&self) -> &dyn Any {
        self
    }
}
