//! The payloads exchanged with the ingestion endpoint.
//!
//! Everything the SDK emits ends up as one of the [`EnvelopeItem`] variants:
//! error events, transactions, check-ins, log batches and metric batches.

mod envelope;
mod event;
mod logs;
mod monitor;
mod trace;

pub use self::envelope::*;
pub use self::event::*;
pub use self::logs::*;
pub use self::monitor::*;
pub use self::trace::*;

/// An arbitrary (JSON) value.
pub use serde_json::Value;

/// The sorted map type used throughout the protocol.
pub type Map<K, V> = std::collections::BTreeMap<K, V>;
