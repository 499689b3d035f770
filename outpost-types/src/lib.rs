//! This crate provides the protocol types spoken by the outpost SDK.
//!
//! It contains the event, span, log, metric and check-in payloads, the
//! envelope container they travel in, and the [`Dsn`] / [`Auth`] types used
//! to address and authenticate against an ingestion endpoint.
//!
//! # Example
//!
//! ```
//! use outpost_types::Dsn;
//!
//! let dsn: Dsn = "https://public@example.com/42".parse().unwrap();
//! assert_eq!(
//!     dsn.envelope_api_url().as_str(),
//!     "https://example.com/api/42/envelope/"
//! );
//! ```

#![warn(missing_docs)]

mod auth;
mod dsn;
mod project_id;
pub mod protocol;
#[doc(hidden)]
pub mod utils;

pub use crate::auth::*;
pub use crate::dsn::*;
pub use crate::project_id::*;

pub use uuid::Uuid;

/// Generates a random v4 [`Uuid`].
pub fn random_uuid() -> Uuid {
    Uuid::new_v4()
}
