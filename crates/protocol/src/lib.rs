//! Core domain for the Schema API client.
//!
//! This crate contains every protocol concept, newtype identifier, shared value
//! type, and cross-cutting error type used by the client workspace. Infrastructure
//! crates implement the traits defined here; they never add protocol rules.
//!
//! ## Architectural Layer
//!
//! **Protocol rules + port definitions.** This crate has no I/O dependencies.
//! It defines *what* a transport must do; the `transport` crate defines *how*
//! over TCP/TLS.
//!
//! ## Module Layout
//!
//! | Module | Contents |
//! |--------|----------|
//! | [`identifiers`] | Newtype identifiers (`ClientId`, `CollectionName`, `CacheKey`, etc.) |
//! | [`types`] | Shared value types (`Endpoint`, `VersionToken`, `IndexLimit`, etc.) |
//! | [`envelope`] | Reserved payload keys and the decoded [`Envelope`] variant |
//! | [`links`] | The read-only link-descriptor graph ([`LinkMap`]) |
//! | [`auth`] | Challenge/response key derivation |
//! | [`ports`] | [`Transport`] and [`Connector`] traits |
//! | [`errors`] | Error taxonomy and retry policy |

pub mod auth;
pub mod envelope;
pub mod errors;
pub mod identifiers;
pub mod links;
pub mod ports;
pub mod types;

// Re-export everything at the crate root for ergonomic usage by downstream crates.
pub use auth::{auth_key, key_hash};
pub use envelope::{keys, Envelope, Payload};
pub use errors::{CacheError, ClientError, RetryPolicy};
pub use identifiers::{CacheKey, ClientId, CollectionName, RequestId, SessionId};
pub use links::{Link, LinkMap};
pub use ports::{Connector, Transport};
pub use types::{Endpoint, FileMode, FrameStyle, IndexLimit, Method, VersionToken};
