//! Schema client response cache.
//!
//! Durable, versioned, bounded memoization of read responses:
//!
//! - Entry key: SHA-256 of (url trimmed of `/`, request data).
//! - Entry value: the full result payload, stored with `$cached: true`.
//! - Each entry is indexed under the collections its result declares; a
//!   per-collection version table decides when entries go stale.
//!
//! ## Files
//!
//! Per client identity, under the configured directory:
//!
//! | File | Contents |
//! |------|----------|
//! | `client.<id>.<key>.result` | one cached result |
//! | `client.<id>.index` | collection → key → byte size |
//! | `client.<id>.versions` | collection → version token |
//!
//! Every write replaces its target atomically (temp file + rename). Cache
//! directories are assumed to belong to one process: concurrent writers race
//! on the shared index and version files and the last writer wins.

mod cache;
mod fingerprint;
mod store;

pub use cache::{Cache, CacheConfig, CacheIndex, VersionTable};
pub use fingerprint::fingerprint;
