//! Schema API client.
//!
//! ## Architectural Layer
//!
//! **Orchestration layer.** [`Client`] sequences the cache, the transport and
//! the credential handshake; the resource types wrap replies and resolve
//! hypermedia links on demand through the client that produced them.
//!
//! | Module | Purpose |
//! |--------|---------|
//! | [`config`] | [`ClientConfig`] and its endpoint/route/proxy sections |
//! | `client` | request/response cycle, auth, rescue failover |
//! | `resource` | [`Node`] and [`Resource`] |
//! | `record` | [`Record`]: field access, link resolution, dumps |
//! | `collection` | [`Collection`]: paginated results |
//!
//! ## Example
//!
//! ```no_run
//! use client::{Client, ClientConfig};
//! use serde_json::Value;
//!
//! let client = Client::new(ClientConfig::new("my-store", "secret-key"))?;
//! let user = client.get("/users/1", Value::Null)?;
//! if let Some(user) = user.as_record() {
//!     let account = user.get("account")?;
//!     println!("{}", account.dump(1));
//! }
//! # Ok::<(), client::ClientError>(())
//! ```

mod client;
mod collection;
pub mod config;
mod record;
mod resource;

pub use client::Client;
pub use collection::Collection;
pub use config::{ClientConfig, ProxyConfig, RescueConfig, RouteConfig};
pub use record::{Record, LINK_CACHE_LIMIT};
pub use resource::{Node, Resource};

pub use cache::CacheConfig;
pub use protocol::{ClientError, Method, Payload};
