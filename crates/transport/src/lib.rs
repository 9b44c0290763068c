//! Schema client transport adapter.
//!
//! Implements [`protocol::Transport`] and [`protocol::Connector`] over a TCP
//! stream, wrapped in TLS unless the endpoint opts into clear mode.
//!
//! ## Architectural Layer
//!
//! **Infrastructure.** Socket handling, certificate verification and frame
//! encoding live here. The `client` crate sees only the port traits.
//!
//! ## Framing
//!
//! Each message is one JSON array terminated by `\n`. Requests are
//! `[id, method, args]` or `[method, args]` depending on the configured
//! [`protocol::FrameStyle`]; replies are `[id, payload]` or a bare `payload`.
//! The protocol is strictly half-duplex.
//!
//! ## Blocking behaviour
//!
//! Writes loop until the whole frame is sent. Reads block until a full line
//! arrives **with no timeout**: an unresponsive peer blocks the caller
//! indefinitely. This is the documented contract of the protocol client, not
//! an oversight; only connection establishment is bounded
//! (see [`CONNECT_TIMEOUT`]).

mod codec;
mod config;
mod connection;
mod tls;

pub use codec::{decode_reply, encode_request};
pub use config::TransportConfig;
pub use connection::{Connection, TcpConnector, CONNECT_TIMEOUT};
pub use tls::client_config;
