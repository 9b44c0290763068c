//! Port traits implemented by infrastructure crates.
//!
//! The orchestration layer only sees [`Transport`] and [`Connector`]; the
//! `transport` crate supplies the TCP/TLS implementation and tests supply
//! scripted ones.

use serde_json::Value;

use crate::{ClientError, Endpoint, Envelope, Method};

/// One half-duplex connection to a server.
///
/// At most one request is in flight at a time; a second call before the first
/// returns is not supported.
pub trait Transport {
    /// Opens the underlying stream.
    ///
    /// # Errors
    ///
    /// [`ClientError::Network`] on socket failure or certificate rejection.
    fn connect(&mut self) -> Result<(), ClientError>;

    /// Returns `true` while the stream is open.
    fn is_connected(&self) -> bool;

    /// Writes one request frame and reads exactly one reply frame.
    ///
    /// Never returns [`Envelope::Error`]: a reply carrying `$error` becomes
    /// [`ClientError::Server`]. A reply that ends the session closes the
    /// transport before it is returned.
    ///
    /// # Errors
    ///
    /// - [`ClientError::Network`] when the stream is closed or writing fails.
    /// - [`ClientError::Protocol`] when the reply cannot be read or decoded.
    /// - [`ClientError::Server`] when the reply carries `$error`.
    fn request(&mut self, method: Method, args: Value) -> Result<Envelope, ClientError>;

    /// Releases the stream. Safe to call repeatedly.
    fn close(&mut self);

    /// The endpoint this transport talks to.
    fn endpoint(&self) -> &Endpoint;

    /// Number of frames written so far.
    fn request_count(&self) -> u64;
}

/// Creates unconnected transports for an endpoint.
///
/// A transport is created per logical server (primary, proxy or rescue) and
/// discarded once closed.
pub trait Connector {
    /// Returns a new, not yet connected transport for `endpoint`.
    fn open(&self, endpoint: &Endpoint) -> Box<dyn Transport>;
}
