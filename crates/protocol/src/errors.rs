//! Error taxonomy and retry policy for the Schema client.
//!
//! [`ClientError`] covers every failure a request/response cycle can surface.
//! [`CacheError`] covers local persistence failures and is wrapped by
//! [`ClientError::Cache`] when it aborts a cycle.
//!
//! [`RetryPolicy`] is the cross-cutting concern: the orchestration layer asks
//! an error for its policy instead of matching on variants itself.

use std::path::PathBuf;

use thiserror::Error;

// ---------------------------------------------------------------------------
// Retry semantics
// ---------------------------------------------------------------------------

/// What the orchestration layer may do after an error.
///
/// ## Rules
///
/// - Socket-level failures (`Network`) fail over to the rescue endpoint once.
/// - Everything else (`Protocol`, `Server`, `Cache`, ...) propagates verbatim.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RetryPolicy {
    /// Open a connection to the rescue endpoint and replay the request once.
    Failover,
    /// The error must reach the caller unchanged.
    NonRetryable,
}

// ---------------------------------------------------------------------------
// Client errors
// ---------------------------------------------------------------------------

/// Errors surfaced by a request/response cycle.
#[derive(Debug, Error)]
pub enum ClientError {
    /// Connection establishment, write or read failed at the socket level,
    /// or the peer certificate was rejected.
    #[error("Network error: {message}{}", code.map(|c| format!(" (code {c})")).unwrap_or_default())]
    Network {
        /// Low-level OS error code, when one is known.
        code: Option<i32>,
        /// Human-readable description including the endpoint.
        message: String,
    },

    /// The reply frame could not be read or decoded.
    #[error("Protocol error: {message}{}", last_request.as_ref().map(|r| format!(" (request: {r})")).unwrap_or_default())]
    Protocol {
        /// What was wrong with the frame.
        message: String,
        /// The last frame written on the connection, for diagnostics.
        last_request: Option<String>,
    },

    /// A well-formed reply carried `$error`.
    #[error("Server error: {message}")]
    Server {
        /// The server's message, verbatim.
        message: String,
    },

    /// Local cache persistence failed. Fatal to the cycle it was attached to.
    #[error(transparent)]
    Cache(#[from] CacheError),

    /// The server ended the session without answering the request, either
    /// with a bare `$end` or with a second challenge-and-end after the request
    /// was replayed on a fresh connection.
    #[error("Session ended by server while executing '{method}'")]
    SessionEnded {
        /// Method of the abandoned request.
        method: String,
    },

    /// The client configuration is invalid.
    ///
    /// Produced at construction time; a client never starts with an invalid config.
    #[error("Configuration error: {message}")]
    Configuration {
        /// Description of the configuration problem.
        message: String,
    },
}

impl ClientError {
    /// Builds a [`ClientError::Network`] from an I/O error, keeping its OS code.
    pub fn network(context: impl std::fmt::Display, source: &std::io::Error) -> Self {
        ClientError::Network {
            code: source.raw_os_error(),
            message: format!("{context} ({source})"),
        }
    }

    /// Builds a [`ClientError::Protocol`].
    pub fn protocol(message: impl Into<String>, last_request: Option<String>) -> Self {
        ClientError::Protocol {
            message: message.into(),
            last_request,
        }
    }

    /// How the orchestration layer should react to this error.
    pub fn retry_policy(&self) -> RetryPolicy {
        match self {
            ClientError::Network { .. } => RetryPolicy::Failover,
            _ => RetryPolicy::NonRetryable,
        }
    }
}

// ---------------------------------------------------------------------------
// Cache errors
// ---------------------------------------------------------------------------

/// Local cache persistence failures.
///
/// Reads never produce these: a missing or corrupt file is a cache miss.
#[derive(Debug, Error)]
pub enum CacheError {
    /// No temporary file could be created in any candidate location.
    #[error("Unable to write temporary file in {}: {source}", dir.display())]
    Write {
        dir: PathBuf,
        #[source]
        source: std::io::Error,
    },

    /// The temporary file could not be moved over its target.
    #[error("Unable to replace cache file {}: {source}", path.display())]
    Rename {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    /// Permissions could not be applied after the rename.
    #[error("Unable to set permissions on {}: {source}", path.display())]
    Permissions {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    /// The value could not be encoded as JSON.
    #[error("Unable to encode cache content: {0}")]
    Encode(#[from] serde_json::Error),
}
