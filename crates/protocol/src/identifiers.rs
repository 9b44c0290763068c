//! Newtype identifiers.
//!
//! Every protocol concept that has an identity is represented as a distinct newtype
//! wrapping a primitive. This prevents accidentally interchanging, for example,
//! a [`ClientId`] with a [`CollectionName`] even though both are strings under
//! the hood.

use serde::{Deserialize, Serialize};
use uuid::Uuid;

// ---------------------------------------------------------------------------
// Macro for String-wrapped newtypes.
// Generates: struct, new() returning Option<Self>, as_str(), Display.
// ---------------------------------------------------------------------------
macro_rules! string_id {
    (
        $(#[$attr:meta])*
        $name:ident
    ) => {
        $(#[$attr])*
        #[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
        #[serde(transparent)]
        pub struct $name(String);

        impl $name {
            /// Creates a new identifier, returning `None` if the value is empty.
            pub fn new(value: impl Into<String>) -> Option<Self> {
                let v = value.into();
                if v.is_empty() { None } else { Some(Self(v)) }
            }

            /// Returns the identifier as a string slice.
            pub fn as_str(&self) -> &str {
                &self.0
            }
        }

        impl std::fmt::Display for $name {
            fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
                write!(f, "{}", self.0)
            }
        }

        impl std::borrow::Borrow<str> for $name {
            fn borrow(&self) -> &str {
                &self.0
            }
        }
    };
}

// ---------------------------------------------------------------------------
// Identifiers: String-backed
// ---------------------------------------------------------------------------

string_id! {
    /// Identifies an API client account. Sent as `$client` and used to name
    /// the cache files belonging to this client.
    ClientId
}

string_id! {
    /// Opaque session identifier forwarded to the server as `$session`.
    ///
    /// Sourcing it (web session, CLI-generated UUID) is the caller's concern.
    SessionId
}

string_id! {
    /// Names a server-side collection whose cache validity is tracked by one
    /// version token (e.g. `"users"`, `"admin.settings"`).
    CollectionName
}

impl CollectionName {
    /// Returns `true` for collections caught by the `admin.settings` cascade.
    pub fn is_settings(&self) -> bool {
        self.0.ends_with(".settings")
    }
}

string_id! {
    /// Fingerprint of a request (`url`, `data`), lowercase hex.
    ///
    /// Produced by the cache; doubles as the entry file name component.
    CacheKey
}

impl CacheKey {
    /// Creates a key from raw digest bytes.
    pub fn from_digest(bytes: &[u8]) -> Self {
        Self(hex::encode(bytes))
    }
}

// ---------------------------------------------------------------------------
// Identifiers: UUID-backed (internally generated)
// ---------------------------------------------------------------------------

/// Identifies a single request frame on a connection.
///
/// Generated fresh for every tagged frame. The server echoes it back, although
/// replies are matched positionally since the protocol is half-duplex.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct RequestId(Uuid);

impl RequestId {
    /// Generates a new random request identifier.
    pub fn new_random() -> Self {
        Self(Uuid::new_v4())
    }

    /// Creates a [`RequestId`] from an existing UUID.
    pub fn from_uuid(id: Uuid) -> Self {
        Self(id)
    }

    /// Returns the underlying [`Uuid`].
    pub fn as_uuid(self) -> Uuid {
        self.0
    }
}

impl std::fmt::Display for RequestId {
    /// Renders as 32 lowercase hex characters, the form used on the wire.
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0.simple())
    }
}
