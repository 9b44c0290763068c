//! Shared value types for the Schema client.
//!
//! Unlike the newtype identifiers in [`crate::identifiers`], these types carry
//! meaningful values with invariants (e.g. an index limit is never zero, a
//! version token is compared structurally) and participate in protocol decisions.

use serde::{Deserialize, Serialize};
use serde_json::Value;

// ---------------------------------------------------------------------------
// Endpoint
// ---------------------------------------------------------------------------

/// A server address plus the stream security to use for it.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Endpoint {
    /// Host name or address.
    pub host: String,
    /// TCP port.
    pub port: u16,
    /// `true` opts into plaintext TCP; the default is TLS.
    #[serde(default)]
    pub clear: bool,
}

impl Endpoint {
    /// Creates a TLS endpoint.
    pub fn new(host: impl Into<String>, port: u16) -> Self {
        Self {
            host: host.into(),
            port,
            clear: false,
        }
    }

    /// Returns this endpoint switched to plaintext TCP.
    #[must_use]
    pub fn clear(mut self) -> Self {
        self.clear = true;
        self
    }
}

impl std::fmt::Display for Endpoint {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}:{}", self.host, self.port)
    }
}

// ---------------------------------------------------------------------------
// Request method and framing
// ---------------------------------------------------------------------------

/// Protocol methods understood by the server.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Method {
    Get,
    Put,
    Post,
    Delete,
    Auth,
}

impl Method {
    /// The method name as written into a request frame.
    pub fn as_str(self) -> &'static str {
        match self {
            Method::Get => "get",
            Method::Put => "put",
            Method::Post => "post",
            Method::Delete => "delete",
            Method::Auth => "auth",
        }
    }

    /// Only reads are memoized by the response cache.
    pub fn is_read(self) -> bool {
        self == Method::Get
    }
}

impl std::fmt::Display for Method {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Frame layout for one protocol revision. Chosen by configuration, never
/// negotiated.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum FrameStyle {
    /// Requests are `[id, method, args]`; replies are `[id, payload]`.
    #[default]
    Tagged,
    /// Requests are `[method, args]`; replies are a bare `payload`.
    Bare,
}

// ---------------------------------------------------------------------------
// Cache value types
// ---------------------------------------------------------------------------

/// Opaque server-supplied token describing a collection's current state.
///
/// Tokens are compared structurally; the server may use strings or numbers.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct VersionToken(Value);

impl VersionToken {
    /// Wraps a raw JSON token.
    pub fn new(value: Value) -> Self {
        Self(value)
    }

    /// Returns `true` when the token carries a usable value.
    ///
    /// `null`, `false`, `0` and the empty string mean "no version" and are
    /// never recorded.
    pub fn is_set(&self) -> bool {
        match &self.0 {
            Value::Null => false,
            Value::Bool(b) => *b,
            Value::Number(n) => n.as_f64().is_some_and(|f| f != 0.0),
            Value::String(s) => !s.is_empty() && s != "0",
            Value::Array(a) => !a.is_empty(),
            Value::Object(o) => !o.is_empty(),
        }
    }

    /// Returns the raw JSON token.
    pub fn as_value(&self) -> &Value {
        &self.0
    }
}

impl From<&str> for VersionToken {
    fn from(value: &str) -> Self {
        Self(Value::String(value.to_string()))
    }
}

/// Maximum number of index entries held per collection.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(try_from = "usize")]
pub struct IndexLimit(usize);

impl IndexLimit {
    /// Default per-collection limit.
    pub const DEFAULT: IndexLimit = IndexLimit(1000);

    /// Creates a limit, returning `None` for zero.
    #[must_use]
    pub fn new(limit: usize) -> Option<Self> {
        (limit > 0).then_some(Self(limit))
    }

    /// Returns the underlying count.
    pub fn get(self) -> usize {
        self.0
    }
}

impl Default for IndexLimit {
    fn default() -> Self {
        Self::DEFAULT
    }
}

impl TryFrom<usize> for IndexLimit {
    type Error = String;

    fn try_from(value: usize) -> Result<Self, Self::Error> {
        Self::new(value).ok_or_else(|| "index_limit must be greater than zero".to_string())
    }
}

/// Unix permission bits applied to every cache file after it is renamed
/// into place.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct FileMode(u32);

impl FileMode {
    /// `0o644`: owner read/write, everyone else read.
    pub const DEFAULT: FileMode = FileMode(0o644);

    /// Creates a mode from raw permission bits.
    pub fn new(mode: u32) -> Self {
        Self(mode & 0o7777)
    }

    /// Returns the permission bits.
    pub fn bits(self) -> u32 {
        self.0
    }
}

impl Default for FileMode {
    fn default() -> Self {
        Self::DEFAULT
    }
}

impl std::fmt::Display for FileMode {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{:o}", self.0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn version_token_truthiness() {
        assert!(VersionToken::from("v1").is_set());
        assert!(VersionToken::new(json!(3)).is_set());
        assert!(!VersionToken::new(json!(null)).is_set());
        assert!(!VersionToken::new(json!(0)).is_set());
        assert!(!VersionToken::from("").is_set());
        assert!(!VersionToken::new(json!(false)).is_set());
    }

    #[test]
    fn version_tokens_compare_structurally() {
        assert_eq!(VersionToken::from("v1"), VersionToken::new(json!("v1")));
        assert_ne!(VersionToken::from("1"), VersionToken::new(json!(1)));
    }

    #[test]
    fn index_limit_rejects_zero() {
        assert!(IndexLimit::new(0).is_none());
        assert_eq!(IndexLimit::new(2).unwrap().get(), 2);
        assert!(serde_json::from_value::<IndexLimit>(json!(0)).is_err());
    }

    #[test]
    fn method_names_match_the_wire() {
        assert_eq!(Method::Delete.as_str(), "delete");
        assert_eq!(serde_json::to_value(Method::Get).unwrap(), json!("get"));
        assert!(Method::Get.is_read());
        assert!(!Method::Post.is_read());
    }

    #[test]
    fn endpoint_displays_host_and_port() {
        let endpoint = Endpoint::new("api.schema.io", 8443);
        assert_eq!(endpoint.to_string(), "api.schema.io:8443");
        assert!(!endpoint.clear);
        assert!(endpoint.clear().clear);
    }

    #[test]
    fn file_mode_masks_non_permission_bits() {
        assert_eq!(FileMode::new(0o100644).bits(), 0o644);
        assert_eq!(FileMode::default().to_string(), "644");
    }
}
