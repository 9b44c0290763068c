//! Reserved payload keys and the decoded response envelope.
//!
//! Every reply payload is a JSON object. A handful of `$`-prefixed keys carry
//! protocol meaning instead of record data; [`Envelope::classify`] turns a raw
//! payload into the variant the orchestration layer matches on, so expected
//! protocol branches (an auth challenge, a session end) are values rather than
//! errors.

use std::collections::BTreeMap;

use serde_json::{Map, Value};

use crate::{CollectionName, VersionToken};

/// A decoded JSON object payload.
pub type Payload = Map<String, Value>;

/// Reserved payload keys.
pub mod keys {
    pub const DATA: &str = "$data";
    pub const COLLECTION: &str = "$collection";
    pub const EXPANDED: &str = "$expanded";
    pub const CACHED: &str = "$cached";
    pub const ERROR: &str = "$error";
    pub const END: &str = "$end";
    pub const AUTH: &str = "$auth";
    pub const URL: &str = "$url";
    pub const LINKS: &str = "$links";
    pub const VERSION: &str = "$v";
    pub const API: &str = "$api";
    pub const SESSION: &str = "$session";
    pub const ROUTE: &str = "$route";
    pub const IP: &str = "$ip";
    pub const CLIENT: &str = "$client";
    pub const KEY: &str = "$key";
    pub const PROXY: &str = "$proxy";
}

/// One reply, classified by its reserved keys.
#[derive(Debug, Clone, PartialEq)]
pub enum Envelope {
    /// Ordinary data reply. May carry `$collection`, `$expanded` and `$cached`.
    Data(Payload),
    /// The server wants the credential handshake before honouring the request.
    AuthChallenge {
        /// Challenge nonce; `None` when the server signalled a challenge
        /// without supplying one.
        nonce: Option<String>,
        /// The challenge arrived together with `$end`: the connection is gone
        /// and the pending request must be replayed from scratch.
        session_ended: bool,
    },
    /// Application-level error message.
    Error(String),
    /// The server terminated the session.
    End(Payload),
}

impl Envelope {
    /// Classifies a raw reply payload.
    ///
    /// `$error` wins over everything else; `$auth` wins over `$end`.
    pub fn classify(payload: Payload) -> Envelope {
        if let Some(error) = payload.get(keys::ERROR) {
            if !error.is_null() {
                return Envelope::Error(value_as_text(error));
            }
        }
        let ended = payload.get(keys::END).is_some_and(|v| !v.is_null());
        if let Some(auth) = payload.get(keys::AUTH) {
            if !auth.is_null() {
                let nonce = match auth {
                    Value::String(s) if !s.is_empty() => Some(s.clone()),
                    Value::Number(n) => Some(n.to_string()),
                    _ => None,
                };
                return Envelope::AuthChallenge {
                    nonce,
                    session_ended: ended,
                };
            }
        }
        if ended {
            return Envelope::End(payload);
        }
        Envelope::Data(payload)
    }

    /// Returns `true` when this reply closed the session.
    pub fn ends_session(&self) -> bool {
        matches!(
            self,
            Envelope::End(_)
                | Envelope::AuthChallenge {
                    session_ended: true,
                    ..
                }
        )
    }
}

/// Collections a result is scoped to: the primary `$collection` followed by
/// every `$expanded` collection.
pub fn collections(payload: &Payload) -> Vec<CollectionName> {
    let mut out = Vec::new();
    if let Some(primary) = payload.get(keys::COLLECTION).and_then(Value::as_str) {
        out.extend(CollectionName::new(primary));
    }
    if let Some(Value::Array(expanded)) = payload.get(keys::EXPANDED) {
        out.extend(
            expanded
                .iter()
                .filter_map(Value::as_str)
                .filter_map(CollectionName::new),
        );
    }
    out
}

/// Version hints carried in `$cached`. Empty when the key is absent or is the
/// served-from-cache marker (`true`).
pub fn version_hints(payload: &Payload) -> BTreeMap<CollectionName, VersionToken> {
    match payload.get(keys::CACHED) {
        Some(Value::Object(hints)) => hints
            .iter()
            .filter_map(|(name, version)| {
                CollectionName::new(name.as_str()).map(|n| (n, VersionToken::new(version.clone())))
            })
            .collect(),
        _ => BTreeMap::new(),
    }
}

fn value_as_text(value: &Value) -> String {
    match value {
        Value::String(s) => s.clone(),
        other => other.to_string(),
    }
}
