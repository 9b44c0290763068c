//! Challenge/response key derivation.
//!
//! The server issues a nonce; the client proves knowledge of its key without
//! sending it:
//!
//! ```text
//! key_hash = md5(client_id + "::" + client_key)
//! auth_key = md5(nonce + client_id + key_hash)
//! ```
//!
//! MD5 is fixed by the server side of the protocol and is not a local choice.

use md5::{Digest, Md5};

fn md5_hex(parts: &[&str]) -> String {
    let mut hasher = Md5::new();
    for part in parts {
        hasher.update(part.as_bytes());
    }
    hex::encode(hasher.finalize())
}

/// Hash of the client's credentials, lowercase hex.
pub fn key_hash(client_id: &str, client_key: &str) -> String {
    md5_hex(&[client_id, "::", client_key])
}

/// Response to a challenge nonce, lowercase hex.
pub fn auth_key(nonce: &str, client_id: &str, client_key: &str) -> String {
    let key_hash = key_hash(client_id, client_key);
    md5_hex(&[nonce, client_id, &key_hash])
}
