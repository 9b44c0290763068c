use protocol::CacheKey;
use serde_json::Value;
use sha2::{Digest, Sha256};

/// Computes the cache key for a request.
///
/// The url is trimmed of surrounding `/` so `"/users/"` and `"users"` share a
/// key. `serde_json` maps are key-sorted, so the encoding of `data` (and with
/// it the key) is deterministic.
pub fn fingerprint(url: &str, data: &Value) -> CacheKey {
    let canonical = Value::Array(vec![
        Value::String(url.trim_matches('/').to_string()),
        data.clone(),
    ])
    .to_string();
    let mut hasher = Sha256::new();
    hasher.update(canonical.as_bytes());
    CacheKey::from_digest(&hasher.finalize())
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;
    use serde_json::json;

    #[test]
    fn fingerprint_deterministic() {
        let data = json!({"$data": {"limit": 10, "page": 2}});
        assert_eq!(fingerprint("/users", &data), fingerprint("/users", &data));
    }

    #[test]
    fn fingerprint_ignores_key_order() {
        let a: Value = serde_json::from_str(r#"{"b": 1, "a": 2}"#).unwrap();
        let b: Value = serde_json::from_str(r#"{"a": 2, "b": 1}"#).unwrap();
        assert_eq!(fingerprint("users", &a), fingerprint("users", &b));
    }

    #[test]
    fn fingerprint_changes_with_data() {
        assert_ne!(
            fingerprint("users", &json!({"$data": {"page": 1}})),
            fingerprint("users", &json!({"$data": {"page": 2}}))
        );
    }

    #[test]
    fn fingerprint_is_hex_sha256() {
        let key = fingerprint("users", &Value::Null);
        assert_eq!(key.as_str().len(), 64);
    }

    proptest! {
        #[test]
        fn surrounding_slashes_do_not_change_key(
            path in "[a-z0-9]{1,8}(/[a-z0-9]{1,8}){0,3}",
            lead in 0usize..3,
            trail in 0usize..3,
            page in any::<u32>(),
        ) {
            let data = json!({"$data": {"page": page}});
            let padded = format!("{}{}{}", "/".repeat(lead), path, "/".repeat(trail));
            prop_assert_eq!(fingerprint(&padded, &data), fingerprint(&path, &data));
        }

        #[test]
        fn different_urls_give_different_keys(a in "[a-z]{1,12}", b in "[a-z]{1,12}") {
            prop_assume!(a != b);
            prop_assert_ne!(fingerprint(&a, &Value::Null), fingerprint(&b, &Value::Null));
        }
    }
}
