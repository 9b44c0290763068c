//! Newline-delimited JSON frame encoding.

use protocol::{ClientError, FrameStyle, Method, Payload, RequestId};
use serde_json::Value;

/// Encodes one request frame, including the trailing newline.
///
/// `id` is only written for [`FrameStyle::Tagged`].
pub fn encode_request(
    style: FrameStyle,
    id: RequestId,
    method: Method,
    args: &Value,
) -> Result<String, ClientError> {
    let frame = match style {
        FrameStyle::Tagged => Value::Array(vec![
            Value::String(id.to_string()),
            Value::String(method.as_str().to_string()),
            args.clone(),
        ]),
        FrameStyle::Bare => Value::Array(vec![
            Value::String(method.as_str().to_string()),
            args.clone(),
        ]),
    };
    let mut line = serde_json::to_string(&frame)
        .map_err(|e| ClientError::protocol(format!("Unable to encode request ({e})"), None))?;
    line.push('\n');
    Ok(line)
}

/// Decodes one reply line into its payload object.
///
/// `last_request` is attached to every error for diagnostics.
pub fn decode_reply(
    style: FrameStyle,
    line: &str,
    last_request: &str,
) -> Result<Payload, ClientError> {
    let trimmed = line.trim();
    let message: Value = serde_json::from_str(trimmed).map_err(|_| {
        ClientError::protocol(
            format!("Unable to parse response from server ({trimmed})"),
            Some(last_request.to_string()),
        )
    })?;

    let payload = match (style, message) {
        (FrameStyle::Tagged, Value::Array(mut parts)) if parts.len() >= 2 => {
            parts.swap_remove(1)
        }
        (FrameStyle::Bare, payload) => payload,
        (_, other) => {
            return Err(ClientError::protocol(
                format!("Invalid response from server ({other})"),
                Some(last_request.to_string()),
            ))
        }
    };

    match payload {
        Value::Object(map) => Ok(map),
        other => Err(ClientError::protocol(
            format!("Invalid response from server ({other})"),
            Some(last_request.to_string()),
        )),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn tagged_request_has_id_method_args() {
        let id = RequestId::new_random();
        let line =
            encode_request(FrameStyle::Tagged, id, Method::Get, &json!(["/users", {}])).unwrap();
        assert!(line.ends_with('\n'));
        let frame: Value = serde_json::from_str(line.trim_end()).unwrap();
        assert_eq!(frame, json!([id.to_string(), "get", ["/users", {}]]));
    }

    #[test]
    fn bare_request_omits_id() {
        let line = encode_request(
            FrameStyle::Bare,
            RequestId::new_random(),
            Method::Auth,
            &json!({"client": "c"}),
        )
        .unwrap();
        assert_eq!(line, "[\"auth\",{\"client\":\"c\"}]\n");
    }

    #[test]
    fn tagged_reply_yields_second_element() {
        let payload = decode_reply(FrameStyle::Tagged, "[\"abc\",{\"$data\":1}]\n", "req").unwrap();
        assert_eq!(payload.get("$data"), Some(&json!(1)));
    }

    #[test]
    fn bare_reply_is_the_payload() {
        let payload = decode_reply(FrameStyle::Bare, "{\"$data\":true}", "req").unwrap();
        assert_eq!(payload.get("$data"), Some(&json!(true)));
    }

    #[test]
    fn invalid_json_is_a_protocol_error_with_request() {
        let err = decode_reply(FrameStyle::Tagged, "not json", "[\"get\"]").unwrap_err();
        match err {
            ClientError::Protocol {
                message,
                last_request,
            } => {
                assert!(message.contains("Unable to parse"));
                assert_eq!(last_request.as_deref(), Some("[\"get\"]"));
            }
            other => panic!("unexpected {other:?}"),
        }
    }

    #[test]
    fn non_array_or_non_object_payload_is_rejected() {
        assert!(decode_reply(FrameStyle::Tagged, "{\"$data\":1}", "r").is_err());
        assert!(decode_reply(FrameStyle::Tagged, "[\"id\"]", "r").is_err());
        assert!(decode_reply(FrameStyle::Tagged, "[\"id\", 5]", "r").is_err());
        assert!(decode_reply(FrameStyle::Bare, "[1, 2]", "r").is_err());
    }
}
