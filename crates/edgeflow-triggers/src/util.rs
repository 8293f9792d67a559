use edgeflow_domain::{CONTENT_TYPE_CBOR, CONTENT_TYPE_JSON};

/// Content type for an outbound response payload: the explicit value
/// when a function set one, otherwise JSON when the payload looks like a
/// JSON object and CBOR for anything else.
pub fn infer_response_content_type(payload: &[u8], explicit: Option<&str>) -> String {
    if let Some(content_type) = explicit {
        return content_type.to_string();
    }
    if payload.first() == Some(&b'{') {
        CONTENT_TYPE_JSON.to_string()
    } else {
        CONTENT_TYPE_CBOR.to_string()
    }
}

/// Content type for an inbound payload on transports without headers.
pub fn infer_inbound_content_type(payload: &[u8]) -> &'static str {
    if payload.first() == Some(&b'{') {
        CONTENT_TYPE_JSON
    } else {
        CONTENT_TYPE_CBOR
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn explicit_response_content_type_wins() {
        assert_eq!(
            infer_response_content_type(b"{}", Some("text/plain")),
            "text/plain"
        );
    }

    #[test]
    fn json_object_payload_is_json() {
        assert_eq!(infer_response_content_type(b"{\"a\":1}", None), CONTENT_TYPE_JSON);
    }

    #[test]
    fn non_json_payload_is_cbor() {
        // 0xA1 is a one-entry CBOR map.
        assert_eq!(infer_response_content_type(&[0xA1, 0x01, 0x02], None), CONTENT_TYPE_CBOR);
        assert_eq!(infer_response_content_type(&[], None), CONTENT_TYPE_CBOR);
    }

    #[test]
    fn inbound_inference_matches_response_inference() {
        assert_eq!(infer_inbound_content_type(b"{\"a\":1}"), CONTENT_TYPE_JSON);
        assert_eq!(infer_inbound_content_type(&[0xA1]), CONTENT_TYPE_CBOR);
    }
}
