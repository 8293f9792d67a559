use serde::de::DeserializeOwned;
use serde::Deserialize;

use crate::envelope::{MessageEnvelope, CONTENT_TYPE_BINARY, CONTENT_TYPE_CBOR, CONTENT_TYPE_JSON};
use crate::error::DecodeError;
use crate::event::{normalize_event, AddEventRequest, Event, LegacyEvent, CURRENT_API_VERSION};
use crate::value::PipelineValue;

/// Shape the decoder materializes the payload into.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum TargetType {
    /// Canonical event decode: current schema first, legacy fallback.
    #[default]
    Event,
    /// Byte bypass: the payload is handed to the first function as-is.
    Raw,
    /// Caller-defined shape decoded as dynamic JSON by the content-type codec.
    Json,
}

/// Discriminator probe used when the current-schema wrapper fails to
/// decode but still advertises the current version.
#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase", default)]
struct VersionProbe {
    api_version: String,
}

/// Turn a transport envelope into the first pipeline value.
pub fn decode(envelope: &MessageEnvelope, target: TargetType) -> Result<PipelineValue, DecodeError> {
    let content_type = normalize_content_type(&envelope.content_type);

    match target {
        TargetType::Raw => Ok(PipelineValue::Bytes(envelope.payload.clone())),
        TargetType::Json => {
            if content_type == CONTENT_TYPE_BINARY {
                return Err(DecodeError::UnsupportedContentType(content_type.to_string()));
            }
            decode_as::<serde_json::Value>(content_type, &envelope.payload).map(PipelineValue::Json)
        }
        TargetType::Event => {
            if content_type == CONTENT_TYPE_BINARY {
                return Err(DecodeError::UnsupportedContentType(content_type.to_string()));
            }
            decode_event(content_type, &envelope.payload).map(PipelineValue::Event)
        }
    }
}

/// Strip content-type parameters such as `; charset=utf-8`.
fn normalize_content_type(content_type: &str) -> &str {
    content_type.split(';').next().unwrap_or("").trim()
}

fn decode_as<T: DeserializeOwned>(content_type: &str, payload: &[u8]) -> Result<T, DecodeError> {
    match content_type {
        CONTENT_TYPE_JSON => {
            serde_json::from_slice(payload).map_err(|err| DecodeError::Malformed(err.to_string()))
        }
        CONTENT_TYPE_CBOR => {
            ciborium::from_reader(payload).map_err(|err| DecodeError::Malformed(err.to_string()))
        }
        other => Err(DecodeError::UnsupportedContentType(other.to_string())),
    }
}

fn decode_event(content_type: &str, payload: &[u8]) -> Result<Event, DecodeError> {
    match decode_as::<AddEventRequest>(content_type, payload) {
        Ok(request) => Ok(normalize_event(request.event)),
        Err(wrapper_err @ DecodeError::UnsupportedContentType(_)) => Err(wrapper_err),
        Err(wrapper_err) => {
            // A payload that advertises the current version but failed the
            // wrapper decode is malformed; only unversioned payloads fall
            // back to the legacy schema.
            if let Ok(probe) = decode_as::<VersionProbe>(content_type, payload) {
                if probe.api_version == CURRENT_API_VERSION {
                    return Err(wrapper_err);
                }
            }

            match decode_as::<LegacyEvent>(content_type, payload) {
                Ok(legacy) if !legacy.is_vacant() => Ok(legacy.into_event()),
                _ => Err(wrapper_err),
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::envelope::MessageEnvelope;
    use crate::event::{LegacyReading, Reading, ReadingValue, UNKNOWN};

    fn sample_event() -> Event {
        Event {
            id: "82eb2e26-0f24-48aa-ae4c-de9dac3fb9bc".to_string(),
            device_name: "FamilyRoomThermostat".to_string(),
            profile_name: "Thermostat".to_string(),
            source_name: "Temperature".to_string(),
            origin: 1_600_000_000,
            created: 1_600_000_000,
            readings: vec![Reading {
                id: "82eb2e26-0f24-48aa-ae4c-de9dac3f1234".to_string(),
                device_name: "FamilyRoomThermostat".to_string(),
                resource_name: "Temperature".to_string(),
                profile_name: "Thermostat".to_string(),
                value_type: "Int64".to_string(),
                value: ReadingValue::simple("72"),
            }],
            tags: Default::default(),
        }
    }

    fn json_envelope(payload: Vec<u8>) -> MessageEnvelope {
        MessageEnvelope::new("123-234-345-456", CONTENT_TYPE_JSON, payload)
    }

    #[test]
    fn decodes_current_schema_json() {
        let event = sample_event();
        let payload = serde_json::to_vec(&AddEventRequest::new(event.clone())).unwrap();

        let decoded = decode(&json_envelope(payload), TargetType::Event).unwrap();
        assert_eq!(decoded, PipelineValue::Event(event));
    }

    #[test]
    fn decodes_current_schema_cbor() {
        let event = sample_event();
        let mut payload = Vec::new();
        ciborium::into_writer(&AddEventRequest::new(event.clone()), &mut payload).unwrap();
        let envelope = MessageEnvelope::new("123-234-345-456", CONTENT_TYPE_CBOR, payload);

        let decoded = decode(&envelope, TargetType::Event).unwrap();
        assert_eq!(decoded, PipelineValue::Event(event));
    }

    #[test]
    fn decodes_legacy_schema_with_unknown_defaults() {
        let legacy = LegacyEvent {
            id: "e1".to_string(),
            device: "FamilyRoomThermostat".to_string(),
            created: 10,
            origin: 20,
            readings: vec![LegacyReading {
                id: "r1".to_string(),
                device: "FamilyRoomThermostat".to_string(),
                name: "Temperature".to_string(),
                value_type: "Int64".to_string(),
                value: "72".to_string(),
                ..Default::default()
            }],
            tags: Default::default(),
        };
        let payload = serde_json::to_vec(&legacy).unwrap();

        let decoded = decode(&json_envelope(payload), TargetType::Event).unwrap();
        let event = decoded.into_event().unwrap();
        assert_eq!(event.profile_name, UNKNOWN);
        assert_eq!(event.readings[0].profile_name, UNKNOWN);
        assert_eq!(event.readings[0].resource_name, "Temperature");
    }

    #[test]
    fn decodes_legacy_schema_cbor() {
        let legacy = LegacyEvent {
            id: "e1".to_string(),
            device: "FamilyRoomThermostat".to_string(),
            readings: vec![LegacyReading {
                name: "Temperature".to_string(),
                value: "72".to_string(),
                ..Default::default()
            }],
            ..Default::default()
        };
        let mut payload = Vec::new();
        ciborium::into_writer(&legacy, &mut payload).unwrap();
        let envelope = MessageEnvelope::new("123-234-345-456", CONTENT_TYPE_CBOR, payload);

        let event = decode(&envelope, TargetType::Event).unwrap().into_event().unwrap();
        assert_eq!(event.device_name, "FamilyRoomThermostat");
        assert_eq!(event.profile_name, UNKNOWN);
    }

    #[test]
    fn rejects_payload_matching_no_schema() {
        let err = decode(&json_envelope(br#"{"host":"nope"}"#.to_vec()), TargetType::Event)
            .unwrap_err();
        assert!(matches!(err, DecodeError::Malformed(_)));
    }

    #[test]
    fn rejects_current_version_payload_without_event() {
        let err = decode(
            &json_envelope(br#"{"apiVersion":"v2","requestId":"1"}"#.to_vec()),
            TargetType::Event,
        )
        .unwrap_err();
        assert!(matches!(err, DecodeError::Malformed(_)));
    }

    #[test]
    fn rejects_unsupported_content_type() {
        let envelope = MessageEnvelope::new("id", "text/plain", b"hello".to_vec());
        let err = decode(&envelope, TargetType::Event).unwrap_err();
        assert!(matches!(err, DecodeError::UnsupportedContentType(_)));
    }

    #[test]
    fn rejects_binary_content_for_event_target() {
        let envelope = MessageEnvelope::new("id", CONTENT_TYPE_BINARY, vec![1, 2, 3]);
        let err = decode(&envelope, TargetType::Event).unwrap_err();
        assert!(matches!(err, DecodeError::UnsupportedContentType(_)));
    }

    #[test]
    fn raw_target_passes_payload_through() {
        let envelope = MessageEnvelope::new("id", CONTENT_TYPE_BINARY, b"This is my bytes".to_vec());
        let decoded = decode(&envelope, TargetType::Raw).unwrap();
        assert_eq!(decoded, PipelineValue::Bytes(b"This is my bytes".to_vec()));
    }

    #[test]
    fn json_target_decodes_custom_shape() {
        let decoded = decode(&json_envelope(br#"{"id":"Id1"}"#.to_vec()), TargetType::Json).unwrap();
        assert_eq!(decoded, PipelineValue::Json(serde_json::json!({"id": "Id1"})));
    }

    #[test]
    fn content_type_parameters_are_ignored() {
        let event = sample_event();
        let payload = serde_json::to_vec(&AddEventRequest::new(event.clone())).unwrap();
        let envelope = MessageEnvelope::new("id", "application/json; charset=utf-8", payload);

        let decoded = decode(&envelope, TargetType::Event).unwrap();
        assert_eq!(decoded, PipelineValue::Event(event));
    }
}
