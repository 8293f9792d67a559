use std::collections::HashMap;

use serde::{Deserialize, Serialize};

/// Value substituted for fields the inbound schema does not carry.
pub const UNKNOWN: &str = "Unknown";

/// Version discriminator carried by the current envelope schema.
pub const CURRENT_API_VERSION: &str = "v2";

/// Canonical device observation flowing through the pipeline.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct Event {
    pub id: String,
    pub device_name: String,
    pub profile_name: String,
    pub source_name: String,
    pub origin: i64,
    pub created: i64,
    pub readings: Vec<Reading>,
    #[serde(skip_serializing_if = "HashMap::is_empty")]
    pub tags: HashMap<String, String>,
}

/// A single measurement within an [`Event`].
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct Reading {
    pub id: String,
    pub device_name: String,
    pub resource_name: String,
    pub profile_name: String,
    pub value_type: String,
    #[serde(flatten)]
    pub value: ReadingValue,
}

/// Readings carry either a scalar value or a binary blob, never both.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum ReadingValue {
    #[serde(rename_all = "camelCase")]
    Binary {
        binary_value: Vec<u8>,
        media_type: String,
    },
    Simple {
        value: String,
    },
}

impl Default for ReadingValue {
    fn default() -> Self {
        ReadingValue::Simple {
            value: String::new(),
        }
    }
}

impl ReadingValue {
    pub fn simple(value: impl Into<String>) -> Self {
        ReadingValue::Simple {
            value: value.into(),
        }
    }

    pub fn binary(binary_value: Vec<u8>, media_type: impl Into<String>) -> Self {
        ReadingValue::Binary {
            binary_value,
            media_type: media_type.into(),
        }
    }
}

/// Current envelope schema: a request wrapper around one [`Event`].
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AddEventRequest {
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub api_version: String,
    pub event: Event,
}

impl AddEventRequest {
    pub fn new(event: Event) -> Self {
        Self {
            api_version: CURRENT_API_VERSION.to_string(),
            event,
        }
    }
}

/// Legacy flat event schema, accepted for backward compatibility and
/// normalized into [`Event`] on decode.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct LegacyEvent {
    pub id: String,
    pub device: String,
    pub created: i64,
    pub origin: i64,
    pub readings: Vec<LegacyReading>,
    #[serde(skip_serializing_if = "HashMap::is_empty")]
    pub tags: HashMap<String, String>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct LegacyReading {
    pub id: String,
    pub device: String,
    pub name: String,
    pub created: i64,
    pub origin: i64,
    pub value_type: String,
    pub value: String,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub binary_value: Vec<u8>,
    #[serde(skip_serializing_if = "String::is_empty")]
    pub media_type: String,
}

impl LegacyEvent {
    /// True when no field that identifies an event was present at all.
    pub fn is_vacant(&self) -> bool {
        self.id.is_empty() && self.device.is_empty() && self.readings.is_empty()
    }

    pub fn into_event(self) -> Event {
        Event {
            id: self.id,
            device_name: self.device,
            profile_name: UNKNOWN.to_string(),
            source_name: UNKNOWN.to_string(),
            origin: self.origin,
            created: self.created,
            readings: self.readings.into_iter().map(LegacyReading::into_reading).collect(),
            tags: self.tags,
        }
    }
}

impl LegacyReading {
    fn into_reading(self) -> Reading {
        let value = if self.binary_value.is_empty() {
            ReadingValue::Simple { value: self.value }
        } else {
            ReadingValue::Binary {
                binary_value: self.binary_value,
                media_type: self.media_type,
            }
        };

        Reading {
            id: self.id,
            device_name: self.device,
            resource_name: self.name,
            profile_name: UNKNOWN.to_string(),
            value_type: self.value_type,
            value,
        }
    }
}

/// Apply the canonical field defaults after either decode path.
pub fn normalize_event(mut event: Event) -> Event {
    if event.profile_name.is_empty() {
        event.profile_name = UNKNOWN.to_string();
    }
    if event.source_name.is_empty() {
        event.source_name = UNKNOWN.to_string();
    }
    for reading in &mut event.readings {
        if reading.profile_name.is_empty() {
            reading.profile_name = UNKNOWN.to_string();
        }
    }
    event
}
