use crate::event::Event;

/// The polymorphic value handed from one pipeline function to the next.
///
/// Pipelines are heterogeneous: the first function usually receives a
/// decoded [`Event`], while downstream functions may produce marshaled
/// bytes, display text or arbitrary JSON. Functions that require a
/// particular shape assert on it and fail with a stage error otherwise.
#[derive(Debug, Clone, PartialEq)]
pub enum PipelineValue {
    Event(Event),
    Bytes(Vec<u8>),
    Text(String),
    Json(serde_json::Value),
}

impl PipelineValue {
    pub fn type_name(&self) -> &'static str {
        match self {
            PipelineValue::Event(_) => "event",
            PipelineValue::Bytes(_) => "bytes",
            PipelineValue::Text(_) => "text",
            PipelineValue::Json(_) => "json",
        }
    }

    pub fn as_event(&self) -> Option<&Event> {
        match self {
            PipelineValue::Event(event) => Some(event),
            _ => None,
        }
    }

    pub fn into_event(self) -> Option<Event> {
        match self {
            PipelineValue::Event(event) => Some(event),
            _ => None,
        }
    }
}

impl From<Event> for PipelineValue {
    fn from(event: Event) -> Self {
        PipelineValue::Event(event)
    }
}

impl From<Vec<u8>> for PipelineValue {
    fn from(bytes: Vec<u8>) -> Self {
        PipelineValue::Bytes(bytes)
    }
}

impl From<String> for PipelineValue {
    fn from(text: String) -> Self {
        PipelineValue::Text(text)
    }
}

impl From<serde_json::Value> for PipelineValue {
    fn from(value: serde_json::Value) -> Self {
        PipelineValue::Json(value)
    }
}
