/// Content types the framework understands.
pub const CONTENT_TYPE_JSON: &str = "application/json";
pub const CONTENT_TYPE_CBOR: &str = "application/cbor";
pub const CONTENT_TYPE_BINARY: &str = "application/binary";

/// Header used to carry the correlation id across transports.
pub const CORRELATION_HEADER: &str = "X-Correlation-ID";

/// Transport-level wrapper around one inbound or outbound payload.
#[derive(Debug, Clone, PartialEq)]
pub struct MessageEnvelope {
    /// Opaque id propagated end-to-end for tracing a single message.
    pub correlation_id: String,
    pub content_type: String,
    pub payload: Vec<u8>,
    /// Topic the message arrived on, when the transport knows it.
    pub received_topic: Option<String>,
}

impl MessageEnvelope {
    pub fn new(
        correlation_id: impl Into<String>,
        content_type: impl Into<String>,
        payload: Vec<u8>,
    ) -> Self {
        Self {
            correlation_id: correlation_id.into(),
            content_type: content_type.into(),
            payload,
            received_topic: None,
        }
    }

    pub fn with_received_topic(mut self, topic: impl Into<String>) -> Self {
        self.received_topic = Some(topic.into());
        self
    }
}
