use crate::config::StoreAndForwardConfig;

/// Per-message state created by a trigger and threaded through every
/// pipeline function by reference.
///
/// The context is never shared across messages. Triggers inspect it
/// after the pipeline completes to publish any response payload; the
/// runtime inspects the retry slot to persist failed exports.
#[derive(Debug, Clone, Default)]
pub struct Context {
    pub correlation_id: String,
    /// Content type of the inbound payload.
    pub input_content_type: String,
    /// Payload a function wants returned or published by the trigger.
    pub response_payload: Option<Vec<u8>>,
    /// Explicit content type for the response payload, when set.
    pub response_content_type: Option<String>,
    /// Data to persist for a later retry when the current stage fails.
    pub retry_data: Option<Vec<u8>>,
    /// Configuration snapshot taken when the message entered.
    pub store_and_forward: StoreAndForwardConfig,
}

impl Context {
    pub fn new(
        correlation_id: impl Into<String>,
        input_content_type: impl Into<String>,
        store_and_forward: StoreAndForwardConfig,
    ) -> Self {
        Self {
            correlation_id: correlation_id.into(),
            input_content_type: input_content_type.into(),
            response_payload: None,
            response_content_type: None,
            retry_data: None,
            store_and_forward,
        }
    }

    pub fn set_response_data(&mut self, payload: Vec<u8>) {
        self.response_payload = Some(payload);
    }

    pub fn set_response_content_type(&mut self, content_type: impl Into<String>) {
        self.response_content_type = Some(content_type.into());
    }

    pub fn set_retry_data(&mut self, payload: Vec<u8>) {
        self.retry_data = Some(payload);
    }
}
