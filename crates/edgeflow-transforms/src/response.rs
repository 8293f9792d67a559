use async_trait::async_trait;
use tracing::debug;

use edgeflow_domain::{AppFunction, Context, Flow, FunctionResult, PipelineValue};

use crate::util::coerce_type;

/// Places the incoming value into the context response slot so the
/// trigger returns or publishes it. The value passes through unchanged.
#[derive(Default)]
pub struct SetResponseData {
    content_type: Option<String>,
}

impl SetResponseData {
    pub fn new() -> Self {
        Self::default()
    }

    /// Set an explicit response content type instead of letting the
    /// trigger infer one.
    pub fn with_content_type(mut self, content_type: impl Into<String>) -> Self {
        self.content_type = Some(content_type.into());
        self
    }
}

#[async_trait]
impl AppFunction for SetResponseData {
    fn id(&self) -> &str {
        "set-response-data"
    }

    async fn execute(&self, ctx: &mut Context, input: Option<PipelineValue>) -> FunctionResult {
        let payload = coerce_type(self.id(), input.as_ref())?;

        if let Some(content_type) = &self.content_type {
            ctx.set_response_content_type(content_type.clone());
        }
        debug!(
            bytes = payload.len(),
            correlation_id = %ctx.correlation_id,
            "response data set"
        );
        ctx.set_response_data(payload);

        Ok(Flow::Continue(input))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use edgeflow_domain::{StageError, StoreAndForwardConfig};

    fn ctx() -> Context {
        Context::new("corr", "application/json", StoreAndForwardConfig::default())
    }

    #[tokio::test]
    async fn response_slot_is_filled_and_input_passes_through() {
        let mut ctx = ctx();
        let result = SetResponseData::new()
            .execute(&mut ctx, Some(PipelineValue::Text("hello".to_string())))
            .await
            .unwrap();

        assert_eq!(ctx.response_payload.as_deref(), Some(b"hello".as_slice()));
        assert!(ctx.response_content_type.is_none());
        assert_eq!(
            result,
            Flow::Continue(Some(PipelineValue::Text("hello".to_string())))
        );
    }

    #[tokio::test]
    async fn explicit_content_type_is_recorded() {
        let mut ctx = ctx();
        SetResponseData::new()
            .with_content_type("application/cbor")
            .execute(&mut ctx, Some(PipelineValue::Bytes(vec![0xA1])))
            .await
            .unwrap();

        assert_eq!(ctx.response_content_type.as_deref(), Some("application/cbor"));
    }

    #[tokio::test]
    async fn missing_input_is_a_stage_error() {
        let err = SetResponseData::new()
            .execute(&mut ctx(), None)
            .await
            .unwrap_err();
        assert!(matches!(err, StageError::NoData { .. }));
    }
}
