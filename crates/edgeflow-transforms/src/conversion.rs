use async_trait::async_trait;
use tracing::debug;

use edgeflow_domain::{
    AppFunction, Context, Flow, FunctionResult, PipelineValue, StageError,
};

use crate::util::received_label;

/// Marshals the incoming event to JSON text for downstream exporters.
pub struct TransformToJson;

#[async_trait]
impl AppFunction for TransformToJson {
    fn id(&self) -> &str {
        "transform-to-json"
    }

    async fn execute(&self, ctx: &mut Context, input: Option<PipelineValue>) -> FunctionResult {
        let event = match input {
            Some(PipelineValue::Event(event)) => event,
            other => {
                return Err(StageError::UnexpectedType {
                    function: self.id().to_string(),
                    expected: "event",
                    received: received_label(other.as_ref()),
                })
            }
        };

        let text = serde_json::to_string(&event).map_err(|err| {
            StageError::Other(anyhow::anyhow!("failed to marshal event to JSON: {err}"))
        })?;

        debug!(
            bytes = text.len(),
            correlation_id = %ctx.correlation_id,
            "event marshaled to JSON"
        );
        Ok(Flow::Continue(Some(PipelineValue::Text(text))))
    }
}
