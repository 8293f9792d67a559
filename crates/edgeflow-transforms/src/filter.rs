use async_trait::async_trait;
use tracing::debug;

use edgeflow_domain::{
    AppFunction, Context, Flow, FunctionResult, PipelineValue, StageError,
};

use crate::util::received_label;

/// Passes events whose device name is in the accept list; anything else
/// ends the pipeline cleanly.
pub struct FilterByDeviceName {
    device_names: Vec<String>,
}

impl FilterByDeviceName {
    pub fn new(device_names: Vec<String>) -> Self {
        Self { device_names }
    }
}

#[async_trait]
impl AppFunction for FilterByDeviceName {
    fn id(&self) -> &str {
        "filter-by-device-name"
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

        if self.device_names.iter().any(|name| *name == event.device_name) {
            debug!(
                device_name = %event.device_name,
                correlation_id = %ctx.correlation_id,
                "event accepted"
            );
            Ok(Flow::Continue(Some(PipelineValue::Event(event))))
        } else {
            debug!(
                device_name = %event.device_name,
                correlation_id = %ctx.correlation_id,
                "event filtered out"
            );
            Ok(Flow::Halt)
        }
    }
}

/// Keeps only readings whose resource name is in the accept list; halts
/// when no reading survives.
pub struct FilterByResourceName {
    resource_names: Vec<String>,
}

impl FilterByResourceName {
    pub fn new(resource_names: Vec<String>) -> Self {
        Self { resource_names }
    }
}

#[async_trait]
impl AppFunction for FilterByResourceName {
    fn id(&self) -> &str {
        "filter-by-resource-name"
    }

    async fn execute(&self, ctx: &mut Context, input: Option<PipelineValue>) -> FunctionResult {
        let mut event = match input {
            Some(PipelineValue::Event(event)) => event,
            other => {
                return Err(StageError::UnexpectedType {
                    function: self.id().to_string(),
                    expected: "event",
                    received: received_label(other.as_ref()),
                })
            }
        };

        event.readings.retain(|reading| {
            self.resource_names
                .iter()
                .any(|name| *name == reading.resource_name)
        });

        if event.readings.is_empty() {
            debug!(
                correlation_id = %ctx.correlation_id,
                "no readings left after filtering, dropping event"
            );
            return Ok(Flow::Halt);
        }

        debug!(
            readings = event.readings.len(),
            correlation_id = %ctx.correlation_id,
            "readings filtered"
        );
        Ok(Flow::Continue(Some(PipelineValue::Event(event))))
    }
}
