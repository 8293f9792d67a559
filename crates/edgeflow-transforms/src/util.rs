use edgeflow_domain::{PipelineValue, StageError};

/// Describe a stage input for error messages.
pub fn received_label(value: Option<&PipelineValue>) -> String {
    value.map_or("nothing", PipelineValue::type_name).to_string()
}

/// Coerce a pipeline value into bytes for export or response payloads.
/// Events and JSON values are marshaled as JSON; text as UTF-8.
pub fn coerce_type(function: &str, value: Option<&PipelineValue>) -> Result<Vec<u8>, StageError> {
    match value {
        None => Err(StageError::NoData {
            function: function.to_string(),
        }),
        Some(PipelineValue::Bytes(bytes)) => Ok(bytes.clone()),
        Some(PipelineValue::Text(text)) => Ok(text.clone().into_bytes()),
        Some(PipelineValue::Event(event)) => serde_json::to_vec(event)
            .map_err(|err| StageError::Other(anyhow::anyhow!("failed to marshal event: {err}"))),
        Some(PipelineValue::Json(value)) => serde_json::to_vec(value)
            .map_err(|err| StageError::Other(anyhow::anyhow!("failed to marshal value: {err}"))),
    }
}
