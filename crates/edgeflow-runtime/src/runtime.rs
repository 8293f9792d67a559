use std::panic::AssertUnwindSafe;
use std::sync::{Arc, RwLock};

use futures::FutureExt;
use thiserror::Error;
use tracing::{debug, error, info};

use edgeflow_domain::{
    decode, AppFunction, Context, DecodeError, Flow, MessageEnvelope, PipelineValue, StageError,
    StoreClient, StoredObject, TargetType,
};

/// Prefix of every pipeline hash; the rest is the ordered function ids.
pub const PIPELINE_HASH_PREFIX: &str = "pipeline-functions:";

/// Snapshot of the transform list taken when a message enters.
pub type Transforms = Arc<Vec<Arc<dyn AppFunction>>>;

/// Error surfaced by [`PipelineRuntime::process_message`].
///
/// Pipeline errors are returned by value, inspected by the trigger and
/// either translated to a transport response or logged and dropped.
#[derive(Error, Debug)]
pub enum PipelineError {
    #[error("failed to decode message payload: {source}")]
    Decode {
        #[source]
        source: DecodeError,
    },

    #[error("pipeline function '{function}' at position {position} failed: {source}")]
    Stage {
        position: usize,
        function: String,
        #[source]
        source: StageError,
    },

    #[error("pipeline function '{function}' at position {position} crashed")]
    Crash { position: usize, function: String },

    #[error("invalid pipeline configuration: {0}")]
    Configuration(String),
}

impl PipelineError {
    /// Advisory status for HTTP triggers.
    pub fn http_status(&self) -> u16 {
        match self {
            PipelineError::Decode { .. } => 422,
            _ => 500,
        }
    }

    /// Pipeline position the error occurred at, when positional.
    pub fn position(&self) -> Option<usize> {
        match self {
            PipelineError::Stage { position, .. } | PipelineError::Crash { position, .. } => {
                Some(*position)
            }
            _ => None,
        }
    }
}

/// Drives one decoded message through the configured function pipeline.
///
/// The transform list is replaceable at runtime: readers capture an
/// [`Arc`] snapshot at message entry, writers publish a new list, and a
/// message already in flight finishes on the list it entered with.
pub struct PipelineRuntime {
    transforms: RwLock<Transforms>,
    target_type: TargetType,
    service_key: String,
    store_client: Option<Arc<dyn StoreClient>>,
}

impl PipelineRuntime {
    pub fn new(service_key: impl Into<String>, target_type: TargetType) -> Self {
        Self {
            transforms: RwLock::new(Arc::new(Vec::new())),
            target_type,
            service_key: service_key.into(),
            store_client: None,
        }
    }

    /// Attach the store used to persist failed exports for later retry.
    pub fn with_store_client(mut self, store_client: Arc<dyn StoreClient>) -> Self {
        self.store_client = Some(store_client);
        self
    }

    pub fn service_key(&self) -> &str {
        &self.service_key
    }

    /// Replace the pipeline atomically. The new list takes effect on the
    /// next message; an empty list is rejected.
    pub fn set_transforms(&self, transforms: Vec<Arc<dyn AppFunction>>) -> Result<(), PipelineError> {
        if transforms.is_empty() {
            return Err(PipelineError::Configuration(
                "transform pipeline must contain at least one function".to_string(),
            ));
        }

        info!(count = transforms.len(), "replacing pipeline functions");
        *self
            .transforms
            .write()
            .expect("transform list lock poisoned") = Arc::new(transforms);
        Ok(())
    }

    /// Current transform list snapshot.
    pub fn transforms(&self) -> Transforms {
        self.transforms
            .read()
            .expect("transform list lock poisoned")
            .clone()
    }

    /// Deterministic identity of the current pipeline. Recomputed from
    /// the transform list on every call, never cached.
    pub fn pipeline_hash(&self) -> String {
        pipeline_hash_of(&self.transforms())
    }

    /// Decode one envelope and run it through the full pipeline.
    pub async fn process_message(
        &self,
        ctx: &mut Context,
        envelope: &MessageEnvelope,
    ) -> Result<(), PipelineError> {
        debug!(
            correlation_id = %ctx.correlation_id,
            content_type = %envelope.content_type,
            "processing message"
        );

        let transforms = self.transforms();

        let input = decode(envelope, self.target_type).map_err(|source| {
            error!(
                correlation_id = %ctx.correlation_id,
                error = %source,
                "failed to decode message payload"
            );
            PipelineError::Decode { source }
        })?;

        self.execute_pipeline(Some(input), ctx, &transforms, 0, false)
            .await
    }

    /// Shared pipeline driver, also used by the retry loop to resume a
    /// stored item at its captured position.
    pub async fn execute_pipeline(
        &self,
        input: Option<PipelineValue>,
        ctx: &mut Context,
        transforms: &[Arc<dyn AppFunction>],
        start_position: usize,
        is_retry: bool,
    ) -> Result<(), PipelineError> {
        let mut current = input;

        for (position, function) in transforms.iter().enumerate().skip(start_position) {
            let outcome = AssertUnwindSafe(function.execute(ctx, current))
                .catch_unwind()
                .await;

            match outcome {
                Err(_) => {
                    error!(
                        position,
                        function = %function.id(),
                        correlation_id = %ctx.correlation_id,
                        "pipeline function panicked"
                    );
                    return Err(PipelineError::Crash {
                        position,
                        function: function.id().to_string(),
                    });
                }
                Ok(Ok(Flow::Halt)) => {
                    debug!(
                        position,
                        function = %function.id(),
                        correlation_id = %ctx.correlation_id,
                        "pipeline halted by function"
                    );
                    return Ok(());
                }
                Ok(Ok(Flow::Continue(next))) => current = next,
                Ok(Err(source)) => {
                    error!(
                        position,
                        function = %function.id(),
                        correlation_id = %ctx.correlation_id,
                        error = %source,
                        "pipeline function returned an error"
                    );
                    if !is_retry && ctx.retry_data.is_some() {
                        self.store_for_later_retry(ctx, transforms, position).await;
                    }
                    return Err(PipelineError::Stage {
                        position,
                        function: function.id().to_string(),
                        source,
                    });
                }
            }
        }

        Ok(())
    }

    async fn store_for_later_retry(
        &self,
        ctx: &Context,
        transforms: &[Arc<dyn AppFunction>],
        position: usize,
    ) {
        let Some(payload) = ctx.retry_data.clone() else {
            return;
        };

        debug!(correlation_id = %ctx.correlation_id, "storing data for later retry");

        if !ctx.store_and_forward.enabled {
            error!(
                correlation_id = %ctx.correlation_id,
                "failed to store item for later retry: store and forward is not enabled"
            );
            return;
        }

        let Some(store_client) = &self.store_client else {
            error!(
                correlation_id = %ctx.correlation_id,
                "failed to store item for later retry: no store client is configured"
            );
            return;
        };

        // Hash the executing snapshot so the stored position always refers
        // to the pipeline that produced it.
        let mut item = StoredObject::new(
            self.service_key.as_str(),
            payload,
            position,
            pipeline_hash_of(transforms),
        );
        item.correlation_id = ctx.correlation_id.clone();

        if let Err(err) = store_client.store(item).await {
            error!(
                correlation_id = %ctx.correlation_id,
                error = %err,
                "failed to store item for later retry"
            );
        }
    }
}

/// Identity of an ordered transform list.
pub fn pipeline_hash_of(transforms: &[Arc<dyn AppFunction>]) -> String {
    let mut hash = String::from(PIPELINE_HASH_PREFIX);
    for function in transforms {
        hash.push(' ');
        hash.push_str(function.id());
    }
    hash
}
