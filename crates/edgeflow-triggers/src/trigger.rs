use std::sync::Arc;

use async_trait::async_trait;
use futures::future::BoxFuture;
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;
use tokio_util::task::TaskTracker;

use edgeflow_domain::{Context, MessageEnvelope, StoreAndForwardConfig};
use edgeflow_runtime::{PipelineError, PipelineRuntime};

/// Cleanup invoked once by the host at shutdown. Must release all
/// transport resources without blocking indefinitely.
pub type Deferred = Box<dyn FnOnce() -> BoxFuture<'static, ()> + Send>;

/// Transport adapter feeding the pipeline runtime.
///
/// Contract: `initialize` must begin consuming from the transport before
/// returning success, spawn long-running workers on `tracker`, observe
/// `app_token` for shutdown, and forward envelopes received on
/// `background` to its publish surface without running the pipeline.
#[async_trait]
pub trait Trigger: Send + Sync {
    async fn initialize(
        &mut self,
        tracker: &TaskTracker,
        app_token: CancellationToken,
        background: mpsc::Receiver<MessageEnvelope>,
    ) -> anyhow::Result<Deferred>;
}

/// Builds per-message contexts and drives the runtime on behalf of a
/// trigger. Custom trigger factories receive one of these so every
/// transport processes messages the same way.
pub struct MessageProcessor {
    runtime: Arc<PipelineRuntime>,
    store_and_forward: StoreAndForwardConfig,
}

impl MessageProcessor {
    pub fn new(runtime: Arc<PipelineRuntime>, store_and_forward: StoreAndForwardConfig) -> Self {
        Self {
            runtime,
            store_and_forward,
        }
    }

    /// Fresh context carrying the envelope's correlation id and content
    /// type plus the current configuration snapshot.
    pub fn build_context(&self, envelope: &MessageEnvelope) -> Context {
        Context::new(
            envelope.correlation_id.clone(),
            envelope.content_type.clone(),
            self.store_and_forward.clone(),
        )
    }

    /// Run one envelope through the pipeline. Failures are logged by the
    /// runtime; the returned error is for transport-level translation.
    pub async fn process(
        &self,
        ctx: &mut Context,
        envelope: &MessageEnvelope,
    ) -> Result<(), PipelineError> {
        self.runtime.process_message(ctx, envelope).await
    }
}
