use std::sync::Arc;
use std::time::Duration;

use tokio_util::sync::CancellationToken;
use tokio_util::task::TaskTracker;
use tracing::{debug, error, info, warn};

use edgeflow_domain::{Context, PipelineValue, StoreAndForwardConfig, StoreClient, StoredObject};

use crate::runtime::PipelineRuntime;

/// Floor for the retry tick interval.
pub const DEFAULT_MIN_RETRY_INTERVAL_MS: u64 = 5_000;

/// Persists failed exports and re-drives them through the pipeline on a
/// periodic tick.
///
/// Two cancellation tokens govern the loop: the application token stops
/// it permanently at shutdown, the enabled token stops the current loop
/// when store-and-forward is disabled. Re-enabling starts a fresh loop
/// with a fresh enabled token.
pub struct StoreAndForward {
    runtime: Arc<PipelineRuntime>,
    store_client: Arc<dyn StoreClient>,
    config: StoreAndForwardConfig,
}

impl StoreAndForward {
    pub fn new(
        runtime: Arc<PipelineRuntime>,
        store_client: Arc<dyn StoreClient>,
        config: StoreAndForwardConfig,
    ) -> Self {
        Self {
            runtime,
            store_client,
            config,
        }
    }

    /// Spawn the retry loop onto the shared task tracker.
    pub fn start_retry_loop(
        self: Arc<Self>,
        tracker: &TaskTracker,
        app_token: CancellationToken,
        enabled_token: CancellationToken,
    ) {
        tracker.spawn(async move { self.retry_loop(app_token, enabled_token).await });
    }

    async fn retry_loop(&self, app_token: CancellationToken, enabled_token: CancellationToken) {
        let (interval_ms, max_retry_count) = effective_retry_policy(&self.config);

        info!(
            interval_ms,
            max_retry_count, "starting store and forward retry loop"
        );

        loop {
            tokio::select! {
                _ = app_token.cancelled() => break,
                _ = enabled_token.cancelled() => break,
                // Sleep-then-work keeps ticks from overlapping: the next
                // tick is armed only after the current batch finishes.
                _ = tokio::time::sleep(Duration::from_millis(interval_ms)) => {
                    self.retry_stored_data(max_retry_count).await;
                }
            }
        }

        info!("store and forward retry loop exited");
    }

    /// One retry tick: load this service's items, process them serially,
    /// then apply the computed remove and update sets.
    async fn retry_stored_data(&self, max_retry_count: i64) {
        let items = match self
            .store_client
            .retrieve_from_store(self.runtime.service_key())
            .await
        {
            Ok(items) => items,
            Err(err) => {
                error!(error = %err, "unable to load store and forward items from the store");
                return;
            }
        };

        debug!(count = items.len(), "stored data items found for retrying");
        if items.is_empty() {
            return;
        }

        let (to_remove, to_update) = self.process_retry_items(items, max_retry_count).await;

        debug!(
            remove = to_remove.len(),
            update = to_update.len(),
            "applying retry results to the store"
        );

        for item in &to_remove {
            if let Err(err) = self.store_client.remove_from_store(item).await {
                error!(
                    error = %err,
                    id = %item.id,
                    correlation_id = %item.correlation_id,
                    "unable to remove stored data item"
                );
            }
        }

        for item in &to_update {
            if let Err(err) = self.store_client.update(item).await {
                error!(
                    error = %err,
                    id = %item.id,
                    correlation_id = %item.correlation_id,
                    "unable to update stored data item"
                );
            }
        }
    }

    async fn process_retry_items(
        &self,
        items: Vec<StoredObject>,
        max_retry_count: i64,
    ) -> (Vec<StoredObject>, Vec<StoredObject>) {
        let mut to_remove = Vec::new();
        let mut to_update = Vec::new();

        for mut item in items {
            if item.version == self.runtime.pipeline_hash() {
                if self.retry_export_function(&item).await {
                    debug!(
                        correlation_id = %item.correlation_id,
                        "export retry successful, removing item"
                    );
                } else {
                    item.retry_count += 1;
                    if max_retry_count == 0 || (item.retry_count as i64) < max_retry_count {
                        debug!(
                            retries = item.retry_count,
                            correlation_id = %item.correlation_id,
                            "export retry failed, incrementing retry count"
                        );
                        to_update.push(item);
                        continue;
                    }
                    debug!(
                        retries = item.retry_count,
                        correlation_id = %item.correlation_id,
                        "max retries exceeded, removing item"
                    );
                }
            } else {
                debug!(
                    correlation_id = %item.correlation_id,
                    "stored pipeline version does not match the current pipeline, removing item"
                );
            }

            to_remove.push(item);
        }

        (to_remove, to_update)
    }

    async fn retry_export_function(&self, item: &StoredObject) -> bool {
        let mut ctx = Context::new(
            item.correlation_id.clone(),
            String::new(),
            self.config.clone(),
        );

        debug!(correlation_id = %ctx.correlation_id, "retrying stored data");

        let transforms = self.runtime.transforms();
        self.runtime
            .execute_pipeline(
                Some(PipelineValue::Bytes(item.payload.clone())),
                &mut ctx,
                &transforms,
                item.pipeline_position,
                true,
            )
            .await
            .is_ok()
    }
}

/// Apply the configuration quirks: the interval is floored and a
/// negative max retry count falls back to a single attempt.
fn effective_retry_policy(config: &StoreAndForwardConfig) -> (u64, i64) {
    let interval_ms = config.retry_interval_ms.max(DEFAULT_MIN_RETRY_INTERVAL_MS);

    let max_retry_count = if config.max_retry_count < 0 {
        warn!("store and forward max retry count cannot be negative, defaulting to 1");
        1
    } else {
        config.max_retry_count
    };

    (interval_ms, max_retry_count)
}
