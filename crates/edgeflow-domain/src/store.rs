use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use thiserror::Error;

/// One failed export captured for a later retry.
///
/// The schema is serde-stable: stored objects written before a service
/// restart must load after it.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StoredObject {
    /// Unique identifier assigned by the store on insert.
    pub id: String,
    /// Service the item belongs to; retrieval is keyed on this.
    pub app_service_key: String,
    /// Raw input captured at the stored pipeline position.
    pub payload: Vec<u8>,
    /// Position within the pipeline at which to resume.
    pub pipeline_position: usize,
    /// Pipeline hash current when the item was stored.
    pub version: String,
    pub correlation_id: String,
    pub retry_count: u64,
}

impl StoredObject {
    pub fn new(
        app_service_key: impl Into<String>,
        payload: Vec<u8>,
        pipeline_position: usize,
        version: impl Into<String>,
    ) -> Self {
        Self {
            id: String::new(),
            app_service_key: app_service_key.into(),
            payload,
            pipeline_position,
            version: version.into(),
            correlation_id: String::new(),
            retry_count: 0,
        }
    }
}

#[derive(Error, Debug)]
pub enum StoreError {
    #[error("store backend error: {0}")]
    Backend(String),

    #[error("stored object '{0}' not found")]
    NotFound(String),
}

/// Persistence port consumed by the store-and-forward engine.
///
/// Implementations must be safe for concurrent use: the retry worker
/// and pipeline workers may call into the store at the same time.
#[cfg_attr(any(test, feature = "testing"), mockall::automock)]
#[async_trait]
pub trait StoreClient: Send + Sync {
    /// Persist a new item, assigning and returning its identifier.
    async fn store(&self, item: StoredObject) -> Result<String, StoreError>;

    /// All items stored under one service key, in no particular order.
    async fn retrieve_from_store(
        &self,
        app_service_key: &str,
    ) -> Result<Vec<StoredObject>, StoreError>;

    async fn update(&self, item: &StoredObject) -> Result<(), StoreError>;

    async fn remove_from_store(&self, item: &StoredObject) -> Result<(), StoreError>;
}
