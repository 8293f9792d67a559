/// Store-and-forward settings snapshotted into every per-message context.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct StoreAndForwardConfig {
    pub enabled: bool,
    /// Milliseconds between retry ticks. Clamped to the engine minimum.
    pub retry_interval_ms: u64,
    /// Maximum failed attempts before an item is evicted.
    /// Zero means unbounded; negative values are coerced to one.
    pub max_retry_count: i64,
}
