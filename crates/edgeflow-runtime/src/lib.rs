pub mod runtime;
pub mod storeforward;

pub use runtime::{
    pipeline_hash_of, PipelineError, PipelineRuntime, Transforms, PIPELINE_HASH_PREFIX,
};
pub use storeforward::{StoreAndForward, DEFAULT_MIN_RETRY_INTERVAL_MS};
