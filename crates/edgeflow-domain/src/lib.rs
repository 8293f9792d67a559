pub mod config;
pub mod context;
pub mod decoder;
pub mod envelope;
pub mod error;
pub mod event;
pub mod function;
pub mod secrets;
pub mod store;
pub mod value;

pub use config::StoreAndForwardConfig;
pub use context::Context;
pub use decoder::{decode, TargetType};
pub use envelope::{
    MessageEnvelope, CONTENT_TYPE_BINARY, CONTENT_TYPE_CBOR, CONTENT_TYPE_JSON, CORRELATION_HEADER,
};
pub use error::{DecodeError, StageError};
pub use event::{
    normalize_event, AddEventRequest, Event, LegacyEvent, LegacyReading, Reading, ReadingValue,
    CURRENT_API_VERSION, UNKNOWN,
};
pub use function::{AppFunction, Flow, FnTransform, FunctionResult};
pub use secrets::{InMemorySecretProvider, SecretError, SecretProvider};
pub use store::{StoreClient, StoreError, StoredObject};
pub use value::PipelineValue;

#[cfg(any(test, feature = "testing"))]
pub use secrets::MockSecretProvider;
#[cfg(any(test, feature = "testing"))]
pub use store::MockStoreClient;
