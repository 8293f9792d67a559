pub mod auth;
pub mod config;
pub mod nats;
pub mod topics;
pub mod traits;

pub use auth::{resolve_credentials, validate_secret_data, AuthMode, SecretData};
pub use config::{HostInfo, MessageBusConfig};
pub use nats::{envelope_from_parts, NatsMessageBus};
pub use topics::split_topics;
pub use traits::{MessageBusClient, MessagingError, TopicChannel};

#[cfg(any(test, feature = "testing"))]
pub use traits::MockMessageBusClient;
