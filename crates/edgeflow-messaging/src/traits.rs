use async_trait::async_trait;
use thiserror::Error;
use tokio::sync::mpsc;

use edgeflow_domain::{MessageEnvelope, SecretError};

#[derive(Error, Debug)]
pub enum MessagingError {
    #[error("failed to connect to the message bus: {0}")]
    Connect(String),

    #[error("failed to subscribe to topic '{topic}': {reason}")]
    Subscribe { topic: String, reason: String },

    #[error("failed to publish to topic '{topic}': {reason}")]
    Publish { topic: String, reason: String },

    #[error("message bus client is not connected")]
    NotConnected,

    #[error("invalid auth configuration: {0}")]
    Auth(String),

    #[error(transparent)]
    Secret(#[from] SecretError),
}

/// One subscription registration: inbound envelopes for `topic` are
/// delivered on `messages`.
pub struct TopicChannel {
    pub topic: String,
    pub messages: mpsc::Sender<MessageEnvelope>,
}

/// Client abstraction over the underlying message bus. Wire-level
/// specifics stay behind this trait; the trigger only sees envelopes.
#[cfg_attr(any(test, feature = "testing"), mockall::automock)]
#[async_trait]
pub trait MessageBusClient: Send + Sync {
    async fn connect(&self) -> Result<(), MessagingError>;

    /// Register all topic channels in one call. Asynchronous bus errors
    /// are reported on `errors`.
    async fn subscribe(
        &self,
        topics: Vec<TopicChannel>,
        errors: mpsc::Sender<MessagingError>,
    ) -> Result<(), MessagingError>;

    async fn publish(&self, envelope: MessageEnvelope, topic: &str) -> Result<(), MessagingError>;

    async fn disconnect(&self) -> Result<(), MessagingError>;
}
