use async_nats::HeaderMap;
use async_trait::async_trait;
use futures::StreamExt;
use tokio::sync::{mpsc, RwLock};
use tracing::{debug, info, warn};
use uuid::Uuid;

use edgeflow_domain::{
    MessageEnvelope, SecretProvider, CONTENT_TYPE_JSON, CORRELATION_HEADER,
};

use crate::auth::{resolve_credentials, AuthMode, SecretData};
use crate::config::MessageBusConfig;
use crate::traits::{MessageBusClient, MessagingError, TopicChannel};

const CONTENT_TYPE_HEADER: &str = "Content-Type";

/// NATS subject matching every topic.
const WILDCARD_SUBJECT: &str = ">";

/// NATS-backed [`MessageBusClient`].
///
/// Correlation id and content type travel as message headers; the
/// payload is the envelope payload verbatim.
pub struct NatsMessageBus {
    config: MessageBusConfig,
    credentials: Option<SecretData>,
    client: RwLock<Option<async_nats::Client>>,
}

impl NatsMessageBus {
    pub fn new(config: MessageBusConfig) -> Self {
        Self {
            config,
            credentials: None,
            client: RwLock::new(None),
        }
    }

    pub fn with_credentials(mut self, credentials: SecretData) -> Self {
        self.credentials = Some(credentials);
        self
    }

    /// Build a client from configuration, resolving and validating the
    /// auth secret when an auth mode is set.
    pub async fn from_config(
        config: MessageBusConfig,
        secrets: &dyn SecretProvider,
    ) -> Result<Self, MessagingError> {
        let credentials =
            resolve_credentials(config.auth_mode, &config.secret_name, secrets).await?;
        Ok(Self {
            config,
            credentials,
            client: RwLock::new(None),
        })
    }

    async fn connected_client(&self) -> Result<async_nats::Client, MessagingError> {
        self.client
            .read()
            .await
            .clone()
            .ok_or(MessagingError::NotConnected)
    }
}

fn subject_for(topic: &str) -> String {
    if topic.is_empty() {
        WILDCARD_SUBJECT.to_string()
    } else {
        topic.to_string()
    }
}

/// Build an envelope from the parts of one inbound bus message.
pub fn envelope_from_parts(
    subject: &str,
    headers: Option<&HeaderMap>,
    payload: &[u8],
) -> MessageEnvelope {
    let correlation_id = headers
        .and_then(|headers| headers.get(CORRELATION_HEADER))
        .map(|value| value.as_str().to_string())
        .filter(|value| !value.is_empty())
        .unwrap_or_else(|| Uuid::new_v4().to_string());

    let content_type = headers
        .and_then(|headers| headers.get(CONTENT_TYPE_HEADER))
        .map(|value| value.as_str().to_string())
        .filter(|value| !value.is_empty())
        .unwrap_or_else(|| CONTENT_TYPE_JSON.to_string());

    MessageEnvelope::new(correlation_id, content_type, payload.to_vec())
        .with_received_topic(subject)
}

#[async_trait]
impl MessageBusClient for NatsMessageBus {
    async fn connect(&self) -> Result<(), MessagingError> {
        let url = self.config.broker_url()?;
        info!(url = %url, "connecting to the message bus");

        let mut options = async_nats::ConnectOptions::new();
        if let Some(credentials) = &self.credentials {
            options = match self.config.auth_mode {
                AuthMode::None => options,
                AuthMode::UsernamePassword => options.user_and_password(
                    credentials.username.clone(),
                    credentials.password.clone(),
                ),
                AuthMode::ClientCert => options
                    .add_client_certificate(
                        credentials.client_cert.clone().into(),
                        credentials.client_key.clone().into(),
                    )
                    .require_tls(true),
                AuthMode::CaCert => options
                    .add_root_certificates(credentials.ca_cert.clone().into())
                    .require_tls(true),
            };
        }

        let client = options
            .connect(url.as_str())
            .await
            .map_err(|err| MessagingError::Connect(err.to_string()))?;

        *self.client.write().await = Some(client);
        info!("connected to the message bus");
        Ok(())
    }

    async fn subscribe(
        &self,
        topics: Vec<TopicChannel>,
        errors: mpsc::Sender<MessagingError>,
    ) -> Result<(), MessagingError> {
        let client = self.connected_client().await?;

        for channel in topics {
            let subject = subject_for(&channel.topic);
            let mut subscription = client.subscribe(subject.clone()).await.map_err(|err| {
                MessagingError::Subscribe {
                    topic: subject.clone(),
                    reason: err.to_string(),
                }
            })?;

            debug!(topic = %subject, "subscribed to message bus topic");

            let errors = errors.clone();
            tokio::spawn(async move {
                while let Some(message) = subscription.next().await {
                    let envelope = envelope_from_parts(
                        &message.subject,
                        message.headers.as_ref(),
                        &message.payload,
                    );
                    if channel.messages.send(envelope).await.is_err() {
                        // The consumer worker is gone; stop forwarding.
                        debug!(topic = %subject, "inbound channel closed, ending subscription");
                        return;
                    }
                }

                // The stream only ends when the connection is gone.
                let _ = errors
                    .send(MessagingError::Subscribe {
                        topic: subject.clone(),
                        reason: "subscription stream ended".to_string(),
                    })
                    .await;
            });
        }

        Ok(())
    }

    async fn publish(&self, envelope: MessageEnvelope, topic: &str) -> Result<(), MessagingError> {
        let client = self.connected_client().await?;

        let mut headers = HeaderMap::new();
        headers.insert(CORRELATION_HEADER, envelope.correlation_id.as_str());
        headers.insert(CONTENT_TYPE_HEADER, envelope.content_type.as_str());

        client
            .publish_with_headers(topic.to_string(), headers, envelope.payload.into())
            .await
            .map_err(|err| MessagingError::Publish {
                topic: topic.to_string(),
                reason: err.to_string(),
            })
    }

    async fn disconnect(&self) -> Result<(), MessagingError> {
        if let Some(client) = self.client.write().await.take() {
            if let Err(err) = client.flush().await {
                warn!(error = %err, "failed to flush the message bus connection on disconnect");
            }
        }
        Ok(())
    }
}
