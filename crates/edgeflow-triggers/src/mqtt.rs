use std::sync::Arc;
use std::time::Duration;

use anyhow::Context as _;
use async_trait::async_trait;
use rumqttc::{AsyncClient, Event, MqttOptions, Packet, QoS};
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;
use tokio_util::task::TaskTracker;
use tracing::{debug, error, info, warn};
use uuid::Uuid;

use edgeflow_domain::{MessageEnvelope, SecretProvider};
use edgeflow_messaging::{resolve_credentials, split_topics, AuthMode};

use crate::trigger::{Deferred, MessageProcessor, Trigger};
use crate::util::infer_inbound_content_type;

const DEFAULT_MQTT_PORT: u16 = 1883;
const REQUEST_CHANNEL_CAPACITY: usize = 100;

/// Settings for the external-MQTT trigger.
#[derive(Debug, Clone)]
pub struct ExternalMqttConfig {
    pub broker_url: String,
    pub client_id: String,
    pub subscribe_topics: String,
    pub publish_topic: String,
    pub qos: u8,
    pub keep_alive_secs: u64,
    pub auth_mode: AuthMode,
    pub secret_name: String,
}

/// Trigger consuming from an external MQTT broker with secret-backed
/// auth and publishing response payloads back to it.
pub struct MqttTrigger {
    processor: Arc<MessageProcessor>,
    config: ExternalMqttConfig,
    secrets: Arc<dyn SecretProvider>,
}

impl MqttTrigger {
    pub fn new(
        processor: Arc<MessageProcessor>,
        config: ExternalMqttConfig,
        secrets: Arc<dyn SecretProvider>,
    ) -> Self {
        Self {
            processor,
            config,
            secrets,
        }
    }
}

#[async_trait]
impl Trigger for MqttTrigger {
    async fn initialize(
        &mut self,
        tracker: &TaskTracker,
        app_token: CancellationToken,
        mut background: mpsc::Receiver<MessageEnvelope>,
    ) -> anyhow::Result<Deferred> {
        info!(
            broker = %self.config.broker_url,
            topics = %self.config.subscribe_topics,
            "initializing external mqtt trigger"
        );

        let (host, port) = parse_broker_url(&self.config.broker_url)?;
        let qos = qos_level(self.config.qos)?;

        let mut options = MqttOptions::new(&self.config.client_id, host, port);
        options.set_keep_alive(Duration::from_secs(self.config.keep_alive_secs));
        options.set_clean_session(true);

        match self.config.auth_mode {
            AuthMode::None => {}
            AuthMode::UsernamePassword => {
                let credentials = resolve_credentials(
                    self.config.auth_mode,
                    &self.config.secret_name,
                    self.secrets.as_ref(),
                )
                .await
                .context("failed to resolve mqtt credentials")?;
                if let Some(credentials) = credentials {
                    options.set_credentials(credentials.username, credentials.password);
                }
            }
            other => anyhow::bail!(
                "auth mode {other:?} is not supported by the external mqtt trigger"
            ),
        }

        let (client, mut event_loop) = AsyncClient::new(options, REQUEST_CHANNEL_CAPACITY);

        for topic in split_topics(&self.config.subscribe_topics) {
            let subject = if topic.is_empty() { "#".to_string() } else { topic };
            client
                .subscribe(&subject, qos)
                .await
                .with_context(|| format!("failed to subscribe to mqtt topic '{subject}'"))?;
            info!(topic = %subject, "subscribed to mqtt topic");
        }

        {
            let token = app_token.clone();
            let message_tracker = tracker.clone();
            let processor = Arc::clone(&self.processor);
            let worker_client = client.clone();
            let publish_topic = self.config.publish_topic.clone();

            tracker.spawn(async move {
                let mut background_open = true;
                loop {
                    tokio::select! {
                        _ = token.cancelled() => {
                            info!("exiting mqtt event loop worker");
                            break;
                        }
                        maybe_envelope = background.recv(), if background_open => match maybe_envelope {
                            Some(envelope) => {
                                if let Err(err) = worker_client
                                    .publish(&publish_topic, qos, false, envelope.payload)
                                    .await
                                {
                                    error!(
                                        error = %err,
                                        correlation_id = %envelope.correlation_id,
                                        "failed to publish background message to the mqtt broker"
                                    );
                                } else {
                                    debug!(
                                        topic = %publish_topic,
                                        correlation_id = %envelope.correlation_id,
                                        "published background message to the mqtt broker"
                                    );
                                }
                            }
                            None => background_open = false,
                        },
                        event = event_loop.poll() => match event {
                            Ok(Event::Incoming(Packet::Publish(publish))) => {
                                let processor = Arc::clone(&processor);
                                let client = worker_client.clone();
                                let publish_topic = publish_topic.clone();
                                message_tracker.spawn(async move {
                                    process_mqtt_message(
                                        processor,
                                        client,
                                        publish_topic,
                                        qos,
                                        publish.topic.clone(),
                                        publish.payload.to_vec(),
                                    )
                                    .await;
                                });
                            }
                            Ok(Event::Incoming(Packet::ConnAck(_))) => {
                                info!("connected to the mqtt broker");
                            }
                            Ok(Event::Incoming(Packet::SubAck(_))) => {
                                debug!("mqtt subscription acknowledged");
                            }
                            Ok(_) => {}
                            Err(err) => {
                                error!(error = %err, "mqtt event loop error");
                                // The next poll reconnects; back off briefly.
                                tokio::time::sleep(Duration::from_secs(1)).await;
                            }
                        }
                    }
                }
            });
        }

        let cleanup_client = client;
        Ok(Box::new(move || {
            Box::pin(async move {
                info!("disconnecting from the mqtt broker");
                if let Err(err) = cleanup_client.disconnect().await {
                    warn!(error = %err, "unable to disconnect from the mqtt broker");
                }
            })
        }))
    }
}

async fn process_mqtt_message(
    processor: Arc<MessageProcessor>,
    client: AsyncClient,
    publish_topic: String,
    qos: QoS,
    topic: String,
    payload: Vec<u8>,
) {
    // MQTT 3.1.1 carries no message headers, so the content type is
    // inferred from the payload and a fresh correlation id is minted.
    let content_type = infer_inbound_content_type(&payload);
    let envelope = MessageEnvelope::new(Uuid::new_v4().to_string(), content_type, payload)
        .with_received_topic(topic.clone());

    debug!(
        topic = %topic,
        content_type = %content_type,
        correlation_id = %envelope.correlation_id,
        "received message from the mqtt broker"
    );

    let mut ctx = processor.build_context(&envelope);
    if processor.process(&mut ctx, &envelope).await.is_err() {
        return;
    }

    let Some(payload) = ctx.response_payload.clone() else {
        return;
    };

    if let Err(err) = client.publish(&publish_topic, qos, false, payload).await {
        error!(
            error = %err,
            correlation_id = %ctx.correlation_id,
            "failed to publish response message to the mqtt broker"
        );
    } else {
        debug!(
            topic = %publish_topic,
            correlation_id = %ctx.correlation_id,
            "published response message to the mqtt broker"
        );
    }
}

/// Parse a broker URL of the form `mqtt://host:port`, `tcp://host:port`
/// or plain `host:port`.
fn parse_broker_url(url: &str) -> anyhow::Result<(&str, u16)> {
    let trimmed = url.trim_start_matches("mqtt://").trim_start_matches("tcp://");

    let parts: Vec<&str> = trimmed.split(':').collect();
    match parts.len() {
        1 if !parts[0].is_empty() => Ok((parts[0], DEFAULT_MQTT_PORT)),
        2 => {
            let port = parts[1]
                .parse::<u16>()
                .with_context(|| format!("invalid port in broker url '{url}'"))?;
            Ok((parts[0], port))
        }
        _ => anyhow::bail!("invalid broker url format '{url}'"),
    }
}

fn qos_level(level: u8) -> anyhow::Result<QoS> {
    match level {
        0 => Ok(QoS::AtMostOnce),
        1 => Ok(QoS::AtLeastOnce),
        2 => Ok(QoS::ExactlyOnce),
        other => anyhow::bail!("invalid mqtt qos level {other}"),
    }
}
