use std::sync::Arc;

use anyhow::Context as _;
use async_trait::async_trait;
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;
use tokio_util::task::TaskTracker;
use tracing::{debug, error, info, warn};

use edgeflow_domain::MessageEnvelope;
use edgeflow_messaging::{split_topics, MessageBusClient, TopicChannel};

use crate::trigger::{Deferred, MessageProcessor, Trigger};
use crate::util::infer_response_content_type;

/// Buffered envelopes per subscribed topic before the bus client blocks.
const TOPIC_CHANNEL_CAPACITY: usize = 64;
const ERROR_CHANNEL_CAPACITY: usize = 8;

/// Reference trigger: fan-in subscription over a set of bus topics with
/// concurrent per-message dispatch and a background publish path.
pub struct MessageBusTrigger {
    client: Arc<dyn MessageBusClient>,
    processor: Arc<MessageProcessor>,
    subscribe_topics: String,
    publish_topic: String,
}

impl MessageBusTrigger {
    pub fn new(
        client: Arc<dyn MessageBusClient>,
        processor: Arc<MessageProcessor>,
        subscribe_topics: impl Into<String>,
        publish_topic: impl Into<String>,
    ) -> Self {
        Self {
            client,
            processor,
            subscribe_topics: subscribe_topics.into(),
            publish_topic: publish_topic.into(),
        }
    }
}

#[async_trait]
impl Trigger for MessageBusTrigger {
    async fn initialize(
        &mut self,
        tracker: &TaskTracker,
        app_token: CancellationToken,
        mut background: mpsc::Receiver<MessageEnvelope>,
    ) -> anyhow::Result<Deferred> {
        info!(topics = %self.subscribe_topics, "initializing message bus trigger");

        self.client
            .connect()
            .await
            .context("failed to connect to the message bus")?;

        let topics = split_topics(&self.subscribe_topics);
        let (error_tx, mut error_rx) = mpsc::channel(ERROR_CHANNEL_CAPACITY);

        // One inbound channel per topic, all registered in a single
        // subscribe call so we know which topic each message came from.
        let mut registrations = Vec::with_capacity(topics.len());
        let mut consumers = Vec::with_capacity(topics.len());
        for topic in topics {
            let (messages_tx, messages_rx) = mpsc::channel(TOPIC_CHANNEL_CAPACITY);
            registrations.push(TopicChannel {
                topic: topic.clone(),
                messages: messages_tx,
            });
            consumers.push((topic, messages_rx));
        }

        self.client
            .subscribe(registrations, error_tx)
            .await
            .with_context(|| {
                format!("failed to subscribe to topic(s) '{}'", self.subscribe_topics)
            })?;

        for (topic, mut inbound) in consumers {
            let token = app_token.clone();
            let message_tracker = tracker.clone();
            let processor = Arc::clone(&self.processor);
            let client = Arc::clone(&self.client);
            let publish_topic = self.publish_topic.clone();

            tracker.spawn(async move {
                info!(topic = %topic, "waiting for messages from the message bus");
                loop {
                    tokio::select! {
                        _ = token.cancelled() => {
                            info!(topic = %topic, "exiting message bus consumer");
                            break;
                        }
                        maybe_envelope = inbound.recv() => {
                            let Some(envelope) = maybe_envelope else {
                                warn!(topic = %topic, "inbound topic channel closed");
                                break;
                            };
                            // Each message gets its own worker; no ordering
                            // is preserved across messages on one topic.
                            let processor = Arc::clone(&processor);
                            let client = Arc::clone(&client);
                            let publish_topic = publish_topic.clone();
                            message_tracker.spawn(async move {
                                process_bus_message(processor, client, publish_topic, envelope)
                                    .await;
                            });
                        }
                    }
                }
            });
        }

        // Auxiliary worker: bus errors and background publishing.
        {
            let token = app_token.clone();
            let client = Arc::clone(&self.client);
            let publish_topic = self.publish_topic.clone();
            tracker.spawn(async move {
                let mut errors_open = true;
                let mut background_open = true;
                loop {
                    tokio::select! {
                        _ = token.cancelled() => {
                            info!("exiting message bus error and background publish worker");
                            break;
                        }
                        maybe_error = error_rx.recv(), if errors_open => match maybe_error {
                            Some(err) => error!(error = %err, "message bus error"),
                            None => errors_open = false,
                        },
                        maybe_envelope = background.recv(), if background_open => match maybe_envelope {
                            Some(envelope) => {
                                let correlation_id = envelope.correlation_id.clone();
                                match client.publish(envelope, &publish_topic).await {
                                    Ok(()) => debug!(
                                        topic = %publish_topic,
                                        correlation_id = %correlation_id,
                                        "published background message to the bus"
                                    ),
                                    Err(err) => error!(
                                        error = %err,
                                        correlation_id = %correlation_id,
                                        "failed to publish background message to the bus"
                                    ),
                                }
                            }
                            None => background_open = false,
                        },
                    }
                }
            });
        }

        let client = Arc::clone(&self.client);
        Ok(Box::new(move || {
            Box::pin(async move {
                info!("disconnecting from the message bus");
                if let Err(err) = client.disconnect().await {
                    error!(error = %err, "unable to disconnect from the message bus");
                }
            })
        }))
    }
}

async fn process_bus_message(
    processor: Arc<MessageProcessor>,
    client: Arc<dyn MessageBusClient>,
    publish_topic: String,
    envelope: MessageEnvelope,
) {
    debug!(
        topic = %envelope.received_topic.as_deref().unwrap_or(""),
        content_type = %envelope.content_type,
        correlation_id = %envelope.correlation_id,
        "received message from the message bus"
    );

    let mut ctx = processor.build_context(&envelope);
    if processor.process(&mut ctx, &envelope).await.is_err() {
        // The runtime already logged the failure.
        return;
    }

    let Some(payload) = ctx.response_payload.clone() else {
        return;
    };

    let content_type =
        infer_response_content_type(&payload, ctx.response_content_type.as_deref());
    let outbound = MessageEnvelope::new(ctx.correlation_id.clone(), content_type, payload);

    match client.publish(outbound, &publish_topic).await {
        Ok(()) => debug!(
            topic = %publish_topic,
            correlation_id = %ctx.correlation_id,
            "published response message to the bus"
        ),
        Err(err) => error!(
            error = %err,
            correlation_id = %ctx.correlation_id,
            "failed to publish response message to the bus"
        ),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    use std::time::Duration;

    use edgeflow_domain::{
        Flow, FnTransform, StoreAndForwardConfig, TargetType, CONTENT_TYPE_CBOR,
        CONTENT_TYPE_JSON,
    };
    use edgeflow_messaging::MockMessageBusClient;
    use edgeflow_runtime::PipelineRuntime;

    fn responder_processor(response: Vec<u8>) -> Arc<MessageProcessor> {
        let runtime = Arc::new(PipelineRuntime::new("trigger-test", TargetType::Raw));
        runtime
            .set_transforms(vec![Arc::new(FnTransform::new(
                "respond",
                move |ctx: &mut edgeflow_domain::Context, input| {
                    ctx.set_response_data(response.clone());
                    Ok(Flow::Continue(input))
                },
            ))])
            .unwrap();
        Arc::new(MessageProcessor::new(runtime, StoreAndForwardConfig::default()))
    }

    #[tokio::test]
    async fn publishes_response_with_inferred_cbor_content_type() {
        let mut mock = MockMessageBusClient::new();
        mock.expect_connect().times(1).returning(|| Ok(()));

        let channels: Arc<std::sync::Mutex<Vec<TopicChannel>>> =
            Arc::new(std::sync::Mutex::new(Vec::new()));
        let channels_clone = channels.clone();
        mock.expect_subscribe()
            .times(1)
            .returning(move |topics, _errors| {
                channels_clone.lock().unwrap().extend(topics);
                Ok(())
            });

        let (published_tx, mut published_rx) = mpsc::channel(4);
        mock.expect_publish().returning(move |envelope, topic| {
            published_tx
                .try_send((envelope, topic.to_string()))
                .expect("publish capture");
            Ok(())
        });
        mock.expect_disconnect().times(1).returning(|| Ok(()));

        // Response payload starting with a CBOR map head, no explicit
        // content type: the outbound envelope must be CBOR.
        let processor = responder_processor(vec![0xA1, 0x61, 0x6B, 0x61, 0x76]);
        let mut trigger = MessageBusTrigger::new(
            Arc::new(mock),
            processor,
            "events.device1,events.device2",
            "responses",
        );

        let tracker = TaskTracker::new();
        let token = CancellationToken::new();
        let (_background_tx, background_rx) = mpsc::channel(8);

        let deferred = trigger
            .initialize(&tracker, token.clone(), background_rx)
            .await
            .unwrap();

        let (first_topic, sender) = {
            let registered = channels.lock().unwrap();
            assert_eq!(registered.len(), 2, "one channel per subscribed topic");
            (registered[0].topic.clone(), registered[0].messages.clone())
        };
        assert_eq!(first_topic, "events.device1");

        sender
            .send(
                MessageEnvelope::new("corr-7", CONTENT_TYPE_JSON, b"ignored".to_vec())
                    .with_received_topic("events.device1"),
            )
            .await
            .unwrap();

        let (outbound, topic) = tokio::time::timeout(Duration::from_secs(5), published_rx.recv())
            .await
            .expect("response published in time")
            .expect("publish captured");
        assert_eq!(topic, "responses");
        assert_eq!(outbound.correlation_id, "corr-7");
        assert_eq!(outbound.content_type, CONTENT_TYPE_CBOR);
        assert_eq!(outbound.payload, vec![0xA1, 0x61, 0x6B, 0x61, 0x76]);

        token.cancel();
        deferred().await;
        tracker.close();
        tracker.wait().await;
    }

    #[tokio::test]
    async fn empty_topic_list_subscribes_to_the_wildcard_topic() {
        let mut mock = MockMessageBusClient::new();
        mock.expect_connect().times(1).returning(|| Ok(()));
        mock.expect_subscribe()
            .times(1)
            .withf(|topics, _| topics.len() == 1 && topics[0].topic.is_empty())
            .returning(|_, _| Ok(()));
        mock.expect_disconnect().returning(|| Ok(()));

        let processor = responder_processor(Vec::new());
        let mut trigger = MessageBusTrigger::new(Arc::new(mock), processor, "", "responses");

        let tracker = TaskTracker::new();
        let token = CancellationToken::new();
        let (_background_tx, background_rx) = mpsc::channel(8);

        let deferred = trigger
            .initialize(&tracker, token.clone(), background_rx)
            .await
            .unwrap();

        token.cancel();
        deferred().await;
        tracker.close();
        tracker.wait().await;
    }

    #[tokio::test]
    async fn background_envelopes_bypass_the_pipeline() {
        let mut mock = MockMessageBusClient::new();
        mock.expect_connect().times(1).returning(|| Ok(()));
        mock.expect_subscribe().times(1).returning(|_, _| Ok(()));

        let (published_tx, mut published_rx) = mpsc::channel(4);
        mock.expect_publish().returning(move |envelope, topic| {
            published_tx
                .try_send((envelope, topic.to_string()))
                .expect("publish capture");
            Ok(())
        });
        mock.expect_disconnect().returning(|| Ok(()));

        let processor = responder_processor(Vec::new());
        let mut trigger =
            MessageBusTrigger::new(Arc::new(mock), processor, "events.device1", "responses");

        let tracker = TaskTracker::new();
        let token = CancellationToken::new();
        let (background_tx, background_rx) = mpsc::channel(8);

        let deferred = trigger
            .initialize(&tracker, token.clone(), background_rx)
            .await
            .unwrap();

        background_tx
            .send(MessageEnvelope::new(
                "bg-1",
                CONTENT_TYPE_JSON,
                b"{\"x\":1}".to_vec(),
            ))
            .await
            .unwrap();

        let (outbound, topic) = tokio::time::timeout(Duration::from_secs(5), published_rx.recv())
            .await
            .expect("background publish in time")
            .expect("publish captured");
        assert_eq!(topic, "responses");
        assert_eq!(outbound.correlation_id, "bg-1");

        token.cancel();
        deferred().await;
        tracker.close();
        tracker.wait().await;
    }
}
