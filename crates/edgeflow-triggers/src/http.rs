use std::sync::Arc;

use anyhow::Context as _;
use async_trait::async_trait;
use axum::body::Bytes;
use axum::extract::State;
use axum::http::{header, HeaderMap, StatusCode};
use axum::response::{IntoResponse, Response};
use axum::routing::post;
use axum::Router;
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;
use tokio_util::task::TaskTracker;
use tracing::{debug, error, info, warn};
use uuid::Uuid;

use edgeflow_domain::{MessageEnvelope, CONTENT_TYPE_JSON, CORRELATION_HEADER};

use crate::trigger::{Deferred, MessageProcessor, Trigger};

pub const TRIGGER_ROUTE: &str = "/api/v1/trigger";

/// Trigger accepting one envelope per inbound POST. The response body is
/// the pipeline's response payload and the status reflects the advisory
/// status of any pipeline error.
pub struct HttpTrigger {
    processor: Arc<MessageProcessor>,
    bind_address: String,
}

impl HttpTrigger {
    pub fn new(processor: Arc<MessageProcessor>, bind_address: impl Into<String>) -> Self {
        Self {
            processor,
            bind_address: bind_address.into(),
        }
    }
}

#[async_trait]
impl Trigger for HttpTrigger {
    async fn initialize(
        &mut self,
        tracker: &TaskTracker,
        app_token: CancellationToken,
        mut background: mpsc::Receiver<MessageEnvelope>,
    ) -> anyhow::Result<Deferred> {
        info!(address = %self.bind_address, "initializing http trigger");

        let router = Router::new()
            .route(TRIGGER_ROUTE, post(handle_trigger))
            .with_state(Arc::clone(&self.processor));

        // Bind before returning so the trigger is consuming once
        // initialization reports success.
        let listener = tokio::net::TcpListener::bind(&self.bind_address)
            .await
            .with_context(|| format!("failed to bind http trigger to {}", self.bind_address))?;
        let local_address = listener
            .local_addr()
            .context("failed to read http trigger local address")?;
        info!(address = %local_address, "http trigger listening");

        let token = app_token.clone();
        tracker.spawn(async move {
            let shutdown = async move { token.cancelled().await };
            if let Err(err) = axum::serve(listener, router)
                .with_graceful_shutdown(shutdown)
                .await
            {
                error!(error = %err, "http trigger server error");
            }
        });

        // No transport publish surface; drain the background channel so
        // producers are never blocked on a full buffer.
        let token = app_token.clone();
        tracker.spawn(async move {
            loop {
                tokio::select! {
                    _ = token.cancelled() => break,
                    maybe_envelope = background.recv() => match maybe_envelope {
                        Some(envelope) => warn!(
                            correlation_id = %envelope.correlation_id,
                            "background publishing is not supported by the http trigger, dropping message"
                        ),
                        None => break,
                    },
                }
            }
        });

        Ok(Box::new(move || {
            Box::pin(async move {
                info!("http trigger stopped");
            })
        }))
    }
}

async fn handle_trigger(
    State(processor): State<Arc<MessageProcessor>>,
    headers: HeaderMap,
    body: Bytes,
) -> Response {
    let correlation_id = headers
        .get(CORRELATION_HEADER)
        .and_then(|value| value.to_str().ok())
        .filter(|value| !value.is_empty())
        .map(str::to_string)
        .unwrap_or_else(|| Uuid::new_v4().to_string());

    let content_type = headers
        .get(header::CONTENT_TYPE)
        .and_then(|value| value.to_str().ok())
        .unwrap_or(CONTENT_TYPE_JSON)
        .to_string();

    debug!(
        correlation_id = %correlation_id,
        content_type = %content_type,
        "received http trigger request"
    );

    let envelope = MessageEnvelope::new(correlation_id.clone(), content_type, body.to_vec());
    let mut ctx = processor.build_context(&envelope);

    match processor.process(&mut ctx, &envelope).await {
        Err(err) => {
            let status = StatusCode::from_u16(err.http_status())
                .unwrap_or(StatusCode::INTERNAL_SERVER_ERROR);
            (status, [(CORRELATION_HEADER, correlation_id)], err.to_string()).into_response()
        }
        Ok(()) => match ctx.response_payload {
            Some(payload) => {
                let content_type = ctx
                    .response_content_type
                    .clone()
                    .unwrap_or_else(|| CONTENT_TYPE_JSON.to_string());
                (
                    StatusCode::OK,
                    [
                        ("Content-Type", content_type),
                        (CORRELATION_HEADER, correlation_id),
                    ],
                    payload,
                )
                    .into_response()
            }
            None => (StatusCode::OK, [(CORRELATION_HEADER, correlation_id)], ()).into_response(),
        },
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    use axum::body::Body;
    use axum::http::Request;
    use tower::ServiceExt;

    use edgeflow_domain::{Flow, FnTransform, StoreAndForwardConfig, TargetType};
    use edgeflow_runtime::PipelineRuntime;

    fn router_with(processor: Arc<MessageProcessor>) -> Router {
        Router::new()
            .route(TRIGGER_ROUTE, post(handle_trigger))
            .with_state(processor)
    }

    fn event_payload() -> Vec<u8> {
        br#"{"event":{"id":"x","deviceName":"D","readings":[{"value":"hi"}]}}"#.to_vec()
    }

    #[tokio::test]
    async fn returns_the_pipeline_response_payload() {
        let runtime = Arc::new(PipelineRuntime::new("http-test", TargetType::Event));
        runtime
            .set_transforms(vec![Arc::new(FnTransform::new(
                "respond",
                |ctx: &mut edgeflow_domain::Context, input| {
                    ctx.set_response_data(b"{\"ok\":true}".to_vec());
                    Ok(Flow::Continue(input))
                },
            ))])
            .unwrap();
        let processor = Arc::new(MessageProcessor::new(
            runtime,
            StoreAndForwardConfig::default(),
        ));

        let request = Request::builder()
            .method("POST")
            .uri(TRIGGER_ROUTE)
            .header("Content-Type", "application/json")
            .header(CORRELATION_HEADER, "corr-9")
            .body(Body::from(event_payload()))
            .unwrap();

        let response = router_with(processor).oneshot(request).await.unwrap();
        assert_eq!(response.status(), StatusCode::OK);
        assert_eq!(
            response
                .headers()
                .get(CORRELATION_HEADER)
                .and_then(|value| value.to_str().ok()),
            Some("corr-9")
        );

        let body = axum::body::to_bytes(response.into_body(), usize::MAX)
            .await
            .unwrap();
        assert_eq!(&body[..], b"{\"ok\":true}");
    }

    #[tokio::test]
    async fn decode_failures_map_to_422() {
        let runtime = Arc::new(PipelineRuntime::new("http-test", TargetType::Event));
        runtime
            .set_transforms(vec![Arc::new(FnTransform::new("noop", |_ctx, input| {
                Ok(Flow::Continue(input))
            }))])
            .unwrap();
        let processor = Arc::new(MessageProcessor::new(
            runtime,
            StoreAndForwardConfig::default(),
        ));

        let request = Request::builder()
            .method("POST")
            .uri(TRIGGER_ROUTE)
            .header("Content-Type", "application/json")
            .body(Body::from(r#"{"host":"nope"}"#))
            .unwrap();

        let response = router_with(processor).oneshot(request).await.unwrap();
        assert_eq!(response.status(), StatusCode::UNPROCESSABLE_ENTITY);
    }

    #[tokio::test]
    async fn success_without_response_payload_is_an_empty_200() {
        let runtime = Arc::new(PipelineRuntime::new("http-test", TargetType::Event));
        let processor = Arc::new(MessageProcessor::new(
            runtime,
            StoreAndForwardConfig::default(),
        ));

        let request = Request::builder()
            .method("POST")
            .uri(TRIGGER_ROUTE)
            .header("Content-Type", "application/json")
            .body(Body::from(event_payload()))
            .unwrap();

        let response = router_with(processor).oneshot(request).await.unwrap();
        assert_eq!(response.status(), StatusCode::OK);
        let body = axum::body::to_bytes(response.into_body(), usize::MAX)
            .await
            .unwrap();
        assert!(body.is_empty());
    }
}
