use async_trait::async_trait;
use tracing::debug;

use edgeflow_domain::{
    AppFunction, Context, Flow, FunctionResult, PipelineValue, StageError, CONTENT_TYPE_JSON,
};

use crate::util::coerce_type;

/// Exports the incoming value with an HTTP POST.
///
/// A 2xx response continues the pipeline with the response body; any
/// failure is a stage error. With `persist_on_error` the export bytes
/// are placed in the context retry slot first, so an enabled
/// store-and-forward engine persists the item for a later retry.
pub struct HttpSender {
    url: String,
    mime_type: String,
    persist_on_error: bool,
    client: reqwest::Client,
}

impl HttpSender {
    pub fn new(url: impl Into<String>, mime_type: impl Into<String>, persist_on_error: bool) -> Self {
        let mime_type = mime_type.into();
        Self {
            url: url.into(),
            mime_type: if mime_type.is_empty() {
                CONTENT_TYPE_JSON.to_string()
            } else {
                mime_type
            },
            persist_on_error,
            client: reqwest::Client::new(),
        }
    }
}

#[async_trait]
impl AppFunction for HttpSender {
    fn id(&self) -> &str {
        "http-post"
    }

    async fn execute(&self, ctx: &mut Context, input: Option<PipelineValue>) -> FunctionResult {
        let data = coerce_type(self.id(), input.as_ref())?;

        debug!(
            url = %self.url,
            bytes = data.len(),
            correlation_id = %ctx.correlation_id,
            "posting data"
        );

        let result = self
            .client
            .post(&self.url)
            .header("Content-Type", &self.mime_type)
            .body(data.clone())
            .send()
            .await;

        let response = match result {
            Ok(response) => response,
            Err(err) => {
                if self.persist_on_error {
                    ctx.set_retry_data(data);
                }
                return Err(StageError::Export(format!(
                    "failed to send data to '{}': {err}",
                    self.url
                )));
            }
        };

        let status = response.status();
        if !status.is_success() {
            if self.persist_on_error {
                ctx.set_retry_data(data);
            }
            return Err(StageError::Export(format!(
                "export to '{}' returned status {status}",
                self.url
            )));
        }

        let body = response.bytes().await.map_err(|err| {
            StageError::Export(format!("failed to read export response body: {err}"))
        })?;

        debug!(
            status = %status,
            correlation_id = %ctx.correlation_id,
            "data exported"
        );
        Ok(Flow::Continue(Some(PipelineValue::Bytes(body.to_vec()))))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    use axum::http::StatusCode;
    use axum::routing::post;
    use axum::Router;

    use edgeflow_domain::StoreAndForwardConfig;

    fn ctx() -> Context {
        Context::new("corr", "application/json", StoreAndForwardConfig::default())
    }

    async fn serve(status: StatusCode, body: &'static str) -> String {
        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let address = listener.local_addr().unwrap();
        let app = Router::new().route("/export", post(move || async move { (status, body) }));
        tokio::spawn(async move {
            axum::serve(listener, app).await.unwrap();
        });
        format!("http://{address}/export")
    }

    #[tokio::test]
    async fn successful_post_continues_with_the_response_body() {
        let url = serve(StatusCode::OK, "ACK").await;
        let sender = HttpSender::new(url, "", true);

        let mut ctx = ctx();
        let result = sender
            .execute(&mut ctx, Some(PipelineValue::Text("data".to_string())))
            .await
            .unwrap();

        assert_eq!(result, Flow::Continue(Some(PipelineValue::Bytes(b"ACK".to_vec()))));
        assert!(ctx.retry_data.is_none(), "success must not arm the retry slot");
    }

    #[tokio::test]
    async fn non_2xx_response_fails_and_arms_the_retry_slot() {
        let url = serve(StatusCode::INTERNAL_SERVER_ERROR, "boom").await;
        let sender = HttpSender::new(url, "", true);

        let mut ctx = ctx();
        let err = sender
            .execute(&mut ctx, Some(PipelineValue::Text("data".to_string())))
            .await
            .unwrap_err();

        assert!(matches!(err, StageError::Export(_)));
        assert_eq!(ctx.retry_data.as_deref(), Some(b"data".as_slice()));
    }

    #[tokio::test]
    async fn connection_failure_fails_and_arms_the_retry_slot() {
        // Port 1 is never listening.
        let sender = HttpSender::new("http://127.0.0.1:1/export", "", true);

        let mut ctx = ctx();
        let err = sender
            .execute(&mut ctx, Some(PipelineValue::Text("data".to_string())))
            .await
            .unwrap_err();

        assert!(matches!(err, StageError::Export(_)));
        assert_eq!(ctx.retry_data.as_deref(), Some(b"data".as_slice()));
    }

    #[tokio::test]
    async fn retry_slot_stays_empty_without_persist_on_error() {
        let sender = HttpSender::new("http://127.0.0.1:1/export", "", false);

        let mut ctx = ctx();
        sender
            .execute(&mut ctx, Some(PipelineValue::Text("data".to_string())))
            .await
            .unwrap_err();

        assert!(ctx.retry_data.is_none());
    }
}
