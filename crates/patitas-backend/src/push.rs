use std::future::Future;
use std::time::Duration;

use serde_json::Value;
use tracing::trace;

use patitas_types::error::BackendError;

/// Push-notification dispatch. The endpoint accepts a recipient token plus
/// title/body/payload; delivery past that point is the provider's problem.
pub trait PushGateway: Clone + Send + Sync + 'static {
    fn dispatch(
        &self,
        token: &str,
        title: &str,
        body: &str,
        payload: Value,
    ) -> impl Future<Output = Result<(), BackendError>> + Send;
}

/// HTTP gateway posting to an Expo-style push endpoint.
#[derive(Clone)]
pub struct HttpPushGateway {
    client: reqwest::Client,
    endpoint: String,
}

impl HttpPushGateway {
    pub fn new(endpoint: impl Into<String>) -> Result<Self, BackendError> {
        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(10))
            .build()
            .map_err(|e| BackendError::Unavailable(format!("push client: {e}")))?;

        Ok(Self {
            client,
            endpoint: endpoint.into(),
        })
    }
}

impl PushGateway for HttpPushGateway {
    async fn dispatch(
        &self,
        token: &str,
        title: &str,
        body: &str,
        payload: Value,
    ) -> Result<(), BackendError> {
        let resp = self
            .client
            .post(&self.endpoint)
            .json(&serde_json::json!({
                "to": token,
                "title": title,
                "body": body,
                "data": payload,
            }))
            .send()
            .await
            .map_err(|e| BackendError::Unavailable(format!("push dispatch: {e}")))?;

        if !resp.status().is_success() {
            return Err(BackendError::Unavailable(format!(
                "push dispatch failed: HTTP {}",
                resp.status()
            )));
        }

        Ok(())
    }
}

/// Gateway that drops every dispatch. Used in tests and when no push
/// endpoint is configured.
#[derive(Clone, Default)]
pub struct NoopPushGateway;

impl PushGateway for NoopPushGateway {
    async fn dispatch(
        &self,
        token: &str,
        title: &str,
        _body: &str,
        _payload: Value,
    ) -> Result<(), BackendError> {
        trace!("dropping push notification '{}' for token {}", title, token);
        Ok(())
    }
}
