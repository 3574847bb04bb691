//! The `Messenger` collaborator and an HTTP push-gateway client.

use crate::models::notification::PushMessage;
use async_trait::async_trait;
use serde::Deserialize;
use serde_json::json;
use std::time::Duration;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum MessagingError {
    /// The provider rejected the message (invalid or expired token, quota, ...).
    #[error("provider rejected message ({status}): {message}")]
    Provider { status: u16, message: String },
    #[error("provider response missing delivery id")]
    MissingDeliveryId,
    #[error(transparent)]
    Http(#[from] reqwest::Error),
}

/// Push delivery as consumed by the handlers.
#[async_trait]
pub trait Messenger: Send + Sync {
    /// Send one message. Returns the provider's delivery id.
    async fn send(&self, message: &PushMessage) -> Result<String, MessagingError>;
}

/// Posts FCM-v1 shaped messages to a push gateway.
///
/// Request body: `{"message": {"token", "notification": {"title", "body"}, "data"}}`.
/// A 2xx reply carries `{"name": "<delivery id>"}`.
#[derive(Clone)]
pub struct HttpMessenger {
    client: reqwest::Client,
    endpoint: String,
    api_key: Option<String>,
}

#[derive(Deserialize)]
struct SendReply {
    name: Option<String>,
}

impl HttpMessenger {
    pub fn new(endpoint: impl Into<String>, api_key: Option<String>) -> Result<Self, MessagingError> {
        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(30))
            .build()?;
        Ok(Self {
            client,
            endpoint: endpoint.into(),
            api_key,
        })
    }
}

#[async_trait]
impl Messenger for HttpMessenger {
    async fn send(&self, message: &PushMessage) -> Result<String, MessagingError> {
        let body = json!({
            "message": {
                "token": message.token,
                "notification": {
                    "title": message.title,
                    "body": message.body,
                },
                "data": message.data,
            }
        });

        let mut request = self.client.post(&self.endpoint).json(&body);
        if let Some(key) = &self.api_key {
            request = request.bearer_auth(key);
        }

        let response = request.send().await?;
        let status = response.status();
        if !status.is_success() {
            let message = response.text().await.unwrap_or_default();
            return Err(MessagingError::Provider {
                status: status.as_u16(),
                message,
            });
        }

        let reply: SendReply = response.json().await?;
        reply.name.ok_or(MessagingError::MissingDeliveryId)
    }
}
