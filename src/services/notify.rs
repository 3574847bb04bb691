//! Notification dispatch: one push message, one delivery attempt.

use crate::{
    models::notification::{NotificationRequest, PushMessage},
    services::messenger::Messenger,
};
use thiserror::Error;
use tracing::{error, info};

#[derive(Debug, Error)]
pub enum DispatchError {
    /// Delivery failed. The provider's reason is logged, not carried.
    #[error("Error sending notification")]
    Internal,
}

/// Build the push message for `request` and hand it to the messenger once.
pub async fn dispatch(
    messenger: &dyn Messenger,
    request: NotificationRequest,
) -> Result<String, DispatchError> {
    let message = PushMessage::from(request);
    match messenger.send(&message).await {
        Ok(delivery_id) => {
            info!(delivery_id = %delivery_id, "notification sent");
            Ok(delivery_id)
        }
        Err(err) => {
            error!(error = %err, "error sending notification");
            Err(DispatchError::Internal)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::services::memory::MemoryMessenger;

    fn request(token: &str) -> NotificationRequest {
        NotificationRequest {
            receiver: token.into(),
            message: "Your run was liked".into(),
            title: "New like".into(),
            kind: Some("like".into()),
            route: Some("/activities/7".into()),
        }
    }

    #[tokio::test]
    async fn sends_exactly_one_message() {
        let messenger = MemoryMessenger::new();
        let id = dispatch(&messenger, request("device-1")).await.unwrap();
        assert_eq!(id, "memory/messages/1");

        let sent = messenger.sent();
        assert_eq!(sent.len(), 1);
        assert_eq!(sent[0].title, "New like");
        assert_eq!(sent[0].data.get("route").map(String::as_str), Some("/activities/7"));
    }

    #[tokio::test]
    async fn invalid_token_becomes_generic_internal_error() {
        let messenger = MemoryMessenger::new();
        messenger.reject_token("expired");

        let err = dispatch(&messenger, request("expired")).await.unwrap_err();
        assert!(matches!(err, DispatchError::Internal));
        assert_eq!(err.to_string(), "Error sending notification");
        assert!(messenger.sent().is_empty());
    }
}
