//! Push notification payloads.

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// Callable input for `sendNotificationTo`.
#[derive(Debug, Clone, Deserialize)]
pub struct NotificationRequest {
    /// Device registration token of the recipient.
    pub receiver: String,
    pub message: String,
    pub title: String,
    #[serde(rename = "type")]
    pub kind: Option<String>,
    pub route: Option<String>,
}

/// Message handed to the messaging service.
#[derive(Debug, Clone, Serialize, PartialEq, Eq)]
pub struct PushMessage {
    pub token: String,
    pub title: String,
    pub body: String,
    pub data: BTreeMap<String, String>,
}

impl From<NotificationRequest> for PushMessage {
    fn from(req: NotificationRequest) -> Self {
        let mut data = BTreeMap::new();
        if let Some(kind) = req.kind {
            data.insert("type".to_string(), kind);
        }
        if let Some(route) = req.route {
            data.insert("route".to_string(), route);
        }
        Self {
            token: req.receiver,
            title: req.title,
            body: req.message,
            data,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn optional_metadata_lands_in_data() {
        let req: NotificationRequest = serde_json::from_value(serde_json::json!({
            "receiver": "tok",
            "message": "hello",
            "title": "Hi",
            "type": "chat",
        }))
        .unwrap();
        let msg = PushMessage::from(req);
        assert_eq!(msg.token, "tok");
        assert_eq!(msg.body, "hello");
        assert_eq!(msg.data.get("type").map(String::as_str), Some("chat"));
        assert!(!msg.data.contains_key("route"));
    }
}
