//! Callable triggers: request body `{"data": ...}`, reply `{"result": ...}`
//! or the callable error envelope.

use crate::{
    context::AppContext,
    errors::CallableError,
    models::notification::NotificationRequest,
    services::notify,
};
use axum::{
    Json,
    extract::{State, rejection::JsonRejection},
};
use serde::Deserialize;
use serde_json::{Value, json};

#[derive(Debug, Deserialize)]
pub struct CallableRequest<T> {
    pub data: T,
}

/// `POST /sendNotificationTo`
pub async fn send_notification_to(
    State(ctx): State<AppContext>,
    payload: Result<Json<CallableRequest<NotificationRequest>>, JsonRejection>,
) -> Result<Json<Value>, CallableError> {
    let Json(CallableRequest { data }) =
        payload.map_err(|rejection| CallableError::invalid_argument(rejection.body_text()))?;

    let delivery_id = notify::dispatch(ctx.messenger.as_ref(), data)
        .await
        .map_err(|err| CallableError::internal(err.to_string()))?;

    Ok(Json(json!({ "result": delivery_id })))
}
