//! Event triggers delivered by the runtime: object finalize and document delete.
//!
//! Both always answer 200. Events are redelivered until acknowledged, so a
//! deterministic failure must not turn into an endless retry loop.

use crate::{
    context::AppContext,
    models::{
        derivation::DerivationRequest,
        event::{DocumentDeletedEvent, ObjectFinalizedEvent},
        object::ObjectReference,
    },
    services::{archive, pipeline},
};
use axum::{
    Json,
    extract::{State, rejection::JsonRejection},
};
use serde_json::{Value, json};
use tracing::{error, info, warn};

/// `POST /generateThumbnail`: derive a thumbnail for a freshly uploaded object.
pub async fn generate_thumbnail(
    State(ctx): State<AppContext>,
    payload: Result<Json<ObjectFinalizedEvent>, JsonRejection>,
) -> Json<Value> {
    let Some(event) = accept_event(payload) else {
        return Json(json!({ "status": "ignored" }));
    };
    let (Some(name), Some(content_type)) = (event.name, event.content_type) else {
        info!("File path or content type is missing.");
        return Json(json!({ "status": "ignored" }));
    };

    let bucket = event.bucket.unwrap_or_else(|| ctx.config.bucket.clone());
    let source = ObjectReference::new(bucket, name, Some(content_type), event.size.unwrap_or(0));
    let outcome = pipeline::derive_and_publish(
        ctx.store.as_ref(),
        &ctx.config.scratch_dir,
        &DerivationRequest::thumbnail_only(source),
    )
    .await;

    Json(serde_json::to_value(&outcome).unwrap_or_else(|_| json!({ "status": "failed" })))
}

/// `POST /archiveDeletedActivity`: keep a JSON copy of a deleted activity document.
pub async fn archive_deleted_activity(
    State(ctx): State<AppContext>,
    payload: Result<Json<DocumentDeletedEvent>, JsonRejection>,
) -> Json<Value> {
    let Some(event) = accept_event(payload) else {
        return Json(json!({ "status": "ignored" }));
    };
    let (Some(id), Some(data)) = (event.id, event.data) else {
        error!("No data snapshot found.");
        return Json(json!({ "status": "ignored" }));
    };

    match archive::archive_document(&ctx, &id, &data).await {
        Ok(stored) => Json(json!({ "status": "archived", "key": stored.key })),
        Err(err) => {
            error!(id = %id, error = %err, "error copying deleted activity to storage");
            Json(json!({ "status": "failed" }))
        }
    }
}

/// Unwrap an event body. A body that cannot be decoded is logged and dropped;
/// redelivering it would fail the same way.
fn accept_event<T>(payload: Result<Json<T>, JsonRejection>) -> Option<T> {
    match payload {
        Ok(Json(event)) => Some(event),
        Err(rejection) => {
            warn!(status = %rejection.status(), "dropping undecodable event: {}", rejection.body_text());
            None
        }
    }
}
