//! Defines routes for every exposed trigger.
//!
//! ## Structure
//! - **Event triggers** (always 200, JSON summary)
//!   - `POST /generateThumbnail`: object finalized
//!   - `POST /archiveDeletedActivity`: activity document deleted
//!
//! - **HTTP triggers** (any method, `text/plain` 200/500)
//!   - `/batchProcessImages?prefix=`: compress and thumbnail a whole bucket
//!   - `/cleanupOrphanedFolders`: delete folders without an owner document
//!
//! - **Callable triggers** (callable JSON envelope)
//!   - `POST /sendNotificationTo`
//!
//! - **Probes**: `GET /healthz`, `GET /readyz`

use crate::{
    context::AppContext,
    handlers::{
        callable_handlers::send_notification_to,
        event_handlers::{archive_deleted_activity, generate_thumbnail},
        health_handlers::{healthz, readyz},
        http_handlers::{batch_process_images, cleanup_orphaned_folders},
    },
};
use axum::{
    Router,
    routing::{any, get, post},
};

/// Build the router for all triggers. State is the shared [`AppContext`].
pub fn routes() -> Router<AppContext> {
    Router::new()
        .route("/healthz", get(healthz))
        .route("/readyz", get(readyz))
        .route("/generateThumbnail", post(generate_thumbnail))
        .route("/archiveDeletedActivity", post(archive_deleted_activity))
        .route("/batchProcessImages", any(batch_process_images))
        .route("/cleanupOrphanedFolders", any(cleanup_orphaned_folders))
        .route("/sendNotificationTo", post(send_notification_to))
}
