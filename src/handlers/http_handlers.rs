//! Plain HTTP triggers: batch sweep and orphan cleanup.
//!
//! Both answer `text/plain`: 200 once the run completes (even when single
//! objects failed), 500 when the run could not proceed.

use crate::{
    context::AppContext,
    errors::AppError,
    models::event::SweepQuery,
    services::{cleanup, sweep},
};
use axum::{
    extract::{Query, State},
    http::StatusCode,
    response::IntoResponse,
};
use tracing::error;

/// `ANY /batchProcessImages?prefix=`
pub async fn batch_process_images(
    State(ctx): State<AppContext>,
    Query(query): Query<SweepQuery>,
) -> Result<impl IntoResponse, AppError> {
    match sweep::sweep_bucket(&ctx, query.prefix.as_deref()).await {
        Ok(_) => Ok((
            StatusCode::OK,
            "Batch image processing completed successfully.",
        )),
        Err(err) => {
            error!(error = %err, "error in batch processing");
            Err(AppError::internal(
                "An error occurred during batch processing.",
            ))
        }
    }
}

/// `ANY /cleanupOrphanedFolders`
pub async fn cleanup_orphaned_folders(
    State(ctx): State<AppContext>,
) -> Result<impl IntoResponse, AppError> {
    match cleanup::cleanup_orphaned_folders(&ctx).await {
        Ok(_) => Ok((StatusCode::OK, "Orphaned folders cleanup completed.")),
        Err(err) => {
            error!(error = %err, "error cleaning up orphaned folders");
            Err(AppError::internal(
                "An error occurred during orphaned folders cleanup.",
            ))
        }
    }
}
