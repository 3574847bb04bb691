//! Archive snapshots of deleted documents into the object store.

use crate::{
    context::AppContext,
    models::object::ObjectReference,
    services::{object_store::StoreError, scratch::ScratchSpace},
};
use serde_json::Value;
use std::io;
use thiserror::Error;
use tracing::info;

/// Folder receiving archived activity documents.
pub const ARCHIVE_FOLDER: &str = "deletedActivities";

#[derive(Debug, Error)]
pub enum ArchiveError {
    #[error("invalid document id `{0}`")]
    InvalidId(String),
    #[error("serializing document failed: {0}")]
    Serialize(#[from] serde_json::Error),
    #[error(transparent)]
    Io(#[from] io::Error),
    #[error(transparent)]
    Store(#[from] StoreError),
}

/// Write `data` as `deletedActivities/<id>.json` in the configured bucket.
pub async fn archive_document(
    ctx: &AppContext,
    id: &str,
    data: &Value,
) -> Result<ObjectReference, ArchiveError> {
    if id.is_empty() || id.contains('/') || id.contains("..") {
        return Err(ArchiveError::InvalidId(id.to_string()));
    }

    let file_name = format!("{}.json", id);
    let scratch = ScratchSpace::create(&ctx.config.scratch_dir)?;
    let local = scratch.file(&file_name);
    tokio::fs::write(&local, serde_json::to_vec(data)?).await?;

    let key = format!("{}/{}", ARCHIVE_FOLDER, file_name);
    let stored = ctx
        .store
        .upload(&local, &ctx.config.bucket, &key, "application/json")
        .await;
    scratch.close();

    let stored = stored?;
    info!("deleted activity copied to {}", stored.key);
    Ok(stored)
}
