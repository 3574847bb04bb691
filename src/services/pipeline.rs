//! The image derivation pipeline: eligibility → fetch → transform → publish → cleanup.

use crate::{
    models::{
        derivation::{
            DERIVED_CONTENT_TYPE, DerivationOutcome, DerivationRequest, DerivedArtifact,
            SkipReason, THUMBNAIL_PREFIX,
        },
        object::ObjectReference,
    },
    services::{
        imaging::{self, ImagingError},
        object_store::{ObjectStore, StoreError},
        scratch::ScratchSpace,
    },
};
use std::{io, path::Path};
use thiserror::Error;
use tracing::{debug, error, info};

/// Still-image MIME types the pipeline accepts.
const STILL_IMAGE_TYPES: [&str; 7] = [
    "image/jpeg",
    "image/jpg",
    "image/pjpeg",
    "image/png",
    "image/webp",
    "image/bmp",
    "image/tiff",
];

#[derive(Debug, Error)]
pub enum PipelineError {
    #[error("scratch space unavailable: {0}")]
    Scratch(#[from] io::Error),
    #[error("download failed: {0}")]
    Download(#[source] StoreError),
    #[error("transform failed: {0}")]
    Transform(#[from] ImagingError),
    #[error("upload to `{key}` failed: {source}")]
    Upload {
        key: String,
        #[source]
        source: StoreError,
    },
}

/// True for recognized still-image content types. Parameters such as
/// `; charset=` are ignored, comparison is case-insensitive.
pub fn is_still_image(content_type: &str) -> bool {
    let essence = content_type.split(';').next().unwrap_or("").trim();
    STILL_IMAGE_TYPES
        .iter()
        .any(|candidate| candidate.eq_ignore_ascii_case(essence))
}

/// Guard against reprocessing generated thumbnails and non-image uploads.
pub fn check_eligibility(source: &ObjectReference) -> Result<(), SkipReason> {
    if source.basename().starts_with(THUMBNAIL_PREFIX) {
        return Err(SkipReason::AlreadyThumbnail);
    }
    match source.content_type.as_deref() {
        Some(content_type) if is_still_image(content_type) => Ok(()),
        _ => Err(SkipReason::NotAnImage),
    }
}

/// Run one derivation request end to end.
///
/// Ineligible sources return `Skipped` without touching the store. Any fetch,
/// transform or publish error is logged with the source key and returned as
/// `Failed`. The invocation's scratch directory is gone by the time this
/// returns, whatever the outcome.
pub async fn derive_and_publish(
    store: &dyn ObjectStore,
    scratch_root: &Path,
    request: &DerivationRequest,
) -> DerivationOutcome {
    let source = &request.source;
    if let Err(reason) = check_eligibility(source) {
        debug!(key = %source.key, ?reason, "skipping ineligible object");
        return DerivationOutcome::Skipped { reason };
    }

    let result = match ScratchSpace::create(scratch_root) {
        Ok(scratch) => {
            let result = run(store, &scratch, request).await;
            scratch.close();
            result
        }
        Err(err) => Err(PipelineError::Scratch(err)),
    };

    match result {
        Ok(artifacts) => DerivationOutcome::Published { artifacts },
        Err(err) => {
            error!(key = %source.key, bucket = %source.bucket, error = %err, "error processing file");
            DerivationOutcome::Failed {
                key: source.key.clone(),
                reason: err.to_string(),
            }
        }
    }
}

async fn run(
    store: &dyn ObjectStore,
    scratch: &ScratchSpace,
    request: &DerivationRequest,
) -> Result<Vec<ObjectReference>, PipelineError> {
    let source = &request.source;
    let local_source = scratch.file(source.basename());
    store
        .download(&source.bucket, &source.key, &local_source)
        .await
        .map_err(PipelineError::Download)?;
    debug!("image {} downloaded locally to {}", source.key, local_source.display());

    let artifacts: Vec<DerivedArtifact> = request
        .targets
        .iter()
        .map(|target| DerivedArtifact {
            local_path: scratch.file(&target.scratch_name(source)),
            destination: ObjectReference::new(
                source.bucket.clone(),
                target.destination_key(source),
                Some(DERIVED_CONTENT_TYPE.to_string()),
                0,
            ),
            content_type: DERIVED_CONTENT_TYPE,
        })
        .collect();

    let plan = request
        .targets
        .iter()
        .cloned()
        .zip(artifacts.iter().map(|a| a.local_path.clone()))
        .collect();
    imaging::render_targets(local_source, plan).await?;

    let mut published = Vec::with_capacity(artifacts.len());
    for (target, artifact) in request.targets.iter().zip(&artifacts) {
        let destination = &artifact.destination;
        let stored = store
            .upload(
                &artifact.local_path,
                &destination.bucket,
                &destination.key,
                artifact.content_type,
            )
            .await
            .map_err(|source| PipelineError::Upload {
                key: destination.key.clone(),
                source,
            })?;
        info!(
            key = %stored.key,
            size = stored.size_bytes,
            replaced_source = target.replaces_source(),
            "derived artifact uploaded"
        );
        published.push(stored);
    }
    Ok(published)
}
