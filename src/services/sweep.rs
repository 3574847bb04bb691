//! Batch sweep: derive compressed originals and thumbnails for a whole bucket.

use crate::{
    context::AppContext,
    models::derivation::{DerivationOutcome, DerivationRequest},
    services::{
        object_store::{ListParams, StoreError},
        pipeline::derive_and_publish,
    },
};
use futures::{StreamExt, stream};
use serde::Serialize;
use thiserror::Error;
use tracing::{info, warn};

#[derive(Debug, Default, Clone, Copy, Serialize, PartialEq, Eq)]
pub struct SweepReport {
    pub processed: usize,
    pub skipped: usize,
    pub failed: usize,
}

#[derive(Debug, Error)]
pub enum SweepError {
    #[error("listing bucket `{bucket}` failed: {source}")]
    Listing {
        bucket: String,
        #[source]
        source: StoreError,
    },
}

/// Walk every object under `prefix` in the configured bucket, page by page,
/// replacing each eligible image with its compressed form and adding a
/// thumbnail next to it.
///
/// Per-object failures are logged and counted; only a listing failure aborts
/// the sweep. At most `sweep_concurrency` objects are in flight.
pub async fn sweep_bucket(ctx: &AppContext, prefix: Option<&str>) -> Result<SweepReport, SweepError> {
    let cfg = &ctx.config;
    let mut params = ListParams {
        prefix: prefix.map(str::to_string),
        max_keys: cfg.list_page_size,
        ..ListParams::default()
    };
    let mut report = SweepReport::default();

    loop {
        let page = ctx
            .store
            .list(&cfg.bucket, params.clone())
            .await
            .map_err(|source| SweepError::Listing {
                bucket: cfg.bucket.clone(),
                source,
            })?;

        let outcomes: Vec<DerivationOutcome> = stream::iter(page.objects)
            .map(|object| async move {
                derive_and_publish(
                    ctx.store.as_ref(),
                    &ctx.config.scratch_dir,
                    &DerivationRequest::compress_and_thumbnail(object),
                )
                .await
            })
            .buffer_unordered(cfg.sweep_concurrency.max(1))
            .collect()
            .await;

        for outcome in outcomes {
            match outcome {
                DerivationOutcome::Published { artifacts } => {
                    report.processed += 1;
                    if let Some(first) = artifacts.first() {
                        info!("compressed image and thumbnail published for {}", first.key);
                    }
                }
                DerivationOutcome::Skipped { reason } => {
                    report.skipped += 1;
                    info!(?reason, "skipping object during sweep");
                }
                DerivationOutcome::Failed { key, reason } => {
                    report.failed += 1;
                    warn!(key = %key, "sweep continues after failure: {}", reason);
                }
            }
        }

        match page.next_continuation_token {
            Some(token) => params.continuation_token = Some(token),
            None => break,
        }
    }

    info!(
        processed = report.processed,
        skipped = report.skipped,
        failed = report.failed,
        "batch sweep finished"
    );
    Ok(report)
}
