//! The `ObjectStore` collaborator: blob download, upload, listing and delete.

use crate::models::object::ObjectReference;
use async_trait::async_trait;
use std::{io, path::Path};
use thiserror::Error;

/// Upper bound on keys returned by a single listing page.
pub const MAX_LIST_KEYS: usize = 1000;

#[derive(Debug, Error)]
pub enum StoreError {
    #[error("bucket `{0}` not found")]
    BucketNotFound(String),
    #[error("bucket `{0}` already exists")]
    BucketAlreadyExists(String),
    #[error("bucket `{name}` invalid: {reason}")]
    InvalidBucketName { name: String, reason: String },
    #[error("object `{key}` not found in bucket `{bucket}`")]
    ObjectNotFound { bucket: String, key: String },
    #[error("invalid object key `{0}`")]
    InvalidObjectKey(String),
    #[error("store unavailable: {0}")]
    Unavailable(String),
    #[error(transparent)]
    Sqlx(#[from] sqlx::Error),
    #[error(transparent)]
    Io(#[from] io::Error),
}

pub type StoreResult<T> = Result<T, StoreError>;

/// Listing parameters, following S3 ListObjectsV2 conventions.
#[derive(Clone, Debug, Default)]
pub struct ListParams {
    pub prefix: Option<String>,
    pub delimiter: Option<String>,
    /// Key after which the page starts (exclusive).
    pub continuation_token: Option<String>,
    pub max_keys: usize,
}

impl ListParams {
    #[cfg(test)]
    pub fn with_prefix(prefix: impl Into<String>, max_keys: usize) -> Self {
        Self {
            prefix: Some(prefix.into()),
            max_keys,
            ..Self::default()
        }
    }

    /// Effective page size, clamped to `1..=MAX_LIST_KEYS`.
    pub fn page_size(&self) -> usize {
        self.max_keys.clamp(1, MAX_LIST_KEYS)
    }
}

/// One page of a listing.
#[derive(Debug, Default)]
pub struct ListPage {
    pub objects: Vec<ObjectReference>,
    /// Grouped key prefixes (only when a delimiter was given), each ending with the delimiter.
    pub common_prefixes: Vec<String>,
    /// Pass back as `continuation_token` to fetch the next page.
    pub next_continuation_token: Option<String>,
}

/// Blob storage as consumed by the handlers.
#[async_trait]
pub trait ObjectStore: Send + Sync {
    /// Copy an object's payload to `destination` on local disk.
    async fn download(&self, bucket: &str, key: &str, destination: &Path) -> StoreResult<()>;

    /// Store the file at `source` under `key`, overwriting any existing object.
    async fn upload(
        &self,
        source: &Path,
        bucket: &str,
        key: &str,
        content_type: &str,
    ) -> StoreResult<ObjectReference>;

    /// List one page of objects and common prefixes.
    async fn list(&self, bucket: &str, params: ListParams) -> StoreResult<ListPage>;

    async fn delete(&self, bucket: &str, key: &str) -> StoreResult<()>;
}

/// Compute a synthetic "common prefix" for S3 list semantics.
///
/// Used only when a delimiter is provided. Returns Some(prefix) if the key
/// belongs to a grouped prefix, otherwise None.
pub(crate) fn compute_common_prefix(
    key: &str,
    requested_prefix: Option<&str>,
    delimiter: &str,
) -> Option<String> {
    let after_prefix = match requested_prefix {
        Some(prefix) => key.strip_prefix(prefix)?,
        None => key,
    };

    let pos = after_prefix.find(delimiter)?;
    let mut combined = String::new();
    if let Some(prefix) = requested_prefix {
        combined.push_str(prefix);
    }
    combined.push_str(&after_prefix[..pos + delimiter.len()]);
    Some(combined)
}

/// Collect every object under `prefix`, following continuation tokens.
pub async fn list_all_objects(
    store: &dyn ObjectStore,
    bucket: &str,
    prefix: Option<&str>,
    page_size: usize,
) -> StoreResult<Vec<ObjectReference>> {
    let mut params = ListParams {
        prefix: prefix.map(str::to_string),
        max_keys: page_size,
        ..ListParams::default()
    };
    let mut objects = Vec::new();
    loop {
        let page = store.list(bucket, params.clone()).await?;
        objects.extend(page.objects);
        match page.next_continuation_token {
            Some(token) => params.continuation_token = Some(token),
            None => return Ok(objects),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn common_prefix_groups_first_segment_after_prefix() {
        assert_eq!(
            compute_common_prefix("users/a/x.jpg", Some("users/"), "/"),
            Some("users/a/".to_string())
        );
        assert_eq!(compute_common_prefix("users/x.jpg", Some("users/"), "/"), None);
        assert_eq!(compute_common_prefix("other/x.jpg", Some("users/"), "/"), None);
        assert_eq!(
            compute_common_prefix("a/b/c", None, "/"),
            Some("a/".to_string())
        );
    }

    #[test]
    fn page_size_is_clamped() {
        assert_eq!(ListParams::default().page_size(), 1);
        let params = ListParams::with_prefix("x", 50_000);
        assert_eq!(params.page_size(), MAX_LIST_KEYS);
    }
}
