//! Orphan cleanup: delete storage folders whose owner no longer exists.

use crate::{
    context::AppContext,
    services::{
        document_store::DocumentError,
        object_store::{ListParams, StoreError, list_all_objects},
    },
};
use futures::future::join_all;
use serde::Serialize;
use std::collections::{BTreeSet, HashSet};
use thiserror::Error;
use tracing::{error, info, warn};

const FOLDER_DELIMITER: &str = "/";

#[derive(Debug, Default, Clone, Serialize, PartialEq, Eq)]
pub struct CleanupReport {
    /// Ids of folders found without an owner.
    pub orphaned_folders: Vec<String>,
    pub deleted_objects: usize,
    pub failed_deletes: usize,
}

#[derive(Debug, Error)]
pub enum CleanupError {
    #[error("loading owner ids failed: {0}")]
    Owners(#[from] DocumentError),
    #[error("listing folders failed: {0}")]
    Listing(#[from] StoreError),
}

/// Folder id of a common prefix: the root and the trailing delimiter stripped.
pub fn folder_id<'a>(prefix: &'a str, root: &str) -> &'a str {
    let rest = prefix.strip_prefix(root).unwrap_or(prefix);
    rest.strip_suffix(FOLDER_DELIMITER).unwrap_or(rest)
}

/// Folder ids that are non-empty and missing from `owners`.
pub fn orphaned<'a, I>(folders: I, owners: &HashSet<String>) -> Vec<String>
where
    I: IntoIterator<Item = &'a str>,
{
    folders
        .into_iter()
        .filter(|id| !id.is_empty() && !owners.contains(*id))
        .map(str::to_string)
        .collect()
}

/// Delete every folder under the configured root that has no matching owner document.
///
/// Objects inside one folder are deleted concurrently. A failed delete is
/// logged and counted; the folder stays orphaned, so the next run finishes it.
pub async fn cleanup_orphaned_folders(ctx: &AppContext) -> Result<CleanupReport, CleanupError> {
    let cfg = &ctx.config;
    let owners = ctx
        .documents
        .list_document_ids(&cfg.owners_collection)
        .await?;
    info!(
        "loaded {} owner ids from `{}`",
        owners.len(),
        cfg.owners_collection
    );
    if owners.is_empty() {
        warn!(
            "collection `{}` is empty; every folder under `{}` is treated as orphaned",
            cfg.owners_collection, cfg.folders_root
        );
    }

    let prefixes = list_folder_prefixes(ctx).await?;
    let folder_ids = prefixes.iter().map(|p| folder_id(p, &cfg.folders_root));
    let orphans = orphaned(folder_ids, &owners);

    let mut report = CleanupReport::default();
    for id in orphans {
        let folder_prefix = format!("{}{}{}", cfg.folders_root, id, FOLDER_DELIMITER);
        info!("deleting orphaned folder {}", folder_prefix);

        let objects =
            list_all_objects(ctx.store.as_ref(), &cfg.bucket, Some(&folder_prefix), cfg.list_page_size)
                .await?;
        let results = join_all(
            objects
                .iter()
                .map(|object| ctx.store.delete(&cfg.bucket, &object.key)),
        )
        .await;

        for (object, result) in objects.iter().zip(results) {
            match result {
                Ok(()) => report.deleted_objects += 1,
                Err(err) => {
                    report.failed_deletes += 1;
                    error!(key = %object.key, error = %err, "failed to delete orphaned object");
                }
            }
        }
        report.orphaned_folders.push(id);
    }

    info!(
        folders = report.orphaned_folders.len(),
        deleted = report.deleted_objects,
        failed = report.failed_deletes,
        "orphaned folder cleanup finished"
    );
    Ok(report)
}

/// All common prefixes directly under the folders root, across every page.
async fn list_folder_prefixes(ctx: &AppContext) -> Result<BTreeSet<String>, StoreError> {
    let cfg = &ctx.config;
    let mut params = ListParams {
        prefix: Some(cfg.folders_root.clone()),
        delimiter: Some(FOLDER_DELIMITER.to_string()),
        max_keys: cfg.list_page_size,
        ..ListParams::default()
    };
    let mut prefixes = BTreeSet::new();
    loop {
        let page = ctx.store.list(&cfg.bucket, params.clone()).await?;
        prefixes.extend(page.common_prefixes);
        match page.next_continuation_token {
            Some(token) => params.continuation_token = Some(token),
            None => return Ok(prefixes),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{
        config::AppConfig,
        services::memory::{MemoryDocumentStore, MemoryMessenger, MemoryObjectStore},
    };
    use std::sync::Arc;

    fn context(store: Arc<MemoryObjectStore>, docs: Arc<MemoryDocumentStore>) -> AppContext {
        AppContext::new(
            store,
            docs,
            Arc::new(MemoryMessenger::new()),
            AppConfig {
                bucket: "media".into(),
                list_page_size: 2,
                ..AppConfig::default()
            },
        )
    }

    fn seed(store: &MemoryObjectStore) {
        for key in [
            "users/A/1.jpg",
            "users/A/thumb_1.jpg",
            "users/B/1.jpg",
            "users/B/2.jpg",
            "users/B/nested/3.jpg",
            "users/C/1.jpg",
            "users/D/1.jpg",
            "users/loose.txt",
            "other/B/1.jpg",
        ] {
            store.insert("media", key, &b"x"[..], Some("image/jpeg"));
        }
    }

    #[test]
    fn folder_id_strips_root_and_delimiter() {
        assert_eq!(folder_id("users/alice/", "users/"), "alice");
        assert_eq!(folder_id("users//", "users/"), "");
        assert_eq!(folder_id("alice/", ""), "alice");
    }

    #[test]
    fn empty_ids_are_never_orphans() {
        let owners = HashSet::from(["a".to_string()]);
        assert_eq!(orphaned(["a", "", "b"], &owners), vec!["b".to_string()]);
    }

    #[tokio::test]
    async fn deletes_exactly_the_unowned_folders() {
        let store = Arc::new(MemoryObjectStore::new());
        seed(&store);
        let docs = Arc::new(MemoryDocumentStore::with_documents("users", ["A", "C"]));

        let report = cleanup_orphaned_folders(&context(store.clone(), docs))
            .await
            .unwrap();

        assert_eq!(report.orphaned_folders, vec!["B".to_string(), "D".to_string()]);
        assert_eq!(report.deleted_objects, 4);
        assert_eq!(
            store.keys("media"),
            vec![
                "other/B/1.jpg",
                "users/A/1.jpg",
                "users/A/thumb_1.jpg",
                "users/C/1.jpg",
                "users/loose.txt",
            ]
        );
    }

    #[tokio::test]
    async fn failed_deletes_leave_the_folder_orphaned() {
        let store = Arc::new(MemoryObjectStore::new());
        seed(&store);
        store.fail_key("users/B/2.jpg");
        let docs = Arc::new(MemoryDocumentStore::with_documents("users", ["A", "C", "D"]));
        let ctx = context(store.clone(), docs);

        let report = cleanup_orphaned_folders(&ctx).await.unwrap();
        assert_eq!(report.failed_deletes, 1);
        assert!(store.get("media", "users/B/2.jpg").is_some());
        assert!(store.get("media", "users/B/1.jpg").is_none());

        let rerun = cleanup_orphaned_folders(&ctx).await.unwrap();
        assert_eq!(rerun.orphaned_folders, vec!["B".to_string()]);
        assert_eq!(rerun.failed_deletes, 1);
    }

    #[tokio::test]
    async fn owner_lookup_failure_is_an_error() {
        let store = Arc::new(MemoryObjectStore::new());
        seed(&store);
        let docs = Arc::new(MemoryDocumentStore::new());
        docs.set_unavailable(true);

        let err = cleanup_orphaned_folders(&context(store.clone(), docs))
            .await
            .unwrap_err();
        assert!(matches!(err, CleanupError::Owners(_)));
        assert_eq!(store.keys("media").len(), 9);
    }
}
