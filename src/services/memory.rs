//! In-memory collaborators for tests and local experiments.
//!
//! Each fake keeps its state behind a `parking_lot::Mutex` and supports
//! failure injection so handler error paths can be exercised without a live
//! backend.

use crate::{
    models::{notification::PushMessage, object::ObjectReference},
    services::{
        document_store::{DocumentError, DocumentStore},
        messenger::{MessagingError, Messenger},
        object_store::{
            ListPage, ListParams, ObjectStore, StoreError, StoreResult, compute_common_prefix,
        },
    },
};
use async_trait::async_trait;
use bytes::Bytes;
use parking_lot::Mutex;
use std::{
    collections::{BTreeMap, BTreeSet, HashMap, HashSet},
    path::Path,
    sync::atomic::{AtomicBool, AtomicUsize, Ordering},
};

#[derive(Clone, Debug)]
struct MemoryObject {
    body: Bytes,
    content_type: Option<String>,
}

/// Object store holding payloads in a sorted map keyed by `(bucket, key)`.
#[derive(Default)]
pub struct MemoryObjectStore {
    objects: Mutex<BTreeMap<(String, String), MemoryObject>>,
    failing_keys: Mutex<HashSet<String>>,
    fail_listing: AtomicBool,
    calls: AtomicUsize,
}

impl MemoryObjectStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Seed an object without counting it as a call.
    pub fn insert(
        &self,
        bucket: &str,
        key: &str,
        body: impl Into<Bytes>,
        content_type: Option<&str>,
    ) {
        self.objects.lock().insert(
            (bucket.to_string(), key.to_string()),
            MemoryObject {
                body: body.into(),
                content_type: content_type.map(str::to_string),
            },
        );
    }

    pub fn get(&self, bucket: &str, key: &str) -> Option<Bytes> {
        self.objects
            .lock()
            .get(&(bucket.to_string(), key.to_string()))
            .map(|obj| obj.body.clone())
    }

    pub fn content_type(&self, bucket: &str, key: &str) -> Option<String> {
        self.objects
            .lock()
            .get(&(bucket.to_string(), key.to_string()))
            .and_then(|obj| obj.content_type.clone())
    }

    /// Every key in `bucket`, sorted.
    pub fn keys(&self, bucket: &str) -> Vec<String> {
        self.objects
            .lock()
            .keys()
            .filter(|(b, _)| b == bucket)
            .map(|(_, k)| k.clone())
            .collect()
    }

    /// Make every download, upload and delete touching `key` fail.
    pub fn fail_key(&self, key: &str) {
        self.failing_keys.lock().insert(key.to_string());
    }

    pub fn fail_listing(&self, fail: bool) {
        self.fail_listing.store(fail, Ordering::SeqCst);
    }

    /// Number of trait calls made so far.
    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }

    fn record_call(&self, key: Option<&str>) -> StoreResult<()> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        match key {
            Some(key) if self.failing_keys.lock().contains(key) => Err(StoreError::Unavailable(
                format!("injected failure for `{}`", key),
            )),
            _ => Ok(()),
        }
    }
}

#[async_trait]
impl ObjectStore for MemoryObjectStore {
    async fn download(&self, bucket: &str, key: &str, destination: &Path) -> StoreResult<()> {
        self.record_call(Some(key))?;
        let body = self.get(bucket, key).ok_or_else(|| StoreError::ObjectNotFound {
            bucket: bucket.to_string(),
            key: key.to_string(),
        })?;
        tokio::fs::write(destination, &body).await?;
        Ok(())
    }

    async fn upload(
        &self,
        source: &Path,
        bucket: &str,
        key: &str,
        content_type: &str,
    ) -> StoreResult<ObjectReference> {
        self.record_call(Some(key))?;
        let body = tokio::fs::read(source).await?;
        let size = body.len() as u64;
        self.insert(bucket, key, body, Some(content_type));
        Ok(ObjectReference::new(
            bucket,
            key,
            Some(content_type.to_string()),
            size,
        ))
    }

    async fn list(&self, bucket: &str, params: ListParams) -> StoreResult<ListPage> {
        self.record_call(None)?;
        if self.fail_listing.load(Ordering::SeqCst) {
            return Err(StoreError::Unavailable("injected listing failure".into()));
        }

        let page_size = params.page_size();
        let objects = self.objects.lock();
        let mut matching = objects
            .iter()
            .filter(|((b, _), _)| b == bucket)
            .filter(|((_, k), _)| {
                params
                    .prefix
                    .as_deref()
                    .is_none_or(|prefix| k.starts_with(prefix))
            })
            .filter(|((_, k), _)| {
                params
                    .continuation_token
                    .as_deref()
                    .is_none_or(|token| k.as_str() > token)
            })
            .take(page_size + 1)
            .map(|((_, k), obj)| ObjectReference {
                bucket: bucket.to_string(),
                key: k.clone(),
                content_type: obj.content_type.clone(),
                size_bytes: obj.body.len() as u64,
            })
            .collect::<Vec<_>>();

        let mut next_continuation_token = None;
        if matching.len() > page_size {
            matching.pop();
            next_continuation_token = matching.last().map(|obj| obj.key.clone());
        }

        let mut page = ListPage {
            next_continuation_token,
            ..ListPage::default()
        };
        let mut prefixes = BTreeSet::new();
        for obj in matching {
            if let Some(delim) = &params.delimiter {
                if let Some(prefix) =
                    compute_common_prefix(&obj.key, params.prefix.as_deref(), delim)
                {
                    prefixes.insert(prefix);
                    continue;
                }
            }
            page.objects.push(obj);
        }
        page.common_prefixes = prefixes.into_iter().collect();
        Ok(page)
    }

    async fn delete(&self, bucket: &str, key: &str) -> StoreResult<()> {
        self.record_call(Some(key))?;
        self.objects
            .lock()
            .remove(&(bucket.to_string(), key.to_string()))
            .map(|_| ())
            .ok_or_else(|| StoreError::ObjectNotFound {
                bucket: bucket.to_string(),
                key: key.to_string(),
            })
    }
}

/// Document store holding id sets per collection.
#[derive(Default)]
pub struct MemoryDocumentStore {
    collections: Mutex<HashMap<String, HashSet<String>>>,
    unavailable: AtomicBool,
}

impl MemoryDocumentStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_documents<I, S>(collection: &str, ids: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        let store = Self::default();
        store
            .collections
            .lock()
            .insert(collection.to_string(), ids.into_iter().map(Into::into).collect());
        store
    }

    pub fn set_unavailable(&self, unavailable: bool) {
        self.unavailable.store(unavailable, Ordering::SeqCst);
    }
}

#[async_trait]
impl DocumentStore for MemoryDocumentStore {
    async fn list_document_ids(&self, collection: &str) -> Result<HashSet<String>, DocumentError> {
        if self.unavailable.load(Ordering::SeqCst) {
            return Err(DocumentError::Unavailable("injected failure".into()));
        }
        Ok(self
            .collections
            .lock()
            .get(collection)
            .cloned()
            .unwrap_or_default())
    }
}

/// Messenger that records sent messages and rejects configured tokens.
#[derive(Default)]
pub struct MemoryMessenger {
    sent: Mutex<Vec<PushMessage>>,
    rejected_tokens: Mutex<HashSet<String>>,
}

impl MemoryMessenger {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn reject_token(&self, token: &str) {
        self.rejected_tokens.lock().insert(token.to_string());
    }

    pub fn sent(&self) -> Vec<PushMessage> {
        self.sent.lock().clone()
    }
}

#[async_trait]
impl Messenger for MemoryMessenger {
    async fn send(&self, message: &PushMessage) -> Result<String, MessagingError> {
        if self.rejected_tokens.lock().contains(&message.token) {
            return Err(MessagingError::Provider {
                status: 404,
                message: "messaging/registration-token-not-registered".into(),
            });
        }
        let mut sent = self.sent.lock();
        sent.push(message.clone());
        Ok(format!("memory/messages/{}", sent.len()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn memory_listing_matches_delimiter_semantics() {
        let store = MemoryObjectStore::new();
        for key in ["users/a/1.jpg", "users/b/1.jpg", "users/b/2.jpg", "top.jpg"] {
            store.insert("media", key, &b"x"[..], Some("image/jpeg"));
        }

        let page = store
            .list(
                "media",
                ListParams {
                    prefix: Some("users/".into()),
                    delimiter: Some("/".into()),
                    max_keys: 10,
                    ..ListParams::default()
                },
            )
            .await
            .unwrap();
        assert_eq!(page.common_prefixes, vec!["users/a/", "users/b/"]);
        assert!(page.objects.is_empty());
        assert_eq!(store.calls(), 1);
    }

    #[tokio::test]
    async fn injected_failures_surface_as_errors() {
        let store = MemoryObjectStore::new();
        store.insert("media", "a.jpg", &b"x"[..], None);
        store.fail_key("a.jpg");
        assert!(store.delete("media", "a.jpg").await.is_err());
        assert_eq!(store.keys("media"), vec!["a.jpg"]);
    }
}
