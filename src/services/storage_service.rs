//! src/services/storage_service.rs
//!
//! DiskObjectStore: the local `ObjectStore` backend. SQLite holds object
//! metadata; payloads live on disk sharded beneath
//! `base_path/{bucket}/{shard}/{shard}/{key}`.

use crate::{
    models::{
        bucket::Bucket,
        object::{ObjectReference, StoredObject},
    },
    services::object_store::{
        ListPage, ListParams, ObjectStore, StoreError, StoreResult, compute_common_prefix,
    },
};
use async_trait::async_trait;
use bytes::Bytes;
use chrono::Utc;
use futures::{Stream, StreamExt, pin_mut};
use md5::Context;
use sqlx::{QueryBuilder, SqlitePool, sqlite::Sqlite};
use std::{
    collections::BTreeSet,
    io::{self, ErrorKind},
    path::{Path, PathBuf},
    sync::Arc,
};
use tokio::{
    fs::{self, File},
    io::AsyncWriteExt,
};
use tokio_util::io::ReaderStream;
use tracing::debug;
use uuid::Uuid;

const MAX_OBJECT_KEY_LEN: usize = 1024;
const BUCKET_NAME_MIN_LEN: usize = 3;
const BUCKET_NAME_MAX_LEN: usize = 63;

const OBJECT_COLUMNS: &str =
    "id, bucket, key, filename, content_type, size_bytes, etag, last_modified, is_deleted";

/// Object store backed by SQLite metadata and local disk payloads.
#[derive(Clone)]
pub struct DiskObjectStore {
    /// Shared SQLite connection pool used for metadata operations.
    pub db: Arc<SqlitePool>,

    /// Base directory on disk where object payloads are stored.
    pub base_path: PathBuf,
}

impl DiskObjectStore {
    pub fn new(db: Arc<SqlitePool>, base_path: impl Into<PathBuf>) -> Self {
        Self {
            db,
            base_path: base_path.into(),
        }
    }

    /// Basic key validation to avoid trivial path traversal vectors.
    fn ensure_key_safe(&self, key: &str) -> StoreResult<()> {
        let invalid = key.is_empty()
            || key.len() > MAX_OBJECT_KEY_LEN
            || key.starts_with('/')
            || key.contains("..")
            || key
                .bytes()
                .any(|b| b.is_ascii_control() || b == b'\\' || b == b'\0');
        if invalid {
            return Err(StoreError::InvalidObjectKey(key.to_string()));
        }
        Ok(())
    }

    /// Validate bucket name format.
    ///
    /// Enforces S3-like naming rules:
    /// - 3–63 characters
    /// - lowercase letters, digits, dots, hyphens only
    /// - cannot start/end with dot or hyphen
    /// - cannot contain consecutive dots or dot-hyphen patterns
    /// - cannot look like an IPv4 address
    fn ensure_bucket_name_safe(&self, name: &str) -> StoreResult<()> {
        let reject = |reason: &str| {
            Err(StoreError::InvalidBucketName {
                name: name.to_string(),
                reason: reason.into(),
            })
        };

        let len = name.len();
        if !(BUCKET_NAME_MIN_LEN..=BUCKET_NAME_MAX_LEN).contains(&len) {
            return reject("must be between 3 and 63 characters");
        }
        if !name
            .chars()
            .all(|c| matches!(c, 'a'..='z' | '0'..='9' | '.' | '-'))
        {
            return reject("allowed characters are lowercase letters, digits, dots, and hyphens");
        }
        if name.starts_with(['.', '-']) || name.ends_with(['.', '-']) {
            return reject("must start and end with a lowercase letter or digit");
        }
        if name.contains("..") || name.contains("-.") || name.contains(".-") {
            return reject("cannot contain consecutive dots or dot-hyphen combinations");
        }
        if is_ipv4_like(name) {
            return reject("must not be formatted like an IP address");
        }
        Ok(())
    }

    fn bucket_root(&self, bucket_name: &str) -> PathBuf {
        self.base_path.join(bucket_name)
    }

    /// Two-level shard directories from MD5(bucket/key), reducing file count per directory.
    fn object_shards(bucket_name: &str, key: &str) -> (String, String) {
        let digest = md5::compute(format!("{}/{}", bucket_name, key));
        (format!("{:02x}", digest[0]), format!("{:02x}", digest[1]))
    }

    /// Fully-qualified payload path. Parent directories may not exist yet.
    fn object_path(&self, bucket_name: &str, key: &str) -> PathBuf {
        let (shard_a, shard_b) = Self::object_shards(bucket_name, key);
        let mut path = self.bucket_root(bucket_name);
        path.push(shard_a);
        path.push(shard_b);
        path.push(key);
        path
    }

    async fn fetch_bucket(&self, bucket: &str) -> StoreResult<Bucket> {
        self.ensure_bucket_name_safe(bucket)?;
        sqlx::query_as::<Sqlite, Bucket>(
            "SELECT id, name, region, created_at FROM buckets WHERE name = ?",
        )
        .bind(bucket)
        .fetch_one(&*self.db)
        .await
        .map_err(|err| match err {
            sqlx::Error::RowNotFound => StoreError::BucketNotFound(bucket.to_string()),
            other => StoreError::Sqlx(other),
        })
    }

    /// Fetch a non-deleted object metadata record.
    async fn fetch_object(&self, bucket: &str, key: &str) -> StoreResult<StoredObject> {
        sqlx::query_as::<_, StoredObject>(&format!(
            "SELECT {OBJECT_COLUMNS} FROM objects WHERE bucket = ? AND key = ? AND is_deleted = 0"
        ))
        .bind(bucket)
        .bind(key)
        .fetch_one(&*self.db)
        .await
        .map_err(|err| match err {
            sqlx::Error::RowNotFound => StoreError::ObjectNotFound {
                bucket: bucket.to_string(),
                key: key.to_string(),
            },
            other => StoreError::Sqlx(other),
        })
    }

    /// Create a bucket and its directory. Returns BucketAlreadyExists on a name conflict.
    pub async fn create_bucket(&self, name: &str, region: &str) -> StoreResult<Bucket> {
        self.ensure_bucket_name_safe(name)?;
        fs::create_dir_all(self.bucket_root(name)).await?;

        let bucket = Bucket {
            id: Uuid::new_v4(),
            name: name.to_string(),
            region: region.to_lowercase(),
            created_at: Utc::now(),
        };

        match sqlx::query("INSERT INTO buckets (id, name, region, created_at) VALUES (?, ?, ?, ?)")
            .bind(bucket.id)
            .bind(&bucket.name)
            .bind(&bucket.region)
            .bind(bucket.created_at)
            .execute(&*self.db)
            .await
        {
            Ok(_) => Ok(bucket),
            Err(err) if is_unique_violation(&err) => {
                Err(StoreError::BucketAlreadyExists(name.to_string()))
            }
            Err(err) => Err(StoreError::Sqlx(err)),
        }
    }

    /// Create the bucket unless it already exists.
    pub async fn ensure_bucket(&self, name: &str, region: &str) -> StoreResult<Bucket> {
        match self.create_bucket(name, region).await {
            Err(StoreError::BucketAlreadyExists(_)) => self.fetch_bucket(name).await,
            other => other,
        }
    }

    /// Stream an object to disk and upsert its metadata.
    ///
    /// Bytes go to a temporary file first, MD5 and size are computed while
    /// streaming, the file is fsynced and renamed into place. The temporary
    /// file is removed on every error path.
    pub async fn upload_object_stream<S>(
        &self,
        bucket: &str,
        key: &str,
        content_type: Option<String>,
        stream: S,
    ) -> StoreResult<StoredObject>
    where
        S: Stream<Item = io::Result<Bytes>> + Send,
    {
        self.ensure_key_safe(key)?;
        let bucket_rec = self.fetch_bucket(bucket).await?;

        let file_path = self.object_path(&bucket_rec.name, key);
        let parent = file_path
            .parent()
            .map(Path::to_path_buf)
            .ok_or_else(|| io::Error::other("object path missing parent directory"))?;
        fs::create_dir_all(&parent).await?;
        let tmp_path = parent.join(format!(".tmp-{}", Uuid::new_v4()));

        let written = write_stream(&tmp_path, stream).await;
        let (size_bytes, etag) = match written {
            Ok(summary) => summary,
            Err(err) => {
                let _ = fs::remove_file(&tmp_path).await;
                return Err(StoreError::Io(err));
            }
        };

        if let Err(err) = fs::rename(&tmp_path, &file_path).await {
            let _ = fs::remove_file(&tmp_path).await;
            return Err(StoreError::Io(err));
        }

        let filename = key.rsplit('/').next().unwrap_or(key).to_string();
        let insert_result = sqlx::query_as::<_, StoredObject>(&format!(
            r#"
            INSERT INTO objects (
                id, bucket, key, filename, content_type, size_bytes,
                etag, last_modified, is_deleted
            ) VALUES (?, ?, ?, ?, ?, ?, ?, ?, 0)
            ON CONFLICT(bucket, key) DO UPDATE SET
                filename = excluded.filename,
                content_type = excluded.content_type,
                size_bytes = excluded.size_bytes,
                etag = excluded.etag,
                last_modified = excluded.last_modified,
                is_deleted = 0
            RETURNING {OBJECT_COLUMNS}
            "#
        ))
        .bind(Uuid::new_v4())
        .bind(&bucket_rec.name)
        .bind(key)
        .bind(&filename)
        .bind(content_type)
        .bind(size_bytes)
        .bind(&etag)
        .bind(Utc::now())
        .fetch_one(&*self.db)
        .await;

        match insert_result {
            Ok(obj) => Ok(obj),
            Err(err) => {
                let _ = fs::remove_file(&file_path).await;
                Err(StoreError::Sqlx(err))
            }
        }
    }

    /// Recursively remove empty directories up to (not including) `stop`.
    async fn prune_empty_dirs(&self, start: &Path, stop: &Path) {
        let mut current = start.to_path_buf();
        while current.starts_with(stop) && current != stop {
            match fs::remove_dir(&current).await {
                Ok(_) => match current.parent() {
                    Some(parent) => current = parent.to_path_buf(),
                    None => break,
                },
                Err(err)
                    if matches!(
                        err.kind(),
                        ErrorKind::NotFound | ErrorKind::DirectoryNotEmpty
                    ) =>
                {
                    break;
                }
                Err(err) => {
                    debug!("failed to prune directory {}: {}", current.display(), err);
                    break;
                }
            }
        }
    }
}

#[async_trait]
impl ObjectStore for DiskObjectStore {
    async fn download(&self, bucket: &str, key: &str, destination: &Path) -> StoreResult<()> {
        self.ensure_key_safe(key)?;
        let bucket_rec = self.fetch_bucket(bucket).await?;
        self.fetch_object(&bucket_rec.name, key).await?;

        let file_path = self.object_path(&bucket_rec.name, key);
        match fs::copy(&file_path, destination).await {
            Ok(_) => Ok(()),
            Err(err) if err.kind() == ErrorKind::NotFound => Err(StoreError::ObjectNotFound {
                bucket: bucket.to_string(),
                key: key.to_string(),
            }),
            Err(err) => Err(StoreError::Io(err)),
        }
    }

    async fn upload(
        &self,
        source: &Path,
        bucket: &str,
        key: &str,
        content_type: &str,
    ) -> StoreResult<ObjectReference> {
        let file = File::open(source).await?;
        let stored = self
            .upload_object_stream(
                bucket,
                key,
                Some(content_type.to_string()),
                ReaderStream::new(file),
            )
            .await?;
        Ok(stored.into())
    }

    /// List objects following S3 ListObjectsV2 rules: prefix filtering,
    /// delimiter grouping, continuation tokens, lexicographic order,
    /// soft-deleted rows excluded.
    async fn list(&self, bucket: &str, params: ListParams) -> StoreResult<ListPage> {
        let bucket_rec = self.fetch_bucket(bucket).await?;
        let page_size = params.page_size();
        let fetch_limit = page_size + 1;

        let mut builder = QueryBuilder::<Sqlite>::new(format!(
            "SELECT {OBJECT_COLUMNS} FROM objects WHERE bucket = "
        ));
        builder.push_bind(bucket_rec.name.clone());
        builder.push(" AND is_deleted = 0");

        if let Some(prefix) = &params.prefix {
            builder.push(" AND substr(key, 1, ");
            builder.push_bind(prefix.chars().count() as i64);
            builder.push(") = ");
            builder.push_bind(prefix.clone());
        }

        if let Some(token) = &params.continuation_token {
            builder.push(" AND key > ");
            builder.push_bind(token.clone());
        }

        builder.push(" ORDER BY key ASC LIMIT ");
        builder.push_bind(fetch_limit as i64);

        let mut rows: Vec<StoredObject> = builder.build_query_as().fetch_all(&*self.db).await?;

        let mut next_continuation_token = None;
        if rows.len() == fetch_limit {
            rows.pop();
            next_continuation_token = rows.last().map(|last| last.key.clone());
        }

        let mut objects = Vec::new();
        let mut common_prefixes = BTreeSet::new();
        for row in rows {
            if let Some(delim) = &params.delimiter {
                if let Some(prefix) =
                    compute_common_prefix(&row.key, params.prefix.as_deref(), delim)
                {
                    common_prefixes.insert(prefix);
                    continue;
                }
            }
            objects.push(ObjectReference::from(row));
        }

        Ok(ListPage {
            objects,
            common_prefixes: common_prefixes.into_iter().collect(),
            next_continuation_token,
        })
    }

    /// Soft-delete the metadata row, remove the payload and prune empty shard directories.
    async fn delete(&self, bucket: &str, key: &str) -> StoreResult<()> {
        self.ensure_key_safe(key)?;
        let bucket_rec = self.fetch_bucket(bucket).await?;

        let result = sqlx::query(
            "UPDATE objects SET is_deleted = 1 WHERE bucket = ? AND key = ? AND is_deleted = 0",
        )
        .bind(&bucket_rec.name)
        .bind(key)
        .execute(&*self.db)
        .await?;

        if result.rows_affected() == 0 {
            return Err(StoreError::ObjectNotFound {
                bucket: bucket.to_string(),
                key: key.to_string(),
            });
        }

        let file_path = self.object_path(&bucket_rec.name, key);
        match fs::remove_file(&file_path).await {
            Ok(_) => debug!("removed physical file {}", file_path.display()),
            Err(err) if err.kind() == ErrorKind::NotFound => {
                debug!("file {} already missing", file_path.display());
            }
            Err(err) => return Err(StoreError::Io(err)),
        }

        if let Some(parent) = file_path.parent() {
            let bucket_root = self.bucket_root(&bucket_rec.name);
            self.prune_empty_dirs(parent, &bucket_root).await;
        }

        Ok(())
    }
}

/// Write a byte stream to `path`, returning its size and MD5 hex digest.
async fn write_stream<S>(path: &Path, stream: S) -> io::Result<(i64, String)>
where
    S: Stream<Item = io::Result<Bytes>> + Send,
{
    let mut file = File::create(path).await?;
    let mut size_bytes: i64 = 0;
    let mut digest = Context::new();
    pin_mut!(stream);
    while let Some(chunk) = stream.next().await {
        let chunk = chunk?;
        size_bytes += chunk.len() as i64;
        digest.consume(&chunk);
        file.write_all(&chunk).await?;
    }
    file.flush().await?;
    file.sync_all().await?;
    Ok((size_bytes, format!("{:x}", digest.compute())))
}

fn is_unique_violation(err: &sqlx::Error) -> bool {
    matches!(
        err,
        sqlx::Error::Database(db_err) if db_err.message().to_ascii_lowercase().contains("unique")
    )
}

/// Check if a string matches IPv4-like dotted decimal form.
fn is_ipv4_like(name: &str) -> bool {
    let parts: Vec<&str> = name.split('.').collect();
    parts.len() == 4
        && parts.iter().all(|segment| {
            !segment.is_empty()
                && segment.len() <= 3
                && segment.chars().all(|c| c.is_ascii_digit())
                && segment.parse::<u8>().is_ok()
        })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db;
    use tempfile::TempDir;

    async fn store() -> (DiskObjectStore, TempDir) {
        let dir = tempfile::tempdir().unwrap();
        let pool = db::connect_in_memory().await.unwrap();
        let store = DiskObjectStore::new(Arc::new(pool), dir.path().join("objects"));
        store.ensure_bucket("media", "europe-west1").await.unwrap();
        (store, dir)
    }

    async fn put(store: &DiskObjectStore, dir: &TempDir, key: &str, body: &[u8]) {
        let src = dir.path().join("upload.bin");
        fs::write(&src, body).await.unwrap();
        store.upload(&src, "media", key, "image/jpeg").await.unwrap();
    }

    #[tokio::test]
    async fn upload_then_download_round_trips_payload() {
        let (store, dir) = store().await;
        put(&store, &dir, "users/a/cat.jpg", b"meow").await;

        let dest = dir.path().join("out.bin");
        store.download("media", "users/a/cat.jpg", &dest).await.unwrap();
        assert_eq!(fs::read(&dest).await.unwrap(), b"meow");
    }

    #[tokio::test]
    async fn overwrite_replaces_metadata() {
        let (store, dir) = store().await;
        put(&store, &dir, "cat.jpg", b"1").await;
        put(&store, &dir, "cat.jpg", b"longer").await;

        let page = store
            .list("media", ListParams::with_prefix("", 100))
            .await
            .unwrap();
        assert_eq!(page.objects.len(), 1);
        assert_eq!(page.objects[0].size_bytes, 6);
    }

    #[tokio::test]
    async fn delimiter_listing_groups_folders() {
        let (store, dir) = store().await;
        put(&store, &dir, "users/a/1.jpg", b"x").await;
        put(&store, &dir, "users/a/2.jpg", b"x").await;
        put(&store, &dir, "users/b/1.jpg", b"x").await;
        put(&store, &dir, "users/readme.txt", b"x").await;

        let params = ListParams {
            prefix: Some("users/".into()),
            delimiter: Some("/".into()),
            max_keys: 100,
            ..ListParams::default()
        };
        let page = store.list("media", params).await.unwrap();
        assert_eq!(page.common_prefixes, vec!["users/a/", "users/b/"]);
        assert_eq!(page.objects.len(), 1);
        assert_eq!(page.objects[0].key, "users/readme.txt");
    }

    #[tokio::test]
    async fn listing_pages_with_continuation_token() {
        let (store, dir) = store().await;
        for key in ["a.jpg", "b.jpg", "c.jpg"] {
            put(&store, &dir, key, b"x").await;
        }

        let first = store
            .list("media", ListParams::with_prefix("", 2))
            .await
            .unwrap();
        assert_eq!(first.objects.len(), 2);
        let token = first.next_continuation_token.clone().unwrap();

        let second = store
            .list(
                "media",
                ListParams {
                    continuation_token: Some(token),
                    max_keys: 2,
                    ..ListParams::default()
                },
            )
            .await
            .unwrap();
        assert_eq!(second.objects.len(), 1);
        assert_eq!(second.objects[0].key, "c.jpg");
        assert!(second.next_continuation_token.is_none());
    }

    #[tokio::test]
    async fn prefix_with_like_wildcards_matches_literally() {
        let (store, dir) = store().await;
        put(&store, &dir, "a_b/1.jpg", b"x").await;
        put(&store, &dir, "axb/1.jpg", b"x").await;

        let page = store
            .list("media", ListParams::with_prefix("a_b/", 100))
            .await
            .unwrap();
        assert_eq!(page.objects.len(), 1);
        assert_eq!(page.objects[0].key, "a_b/1.jpg");
    }

    #[tokio::test]
    async fn delete_removes_object_and_prunes_directories() {
        let (store, dir) = store().await;
        put(&store, &dir, "users/a/cat.jpg", b"x").await;
        let payload = store.object_path("media", "users/a/cat.jpg");
        assert!(payload.exists());

        store.delete("media", "users/a/cat.jpg").await.unwrap();
        assert!(!payload.exists());
        assert!(!payload.parent().unwrap().exists());
        assert!(store.bucket_root("media").exists());

        let err = store.delete("media", "users/a/cat.jpg").await.unwrap_err();
        assert!(matches!(err, StoreError::ObjectNotFound { .. }));
    }

    #[tokio::test]
    async fn download_of_missing_object_is_not_found() {
        let (store, dir) = store().await;
        let err = store
            .download("media", "nope.jpg", &dir.path().join("x"))
            .await
            .unwrap_err();
        assert!(matches!(err, StoreError::ObjectNotFound { .. }));
    }

    #[tokio::test]
    async fn rejects_unsafe_keys_and_bad_bucket_names() {
        let (store, dir) = store().await;
        let src = dir.path().join("f");
        fs::write(&src, b"x").await.unwrap();
        assert!(matches!(
            store.upload(&src, "media", "../escape", "image/jpeg").await,
            Err(StoreError::InvalidObjectKey(_))
        ));
        assert!(matches!(
            store.create_bucket("192.168.1.1", "local").await,
            Err(StoreError::InvalidBucketName { .. })
        ));
        assert!(matches!(
            store.create_bucket("Upper", "local").await,
            Err(StoreError::InvalidBucketName { .. })
        ));
    }

    #[tokio::test]
    async fn ensure_bucket_is_idempotent() {
        let (store, _dir) = store().await;
        let again = store.ensure_bucket("media", "europe-west1").await.unwrap();
        assert_eq!(again.name, "media");
    }
}
