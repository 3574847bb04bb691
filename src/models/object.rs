//! Represents an object (blob) stored in a bucket.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sqlx::FromRow;
use uuid::Uuid;

/// Identifies a stored blob together with the metadata the handlers act on.
///
/// A reference is a value: it describes the object as seen when an event fired
/// or a listing was taken. The blob behind it may be replaced or removed
/// independently.
#[derive(Serialize, Deserialize, Clone, Debug, PartialEq, Eq)]
pub struct ObjectReference {
    /// Bucket holding the object.
    pub bucket: String,

    /// Slash-delimited object key (e.g. `users/42/avatar.jpg`).
    pub key: String,

    /// MIME type recorded for the object, if any.
    pub content_type: Option<String>,

    /// Size in bytes.
    pub size_bytes: u64,
}

impl ObjectReference {
    pub fn new(
        bucket: impl Into<String>,
        key: impl Into<String>,
        content_type: Option<String>,
        size_bytes: u64,
    ) -> Self {
        Self {
            bucket: bucket.into(),
            key: key.into(),
            content_type,
            size_bytes,
        }
    }

    /// Last path segment of the key.
    pub fn basename(&self) -> &str {
        self.key.rsplit('/').next().unwrap_or(&self.key)
    }

    /// Everything before the last `/`, or an empty string for top-level keys.
    pub fn dirname(&self) -> &str {
        match self.key.rfind('/') {
            Some(pos) => &self.key[..pos],
            None => "",
        }
    }

    /// Key of a sibling object in the same directory whose basename carries `prefix`.
    pub fn sibling_key(&self, prefix: &str) -> String {
        let name = format!("{}{}", prefix, self.basename());
        match self.dirname() {
            "" => name,
            dir => format!("{}/{}", dir, name),
        }
    }
}

/// Metadata row for an object held by the local disk store.
///
/// The struct stores metadata only; payload bytes live on disk.
#[derive(Serialize, Deserialize, Clone, FromRow, Debug)]
pub struct StoredObject {
    /// Internal UUID for DB indexing.
    pub id: Uuid,

    /// Name of the parent bucket.
    pub bucket: String,

    /// Object key (path-like identifier within the bucket).
    pub key: String,

    /// Final path segment of the key.
    pub filename: String,

    /// Content type (MIME type).
    pub content_type: Option<String>,

    /// Size in bytes.
    pub size_bytes: i64,

    /// MD5 of the payload, lowercase hex.
    pub etag: Option<String>,

    /// Timestamp when object was last written.
    pub last_modified: DateTime<Utc>,

    /// Soft-delete marker.
    pub is_deleted: bool,
}

impl From<StoredObject> for ObjectReference {
    fn from(row: StoredObject) -> Self {
        Self {
            bucket: row.bucket,
            key: row.key,
            content_type: row.content_type,
            size_bytes: row.size_bytes.max(0) as u64,
        }
    }
}
