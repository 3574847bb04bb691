//! Represents a logical bucket: a top-level container for objects.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sqlx::FromRow;
use uuid::Uuid;

/// A storage bucket in the local object store.
///
/// Buckets act as namespaces for objects. The service works against a single
/// configured bucket, created at startup when missing.
#[derive(Serialize, Deserialize, Clone, FromRow, Debug)]
pub struct Bucket {
    /// Unique identifier for this bucket.
    pub id: Uuid,

    /// Bucket name (must conform to DNS naming rules).
    pub name: String,

    /// Region label the bucket was created with (e.g. "europe-west1").
    pub region: String,

    /// When this bucket was created.
    pub created_at: DateTime<Utc>,
}
