//! The `DocumentStore` collaborator and its SQLite implementation.

use async_trait::async_trait;
use sqlx::SqlitePool;
use std::{collections::HashSet, sync::Arc};
use thiserror::Error;

#[derive(Debug, Error)]
pub enum DocumentError {
    #[error("document store unavailable: {0}")]
    Unavailable(String),
    #[error(transparent)]
    Sqlx(#[from] sqlx::Error),
}

/// Document database as consumed by the handlers.
#[async_trait]
pub trait DocumentStore: Send + Sync {
    /// Ids of every document in `collection`.
    async fn list_document_ids(&self, collection: &str) -> Result<HashSet<String>, DocumentError>;
}

/// Documents kept in the `documents` table of the service database.
///
/// The service only reads this table. It is filled from outside the service
/// (the process that owns user accounts writes one row per document), so an
/// empty table means every folder under the owners root counts as orphaned.
#[derive(Clone)]
pub struct SqliteDocumentStore {
    db: Arc<SqlitePool>,
}

impl SqliteDocumentStore {
    pub fn new(db: Arc<SqlitePool>) -> Self {
        Self { db }
    }
}

#[cfg(test)]
impl SqliteDocumentStore {
    /// Insert or replace a document.
    pub async fn put_document(
        &self,
        collection: &str,
        id: &str,
        data: &serde_json::Value,
    ) -> Result<(), DocumentError> {
        sqlx::query(
            "INSERT INTO documents (collection, id, data) VALUES (?, ?, ?)
             ON CONFLICT(collection, id) DO UPDATE SET data = excluded.data",
        )
        .bind(collection)
        .bind(id)
        .bind(data.to_string())
        .execute(&*self.db)
        .await?;
        Ok(())
    }

    pub async fn delete_document(&self, collection: &str, id: &str) -> Result<bool, DocumentError> {
        let result = sqlx::query("DELETE FROM documents WHERE collection = ? AND id = ?")
            .bind(collection)
            .bind(id)
            .execute(&*self.db)
            .await?;
        Ok(result.rows_affected() > 0)
    }
}

#[async_trait]
impl DocumentStore for SqliteDocumentStore {
    async fn list_document_ids(&self, collection: &str) -> Result<HashSet<String>, DocumentError> {
        let ids: Vec<String> = sqlx::query_scalar("SELECT id FROM documents WHERE collection = ?")
            .bind(collection)
            .fetch_all(&*self.db)
            .await?;
        Ok(ids.into_iter().collect())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db;
    use serde_json::json;

    #[tokio::test]
    async fn lists_ids_of_one_collection_only() {
        let pool = Arc::new(db::connect_in_memory().await.unwrap());
        let docs = SqliteDocumentStore::new(pool);
        docs.put_document("users", "alice", &json!({"name": "Alice"}))
            .await
            .unwrap();
        docs.put_document("users", "bob", &json!({})).await.unwrap();
        docs.put_document("activities", "run-1", &json!({}))
            .await
            .unwrap();

        let ids = docs.list_document_ids("users").await.unwrap();
        assert_eq!(ids, HashSet::from(["alice".to_string(), "bob".to_string()]));

        assert!(docs.delete_document("users", "bob").await.unwrap());
        let ids = docs.list_document_ids("users").await.unwrap();
        assert_eq!(ids.len(), 1);
        assert!(docs.list_document_ids("empty").await.unwrap().is_empty());
    }
}
