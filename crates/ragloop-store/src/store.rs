use std::collections::HashSet;
use std::path::Path;
use std::sync::{Arc, Mutex};

use chrono::Utc;
use futures::future::BoxFuture;
use rusqlite::{params, Connection};
use tracing::{debug, info};

use ragloop_core::error::{RagError, Result};
use ragloop_core::traits::{EmbeddingProvider, VectorStore};
use ragloop_core::types::{Document, DocumentId, Metadata, NewDocument};

use crate::embeddings::{cosine_similarity, from_blob, to_blob};

const SCHEMA: &str = "CREATE TABLE IF NOT EXISTS chunks (
        id TEXT NOT NULL,
        collection TEXT NOT NULL,
        content TEXT NOT NULL,
        metadata TEXT NOT NULL,
        embedding BLOB NOT NULL,
        created_at TEXT NOT NULL,
        PRIMARY KEY (collection, id)
    );

    CREATE INDEX IF NOT EXISTS idx_chunks_collection ON chunks(collection);";

/// SQLite-backed vector store with brute-force cosine search.
///
/// Chunks are keyed by `(collection, id)`, so re-adding the same content is a no-op.
pub struct SqliteVectorStore {
    conn: Mutex<Connection>,
    embedder: Arc<dyn EmbeddingProvider>,
    collection: String,
}

fn db_err(e: impl std::fmt::Display) -> RagError {
    RagError::Database(e.to_string())
}

impl SqliteVectorStore {
    /// Open or create a store at the given path.
    pub fn open(
        path: &Path,
        collection: &str,
        embedder: Arc<dyn EmbeddingProvider>,
    ) -> Result<Self> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent).map_err(|e| {
                RagError::Database(format!("Failed to create db directory: {}", e))
            })?;
        }

        let conn = Connection::open(path).map_err(db_err)?;

        // WAL lets concurrent readers search while an ingest is writing.
        conn.execute_batch("PRAGMA journal_mode=WAL; PRAGMA synchronous=NORMAL;")
            .map_err(db_err)?;
        conn.execute_batch(SCHEMA).map_err(db_err)?;

        debug!(path = %path.display(), collection, "Vector store opened");
        Ok(Self {
            conn: Mutex::new(conn),
            embedder,
            collection: collection.to_string(),
        })
    }

    /// Open an in-memory store (for testing).
    pub fn in_memory(collection: &str, embedder: Arc<dyn EmbeddingProvider>) -> Result<Self> {
        let conn = Connection::open_in_memory().map_err(db_err)?;
        conn.execute_batch(SCHEMA).map_err(db_err)?;
        Ok(Self {
            conn: Mutex::new(conn),
            embedder,
            collection: collection.to_string(),
        })
    }

    fn existing_ids(&self, ids: &[&DocumentId]) -> Result<HashSet<String>> {
        let conn = self.conn.lock().map_err(db_err)?;
        let mut stmt = conn
            .prepare("SELECT 1 FROM chunks WHERE collection = ?1 AND id = ?2")
            .map_err(db_err)?;
        let mut found = HashSet::new();
        for id in ids {
            if stmt.exists(params![self.collection, id.0]).map_err(db_err)? {
                found.insert(id.0.clone());
            }
        }
        Ok(found)
    }

    fn insert(&self, docs: &[NewDocument], embeddings: &[Vec<f32>]) -> Result<usize> {
        let mut conn = self.conn.lock().map_err(db_err)?;
        let tx = conn.transaction().map_err(db_err)?;
        let now = Utc::now().to_rfc3339();
        let mut inserted = 0;
        {
            let mut stmt = tx
                .prepare(
                    "INSERT OR IGNORE INTO chunks (id, collection, content, metadata, embedding, created_at)
                     VALUES (?1, ?2, ?3, ?4, ?5, ?6)",
                )
                .map_err(db_err)?;
            for (doc, embedding) in docs.iter().zip(embeddings) {
                let metadata = serde_json::to_string(&doc.metadata)?;
                inserted += stmt
                    .execute(params![
                        doc.id.0,
                        self.collection,
                        doc.content,
                        metadata,
                        to_blob(embedding),
                        now,
                    ])
                    .map_err(db_err)?;
            }
        }
        tx.commit().map_err(db_err)?;
        Ok(inserted)
    }

    fn scan(&self, query_vec: &[f32], k: usize) -> Result<Vec<Document>> {
        let conn = self.conn.lock().map_err(db_err)?;
        let mut stmt = conn
            .prepare("SELECT id, content, metadata, embedding FROM chunks WHERE collection = ?1")
            .map_err(db_err)?;

        let rows = stmt
            .query_map(params![self.collection], |row| {
                let id: String = row.get(0)?;
                let content: String = row.get(1)?;
                let metadata: String = row.get(2)?;
                let blob: Vec<u8> = row.get(3)?;
                Ok((id, content, metadata, blob))
            })
            .map_err(db_err)?;

        let mut scored = Vec::new();
        for row in rows {
            let (id, content, metadata, blob) = row.map_err(db_err)?;
            let metadata: Metadata = serde_json::from_str(&metadata).unwrap_or_default();
            let score = cosine_similarity(query_vec, &from_blob(&blob));
            scored.push(Document {
                id: DocumentId(id),
                content,
                metadata,
                score,
            });
        }

        // Ties broken by id so equal scores come back in a stable order.
        scored.sort_by(|a, b| {
            b.score
                .partial_cmp(&a.score)
                .unwrap_or(std::cmp::Ordering::Equal)
                .then_with(|| a.id.cmp(&b.id))
        });
        scored.truncate(k);
        Ok(scored)
    }
}

impl VectorStore for SqliteVectorStore {
    fn similarity_search(&self, query: &str, k: usize) -> BoxFuture<'_, Result<Vec<Document>>> {
        let query = query.to_string();
        Box::pin(async move {
            if k == 0 {
                return Ok(vec![]);
            }
            let query_vec = self
                .embedder
                .embed(std::slice::from_ref(&query))
                .await?
                .into_iter()
                .next()
                .ok_or_else(|| RagError::Embedding("empty embedding response".into()))?;
            let docs = self.scan(&query_vec, k)?;
            debug!(query = %query, k, found = docs.len(), "Similarity search");
            Ok(docs)
        })
    }

    fn add_documents(&self, docs: Vec<NewDocument>) -> BoxFuture<'_, Result<usize>> {
        Box::pin(async move {
            // Dedupe within the batch as well as against what is stored.
            let mut seen = HashSet::new();
            let docs: Vec<NewDocument> = docs
                .into_iter()
                .filter(|d| seen.insert(d.id.clone()))
                .collect();

            let ids: Vec<&DocumentId> = docs.iter().map(|d| &d.id).collect();
            let existing = self.existing_ids(&ids)?;
            let fresh: Vec<NewDocument> = docs
                .into_iter()
                .filter(|d| !existing.contains(&d.id.0))
                .collect();

            if fresh.is_empty() {
                return Ok(0);
            }

            let texts: Vec<String> = fresh.iter().map(|d| d.content.clone()).collect();
            let embeddings = self.embedder.embed(&texts).await?;
            if embeddings.len() != fresh.len() {
                return Err(RagError::Embedding(format!(
                    "expected {} embeddings, got {}",
                    fresh.len(),
                    embeddings.len()
                )));
            }

            let inserted = self.insert(&fresh, &embeddings)?;
            info!(
                collection = %self.collection,
                inserted,
                skipped = existing.len(),
                "Added documents"
            );
            Ok(inserted)
        })
    }

    fn persist(&self) -> BoxFuture<'_, Result<()>> {
        Box::pin(async move {
            let conn = self.conn.lock().map_err(db_err)?;
            // No-op for in-memory databases.
            conn.execute_batch("PRAGMA wal_checkpoint(TRUNCATE);")
                .map_err(db_err)?;
            Ok(())
        })
    }

    fn count(&self) -> BoxFuture<'_, Result<usize>> {
        Box::pin(async move {
            let conn = self.conn.lock().map_err(db_err)?;
            let n: i64 = conn
                .query_row(
                    "SELECT COUNT(*) FROM chunks WHERE collection = ?1",
                    params![self.collection],
                    |row| row.get(0),
                )
                .map_err(db_err)?;
            Ok(n as usize)
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use ragloop_test_utils::HashEmbedder;

    fn meta(source: &str, page: usize) -> Metadata {
        let mut m = Metadata::new();
        m.insert("source".into(), source.into());
        m.insert("page".into(), page.to_string());
        m
    }

    fn store() -> SqliteVectorStore {
        SqliteVectorStore::in_memory("test", Arc::new(HashEmbedder::new(64))).unwrap()
    }

    #[tokio::test]
    async fn test_add_is_idempotent() {
        let store = store();
        let docs = vec![
            NewDocument::new("stone monkey born on flower fruit mountain", meta("a.txt", 0)),
            NewDocument::new("the monk travels west for scriptures", meta("a.txt", 1)),
        ];
        assert_eq!(store.add_documents(docs.clone()).await.unwrap(), 2);
        assert_eq!(store.add_documents(docs).await.unwrap(), 0);
        assert_eq!(store.count().await.unwrap(), 2);
    }

    #[tokio::test]
    async fn test_duplicates_within_batch_collapse() {
        let store = store();
        let doc = NewDocument::new("same chunk", meta("a.txt", 0));
        let added = store
            .add_documents(vec![doc.clone(), doc])
            .await
            .unwrap();
        assert_eq!(added, 1);
        assert_eq!(store.count().await.unwrap(), 1);
    }

    #[tokio::test]
    async fn test_search_orders_by_score_and_respects_k() {
        let store = store();
        store
            .add_documents(vec![
                NewDocument::new("monkey king rebels in heaven", meta("a.txt", 0)),
                NewDocument::new("pig demon eats too much", meta("a.txt", 1)),
                NewDocument::new("sand monk carries the luggage", meta("a.txt", 2)),
            ])
            .await
            .unwrap();

        let results = store
            .similarity_search("monkey king rebels in heaven", 2)
            .await
            .unwrap();
        assert_eq!(results.len(), 2);
        assert_eq!(results[0].content, "monkey king rebels in heaven");
        assert!(results[0].score >= results[1].score);
        assert_eq!(results[0].metadata.get("page").map(String::as_str), Some("0"));
    }

    #[tokio::test]
    async fn test_ids_survive_storage() {
        let store = store();
        let doc = NewDocument::new("chunk text", meta("b.txt", 4));
        let id = doc.id.clone();
        store.add_documents(vec![doc]).await.unwrap();
        let results = store.similarity_search("chunk text", 1).await.unwrap();
        assert_eq!(results[0].id, id);
    }

    #[tokio::test]
    async fn test_collections_are_isolated() {
        let embedder: Arc<dyn EmbeddingProvider> = Arc::new(HashEmbedder::new(16));
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("index.db");
        let a = SqliteVectorStore::open(&path, "a", embedder.clone()).unwrap();
        let b = SqliteVectorStore::open(&path, "b", embedder).unwrap();
        a.add_documents(vec![NewDocument::new("only in a", meta("a.txt", 0))])
            .await
            .unwrap();
        a.persist().await.unwrap();
        assert_eq!(a.count().await.unwrap(), 1);
        assert_eq!(b.count().await.unwrap(), 0);
        assert!(b.similarity_search("only in a", 3).await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_empty_store_returns_nothing() {
        let store = store();
        assert!(store.similarity_search("anything", 3).await.unwrap().is_empty());
        assert!(store.similarity_search("anything", 0).await.unwrap().is_empty());
    }
}
