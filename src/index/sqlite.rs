// SPDX-License-Identifier: MIT OR Apache-2.0

//! SQLite-backed vector index.
//!
//! Chunks and their embeddings live in `.faqrag/index.sqlite` by default so
//! that `ingest` and `query` can run as separate processes. Search is the same
//! brute-force cosine scan as the in-memory index.

use rusqlite::{params, Connection, OptionalExtension};
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

use super::{check_dimension, check_k, cosine_similarity, top_k, EmbeddedChunk, RetrievalResult, VectorIndex};
use crate::embedding::Chunk;
use crate::errors::{RagError, Result};
use crate::utils::INDEX_DIR;

/// File name of the index database inside [`INDEX_DIR`].
pub const INDEX_FILE_NAME: &str = "index.sqlite";

const SCHEMA_VERSION: &str = "1";

/// Persistent index over embedded chunks.
pub struct SqliteIndex {
    conn: Connection,
    path: PathBuf,
    dimension: Option<usize>,
    /// Model id written to `meta` with the next write.
    bound_model: Option<String>,
}

impl SqliteIndex {
    /// Opens or creates an index at the specified path.
    pub fn open<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path = path.as_ref().to_path_buf();

        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent).map_err(|source| RagError::Io {
                path: parent.to_path_buf(),
                source,
            })?;
        }

        let conn = Connection::open(&path).map_err(RagError::storage("open"))?;
        let mut index = Self {
            conn,
            path,
            dimension: None,
            bound_model: None,
        };
        index.init_schema()?;
        index.dimension = index.stored_dimension()?;

        tracing::debug!(
            "opened index {} (dimension {:?})",
            index.path.display(),
            index.dimension
        );
        Ok(index)
    }

    /// Opens the index in the default location under `root`.
    pub fn open_default<P: AsRef<Path>>(root: P) -> Result<Self> {
        Self::open(root.as_ref().join(INDEX_DIR).join(INDEX_FILE_NAME))
    }

    fn init_schema(&self) -> Result<()> {
        self.conn
            .execute_batch(
                r#"
            CREATE TABLE IF NOT EXISTS meta (
                key TEXT PRIMARY KEY,
                value TEXT NOT NULL
            );

            CREATE TABLE IF NOT EXISTS chunks (
                id INTEGER PRIMARY KEY AUTOINCREMENT,
                fingerprint TEXT NOT NULL,
                source_id TEXT NOT NULL,
                ordinal INTEGER NOT NULL,
                content TEXT NOT NULL,
                metadata TEXT NOT NULL,
                embedding BLOB NOT NULL,
                created_at INTEGER NOT NULL
            );

            CREATE INDEX IF NOT EXISTS idx_chunks_fingerprint
                ON chunks(fingerprint);
            "#,
            )
            .map_err(RagError::storage("initialize schema"))?;

        self.set_meta_if_absent("schema_version", SCHEMA_VERSION)
    }

    fn stored_dimension(&self) -> Result<Option<usize>> {
        match self.get_meta("dimension")? {
            None => Ok(None),
            Some(value) => value.parse::<usize>().map(Some).map_err(|e| {
                RagError::MalformedInput {
                    origin: self.path.display().to_string(),
                    location: "meta.dimension".to_string(),
                    reason: e.to_string(),
                }
            }),
        }
    }

    /// Returns the path to the database file.
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Closes the connection explicitly.
    pub fn close(self) -> Result<()> {
        self.conn
            .close()
            .map_err(|(_, e)| RagError::Storage {
                operation: "close",
                source: e,
            })
    }

    /// Embedding model the stored vectors were produced with.
    pub fn model(&self) -> Result<Option<String>> {
        self.get_meta("model")
    }

    /// Checks that vectors from `model_id` can be compared with the stored ones.
    ///
    /// A populated index built with another model is a
    /// [`RagError::ModelMismatch`]. Nothing is written.
    pub fn check_model(&self, model_id: &str) -> Result<()> {
        match self.model()? {
            Some(stored) if stored != model_id && self.count()? > 0 => {
                Err(RagError::ModelMismatch {
                    stored,
                    configured: model_id.to_string(),
                })
            }
            _ => Ok(()),
        }
    }

    /// Checks `model_id` and records it with the next write.
    pub fn bind_model(&mut self, model_id: &str) -> Result<()> {
        self.check_model(model_id)?;
        self.bound_model = Some(model_id.to_string());
        Ok(())
    }

    /// Records `model_id` for a rebuild through [`VectorIndex::replace_all`]
    /// without checking the stored model.
    pub fn rebind_model(&mut self, model_id: &str) {
        self.bound_model = Some(model_id.to_string());
    }

    fn load_chunk(&self, id: i64) -> Result<Chunk> {
        let (source_id, ordinal, content, metadata): (String, i64, String, String) = self
            .conn
            .query_row(
                "SELECT source_id, ordinal, content, metadata FROM chunks WHERE id = ?1",
                params![id],
                |row| Ok((row.get(0)?, row.get(1)?, row.get(2)?, row.get(3)?)),
            )
            .map_err(RagError::storage("load chunk"))?;

        let metadata: BTreeMap<String, serde_json::Value> = serde_json::from_str(&metadata)
            .map_err(|e| RagError::MalformedInput {
                origin: self.path.display().to_string(),
                location: format!("row {}", id),
                reason: e.to_string(),
            })?;

        Ok(Chunk {
            content,
            source_id,
            ordinal: ordinal as usize,
            metadata,
        })
    }

    /// Gets metadata value by key.
    fn get_meta(&self, key: &str) -> Result<Option<String>> {
        self.conn
            .query_row(
                "SELECT value FROM meta WHERE key = ?1",
                params![key],
                |row| row.get(0),
            )
            .optional()
            .map_err(RagError::storage("read meta"))
    }

    fn set_meta_if_absent(&self, key: &str, value: &str) -> Result<()> {
        self.conn
            .execute(
                "INSERT OR IGNORE INTO meta (key, value) VALUES (?1, ?2)",
                params![key, value],
            )
            .map_err(RagError::storage("write meta"))?;
        Ok(())
    }

    fn write_entries(&mut self, entries: Vec<EmbeddedChunk>, replace: bool) -> Result<()> {
        let operation = if replace { "replace" } else { "insert" };
        let current = if replace { None } else { self.dimension };
        let dimension = entries
            .first()
            .map(|first| current.unwrap_or(first.vector.len()));
        for entry in &entries {
            check_dimension(dimension, &entry.vector, operation)?;
        }

        let created_at = chrono::Utc::now().timestamp();
        let tx = self
            .conn
            .transaction()
            .map_err(RagError::storage(operation))?;
        if replace {
            tx.execute_batch(
                r#"
            DELETE FROM chunks;
            DELETE FROM meta WHERE key IN ('dimension', 'model');
            "#,
            )
            .map_err(RagError::storage(operation))?;
        }
        {
            let mut stmt = tx
                .prepare(
                    r#"
                INSERT INTO chunks (
                    fingerprint, source_id, ordinal, content, metadata, embedding, created_at
                )
                VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7)
                "#,
                )
                .map_err(RagError::storage(operation))?;

            for entry in &entries {
                let chunk = &entry.chunk;
                let metadata = serde_json::to_string(&chunk.metadata).map_err(|e| {
                    RagError::MalformedInput {
                        origin: chunk.source_id.clone(),
                        location: format!("chunk {}", chunk.ordinal),
                        reason: e.to_string(),
                    }
                })?;
                stmt.execute(params![
                    chunk.fingerprint(),
                    chunk.source_id,
                    chunk.ordinal as i64,
                    chunk.content,
                    metadata,
                    Self::embedding_to_blob(&entry.vector),
                    created_at
                ])
                .map_err(RagError::storage(operation))?;
            }
        }
        if let Some(dimension) = dimension {
            tx.execute(
                "INSERT OR IGNORE INTO meta (key, value) VALUES ('dimension', ?1)",
                params![dimension.to_string()],
            )
            .map_err(RagError::storage(operation))?;
        }
        if let Some(model) = &self.bound_model {
            tx.execute(
                r#"
            INSERT INTO meta (key, value)
            VALUES ('model', ?1)
            ON CONFLICT(key) DO UPDATE SET value = excluded.value
            "#,
                params![model],
            )
            .map_err(RagError::storage(operation))?;
        }
        tx.commit().map_err(RagError::storage(operation))?;

        self.dimension = dimension;
        Ok(())
    }

    /// Converts an embedding vector to a compact little-endian blob.
    fn embedding_to_blob(embedding: &[f32]) -> Vec<u8> {
        embedding.iter().flat_map(|f| f.to_le_bytes()).collect()
    }

    fn blob_to_embedding(blob: &[u8]) -> Vec<f32> {
        blob.chunks_exact(4)
            .map(|b| f32::from_le_bytes([b[0], b[1], b[2], b[3]]))
            .collect()
    }
}

impl VectorIndex for SqliteIndex {
    fn dimension(&self) -> Option<usize> {
        self.dimension
    }

    fn count(&self) -> Result<usize> {
        let count: i64 = self
            .conn
            .query_row("SELECT COUNT(*) FROM chunks", [], |row| row.get(0))
            .map_err(RagError::storage("count"))?;
        Ok(count as usize)
    }

    fn insert(&mut self, entry: EmbeddedChunk) -> Result<()> {
        self.insert_many(vec![entry])
    }

    /// Inserts all entries in one transaction; nothing is written on error.
    fn insert_many(&mut self, entries: Vec<EmbeddedChunk>) -> Result<()> {
        if entries.is_empty() {
            return Ok(());
        }
        self.write_entries(entries, false)
    }

    fn contains(&self, fingerprint: &str) -> Result<bool> {
        self.conn
            .query_row(
                "SELECT EXISTS(SELECT 1 FROM chunks WHERE fingerprint = ?1)",
                params![fingerprint],
                |row| row.get(0),
            )
            .map_err(RagError::storage("lookup"))
    }

    fn query(&self, vector: &[f32], k: usize) -> Result<Vec<RetrievalResult>> {
        check_k(k)?;
        check_dimension(self.dimension, vector, "query")?;

        let mut stmt = self
            .conn
            .prepare("SELECT id, embedding FROM chunks ORDER BY id")
            .map_err(RagError::storage("query"))?;
        let rows = stmt
            .query_map([], |row| {
                let id: i64 = row.get(0)?;
                let blob: Vec<u8> = row.get(1)?;
                Ok((id, blob))
            })
            .map_err(RagError::storage("query"))?;

        let mut scores = Vec::new();
        for row in rows {
            let (id, blob) = row.map_err(RagError::storage("query"))?;
            let embedding = Self::blob_to_embedding(&blob);
            scores.push((id as usize, cosine_similarity(vector, &embedding)));
        }

        top_k(scores, k)
            .into_iter()
            .map(|(id, score)| {
                Ok(RetrievalResult {
                    chunk: self.load_chunk(id as i64)?,
                    score,
                })
            })
            .collect()
    }

    fn clear(&mut self) -> Result<()> {
        self.conn
            .execute_batch(
                r#"
            DELETE FROM chunks;
            DELETE FROM meta WHERE key IN ('dimension', 'model');
            "#,
            )
            .map_err(RagError::storage("clear"))?;
        self.dimension = None;
        self.bound_model = None;
        Ok(())
    }

    /// Deletes and inserts in one transaction.
    fn replace_all(&mut self, entries: Vec<EmbeddedChunk>) -> Result<()> {
        self.write_entries(entries, true)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use tempfile::tempdir;

    fn entry(id: &str, ordinal: usize, vector: Vec<f32>) -> EmbeddedChunk {
        let mut metadata = BTreeMap::new();
        metadata.insert("id".to_string(), json!(id));
        metadata.insert("tags".to_string(), json!(["hr"]));
        EmbeddedChunk::new(
            Chunk {
                content: format!("Question: q{}\nAnswer: a{}", id, id),
                source_id: id.to_string(),
                ordinal,
                metadata,
            },
            vector,
        )
    }

    #[test]
    fn test_index_create_and_reopen() {
        let dir = tempdir().unwrap();
        let db_path = dir.path().join("nested").join("index.sqlite");

        let mut index = SqliteIndex::open(&db_path).unwrap();
        assert!(db_path.exists());
        assert_eq!(index.dimension(), None);
        index.insert(entry("1", 0, vec![1.0, 0.0, 0.0])).unwrap();
        index.close().unwrap();

        let index = SqliteIndex::open(&db_path).unwrap();
        assert_eq!(index.dimension(), Some(3));
        assert_eq!(index.count().unwrap(), 1);
    }

    #[test]
    fn test_open_default_uses_index_dir() {
        let dir = tempdir().unwrap();
        let index = SqliteIndex::open_default(dir.path()).unwrap();
        assert_eq!(
            index.path(),
            dir.path().join(INDEX_DIR).join(INDEX_FILE_NAME)
        );
    }

    #[test]
    fn test_similarity_search_round_trips_chunks() {
        let dir = tempdir().unwrap();
        let mut index = SqliteIndex::open(dir.path().join("test.sqlite")).unwrap();

        index
            .insert_many(vec![
                entry("a", 0, vec![1.0, 0.0, 0.0]),
                entry("b", 0, vec![0.0, 1.0, 0.0]),
                entry("c", 1, vec![0.9, 0.1, 0.0]),
            ])
            .unwrap();

        let results = index.query(&[1.0, 0.0, 0.0], 2).unwrap();
        assert_eq!(results.len(), 2);
        assert_eq!(results[0].chunk, entry("a", 0, vec![]).chunk);
        assert!((results[0].score - 1.0).abs() < 0.0001);
        assert_eq!(results[1].chunk.source_id, "c");
        assert_eq!(results[1].chunk.ordinal, 1);
    }

    #[test]
    fn test_ties_keep_insertion_order() {
        let dir = tempdir().unwrap();
        let mut index = SqliteIndex::open(dir.path().join("test.sqlite")).unwrap();
        index.insert(entry("first", 0, vec![1.0, 1.0])).unwrap();
        index.insert(entry("second", 0, vec![3.0, 3.0])).unwrap();

        let results = index.query(&[2.0, 2.0], 5).unwrap();
        let ids: Vec<_> = results.iter().map(|r| r.chunk.source_id.as_str()).collect();
        assert_eq!(ids, vec!["first", "second"]);
    }

    #[test]
    fn test_batch_with_wrong_dimension_writes_nothing() {
        let dir = tempdir().unwrap();
        let mut index = SqliteIndex::open(dir.path().join("test.sqlite")).unwrap();

        let err = index
            .insert_many(vec![entry("a", 0, vec![1.0, 0.0]), entry("b", 0, vec![1.0])])
            .unwrap_err();
        assert!(matches!(err, RagError::DimensionMismatch { .. }));
        assert_eq!(index.count().unwrap(), 0);
        assert_eq!(index.dimension(), None);
    }

    #[test]
    fn test_query_guards() {
        let dir = tempdir().unwrap();
        let mut index = SqliteIndex::open(dir.path().join("test.sqlite")).unwrap();
        assert!(index.query(&[1.0, 0.0], 3).unwrap().is_empty());

        index.insert(entry("a", 0, vec![1.0, 0.0])).unwrap();
        assert!(matches!(
            index.query(&[1.0, 0.0, 0.0], 3),
            Err(RagError::DimensionMismatch { .. })
        ));
        assert!(matches!(
            index.query(&[1.0, 0.0], 0),
            Err(RagError::InvalidParameter(_))
        ));
    }

    #[test]
    fn test_model_binding() {
        let dir = tempdir().unwrap();
        let mut index = SqliteIndex::open(dir.path().join("test.sqlite")).unwrap();

        index.bind_model("hashing-2").unwrap();
        // Empty index can be rebound.
        index.bind_model("other").unwrap();
        assert_eq!(index.model().unwrap(), None);

        index.insert(entry("a", 0, vec![1.0, 0.0])).unwrap();
        assert_eq!(index.model().unwrap().as_deref(), Some("other"));
        index.bind_model("other").unwrap();
        let err = index.bind_model("hashing-2").unwrap_err();
        assert!(matches!(err, RagError::ModelMismatch { .. }));
    }

    #[test]
    fn test_check_model_does_not_write() {
        let dir = tempdir().unwrap();
        let db_path = dir.path().join("test.sqlite");
        let index = SqliteIndex::open(&db_path).unwrap();

        index.check_model("hashing-2").unwrap();
        assert_eq!(index.model().unwrap(), None);
        index.close().unwrap();

        let mut index = SqliteIndex::open(&db_path).unwrap();
        index.bind_model("hashing-2").unwrap();
        index.insert(entry("a", 0, vec![1.0, 0.0])).unwrap();
        index.check_model("hashing-2").unwrap();
        assert!(matches!(
            index.check_model("other"),
            Err(RagError::ModelMismatch { .. })
        ));
        assert_eq!(index.model().unwrap().as_deref(), Some("hashing-2"));
    }

    #[test]
    fn test_replace_all_is_atomic() {
        let dir = tempdir().unwrap();
        let db_path = dir.path().join("test.sqlite");
        let mut index = SqliteIndex::open(&db_path).unwrap();
        index.bind_model("old").unwrap();
        index
            .insert_many(vec![entry("a", 0, vec![1.0, 0.0]), entry("b", 0, vec![0.0, 1.0])])
            .unwrap();

        index.rebind_model("new");
        let err = index
            .replace_all(vec![entry("c", 0, vec![1.0, 0.0, 0.0]), entry("d", 0, vec![1.0])])
            .unwrap_err();
        assert!(matches!(err, RagError::DimensionMismatch { .. }));
        assert_eq!(index.count().unwrap(), 2);
        assert_eq!(index.dimension(), Some(2));
        assert_eq!(index.model().unwrap().as_deref(), Some("old"));

        index
            .replace_all(vec![entry("c", 0, vec![1.0, 0.0, 0.0])])
            .unwrap();
        index.close().unwrap();

        let index = SqliteIndex::open(&db_path).unwrap();
        assert_eq!(index.count().unwrap(), 1);
        assert_eq!(index.dimension(), Some(3));
        assert_eq!(index.model().unwrap().as_deref(), Some("new"));
        assert!(!index.contains(&entry("a", 0, vec![]).chunk.fingerprint()).unwrap());
    }

    #[test]
    fn test_contains_and_clear() {
        let dir = tempdir().unwrap();
        let mut index = SqliteIndex::open(dir.path().join("test.sqlite")).unwrap();
        let item = entry("a", 0, vec![1.0, 0.0]);
        let fingerprint = item.chunk.fingerprint();

        index.bind_model("m").unwrap();
        index.insert(item).unwrap();
        assert!(index.contains(&fingerprint).unwrap());

        index.clear().unwrap();
        assert!(!index.contains(&fingerprint).unwrap());
        assert_eq!(index.count().unwrap(), 0);
        assert_eq!(index.dimension(), None);
        assert_eq!(index.model().unwrap(), None);

        // Dimension can change after a clear.
        index.insert(entry("b", 0, vec![1.0, 0.0, 0.0])).unwrap();
        assert_eq!(index.dimension(), Some(3));
    }
}
