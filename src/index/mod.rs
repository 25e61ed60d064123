//! Persisted embedding index with cosine top-k
//!
//! Vectors live in their own SQLite file. Queries run against an
//! in-memory [`Snapshot`] that is replaced wholesale after every write,
//! so a reader holding an `Arc<Snapshot>` never observes a half-applied
//! upsert or rebuild.

use anyhow::{Context, Result};
use chrono::{DateTime, Utc};
use rusqlite::{params, Connection};
use serde::Serialize;
use std::cmp::Ordering;
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex, RwLock};
use tracing::{debug, info};

use crate::embedding::{blob_to_vec, cosine_similarity, vec_to_blob};
use crate::error::{PipelineError, PipelineResult};
use crate::store::format_ts;

const SCHEMA: &str = r#"
PRAGMA journal_mode = WAL;
PRAGMA busy_timeout = 5000;

CREATE TABLE IF NOT EXISTS embeddings (
    conversation_id TEXT PRIMARY KEY,
    model TEXT NOT NULL,
    dims INTEGER NOT NULL,
    content_hash TEXT NOT NULL,            -- sha256 of the embedded document
    vector BLOB NOT NULL,                  -- little-endian f32
    timestamp DATETIME,                    -- conversation's last activity
    updated_at DATETIME
);
"#;

/// One conversation's embedding.
#[derive(Debug, Clone, PartialEq)]
pub struct IndexEntry {
    pub conversation_id: String,
    pub model: String,
    pub content_hash: String,
    pub vector: Vec<f32>,
    pub timestamp: Option<DateTime<Utc>>,
}

/// Immutable view of every entry, ordered by conversation id.
#[derive(Debug, Default)]
pub struct Snapshot {
    entries: BTreeMap<String, IndexEntry>,
}

impl Snapshot {
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn get(&self, conversation_id: &str) -> Option<&IndexEntry> {
        self.entries.get(conversation_id)
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct SimilarConversation {
    pub conversation_id: String,
    pub similarity: f32,
    pub timestamp: Option<DateTime<Utc>>,
}

#[derive(Debug, Clone, Serialize)]
pub struct IndexStats {
    pub path: PathBuf,
    pub entries: usize,
    /// Entry count per (model, dims)
    pub models: Vec<(String, usize, usize)>,
}

pub struct EmbeddingIndex {
    path: PathBuf,
    conn: Mutex<Connection>,
    snapshot: RwLock<Arc<Snapshot>>,
}

impl EmbeddingIndex {
    pub fn open(path: &Path) -> Result<Self> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }

        let conn = Connection::open(path)
            .with_context(|| format!("Failed to open embedding index at {}", path.display()))?;
        conn.execute_batch(SCHEMA)?;
        let snapshot = load_snapshot(&conn)?;
        debug!(path = %path.display(), entries = snapshot.len(), "opened embedding index");

        Ok(Self {
            path: path.to_path_buf(),
            conn: Mutex::new(conn),
            snapshot: RwLock::new(Arc::new(snapshot)),
        })
    }

    /// The current snapshot. Later writes do not affect it.
    pub fn snapshot(&self) -> Arc<Snapshot> {
        match self.snapshot.read() {
            Ok(guard) => Arc::clone(&*guard),
            Err(poisoned) => Arc::clone(&*poisoned.into_inner()),
        }
    }

    pub fn len(&self) -> usize {
        self.snapshot().len()
    }

    pub fn is_empty(&self) -> bool {
        self.snapshot().is_empty()
    }

    /// Hash of the document the stored vector was computed from
    pub fn content_hash(&self, conversation_id: &str) -> Option<String> {
        self.snapshot()
            .get(conversation_id)
            .map(|e| e.content_hash.clone())
    }

    /// Persist one entry, then publish a snapshot containing it.
    pub fn upsert_embedding(&self, entry: IndexEntry) -> PipelineResult<()> {
        {
            let conn = self.lock_conn()?;
            let tx = conn.unchecked_transaction().map_err(index_err)?;
            insert_entry(&tx, &entry).map_err(index_err)?;
            tx.commit().map_err(index_err)?;
        }

        self.publish(|entries| {
            entries.insert(entry.conversation_id.clone(), entry);
        })
    }

    pub fn remove(&self, conversation_id: &str) -> PipelineResult<bool> {
        let removed = {
            let conn = self.lock_conn()?;
            conn.execute(
                "DELETE FROM embeddings WHERE conversation_id = ?",
                params![conversation_id],
            )
            .map_err(index_err)?
        };
        if removed > 0 {
            self.publish(|entries| {
                entries.remove(conversation_id);
            })?;
        }
        Ok(removed > 0)
    }

    /// Replace every entry in one transaction, then swap the snapshot.
    ///
    /// Queries during the rebuild keep answering from the previous
    /// snapshot; on failure the previous state stays in place.
    pub fn rebuild(&self, entries: Vec<IndexEntry>) -> PipelineResult<usize> {
        {
            let conn = self.lock_conn()?;
            let tx = conn.unchecked_transaction().map_err(index_err)?;
            tx.execute("DELETE FROM embeddings", []).map_err(index_err)?;
            for entry in &entries {
                insert_entry(&tx, entry).map_err(index_err)?;
            }
            tx.commit().map_err(index_err)?;
        }

        let snapshot = Snapshot {
            entries: entries
                .into_iter()
                .map(|e| (e.conversation_id.clone(), e))
                .collect(),
        };
        let count = snapshot.len();
        self.swap(snapshot)?;
        info!(entries = count, "rebuilt embedding index");
        Ok(count)
    }

    /// Top `k` entries by cosine similarity to `query`.
    ///
    /// Ties go to the most recent conversation, then the smaller id.
    /// Entries whose dimensionality differs from the query are ignored.
    pub fn query_similar(&self, query: &[f32], k: usize) -> Vec<SimilarConversation> {
        let snapshot = self.snapshot();

        let mut results: Vec<SimilarConversation> = snapshot
            .entries
            .values()
            .filter(|e| e.vector.len() == query.len())
            .map(|e| SimilarConversation {
                conversation_id: e.conversation_id.clone(),
                similarity: cosine_similarity(query, &e.vector),
                timestamp: e.timestamp,
            })
            .collect();

        results.sort_by(|a, b| {
            b.similarity
                .partial_cmp(&a.similarity)
                .unwrap_or(Ordering::Equal)
                .then_with(|| b.timestamp.cmp(&a.timestamp))
                .then_with(|| a.conversation_id.cmp(&b.conversation_id))
        });
        results.truncate(k);
        results
    }

    pub fn stats(&self) -> IndexStats {
        let snapshot = self.snapshot();
        let mut models: BTreeMap<(String, usize), usize> = BTreeMap::new();
        for entry in snapshot.entries.values() {
            *models
                .entry((entry.model.clone(), entry.vector.len()))
                .or_default() += 1;
        }
        IndexStats {
            path: self.path.clone(),
            entries: snapshot.len(),
            models: models
                .into_iter()
                .map(|((model, dims), count)| (model, dims, count))
                .collect(),
        }
    }

    fn lock_conn(&self) -> PipelineResult<std::sync::MutexGuard<'_, Connection>> {
        self.conn
            .lock()
            .map_err(|_| PipelineError::IndexWrite("index connection lock poisoned".into()))
    }

    /// Copy-on-write update of the published snapshot.
    fn publish(&self, update: impl FnOnce(&mut BTreeMap<String, IndexEntry>)) -> PipelineResult<()> {
        let mut guard = self
            .snapshot
            .write()
            .map_err(|_| PipelineError::IndexWrite("index snapshot lock poisoned".into()))?;
        let mut entries = guard.entries.clone();
        update(&mut entries);
        *guard = Arc::new(Snapshot { entries });
        Ok(())
    }

    fn swap(&self, snapshot: Snapshot) -> PipelineResult<()> {
        let mut guard = self
            .snapshot
            .write()
            .map_err(|_| PipelineError::IndexWrite("index snapshot lock poisoned".into()))?;
        *guard = Arc::new(snapshot);
        Ok(())
    }
}

fn index_err(e: rusqlite::Error) -> PipelineError {
    PipelineError::IndexWrite(e.to_string())
}

fn insert_entry(conn: &Connection, entry: &IndexEntry) -> rusqlite::Result<()> {
    conn.execute(
        r#"INSERT OR REPLACE INTO embeddings
           (conversation_id, model, dims, content_hash, vector, timestamp, updated_at)
           VALUES (?, ?, ?, ?, ?, ?, datetime('now'))"#,
        params![
            entry.conversation_id,
            entry.model,
            entry.vector.len() as i64,
            entry.content_hash,
            vec_to_blob(&entry.vector),
            entry.timestamp.as_ref().map(format_ts),
        ],
    )?;
    Ok(())
}

fn load_snapshot(conn: &Connection) -> Result<Snapshot> {
    let mut stmt = conn.prepare(
        "SELECT conversation_id, model, content_hash, vector, timestamp FROM embeddings",
    )?;
    let rows = stmt.query_map([], |row| {
        let blob: Vec<u8> = row.get(3)?;
        let timestamp: Option<String> = row.get(4)?;
        Ok(IndexEntry {
            conversation_id: row.get(0)?,
            model: row.get(1)?,
            content_hash: row.get(2)?,
            vector: blob_to_vec(&blob),
            timestamp: timestamp
                .and_then(|s| DateTime::parse_from_rfc3339(&s).ok())
                .map(|dt| dt.with_timezone(&Utc)),
        })
    })?;

    let mut entries = BTreeMap::new();
    for row in rows {
        let entry = row?;
        entries.insert(entry.conversation_id.clone(), entry);
    }
    Ok(Snapshot { entries })
}
